//! Game-over forwarding
//!
//! Listens on a session channel for game-over broadcasts and records each
//! summary in a ledger under one player address.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::ledger::{PlayerAddress, ScoreLedger};
use crate::network::channel::{Channel, ChannelError, Message, Origin, Topic};

/// Spawns ledger submission tasks.
pub struct ScoreForwarder;

impl ScoreForwarder {
    /// Subscribe to game-over on `channel` and submit every summary for
    /// `player`. The task ends when the channel closes and yields the number
    /// of accepted submissions.
    pub fn spawn(
        channel: &Channel,
        ledger: Arc<dyn ScoreLedger>,
        player: PlayerAddress,
    ) -> Result<JoinHandle<usize>, ChannelError> {
        let mut subscription = channel.subscribe(Origin::System, &[Topic::GameOver])?;

        Ok(tokio::spawn(async move {
            let mut accepted = 0;
            while let Some(envelope) = subscription.recv().await {
                let Message::GameOver { summary } = &envelope.message else {
                    continue;
                };
                // Only the Model reports game over
                if envelope.origin != Origin::Model {
                    continue;
                }

                match ledger.submit_score(player, summary.level, summary.kill_count, summary.game_time) {
                    Ok(events) => {
                        accepted += 1;
                        debug!(%player, events = events.len(), "Score submitted");
                    }
                    Err(e) => warn!(%player, "Score rejected: {}", e),
                }
            }
            accepted
        }))
    }
}
