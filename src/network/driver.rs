//! Tick Driver
//!
//! Runs a session's Model on a fixed period. Each period it drains the
//! Model's inbox subscription, advances one tick and publishes the output.
//! The loop keeps going while the game is inactive so a restart is picked
//! up without any outside nudge.

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::game::model::GameModel;
use crate::network::channel::{Publisher, Subscription};

/// Handle to a running driver task.
#[derive(Debug)]
pub struct DriverHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<GameModel>,
}

impl DriverHandle {
    /// Start driving `model`. Must be called inside a Tokio runtime.
    pub fn spawn(
        model: GameModel,
        inbox: Subscription,
        publisher: Publisher,
        period: Duration,
    ) -> Self {
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(run(model, inbox, publisher, period, stop_rx));
        Self { stop_tx: Some(stop_tx), task }
    }

    /// Stop the loop after the current tick and hand back the Model.
    pub async fn stop(mut self) -> Option<GameModel> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        match self.task.await {
            Ok(model) => Some(model),
            Err(e) => {
                warn!("Tick driver task failed: {}", e);
                None
            }
        }
    }

    /// True once the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

async fn run(
    mut model: GameModel,
    mut inbox: Subscription,
    publisher: Publisher,
    period: Duration,
    mut stop_rx: oneshot::Receiver<()>,
) -> GameModel {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            _ = &mut stop_rx => {
                debug!("Tick driver stop requested");
                break;
            }
            _ = ticker.tick() => {
                // Everything that arrived since the last tick
                for envelope in inbox.drain() {
                    model.receive(&envelope);
                }

                let mut closed = false;
                for message in model.tick() {
                    if publisher.publish(message).is_err() {
                        closed = true;
                        break;
                    }
                }
                if closed {
                    info!("Channel closed, tick driver exiting");
                    break;
                }
            }
        }
    }

    model
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::game::tick::GameConfig;
    use crate::network::channel::{Channel, Message, Origin, Topic};
    use crate::network::clock::ManualClock;

    fn setup() -> (Channel, DriverHandle) {
        let channel = Channel::new(Arc::new(ManualClock::new(0)));
        let inbox = channel.subscribe(Origin::Model, &Topic::MODEL_INBOUND).unwrap();
        let model = GameModel::new([1; 16], "com.monadhunter.game", GameConfig::default());
        let driver = DriverHandle::spawn(model, inbox, channel.publisher(Origin::Model), Duration::from_millis(2));
        (channel, driver)
    }

    #[tokio::test]
    async fn test_driver_ticks_after_start() {
        let (channel, driver) = setup();
        let mut states = channel.subscribe(Origin::System, &[Topic::GameStateUpdate]).unwrap();

        channel.publish(Origin::System, Message::GameStart).unwrap();

        let mut last_tick = 0;
        while last_tick < 5 {
            let envelope = states.recv().await.unwrap();
            if let Message::StateUpdate { state } = &envelope.message {
                assert!(state.tick > last_tick);
                last_tick = state.tick;
            }
        }

        let model = driver.stop().await.unwrap();
        assert!(model.state().tick >= 5);
    }

    #[tokio::test]
    async fn test_driver_exits_when_channel_closes() {
        let (channel, driver) = setup();
        channel.publish(Origin::System, Message::GameStart).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        channel.close();

        let model = driver.stop().await.unwrap();
        assert!(model.state().game_active);
    }

    #[tokio::test]
    async fn test_idle_driver_publishes_nothing() {
        let (channel, driver) = setup();
        let mut states = channel.subscribe(Origin::System, &[Topic::GameStateUpdate]).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(states.try_recv().is_none());

        channel.publish(Origin::System, Message::SyncRequest).unwrap();
        let envelope = states.recv().await.unwrap();
        assert!(matches!(envelope.message, Message::StateUpdate { .. }));
        driver.stop().await;
    }
}
