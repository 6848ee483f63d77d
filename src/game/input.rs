//! Input Validation
//!
//! Wire inputs arrive as floats stamped with the sender's wall clock.
//! Nothing here touches game state: these are pure checks that either
//! produce a quantized [`Command`] or say why the input was dropped.
//!
//! Drop rules:
//! - NaN/Inf in direction: DROP
//! - Direction magnitude above 1 + epsilon: DROP
//! - Timestamp further than the tolerance from receipt: DROP
//!
//! A drop is never reported to the sender.

use serde::{Serialize, Deserialize};

use crate::core::fixed::{quantize, FIXED_ONE};
use crate::core::vec2::FixedVec2;

/// Direction as sent over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Direction {
    /// X component
    pub x: f64,
    /// Y component
    pub y: f64,
}

impl Direction {
    /// Create a direction.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Scale to unit length, leaving the zero vector alone.
    pub fn normalized(self) -> Self {
        let len = (self.x * self.x + self.y * self.y).sqrt();
        if len > 0.0 && len.is_finite() {
            Self::new(self.x / len, self.y / len)
        } else {
            self
        }
    }
}

/// A player action as submitted by a view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayerInput {
    /// Move one tick's worth in `direction`.
    Move {
        /// Unit or zero vector.
        direction: Direction,
        /// Sender wall clock, ms since the Unix epoch.
        timestamp: u64,
    },
    /// Fire at the nearest enemy.
    Shoot {
        /// Sender wall clock, ms since the Unix epoch.
        timestamp: u64,
    },
}

impl PlayerInput {
    /// Send-time timestamp.
    pub fn timestamp(&self) -> u64 {
        match self {
            PlayerInput::Move { timestamp, .. } | PlayerInput::Shoot { timestamp } => *timestamp,
        }
    }
}

/// A validated, quantized input. The only form the simulation accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Move along a fixed-point direction of length at most ~1.
    Move {
        /// Quantized direction.
        direction: FixedVec2,
    },
    /// Fire at the nearest enemy.
    Shoot,
}

impl Command {
    /// True for `Move`.
    pub fn is_move(&self) -> bool {
        matches!(self, Command::Move { .. })
    }
}

/// Everything one sender contributes to a single tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickInput {
    /// At most one move per sender per tick.
    pub move_direction: Option<FixedVec2>,
    /// At most one shot per sender per tick.
    pub shoot: bool,
}

impl TickInput {
    /// True when nothing was submitted.
    pub fn is_empty(&self) -> bool {
        self.move_direction.is_none() && !self.shoot
    }
}

/// Validation limits.
#[derive(Debug, Clone, Copy)]
pub struct ValidationConfig {
    /// Max |sent - received| in milliseconds.
    pub timestamp_tolerance_ms: u64,
    /// Allowed magnitude overshoot above 1.0.
    pub direction_epsilon: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            timestamp_tolerance_ms: 1000,
            direction_epsilon: 1e-3,
        }
    }
}

/// Result of input validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationResult {
    /// Input accepted.
    Accepted(Command),
    /// Dropped: NaN or Inf in direction.
    DroppedNonFinite,
    /// Dropped: direction longer than 1 + epsilon.
    DroppedMagnitude,
    /// Dropped: timestamp too old.
    DroppedStale {
        /// How far behind receipt the timestamp was.
        skew_ms: u64,
    },
    /// Dropped: timestamp too far ahead.
    DroppedFuture {
        /// How far ahead of receipt the timestamp was.
        skew_ms: u64,
    },
}

impl ValidationResult {
    /// True when the input may be applied.
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    /// The accepted command, if any.
    pub fn command(&self) -> Option<Command> {
        match self {
            Self::Accepted(command) => Some(*command),
            _ => None,
        }
    }
}

/// Check a wire direction and quantize it.
pub fn check_direction(direction: Direction, epsilon: f64) -> Result<FixedVec2, ValidationResult> {
    let Direction { x, y } = direction;
    if !x.is_finite() || !y.is_finite() {
        return Err(ValidationResult::DroppedNonFinite);
    }

    let limit = 1.0 + epsilon;
    if x * x + y * y > limit * limit {
        return Err(ValidationResult::DroppedMagnitude);
    }

    let quantized = FixedVec2::new(quantize(x), quantize(y));

    // Rounding can push a legal vector a hair past the fixed-point limit.
    let max = (FIXED_ONE as f64 * limit) as i64;
    if quantized.length_squared() > max * max {
        return Err(ValidationResult::DroppedMagnitude);
    }

    Ok(quantized)
}

/// Check a send timestamp against the receipt time.
pub fn check_timestamp(sent_ms: u64, received_ms: u64, tolerance_ms: u64) -> Result<(), ValidationResult> {
    if sent_ms > received_ms {
        let skew_ms = sent_ms - received_ms;
        if skew_ms > tolerance_ms {
            return Err(ValidationResult::DroppedFuture { skew_ms });
        }
    } else {
        let skew_ms = received_ms - sent_ms;
        if skew_ms > tolerance_ms {
            return Err(ValidationResult::DroppedStale { skew_ms });
        }
    }
    Ok(())
}

/// Validate a player input received at `received_ms`.
pub fn validate_input(
    input: &PlayerInput,
    received_ms: u64,
    config: &ValidationConfig,
) -> ValidationResult {
    let command = match input {
        PlayerInput::Move { direction, .. } => {
            match check_direction(*direction, config.direction_epsilon) {
                Ok(direction) => Command::Move { direction },
                Err(dropped) => return dropped,
            }
        }
        PlayerInput::Shoot { .. } => Command::Shoot,
    };

    if let Err(dropped) = check_timestamp(input.timestamp(), received_ms, config.timestamp_tolerance_ms) {
        return dropped;
    }

    ValidationResult::Accepted(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_700_000_000_000;

    fn move_input(x: f64, y: f64, timestamp: u64) -> PlayerInput {
        PlayerInput::Move { direction: Direction::new(x, y), timestamp }
    }

    #[test]
    fn test_unit_direction_accepted() {
        let result = validate_input(&move_input(1.0, 0.0, NOW), NOW, &ValidationConfig::default());
        assert_eq!(
            result,
            ValidationResult::Accepted(Command::Move { direction: FixedVec2::new(FIXED_ONE, 0) })
        );
    }

    #[test]
    fn test_diagonal_unit_accepted() {
        let d = Direction::new(1.0, 1.0).normalized();
        let result = validate_input(&move_input(d.x, d.y, NOW), NOW, &ValidationConfig::default());
        assert!(result.is_accepted());
    }

    #[test]
    fn test_zero_direction_accepted() {
        let result = validate_input(&move_input(0.0, 0.0, NOW), NOW, &ValidationConfig::default());
        assert_eq!(result.command(), Some(Command::Move { direction: FixedVec2::ZERO }));
    }

    #[test]
    fn test_magnitude_rejection() {
        let result = validate_input(&move_input(2.0, 0.0, NOW), NOW, &ValidationConfig::default());
        assert_eq!(result, ValidationResult::DroppedMagnitude);

        let result = validate_input(&move_input(0.8, 0.8, NOW), NOW, &ValidationConfig::default());
        assert_eq!(result, ValidationResult::DroppedMagnitude);
    }

    #[test]
    fn test_nan_rejection() {
        let result = validate_input(&move_input(f64::NAN, 0.0, NOW), NOW, &ValidationConfig::default());
        assert_eq!(result, ValidationResult::DroppedNonFinite);
    }

    #[test]
    fn test_inf_rejection() {
        let result = validate_input(&move_input(0.0, f64::NEG_INFINITY, NOW), NOW, &ValidationConfig::default());
        assert_eq!(result, ValidationResult::DroppedNonFinite);
    }

    #[test]
    fn test_stale_and_future_rejection() {
        let config = ValidationConfig::default();

        let stale = PlayerInput::Shoot { timestamp: NOW - 1001 };
        assert_eq!(validate_input(&stale, NOW, &config), ValidationResult::DroppedStale { skew_ms: 1001 });

        let future = PlayerInput::Shoot { timestamp: NOW + 5000 };
        assert_eq!(validate_input(&future, NOW, &config), ValidationResult::DroppedFuture { skew_ms: 5000 });
    }

    #[test]
    fn test_tolerance_edge_accepted() {
        let config = ValidationConfig::default();
        assert!(validate_input(&PlayerInput::Shoot { timestamp: NOW - 1000 }, NOW, &config).is_accepted());
        assert!(validate_input(&PlayerInput::Shoot { timestamp: NOW + 1000 }, NOW, &config).is_accepted());
    }

    #[test]
    fn test_wire_format() {
        let json = r#"{"type":"move","direction":{"x":0.0,"y":-1.0},"timestamp":5}"#;
        let input: PlayerInput = serde_json::from_str(json).unwrap();
        assert_eq!(input, PlayerInput::Move { direction: Direction::new(0.0, -1.0), timestamp: 5 });

        // Missing component is malformed, never coerced to zero.
        let missing = r#"{"type":"move","direction":{"x":1.0},"timestamp":5}"#;
        assert!(serde_json::from_str::<PlayerInput>(missing).is_err());
    }
}
