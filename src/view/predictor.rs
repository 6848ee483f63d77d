//! Own-avatar prediction
//!
//! Cosmetic only. Between snapshots the avatar keeps moving along the last
//! direction the view sent; every snapshot pulls it back toward the Model's
//! position and snaps outright when the gap exceeds the tolerance.

/// Default distance (px) beyond which the avatar snaps.
pub const DEFAULT_SNAP_TOLERANCE: f32 = 24.0;

/// Default share of the gap closed per snapshot.
pub const DEFAULT_BLEND: f32 = 0.25;

const BOUND_MIN: f32 = 16.0;
const BOUND_MAX_X: f32 = 784.0;
const BOUND_MAX_Y: f32 = 584.0;

/// Smooths the local player's avatar.
#[derive(Debug, Clone)]
pub struct AvatarPredictor {
    position: Option<(f32, f32)>,
    snap_tolerance: f32,
    blend: f32,
}

impl Default for AvatarPredictor {
    fn default() -> Self {
        Self::new(DEFAULT_SNAP_TOLERANCE, DEFAULT_BLEND)
    }
}

impl AvatarPredictor {
    /// Create with a snap tolerance (px) and blend factor in (0, 1].
    pub fn new(snap_tolerance: f32, blend: f32) -> Self {
        Self {
            position: None,
            snap_tolerance: snap_tolerance.max(0.0),
            blend: blend.clamp(f32::EPSILON, 1.0),
        }
    }

    /// Where to draw the avatar, once a snapshot has been seen.
    pub fn position(&self) -> Option<(f32, f32)> {
        self.position
    }

    /// Move locally for `dt` seconds.
    pub fn advance(&mut self, direction: (f32, f32), speed: f32, dt: f32) {
        let Some((x, y)) = self.position else {
            return;
        };
        let nx = (x + direction.0 * speed * dt).clamp(BOUND_MIN, BOUND_MAX_X);
        let ny = (y + direction.1 * speed * dt).clamp(BOUND_MIN, BOUND_MAX_Y);
        self.position = Some((nx, ny));
    }

    /// Fold in an authoritative position and return where to draw.
    pub fn reconcile(&mut self, authoritative: (f32, f32)) -> (f32, f32) {
        let next = match self.position {
            Some((x, y)) => {
                let dx = authoritative.0 - x;
                let dy = authoritative.1 - y;
                if (dx * dx + dy * dy).sqrt() > self.snap_tolerance {
                    authoritative
                } else {
                    (x + dx * self.blend, y + dy * self.blend)
                }
            }
            None => authoritative,
        };
        self.position = Some(next);
        next
    }

    /// Forget the predicted position; the next snapshot is taken as is.
    pub fn reset(&mut self) {
        self.position = None;
    }
}
