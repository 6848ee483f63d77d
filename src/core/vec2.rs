//! Fixed-Point 2D Vector
//!
//! Deterministic 2D vector operations for arena movement.
//! Distances are computed in `i64` so pixel-scale coordinates never overflow.

use std::fmt;
use std::ops::{Add, Sub};
use serde::{Serialize, Deserialize};

use super::fixed::{
    Fixed, FIXED_ONE, FIXED_SCALE,
    fixed_mul, fixed_clamp, isqrt_u64,
    PLAYER_BOUND_MIN, PLAYER_BOUND_MAX_X, PLAYER_BOUND_MAX_Y,
};

/// 2D vector with fixed-point components.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FixedVec2 {
    /// X component (Q16.16 fixed-point)
    pub x: Fixed,
    /// Y component (Q16.16 fixed-point)
    pub y: Fixed,
}

impl FixedVec2 {
    /// Zero vector
    pub const ZERO: Self = Self { x: 0, y: 0 };

    /// Create a new vector from fixed-point components.
    #[inline]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Create a vector from whole pixel components.
    #[inline]
    pub const fn from_ints(x: i32, y: i32) -> Self {
        Self {
            x: x << FIXED_SCALE,
            y: y << FIXED_SCALE,
        }
    }

    /// Scale by a fixed-point scalar.
    #[inline]
    pub fn scale(self, scalar: Fixed) -> Self {
        Self {
            x: fixed_mul(self.x, scalar),
            y: fixed_mul(self.y, scalar),
        }
    }

    /// Squared distance in raw units (`i64`, never overflows in the arena).
    #[inline]
    pub fn distance_squared(self, other: Self) -> i64 {
        let dx = other.x as i64 - self.x as i64;
        let dy = other.y as i64 - self.y as i64;
        dx * dx + dy * dy
    }

    /// Distance to another point.
    #[inline]
    pub fn distance(self, other: Self) -> Fixed {
        isqrt_u64(self.distance_squared(other) as u64) as Fixed
    }

    /// True when `other` is strictly closer than `radius`.
    #[inline]
    pub fn within(self, other: Self, radius: Fixed) -> bool {
        let r = radius as i64;
        self.distance_squared(other) < r * r
    }

    /// Squared length of a direction, in raw units.
    #[inline]
    pub fn length_squared(self) -> i64 {
        Self::ZERO.distance_squared(self)
    }

    /// Unit vector toward `target`, or ZERO when already there.
    pub fn direction_to(self, target: Self) -> Self {
        let dx = target.x as i64 - self.x as i64;
        let dy = target.y as i64 - self.y as i64;
        let len = isqrt_u64((dx * dx + dy * dy) as u64) as i64;
        if len == 0 {
            return Self::ZERO;
        }
        Self {
            x: (dx * FIXED_ONE as i64 / len) as Fixed,
            y: (dy * FIXED_ONE as i64 / len) as Fixed,
        }
    }

    /// Move `step` toward `target`, recomputing the heading from scratch.
    ///
    /// May overshoot when `step` exceeds the remaining distance.
    pub fn advance_toward(self, target: Self, step: Fixed) -> Self {
        let dx = target.x as i64 - self.x as i64;
        let dy = target.y as i64 - self.y as i64;
        let len = isqrt_u64((dx * dx + dy * dy) as u64) as i64;
        if len == 0 {
            return self;
        }
        let step = step as i64;
        Self {
            x: self.x.wrapping_add((dx * step / len) as Fixed),
            y: self.y.wrapping_add((dy * step / len) as Fixed),
        }
    }

    /// Like `advance_toward`, but lands exactly on `target` instead of overshooting.
    pub fn approach(self, target: Self, step: Fixed) -> Self {
        if self.distance_squared(target) <= (step as i64) * (step as i64) {
            return target;
        }
        self.advance_toward(target, step)
    }

    /// Rotate by the angle whose cosine and sine are given in fixed-point.
    #[inline]
    pub fn rotate(self, cos: Fixed, sin: Fixed) -> Self {
        Self {
            x: fixed_mul(self.x, cos).wrapping_sub(fixed_mul(self.y, sin)),
            y: fixed_mul(self.x, sin).wrapping_add(fixed_mul(self.y, cos)),
        }
    }

    /// Clamp into an axis-aligned box.
    #[inline]
    pub fn clamp_box(self, min: Self, max: Self) -> Self {
        Self {
            x: fixed_clamp(self.x, min.x, max.x),
            y: fixed_clamp(self.y, min.y, max.y),
        }
    }

    /// Clamp to the player's walkable area.
    #[inline]
    pub fn clamp_to_arena(self) -> Self {
        self.clamp_box(
            Self::new(PLAYER_BOUND_MIN, PLAYER_BOUND_MIN),
            Self::new(PLAYER_BOUND_MAX_X, PLAYER_BOUND_MAX_Y),
        )
    }

    /// Check if position is within the player's walkable area.
    #[inline]
    pub fn is_in_arena(self) -> bool {
        self.x >= PLAYER_BOUND_MIN
            && self.x <= PLAYER_BOUND_MAX_X
            && self.y >= PLAYER_BOUND_MIN
            && self.y <= PLAYER_BOUND_MAX_Y
    }

    /// True when outside the box grown by `margin` on every side.
    #[inline]
    pub fn outside(self, width: Fixed, height: Fixed, margin: Fixed) -> bool {
        self.x < -margin
            || self.x > width + margin
            || self.y < -margin
            || self.y > height + margin
    }

    /// Convert to float tuple for rendering.
    #[inline]
    pub fn to_floats(self) -> (f32, f32) {
        (
            self.x as f32 / FIXED_ONE as f32,
            self.y as f32 / FIXED_ONE as f32,
        )
    }
}

impl Add for FixedVec2 {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self {
            x: self.x.wrapping_add(rhs.x),
            y: self.y.wrapping_add(rhs.y),
        }
    }
}

impl Sub for FixedVec2 {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self {
            x: self.x.wrapping_sub(rhs.x),
            y: self.y.wrapping_sub(rhs.y),
        }
    }
}

impl fmt::Debug for FixedVec2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (fx, fy) = self.to_floats();
        write!(f, "Vec2({:.3}, {:.3})", fx, fy)
    }
}

impl fmt::Display for FixedVec2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (fx, fy) = self.to_floats();
        write!(f, "({:.3}, {:.3})", fx, fy)
    }
}

// =============================================================================
// TESTS
// =============================================================================
