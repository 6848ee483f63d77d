//! Q16.16 Fixed-Point Arithmetic
//!
//! Deterministic fixed-point math for the hunter simulation.
//! Gameplay math is integer only; floats appear solely when quantizing
//! wire input and when converting positions for rendering.
//!
//! ## Format: Q16.16
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Bit Layout: Q16.16 (32-bit signed integer)                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  [S][IIIIIIIIIIIIIIII][FFFFFFFFFFFFFFFF]                    │
//! │   │  └──── 16 bits ────┘└──── 16 bits ────┘                 │
//! │   └─ Sign bit                                               │
//! │                                                             │
//! │  Range: -32768.0 to +32767.99998 pixels                     │
//! │  Precision: 1/65536 pixel                                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! One unit is one arena pixel. The arena is 800 x 600, so every
//! coordinate the simulation produces (including the off-screen spawn
//! and cull margins) fits comfortably. Products of two coordinates do
//! not, which is why distances are compared squared in `i64`.

/// Q16.16 fixed-point number stored as i32.
/// 16 bits integer, 16 bits fractional.
pub type Fixed = i32;

/// Number of fractional bits (16)
pub const FIXED_SCALE: i32 = 16;

/// 1.0 in fixed-point (65536)
pub const FIXED_ONE: Fixed = 1 << FIXED_SCALE;

/// 0.5 in fixed-point (32768)
pub const FIXED_HALF: Fixed = FIXED_ONE >> 1;

/// Whole pixels to fixed-point.
#[inline]
pub const fn px(pixels: i32) -> Fixed {
    pixels << FIXED_SCALE
}

// =============================================================================
// ARENA GEOMETRY
// =============================================================================

/// Tick duration: 1/60 second = round(65536/60) = 1092
pub const TICK_DURATION: Fixed = 1092;

/// Tick period in milliseconds (spawn accumulator and game clock).
pub const TICK_PERIOD_MS: u32 = 16;

/// Visible arena width: 800px
pub const ARENA_WIDTH: Fixed = px(800);

/// Visible arena height: 600px
pub const ARENA_HEIGHT: Fixed = px(600);

/// Player clamp, lower bound on both axes (half the 32px sprite).
pub const PLAYER_BOUND_MIN: Fixed = px(16);

/// Player clamp, upper X bound.
pub const PLAYER_BOUND_MAX_X: Fixed = px(784);

/// Player clamp, upper Y bound.
pub const PLAYER_BOUND_MAX_Y: Fixed = px(584);

/// Distance outside the arena at which enemies spawn.
pub const SPAWN_OFFSET: Fixed = px(50);

/// Enemies further than this outside the arena are culled.
pub const ENEMY_CULL_MARGIN: Fixed = px(100);

/// Bullets further than this outside the arena are culled.
pub const BULLET_CULL_MARGIN: Fixed = px(50);

// =============================================================================
// MOVEMENT AND COMBAT
// =============================================================================

/// Player start position
pub const PLAYER_START_X: Fixed = px(400);

/// Player start position
pub const PLAYER_START_Y: Fixed = px(300);

/// Player base speed: 200 px/s
pub const PLAYER_BASE_SPEED: Fixed = px(200);

/// Player speed gained per level: 25 px/s
pub const PLAYER_SPEED_PER_LEVEL: Fixed = px(25);

/// Player bullet speed: 400 px/s
pub const BULLET_SPEED: Fixed = px(400);

/// Bullet vs enemy hit radius: 20px
pub const BULLET_HIT_RADIUS: Fixed = px(20);

/// Enemy vs player contact radius: 25px
pub const CONTACT_RADIUS: Fixed = px(25);

/// Enemy bullet vs player hit radius: 16px
pub const ENEMY_BULLET_HIT_RADIUS: Fixed = px(16);

/// Basic enemy base speed: 50 px/s
pub const ENEMY_BASE_SPEED: Fixed = px(50);

/// Enemy speed gained per level: 10 px/s
pub const ENEMY_SPEED_PER_LEVEL: Fixed = px(10);

/// Shooter engagement range: 350px
pub const SHOOTER_RANGE: Fixed = px(350);

/// Shooter bullet speed: 350 px/s
pub const SHOOTER_BULLET_SPEED: Fixed = px(350);

/// Boss movement speed: 60 px/s
pub const BOSS_SPEED: Fixed = px(60);

/// Boss fan volley bullet speed: 250 px/s
pub const BOSS_VOLLEY_SPEED: Fixed = px(250);

/// Boss circular burst bullet speed: 180 px/s
pub const BOSS_BURST_SPEED: Fixed = px(180);

/// cos(0.15 rad) = 0.988771 * 65536
pub const COS_FAN_STEP: Fixed = 64800;

/// sin(0.15 rad) = 0.149438 * 65536
pub const SIN_FAN_STEP: Fixed = 9794;

/// cos(2π/24) = 0.965926 * 65536
pub const COS_BURST_STEP: Fixed = 63303;

/// sin(2π/24) = 0.258819 * 65536
pub const SIN_BURST_STEP: Fixed = 16962;

/// Half the multi-shot spread: π/12 rad
pub const HALF_SHOT_SPREAD: Fixed = 17157;

// =============================================================================
// CORE OPERATIONS
// =============================================================================

/// Convert a compile-time float to fixed-point.
///
/// # Warning
/// Only use at compile-time or initialization. NEVER in tick loop.
///
/// # Example
/// ```
/// use monad_hunter::core::fixed::{to_fixed, FIXED_ONE};
/// const MY_VALUE: i32 = to_fixed(2.5);
/// assert_eq!(MY_VALUE, FIXED_ONE * 2 + FIXED_ONE / 2);
/// ```
#[inline]
pub const fn to_fixed(f: f64) -> Fixed {
    (f * (FIXED_ONE as f64)) as Fixed
}

/// Quantize a wire float into fixed-point, rounding to nearest.
///
/// Callers must reject non-finite values first. Out of range values
/// saturate at the `i32` limits.
#[inline]
pub fn quantize(f: f64) -> Fixed {
    (f * FIXED_ONE as f64).round() as Fixed
}

/// Convert fixed-point to float for display/rendering.
///
/// # Warning
/// Only use for visual output. NEVER use result in game logic.
#[inline]
pub fn to_float(f: Fixed) -> f32 {
    f as f32 / FIXED_ONE as f32
}

/// Multiply two fixed-point numbers.
///
/// Uses i64 intermediate to prevent overflow, then truncates.
#[inline]
pub fn fixed_mul(a: Fixed, b: Fixed) -> Fixed {
    let wide = (a as i64) * (b as i64);
    (wide >> FIXED_SCALE) as Fixed
}

/// Cosine and sine of a small angle (radians, |angle| <= π/12).
///
/// Fifth-order Taylor terms; truncation at π/12 stays below one ulp.
pub fn small_angle_cos_sin(angle: Fixed) -> (Fixed, Fixed) {
    let a2 = fixed_mul(angle, angle);
    let a3 = fixed_mul(a2, angle);
    let a4 = fixed_mul(a2, a2);
    let a5 = fixed_mul(a4, angle);
    let cos = FIXED_ONE - a2 / 2 + a4 / 24;
    let sin = angle - a3 / 6 + a5 / 120;
    (cos, sin)
}

/// Clamp a fixed-point number to a range.
#[inline]
pub fn fixed_clamp(value: Fixed, min: Fixed, max: Fixed) -> Fixed {
    value.max(min).min(max)
}

/// Integer square root, rounded down.
///
/// Newton iteration on `u64` starting above the root, so the sequence
/// decreases monotonically and terminates. Same input always takes the
/// same path.
#[inline]
pub fn isqrt_u64(value: u64) -> u64 {
    if value < 2 {
        return value;
    }

    let mut x = value;
    let mut y = value / 2 + 1;
    while y < x {
        x = y;
        y = (x + value / x) >> 1;
    }
    x
}

// =============================================================================
// TESTS
// =============================================================================
