//! # Inertia
//!
//! While airborne, horizontal momentum may only bleed off along the
//! friction curve and may not turn. Anything else means the client is
//! steering in mid-air.

use super::{Analyzer, Failure, Verdict};
use crate::event::MoveEvent;
use crate::player::PlayerEntityState;

/// Airborne horizontal friction per tick.
pub const AIR_FRICTION: f64 = 0.91;

/// Friction two ticks after leaving ground (one-tick client deceleration quirk).
pub const TAKEOFF_FRICTION: f64 = 0.546;

/// Tolerance subtracted from the expected speed.
pub const SPEED_EPSILON: f64 = 0.026_001;

/// Speed multiplier when a slowdown applied this step.
pub const SLOWDOWN_FACTOR: f64 = 0.6;

/// Largest allowed horizontal turn per tick (radians).
pub const MAX_TURN: f64 = 0.2;

/// Horizontal speed² above which turning is checked.
const MIN_TURN_SPEED_SQUARED: f64 = 0.05;

/// Previous horizontal speed² above which deceleration is checked.
const MIN_PREV_SPEED_SQUARED: f64 = 0.01;

/// Validates airborne horizontal deceleration.
#[derive(Clone, Copy, Debug, Default)]
pub struct Inertia;

impl Inertia {
    /// Minimum horizontal speed expected after one airborne tick.
    #[must_use]
    pub fn speed_threshold(prev_speed: f64, ticks_since_ground: u64, slowdown: bool, liquid: bool) -> f64 {
        if liquid {
            return 0.0;
        }
        let prev_speed = if slowdown { prev_speed * SLOWDOWN_FACTOR } else { prev_speed };
        let friction = if ticks_since_ground == 2 { TAKEOFF_FRICTION } else { AIR_FRICTION };
        friction * prev_speed - SPEED_EPSILON
    }
}

impl Analyzer for Inertia {
    fn evaluate(&self, event: &MoveEvent, state: &mut PlayerEntityState) -> Verdict {
        let flags = &event.flags;
        let exempt = state.is_first_observation()
            || flags.solid_near_feet
            || flags.solid_near_head
            || event.was_on_ground
            || state.on_ground
            || event.on_ground
            || flags.accepted_knockback
            || flags.touching_blocks
            || flags.flying
            || flags.in_vehicle;
        if exempt {
            return Verdict::Inconclusive;
        }

        let movement = event.delta().horizontal();
        let previous = state.velocity.horizontal();

        let threshold = Self::speed_threshold(
            previous.length(),
            state.ticks_since_ground(),
            flags.hit_slowdown,
            flags.liquid_near_feet || flags.liquid_near_head,
        );

        let turned = movement.length_squared() > MIN_TURN_SPEED_SQUARED && movement.angle(previous) > MAX_TURN;
        let braked = previous.length_squared() > MIN_PREV_SPEED_SQUARED && movement.length() < threshold;

        if turned || braked {
            Verdict::Fail(Failure::resync(event.from))
        } else {
            Verdict::Pass
        }
    }
}
