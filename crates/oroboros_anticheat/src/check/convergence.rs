//! # Aim Convergence
//!
//! Two look rays, one before and one after a movement step, meet (almost)
//! at one point. A human never lands that point on exactly the same spot
//! twice in a row; a locked-on aimbot does, whenever the target stands
//! still.

use super::{Analyzer, Failure, Verdict};
use crate::event::MoveEvent;
use crate::player::PlayerEntityState;
use oroboros_shared::{Ray, Vec3};

/// Eye height above the feet position.
pub const EYE_HEIGHT: f64 = 1.62;

/// Squared distance under which two convergence points are the same point.
pub const CONVERGENCE_EPSILON: f64 = 1e-8;

/// Detects repeated exact look convergence.
#[derive(Clone, Copy, Debug, Default)]
pub struct AimConvergence;

impl Analyzer for AimConvergence {
    fn evaluate(&self, event: &MoveEvent, state: &mut PlayerEntityState) -> Verdict {
        if !event.has_delta_pos() || event.flags.teleported {
            return Verdict::Inconclusive;
        }

        let eye = Vec3::Y * EYE_HEIGHT;
        let pre = Ray::new(event.from.position - state.velocity + eye, event.from.direction());
        let post = Ray::new(event.from.position + eye, event.to.direction());

        let Some((a, b)) = pre.closest_points_between_lines(&post) else {
            // Parallel rays: no convergence point to compare against next time
            state.last_convergence = None;
            return Verdict::Inconclusive;
        };
        let convergence = a.midpoint(b);

        match state.last_convergence.replace(convergence) {
            // One VL deserves an autoban
            Some(last) if last.distance_squared(convergence) < CONVERGENCE_EPSILON => {
                Verdict::Fail(Failure::instant())
            }
            Some(_) => Verdict::Pass,
            None => Verdict::Inconclusive,
        }
    }
}
