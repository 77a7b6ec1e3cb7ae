//! Saturating tire contact friction.

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

/// Friction at one tire contact patch.
///
/// The force magnitude `(1 - e^{-|s|})·μ·N` grows almost linearly for small
/// slip speeds and approaches `μ·N` at large ones, which avoids the jump of
/// Coulomb friction at zero slip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TireFriction {
    /// Kinetic friction coefficient.
    pub mu: f64,
    /// Static normal load carried by the wheel (N).
    pub normal_load: f64,
}

impl TireFriction {
    pub fn new(mu: f64, normal_load: f64) -> Self {
        Self { mu, normal_load }
    }

    /// Vehicle weight shared evenly between all wheels.
    pub fn evenly_loaded(mu: f64, mass: f64, gravity: f64, wheel_count: usize) -> Self {
        Self::new(mu, mass * gravity / wheel_count.max(1) as f64)
    }

    /// Asymptotic force magnitude `μ·N`.
    pub fn saturation(&self) -> f64 {
        self.mu * self.normal_load
    }

    pub fn magnitude(&self, slip_speed: f64) -> f64 {
        -(-slip_speed.abs()).exp_m1() * self.saturation()
    }

    /// Friction force for a contact-patch slip velocity, opposing the slip.
    pub fn force(&self, slip: Vector2<f64>) -> Vector2<f64> {
        let speed = slip.norm();
        if speed == 0.0 {
            return Vector2::zeros();
        }
        -(slip / speed) * self.magnitude(speed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tire() -> TireFriction {
        TireFriction::evenly_loaded(0.6, 1500.0, 9.81, 4)
    }

    #[test]
    fn zero_slip_gives_exactly_zero_force() {
        let f = tire().force(Vector2::zeros());
        assert_eq!(f, Vector2::new(0.0, 0.0));
        assert!(f.iter().all(|v| !v.is_nan()));
    }

    #[test]
    fn force_opposes_slip() {
        let slip = Vector2::new(0.3, -0.4);
        let f = tire().force(slip);
        assert!(f.dot(&slip) < 0.0);
        assert_relative_eq!(f.normalize(), -slip.normalize(), epsilon = 1e-12);
    }

    #[test]
    fn force_stays_below_saturation_and_grows_with_slip() {
        let tire = tire();
        let mut previous = 0.0;
        for i in 1..=300 {
            let speed = i as f64 * 0.1;
            let magnitude = tire.force(Vector2::new(speed * 0.6, speed * 0.8)).norm();
            assert!(magnitude < tire.saturation(), "speed {speed}");
            assert!(magnitude > previous, "speed {speed}");
            previous = magnitude;
        }
    }

    #[test]
    fn small_slip_is_nearly_linear() {
        let tire = tire();
        let slip = 1e-6;
        let magnitude = tire.force(Vector2::new(slip, 0.0)).norm();
        assert_relative_eq!(magnitude / slip, tire.saturation(), max_relative = 1e-5);
    }

    #[test]
    fn even_loading_splits_weight() {
        let tire = tire();
        assert_relative_eq!(tire.normal_load, 1500.0 * 9.81 / 4.0);
        assert_relative_eq!(tire.saturation(), 0.6 * 1500.0 * 9.81 / 4.0);
    }
}
