//! Explicit force laws of the drivetrain: motor torque curve, brakes,
//! differential speed averaging and aerodynamic drag.

use std::f64::consts::PI;

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

const RAD_PER_S_TO_RPM: f64 = 60.0 / (2.0 * PI);

/// Full-throttle torque curve `(1 - x)(x + 0.5)²·2·T_max`, `x = rpm / rpm_max`.
///
/// Peaks at `T_max` at half the rated speed and falls to zero at `max_rpm`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotorCurve {
    pub max_torque: f64,
    pub max_rpm: f64,
}

impl MotorCurve {
    pub fn new(max_torque: f64, max_rpm: f64) -> Self {
        Self {
            max_torque,
            max_rpm,
        }
    }

    /// Motor torque for a throttle in `[0, 1]` at the given speed.
    ///
    /// Zero at and beyond `max_rpm`. Reverse rotation is evaluated like
    /// standstill.
    pub fn torque(&self, throttle: f64, rpm: f64) -> f64 {
        if rpm >= self.max_rpm {
            return 0.0;
        }
        let x = rpm.max(0.0) / self.max_rpm;
        throttle * (1.0 - x) * (x + 0.5).powi(2) * 2.0 * self.max_torque
    }
}

/// Brake torque on one wheel, always opposing its current rotation.
///
/// A wheel at rest receives no brake torque.
pub fn brake_torque(pedal: f64, max_braking_torque: f64, wheel_speed: f64) -> f64 {
    if wheel_speed == 0.0 {
        return 0.0;
    }
    -pedal * max_braking_torque * wheel_speed.signum()
}

/// Motor speed seen through an open differential and the engaged gear.
pub fn motor_rpm(gear_ratio: f64, left_wheel_speed: f64, right_wheel_speed: f64) -> f64 {
    0.5 * (left_wheel_speed + right_wheel_speed) * gear_ratio * RAD_PER_S_TO_RPM
}

/// Quadratic drag `-½·ρ·C_d·A·|v|·v`.
pub fn aero_drag(air_density: f64, drag_coefficient: f64, frontal_area: f64, velocity: Vector2<f64>) -> Vector2<f64> {
    -0.5 * air_density * drag_coefficient * frontal_area * velocity.norm() * velocity
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn standstill_torque_is_half_peak() {
        let motor = MotorCurve::new(500.0, 8000.0);
        for throttle in [0.0, 0.25, 0.5, 1.0] {
            assert_relative_eq!(motor.torque(throttle, 0.0), throttle * 0.25 * 2.0 * 500.0);
        }
    }

    #[test]
    fn torque_vanishes_at_and_beyond_max_rpm() {
        let motor = MotorCurve::new(500.0, 8000.0);
        for throttle in [0.0, 0.3, 1.0] {
            assert_eq!(motor.torque(throttle, 8000.0), 0.0);
            assert_eq!(motor.torque(throttle, 9500.0), 0.0);
        }
    }

    #[test]
    fn torque_peaks_at_half_speed() {
        let motor = MotorCurve::new(500.0, 8000.0);
        assert_relative_eq!(motor.torque(1.0, 4000.0), 500.0);
        assert!(motor.torque(1.0, 3000.0) < 500.0);
        assert!(motor.torque(1.0, 5000.0) < 500.0);
    }

    #[test]
    fn brakes_oppose_rotation_and_release_at_rest() {
        assert_eq!(brake_torque(1.0, 4000.0, 12.0), -4000.0);
        assert_eq!(brake_torque(0.5, 4000.0, -3.0), 2000.0);
        assert_eq!(brake_torque(1.0, 4000.0, 0.0), 0.0);
    }

    #[test]
    fn differential_averages_wheel_speeds() {
        let rpm = motor_rpm(12.0, 10.0, 20.0);
        assert_relative_eq!(rpm, 15.0 * 12.0 * 60.0 / (2.0 * PI));
    }

    #[test]
    fn drag_opposes_velocity_quadratically() {
        let d1 = aero_drag(1.2, 0.4, 2.2, Vector2::new(10.0, 0.0));
        let d2 = aero_drag(1.2, 0.4, 2.2, Vector2::new(20.0, 0.0));
        assert!(d1.x < 0.0);
        assert_eq!(d1.y, 0.0);
        assert_relative_eq!(d2.x / d1.x, 4.0);
    }
}
