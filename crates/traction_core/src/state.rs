//! Vehicle state, split by ownership.
//!
//! - `InputState`: driver commands, clamped once per step and read-only
//!   during it.
//! - `DefiningState`: integrated positions and velocities. Only the
//!   integrator writes it.
//! - `ComputedState`: forces and torques rederived from the other two at
//!   every evaluation, never carried over between steps.
//!
//! `RuntimeState` is the merged snapshot derived network coefficients read.

use std::f64::consts::FRAC_PI_4;

use nalgebra::{Rotation2, Vector2};
use serde::{Deserialize, Serialize};

/// Largest road-wheel steering angle (rad), reached at full lock.
pub const MAX_STEERING_ANGLE: f64 = FRAC_PI_4;

/// Raw driver commands as supplied by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DriverInput {
    pub throttle: f64,
    pub brake: f64,
    /// Normalized steering in `[-1, 1]`, positive to the left.
    pub steering: f64,
    pub gear: i64,
}

/// Clamped driver commands in physical units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct InputState {
    pub throttle: f64,
    pub brake: f64,
    /// Road-wheel angle of steered wheels (rad).
    pub steering_angle: f64,
    pub gear: usize,
}

impl InputState {
    pub fn from_driver(input: &DriverInput, gear_count: usize) -> Self {
        let top_gear = gear_count.saturating_sub(1) as i64;
        Self {
            throttle: clamp_or_zero(input.throttle, 0.0, 1.0),
            brake: clamp_or_zero(input.brake, 0.0, 1.0),
            steering_angle: clamp_or_zero(input.steering, -1.0, 1.0) * MAX_STEERING_ANGLE,
            gear: input.gear.clamp(0, top_gear) as usize,
        }
    }
}

fn clamp_or_zero(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(min, max)
    }
}

/// Integrated state of one vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefiningState {
    /// World-frame position of the centre of gravity (m).
    pub position: Vector2<f64>,
    /// Heading, counter-clockwise from the world x axis (rad).
    pub yaw: f64,
    /// Body-frame velocity: x forward, y to the left (m/s).
    pub velocity: Vector2<f64>,
    pub yaw_rate: f64,
    /// Wheel spin rates, in wheel-layout order (rad/s).
    pub wheel_spin: Vec<f64>,
}

impl DefiningState {
    /// Length of the position vector `[x, y, yaw]`.
    pub const POSITION_DIM: usize = 3;

    pub fn at_rest(wheel_count: usize) -> Self {
        Self {
            position: Vector2::zeros(),
            yaw: 0.0,
            velocity: Vector2::zeros(),
            yaw_rate: 0.0,
            wheel_spin: vec![0.0; wheel_count],
        }
    }

    /// Straight-line motion at `speed` with every wheel rolling freely.
    pub fn rolling(wheel_count: usize, speed: f64, wheel_radius: f64) -> Self {
        Self {
            velocity: Vector2::new(speed, 0.0),
            wheel_spin: vec![speed / wheel_radius; wheel_count],
            ..Self::at_rest(wheel_count)
        }
    }

    /// Length of the velocity vector `[v_x, v_y, yaw_rate, ω_0, ..]`.
    pub fn velocity_dim(&self) -> usize {
        3 + self.wheel_spin.len()
    }

    pub fn from_vectors(q: &[f64], v: &[f64]) -> Self {
        Self {
            position: Vector2::new(q[0], q[1]),
            yaw: q[2],
            velocity: Vector2::new(v[0], v[1]),
            yaw_rate: v[2],
            wheel_spin: v[3..].to_vec(),
        }
    }

    pub fn positions(&self) -> [f64; 3] {
        [self.position.x, self.position.y, self.yaw]
    }

    pub fn velocities(&self) -> Vec<f64> {
        let mut v = Vec::with_capacity(self.velocity_dim());
        v.extend_from_slice(&[self.velocity.x, self.velocity.y, self.yaw_rate]);
        v.extend_from_slice(&self.wheel_spin);
        v
    }

    pub fn speed(&self) -> f64 {
        self.velocity.norm()
    }

    pub fn world_velocity(&self) -> Vector2<f64> {
        Rotation2::new(self.yaw) * self.velocity
    }
}

/// Per-wheel quantities derived at one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WheelForces {
    pub steer_angle: f64,
    pub brake_torque: f64,
    /// Contact-patch velocity relative to the ground, wheel frame.
    pub slip: Vector2<f64>,
    /// Ground friction on the tire, wheel frame (x along the wheel heading).
    pub friction: Vector2<f64>,
}

/// Forces and torques rederived every evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedState {
    pub gear_ratio: f64,
    pub motor_rpm: f64,
    pub motor_torque: f64,
    /// Aerodynamic drag on the body, body frame.
    pub drag: Vector2<f64>,
    pub wheels: Vec<WheelForces>,
}

/// Merged snapshot read by derived network coefficients.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeState {
    pub input: InputState,
    pub defining: DefiningState,
    pub computed: ComputedState,
}
