//! Vehicle and simulation parameters.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::drivetrain::MotorCurve;
use crate::friction::TireFriction;
use crate::solvers::IntegrationScheme;

/// One wheel of the layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WheelSpec {
    pub name: String,
    /// Hub position in the body frame, x forward and y left (m).
    pub position: [f64; 2],
    pub steered: bool,
    /// Driven wheels hang off the differential; exactly two are required.
    pub driven: bool,
}

impl WheelSpec {
    pub fn new(name: &str, x: f64, y: f64, steered: bool, driven: bool) -> Self {
        Self {
            name: name.to_string(),
            position: [x, y],
            steered,
            driven,
        }
    }
}

/// Degrees of freedom included in the vehicle network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyOptions {
    /// Lateral contact forces and lateral body motion.
    pub planar_contact: bool,
    /// Yaw moment balance and yaw motion.
    pub yaw: bool,
}

impl Default for TopologyOptions {
    fn default() -> Self {
        Self {
            planar_contact: true,
            yaw: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    /// kg
    pub mass: f64,
    /// kg·m²
    pub yaw_inertia: f64,
    pub gravity: f64,

    pub wheel_radius: f64,
    /// Spin inertia of one wheel (kg·m²).
    pub wheel_inertia: f64,
    pub wheels: Vec<WheelSpec>,

    pub gear_ratios: Vec<f64>,
    pub motor_max_torque: f64,
    pub motor_max_rpm: f64,
    pub motor_inertia: f64,

    /// Per wheel, at full pedal (N·m).
    pub max_braking_torque: f64,
    pub friction_coefficient: f64,

    pub drag_coefficient: f64,
    pub frontal_area: f64,
    pub air_density: f64,

    pub topology: TopologyOptions,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        let half_base = 3.6 / 2.0;
        let half_track = 1.8 / 2.0;
        Self {
            mass: 1500.0,
            yaw_inertia: 1500.0 * (4.8 * 4.8 + 1.8 * 1.8) / 12.0,
            gravity: 9.81,
            wheel_radius: 0.32,
            wheel_inertia: 1.0,
            wheels: vec![
                WheelSpec::new("fl", half_base, half_track, true, false),
                WheelSpec::new("fr", half_base, -half_track, true, false),
                WheelSpec::new("rl", -half_base, half_track, false, true),
                WheelSpec::new("rr", -half_base, -half_track, false, true),
            ],
            gear_ratios: (1..=6).map(|k| 12.0 / k as f64).collect(),
            motor_max_torque: 500.0,
            motor_max_rpm: 8000.0,
            motor_inertia: 0.1,
            max_braking_torque: 4000.0,
            friction_coefficient: 0.6,
            drag_coefficient: 0.4,
            frontal_area: 2.2,
            air_density: 1.225,
            topology: TopologyOptions::default(),
        }
    }
}

impl VehicleConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("mass", self.mass),
            ("yaw_inertia", self.yaw_inertia),
            ("gravity", self.gravity),
            ("wheel_radius", self.wheel_radius),
            ("wheel_inertia", self.wheel_inertia),
            ("motor_max_torque", self.motor_max_torque),
            ("motor_max_rpm", self.motor_max_rpm),
            ("motor_inertia", self.motor_inertia),
        ] {
            if !(value > 0.0 && value.is_finite()) {
                bail!("{} must be positive and finite, got {}.", name, value);
            }
        }
        for (name, value) in [
            ("max_braking_torque", self.max_braking_torque),
            ("friction_coefficient", self.friction_coefficient),
            ("drag_coefficient", self.drag_coefficient),
            ("frontal_area", self.frontal_area),
            ("air_density", self.air_density),
        ] {
            if !(value >= 0.0 && value.is_finite()) {
                bail!("{} must be non-negative and finite, got {}.", name, value);
            }
        }
        if self.gear_ratios.is_empty() {
            bail!("At least one gear ratio is required.");
        }
        if let Some(ratio) = self.gear_ratios.iter().find(|r| !(**r > 0.0 && r.is_finite())) {
            bail!("Gear ratios must be positive and finite, got {}.", ratio);
        }
        if self.wheels.is_empty() {
            bail!("At least one wheel is required.");
        }
        for (i, wheel) in self.wheels.iter().enumerate() {
            if wheel.name.is_empty() {
                bail!("Wheel {} has an empty name.", i);
            }
            if self.wheels[..i].iter().any(|w| w.name == wheel.name) {
                bail!("Duplicate wheel name '{}'.", wheel.name);
            }
            if wheel.position.iter().any(|p| !p.is_finite()) {
                bail!("Wheel '{}' has a non-finite position.", wheel.name);
            }
        }
        self.driven_pair()?;
        Ok(())
    }

    /// Indices of the (left, right) driven wheels; left has the larger y.
    pub fn driven_pair(&self) -> Result<(usize, usize)> {
        let driven: Vec<usize> = self
            .wheels
            .iter()
            .enumerate()
            .filter(|(_, w)| w.driven)
            .map(|(i, _)| i)
            .collect();
        if driven.len() != 2 {
            bail!(
                "The open differential needs exactly two driven wheels, got {}.",
                driven.len()
            );
        }
        let (a, b) = (driven[0], driven[1]);
        if self.wheels[a].position[1] >= self.wheels[b].position[1] {
            Ok((a, b))
        } else {
            Ok((b, a))
        }
    }

    pub fn gear_count(&self) -> usize {
        self.gear_ratios.len()
    }

    /// Ratio of `gear`, clamped to the available gears.
    pub fn gear_ratio(&self, gear: usize) -> f64 {
        let top = self.gear_ratios.len().saturating_sub(1);
        self.gear_ratios.get(gear.min(top)).copied().unwrap_or(1.0)
    }

    pub fn motor(&self) -> MotorCurve {
        MotorCurve::new(self.motor_max_torque, self.motor_max_rpm)
    }

    pub fn tire(&self) -> TireFriction {
        TireFriction::evenly_loaded(
            self.friction_coefficient,
            self.mass,
            self.gravity,
            self.wheels.len(),
        )
    }
}

/// How the per-step linear system is solved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SolvePolicy {
    /// Exact when well-posed, least squares otherwise.
    #[default]
    Auto,
    /// Surface singular systems as errors.
    ExactOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// Default step size for `Vehicle::advance` (s).
    pub dt: f64,
    pub scheme: IntegrationScheme,
    pub solve_policy: SolvePolicy,
    pub condition_threshold: f64,
    /// Tracked velocities beyond this magnitude raise an instability warning.
    pub sanity_bound: f64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            dt: 1e-3,
            scheme: IntegrationScheme::default(),
            solve_policy: SolvePolicy::default(),
            condition_threshold: 1e12,
            sanity_bound: 1e4,
        }
    }
}

impl SimulationSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.dt > 0.0 && self.dt.is_finite()) {
            bail!("dt must be positive and finite, got {}.", self.dt);
        }
        if !(self.condition_threshold >= 1.0) {
            bail!(
                "condition_threshold must be at least 1, got {}.",
                self.condition_threshold
            );
        }
        if !(self.sanity_bound > 0.0) {
            bail!("sanity_bound must be positive, got {}.", self.sanity_bound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_err_contains<T: std::fmt::Debug>(result: Result<T>, needle: &str) {
        let err = result.expect_err("expected error");
        let message = format!("{err}");
        assert!(
            message.contains(needle),
            "expected error to contain \"{needle}\", got \"{message}\""
        );
    }

    #[test]
    fn defaults_are_valid() {
        let config = VehicleConfig::default();
        config.validate().unwrap();
        SimulationSettings::default().validate().unwrap();
        assert_eq!(config.gear_count(), 6);
        assert_eq!(config.gear_ratios[0], 12.0);
        assert_eq!(config.gear_ratios[5], 2.0);
    }

    #[test]
    fn driven_pair_orders_left_first() {
        let config = VehicleConfig::default();
        assert_eq!(config.driven_pair().unwrap(), (2, 3));

        let mut swapped = config.clone();
        swapped.wheels.swap(2, 3);
        assert_eq!(swapped.driven_pair().unwrap(), (3, 2));
    }

    #[test]
    fn rejects_wrong_number_of_driven_wheels() {
        let mut config = VehicleConfig::default();
        config.wheels[0].driven = true;
        assert_err_contains(config.validate(), "exactly two driven wheels");
    }

    #[test]
    fn rejects_bad_parameters() {
        let mut config = VehicleConfig::default();
        config.mass = 0.0;
        assert_err_contains(config.validate(), "mass must be positive");

        let mut config = VehicleConfig::default();
        config.gear_ratios.push(-1.0);
        assert_err_contains(config.validate(), "Gear ratios");

        let mut config = VehicleConfig::default();
        config.wheels[1].name = "fl".to_string();
        assert_err_contains(config.validate(), "Duplicate wheel name");

        let settings = SimulationSettings {
            dt: 0.0,
            ..SimulationSettings::default()
        };
        assert_err_contains(settings.validate(), "dt must be positive");
    }

    #[test]
    fn gear_ratio_lookup_is_clamped() {
        let config = VehicleConfig::default();
        assert_eq!(config.gear_ratio(2), 4.0);
        assert_eq!(config.gear_ratio(42), 2.0);
    }
}
