//! Per-step orchestration for one vehicle.
//!
//! `VehicleModel` holds everything fixed at construction: the parameters
//! and the symbolic network. It is shared read-only through an `Arc`, so
//! any number of `Vehicle` instances can step it concurrently. Each
//! `Vehicle` owns its integrator and state.
//!
//! One step recomputes the computed state from the defining state and the
//! clamped inputs, evaluates and solves the network, and hands the
//! resulting accelerations to the integrator.

use std::fmt;
use std::sync::Arc;

use anyhow::Context;
use log::{trace, warn};
use nalgebra::{DMatrix, DVector, Rotation2, Vector2};

use crate::config::{SimulationSettings, SolvePolicy, VehicleConfig};
use crate::drivetrain::{self, MotorCurve};
use crate::error::{Error, Result};
use crate::friction::TireFriction;
use crate::linsolve::{LinearSolver, Solution, SolveMethod};
use crate::network::{SymbolicSystem, VarId, VariableKey};
use crate::solvers::Integrator;
use crate::state::{ComputedState, DefiningState, DriverInput, InputState, RuntimeState, WheelForces};
use crate::topology::{build_vehicle_graph, wheel_component, BODY};
use crate::traits::{MechanicalSystem, Steppable};

/// Registry positions of the accelerations the integrator consumes.
#[derive(Debug, Clone)]
struct AccelerationLayout {
    longitudinal: VarId,
    lateral: Option<VarId>,
    yaw: Option<VarId>,
    wheels: Vec<VarId>,
}

/// Immutable vehicle description: parameters plus the assembled network.
pub struct VehicleModel {
    config: VehicleConfig,
    system: SymbolicSystem<RuntimeState>,
    motor: MotorCurve,
    tire: TireFriction,
    /// Left and right driven wheel indices.
    driven: (usize, usize),
    layout: AccelerationLayout,
}

impl VehicleModel {
    pub fn new(config: VehicleConfig) -> anyhow::Result<Self> {
        config.validate().context("Invalid vehicle configuration.")?;
        let graph = build_vehicle_graph(&config)?;
        let system = graph
            .build_symbolic()
            .context("Failed to assemble the vehicle network.")?;
        if !system.is_square() {
            anyhow::bail!(
                "Vehicle network has {} equations for {} unknowns.",
                system.equation_count(),
                system.variable_count()
            );
        }

        let registry = system.registry();
        let layout = AccelerationLayout {
            longitudinal: registry.resolve(&VariableKey::acc(BODY, "cg_x"))?,
            lateral: registry.get(&VariableKey::acc(BODY, "cg_y")),
            yaw: registry.get(&VariableKey::acc(BODY, "yaw")),
            wheels: config
                .wheels
                .iter()
                .map(|w| registry.resolve(&VariableKey::acc(wheel_component(&w.name), "axle")))
                .collect::<Result<Vec<_>>>()?,
        };

        Ok(Self {
            motor: config.motor(),
            tire: config.tire(),
            driven: config.driven_pair()?,
            config,
            system,
            layout,
        })
    }

    pub fn config(&self) -> &VehicleConfig {
        &self.config
    }

    pub fn system(&self) -> &SymbolicSystem<RuntimeState> {
        &self.system
    }

    pub fn tire(&self) -> &TireFriction {
        &self.tire
    }

    pub fn wheel_count(&self) -> usize {
        self.config.wheels.len()
    }

    /// Derives forces and torques from the defining state and inputs.
    pub fn compute(&self, input: &InputState, state: &DefiningState) -> ComputedState {
        let config = &self.config;
        let planar = config.topology.planar_contact;
        let spin = |i: usize| state.wheel_spin.get(i).copied().unwrap_or(0.0);

        let gear_ratio = config.gear_ratio(input.gear);
        let (left, right) = self.driven;
        let motor_rpm = drivetrain::motor_rpm(gear_ratio, spin(left), spin(right));
        let motor_torque = self.motor.torque(input.throttle, motor_rpm);

        let mut drag = drivetrain::aero_drag(
            config.air_density,
            config.drag_coefficient,
            config.frontal_area,
            state.velocity,
        );
        if !planar {
            drag.y = 0.0;
        }

        let r = state.yaw_rate;
        let wheels = config
            .wheels
            .iter()
            .enumerate()
            .map(|(i, wheel)| {
                let steer_angle = if wheel.steered { input.steering_angle } else { 0.0 };
                let [px, py] = wheel.position;
                let hub = Vector2::new(state.velocity.x - r * py, state.velocity.y + r * px);
                let local = Rotation2::new(-steer_angle) * hub;
                let lateral = if planar { local.y } else { 0.0 };
                let slip = Vector2::new(local.x - spin(i) * config.wheel_radius, lateral);
                WheelForces {
                    steer_angle,
                    brake_torque: drivetrain::brake_torque(input.brake, config.max_braking_torque, spin(i)),
                    slip,
                    friction: self.tire.force(slip),
                }
            })
            .collect();

        ComputedState {
            gear_ratio,
            motor_rpm,
            motor_torque,
            drag,
            wheels,
        }
    }

    /// Merged snapshot for evaluating the network.
    pub fn snapshot(&self, input: &InputState, state: &DefiningState) -> RuntimeState {
        RuntimeState {
            input: *input,
            defining: state.clone(),
            computed: self.compute(input, state),
        }
    }

    pub fn evaluate(&self, state: &RuntimeState) -> (DMatrix<f64>, DVector<f64>) {
        self.system.evaluate(state)
    }

    fn check_state(&self, state: &DefiningState) -> Result<()> {
        if state.wheel_spin.len() != self.wheel_count() {
            return Err(Error::DimensionMismatch {
                context: "wheel spin rates",
                expected: self.wheel_count(),
                actual: state.wheel_spin.len(),
            });
        }
        Ok(())
    }

    fn scatter_accelerations(&self, x: &DVector<f64>, out: &mut [f64]) {
        let layout = &self.layout;
        out[0] = x[layout.longitudinal.index()];
        out[1] = layout.lateral.map_or(0.0, |id| x[id.index()]);
        out[2] = layout.yaw.map_or(0.0, |id| x[id.index()]);
        for (slot, id) in out[3..].iter_mut().zip(&layout.wheels) {
            *slot = x[id.index()];
        }
    }
}

impl fmt::Debug for VehicleModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VehicleModel")
            .field("config", &self.config)
            .field("equations", &self.system.equation_count())
            .field("variables", &self.system.variable_count())
            .finish()
    }
}

/// Data from one network evaluation.
struct Evaluation {
    computed: ComputedState,
    solution: Solution,
}

/// The vehicle network as a mechanical system for one step's inputs.
struct Dynamics<'a> {
    model: &'a VehicleModel,
    input: &'a InputState,
    solver: &'a LinearSolver,
    policy: SolvePolicy,
}

impl MechanicalSystem for Dynamics<'_> {
    type Report = Evaluation;

    fn position_dim(&self) -> usize {
        DefiningState::POSITION_DIM
    }

    fn velocity_dim(&self) -> usize {
        3 + self.model.wheel_count()
    }

    fn accelerations(&self, _t: f64, q: &[f64], v: &[f64], out: &mut [f64]) -> Result<Evaluation> {
        let state = self.model.snapshot(self.input, &DefiningState::from_vectors(q, v));
        let (a, b) = self.model.evaluate(&state);
        let solution = match self.policy {
            SolvePolicy::Auto => self.solver.solve(&a, &b)?,
            SolvePolicy::ExactOnly => {
                let x = self.solver.solve_exact(&a, &b)?;
                let residual_norm = (&a * &x - &b).norm();
                Solution {
                    x,
                    method: SolveMethod::Exact,
                    residual_norm,
                }
            }
        };
        self.model.scatter_accelerations(&solution.x, out);
        Ok(Evaluation {
            computed: state.computed,
            solution,
        })
    }

    fn position_rates(&self, q: &[f64], v: &[f64], out: &mut [f64]) {
        let world = Rotation2::new(q[2]) * Vector2::new(v[0], v[1]);
        out[0] = world.x;
        out[1] = world.y;
        out[2] = v[2];
    }
}

/// Solved network values with their registry.
#[derive(Debug, Clone)]
pub struct SolvedNetwork {
    model: Arc<VehicleModel>,
    solution: Solution,
}

impl SolvedNetwork {
    /// Solved value of a network variable, `None` if the network has no such variable.
    pub fn value(&self, key: &VariableKey) -> Option<f64> {
        self.model
            .system
            .registry()
            .get(key)
            .map(|id| self.solution.x[id.index()])
    }

    pub fn values(&self) -> &DVector<f64> {
        &self.solution.x
    }

    pub fn method(&self) -> SolveMethod {
        self.solution.method
    }

    pub fn residual_norm(&self) -> f64 {
        self.solution.residual_norm
    }
}

/// A tracked magnitude beyond the sanity bound; the step itself still completed.
#[derive(Debug, Clone, PartialEq)]
pub struct InstabilityWarning {
    pub quantity: String,
    pub value: f64,
    pub bound: f64,
}

impl fmt::Display for InstabilityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} = {:e} exceeds sanity bound {:e}; integration may be diverging",
            self.quantity, self.value, self.bound
        )
    }
}

#[derive(Debug, Clone)]
pub struct StepReport {
    /// Time at the end of the step.
    pub time: f64,
    pub state: DefiningState,
    /// Forces the step was integrated with.
    pub computed: ComputedState,
    pub solution: SolvedNetwork,
    pub warnings: Vec<InstabilityWarning>,
}

/// One simulated vehicle.
pub struct Vehicle {
    model: Arc<VehicleModel>,
    settings: SimulationSettings,
    solver: LinearSolver,
    integrator: Integrator,
    defining: DefiningState,
    input: InputState,
    computed: ComputedState,
    time: f64,
}

impl Vehicle {
    /// A vehicle at rest at the origin.
    pub fn new(model: Arc<VehicleModel>, settings: SimulationSettings) -> anyhow::Result<Self> {
        settings.validate().context("Invalid simulation settings.")?;
        let defining = DefiningState::at_rest(model.wheel_count());
        let input = InputState::default();
        let computed = model.compute(&input, &defining);
        Ok(Self {
            solver: LinearSolver::new(settings.condition_threshold),
            integrator: settings
                .scheme
                .build(DefiningState::POSITION_DIM, defining.velocity_dim()),
            model,
            settings,
            defining,
            input,
            computed,
            time: 0.0,
        })
    }

    pub fn from_config(config: VehicleConfig, settings: SimulationSettings) -> anyhow::Result<Self> {
        Self::new(Arc::new(VehicleModel::new(config)?), settings)
    }

    pub fn model(&self) -> &Arc<VehicleModel> {
        &self.model
    }

    pub fn settings(&self) -> &SimulationSettings {
        &self.settings
    }

    pub fn set_state(&mut self, state: DefiningState) -> Result<()> {
        self.model.check_state(&state)?;
        self.computed = self.model.compute(&self.input, &state);
        self.defining = state;
        Ok(())
    }

    /// Advances by `dt` under `driver`.
    ///
    /// On error the state is left as it was before the call.
    pub fn step(&mut self, dt: f64, driver: &DriverInput) -> Result<StepReport> {
        if !(dt > 0.0 && dt.is_finite()) {
            return Err(Error::InvalidTimeStep(dt));
        }
        let input = InputState::from_driver(driver, self.model.config.gear_count());
        let dynamics = Dynamics {
            model: &self.model,
            input: &input,
            solver: &self.solver,
            policy: self.settings.solve_policy,
        };

        let mut t = self.time;
        let mut q = self.defining.positions();
        let mut v = self.defining.velocities();
        let evaluation = self.integrator.step(&dynamics, &mut t, &mut q, &mut v, dt)?;

        self.time = t;
        self.input = input;
        self.defining = DefiningState::from_vectors(&q, &v);
        self.computed = self.model.compute(&self.input, &self.defining);

        let warnings = self.check_bounds();
        for warning in &warnings {
            warn!("t = {:.4}: {}", self.time, warning);
        }
        trace!(
            "t = {:.4}: speed {:.3} m/s, yaw rate {:.4} rad/s, motor {:.0} rpm, {:?} solve (residual {:e})",
            self.time,
            self.defining.speed(),
            self.defining.yaw_rate,
            self.computed.motor_rpm,
            evaluation.solution.method,
            evaluation.solution.residual_norm
        );

        Ok(StepReport {
            time: self.time,
            state: self.defining.clone(),
            computed: evaluation.computed,
            solution: SolvedNetwork {
                model: Arc::clone(&self.model),
                solution: evaluation.solution,
            },
            warnings,
        })
    }

    /// Steps by the configured `dt`.
    pub fn advance(&mut self, driver: &DriverInput) -> Result<StepReport> {
        self.step(self.settings.dt, driver)
    }

    fn check_bounds(&self) -> Vec<InstabilityWarning> {
        let bound = self.settings.sanity_bound;
        let state = &self.defining;
        let mut tracked = vec![
            ("v_x".to_string(), state.velocity.x),
            ("v_y".to_string(), state.velocity.y),
            ("yaw_rate".to_string(), state.yaw_rate),
        ];
        tracked.extend(
            self.model
                .config
                .wheels
                .iter()
                .zip(&state.wheel_spin)
                .map(|(wheel, &spin)| (format!("wheel_spin[{}]", wheel.name), spin)),
        );
        tracked
            .into_iter()
            .filter(|(_, value)| !(value.abs() <= bound))
            .map(|(quantity, value)| InstabilityWarning {
                quantity,
                value,
                bound,
            })
            .collect()
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn state(&self) -> &DefiningState {
        &self.defining
    }

    pub fn input(&self) -> &InputState {
        &self.input
    }

    pub fn computed(&self) -> &ComputedState {
        &self.computed
    }

    pub fn speed(&self) -> f64 {
        self.defining.speed()
    }

    pub fn position(&self) -> Vector2<f64> {
        self.defining.position
    }

    pub fn yaw(&self) -> f64 {
        self.defining.yaw
    }

    pub fn wheel_spin(&self) -> &[f64] {
        &self.defining.wheel_spin
    }

    pub fn gear(&self) -> usize {
        self.input.gear
    }

    pub fn motor_rpm(&self) -> f64 {
        self.computed.motor_rpm
    }

    pub fn motor_torque(&self) -> f64 {
        self.computed.motor_torque
    }

    /// Tractive force the motor torque corresponds to at the road.
    pub fn motor_force(&self) -> f64 {
        self.computed.motor_torque / self.model.config.wheel_radius * self.computed.gear_ratio
    }
}
