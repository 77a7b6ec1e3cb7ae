use std::sync::Arc;
use std::thread;

use approx::assert_relative_eq;
use traction_core::config::{SimulationSettings, SolvePolicy, TopologyOptions, VehicleConfig};
use traction_core::linsolve::{LinearSolver, SolveMethod};
use traction_core::network::VariableKey;
use traction_core::state::{DefiningState, DriverInput, InputState};
use traction_core::vehicle::{Vehicle, VehicleModel};
use traction_core::Error;

fn full_throttle() -> DriverInput {
    DriverInput {
        throttle: 1.0,
        ..DriverInput::default()
    }
}

fn rolling_vehicle(speed: f64, settings: SimulationSettings) -> Vehicle {
    let config = VehicleConfig::default();
    let radius = config.wheel_radius;
    let mut vehicle = Vehicle::from_config(config, settings).unwrap();
    vehicle
        .set_state(DefiningState::rolling(4, speed, radius))
        .unwrap();
    vehicle
}

#[test]
fn default_network_is_square_and_balanced_at_rest() {
    let model = VehicleModel::new(VehicleConfig::default()).unwrap();
    let system = model.system();
    assert!(system.is_square());
    assert_eq!(system.equation_count(), 60);

    let snapshot = model.snapshot(&InputState::default(), &DefiningState::at_rest(4));
    let (a, b) = model.evaluate(&snapshot);
    let solution = LinearSolver::default().solve(&a, &b).unwrap();
    assert_eq!(solution.method, SolveMethod::Exact);
    assert!(solution.x.iter().all(|v| v.abs() < 1e-12));
}

#[test]
fn full_throttle_from_rest_never_slows_down() {
    let mut vehicle =
        Vehicle::from_config(VehicleConfig::default(), SimulationSettings::default()).unwrap();
    let mut previous = vehicle.state().velocity.x;
    for _ in 0..1000 {
        let report = vehicle.advance(&full_throttle()).unwrap();
        let current = report.state.velocity.x;
        assert!(
            current >= previous - 1e-12,
            "forward velocity dropped from {previous} to {current} at t = {}",
            report.time
        );
        previous = current;
    }
    assert!(previous > 1.0, "expected the car to pick up speed, got {previous}");
    assert!(vehicle.motor_rpm() > 0.0);
}

#[test]
fn straight_line_stays_straight() {
    let mut vehicle =
        Vehicle::from_config(VehicleConfig::default(), SimulationSettings::default()).unwrap();
    for _ in 0..500 {
        vehicle.advance(&full_throttle()).unwrap();
    }
    let state = vehicle.state();
    assert!(state.velocity.y.abs() < 1e-6);
    assert!(state.yaw_rate.abs() < 1e-6);
    assert!(state.position.y.abs() < 1e-6);
    assert!(state.position.x > 0.0);
}

#[test]
fn steering_left_turns_left() {
    let mut vehicle = rolling_vehicle(10.0, SimulationSettings::default());
    let left = DriverInput {
        steering: 0.3,
        ..DriverInput::default()
    };
    for _ in 0..300 {
        vehicle.advance(&left).unwrap();
    }
    assert!(vehicle.state().yaw_rate > 0.0);
    assert!(vehicle.yaw() > 0.0);
    assert!(vehicle.position().y > 0.0);
}

#[test]
fn braking_slows_the_vehicle() {
    let mut vehicle = rolling_vehicle(20.0, SimulationSettings::default());
    let brake = DriverInput {
        brake: 1.0,
        ..DriverInput::default()
    };
    for _ in 0..500 {
        vehicle.advance(&brake).unwrap();
    }
    let speed = vehicle.speed();
    assert!(speed < 19.0, "speed after braking: {speed}");
    assert!(speed > 0.0);
    assert_eq!(vehicle.motor_torque(), 0.0);
}

#[test]
fn instability_warning_does_not_abort_the_step() {
    let settings = SimulationSettings {
        sanity_bound: 1.0,
        ..SimulationSettings::default()
    };
    let mut vehicle = rolling_vehicle(20.0, settings);
    let report = vehicle.advance(&DriverInput::default()).unwrap();
    assert!(report.warnings.iter().any(|w| w.quantity == "v_x"));
    assert!(report
        .warnings
        .iter()
        .any(|w| w.quantity == "wheel_spin[rl]" && w.bound == 1.0));
    assert_relative_eq!(vehicle.time(), 1e-3);
}

#[test]
fn exact_only_policy_surfaces_singular_systems() {
    let settings = SimulationSettings {
        solve_policy: SolvePolicy::ExactOnly,
        condition_threshold: 1.0,
        ..SimulationSettings::default()
    };
    let mut vehicle = Vehicle::from_config(VehicleConfig::default(), settings).unwrap();
    let err = vehicle.advance(&full_throttle()).unwrap_err();
    assert!(matches!(err, Error::SingularSystem { .. }));
    assert_eq!(vehicle.time(), 0.0);
}

#[test]
fn auto_policy_falls_back_to_least_squares() {
    let strict = SimulationSettings {
        condition_threshold: 1.0,
        ..SimulationSettings::default()
    };
    let mut fallback = Vehicle::from_config(VehicleConfig::default(), strict).unwrap();
    let mut exact =
        Vehicle::from_config(VehicleConfig::default(), SimulationSettings::default()).unwrap();
    for _ in 0..20 {
        let report = fallback.advance(&full_throttle()).unwrap();
        assert_eq!(report.solution.method(), SolveMethod::LeastSquares);
        assert!(report.solution.residual_norm() < 1e-6);
        exact.advance(&full_throttle()).unwrap();
    }
    assert_relative_eq!(
        fallback.state().velocity.x,
        exact.state().velocity.x,
        epsilon = 1e-9
    );
    assert_relative_eq!(
        fallback.wheel_spin()[2],
        exact.wheel_spin()[2],
        epsilon = 1e-6
    );
}

#[test]
fn reduced_topologies_run() {
    for (planar_contact, yaw) in [(false, false), (false, true), (true, false)] {
        let config = VehicleConfig {
            topology: TopologyOptions { planar_contact, yaw },
            ..VehicleConfig::default()
        };
        let mut vehicle = Vehicle::from_config(config, SimulationSettings::default()).unwrap();
        let input = DriverInput {
            throttle: 1.0,
            steering: 0.5,
            ..DriverInput::default()
        };
        for _ in 0..200 {
            vehicle.advance(&input).unwrap();
        }
        let state = vehicle.state();
        assert!(state.velocity.x > 0.0);
        if !planar_contact {
            assert_eq!(state.velocity.y, 0.0);
        }
        if !yaw {
            assert_eq!(state.yaw_rate, 0.0);
        }
    }
}

#[test]
fn solved_forces_are_exposed_by_name() {
    let mut vehicle =
        Vehicle::from_config(VehicleConfig::default(), SimulationSettings::default()).unwrap();
    let report = vehicle.advance(&full_throttle()).unwrap();
    let left = report
        .solution
        .value(&VariableKey::force("differential", "shaft_left"))
        .unwrap();
    let right = report
        .solution
        .value(&VariableKey::force("differential", "shaft_right"))
        .unwrap();
    assert_relative_eq!(left, right, epsilon = 1e-9);
    assert!(report
        .solution
        .value(&VariableKey::free("not_in_network"))
        .is_none());

    let computed = vehicle.computed();
    assert_relative_eq!(
        vehicle.motor_force(),
        computed.motor_torque / 0.32 * 12.0,
        epsilon = 1e-9
    );
    assert_eq!(vehicle.gear(), 0);
}

fn run_for(model: Arc<VehicleModel>, input: DriverInput) -> DefiningState {
    let mut vehicle = Vehicle::new(model, SimulationSettings::default()).unwrap();
    for _ in 0..200 {
        vehicle.advance(&input).unwrap();
    }
    vehicle.state().clone()
}

#[test]
fn shared_model_steps_on_separate_threads() {
    let model = Arc::new(VehicleModel::new(VehicleConfig::default()).unwrap());
    let inputs = [
        full_throttle(),
        DriverInput {
            throttle: 0.6,
            steering: -0.4,
            gear: 1,
            ..DriverInput::default()
        },
    ];

    let handles: Vec<_> = inputs
        .iter()
        .map(|&input| {
            let model = Arc::clone(&model);
            thread::spawn(move || run_for(model, input))
        })
        .collect();
    let parallel: Vec<DefiningState> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let sequential: Vec<DefiningState> = inputs
        .iter()
        .map(|&input| run_for(Arc::clone(&model), input))
        .collect();

    assert_eq!(parallel, sequential);
    assert_ne!(parallel[0], parallel[1]);
}
