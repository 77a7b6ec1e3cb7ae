//! The vehicle as an equation network.
//!
//! Sign convention: a port force is the force or torque exerted *on* the
//! owning component through that port. Solid connections therefore pair
//! equal accelerations with opposite forces.
//!
//! Components and their ports:
//!
//! - `motor`: `input` (drive torque), `shaft_out`
//! - `gearbox`: `shaft_in`, `shaft_out`
//! - `differential`: `shaft_in`, `shaft_left`, `shaft_right`
//! - `wheel_<name>`: `brake`, `axle`, `contact_long`, `contact_lat`,
//!   `mount_x`, `mount_y`
//! - `body`: `cg_x`, `cg_y`, `yaw`, and `<name>_x` / `<name>_y` per wheel hub
//!
//! Lateral ports only exist with `planar_contact`, the yaw port only with
//! `yaw`. Every variant yields a square system.

use anyhow::{Context, Result};
use log::debug;

use crate::config::VehicleConfig;
use crate::network::{Component, Connection, ConnectionSign, Equation, LocalEquation, PortKey, SystemGraph};
use crate::state::{RuntimeState, WheelForces};

pub const MOTOR: &str = "motor";
pub const GEARBOX: &str = "gearbox";
pub const DIFFERENTIAL: &str = "differential";
pub const BODY: &str = "body";

pub fn wheel_component(name: &str) -> String {
    format!("wheel_{name}")
}

fn hub_port(name: &str, axis: char) -> String {
    format!("{name}_{axis}")
}

fn wheel_forces(state: &RuntimeState, index: usize) -> Option<&WheelForces> {
    state.computed.wheels.get(index)
}

fn steer_angle(state: &RuntimeState, index: usize) -> f64 {
    wheel_forces(state, index).map_or(0.0, |w| w.steer_angle)
}

/// Builds the network for `config`. Call once; the result is immutable.
pub fn build_vehicle_graph(config: &VehicleConfig) -> Result<SystemGraph<RuntimeState>> {
    let (left, right) = config.driven_pair()?;
    let planar = config.topology.planar_contact;
    let yaw = config.topology.yaw;

    let mut graph = SystemGraph::new();
    graph.add_component(motor(config.motor_inertia))?;
    graph.add_component(gearbox())?;
    graph.add_component(differential())?;
    for (index, wheel) in config.wheels.iter().enumerate() {
        graph
            .add_component(wheel_equations(config, index, planar))
            .with_context(|| format!("Failed to add wheel '{}'.", wheel.name))?;
    }
    graph.add_component(body(config, planar, yaw))?;

    graph.connect_solid(MOTOR, "shaft_out", GEARBOX, "shaft_in");
    graph.connect_solid(GEARBOX, "shaft_out", DIFFERENTIAL, "shaft_in");
    graph.connect_solid(
        DIFFERENTIAL,
        "shaft_left",
        &wheel_component(&config.wheels[left].name),
        "axle",
    );
    graph.connect_solid(
        DIFFERENTIAL,
        "shaft_right",
        &wheel_component(&config.wheels[right].name),
        "axle",
    );
    for wheel in &config.wheels {
        let component = wheel_component(&wheel.name);
        graph.add_connection(Connection::new(
            &component,
            PortKey::force("mount_x"),
            BODY,
            PortKey::force(hub_port(&wheel.name, 'x')),
            ConnectionSign::Opposite,
        ));
        if planar {
            graph.add_connection(Connection::new(
                &component,
                PortKey::force("mount_y"),
                BODY,
                PortKey::force(hub_port(&wheel.name, 'y')),
                ConnectionSign::Opposite,
            ));
        }
    }

    debug!(
        "vehicle graph: {} components, {} connections, {} equations",
        graph.components().len(),
        graph.connections().len(),
        graph.equation_count()
    );
    Ok(graph)
}

fn motor(inertia: f64) -> Component<RuntimeState> {
    Component::new(MOTOR)
        .equation(
            Equation::new()
                .term(PortKey::force("input"), 1.0)
                .derived_rhs(|s: &RuntimeState| s.computed.motor_torque)
                .label("drive torque"),
        )
        .equation(
            Equation::new()
                .term(PortKey::force("input"), 1.0)
                .term(PortKey::force("shaft_out"), 1.0)
                .term(PortKey::acc("shaft_out"), -inertia)
                .label("rotor balance"),
        )
}

/// Ideal reduction: `ω_in = ratio·ω_out`, power conserved.
fn gearbox() -> Component<RuntimeState> {
    Component::new(GEARBOX)
        .equation(
            Equation::new()
                .term(PortKey::force("shaft_out"), 1.0)
                .derived_term(PortKey::force("shaft_in"), |s: &RuntimeState| s.computed.gear_ratio)
                .label("torque ratio"),
        )
        .equation(
            Equation::new()
                .term(PortKey::acc("shaft_in"), 1.0)
                .derived_term(PortKey::acc("shaft_out"), |s: &RuntimeState| -s.computed.gear_ratio)
                .label("speed ratio"),
        )
}

/// Open differential: equal output torques, input speed is the output mean.
fn differential() -> Component<RuntimeState> {
    Component::new(DIFFERENTIAL)
        .equation(
            Equation::new()
                .term(PortKey::force("shaft_right"), 1.0)
                .term(PortKey::force("shaft_left"), -1.0)
                .label("torque split"),
        )
        .equation(
            Equation::new()
                .term(PortKey::force("shaft_in"), 1.0)
                .term(PortKey::force("shaft_left"), 1.0)
                .term(PortKey::force("shaft_right"), 1.0)
                .label("torque balance"),
        )
        .equation(
            Equation::new()
                .term(PortKey::acc("shaft_in"), 2.0)
                .term(PortKey::acc("shaft_left"), -1.0)
                .term(PortKey::acc("shaft_right"), -1.0)
                .label("speed averaging"),
        )
}

fn wheel_equations(config: &VehicleConfig, index: usize, planar: bool) -> Component<RuntimeState> {
    let spec = &config.wheels[index];
    let radius = config.wheel_radius;

    let mut equations: Vec<LocalEquation<RuntimeState>> = vec![
        Equation::new()
            .term(PortKey::force("brake"), 1.0)
            .derived_rhs(move |s: &RuntimeState| wheel_forces(s, index).map_or(0.0, |w| w.brake_torque))
            .label("brake torque"),
        Equation::new()
            .term(PortKey::force("axle"), 1.0)
            .term(PortKey::force("brake"), 1.0)
            .term(PortKey::force("contact_long"), -radius)
            .term(PortKey::acc("axle"), -config.wheel_inertia)
            .label("spin balance"),
        Equation::new()
            .term(PortKey::force("contact_long"), 1.0)
            .derived_rhs(move |s: &RuntimeState| wheel_forces(s, index).map_or(0.0, |w| w.friction.x))
            .label("longitudinal friction"),
    ];
    if !spec.driven {
        equations.push(
            Equation::new()
                .term(PortKey::force("axle"), 1.0)
                .label("free axle"),
        );
    }
    if planar {
        equations.push(
            Equation::new()
                .term(PortKey::force("contact_lat"), 1.0)
                .derived_rhs(move |s: &RuntimeState| wheel_forces(s, index).map_or(0.0, |w| w.friction.y))
                .label("lateral friction"),
        );
    }

    // Hub is massless: mount force cancels the contact force rotated into the body frame.
    let mut mount_x = Equation::new().term(PortKey::force("mount_x"), 1.0);
    if spec.steered {
        mount_x = mount_x.derived_term(PortKey::force("contact_long"), move |s: &RuntimeState| {
            steer_angle(s, index).cos()
        });
        if planar {
            mount_x = mount_x.derived_term(PortKey::force("contact_lat"), move |s: &RuntimeState| {
                -steer_angle(s, index).sin()
            });
        }
    } else {
        mount_x = mount_x.term(PortKey::force("contact_long"), 1.0);
    }
    equations.push(mount_x.label("hub balance x"));

    if planar {
        let mut mount_y = Equation::new().term(PortKey::force("mount_y"), 1.0);
        if spec.steered {
            mount_y = mount_y
                .derived_term(PortKey::force("contact_long"), move |s: &RuntimeState| {
                    steer_angle(s, index).sin()
                })
                .derived_term(PortKey::force("contact_lat"), move |s: &RuntimeState| {
                    steer_angle(s, index).cos()
                });
        } else {
            mount_y = mount_y.term(PortKey::force("contact_lat"), 1.0);
        }
        equations.push(mount_y.label("hub balance y"));
    }

    Component::with_equations(wheel_component(&spec.name), equations)
}

/// Rigid body in its own rotating frame.
fn body(config: &VehicleConfig, planar: bool, yaw: bool) -> Component<RuntimeState> {
    let mass = config.mass;

    let mut long = Equation::new().term(PortKey::acc("cg_x"), -mass);
    for wheel in &config.wheels {
        long = long.term(PortKey::force(hub_port(&wheel.name, 'x')), 1.0);
    }
    let long = long
        .derived_rhs(move |s: &RuntimeState| {
            -mass * s.defining.yaw_rate * s.defining.velocity.y - s.computed.drag.x
        })
        .label("longitudinal balance");
    let mut equations = vec![long];

    if planar {
        let mut lat = Equation::new().term(PortKey::acc("cg_y"), -mass);
        for wheel in &config.wheels {
            lat = lat.term(PortKey::force(hub_port(&wheel.name, 'y')), 1.0);
        }
        equations.push(
            lat.derived_rhs(move |s: &RuntimeState| {
                mass * s.defining.yaw_rate * s.defining.velocity.x - s.computed.drag.y
            })
            .label("lateral balance"),
        );
    }

    if yaw {
        let mut moment = Equation::new().term(PortKey::acc("yaw"), -config.yaw_inertia);
        for wheel in &config.wheels {
            let [px, py] = wheel.position;
            if py != 0.0 {
                moment = moment.term(PortKey::force(hub_port(&wheel.name, 'x')), -py);
            }
            if planar && px != 0.0 {
                moment = moment.term(PortKey::force(hub_port(&wheel.name, 'y')), px);
            }
        }
        equations.push(moment.label("yaw balance"));
    }

    // Hub accelerations as body-frame rates of the hub velocities.
    for wheel in &config.wheels {
        let [px, py] = wheel.position;
        let mut hub_x = Equation::new()
            .term(PortKey::acc(hub_port(&wheel.name, 'x')), 1.0)
            .term(PortKey::acc("cg_x"), -1.0);
        if yaw && py != 0.0 {
            hub_x = hub_x.term(PortKey::acc("yaw"), py);
        }
        equations.push(hub_x.label(format!("{} hub kinematics x", wheel.name)));

        if planar {
            let mut hub_y = Equation::new()
                .term(PortKey::acc(hub_port(&wheel.name, 'y')), 1.0)
                .term(PortKey::acc("cg_y"), -1.0);
            if yaw && px != 0.0 {
                hub_y = hub_y.term(PortKey::acc("yaw"), -px);
            }
            equations.push(hub_y.label(format!("{} hub kinematics y", wheel.name)));
        }
    }

    Component::with_equations(BODY, equations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TopologyOptions;
    use crate::network::{Quantity, VariableKey};

    fn config_with(planar_contact: bool, yaw: bool) -> VehicleConfig {
        VehicleConfig {
            topology: TopologyOptions { planar_contact, yaw },
            ..VehicleConfig::default()
        }
    }

    #[test]
    fn every_variant_is_square() {
        for (planar, yaw, expected) in [
            (true, true, 60),
            (true, false, 59),
            (false, true, 43),
            (false, false, 42),
        ] {
            let system = build_vehicle_graph(&config_with(planar, yaw))
                .unwrap()
                .build_symbolic()
                .unwrap();
            assert_eq!(system.equation_count(), expected, "planar={planar} yaw={yaw}");
            assert_eq!(system.variable_count(), expected, "planar={planar} yaw={yaw}");
        }
    }

    #[test]
    fn lateral_and_yaw_ports_follow_options() {
        let system = build_vehicle_graph(&config_with(false, false))
            .unwrap()
            .build_symbolic()
            .unwrap();
        let registry = system.registry();
        assert!(registry.contains(&VariableKey::acc(BODY, "cg_x")));
        assert!(!registry.contains(&VariableKey::acc(BODY, "cg_y")));
        assert!(!registry.contains(&VariableKey::acc(BODY, "yaw")));
        assert!(!registry.contains(&VariableKey::force("wheel_fl", "contact_lat")));
    }

    #[test]
    fn driven_wheels_attach_to_differential() {
        let graph = build_vehicle_graph(&VehicleConfig::default()).unwrap();
        let axle = VariableKey::port("wheel_rl", "axle", Quantity::Force);
        let left = VariableKey::force(DIFFERENTIAL, "shaft_left");
        assert!(graph
            .connections()
            .iter()
            .any(|c| c.a == left && c.b == axle && c.sign == ConnectionSign::Opposite));
        assert!(graph.component("wheel_fl").is_some());
        assert_eq!(graph.components().len(), 8);
    }

    #[test]
    fn rejects_layout_without_differential_pair() {
        let mut config = VehicleConfig::default();
        config.wheels[2].driven = false;
        let err = build_vehicle_graph(&config).err().expect("expected error");
        assert!(format!("{err}").contains("exactly two driven wheels"));
    }
}
