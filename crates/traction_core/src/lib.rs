//! The `traction_core` crate simulates vehicle drivetrain and chassis dynamics
//! as a network of rigid elements exchanging accelerations and forces.
//!
//! Key components:
//! - **Network**: `SystemGraph` composes components, connections and constraints
//!   into a symbolic linear system, evaluated numerically against runtime state.
//! - **Linsolve**: exact LU solves with a least-squares (SVD) fallback.
//! - **Friction / Drivetrain**: tire slip friction, motor torque curve, brakes, drag.
//! - **Solvers**: time steppers over the `MechanicalSystem` trait.
//! - **Vehicle**: per-step orchestration over a shared, immutable `VehicleModel`.
pub mod config;
pub mod drivetrain;
pub mod error;
pub mod friction;
pub mod linsolve;
pub mod network;
pub mod solvers;
pub mod state;
pub mod topology;
pub mod traits;
pub mod vehicle;

pub use error::{Error, Result};
