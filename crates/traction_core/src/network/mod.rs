//! Generic equation network: components exchange accelerations and forces
//! through ports, and the network assembles one linear system per step.
//!
//! The network is agnostic of vehicles. It is generic over the state type
//! `S` that derived coefficients read from.

pub mod component;
pub mod equation;
pub mod graph;
pub mod registry;

pub use component::{Component, Connection, ConnectionSign, ConstraintSet};
pub use equation::{Coefficient, Equation, GlobalEquation, LocalEquation, PortKey, StateFn};
pub use graph::{RowOrigin, SymbolicRow, SymbolicSystem, SystemGraph};
pub use registry::{Quantity, VarId, VariableKey, VariableRegistry};
