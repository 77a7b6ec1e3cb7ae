//! Building blocks of an equation network: components, the connections
//! between their ports, and free-standing constraints.

use serde::{Deserialize, Serialize};

use super::equation::{GlobalEquation, LocalEquation, PortKey};
use super::registry::VariableKey;

/// A named bag of equations over the component's own ports.
pub struct Component<S> {
    name: String,
    equations: Vec<LocalEquation<S>>,
}

impl<S> Component<S> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            equations: Vec::new(),
        }
    }

    pub fn with_equations(name: impl Into<String>, equations: Vec<LocalEquation<S>>) -> Self {
        Self {
            name: name.into(),
            equations,
        }
    }

    pub fn equation(mut self, equation: LocalEquation<S>) -> Self {
        self.equations.push(equation);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn equations(&self) -> &[LocalEquation<S>] {
        &self.equations
    }

    /// Namespaced keys referenced by this component, in first-seen order.
    pub fn declared_keys(&self) -> impl Iterator<Item = VariableKey> + '_ {
        self.equations
            .iter()
            .flat_map(|eq| eq.keys())
            .map(|key| key.namespaced(&self.name))
    }
}

impl<S> std::fmt::Debug for Component<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .field("equations", &self.equations)
            .finish()
    }
}

/// Relation a connection enforces between its two ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionSign {
    /// `a = b`: kinematic continuity across a rigid joint.
    Same,
    /// `a = -b`: action and reaction.
    Opposite,
}

impl ConnectionSign {
    pub fn factor(self) -> f64 {
        match self {
            ConnectionSign::Same => 1.0,
            ConnectionSign::Opposite => -1.0,
        }
    }
}

/// Equality between one port variable on each of two components.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub a: VariableKey,
    pub b: VariableKey,
    pub sign: ConnectionSign,
}

impl Connection {
    pub fn new(
        component_a: &str,
        port_a: PortKey,
        component_b: &str,
        port_b: PortKey,
        sign: ConnectionSign,
    ) -> Self {
        Self {
            a: port_a.namespaced(component_a),
            b: port_b.namespaced(component_b),
            sign,
        }
    }

    /// Row coefficients of `a - sign·b = 0`.
    pub fn coefficients(&self) -> [(&VariableKey, f64); 2] {
        [(&self.a, 1.0), (&self.b, -self.sign.factor())]
    }
}

/// Free-standing equations spanning several components.
pub struct ConstraintSet<S> {
    equations: Vec<GlobalEquation<S>>,
}

impl<S> ConstraintSet<S> {
    pub fn new() -> Self {
        Self {
            equations: Vec::new(),
        }
    }

    pub fn push(&mut self, equation: GlobalEquation<S>) {
        self.equations.push(equation);
    }

    pub fn equations(&self) -> &[GlobalEquation<S>] {
        &self.equations
    }

    pub fn len(&self) -> usize {
        self.equations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.equations.is_empty()
    }

    pub fn declared_keys(&self) -> impl Iterator<Item = &VariableKey> {
        self.equations.iter().flat_map(|eq| eq.keys())
    }
}

impl<S> Default for ConstraintSet<S> {
    fn default() -> Self {
        Self::new()
    }
}
