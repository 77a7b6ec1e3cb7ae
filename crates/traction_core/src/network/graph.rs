//! Network composition, symbolic assembly and numeric evaluation.
//!
//! Assembly is two-pass. The registry is first completed from every name
//! declared by components and constraints; only then are rows resolved
//! into dense coefficient positions. Resolving against a partial registry
//! would silently shift column indices.

use log::debug;
use nalgebra::{DMatrix, DVector};

use super::component::{Component, Connection, ConnectionSign, ConstraintSet};
use super::equation::{Coefficient, GlobalEquation, PortKey};
use super::registry::{VarId, VariableKey, VariableRegistry};
use crate::error::{Error, Result};

/// Where a symbolic row came from.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOrigin {
    Component {
        component: String,
        index: usize,
        label: Option<String>,
    },
    Connection {
        index: usize,
    },
    Constraint {
        index: usize,
        label: Option<String>,
    },
}

/// A resolved row: sparse coefficients over registry ids.
pub struct SymbolicRow<S> {
    pub terms: Vec<(VarId, Coefficient<S>)>,
    pub rhs: Coefficient<S>,
    pub origin: RowOrigin,
}

impl<S> Clone for SymbolicRow<S> {
    fn clone(&self) -> Self {
        Self {
            terms: self.terms.clone(),
            rhs: self.rhs.clone(),
            origin: self.origin.clone(),
        }
    }
}

/// Components, connections and constraints, composed once before simulation.
pub struct SystemGraph<S> {
    components: Vec<Component<S>>,
    connections: Vec<Connection>,
    constraints: ConstraintSet<S>,
}

impl<S> SystemGraph<S> {
    pub fn new() -> Self {
        Self {
            components: Vec::new(),
            connections: Vec::new(),
            constraints: ConstraintSet::new(),
        }
    }

    pub fn add_component(&mut self, component: Component<S>) -> Result<()> {
        if self.component(component.name()).is_some() {
            return Err(Error::DuplicateComponent(component.name().to_string()));
        }
        self.components.push(component);
        Ok(())
    }

    pub fn add_connection(&mut self, connection: Connection) {
        self.connections.push(connection);
    }

    /// Rigidly couples two ports: equal acceleration, opposite force.
    pub fn connect_solid(&mut self, component_a: &str, port_a: &str, component_b: &str, port_b: &str) {
        self.add_connection(Connection::new(
            component_a,
            PortKey::acc(port_a),
            component_b,
            PortKey::acc(port_b),
            ConnectionSign::Same,
        ));
        self.add_connection(Connection::new(
            component_a,
            PortKey::force(port_a),
            component_b,
            PortKey::force(port_b),
            ConnectionSign::Opposite,
        ));
    }

    pub fn add_constraint(&mut self, equation: GlobalEquation<S>) {
        self.constraints.push(equation);
    }

    pub fn component(&self, name: &str) -> Option<&Component<S>> {
        self.components.iter().find(|c| c.name() == name)
    }

    pub fn components(&self) -> &[Component<S>] {
        &self.components
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn constraints(&self) -> &ConstraintSet<S> {
        &self.constraints
    }

    pub fn equation_count(&self) -> usize {
        self.components
            .iter()
            .map(|c| c.equations().len())
            .sum::<usize>()
            + self.connections.len()
            + self.constraints.len()
    }

    /// Builds the complete registry: component names in addition order,
    /// then constraint names, then checks that every connection port exists.
    pub fn registry(&self) -> Result<VariableRegistry> {
        let mut registry = VariableRegistry::new();
        for component in &self.components {
            for key in component.declared_keys() {
                registry.register(key);
            }
        }
        for key in self.constraints.declared_keys() {
            self.check_component(key)?;
            registry.register(key.clone());
        }
        for connection in &self.connections {
            for (key, _) in connection.coefficients() {
                self.check_component(key)?;
                if !registry.contains(key) {
                    return Err(Error::UnknownVariable(key.clone()));
                }
            }
        }
        Ok(registry)
    }

    fn check_component(&self, key: &VariableKey) -> Result<()> {
        match key.component() {
            Some(name) if self.component(name).is_none() => {
                Err(Error::UnknownComponent(name.to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Resolves every equation into rows over the complete registry.
    ///
    /// Row order: component equations (addition order, then declaration
    /// order), one row per connection, then constraint rows.
    pub fn build_symbolic(&self) -> Result<SymbolicSystem<S>> {
        let registry = self.registry()?;
        let mut rows = Vec::with_capacity(self.equation_count());

        for component in &self.components {
            for (index, eq) in component.equations().iter().enumerate() {
                let terms = eq
                    .terms()
                    .iter()
                    .map(|(key, c)| Ok((registry.resolve(&key.namespaced(component.name()))?, c.clone())))
                    .collect::<Result<Vec<_>>>()?;
                rows.push(SymbolicRow {
                    terms,
                    rhs: eq.rhs_coefficient().clone(),
                    origin: RowOrigin::Component {
                        component: component.name().to_string(),
                        index,
                        label: eq.description().map(str::to_string),
                    },
                });
            }
        }

        for (index, connection) in self.connections.iter().enumerate() {
            let terms = connection
                .coefficients()
                .into_iter()
                .map(|(key, c)| Ok((registry.resolve(key)?, Coefficient::Constant(c))))
                .collect::<Result<Vec<_>>>()?;
            rows.push(SymbolicRow {
                terms,
                rhs: Coefficient::Constant(0.0),
                origin: RowOrigin::Connection { index },
            });
        }

        for (index, eq) in self.constraints.equations().iter().enumerate() {
            let terms = eq
                .terms()
                .iter()
                .map(|(key, c)| Ok((registry.resolve(key)?, c.clone())))
                .collect::<Result<Vec<_>>>()?;
            rows.push(SymbolicRow {
                terms,
                rhs: eq.rhs_coefficient().clone(),
                origin: RowOrigin::Constraint {
                    index,
                    label: eq.description().map(str::to_string),
                },
            });
        }

        debug!(
            "assembled network: {} components, {} connections, {} constraints -> {} equations x {} variables",
            self.components.len(),
            self.connections.len(),
            self.constraints.len(),
            rows.len(),
            registry.len()
        );

        Ok(SymbolicSystem { registry, rows })
    }
}

impl<S> Default for SystemGraph<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// State-independent form of the network equations.
///
/// Built once per topology; `evaluate` substitutes derived entries against
/// a state snapshot and is free of side effects.
pub struct SymbolicSystem<S> {
    registry: VariableRegistry,
    rows: Vec<SymbolicRow<S>>,
}

impl<S> SymbolicSystem<S> {
    pub fn registry(&self) -> &VariableRegistry {
        &self.registry
    }

    pub fn rows(&self) -> &[SymbolicRow<S>] {
        &self.rows
    }

    pub fn equation_count(&self) -> usize {
        self.rows.len()
    }

    pub fn variable_count(&self) -> usize {
        self.registry.len()
    }

    pub fn is_square(&self) -> bool {
        self.equation_count() == self.variable_count()
    }

    pub fn evaluate(&self, state: &S) -> (DMatrix<f64>, DVector<f64>) {
        let mut a = DMatrix::zeros(self.equation_count(), self.variable_count());
        let mut b = DVector::zeros(self.equation_count());
        self.fill(state, &mut a, &mut b);
        (a, b)
    }

    /// Evaluates into caller-owned buffers.
    pub fn evaluate_into(&self, state: &S, a: &mut DMatrix<f64>, b: &mut DVector<f64>) -> Result<()> {
        if a.nrows() != self.equation_count() {
            return Err(Error::DimensionMismatch {
                context: "matrix rows",
                expected: self.equation_count(),
                actual: a.nrows(),
            });
        }
        if a.ncols() != self.variable_count() {
            return Err(Error::DimensionMismatch {
                context: "matrix columns",
                expected: self.variable_count(),
                actual: a.ncols(),
            });
        }
        if b.len() != self.equation_count() {
            return Err(Error::DimensionMismatch {
                context: "right-hand side",
                expected: self.equation_count(),
                actual: b.len(),
            });
        }
        a.fill(0.0);
        self.fill(state, a, b);
        Ok(())
    }

    fn fill(&self, state: &S, a: &mut DMatrix<f64>, b: &mut DVector<f64>) {
        for (r, row) in self.rows.iter().enumerate() {
            for (id, coefficient) in &row.terms {
                a[(r, id.index())] += coefficient.evaluate(state);
            }
            b[r] = row.rhs.evaluate(state);
        }
    }

    /// Positions and constant values of every symbolic entry, in row order.
    /// Derived entries report `None`.
    pub fn pattern(&self) -> Vec<(usize, usize, Option<f64>)> {
        self.rows
            .iter()
            .enumerate()
            .flat_map(|(r, row)| {
                row.terms
                    .iter()
                    .filter(|(_, c)| !c.is_zero_constant())
                    .map(move |(id, c)| (r, id.index(), c.as_constant()))
            })
            .collect()
    }
}
