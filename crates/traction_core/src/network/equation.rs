//! Linear equations whose coefficients may depend on runtime state.

use std::fmt;
use std::sync::Arc;

use super::registry::{Quantity, VariableKey};

/// Pure function of a state snapshot.
pub type StateFn<S> = Arc<dyn Fn(&S) -> f64 + Send + Sync>;

/// A matrix coefficient or right-hand side entry.
///
/// `Constant` entries are fixed at construction; `Derived` entries are
/// re-evaluated against the state snapshot every time the symbolic system
/// is evaluated numerically.
pub enum Coefficient<S> {
    Constant(f64),
    Derived(StateFn<S>),
}

impl<S> Coefficient<S> {
    pub fn derived<F>(f: F) -> Self
    where
        F: Fn(&S) -> f64 + Send + Sync + 'static,
    {
        Coefficient::Derived(Arc::new(f))
    }

    pub fn evaluate(&self, state: &S) -> f64 {
        match self {
            Coefficient::Constant(value) => *value,
            Coefficient::Derived(f) => f(state),
        }
    }

    pub fn as_constant(&self) -> Option<f64> {
        match self {
            Coefficient::Constant(value) => Some(*value),
            Coefficient::Derived(_) => None,
        }
    }

    pub fn is_derived(&self) -> bool {
        matches!(self, Coefficient::Derived(_))
    }

    /// True for a literal zero. Derived entries are never considered zero.
    pub fn is_zero_constant(&self) -> bool {
        matches!(self, Coefficient::Constant(v) if *v == 0.0)
    }
}

impl<S> Clone for Coefficient<S> {
    fn clone(&self) -> Self {
        match self {
            Coefficient::Constant(value) => Coefficient::Constant(*value),
            Coefficient::Derived(f) => Coefficient::Derived(Arc::clone(f)),
        }
    }
}

impl<S> fmt::Debug for Coefficient<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Coefficient::Constant(value) => write!(f, "Constant({})", value),
            Coefficient::Derived(_) => write!(f, "Derived(..)"),
        }
    }
}

impl<S> From<f64> for Coefficient<S> {
    fn from(value: f64) -> Self {
        Coefficient::Constant(value)
    }
}

/// A port-local variable name, namespaced by the owning component when the
/// network is assembled.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortKey {
    pub port: String,
    pub quantity: Quantity,
}

impl PortKey {
    pub fn new(port: impl Into<String>, quantity: Quantity) -> Self {
        Self {
            port: port.into(),
            quantity,
        }
    }

    pub fn acc(port: impl Into<String>) -> Self {
        Self::new(port, Quantity::Acceleration)
    }

    pub fn force(port: impl Into<String>) -> Self {
        Self::new(port, Quantity::Force)
    }

    pub fn namespaced(&self, component: &str) -> VariableKey {
        VariableKey::port(component, self.port.clone(), self.quantity)
    }
}

/// One linear row: `Σ coefficient·variable = rhs`.
///
/// Terms form an ordered mapping keyed by `K`; setting the same key twice
/// replaces the earlier coefficient in place.
pub struct Equation<K, S> {
    terms: Vec<(K, Coefficient<S>)>,
    rhs: Coefficient<S>,
    label: Option<String>,
}

impl<K: PartialEq, S> Equation<K, S> {
    pub fn new() -> Self {
        Self {
            terms: Vec::new(),
            rhs: Coefficient::Constant(0.0),
            label: None,
        }
    }

    pub fn term(mut self, key: K, coefficient: impl Into<Coefficient<S>>) -> Self {
        let coefficient = coefficient.into();
        match self.terms.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = coefficient,
            None => self.terms.push((key, coefficient)),
        }
        self
    }

    pub fn derived_term<F>(self, key: K, f: F) -> Self
    where
        F: Fn(&S) -> f64 + Send + Sync + 'static,
    {
        self.term(key, Coefficient::derived(f))
    }

    pub fn rhs(mut self, rhs: impl Into<Coefficient<S>>) -> Self {
        self.rhs = rhs.into();
        self
    }

    pub fn derived_rhs<F>(self, f: F) -> Self
    where
        F: Fn(&S) -> f64 + Send + Sync + 'static,
    {
        self.rhs(Coefficient::derived(f))
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

impl<K: PartialEq, S> Default for Equation<K, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, S> Equation<K, S> {
    pub fn terms(&self) -> &[(K, Coefficient<S>)] {
        &self.terms
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.terms.iter().map(|(k, _)| k)
    }

    pub fn rhs_coefficient(&self) -> &Coefficient<S> {
        &self.rhs
    }

    pub fn description(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

impl<K: Clone, S> Clone for Equation<K, S> {
    fn clone(&self) -> Self {
        Self {
            terms: self.terms.clone(),
            rhs: self.rhs.clone(),
            label: self.label.clone(),
        }
    }
}

impl<K: fmt::Debug, S> fmt::Debug for Equation<K, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Equation")
            .field("terms", &self.terms)
            .field("rhs", &self.rhs)
            .field("label", &self.label)
            .finish()
    }
}

/// Equation over port-local names, owned by a component.
pub type LocalEquation<S> = Equation<PortKey, S>;

/// Equation over global names, owned by a constraint set.
pub type GlobalEquation<S> = Equation<VariableKey, S>;

#[cfg(test)]
mod tests {
    use super::*;

    struct Gear {
        ratio: f64,
    }

    #[test]
    fn derived_coefficients_follow_state() {
        let c: Coefficient<Gear> = Coefficient::derived(|s: &Gear| -s.ratio);
        assert!(c.is_derived());
        assert_eq!(c.evaluate(&Gear { ratio: 3.0 }), -3.0);
        assert_eq!(c.evaluate(&Gear { ratio: 12.0 }), -12.0);
    }

    #[test]
    fn repeated_term_replaces_coefficient_in_place() {
        let eq: LocalEquation<()> = Equation::new()
            .term(PortKey::force("a"), 1.0)
            .term(PortKey::acc("b"), 2.0)
            .term(PortKey::force("a"), 5.0)
            .rhs(7.0);

        let keys: Vec<_> = eq.keys().cloned().collect();
        assert_eq!(keys, vec![PortKey::force("a"), PortKey::acc("b")]);
        assert_eq!(eq.terms()[0].1.as_constant(), Some(5.0));
        assert_eq!(eq.rhs_coefficient().as_constant(), Some(7.0));
    }

    #[test]
    fn port_keys_are_namespaced_by_component() {
        let key = PortKey::acc("shaft_in").namespaced("gearbox");
        assert_eq!(key, VariableKey::acc("gearbox", "shaft_in"));
    }
}
