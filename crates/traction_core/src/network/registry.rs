//! Variable identity and the ordered registry of network unknowns.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The physical quantity a port exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quantity {
    /// Linear or angular acceleration of the port.
    Acceleration,
    /// Force or torque transmitted through the port.
    Force,
}

impl Quantity {
    pub fn suffix(self) -> &'static str {
        match self {
            Quantity::Acceleration => "acc",
            Quantity::Force => "force",
        }
    }
}

/// Structured identity of one scalar unknown.
///
/// Port variables carry their owning component and port as metadata rather
/// than as a dotted string; free variables belong to no component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariableKey {
    Port {
        component: String,
        port: String,
        quantity: Quantity,
    },
    Free(String),
}

impl VariableKey {
    pub fn port(component: impl Into<String>, port: impl Into<String>, quantity: Quantity) -> Self {
        VariableKey::Port {
            component: component.into(),
            port: port.into(),
            quantity,
        }
    }

    pub fn acc(component: impl Into<String>, port: impl Into<String>) -> Self {
        Self::port(component, port, Quantity::Acceleration)
    }

    pub fn force(component: impl Into<String>, port: impl Into<String>) -> Self {
        Self::port(component, port, Quantity::Force)
    }

    pub fn free(name: impl Into<String>) -> Self {
        VariableKey::Free(name.into())
    }

    pub fn component(&self) -> Option<&str> {
        match self {
            VariableKey::Port { component, .. } => Some(component),
            VariableKey::Free(_) => None,
        }
    }

    pub fn quantity(&self) -> Option<Quantity> {
        match self {
            VariableKey::Port { quantity, .. } => Some(*quantity),
            VariableKey::Free(_) => None,
        }
    }
}

impl fmt::Display for VariableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableKey::Port {
                component,
                port,
                quantity,
            } => write!(f, "{}.{}.{}", component, port, quantity.suffix()),
            VariableKey::Free(name) => write!(f, "{}", name),
        }
    }
}

/// Dense index of a variable in the solve vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VarId(usize);

impl VarId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Deduplicating, insertion-ordered set of variables.
///
/// The order in which keys are first registered fixes the column order of
/// the assembled matrix and the layout of every solution vector.
#[derive(Debug, Clone, Default)]
pub struct VariableRegistry {
    keys: Vec<VariableKey>,
    index: HashMap<VariableKey, VarId>,
}

impl VariableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `key`, returning its id. Re-registering is a no-op.
    pub fn register(&mut self, key: VariableKey) -> VarId {
        if let Some(&id) = self.index.get(&key) {
            return id;
        }
        let id = VarId(self.keys.len());
        self.index.insert(key.clone(), id);
        self.keys.push(key);
        id
    }

    pub fn get(&self, key: &VariableKey) -> Option<VarId> {
        self.index.get(key).copied()
    }

    pub fn resolve(&self, key: &VariableKey) -> Result<VarId> {
        self.get(key)
            .ok_or_else(|| Error::UnknownVariable(key.clone()))
    }

    pub fn contains(&self, key: &VariableKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn key(&self, id: VarId) -> &VariableKey {
        &self.keys[id.0]
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (VarId, &VariableKey)> {
        self.keys.iter().enumerate().map(|(i, key)| (VarId(i), key))
    }
}
