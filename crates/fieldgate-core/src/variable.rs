//! The hosted variable store.
//!
//! Variables are registered once at startup and then shared between the endpoint's
//! connection tasks (writers) and the bridge loop (reader). Individual reads and
//! writes are atomic; the bridge never holds the lock across a cycle.

use std::collections::BTreeMap;
use std::sync::RwLock;

/// Canonical name of the temperature variable.
pub const TEMPERATURE: &str = "Temperature";

/// Canonical name of the pressure variable.
pub const PRESSURE: &str = "Pressure";

/// Declaration of a single hosted variable.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableSpec {
    /// Variable name, unique within the namespace.
    pub name: String,
    /// Value the variable starts with.
    pub initial: f64,
    /// Whether clients may write the variable.
    pub writable: bool,
}

impl VariableSpec {
    /// Declare a writable variable.
    #[must_use]
    pub fn writable(name: impl Into<String>, initial: f64) -> Self {
        Self {
            name: name.into(),
            initial,
            writable: true,
        }
    }

    /// Declare a read-only variable.
    #[must_use]
    pub fn read_only(name: impl Into<String>, initial: f64) -> Self {
        Self {
            name: name.into(),
            initial,
            writable: false,
        }
    }
}

#[derive(Debug)]
struct Variable {
    value: f64,
    writable: bool,
}

/// In-process register of named variables.
///
/// Wrap in an [`std::sync::Arc`] to share between the endpoint and the bridge loop.
#[derive(Debug)]
pub struct VariableStore {
    vars: RwLock<BTreeMap<String, Variable>>,
}

impl VariableStore {
    /// Create a store with the given variables registered.
    #[must_use]
    pub fn new(specs: impl IntoIterator<Item = VariableSpec>) -> Self {
        let vars = specs
            .into_iter()
            .map(|spec| {
                (
                    spec.name,
                    Variable {
                        value: spec.initial,
                        writable: spec.writable,
                    },
                )
            })
            .collect();

        Self {
            vars: RwLock::new(vars),
        }
    }

    /// Read the current value of one variable.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unknown`] for an unregistered name.
    pub fn read(&self, name: &str) -> Result<f64, StoreError> {
        let vars = self.vars.read().map_err(|_| StoreError::Poisoned)?;
        vars.get(name)
            .map(|var| var.value)
            .ok_or_else(|| StoreError::Unknown(name.to_string()))
    }

    /// Read every registered variable, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Poisoned`] if a writer panicked while holding the lock.
    pub fn read_all(&self) -> Result<Vec<(String, f64)>, StoreError> {
        let vars = self.vars.read().map_err(|_| StoreError::Poisoned)?;
        Ok(vars
            .iter()
            .map(|(name, var)| (name.clone(), var.value))
            .collect())
    }

    /// Write a new value into a variable.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unknown`] for an unregistered name and
    /// [`StoreError::ReadOnly`] when the writable flag is not set.
    pub fn write(&self, name: &str, value: f64) -> Result<(), StoreError> {
        let mut vars = self.vars.write().map_err(|_| StoreError::Poisoned)?;
        let var = vars
            .get_mut(name)
            .ok_or_else(|| StoreError::Unknown(name.to_string()))?;

        if !var.writable {
            return Err(StoreError::ReadOnly(name.to_string()));
        }

        var.value = value;
        Ok(())
    }
}

/// Errors for variable store access.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// No variable registered under this name
    #[error("unknown variable '{0}'")]
    Unknown(String),
    /// The variable exists but is not writable
    #[error("variable '{0}' is read-only")]
    ReadOnly(String),
    /// A writer panicked while holding the store lock
    #[error("variable store lock poisoned")]
    Poisoned,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> VariableStore {
        VariableStore::new([
            VariableSpec::writable(TEMPERATURE, 0.0),
            VariableSpec::writable(PRESSURE, 0.0),
        ])
    }

    #[test]
    fn initial_values() {
        let store = store();
        assert_eq!(store.read(TEMPERATURE).unwrap(), 0.0);
        assert_eq!(store.read(PRESSURE).unwrap(), 0.0);
    }

    #[test]
    fn write_then_read() {
        let store = store();
        store.write(TEMPERATURE, 25.5).unwrap();
        assert_eq!(store.read(TEMPERATURE).unwrap(), 25.5);
        assert_eq!(store.read(PRESSURE).unwrap(), 0.0);
    }

    #[test]
    fn read_all_sorted_by_name() {
        let store = store();
        store.write(TEMPERATURE, 21.0).unwrap();
        store.write(PRESSURE, 1001.0).unwrap();

        let fields = store.read_all().unwrap();
        assert_eq!(
            fields,
            vec![
                (PRESSURE.to_string(), 1001.0),
                (TEMPERATURE.to_string(), 21.0)
            ]
        );
    }

    #[test]
    fn unknown_variable_rejected() {
        let store = store();
        assert!(matches!(store.read("Humidity"), Err(StoreError::Unknown(_))));
        assert!(matches!(
            store.write("Humidity", 1.0),
            Err(StoreError::Unknown(_))
        ));
    }

    #[test]
    fn read_only_variable_rejects_writes() {
        let store = VariableStore::new([VariableSpec::read_only("Serial", 42.0)]);
        assert!(matches!(
            store.write("Serial", 1.0),
            Err(StoreError::ReadOnly(_))
        ));
        assert_eq!(store.read("Serial").unwrap(), 42.0);
    }
}
