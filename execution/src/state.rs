use anyhow::Result;
use crashpad_types::execution::{Key, Value};

#[cfg(any(test, feature = "mocks"))]
use std::collections::BTreeMap;

/// Durable keyed store behind the ledger.
///
/// `apply` must be atomic: either every change in the batch is durable or none is. The ledger
/// relies on this to keep memory and storage in step.
pub trait State {
    /// Returns every stored record, used once at startup.
    fn load(&self) -> Result<Vec<(Key, Value)>>;

    fn get(&self, key: &Key) -> Result<Option<Value>>;

    fn apply(&mut self, changes: Vec<(Key, Status)>) -> Result<()>;
}

#[cfg(any(test, feature = "mocks"))]
#[derive(Clone, Default)]
pub struct Memory {
    state: BTreeMap<Key, Value>,
}

#[cfg(any(test, feature = "mocks"))]
impl Memory {
    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }
}

#[cfg(any(test, feature = "mocks"))]
impl State for Memory {
    fn load(&self) -> Result<Vec<(Key, Value)>> {
        Ok(self
            .state
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn get(&self, key: &Key) -> Result<Option<Value>> {
        Ok(self.state.get(key).cloned())
    }

    fn apply(&mut self, changes: Vec<(Key, Status)>) -> Result<()> {
        for (key, status) in changes {
            match status {
                Status::Update(value) => {
                    self.state.insert(key, value);
                }
                Status::Delete => {
                    self.state.remove(&key);
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(clippy::large_enum_variant)]
pub enum Status {
    Update(Value),
    Delete,
}
