use crate::value_id::ValueId;
use crate::values::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Descriptive attributes of a value, set at creation time by the owning
/// command class. Re-creating a value updates these without touching the
/// current value.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueMetadata {
    pub label: String,
    pub units: String,
    pub read_only: bool,
    /// Declared range for numeric values; sets outside it are rejected
    /// before any wire traffic happens
    pub min: Option<i64>,
    pub max: Option<i64>,
    /// Item labels for List values
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredValue {
    pub metadata: ValueMetadata,
    pub current: Option<Value>,
    /// A set() the embedder issued that has not been confirmed by a
    /// report yet
    pub pending: Option<Value>,
}

/// What happened to a value as the result of a store operation. The driver
/// turns these into notifications at its next safe point.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueEvent {
    Added(ValueId),
    /// A report arrived and the committed value differs from the previous one
    Changed(ValueId),
    /// A report arrived and the committed value equals the previous one
    Refreshed(ValueId),
    Removed(ValueId),
}

/// The typed values of one node, keyed by [ValueId]. The
/// (class, instance, index) part of the key is injective per node.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ValueStore {
    values: BTreeMap<ValueId, StoredValue>,
}

impl ValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a value. Idempotent: a second creation with the same id
    /// updates the metadata but leaves the current value alone.
    pub fn create(
        &mut self,
        id: ValueId,
        metadata: ValueMetadata,
        default: Option<Value>,
    ) -> Option<ValueEvent> {
        match self.values.get_mut(&id) {
            Some(existing) => {
                existing.metadata = metadata;
                None
            }
            None => {
                self.values.insert(
                    id,
                    StoredValue {
                        metadata,
                        current: default,
                        pending: None,
                    },
                );
                Some(ValueEvent::Added(id))
            }
        }
    }

    pub fn get(&self, id: &ValueId) -> Option<&StoredValue> {
        self.values.get(id)
    }

    pub fn contains(&self, id: &ValueId) -> bool {
        self.values.contains_key(id)
    }

    /// Records an embedder-requested change. The new value only becomes
    /// current once the device confirms it with a report.
    pub fn set_pending(&mut self, id: &ValueId, value: Value) -> bool {
        match self.values.get_mut(id) {
            Some(stored) => {
                stored.pending = Some(value);
                true
            }
            None => false,
        }
    }

    /// Commits a reported value and classifies the outcome: Changed if the
    /// representation differs from the previous one, Refreshed otherwise.
    pub fn commit_report(&mut self, id: &ValueId, value: Value) -> Option<ValueEvent> {
        let stored = self.values.get_mut(id)?;
        stored.pending = None;
        let changed = stored.current.as_ref() != Some(&value);
        stored.current = Some(value);
        Some(if changed {
            ValueEvent::Changed(*id)
        } else {
            ValueEvent::Refreshed(*id)
        })
    }

    /// Applies a persisted value without producing an event. Used when
    /// loading cached state, which must not look like wire traffic.
    pub fn apply_cached(&mut self, id: ValueId, metadata: ValueMetadata, value: Option<Value>) {
        self.values.insert(
            id,
            StoredValue {
                metadata,
                current: value,
                pending: None,
            },
        );
    }

    pub fn remove(&mut self, id: &ValueId) -> Option<ValueEvent> {
        self.values
            .remove(id)
            .map(|_| ValueEvent::Removed(*id))
    }

    pub fn ids(&self) -> impl Iterator<Item = &ValueId> {
        self.values.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ValueId, &StoredValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::definitions::{HomeId, NodeId};
    use crate::value_id::ValueGenre;
    use crate::values::{Decimal, ValueType};

    fn id(index: u8) -> ValueId {
        ValueId::new(
            HomeId::new(1),
            NodeId::new(5),
            ValueGenre::User,
            0x31,
            1,
            index,
            ValueType::Decimal,
        )
    }

    fn metadata(label: &str) -> ValueMetadata {
        ValueMetadata {
            label: label.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_is_idempotent() {
        let mut store = ValueStore::new();
        let event = store.create(id(1), metadata("Temperature"), None);
        assert_eq!(event, Some(ValueEvent::Added(id(1))));

        store.commit_report(&id(1), Value::Decimal(Decimal::new(1, 2, 42)));

        // Second creation updates metadata but keeps the value
        let event = store.create(id(1), metadata("Air temperature"), None);
        assert_eq!(event, None);
        let stored = store.get(&id(1)).unwrap();
        assert_eq!(stored.metadata.label, "Air temperature");
        assert_eq!(
            stored.current,
            Some(Value::Decimal(Decimal::new(1, 2, 42)))
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_changed_vs_refreshed() {
        let mut store = ValueStore::new();
        store.create(id(1), metadata("Temperature"), None);

        let report = Value::Decimal(Decimal::new(1, 2, 42));
        assert_eq!(
            store.commit_report(&id(1), report.clone()),
            Some(ValueEvent::Changed(id(1)))
        );
        // Same report again: refreshed, not changed
        assert_eq!(
            store.commit_report(&id(1), report),
            Some(ValueEvent::Refreshed(id(1)))
        );
        // Same number, different precision: the representation differs
        assert_eq!(
            store.commit_report(&id(1), Value::Decimal(Decimal::new(2, 2, 420))),
            Some(ValueEvent::Changed(id(1)))
        );
    }

    #[test]
    fn test_pending_cleared_by_report() {
        let mut store = ValueStore::new();
        store.create(id(1), metadata("Temperature"), None);
        assert!(store.set_pending(&id(1), Value::Decimal(Decimal::new(1, 2, 50))));
        assert!(store.get(&id(1)).unwrap().pending.is_some());

        store.commit_report(&id(1), Value::Decimal(Decimal::new(1, 2, 50)));
        assert!(store.get(&id(1)).unwrap().pending.is_none());
    }
}
