use crate::error::{Error, Result};
use crate::node::{Group, Node};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use zw_core::definitions::{HomeId, NodeId, NodeProtocolInfo};
use zw_core::value_id::ValueId;
use zw_core::value_store::{ValueMetadata, ValueStore};
use zw_core::values::Value;

/// Bumped whenever the document layout changes incompatibly. Loading a
/// file with a different version rejects the state; the network is then
/// re-queried from scratch.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedValue {
    pub id: ValueId,
    pub metadata: ValueMetadata,
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedCommandClass {
    pub id: u8,
    pub version: u8,
    pub instance_count: u8,
    pub secure: bool,
    pub after_mark: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedGroup {
    pub index: u8,
    pub label: String,
    pub max_associations: u8,
    pub members: Vec<(NodeId, Option<u8>)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedNode {
    pub id: NodeId,
    pub protocol_info: Option<NodeProtocolInfo>,
    pub manufacturer_id: Option<u16>,
    pub product_type: Option<u16>,
    pub product_id: Option<u16>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub location: String,
    pub command_classes: Vec<PersistedCommandClass>,
    pub groups: Vec<PersistedGroup>,
    pub values: Vec<PersistedValue>,
}

/// The versioned document written at shutdown and read at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedState {
    pub schema_version: u32,
    pub home_id: HomeId,
    pub own_node_id: NodeId,
    pub nodes: Vec<PersistedNode>,
}

impl PersistedNode {
    pub fn from_node(node: &Node) -> Self {
        Self {
            id: node.id,
            protocol_info: node.protocol_info,
            manufacturer_id: node.manufacturer_id,
            product_type: node.product_type,
            product_id: node.product_id,
            name: node.name.clone(),
            location: node.location.clone(),
            command_classes: node
                .classes
                .values()
                .map(|cc| PersistedCommandClass {
                    id: cc.cc_id(),
                    version: cc.info().version,
                    instance_count: cc.info().instance_count,
                    secure: cc.info().secure,
                    after_mark: cc.info().after_mark,
                })
                .collect(),
            groups: node
                .groups
                .iter()
                .map(|(&index, group)| PersistedGroup {
                    index,
                    label: group.label.clone(),
                    max_associations: group.max_associations,
                    members: group.members.clone(),
                })
                .collect(),
            values: node
                .store
                .iter()
                .map(|(id, stored)| PersistedValue {
                    id: *id,
                    metadata: stored.metadata.clone(),
                    value: stored.current.clone(),
                })
                .collect(),
        }
    }

    /// Rebuilds a node. Classes and values are restored without wire
    /// traffic; the query pipeline then resumes from the Associations
    /// stage instead of starting over.
    pub fn restore(&self) -> Node {
        let mut node = Node::new(self.id);
        node.protocol_info = self.protocol_info;
        node.manufacturer_id = self.manufacturer_id;
        node.product_type = self.product_type;
        node.product_id = self.product_id;
        node.name = self.name.clone();
        node.location = self.location.clone();
        for persisted in &self.command_classes {
            node.add_command_class(persisted.id, persisted.after_mark);
            if let Some(cc) = node.classes.get_mut(&persisted.id) {
                let info = cc.info_mut();
                info.version = persisted.version;
                info.instance_count = persisted.instance_count;
                info.secure = persisted.secure;
            }
        }
        for group in &self.groups {
            node.groups.insert(
                group.index,
                Group {
                    label: group.label.clone(),
                    max_associations: group.max_associations,
                    members: group.members.clone(),
                },
            );
        }
        let mut store = ValueStore::new();
        for value in &self.values {
            store.apply_cached(value.id, value.metadata.clone(), value.value.clone());
        }
        node.store = store;
        // Sleeping nodes start asleep after a restore
        node.awake = node.is_listening();
        node
    }
}

/// The persistence hook. The document layout is fixed; how it is written
/// out is pluggable.
pub trait StateSerializer: Send {
    fn save(&self, state: &PersistedState) -> Result<()>;
    fn load(&self) -> Result<Option<PersistedState>>;
}

/// The default serializer: one JSON file per home id
pub struct JsonFileSerializer {
    path: PathBuf,
}

impl JsonFileSerializer {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl StateSerializer for JsonFileSerializer {
    fn save(&self, state: &PersistedState) -> Result<()> {
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| Error::Config(format!("failed to serialize state: {}", e)))?;
        std::fs::write(&self.path, json)
            .map_err(|e| Error::Config(format!("failed to write state file: {}", e)))?;
        Ok(())
    }

    fn load(&self) -> Result<Option<PersistedState>> {
        let json = match std::fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Config(format!("failed to read state file: {}", e))),
        };
        let state: PersistedState = serde_json::from_str(&json)
            .map_err(|e| Error::Config(format!("state file corrupt: {}", e)))?;
        if state.schema_version != SCHEMA_VERSION {
            return Err(Error::Config(format!(
                "state schema {} incompatible with {}",
                state.schema_version, SCHEMA_VERSION
            )));
        }
        Ok(Some(state))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use zw_core::value_id::ValueGenre;
    use zw_core::values::{Decimal, ValueType};

    fn sample_node() -> Node {
        let mut node = Node::new(NodeId::new(5));
        node.add_command_class(0x31, false);
        node.add_command_class(0x86, false);
        if let Some(cc) = node.classes.get_mut(&0x86) {
            cc.info_mut().version = 2;
        }
        node.groups.insert(
            1,
            Group {
                label: "Lifeline".into(),
                max_associations: 5,
                members: vec![(NodeId::new(1), None)],
            },
        );
        let id = ValueId::new(
            HomeId::new(0xcafe_babe),
            NodeId::new(5),
            ValueGenre::User,
            0x31,
            1,
            1,
            ValueType::Decimal,
        );
        node.store.create(
            id,
            ValueMetadata {
                label: "Temperature".into(),
                units: "C".into(),
                read_only: true,
                ..Default::default()
            },
            None,
        );
        node.store
            .commit_report(&id, Value::Decimal(Decimal::new(2, 2, 420)));
        node
    }

    #[test]
    fn test_node_roundtrip() {
        let node = sample_node();
        let persisted = PersistedNode::from_node(&node);

        let json = serde_json::to_string(&persisted).unwrap();
        let reloaded: PersistedNode = serde_json::from_str(&json).unwrap();
        let restored = reloaded.restore();

        assert_eq!(restored.id, node.id);
        assert_eq!(restored.classes.len(), node.classes.len());
        assert_eq!(restored.classes.get(&0x86).unwrap().info().version, 2);
        assert_eq!(restored.groups, node.groups);
        assert_eq!(restored.store.len(), 1);
        let id = *restored.store.ids().next().unwrap();
        // Decimal precision survives persistence byte-for-byte
        assert_eq!(
            restored.store.get(&id).unwrap().current,
            Some(Value::Decimal(Decimal::new(2, 2, 420)))
        );
    }

    #[test]
    fn test_schema_version_mismatch_rejected() {
        let dir = std::env::temp_dir().join("zw-driver-test-schema");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("state.json");

        let mut state = PersistedState {
            schema_version: SCHEMA_VERSION,
            home_id: HomeId::new(0xcafe_babe),
            own_node_id: NodeId::new(1),
            nodes: vec![],
        };
        let serializer = JsonFileSerializer::new(path.clone());
        serializer.save(&state).unwrap();
        assert!(serializer.load().unwrap().is_some());

        state.schema_version = SCHEMA_VERSION + 1;
        serializer.save(&state).unwrap();
        assert!(matches!(serializer.load(), Err(Error::Config(_))));

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_missing_file_is_not_an_error() {
        let serializer =
            JsonFileSerializer::new(PathBuf::from("/nonexistent/zw-state.json"));
        assert!(serializer.load().unwrap().is_none());
    }
}
