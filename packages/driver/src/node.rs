use crate::message::Message;
use std::collections::{BTreeMap, VecDeque};
use zw_cc::commandclass::CommandClass;
use zw_cc::registry::create_command_class;
use zw_core::definitions::{NodeId, NodeProtocolInfo};
use zw_core::value_store::ValueStore;

mod query_stage;
pub use query_stage::QueryStage;

/// How many frames for not-yet-created classes a discovering node buffers
const FRAME_BUFFER_LIMIT: usize = 8;

/// An association group on a node. Indices are 1-based on the wire.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Group {
    pub label: String,
    pub max_associations: u8,
    /// Members as (node, optional instance)
    pub members: Vec<(NodeId, Option<u8>)>,
}

/// Everything the driver knows about one device on the mesh
pub struct Node {
    pub id: NodeId,
    pub protocol_info: Option<NodeProtocolInfo>,
    pub manufacturer_id: Option<u16>,
    pub product_type: Option<u16>,
    pub product_id: Option<u16>,
    pub name: String,
    pub location: String,
    /// Supported classes, keyed by class id. Controlled-only (after-mark)
    /// classes are included with their flag set.
    pub classes: BTreeMap<u8, Box<dyn CommandClass>>,
    pub groups: BTreeMap<u8, Group>,
    pub store: ValueStore,

    pub query_stage: QueryStage,
    /// Retries spent on the current stage
    pub stage_attempts: u8,
    /// Messages of the current stage still in the queue or in flight
    pub stage_outstanding: usize,
    /// Reports the current stage still waits for, as (class id, command)
    pub stage_reports: Vec<(u8, u8)>,
    /// Whether the NodeInfo stage still waits for the NIF
    pub awaiting_nif: bool,
    /// Whether NodeQueriesComplete was already emitted
    pub queries_complete: bool,

    /// Non-listening nodes are awake only after a wake-up notification
    pub awake: bool,
    pub dead: bool,
    /// Consecutive send failures; reaching the threshold triggers an
    /// IsFailedNode probe
    pub failure_count: u8,
    /// Messages parked until the node wakes up
    pub wakeup_queue: VecDeque<Message>,
    /// Frames that arrived before their class existed
    pub buffered_frames: VecDeque<Vec<u8>>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("stage", &self.query_stage)
            .field("classes", &self.classes.keys().collect::<Vec<_>>())
            .field("awake", &self.awake)
            .field("dead", &self.dead)
            .finish()
    }
}

impl Node {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            protocol_info: None,
            manufacturer_id: None,
            product_type: None,
            product_id: None,
            name: String::new(),
            location: String::new(),
            classes: BTreeMap::new(),
            groups: BTreeMap::new(),
            store: ValueStore::new(),
            query_stage: QueryStage::first(),
            stage_attempts: 0,
            stage_outstanding: 0,
            stage_reports: Vec::new(),
            awaiting_nif: false,
            queries_complete: false,
            // Until protocol info says otherwise, assume the node listens
            awake: true,
            dead: false,
            failure_count: 0,
            wakeup_queue: VecDeque::new(),
            buffered_frames: VecDeque::new(),
        }
    }

    pub fn is_listening(&self) -> bool {
        self.protocol_info
            .map(|info| info.listening)
            .unwrap_or(true)
    }

    pub fn is_awake(&self) -> bool {
        self.is_listening() || self.awake
    }

    pub fn supports_cc(&self, cc_id: u8) -> bool {
        self.classes
            .get(&cc_id)
            .map(|cc| !cc.info().after_mark)
            .unwrap_or(false)
    }

    /// Registers a class from a NIF or persisted state. Creates the
    /// implementation through the registry; unimplemented ids are
    /// remembered by id only, through a placeholder entry.
    pub fn add_command_class(&mut self, cc_id: u8, after_mark: bool) -> bool {
        if self.classes.contains_key(&cc_id) {
            return false;
        }
        let Some(mut cc) = create_command_class(cc_id) else {
            return false;
        };
        cc.info_mut().after_mark = after_mark;
        self.classes.insert(cc_id, cc);
        true
    }

    /// Buffers a frame that arrived before its class was created; the
    /// oldest is dropped on overflow.
    pub fn buffer_frame(&mut self, frame: Vec<u8>) {
        if self.buffered_frames.len() >= FRAME_BUFFER_LIMIT {
            self.buffered_frames.pop_front();
        }
        self.buffered_frames.push_back(frame);
    }

    /// Resets the per-stage bookkeeping when entering a new stage
    pub fn enter_stage(&mut self, stage: QueryStage) {
        self.query_stage = stage;
        self.stage_attempts = 0;
        self.stage_outstanding = 0;
        self.stage_reports.clear();
        self.awaiting_nif = false;
        if !stage.is_complete() {
            self.queries_complete = false;
        }
    }

    /// Whether the current stage has nothing left outstanding
    pub fn stage_settled(&self) -> bool {
        self.stage_outstanding == 0 && self.stage_reports.is_empty() && !self.awaiting_nif
    }

    /// Records an inbound report against the current stage. Returns true
    /// if the stage was waiting for it.
    pub fn note_stage_report(&mut self, cc_id: u8, cc_command: u8) -> bool {
        match self
            .stage_reports
            .iter()
            .position(|&(id, cmd)| id == cc_id && cmd == cc_command)
        {
            Some(index) => {
                self.stage_reports.remove(index);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_add_command_class() {
        let mut node = Node::new(NodeId::new(5));
        assert!(node.add_command_class(0x25, false));
        // Adding again is a no-op
        assert!(!node.add_command_class(0x25, false));
        assert!(node.supports_cc(0x25));
    }

    #[test]
    fn test_after_mark_not_supported() {
        let mut node = Node::new(NodeId::new(5));
        node.add_command_class(0x20, true);
        assert!(!node.supports_cc(0x20));
        assert!(node.classes.contains_key(&0x20));
    }

    #[test]
    fn test_frame_buffer_bounded() {
        let mut node = Node::new(NodeId::new(5));
        for i in 0..20u8 {
            node.buffer_frame(vec![0x25, 0x03, i]);
        }
        assert_eq!(node.buffered_frames.len(), FRAME_BUFFER_LIMIT);
        // The oldest were dropped
        assert_eq!(node.buffered_frames[0], vec![0x25, 0x03, 12]);
    }

    #[test]
    fn test_stage_report_tracking() {
        let mut node = Node::new(NodeId::new(5));
        node.enter_stage(QueryStage::Static);
        node.stage_reports.push((0x86, 0x12));
        assert!(!node.stage_settled());
        assert!(node.note_stage_report(0x86, 0x12));
        assert!(!node.note_stage_report(0x86, 0x12));
        assert!(node.stage_settled());
    }

    #[test]
    fn test_unlistening_node_awake_gating() {
        let mut node = Node::new(NodeId::new(7));
        let mut info = NodeProtocolInfo::default();
        info.listening = false;
        node.protocol_info = Some(info);
        node.awake = false;
        assert!(!node.is_awake());
        node.awake = true;
        assert!(node.is_awake());
    }
}
