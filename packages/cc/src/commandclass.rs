use std::fmt::Debug;
use thiserror::Error;
use zw_core::prelude::*;
use zw_core::value_store::{ValueEvent, ValueMetadata, ValueStore};

mod association;
mod basic;
mod binary_switch;
mod configuration;
mod manufacturer_specific;
mod multi_cmd;
mod multi_instance;
mod no_operation;
mod security;
mod sensor_multilevel;
mod version;
mod wake_up;

pub use association::*;
pub use basic::*;
pub use binary_switch::*;
pub use configuration::*;
pub use manufacturer_specific::*;
pub use multi_cmd::*;
pub use multi_instance::*;
pub use no_operation::*;
pub use security::*;
pub use sensor_multilevel::*;
pub use version::*;
pub use wake_up::*;

#[derive(Error, Debug, PartialEq)]
pub enum CcError {
    #[error("malformed command: {0}")]
    Malformed(String),
    #[error("operation not supported by this command class")]
    NotSupported,
    #[error("invalid value: {0}")]
    InvalidValue(String),
    #[error("security verification failed: {0}")]
    SecurityFailure(String),
}

/// State every command class instance carries, regardless of variant
#[derive(Debug, Clone, PartialEq)]
pub struct CcInfo {
    /// The version the node implements, negotiated via the Version class.
    /// 1 until proven otherwise.
    pub version: u8,
    /// How many instances/endpoints the node exposes for this class
    pub instance_count: u8,
    /// Whether commands of this class must be wrapped in S0 encapsulation
    pub secure: bool,
    /// Classes listed after the NIF mark are controlled by the node, not
    /// supported: inbound frames are surfaced but never update values
    pub after_mark: bool,
}

impl Default for CcInfo {
    fn default() -> Self {
        Self {
            version: 1,
            instance_count: 1,
            secure: false,
            after_mark: false,
        }
    }
}

/// Which flavor of interview requests a [CommandClass::request_state] call
/// should produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    /// One-time capability queries that never change
    Static,
    /// Queries that must be refreshed each session
    Session,
    /// Current-state queries (levels, sensor readings)
    Dynamic,
}

/// A command-class frame a class wants sent to its node. The driver wraps
/// it into SendData and applies encapsulation.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingCc {
    /// Class id, command and parameters, unencapsulated
    pub cc_bytes: Vec<u8>,
    /// The instance/endpoint this command addresses
    pub instance: u8,
    /// The (class id, command) of the report that answers this command,
    /// if one is expected
    pub expects_report: Option<(u8, u8)>,
    /// Whether the frame must go through the S0 handshake
    pub secure: bool,
}

impl OutgoingCc {
    pub fn new(cc_bytes: Vec<u8>) -> Self {
        Self {
            cc_bytes,
            instance: 1,
            expects_report: None,
            secure: false,
        }
    }

    pub fn expecting(mut self, cc_id: u8, cc_command: u8) -> Self {
        self.expects_report = Some((cc_id, cc_command));
        self
    }

    pub fn for_instance(mut self, instance: u8) -> Self {
        self.instance = instance;
        self
    }

    pub fn via_security(mut self) -> Self {
        self.secure = true;
        self
    }
}

/// What a handled frame means beyond value updates. Effects that cross
/// class boundaries are returned here instead of being applied directly,
/// so classes stay free of driver state.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// The frame was understood and any values were updated
    Consumed,
    /// The command is not one this class handles
    NotHandled,
    /// A Version report about another class
    ClassVersion { cc_id: u8, version: u8 },
    /// A multi-instance report about another class
    InstanceCount { cc_id: u8, count: u8 },
    /// A multi-channel endpoint report
    EndpointCount { count: u8 },
    /// The node woke up and will listen for a short while
    WakeUpNotification,
    /// An event the embedder should see (e.g. an unsolicited Basic Set)
    NodeEvent { event: u8 },
    /// The node identified itself
    ManufacturerInfo {
        manufacturer_id: u16,
        product_type: u16,
        product_id: u16,
    },
    /// The node reported how many association groups it has
    GroupCount { count: u8 },
    /// The members of one association group
    GroupMembers {
        group_idx: u8,
        max_associations: u8,
        node_ids: Vec<NodeId>,
    },
    /// An encapsulated frame addressed to the given instance
    Encapsulated { instance: u8, inner: Vec<u8> },
    /// A batch of complete inner frames (MultiCmd)
    Batch { frames: Vec<Vec<u8>> },
    /// The peer asks for a nonce so it can send us something secure
    NonceGet,
    /// The nonce we asked for arrived
    NonceReport { nonce: [u8; 8] },
    /// A security-encapsulated frame, decrypted and verified
    SecureFrame { inner: Vec<u8> },
}

/// Everything a command class may touch while handling a frame: the node's
/// value store and the event list the driver drains afterwards.
pub struct CcContext<'a> {
    pub home_id: HomeId,
    /// The node this frame belongs to
    pub node_id: NodeId,
    /// The controller's own node id (needed for security authentication)
    pub own_node_id: NodeId,
    pub store: &'a mut ValueStore,
    pub events: &'a mut Vec<ValueEvent>,
}

impl<'a> CcContext<'a> {
    pub fn new(
        home_id: HomeId,
        node_id: NodeId,
        own_node_id: NodeId,
        store: &'a mut ValueStore,
        events: &'a mut Vec<ValueEvent>,
    ) -> Self {
        Self {
            home_id,
            node_id,
            own_node_id,
            store,
            events,
        }
    }

    pub fn value_id(
        &self,
        genre: ValueGenre,
        cc_id: u8,
        instance: u8,
        index: u8,
        value_type: ValueType,
    ) -> ValueId {
        ValueId::new(
            self.home_id,
            self.node_id,
            genre,
            cc_id,
            instance,
            index,
            value_type,
        )
    }

    /// Creates a value, collecting the Added event if it is new
    pub fn create_value(&mut self, id: ValueId, metadata: ValueMetadata) {
        if let Some(event) = self.store.create(id, metadata, None) {
            self.events.push(event);
        }
    }

    /// Commits a reported value, creating it on the fly if the class never
    /// declared it. Collects the resulting events.
    pub fn commit_report(&mut self, id: ValueId, metadata: ValueMetadata, value: Value) {
        if let Some(event) = self.store.create(id, metadata, None) {
            self.events.push(event);
        }
        if let Some(event) = self.store.commit_report(&id, value) {
            self.events.push(event);
        }
    }
}

/// One command class on one node. Created through the
/// [registry](crate::registry) when a NIF or persisted state names the
/// class id.
pub trait CommandClass: Debug + Send {
    fn cc_id(&self) -> u8;
    fn name(&self) -> &'static str;

    fn info(&self) -> &CcInfo;
    fn info_mut(&mut self) -> &mut CcInfo;

    /// Handles an inbound frame of this class. `cmd` is the command byte,
    /// `payload` everything after it.
    fn handle_msg(
        &mut self,
        ctx: &mut CcContext,
        cmd: u8,
        payload: &[u8],
        instance: u8,
    ) -> Result<Disposition, CcError>;

    /// The queries to run during the given interview phase
    fn request_state(&self, kind: StateKind, instance: u8) -> Vec<OutgoingCc> {
        let _ = (kind, instance);
        Vec::new()
    }

    /// A single-value refresh, used by the poll scheduler
    fn request_value(&self, index: u8, instance: u8) -> Option<OutgoingCc> {
        let _ = (index, instance);
        None
    }

    /// Encodes a SET for the given value
    fn set_value(&self, value_id: &ValueId, value: &Value) -> Result<Vec<OutgoingCc>, CcError> {
        let _ = (value_id, value);
        Err(CcError::NotSupported)
    }

    /// Declares the values of a fresh instance in the store
    fn create_vars(&self, ctx: &mut CcContext, instance: u8) {
        let _ = (ctx, instance);
    }

    /// Concrete access for the classes the driver must talk to directly
    fn as_security_mut(&mut self) -> Option<&mut SecurityCc> {
        None
    }

    fn as_wake_up_mut(&mut self) -> Option<&mut WakeUpCc> {
        None
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;
    use zw_core::value_store::ValueStore;

    pub struct Harness {
        pub store: ValueStore,
        pub events: Vec<ValueEvent>,
    }

    impl Harness {
        pub fn new() -> Self {
            Self {
                store: ValueStore::new(),
                events: Vec::new(),
            }
        }

        pub fn handle(
            &mut self,
            cc: &mut dyn CommandClass,
            cc_bytes: &[u8],
        ) -> Result<Disposition, CcError> {
            let mut ctx = CcContext::new(
                HomeId::new(0x1234_5678),
                NodeId::new(5),
                NodeId::new(1),
                &mut self.store,
                &mut self.events,
            );
            assert_eq!(cc_bytes[0], cc.cc_id());
            cc.handle_msg(&mut ctx, cc_bytes[1], &cc_bytes[2..], 1)
        }
    }
}
