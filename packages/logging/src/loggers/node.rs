use crate::{Direction, LogInfo, LogSink, Loglevel};
use std::borrow::Cow;
use std::sync::Arc;
use zw_core::definitions::NodeId;

/// Logs per-node events, tagged with the node id (and instance where it
/// matters)
pub struct NodeLogger {
    node_id: NodeId,
    instance: u8,
    inner: Arc<dyn LogSink>,
}

impl NodeLogger {
    pub fn new(inner: Arc<dyn LogSink>, node_id: NodeId) -> Self {
        Self {
            inner,
            node_id,
            instance: 1,
        }
    }

    pub fn with_instance(mut self, instance: u8) -> Self {
        self.instance = instance;
        self
    }

    fn tags(&self) -> Vec<Cow<'static, str>> {
        let mut tags: Vec<Cow<'static, str>> =
            vec![format!("Node {:0>3}", self.node_id).into()];
        if self.instance > 1 {
            tags.push(format!("Inst {}", self.instance).into());
        }
        tags
    }

    pub fn message<L: Into<String>>(&self, message: impl Fn() -> L, level: Loglevel) {
        if self.inner.log_level() < level {
            return;
        }
        let log = LogInfo::builder()
            .label("CNTRLR")
            .primary_tags(self.tags())
            .payload(vec![message().into().into()])
            .build();
        self.inner.log(log, level);
    }

    pub fn command(&self, description: String, direction: Direction) {
        let level = Loglevel::Debug;
        if self.inner.log_level() < level {
            return;
        }
        let log = LogInfo::builder()
            .label("CNTRLR")
            .direction(direction)
            .primary_tags(self.tags())
            .payload(vec![description.into()])
            .build();
        self.inner.log(log, level);
    }

    pub fn error<L: Into<String>>(&self, message: impl Fn() -> L) {
        self.message(message, Loglevel::Error);
    }

    pub fn warn<L: Into<String>>(&self, message: impl Fn() -> L) {
        self.message(message, Loglevel::Warn);
    }

    pub fn info<L: Into<String>>(&self, message: impl Fn() -> L) {
        self.message(message, Loglevel::Info);
    }

    pub fn debug<L: Into<String>>(&self, message: impl Fn() -> L) {
        self.message(message, Loglevel::Debug);
    }

    pub fn silly<L: Into<String>>(&self, message: impl Fn() -> L) {
        self.message(message, Loglevel::Silly);
    }
}
