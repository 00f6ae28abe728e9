use crate::{Direction, LogInfo, LogSink, Loglevel};
use std::borrow::Cow;
use std::sync::Arc;
use zw_serial::command::{Command, CommandId};
use zw_core::definitions::CommandType;

/// Logs commands exchanged with the controller itself
pub struct ControllerLogger {
    inner: Arc<dyn LogSink>,
}

impl ControllerLogger {
    pub fn new(inner: Arc<dyn LogSink>) -> Self {
        Self { inner }
    }

    pub fn command(&self, command: &Command, direction: Direction) {
        let level = Loglevel::Debug;
        if self.inner.log_level() < level {
            return;
        }

        let type_tag = if command.command_type() == CommandType::Request {
            "REQ"
        } else {
            "RES"
        };
        let function_tag: Cow<'static, str> = match command.function_type() {
            Some(function_type) => format!("{:?}", function_type).into(),
            None => format!("0x{:02x}", command.function()).into(),
        };

        let log = LogInfo::builder()
            .label("CNTRLR")
            .direction(direction)
            .primary_tags(vec![type_tag.into(), function_tag])
            .payload(vec![format!("{:?}", command).into()])
            .build();
        self.inner.log(log, level);
    }

    pub fn message<L: Into<String>>(&self, message: impl Fn() -> L, level: Loglevel) {
        if self.inner.log_level() < level {
            return;
        }
        let log = LogInfo::builder()
            .label("CNTRLR")
            .payload(vec![message().into().into()])
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
}
