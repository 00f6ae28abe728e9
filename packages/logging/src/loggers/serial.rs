use crate::{Direction, LogInfo, LogSink, Loglevel};
use std::sync::Arc;
use zw_serial::frame::ControlFlow;

/// Logs raw traffic on the serial port
pub struct SerialLogger {
    inner: Arc<dyn LogSink>,
}

impl SerialLogger {
    pub fn new(inner: Arc<dyn LogSink>) -> Self {
        Self { inner }
    }

    pub fn data(&self, data: &[u8], direction: Direction) {
        let level = Loglevel::Debug;
        if self.inner.log_level() < level {
            return;
        }
        let log = LogInfo::builder()
            .label("SERIAL")
            .direction(direction)
            .payload(vec![format!("0x{}", hex::encode(data)).into()])
            .build();
        self.inner.log(log, level);
    }

    pub fn control_flow(&self, byte: ControlFlow, direction: Direction) {
        let level = Loglevel::Debug;
        if self.inner.log_level() < level {
            return;
        }
        let log = LogInfo::builder()
            .label("SERIAL")
            .direction(direction)
            .payload(vec![
                format!("[{:?}] (0x{:02x})", byte, byte as u8).into(),
            ])
            .build();
        self.inner.log(log, level);
    }

    pub fn discarded(&self, data: &[u8]) {
        let level = Loglevel::Warn;
        if self.inner.log_level() < level {
            return;
        }
        let log = LogInfo::builder()
            .label("SERIAL")
            .direction(Direction::Inbound)
            .payload(vec![
                format!("invalid data, discarding: 0x{}", hex::encode(data)).into(),
            ])
            .build();
        self.inner.log(log, level);
    }
}
