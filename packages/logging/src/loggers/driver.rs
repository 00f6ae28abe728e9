use crate::{LogInfo, LogSink, Loglevel};
use std::sync::Arc;

const LOGO: &str = r"
█▀▀▀ █   █      █   █ █▀▀█ █▀▀▀ ▀▀█▀▀
▄▄▄  █ ▄ █ ▄▄▄  █▄▄▄█ █  █ ▀▀▀▄   █
█▄▄▄  █ █       █   █ █▄▄█ ▄▄▄█   █
";

/// Logs driver-level events: startup, shutdown, lifecycle milestones
pub struct DriverLogger {
    inner: Arc<dyn LogSink>,
}

impl DriverLogger {
    pub fn new(inner: Arc<dyn LogSink>) -> Self {
        Self { inner }
    }

    pub fn logo(&self) {
        let level = Loglevel::Info;
        if self.inner.log_level() < level {
            return;
        }
        let log = LogInfo::builder()
            .label("DRIVER")
            .payload(
                LOGO.lines()
                    .filter(|line| !line.is_empty())
                    .map(|line| line.to_owned().into())
                    .collect::<Vec<_>>(),
            )
            .build();
        self.inner.log(log, level);
    }

    pub fn message<L: Into<String>>(&self, message: impl Fn() -> L, level: Loglevel) {
        if self.inner.log_level() < level {
            return;
        }
        let log = LogInfo::builder()
            .label("DRIVER")
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

    pub fn verbose<L: Into<String>>(&self, message: impl Fn() -> L) {
        self.message(message, Loglevel::Verbose);
    }

    pub fn debug<L: Into<String>>(&self, message: impl Fn() -> L) {
        self.message(message, Loglevel::Debug);
    }

    pub fn silly<L: Into<String>>(&self, message: impl Fn() -> L) {
        self.message(message, Loglevel::Silly);
    }
}
