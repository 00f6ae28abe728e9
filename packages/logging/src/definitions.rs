use std::borrow::Cow;
use typed_builder::TypedBuilder;

/// Log levels, in ascending verbosity. A sink configured at a given level
/// prints everything at or below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Loglevel {
    Off,
    Error,
    Warn,
    Info,
    Verbose,
    Debug,
    Silly,
}

impl std::str::FromStr for Loglevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "error" => Ok(Self::Error),
            "warn" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "verbose" => Ok(Self::Verbose),
            "debug" => Ok(Self::Debug),
            "silly" => Ok(Self::Silly),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

/// Which way a logged frame travelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    None,
    Inbound,
    Outbound,
}

impl Direction {
    pub fn symbol(&self) -> &'static str {
        match self {
            Direction::None => "  ",
            Direction::Inbound => "« ",
            Direction::Outbound => "» ",
        }
    }
}

/// One formatted log entry, ready for a sink
#[derive(Debug, Clone, TypedBuilder)]
pub struct LogInfo {
    /// The subsystem tag, e.g. "SERIAL" or "CNTRLR"
    pub label: &'static str,
    #[builder(default)]
    pub direction: Direction,
    /// Short tags printed in brackets before the message
    #[builder(default)]
    pub primary_tags: Vec<Cow<'static, str>>,
    /// The message lines; continuation lines are indented by the sink
    #[builder(setter(into))]
    pub payload: Vec<Cow<'static, str>>,
}
