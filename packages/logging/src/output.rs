use crate::{LogInfo, Loglevel};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Where log entries end up. Sinks are shared between all loggers of a
/// driver and must tolerate concurrent callers.
pub trait LogSink: Send + Sync {
    fn log(&self, info: LogInfo, level: Loglevel);
    fn log_level(&self) -> Loglevel;
}

/// Swallows everything. Used when logging is disabled.
pub struct NullSink;

impl LogSink for NullSink {
    fn log(&self, _info: LogInfo, _level: Loglevel) {}

    fn log_level(&self) -> Loglevel {
        Loglevel::Off
    }
}

fn level_color(level: Loglevel) -> Option<Color> {
    match level {
        Loglevel::Error => Some(Color::Red),
        Loglevel::Warn => Some(Color::Yellow),
        Loglevel::Info => Some(Color::Green),
        Loglevel::Verbose | Loglevel::Debug => Some(Color::Blue),
        Loglevel::Silly => Some(Color::Magenta),
        Loglevel::Off => None,
    }
}

fn format_lines(info: &LogInfo) -> Vec<String> {
    let timestamp = chrono::Local::now().format("%H:%M:%S%.3f");
    let tags = info
        .primary_tags
        .iter()
        .map(|tag| format!("[{}]", tag))
        .collect::<Vec<_>>()
        .join(" ");

    let mut lines = Vec::with_capacity(info.payload.len());
    let mut first = true;
    for line in &info.payload {
        if first {
            let mut head = format!(
                "{} {} {}",
                timestamp,
                info.label,
                info.direction.symbol()
            );
            if !tags.is_empty() {
                head.push_str(&tags);
                head.push(' ');
            }
            head.push_str(line);
            lines.push(head);
            first = false;
        } else {
            lines.push(format!("{:>22}{}", "", line));
        }
    }
    lines
}

/// Writes colored log lines to the console
pub struct ConsoleSink {
    level: Loglevel,
    stream: Mutex<StandardStream>,
}

impl ConsoleSink {
    pub fn new(level: Loglevel) -> Self {
        Self {
            level,
            stream: Mutex::new(StandardStream::stdout(ColorChoice::Auto)),
        }
    }
}

impl LogSink for ConsoleSink {
    fn log(&self, info: LogInfo, level: Loglevel) {
        if self.level < level {
            return;
        }
        let lines = format_lines(&info);
        let mut stream = self.stream.lock().expect("log stream poisoned");
        let mut spec = ColorSpec::new();
        spec.set_fg(level_color(level));
        let _ = stream.set_color(&spec);
        for line in lines {
            let _ = writeln!(stream, "{}", line);
        }
        let _ = stream.reset();
    }

    fn log_level(&self) -> Loglevel {
        self.level
    }
}

/// Appends plain log lines to a file
pub struct FileSink {
    level: Loglevel,
    file: Mutex<File>,
}

impl FileSink {
    pub fn new(path: &Path, level: Loglevel, append: bool) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(path)?;
        Ok(Self {
            level,
            file: Mutex::new(file),
        })
    }
}

impl LogSink for FileSink {
    fn log(&self, info: LogInfo, level: Loglevel) {
        if self.level < level {
            return;
        }
        let lines = format_lines(&info);
        let mut file = self.file.lock().expect("log file poisoned");
        for line in lines {
            let _ = writeln!(file, "{}", line);
        }
    }

    fn log_level(&self) -> Loglevel {
        self.level
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Direction;

    #[test]
    fn test_format_continuation_lines() {
        let info = LogInfo::builder()
            .label("CNTRLR")
            .direction(Direction::Inbound)
            .primary_tags(vec!["Node 005".into()])
            .payload(vec!["first".into(), "second".into()])
            .build();
        let lines = format_lines(&info);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("[Node 005]"));
        assert!(lines[0].contains("first"));
        assert!(lines[1].ends_with("second"));
    }
}
