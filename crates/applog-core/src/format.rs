//! Line formatting and terminal colour.

use owo_colors::OwoColorize;

use crate::level::Severity;
use crate::record::LogRecord;

/// Line written to directory and file transports:
/// `<timestamp> <process>:<module>:<function>:<level>: <message>\n`
pub fn file_line(record: &LogRecord) -> String {
    format!(
        "{} {}:{}:{}:{}: {}\n",
        record.timestamp_string(),
        record.process,
        record.module,
        record.function,
        record.level,
        record.message
    )
}

/// Line written to stdout/stderr: `<level>:<module>:<function>: <message>`
pub fn stream_line(record: &LogRecord, colour: bool) -> String {
    if !colour {
        return format!(
            "{}:{}:{}: {}",
            record.level, record.module, record.function, record.message
        );
    }
    let text = format!(
        "{}:{}:{}: {}",
        record.level.as_str().bold(),
        record.module.dimmed(),
        record.function.underline(),
        record.message
    );
    colorize(record.level, &text)
}

/// Wrap `text` in the colour associated with `level`.
pub fn colorize(level: Severity, text: &str) -> String {
    match level {
        Severity::Emerg | Severity::Alert | Severity::Crit | Severity::Error => {
            text.red().to_string()
        }
        Severity::Warn => text.yellow().to_string(),
        Severity::Note => text.magenta().to_string(),
        Severity::Info => text.blue().to_string(),
        Severity::Debug => text.green().to_string(),
    }
}
