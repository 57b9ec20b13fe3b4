//! Severity model.
//!
//! Eight ordered levels following RFC 5424 naming, where a lower rank is
//! more severe. A transport with threshold `t` admits a message of level `m`
//! iff `m.rank() <= t.rank()`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{LogError, LogResult};

/// Log severity, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Emerg = 0,
    Alert = 1,
    Crit = 2,
    Error = 3,
    Warn = 4,
    Note = 5,
    Info = 6,
    Debug = 7,
}

impl Severity {
    /// Every level in rank order.
    pub const ALL: [Severity; 8] = [
        Severity::Emerg,
        Severity::Alert,
        Severity::Crit,
        Severity::Error,
        Severity::Warn,
        Severity::Note,
        Severity::Info,
        Severity::Debug,
    ];

    pub fn rank(self) -> u8 {
        self as u8
    }

    /// Whether a message at this level passes a transport set to `threshold`.
    pub fn admits(self, threshold: Severity) -> bool {
        self.rank() <= threshold.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Emerg => "emerg",
            Severity::Alert => "alert",
            Severity::Crit => "crit",
            Severity::Error => "error",
            Severity::Warn => "warn",
            Severity::Note => "note",
            Severity::Info => "info",
            Severity::Debug => "debug",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Severity::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| LogError::UnknownLevel(s.to_string()))
    }
}

impl From<tracing::Level> for Severity {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::ERROR => Severity::Error,
            tracing::Level::WARN => Severity::Warn,
            tracing::Level::INFO => Severity::Info,
            // TRACE has no counterpart; debug is the least severe level
            tracing::Level::DEBUG | tracing::Level::TRACE => Severity::Debug,
        }
    }
}

/// Rank of a level given by name.
pub fn rank(name: &str) -> LogResult<u8> {
    Ok(name.parse::<Severity>()?.rank())
}

/// Whether `message_level` is delivered on a transport at `transport_level`.
pub fn admits(message_level: &str, transport_level: &str) -> LogResult<bool> {
    let message: Severity = message_level.parse()?;
    let transport: Severity = transport_level.parse()?;
    Ok(message.admits(transport))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_order() {
        let ranks: Vec<u8> = Severity::ALL.iter().map(|l| l.rank()).collect();
        assert_eq!(ranks, vec![0, 1, 2, 3, 4, 5, 6, 7]);
        assert!(Severity::Emerg < Severity::Debug);
    }

    #[test]
    fn test_admits_matrix() {
        for message in Severity::ALL {
            for threshold in Severity::ALL {
                assert_eq!(
                    message.admits(threshold),
                    message.rank() <= threshold.rank(),
                    "{message} on {threshold}"
                );
            }
        }
    }

    #[test]
    fn test_parse_by_name() {
        assert_eq!("note".parse::<Severity>().unwrap(), Severity::Note);
        assert_eq!(rank("crit").unwrap(), 2);
        assert!(admits("error", "warn").unwrap());
        assert!(!admits("debug", "info").unwrap());
    }

    #[test]
    fn test_unknown_level_is_rejected() {
        let err = "verbose".parse::<Severity>().unwrap_err();
        assert!(matches!(err, LogError::UnknownLevel(name) if name == "verbose"));
        assert!(admits("info", "trace").is_err());
        // Names are exact, not case-folded
        assert!("INFO".parse::<Severity>().is_err());
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&Severity::Warn).unwrap();
        assert_eq!(json, "\"warn\"");
        let level: Severity = serde_json::from_str("\"emerg\"").unwrap();
        assert_eq!(level, Severity::Emerg);
    }

    #[test]
    fn test_from_tracing_level() {
        assert_eq!(Severity::from(tracing::Level::ERROR), Severity::Error);
        assert_eq!(Severity::from(tracing::Level::TRACE), Severity::Debug);
    }
}
