//! Typed model of borg's `--log-json` stderr stream.
//!
//! Every line is one JSON object whose `type` field selects the shape. A `type`
//! this crate does not know fails the decode: an unknown shape may come from a borg
//! version nobody validated against, and guessing about backup state is worse than
//! stopping.

use crate::borg::result_error::error::Error;
use crate::borg::result_error::result::Result;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::io::BufRead;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum LogLine {
    ArchiveProgress(ArchiveProgressLine),
    ProgressMessage(ProgressMessageLine),
    ProgressPercent(ProgressPercentLine),
    LogMessage(LogMessageLine),
}

/// Field-less mirror of [`LogLine`] used to tell an unknown `type` apart from a
/// known `type` with a broken payload.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LogLineKind {
    ArchiveProgress,
    ProgressMessage,
    ProgressPercent,
    LogMessage,
}

/// Statistics of the archive being created. The terminal line only carries
/// `finished: true`.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ArchiveProgressLine {
    pub path: Option<String>,
    pub original_size: Option<u64>,
    pub compressed_size: Option<u64>,
    pub deduplicated_size: Option<u64>,
    #[serde(rename = "nfiles")]
    pub file_count: Option<u64>,
    #[serde(default)]
    pub finished: bool,
    pub time: Option<f64>,
}

#[skip_serializing_none]
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ProgressMessageLine {
    #[serde(rename = "operation")]
    pub operation_id: u64,
    pub msgid: Option<String>,
    pub message: Option<String>,
    #[serde(default)]
    pub finished: bool,
    pub time: Option<f64>,
}

#[skip_serializing_none]
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ProgressPercentLine {
    #[serde(rename = "operation")]
    pub operation_id: u64,
    pub msgid: Option<String>,
    pub message: Option<String>,
    pub current: Option<u64>,
    pub total: Option<u64>,
    #[serde(default)]
    pub finished: bool,
    pub time: Option<f64>,
}

impl ProgressPercentLine {
    /// `None` on the terminal line and when borg reports a zero total.
    pub fn percent(&self) -> Option<f64> {
        match (self.current, self.total) {
            (Some(current), Some(total)) if total > 0 => {
                Some(current as f64 * 100.0 / total as f64)
            }
            _ => None,
        }
    }
}

#[skip_serializing_none]
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct LogMessageLine {
    #[serde(rename = "msgid")]
    pub message_id: Option<String>,
    pub message: String,
    #[serde(rename = "levelname")]
    pub level: String,
    pub name: Option<String>,
    pub time: Option<f64>,
}

impl LogLine {
    pub fn kind(&self) -> LogLineKind {
        match self {
            LogLine::ArchiveProgress(_) => LogLineKind::ArchiveProgress,
            LogLine::ProgressMessage(_) => LogLineKind::ProgressMessage,
            LogLine::ProgressPercent(_) => LogLineKind::ProgressPercent,
            LogLine::LogMessage(_) => LogLineKind::LogMessage,
        }
    }

    /// Whether this line is the last update of its sub-operation.
    pub fn finished(&self) -> bool {
        match self {
            LogLine::ArchiveProgress(l) => l.finished,
            LogLine::ProgressMessage(l) => l.finished,
            LogLine::ProgressPercent(l) => l.finished,
            LogLine::LogMessage(_) => false,
        }
    }
}

#[derive(Deserialize)]
struct Discriminator {
    #[serde(rename = "type")]
    kind: serde_json::Value,
}

/// Decodes one line of borg JSON log output.
pub fn decode_line(line: &str) -> Result<LogLine> {
    serde_json::from_str::<LogLine>(line).map_err(|e| {
        match serde_json::from_str::<Discriminator>(line) {
            Ok(Discriminator { kind }) => {
                if serde_json::from_value::<LogLineKind>(kind.clone()).is_ok() {
                    Error::from(e)
                } else {
                    Error::UnrecognizedLogLine {
                        kind: kind.as_str().map(str::to_string).unwrap_or_else(|| kind.to_string()),
                        line: line.to_string(),
                    }
                }
            }
            Err(_) => Error::from(e),
        }
    })
}

/// Decodes every non-blank line, failing on the first line that does not decode.
pub fn decode_lines<R: BufRead>(reader: R) -> Result<Vec<LogLine>> {
    reader
        .lines()
        .filter(|line| !matches!(line, Ok(l) if l.trim().is_empty()))
        .map(|line| decode_line(&line?))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_decode_archive_progress() {
        let line = r#"{"type": "archive_progress", "original_size": 100, "compressed_size": 80, "deduplicated_size": 10, "nfiles": 3, "path": "tmp/backmeupdir1/test1.txt", "time": 1654268720.1}"#;

        match decode_line(line).unwrap() {
            LogLine::ArchiveProgress(p) => {
                assert_eq!(p.original_size, Some(100));
                assert_eq!(p.compressed_size, Some(80));
                assert_eq!(p.deduplicated_size, Some(10));
                assert_eq!(p.file_count, Some(3));
                assert_eq!(p.path.as_deref(), Some("tmp/backmeupdir1/test1.txt"));
                assert!(!p.finished);
            }
            other => panic!("Expected ArchiveProgress, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_progress_message_finished() {
        let line = r#"{"type": "progress_message", "operation": 2, "msgid": "cache.begin_transaction", "finished": true, "time": 1654268720.2}"#;

        let decoded = decode_line(line).unwrap();
        assert_eq!(decoded.kind(), LogLineKind::ProgressMessage);
        assert!(decoded.finished());
        match decoded {
            LogLine::ProgressMessage(m) => {
                assert_eq!(m.operation_id, 2);
                assert_eq!(m.message, None);
            }
            other => panic!("Expected ProgressMessage, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_progress_percent() {
        let line = r#"{"type": "progress_percent", "operation": 3, "msgid": "extract", "finished": false, "message": " 50.0% Extracting: tmp/a", "current": 5, "total": 10, "info": ["tmp/a"], "time": 1654268720.3}"#;

        match decode_line(line).unwrap() {
            LogLine::ProgressPercent(p) => {
                assert_eq!(p.operation_id, 3);
                assert_eq!(p.percent(), Some(50.0));
                assert!(!p.finished);
            }
            other => panic!("Expected ProgressPercent, got {other:?}"),
        }
    }

    #[test]
    fn test_percent_absent_on_zero_total() {
        let line = ProgressPercentLine {
            current: Some(0),
            total: Some(0),
            ..Default::default()
        };
        assert_eq!(line.percent(), None);
    }

    #[test]
    fn test_decode_log_message() {
        let line = r#"{"type": "log_message", "time": 1654268720.0201778, "message": "Failed to create/acquire the lock /repo/lock.exclusive (timeout).", "levelname": "ERROR", "name": "borg.archiver", "msgid": "LockTimeout"}"#;

        match decode_line(line).unwrap() {
            LogLine::LogMessage(m) => {
                assert_eq!(m.message_id.as_deref(), Some("LockTimeout"));
                assert_eq!(m.level, "ERROR");
            }
            other => panic!("Expected LogMessage, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_unknown_type_is_unrecognized() {
        let line = r#"{"type": "file_status", "status": "A", "path": "tmp/a"}"#;

        match decode_line(line) {
            Err(Error::UnrecognizedLogLine { kind, .. }) => assert_eq!(kind, "file_status"),
            other => panic!("Expected UnrecognizedLogLine, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_known_type_bad_payload_is_not_unrecognized() {
        let line = r#"{"type": "progress_message", "operation": "not a number"}"#;

        assert!(matches!(decode_line(line), Err(Error::SerdeJson(_))));
    }

    #[test]
    fn test_decode_missing_type() {
        assert!(matches!(
            decode_line(r#"{"message": "hi"}"#),
            Err(Error::SerdeJson(_))
        ));
    }

    #[test]
    fn test_decode_lines_skips_blank_lines() {
        let input = "\n{\"type\": \"progress_message\", \"operation\": 1, \"finished\": true}\n\n";
        let lines = decode_lines(Cursor::new(input)).unwrap();
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn test_kind_names_match_discriminators() {
        for (kind, name) in [
            (LogLineKind::ArchiveProgress, "archive_progress"),
            (LogLineKind::ProgressMessage, "progress_message"),
            (LogLineKind::ProgressPercent, "progress_percent"),
            (LogLineKind::LogMessage, "log_message"),
        ] {
            assert_eq!(serde_json::to_value(kind).unwrap(), name);
        }
    }
}
