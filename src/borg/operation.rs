use crate::borg::log_line::{decode_lines, LogLine};
use crate::borg::result_error::error::Error;
use crate::borg::result_error::result::Result;
use crate::borg::result_error::WithMsg;
use getset::Getters;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Progress of one logged borg invocation.
///
/// The lines are read once at construction and never change afterwards. Only
/// [`Operation::last_line`] should be treated as the current status.
#[derive(Clone, Debug, PartialEq, Getters)]
pub struct Operation {
    #[getset(get = "pub")]
    progress_file: Option<PathBuf>,
    lines: Vec<LogLine>,
}

impl Operation {
    pub fn from_progress_file<P: AsRef<Path>>(progress_file: P) -> Result<Self> {
        let progress_file = progress_file.as_ref();
        let lines = File::open(progress_file)
            .map(BufReader::new)
            .map_err(Error::from)
            .and_then(decode_lines)
            .with_msg(format!("Reading progress file {:?} failed", progress_file))?;

        tracing::debug!("Loaded {} lines from {:?}", lines.len(), progress_file);
        Ok(Operation {
            progress_file: Some(progress_file.to_path_buf()),
            lines,
        })
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        Ok(Operation {
            progress_file: None,
            lines: decode_lines(reader)?,
        })
    }

    pub fn lines(&self) -> &[LogLine] {
        &self.lines
    }

    /// `None` when borg did not log anything.
    pub fn last_line(&self) -> Option<&LogLine> {
        self.lines.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::borg::log_line::LogLineKind;
    use std::io::{Cursor, Write};
    use tempfile::NamedTempFile;

    static KNOWN_TYPES: &str = r#"{"type": "archive_progress", "original_size": 0, "compressed_size": 0, "deduplicated_size": 0, "nfiles": 0, "path": "", "time": 1654268720.0}
{"type": "progress_message", "operation": 1, "msgid": "cache.begin_transaction", "finished": false, "message": "Initializing cache transaction: Reading config", "time": 1654268720.1}
{"type": "progress_message", "operation": 1, "msgid": "cache.begin_transaction", "finished": false, "message": "Initializing cache transaction: Reading chunks", "time": 1654268720.2}
{"type": "progress_message", "operation": 1, "msgid": "cache.begin_transaction", "finished": false, "message": "Initializing cache transaction: Reading files", "time": 1654268720.3}
{"type": "progress_message", "operation": 1, "msgid": "cache.begin_transaction", "finished": true, "time": 1654268720.4}
{"type": "archive_progress", "original_size": 5, "compressed_size": 5, "deduplicated_size": 5, "nfiles": 1, "path": "tmp/backmeupdir1/test1.txt", "time": 1654268720.5}
{"type": "archive_progress", "original_size": 10, "compressed_size": 10, "deduplicated_size": 10, "nfiles": 2, "path": "tmp/backmeupdir2/test2.txt", "time": 1654268720.6}
{"type": "progress_message", "operation": 2, "msgid": "cache.commit", "finished": false, "message": "Saving files cache", "time": 1654268720.7}
{"type": "progress_message", "operation": 2, "msgid": "cache.commit", "finished": false, "message": "Saving chunks cache", "time": 1654268720.8}
{"type": "progress_message", "operation": 2, "msgid": "cache.commit", "finished": false, "message": "Saving cache config", "time": 1654268720.9}
{"type": "progress_percent", "operation": 3, "msgid": "compact.report_progress", "finished": false, "message": "Compacting segments  50%", "current": 1, "total": 2, "time": 1654268721.0}
{"type": "progress_message", "operation": 2, "msgid": "cache.commit", "finished": true, "time": 1654268721.1}
"#;

    fn progress_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_operation_lines_match_discriminators() {
        let file = progress_file(KNOWN_TYPES);
        let operation = Operation::from_progress_file(file.path()).unwrap();

        assert_eq!(operation.progress_file().as_deref(), Some(file.path()));
        assert_eq!(operation.lines().len(), 12);

        let expected = [
            (LogLineKind::ArchiveProgress, false),
            (LogLineKind::ProgressMessage, false),
            (LogLineKind::ProgressMessage, false),
            (LogLineKind::ProgressMessage, false),
            (LogLineKind::ProgressMessage, true),
            (LogLineKind::ArchiveProgress, false),
            (LogLineKind::ArchiveProgress, false),
            (LogLineKind::ProgressMessage, false),
            (LogLineKind::ProgressMessage, false),
            (LogLineKind::ProgressMessage, false),
            (LogLineKind::ProgressPercent, false),
            (LogLineKind::ProgressMessage, true),
        ];
        for (line, (kind, finished)) in operation.lines().iter().zip(expected) {
            assert_eq!(line.kind(), kind);
            assert_eq!(line.finished(), finished);
        }

        assert_eq!(operation.last_line(), operation.lines().last());
        assert!(operation.last_line().unwrap().finished());
    }

    #[test]
    fn test_operation_unknown_type_fails_whole_stream() {
        let content = format!(
            "{}{}\n{}",
            KNOWN_TYPES,
            r#"{"type": "something_new", "operation": 4}"#,
            KNOWN_TYPES
        );
        let file = progress_file(&content);

        let error = Operation::from_progress_file(file.path()).unwrap_err();
        assert!(matches!(error.root(), Error::UnrecognizedLogLine { .. }));
    }

    #[test]
    fn test_operation_unknown_type_as_only_line() {
        let result = Operation::from_reader(Cursor::new(r#"{"type": "file_status", "status": "A", "path": "a"}"#));
        assert!(matches!(result, Err(Error::UnrecognizedLogLine { .. })));
    }

    #[test]
    fn test_operation_no_lines() {
        let file = progress_file("");
        let operation = Operation::from_progress_file(file.path()).unwrap();

        assert!(operation.lines().is_empty());
        assert!(operation.last_line().is_none());
    }

    #[test]
    fn test_operation_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let error = Operation::from_progress_file(dir.path().join("missing")).unwrap_err();
        assert!(matches!(error.root(), Error::Io(_)));
    }
}
