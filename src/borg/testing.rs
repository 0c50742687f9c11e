//! Scripted stand-in for the borg executable used by the unit tests.

use crate::borg::cli::{CommandOutput, CommandRunner, LoggedCommand, LoggedOutput, RegularCommand};
use crate::borg::result_error::result::Result;
use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub static FINISHED_LINE: &str =
    r#"{"type": "progress_message", "operation": 1, "msgid": "extract", "finished": true, "time": 1654268721.0}"#;

type RunFn = dyn Fn(&[String], &RegularCommand) -> Result<CommandOutput> + Send + Sync;
/// Returns the content written to the log file.
type RunLoggedFn = dyn Fn(&[String], &LoggedCommand) -> Result<String> + Send + Sync;

pub fn ok(stdout: &str) -> Result<CommandOutput> {
    Ok(CommandOutput {
        rc: 0,
        stdout: stdout.to_string(),
        stderr: String::new(),
    })
}

pub struct FakeRunner {
    on_run: Box<RunFn>,
    on_run_logged: Box<RunLoggedFn>,
    calls: Mutex<Vec<Vec<String>>>,
    working_directories: Mutex<Vec<Option<PathBuf>>>,
    log_dir: TempDir,
}

impl Default for FakeRunner {
    fn default() -> Self {
        FakeRunner {
            on_run: Box::new(|_, _| ok("")),
            on_run_logged: Box::new(|_, _| Ok(format!("{FINISHED_LINE}\n"))),
            calls: Mutex::default(),
            working_directories: Mutex::default(),
            log_dir: TempDir::new().unwrap(),
        }
    }
}

impl Debug for FakeRunner {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeRunner")
            .field("calls", &self.calls)
            .finish()
    }
}

impl FakeRunner {
    /// Answers `list --json-lines` from `fixture` and materializes it on `extract`.
    pub fn with_archive(fixture: ArchiveFixture) -> Self {
        let fixture = Arc::new(fixture);
        let list_fixture = fixture.clone();
        FakeRunner::default()
            .on_run(move |argv, _| {
                if argv.iter().any(|a| a == "--json-lines") {
                    let prefix = argv
                        .iter()
                        .skip_while(|a| !a.contains("::"))
                        .nth(1)
                        .map(String::as_str);
                    ok(&list_fixture.list_json_lines(prefix))
                } else {
                    ok("")
                }
            })
            .on_run_logged(move |argv, command| {
                if argv.iter().any(|a| a == "extract") {
                    fixture.extract(argv, command)?;
                }
                Ok(format!("{FINISHED_LINE}\n"))
            })
    }

    pub fn on_run<F>(mut self, f: F) -> Self
    where
        F: Fn(&[String], &RegularCommand) -> Result<CommandOutput> + Send + Sync + 'static,
    {
        self.on_run = Box::new(f);
        self
    }

    pub fn on_run_logged<F>(mut self, f: F) -> Self
    where
        F: Fn(&[String], &LoggedCommand) -> Result<String> + Send + Sync + 'static,
    {
        self.on_run_logged = Box::new(f);
        self
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn working_directories(&self) -> Vec<Option<PathBuf>> {
        self.working_directories.lock().unwrap().clone()
    }

    fn record(&self, argv: &[String], working_directory: &Option<PathBuf>) {
        self.calls.lock().unwrap().push(argv.to_vec());
        self.working_directories
            .lock()
            .unwrap()
            .push(working_directory.clone());
    }
}

impl CommandRunner for FakeRunner {
    fn executable(&self) -> &Path {
        Path::new("/usr/bin/borg")
    }

    fn run(&self, command: &RegularCommand) -> Result<CommandOutput> {
        let argv = command.argv(self.executable())?;
        self.record(&argv, command.working_directory());
        (self.on_run)(&argv, command)
    }

    fn run_logged(&self, command: &LoggedCommand) -> Result<LoggedOutput> {
        let argv = command.argv(self.executable())?;
        self.record(&argv, command.working_directory());
        let content = (self.on_run_logged)(&argv, command)?;

        let log_file = self
            .log_dir
            .path()
            .join(format!("borg-{}.log", self.calls.lock().unwrap().len()));
        std::fs::write(&log_file, content)?;
        Ok(LoggedOutput { rc: 0, log_file })
    }
}

#[derive(Clone, Debug)]
pub enum FixtureEntry {
    Directory,
    File(String),
    Symlink(String),
}

/// In-memory archive content, paths relative to the archive root.
#[derive(Clone, Debug, Default)]
pub struct ArchiveFixture {
    entries: Vec<(String, FixtureEntry)>,
}

impl ArchiveFixture {
    pub fn directory(mut self, path: &str) -> Self {
        self.entries.push((path.to_string(), FixtureEntry::Directory));
        self
    }

    pub fn file(mut self, path: &str, content: &str) -> Self {
        self.entries
            .push((path.to_string(), FixtureEntry::File(content.to_string())));
        self
    }

    pub fn symlink(mut self, path: &str, target: &str) -> Self {
        self.entries
            .push((path.to_string(), FixtureEntry::Symlink(target.to_string())));
        self
    }

    fn matches(path: &str, prefix: &str) -> bool {
        path == prefix || path.starts_with(&format!("{prefix}/"))
    }

    pub fn list_json_lines(&self, prefix: Option<&str>) -> String {
        self.entries
            .iter()
            .filter(|(path, _)| prefix.map_or(true, |prefix| Self::matches(path, prefix)))
            .map(|(path, entry)| {
                let (file_type, mode, target, size) = match entry {
                    FixtureEntry::Directory => ("d", "drwxr-xr-x", "", 0),
                    FixtureEntry::File(content) => ("-", "-rw-r--r--", "", content.len()),
                    FixtureEntry::Symlink(target) => ("l", "lrwxrwxrwx", target.as_str(), 0),
                };
                serde_json::json!({
                    "type": file_type,
                    "mode": mode,
                    "user": "root",
                    "group": "root",
                    "uid": 0,
                    "gid": 0,
                    "path": path,
                    "healthy": true,
                    "source": target,
                    "linktarget": target,
                    "flags": 0,
                    "mtime": "2022-06-03T14:45:20.000000",
                    "size": size,
                })
                .to_string()
                    + "\n"
            })
            .collect()
    }

    /// Writes the selected entries below the command's working directory the way
    /// `borg extract --strip-components` lays them out.
    fn extract(&self, argv: &[String], command: &LoggedCommand) -> Result<()> {
        let destination = command
            .working_directory()
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        let strip = argv
            .iter()
            .position(|a| a == "--strip-components")
            .and_then(|i| argv.get(i + 1))
            .and_then(|n| n.parse::<usize>().ok())
            .unwrap_or(0);
        let selected = argv
            .iter()
            .skip_while(|a| !a.contains("::"))
            .skip(1)
            .collect::<Vec<_>>();

        for (path, entry) in &self.entries {
            if !selected.is_empty() && !selected.iter().any(|s| Self::matches(path, s)) {
                continue;
            }
            let stripped = Path::new(path).components().skip(strip).collect::<PathBuf>();
            if stripped.as_os_str().is_empty() {
                continue;
            }
            let out = destination.join(stripped);
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)?;
            }
            match entry {
                FixtureEntry::Directory => std::fs::create_dir_all(&out)?,
                FixtureEntry::File(content) => std::fs::write(&out, content)?,
                FixtureEntry::Symlink(target) => std::os::unix::fs::symlink(target, &out)?,
            }
        }
        Ok(())
    }
}
