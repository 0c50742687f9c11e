use crate::borg::cli::{path_arg, subcommand, LoggedCommand, RegularCommand};
use crate::borg::function_path;
use crate::borg::operation::Operation;
use crate::borg::repository::Repository;
use crate::borg::result_error::error::Error;
use crate::borg::result_error::result::Result;
use crate::borg::result_error::{WithDebugObjectAndFnName, WithMsg};
use bon::Builder;
use chrono::NaiveDateTime;
use derive_more::Display;
use function_name::named;
use getset::Getters;
use serde::Deserialize;
use std::fs::DirBuilder;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File type from the first character of a symbolic mode such as `drwxr-xr-x`.
#[derive(Clone, Copy, Debug, Display, Deserialize, PartialEq, Eq, Hash)]
pub enum UnixFileType {
    #[serde(rename = "-")]
    #[display("regular file")]
    RegularFile,
    #[serde(rename = "d")]
    #[display("directory")]
    Directory,
    #[serde(rename = "l")]
    #[display("symbolic link")]
    SymbolicLink,
    #[serde(rename = "c")]
    #[display("character device")]
    CharacterDevice,
    #[serde(rename = "b")]
    #[display("block device")]
    BlockDevice,
    #[serde(rename = "p")]
    #[display("fifo")]
    Fifo,
    #[serde(rename = "s")]
    #[display("socket")]
    Socket,
}

#[derive(Deserialize)]
struct ListedItem {
    #[serde(rename = "type")]
    file_type: UnixFileType,
    mode: String,
    user: String,
    group: String,
    path: String,
    #[serde(default)]
    linktarget: String,
    mtime: NaiveDateTime,
    #[serde(default)]
    size: Option<u64>,
}

/// One entry of `borg list --json-lines`.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Getters)]
#[serde(from = "ListedItem")]
#[getset(get = "pub")]
pub struct ArchiveItem {
    file_type: UnixFileType,
    symbolic_mode: String,
    user: String,
    group: String,
    /// Relative to the archive root, without a leading `/`
    path: String,
    link_target: Option<String>,
    modification_time: NaiveDateTime,
    /// Only known for regular files
    size: Option<u64>,
}

impl From<ListedItem> for ArchiveItem {
    fn from(item: ListedItem) -> Self {
        ArchiveItem {
            file_type: item.file_type,
            symbolic_mode: item.mode,
            user: item.user,
            group: item.group,
            path: item.path,
            link_target: Some(item.linktarget).filter(|t| !t.is_empty()),
            modification_time: item.mtime,
            size: item
                .size
                .filter(|_| item.file_type == UnixFileType::RegularFile),
        }
    }
}

/// An archive inside a [`Repository`].
#[derive(Builder, Clone, Debug)]
pub struct Archive {
    repository: Repository,
    #[builder(into)]
    name: String,
    #[builder(into)]
    comment: Option<String>,
    start: Option<NaiveDateTime>,
}

impl Archive {
    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn archive_name(&self) -> &str {
        &self.name
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn start(&self) -> Option<NaiveDateTime> {
        self.start
    }

    /// Fully qualified `<repository>::<archive>` name borg expects.
    pub fn name(&self) -> String {
        format!("{}::{}", self.repository.path(), self.name)
    }

    fn logged_command(
        &self,
        subcommand: &str,
        arguments: Vec<String>,
        working_directory: Option<&Path>,
    ) -> LoggedCommand {
        LoggedCommand::builder()
            .subcommand(subcommand)
            .arguments(arguments)
            .maybe_identity_file_path(self.repository.identity_file_path().clone())
            .environment(self.repository.environment())
            .maybe_working_directory(working_directory)
            .build()
    }

    /// Creates this archive from `paths`, staying on each path's filesystem.
    #[named]
    pub fn create<P: AsRef<Path>>(&self, paths: &[P], excludes: &[String]) -> Result<Operation> {
        self.repository.ensure_unlocked()?;

        let mut arguments = vec!["--one-file-system".to_string()];
        if let Some(comment) = &self.comment {
            arguments.push(format!("--comment={comment}"));
        }
        for exclude in excludes {
            arguments.extend(["--exclude".to_string(), exclude.clone()]);
        }
        arguments.push(self.name());
        for path in paths {
            arguments.push(path_arg(path)?);
        }

        info!("Creating archive {}", self.name());
        let output = self
            .repository
            .runner()
            .run_logged(&self.logged_command(subcommand::CREATE, arguments, None))
            .map_err(|e| e.with_debug_object_and_fn_name(self.name(), function_path!()))?;
        Operation::from_progress_file(output.log_file)
    }

    /// Extracts `paths` (everything when empty) below `destination`.
    ///
    /// A missing destination is created with mode 0700, an existing one is used
    /// as is.
    #[named]
    pub fn extract<P: AsRef<Path>>(
        &self,
        destination: P,
        paths: &[String],
        strip_components: Option<usize>,
    ) -> Result<(Operation, PathBuf)> {
        self.repository.ensure_unlocked()?;

        let destination = destination.as_ref();
        if !destination.exists() {
            DirBuilder::new()
                .recursive(true)
                .mode(0o700)
                .create(destination)
                .map_err(Error::from)
                .with_msg(format!("Creating extract destination {:?} failed", destination))?;
        }

        let mut arguments = Vec::new();
        if let Some(strip_components) = strip_components {
            arguments.extend(["--strip-components".to_string(), strip_components.to_string()]);
        }
        arguments.push(self.name());
        arguments.extend(paths.iter().cloned());

        info!("Extracting {:?} from {} into {:?}", paths, self.name(), destination);
        let output = self
            .repository
            .runner()
            .run_logged(&self.logged_command(
                subcommand::EXTRACT,
                arguments,
                Some(destination),
            ))
            .map_err(|e| e.with_debug_object_and_fn_name(self.name(), function_path!()))?;

        Ok((
            Operation::from_progress_file(output.log_file)?,
            destination.to_path_buf(),
        ))
    }

    /// Lists `path` and everything below it, or the whole archive.
    #[named]
    pub fn contents(&self, path: Option<&str>) -> Result<Vec<ArchiveItem>> {
        let mut arguments = vec!["--json-lines".to_string(), self.name()];
        arguments.extend(path.map(str::to_string));

        let command = RegularCommand::builder()
            .subcommand(subcommand::LIST)
            .arguments(arguments)
            .maybe_identity_file_path(self.repository.identity_file_path().clone())
            .environment(self.repository.environment())
            .build();
        let output = self
            .repository
            .runner()
            .run(&command)
            .map_err(|e| e.with_debug_object_and_fn_name(self.name(), function_path!()))?;

        let items = output
            .stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str::<ArchiveItem>(line).map_err(Error::from))
            .collect::<Result<Vec<_>>>()
            .with_msg(format!("Parsing contents of {} failed", self.name()))?;
        debug!("{} lists {} items", self.name(), items.len());
        Ok(items)
    }
}
