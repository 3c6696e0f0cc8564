//! Backup policy for processed recordings.
//!
//! Once the output file is produced and validated, the source recording is
//! either left in place (the EDL is just deactivated), deleted (series
//! episodes are not individually archived) or moved with all its sidecars
//! into a per-title backup folder. Archiving is intentionally not
//! idempotent: an existing backup folder for the same title indicates an
//! operator error and fails loudly.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::edl::EdlFile;
use crate::markers;
use crate::title::RecordingTitle;
use movie_pipeline_config::Settings;

/// Error type for backup execution
#[derive(Debug, Error)]
pub enum BackupError {
    /// The per-title backup folder already exists
    #[error("Backup destination already exists: {0}")]
    AlreadyArchived(PathBuf),

    /// IO failure while renaming, moving or deleting
    #[error("Backup failed for {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> BackupError + '_ {
    move |source| BackupError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// What the policy did with the source recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    /// No backup desired or possible; the EDL was renamed to its `.done`
    /// marker and the source left untouched
    MarkedDone(PathBuf),
    /// The source belonged to a series and was deleted with its sidecars
    SourceDeleted,
    /// The source and its sidecars were moved into the per-title folder
    Archived(PathBuf),
}

/// Applies the backup decision for one processed EDL.
pub struct BackupPolicy<'a> {
    edl: &'a EdlFile,
    settings: &'a Settings,
}

impl<'a> BackupPolicy<'a> {
    pub fn new(edl: &'a EdlFile, settings: &'a Settings) -> Self {
        Self { edl, settings }
    }

    /// Execute the policy against the source recording.
    pub fn execute(&self, source_path: &Path) -> Result<BackupOutcome, BackupError> {
        let skip_backup = self.edl.content.skip_backup;

        let backup_folder = match (&self.settings.paths.backup_folder, skip_backup) {
            (Some(folder), false) => folder,
            _ => {
                info!(
                    edl = %self.edl.path.display(),
                    "No backup desired or possible, deactivating decision file"
                );
                let marker =
                    markers::mark_done(&self.edl.path).map_err(io_err(&self.edl.path))?;
                return Ok(BackupOutcome::MarkedDone(marker));
            }
        };

        let title = RecordingTitle::new(&self.edl.content.filename);

        if title.is_series() {
            info!(source = %source_path.display(), "Series source, deleting");
            self.delete_source_family(source_path)?;
            Ok(BackupOutcome::SourceDeleted)
        } else {
            let dest = backup_folder.join(title.title());
            info!(source = %source_path.display(), dest = %dest.display(), "Archiving source");
            self.archive_source_family(source_path, &dest)?;
            Ok(BackupOutcome::Archived(dest))
        }
    }

    /// All files sharing the source's name prefix: the recording itself,
    /// its EDL (claimed or not) and any sidecars.
    fn source_family(&self, source_path: &Path) -> Result<Vec<PathBuf>, BackupError> {
        let parent = source_path.parent().unwrap_or_else(|| Path::new("."));
        let prefix = source_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut family: Vec<PathBuf> = fs::read_dir(parent)
            .map_err(io_err(parent))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .map(|name| name.starts_with(prefix.as_str()))
                    .unwrap_or(false)
            })
            .collect();

        family.sort();
        Ok(family)
    }

    fn delete_source_family(&self, source_path: &Path) -> Result<(), BackupError> {
        for file in self.source_family(source_path)? {
            fs::remove_file(&file).map_err(io_err(&file))?;
        }
        Ok(())
    }

    fn archive_source_family(&self, source_path: &Path, dest: &Path) -> Result<(), BackupError> {
        match fs::create_dir(dest) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(BackupError::AlreadyArchived(dest.to_path_buf()));
            }
            Err(e) => return Err(io_err(dest)(e)),
        }

        for file in self.source_family(source_path)? {
            let target = dest.join(file.file_name().unwrap_or_default());
            move_file(&file, &target).map_err(io_err(&file))?;
        }
        Ok(())
    }
}

/// Rename, falling back to copy-and-delete across filesystems.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    if fs::rename(from, to).is_err() {
        fs::copy(from, to)?;
        fs::remove_file(from)?;
    }
    Ok(())
}
