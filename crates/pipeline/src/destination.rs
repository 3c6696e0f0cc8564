//! Destination resolution for finished media files.
//!
//! Movies land in `<movies_folder>/<title>/`; series episodes land in
//! `<series_folder>/<series name>/Saison <n>/`, reusing an existing series
//! folder when one matches case-insensitively.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::title::RecordingTitle;
use movie_pipeline_config::Settings;

/// Error type for destination resolution
#[derive(Debug, Error)]
pub enum DestinationError {
    /// The title claims to be a series but the episode tag is unusable
    #[error("Cannot extract series info from {0:?}")]
    MalformedSeriesTitle(String),

    /// IO error while creating or listing destination folders
    #[error("Failed to prepare destination {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> DestinationError + '_ {
    move |source| DestinationError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Resolve (and create when missing) the destination directory for a title.
pub fn resolve_destination(
    title: &RecordingTitle,
    settings: &Settings,
) -> Result<PathBuf, DestinationError> {
    if title.is_series() {
        resolve_series_destination(title, settings)
    } else {
        let dest = settings.paths.movies_folder.join(title.title());
        fs::create_dir_all(&dest).map_err(io_err(&dest))?;
        Ok(dest)
    }
}

fn resolve_series_destination(
    title: &RecordingTitle,
    settings: &Settings,
) -> Result<PathBuf, DestinationError> {
    let series_name = title
        .series_name()
        .ok_or_else(|| DestinationError::MalformedSeriesTitle(title.title().to_string()))?;
    let season = title
        .season_number()
        .ok_or_else(|| DestinationError::MalformedSeriesTitle(title.title().to_string()))?;
    let season_folder_name = format!("Saison {}", season);

    let series_root = &settings.paths.series_folder;
    let existing = find_series_folder(series_root, &series_name).map_err(io_err(series_root))?;

    let season_folder = match existing {
        Some(series_folder) => {
            debug!(folder = %series_folder.display(), "Reusing series folder");
            series_folder.join(season_folder_name)
        }
        None => series_root.join(&series_name).join(season_folder_name),
    };

    fs::create_dir_all(&season_folder).map_err(io_err(&season_folder))?;
    Ok(season_folder)
}

fn find_series_folder(series_root: &Path, series_name: &str) -> std::io::Result<Option<PathBuf>> {
    if !series_root.exists() {
        return Ok(None);
    }

    let wanted = series_name.to_lowercase();
    for entry in fs::read_dir(series_root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if name.to_lowercase().starts_with(&wanted) {
                return Ok(Some(entry.path()));
            }
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn settings_with(root: &Path) -> Settings {
        let mut settings = Settings::default();
        settings.paths.movies_folder = root.join("Films");
        settings.paths.series_folder = root.join("Séries");
        settings
    }

    #[test]
    fn test_movie_destination_is_per_title_folder() {
        let dir = TempDir::new().unwrap();
        let settings = settings_with(dir.path());

        let dest =
            resolve_destination(&RecordingTitle::new("Movie Name.mp4"), &settings).unwrap();

        assert_eq!(dest, dir.path().join("Films").join("Movie Name"));
        assert!(dest.is_dir());
    }

    #[test]
    fn test_series_destination_creates_season_folder() {
        let dir = TempDir::new().unwrap();
        let settings = settings_with(dir.path());

        let dest =
            resolve_destination(&RecordingTitle::new("Serie Name S01E23.mp4"), &settings)
                .unwrap();

        assert_eq!(
            dest,
            dir.path().join("Séries").join("Serie Name").join("Saison 1")
        );
        assert!(dest.is_dir());
    }

    #[test]
    fn test_series_destination_reuses_existing_folder() {
        let dir = TempDir::new().unwrap();
        let settings = settings_with(dir.path());

        // An operator renamed the folder with different casing and a year.
        let existing = dir.path().join("Séries").join("serie name (2020)");
        fs::create_dir_all(&existing).unwrap();

        let dest =
            resolve_destination(&RecordingTitle::new("Serie Name S02E01.mp4"), &settings)
                .unwrap();

        assert_eq!(dest, existing.join("Saison 2"));
        assert!(dest.is_dir());
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let settings = settings_with(dir.path());
        let title = RecordingTitle::new("Movie Name.mp4");

        let first = resolve_destination(&title, &settings).unwrap();
        let second = resolve_destination(&title, &settings).unwrap();

        assert_eq!(first, second);
    }
}
