//! Output title handling.
//!
//! The approved output filename carries everything the pipeline knows about
//! the finished media: its display title and, for series, the
//! `SxxEyy` episode tag that drives destination and backup decisions.

use std::sync::OnceLock;

use regex::Regex;

fn episode_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r" ?S(\d{2})E(\d{2,})$").expect("valid regex"))
}

/// The title of a finished media file, derived from its output filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingTitle {
    full_name: String,
    title: String,
}

impl RecordingTitle {
    /// Build from an output filename (`Movie Name.mp4`,
    /// `Serie Name S01E23.mp4`).
    pub fn new(filename: &str) -> Self {
        let title = filename
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(filename)
            .to_string();

        Self {
            full_name: filename.to_string(),
            title,
        }
    }

    /// The output filename including its extension.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// The title without extension (`Serie Name S01E23`).
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Whether the title carries an `SxxEyy` episode tag.
    pub fn is_series(&self) -> bool {
        episode_pattern().is_match(&self.title)
    }

    /// The series name with the episode tag stripped
    /// (`Serie Name S01E23` -> `Serie Name`), for series titles only.
    pub fn series_name(&self) -> Option<String> {
        if !self.is_series() {
            return None;
        }
        Some(episode_pattern().replace(&self.title, "").into_owned())
    }

    /// The season number from the episode tag, for series titles only.
    pub fn season_number(&self) -> Option<u32> {
        episode_pattern()
            .captures(&self.title)
            .and_then(|captures| captures.get(1))
            .and_then(|season| season.as_str().parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_movie_title() {
        let title = RecordingTitle::new("Movie Name.mp4");
        assert_eq!(title.title(), "Movie Name");
        assert!(!title.is_series());
        assert_eq!(title.series_name(), None);
        assert_eq!(title.season_number(), None);
    }

    #[test]
    fn test_series_title() {
        let title = RecordingTitle::new("Serie Name S01E23.mp4");
        assert_eq!(title.title(), "Serie Name S01E23");
        assert!(title.is_series());
        assert_eq!(title.series_name(), Some("Serie Name".to_string()));
        assert_eq!(title.season_number(), Some(1));
    }

    #[test]
    fn test_series_with_long_episode_number() {
        let title = RecordingTitle::new("Daily Show S12E1234.mp4");
        assert!(title.is_series());
        assert_eq!(title.season_number(), Some(12));
    }

    #[test]
    fn test_episode_tag_must_be_at_end() {
        let title = RecordingTitle::new("S01E23 in the middle.mp4");
        assert!(!title.is_series());
    }
}
