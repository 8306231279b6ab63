use std::fmt;
use std::path::{Path, PathBuf};

use crate::format::{MERGED, Matcher, RAW, RENAMED, TokenValue};
use crate::metadata::{Metadata, probe};

/// Why a directory entry was excluded from aggregation.
///
/// Both cases are per-entry: the entry is skipped and reported,
/// the rest of the batch is unaffected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Filename matches none of the known grammars.
    UnrecognizedName,
    /// Name was recognized but probing the file for metadata failed.
    MetadataUnavailable(String),
}

/// One physical video file representing part of a recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// 4-digit recording identifier shared by all fragments of one recording.
    pub id: String,
    /// 1-based position of this fragment within the whole recording.
    /// Zero for files named with the merged grammar, which carries no index.
    pub index: u32,
    pub extension: String,
    /// Filename as found on disk.
    pub current_name: String,
    /// Canonical filename, derived at parse time.
    pub new_name: String,
    pub metadata: Metadata,
}

/// Name fields shared by all three grammars.
struct ParsedName {
    id: String,
    index: u32,
    extension: String,
}

impl ParsedName {
    /// Extract the common fields from one grammar's captures.
    /// Grammars without an index token parse with index zero.
    fn from_captures(matcher: &Matcher, values: &[&str]) -> Option<Self> {
        let id = matcher.field(values, "id")?.to_string();
        let extension = matcher.field(values, "extension")?.to_string();
        let index = match matcher.field(values, "index") {
            Some(index) => index.parse().ok()?,
            None => 0,
        };
        Some(Self { id, index, extension })
    }

    /// Try each known grammar in priority order: renamed, raw, merged.
    /// First full match wins, so a name satisfying several grammars
    /// resolves deterministically.
    fn parse(name: &str) -> Option<Self> {
        [&*RENAMED, &*RAW, &*MERGED].into_iter().find_map(|matcher| {
            let values = matcher.captures(name)?;
            Self::from_captures(matcher, &values)
        })
    }
}

impl Fragment {
    /// Parse a directory entry into a fragment.
    ///
    /// The name is matched against the known grammars,
    /// the file is probed for codec and creation timestamp,
    /// and the canonical name is rendered immediately.
    /// A fragment that cannot be probed is never returned.
    pub async fn parse(input_dir: &Path, name: &str) -> Result<Self, ParseError> {
        let parsed = ParsedName::parse(name).ok_or(ParseError::UnrecognizedName)?;

        let metadata = probe(&input_dir.join(name))
            .await
            .map_err(|error| ParseError::MetadataUnavailable(error.to_string()))?;

        let new_name = RENAMED.render(&[
            TokenValue::Text(&metadata.creation_time_string()),
            TokenValue::Text(&parsed.id),
            TokenValue::Number(parsed.index),
            TokenValue::Text(&parsed.extension),
        ]);

        Ok(Self {
            id: parsed.id,
            index: parsed.index,
            extension: parsed.extension,
            current_name: name.to_string(),
            new_name,
            metadata,
        })
    }

    /// Absolute path to the fragment's current location.
    #[must_use]
    pub fn input_path(&self, input_dir: &Path) -> PathBuf {
        input_dir.join(&self.current_name)
    }

    /// Absolute path to the fragment's canonical location, for renaming.
    #[must_use]
    pub fn new_path(&self, input_dir: &Path) -> PathBuf {
        input_dir.join(&self.new_name)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnrecognizedName => write!(f, "Name does not match any known grammar"),
            Self::MetadataUnavailable(reason) => write!(f, "Metadata unavailable: {reason}"),
        }
    }
}

impl std::error::Error for ParseError {}


#[cfg(test)]
mod fragment_tests {
    use super::*;

    use chrono::NaiveDate;

    fn test_fragment() -> Fragment {
        let creation_time = NaiveDate::from_ymd_opt(2023, 6, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        Fragment {
            id: "0042".to_string(),
            index: 1,
            extension: "mp4".to_string(),
            current_name: "GX010042.mp4".to_string(),
            new_name: "Recording _-_ Date 2023-06-01 10_00_00 _-_ ID 0042 _-_ Part 01.mp4".to_string(),
            metadata: Metadata {
                codec: "h264".to_string(),
                creation_time: Some(creation_time),
            },
        }
    }

    #[test]
    fn paths_join_input_directory() {
        let fragment = test_fragment();
        let dir = Path::new("/videos");
        assert_eq!(fragment.input_path(dir), PathBuf::from("/videos/GX010042.mp4"));
        assert_eq!(
            fragment.new_path(dir),
            PathBuf::from("/videos/Recording _-_ Date 2023-06-01 10_00_00 _-_ ID 0042 _-_ Part 01.mp4")
        );
    }

    #[test]
    fn canonical_name_round_trips_through_parser() {
        let fragment = test_fragment();
        let parsed = ParsedName::parse(&fragment.new_name).unwrap();
        assert_eq!(parsed.id, fragment.id);
        assert_eq!(parsed.index, fragment.index);
        assert_eq!(parsed.extension, fragment.extension);
    }
}
