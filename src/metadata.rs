use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDateTime;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::format::FILE_DATE_FORMAT;

/// Timestamp layout of the `creation_time` format tag as written by the camera.
/// Fractional seconds are optional, the trailing `Z` is literal.
/// Any other layout is a hard parse failure, not a fallback.
const CREATION_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

/// Video stream metadata probed from a file with ffprobe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub codec: String,
    pub creation_time: Option<NaiveDateTime>,
}

#[derive(Debug, Deserialize)]
struct ProbeData {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: ProbeFormat,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_name: String,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    #[serde(default)]
    tags: HashMap<String, serde_json::Value>,
}

impl Metadata {
    /// Creation timestamp formatted for use inside canonical filenames.
    /// Empty string when no timestamp is set.
    #[must_use]
    pub fn creation_time_string(&self) -> String {
        self.creation_time
            .map(|time| time.format(FILE_DATE_FORMAT).to_string())
            .unwrap_or_default()
    }
}

/// Probe one video file with ffprobe.
///
/// Returns the first video stream's codec name and the container's embedded
/// creation timestamp.
/// A missing or malformed `creation_time` tag is an error:
/// without a timestamp the file cannot be given its canonical name.
pub async fn probe(path: &Path) -> Result<Metadata> {
    let output = Command::new("ffprobe")
        .arg(path)
        .args([
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
            "-select_streams",
            "v:0",
            "-hide_banner",
            "-loglevel",
            "fatal",
        ])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .context("Failed to execute ffprobe")?;

    if !output.status.success() {
        anyhow::bail!("ffprobe failed: {}", String::from_utf8_lossy(&output.stderr).trim());
    }

    let data: ProbeData = serde_json::from_slice(&output.stdout).context("Failed to parse ffprobe JSON output")?;
    parse_probe_data(data)
}

/// Concatenate source files into one destination file with ffmpeg.
///
/// Sources are passed to the concat demuxer over stdin in the given order;
/// streams are copied without re-encoding and container metadata is preserved.
/// No cleanup is attempted for a partially written destination on failure.
pub async fn concatenate(destination: &Path, sources: &[PathBuf]) -> Result<()> {
    let mut listing = String::new();
    for source in sources {
        listing.push_str(&format!("file '{}'\n", crate::path_to_string(source)));
    }

    let mut child = Command::new("ffmpeg")
        .args([
            "-protocol_whitelist",
            "file,pipe",
            "-f",
            "concat",
            "-safe",
            "0",
            "-i",
            "pipe:",
            "-codec",
            "copy",
            "-map_metadata",
            "0",
        ])
        .arg(destination)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .context("Failed to execute ffmpeg")?;

    let mut stdin = child.stdin.take().context("Failed to open ffmpeg stdin")?;
    stdin
        .write_all(listing.as_bytes())
        .await
        .context("Failed to write source list to ffmpeg")?;
    drop(stdin);

    let output = child.wait_with_output().await.context("Failed to wait for ffmpeg")?;
    if !output.status.success() {
        anyhow::bail!("ffmpeg failed: {}", String::from_utf8_lossy(&output.stderr).trim());
    }

    Ok(())
}

fn parse_probe_data(data: ProbeData) -> Result<Metadata> {
    let codec = data
        .streams
        .first()
        .map(|stream| stream.codec_name.to_lowercase())
        .ok_or_else(|| anyhow!("No video stream found"))?;

    let tag = data
        .format
        .tags
        .get("creation_time")
        .ok_or_else(|| anyhow!("Tag 'creation_time' not embedded in video"))?;

    let text = tag
        .as_str()
        .ok_or_else(|| anyhow!("Tag 'creation_time' is not a string"))?;

    let creation_time = NaiveDateTime::parse_from_str(text, CREATION_TIME_FORMAT)
        .map_err(|error| anyhow!("Invalid creation time '{text}': {error}"))?;

    Ok(Metadata {
        codec,
        creation_time: Some(creation_time),
    })
}

#[cfg(test)]
mod probe_tests {
    use super::*;

    fn probe_json(json: &str) -> Result<Metadata> {
        let data: ProbeData = serde_json::from_str(json).expect("probe JSON should deserialize");
        parse_probe_data(data)
    }

    #[test]
    fn parses_codec_and_creation_time() {
        let metadata = probe_json(
            r#"{
                "streams": [{"codec_name": "h264", "width": 3840, "height": 2160}],
                "format": {"tags": {"creation_time": "2023-06-01T10:00:00.5Z", "encoder": "GoPro"}}
            }"#,
        )
        .unwrap();

        assert_eq!(metadata.codec, "h264");
        assert_eq!(metadata.creation_time_string(), "2023-06-01 10_00_00");
    }

    #[test]
    fn accepts_timestamp_without_fractional_seconds() {
        let metadata = probe_json(
            r#"{
                "streams": [{"codec_name": "hevc"}],
                "format": {"tags": {"creation_time": "2024-02-29T23:59:59Z"}}
            }"#,
        )
        .unwrap();
        assert_eq!(metadata.creation_time_string(), "2024-02-29 23_59_59");
    }

    #[test]
    fn missing_creation_time_tag_is_an_error() {
        let result = probe_json(
            r#"{
                "streams": [{"codec_name": "h264"}],
                "format": {"tags": {"encoder": "GoPro"}}
            }"#,
        );
        assert!(result.unwrap_err().to_string().contains("creation_time"));
    }

    #[test]
    fn non_string_creation_time_tag_is_an_error() {
        let result = probe_json(
            r#"{
                "streams": [{"codec_name": "h264"}],
                "format": {"tags": {"creation_time": 1685613600}}
            }"#,
        );
        assert!(result.unwrap_err().to_string().contains("not a string"));
    }

    #[test]
    fn unparsable_timestamp_is_an_error() {
        let result = probe_json(
            r#"{
                "streams": [{"codec_name": "h264"}],
                "format": {"tags": {"creation_time": "2023-06-01 10:00:00"}}
            }"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn missing_video_stream_is_an_error() {
        let result = probe_json(
            r#"{
                "streams": [],
                "format": {"tags": {"creation_time": "2023-06-01T10:00:00.5Z"}}
            }"#,
        );
        assert!(result.unwrap_err().to_string().contains("No video stream"));
    }

    #[test]
    fn codec_name_is_lowercased() {
        let metadata = probe_json(
            r#"{
                "streams": [{"codec_name": "HEVC"}],
                "format": {"tags": {"creation_time": "2023-06-01T10:00:00Z"}}
            }"#,
        )
        .unwrap();
        assert_eq!(metadata.codec, "hevc");
    }

    #[test]
    fn empty_metadata_has_empty_time_string() {
        assert_eq!(Metadata::default().creation_time_string(), "");
    }
}
