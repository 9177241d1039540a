use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use exiftool::ExifTool;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Order of preference for the original capture timestamp
const CAPTURE_DATE_TAGS: &[&str] = &[
    "DateTimeOriginal",
    "CreateDate",
    "DateCreated",
    "ModifyDate",
];

const GROUP_PREFIXES: &[&str] = &["", "EXIF:", "XMP:", "Composite:"];

/// Epoch timestamps to reject (as Unix timestamps)
const REJECTED_EPOCHS: &[i64] = &[
    0,                    // Zero/Unix epoch
    -2209075200,         // 1900-01-01 (NTP epoch)
    -2082844800,         // 1904-01-01 (macOS Classic epoch)
    315532800,           // 1980-01-06 (GPS epoch)
    978307200,           // 2001-01-01 (macOS modern/iOS epoch)
];

/// Where a capture timestamp came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampSource {
    Embedded,
    Modified,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoMetadata {
    pub captured_at: DateTime<Utc>,
    pub source: TimestampSource,
}

/// Reads capture timestamps. One per worker thread, each owning its own
/// exiftool process.
pub struct MetadataExtractor {
    exiftool: Option<ExifTool>,
}

impl MetadataExtractor {
    pub fn new() -> Self {
        let exiftool = match ExifTool::new() {
            Ok(tool) => Some(tool),
            Err(e) => {
                warn!("exiftool unavailable, using file modification times: {}", e);
                None
            }
        };
        MetadataExtractor { exiftool }
    }

    /// Extractor that never reads embedded metadata
    pub fn modification_time_only() -> Self {
        MetadataExtractor { exiftool: None }
    }

    /// Best-effort capture timestamp. Never fails: unreadable metadata falls
    /// back to the file's modification time.
    pub fn extract(&mut self, file_path: &Path) -> PhotoMetadata {
        if let Some(exiftool) = self.exiftool.as_mut() {
            match embedded_capture_date(exiftool, file_path) {
                Ok(Some(captured_at)) => {
                    return PhotoMetadata {
                        captured_at,
                        source: TimestampSource::Embedded,
                    }
                }
                Ok(None) => {
                    debug!("No capture date in {}, using modification time", file_path.display());
                }
                Err(e) => {
                    debug!(
                        "Failed to read metadata from {}: {:#}; using modification time",
                        file_path.display(),
                        e
                    );
                }
            }
        }

        PhotoMetadata {
            captured_at: modification_time(file_path),
            source: TimestampSource::Modified,
        }
    }
}

impl Default for MetadataExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn modification_time(file_path: &Path) -> DateTime<Utc> {
    match fs::metadata(file_path).and_then(|m| m.modified()) {
        Ok(modified) => DateTime::<Utc>::from(modified),
        Err(e) => {
            debug!("No modification time for {}: {}", file_path.display(), e);
            Utc::now()
        }
    }
}

fn embedded_capture_date(exiftool: &mut ExifTool, file_path: &Path) -> Result<Option<DateTime<Utc>>> {
    let metadata = extract_with_exiftool(exiftool, file_path)?;
    Ok(capture_date_from_metadata(&metadata))
}

fn extract_with_exiftool(exiftool: &mut ExifTool, file_path: &Path) -> Result<HashMap<String, Value>> {
    let file_path_str = file_path.to_str()
        .ok_or_else(|| anyhow!("File path contains invalid UTF-8"))?;

    let args = vec!["-G", file_path_str];

    let output = exiftool
        .json_execute(&args)
        .context("Failed to run exiftool")?;

    let data: Vec<HashMap<String, Value>> = serde_json::from_value(output)
        .context("Failed to parse exiftool JSON output")?;

    data.into_iter()
        .next()
        .ok_or_else(|| anyhow!("No metadata returned from exiftool"))
}

/// Pick the most preferred valid capture date from exiftool's JSON tags
pub fn capture_date_from_metadata(metadata: &HashMap<String, Value>) -> Option<DateTime<Utc>> {
    let timezone_offset = extract_timezone_offset(metadata);

    CAPTURE_DATE_TAGS
        .iter()
        .filter_map(|tag| find_and_parse_date(metadata, tag, timezone_offset))
        .find(|d| is_valid_date(*d))
}

fn find_and_parse_date(
    metadata: &HashMap<String, Value>,
    tag_name: &str,
    timezone_offset: Option<i32>,
) -> Option<DateTime<Utc>> {
    for prefix in GROUP_PREFIXES {
        let key = format!("{}{}", prefix, tag_name);
        match metadata.get(&key) {
            Some(Value::String(s)) => {
                if let Some(date) = parse_date_string(s, timezone_offset) {
                    return Some(date);
                }
            }
            Some(Value::Array(arr)) => {
                // Repeated tags: take the earliest parsable one
                let earliest = arr
                    .iter()
                    .filter_map(|v| v.as_str())
                    .filter_map(|s| parse_date_string(s, timezone_offset))
                    .min();
                if earliest.is_some() {
                    return earliest;
                }
            }
            _ => {}
        }
    }

    None
}

/// Parse exiftool's `YYYY:MM:DD HH:MM:SS[.fff][zone]` form
fn parse_date_string(s: &str, timezone_offset: Option<i32>) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y:%m:%d %H:%M:%S%z") {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = DateTime::parse_from_str(s, "%Y:%m:%d %H:%M:%S%.f%z") {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y:%m:%d %H:%M:%S") {
        return Some(apply_timezone(naive, timezone_offset));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y:%m:%d %H:%M:%S%.f") {
        return Some(apply_timezone(naive, timezone_offset));
    }

    None
}

fn apply_timezone(naive: NaiveDateTime, offset_seconds: Option<i32>) -> DateTime<Utc> {
    match offset_seconds {
        Some(offset) => Utc.from_utc_datetime(&(naive - chrono::Duration::seconds(offset as i64))),
        None => Utc.from_utc_datetime(&naive),
    }
}

fn extract_timezone_offset(metadata: &HashMap<String, Value>) -> Option<i32> {
    let offset_tags = ["OffsetTimeOriginal", "OffsetTime", "OffsetTimeDigitized"];

    for tag in offset_tags {
        for key in &[tag.to_string(), format!("EXIF:{}", tag)] {
            if let Some(Value::String(s)) = metadata.get(key) {
                return parse_timezone_offset(s);
            }
        }
    }

    None
}

fn parse_timezone_offset(s: &str) -> Option<i32> {
    // Format: "+08:00" or "-05:00"
    if s.len() != 6 || s.as_bytes()[3] != b':' {
        return None;
    }

    let sign = match s.as_bytes()[0] {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let hours: i32 = s[1..3].parse().ok()?;
    let minutes: i32 = s[4..6].parse().ok()?;

    Some(sign * (hours * 3600 + minutes * 60))
}

fn is_valid_date(date: DateTime<Utc>) -> bool {
    if date > Utc::now() {
        return false;
    }

    let timestamp = date.timestamp();
    // Within a day of a rejected epoch
    !REJECTED_EPOCHS
        .iter()
        .any(|&epoch| (timestamp - epoch).abs() < 86400)
}
