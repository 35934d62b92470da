use std::fmt::Display;
use std::path::{Path, PathBuf};

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use chrono::{Local, TimeZone};
use thiserror::Error;

use crate::config::{UNKNOWN_DATE_DIR, VIDEO_CDN_BASE};
use crate::story::{MediaKind, StoryRecord};

/// URL-safe alphabet, padding required (we restore it), lenient on trailing bits.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::RequireCanonical),
);

/// Reasons a story record cannot be turned into a download.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("malformed story entry: {0}")]
    Malformed(String),
    #[error("story has no media url")]
    MissingUrl,
    #[error("story has neither id nor timestamp")]
    MissingId,
    #[error("timestamp {0} is out of range")]
    InvalidTimestamp(i64),
    #[error("image url is not valid base64: {0}")]
    InvalidBase64(String),
    #[error("decoded image url is not UTF-8")]
    NotUtf8,
}

/// A story record turned into a retrievable URL and a target location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMedia {
    pub media_url: String,
    /// Date bucket directory name (`MM-DD-YYYY` or `unknown_date`)
    pub folder: String,
    pub filename: String,
    pub kind: MediaKind,
    pub taken_at: Option<i64>,
}

impl ResolvedMedia {
    /// `root/folder/filename`, without touching the filesystem.
    pub fn destination(&self, root: &Path) -> PathBuf {
        root.join(&self.folder).join(&self.filename)
    }
}

/// Resolve using the local timezone for date buckets and filenames.
pub fn resolve(record: &StoryRecord) -> Result<ResolvedMedia, ResolveError> {
    resolve_in(record, &Local)
}

pub fn resolve_in<Tz>(record: &StoryRecord, tz: &Tz) -> Result<ResolvedMedia, ResolveError>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    if let Some(reason) = &record.malformed {
        return Err(ResolveError::Malformed(reason.clone()));
    }
    let raw_url = record.url.as_deref().ok_or(ResolveError::MissingUrl)?;
    let kind = MediaKind::of(record);
    let (folder, filename) = names(record.id.as_deref(), record.taken_at, kind, tz)?;

    let media_url = match kind {
        MediaKind::Video => format!("{}{}", VIDEO_CDN_BASE, raw_url),
        MediaKind::Image => decode_image_url(raw_url)?,
    };

    Ok(ResolvedMedia {
        media_url,
        folder,
        filename,
        kind,
        taken_at: record.taken_at,
    })
}

/// Date bucket and filename for a story. Pure in `(id, taken_at, kind)`.
pub fn names<Tz>(
    id: Option<&str>,
    taken_at: Option<i64>,
    kind: MediaKind,
    tz: &Tz,
) -> Result<(String, String), ResolveError>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let ext = kind.extension();
    match taken_at {
        Some(secs) => {
            let dt = tz
                .timestamp_opt(secs, 0)
                .single()
                .ok_or(ResolveError::InvalidTimestamp(secs))?;
            Ok((
                dt.format("%m-%d-%Y").to_string(),
                format!("{}.{}", dt.format("%H-%M-%S_%m-%d-%Y"), ext),
            ))
        }
        None => {
            let id = id.ok_or(ResolveError::MissingId)?;
            Ok((UNKNOWN_DATE_DIR.to_string(), format!("{}.{}", id, ext)))
        }
    }
}

/// Decode an image `url` field: URL-safe base64 whose padding may have been stripped.
pub fn decode_image_url(encoded: &str) -> Result<String, ResolveError> {
    let mut padded = encoded.to_string();
    let missing = (4 - padded.len() % 4) % 4;
    padded.extend(std::iter::repeat('=').take(missing));

    let bytes = URL_SAFE_LENIENT
        .decode(padded.as_bytes())
        .map_err(|e| ResolveError::InvalidBase64(e.to_string()))?;
    String::from_utf8(bytes).map_err(|_| ResolveError::NotUtf8)
}
