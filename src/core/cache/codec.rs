//! Cache file name codec.
//!
//! Every cache file is named `<YYYYMMDDHHmm><id without separators>.txt`:
//! a minute-granularity UTC timestamp in fixed-width decimal fields,
//! followed by the source sensor's identifier with `:`/`-` stripped.
//! Decoding reverses this by fixed-offset substring extraction and by
//! reinserting `:` every two characters of the identifier.
//!
//! The widths are a strict on-disk contract shared with prior releases:
//! changing any field breaks both the write and read paths at once, which
//! is why encode and decode live in this one module and are tested
//! together.

use thiserror::Error;
use time::{Date, Month, OffsetDateTime, Time};

/// File extension carried by every cache file.
pub const FILE_SUFFIX: &str = ".txt";

/// Length of the `YYYYMMDDHHmm` stamp prefix.
const STAMP_LEN: usize = 12;

/// Errors raised while decoding a cache file name.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The name does not carry the `.txt` suffix.
    #[error("Cache file name has no .txt suffix: {0}")]
    MissingSuffix(String),

    /// The name is too short to hold a stamp and an identifier.
    #[error("Cache file name too short: {0}")]
    TooShort(String),

    /// A stamp field is not decimal, or describes an impossible instant.
    #[error("Invalid timestamp in cache file name {name}: {reason}")]
    BadStamp { name: String, reason: String },

    /// The identifier part has odd length and cannot be re-separated.
    #[error("Invalid source id in cache file name: {0}")]
    BadSourceId(String),
}

/// A decoded cache file identity: the minute bucket and the source id
/// (with separators restored).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketKey {
    /// Start of the minute this file belongs to, UTC.
    pub minute: OffsetDateTime,
    /// Source sensor identifier, `AA:BB:CC:DD:EE:FF` form.
    pub source_id: String,
}

/// Encodes a bucket identity into a cache file name.
///
/// The stamp is truncated to minute granularity; seconds and below are
/// discarded. Separators (`:` and `-`) are stripped from the identifier.
pub fn encode(stamp: OffsetDateTime, source_id: &str) -> String {
    let stripped: String = source_id.chars().filter(|c| *c != ':' && *c != '-').collect();
    format!(
        "{:04}{:02}{:02}{:02}{:02}{}{}",
        stamp.year(),
        u8::from(stamp.month()),
        stamp.day(),
        stamp.hour(),
        stamp.minute(),
        stripped,
        FILE_SUFFIX
    )
}

/// Decodes a cache file name back into its bucket identity.
///
/// # Errors
///
/// Returns a `CodecError` describing the first violated field. Foreign
/// files in the cache directory surface here rather than panicking.
pub fn decode(name: &str) -> Result<BucketKey, CodecError> {
    let stem = name
        .strip_suffix(FILE_SUFFIX)
        .ok_or_else(|| CodecError::MissingSuffix(name.to_string()))?;

    if stem.len() < STAMP_LEN + 2 || !stem.is_ascii() {
        return Err(CodecError::TooShort(name.to_string()));
    }

    let (stamp, id_part) = stem.split_at(STAMP_LEN);

    let field = |range: std::ops::Range<usize>, what: &str| -> Result<u32, CodecError> {
        stamp[range].parse::<u32>().map_err(|_| CodecError::BadStamp {
            name: name.to_string(),
            reason: format!("{what} is not decimal"),
        })
    };

    let year = field(0..4, "year")? as i32;
    let month = field(4..6, "month")?;
    let day = field(6..8, "day")?;
    let hour = field(8..10, "hour")?;
    let minute = field(10..12, "minute")?;

    let bad_stamp = |reason: String| CodecError::BadStamp {
        name: name.to_string(),
        reason,
    };
    let month = Month::try_from(month as u8).map_err(|e| bad_stamp(e.to_string()))?;
    let date =
        Date::from_calendar_date(year, month, day as u8).map_err(|e| bad_stamp(e.to_string()))?;
    let time =
        Time::from_hms(hour as u8, minute as u8, 0).map_err(|e| bad_stamp(e.to_string()))?;

    if id_part.len() % 2 != 0 {
        return Err(CodecError::BadSourceId(name.to_string()));
    }
    let source_id = id_part
        .as_bytes()
        .chunks(2)
        .map(|pair| std::str::from_utf8(pair).unwrap_or_default())
        .collect::<Vec<_>>()
        .join(":");

    Ok(BucketKey {
        minute: date.with_time(time).assume_utc(),
        source_id,
    })
}
