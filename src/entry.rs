//! Directory records and extraction results.

use std::ops::Deref;
use std::time::SystemTime;

use chrono::{DateTime, NaiveDate, Utc};

/// Id returned by name lookups that match no entry.
///
/// Passing it to [`Archive::file_data_by_id`](crate::Archive::file_data_by_id)
/// yields `None` like any other out-of-range id.
pub const INVALID_FILE_ID: usize = usize::MAX;

/// Zero bytes appended after extracted entry data
pub const DATA_TERMINATOR_LEN: usize = 3;

/// One member of an archive's directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Position in the directory, assigned in enumeration order
    pub id: usize,
    /// Archive-internal path as stored by the format (not normalized)
    pub name: String,
    /// Decompressed size in bytes
    pub size: u64,
    /// Decoder-specific position used to locate the entry again
    pub offset: u64,
    pub file_time: FileTime,
}

/// Seconds between 1601-01-01 and 1970-01-01
const NT_TO_UNIX_SECS: i64 = 11_644_473_600;
const TICKS_PER_SEC: u64 = 10_000_000;

/// Archive timestamp as 100ns ticks since 1601-01-01.
///
/// Formats storing DOS date/time record local time without a zone, so the
/// value is kept as found and only interpreted when converted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileTime(u64);

impl FileTime {
    pub const fn from_raw(ticks: u64) -> Self {
        Self(ticks)
    }

    pub const fn to_raw(self) -> u64 {
        self.0
    }

    /// Build from a DOS date/time pair (2 second resolution).
    ///
    /// Fields outside the calendar (month 0, day 31 in April...) yield the
    /// default time.
    pub fn from_dos(date: u16, time: u16) -> Self {
        let day = (date & 0x1F) as u32;
        let month = ((date >> 5) & 0x0F) as u32;
        let year = ((date >> 9) & 0x7F) as i32 + 1980;
        let second = ((time & 0x1F) * 2) as u32;
        let minute = ((time >> 5) & 0x3F) as u32;
        let hour = ((time >> 11) & 0x1F) as u32;

        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|date| date.and_hms_opt(hour, minute, second))
            .map(|naive| Self::from_datetime(naive.and_utc()))
            .unwrap_or_default()
    }

    /// Build from seconds since the Unix epoch, clamping before 1601
    pub fn from_unix(secs: i64) -> Self {
        let secs = secs.saturating_add(NT_TO_UNIX_SECS).max(0) as u64;
        Self(secs.saturating_mul(TICKS_PER_SEC))
    }

    /// Build from a UTC date, clamping before 1601
    pub fn from_datetime(datetime: DateTime<Utc>) -> Self {
        let ticks = Self::from_unix(datetime.timestamp()).0;
        Self(ticks.saturating_add(u64::from(datetime.timestamp_subsec_nanos() / 100)))
    }

    /// The timestamp as a UTC date, `None` past the range chrono supports
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        let secs = (self.0 / TICKS_PER_SEC) as i64 - NT_TO_UNIX_SECS;
        let nanos = ((self.0 % TICKS_PER_SEC) * 100) as u32;
        DateTime::from_timestamp(secs, nanos)
    }

    pub fn to_system_time(self) -> Option<SystemTime> {
        self.to_datetime().map(SystemTime::from)
    }
}

/// Owned bytes handed out by an extraction.
///
/// The payload is followed by zero bytes so consumers scanning it as text in
/// 8, 16 or 32 bit encodings always hit a terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileData {
    buf: Vec<u8>,
    len: usize,
}

impl FileData {
    /// `buf[len..]` must be the zeroed terminator
    pub(crate) fn from_parts(buf: Vec<u8>, len: usize) -> Self {
        debug_assert!(len < buf.len());
        debug_assert!(buf[len..].iter().all(|&b| b == 0));
        Self { buf, len }
    }

    /// Payload length, excluding the terminator
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Payload plus its trailing zero bytes
    pub fn as_bytes_with_terminator(&self) -> &[u8] {
        &self.buf
    }

    /// Take the payload, dropping the terminator
    pub fn into_vec(mut self) -> Vec<u8> {
        self.buf.truncate(self.len);
        self.buf
    }
}

impl Deref for FileData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl AsRef<[u8]> for FileData {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

/// Case-insensitive name comparison used by lookups
pub(crate) fn name_eq_ignore_case(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
        || a.chars()
            .flat_map(char::to_lowercase)
            .eq(b.chars().flat_map(char::to_lowercase))
}

/// Allocate a zeroed buffer, reporting failure instead of aborting
pub(crate) fn try_alloc_zeroed(len: usize) -> Option<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).ok()?;
    buf.resize(len, 0);
    Some(buf)
}
