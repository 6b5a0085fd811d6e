use crate::album::Storage;
use chrono::NaiveDate;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Length of the `YYYYMMDDHHMMSSii` prefix every capture file name starts with.
pub const TIMESTAMP_PREFIX_LEN: usize = 16;

/// Capture date and time as recorded by the device. `sequence` tells apart
/// captures taken within the same second.
///
/// Field order matters: the derived `Ord` is chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CaptureTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub sequence: u8,
}

impl CaptureTime {
    pub fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        CaptureTime {
            year,
            month,
            day,
            hour,
            minute,
            second,
            sequence: 0,
        }
    }

    pub fn with_sequence(mut self, sequence: u8) -> Self {
        self.sequence = sequence;
        self
    }

    /// The 16 character `YYYYMMDDHHMMSSii` prefix of the capture's file name.
    pub fn file_prefix(&self) -> String {
        format!(
            "{}{}{:02}",
            self.date_stamp(),
            self.time_stamp(),
            self.sequence
        )
    }

    pub fn date_stamp(&self) -> String {
        format!("{:04}{:02}{:02}", self.year, self.month, self.day)
    }

    pub fn time_stamp(&self) -> String {
        format!("{:02}{:02}{:02}", self.hour, self.minute, self.second)
    }

    /// Parses the timestamp prefix of a capture file name. Anything after the
    /// first 16 characters is ignored.
    pub fn parse_prefix(name: &str) -> Option<CaptureTime> {
        let prefix = name.get(..TIMESTAMP_PREFIX_LEN)?;
        if !prefix.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        let field = |range: std::ops::Range<usize>| prefix[range].parse::<u16>().ok();
        let time = CaptureTime::new(
            field(0..4)?,
            field(4..6)? as u8,
            field(6..8)? as u8,
            field(8..10)? as u8,
            field(10..12)? as u8,
            field(12..14)? as u8,
        )
        .with_sequence(field(14..16)? as u8);
        time.unix_timestamp().map(|_| time)
    }

    /// Seconds since the Unix epoch. Capture times carry no zone and are
    /// read as UTC.
    pub fn unix_timestamp(&self) -> Option<i64> {
        let date = NaiveDate::from_ymd_opt(self.year as i32, self.month as u32, self.day as u32)?;
        let time = date.and_hms_opt(self.hour as u32, self.minute as u32, self.second as u32)?;
        Some(time.and_utc().timestamp())
    }

    /// `YYYY/MM/DD` below an album root.
    pub fn day_dir(&self) -> PathBuf {
        PathBuf::from(format!("{:04}", self.year))
            .join(format!("{:02}", self.month))
            .join(format!("{:02}", self.day))
    }

    /// URL path of a file in this capture's day directory.
    pub fn web_path(&self, file_name: &str) -> String {
        format!(
            "/{:04}/{:02}/{:02}/{}",
            self.year, self.month, self.day, file_name
        )
    }
}

/// On-disk album roots, one per storage location.
#[derive(Debug, Clone)]
pub struct AlbumRoots {
    pub nand: PathBuf,
    pub sd: PathBuf,
}

impl AlbumRoots {
    pub fn new(nand: impl Into<PathBuf>, sd: impl Into<PathBuf>) -> Self {
        AlbumRoots {
            nand: nand.into(),
            sd: sd.into(),
        }
    }

    /// Picks the removable-storage root from an ordered candidate list: the
    /// first existing directory wins, otherwise the last candidate is used.
    pub fn detect(nand: impl Into<PathBuf>, sd_candidates: &[PathBuf]) -> Option<Self> {
        let sd = sd_candidates
            .iter()
            .find(|candidate| candidate.is_dir())
            .or_else(|| sd_candidates.last())?;
        info!("album: sd root is {}", sd.display());
        Some(AlbumRoots::new(nand, sd.clone()))
    }

    pub fn root(&self, storage: Storage) -> &Path {
        match storage {
            Storage::Nand => &self.nand,
            Storage::Sd => &self.sd,
        }
    }

    pub fn day_dir(&self, storage: Storage, time: &CaptureTime) -> PathBuf {
        self.root(storage).join(time.day_dir())
    }
}

/// Returns the name that starts with `prefix`. When several names share the
/// prefix the last one enumerated wins; the backend's opaque suffix gives no
/// better key to choose by.
pub fn match_capture_file<I, S>(names: I, prefix: &str) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut found = None;
    for name in names {
        let name = name.as_ref();
        if name.starts_with(prefix) {
            if found.is_some() {
                debug!("album: {} shadows an earlier match for {}", name, prefix);
            }
            found = Some(name.to_string());
        }
    }
    found
}

/// Scans `dir` for the file whose name starts with the capture's timestamp
/// prefix. A missing directory is the same as no match.
pub async fn find_capture_file(dir: &Path, time: &CaptureTime) -> io::Result<Option<String>> {
    let mut read_dir = match tokio::fs::read_dir(dir).await {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut names = Vec::new();
    while let Some(entry) = read_dir.next_entry().await? {
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }

    Ok(match_capture_file(names, &time.file_prefix()))
}
