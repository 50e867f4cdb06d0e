//! Fixed-capacity log file shared by the services.
//!
//! Layout, little endian: `magic: u32`, `next_index: u32`, then `capacity`
//! slots of `timestamp_ns: i64` followed by a zero padded UTF-8 line of at
//! most [`LINE_LENGTH`] bytes. A zero timestamp marks an unused slot. The
//! capacity is implied by the file length, so readers never need the
//! configuration that created the file.

use anyhow::Result;
use chrono::DateTime;
use fd_lock::RwLock;
use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use crate::{config, platform::LogDumper};

pub const DEFAULT_LINES: u32 = 2048;
pub const LINE_LENGTH: usize = 512;

const MAGIC: u32 = 0xbadbabe;
const HEADER_SIZE: u64 = 8;
const SLOT_SIZE: u64 = 8 + LINE_LENGTH as u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub timestamp_ns: i64,
    pub line: String,
}

impl Entry {
    /// `YYYY-MM-DD HH:MM:SS.ffffff: line`, in UTC.
    pub fn format(&self) -> String {
        let secs = self.timestamp_ns.div_euclid(1_000_000_000);
        let nanos = self.timestamp_ns.rem_euclid(1_000_000_000) as u32;
        let stamp = match DateTime::from_timestamp(secs, nanos) {
            Some(time) => time.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
            None => self.timestamp_ns.to_string(),
        };

        format!("{stamp}: {}", self.line)
    }
}

#[derive(Debug, Clone)]
pub struct RingLog {
    path: PathBuf,
    capacity: u32,
}

impl RingLog {
    pub fn new(path: impl Into<PathBuf>, capacity: u32) -> Self {
        Self {
            path: path.into(),
            capacity: capacity.max(1),
        }
    }

    pub fn from_config() -> Result<Self> {
        let config = config::read()?;
        Ok(Self::new(
            config.state_dir().join("log.bin"),
            config.log_lines,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<File> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        Ok(OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?)
    }

    /// Overwrites the oldest slot. Lines longer than [`LINE_LENGTH`] bytes are
    /// cut at a character boundary.
    pub fn append(&self, line: &str) -> Result<()> {
        let mut lock = RwLock::new(self.open()?);
        // Every service appends to the same file, so the lock spans the
        // whole read-modify-write of the index.
        let mut file = lock.write()?;

        if file.metadata()?.len() == 0 {
            log::trace!("Creating ring log {} ({} lines)", self.path.display(), self.capacity);
            file.set_len(HEADER_SIZE + SLOT_SIZE * self.capacity as u64)?;
            file.write_all(&MAGIC.to_le_bytes())?;
            file.write_all(&0u32.to_le_bytes())?;
        }

        let capacity = read_capacity(&file, &self.path)?;

        let mut index = [0u8; 4];
        file.seek(SeekFrom::Start(4))?;
        file.read_exact(&mut index)?;
        let slot = u32::from_le_bytes(index) % capacity;

        let timestamp = SystemTime::now().duration_since(UNIX_EPOCH)?.as_nanos() as i64;
        let text = truncate(line, LINE_LENGTH);

        let mut data = vec![0u8; SLOT_SIZE as usize];
        data[..8].copy_from_slice(&timestamp.to_le_bytes());
        data[8..8 + text.len()].copy_from_slice(text.as_bytes());

        file.seek(SeekFrom::Start(HEADER_SIZE + SLOT_SIZE * slot as u64))?;
        file.write_all(&data)?;
        file.seek(SeekFrom::Start(4))?;
        file.write_all(&((slot + 1) % capacity).to_le_bytes())?;

        Ok(())
    }

    /// Every stored line, oldest first.
    pub fn entries(&self) -> Result<Vec<Entry>> {
        let lock = match File::open(&self.path) {
            Ok(file) => RwLock::new(file),
            Err(err) => anyhow::bail!("Unable to open log {}: {err}", self.path.display()),
        };
        let guard = lock.read()?;
        let mut file: &File = &guard;
        let capacity = read_capacity(file, &self.path)?;

        let mut data = Vec::new();
        file.seek(SeekFrom::Start(0))?;
        file.read_to_end(&mut data)?;

        let next = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        let start = next % capacity;

        let entries = (0..capacity)
            .map(|i| (start + i) % capacity)
            .filter_map(|slot| {
                let offset = (HEADER_SIZE + SLOT_SIZE * slot as u64) as usize;
                parse_slot(&data[offset..offset + SLOT_SIZE as usize])
            })
            .collect();

        Ok(entries)
    }
}

fn read_capacity(mut file: &File, path: &Path) -> Result<u32> {
    let len = file.metadata()?.len();
    let mut magic = [0u8; 4];
    file.seek(SeekFrom::Start(0))?;

    if len < HEADER_SIZE + SLOT_SIZE || file.read_exact(&mut magic).is_err() {
        anyhow::bail!("{} is not a ring log", path.display())
    }
    if u32::from_le_bytes(magic) != MAGIC || (len - HEADER_SIZE) % SLOT_SIZE != 0 {
        anyhow::bail!("{} is not a ring log", path.display())
    }

    Ok(((len - HEADER_SIZE) / SLOT_SIZE) as u32)
}

fn parse_slot(slot: &[u8]) -> Option<Entry> {
    let timestamp_ns = i64::from_le_bytes(slot[..8].try_into().ok()?);
    if timestamp_ns == 0 {
        return None;
    }

    let text = &slot[8..];
    let len = text.iter().position(|b| *b == 0).unwrap_or(text.len());

    Some(Entry {
        timestamp_ns,
        line: String::from_utf8_lossy(&text[..len]).into_owned(),
    })
}

fn truncate(line: &str, max: usize) -> &str {
    if line.len() <= max {
        return line;
    }

    let mut end = max;
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    &line[..end]
}

fn boot_time_ns() -> i64 {
    sysinfo::System::boot_time() as i64 * 1_000_000_000
}

impl LogDumper for RingLog {
    /// Without `include_all` only lines written since the last boot are kept.
    fn dump_to(&self, out: &mut dyn Write, include_all: bool) -> Result<()> {
        let since = match include_all {
            true => i64::MIN,
            false => boot_time_ns(),
        };

        for entry in self.entries()? {
            if entry.timestamp_ns >= since {
                writeln!(out, "{}", entry.format())?;
            }
        }

        out.flush()?;
        Ok(())
    }
}

/// The ring log at the configured location, resolved on each dump.
pub struct ConfiguredRingLog;

impl LogDumper for ConfiguredRingLog {
    fn dump_to(&self, out: &mut dyn Write, include_all: bool) -> Result<()> {
        RingLog::from_config()?.dump_to(out, include_all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_log_has_header_and_slots() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let log = RingLog::new(dir.path().join("nested/log.bin"), 4);
        log.append("first")?;

        let data = std::fs::read(log.path())?;
        assert_eq!(data.len() as u64, HEADER_SIZE + 4 * SLOT_SIZE);
        assert_eq!(&data[..4], &MAGIC.to_le_bytes());
        assert_eq!(&data[4..8], &1u32.to_le_bytes());

        Ok(())
    }

    #[test]
    fn wraps_and_keeps_newest_lines_in_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let log = RingLog::new(dir.path().join("log.bin"), 3);
        for line in ["one", "two", "three", "four", "five"] {
            log.append(line)?;
        }

        let lines = log
            .entries()?
            .into_iter()
            .map(|entry| entry.line)
            .collect::<Vec<_>>();
        assert_eq!(lines, ["three", "four", "five"]);

        Ok(())
    }

    #[test]
    fn index_stays_within_capacity() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let log = RingLog::new(dir.path().join("log.bin"), 3);
        for line in ["one", "two", "three", "four", "five"] {
            log.append(line)?;
        }

        let data = std::fs::read(log.path())?;
        assert_eq!(&data[4..8], &2u32.to_le_bytes());

        Ok(())
    }

    #[test]
    fn large_stored_index_keeps_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let log = RingLog::new(dir.path().join("log.bin"), 3);
        log.append("seed")?;

        let mut file = OpenOptions::new().write(true).open(log.path())?;
        file.seek(SeekFrom::Start(4))?;
        file.write_all(&u32::MAX.to_le_bytes())?;
        drop(file);

        log.append("a")?;
        log.append("b")?;

        let lines = log
            .entries()?
            .into_iter()
            .map(|entry| entry.line)
            .collect::<Vec<_>>();
        assert_eq!(lines, ["a", "b"]);

        Ok(())
    }

    #[test]
    fn concurrent_writers_keep_every_line() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("log.bin");

        let results = std::thread::scope(|scope| {
            let writers = (0..4)
                .map(|writer| {
                    let log = RingLog::new(&path, 200);
                    scope.spawn(move || {
                        (0..25).try_for_each(|i| log.append(&format!("{writer}:{i}")))
                    })
                })
                .collect::<Vec<_>>();

            writers
                .into_iter()
                .map(|writer| writer.join().expect("writer panicked"))
                .collect::<Vec<_>>()
        });
        for result in results {
            result?;
        }

        let mut lines = RingLog::new(&path, 200)
            .entries()?
            .into_iter()
            .map(|entry| entry.line)
            .collect::<Vec<_>>();
        lines.sort();

        let mut expected = (0..4)
            .flat_map(|writer| (0..25).map(move |i| format!("{writer}:{i}")))
            .collect::<Vec<_>>();
        expected.sort();
        assert_eq!(lines, expected);

        Ok(())
    }

    #[test]
    fn existing_file_keeps_its_capacity() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("log.bin");
        RingLog::new(&path, 2).append("a")?;

        let reopened = RingLog::new(&path, 100);
        reopened.append("b")?;
        reopened.append("c")?;

        let lines = reopened
            .entries()?
            .into_iter()
            .map(|entry| entry.line)
            .collect::<Vec<_>>();
        assert_eq!(lines, ["b", "c"]);

        Ok(())
    }

    #[test]
    fn long_lines_are_cut_on_char_boundary() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let log = RingLog::new(dir.path().join("log.bin"), 1);
        let line = format!("{}é", "a".repeat(LINE_LENGTH - 1));
        log.append(&line)?;

        let entries = log.entries()?;
        assert_eq!(entries[0].line, "a".repeat(LINE_LENGTH - 1));

        Ok(())
    }

    #[test]
    fn rejects_foreign_files() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("log.bin");
        std::fs::write(&path, vec![1u8; (HEADER_SIZE + SLOT_SIZE) as usize])?;

        let log = RingLog::new(&path, 1);
        assert!(log.entries().is_err());
        assert!(log.append("x").is_err());

        Ok(())
    }

    #[test]
    fn missing_file_names_path() {
        let log = RingLog::new("/nonexistent/wireguard-rs/log.bin", 1);
        let err = log.entries().unwrap_err().to_string();
        assert!(err.contains("/nonexistent/wireguard-rs/log.bin"), "{err}");
    }

    #[test]
    fn dump_formats_every_line() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let log = RingLog::new(dir.path().join("log.bin"), 8);
        log.append("[MGR] Starting manager service")?;
        log.append("[MGR] Stopping manager service")?;

        let mut out = Vec::new();
        log.dump_to(&mut out, true)?;
        let out = String::from_utf8(out)?;

        let lines = out.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(": [MGR] Starting manager service"));
        assert!(lines[1].ends_with(": [MGR] Stopping manager service"));

        Ok(())
    }

    #[test]
    fn entry_timestamp_format() {
        let entry = Entry {
            timestamp_ns: 1_565_000_000_123_456_789,
            line: "hello".into(),
        };
        assert_eq!(entry.format(), "2019-08-05 10:13:20.123456: hello");
    }
}
