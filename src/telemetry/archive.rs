//! # Snapshot Archive
//!
//! Appends one JSON object per changed sonde and cycle:
//!
//! ```text
//! {"recorded_at":"2023-11-14T22:15:00Z","sonde":{"id":"SP1","sonde_type":"RS41",...}}
//! ```
//!
//! Files are named `sondes_<UTC timestamp>_<sequence>.jsonl` so that name
//! order is creation order.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::TelemetryConfig;
use crate::error::Result;
use crate::store::Sonde;

const FILE_PREFIX: &str = "sondes_";
const FILE_EXTENSION: &str = ".jsonl";

#[derive(Serialize)]
struct ArchiveRecord<'a> {
    recorded_at: DateTime<Utc>,
    sonde: &'a Sonde,
}

struct OpenFile {
    path: PathBuf,
    writer: BufWriter<File>,
    records: usize,
}

/// Rotating JSONL writer for sonde state
pub struct SnapshotArchive {
    dir: PathBuf,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    sequence: u64,
    current: Option<OpenFile>,
}

impl std::fmt::Debug for SnapshotArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotArchive")
            .field("dir", &self.dir)
            .field("current", &self.current.as_ref().map(|c| &c.path))
            .finish_non_exhaustive()
    }
}

impl SnapshotArchive {
    /// Create an archive writing into `dir` (created if missing)
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created
    pub fn new<P: AsRef<Path>>(
        dir: P,
        max_records_per_file: usize,
        max_files_to_keep: usize,
    ) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        Ok(Self {
            dir,
            max_records_per_file: max_records_per_file.max(1),
            max_files_to_keep: max_files_to_keep.max(1),
            sequence: 0,
            current: None,
        })
    }

    /// Create an archive from the `[telemetry]` section
    pub fn from_config(config: &TelemetryConfig) -> Result<Self> {
        Self::new(&config.log_dir, config.max_records_per_file, config.max_files_to_keep)
    }

    /// Append one record per sonde
    ///
    /// # Returns
    ///
    /// * `Result<usize>` - Number of records written
    ///
    /// # Errors
    ///
    /// Returns error if a file cannot be created or written
    pub fn append<'a, I>(&mut self, recorded_at: DateTime<Utc>, sondes: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'a Sonde>,
    {
        let mut written = 0;
        for sonde in sondes {
            let file = self.writable_file(recorded_at)?;
            serde_json::to_writer(&mut file.writer, &ArchiveRecord { recorded_at, sonde })?;
            file.writer.write_all(b"\n")?;
            file.records += 1;
            written += 1;
        }

        if let Some(file) = self.current.as_mut() {
            file.writer.flush()?;
        }
        debug!("Archived {} sonde record(s)", written);
        Ok(written)
    }

    /// Path of the file currently being written
    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_ref().map(|c| c.path.as_path())
    }

    fn writable_file(&mut self, now: DateTime<Utc>) -> Result<&mut OpenFile> {
        let file = match self.current.take() {
            Some(file) if file.records < self.max_records_per_file => file,
            previous => {
                if let Some(mut old) = previous {
                    old.writer.flush()?;
                }
                let file = self.open_next(now)?;
                self.prune();
                file
            }
        };
        Ok(self.current.insert(file))
    }

    fn open_next(&mut self, now: DateTime<Utc>) -> Result<OpenFile> {
        self.sequence += 1;
        let name = format!(
            "{}{}_{:06}{}",
            FILE_PREFIX,
            now.format("%Y%m%dT%H%M%S%3f"),
            self.sequence,
            FILE_EXTENSION
        );
        let path = self.dir.join(name);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!("Opened archive file {}", path.display());

        Ok(OpenFile {
            path,
            writer: BufWriter::new(file),
            records: 0,
        })
    }

    fn prune(&self) {
        let mut files = match archive_files(&self.dir) {
            Ok(files) => files,
            Err(e) => {
                warn!("Failed to list archive directory {}: {}", self.dir.display(), e);
                return;
            }
        };
        if files.len() <= self.max_files_to_keep {
            return;
        }

        files.sort();
        let excess = files.len() - self.max_files_to_keep;
        for path in files.into_iter().take(excess) {
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to remove old archive file {}: {}", path.display(), e);
            }
        }
    }
}

fn archive_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_archive = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(FILE_PREFIX) && n.ends_with(FILE_EXTENSION));
        if is_archive {
            files.push(path);
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::protocol::{DecodedRecord, Sample, SideFields};
    use crate::store::{SondeStore, StoreSettings};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn store_with(ids: &[&str]) -> SondeStore {
        let mut store = SondeStore::new(StoreSettings::default());
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        for id in ids {
            store.merge(
                DecodedRecord {
                    id: id.to_string(),
                    sample: Sample {
                        time: now,
                        lat: 54.5,
                        lon: 18.5,
                        alt: Some(1000.0),
                        temp: Some(10.2),
                        pressure: Some(900.0),
                        humidity: Some(55.0),
                    },
                    side: SideFields {
                        sonde_type: "RS41".to_string(),
                        ..SideFields::default()
                    },
                },
                now,
            );
        }
        store
    }

    fn read_lines(dir: &Path) -> Vec<String> {
        let mut files = archive_files(dir).unwrap();
        files.sort();
        files
            .iter()
            .flat_map(|p| {
                fs::read_to_string(p)
                    .unwrap()
                    .lines()
                    .map(String::from)
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    #[test]
    fn test_append_writes_jsonl() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&["SP1", "SP2"]);
        let mut archive = SnapshotArchive::new(dir.path(), 100, 10).unwrap();

        let at = Utc.timestamp_opt(1_700_000_060, 0).unwrap();
        let written = archive.append(at, store.snapshot(at).sondes.iter()).unwrap();
        assert_eq!(written, 2);

        let lines = read_lines(dir.path());
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(first["sonde"]["id"], "SP1");
        assert_eq!(first["sonde"]["sonde_type"], "RS41");
        assert_eq!(first["sonde"]["status"], "active");
        assert_eq!(first["sonde"]["latest"]["lat"], 54.5);
        assert!(first["sonde"]["derived"]["dew_point"].is_number());
        // History is not archived
        assert!(first["sonde"].get("history").is_none());
        assert_eq!(first["recorded_at"], "2023-11-14T22:14:20Z");
    }

    #[test]
    fn test_rotation_after_max_records() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&["A", "B", "C", "D", "E"]);
        let mut archive = SnapshotArchive::new(dir.path(), 2, 10).unwrap();

        let at = Utc.timestamp_opt(1_700_000_060, 0).unwrap();
        archive.append(at, store.iter()).unwrap();

        assert_eq!(archive_files(dir.path()).unwrap().len(), 3);
        assert_eq!(read_lines(dir.path()).len(), 5);
    }

    #[test]
    fn test_prunes_oldest_files() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&["A"]);
        let mut archive = SnapshotArchive::new(dir.path(), 1, 2).unwrap();

        for i in 0..5 {
            let at = Utc.timestamp_opt(1_700_000_000 + i, 0).unwrap();
            archive.append(at, store.iter()).unwrap();
        }

        let mut files = archive_files(dir.path()).unwrap();
        files.sort();
        assert_eq!(files.len(), 2);
        assert_eq!(files.last().map(|p| p.as_path()), archive.current_path());
    }

    #[test]
    fn test_unrelated_files_are_kept() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("notes.txt"), "keep me").unwrap();
        let store = store_with(&["A"]);
        let mut archive = SnapshotArchive::new(dir.path(), 1, 1).unwrap();

        for i in 0..3 {
            let at = Utc.timestamp_opt(1_700_000_000 + i, 0).unwrap();
            archive.append(at, store.iter()).unwrap();
        }

        assert!(dir.path().join("notes.txt").exists());
        assert_eq!(archive_files(dir.path()).unwrap().len(), 1);
    }

    #[test]
    fn test_from_config_creates_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("archive").join("sondes");
        let config = TelemetryConfig {
            enabled: true,
            log_dir: nested.to_string_lossy().to_string(),
            max_records_per_file: 10,
            max_files_to_keep: 3,
            format: "jsonl".to_string(),
        };

        let archive = SnapshotArchive::from_config(&config).unwrap();
        assert!(nested.is_dir());
        assert!(archive.current_path().is_none());
    }
}
