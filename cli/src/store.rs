// Directory-backed log store.
//
// Layout:
//   <root>/00000000000000000000.json             commit of version 0
//   <root>/00000000000000000003.checkpoint.json  checkpoint at version 3
//
// Each file holds one action envelope per line.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use tablelog_kernel::log::store::{next_version, LogStore, LogStoreError};
use tablelog_kernel::Version;

const COMMIT_SUFFIX: &str = ".json";
const CHECKPOINT_SUFFIX: &str = ".checkpoint.json";

#[derive(Debug, Clone)]
pub struct DirectoryLogStore {
    root: PathBuf,
}

impl DirectoryLogStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn commit_path(&self, version: Version) -> PathBuf {
        self.root.join(format!("{version:020}{COMMIT_SUFFIX}"))
    }

    fn checkpoint_path(&self, version: Version) -> PathBuf {
        self.root.join(format!("{version:020}{CHECKPOINT_SUFFIX}"))
    }

    /// Versions of all files in the directory ending in `suffix`, ascending.
    fn scan(&self, suffix: &str) -> Result<Vec<Version>, LogStoreError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut versions = Vec::new();
        for entry in entries {
            let name = entry?.file_name();
            if let Some(version) = name.to_str().and_then(|n| parse_version(n, suffix)) {
                versions.push(version);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }
}

/// Parse `NNNNNNNNNNNNNNNNNNNN<suffix>`; anything else is not ours.
fn parse_version(name: &str, suffix: &str) -> Option<Version> {
    let digits = name.strip_suffix(suffix)?;
    if digits.len() != 20 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn read_records(path: &Path) -> io::Result<Vec<String>> {
    Ok(fs::read_to_string(path)?
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect())
}

fn render(records: &[String]) -> String {
    let mut out = records.join("\n");
    out.push('\n');
    out
}

impl LogStore for DirectoryLogStore {
    fn list_versions(&self, range: RangeInclusive<Version>) -> Result<Vec<Version>, LogStoreError> {
        Ok(self
            .scan(COMMIT_SUFFIX)?
            .into_iter()
            .filter(|v| range.contains(v))
            .collect())
    }

    fn read_batch(&self, version: Version) -> Result<Vec<String>, LogStoreError> {
        read_records(&self.commit_path(version)).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => LogStoreError::VersionNotFound(version),
            _ => e.into(),
        })
    }

    fn list_checkpoints(&self) -> Result<Vec<Version>, LogStoreError> {
        self.scan(CHECKPOINT_SUFFIX)
    }

    fn read_checkpoint(&self, version: Version) -> Result<Vec<String>, LogStoreError> {
        read_records(&self.checkpoint_path(version)).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => LogStoreError::CheckpointNotFound(version),
            _ => e.into(),
        })
    }

    fn write_batch(&mut self, version: Version, records: Vec<String>) -> Result<(), LogStoreError> {
        let expected = next_version(self.latest_version()?);
        if version != expected {
            return Err(LogStoreError::VersionConflict {
                expected,
                actual: version,
            });
        }

        fs::create_dir_all(&self.root)?;
        // create_new makes a concurrent writer of the same version lose
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.commit_path(version))
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(LogStoreError::VersionConflict {
                    expected: version + 1,
                    actual: version,
                })
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(render(&records).as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    fn write_checkpoint(
        &mut self,
        version: Version,
        records: Vec<String>,
    ) -> Result<(), LogStoreError> {
        if !self.commit_path(version).exists() {
            return Err(LogStoreError::VersionNotFound(version));
        }
        fs::write(self.checkpoint_path(version), render(&records))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_only_log_file_names() {
        assert_eq!(
            parse_version("00000000000000000007.json", COMMIT_SUFFIX),
            Some(7)
        );
        assert_eq!(
            parse_version("00000000000000000007.checkpoint.json", CHECKPOINT_SUFFIX),
            Some(7)
        );
        assert_eq!(
            parse_version("00000000000000000007.checkpoint.json", COMMIT_SUFFIX),
            None
        );
        assert_eq!(parse_version("7.json", COMMIT_SUFFIX), None);
        assert_eq!(parse_version("_last_checkpoint", COMMIT_SUFFIX), None);
    }

    #[test]
    fn write_list_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DirectoryLogStore::new(dir.path().join("_log"));

        assert_eq!(store.latest_version().unwrap(), None);

        store.write_batch(0, vec!["{}".into()]).unwrap();
        store
            .write_batch(1, vec!["{\"a\":1}".into(), "{\"b\":2}".into()])
            .unwrap();

        assert_eq!(store.list_versions(0..=9).unwrap(), vec![0, 1]);
        assert_eq!(store.read_batch(1).unwrap(), vec!["{\"a\":1}", "{\"b\":2}"]);
        assert!(matches!(
            store.read_batch(4).unwrap_err(),
            LogStoreError::VersionNotFound(4)
        ));
    }

    #[test]
    fn rejects_non_sequential_writes() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DirectoryLogStore::new(dir.path());

        store.write_batch(0, vec![]).unwrap();
        assert!(matches!(
            store.write_batch(0, vec![]).unwrap_err(),
            LogStoreError::VersionConflict { .. }
        ));
        assert!(store.write_batch(5, vec![]).is_err());
    }

    #[test]
    fn checkpoints_are_listed_separately() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DirectoryLogStore::new(dir.path());

        store.write_batch(0, vec!["{}".into()]).unwrap();
        store.write_checkpoint(0, vec!["cp".into()]).unwrap();

        assert_eq!(store.list_versions(0..=9).unwrap(), vec![0]);
        assert_eq!(store.list_checkpoints().unwrap(), vec![0]);
        assert_eq!(store.read_checkpoint(0).unwrap(), vec!["cp"]);
        assert!(store.write_checkpoint(3, vec![]).is_err());
    }
}
