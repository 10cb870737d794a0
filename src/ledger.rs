//! The posting ledger: a durable `item id -> date posted` mapping.
//!
//! The ledger is the source of truth for de-duplication and quota counting.
//! It only ever reflects *today*: entries from earlier days are pruned on
//! load, so yesterday's history never accumulates.
//!
//! # Concurrency
//!
//! Overlapping invocations (e.g. scheduled-job runs that outlive their slot)
//! may both load the ledger before either writes. Every mutating path
//! ([`PostingLedger::record`] and [`PostingLedger::prune_to_today`])
//! therefore takes an exclusive `flock` on a sidecar lock file and re-reads
//! the persisted map before touching it, so a rewrite never erases an entry
//! a concurrent invocation recorded after we loaded. The write itself goes
//! through a temp file and an atomic rename, so a crash never leaves a
//! partially written ledger behind.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::error::LedgerError;

/// In-memory view of the persisted posting history.
#[derive(Debug)]
pub struct PostingLedger {
    path: PathBuf,
    entries: BTreeMap<String, NaiveDate>,
}

impl PostingLedger {
    /// Load the ledger from disk.
    ///
    /// A missing file yields an empty ledger. A malformed file also yields
    /// an empty ledger, with a warning: the run proceeds accepting the risk
    /// of re-posting items that were posted before the corruption.
    pub fn load(path: &Path) -> Self {
        let entries = match fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<BTreeMap<String, NaiveDate>>(&raw) {
                Ok(entries) => {
                    info!(count = entries.len(), path = %path.display(), "Loaded posting ledger");
                    entries
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "Posting ledger is malformed; starting empty (previously posted items may be posted again)"
                    );
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No posting ledger yet; starting empty");
                BTreeMap::new()
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Posting ledger is unreadable; starting empty (previously posted items may be posted again)"
                );
                BTreeMap::new()
            }
        };
        Self {
            path: path.to_path_buf(),
            entries,
        }
    }

    /// Drop every entry not dated `today`, rewriting the file if anything
    /// was removed. Returns whether the ledger changed.
    ///
    /// Runs under the same exclusive lock as [`PostingLedger::record`] and
    /// merges the on-disk map first, so the rewrite preserves entries a
    /// concurrent invocation recorded after this ledger was loaded.
    pub fn prune_to_today(&mut self, today: NaiveDate) -> Result<bool, LedgerError> {
        let _guard = LedgerLock::acquire(&self.path)?;
        self.merge_from_disk();
        let before = self.entries.len();
        self.entries.retain(|_, posted_on| *posted_on == today);
        let changed = self.entries.len() != before;
        if changed {
            info!(
                removed = before - self.entries.len(),
                remaining = self.entries.len(),
                "Pruned stale ledger entries"
            );
            self.persist()?;
        }
        Ok(changed)
    }

    /// Atomically record that `item_id` was posted `today`.
    ///
    /// Under an exclusive file lock, the persisted map is re-read and merged
    /// so a concurrent invocation's record is visible before the duplicate
    /// check. Returns `Ok(false)` if an entry for `item_id` dated `today`
    /// already exists; the caller must treat that as a failed attempt.
    pub fn record(&mut self, item_id: &str, today: NaiveDate) -> Result<bool, LedgerError> {
        let _guard = LedgerLock::acquire(&self.path)?;
        self.merge_from_disk();

        if self.entries.get(item_id) == Some(&today) {
            warn!(item_id, %today, "Duplicate post prevented; item already recorded today");
            return Ok(false);
        }

        self.entries.insert(item_id.to_string(), today);
        self.persist()?;
        info!(item_id, %today, count = self.entries.len(), "Recorded post in ledger");
        Ok(true)
    }

    /// Number of entries dated `today`.
    pub fn count_today(&self, today: NaiveDate) -> u32 {
        self.entries.values().filter(|d| **d == today).count() as u32
    }

    /// Whether `item_id` already has an entry dated `today`.
    pub fn posted_today(&self, item_id: &str, today: NaiveDate) -> bool {
        self.entries.get(item_id) == Some(&today)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Truncate the ledger to an empty map and persist it.
    pub fn reset(&mut self) -> Result<usize, LedgerError> {
        let removed = self.entries.len();
        self.entries.clear();
        self.persist()?;
        info!(removed, path = %self.path.display(), "Posting ledger reset");
        Ok(removed)
    }

    /// Fold the persisted map into memory so entries written by a
    /// concurrent invocation since our load are visible. Entries we already
    /// hold win; callers must hold the lock.
    fn merge_from_disk(&mut self) {
        if let Ok(raw) = fs::read_to_string(&self.path) {
            if let Ok(on_disk) = serde_json::from_str::<BTreeMap<String, NaiveDate>>(&raw) {
                for (id, posted_on) in on_disk {
                    self.entries.entry(id).or_insert(posted_on);
                }
            }
        }
    }

    /// Whole-map overwrite through a temp file and atomic rename.
    fn persist(&self) -> Result<(), LedgerError> {
        let json = serde_json::to_string_pretty(&self.entries)?;
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let temp = tempfile::NamedTempFile::new_in(&parent).map_err(|source| {
            LedgerError::Write {
                path: self.path.clone(),
                source,
            }
        })?;
        use std::io::Write;
        temp.as_file()
            .write_all(json.as_bytes())
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|source| LedgerError::Write {
                path: self.path.clone(),
                source,
            })?;
        temp.persist(&self.path).map_err(|e| LedgerError::Write {
            path: self.path.clone(),
            source: e.error,
        })?;
        debug!(count = self.entries.len(), path = %self.path.display(), "Persisted posting ledger");
        Ok(())
    }
}

/// RAII guard for the ledger's sidecar lock file. The flock is released when
/// the guard (and its file handle) is dropped.
struct LedgerLock {
    _file: File,
}

impl LedgerLock {
    fn acquire(ledger_path: &Path) -> Result<Self, LedgerError> {
        let lock_path = lock_path_for(ledger_path);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|source| LedgerError::Lock {
                path: lock_path.clone(),
                source,
            })?;
        flock_exclusive(&file).map_err(|source| LedgerError::Lock {
            path: lock_path,
            source,
        })?;
        Ok(Self { _file: file })
    }
}

fn lock_path_for(ledger_path: &Path) -> PathBuf {
    let mut os = ledger_path.as_os_str().to_os_string();
    os.push(".lock");
    PathBuf::from(os)
}

/// Blocking exclusive lock. The critical section is a single read-check-write
/// of a small file, so waiting is preferable to failing the attempt.
fn flock_exclusive(file: &File) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        let fd = file.as_raw_fd();
        // SAFETY: flock is a standard POSIX call and fd is a valid
        // descriptor owned by `file`.
        let result = unsafe { libc::flock(fd, libc::LOCK_EX) };
        if result != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    #[cfg(not(unix))]
    {
        let _ = file;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn ledger_in(dir: &TempDir) -> PathBuf {
        dir.path().join("posting_history.json")
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let ledger = PostingLedger::load(&ledger_in(&dir));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_load_malformed_file_is_empty_not_fatal() {
        let dir = TempDir::new().unwrap();
        let path = ledger_in(&dir);
        fs::write(&path, "{not valid json").unwrap();
        let ledger = PostingLedger::load(&path);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_record_persists_and_reloads() {
        let dir = TempDir::new().unwrap();
        let path = ledger_in(&dir);
        let today = day("2025-06-01");

        let mut ledger = PostingLedger::load(&path);
        assert!(ledger.record("42", today).unwrap());

        let reloaded = PostingLedger::load(&path);
        assert_eq!(reloaded.len(), 1);
        assert!(reloaded.posted_today("42", today));
        assert_eq!(reloaded.count_today(today), 1);
    }

    #[test]
    fn test_record_rejects_same_day_duplicate() {
        let dir = TempDir::new().unwrap();
        let path = ledger_in(&dir);
        let today = day("2025-06-01");

        let mut ledger = PostingLedger::load(&path);
        assert!(ledger.record("7", today).unwrap());
        assert!(!ledger.record("7", today).unwrap());
        assert_eq!(ledger.count_today(today), 1);
    }

    #[test]
    fn test_record_sees_concurrent_write() {
        // Another invocation records between our load and our record: the
        // merge under the lock must catch it.
        let dir = TempDir::new().unwrap();
        let path = ledger_in(&dir);
        let today = day("2025-06-01");

        let mut ours = PostingLedger::load(&path);

        let mut theirs = PostingLedger::load(&path);
        assert!(theirs.record("9", today).unwrap());

        assert!(!ours.record("9", today).unwrap());
        assert_eq!(ours.count_today(today), 1);
    }

    #[test]
    fn test_prune_drops_stale_entries_and_rewrites() {
        let dir = TempDir::new().unwrap();
        let path = ledger_in(&dir);
        fs::write(
            &path,
            r#"{"1": "2025-05-31", "2": "2025-06-01", "3": "2025-04-01"}"#,
        )
        .unwrap();

        let mut ledger = PostingLedger::load(&path);
        assert_eq!(ledger.len(), 3);
        assert!(ledger.prune_to_today(day("2025-06-01")).unwrap());
        assert_eq!(ledger.len(), 1);
        assert!(ledger.posted_today("2", day("2025-06-01")));

        // file was rewritten
        let reloaded = PostingLedger::load(&path);
        assert_eq!(reloaded.len(), 1);
    }

    #[test]
    fn test_prune_preserves_concurrent_record() {
        // A loads a stale ledger; B prunes and records a fresh item; A's
        // later prune rewrite must keep B's record, or the item becomes
        // eligible for a same-day double post.
        let dir = TempDir::new().unwrap();
        let path = ledger_in(&dir);
        fs::write(&path, r#"{"X": "2025-05-31"}"#).unwrap();
        let today = day("2025-06-01");

        let mut ours = PostingLedger::load(&path);

        let mut theirs = PostingLedger::load(&path);
        assert!(theirs.prune_to_today(today).unwrap());
        assert!(theirs.record("Y", today).unwrap());

        assert!(ours.prune_to_today(today).unwrap());
        assert!(ours.posted_today("Y", today));

        let reloaded = PostingLedger::load(&path);
        assert!(reloaded.posted_today("Y", today));
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.count_today(today), 1);
    }

    #[test]
    fn test_prune_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = ledger_in(&dir);
        fs::write(&path, r#"{"1": "2025-05-31", "2": "2025-06-01"}"#).unwrap();
        let today = day("2025-06-01");

        let mut ledger = PostingLedger::load(&path);
        assert!(ledger.prune_to_today(today).unwrap());
        let after_first = ledger.entries.clone();
        assert!(!ledger.prune_to_today(today).unwrap());
        assert_eq!(ledger.entries, after_first);
    }

    #[test]
    fn test_record_allows_new_day_for_same_item() {
        let dir = TempDir::new().unwrap();
        let path = ledger_in(&dir);

        let mut ledger = PostingLedger::load(&path);
        assert!(ledger.record("5", day("2025-06-01")).unwrap());
        // next day the same item becomes postable again
        assert!(ledger.record("5", day("2025-06-02")).unwrap());
        assert_eq!(ledger.count_today(day("2025-06-02")), 1);
    }

    #[test]
    fn test_reset_clears_everything() {
        let dir = TempDir::new().unwrap();
        let path = ledger_in(&dir);
        let mut ledger = PostingLedger::load(&path);
        ledger.record("1", day("2025-06-01")).unwrap();
        ledger.record("2", day("2025-06-01")).unwrap();

        assert_eq!(ledger.reset().unwrap(), 2);
        assert!(PostingLedger::load(&path).is_empty());
    }
}
