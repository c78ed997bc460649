//! JSONL journal for the population store
//!
//! Provides append-only durable storage of store mutations with:
//! - One JSON event per line, tagged by event type
//! - Batched appends so a settlement lands as one write
//! - Rollback of a failed append, so a retried batch is never recorded twice
//! - Replay on open to rebuild in-memory state

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use arena_common::{AgentState, Blueprint, LedgerEntry, StoreError};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

/// Event types stored in the journal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum JournalEvent {
    BlueprintCreated(Blueprint),
    AgentCreated(AgentState),
    LedgerAppended(LedgerEntry),
    AttemptRecorded {
        agent_id: Uuid,
        won: bool,
        elapsed_secs: u64,
        at: DateTime<Utc>,
    },
    AgentCulled {
        agent_id: Uuid,
        at: DateTime<Utc>,
    },
}

impl JournalEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            JournalEvent::BlueprintCreated(_) => "BlueprintCreated",
            JournalEvent::AgentCreated(_) => "AgentCreated",
            JournalEvent::LedgerAppended(_) => "LedgerAppended",
            JournalEvent::AttemptRecorded { .. } => "AttemptRecorded",
            JournalEvent::AgentCulled { .. } => "AgentCulled",
        }
    }
}

/// File operations the journal relies on
pub(crate) trait JournalFile: Write + Send {
    /// Current length in bytes
    fn size(&self) -> io::Result<u64>;

    /// Cut the file back to `len` bytes
    fn truncate(&mut self, len: u64) -> io::Result<()>;

    /// Flush written data to stable storage
    fn sync(&mut self) -> io::Result<()>;
}

impl JournalFile for File {
    fn size(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

struct JournalWriter {
    file: Box<dyn JournalFile>,
    /// Set when a failed append could not be rolled back
    poisoned: bool,
}

impl JournalWriter {
    fn write_batch(&mut self, buf: &[u8]) -> io::Result<()> {
        self.file.write_all(buf)?;
        self.file.flush()?;
        self.file.sync()
    }
}

/// Append-only journal file
pub struct Journal {
    path: PathBuf,
    writer: Mutex<JournalWriter>,
}

impl Journal {
    /// Open (or create) a journal, returning the events already recorded
    #[instrument(skip(path))]
    pub fn open(path: impl AsRef<Path>) -> Result<(Self, Vec<JournalEvent>), StoreError> {
        let path = path.as_ref().to_path_buf();
        let events = if path.exists() {
            Self::read_events(&path)?
        } else {
            Vec::new()
        };

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!(path = %path.display(), events = events.len(), "Opened journal");

        Ok((Self::with_file(path, Box::new(file)), events))
    }

    pub(crate) fn with_file(path: PathBuf, file: Box<dyn JournalFile>) -> Self {
        Self {
            path,
            writer: Mutex::new(JournalWriter {
                file,
                poisoned: false,
            }),
        }
    }

    fn read_events(path: &Path) -> Result<Vec<JournalEvent>, StoreError> {
        let reader = BufReader::new(File::open(path)?);
        let mut events = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let event = serde_json::from_str(&line).map_err(|e| StoreError::Corrupt {
                line: idx + 1,
                reason: e.to_string(),
            })?;
            events.push(event);
        }
        Ok(events)
    }

    /// Append a batch of events and sync it to disk.
    ///
    /// Either the whole batch is recorded or none of it is. If a failed
    /// write cannot be rolled back, every later append is refused.
    pub fn append(&self, events: &[JournalEvent]) -> Result<(), StoreError> {
        let mut buf = Vec::with_capacity(events.len() * 256);
        for event in events {
            serde_json::to_writer(&mut buf, event)
                .map_err(|e| StoreError::Journal(e.to_string()))?;
            buf.push(b'\n');
        }

        let mut writer = self.writer.lock();
        if writer.poisoned {
            return Err(StoreError::Journal(format!(
                "{} has a partial write and is read-only",
                self.path.display()
            )));
        }

        let start = writer.file.size()?;
        if let Err(e) = writer.write_batch(&buf) {
            if let Err(rollback) = writer.file.truncate(start) {
                writer.poisoned = true;
                error!(
                    path = %self.path.display(),
                    error = %rollback,
                    "Journal rollback failed, refusing further writes"
                );
            }
            return Err(e.into());
        }

        debug!(count = events.len(), "Journal events appended");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    /// In-memory journal file with switchable write and truncate failures
    #[derive(Clone, Default)]
    pub(crate) struct FaultyFile {
        pub bytes: Arc<Mutex<Vec<u8>>>,
        /// Remaining writes that fail after storing half their input
        pub failing_writes: Arc<AtomicUsize>,
        pub failing_truncate: Arc<AtomicBool>,
    }

    impl FaultyFile {
        pub fn fail_next_writes(&self, n: usize) {
            self.failing_writes.store(n, Ordering::SeqCst);
        }

        pub fn contents(&self) -> String {
            String::from_utf8(self.bytes.lock().clone()).unwrap()
        }

        pub fn journal(&self) -> Journal {
            Journal::with_file(PathBuf::from("faulty.jsonl"), Box::new(self.clone()))
        }
    }

    impl Write for FaultyFile {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let failing = self
                .failing_writes
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                self.bytes.lock().extend_from_slice(&buf[..buf.len() / 2]);
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            self.bytes.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl JournalFile for FaultyFile {
        fn size(&self) -> io::Result<u64> {
            Ok(self.bytes.lock().len() as u64)
        }

        fn truncate(&mut self, len: u64) -> io::Result<()> {
            if self.failing_truncate.load(Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::Other, "read-only"));
            }
            self.bytes.lock().truncate(len as usize);
            Ok(())
        }

        fn sync(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FaultyFile;
    use super::*;
    use arena_common::{LedgerReason, ReproductionPolicy, Traits};
    use std::sync::atomic::Ordering;

    #[test]
    fn test_event_tagging() {
        let event = JournalEvent::AgentCulled {
            agent_id: Uuid::nil(),
            at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "AgentCulled");
        assert_eq!(event.event_type(), "AgentCulled");
    }

    #[test]
    fn test_append_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arena.jsonl");

        let blueprint = Blueprint::new(Traits::default(), ReproductionPolicy::default());
        let agent = AgentState::new(blueprint.id, 10, 0.5);
        let entry = LedgerEntry::new(agent.id, None, -5, LedgerReason::ReproductionCost);

        {
            let (journal, existing) = Journal::open(&path).unwrap();
            assert!(existing.is_empty());
            journal
                .append(&[
                    JournalEvent::BlueprintCreated(blueprint.clone()),
                    JournalEvent::AgentCreated(agent.clone()),
                ])
                .unwrap();
            journal.append(&[JournalEvent::LedgerAppended(entry.clone())]).unwrap();
        }

        let (_journal, events) = Journal::open(&path).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], JournalEvent::BlueprintCreated(blueprint));
        assert_eq!(events[2], JournalEvent::LedgerAppended(entry));
    }

    #[test]
    fn test_corrupt_line_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.jsonl");
        std::fs::write(&path, "{\"type\":\"Nope\"}\n").unwrap();

        let result = Journal::open(&path);
        assert!(matches!(result, Err(StoreError::Corrupt { line: 1, .. })));
    }

    fn culled(n: u128) -> JournalEvent {
        JournalEvent::AgentCulled {
            agent_id: Uuid::from_u128(n),
            at: Utc::now(),
        }
    }

    #[test]
    fn test_failed_append_is_rolled_back() {
        let file = FaultyFile::default();
        let journal = file.journal();
        journal.append(&[culled(1)]).unwrap();
        let before = file.contents();

        file.fail_next_writes(1);
        assert!(matches!(
            journal.append(&[culled(2), culled(3)]),
            Err(StoreError::Journal(_))
        ));
        assert_eq!(file.contents(), before);

        // The retry lands exactly once
        journal.append(&[culled(2), culled(3)]).unwrap();
        let lines: Vec<JournalEvent> = file
            .contents()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines
                .iter()
                .filter(|e| matches!(e, JournalEvent::AgentCulled { agent_id, .. } if *agent_id == Uuid::from_u128(2)))
                .count(),
            1
        );
    }

    #[test]
    fn test_failed_rollback_refuses_writes() {
        let file = FaultyFile::default();
        let journal = file.journal();
        file.failing_truncate.store(true, Ordering::SeqCst);
        file.fail_next_writes(1);

        assert!(journal.append(&[culled(1)]).is_err());
        let torn = file.contents();
        assert!(!torn.is_empty());

        assert!(journal.append(&[culled(2)]).is_err());
        assert_eq!(file.contents(), torn);
    }
}
