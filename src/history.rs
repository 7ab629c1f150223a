//! history.rs: the persisted collection of past course summaries.
//!
//! Readers take a cheap `Arc` snapshot; writers build a new collection, persist it
//! to a temp file, rename it over the old one, then swap the in-memory `Arc`. A
//! concurrent prediction therefore sees either the old or the new cache, never a
//! partial one. Writers are serialized from snapshot to swap, so disk and memory
//! always hold the same collection.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use anyhow::{Context, Result};

use crate::lms::types::CourseSummary;

pub const DEFAULT_CACHE_PATH: &str = "cache/course_summaries.json";

pub type Snapshot = Arc<Vec<CourseSummary>>;

#[derive(Debug)]
pub struct HistoryStore {
    path: Option<PathBuf>,
    inner: RwLock<Option<Snapshot>>,
    writer: Mutex<()>,
}

impl HistoryStore {
    /// Open the store backed by `path`. A missing file means "no cache yet".
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let loaded = match fs::read(&path) {
            Ok(bytes) => {
                let rows: Vec<CourseSummary> = serde_json::from_slice(&bytes)
                    .with_context(|| format!("parsing course cache {}", path.display()))?;
                Some(Arc::new(rows))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                return Err(e).with_context(|| format!("reading course cache {}", path.display()))
            }
        };
        Ok(Self {
            path: Some(path),
            inner: RwLock::new(loaded),
            writer: Mutex::new(()),
        })
    }

    /// Memory-only store (tests, demos).
    pub fn in_memory(rows: Option<Vec<CourseSummary>>) -> Self {
        Self {
            path: None,
            inner: RwLock::new(rows.map(Arc::new)),
            writer: Mutex::new(()),
        }
    }

    /// `None` when no refresh has ever completed.
    pub fn snapshot(&self) -> Option<Snapshot> {
        match self.inner.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    /// Replace the whole collection.
    pub fn replace(&self, rows: Vec<CourseSummary>) -> Result<Snapshot> {
        let _w = self.lock_writer();
        self.commit(rows)
    }

    /// Insert or replace the row for `summary.course_id`.
    pub fn upsert(&self, summary: CourseSummary) -> Result<Snapshot> {
        let _w = self.lock_writer();
        let mut rows: Vec<CourseSummary> = self
            .snapshot()
            .map(|s| s.as_ref().clone())
            .unwrap_or_default();
        match rows.iter_mut().find(|r| r.course_id == summary.course_id) {
            Some(slot) => *slot = summary,
            None => rows.push(summary),
        }
        self.commit(rows)
    }

    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        match self.writer.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        }
    }

    // Caller holds the writer lock.
    fn commit(&self, rows: Vec<CourseSummary>) -> Result<Snapshot> {
        let snap = Arc::new(rows);
        if let Some(path) = &self.path {
            persist_atomically(path, &snap)?;
        }
        let mut g = match self.inner.write() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        };
        *g = Some(snap.clone());
        Ok(snap)
    }
}

fn persist_atomically(path: &Path, rows: &[CourseSummary]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    static SEQ: AtomicU64 = AtomicU64::new(0);
    let tmp = path.with_extension(format!(
        "json.{}.{}.tmp",
        std::process::id(),
        SEQ.fetch_add(1, Ordering::Relaxed)
    ));
    let json = serde_json::to_vec_pretty(rows).context("serializing course cache")?;
    let mut f = fs::File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
    f.write_all(&json)?;
    f.sync_all()?;
    fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}
