//! # Snapshot Persistence
//!
//! Lets a restarted node pick up where it left off: Pending records are
//! queued again, Submitted ones resume confirmation tracking, and archived
//! records keep answering token replays.
//!
//! Format: `[MAGIC 8][SAVED_AT u64 LE][JSON StoreSnapshot]`
//!
//! Writes go to a sibling temp file that is then renamed over the target,
//! so a crash mid-write leaves the previous snapshot intact.

use crate::domain::{StoreError, StoreSnapshot};
use shared_types::Timestamp;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Magic bytes (format version in the last byte).
const SNAPSHOT_MAGIC: &[u8; 8] = b"BBFPSNP\x01";

const HEADER_LEN: usize = SNAPSHOT_MAGIC.len() + 8;

#[derive(Clone, Debug)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn encode(snapshot: &StoreSnapshot, saved_at: Timestamp) -> Result<Vec<u8>, StoreError> {
        let body =
            serde_json::to_vec(snapshot).map_err(|e| StoreError::Snapshot(e.to_string()))?;
        let mut buf = Vec::with_capacity(HEADER_LEN + body.len());
        buf.extend_from_slice(SNAPSHOT_MAGIC);
        buf.extend_from_slice(&saved_at.to_le_bytes());
        buf.extend_from_slice(&body);
        Ok(buf)
    }

    pub fn decode(data: &[u8]) -> Result<(Timestamp, StoreSnapshot), StoreError> {
        if data.len() < HEADER_LEN {
            return Err(StoreError::Snapshot("truncated header".into()));
        }
        let (magic, rest) = data.split_at(SNAPSHOT_MAGIC.len());
        if magic != SNAPSHOT_MAGIC {
            return Err(StoreError::Snapshot("invalid magic".into()));
        }
        let (saved_at_bytes, body) = rest.split_at(8);
        let mut saved_at = [0u8; 8];
        saved_at.copy_from_slice(saved_at_bytes);
        let snapshot =
            serde_json::from_slice(body).map_err(|e| StoreError::Snapshot(e.to_string()))?;
        Ok((u64::from_le_bytes(saved_at), snapshot))
    }

    /// Atomically replaces the snapshot on disk.
    pub fn save(&self, snapshot: &StoreSnapshot, saved_at: Timestamp) -> Result<(), StoreError> {
        let bytes = Self::encode(snapshot, saved_at)?;
        let tmp = self.path.with_extension("tmp");
        let write = || -> io::Result<()> {
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            fs::rename(&tmp, &self.path)
        };
        write().map_err(|e| StoreError::Snapshot(format!("{}: {e}", self.path.display())))?;
        info!(
            path = %self.path.display(),
            records = snapshot.records.len(),
            "Snapshot written"
        );
        Ok(())
    }

    /// Reads the snapshot, or `None` if none was written yet.
    pub fn load(&self) -> Result<Option<(Timestamp, StoreSnapshot)>, StoreError> {
        match fs::read(&self.path) {
            Ok(data) => Self::decode(&data).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Snapshot(format!(
                "{}: {e}",
                self.path.display()
            ))),
        }
    }
}
