//! Global identifier space spanning both snapshots
//!
//! Global ids are dense, start at 1 and are handed out in scan order. Every
//! snapshot-0 request receives its id before any snapshot-1 request, so the
//! snapshot of a global id can be derived from its position alone.

use std::collections::HashMap;
use std::io::Write;
use std::ops::RangeInclusive;
use std::path::Path;

use crate::error::{DiagnosisError, Result};
use crate::store::artifacts::{parse_field, read_fields, write_atomically};
use crate::store::{GlobalId, LocalId, Snapshot};

/// Bidirectional GlobalId <-> (LocalId, Snapshot) mapping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityIndex {
    /// entries[global_id - 1]
    entries: Vec<(LocalId, Snapshot)>,
    reverse: HashMap<(Snapshot, LocalId), GlobalId>,
    totals: [usize; 2],
}

impl IdentityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign the next global id to `(snapshot, local_id)`
    ///
    /// Fails if a snapshot-0 request arrives after a snapshot-1 request or
    /// the local id was already assigned in this snapshot.
    pub fn assign(&mut self, snapshot: Snapshot, local_id: LocalId) -> Result<GlobalId> {
        if let Some((_, last)) = self.entries.last() {
            if *last > snapshot {
                return Err(DiagnosisError::IdentityViolation(format!(
                    "snapshot {} request {} arrived after snapshot {} requests",
                    snapshot, local_id, last
                )));
            }
        }
        if self.reverse.contains_key(&(snapshot, local_id)) {
            return Err(DiagnosisError::IdentityViolation(format!(
                "duplicate local id {} in snapshot {}",
                local_id, snapshot
            )));
        }

        self.entries.push((local_id, snapshot));
        let global_id = self.entries.len() as GlobalId;
        self.reverse.insert((snapshot, local_id), global_id);
        self.totals[snapshot.index()] += 1;
        Ok(global_id)
    }

    /// Resolve a global id to its local id and snapshot
    pub fn resolve(&self, global_id: GlobalId) -> Result<(LocalId, Snapshot)> {
        global_id
            .checked_sub(1)
            .and_then(|idx| self.entries.get(idx as usize))
            .copied()
            .ok_or(DiagnosisError::UnknownGlobalId(global_id))
    }

    /// Snapshot a global id belongs to
    pub fn snapshot_of(&self, global_id: GlobalId) -> Result<Snapshot> {
        self.resolve(global_id).map(|(_, snapshot)| snapshot)
    }

    /// Global id of a local request, if indexed
    pub fn global_id(&self, snapshot: Snapshot, local_id: LocalId) -> Option<GlobalId> {
        self.reverse.get(&(snapshot, local_id)).copied()
    }

    /// Number of global ids
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of requests captured in one snapshot
    pub fn snapshot_total(&self, snapshot: Snapshot) -> usize {
        self.totals[snapshot.index()]
    }

    /// Contiguous global id range of one snapshot (empty range if none)
    pub fn snapshot_range(&self, snapshot: Snapshot) -> RangeInclusive<GlobalId> {
        let before: usize = Snapshot::ALL
            .iter()
            .take_while(|s| **s < snapshot)
            .map(|s| self.totals[s.index()])
            .sum();
        let start = before as GlobalId + 1;
        let end = (before + self.totals[snapshot.index()]) as GlobalId;
        start..=end
    }

    /// Iterate `(global_id, local_id, snapshot)` in ascending global id order
    pub fn iter(&self) -> impl Iterator<Item = (GlobalId, LocalId, Snapshot)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .map(|(idx, (local, snapshot))| (idx as GlobalId + 1, *local, *snapshot))
    }

    /// Write the `<global_id> <local_id> <snapshot>` artifact
    pub fn write(&self, path: &Path) -> Result<()> {
        write_atomically(path, |w| {
            for (global, local, snapshot) in self.iter() {
                writeln!(w, "{} {} {}", global, local, snapshot)?;
            }
            Ok(())
        })
    }

    /// Load and validate the identity artifact
    ///
    /// The file must list global ids 1..N densely, in order, with every
    /// snapshot-0 entry before any snapshot-1 entry.
    pub fn load(path: &Path) -> Result<Self> {
        let mut index = Self::new();
        for (line, fields) in read_fields(path)? {
            if fields.is_empty() {
                continue;
            }
            let global: GlobalId = parse_field(path, line, fields.first(), "global id")?;
            let local: LocalId = parse_field(path, line, fields.get(1), "local id")?;
            let raw_snapshot: usize = parse_field(path, line, fields.get(2), "snapshot")?;
            let snapshot = Snapshot::from_index(raw_snapshot).ok_or_else(|| {
                DiagnosisError::invalid_artifact(path, line, format!("snapshot {} out of range", raw_snapshot))
            })?;

            let assigned = index
                .assign(snapshot, local)
                .map_err(|e| DiagnosisError::invalid_artifact(path, line, e.to_string()))?;
            if assigned != global {
                return Err(DiagnosisError::invalid_artifact(
                    path,
                    line,
                    format!("global id {} is not dense (expected {})", global, assigned),
                ));
            }
        }
        Ok(index)
    }
}
