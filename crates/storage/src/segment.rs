//! One attached store segment
//!
//! A segment is the unit of physical storage: one file holding every record
//! routed to its configuration. Loading tolerates a missing file (a fresh
//! store) but not a malformed one; persistence goes through a temp file and
//! rename so a crash mid-write never leaves a half-written segment behind.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use storeline_core::{Error, Record, RecordId, Result, StoreDescription};
use tracing::debug;

/// One physical store segment and its in-memory record map
#[derive(Debug)]
pub struct Segment {
    description: StoreDescription,
    records: BTreeMap<RecordId, Record>,
}

impl Segment {
    /// Load a segment from its description
    ///
    /// A missing file yields an empty segment. A file that exists but does
    /// not decode yields `Error::Corruption` — the caller decides whether
    /// the description's delete-on-error policy applies.
    pub fn load(description: StoreDescription) -> Result<Self> {
        let records = match fs::read(&description.path) {
            Ok(bytes) => {
                let list: Vec<Record> = serde_json::from_slice(&bytes).map_err(|e| {
                    Error::Corruption(format!(
                        "segment '{}' at {}: {}",
                        description.configuration,
                        description.path.display(),
                        e
                    ))
                })?;
                list.into_iter().map(|r| (r.id, r)).collect()
            }
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(Error::Io(e)),
        };
        debug!(
            target: "storeline::storage",
            configuration = %description.configuration,
            records = records.len(),
            "segment loaded"
        );
        Ok(Self {
            description,
            records,
        })
    }

    /// The description this segment was attached with
    pub fn description(&self) -> &StoreDescription {
        &self.description
    }

    /// True if commits must not be routed here
    pub fn is_read_only(&self) -> bool {
        self.description.read_only
    }

    /// Number of records held
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if the segment holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Look up one record
    pub fn get(&self, id: &RecordId) -> Option<&Record> {
        self.records.get(id)
    }

    /// True if the segment holds `id`
    pub fn contains(&self, id: &RecordId) -> bool {
        self.records.contains_key(id)
    }

    /// Iterate the records in identifier order
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    /// Insert or replace a record, returning the previous one if any
    pub fn put(&mut self, record: Record) -> Option<Record> {
        self.records.insert(record.id, record)
    }

    /// Remove a record, returning it if it was present
    pub fn remove(&mut self, id: &RecordId) -> Option<Record> {
        self.records.remove(id)
    }

    /// Write the segment to disk atomically (temp file + rename)
    pub fn persist(&self) -> Result<()> {
        if let Some(dir) = self.description.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let list: Vec<&Record> = self.records.values().collect();
        let bytes = serde_json::to_vec_pretty(&list)?;
        let tmp = self.description.path.with_extension("tmp");
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, &self.description.path)?;
        debug!(
            target: "storeline::storage",
            configuration = %self.description.configuration,
            records = list.len(),
            "segment persisted"
        );
        Ok(())
    }
}
