//! Audit trail of vault decisions.
//!
//! The vault appends one [`AuditRecord`] per operation, allowed or not, and
//! never removes or rewrites one. Extra destinations plug in through
//! [`AuditSink`].

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ObjectId;
use crate::principal::PrincipalId;

/// Receives a copy of every record the vault appends.
pub trait AuditSink: Send {
    fn append(&mut self, record: AuditRecord);
}

/// The vault operation a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Store,
    Retrieve,
    RetrieveRaw,
    Describe,
    Share,
    Revoke,
    ListRecipients,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Allowed,
    /// Rejected by an authorization or registration check.
    Denied,
    /// Failed for any other reason (integrity, storage, validation).
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub action: AuditAction,
    /// Absent only for a `Store` that failed before an id was assigned.
    pub object_id: Option<ObjectId>,
    /// The calling principal.
    pub actor: PrincipalId,
    /// The grant recipient, for share and revoke.
    pub subject: Option<PrincipalId>,
    pub outcome: AuditOutcome,
    pub timestamp: DateTime<Utc>,
}

/// In-memory record list plus any attached sinks.
#[derive(Default)]
pub struct AuditLog {
    records: Vec<AuditRecord>,
    sinks: Vec<Box<dyn AuditSink>>,
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("records", &self.records.len())
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a sink. Records appended before this call are not replayed.
    pub fn attach(&mut self, sink: Box<dyn AuditSink>) {
        self.sinks.push(sink);
    }

    pub fn append(&mut self, record: AuditRecord) {
        for sink in &mut self.sinks {
            sink.append(record.clone());
        }
        self.records.push(record);
    }

    pub fn records(&self) -> &[AuditRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Appends records to a file as JSON lines, flushing after each one.
pub struct FileAuditSink {
    writer: BufWriter<File>,
}

impl FileAuditSink {
    /// Open `path` for appending, creating it if needed.
    pub fn new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    fn write_line(&mut self, record: &AuditRecord) -> std::io::Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }
}

impl AuditSink for FileAuditSink {
    fn append(&mut self, record: AuditRecord) {
        // Sinks cannot fail the operation being audited.
        if let Err(e) = self.write_line(&record) {
            tracing::warn!(error = %e, action = ?record.action, "failed to write audit record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(action: AuditAction) -> AuditRecord {
        AuditRecord {
            action,
            object_id: Some(ObjectId::new()),
            actor: PrincipalId::parse("alice").unwrap(),
            subject: None,
            outcome: AuditOutcome::Allowed,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_file_sink_writes_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        let mut log = AuditLog::new();
        log.attach(Box::new(FileAuditSink::new(&path).unwrap()));
        log.append(record(AuditAction::Store));
        log.append(record(AuditAction::Share));

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<AuditRecord> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines, log.records());
        assert!(contents.starts_with("{\"action\":\"store\""));
    }

    #[test]
    fn test_reopened_file_sink_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        for action in [AuditAction::Store, AuditAction::Delete] {
            let mut sink = FileAuditSink::new(&path).unwrap();
            sink.append(record(action));
        }
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.contains("\"action\":\"delete\""));
    }

    #[test]
    fn test_late_sink_sees_only_new_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.jsonl");

        let mut log = AuditLog::new();
        log.append(record(AuditAction::Retrieve));
        log.attach(Box::new(FileAuditSink::new(&path).unwrap()));
        log.append(record(AuditAction::Revoke));

        assert_eq!(log.len(), 2);
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 1);
    }
}
