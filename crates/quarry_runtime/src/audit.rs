//! Audit trail of a pipeline run.
//!
//! An ordered list of timestamped messages, one per significant step. Each
//! entry is also emitted as a `tracing` event.

use quarry_core::{CoreResult, Timestamp};
use quarry_table::{Field, FieldType, Schema, Table, TableStore, Value};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// One audit message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// When the message was recorded
    pub timestamp: Timestamp,
    /// Message text
    pub message: String,
}

/// Ordered audit messages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditTrail {
    entries: Vec<AuditEntry>,
}

impl AuditTrail {
    /// Create an empty trail
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message stamped with the current time
    pub fn record(&mut self, message: impl Into<String>) {
        self.record_at(Timestamp::now(), message);
    }

    /// Append a message with an explicit timestamp
    pub fn record_at(&mut self, timestamp: Timestamp, message: impl Into<String>) {
        let message = message.into();
        info!(%timestamp, "{}", message);
        self.entries.push(AuditEntry { timestamp, message });
    }

    /// All entries in order
    #[must_use]
    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    /// Messages in order
    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.message.as_str())
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the trail is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// The trail as a `timestamp,message` table
    ///
    /// # Errors
    ///
    /// Never fails for a well-formed trail; the result type follows
    /// [`Table::new`]
    pub fn to_table(&self) -> CoreResult<Table> {
        let schema = Schema::new(vec![
            Field::new("timestamp", FieldType::String),
            Field::new("message", FieldType::String),
        ]);
        let rows = self
            .entries
            .iter()
            .map(|e| vec![Value::from(e.timestamp.to_string()), Value::from(e.message.as_str())])
            .collect();
        Table::new(schema, rows)
    }

    /// Write the trail through a store. An empty trail writes nothing.
    ///
    /// # Errors
    ///
    /// Returns `Write` if the store cannot write `path`
    pub fn write(&self, store: &dyn TableStore, path: &Path) -> CoreResult<bool> {
        if self.is_empty() {
            return Ok(false);
        }
        store.write(&self.to_table()?, path)?;
        Ok(true)
    }
}
