use std::path::Path;

use tracing::error;

use crate::error::AppResult;
use crate::storage::{Document, DocumentStore};
use crate::types::AuditRecord;

impl Document for AuditRecord {
    type Id = String;
    const KIND: &'static str = "audit_record";
    fn id(&self) -> String { self.id.clone() }
}

/// Append-only trail of successful mutations.
pub struct AuditTrail {
    store: DocumentStore<AuditRecord>,
}

impl AuditTrail {
    /// Opens the trail, creating an empty document when absent.
    pub fn open(path: &Path) -> AppResult<Self> {
        let store = DocumentStore::new(path);
        store.ensure_exists()?;
        Ok(Self { store })
    }

    pub fn all(&self) -> AppResult<Vec<AuditRecord>> { self.store.list() }

    /// Append one record. A failed append is logged, never surfaced:
    /// the mutation it describes has already been committed.
    pub fn append(&self, record: AuditRecord) {
        let action = record.action.clone();
        let subject = record.user_id.clone();
        if let Err(e) = self.store.mutate(|items| {
            items.push(record);
            Ok(())
        }) {
            error!(target: "audit", action = %action, subject = %subject, "audit append failed: {}", e);
        }
    }
}
