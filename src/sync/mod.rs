//! Push-based synchronization of selected tables from the local (source)
//! store into the mirror (destination) store.
//!
//! Tables listed in [`policy::SELECTIVE_MERGE_TABLES`] are merged row by row
//! and never overwrite mirror rows flagged `is_locally_edited`; every other
//! table is replaced wholesale. A session walks the selected tables in order
//! and reports progress through an [`events::EventSink`].

pub mod error;
pub mod events;
pub mod executor;
pub mod policy;
pub mod schema;
pub mod session;
pub mod table;

pub use error::SyncError;
pub use events::{EventSink, SseWriter, SyncEvent};
pub use session::run_session;

use serde::{Deserialize, Serialize};

pub const ADMIN_LEVEL: &str = "Admin";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDescriptor {
    pub schema_name: String,
    pub table_name: String,
}

impl TableDescriptor {
    pub fn new(schema_name: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            schema_name: schema_name.into(),
            table_name: table_name.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaSelection {
    pub schema_name: String,
    #[serde(default)]
    pub selected_tables: Vec<String>,
}

/// Body of a sync trigger.
///
/// `level` is the caller's own role claim; it is not checked against any
/// server-side session.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub schemas: Vec<SchemaSelection>,
}

impl SyncRequest {
    pub fn authorize(&self) -> Result<(), SyncError> {
        if self.level == ADMIN_LEVEL {
            Ok(())
        } else {
            Err(SyncError::Unauthorized)
        }
    }

    /// Selected tables flattened in request order.
    pub fn tables(&self) -> Vec<TableDescriptor> {
        self.schemas
            .iter()
            .flat_map(|s| {
                s.selected_tables
                    .iter()
                    .filter(|t| !t.trim().is_empty())
                    .map(move |t| TableDescriptor::new(s.schema_name.clone(), t.trim()))
            })
            .collect()
    }
}
