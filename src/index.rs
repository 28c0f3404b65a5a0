//! Table index: logical table name to remote file.
//!
//! Built by walking the root folder recursively. Regular files need a
//! supported extension and are named without it; native spreadsheets keep
//! their display name. When two files reduce to the same name the one
//! enumerated last wins. Enumeration order follows the gateway's paging and
//! folder recursion, so which file wins is not guaranteed to be stable.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::error::Result;
use crate::format::FileKind;
use crate::gateway::{list_recursive, DriveGateway, RemoteFile};

/// Logical table name for `file`, or `None` when it is not a table source.
pub fn table_name(file: &RemoteFile) -> Option<String> {
    match FileKind::classify(file)? {
        FileKind::NativeSpreadsheet => Some(file.name.clone()),
        _ => file.name.rsplit_once('.').map(|(stem, _)| stem.to_string()),
    }
}

/// List the folder tree under `root_id` and name every table source.
pub fn build(gateway: &dyn DriveGateway, root_id: &str) -> Result<BTreeMap<String, RemoteFile>> {
    let mut tables = BTreeMap::new();
    for file in list_recursive(gateway, root_id)? {
        let Some(name) = table_name(&file) else {
            continue;
        };
        if let Some(previous) = tables.insert(name.clone(), file) {
            warn!(
                table = %name,
                replaced = %previous.name,
                "two files map to the same table name, keeping the later one"
            );
        }
    }
    Ok(tables)
}

#[derive(Debug)]
struct IndexSnapshot {
    tables: BTreeMap<String, RemoteFile>,
    built_at: Instant,
}

/// TTL-cached table index for one root folder.
#[derive(Debug)]
pub struct TableIndex {
    root_id: String,
    ttl: Duration,
    snapshot: Option<IndexSnapshot>,
}

impl TableIndex {
    pub fn new(root_id: impl Into<String>, ttl: Duration) -> Self {
        Self {
            root_id: root_id.into(),
            ttl,
            snapshot: None,
        }
    }

    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    /// Current mapping, rebuilt when forced, missing or older than the TTL.
    ///
    /// Listing failures propagate; no partial index is kept.
    pub fn tables(
        &mut self,
        gateway: &dyn DriveGateway,
        force_refresh: bool,
    ) -> Result<&BTreeMap<String, RemoteFile>> {
        let snapshot = match self.snapshot.take() {
            Some(snapshot) if !force_refresh && snapshot.built_at.elapsed() < self.ttl => snapshot,
            _ => {
                let tables = build(gateway, &self.root_id)?;
                info!(root = %self.root_id, tables = tables.len(), "table index built");
                IndexSnapshot {
                    tables,
                    built_at: Instant::now(),
                }
            }
        };
        Ok(&self.snapshot.insert(snapshot).tables)
    }

    /// Number of tables in the current snapshot (0 when none is held).
    pub fn len(&self) -> usize {
        self.snapshot.as_ref().map_or(0, |s| s.tables.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_fresh(&self) -> bool {
        self.snapshot
            .as_ref()
            .is_some_and(|s| s.built_at.elapsed() < self.ttl)
    }

    /// Forget the snapshot so the next access rebuilds it.
    pub fn clear(&mut self) {
        self.snapshot = None;
    }
}
