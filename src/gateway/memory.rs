//! In-process drive.
//!
//! Holds folders, files and native spreadsheets in memory and counts every
//! call made against it, which makes cache and index behavior observable.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::{
    DriveGateway, FileListPage, FileMetadata, RemoteFile, SheetProperties, FOLDER_MIME_TYPE,
    SPREADSHEET_MIME_TYPE,
};
use crate::error::{Result, WarehouseError};

/// 2024-01-01T00:00:00Z; every mutation advances the drive clock by one second.
const CLOCK_EPOCH: i64 = 1_704_067_200;

#[derive(Debug, Clone)]
struct StoredEntry {
    file: RemoteFile,
    content: Bytes,
    sheets: Vec<(String, Vec<Vec<String>>)>,
}

#[derive(Debug, Clone, Copy, Default)]
struct CallCounters {
    list: usize,
    metadata: usize,
    download: usize,
    sheets: usize,
    values: usize,
}

#[derive(Debug, Default)]
struct DriveState {
    entries: Vec<StoredEntry>,
    clock: i64,
    counters: CallCounters,
    fail_metadata: bool,
    fail_listing: bool,
}

impl DriveState {
    fn tick(&mut self) -> Option<DateTime<Utc>> {
        self.clock += 1;
        DateTime::from_timestamp(CLOCK_EPOCH + self.clock, 0)
    }

    fn entry(&self, id: &str) -> Result<&StoredEntry> {
        self.entries
            .iter()
            .find(|e| e.file.id == id)
            .ok_or_else(|| WarehouseError::gateway(format!("File not found: {}", id)))
    }

    fn entry_mut(&mut self, id: &str) -> Result<&mut StoredEntry> {
        self.entries
            .iter_mut()
            .find(|e| e.file.id == id)
            .ok_or_else(|| WarehouseError::gateway(format!("File not found: {}", id)))
    }
}

/// [`DriveGateway`] backed by process memory.
#[derive(Debug)]
pub struct MemoryDrive {
    root_id: String,
    page_size: usize,
    state: Mutex<DriveState>,
}

impl MemoryDrive {
    /// Create an empty drive whose root folder has id `root_id`.
    pub fn new(root_id: impl Into<String>) -> Self {
        Self {
            root_id: root_id.into(),
            page_size: 100,
            state: Mutex::new(DriveState::default()),
        }
    }

    /// Limit how many entries a single listing page returns.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    pub fn add_folder(&self, id: &str, name: &str, parent: &str) {
        self.insert(id, name, parent, FOLDER_MIME_TYPE, Bytes::new(), Vec::new());
    }

    /// Add a regular file; its MIME type is derived from the extension.
    pub fn add_file(&self, id: &str, name: &str, parent: &str, content: impl AsRef<[u8]>) {
        let mime = mime_for_name(name);
        self.add_file_with_mime(id, name, parent, mime, content);
    }

    pub fn add_file_with_mime(
        &self,
        id: &str,
        name: &str,
        parent: &str,
        mime_type: &str,
        content: impl AsRef<[u8]>,
    ) {
        let content = Bytes::copy_from_slice(content.as_ref());
        self.insert(id, name, parent, mime_type, content, Vec::new());
    }

    /// Add a native spreadsheet made of `(title, rows)` sheets.
    pub fn add_spreadsheet(&self, id: &str, name: &str, parent: &str, sheets: Vec<(&str, Vec<Vec<&str>>)>) {
        let sheets = sheets
            .into_iter()
            .map(|(title, rows)| {
                let rows = rows
                    .into_iter()
                    .map(|row| row.into_iter().map(str::to_string).collect())
                    .collect();
                (title.to_string(), rows)
            })
            .collect();
        self.insert(id, name, parent, SPREADSHEET_MIME_TYPE, Bytes::new(), sheets);
    }

    /// Bump the modification time of a file without changing its content.
    pub fn touch(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock();
        let now = state.tick();
        state.entry_mut(id)?.file.modified_time = now;
        Ok(())
    }

    /// Replace the content of a file, bumping its modification time.
    pub fn replace_content(&self, id: &str, content: impl AsRef<[u8]>) -> Result<()> {
        let mut state = self.state.lock();
        let now = state.tick();
        let entry = state.entry_mut(id)?;
        entry.content = Bytes::copy_from_slice(content.as_ref());
        entry.file.modified_time = now;
        Ok(())
    }

    /// Remove an entry (folder children are left in place).
    pub fn remove(&self, id: &str) {
        self.state.lock().entries.retain(|e| e.file.id != id);
    }

    /// Make every metadata lookup fail until switched off again.
    pub fn set_fail_metadata(&self, fail: bool) {
        self.state.lock().fail_metadata = fail;
    }

    /// Make every listing call fail until switched off again.
    pub fn set_fail_listing(&self, fail: bool) {
        self.state.lock().fail_listing = fail;
    }

    pub fn list_count(&self) -> usize {
        self.state.lock().counters.list
    }

    pub fn metadata_count(&self) -> usize {
        self.state.lock().counters.metadata
    }

    pub fn download_count(&self) -> usize {
        self.state.lock().counters.download
    }

    /// Number of spreadsheet structure plus range reads.
    pub fn spreadsheet_read_count(&self) -> usize {
        let counters = self.state.lock().counters;
        counters.sheets + counters.values
    }

    pub fn reset_counters(&self) {
        self.state.lock().counters = CallCounters::default();
    }

    fn insert(
        &self,
        id: &str,
        name: &str,
        parent: &str,
        mime_type: &str,
        content: Bytes,
        sheets: Vec<(String, Vec<Vec<String>>)>,
    ) {
        let mut state = self.state.lock();
        let modified_time = state.tick();
        state.entries.retain(|e| e.file.id != id);
        state.entries.push(StoredEntry {
            file: RemoteFile {
                id: id.to_string(),
                name: name.to_string(),
                mime_type: mime_type.to_string(),
                modified_time,
                parents: vec![parent.to_string()],
            },
            content,
            sheets,
        });
    }
}

impl DriveGateway for MemoryDrive {
    fn list_children(&self, folder_id: &str, page_token: Option<&str>) -> Result<FileListPage> {
        let mut state = self.state.lock();
        state.counters.list += 1;
        if state.fail_listing {
            return Err(WarehouseError::gateway("listing unavailable"));
        }

        let offset = match page_token {
            Some(token) => token.parse::<usize>().map_err(|_| {
                WarehouseError::gateway(format!("Invalid page token: {}", token))
            })?,
            None => 0,
        };

        let children: Vec<RemoteFile> = state
            .entries
            .iter()
            .filter(|e| e.file.parents.iter().any(|p| p == folder_id))
            .map(|e| e.file.clone())
            .collect();

        let end = (offset + self.page_size).min(children.len());
        let files = children.get(offset..end).map(<[_]>::to_vec).unwrap_or_default();
        let next_page_token = (end < children.len()).then(|| end.to_string());

        Ok(FileListPage {
            files,
            next_page_token,
        })
    }

    fn file_metadata(&self, file_id: &str) -> Result<FileMetadata> {
        let mut state = self.state.lock();
        state.counters.metadata += 1;
        if state.fail_metadata {
            return Err(WarehouseError::gateway("metadata unavailable"));
        }
        let entry = state.entry(file_id)?;
        Ok(FileMetadata {
            id: entry.file.id.clone(),
            modified_time: entry.file.modified_time,
        })
    }

    fn download(&self, file_id: &str) -> Result<Bytes> {
        let mut state = self.state.lock();
        state.counters.download += 1;
        Ok(state.entry(file_id)?.content.clone())
    }

    fn spreadsheet_sheets(&self, spreadsheet_id: &str) -> Result<Vec<SheetProperties>> {
        let mut state = self.state.lock();
        state.counters.sheets += 1;
        Ok(state
            .entry(spreadsheet_id)?
            .sheets
            .iter()
            .map(|(title, _)| SheetProperties {
                title: title.clone(),
            })
            .collect())
    }

    fn spreadsheet_values(&self, spreadsheet_id: &str, range: &str) -> Result<Vec<Vec<String>>> {
        let mut state = self.state.lock();
        state.counters.values += 1;
        let title = range_sheet_title(range)
            .ok_or_else(|| WarehouseError::gateway(format!("Unable to parse range: {}", range)))?;
        state
            .entry(spreadsheet_id)?
            .sheets
            .iter()
            .find(|(t, _)| *t == title)
            .map(|(_, rows)| rows.clone())
            .ok_or_else(|| WarehouseError::gateway(format!("Unable to parse range: {}", range)))
    }
}

/// Sheet title of an A1 range such as `'My ''Sheet'''!A1:ZZ`.
fn range_sheet_title(range: &str) -> Option<String> {
    let (sheet, _) = range.rsplit_once('!')?;
    let title = match sheet.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        Some(quoted) => quoted.replace("''", "'"),
        None => sheet.to_string(),
    };
    Some(title)
}

fn mime_for_name(name: &str) -> &'static str {
    let ext = name.rsplit_once('.').map(|(_, e)| e.to_lowercase());
    match ext.as_deref() {
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        Some("geojson") => "application/geo+json",
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Some("xls") => "application/vnd.ms-excel",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination() {
        let drive = MemoryDrive::new("root").with_page_size(2);
        for i in 0..5 {
            drive.add_file(&format!("f{}", i), &format!("f{}.csv", i), "root", b"a");
        }

        let first = drive.list_children("root", None).unwrap();
        assert_eq!(first.files.len(), 2);
        assert_eq!(first.next_page_token.as_deref(), Some("2"));

        let last = drive.list_children("root", Some("4")).unwrap();
        assert_eq!(last.files.len(), 1);
        assert!(last.next_page_token.is_none());
    }

    #[test]
    fn test_touch_changes_modified_time() {
        let drive = MemoryDrive::new("root");
        drive.add_file("f", "f.csv", "root", b"a");
        let before = drive.file_metadata("f").unwrap().modified_time;
        drive.touch("f").unwrap();
        let after = drive.file_metadata("f").unwrap().modified_time;
        assert!(after > before);
        assert_eq!(drive.metadata_count(), 2);
    }

    #[test]
    fn test_failure_switches() {
        let drive = MemoryDrive::new("root");
        drive.add_file("f", "f.csv", "root", b"a");
        drive.set_fail_metadata(true);
        assert!(drive.file_metadata("f").is_err());
        drive.set_fail_listing(true);
        assert!(drive.list_children("root", None).is_err());
    }

    #[test]
    fn test_spreadsheet_values_by_quoted_title() {
        let drive = MemoryDrive::new("root");
        drive.add_spreadsheet(
            "s",
            "Budget",
            "root",
            vec![("Q1 'draft'", vec![vec!["a", "b"], vec!["1", "2"]])],
        );
        let rows = drive.spreadsheet_values("s", "'Q1 ''draft'''!A1:ZZ").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(drive.spreadsheet_read_count(), 1);
    }

    #[test]
    fn test_mime_for_name() {
        assert_eq!(mime_for_name("a.CSV"), "text/csv");
        assert_eq!(mime_for_name("noext"), "application/octet-stream");
    }
}
