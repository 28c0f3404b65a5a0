//! Remote drive abstraction.
//!
//! The warehouse never talks to the network directly. Everything it needs
//! from the remote store goes through the [`DriveGateway`] capability trait:
//!
//! - [`DriveGateway`] for listing, metadata, downloads and spreadsheet reads
//! - [`RemoteFile`] / [`FileMetadata`] describing remote entries
//! - [`list_recursive`] for walking a folder tree across pages
//! - [`MemoryDrive`] for an in-process store
//! - [`HttpDrive`] for the Drive v3 / Sheets v4 REST endpoints

mod http;
mod memory;

pub use http::{AccessToken, HttpDrive};
pub use memory::MemoryDrive;

use std::fmt;

use chrono::{DateTime, Utc};

use crate::error::Result;

/// MIME type of a folder.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
/// MIME type of a native online spreadsheet.
pub const SPREADSHEET_MIME_TYPE: &str = "application/vnd.google-apps.spreadsheet";

// ---------------------------------------------------------------------------
// Remote entries
// ---------------------------------------------------------------------------

/// Snapshot of a remote entry as returned by a folder listing.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFile {
    /// Unique id
    pub id: String,
    /// Display name, including any extension
    pub name: String,
    /// Declared MIME type
    pub mime_type: String,
    /// Last modification time (if reported)
    pub modified_time: Option<DateTime<Utc>>,
    /// Ids of the parent folders
    pub parents: Vec<String>,
}

impl RemoteFile {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }

    pub fn is_native_spreadsheet(&self) -> bool {
        self.mime_type == SPREADSHEET_MIME_TYPE
    }

    /// Lowercased text after the final `.` of the name.
    pub fn extension(&self) -> Option<String> {
        self.name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
    }
}

/// One page of a folder listing.
#[derive(Debug, Clone, Default)]
pub struct FileListPage {
    pub files: Vec<RemoteFile>,
    /// Continuation token; `None` on the last page
    pub next_page_token: Option<String>,
}

/// Minimal per-file metadata used for fingerprinting.
#[derive(Debug, Clone, PartialEq)]
pub struct FileMetadata {
    pub id: String,
    pub modified_time: Option<DateTime<Utc>>,
}

/// A sheet within a native spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetProperties {
    pub title: String,
}

// ---------------------------------------------------------------------------
// DriveGateway trait
// ---------------------------------------------------------------------------

/// Capabilities the warehouse requires from a remote drive.
///
/// Every call blocks until the remote answers.
pub trait DriveGateway: Send + Sync + fmt::Debug {
    /// List the direct children of a folder, one page at a time.
    fn list_children(&self, folder_id: &str, page_token: Option<&str>) -> Result<FileListPage>;

    /// Fetch the id and modification time of a file.
    fn file_metadata(&self, file_id: &str) -> Result<FileMetadata>;

    /// Download the full content of a file.
    fn download(&self, file_id: &str) -> Result<bytes::Bytes>;

    /// Ordered list of sheets in a native spreadsheet.
    fn spreadsheet_sheets(&self, spreadsheet_id: &str) -> Result<Vec<SheetProperties>>;

    /// Cell values of a range (A1 notation), one `Vec` per row.
    fn spreadsheet_values(&self, spreadsheet_id: &str, range: &str) -> Result<Vec<Vec<String>>>;
}

/// Recursively list every non-folder entry below `folder_id`.
///
/// Pages are followed until exhausted; folders are descended into as they
/// are encountered and never returned themselves.
pub fn list_recursive(gateway: &dyn DriveGateway, folder_id: &str) -> Result<Vec<RemoteFile>> {
    let mut files = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let page = gateway.list_children(folder_id, page_token.as_deref())?;

        for file in page.files {
            if file.is_folder() {
                files.extend(list_recursive(gateway, &file.id)?);
            } else {
                files.push(file);
            }
        }

        match page.next_page_token {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    Ok(files)
}
