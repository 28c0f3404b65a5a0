//! Blocking REST client for the Drive v3 and Sheets v4 APIs.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use super::{DriveGateway, FileListPage, FileMetadata, RemoteFile, SheetProperties};
use crate::error::{Result, WarehouseError};

const DRIVE_FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const SHEETS_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const TIMEOUT_SECONDS: u64 = 60;
const PAGE_SIZE: &str = "100";
const LIST_FIELDS: &str = "nextPageToken, files(id, name, mimeType, modifiedTime, parents)";

/// OAuth bearer token used for every request.
#[derive(Clone)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Read a token from a JSON credentials file.
    ///
    /// The file must contain a ready bearer token in an `access_token` (or
    /// `token`) string field. Service-account key files carry no token and
    /// are rejected; mint a token from them first.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            WarehouseError::authentication(format!(
                "Unable to read credentials {}: {}",
                path.display(),
                e
            ))
        })?;
        let value: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
            WarehouseError::authentication(format!(
                "Credentials {} are not valid JSON: {}",
                path.display(),
                e
            ))
        })?;

        ["access_token", "token"]
            .iter()
            .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
            .filter(|token| !token.is_empty())
            .map(Self::new)
            .ok_or_else(|| {
                WarehouseError::authentication(format!(
                    "Credentials {} contain no access_token; a ready bearer token is required, \
                     service-account key files are not supported",
                    path.display()
                ))
            })
    }

    fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFileList {
    #[serde(default)]
    files: Vec<WireFile>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFile {
    id: String,
    name: String,
    mime_type: String,
    modified_time: Option<DateTime<Utc>>,
    #[serde(default)]
    parents: Vec<String>,
}

impl From<WireFile> for RemoteFile {
    fn from(wire: WireFile) -> Self {
        RemoteFile {
            id: wire.id,
            name: wire.name,
            mime_type: wire.mime_type,
            modified_time: wire.modified_time,
            parents: wire.parents,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMetadata {
    id: String,
    modified_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct WireSpreadsheet {
    #[serde(default)]
    sheets: Vec<WireSheet>,
}

#[derive(Debug, Deserialize)]
struct WireSheet {
    properties: WireSheetProperties,
}

#[derive(Debug, Deserialize)]
struct WireSheetProperties {
    title: String,
}

#[derive(Debug, Deserialize)]
struct WireValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

/// [`super::DriveGateway`] speaking to the Google REST endpoints.
#[derive(Debug)]
pub struct HttpDrive {
    client: Client,
    token: AccessToken,
    files_url: Url,
    sheets_url: Url,
}

impl HttpDrive {
    pub fn new(token: AccessToken) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECONDS))
            .build()
            .map_err(|e| WarehouseError::authentication(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            token,
            files_url: parse_url(DRIVE_FILES_URL)?,
            sheets_url: parse_url(SHEETS_URL)?,
        })
    }

    /// Build a client from a credentials file holding a bearer token.
    ///
    /// See [`AccessToken::from_file`] for the accepted file shape.
    pub fn from_credentials_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(AccessToken::from_file(path)?)
    }

    /// Point the client at different endpoints (e.g. a proxy).
    pub fn with_endpoints(mut self, files_url: &str, sheets_url: &str) -> Result<Self> {
        self.files_url = parse_url(files_url)?;
        self.sheets_url = parse_url(sheets_url)?;
        Ok(self)
    }

    fn file_url(&self, file_id: &str) -> Result<Url> {
        append_segments(&self.files_url, &[file_id])
    }

    fn send(&self, url: Url) -> Result<reqwest::blocking::Response> {
        let response = self
            .client
            .get(url.clone())
            .bearer_auth(self.token.secret())
            .send()
            .map_err(|e| WarehouseError::gateway(format!("Failed to send request to {}: {}", url, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(WarehouseError::gateway(format!(
                "HTTP {} from {}: {}",
                status, url, body
            )));
        }
        Ok(response)
    }

    fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let text = self.send(url.clone())?.text()?;
        serde_json::from_str(&text).map_err(|e| {
            WarehouseError::gateway(format!("Failed to parse response from {}: {}", url, e))
        })
    }
}

impl DriveGateway for HttpDrive {
    fn list_children(&self, folder_id: &str, page_token: Option<&str>) -> Result<FileListPage> {
        let mut url = self.files_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("q", &format!("'{}' in parents and trashed=false", folder_id))
                .append_pair("supportsAllDrives", "true")
                .append_pair("includeItemsFromAllDrives", "true")
                .append_pair("pageSize", PAGE_SIZE)
                .append_pair("fields", LIST_FIELDS);
            if let Some(token) = page_token {
                query.append_pair("pageToken", token);
            }
        }

        let list: WireFileList = self.get_json(url)?;
        Ok(FileListPage {
            files: list.files.into_iter().map(RemoteFile::from).collect(),
            next_page_token: list.next_page_token,
        })
    }

    fn file_metadata(&self, file_id: &str) -> Result<FileMetadata> {
        let mut url = self.file_url(file_id)?;
        url.query_pairs_mut()
            .append_pair("fields", "id,modifiedTime")
            .append_pair("supportsAllDrives", "true");

        let meta: WireMetadata = self.get_json(url)?;
        Ok(FileMetadata {
            id: meta.id,
            modified_time: meta.modified_time,
        })
    }

    fn download(&self, file_id: &str) -> Result<Bytes> {
        let mut url = self.file_url(file_id)?;
        url.query_pairs_mut()
            .append_pair("alt", "media")
            .append_pair("supportsAllDrives", "true");

        Ok(self.send(url)?.bytes()?)
    }

    fn spreadsheet_sheets(&self, spreadsheet_id: &str) -> Result<Vec<SheetProperties>> {
        let mut url = append_segments(&self.sheets_url, &[spreadsheet_id])?;
        url.query_pairs_mut()
            .append_pair("fields", "sheets.properties.title");

        let spreadsheet: WireSpreadsheet = self.get_json(url)?;
        Ok(spreadsheet
            .sheets
            .into_iter()
            .map(|s| SheetProperties {
                title: s.properties.title,
            })
            .collect())
    }

    fn spreadsheet_values(&self, spreadsheet_id: &str, range: &str) -> Result<Vec<Vec<String>>> {
        let url = append_segments(&self.sheets_url, &[spreadsheet_id, "values", range])?;
        let value_range: WireValueRange = self.get_json(url)?;

        Ok(value_range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }
}

fn cell_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| WarehouseError::configuration(format!("Invalid URL {}: {}", raw, e)))
}

fn append_segments(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| WarehouseError::configuration(format!("URL cannot be a base: {}", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
