//! Warehouse configuration.
//!
//! Values may be given explicitly or picked up from environment variables.
//! Explicit values always win; anything still missing after consulting the
//! environment is a [`WarehouseError::Configuration`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, WarehouseError};

/// Environment variable holding the root folder id.
pub const ENV_FOLDER_ID: &str = "GDRIVE_FOLDER_ID";
/// Environment variable holding the credentials file path.
pub const ENV_CREDENTIALS_PATH: &str = "GDRIVE_CREDENTIALS_PATH";
/// Environment variable holding the cache TTL in minutes.
pub const ENV_CACHE_TTL_MINUTES: &str = "GDRIVE_CACHE_TTL_MINUTES";
/// Environment variable holding the default sheet (name or index).
pub const ENV_SHEET: &str = "GDRIVE_SHEET";

const DEFAULT_TTL_MINUTES: u64 = 30;

/// Which sheet of a multi-sheet workbook or spreadsheet to read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SheetSelector {
    /// Zero-based sheet position
    Index(usize),
    /// Exact sheet title
    Name(String),
}

impl Default for SheetSelector {
    fn default() -> Self {
        SheetSelector::Index(0)
    }
}

impl fmt::Display for SheetSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SheetSelector::Index(i) => write!(f, "{}", i),
            SheetSelector::Name(name) => write!(f, "{}", name),
        }
    }
}

impl FromStr for SheetSelector {
    type Err = WarehouseError;

    /// All-digit strings select by position, anything else by title.
    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(WarehouseError::invalid_argument("Empty sheet selector"));
        }
        if s.chars().all(|c| c.is_ascii_digit()) {
            let index = s.parse::<usize>().map_err(|e| {
                WarehouseError::invalid_argument(format!("Invalid sheet index '{}': {}", s, e))
            })?;
            Ok(SheetSelector::Index(index))
        } else {
            Ok(SheetSelector::Name(s.to_string()))
        }
    }
}

impl From<usize> for SheetSelector {
    fn from(index: usize) -> Self {
        SheetSelector::Index(index)
    }
}

impl From<&str> for SheetSelector {
    fn from(name: &str) -> Self {
        SheetSelector::Name(name.to_string())
    }
}

impl From<String> for SheetSelector {
    fn from(name: String) -> Self {
        SheetSelector::Name(name)
    }
}

/// Configuration for a [`crate::Warehouse`].
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Root folder id on the remote drive
    pub folder_id: Option<String>,
    /// Location of the credentials file
    pub credentials_path: Option<PathBuf>,
    /// Time-to-live for the table index and cached datasets
    pub cache_ttl: Duration,
    /// Sheet used when a caller does not ask for one
    pub default_sheet: SheetSelector,
    /// Whether to consult environment variables for missing values
    pub load_env: bool,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            folder_id: None,
            credentials_path: None,
            cache_ttl: Duration::from_secs(DEFAULT_TTL_MINUTES * 60),
            default_sheet: SheetSelector::default(),
            load_env: true,
        }
    }
}

impl WarehouseConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration taken entirely from the process environment.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(minutes) = env_var(ENV_CACHE_TTL_MINUTES) {
            let minutes = minutes.trim().parse::<u64>().map_err(|e| {
                WarehouseError::configuration(format!(
                    "{} must be a whole number of minutes: {}",
                    ENV_CACHE_TTL_MINUTES, e
                ))
            })?;
            config = config.with_cache_ttl_minutes(minutes);
        }
        if let Some(sheet) = env_var(ENV_SHEET) {
            config = config.with_default_sheet(sheet.parse::<SheetSelector>()?);
        }
        Ok(config)
    }

    pub fn with_folder_id(mut self, folder_id: impl Into<String>) -> Self {
        self.folder_id = Some(folder_id.into());
        self
    }

    pub fn with_credentials_path(mut self, path: impl AsRef<Path>) -> Self {
        self.credentials_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_cache_ttl_minutes(self, minutes: u64) -> Self {
        self.with_cache_ttl(Duration::from_secs(minutes * 60))
    }

    pub fn with_default_sheet(mut self, sheet: impl Into<SheetSelector>) -> Self {
        self.default_sheet = sheet.into();
        self
    }

    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Resolve against the process environment.
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        self.resolve_with(env_var)
    }

    /// Resolve only the root folder id against the process environment.
    ///
    /// Used when the caller brings its own gateway and therefore its own
    /// credentials.
    pub fn resolve_folder_id(&self) -> Result<String> {
        self.resolve_folder_id_with(env_var)
    }

    pub fn resolve_folder_id_with<F>(&self, lookup: F) -> Result<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.folder_id
            .clone()
            .or_else(|| if self.load_env { lookup(ENV_FOLDER_ID) } else { None })
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                WarehouseError::configuration(format!(
                    "folder_id not provided. Pass it explicitly or set {}",
                    ENV_FOLDER_ID
                ))
            })
    }

    /// Resolve using `lookup` as the environment source.
    ///
    /// Both the folder id and the credentials path are required, and the
    /// credentials path must point at an existing file.
    pub fn resolve_with<F>(&self, lookup: F) -> Result<ResolvedConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let folder_id = self.resolve_folder_id_with(&lookup)?;
        let from_env = |key: &str| if self.load_env { lookup(key) } else { None };

        let credentials_path = self
            .credentials_path
            .clone()
            .or_else(|| from_env(ENV_CREDENTIALS_PATH).map(PathBuf::from))
            .ok_or_else(|| {
                WarehouseError::configuration(format!(
                    "credentials_path not provided. Pass it explicitly or set {}",
                    ENV_CREDENTIALS_PATH
                ))
            })?;

        if !credentials_path.is_file() {
            return Err(WarehouseError::configuration(format!(
                "Credentials file not found: {}",
                credentials_path.display()
            )));
        }

        Ok(ResolvedConfig {
            folder_id,
            credentials_path,
            cache_ttl: self.cache_ttl,
            default_sheet: self.default_sheet.clone(),
        })
    }
}

/// Fully validated configuration.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub folder_id: String,
    pub credentials_path: PathBuf,
    pub cache_ttl: Duration,
    pub default_sheet: SheetSelector,
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
