//! Drivehouse - lazily loaded tables over a cloud drive folder
//!
//! Drivehouse exposes the tabular and geographic files below a drive folder
//! as named tables. Content is only downloaded when a table is asked for,
//! and parsed tables stay cached until their remote file changes.
//!
//! # Features
//!
//! - **Table index**: recursive folder listing, cached for a configurable TTL
//! - **Freshness-aware cache**: keyed by file and sheet, checked against the
//!   remote modification time on every access
//! - **Format detection**: native spreadsheets, CSV (encoding and delimiter
//!   probing), xlsx/xls workbooks, JSON and GeoJSON
//! - **Joins**: inner, left, right and outer joins between loaded tables
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use drivehouse::{JoinKind, Result, TableLoad, Warehouse, WarehouseConfig};
//!
//! fn main() -> Result<()> {
//!     let config = WarehouseConfig::new()
//!         .with_folder_id("1AbCdEf")
//!         .with_credentials_path("credentials.json")
//!         .with_cache_ttl_minutes(30);
//!     let mut warehouse = Warehouse::connect(config)?;
//!
//!     for name in warehouse.list_tables(false)? {
//!         println!("{}", name);
//!     }
//!
//!     if let TableLoad::Loaded(sales) = warehouse.get_table("vendas", None, false)? {
//!         println!("{}", sales.pretty(10)?);
//!     }
//!
//!     let joined = warehouse.join_tables("vendas", "clientes", &["id"], JoinKind::Left, None)?;
//!     println!("{} rows", joined.num_rows());
//!     Ok(())
//! }
//! ```
//!
//! # Bringing Your Own Gateway
//!
//! ```rust
//! use std::sync::Arc;
//! use drivehouse::{MemoryDrive, Warehouse, WarehouseConfig};
//!
//! let drive = Arc::new(MemoryDrive::new("root"));
//! drive.add_file("f1", "vendas.csv", "root", "id;total\n1;10\n");
//!
//! let config = WarehouseConfig::new().with_folder_id("root").without_env();
//! let mut warehouse = Warehouse::with_gateway(config, drive).unwrap();
//! assert_eq!(warehouse.list_tables(false).unwrap(), vec!["vendas"]);
//! ```

pub mod cache;
pub mod config;
pub mod dataset;
pub mod error;
pub mod format;
pub mod gateway;
pub mod index;
pub mod join;
pub mod metadata;
pub mod warehouse;

// Re-export commonly used types
pub use cache::{CacheInfo, CacheStats, Fingerprint};
pub use config::{SheetSelector, WarehouseConfig};
pub use dataset::{Dataset, TableLoad};
pub use error::{Result, WarehouseError};
pub use gateway::{DriveGateway, HttpDrive, MemoryDrive, RemoteFile};
pub use join::JoinKind;
pub use metadata::TableMetadata;
pub use warehouse::Warehouse;
