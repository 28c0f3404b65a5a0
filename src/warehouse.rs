//! The warehouse facade.
//!
//! A [`Warehouse`] owns the table index, the memo cache and the metadata
//! records for one root folder. All three live in memory for the lifetime of
//! the instance and are reset together by [`Warehouse::clear_cache`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::cache::{CacheInfo, CacheKey, CacheLookup, CacheStats, MemoCache};
use crate::config::{SheetSelector, WarehouseConfig};
use crate::dataset::{Dataset, TableLoad};
use crate::error::{Result, WarehouseError};
use crate::format::{self, Decoded};
use crate::gateway::{DriveGateway, HttpDrive, RemoteFile};
use crate::index::TableIndex;
use crate::join::{self, JoinKind};
use crate::metadata::TableMetadata;

/// Number of indexed names offered when a table is not found.
const MAX_SUGGESTIONS: usize = 5;

/// Lazily loading, cache-backed view of a drive folder as named tables.
///
/// Operations take `&mut self`; share a warehouse between threads only
/// behind a lock.
#[derive(Debug)]
pub struct Warehouse {
    gateway: Arc<dyn DriveGateway>,
    default_sheet: SheetSelector,
    index: TableIndex,
    cache: MemoCache,
    metadata: BTreeMap<String, TableMetadata>,
}

impl Warehouse {
    /// Resolve `config`, read the credentials and connect over HTTP.
    ///
    /// The credentials file must hold a ready bearer token (`access_token`);
    /// service-account key files are not accepted.
    pub fn connect(config: WarehouseConfig) -> Result<Self> {
        let resolved = config.resolve()?;
        let gateway = HttpDrive::from_credentials_file(&resolved.credentials_path)?;
        info!(folder = %resolved.folder_id, "connected to drive");
        Ok(Self::from_parts(
            Arc::new(gateway),
            resolved.folder_id,
            resolved.cache_ttl,
            resolved.default_sheet,
        ))
    }

    /// Use an already authenticated gateway; only the folder id is required.
    pub fn with_gateway(config: WarehouseConfig, gateway: Arc<dyn DriveGateway>) -> Result<Self> {
        let folder_id = config.resolve_folder_id()?;
        Ok(Self::from_parts(
            gateway,
            folder_id,
            config.cache_ttl,
            config.default_sheet,
        ))
    }

    fn from_parts(
        gateway: Arc<dyn DriveGateway>,
        folder_id: String,
        ttl: Duration,
        default_sheet: SheetSelector,
    ) -> Self {
        Self {
            gateway,
            default_sheet,
            index: TableIndex::new(folder_id, ttl),
            cache: MemoCache::new(ttl),
            metadata: BTreeMap::new(),
        }
    }

    pub fn folder_id(&self) -> &str {
        self.index.root_id()
    }

    pub fn default_sheet(&self) -> &SheetSelector {
        &self.default_sheet
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache.ttl()
    }

    /// Sorted table names. Never downloads content.
    pub fn list_tables(&mut self, force_refresh: bool) -> Result<Vec<String>> {
        let tables = self.index.tables(self.gateway.as_ref(), force_refresh)?;
        Ok(tables.keys().cloned().collect())
    }

    /// Load one table, from cache when its remote file is unchanged.
    ///
    /// `sheet` defaults to the warehouse-wide default sheet. With
    /// `force_refresh` the cached entry for this table and sheet is dropped
    /// first. Gateway failures are errors; a missing or unparseable table is
    /// reported through [`TableLoad`].
    pub fn get_table(
        &mut self,
        name: &str,
        sheet: Option<SheetSelector>,
        force_refresh: bool,
    ) -> Result<TableLoad> {
        let sheet = sheet.unwrap_or_else(|| self.default_sheet.clone());
        let tables = self.index.tables(self.gateway.as_ref(), false)?;

        let file = match tables.get(name) {
            Some(file) => file.clone(),
            None => {
                let suggestions: Vec<String> = tables.keys().take(MAX_SUGGESTIONS).cloned().collect();
                warn!(table = name, available = %suggestions.join(", "), "table not found");
                return Ok(TableLoad::NotFound {
                    name: name.to_string(),
                    suggestions,
                });
            }
        };

        let key = CacheKey::new(file.id.clone(), sheet.clone());
        if force_refresh && self.cache.invalidate(&key) {
            info!(table = name, "cached copy dropped");
        }

        let fingerprint = match self.cache.lookup(self.gateway.as_ref(), &key) {
            CacheLookup::Hit(dataset) => {
                self.record_load(name, &file, &dataset);
                return Ok(TableLoad::Loaded(dataset));
            }
            CacheLookup::Miss { fingerprint } => fingerprint,
        };

        info!(table = name, file = %file.name, "loading");
        match format::decode(self.gateway.as_ref(), &file, &sheet)? {
            Decoded::Dataset(dataset) => {
                let (rows, columns) = dataset.shape();
                info!(table = name, rows, columns, "loaded");
                self.cache.store(key, dataset.clone(), fingerprint, &file.name);
                self.record_load(name, &file, &dataset);
                Ok(TableLoad::Loaded(dataset))
            }
            Decoded::Unusable(reason) => {
                warn!(table = name, file = %file.name, %reason, "table unreadable");
                Ok(TableLoad::Unreadable {
                    name: name.to_string(),
                    reason,
                })
            }
        }
    }

    /// Load several tables; those that fail for any reason are left out.
    pub fn get_tables<I, S>(&mut self, names: I, sheet: Option<SheetSelector>) -> BTreeMap<String, Dataset>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut loaded = BTreeMap::new();
        let mut requested = 0;
        for name in names {
            let name = name.as_ref();
            requested += 1;
            match self.get_table(name, sheet.clone(), false) {
                Ok(TableLoad::Loaded(dataset)) => {
                    loaded.insert(name.to_string(), dataset);
                }
                Ok(_) => {}
                Err(e) => warn!(table = name, error = %e, "table skipped"),
            }
        }
        info!(loaded = loaded.len(), requested, "tables loaded");
        loaded
    }

    /// Table names containing `keyword`, ignoring case.
    pub fn search_tables(&mut self, keyword: &str) -> Result<Vec<String>> {
        let needle = keyword.to_lowercase();
        let tables = self.index.tables(self.gateway.as_ref(), false)?;
        Ok(tables
            .keys()
            .filter(|name| name.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    /// Metadata of the last successful load of `name`.
    pub fn metadata(&self, name: &str) -> Option<&TableMetadata> {
        self.metadata.get(name)
    }

    /// Metadata of every table loaded so far.
    pub fn all_metadata(&self) -> &BTreeMap<String, TableMetadata> {
        &self.metadata
    }

    /// Load both tables and join them on `on`.
    ///
    /// A geospatial left table yields a geospatial result with the same CRS.
    /// Fails with [`WarehouseError::Join`] when either side cannot be loaded.
    pub fn join_tables(
        &mut self,
        left: &str,
        right: &str,
        on: &[&str],
        kind: JoinKind,
        sheet: Option<SheetSelector>,
    ) -> Result<Dataset> {
        let left_data = self.load_join_input(left, sheet.clone())?;
        let right_data = self.load_join_input(right, sheet)?;

        let on: Vec<String> = on.iter().map(|s| s.to_string()).collect();
        let batch = join::join(left_data.batch(), right_data.batch(), &on, kind)?;
        info!(left, right, %kind, rows = batch.num_rows(), "tables joined");
        match left_data {
            Dataset::Geospatial { crs, .. } => Ok(Dataset::Geospatial { batch, crs }),
            Dataset::Tabular(_) => Ok(Dataset::Tabular(batch)),
        }
    }

    fn load_join_input(&mut self, name: &str, sheet: Option<SheetSelector>) -> Result<Dataset> {
        let failure = |detail: String| {
            WarehouseError::join(format!("Unable to load table '{}' for join: {}", name, detail))
        };
        match self.get_table(name, sheet, false) {
            Ok(TableLoad::Loaded(dataset)) => Ok(dataset),
            Ok(TableLoad::NotFound { .. }) => Err(failure("not found".to_string())),
            Ok(TableLoad::Unreadable { reason, .. }) => Err(failure(reason)),
            Err(e) => Err(failure(e.to_string())),
        }
    }

    /// Drop every cached dataset, the table index and all metadata.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
        self.index.clear();
        self.metadata.clear();
        info!("cache cleared");
    }

    /// Snapshot of cache contents; validity is checked against the remote.
    pub fn cache_info(&self) -> CacheInfo {
        self.cache.info(self.gateway.as_ref(), self.index.len())
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn record_load(&mut self, name: &str, file: &RemoteFile, dataset: &Dataset) {
        self.metadata
            .insert(name.to_string(), TableMetadata::from_load(file, dataset));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryDrive;

    fn setup() -> (Arc<MemoryDrive>, Warehouse) {
        let drive = Arc::new(MemoryDrive::new("root"));
        drive.add_file("a", "vendas.csv", "root", "id;total\n1;10\n2;20\n");
        drive.add_file("b", "clientes.csv", "root", "id,nome\n1,Ana\n3,Rui\n");
        drive.add_file("c", "quebrado.csv", "root", "apenas\numa\ncoluna\n");
        let warehouse = Warehouse::with_gateway(
            WarehouseConfig::new().with_folder_id("root").without_env(),
            drive.clone(),
        )
        .unwrap();
        (drive, warehouse)
    }

    #[test]
    fn test_with_gateway_requires_folder_id() {
        let drive = Arc::new(MemoryDrive::new("root"));
        let err = Warehouse::with_gateway(WarehouseConfig::new().without_env(), drive).unwrap_err();
        assert!(matches!(err, WarehouseError::Configuration { .. }));
    }

    #[test]
    fn test_connect_reports_missing_credentials() {
        let err = Warehouse::connect(
            WarehouseConfig::new()
                .with_folder_id("root")
                .with_credentials_path("/no/such/credentials.json"),
        )
        .unwrap_err();
        assert!(matches!(err, WarehouseError::Configuration { .. }));
    }

    #[test]
    fn test_not_found_suggests_names() {
        let (_, mut warehouse) = setup();
        match warehouse.get_table("nada", None, false).unwrap() {
            TableLoad::NotFound { suggestions, .. } => {
                assert_eq!(suggestions, vec!["clientes", "quebrado", "vendas"]);
            }
            other => panic!("expected not found, got {:?}", other),
        }
    }

    #[test]
    fn test_unreadable_is_not_cached() {
        let (drive, mut warehouse) = setup();
        assert!(matches!(
            warehouse.get_table("quebrado", None, false).unwrap(),
            TableLoad::Unreadable { .. }
        ));
        assert!(matches!(
            warehouse.get_table("quebrado", None, false).unwrap(),
            TableLoad::Unreadable { .. }
        ));
        assert_eq!(drive.download_count(), 2);
        assert!(warehouse.metadata("quebrado").is_none());
    }

    #[test]
    fn test_force_refresh_downloads_again() {
        let (drive, mut warehouse) = setup();
        warehouse.get_table("vendas", None, false).unwrap();
        warehouse.get_table("vendas", None, true).unwrap();
        assert_eq!(drive.download_count(), 2);
        assert_eq!(warehouse.cache_stats().invalidations, 1);
    }

    #[test]
    fn test_metadata_recorded_on_load() {
        let (_, mut warehouse) = setup();
        warehouse.get_table("vendas", None, false).unwrap();
        let meta = warehouse.metadata("vendas").unwrap();
        assert_eq!(meta.file_name, "vendas.csv");
        assert_eq!(meta.file_type, "CSV");
        assert_eq!(meta.shape, (2, 2));
        assert_eq!(warehouse.all_metadata().len(), 1);
    }

    #[test]
    fn test_join_fails_when_a_side_is_missing() {
        let (_, mut warehouse) = setup();
        let err = warehouse
            .join_tables("vendas", "nada", &["id"], JoinKind::Inner, None)
            .unwrap_err();
        assert!(matches!(err, WarehouseError::Join { .. }));
        assert!(err.to_string().contains("nada"));
    }

    #[test]
    fn test_join_loaded_tables() {
        let (_, mut warehouse) = setup();
        let joined = warehouse
            .join_tables("vendas", "clientes", &["id"], JoinKind::Inner, None)
            .unwrap();
        assert_eq!(joined.shape(), (1, 3));
        assert_eq!(joined.column_names(), vec!["id", "total", "nome"]);
    }

    #[test]
    fn test_join_keeps_left_geometry_and_crs() {
        let (drive, mut warehouse) = setup();
        drive.add_file(
            "g",
            "lojas.geojson",
            "root",
            r#"{"type": "FeatureCollection",
                "crs": {"type": "name", "properties": {"name": "EPSG:31983"}},
                "features": [
                    {"type": "Feature", "properties": {"id": 1},
                     "geometry": {"type": "Point", "coordinates": [1, 2]}},
                    {"type": "Feature", "properties": {"id": 2},
                     "geometry": {"type": "Point", "coordinates": [3, 4]}}
                ]}"#,
        );
        warehouse.list_tables(true).unwrap();

        let joined = warehouse
            .join_tables("lojas", "vendas", &["id"], JoinKind::Inner, None)
            .unwrap();
        assert!(joined.is_geospatial());
        assert_eq!(joined.crs(), Some("EPSG:31983"));
        assert_eq!(joined.column_names(), vec!["id", "geometry", "total"]);
        assert_eq!(joined.num_rows(), 2);

        let flipped = warehouse
            .join_tables("vendas", "lojas", &["id"], JoinKind::Inner, None)
            .unwrap();
        assert!(!flipped.is_geospatial());
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let (_, mut warehouse) = setup();
        assert_eq!(warehouse.search_tables("VEN").unwrap(), vec!["vendas"]);
        assert!(warehouse.search_tables("zzz").unwrap().is_empty());
    }
}
