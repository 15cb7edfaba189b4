//! Searchlab Table Registry
//!
//! Named tables served to query front-ends. Tables are held locally as
//! published snapshots, loaded lazily from JSON documents in storage, or
//! proxied to a remote registry when one is configured.
//!
//! Key Features:
//! - Shared registration of snapshots owned by audit tasks
//! - Lazy loading and persistence of `<name>.json` documents
//! - Remote lookup with local fallback
//!
//! @version 0.1.0
//! @author Searchlab Development Team

use crate::snapshot::SharedTable;
use crate::table::IndexedTable;
use parking_lot::RwLock;
use searchlab_common::{RegistryConfig, Result, SearchlabError};
use searchlab_storage::{StorageBackend, StoragePath};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub const TABLE_SUFFIX: &str = ".json";

// =============================================================================
// Remote Registry
// =============================================================================

struct RemoteRegistry {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl RemoteRegistry {
    fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.to_string(),
            client: reqwest::blocking::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| reqwest::blocking::Client::new()),
        }
    }

    fn where_(&self, name: &str, selects: &[String]) -> Result<IndexedTable> {
        let url = format!("{}{}{}", self.base_url, name, TABLE_SUFFIX);
        let mut request = self.client.get(&url);
        if !selects.is_empty() {
            request = request.query(&[("where", selects.join(","))]);
        }
        let response = request
            .send()
            .map_err(|e| SearchlabError::Network(format!("request to {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(SearchlabError::Network(format!(
                "{} returned status {}",
                url,
                response.status()
            )));
        }
        let json: serde_json::Value = response
            .json()
            .map_err(|e| SearchlabError::Network(format!("invalid response from {}: {}", url, e)))?;
        IndexedTable::from_json(&json)
    }
}

// =============================================================================
// Table Registry
// =============================================================================

/// Registry of named tables.
pub struct TableRegistry {
    tables: RwLock<HashMap<String, Arc<SharedTable>>>,
    storage: Option<(Arc<dyn StorageBackend>, StoragePath)>,
    remote: Option<RemoteRegistry>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            storage: None,
            remote: None,
        }
    }

    /// Registry wired from configuration: documents under the configured
    /// tables path of `bucket`, remote lookups if a URL is set.
    pub fn from_config(
        config: &RegistryConfig,
        storage: Arc<dyn StorageBackend>,
        bucket: &str,
    ) -> Self {
        let mut registry = Self::new();
        registry.connect_storage(storage, StoragePath::new(bucket, &config.tables_path));
        if let Some(url) = &config.remote_url {
            registry.connect_remote(url, config.request_timeout());
        }
        registry
    }

    /// Forward lookups to a remote registry at `base_url`. Table names are
    /// appended to the URL as is, so it normally ends with `/`.
    pub fn connect_remote(&mut self, base_url: &str, timeout: Duration) {
        tracing::info!("table registry forwarding to {}", base_url);
        self.remote = Some(RemoteRegistry::new(base_url, timeout));
    }

    /// Read and write table documents under `path`.
    pub fn connect_storage(&mut self, storage: Arc<dyn StorageBackend>, path: StoragePath) {
        self.storage = Some((storage, path));
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    fn document_path(&self, name: &str) -> Option<(&Arc<dyn StorageBackend>, StoragePath)> {
        self.storage
            .as_ref()
            .map(|(storage, path)| (storage, path.append(&format!("{}{}", name, TABLE_SUFFIX))))
    }

    // -------------------------------------------------------------------------
    // Registration
    // -------------------------------------------------------------------------

    /// Register or replace a table.
    pub fn set_table(&self, name: &str, table: IndexedTable) {
        let mut tables = self.tables.write();
        match tables.get(name) {
            Some(shared) => shared.publish(table),
            None => {
                tables.insert(name.to_string(), Arc::new(SharedTable::new(table)));
            }
        }
    }

    /// Append rows to a registered table, or register it if absent.
    pub fn append_table(&self, name: &str, table: &IndexedTable) -> Result<()> {
        let mut tables = self.tables.write();
        match tables.get(name) {
            Some(shared) => {
                let mut next = shared.load().as_ref().clone();
                next.append(table)?;
                shared.publish(next);
            }
            None => {
                tables.insert(name.to_string(), Arc::new(SharedTable::new(table.clone())));
            }
        }
        Ok(())
    }

    /// Register a snapshot owned elsewhere; later publications by the owner
    /// are visible through the registry.
    pub fn register_shared(&self, name: &str, shared: Arc<SharedTable>) {
        self.tables.write().insert(name.to_string(), shared);
    }

    /// Unregister a table and delete its stored document. Returns whether
    /// the table was registered.
    pub fn remove_table(&self, name: &str) -> bool {
        let removed = self.tables.write().remove(name).is_some();
        if let Some((storage, path)) = self.document_path(name) {
            match storage.exists(&path) {
                Ok(true) => {
                    if let Err(e) = storage.remove(&path) {
                        tracing::warn!("failed to remove {}: {}", path, e);
                    }
                }
                Ok(false) => {}
                Err(e) => tracing::warn!("failed to check {}: {}", path, e),
            }
        }
        removed
    }

    /// Names of the registered tables, sorted.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }

    // -------------------------------------------------------------------------
    // Persistence
    // -------------------------------------------------------------------------

    /// Write a registered table to `<path>/<name>.json` as an array of row
    /// objects.
    pub fn store_table(&self, name: &str) -> Result<()> {
        let table = self.tables.read().get(name).map(|shared| shared.load());
        let table = table.ok_or_else(|| SearchlabError::TableNotFound(name.to_string()))?;
        let (storage, path) = self.document_path(name).ok_or_else(|| {
            SearchlabError::Configuration("table registry has no storage".to_string())
        })?;
        let bytes = serde_json::to_vec(&table.to_json(true))?;
        storage.write(&path, &bytes)?;
        tracing::debug!("stored table {} with {} rows to {}", name, table.size(), path);
        Ok(())
    }

    /// Current version of a local table, loading its stored document on
    /// first access.
    pub fn get_table(&self, name: &str) -> Result<Arc<IndexedTable>> {
        if let Some(shared) = self.tables.read().get(name) {
            return Ok(shared.load());
        }
        let loaded = self.load_document(name)?;
        let shared = Arc::clone(
            self.tables
                .write()
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(SharedTable::new(loaded))),
        );
        Ok(shared.load())
    }

    fn load_document(&self, name: &str) -> Result<IndexedTable> {
        let Some((storage, path)) = self.document_path(name) else {
            return Err(SearchlabError::TableNotFound(name.to_string()));
        };
        let bytes = match storage.read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => {
                return Err(SearchlabError::TableNotFound(name.to_string()));
            }
            Err(e) => return Err(e),
        };
        let json: serde_json::Value = serde_json::from_slice(&bytes)?;
        let table = IndexedTable::from_json(&json)?;
        tracing::info!("loaded table {} with {} rows from {}", name, table.size(), path);
        Ok(table)
    }

    // -------------------------------------------------------------------------
    // Query
    // -------------------------------------------------------------------------

    /// Rows of table `name` matching all `column:value` selects. A single
    /// select holding commas is split into several.
    ///
    /// With a remote registry configured the query is forwarded first; a
    /// failed remote lookup is logged and answered locally.
    pub fn where_<S: AsRef<str>>(&self, name: &str, selects: &[S]) -> Result<IndexedTable> {
        let selects: Vec<String> = match selects {
            [single] if single.as_ref().contains(',') => {
                single.as_ref().split(',').map(str::to_string).collect()
            }
            _ => selects.iter().map(|s| s.as_ref().to_string()).collect(),
        };

        if let Some(remote) = &self.remote {
            match remote.where_(name, &selects) {
                Ok(table) => return Ok(table),
                Err(e) => tracing::warn!("remote lookup of table {} failed: {}", name, e),
            }
        }
        self.get_table(name)?.where_selects(&selects)
    }
}

impl Default for TableRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ColumnDef, Schema, Value};
    use searchlab_storage::MemoryBackend;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;

    fn people() -> IndexedTable {
        let schema = Schema::new(vec![
            ColumnDef::string("view.name"),
            ColumnDef::string("meta.city"),
            ColumnDef::int64("data.age"),
        ])
        .expect("schema should be valid");
        let mut table = IndexedTable::new(schema);
        for (name, city, age) in [("ann", "Paris", 31), ("bob", "Lyon", 40), ("cid", "Paris", 25)] {
            table
                .add_row(vec![Value::from(name), Value::from(city), Value::Int64(age)])
                .expect("add_row should succeed");
        }
        table
    }

    fn with_storage() -> (TableRegistry, Arc<MemoryBackend>) {
        let storage = Arc::new(MemoryBackend::new());
        let mut registry = TableRegistry::new();
        registry.connect_storage(storage.clone(), StoragePath::new("bucket", "tables"));
        (registry, storage)
    }

    #[test]
    fn test_local_where() {
        let registry = TableRegistry::new();
        registry.set_table("people", people());

        let result = registry
            .where_("people", &["meta.city:Paris"])
            .expect("query should succeed");
        assert_eq!(result.size(), 2);

        let result = registry
            .where_("people", &["meta.city:Paris,view.name:cid"])
            .expect("query should succeed");
        assert_eq!(result.size(), 1);
        assert_eq!(result.cell(0, 2), Some(Value::Int64(25)));

        assert!(matches!(
            registry.where_("nobody", &["a:b"]),
            Err(SearchlabError::TableNotFound(_))
        ));
    }

    #[test]
    fn test_append_and_shared_registration() {
        let registry = TableRegistry::new();
        registry.append_table("people", &people()).expect("append should succeed");
        registry.append_table("people", &people()).expect("append should succeed");
        assert_eq!(registry.get_table("people").expect("table should exist").size(), 6);

        let shared = Arc::new(SharedTable::new(people()));
        registry.register_shared("live", shared.clone());
        shared.publish(people().head(1));
        assert_eq!(registry.get_table("live").expect("table should exist").size(), 1);
        assert_eq!(registry.table_names(), vec!["live", "people"]);
    }

    #[test]
    fn test_store_load_and_remove() {
        let (registry, storage) = with_storage();
        registry.set_table("people", people());
        registry.store_table("people").expect("store should succeed");

        let document = StoragePath::new("bucket", "tables/people.json");
        assert!(storage.exists(&document).expect("exists should succeed"));

        let mut reloaded = TableRegistry::new();
        reloaded.connect_storage(storage.clone(), StoragePath::new("bucket", "tables"));
        let result = reloaded
            .where_("people", &["view.name:bob"])
            .expect("query should succeed");
        assert_eq!(result.size(), 1);
        assert_eq!(result.cell(0, 1), Some(Value::from("Lyon")));
        assert_eq!(reloaded.table_names(), vec!["people"]);

        assert!(reloaded.remove_table("people"));
        assert!(!storage.exists(&document).expect("exists should succeed"));
        assert!(!reloaded.remove_table("people"));
    }

    #[test]
    fn test_store_unknown_table() {
        let (registry, _) = with_storage();
        assert!(matches!(
            registry.store_table("none"),
            Err(SearchlabError::TableNotFound(_))
        ));
    }

    #[test]
    fn test_remote_failure_falls_back_to_local() {
        let mut registry = TableRegistry::new();
        registry.connect_remote("http://127.0.0.1:1/", Duration::from_millis(500));
        registry.set_table("people", people());

        let result = registry
            .where_("people", &["view.name:ann"])
            .expect("local fallback should succeed");
        assert_eq!(result.size(), 1);
    }

    /// Answer one HTTP request with `body` and return the request line.
    fn serve_once(body: &'static str) -> (u16, std::thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
        let port = listener.local_addr().expect("address should be known").port();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept should succeed");
            let mut request_line = String::new();
            let mut reader = BufReader::new(stream.try_clone().expect("clone should succeed"));
            reader.read_line(&mut request_line).expect("read should succeed");
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).expect("read should succeed");
                if line == "\r\n" || line.is_empty() {
                    break;
                }
            }
            write!(
                stream,
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            )
            .expect("write should succeed");
            request_line
        });
        (port, server)
    }

    #[test]
    fn test_remote_lookup() {
        let (port, server) = serve_once(r#"[{"view.name":"remote","data.age":7}]"#);

        let mut registry = TableRegistry::new();
        registry.connect_remote(&format!("http://127.0.0.1:{}/", port), Duration::from_secs(5));
        let result = registry
            .where_("people", &["view.name:remote"])
            .expect("remote query should succeed");
        assert_eq!(result.size(), 1);
        assert_eq!(result.cell(0, 0), Some(Value::from("remote")));

        let request_line = server.join().expect("server should not panic");
        assert!(request_line.starts_with("GET /people.json?where="));
    }

    #[test]
    fn test_remote_lookup_without_selects_omits_filter() {
        let (port, server) = serve_once(r#"[{"view.name":"remote","data.age":7}]"#);

        let mut registry = TableRegistry::new();
        registry.connect_remote(&format!("http://127.0.0.1:{}/", port), Duration::from_secs(5));
        let result = registry
            .where_::<&str>("people", &[])
            .expect("remote query should succeed");
        assert_eq!(result.size(), 1);

        let request_line = server.join().expect("server should not panic");
        assert!(request_line.starts_with("GET /people.json HTTP/1.1"));
    }
}
