use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::RwLock;
use tracing::info;
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::storage::file_lock::FileLock;
use crate::storage::layout::{validate_table_name, StorageLayout};
use crate::table::table::{Table, TableSettings};

/// Registry of named tables under one storage root.
///
/// Tables found on disk at open are registered unloaded and load on first
/// use. The storage root is locked for the lifetime of the value, so only
/// one `Database` per process tree owns a directory.
pub struct Database {
    config: Config,
    storage: Arc<StorageLayout>,
    settings: TableSettings,
    tables: RwLock<HashMap<String, Arc<Table>>>, // lowercase name -> table
    _lock: FileLock,
}

impl Database {
    pub fn open(config: Config) -> Result<Self> {
        let storage = Arc::new(StorageLayout::new(config.storage_path.clone())?);
        let lock = FileLock::acquire(&storage)?;
        let settings = TableSettings::from_config(&config);

        let mut tables = HashMap::new();
        for name in storage.list_tables()? {
            let table = Table::unloaded(&name, storage.clone(), settings);
            tables.insert(name.to_lowercase(), Arc::new(table));
        }
        info!(path = %config.storage_path.display(), tables = tables.len(), "opened database");

        Ok(Database {
            config,
            storage,
            settings,
            tables: RwLock::new(tables),
            _lock: lock,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn storage(&self) -> &Arc<StorageLayout> {
        &self.storage
    }

    /// Create an empty table. `item_limit` of `None` uses the configured default.
    pub fn add_table(&self, name: &str, item_limit: Option<usize>) -> Result<Arc<Table>> {
        validate_table_name(name)?;
        let mut tables = self.tables.write();
        let key = name.to_lowercase();
        if tables.contains_key(&key) {
            return Err(Error::new(ErrorKind::TableAlreadyExists, format!("Table {name} already exists")));
        }

        let limit = item_limit.unwrap_or(self.config.default_item_limit);
        let table = Arc::new(Table::new(name, limit, self.storage.clone(), self.settings)?);
        tables.insert(key, table.clone());
        info!(table = %name, item_limit = limit, "created table");
        Ok(table)
    }

    /// Remove a table and everything persisted for it.
    pub fn drop_table(&self, name: &str) -> Result<()> {
        let table = self
            .tables
            .write()
            .remove(&name.to_lowercase())
            .ok_or_else(|| Error::table_not_found(name))?;
        self.storage.remove_table(table.name())?;
        info!(table = %table.name(), "dropped table");
        Ok(())
    }

    pub fn table(&self, name: &str) -> Result<Arc<Table>> {
        self.tables
            .read()
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| Error::table_not_found(name))
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.read().contains_key(&name.to_lowercase())
    }

    /// Table names in their original casing, sorted.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().values().map(|t| t.name().to_string()).collect();
        names.sort();
        names
    }

    pub fn tables(&self) -> Vec<Arc<Table>> {
        let mut tables: Vec<Arc<Table>> = self.tables.read().values().cloned().collect();
        tables.sort_by(|a, b| a.name().cmp(b.name()));
        tables
    }

    pub fn unload_table(&self, name: &str) -> Result<()> {
        self.table(name)?.unload();
        Ok(())
    }

    pub fn unload_all(&self) {
        for table in self.tables() {
            table.unload();
        }
    }

    /// Discard in-memory state and load the table from disk.
    pub fn reload_table(&self, name: &str) -> Result<()> {
        self.table(name)?.load()
    }

    pub fn save_table(&self, name: &str) -> Result<()> {
        self.table(name)?.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ColumnType, DataBlock};
    use crate::schema::schema::ColumnDetails;
    use crate::table::table::{AddOrUpdateOptions, TableState};

    fn open(dir: &std::path::Path) -> Database {
        Database::open(Config::with_storage_path(dir)).unwrap()
    }

    #[test]
    fn names_are_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let db = open(dir.path());
        db.add_table("Bugs", None).unwrap();

        assert!(db.table_exists("bugs"));
        assert_eq!(db.add_table("BUGS", None).unwrap_err().kind, ErrorKind::TableAlreadyExists);
        assert_eq!(db.table("bUgS").unwrap().name(), "Bugs");
        assert_eq!(db.table_names(), vec!["Bugs"]);
    }

    #[test]
    fn drop_missing_table_fails() {
        let dir = tempfile::tempdir().unwrap();
        let db = open(dir.path());
        assert_eq!(db.drop_table("Nope").unwrap_err().kind, ErrorKind::TableNotFound);
    }

    #[test]
    fn second_open_is_locked_out() {
        let dir = tempfile::tempdir().unwrap();
        let _db = open(dir.path());
        assert!(Database::open(Config::with_storage_path(dir.path())).is_err());
    }

    #[test]
    fn saved_tables_are_discovered_unloaded() {
        let dir = tempfile::tempdir().unwrap();
        {
            let db = open(dir.path());
            let table = db.add_table("Items", Some(10)).unwrap();
            table.add_columns(vec![ColumnDetails::new("ID", ColumnType::Integer).primary_key()]).unwrap();
            let block = DataBlock::from_rows(vec!["ID".into()], vec![vec![1.into()], vec![2.into()]]).unwrap();
            table.add_or_update(&block, AddOrUpdateOptions::default()).unwrap();
            db.save_table("items").unwrap();
        }

        let db = open(dir.path());
        let table = db.table("Items").unwrap();
        assert_eq!(table.state(), TableState::Unloaded);
        assert_eq!(table.count().unwrap(), 2);
        assert_eq!(table.item_limit().unwrap(), 10);

        db.drop_table("items").unwrap();
        assert!(!db.table_exists("Items"));
        assert!(db.storage().list_tables().unwrap().is_empty());
    }
}
