use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use crate::core::error::{Error, ErrorKind, Result};
use crate::structures::partition_mask::PartitionMask;

const TABLE_META_FILE: &str = "table.meta";
const DATABASE_SECURITY_FILE: &str = "_database.json";

/// Directory structure for persisted tables and ACLs
#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub base_dir: PathBuf,     // Root directory
    pub tables_dir: PathBuf,   // One directory per table (meta + .part files)
    pub security_dir: PathBuf, // Per-table ACL json
}

impl StorageLayout {
    pub fn new(base_dir: PathBuf) -> Result<Self> {
        let tables_dir = base_dir.join("tables");
        let security_dir = base_dir.join("security");

        fs::create_dir_all(&tables_dir)?;
        fs::create_dir_all(&security_dir)?;

        Ok(StorageLayout {
            base_dir,
            tables_dir,
            security_dir,
        })
    }

    pub fn lock_path(&self) -> PathBuf {
        self.base_dir.join(".lock")
    }

    pub fn table_dir(&self, table: &str) -> PathBuf {
        self.tables_dir.join(table)
    }

    pub fn table_meta_path(&self, table: &str) -> PathBuf {
        self.table_dir(table).join(TABLE_META_FILE)
    }

    pub fn partition_path(&self, table: &str, mask: &PartitionMask) -> PathBuf {
        self.table_dir(table).join(format!("p{mask}.part"))
    }

    /// ACL file for `table`; the empty name is the database-level ACL.
    pub fn security_path(&self, table: &str) -> PathBuf {
        if table.is_empty() {
            self.security_dir.join(DATABASE_SECURITY_FILE)
        } else {
            self.security_dir.join(format!("{table}.json"))
        }
    }

    /// Names of tables with persisted metadata, sorted.
    pub fn list_tables(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.tables_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() || !entry.path().join(TABLE_META_FILE).exists() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Partition files in a table directory, whatever bit count wrote them.
    pub fn partition_files(&self, table: &str) -> Result<Vec<PathBuf>> {
        let dir = self.table_dir(table);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "part") {
                files.push(path);
            }
        }
        Ok(files)
    }

    pub fn remove_table(&self, table: &str) -> Result<()> {
        let dir = self.table_dir(table);
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        let security = self.security_path(table);
        if security.exists() {
            fs::remove_file(security)?;
        }
        Ok(())
    }
}

/// Table names become directory names, so keep them to a portable set.
pub fn validate_table_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::not_provided("tableName"));
    }
    let valid = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        && !name.starts_with('.')
        && !name.starts_with('_');
    if !valid {
        return Err(Error::new(
            ErrorKind::InvalidArgument,
            format!("Table name '{name}' may only contain letters, digits, '_', '-' and '.'"),
        ));
    }
    Ok(())
}

/// Write through a temporary sibling and rename into place.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut file = fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_follow_layout() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path().to_path_buf()).unwrap();

        assert!(layout.tables_dir.is_dir());
        assert!(layout.security_dir.is_dir());
        assert_eq!(
            layout.partition_path("Users", &PartitionMask::new(2, 0x4000_0000)),
            dir.path().join("tables").join("Users").join("p01.part")
        );
        assert_eq!(
            layout.security_path(""),
            dir.path().join("security").join("_database.json")
        );
    }

    #[test]
    fn list_tables_requires_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path().to_path_buf()).unwrap();
        write_atomic(&layout.table_meta_path("Bugs"), b"x").unwrap();
        fs::create_dir_all(layout.table_dir("Empty")).unwrap();

        assert_eq!(layout.list_tables().unwrap(), vec!["Bugs".to_string()]);
    }

    #[test]
    fn table_names_are_validated() {
        assert!(validate_table_name("Users").is_ok());
        assert!(validate_table_name("work-items.2024").is_ok());
        assert_eq!(validate_table_name("").unwrap_err().kind, ErrorKind::InvalidArgument);
        assert!(validate_table_name("../etc").is_err());
        assert!(validate_table_name("_database").is_err());
    }
}
