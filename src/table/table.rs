use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use crate::core::config::Config;
use crate::core::details::{ExecutionDetails, VerificationLevel};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{ColumnType, DataBlock, Value};
use crate::query::ast::Expression;
use crate::query::engine::Query;
use crate::query::results::DeleteResult;
use crate::schema::schema::{ColumnDetails, TableSchema};
use crate::storage::layout::{write_atomic, StorageLayout};
use crate::storage::partition_file::{read_partition_file, write_partition_file};
use crate::structures::partition_mask::{hash_id, PartitionMask};
use crate::table::partition::{Partition, PartitionSnapshot};

/// Persisted table header (`table.meta`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub name: String,
    pub schema: TableSchema,
    pub bit_count: u8,
    pub item_limit: usize,
    pub last_write_time: Option<DateTime<Utc>>,
}

/// Sizing and fan-out knobs every table of a database shares.
#[derive(Debug, Clone, Copy)]
pub struct TableSettings {
    pub partition_capacity: usize,
    pub max_partition_bits: u8,
    pub parallel_partition_threshold: usize,
}

impl TableSettings {
    pub fn from_config(config: &Config) -> Self {
        TableSettings {
            partition_capacity: config.partition_capacity.max(1),
            max_partition_bits: config.max_partition_bits,
            parallel_partition_threshold: config.parallel_partition_threshold.max(1),
        }
    }
}

impl Default for TableSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddOrUpdateOptions {
    /// Add block columns the table lacks, typed from their first non-null value.
    pub add_missing_columns: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableState {
    Unloaded,
    Loaded,
}

struct TableData {
    state: TableState,
    schema: TableSchema,
    partitions: Vec<Partition>, // build_set(bit_count) order
    bit_count: u8,
    item_limit: usize,
    last_write_time: Option<DateTime<Utc>>,
}

/// A named set of partitions sharing one schema.
///
/// Queries run under the read lock; anything that changes rows, columns or
/// the partition layout runs under the write lock. An unloaded table loads
/// itself on first use.
pub struct Table {
    name: String,
    storage: Arc<StorageLayout>,
    settings: TableSettings,
    data: RwLock<TableData>,
    save_lock: Mutex<()>,
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Table");
        out.field("name", &self.name);
        match self.data.try_read() {
            Some(data) => out.field("state", &data.state).field("partitions", &data.partitions.len()),
            None => out.field("state", &"<locked>"),
        };
        out.finish()
    }
}

impl Table {
    /// A new, empty, loaded table.
    pub fn new(name: &str, item_limit: usize, storage: Arc<StorageLayout>, settings: TableSettings) -> Result<Self> {
        let schema = TableSchema::default();
        let partitions = vec![Partition::new(PartitionMask::ALL, &schema, settings.partition_capacity)?];
        Ok(Table {
            name: name.to_string(),
            storage,
            settings,
            data: RwLock::new(TableData {
                state: TableState::Loaded,
                schema,
                partitions,
                bit_count: 0,
                item_limit,
                last_write_time: None,
            }),
            save_lock: Mutex::new(()),
        })
    }

    /// A table known to exist on disk, loaded on first use.
    pub fn unloaded(name: &str, storage: Arc<StorageLayout>, settings: TableSettings) -> Self {
        Table {
            name: name.to_string(),
            storage,
            settings,
            data: RwLock::new(TableData {
                state: TableState::Unloaded,
                schema: TableSchema::default(),
                partitions: Vec::new(),
                bit_count: 0,
                item_limit: 0,
                last_write_time: None,
            }),
            save_lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> TableState {
        self.data.read().state
    }

    pub fn column_details(&self) -> Result<Vec<ColumnDetails>> {
        Ok(self.read_loaded()?.schema.columns.clone())
    }

    pub fn schema(&self) -> Result<TableSchema> {
        Ok(self.read_loaded()?.schema.clone())
    }

    pub fn id_column(&self) -> Result<Option<ColumnDetails>> {
        Ok(self.read_loaded()?.schema.id_column().cloned())
    }

    pub fn count(&self) -> Result<u64> {
        Ok(self.read_loaded()?.partitions.iter().map(|p| p.count() as u64).sum())
    }

    pub fn partition_count(&self) -> Result<usize> {
        Ok(self.read_loaded()?.partitions.len())
    }

    pub fn item_limit(&self) -> Result<usize> {
        Ok(self.read_loaded()?.item_limit)
    }

    pub fn last_write_time(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.read_loaded()?.last_write_time)
    }

    /// Add columns to the schema and every partition, backfilling defaults.
    pub fn add_columns(&self, columns: Vec<ColumnDetails>) -> Result<()> {
        let mut data = self.write_loaded()?;
        add_columns(&mut data, columns)?;
        data.last_write_time = Some(Utc::now());
        Ok(())
    }

    /// Insert or update every row of `block`, keyed on the ID column.
    ///
    /// Values are coerced to the column types up front. Partitions that would
    /// overflow are split first, up to the maximum split depth. If any value
    /// fails to convert, or the block would exceed the item limit or a
    /// partition's capacity, neither columns nor rows are changed.
    pub fn add_or_update(&self, block: &DataBlock, options: AddOrUpdateOptions) -> Result<()> {
        let mut data = self.write_loaded()?;

        let missing = if options.add_missing_columns {
            infer_missing_columns(&data.schema, block)
        } else {
            Vec::new()
        };
        check_new_columns(&data.schema, &missing)?;
        let mut schema = data.schema.clone();
        schema.columns.extend(missing.iter().cloned());

        let block = coerce_block(&schema, block)?;
        let id_column = schema
            .id_column()
            .and_then(|c| block.index_of(&c.name))
            .ok_or_else(|| {
                Error::new(ErrorKind::InvalidArgument, format!("Rows for '{}' must include the ID column", self.name))
            })?;
        let mapping: Vec<Option<usize>> = schema.columns.iter().map(|c| block.index_of(&c.name)).collect();
        let hashes: Vec<u32> = (0..block.row_count()).map(|r| hash_id(block.get(r, id_column))).collect();

        let new_ids: HashSet<&Value> = (0..block.row_count())
            .filter(|&r| {
                let index = PartitionMask::index_of_hash(hashes[r], data.bit_count);
                !data.partitions[index].contains_id(block.get(r, id_column))
            })
            .map(|r| block.get(r, id_column))
            .collect();
        let current: u64 = data.partitions.iter().map(|p| p.count() as u64).sum();
        if current + new_ids.len() as u64 > data.item_limit as u64 {
            return Err(Error::new(
                ErrorKind::CapacityExceeded,
                format!(
                    "Table '{}' holds {current} of {} items; {} more do not fit",
                    self.name,
                    data.item_limit,
                    new_ids.len()
                ),
            ));
        }

        let groups = loop {
            let groups = route(&hashes, data.bit_count);
            let full = groups.iter().enumerate().find_map(|(i, rows)| {
                let partition = &data.partitions[i];
                let added = rows
                    .iter()
                    .map(|&r| block.get(r, id_column))
                    .filter(|id| !partition.contains_id(id))
                    .collect::<HashSet<_>>()
                    .len();
                (partition.count() + added > partition.capacity()).then_some((i, added))
            });
            let Some((index, added)) = full else {
                break groups;
            };
            if data.bit_count >= self.settings.max_partition_bits {
                let partition = &data.partitions[index];
                return Err(Error::new(
                    ErrorKind::CapacityExceeded,
                    format!(
                        "Partition {} of '{}' holds {} of {} rows; {added} more do not fit",
                        partition.mask(),
                        self.name,
                        partition.count(),
                        partition.capacity()
                    ),
                ));
            }
            // Splitting moves rows between partitions without changing them
            split_all(&mut data)?;
            debug!(table = %self.name, partitions = data.partitions.len(), "split partitions");
        };

        if !missing.is_empty() {
            add_columns(&mut data, missing)?;
        }
        for (partition, rows) in data.partitions.iter_mut().zip(&groups) {
            if !rows.is_empty() {
                partition.add_or_update(&block, &mapping, id_column, rows)?;
            }
        }
        data.last_write_time = Some(Utc::now());
        debug!(table = %self.name, rows = block.row_count(), "added or updated rows");
        Ok(())
    }

    /// Delete rows matching `where_clause`. If the clause has errors
    /// (unknown column, bad value) nothing is deleted.
    pub fn delete(&self, where_clause: &Expression) -> Result<DeleteResult> {
        let mut data = self.write_loaded()?;
        let mut details = ExecutionDetails::new();
        let matches: Vec<_> = data
            .partitions
            .iter()
            .map(|p| p.evaluate(where_clause, &mut details))
            .collect();
        if !details.succeeded() {
            return Ok(DeleteResult { count: 0, details });
        }

        let mut count = 0;
        for (partition, rows) in data.partitions.iter_mut().zip(&matches) {
            count += partition.delete_rows(rows);
        }
        if count > 0 {
            data.last_write_time = Some(Utc::now());
        }
        debug!(table = %self.name, rows = count, "deleted rows");
        Ok(DeleteResult { count, details })
    }

    /// Run `query` against every partition and merge the partial results.
    pub fn query<Q: Query>(&self, query: &Q) -> Result<Q::Output> {
        let data = self.read_loaded()?;
        let schema = &data.schema;
        let mut details = ExecutionDetails::new();
        query.prepare(schema, &mut details);

        let partials: Vec<(Q::Partial, ExecutionDetails)> = if !details.succeeded() {
            Vec::new()
        } else if data.partitions.len() >= self.settings.parallel_partition_threshold {
            data.partitions
                .par_iter()
                .map(|p| {
                    let mut partial_details = ExecutionDetails::new();
                    (query.compute(schema, p, &mut partial_details), partial_details)
                })
                .collect()
        } else {
            data.partitions
                .iter()
                .map(|p| {
                    let mut partial_details = ExecutionDetails::new();
                    (query.compute(schema, p, &mut partial_details), partial_details)
                })
                .collect()
        };

        debug!(
            table = %self.name,
            partitions = data.partitions.len(),
            where_clause = %query.where_clause(),
            "executing query"
        );

        let mut results = Vec::with_capacity(partials.len());
        for (partial, partial_details) in partials {
            details.merge(partial_details);
            results.push(partial);
        }
        Ok(query.merge(schema, results, details))
    }

    /// Record structural problems in `details`; never fails.
    pub fn verify_consistency(&self, level: VerificationLevel, details: &mut ExecutionDetails) {
        let data = match self.read_loaded() {
            Ok(data) => data,
            Err(e) => {
                details.add_error(format!("Table '{}' could not be loaded: {}", self.name, e.context));
                return;
            }
        };

        let expected = PartitionMask::build_set(data.bit_count);
        if expected.len() != data.partitions.len() {
            details.add_error(format!(
                "Table '{}' has {} partitions, expected {}.",
                self.name,
                data.partitions.len(),
                expected.len()
            ));
        }
        for (partition, mask) in data.partitions.iter().zip(&expected) {
            if partition.mask() != *mask {
                details.add_error(format!("Table '{}': partition {} is out of place.", self.name, partition.mask()));
            }
            if partition.columns().len() != data.schema.columns.len() {
                details.add_error(format!(
                    "Table '{}': partition {} has {} columns, expected {}.",
                    self.name,
                    partition.mask(),
                    partition.columns().len(),
                    data.schema.columns.len()
                ));
            }
            partition.verify_consistency(level, details);
        }
    }

    /// Persist metadata and every partition. An unloaded table has nothing
    /// newer than what is on disk and is skipped.
    pub fn save(&self) -> Result<()> {
        let _saving = self.save_lock.lock();
        let data = self.data.read();
        if data.state == TableState::Unloaded {
            return Ok(());
        }

        let mut written: HashSet<PathBuf> = HashSet::new();
        for partition in &data.partitions {
            let path = self.storage.partition_path(&self.name, &partition.mask());
            write_partition_file(&path, partition.count() as u32, &partition.to_snapshot())?;
            written.insert(path);
        }

        let metadata = TableMetadata {
            name: self.name.clone(),
            schema: data.schema.clone(),
            bit_count: data.bit_count,
            item_limit: data.item_limit,
            last_write_time: data.last_write_time,
        };
        write_atomic(&self.storage.table_meta_path(&self.name), &bincode::serialize(&metadata)?)?;

        // Files from an earlier bit count
        for stale in self.storage.partition_files(&self.name)? {
            if !written.contains(&stale) {
                fs::remove_file(stale)?;
            }
        }

        info!(table = %self.name, partitions = data.partitions.len(), "saved table");
        Ok(())
    }

    /// Replace in-memory state with what is on disk.
    pub fn load(&self) -> Result<()> {
        let mut data = self.data.write();
        self.load_into(&mut data)
    }

    /// Drop in-memory state; unsaved changes are lost.
    pub fn unload(&self) {
        let mut data = self.data.write();
        data.state = TableState::Unloaded;
        data.partitions = Vec::new();
        data.schema = TableSchema::default();
        info!(table = %self.name, "unloaded table");
    }

    fn load_into(&self, data: &mut TableData) -> Result<()> {
        let bytes = fs::read(self.storage.table_meta_path(&self.name))?;
        let metadata: TableMetadata = bincode::deserialize(&bytes)?;

        let mut partitions = Vec::with_capacity(1 << metadata.bit_count);
        for mask in PartitionMask::build_set(metadata.bit_count) {
            let path = self.storage.partition_path(&self.name, &mask);
            let partition = if path.exists() {
                let (_, snapshot): (_, PartitionSnapshot) = read_partition_file(&path)?;
                if snapshot.mask != mask {
                    return Err(Error::new(
                        ErrorKind::Corrupted,
                        format!("{} holds partition {}, expected {mask}", path.display(), snapshot.mask),
                    ));
                }
                Partition::from_snapshot(snapshot, &metadata.schema, self.settings.partition_capacity)?
            } else {
                Partition::new(mask, &metadata.schema, self.settings.partition_capacity)?
            };
            partitions.push(partition);
        }

        *data = TableData {
            state: TableState::Loaded,
            schema: metadata.schema,
            partitions,
            bit_count: metadata.bit_count,
            item_limit: metadata.item_limit,
            last_write_time: metadata.last_write_time,
        };
        info!(table = %self.name, partitions = data.partitions.len(), "loaded table");
        Ok(())
    }

    fn read_loaded(&self) -> Result<RwLockReadGuard<'_, TableData>> {
        let data = self.data.read();
        if data.state == TableState::Loaded {
            return Ok(data);
        }
        drop(data);
        Ok(RwLockWriteGuard::downgrade(self.write_loaded()?))
    }

    fn write_loaded(&self) -> Result<RwLockWriteGuard<'_, TableData>> {
        let mut data = self.data.write();
        if data.state == TableState::Unloaded {
            self.load_into(&mut data)?;
        }
        Ok(data)
    }
}

fn add_columns(data: &mut TableData, columns: Vec<ColumnDetails>) -> Result<()> {
    check_new_columns(&data.schema, &columns)?;
    for column in columns {
        for partition in &mut data.partitions {
            partition.add_column(column.clone())?;
        }
        data.schema.columns.push(column);
    }
    Ok(())
}

fn check_new_columns(schema: &TableSchema, columns: &[ColumnDetails]) -> Result<()> {
    let mut names: HashSet<String> = schema.columns.iter().map(|c| c.name.to_lowercase()).collect();
    let mut has_id = schema.id_index().is_some();
    for column in columns {
        column.validate()?;
        if !names.insert(column.name.to_lowercase()) {
            return Err(Error::new(
                ErrorKind::ColumnAlreadyExists,
                format!("Column '{}' already exists", column.name),
            ));
        }
        if column.is_primary_key {
            if has_id {
                return Err(Error::new(
                    ErrorKind::InvalidArgument,
                    format!("Column '{}' cannot be a second ID column", column.name),
                ));
            }
            has_id = true;
        }
    }
    Ok(())
}

// Block columns the schema lacks. With no ID column yet, the block's first
// column becomes it.
fn infer_missing_columns(schema: &TableSchema, block: &DataBlock) -> Vec<ColumnDetails> {
    let needs_id = schema.id_index().is_none();
    block
        .column_names()
        .iter()
        .enumerate()
        .filter(|(_, name)| schema.index_of(name).is_none())
        .map(|(i, name)| {
            let column_type = block
                .column(i)
                .iter()
                .find_map(Value::column_type)
                .unwrap_or(ColumnType::String);
            let details = ColumnDetails::new(name, column_type);
            if needs_id && i == 0 {
                details.primary_key()
            } else {
                details
            }
        })
        .collect()
}

fn coerce_block(schema: &TableSchema, block: &DataBlock) -> Result<DataBlock> {
    let mut columns = Vec::with_capacity(block.column_count());
    for (i, name) in block.column_names().iter().enumerate() {
        let details = schema
            .get(name)
            .ok_or_else(|| Error::new(ErrorKind::ColumnNotFound, format!("Column '{name}' not found")))?;
        let values = block
            .column(i)
            .iter()
            .map(|v| if v.is_null() { Ok(Value::Null) } else { v.coerce(details.column_type) })
            .collect::<Result<Vec<_>>>()?;
        if details.is_primary_key && values.iter().any(Value::is_null) {
            return Err(Error::new(ErrorKind::InvalidArgument, format!("Column '{name}' has rows without an ID")));
        }
        columns.push(values);
    }
    DataBlock::from_columns(block.column_names().to_vec(), columns)
}

// Block rows per partition index.
fn route(hashes: &[u32], bit_count: u8) -> Vec<Vec<usize>> {
    let mut groups = vec![Vec::new(); 1 << bit_count];
    for (row, &hash) in hashes.iter().enumerate() {
        groups[PartitionMask::index_of_hash(hash, bit_count)].push(row);
    }
    groups
}

// One bit wider: each partition becomes its two children, in place.
fn split_all(data: &mut TableData) -> Result<()> {
    let mut partitions = Vec::with_capacity(data.partitions.len() * 2);
    for partition in &data.partitions {
        partitions.extend(partition.split(&data.schema)?);
    }
    data.partitions = partitions;
    data.bit_count += 1;
    Ok(())
}
