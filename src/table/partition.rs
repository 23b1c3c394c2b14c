use std::collections::{HashMap, HashSet};
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use crate::column::column::{Column, ColumnSnapshot};
use crate::core::details::{ExecutionDetails, VerificationLevel};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{DataBlock, Value};
use crate::query::ast::{Expression, TermExpression};
use crate::schema::schema::{ColumnDetails, TableSchema};
use crate::structures::partition_mask::{hash_id, PartitionMask};

/// Persisted form of a partition.
#[derive(Debug, Serialize, Deserialize)]
pub struct PartitionSnapshot {
    pub mask: PartitionMask,
    pub len: u32,
    pub used: Vec<u32>,
    pub columns: Vec<(String, ColumnSnapshot)>,
}

/// One shard of a table: a slice of every column for the rows whose ID hash
/// matches `mask`.
///
/// Slots are never compacted. Deleting a row clears its used bit and its ID
/// mapping and puts the slot on the free list; the next insert reuses it.
#[derive(Debug, Clone)]
pub struct Partition {
    mask: PartitionMask,
    capacity: usize,             // Max live rows
    columns: Vec<Column>,        // Table schema order
    id_index: Option<usize>,     // Position of the ID column in `columns`
    used: RoaringBitmap,         // Live slots
    id_map: HashMap<Value, u32>, // ID value -> slot
    free: Vec<u32>,              // Released slots
    len: usize,                  // Slots allocated in every column
}

impl Partition {
    pub fn new(mask: PartitionMask, schema: &TableSchema, capacity: usize) -> Result<Self> {
        let columns = schema
            .columns
            .iter()
            .map(|details| Column::new(details.clone(), 0))
            .collect::<Result<Vec<_>>>()?;

        Ok(Partition {
            mask,
            capacity,
            columns,
            id_index: schema.id_index(),
            used: RoaringBitmap::new(),
            id_map: HashMap::new(),
            free: Vec::new(),
            len: 0,
        })
    }

    pub fn mask(&self) -> PartitionMask {
        self.mask
    }

    pub fn count(&self) -> usize {
        self.used.len() as usize
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn used(&self) -> &RoaringBitmap {
        &self.used
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name().eq_ignore_ascii_case(name))
    }

    pub fn contains_id(&self, id: &Value) -> bool {
        self.id_map.contains_key(id)
    }

    pub fn get(&self, row: u32, column: usize) -> Value {
        self.columns[column].get(row as usize)
    }

    /// ID value of a live row.
    pub fn id_of(&self, row: u32) -> Option<Value> {
        self.id_index.map(|i| self.columns[i].get(row as usize))
    }

    /// New column, backfilled with its default for existing slots.
    pub fn add_column(&mut self, details: ColumnDetails) -> Result<()> {
        let is_id = details.is_primary_key;
        self.columns.push(Column::new(details, self.len)?);
        if is_id && self.id_index.is_none() {
            self.id_index = Some(self.columns.len() - 1);
        }
        Ok(())
    }

    /// Insert or update `rows` of `block`. `mapping[c]` is the block column
    /// feeding partition column `c`; `id_column` is the block's ID column.
    /// Block values must already be coerced to the column types.
    pub fn add_or_update(
        &mut self,
        block: &DataBlock,
        mapping: &[Option<usize>],
        id_column: usize,
        rows: &[usize],
    ) -> Result<()> {
        let new_rows = rows
            .iter()
            .map(|&r| block.get(r, id_column))
            .filter(|id| !self.id_map.contains_key(*id))
            .collect::<HashSet<_>>()
            .len();
        if self.count() + new_rows > self.capacity {
            return Err(Error::new(
                ErrorKind::CapacityExceeded,
                format!(
                    "Partition {} holds {} of {} rows; {} more do not fit",
                    self.mask,
                    self.count(),
                    self.capacity,
                    new_rows
                ),
            ));
        }

        for &row in rows {
            let id = block.get(row, id_column);
            let slot = self.slot_for(id)?;
            for (column, source) in self.columns.iter_mut().zip(mapping) {
                if let Some(source) = source {
                    column.set(slot, block.get(row, *source))?;
                }
            }
        }
        Ok(())
    }

    /// Full-schema row insert, used when redistributing rows.
    fn push_row(&mut self, values: Vec<Value>) -> Result<()> {
        let id_index = self.require_id_index()?;
        let slot = self.slot_for(&values[id_index])?;
        for (column, value) in self.columns.iter_mut().zip(&values) {
            column.set(slot, value)?;
        }
        Ok(())
    }

    // Existing slot for `id`, or a fresh one reset to column defaults.
    fn slot_for(&mut self, id: &Value) -> Result<usize> {
        if id.is_null() {
            return Err(Error::new(ErrorKind::InvalidArgument, "Rows must have an ID value"));
        }
        if let Some(&slot) = self.id_map.get(id) {
            return Ok(slot as usize);
        }
        let id_index = self.require_id_index()?;

        let slot = match self.free.pop() {
            Some(slot) => slot as usize,
            None => {
                let slot = self.len;
                self.len += 1;
                for column in &mut self.columns {
                    column.grow(self.len)?;
                }
                slot
            }
        };

        for column in &mut self.columns {
            column.set(slot, &Value::Null)?;
        }
        self.columns[id_index].set(slot, id)?;
        self.used.insert(slot as u32);
        self.id_map.insert(id.clone(), slot as u32);
        Ok(slot)
    }

    fn require_id_index(&self) -> Result<usize> {
        self.id_index
            .ok_or_else(|| Error::new(ErrorKind::InvalidState, "Table has no ID column"))
    }

    /// Delete rows matching `expression`; returns how many were removed.
    pub fn delete(&mut self, expression: &Expression, details: &mut ExecutionDetails) -> u64 {
        let matches = self.evaluate(expression, details);
        self.delete_rows(&matches)
    }

    pub fn delete_rows(&mut self, rows: &RoaringBitmap) -> u64 {
        let mut deleted = 0;
        for row in rows.iter() {
            if !self.used.remove(row) {
                continue;
            }
            if let Some(id) = self.id_of(row) {
                self.id_map.remove(&id);
            }
            self.free.push(row);
            deleted += 1;
        }
        deleted
    }

    /// Live rows matching `expression`. Problems (unknown column, bad value,
    /// unsupported operator) are recorded in `details` and the offending term
    /// matches nothing.
    pub fn evaluate(&self, expression: &Expression, details: &mut ExecutionDetails) -> RoaringBitmap {
        match expression {
            Expression::All => self.used.clone(),
            Expression::Term(term) => self.evaluate_term(term, details),
            Expression::And(children) => {
                let mut result = self.used.clone();
                for child in children {
                    result &= self.evaluate(child, details);
                }
                result
            }
            Expression::Or(children) => {
                let mut result = RoaringBitmap::new();
                for child in children {
                    result |= self.evaluate(child, details);
                }
                result
            }
            Expression::Not(inner) => &self.used - &self.evaluate(inner, details),
        }
    }

    fn evaluate_term(&self, term: &TermExpression, details: &mut ExecutionDetails) -> RoaringBitmap {
        let Some(name) = &term.column else {
            // Unqualified: any column the value converts to and the operator applies to
            let mut result = RoaringBitmap::new();
            for column in &self.columns {
                let ty = column.details().column_type;
                let Ok(operand) = Value::from(term.value.as_str()).coerce(ty) else {
                    continue;
                };
                if let Some(rows) = column.try_evaluate(term.op, &operand, &self.used) {
                    result |= rows;
                }
            }
            return result;
        };

        let Some(column) = self.column(name) else {
            details.add_error(format!("Column '{name}' does not exist."));
            return RoaringBitmap::new();
        };
        let ty = column.details().column_type;
        let operand = match Value::from(term.value.as_str()).coerce(ty) {
            Ok(operand) => operand,
            Err(_) => {
                details.add_error(format!("'{}' is not a valid {ty} value for [{}].", term.value, column.name()));
                return RoaringBitmap::new();
            }
        };
        match column.try_evaluate(term.op, &operand, &self.used) {
            Some(rows) => rows,
            None => {
                details.add_error(format!(
                    "Operator '{}' is not supported on {ty} column [{}].",
                    term.op,
                    column.name()
                ));
                RoaringBitmap::new()
            }
        }
    }

    /// Redistribute live rows into the two child masks one bit wider.
    pub fn split(&self, schema: &TableSchema) -> Result<[Partition; 2]> {
        let [low, high] = self.mask.children();
        let mut children = [
            Partition::new(low, schema, self.capacity)?,
            Partition::new(high, schema, self.capacity)?,
        ];

        for row in self.used.iter() {
            let values: Vec<Value> = self.columns.iter().map(|c| c.get(row as usize)).collect();
            let id = &values[self.require_id_index()?];
            let target = if children[0].mask.matches(hash_id(id)) { 0 } else { 1 };
            children[target].push_row(values)?;
        }
        Ok(children)
    }

    /// Record structural problems in `details` without failing.
    pub fn verify_consistency(&self, level: VerificationLevel, details: &mut ExecutionDetails) {
        for column in &self.columns {
            if column.len() != self.len {
                details.add_error(format!(
                    "Partition {}: column [{}] has {} slots, expected {}.",
                    self.mask,
                    column.name(),
                    column.len(),
                    self.len
                ));
            }
        }

        if self.used.len() as usize != self.id_map.len() {
            details.add_error(format!(
                "Partition {}: {} live rows but {} mapped IDs.",
                self.mask,
                self.used.len(),
                self.id_map.len()
            ));
        }
        if let Some(max) = self.used.max() {
            if max as usize >= self.len {
                details.add_error(format!("Partition {}: live row {max} is past the end.", self.mask));
            }
        }
        if self.free.iter().any(|&slot| self.used.contains(slot)) {
            details.add_error(format!("Partition {}: a free slot is marked live.", self.mask));
        }

        if level == VerificationLevel::Full {
            for row in self.used.iter() {
                let Some(id) = self.id_of(row) else {
                    details.add_error(format!("Partition {}: rows without an ID column.", self.mask));
                    break;
                };
                if self.id_map.get(&id) != Some(&row) {
                    details.add_error(format!("Partition {}: ID '{id}' does not map to row {row}.", self.mask));
                }
                if !self.mask.matches(hash_id(&id)) {
                    details.add_error(format!("Partition {}: ID '{id}' belongs to another partition.", self.mask));
                }
            }
        }
    }

    pub fn to_snapshot(&self) -> PartitionSnapshot {
        PartitionSnapshot {
            mask: self.mask,
            len: self.len as u32,
            used: self.used.iter().collect(),
            columns: self
                .columns
                .iter()
                .map(|c| (c.name().to_string(), c.to_snapshot()))
                .collect(),
        }
    }

    pub fn from_snapshot(snapshot: PartitionSnapshot, schema: &TableSchema, capacity: usize) -> Result<Self> {
        let len = snapshot.len as usize;
        let mut stored: HashMap<String, ColumnSnapshot> = snapshot
            .columns
            .into_iter()
            .map(|(name, column)| (name.to_lowercase(), column))
            .collect();

        let mut columns = Vec::with_capacity(schema.columns.len());
        for details in &schema.columns {
            let column = match stored.remove(&details.name.to_lowercase()) {
                Some(column) => Column::from_snapshot(details.clone(), column)?,
                None => Column::new(details.clone(), len)?,
            };
            if column.len() != len {
                return Err(Error::new(
                    ErrorKind::Corrupted,
                    format!("Column [{}] has {} slots, expected {len}", details.name, column.len()),
                ));
            }
            columns.push(column);
        }

        let used: RoaringBitmap = snapshot.used.into_iter().collect();
        let free = (0..snapshot.len).rev().filter(|slot| !used.contains(*slot)).collect();

        let mut partition = Partition {
            mask: snapshot.mask,
            capacity,
            columns,
            id_index: schema.id_index(),
            used,
            id_map: HashMap::new(),
            free,
            len,
        };
        for row in partition.used.iter() {
            if let Some(id) = partition.id_of(row) {
                partition.id_map.insert(id, row);
            }
        }
        Ok(partition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ColumnType;
    use crate::query::parser::parse_where;

    fn schema() -> TableSchema {
        TableSchema {
            columns: vec![
                ColumnDetails::new("ID", ColumnType::Integer).primary_key(),
                ColumnDetails::new("Name", ColumnType::String),
            ],
        }
    }

    fn users(capacity: usize) -> Partition {
        let mut partition = Partition::new(PartitionMask::ALL, &schema(), capacity).unwrap();
        let block = DataBlock::from_rows(
            vec!["ID".into(), "Name".into()],
            vec![
                vec![Value::Integer(1), Value::from("visouza")],
                vec![Value::Integer(2), Value::from("ericmai")],
                vec![Value::Integer(3), Value::from("louvau")],
                vec![Value::Integer(4), Value::from("scott")],
            ],
        )
        .unwrap();
        partition
            .add_or_update(&block, &[Some(0), Some(1)], 0, &[0, 1, 2, 3])
            .unwrap();
        partition
    }

    fn matching(partition: &Partition, q: &str) -> (u64, ExecutionDetails) {
        let mut details = ExecutionDetails::new();
        let rows = partition.evaluate(&parse_where(q).unwrap(), &mut details);
        (rows.len(), details)
    }

    #[test]
    fn add_then_update_in_place() {
        let mut partition = users(10);
        let update = DataBlock::from_rows(
            vec!["ID".into(), "Name".into()],
            vec![vec![Value::Integer(2), Value::from("eric")]],
        )
        .unwrap();
        partition.add_or_update(&update, &[Some(0), Some(1)], 0, &[0]).unwrap();

        assert_eq!(partition.count(), 4);
        assert_eq!(matching(&partition, "Name = eric").0, 1);
        assert_eq!(matching(&partition, "Name = ericmai").0, 0);
    }

    #[test]
    fn capacity_is_enforced() {
        let mut partition = users(4);
        let block = DataBlock::from_rows(
            vec!["ID".into()],
            vec![vec![Value::Integer(5)]],
        )
        .unwrap();
        let err = partition.add_or_update(&block, &[Some(0), None], 0, &[0]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::CapacityExceeded);
        assert_eq!(partition.count(), 4);
    }

    #[test]
    fn evaluation_records_problems() {
        let partition = users(10);
        assert_eq!(matching(&partition, "visouza").0, 1);
        assert_eq!(matching(&partition, "3").0, 1);

        let (count, details) = matching(&partition, "Title = x");
        assert_eq!(count, 0);
        assert!(!details.succeeded());

        let (_, details) = matching(&partition, "ID = abc");
        assert!(!details.succeeded());

        let (_, details) = matching(&partition, "ID |> 1");
        assert!(!details.succeeded());
    }

    #[test]
    fn delete_frees_slots_for_reuse() {
        let mut partition = users(10);
        let mut details = ExecutionDetails::new();
        let deleted = partition.delete(&parse_where("ID = 2").unwrap(), &mut details);
        assert_eq!(deleted, 1);
        assert_eq!(partition.count(), 3);
        assert!(!partition.contains_id(&Value::Integer(2)));

        let block = DataBlock::from_rows(vec!["ID".into()], vec![vec![Value::Integer(9)]]).unwrap();
        partition.add_or_update(&block, &[Some(0), None], 0, &[0]).unwrap();
        assert_eq!(partition.len, 4);
        assert_eq!(matching(&partition, "ID = 9 AND Name = \"\"").0, 1);

        let mut details = ExecutionDetails::new();
        partition.verify_consistency(VerificationLevel::Full, &mut details);
        assert!(details.succeeded(), "{:?}", details.errors);
    }

    #[test]
    fn split_routes_rows_by_hash() {
        let partition = users(10);
        let children = partition.split(&schema()).unwrap();
        assert_eq!(children[0].count() + children[1].count(), 4);

        for child in &children {
            let mut details = ExecutionDetails::new();
            child.verify_consistency(VerificationLevel::Full, &mut details);
            assert!(details.succeeded(), "{:?}", details.errors);
        }
    }

    #[test]
    fn snapshot_round_trip() {
        let mut partition = users(10);
        partition.delete_rows(&[1u32].into_iter().collect());
        let restored = Partition::from_snapshot(partition.to_snapshot(), &schema(), 10).unwrap();

        assert_eq!(restored.count(), 3);
        assert_eq!(matching(&restored, "Name = louvau").0, 1);
        assert!(!restored.contains_id(&Value::Integer(2)));
        assert_eq!(restored.free, vec![1]);
    }

    #[test]
    fn broken_bookkeeping_is_reported() {
        let mut partition = users(10);
        partition.id_map.remove(&Value::Integer(3));

        let mut details = ExecutionDetails::new();
        partition.verify_consistency(VerificationLevel::Normal, &mut details);
        assert!(!details.succeeded());
    }
}
