use std::collections::HashMap;
use serde::{Deserialize, Serialize};

/// Interned string storage for one column of one partition. Rows hold ids
/// into the block so repeated values are stored once.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct StringBlock {
    values: Vec<String>,
    lookup: HashMap<String, u32>,
}

impl StringBlock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of `value`, adding it to the block on first use.
    pub fn intern(&mut self, value: &str) -> u32 {
        if let Some(&id) = self.lookup.get(value) {
            return id;
        }
        let id = self.values.len() as u32;
        self.values.push(value.to_string());
        self.lookup.insert(value.to_string(), id);
        id
    }

    pub fn get(&self, id: u32) -> &str {
        &self.values[id as usize]
    }

    pub fn id_of(&self, value: &str) -> Option<u32> {
        self.lookup.get(value).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Evaluate `predicate` once per distinct value; indexed by id.
    pub fn matching_ids(&self, mut predicate: impl FnMut(&str) -> bool) -> Vec<bool> {
        self.values.iter().map(|v| predicate(v)).collect()
    }
}

impl From<Vec<String>> for StringBlock {
    fn from(values: Vec<String>) -> Self {
        let lookup = values
            .iter()
            .enumerate()
            .map(|(i, v)| (v.clone(), i as u32))
            .collect();
        StringBlock { values, lookup }
    }
}

impl From<StringBlock> for Vec<String> {
    fn from(block: StringBlock) -> Self {
        block.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_deduplicates() {
        let mut block = StringBlock::new();
        let a = block.intern("active");
        let b = block.intern("resolved");
        assert_eq!(block.intern("active"), a);
        assert_ne!(a, b);
        assert_eq!(block.len(), 2);
        assert_eq!(block.get(b), "resolved");
    }

    #[test]
    fn rebuilds_lookup_from_values() {
        let block = StringBlock::from(vec!["x".to_string(), "y".to_string()]);
        assert_eq!(block.id_of("y"), Some(1));
        assert_eq!(block.matching_ids(|v| v == "x"), vec![true, false]);
    }
}
