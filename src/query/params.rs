use std::collections::HashMap;
use crate::core::error::{Error, ErrorKind, Result};

/// Request parameters with case-insensitive keys, as they arrive from a
/// query string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    values: HashMap<String, String>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_ascii_lowercase(), value.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(&key.to_ascii_lowercase()).map(String::as_str)
    }

    /// Non-blank value, or `None`.
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.trim().is_empty())
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get_non_empty(key).unwrap_or(default)
    }

    /// `base1`, `base2`, ... up to the first missing or empty one.
    pub fn read_set(&self, base: &str) -> Vec<String> {
        (1..)
            .map_while(|i| {
                self.get(&format!("{base}{i}"))
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
            })
            .collect()
    }

    /// Numbered set, falling back to a comma-delimited `delimited` value.
    pub fn read_set_or_delimited(&self, base: &str, delimited: &str) -> Vec<String> {
        let set = self.read_set(base);
        if !set.is_empty() {
            return set;
        }
        self.get_non_empty(delimited)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Row limit from `t`, or `default` when absent.
    pub fn take(&self, default: usize) -> Result<usize> {
        match self.get_non_empty("t") {
            None => Ok(default),
            Some(t) => t.trim().parse::<u16>().map(usize::from).map_err(|_| {
                Error::new(ErrorKind::InvalidArgument, format!("Count [t] '{t}' must be a number from 0 to 65535."))
            }),
        }
    }
}

impl<K: AsRef<str>, V: AsRef<str>> FromIterator<(K, V)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut parameters = Parameters::new();
        for (k, v) in iter {
            parameters.insert(k.as_ref(), v.as_ref());
        }
        parameters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_case_insensitive() {
        let p = Parameters::new().with("Q", "crash");
        assert_eq!(p.get("q"), Some("crash"));
        assert_eq!(p.get_or("ob", "ID"), "ID");
    }

    #[test]
    fn numbered_sets_stop_at_gap() {
        let p: Parameters = [("c1", "ID"), ("c2", "Title"), ("c4", "Skipped")].into_iter().collect();
        assert_eq!(p.read_set("c"), vec!["ID", "Title"]);
    }

    #[test]
    fn delimited_fallback() {
        let p = Parameters::new().with("cols", "ID, Title,,Priority");
        assert_eq!(p.read_set_or_delimited("c", "cols"), vec!["ID", "Title", "Priority"]);
    }

    #[test]
    fn take_parses_u16() {
        assert_eq!(Parameters::new().take(500).unwrap(), 500);
        assert_eq!(Parameters::new().with("t", "25").take(500).unwrap(), 25);
        assert_eq!(Parameters::new().with("t", "70000").take(500).unwrap_err().kind, ErrorKind::InvalidArgument);
    }
}
