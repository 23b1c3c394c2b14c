use serde::{Deserialize, Serialize};

/// How deep `verify_consistency` walks a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum VerificationLevel {
    /// Column lengths, used-row bitmaps and row counts.
    #[default]
    Normal,
    /// Normal checks plus identity mapping and partition routing of every row.
    Full,
}

/// Accumulates problems found while running a query or verifying a table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionDetails {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ExecutionDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn succeeded(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn merge(&mut self, other: ExecutionDetails) {
        for error in other.errors {
            if !self.errors.contains(&error) {
                self.errors.push(error);
            }
        }
        for warning in other.warnings {
            if !self.warnings.contains(&warning) {
                self.warnings.push(warning);
            }
        }
    }
}
