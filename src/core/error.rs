use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    Parse,
    TableNotFound,
    TableAlreadyExists,
    ColumnNotFound,
    ColumnAlreadyExists,
    Forbidden,
    CapacityExceeded,
    UnsupportedQuery,
    Serialization,
    Corrupted,
    InvalidState,
    Io,
    Internal,
}

/// How a failure is surfaced at the request boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation, // 400
    NotFound,   // 404
    Forbidden,  // 401/403
    Conflict,   // 409
    Internal,   // 500
}

impl ErrorKind {
    pub fn category(self) -> ErrorCategory {
        match self {
            ErrorKind::InvalidArgument
            | ErrorKind::Parse
            | ErrorKind::UnsupportedQuery
            | ErrorKind::ColumnNotFound
            | ErrorKind::CapacityExceeded => ErrorCategory::Validation,
            ErrorKind::TableNotFound => ErrorCategory::NotFound,
            ErrorKind::Forbidden => ErrorCategory::Forbidden,
            ErrorKind::TableAlreadyExists | ErrorKind::ColumnAlreadyExists => ErrorCategory::Conflict,
            ErrorKind::Serialization
            | ErrorKind::Corrupted
            | ErrorKind::InvalidState
            | ErrorKind::Io
            | ErrorKind::Internal => ErrorCategory::Internal,
        }
    }
}

#[derive(Debug, Error)]
#[error("{kind:?}: {context}")]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
}

impl Error {
    pub fn new(kind: ErrorKind, context: impl Into<String>) -> Self {
        Error { kind, context: context.into() }
    }

    /// Missing or blank parameter, reported the way argument checks report it.
    pub fn not_provided(param: &str) -> Self {
        Error::new(ErrorKind::InvalidArgument, format!("Not Provided (Parameter '{param}')"))
    }

    pub fn table_not_found(table: &str) -> Self {
        Error::new(ErrorKind::TableNotFound, format!("Table {table} not found"))
    }

    pub fn forbidden(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Forbidden, context)
    }

    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error {
            kind: ErrorKind::Io,
            context: err.to_string(),
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error {
            kind: ErrorKind::Corrupted,
            context: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            kind: ErrorKind::Serialization,
            context: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_boundary_categories() {
        assert_eq!(ErrorKind::Parse.category(), ErrorCategory::Validation);
        assert_eq!(ErrorKind::TableNotFound.category(), ErrorCategory::NotFound);
        assert_eq!(ErrorKind::Forbidden.category(), ErrorCategory::Forbidden);
        assert_eq!(ErrorKind::TableAlreadyExists.category(), ErrorCategory::Conflict);
        assert_eq!(ErrorKind::Serialization.category(), ErrorCategory::Internal);
    }

    #[test]
    fn json_errors_become_serialization_errors() {
        let err: Error = serde_json::from_str::<u32>("{not json").unwrap_err().into();
        assert_eq!(err.kind, ErrorKind::Serialization);
    }
}
