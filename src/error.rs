//! Error types for cache and query operations.

use thiserror::Error;

/// Errors surfaced by the data cache and the query layer.
///
/// Delivery failures on the live channel are deliberately absent: the
/// broadcast engine contains them and never raises past its caller.
#[derive(Debug, Error)]
pub enum DataError {
    /// A logical data unit has no backing file.
    #[error("data unit not found: {unit}")]
    UnitNotFound { unit: String },

    /// A record lookup by id matched nothing.
    #[error("record not found: {id}")]
    RecordNotFound { id: String },

    /// The backing file exists but is not valid JSON of the expected shape.
    #[error("malformed data unit '{unit}': {source}")]
    Parse {
        unit: String,
        #[source]
        source: serde_json::Error,
    },

    /// Reading the backing file failed for a reason other than absence.
    #[error("failed to read data unit '{unit}': {source}")]
    Io {
        unit: String,
        #[source]
        source: std::io::Error,
    },
}

impl DataError {
    /// True for the two "nothing there" variants, used by the web layer to
    /// map to a 404.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DataError::UnitNotFound { .. } | DataError::RecordNotFound { .. }
        )
    }
}
