/// Errors returned by the checksum, snapshot and repository layers.
///
/// The HTTP boundary maps these to status codes through
/// [`StoreError::is_client_error`] and the variant itself; everything that is
/// not the client's fault surfaces as a server error.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The keyed checksum sent with a metric does not match the recomputed one.
    #[error("checksum mismatch for metric '{id}'")]
    InvalidChecksum { id: String },

    /// The `type` field is neither `gauge` nor `counter`.
    #[error("unknown metric type '{0}'")]
    UnknownMetricType(String),

    /// No record exists for the requested `(id, type)`.
    #[error("metric '{id}' of type '{mtype}' not found")]
    NotFound { id: String, mtype: String },

    /// A gauge without `value` or a counter without `delta`.
    #[error("metric '{id}' of type '{mtype}' carries no value")]
    MissingValue { id: String, mtype: String },

    /// A gauge value that is NaN or infinite; it has no JSON representation.
    #[error("metric '{id}' has a non-finite value")]
    NonFiniteValue { id: String },

    /// The id is already stored under another type.
    #[error("metric '{id}' already exists with a type other than '{mtype}'")]
    TypeConflict { id: String, mtype: String },

    /// Snapshot file could not be read or written.
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A snapshot line or payload is not a valid metric.
    #[error("malformed metric JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The SQL backend failed (unreachable, constraint, decode).
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The repository did not answer within the request deadline.
    #[error("repository call timed out")]
    Timeout,
}

impl StoreError {
    /// True for errors caused by the submitted data rather than by the store.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            StoreError::InvalidChecksum { .. }
                | StoreError::UnknownMetricType(_)
                | StoreError::NotFound { .. }
                | StoreError::MissingValue { .. }
                | StoreError::NonFiniteValue { .. }
                | StoreError::TypeConflict { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
