//! Error types for the RPM repository library.

/// Result type for RPM repository operations.
pub type Result<T> = std::result::Result<T, RpmRepositoryError>;

/// Errors that can occur when working with RPM repository metadata.
#[derive(Debug, thiserror::Error)]
pub enum RpmRepositoryError {
    /// I/O error occurred during compression or decompression.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed package binary data.
    #[error("Invalid package data: {0}")]
    InvalidPackageData(String),

    /// A tag required for metadata extraction is absent from the header.
    #[error("Missing required tag: {0}")]
    MissingTag(String),

    /// Unknown digest algorithm requested.
    #[error("Unsupported digest algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Malformed metadata document or manifest.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Invalid field value.
    #[error("Invalid field value for '{field}': {value}")]
    InvalidField {
        /// Name of the offending field.
        field: String,
        /// The value that failed to parse.
        value: String,
    },
}

impl RpmRepositoryError {
    /// Create a new invalid package data error.
    pub fn invalid_package<S: Into<String>>(msg: S) -> Self {
        Self::InvalidPackageData(msg.into())
    }

    /// Create a new missing tag error.
    pub fn missing_tag<S: Into<String>>(tag: S) -> Self {
        Self::MissingTag(tag.into())
    }

    /// Create a new invalid document error.
    pub fn invalid_document<S: Into<String>>(msg: S) -> Self {
        Self::InvalidDocument(msg.into())
    }

    /// Create a new invalid field error.
    pub fn invalid_field<S: Into<String>>(field: S, value: S) -> Self {
        Self::InvalidField {
            field: field.into(),
            value: value.into(),
        }
    }
}
