use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by allocation, experiment sources and the config service.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The experiment has no variant that could be selected.
    #[error("invalid variant set: {0}")]
    InvalidVariantSet(#[from] VariantSetError),

    /// The experiment store could not be reached or answered with an unexpected status.
    #[error("experiment source is unavailable")]
    ServiceUnavailable,

    #[error("unauthorized, api_key is likely invalid")]
    Unauthorized,

    #[error("project not found")]
    ProjectNotFound,

    /// A required request parameter is missing or empty.
    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),

    /// Datastore URL or key is missing (or still holds a placeholder value).
    #[error("experiment source is not configured")]
    NotConfigured,

    #[error("invalid base_url configuration")]
    InvalidBaseUrl(#[source] url::ParseError),
}

/// Reason a variant set cannot yield a variant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VariantSetError {
    #[error("experiment has no variants")]
    Empty,
    #[error("traffic splits sum to zero")]
    ZeroTotalWeight,
    #[error("variant {variant_id:?} has traffic split {traffic_split}, expected 0..=100")]
    SplitOutOfRange {
        variant_id: String,
        traffic_split: u32,
    },
}
