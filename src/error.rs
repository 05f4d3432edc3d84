/// Every failure a caller can see. Storage failures never appear here; the
/// orchestrator contains them (see [`crate::store::StoreError`]).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    /// The request was malformed and never reached the inference backend
    #[error("{0}")]
    Validation(String),

    /// The inference backend answered and reported a failure
    #[error("{0}")]
    UpstreamRejected(String),

    /// The inference backend could not be reached or answered nonsense
    #[error("{0}")]
    UpstreamUnavailable(String),
}
