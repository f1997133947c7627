/// Result alias used throughout the crate.
///
/// Application and adapter code propagate `anyhow::Error`; typed errors from
/// [`crate::shared::error`] are converted into it with `?`.
pub type Result<T> = std::result::Result<T, anyhow::Error>;
