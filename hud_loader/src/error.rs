use hud_fetch::FetchError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("failed to fetch {path}: {source}")]
    Fetch {
        path: String,
        #[source]
        source: FetchError,
    },
    #[error("manifest at {path} is invalid: {reason}")]
    Manifest { path: String, reason: String },
    #[error("invalid fragment pattern: {0}")]
    Pattern(#[from] regex::Error),
}
