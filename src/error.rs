use thiserror::Error;

/// Failures recorded by the data caches. Cloned out to every caller that hits the cached state.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("data source unavailable: {0}")]
    DataSourceUnavailable(String),
}

impl CacheError {
    pub(crate) fn unavailable(err: &anyhow::Error) -> Self {
        CacheError::DataSourceUnavailable(format!("{:#}", err))
    }
}
