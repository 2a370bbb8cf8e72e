use http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("plugin module failed to load: {0}")]
    ModuleLoad(String),

    #[error("a plugin module has already been loaded")]
    AlreadyLoaded,

    #[error("no plugin instance is loaded")]
    NotInitialized,

    #[error("Invalid JSON{0}")]
    MalformedRequest(String),

    #[error("plugin query failed: {0}")]
    Query(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Wraps a plugin-authored error, keeping its context chain.
    pub fn query(err: anyhow::Error) -> Self {
        Self::Query(format!("{err:#}"))
    }

    pub fn module_load(err: anyhow::Error) -> Self {
        Self::ModuleLoad(format!("{err:#}"))
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            BridgeError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            BridgeError::NotInitialized => StatusCode::SERVICE_UNAVAILABLE,
            BridgeError::AlreadyLoaded => StatusCode::CONFLICT,
            BridgeError::ModuleLoad(_) | BridgeError::Query(_) | BridgeError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_request_echoes_raw_body() {
        let err = BridgeError::MalformedRequest("not json".into());
        assert_eq!(err.to_string(), "Invalid JSONnot json");
        assert_eq!(err.http_status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn query_errors_keep_context() {
        let err = anyhow::anyhow!("upstream down").context("fetching todos");
        assert_eq!(
            BridgeError::query(err).to_string(),
            "plugin query failed: fetching todos: upstream down"
        );
    }
}
