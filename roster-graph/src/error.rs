use roster_core::ConfigError;
use roster_sync::RemoteError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("token request failed: {0}")]
    Token(String),

    #[error("token response has no access_token")]
    MissingAccessToken,

    #[error("invalid base URL '{0}'")]
    BaseUrl(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<GraphError> for RemoteError {
    fn from(err: GraphError) -> Self {
        RemoteError::Auth(err.to_string())
    }
}
