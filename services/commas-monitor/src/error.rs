//! Error taxonomy for the 3Commas client and poll coordinator

/// Errors raised by a single API call
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// 401/403 from the API, or a request that could not be signed.
    /// Terminal for the session until the credentials are replaced.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Timeout, connection failure, or any other non-2xx status
    #[error("Communication error: {0}")]
    Communication(String),

    /// Anything else (undecodable body, request build failure, ...)
    #[error("Unexpected client error: {0}")]
    Unexpected(#[source] BoxError),
}

/// Original cause carried by [`ClientError::Unexpected`]
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

impl ClientError {
    pub fn is_auth(&self) -> bool {
        matches!(self, ClientError::Authentication(_))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ClientError::Communication(format!("Timeout error fetching information - {}", e))
        } else if e.is_connect() || e.is_request() || e.is_body() || e.is_status() {
            ClientError::Communication(format!("Error fetching information - {}", e))
        } else {
            ClientError::Unexpected(Box::new(e))
        }
    }
}

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Outcome of a failed poll cycle, as seen by the host
#[derive(Debug, Clone, thiserror::Error)]
pub enum UpdateError {
    /// Credentials were rejected; polling stops until re-authentication
    #[error("Re-authentication required: {0}")]
    AuthFailed(String),

    /// Transient failure; the previous snapshot stays current
    #[error("Update failed: {0}")]
    UpdateFailed(String),
}

impl From<ClientError> for UpdateError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Authentication(msg) => UpdateError::AuthFailed(msg),
            other => UpdateError::UpdateFailed(other.to_string()),
        }
    }
}
