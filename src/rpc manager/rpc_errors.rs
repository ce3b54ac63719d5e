use solana_client::client_error::ClientError;
use thiserror::Error;

/// Errors surfaced by the chain RPC boundary
#[derive(Debug, Clone, Error)]
pub enum RpcManagerError {
    /// Transport-level errors (network, connection)
    #[error("Transport error: {message} (endpoint: {endpoint})")]
    Transport {
        endpoint: String,
        message: String,
    },

    /// Timeout errors
    #[error("Timeout after {timeout_ms}ms (endpoint: {endpoint})")]
    Timeout {
        endpoint: String,
        timeout_ms: u64,
    },

    /// RPC response errors (from the RPC server)
    #[error("RPC response error: {message} (endpoint: {endpoint}, code: {code:?})")]
    RpcResponse {
        endpoint: String,
        message: String,
        code: Option<i64>,
    },

    /// Rate limit exceeded
    #[error("Rate limit exceeded (endpoint: {endpoint})")]
    RateLimitExceeded {
        endpoint: String,
    },

    #[error("Blockhash not found (endpoint: {endpoint})")]
    BlockhashNotFound {
        endpoint: String,
    },

    #[error("Transaction expired (endpoint: {endpoint})")]
    TransactionExpired {
        endpoint: String,
    },

    #[error("Account not found: {account} (endpoint: {endpoint})")]
    AccountNotFound {
        account: String,
        endpoint: String,
    },

    #[error("Insufficient funds (endpoint: {endpoint})")]
    InsufficientFunds {
        endpoint: String,
    },

    /// Response arrived but could not be decoded into the expected shape
    #[error("Decode error: {0}")]
    Decode(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type RpcResult<T> = Result<T, RpcManagerError>;

impl RpcManagerError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            RpcManagerError::Transport { .. } => true,
            RpcManagerError::Timeout { .. } => true,
            RpcManagerError::RateLimitExceeded { .. } => true,
            RpcManagerError::BlockhashNotFound { .. } => true,

            RpcManagerError::TransactionExpired { .. } => false,
            RpcManagerError::AccountNotFound { .. } => false,
            RpcManagerError::InsufficientFunds { .. } => false,
            RpcManagerError::Decode(_) => false,
            RpcManagerError::Internal(_) => false,

            // Retry on server errors (5xx) only
            RpcManagerError::RpcResponse { code, .. } => {
                matches!(code, Some(c) if (500..600).contains(c))
            }
        }
    }

    /// Get the endpoint associated with this error, if any
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            RpcManagerError::Transport { endpoint, .. } => Some(endpoint),
            RpcManagerError::Timeout { endpoint, .. } => Some(endpoint),
            RpcManagerError::RpcResponse { endpoint, .. } => Some(endpoint),
            RpcManagerError::RateLimitExceeded { endpoint } => Some(endpoint),
            RpcManagerError::BlockhashNotFound { endpoint } => Some(endpoint),
            RpcManagerError::TransactionExpired { endpoint } => Some(endpoint),
            RpcManagerError::AccountNotFound { endpoint, .. } => Some(endpoint),
            RpcManagerError::InsufficientFunds { endpoint } => Some(endpoint),
            _ => None,
        }
    }

    /// Create from ClientError with context
    pub fn from_client_error(err: ClientError, endpoint: &str) -> Self {
        Self::classify(&err.to_string(), endpoint)
    }

    /// Classify a raw error message reported by an RPC node
    pub fn classify(message: &str, endpoint: &str) -> Self {
        let err_str = message.to_lowercase();
        let endpoint = endpoint.to_string();

        if err_str.contains("blockhash not found") {
            RpcManagerError::BlockhashNotFound { endpoint }
        } else if err_str.contains("transaction expired")
            || err_str.contains("block height exceeded")
        {
            RpcManagerError::TransactionExpired { endpoint }
        } else if err_str.contains("account not found") {
            RpcManagerError::AccountNotFound {
                account: "unknown".to_string(),
                endpoint,
            }
        } else if err_str.contains("insufficient funds")
            || err_str.contains("insufficient lamports")
        {
            RpcManagerError::InsufficientFunds { endpoint }
        } else if err_str.contains("rate limit")
            || err_str.contains("too many requests")
            || err_str.contains("429")
        {
            RpcManagerError::RateLimitExceeded { endpoint }
        } else if err_str.contains("timeout") || err_str.contains("timed out") {
            RpcManagerError::Timeout {
                endpoint,
                timeout_ms: 0,
            }
        } else if err_str.contains("connection")
            || err_str.contains("error sending request")
            || err_str.contains("dns")
        {
            RpcManagerError::Transport {
                endpoint,
                message: message.to_string(),
            }
        } else {
            // Extract error code if available
            let code = err_str
                .split("code:")
                .nth(1)
                .and_then(|s| s.split_whitespace().next())
                .and_then(|s| s.trim_matches(|c: char| !c.is_ascii_digit() && c != '-').parse::<i64>().ok());

            RpcManagerError::RpcResponse {
                endpoint,
                message: message.to_string(),
                code,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_retryable() {
        assert!(RpcManagerError::Transport {
            endpoint: "test".to_string(),
            message: "connection failed".to_string(),
        }
        .is_retryable());

        assert!(RpcManagerError::Timeout {
            endpoint: "test".to_string(),
            timeout_ms: 5000,
        }
        .is_retryable());

        assert!(RpcManagerError::BlockhashNotFound {
            endpoint: "test".to_string(),
        }
        .is_retryable());

        assert!(!RpcManagerError::InsufficientFunds {
            endpoint: "test".to_string(),
        }
        .is_retryable());

        assert!(!RpcManagerError::TransactionExpired {
            endpoint: "test".to_string(),
        }
        .is_retryable());
    }

    #[test]
    fn test_rpc_response_retry_only_on_server_errors() {
        let server = RpcManagerError::RpcResponse {
            endpoint: "e".to_string(),
            message: "bad gateway".to_string(),
            code: Some(502),
        };
        let client = RpcManagerError::RpcResponse {
            endpoint: "e".to_string(),
            message: "invalid params".to_string(),
            code: Some(-32602),
        };
        assert!(server.is_retryable());
        assert!(!client.is_retryable());
    }

    #[test]
    fn test_classify_messages() {
        assert!(matches!(
            RpcManagerError::classify("Blockhash not found", "e"),
            RpcManagerError::BlockhashNotFound { .. }
        ));
        assert!(matches!(
            RpcManagerError::classify("Transaction simulation failed: insufficient lamports 5, need 10", "e"),
            RpcManagerError::InsufficientFunds { .. }
        ));
        assert!(matches!(
            RpcManagerError::classify("HTTP status client error (429 Too Many Requests)", "e"),
            RpcManagerError::RateLimitExceeded { .. }
        ));
        assert!(matches!(
            RpcManagerError::classify("operation timed out", "e"),
            RpcManagerError::Timeout { .. }
        ));
        assert!(matches!(
            RpcManagerError::classify("error sending request for url", "e"),
            RpcManagerError::Transport { .. }
        ));
    }

    #[test]
    fn test_endpoint_extraction() {
        let err = RpcManagerError::classify("Blockhash not found", "https://rpc.example");
        assert_eq!(err.endpoint(), Some("https://rpc.example"));
        assert_eq!(RpcManagerError::Internal("x".into()).endpoint(), None);
    }
}
