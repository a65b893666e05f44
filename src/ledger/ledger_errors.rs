use solana_client::client_error::ClientError;
use thiserror::Error;

/// Failure kinds of a remote ledger call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// Rate limiting, worth retrying after a backoff
    #[error("Rate limit exceeded (endpoint: {endpoint})")]
    RateLimited { endpoint: String },

    /// Anything else; not retried
    #[error("RPC error: {message} (endpoint: {endpoint})")]
    Generic { endpoint: String, message: String },
}

/// How a client error should be treated by the block fetch path
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Classified {
    /// The slot holds no block (skipped, pruned or not yet available)
    MissingBlock,
    Error(LedgerError),
}

impl LedgerError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::RateLimited { .. })
    }

    pub fn endpoint(&self) -> &str {
        match self {
            LedgerError::RateLimited { endpoint } => endpoint,
            LedgerError::Generic { endpoint, .. } => endpoint,
        }
    }

    /// Create from ClientError with context
    pub fn from_client_error(err: &ClientError, endpoint: &str) -> Self {
        match classify_message(&err.to_string(), endpoint) {
            Classified::Error(e) => e,
            Classified::MissingBlock => LedgerError::Generic {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            },
        }
    }
}

/// JSON-RPC codes the ledger uses for slots without a retrievable block
const MISSING_BLOCK_CODES: [&str; 3] = ["-32004", "-32007", "-32009"];

/// Phrases that identify an HTTP 429 or a provider throttle. Bare digits are
/// not enough: slot and block numbers routinely contain "429".
const RATE_LIMIT_MARKERS: [&str; 5] = [
    "(429",
    "status: 429",
    "429 too many requests",
    "too many requests",
    "rate limit",
];

/// Classify based on error message
pub(crate) fn classify_message(message: &str, endpoint: &str) -> Classified {
    let lower = message.to_lowercase();

    if lower.contains("was skipped")
        || lower.contains("not available")
        || MISSING_BLOCK_CODES.iter().any(|code| lower.contains(code))
    {
        return Classified::MissingBlock;
    }

    if RATE_LIMIT_MARKERS.iter().any(|marker| lower.contains(marker)) {
        return Classified::Error(LedgerError::RateLimited {
            endpoint: endpoint.to_string(),
        });
    }

    Classified::Error(LedgerError::Generic {
        endpoint: endpoint.to_string(),
        message: message.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_is_retryable() {
        let classified = classify_message("HTTP status client error (429 Too Many Requests)", "rpc");
        match classified {
            Classified::Error(err) => {
                assert!(err.is_retryable());
                assert_eq!(err.endpoint(), "rpc");
            }
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn test_skipped_slot_is_missing_block() {
        let msg = "RPC response error -32007: Slot 1234 was skipped, or missing due to ledger jump to recent snapshot";
        assert_eq!(classify_message(msg, "rpc"), Classified::MissingBlock);

        let msg = "RPC response error -32004: Block not available for slot 99";
        assert_eq!(classify_message(msg, "rpc"), Classified::MissingBlock);
    }

    #[test]
    fn test_other_errors_are_generic() {
        match classify_message("connection refused", "rpc") {
            Classified::Error(err) => assert!(!err.is_retryable()),
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn test_slot_numbers_containing_429_are_not_rate_limits() {
        let msg = "RPC response error -32007: Slot 314294290 was skipped, or missing due to ledger jump to recent snapshot";
        assert_eq!(classify_message(msg, "rpc"), Classified::MissingBlock);

        let msg = "RPC response error -32001: Block 271429001 cleaned up, does not exist on node. First available block: 271500000";
        match classify_message(msg, "rpc") {
            Classified::Error(err) => assert!(!err.is_retryable()),
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn test_rate_limit_wording_variants() {
        for msg in [
            "HTTP status client error (429 Too Many Requests) for url (https://api.mainnet-beta.solana.com/)",
            "server responded with status: 429",
            "Rate limit exceeded for this key",
        ] {
            match classify_message(msg, "rpc") {
                Classified::Error(err) => assert!(err.is_retryable(), "{msg}"),
                other => panic!("unexpected classification for {msg}: {:?}", other),
            }
        }
    }
}
