//! Error types for the wallet session

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the wallet session
#[derive(Error, Debug)]
pub enum Error {
    // Wallet agent errors
    /// No agent was detected. Never returned: the session records it as
    /// `is_wallet_available = false` and actions become no-ops.
    #[error("Wallet agent not available")]
    WalletUnavailable,

    #[error("Request rejected by user: {0}")]
    UserRejected(String),

    #[error("Wallet agent returned no accounts")]
    NoAccounts,

    #[error("Wallet agent does not recognize network {0}")]
    UnrecognizedNetwork(String),

    #[error("Wallet agent error: {0}")]
    Agent(String),

    #[error("Wallet detection failed: {0}")]
    DetectionFailure(String),

    // Network errors
    #[error("Malformed network identifier: {0:?}")]
    MalformedIdentifier(String),

    // Token errors
    #[error("Message signing failed: {0}")]
    Signing(String),

    #[error("Invalid session token: {0}")]
    InvalidToken(String),

    // Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if the user (or the agent on their behalf) declined the request
    pub fn is_user_rejection(&self) -> bool {
        matches!(self, Error::UserRejected(_))
    }

    /// Check if this error is always converted into session state
    /// and never handed back to a caller
    pub fn is_absorbed(&self) -> bool {
        matches!(
            self,
            Error::WalletUnavailable | Error::MalformedIdentifier(_) | Error::DetectionFailure(_)
        )
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

// Conversion from base64 errors
impl From<base64::DecodeError> for Error {
    fn from(e: base64::DecodeError) -> Self {
        Error::InvalidToken(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absorbed_errors() {
        assert!(Error::WalletUnavailable.is_absorbed());
        assert!(Error::MalformedIdentifier("0xzz".into()).is_absorbed());
        assert!(Error::DetectionFailure("boom".into()).is_absorbed());
        assert!(!Error::UserRejected("denied".into()).is_absorbed());
    }

    #[test]
    fn test_user_rejection() {
        assert!(Error::UserRejected("denied".into()).is_user_rejection());
        assert!(!Error::Agent("timeout".into()).is_user_rejection());
    }

    #[test]
    fn test_malformed_identifier_display() {
        let err = Error::MalformedIdentifier("0xdead!".into());
        assert_eq!(err.to_string(), "Malformed network identifier: \"0xdead!\"");
    }
}
