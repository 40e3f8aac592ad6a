//! Wallet session state machine
//!
//! Reconciles three externally driven facts (wallet presence, current
//! address, current network) with the user actions `connect` and
//! `ensure_correct_network`, and keeps a signed session token cached
//! alongside.
//!
//! # Architecture
//!
//! ```text
//! WalletAgent ──events──▶ SessionMachine ──watch──▶ SessionSnapshot
//!      ▲                    │      │
//!      └──requests──────────┘      ├─▶ NetworkValidator
//!                                  └─▶ TokenIssuer / TokenCache
//! ```
//!
//! # Single writer
//!
//! All session mutation happens under one write lock, one notification or
//! one completed action at a time. Wallet prompts are awaited without the
//! lock held, so notifications keep flowing while the user decides.

pub mod machine;
pub mod warnings;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use machine::{SessionBuilder, SessionMachine};
pub use warnings::{RecordingSink, TracingSink, UserWarning, WarningKind, WarningSink};

/// What to do when a user action (`connect`, `ensure_correct_network`) fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Return the error to the caller
    #[default]
    Propagate,
    /// Log the error and report success; state is left unchanged
    Swallow,
}

/// Construction-time session options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOptions {
    /// Validate the network on every chain change. When off, chain changes
    /// only record the new network id.
    #[serde(default = "default_true")]
    pub auto_validate_network_on_chain_change: bool,

    /// Surface account-switch and wrong-network warnings to the user
    #[serde(default)]
    pub emit_user_facing_warnings: bool,

    /// Failure policy shared by `connect` and `ensure_correct_network`
    #[serde(default)]
    pub action_errors: ErrorPolicy,
}

fn default_true() -> bool {
    true
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            auto_validate_network_on_chain_change: true,
            emit_user_facing_warnings: false,
            action_errors: ErrorPolicy::Propagate,
        }
    }
}

/// Mutable session facts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalletSession {
    /// Empty when disconnected
    pub address: String,
    /// Empty when unknown
    pub network_id: String,
    pub is_network_correct: bool,
    pub is_wallet_available: bool,
}

impl WalletSession {
    /// Drop everything the agent told us about the connection
    pub fn clear_connection(&mut self) {
        self.address.clear();
        self.network_id.clear();
        self.is_network_correct = false;
    }
}

/// Read-only view handed to consumers
pub type SessionSnapshot = WalletSession;

/// Informal state derived from the session facts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No wallet capability detected
    Unavailable,
    /// Wallet present, no address
    Idle,
    /// Address known
    Connected { network_valid: bool },
}

impl WalletSession {
    pub fn phase(&self) -> Phase {
        if !self.is_wallet_available {
            Phase::Unavailable
        } else if self.address.is_empty() {
            Phase::Idle
        } else {
            Phase::Connected {
                network_valid: self.is_network_correct,
            }
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Unavailable => write!(f, "unavailable"),
            Phase::Idle => write!(f, "idle"),
            Phase::Connected { network_valid: true } => write!(f, "connected"),
            Phase::Connected {
                network_valid: false,
            } => write!(f, "connected (wrong network)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase() {
        let mut session = WalletSession::default();
        assert_eq!(session.phase(), Phase::Unavailable);

        session.is_wallet_available = true;
        assert_eq!(session.phase(), Phase::Idle);

        session.address = "0xabc".into();
        assert_eq!(session.phase(), Phase::Connected { network_valid: false });

        session.network_id = "0x1".into();
        session.is_network_correct = true;
        assert_eq!(session.phase().to_string(), "connected");

        session.clear_connection();
        assert_eq!(session.phase(), Phase::Idle);
        assert!(session.network_id.is_empty());
    }

    #[test]
    fn test_options_deserialize_defaults() {
        let options: SessionOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, SessionOptions::default());

        let options: SessionOptions =
            serde_json::from_str(r#"{"action_errors": "swallow", "emit_user_facing_warnings": true}"#)
                .unwrap();
        assert_eq!(options.action_errors, ErrorPolicy::Swallow);
        assert!(options.emit_user_facing_warnings);
        assert!(options.auto_validate_network_on_chain_change);
    }
}
