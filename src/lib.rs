//! Wallet Session Library
//!
//! Client-side session state for a browser wallet: connection tracking,
//! expected-network validation and a cached, wallet-signed session token.

pub mod agent;
pub mod cli;
pub mod config;
pub mod error;
pub mod network;
pub mod session;
pub mod storage;
pub mod token;

// Re-export commonly used types
pub use agent::{AgentDetector, AgentEvent, WalletAgent};
pub use config::Config;
pub use error::{Error, Result};
pub use session::{SessionBuilder, SessionMachine, SessionSnapshot};
pub use token::SessionToken;
