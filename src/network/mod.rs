//! Network identification and validation
//!
//! Wallet agents report the active chain as a string, usually `0x`-prefixed
//! hex (`"0x1"`), sometimes decimal (`"1"`). Everything here turns that string
//! into a [`ChainId`] and compares it against the network the session expects.

pub mod validator;

pub use validator::{ChainId, NetworkParams, NativeCurrency, NetworkValidator};
