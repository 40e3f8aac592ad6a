//! One-shot user-facing warnings
//!
//! Each warning gets a stable identifier derived from what it is about. While
//! that identifier is the active one for its kind, raising it again is a
//! no-op, so a wallet repeating the same notification shows one warning.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use sha2::{Digest, Sha256};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningKind {
    AccountSwitched,
    WrongNetwork,
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarningKind::AccountSwitched => write!(f, "account_switched"),
            WarningKind::WrongNetwork => write!(f, "wrong_network"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserWarning {
    /// Stable identifier, identical for identical conditions
    pub id: String,
    pub kind: WarningKind,
    pub message: String,
}

/// Stable warning identifier: first 8 bytes of SHA-256("<kind>:<subject>")
pub fn warning_id(kind: WarningKind, subject: &str) -> String {
    let preimage = format!("{}:{}", kind, subject.to_lowercase());
    let hash = Sha256::digest(preimage.as_bytes());
    hash[..8].iter().map(|b| format!("{:02x}", b)).collect()
}

/// Where user-facing warnings go
pub trait WarningSink: Send + Sync {
    fn warn(&self, warning: &UserWarning);
}

/// Logs warnings; the default when no UI sink is wired in
#[derive(Debug, Default)]
pub struct TracingSink;

impl WarningSink for TracingSink {
    fn warn(&self, warning: &UserWarning) {
        warn!(id = %warning.id, kind = %warning.kind, "{}", warning.message);
    }
}

/// Collects warnings in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    warnings: Mutex<Vec<UserWarning>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warnings(&self) -> Vec<UserWarning> {
        self.warnings
            .lock()
            .map(|w| w.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    pub fn count(&self, kind: WarningKind) -> usize {
        self.warnings().iter().filter(|w| w.kind == kind).count()
    }
}

impl WarningSink for RecordingSink {
    fn warn(&self, warning: &UserWarning) {
        let mut warnings = self.warnings.lock().unwrap_or_else(|e| e.into_inner());
        warnings.push(warning.clone());
    }
}

/// Tracks the active warning per kind
#[derive(Debug, Default)]
pub struct WarningDeduper {
    active: HashMap<WarningKind, String>,
}

impl WarningDeduper {
    /// Returns the warning to show, or `None` if it is already showing
    pub fn raise(
        &mut self,
        kind: WarningKind,
        subject: &str,
        message: impl Into<String>,
    ) -> Option<UserWarning> {
        let id = warning_id(kind, subject);
        if self.active.get(&kind) == Some(&id) {
            return None;
        }

        self.active.insert(kind, id.clone());
        Some(UserWarning {
            id,
            kind,
            message: message.into(),
        })
    }

    /// The condition behind `kind` has ended
    pub fn rearm(&mut self, kind: WarningKind) {
        self.active.remove(&kind);
    }

    pub fn rearm_all(&mut self) {
        self.active.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_id_is_stable() {
        let a = warning_id(WarningKind::WrongNetwork, "0x5");
        let b = warning_id(WarningKind::WrongNetwork, "0X5");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert_ne!(a, warning_id(WarningKind::AccountSwitched, "0x5"));
    }

    #[test]
    fn test_deduper() {
        let mut deduper = WarningDeduper::default();

        assert!(deduper.raise(WarningKind::WrongNetwork, "0x5", "wrong").is_some());
        assert!(deduper.raise(WarningKind::WrongNetwork, "0x5", "wrong").is_none());
        // Different subject is a new condition
        assert!(deduper.raise(WarningKind::WrongNetwork, "0x89", "wrong").is_some());
        // Kinds are independent
        assert!(deduper.raise(WarningKind::AccountSwitched, "0x89", "switched").is_some());

        deduper.rearm(WarningKind::WrongNetwork);
        assert!(deduper.raise(WarningKind::WrongNetwork, "0x89", "wrong").is_some());
    }

    #[test]
    fn test_recording_sink() {
        let sink = RecordingSink::new();
        let mut deduper = WarningDeduper::default();
        if let Some(w) = deduper.raise(WarningKind::WrongNetwork, "0x5", "wrong network") {
            sink.warn(&w);
        }
        assert_eq!(sink.count(WarningKind::WrongNetwork), 1);
        assert_eq!(sink.warnings()[0].message, "wrong network");
    }
}
