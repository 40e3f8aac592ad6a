//! Scriptable in-memory wallet agent
//!
//! Behaves like a browser wallet that the user answers instantly: requests
//! succeed or are rejected according to flags set up front, and notifications
//! are pushed explicitly with [`ScriptedAgent::emit`]. Used by tests and by
//! the `simulate` CLI command.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{AgentEvent, EventKind, EventSender, MessageSigner, WalletAgent};
use crate::error::{Error, Result};
use crate::network::{ChainId, NetworkParams};

/// Number of requests the agent has served
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub request_accounts: usize,
    pub switch_network: usize,
    pub add_network: usize,
    pub sign_message: usize,
    pub subscribe: usize,
}

#[derive(Default)]
struct AgentState {
    accounts: Vec<String>,
    chain_id: String,
    unknown_networks: HashSet<ChainId>,
    reject_accounts: bool,
    reject_switch: bool,
    reject_signing: bool,
    fail_subscribe: bool,
    subscribers: Vec<(EventKind, EventSender)>,
    calls: CallCounts,
}

pub struct ScriptedAgent {
    state: Mutex<AgentState>,
    sign_calls: Arc<AtomicUsize>,
}

impl ScriptedAgent {
    pub fn new(accounts: Vec<String>, chain_id: &str) -> Self {
        Self {
            state: Mutex::new(AgentState {
                accounts,
                chain_id: chain_id.to_string(),
                ..Default::default()
            }),
            sign_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AgentState> {
        // A panicking test thread must not poison the agent for the others
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// User declines the account prompt
    pub fn reject_accounts(&self, reject: bool) {
        self.lock().reject_accounts = reject;
    }

    /// User declines network switch and add prompts
    pub fn reject_switch(&self, reject: bool) {
        self.lock().reject_switch = reject;
    }

    /// User declines signing prompts
    pub fn reject_signing(&self, reject: bool) {
        self.lock().reject_signing = reject;
    }

    /// Subscriptions fail, simulating a broken agent object
    pub fn fail_subscribe(&self, fail: bool) {
        self.lock().fail_subscribe = fail;
    }

    /// `chain_id` must be added before the agent can switch to it
    pub fn require_add(&self, chain_id: ChainId) {
        self.lock().unknown_networks.insert(chain_id);
    }

    pub fn current_chain_id(&self) -> String {
        self.lock().chain_id.clone()
    }

    pub fn calls(&self) -> CallCounts {
        let mut calls = self.lock().calls;
        calls.sign_message = self.sign_calls.load(Ordering::SeqCst);
        calls
    }

    /// Push a notification to every handler subscribed to its kind
    ///
    /// The agent's own view (accounts, chain) is updated first, like a real
    /// wallet that announces a change it has already made.
    pub fn emit(&self, event: AgentEvent) -> usize {
        let mut state = self.lock();

        match &event {
            AgentEvent::AccountsChanged(accounts) => state.accounts = accounts.clone(),
            AgentEvent::ChainChanged(chain_id) => state.chain_id = chain_id.clone(),
            AgentEvent::Disconnect => state.accounts.clear(),
        }

        let kind = event.kind();
        state.subscribers.retain(|(_, tx)| !tx.is_closed());

        let mut delivered = 0;
        for (_, tx) in state.subscribers.iter().filter(|(k, _)| *k == kind) {
            if tx.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }

        debug!("Emitted {} to {} handler(s)", kind, delivered);
        delivered
    }
}

#[async_trait]
impl WalletAgent for ScriptedAgent {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn request_accounts(&self) -> Result<Vec<String>> {
        let mut state = self.lock();
        state.calls.request_accounts += 1;

        if state.reject_accounts {
            return Err(Error::UserRejected("account access denied".to_string()));
        }
        Ok(state.accounts.clone())
    }

    async fn chain_id(&self) -> Result<String> {
        Ok(self.lock().chain_id.clone())
    }

    async fn switch_network(&self, chain_id: ChainId) -> Result<()> {
        {
            let mut state = self.lock();
            state.calls.switch_network += 1;

            if state.reject_switch {
                return Err(Error::UserRejected("network switch denied".to_string()));
            }
            if state.unknown_networks.contains(&chain_id) {
                return Err(Error::UnrecognizedNetwork(chain_id.to_hex()));
            }
        }

        self.emit(AgentEvent::ChainChanged(chain_id.to_hex()));
        Ok(())
    }

    async fn add_network(&self, params: &NetworkParams) -> Result<()> {
        let mut state = self.lock();
        state.calls.add_network += 1;

        if state.reject_switch {
            return Err(Error::UserRejected("add network denied".to_string()));
        }

        let chain_id = ChainId::parse(&params.chain_id)?;
        state.unknown_networks.remove(&chain_id);
        Ok(())
    }

    fn signer(&self) -> Result<Arc<dyn MessageSigner>> {
        let state = self.lock();
        let address = state.accounts.first().cloned().ok_or(Error::NoAccounts)?;

        Ok(Arc::new(ScriptedSigner {
            address,
            reject: state.reject_signing,
            calls: Arc::clone(&self.sign_calls),
        }))
    }

    fn subscribe(&self, kind: EventKind, handler: EventSender) -> Result<()> {
        let mut state = self.lock();
        state.calls.subscribe += 1;

        if state.fail_subscribe {
            return Err(Error::Agent(format!("cannot subscribe to {}", kind)));
        }

        state.subscribers.push((kind, handler));
        Ok(())
    }
}

/// Deterministic signer: SHA-256 over address and message
struct ScriptedSigner {
    address: String,
    reject: bool,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl MessageSigner for ScriptedSigner {
    async fn sign_message(&self, message: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.reject {
            return Err(Error::UserRejected("signature denied".to_string()));
        }

        let mut hasher = Sha256::new();
        hasher.update(self.address.as_bytes());
        hasher.update(b"\n");
        hasher.update(message.as_bytes());
        let digest = hasher.finalize();

        let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        Ok(format!("0x{}", hex))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_emit_reaches_matching_subscribers_only() {
        let agent = ScriptedAgent::new(vec!["0xabc".into()], "0x1");
        let (tx, mut rx) = mpsc::unbounded_channel();
        agent.subscribe(EventKind::ChainChanged, tx).unwrap();

        assert_eq!(agent.emit(AgentEvent::Disconnect), 0);
        assert_eq!(agent.emit(AgentEvent::ChainChanged("0x5".into())), 1);

        assert_eq!(rx.recv().await, Some(AgentEvent::ChainChanged("0x5".into())));
        assert_eq!(agent.current_chain_id(), "0x5");
    }

    #[tokio::test]
    async fn test_signer_is_deterministic_and_counted() {
        let agent = ScriptedAgent::new(vec!["0xabc".into()], "0x1");
        let signer = agent.signer().unwrap();

        let a = signer.sign_message("hello").await.unwrap();
        let b = signer.sign_message("hello").await.unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("0x"));
        assert_eq!(a.len(), 66);
        assert_eq!(agent.calls().sign_message, 2);
    }

    #[tokio::test]
    async fn test_rejections() {
        let agent = ScriptedAgent::new(vec!["0xabc".into()], "0x1");
        agent.reject_accounts(true);
        agent.reject_signing(true);

        assert!(agent.request_accounts().await.unwrap_err().is_user_rejection());
        let signer = agent.signer().unwrap();
        assert!(signer.sign_message("hi").await.unwrap_err().is_user_rejection());
    }

    #[test]
    fn test_signer_requires_account() {
        let agent = ScriptedAgent::new(vec![], "0x1");
        assert!(matches!(agent.signer(), Err(Error::NoAccounts)));
    }
}
