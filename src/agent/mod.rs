//! Wallet agent contract
//!
//! The wallet agent is the external, user-controlled wallet (browser
//! extension or equivalent). This module only describes what the session
//! needs from it:
//!
//! ```text
//! AgentDetector ──detect──▶ WalletAgent ──subscribe──▶ AgentEvent channel
//!                               │
//!                               ├─ request_accounts / chain_id
//!                               ├─ switch_network / add_network
//!                               └─ signer ──▶ MessageSigner::sign_message
//! ```
//!
//! Every request may suspend for as long as the user takes to answer the
//! wallet prompt. There is no timeout and no cancellation.

pub mod scripted;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::network::{ChainId, NetworkParams};

pub use scripted::{CallCounts, ScriptedAgent};

/// Notification categories an agent pushes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AccountsChanged,
    ChainChanged,
    Disconnect,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [
        EventKind::AccountsChanged,
        EventKind::ChainChanged,
        EventKind::Disconnect,
    ];
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::AccountsChanged => write!(f, "accountsChanged"),
            EventKind::ChainChanged => write!(f, "chainChanged"),
            EventKind::Disconnect => write!(f, "disconnect"),
        }
    }
}

/// Notification pushed by the agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    /// Accounts exposed to the session changed (may be empty)
    AccountsChanged(Vec<String>),
    /// Active network changed
    ChainChanged(String),
    /// Agent lost its connection
    Disconnect,
}

impl AgentEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            AgentEvent::AccountsChanged(_) => EventKind::AccountsChanged,
            AgentEvent::ChainChanged(_) => EventKind::ChainChanged,
            AgentEvent::Disconnect => EventKind::Disconnect,
        }
    }
}

/// Handler side of a subscription
pub type EventSender = mpsc::UnboundedSender<AgentEvent>;

/// Something that can sign a text message on behalf of the connected account
#[async_trait]
pub trait MessageSigner: Send + Sync {
    /// Sign `message`, returning the signature string
    async fn sign_message(&self, message: &str) -> Result<String>;
}

/// The external wallet agent
#[async_trait]
pub trait WalletAgent: Send + Sync {
    /// Agent name for logging
    fn name(&self) -> &str {
        "wallet"
    }

    /// Ask the user to expose their accounts
    async fn request_accounts(&self) -> Result<Vec<String>>;

    /// Currently active network id, as the agent reports it
    async fn chain_id(&self) -> Result<String>;

    /// Ask the user to switch to `chain_id`
    ///
    /// Fails with [`Error::UnrecognizedNetwork`] if the agent does not know the
    /// network and it has to be added first.
    async fn switch_network(&self, chain_id: ChainId) -> Result<()>;

    /// Ask the user to add a network to the agent
    async fn add_network(&self, params: &NetworkParams) -> Result<()>;

    /// Signer bound to the currently selected account
    fn signer(&self) -> Result<Arc<dyn MessageSigner>>;

    /// Register `handler` for notifications of `kind`
    ///
    /// Subscriptions last for the life of the agent; there is no unsubscribe.
    fn subscribe(&self, kind: EventKind, handler: EventSender) -> Result<()>;
}

/// One-time wallet detection
pub trait AgentDetector: Send + Sync {
    /// `Ok(None)` when no wallet capability is present
    fn detect(&self) -> Result<Option<Arc<dyn WalletAgent>>>;
}

/// Detector returning a fixed answer
pub struct StaticDetector(pub Option<Arc<dyn WalletAgent>>);

impl StaticDetector {
    pub fn present(agent: Arc<dyn WalletAgent>) -> Self {
        Self(Some(agent))
    }

    pub fn absent() -> Self {
        Self(None)
    }
}

impl AgentDetector for StaticDetector {
    fn detect(&self) -> Result<Option<Arc<dyn WalletAgent>>> {
        Ok(self.0.clone())
    }
}

impl<F> AgentDetector for F
where
    F: Fn() -> Result<Option<Arc<dyn WalletAgent>>> + Send + Sync,
{
    fn detect(&self) -> Result<Option<Arc<dyn WalletAgent>>> {
        self()
    }
}

/// Request accounts and return the primary one
pub async fn request_primary_account(agent: &dyn WalletAgent) -> Result<String> {
    let accounts = agent.request_accounts().await?;
    let address = accounts.into_iter().next().ok_or(Error::NoAccounts)?;

    debug!("{} exposed account {}", agent.name(), address);
    Ok(address)
}

/// Switch the agent to `target` unless it is already there
///
/// If the agent does not know `target` and `params` are given, the network is
/// added and the switch retried once. Returns the network id the agent is on
/// afterwards.
pub async fn change_network_if_needed(
    agent: &dyn WalletAgent,
    target: ChainId,
    params: Option<&NetworkParams>,
) -> Result<String> {
    let current = agent.chain_id().await?;

    // A malformed current id just means "not the target"
    if matches!(ChainId::parse(&current), Ok(id) if id == target) {
        debug!("{} already on network {}", agent.name(), current);
        return Ok(current);
    }

    info!(
        "Requesting network switch from {:?} to {}",
        current,
        target.to_hex()
    );

    match agent.switch_network(target).await {
        Ok(()) => {}
        Err(Error::UnrecognizedNetwork(id)) => {
            let Some(params) = params else {
                return Err(Error::UnrecognizedNetwork(id));
            };

            warn!(
                "{} does not know network {}, requesting to add {}",
                agent.name(),
                id,
                params.chain_name
            );
            agent.add_network(params).await?;
            agent.switch_network(target).await?;
        }
        Err(e) => return Err(e),
    }

    Ok(target.to_hex())
}
