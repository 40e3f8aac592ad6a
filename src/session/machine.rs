//! Session state machine
//!
//! Built with [`SessionBuilder`], which runs wallet detection exactly once.
//! After that the machine lives for the rest of the process, cycling between
//! idle and connected as the user acts and the agent pushes notifications.

use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::warnings::{TracingSink, UserWarning, WarningDeduper, WarningKind, WarningSink};
use super::{ErrorPolicy, SessionOptions, SessionSnapshot, WalletSession};
use crate::agent::{self, AgentDetector, AgentEvent, EventKind, WalletAgent};
use crate::error::{Error, Result};
use crate::network::{NetworkParams, NetworkValidator};
use crate::token::{SessionToken, TokenCache, TokenIssuer};

/// Collects session dependencies ahead of detection
pub struct SessionBuilder {
    options: SessionOptions,
    validator: NetworkValidator,
    issuer: TokenIssuer,
    cache: TokenCache,
    network_params: Option<NetworkParams>,
    sink: Arc<dyn WarningSink>,
}

impl SessionBuilder {
    pub fn new(validator: NetworkValidator, issuer: TokenIssuer, cache: TokenCache) -> Self {
        Self {
            options: SessionOptions::default(),
            validator,
            issuer,
            cache,
            network_params: None,
            sink: Arc::new(TracingSink),
        }
    }

    pub fn options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Parameters offered to the agent when it does not know the expected network
    pub fn network_params(mut self, params: NetworkParams) -> Self {
        self.network_params = Some(params);
        self
    }

    pub fn warning_sink(mut self, sink: Arc<dyn WarningSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Run the one-time detection step and build the machine
    ///
    /// Never fails: a missing wallet or a detection error both produce a
    /// machine with `is_wallet_available == false`.
    pub fn detect(self, detector: &dyn AgentDetector) -> SessionMachine {
        let mut session = WalletSession::default();

        let (agent, events) = match bind_agent(detector) {
            Ok(Some((agent, events))) => {
                info!("Wallet agent {:?} detected", agent.name());
                session.is_wallet_available = true;
                (Some(agent), Some(events))
            }
            Ok(None) => {
                info!("No wallet agent detected");
                (None, None)
            }
            Err(e) => {
                error!("Wallet detection failed: {}", e);
                (None, None)
            }
        };

        let (snapshot_tx, _) = watch::channel(session.clone());

        SessionMachine {
            inner: RwLock::new(Inner {
                session,
                warnings: WarningDeduper::default(),
            }),
            agent,
            events: Mutex::new(events),
            token_guard: Mutex::new(()),
            options: self.options,
            validator: self.validator,
            issuer: self.issuer,
            cache: self.cache,
            network_params: self.network_params,
            sink: self.sink,
            snapshot_tx,
        }
    }
}

/// Detect the agent and register all three subscriptions on one channel
///
/// Nothing is bound unless every subscription succeeds.
fn bind_agent(
    detector: &dyn AgentDetector,
) -> Result<Option<(Arc<dyn WalletAgent>, mpsc::UnboundedReceiver<AgentEvent>)>> {
    let detected = detector
        .detect()
        .map_err(|e| Error::DetectionFailure(e.to_string()))?;
    let Some(agent) = detected else {
        return Ok(None);
    };

    let (tx, rx) = mpsc::unbounded_channel();
    for kind in EventKind::ALL {
        agent
            .subscribe(kind, tx.clone())
            .map_err(|e| Error::DetectionFailure(format!("subscribe {}: {}", kind, e)))?;
    }

    Ok(Some((agent, rx)))
}

struct Inner {
    session: WalletSession,
    warnings: WarningDeduper,
}

pub struct SessionMachine {
    inner: RwLock<Inner>,
    agent: Option<Arc<dyn WalletAgent>>,
    events: Mutex<Option<mpsc::UnboundedReceiver<AgentEvent>>>,
    /// Serializes token issuance so concurrent callers sign once
    token_guard: Mutex<()>,
    options: SessionOptions,
    validator: NetworkValidator,
    issuer: TokenIssuer,
    cache: TokenCache,
    network_params: Option<NetworkParams>,
    sink: Arc<dyn WarningSink>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

impl SessionMachine {
    pub fn is_wallet_available(&self) -> bool {
        self.agent.is_some()
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.inner.read().await.session.clone()
    }

    /// Receiver that observes every published state change
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Request accounts, move the agent to the expected network, and mark
    /// the session connected
    ///
    /// No-op when no wallet is available.
    pub async fn connect(&self) -> Result<()> {
        let Some(wallet) = &self.agent else {
            debug!("connect ignored: no wallet agent");
            return Ok(());
        };

        let outcome = async {
            let address = agent::request_primary_account(wallet.as_ref()).await?;
            let network_id = agent::change_network_if_needed(
                wallet.as_ref(),
                self.validator.expected(),
                self.network_params.as_ref(),
            )
            .await?;
            Ok::<_, Error>((address, network_id))
        }
        .await;

        match outcome {
            Ok((address, network_id)) => {
                info!("Connected {} on network {}", address, network_id);
                self.apply(|inner, _| {
                    inner.session.address = address;
                    inner.session.network_id = network_id;
                    inner.session.is_network_correct = true;
                    inner.warnings.rearm(WarningKind::WrongNetwork);
                })
                .await;
                Ok(())
            }
            Err(e) => self.settle_action("connect", e),
        }
    }

    /// Ask the agent to switch to the expected network if it is elsewhere
    ///
    /// State follows from the chain-changed notification the switch triggers.
    pub async fn ensure_correct_network(&self) -> Result<()> {
        let Some(wallet) = &self.agent else {
            debug!("ensure_correct_network ignored: no wallet agent");
            return Ok(());
        };

        match agent::change_network_if_needed(
            wallet.as_ref(),
            self.validator.expected(),
            self.network_params.as_ref(),
        )
        .await
        {
            Ok(network_id) => {
                debug!("Agent on network {}", network_id);
                Ok(())
            }
            Err(e) => self.settle_action("ensure_correct_network", e),
        }
    }

    /// Cached session token, or a freshly signed one
    ///
    /// Returns `None` without touching the cache when no wallet is bound.
    pub async fn get_token(&self) -> Result<Option<SessionToken>> {
        let Some(wallet) = &self.agent else {
            debug!("get_token ignored: no wallet agent");
            return Ok(None);
        };

        let _guard = self.token_guard.lock().await;

        match self.cache.get() {
            Ok(Some(token)) => {
                debug!("Using cached session token");
                return Ok(Some(token));
            }
            Ok(None) => {}
            // The fresh token overwrites the unreadable entry
            Err(e) => warn!("Cached session token unreadable, issuing a new one: {}", e),
        }

        let signer = wallet.signer()?;
        let issued = self.issuer.issue(signer.as_ref()).await?;
        self.cache.set(&issued)?;

        Ok(Some(issued.token))
    }

    /// Forget the cached token so the next `get_token` signs again
    pub fn clear_token(&self) -> Result<()> {
        self.cache.clear()
    }

    /// Apply one agent notification
    pub async fn handle_event(&self, event: AgentEvent) {
        debug!("Handling {:?}", event);

        match event {
            AgentEvent::AccountsChanged(accounts) => self.on_accounts_changed(accounts).await,
            AgentEvent::ChainChanged(network_id) => self.on_chain_changed(network_id).await,
            AgentEvent::Disconnect => self.on_disconnect().await,
        }
    }

    /// Apply every notification already queued, without waiting for more
    pub async fn drain_events(&self) -> usize {
        // Held for the whole drain so concurrent drains cannot reorder events
        let mut events = self.events.lock().await;
        let Some(rx) = events.as_mut() else {
            return 0;
        };

        let mut processed = 0;
        while let Ok(event) = rx.try_recv() {
            self.handle_event(event).await;
            processed += 1;
        }
        processed
    }

    /// Process notifications in arrival order until the agent goes away
    ///
    /// Takes ownership of the notification stream; a second concurrent call
    /// returns immediately.
    pub async fn run(&self) {
        let Some(mut rx) = self.events.lock().await.take() else {
            debug!("No notification stream to run");
            return;
        };

        info!("Session notification loop started");
        while let Some(event) = rx.recv().await {
            self.handle_event(event).await;
        }
        info!("Wallet agent notification stream closed");
    }

    /// An empty list clears only `address`; network facts stay as last reported
    async fn on_accounts_changed(&self, accounts: Vec<String>) {
        let warn_enabled = self.options.emit_user_facing_warnings;

        self.apply(|inner, warnings| {
            let next = accounts.into_iter().next().unwrap_or_default();
            let previous = std::mem::replace(&mut inner.session.address, next.clone());

            if next.is_empty() {
                info!("Wallet exposed no accounts, address cleared");
                inner.warnings.rearm(WarningKind::AccountSwitched);
                return;
            }

            if warn_enabled && !previous.is_empty() && !previous.eq_ignore_ascii_case(&next) {
                warnings.extend(inner.warnings.raise(
                    WarningKind::AccountSwitched,
                    &next,
                    format!("Wallet account switched from {} to {}", previous, next),
                ));
            }
        })
        .await;
    }

    async fn on_chain_changed(&self, network_id: String) {
        let auto_validate = self.options.auto_validate_network_on_chain_change;
        let warn_enabled = self.options.emit_user_facing_warnings;
        let expected = self.validator.expected();
        let verdict = self.validator.validate(&network_id);

        self.apply(|inner, warnings| {
            inner.session.network_id = network_id.clone();

            if network_id.is_empty() {
                inner.session.is_network_correct = false;
            }
            if !auto_validate {
                return;
            }

            match verdict {
                Ok(true) => {
                    inner.session.is_network_correct = true;
                    inner.warnings.rearm(WarningKind::WrongNetwork);
                }
                Ok(false) => {
                    inner.session.is_network_correct = false;
                    if warn_enabled {
                        warnings.extend(inner.warnings.raise(
                            WarningKind::WrongNetwork,
                            &network_id,
                            format!(
                                "Wallet is on network {}, expected {}",
                                network_id,
                                expected.to_hex()
                            ),
                        ));
                    }
                }
                Err(e) => {
                    warn!("Network validation failed: {}; clearing address", e);
                    inner.session.address.clear();
                    inner.session.is_network_correct = false;
                }
            }
        })
        .await;
    }

    async fn on_disconnect(&self) {
        info!("Wallet agent disconnected");
        self.apply(|inner, _| {
            inner.session.clear_connection();
            inner.warnings.rearm_all();
        })
        .await;
    }

    /// Mutate under the write lock, publish the result, then surface warnings
    async fn apply<F>(&self, mutate: F)
    where
        F: FnOnce(&mut Inner, &mut Vec<UserWarning>),
    {
        let mut warnings = Vec::new();
        let snapshot = {
            let mut inner = self.inner.write().await;
            mutate(&mut *inner, &mut warnings);
            inner.session.clone()
        };

        debug!(
            address = %snapshot.address,
            network = %snapshot.network_id,
            correct = snapshot.is_network_correct,
            "Session {}",
            snapshot.phase()
        );
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });

        for warning in &warnings {
            self.sink.warn(warning);
        }
    }

    fn settle_action(&self, action: &str, e: Error) -> Result<()> {
        match self.options.action_errors {
            ErrorPolicy::Propagate => Err(e),
            ErrorPolicy::Swallow => {
                error!("{} failed: {}", action, e);
                Ok(())
            }
        }
    }
}
