//! Scripted session replays
//!
//! A script describes the wallet the user has (or lacks), how they answer
//! prompts, and a sequence of user actions and wallet notifications. Replaying
//! it drives a real [`SessionMachine`] against a [`ScriptedAgent`].

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::agent::{AgentEvent, ScriptedAgent, StaticDetector, WalletAgent};
use crate::config::Config;
use crate::network::ChainId;
use crate::session::{SessionMachine, SessionSnapshot};
use crate::storage::MemoryStore;

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationScript {
    #[serde(default = "default_true")]
    pub wallet_present: bool,
    #[serde(default)]
    pub accounts: Vec<String>,
    #[serde(default = "default_chain_id")]
    pub chain_id: String,
    #[serde(default)]
    pub reject_accounts: bool,
    #[serde(default)]
    pub reject_switch: bool,
    #[serde(default)]
    pub reject_signing: bool,
    /// Networks the wallet has to add before it can switch to them
    #[serde(default)]
    pub unknown_networks: Vec<String>,
    pub steps: Vec<Step>,
}

fn default_true() -> bool {
    true
}

fn default_chain_id() -> String {
    "0x1".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    Connect,
    EnsureNetwork,
    GetToken,
    ClearToken,
    AccountsChanged { accounts: Vec<String> },
    ChainChanged { network_id: String },
    Disconnect,
}

impl Step {
    fn label(&self) -> String {
        match self {
            Step::Connect => "connect".to_string(),
            Step::EnsureNetwork => "ensure_network".to_string(),
            Step::GetToken => "get_token".to_string(),
            Step::ClearToken => "clear_token".to_string(),
            Step::AccountsChanged { accounts } => format!("accounts_changed {:?}", accounts),
            Step::ChainChanged { network_id } => format!("chain_changed {:?}", network_id),
            Step::Disconnect => "disconnect".to_string(),
        }
    }

    fn as_event(&self) -> Option<AgentEvent> {
        match self {
            Step::AccountsChanged { accounts } => Some(AgentEvent::AccountsChanged(accounts.clone())),
            Step::ChainChanged { network_id } => Some(AgentEvent::ChainChanged(network_id.clone())),
            Step::Disconnect => Some(AgentEvent::Disconnect),
            _ => None,
        }
    }
}

/// What one step did
#[derive(Debug, Clone)]
pub struct StepReport {
    pub step: String,
    pub outcome: String,
    pub snapshot: SessionSnapshot,
}

impl SimulationScript {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse script {}", path.display()))
    }

    fn build_agent(&self) -> Result<Arc<ScriptedAgent>> {
        let agent = ScriptedAgent::new(self.accounts.clone(), &self.chain_id);
        agent.reject_accounts(self.reject_accounts);
        agent.reject_switch(self.reject_switch);
        agent.reject_signing(self.reject_signing);
        for raw in &self.unknown_networks {
            let chain_id = ChainId::parse(raw)
                .with_context(|| format!("Invalid unknown_networks entry {:?}", raw))?;
            agent.require_add(chain_id);
        }
        Ok(Arc::new(agent))
    }
}

/// Replay `script` against a fresh session built from `config`
pub async fn run_script(config: &Config, script: &SimulationScript) -> Result<Vec<StepReport>> {
    let agent = script.build_agent()?;
    let detector = if script.wallet_present {
        StaticDetector::present(agent.clone() as Arc<dyn WalletAgent>)
    } else {
        StaticDetector::absent()
    };

    let machine = config
        .session_builder(Arc::new(MemoryStore::new()))?
        .detect(&detector);

    let mut reports = Vec::with_capacity(script.steps.len());
    for step in &script.steps {
        let outcome = run_step(&machine, &agent, script.wallet_present, step).await;
        let processed = machine.drain_events().await;
        debug!("Step {:?} queued {} notification(s)", step, processed);

        reports.push(StepReport {
            step: step.label(),
            outcome,
            snapshot: machine.snapshot().await,
        });
    }

    Ok(reports)
}

async fn run_step(
    machine: &SessionMachine,
    agent: &ScriptedAgent,
    wallet_present: bool,
    step: &Step,
) -> String {
    let result = match step {
        Step::Connect => machine.connect().await.map(|_| "ok".to_string()),
        Step::EnsureNetwork => machine.ensure_correct_network().await.map(|_| "ok".to_string()),
        Step::GetToken => machine.get_token().await.map(|token| match token {
            Some(token) => {
                let raw = token.as_str();
                format!("token {}...", &raw[..raw.len().min(16)])
            }
            None => "no token".to_string(),
        }),
        Step::ClearToken => machine.clear_token().map(|_| "ok".to_string()),
        Step::AccountsChanged { .. } | Step::ChainChanged { .. } | Step::Disconnect => {
            let Some(event) = step.as_event() else {
                return "ok".to_string();
            };
            if !wallet_present {
                warn!("No wallet present, dropping {:?}", event);
                return "skipped (no wallet)".to_string();
            }
            agent.emit(event);
            Ok("ok".to_string())
        }
    };

    result.unwrap_or_else(|e| format!("error: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ErrorPolicy;

    fn script(json: &str) -> SimulationScript {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_parse_steps() {
        let s = script(
            r#"{
                "accounts": ["0xABC"],
                "steps": [
                    {"step": "connect"},
                    {"step": "chain_changed", "network_id": "0x5"},
                    {"step": "accounts_changed", "accounts": []},
                    {"step": "disconnect"}
                ]
            }"#,
        );
        assert!(s.wallet_present);
        assert_eq!(s.chain_id, "0x1");
        assert_eq!(s.steps[1], Step::ChainChanged { network_id: "0x5".into() });
        assert_eq!(s.steps[2], Step::AccountsChanged { accounts: vec![] });
    }

    #[tokio::test]
    async fn test_run_connected_session() {
        let s = script(
            r#"{
                "accounts": ["0xABC"],
                "chain_id": "0x5",
                "steps": [
                    {"step": "connect"},
                    {"step": "get_token"},
                    {"step": "chain_changed", "network_id": "0x89"},
                    {"step": "disconnect"}
                ]
            }"#,
        );

        let reports = run_script(&Config::default(), &s).await.unwrap();
        assert_eq!(reports.len(), 4);

        assert_eq!(reports[0].outcome, "ok");
        assert_eq!(reports[0].snapshot.network_id, "0x1");
        assert!(reports[0].snapshot.is_network_correct);
        assert!(reports[1].outcome.starts_with("token "));
        assert!(!reports[2].snapshot.is_network_correct);
        assert_eq!(reports[3].snapshot.address, "");
    }

    #[tokio::test]
    async fn test_run_without_wallet() {
        let s = script(
            r#"{
                "wallet_present": false,
                "steps": [
                    {"step": "connect"},
                    {"step": "chain_changed", "network_id": "0x1"},
                    {"step": "get_token"}
                ]
            }"#,
        );

        let reports = run_script(&Config::default(), &s).await.unwrap();
        assert_eq!(reports[0].outcome, "ok");
        assert_eq!(reports[1].outcome, "skipped (no wallet)");
        assert_eq!(reports[2].outcome, "no token");
        assert!(reports.iter().all(|r| !r.snapshot.is_wallet_available));
    }

    #[tokio::test]
    async fn test_run_reports_errors_per_policy() {
        let s = script(
            r#"{
                "accounts": ["0xABC"],
                "reject_accounts": true,
                "steps": [{"step": "connect"}]
            }"#,
        );

        let reports = run_script(&Config::default(), &s).await.unwrap();
        assert!(reports[0].outcome.starts_with("error: Request rejected by user"));

        let mut config = Config::default();
        config.session.action_errors = ErrorPolicy::Swallow;
        let reports = run_script(&config, &s).await.unwrap();
        assert_eq!(reports[0].outcome, "ok");
        assert_eq!(reports[0].snapshot.address, "");
    }
}
