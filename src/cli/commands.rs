//! CLI command implementations

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use dialoguer::Confirm;
use tracing::info;

use super::script::{run_script, SimulationScript};
use crate::config::Config;
use crate::network::NetworkValidator;
use crate::storage::FileStore;
use crate::token::TokenCache;

/// Show current configuration (secrets masked)
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

/// Check a network id against the expected network
pub fn validate(config: &Config, network_id: &str) -> Result<()> {
    let validator = NetworkValidator::new(config.network.expected()?);

    match validator.validate(network_id) {
        Ok(true) => println!("{} is the expected network", network_id),
        Ok(false) => println!(
            "{} is NOT the expected network ({})",
            network_id,
            validator.expected().to_hex()
        ),
        Err(e) => anyhow::bail!("{}", e),
    }
    Ok(())
}

fn token_cache(config: &Config) -> TokenCache {
    let store = FileStore::new(&config.token.storage_path);
    TokenCache::new(
        Arc::new(store),
        config.token.storage_key.clone(),
        config.token.enforce_expiry,
    )
}

/// Show the persisted session token
pub fn token_show(config: &Config) -> Result<()> {
    let cache = token_cache(config);

    println!("\n=== SESSION TOKEN ===\n");
    println!("Store: {}", config.token.storage_path.display());
    println!("Key:   {}", cache.key());

    let Some(token) = cache.get()? else {
        println!("\nNo valid token cached.");
        return Ok(());
    };

    match token.decode() {
        Ok(decoded) => {
            let challenge = &decoded.challenge;
            let remaining = challenge.expires_at - Utc::now();

            println!("\nIssued:    {}", challenge.issued_at.to_rfc3339());
            println!("Expires:   {}", challenge.expires_at.to_rfc3339());
            if remaining.num_seconds() > 0 {
                println!("Remaining: {}m", remaining.num_minutes());
            } else {
                println!("Remaining: expired");
            }
            if let Some(domain) = &challenge.domain {
                println!("Domain:    {}", domain);
            }
            println!("Signature: {}", mask_signature(&decoded.signature));
        }
        Err(e) => println!("\nToken present but not decodable: {}", e),
    }

    Ok(())
}

/// Remove the persisted session token
pub fn token_clear(config: &Config, force: bool) -> Result<()> {
    let cache = token_cache(config);

    if !force {
        let confirmed = Confirm::new()
            .with_prompt("Clear the cached session token? The wallet will be asked to sign again.")
            .default(false)
            .interact()?;

        if !confirmed {
            info!("Token clear cancelled by user");
            return Ok(());
        }
    }

    cache.clear()?;
    println!("Session token cleared");
    Ok(())
}

/// Replay a simulation script and print the session after each step
pub async fn simulate(config: &Config, script_path: &Path) -> Result<()> {
    let script = SimulationScript::load(script_path)?;
    info!(
        "Replaying {} step(s) from {}",
        script.steps.len(),
        script_path.display()
    );

    let reports = run_script(config, &script).await?;

    println!("\n=== SIMULATION ===\n");
    println!(
        "{:<4} {:<36} {:<28} {:<14} {:<10} {}",
        "#", "STEP", "OUTCOME", "ADDRESS", "NETWORK", "PHASE"
    );
    println!("{}", "-".repeat(110));

    for (i, report) in reports.iter().enumerate() {
        let snapshot = &report.snapshot;
        println!(
            "{:<4} {:<36} {:<28} {:<14} {:<10} {}",
            i + 1,
            truncate(&report.step, 36),
            truncate(&report.outcome, 28),
            truncate(&snapshot.address, 14),
            truncate(&snapshot.network_id, 10),
            snapshot.phase()
        );
    }

    Ok(())
}

fn mask_signature(signature: &str) -> String {
    let chars: Vec<char> = signature.chars().collect();
    if chars.len() > 14 {
        let head: String = chars[..8].iter().collect();
        let tail: String = chars[chars.len() - 6..].iter().collect();
        format!("{}...{}", head, tail)
    } else {
        signature.to_string()
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_signature() {
        assert_eq!(mask_signature("0x1234"), "0x1234");
        assert_eq!(
            mask_signature("0x0123456789abcdef0123456789"),
            "0x012345...456789"
        );
    }

    #[test]
    fn test_mask_signature_multibyte() {
        assert_eq!(mask_signature("0x1éééééééééé"), "0x1éééééééééé");
        assert_eq!(mask_signature("0x1éééééééééééééé"), "0x1ééééé...éééééé");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("0x1234567890abcdef", 10), "0x12345...");
    }

    #[test]
    fn test_validate_command() {
        let config = Config::default();
        assert!(validate(&config, "0x1").is_ok());
        assert!(validate(&config, "0x5").is_ok());
        assert!(validate(&config, "bogus").is_err());
    }
}
