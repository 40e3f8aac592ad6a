//! Signed session tokens
//!
//! A session token proves control of a wallet address to a relying backend.
//! It is the agent's signature over a short challenge text, wrapped together
//! with that text and base64-encoded:
//!
//! ```text
//! base64({"signature": "0x..", "body": "<challenge>"})
//! ```
//!
//! The challenge carries its own issue and expiry times, so a backend can
//! check validity without any server-side state.

pub mod cache;

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::agent::MessageSigner;
use crate::error::{Error, Result};

pub use cache::TokenCache;

/// Challenge format version
pub const TOKEN_VERSION: u32 = 2;

/// Default token lifetime (1 day)
pub const DEFAULT_TTL_SECS: u64 = 86_400;

/// Longest accepted token lifetime (10 years)
pub const MAX_TTL_SECS: u64 = 10 * 365 * 86_400;

/// Opaque signed session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Unwrap the envelope and parse the challenge fields
    pub fn decode(&self) -> Result<DecodedToken> {
        let bytes = STANDARD.decode(self.0.trim())?;
        let envelope: TokenEnvelope = serde_json::from_slice(&bytes)
            .map_err(|e| Error::InvalidToken(format!("bad envelope: {}", e)))?;

        let challenge = Challenge::parse(&envelope.body)?;
        Ok(DecodedToken {
            signature: envelope.signature,
            body: envelope.body,
            challenge,
        })
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenEnvelope {
    signature: String,
    body: String,
}

/// Token contents, for inspection
#[derive(Debug, Clone)]
pub struct DecodedToken {
    pub signature: String,
    pub body: String,
    pub challenge: Challenge,
}

/// The text the agent is asked to sign
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub statement: String,
    pub domain: Option<String>,
    pub version: u32,
    pub nonce: u32,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Challenge {
    /// Canonical text form; this exact string is what gets signed
    pub fn render(&self) -> String {
        let mut lines = vec![self.statement.clone(), String::new()];
        if let Some(domain) = &self.domain {
            lines.push(format!("URI: {}", domain));
        }
        lines.push(format!("Web3 Token Version: {}", self.version));
        lines.push(format!("Nonce: {}", self.nonce));
        lines.push(format!(
            "Issued At: {}",
            self.issued_at.to_rfc3339_opts(SecondsFormat::Millis, true)
        ));
        lines.push(format!(
            "Expiration Time: {}",
            self.expires_at.to_rfc3339_opts(SecondsFormat::Millis, true)
        ));
        lines.join("\n")
    }

    /// Parse a rendered challenge back
    pub fn parse(body: &str) -> Result<Self> {
        let (statement, fields) = body
            .split_once("\n\n")
            .ok_or_else(|| Error::InvalidToken("missing statement separator".to_string()))?;

        let mut domain = None;
        let mut version = None;
        let mut nonce = None;
        let mut issued_at = None;
        let mut expires_at = None;

        for line in fields.lines() {
            let Some((key, value)) = line.split_once(": ") else {
                continue;
            };
            match key {
                "URI" => domain = Some(value.to_string()),
                "Web3 Token Version" => version = Some(parse_field(key, value)?),
                "Nonce" => nonce = Some(parse_field(key, value)?),
                "Issued At" => issued_at = Some(parse_time(key, value)?),
                "Expiration Time" => expires_at = Some(parse_time(key, value)?),
                _ => debug!("Ignoring unknown challenge field {:?}", key),
            }
        }

        Ok(Self {
            statement: statement.to_string(),
            domain,
            version: version.ok_or_else(|| missing("Web3 Token Version"))?,
            nonce: nonce.ok_or_else(|| missing("Nonce"))?,
            issued_at: issued_at.ok_or_else(|| missing("Issued At"))?,
            expires_at: expires_at.ok_or_else(|| missing("Expiration Time"))?,
        })
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

fn missing(field: &str) -> Error {
    Error::InvalidToken(format!("missing field {:?}", field))
}

fn parse_field<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::InvalidToken(format!("bad {} value {:?}", key, value)))
}

fn parse_time(key: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::InvalidToken(format!("bad {} value {:?}: {}", key, value, e)))
}

/// Freshly signed token together with its expiry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: SessionToken,
    pub expires_at: DateTime<Utc>,
}

/// Builds challenges and has them signed
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    statement: String,
    domain: Option<String>,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(statement: impl Into<String>, domain: Option<String>, ttl_secs: u64) -> Self {
        Self {
            statement: statement.into(),
            domain,
            ttl: Duration::seconds(ttl_secs.min(MAX_TTL_SECS) as i64),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Challenge valid from `now` for the configured lifetime
    pub fn challenge_at(&self, now: DateTime<Utc>) -> Challenge {
        Challenge {
            statement: self.statement.clone(),
            domain: self.domain.clone(),
            version: TOKEN_VERSION,
            nonce: rand::random::<u32>(),
            issued_at: now,
            expires_at: now + self.ttl,
        }
    }

    /// Sign a new challenge. Suspends until the user answers the prompt.
    pub async fn issue(&self, signer: &dyn MessageSigner) -> Result<IssuedToken> {
        self.issue_at(signer, Utc::now()).await
    }

    pub async fn issue_at(
        &self,
        signer: &dyn MessageSigner,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken> {
        let challenge = self.challenge_at(now);
        let body = challenge.render();

        let signature = signer.sign_message(&body).await.map_err(|e| match e {
            Error::UserRejected(_) => e,
            other => Error::Signing(other.to_string()),
        })?;

        let envelope = serde_json::to_vec(&TokenEnvelope { signature, body })?;
        let token = SessionToken(STANDARD.encode(envelope));

        info!(
            "Issued session token valid until {}",
            challenge.expires_at.to_rfc3339()
        );

        Ok(IssuedToken {
            token,
            expires_at: challenge.expires_at,
        })
    }
}
