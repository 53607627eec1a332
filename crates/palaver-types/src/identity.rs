//! Session identity types.
//!
//! [`SessionContext`] is the explicit per-call value describing who is asking
//! and whether they allowed the session token to be stored.

use serde::{Deserialize, Serialize};

use crate::chat::ChatIdentity;
use crate::usage::UserRole;

/// An authenticated principal supplied by the host application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    #[serde(default)]
    pub role: UserRole,
}

/// Whether the participant agreed to durable token storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceConsent {
    Granted,
    Withheld,
}

impl PersistenceConsent {
    pub fn is_granted(self) -> bool {
        matches!(self, PersistenceConsent::Granted)
    }
}

impl From<bool> for PersistenceConsent {
    fn from(granted: bool) -> Self {
        if granted {
            PersistenceConsent::Granted
        } else {
            PersistenceConsent::Withheld
        }
    }
}

/// Per-call session inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    pub principal: Option<Principal>,
    pub consent: PersistenceConsent,
}

impl SessionContext {
    pub fn anonymous(consent: PersistenceConsent) -> Self {
        Self {
            principal: None,
            consent,
        }
    }

    pub fn authenticated(principal: Principal, consent: PersistenceConsent) -> Self {
        Self {
            principal: Some(principal),
            consent,
        }
    }

    /// Role used for quota lookup.
    pub fn role(&self) -> UserRole {
        self.principal
            .as_ref()
            .map(|p| p.role)
            .unwrap_or(UserRole::Anonymous)
    }
}

/// Outcome of identity resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedIdentity {
    pub token: String,
    pub is_authenticated: bool,
    /// True when the token was not (and will not be) stored.
    pub ephemeral: bool,
    /// Authenticated principal id, when one was supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl ResolvedIdentity {
    /// The identity axis used to scope transcripts and quotas.
    ///
    /// Authenticated participants are scoped by user id; everyone else by
    /// the resolved token acting as the client id.
    pub fn chat_identity(&self) -> ChatIdentity {
        match &self.user_id {
            Some(user_id) => ChatIdentity::User(user_id.clone()),
            None => ChatIdentity::Client(self.token.clone()),
        }
    }
}
