//! Usage quota types.
//!
//! Quotas are configured per role (optionally per bot) and usage is computed
//! on demand from stored transcripts; nothing here is a running counter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

/// What a quota counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitType {
    /// User messages sent.
    Messages,
    /// Estimated tokens across user and assistant messages.
    Tokens,
}

impl fmt::Display for LimitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitType::Messages => write!(f, "messages"),
            LimitType::Tokens => write!(f, "tokens"),
        }
    }
}

impl FromStr for LimitType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "messages" => Ok(LimitType::Messages),
            "tokens" => Ok(LimitType::Tokens),
            other => Err(format!("invalid limit type: '{other}'")),
        }
    }
}

/// How often a quota window restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetPeriod {
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Never,
}

impl fmt::Display for ResetPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResetPeriod::Hourly => write!(f, "hourly"),
            ResetPeriod::Daily => write!(f, "daily"),
            ResetPeriod::Weekly => write!(f, "weekly"),
            ResetPeriod::Monthly => write!(f, "monthly"),
            ResetPeriod::Never => write!(f, "never"),
        }
    }
}

impl FromStr for ResetPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hourly" => Ok(ResetPeriod::Hourly),
            "daily" => Ok(ResetPeriod::Daily),
            "weekly" => Ok(ResetPeriod::Weekly),
            "monthly" => Ok(ResetPeriod::Monthly),
            "never" => Ok(ResetPeriod::Never),
            other => Err(format!("invalid reset period: '{other}'")),
        }
    }
}

/// Role a quota applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Unauthenticated visitor identified by a client token.
    Anonymous,
    /// Signed-in user.
    User,
    Admin,
}

impl Default for UserRole {
    fn default() -> Self {
        UserRole::Anonymous
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Anonymous => write!(f, "anonymous"),
            UserRole::User => write!(f, "user"),
            UserRole::Admin => write!(f, "admin"),
        }
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "anonymous" => Ok(UserRole::Anonymous),
            "user" => Ok(UserRole::User),
            "admin" => Ok(UserRole::Admin),
            other => Err(format!("invalid user role: '{other}'")),
        }
    }
}

/// One row of the quota table.
///
/// `bot_id = None` is the global default for the role and limit type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageQuota {
    #[serde(default)]
    pub bot_id: Option<String>,
    pub role: UserRole,
    pub limit_type: LimitType,
    pub max_usage: u64,
    pub reset_period: ResetPeriod,
}

/// Usage of one quota, computed on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageLimit {
    pub limit_type: LimitType,
    pub max_usage: u64,
    pub reset_period: ResetPeriod,
    /// Next window boundary; `None` for [`ResetPeriod::Never`].
    pub reset_date: Option<DateTime<Utc>>,
    pub current_usage: u64,
}

impl UsageLimit {
    pub fn is_exceeded(&self) -> bool {
        self.current_usage >= self.max_usage
    }
}

/// Result of a pre-send limit check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitCheck {
    pub exceeded: bool,
    pub reset_date: Option<DateTime<Utc>>,
    pub max_usage: u64,
    pub limit_type: LimitType,
    pub current_usage: u64,
}

impl LimitCheck {
    /// Result used when no quota applies.
    pub fn unlimited() -> Self {
        Self {
            exceeded: false,
            reset_date: None,
            max_usage: u64::MAX,
            limit_type: LimitType::Messages,
            current_usage: 0,
        }
    }
}

impl From<&UsageLimit> for LimitCheck {
    fn from(limit: &UsageLimit) -> Self {
        Self {
            exceeded: limit.is_exceeded(),
            reset_date: limit.reset_date,
            max_usage: limit.max_usage,
            limit_type: limit.limit_type,
            current_usage: limit.current_usage,
        }
    }
}
