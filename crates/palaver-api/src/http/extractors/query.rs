//! Query parameter extractors for list endpoints.

use serde::Deserialize;

/// How history is grouped in the response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum HistoryGrouping {
    /// Date buckets, then owners within each bucket.
    #[default]
    Full,
    Date,
    Client,
    /// Flat list, newest first.
    None,
}

/// Query parameters for the history endpoint.
#[derive(Debug, Deserialize, Default)]
pub struct HistoryQuery {
    /// Restrict to one bot.
    pub bot_id: Option<String>,
    #[serde(default)]
    pub group: HistoryGrouping,
}
