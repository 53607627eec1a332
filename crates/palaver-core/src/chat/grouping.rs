//! Pure grouping of transcripts for history views.
//!
//! Records are bucketed by UTC calendar-day age of their last update, then
//! by owner within each bucket. Grouping is evaluated against the instant
//! passed in (or the current time), never a cached one.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use palaver_types::chat::ChatRecord;

/// Age buckets, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DateBucket {
    Today,
    Yesterday,
    Last7Days,
    LastMonth,
    OverAMonthAgo,
    Older,
}

impl DateBucket {
    pub const ALL: [DateBucket; 6] = [
        DateBucket::Today,
        DateBucket::Yesterday,
        DateBucket::Last7Days,
        DateBucket::LastMonth,
        DateBucket::OverAMonthAgo,
        DateBucket::Older,
    ];

    pub fn label(self) -> &'static str {
        match self {
            DateBucket::Today => "Today",
            DateBucket::Yesterday => "Yesterday",
            DateBucket::Last7Days => "Last 7 days",
            DateBucket::LastMonth => "Last month",
            DateBucket::OverAMonthAgo => "Over a month ago",
            DateBucket::Older => "Older",
        }
    }

    /// Bucket for a record last updated at `updated_at`.
    pub fn for_timestamp(updated_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let days = (now.date_naive() - updated_at.date_naive()).num_days();
        match days {
            ..=0 => DateBucket::Today,
            1 => DateBucket::Yesterday,
            2..7 => DateBucket::Last7Days,
            7..30 => DateBucket::LastMonth,
            30..365 => DateBucket::OverAMonthAgo,
            _ => DateBucket::Older,
        }
    }
}

impl std::fmt::Display for DateBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateGroup {
    pub bucket: DateBucket,
    pub records: Vec<ChatRecord>,
}

/// Records of one owner (`user:<id>`, `client:<id>`, or `unknown`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientGroup {
    pub owner: String,
    pub records: Vec<ChatRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryGroup {
    pub bucket: DateBucket,
    pub clients: Vec<ClientGroup>,
}

/// Newest update first; chat id breaks ties so output is stable.
fn newest_first(a: &ChatRecord, b: &ChatRecord) -> std::cmp::Ordering {
    b.updated_at
        .cmp(&a.updated_at)
        .then_with(|| a.chat_id.cmp(&b.chat_id))
}

fn owner_key(record: &ChatRecord) -> String {
    record
        .identity()
        .map(|identity| identity.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn group_by_date(records: Vec<ChatRecord>) -> Vec<DateGroup> {
    group_by_date_at(records, Utc::now())
}

/// Group into date buckets as of `now`. Empty buckets are omitted.
pub fn group_by_date_at(records: Vec<ChatRecord>, now: DateTime<Utc>) -> Vec<DateGroup> {
    let mut buckets: HashMap<DateBucket, Vec<ChatRecord>> = HashMap::new();
    for record in records {
        buckets
            .entry(DateBucket::for_timestamp(record.updated_at, now))
            .or_default()
            .push(record);
    }

    DateBucket::ALL
        .iter()
        .filter_map(|bucket| {
            let mut records = buckets.remove(bucket)?;
            records.sort_by(newest_first);
            Some(DateGroup {
                bucket: *bucket,
                records,
            })
        })
        .collect()
}

/// Group by owner. Groups are ordered by their most recent record.
pub fn group_by_client(records: Vec<ChatRecord>) -> Vec<ClientGroup> {
    let mut owners: HashMap<String, Vec<ChatRecord>> = HashMap::new();
    for record in records {
        owners.entry(owner_key(&record)).or_default().push(record);
    }

    let mut groups: Vec<ClientGroup> = owners
        .into_iter()
        .map(|(owner, mut records)| {
            records.sort_by(newest_first);
            ClientGroup { owner, records }
        })
        .collect();
    groups.sort_by(|a, b| {
        let latest = |g: &ClientGroup| g.records.first().map(|r| r.updated_at);
        latest(b)
            .cmp(&latest(a))
            .then_with(|| a.owner.cmp(&b.owner))
    });
    groups
}

pub fn group_history(records: Vec<ChatRecord>) -> Vec<HistoryGroup> {
    group_history_at(records, Utc::now())
}

/// Date buckets with owner groups inside each.
pub fn group_history_at(records: Vec<ChatRecord>, now: DateTime<Utc>) -> Vec<HistoryGroup> {
    group_by_date_at(records, now)
        .into_iter()
        .map(|group| HistoryGroup {
            bucket: group.bucket,
            clients: group_by_client(group.records),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 0).unwrap()
    }

    fn record(chat_id: &str, client: &str, updated_at: DateTime<Utc>) -> ChatRecord {
        ChatRecord {
            chat_id: chat_id.to_string(),
            bot_id: "b1".to_string(),
            messages: vec![],
            sequence_number: 1,
            client_id: Some(client.to_string()),
            session_token: None,
            user_id: None,
            created_at: updated_at,
            updated_at,
        }
    }

    #[test]
    fn test_bucket_boundaries() {
        let now = now();
        let bucket = |delta: TimeDelta| DateBucket::for_timestamp(now - delta, now);

        assert_eq!(bucket(TimeDelta::hours(9)), DateBucket::Today);
        assert_eq!(bucket(TimeDelta::hours(-2)), DateBucket::Today);
        // 2024-06-14 23:00 is yesterday even though under 24h ago.
        assert_eq!(bucket(TimeDelta::hours(11)), DateBucket::Yesterday);
        assert_eq!(bucket(TimeDelta::days(6)), DateBucket::Last7Days);
        assert_eq!(bucket(TimeDelta::days(7)), DateBucket::LastMonth);
        assert_eq!(bucket(TimeDelta::days(29)), DateBucket::LastMonth);
        assert_eq!(bucket(TimeDelta::days(30)), DateBucket::OverAMonthAgo);
        assert_eq!(bucket(TimeDelta::days(364)), DateBucket::OverAMonthAgo);
        assert_eq!(bucket(TimeDelta::days(365)), DateBucket::Older);
    }

    #[test]
    fn test_group_by_date_orders_and_omits_empty() {
        let now = now();
        let records = vec![
            record("old", "a", now - TimeDelta::days(400)),
            record("t1", "a", now - TimeDelta::hours(1)),
            record("t2", "b", now - TimeDelta::minutes(5)),
            record("week", "a", now - TimeDelta::days(3)),
        ];
        let groups = group_by_date_at(records, now);

        let buckets: Vec<DateBucket> = groups.iter().map(|g| g.bucket).collect();
        assert_eq!(
            buckets,
            vec![DateBucket::Today, DateBucket::Last7Days, DateBucket::Older]
        );
        let today: Vec<&str> = groups[0].records.iter().map(|r| r.chat_id.as_str()).collect();
        assert_eq!(today, vec!["t2", "t1"]);
    }

    #[test]
    fn test_group_by_date_is_idempotent_at_fixed_instant() {
        let now = now();
        let records = vec![
            record("a", "x", now - TimeDelta::days(1)),
            record("b", "y", now - TimeDelta::days(1)),
            record("c", "x", now - TimeDelta::days(45)),
        ];
        let once = group_by_date_at(records.clone(), now);
        let flattened: Vec<ChatRecord> = once.iter().flat_map(|g| g.records.clone()).collect();
        let twice = group_by_date_at(flattened, now);
        assert_eq!(once, twice);
        assert_eq!(once, group_by_date_at(records.into_iter().rev().collect(), now));
    }

    #[test]
    fn test_group_by_client_reverse_chronological() {
        let now = now();
        let records = vec![
            record("a1", "alice", now - TimeDelta::hours(5)),
            record("b1", "bob", now - TimeDelta::hours(1)),
            record("a2", "alice", now - TimeDelta::hours(2)),
        ];
        let groups = group_by_client(records);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].owner, "client:bob");
        assert_eq!(groups[1].owner, "client:alice");
        let alice: Vec<&str> = groups[1].records.iter().map(|r| r.chat_id.as_str()).collect();
        assert_eq!(alice, vec!["a2", "a1"]);
    }

    #[test]
    fn test_group_history_nests_clients_in_buckets() {
        let now = now();
        let mut by_user = record("u", "ignored", now);
        by_user.user_id = Some("u1".to_string());
        by_user.client_id = None;
        let records = vec![by_user, record("c", "c1", now - TimeDelta::days(2))];

        let groups = group_history_at(records, now);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].clients[0].owner, "user:u1");
        assert_eq!(groups[1].bucket, DateBucket::Last7Days);
    }
}
