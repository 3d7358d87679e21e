//! Job entity, wire payloads, and the small pure-function helpers the firing pipeline and
//! schedule parser both depend on (one-shot memo encoding, game-type name matching).

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref GAME_NAME_RE: Regex =
        Regex::new(r"^([A-Z0-9]{2,4})_(.*?)(_(\d+)(_(.*?))?)?$").unwrap();
}

/// Splits a job name into `(game_type, game_num)` per the `^([A-Z0-9]{2,4})_(.*?)(_(\d+)(_(.*?))?)?$`
/// convention. Returns empty strings when the name doesn't match.
pub fn match_job_name(name: &str) -> (String, String) {
    match GAME_NAME_RE.captures(name) {
        Some(caps) => (
            caps.get(1).map(|m| m.as_str()).unwrap_or("").to_string(),
            caps.get(4).map(|m| m.as_str()).unwrap_or("").to_string(),
        ),
        None => (String::new(), String::new()),
    }
}

/// True iff `memo` encodes a one-shot job (`"<epoch>@once"`).
pub fn is_memo_once(memo: &str) -> bool {
    memo.contains("@once")
}

fn memo_epoch(memo: &str) -> Option<i64> {
    if !is_memo_once(memo) {
        return None;
    }
    let parts: Vec<&str> = memo.split('@').collect();
    if parts.len() != 2 {
        return None;
    }
    parts[0].parse::<i64>().ok()
}

/// True iff `memo` is a one-shot whose scheduled epoch has already passed (`<= now`).
pub fn should_execute_now(memo: &str, now: DateTime<Utc>) -> bool {
    match memo_epoch(memo) {
        Some(epoch) => epoch <= now.timestamp(),
        None => false,
    }
}

/// True iff `memo` is a one-shot whose scheduled epoch is at most three hours in the past
/// (inclusive at exactly three hours, per the original's `>=` comparison).
pub fn should_execute_three_hours(memo: &str, now: DateTime<Utc>) -> bool {
    match memo_epoch(memo) {
        Some(epoch) => epoch >= now.timestamp() - 3 * 60 * 60,
        None => false,
    }
}

/// Advances `next` by `step` until it is strictly after `now`.
pub fn calculate_next_run_time(
    now: DateTime<Utc>,
    mut next: DateTime<Utc>,
    step: chrono::Duration,
) -> DateTime<Utc> {
    while next <= now {
        next += step;
    }
    next
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Http,
    Nsq,
    Test,
}

impl JobType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "http" => Some(Self::Http),
            "nsq" => Some(Self::Nsq),
            "test" => Some(Self::Test),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Nsq => "nsq",
            Self::Test => "test",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum JobStatus {
    Paused = 0,
    Active = 1,
}

impl JobStatus {
    pub fn from_i32(v: i32) -> Self {
        if v == 1 { Self::Active } else { Self::Paused }
    }
}

/// The inbound REST payload for `job/add` and `job/replace`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TaskPayloadReq {
    pub group_name: String,
    pub name: String,
    #[serde(default)]
    pub exec_right_now: bool,
    #[serde(default)]
    pub request_url: String,
    #[serde(default)]
    pub retry: bool,
    pub interval_pattern: String,
    #[serde(rename = "type")]
    pub job_type: String,
    #[serde(default)]
    pub nsq_topic: String,
    #[serde(default)]
    pub nsq_message: String,
}

/// The full job record, as stored in `TASK_<group>_<jobID>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub group_name: String,
    pub name: String,
    pub exec_right_now: bool,
    pub request_url: String,
    pub retry: bool,
    pub interval_pattern: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub status: i32,
    pub nsq_topic: String,
    pub nsq_message: String,
    pub register: DateTime<Utc>,
    pub next: DateTime<Utc>,
    pub prev: DateTime<Utc>,
    pub memo: String,
}

impl Job {
    pub fn is_active(&self) -> bool {
        self.status == JobStatus::Active as i32
    }
}

/// Control-plane event published on `dgua_event_channel`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PubJobEvent {
    pub job_id: String,
    pub group_name: String,
    pub name: String,
    pub event: String,
    pub host_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn game_name_match_extracts_type_and_num() {
        let (t, n) = match_job_name("BBLT_draw_014");
        assert_eq!(t, "BBLT");
        assert_eq!(n, "014");
    }

    #[test]
    fn game_name_match_no_suffix() {
        let (t, n) = match_job_name("BBLT_draw");
        assert_eq!(t, "BBLT");
        assert_eq!(n, "");
    }

    #[test]
    fn p6_late_arrival_boundary_is_inclusive() {
        let now = Utc::now();
        let epoch = now.timestamp() - 3 * 60 * 60;
        let memo = format!("{epoch}@once");
        assert!(should_execute_three_hours(&memo, now));
    }

    #[test]
    fn p6_late_arrival_just_past_boundary_is_expired() {
        let now = Utc::now();
        let epoch = now.timestamp() - 3 * 60 * 60 - 1;
        let memo = format!("{epoch}@once");
        assert!(!should_execute_three_hours(&memo, now));
    }

    #[test]
    fn p7_should_execute_now() {
        let now = Utc::now();
        let past = format!("{}@once", now.timestamp() - 10);
        let future = format!("{}@once", now.timestamp() + 10);
        assert!(should_execute_now(&past, now));
        assert!(!should_execute_now(&future, now));
    }

    #[test]
    fn p8_calculate_next_run_time_advances_past_now() {
        let now = Utc::now();
        let next = now - chrono::Duration::seconds(100);
        let step = chrono::Duration::seconds(30);
        let result = calculate_next_run_time(now, next, step);
        assert!(result > now);
        assert_eq!((result - next).num_seconds() % 30, 0);
    }
}
