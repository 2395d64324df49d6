use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatType {
    Group,
    Direct,
}

impl ChatType {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatType::Group => "group",
            ChatType::Direct => "direct",
        }
    }
}

impl fmt::Display for ChatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatType {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "group" => Ok(ChatType::Group),
            "direct" => Ok(ChatType::Direct),
            other => Err(format!("unknown chat type `{other}`; use `group` or `direct`")),
        }
    }
}

/// Identity of one remote chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRef {
    pub chat_type: ChatType,
    pub chat_id: String,
}

impl ChatRef {
    pub fn new(chat_type: ChatType, chat_id: impl Into<String>) -> Self {
        Self {
            chat_type,
            chat_id: chat_id.into(),
        }
    }
}

impl fmt::Display for ChatRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chat_type, self.chat_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub created_at_epoch_secs: i64,
    pub sender_id: String,
    pub sender_name: String,
    pub body: Option<String>,
}

impl Message {
    pub fn timestamp(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.created_at_epoch_secs, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

/// One fetched page, newest message first.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub messages: Vec<Message>,
}

impl Page {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Id of the oldest message, used as the cursor for the next request.
    pub fn cursor(&self) -> Option<&str> {
        self.messages.last().map(|m| m.id.as_str())
    }

    /// A page signals exhaustion when it is empty, or when its oldest id did
    /// not move past the cursor that requested it.
    pub fn is_exhausted(&self, previous_cursor: Option<&str>) -> bool {
        if self.is_empty() {
            return true;
        }
        previous_cursor.is_some() && self.cursor() == previous_cursor
    }
}

/// Calendar day resolution for message timestamps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DayClock {
    Local,
    Zone(Tz),
}

impl DayClock {
    pub fn parse(raw: Option<&str>) -> Result<Self, String> {
        match raw.map(str::trim).filter(|s| !s.is_empty()) {
            None => Ok(DayClock::Local),
            Some(name) if name.eq_ignore_ascii_case("local") => Ok(DayClock::Local),
            Some(name) => name
                .parse::<Tz>()
                .map(DayClock::Zone)
                .map_err(|_| format!("unknown time zone `{name}`")),
        }
    }

    pub fn day_of(&self, message: &Message) -> NaiveDate {
        let ts = message.timestamp();
        match self {
            DayClock::Local => ts.with_timezone(&chrono::Local).date_naive(),
            DayClock::Zone(tz) => ts.with_timezone(tz).date_naive(),
        }
    }

    pub fn clock_time(&self, message: &Message) -> String {
        let ts = message.timestamp();
        match self {
            DayClock::Local => ts.with_timezone(&chrono::Local).format("%H:%M:%S").to_string(),
            DayClock::Zone(tz) => ts.with_timezone(tz).format("%H:%M:%S").to_string(),
        }
    }
}

/// Contiguous run of same-day messages in arrival (newest-first) order.
#[derive(Debug, Clone, PartialEq)]
pub struct DayBucket {
    pub date_key: NaiveDate,
    pub messages: Vec<Message>,
}

impl DayBucket {
    pub fn open(date_key: NaiveDate, first: Message) -> Self {
        Self {
            date_key,
            messages: vec![first],
        }
    }
}

/// Durable record of where an interrupted walk stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub chat: ChatRef,
    pub cursor: String,
    pub date_key: NaiveDate,
    pub failure_reason: String,
}

/// Newest message of a finished document, plus where its walk started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestRecord {
    pub chat: ChatRef,
    pub message_id: Option<String>,
    pub date_key: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resumed_from: Option<String>,
    pub message_count: u64,
}

/// Position of a consumed message, enough to resume after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageMark {
    pub id: String,
    pub date_key: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkResult {
    Completed,
    Interrupted(Checkpoint),
}

impl WalkResult {
    pub fn checkpoint(&self) -> Option<&Checkpoint> {
        match self {
            WalkResult::Completed => None,
            WalkResult::Interrupted(checkpoint) => Some(checkpoint),
        }
    }
}
