use crate::error::{FetchFailure, PermanentFailure};
use crate::history::config::ApiConfig;
use crate::history::fetcher::PageFetcher;
use crate::history::model::{ChatRef, ChatType, Message, Page};
use anyhow::{Context, Result};
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

const TOKEN_HEADER: &str = "X-Access-Token";

#[derive(Debug, Clone, Serialize)]
pub struct ChatSummary {
    pub chat: ChatRef,
    pub name: String,
}

pub struct GroupMeClient {
    http: Client,
    base_url: String,
    token: String,
}

impl GroupMeClient {
    pub fn new(api: &ApiConfig, token: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(api.timeout_secs))
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            http,
            base_url: api.base_url.trim_end_matches('/').to_string(),
            token: token.trim().to_string(),
        })
    }

    fn get(&self, path: &str, query: &[(&str, String)]) -> reqwest::Result<Response> {
        self.http
            .get(format!("{}{path}", self.base_url))
            .header(TOKEN_HEADER, &self.token)
            .query(query)
            .send()
    }

    fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let response = self
            .get(path, query)
            .with_context(|| format!("request to {path} failed"))?;
        if !response.status().is_success() {
            anyhow::bail!("{path} failed with status {}", response.status());
        }
        response
            .json()
            .with_context(|| format!("{path} returned invalid JSON"))
    }

    /// Id of the token's owner.
    pub fn self_user_id(&self) -> Result<String> {
        let json = self.get_json("/users/me", &[])?;
        json.pointer("/response/user_id")
            .or_else(|| json.pointer("/response/id"))
            .and_then(value_as_id)
            .context("/users/me response missing user id")
    }

    pub fn groups(&self) -> Result<Vec<ChatSummary>> {
        let json = self.get_json(
            "/groups",
            &[
                ("per_page", "100".to_string()),
                ("omit", "memberships".to_string()),
            ],
        )?;
        Ok(decode_chat_list(&json, ChatType::Group))
    }

    pub fn direct_chats(&self) -> Result<Vec<ChatSummary>> {
        let json = self.get_json("/chats", &[("per_page", "100".to_string())])?;
        Ok(decode_chat_list(&json, ChatType::Direct))
    }

    fn fetch_raw(
        &self,
        chat: &ChatRef,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Value, FetchFailure> {
        let (path, mut query) = match chat.chat_type {
            ChatType::Group => (format!("/groups/{}/messages", chat.chat_id), Vec::new()),
            ChatType::Direct => (
                "/direct_messages".to_string(),
                vec![("other_user_id", chat.chat_id.clone())],
            ),
        };
        if let Some(before) = cursor {
            query.push(("before_id", before.to_string()));
        }
        query.push(("limit", limit.to_string()));

        let response = self.get(&path, &query).map_err(classify_transport)?;
        let status = response.status();
        if let Some(failure) = classify_status(status) {
            return Err(failure);
        }
        response
            .json::<Value>()
            .map_err(|err| FetchFailure::fault(format!("undecodable page: {err}")))
    }
}

impl PageFetcher for GroupMeClient {
    fn fetch(
        &self,
        chat: &ChatRef,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<Page, FetchFailure> {
        let json = self.fetch_raw(chat, cursor, page_size)?;
        let (_, messages) = decode_page(&json, chat.chat_type).map_err(FetchFailure::fault)?;
        Ok(Page::new(messages))
    }

    fn message_count(&self, chat: &ChatRef) -> Result<Option<u64>, FetchFailure> {
        match self.fetch_raw(chat, None, 1) {
            Ok(json) => {
                let (count, _) = decode_page(&json, chat.chat_type).map_err(FetchFailure::fault)?;
                Ok(count)
            }
            Err(FetchFailure::Permanent(PermanentFailure::Exhausted)) => Ok(Some(0)),
            Err(other) => Err(other),
        }
    }
}

/// Maps a non-success status onto the fetch contract. `None` means success.
pub fn classify_status(status: StatusCode) -> Option<FetchFailure> {
    if status == StatusCode::NOT_MODIFIED {
        return Some(FetchFailure::exhausted());
    }
    if status.is_success() {
        return None;
    }
    let reason = format!("http {status}");
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        Some(FetchFailure::transient(reason))
    } else {
        Some(FetchFailure::fault(reason))
    }
}

fn classify_transport(err: reqwest::Error) -> FetchFailure {
    if err.is_timeout() || err.is_connect() {
        FetchFailure::transient(format!("transport: {err}"))
    } else {
        FetchFailure::fault(format!("transport: {err}"))
    }
}

fn value_as_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn decode_message(entry: &Value) -> Result<Message, String> {
    let id = entry
        .get("id")
        .and_then(value_as_id)
        .ok_or_else(|| "message without id".to_string())?;
    let created_at_epoch_secs = entry
        .get("created_at")
        .and_then(Value::as_i64)
        .ok_or_else(|| format!("message {id} without created_at"))?;
    let sender_id = entry
        .get("user_id")
        .or_else(|| entry.get("sender_id"))
        .and_then(value_as_id)
        .unwrap_or_default();
    let sender_name = entry
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let body = entry
        .get("text")
        .and_then(Value::as_str)
        .map(ToOwned::to_owned);
    Ok(Message {
        id,
        created_at_epoch_secs,
        sender_id,
        sender_name,
        body,
    })
}

/// Decodes a messages response into (declared count, newest-first messages).
pub fn decode_page(json: &Value, chat_type: ChatType) -> Result<(Option<u64>, Vec<Message>), String> {
    let response = json
        .get("response")
        .ok_or_else(|| "page without `response`".to_string())?;
    let key = match chat_type {
        ChatType::Group => "messages",
        ChatType::Direct => "direct_messages",
    };
    let count = response.get("count").and_then(Value::as_u64);
    let entries = match response.get(key) {
        Some(Value::Array(entries)) => entries.as_slice(),
        Some(Value::Null) | None => &[],
        Some(_) => return Err(format!("`{key}` is not a list")),
    };
    let messages = entries
        .iter()
        .map(decode_message)
        .collect::<Result<Vec<_>, _>>()?;
    Ok((count, messages))
}

fn decode_chat_list(json: &Value, chat_type: ChatType) -> Vec<ChatSummary> {
    let Some(entries) = json.get("response").and_then(Value::as_array) else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            let (id, name) = match chat_type {
                ChatType::Group => (entry.get("id"), entry.get("name")),
                ChatType::Direct => {
                    let other = entry.get("other_user")?;
                    (other.get("id"), other.get("name"))
                }
            };
            Some(ChatSummary {
                chat: ChatRef::new(chat_type, id.and_then(value_as_id)?),
                name: name.and_then(Value::as_str).unwrap_or_default().to_string(),
            })
        })
        .collect()
}
