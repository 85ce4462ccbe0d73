// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telegram Desktop JSON export parser.
//!
//! Only regular messages with text and a known author are kept. Service
//! messages (joins, pins, title changes) carry an `action` and are skipped,
//! as are media-only messages whose text is empty.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::Deserialize;
use threadline_core::ThreadlineError;
use threadline_storage::{NewChatUser, NewMessage};

const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Deserialize)]
struct RawExport {
    #[serde(default)]
    name: Option<String>,
    id: serde_json::Value,
    #[serde(default)]
    messages: Vec<RawMessage>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    id: i64,
    #[serde(rename = "type", default)]
    kind: String,
    date: String,
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    from_id: Option<serde_json::Value>,
    #[serde(default)]
    text: RawText,
    #[serde(default)]
    reply_to_message_id: Option<i64>,
    #[serde(default)]
    action: Option<serde_json::Value>,
}

/// Plain string, or a list mixing strings and formatted entities.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawText {
    Plain(String),
    Rich(Vec<RichPart>),
}

impl Default for RawText {
    fn default() -> Self {
        RawText::Plain(String::new())
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RichPart {
    Plain(String),
    Entity { text: String },
}

impl RawText {
    fn flatten(self) -> String {
        match self {
            RawText::Plain(text) => text,
            RawText::Rich(parts) => parts
                .into_iter()
                .map(|part| match part {
                    RichPart::Plain(text) | RichPart::Entity { text } => text,
                })
                .collect(),
        }
    }
}

/// A parsed export, ready for `save_export`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedExport {
    /// Telegram's chat id, used as the chat's internal code.
    pub chat_code: String,
    pub name: String,
    pub users: Vec<NewChatUser>,
    pub messages: Vec<NewMessage>,
    /// Entries dropped as service, media-only or authorless.
    pub skipped: usize,
}

fn id_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn parse_export(bytes: &[u8]) -> Result<ParsedExport, ThreadlineError> {
    let raw: RawExport = serde_json::from_slice(bytes)
        .map_err(|e| ThreadlineError::Parse(format!("invalid Telegram export: {e}")))?;
    let chat_code = id_string(&raw.id)
        .ok_or_else(|| ThreadlineError::Parse("Telegram export has no chat id".into()))?;

    let mut users: BTreeMap<String, Option<String>> = BTreeMap::new();
    let mut messages = Vec::with_capacity(raw.messages.len());
    let mut skipped = 0;

    for message in raw.messages {
        if message.kind != "message" || message.action.is_some() {
            skipped += 1;
            continue;
        }
        let Some(author) = message.from_id.as_ref().and_then(id_string) else {
            skipped += 1;
            continue;
        };
        let text = message.text.flatten();
        if text.trim().is_empty() {
            skipped += 1;
            continue;
        }

        let sent_at = NaiveDateTime::parse_from_str(&message.date, DATE_FORMAT).map_err(|e| {
            ThreadlineError::Parse(format!(
                "message {} has invalid date `{}`: {e}",
                message.id, message.date
            ))
        })?;

        let display_name = users.entry(author.clone()).or_default();
        if display_name.is_none() {
            *display_name = message.from;
        }

        messages.push(NewMessage {
            internal_code: message.id,
            author_code: Some(author),
            sent_at: sent_at.format(DATE_FORMAT).to_string(),
            text,
            reply_to: message.reply_to_message_id,
        });
    }

    Ok(ParsedExport {
        name: raw.name.unwrap_or_else(|| format!("Telegram chat {chat_code}")),
        chat_code,
        users: users
            .into_iter()
            .map(|(internal_code, display_name)| NewChatUser {
                internal_code,
                display_name,
            })
            .collect(),
        messages,
        skipped,
    })
}
