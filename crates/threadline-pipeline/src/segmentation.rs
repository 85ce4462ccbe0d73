// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Topic segmentation of a chat, one completion call per calendar day.
//!
//! Days below the message threshold and days that already have groups are
//! skipped, so a chat re-queued after a re-import only costs calls for the
//! new days. Group codes are derived from the chat, the day and the
//! message ids, which makes saving the same answer twice a no-op.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use threadline_config::model::{ProvidersConfig, SegmentationConfig};
use threadline_core::{
    CompletionRequest, ItemProcessor, ProviderAdapter, ThreadlineError,
};
use threadline_resilience::{RetryPolicy, retry};
use threadline_storage::queries::{chats, groups, requests, users};
use threadline_storage::{ChatMessage, Database, NewGroup, PendingChat};
use tracing::{debug, info, warn};

use crate::response::parse_json_reply;

/// Usage rows written by this stage carry this kind.
pub const REQUEST_KIND: &str = "segmentation";

#[derive(Debug, Clone)]
pub struct SegmentationSettings {
    pub model: String,
    pub min_messages_per_day: usize,
    pub temperature: Option<f32>,
    pub language: String,
}

impl SegmentationSettings {
    pub fn from_config(providers: &ProvidersConfig, segmentation: &SegmentationConfig) -> Self {
        Self {
            model: providers.segmentation_model.clone(),
            min_messages_per_day: segmentation.min_messages_per_day,
            temperature: segmentation.temperature,
            language: segmentation.language.clone(),
        }
    }
}

/// One topic as returned by the model.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Segment {
    pub title: String,
    pub summary: String,
    pub ids: Vec<i64>,
}

/// Models wrap the list in an object when forced into JSON mode, and
/// sometimes answer with a single topic.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SegmentReply {
    Wrapped { conversations: Vec<Segment> },
    Many(Vec<Segment>),
    One(Segment),
}

impl From<SegmentReply> for Vec<Segment> {
    fn from(reply: SegmentReply) -> Self {
        match reply {
            SegmentReply::Wrapped { conversations } => conversations,
            SegmentReply::Many(segments) => segments,
            SegmentReply::One(segment) => vec![segment],
        }
    }
}

pub fn parse_segments(reply: &str) -> Result<Vec<Segment>, ThreadlineError> {
    parse_json_reply::<SegmentReply>(reply).map(Into::into)
}

#[derive(Serialize)]
struct PromptMessage<'a> {
    id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    u: Option<&'a str>,
    m: &'a str,
    s: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    r_id: Option<i64>,
}

fn instructions(language: &str, min_messages: usize) -> String {
    format!(
        "Group the messages inside [MESSAGES][/MESSAGES] by conversation topic.\n\
         Each message has: id (message id), u (author), m (text), s (sent at, UTC) \
         and r_id (id of the message it replies to). Messages are in chronological order.\n\
         Answer with a JSON object {{\"conversations\": [...]}} where each conversation has:\n\
         - title: a unique title in {language}, not starting with \"discussion\" or \"conversation\";\n\
         - summary: a succinct summary in {language} (max 500 characters);\n\
         - ids: the ids of its messages, at least {min_messages}.\n\
         Classify every message, never invent ids, do not overlap topics and keep \
         the number of topics to a minimum."
    )
}

fn build_prompt(messages: &[ChatMessage]) -> Result<String, ThreadlineError> {
    let lite: Vec<PromptMessage<'_>> = messages
        .iter()
        .map(|m| PromptMessage {
            id: m.id,
            u: m.author.as_deref(),
            m: &m.text,
            s: &m.sent_at,
            r_id: m.reply_to,
        })
        .collect();
    Ok(format!("[MESSAGES]{}[/MESSAGES]", serde_json::to_string(&lite)?))
}

/// Stable code for a group: the same day and ids always map to the same code.
pub fn group_code(chat_id: i64, day: &str, ids: &[i64]) -> String {
    let mut sorted = ids.to_vec();
    sorted.sort_unstable();
    let mut hasher = Sha256::new();
    hasher.update(format!("{chat_id}:{day}:{sorted:?}"));
    hex::encode(hasher.finalize())
}

pub struct SegmentationProcessor {
    db: Database,
    provider: Arc<dyn ProviderAdapter>,
    retry: RetryPolicy,
    settings: SegmentationSettings,
}

impl SegmentationProcessor {
    pub fn new(
        db: Database,
        provider: Arc<dyn ProviderAdapter>,
        retry: RetryPolicy,
        settings: SegmentationSettings,
    ) -> Self {
        Self {
            db,
            provider,
            retry,
            settings,
        }
    }

    /// The chat's own key when the claim carried one, else the creator's
    /// stored key for this provider, else the adapter default.
    async fn api_key(&self, chat: &PendingChat) -> Result<Option<String>, ThreadlineError> {
        if chat.api_key.is_some() {
            return Ok(chat.api_key.clone());
        }
        match chat.created_by {
            Some(user_id) => users::api_key(&self.db, user_id, self.provider.source()).await,
            None => Ok(None),
        }
    }

    async fn segment_day(
        &self,
        chat: &PendingChat,
        day: &str,
        api_key: Option<String>,
    ) -> Result<usize, ThreadlineError> {
        let messages = chats::messages_for_day(&self.db, chat.id, day).await?;
        let request = CompletionRequest {
            model: self.settings.model.clone(),
            system: Some(instructions(
                &self.settings.language,
                self.settings.min_messages_per_day,
            )),
            prompt: build_prompt(&messages)?,
            temperature: self.settings.temperature,
            json_response: true,
            api_key,
        };

        let response = retry(&self.retry, || {
            self.provider.fetch_completion(request.clone())
        })
        .await?;
        requests::record_usage(
            &self.db,
            REQUEST_KIND,
            chat.created_by,
            &response.model,
            response.usage,
        )
        .await?;

        let known: HashSet<i64> = messages.iter().map(|m| m.id).collect();
        let mut classified = HashSet::new();
        let mut new_groups = Vec::new();
        for segment in parse_segments(&response.text)? {
            let (valid, invalid): (Vec<i64>, Vec<i64>) =
                segment.ids.into_iter().partition(|id| known.contains(id));
            if !invalid.is_empty() {
                warn!(chat.id = chat.id, day, ?invalid, "model returned unknown message ids");
            }
            if valid.is_empty() {
                continue;
            }
            if valid.len() < self.settings.min_messages_per_day {
                debug!(chat.id = chat.id, day, title = %segment.title, "group below minimum size");
            }
            classified.extend(valid.iter().copied());
            new_groups.push(NewGroup {
                chat_id: chat.id,
                internal_code: group_code(chat.id, day, &valid),
                day: day.to_string(),
                title: segment.title,
                summary: segment.summary,
                message_ids: valid,
            });
        }

        let unclassified = known.len() - classified.len();
        if unclassified > 0 {
            debug!(chat.id = chat.id, day, unclassified, "messages left out of every group");
        }

        let count = new_groups.len();
        groups::save_groups(&self.db, new_groups).await?;
        Ok(count)
    }
}

#[async_trait]
impl ItemProcessor<PendingChat> for SegmentationProcessor {
    async fn process(&self, chat: &PendingChat) -> Result<(), ThreadlineError> {
        let days = chats::message_days(&self.db, chat.id).await?;
        let segmented = chats::segmented_days(&self.db, chat.id).await?;
        let api_key = self.api_key(chat).await?;

        let mut total = 0;
        for (day, count) in days {
            if count < self.settings.min_messages_per_day || segmented.contains(&day) {
                continue;
            }
            total += self.segment_day(chat, &day, api_key.clone()).await?;
        }

        info!(chat.id = chat.id, groups = total, "chat segmented");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use threadline_core::AiSource;
    use threadline_test_utils::mock_provider::RecordedRequest;
    use threadline_test_utils::{MockProvider, TestDb};

    fn settings() -> SegmentationSettings {
        SegmentationSettings {
            model: "mistral-small-latest".into(),
            min_messages_per_day: 3,
            temperature: Some(0.0),
            language: "english".into(),
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::new(1, std::time::Duration::ZERO, 2.0, false)
    }

    fn pending(chat_id: i64, owner: i64) -> PendingChat {
        PendingChat {
            id: chat_id,
            name: "chat".into(),
            created_by: Some(owner),
            api_key: None,
        }
    }

    #[test]
    fn reply_shapes() {
        let wrapped = r#"{"conversations": [{"title": "a", "summary": "b", "ids": [1, 2]}]}"#;
        let list = r#"```json
        [{"title": "a", "summary": "b", "ids": [1]}, {"title": "c", "summary": "d", "ids": [2]}]
        ```"#;
        let single = r#"{"title": "a", "summary": "b", "ids": [3]}"#;
        assert_eq!(parse_segments(wrapped).unwrap().len(), 1);
        assert_eq!(parse_segments(list).unwrap().len(), 2);
        assert_eq!(parse_segments(single).unwrap()[0].ids, vec![3]);
    }

    #[test]
    fn group_code_ignores_id_order() {
        assert_eq!(
            group_code(1, "2025-01-01", &[3, 1, 2]),
            group_code(1, "2025-01-01", &[1, 2, 3])
        );
        assert_ne!(
            group_code(1, "2025-01-01", &[1, 2, 3]),
            group_code(1, "2025-01-02", &[1, 2, 3])
        );
    }

    #[tokio::test]
    async fn segments_eligible_days_once() {
        let test_db = TestDb::new().await.unwrap();
        let owner = test_db.user("ann").await.unwrap();
        let chat_id = test_db
            .chat_with_messages(owner, "c1", "2025-01-01", &["hi", "lunch?", "sure", "12:30"])
            .await
            .unwrap();
        let messages = chats::messages_for_day(&test_db.db, chat_id, "2025-01-01")
            .await
            .unwrap();
        let ids: Vec<i64> = messages.iter().map(|m| m.id).collect();

        let reply = serde_json::json!({"conversations": [
            {"title": "Lunch", "summary": "Lunch plans", "ids": [ids[1], ids[2], ids[3], 99999]},
            {"title": "Ghost", "summary": "Nothing", "ids": [424242]}
        ]});
        let provider = Arc::new(MockProvider::with_responses(vec![reply.to_string()]));
        let processor = SegmentationProcessor::new(
            test_db.db.clone(),
            provider.clone(),
            policy(),
            settings(),
        );

        processor.process(&pending(chat_id, owner)).await.unwrap();

        let group_ids = groups::group_ids_for_chat(&test_db.db, chat_id).await.unwrap();
        assert_eq!(group_ids.len(), 1);
        assert_eq!(
            chats::segmented_days(&test_db.db, chat_id).await.unwrap().len(),
            1
        );
        assert!(requests::total_tokens(&test_db.db, REQUEST_KIND).await.unwrap() > 0);

        // A second pass finds the day already segmented and makes no call.
        processor.process(&pending(chat_id, owner)).await.unwrap();
        assert_eq!(provider.requests().await.len(), 1);
    }

    #[tokio::test]
    async fn small_days_are_skipped() {
        let test_db = TestDb::new().await.unwrap();
        let owner = test_db.user("ann").await.unwrap();
        let chat_id = test_db
            .chat_with_messages(owner, "c1", "2025-01-01", &["hi", "bye"])
            .await
            .unwrap();
        let provider = Arc::new(MockProvider::new());
        let processor =
            SegmentationProcessor::new(test_db.db.clone(), provider.clone(), policy(), settings());

        processor.process(&pending(chat_id, owner)).await.unwrap();
        assert!(provider.requests().await.is_empty());
    }

    #[tokio::test]
    async fn uses_the_creators_key() {
        let test_db = TestDb::new().await.unwrap();
        let owner = test_db.user("ann").await.unwrap();
        users::set_api_key(&test_db.db, owner, AiSource::Mistral, "ann-key")
            .await
            .unwrap();
        let chat_id = test_db
            .chat_with_messages(owner, "c1", "2025-01-01", &["a", "b", "c"])
            .await
            .unwrap();
        let provider = Arc::new(MockProvider::new());
        let processor =
            SegmentationProcessor::new(test_db.db.clone(), provider.clone(), policy(), settings());

        processor.process(&pending(chat_id, owner)).await.unwrap();
        match &provider.requests().await[0] {
            RecordedRequest::Completion { api_key, .. } => {
                assert_eq!(api_key.as_deref(), Some("ann-key"));
            }
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[tokio::test]
    async fn provider_failure_is_returned() {
        let test_db = TestDb::new().await.unwrap();
        let owner = test_db.user("ann").await.unwrap();
        let chat_id = test_db
            .chat_with_messages(owner, "c1", "2025-01-01", &["a", "b", "c"])
            .await
            .unwrap();
        let provider = Arc::new(MockProvider::new());
        provider
            .push_completion(Err(ThreadlineError::QuotaExhausted {
                message: "monthly".into(),
            }))
            .await;
        let processor =
            SegmentationProcessor::new(test_db.db.clone(), provider.clone(), policy(), settings());

        let err = processor.process(&pending(chat_id, owner)).await.unwrap_err();
        assert!(matches!(err, ThreadlineError::QuotaExhausted { .. }));
        assert!(groups::group_ids_for_chat(&test_db.db, chat_id).await.unwrap().is_empty());
    }
}
