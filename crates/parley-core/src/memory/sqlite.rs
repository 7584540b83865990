use async_trait::async_trait;
use chrono::Utc;
use rusqlite::params;

use crate::core_types::{Message, Role, ToolCall};
use crate::errors::AgentError;
use crate::memory::ConversationHistoryStore;
use crate::storage::Database;

/// History persisted in the `messages` table. Tool calls are stored as JSON.
pub struct SqliteHistoryStore {
    db: Database,
}

impl SqliteHistoryStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

type MessageRow = (String, String, Option<String>, Option<String>);

fn decode(row: MessageRow) -> Result<Message, AgentError> {
    let (role, content, tool_calls, tool_call_id) = row;
    let role = Role::parse(&role)
        .ok_or_else(|| AgentError::History(format!("Unknown role in history: {}", role)))?;
    let tool_calls = match tool_calls {
        Some(json) => Some(
            serde_json::from_str::<Vec<ToolCall>>(&json)
                .map_err(|e| AgentError::History(format!("Corrupt tool calls in history: {}", e)))?,
        ),
        None => None,
    };

    Ok(Message {
        role,
        content,
        tool_call_id,
        tool_calls,
    })
}

#[async_trait]
impl ConversationHistoryStore for SqliteHistoryStore {
    async fn read(&self, session_id: &str) -> Result<Vec<Message>, AgentError> {
        let session_id = session_id.to_string();
        let rows: Vec<MessageRow> = self
            .db
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT role, content, tool_calls, tool_call_id FROM messages
                     WHERE session_id = ?1 ORDER BY id",
                )?;
                let rows = stmt
                    .query_map(params![session_id], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter().map(decode).collect()
    }

    async fn append(&self, session_id: &str, messages: &[Message]) -> Result<(), AgentError> {
        if messages.is_empty() {
            return Ok(());
        }

        let mut rows = Vec::with_capacity(messages.len());
        for message in messages {
            let tool_calls = match &message.tool_calls {
                Some(calls) => Some(serde_json::to_string(calls)?),
                None => None,
            };
            rows.push((
                message.role.as_str(),
                message.content.clone(),
                tool_calls,
                message.tool_call_id.clone(),
            ));
        }

        let session_id = session_id.to_string();
        let created_at = Utc::now().to_rfc3339();
        let count = rows.len();
        self.db
            .execute(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO messages (session_id, role, content, tool_calls, tool_call_id, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    )?;
                    for (role, content, tool_calls, tool_call_id) in &rows {
                        stmt.execute(params![session_id, role, content, tool_calls, tool_call_id, created_at])?;
                    }
                }
                tx.commit()
            })
            .await?;

        log::debug!("Appended {} messages to history", count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_round_trip_preserves_fields() {
        let store = SqliteHistoryStore::new(Database::open_in_memory().await.unwrap());
        let call = ToolCall::new("call_1", "document_retriever", json!({"query": "leave policy"}));
        let turns = vec![
            Message::user("What is the leave policy?"),
            Message::assistant_with_calls("", vec![call]),
            Message::tool_result("call_1", "20 days per year"),
            Message::assistant("You get 20 days of leave per year."),
        ];

        store.append("s1", &turns).await.unwrap();
        assert_eq!(store.read("s1").await.unwrap(), turns);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated_and_ordered() {
        let store = SqliteHistoryStore::new(Database::open_in_memory().await.unwrap());
        store.append("a", &[Message::user("one")]).await.unwrap();
        store.append("b", &[Message::user("other")]).await.unwrap();
        store.append("a", &[Message::assistant("two")]).await.unwrap();

        let a = store.read("a").await.unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].content, "one");
        assert_eq!(a[1].content, "two");
        assert_eq!(store.read("b").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_history_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.db");

        let store = SqliteHistoryStore::new(Database::open(&path).await.unwrap());
        store.append("s1", &[Message::user("remember me")]).await.unwrap();
        drop(store);

        let reopened = SqliteHistoryStore::new(Database::open(&path).await.unwrap());
        assert_eq!(reopened.read("s1").await.unwrap()[0].content, "remember me");
    }
}
