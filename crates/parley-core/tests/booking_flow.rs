mod common;

use async_trait::async_trait;
use common::{call, ScriptedLLM};
use parley_core::agent::AgentConfig;
use parley_core::booking::{BookingService, BookingStore, SqliteBookingStore};
use parley_core::chat::ChatService;
use parley_core::core_types::{LLMResponse, Role};
use parley_core::errors::AgentError;
use parley_core::mail::{ConfirmationEmail, MailSettings, Mailer};
use parley_core::memory::{ConversationHistoryStore, InMemoryHistoryStore};
use parley_core::storage::Database;
use parley_core::tools::{BookInterviewTool, ToolRegistry};
use serde_json::json;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<ConfirmationEmail>>,
    fail: bool,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &ConfirmationEmail) -> Result<(), AgentError> {
        if self.fail {
            return Err(AgentError::Mail("SMTP relay returned 503".to_string()));
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

struct Fixture {
    chat: ChatService,
    bookings: Arc<SqliteBookingStore>,
    mailer: Arc<RecordingMailer>,
    history: Arc<InMemoryHistoryStore>,
    llm: Arc<ScriptedLLM>,
}

async fn fixture(llm: Arc<ScriptedLLM>, mail_fails: bool) -> Fixture {
    let db = Database::open_in_memory().await.unwrap();
    let bookings = Arc::new(SqliteBookingStore::new(db));
    let mailer = Arc::new(RecordingMailer {
        fail: mail_fails,
        ..Default::default()
    });
    let service = BookingService::new(
        bookings.clone(),
        mailer.clone(),
        MailSettings {
            sender: "hr@palmmind.example".to_string(),
            organization: "Palm Mind Technology".to_string(),
            bcc: Some("recruiting@palmmind.example".to_string()),
        },
    );

    let mut registry = ToolRegistry::new();
    registry
        .register(Arc::new(BookInterviewTool::new(Arc::new(service))))
        .unwrap();

    let history = Arc::new(InMemoryHistoryStore::new());
    let chat = ChatService::new(
        llm.clone(),
        Arc::new(registry),
        history.clone(),
        &AgentConfig::default(),
    )
    .unwrap();

    Fixture {
        chat,
        bookings,
        mailer,
        history,
        llm,
    }
}

fn jane_booking(id: &str) -> LLMResponse {
    LLMResponse::calls(vec![call(
        id,
        "book_interview",
        json!({
            "full_name": "Jane Doe",
            "email": "jane@example.com",
            "date": "Jan 5th",
            "time": "3pm"
        }),
    )])
}

#[tokio::test]
async fn booking_request_is_saved_and_confirmed() {
    let llm = ScriptedLLM::new(vec![
        Ok(jane_booking("call_1")),
        Ok(LLMResponse::text(
            "You're booked for Jan 5th at 3pm, Jane. A confirmation was sent to jane@example.com.",
        )),
    ]);
    let f = fixture(llm, false).await;

    let reply = f
        .chat
        .invoke("s1", "Book me for Jan 5th at 3pm, I'm Jane Doe, jane@example.com")
        .await
        .unwrap();
    assert!(reply.response.contains("Jan 5th at 3pm"));

    let records = f.bookings.list().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].full_name, "Jane Doe");
    assert_eq!(records[0].interview_time, "3pm");

    let sent = f.mailer.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "jane@example.com");
    assert_eq!(sent[0].bcc.as_deref(), Some("recruiting@palmmind.example"));
    assert_eq!(sent[0].subject, "Interview Confirmation - Palm Mind Technology");

    let tool_result = f.llm.request(1).last().cloned().unwrap();
    assert_eq!(tool_result.role, Role::Tool);
    assert!(tool_result.content.contains("booked successfully"));
}

#[tokio::test]
async fn email_failure_still_keeps_the_booking() {
    let llm = ScriptedLLM::new(vec![
        Ok(jane_booking("call_1")),
        Ok(LLMResponse::text("Your booking is saved but the email could not be sent.")),
    ]);
    let f = fixture(llm, true).await;

    f.chat
        .invoke("s1", "Book me for Jan 5th at 3pm, I'm Jane Doe, jane@example.com")
        .await
        .unwrap();

    assert_eq!(f.bookings.list().await.unwrap().len(), 1);
    let status = f.llm.request(1).last().cloned().unwrap().content;
    assert!(status.contains("Booking saved"));
    assert!(status.contains("failed to send the confirmation email"));
    assert!(status.contains("SMTP relay returned 503"));
}

#[tokio::test]
async fn identical_requests_create_independent_bookings() {
    let llm = ScriptedLLM::new(vec![
        Ok(jane_booking("call_1")),
        Ok(LLMResponse::text("Booked.")),
        Ok(jane_booking("call_2")),
        Ok(LLMResponse::text("Booked again.")),
    ]);
    let f = fixture(llm, false).await;

    for _ in 0..2 {
        f.chat
            .invoke("s1", "Book me for Jan 5th at 3pm, I'm Jane Doe, jane@example.com")
            .await
            .unwrap();
    }

    let records = f.bookings.list().await.unwrap();
    assert_eq!(records.len(), 2);
    assert_ne!(records[0].id, records[1].id);
    assert_eq!(f.mailer.sent.lock().unwrap().len(), 2);
    assert_eq!(f.history.read("s1").await.unwrap().len(), 8);
}

#[tokio::test]
async fn incomplete_booking_arguments_are_reported_back() {
    let llm = ScriptedLLM::new(vec![
        Ok(LLMResponse::calls(vec![call(
            "call_1",
            "book_interview",
            json!({"full_name": "Jane Doe", "email": "jane@example.com", "date": "", "time": "3pm"}),
        )])),
        Ok(LLMResponse::text("Which date would you like?")),
    ]);
    let f = fixture(llm, false).await;

    let reply = f.chat.invoke("s1", "Book me at 3pm").await.unwrap();
    assert_eq!(reply.response, "Which date would you like?");
    assert!(f.bookings.list().await.unwrap().is_empty());

    let tool_result = f.llm.request(1).last().cloned().unwrap();
    assert!(tool_result.content.starts_with("Error executing tool 'book_interview' (call call_1)"));
}
