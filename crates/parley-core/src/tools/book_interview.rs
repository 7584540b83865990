//! Interview booking tool
//!
//! Arguments are free text. The schema only requires the four fields to be
//! non-empty strings; no date or time format is enforced.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::booking::{BookingService, NewBooking};
use crate::errors::AgentError;
use crate::llm::ToolMetadata;
use crate::tools::Tool;

pub const BOOK_INTERVIEW: &str = "book_interview";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookInterviewArgs {
    pub full_name: String,
    pub email: String,
    pub date: String,
    pub time: String,
}

impl From<BookInterviewArgs> for NewBooking {
    fn from(args: BookInterviewArgs) -> Self {
        NewBooking {
            full_name: args.full_name.trim().to_string(),
            email: args.email.trim().to_string(),
            interview_date: args.date.trim().to_string(),
            interview_time: args.time.trim().to_string(),
        }
    }
}

pub struct BookInterviewTool {
    service: Arc<BookingService>,
}

impl BookInterviewTool {
    pub fn new(service: Arc<BookingService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for BookInterviewTool {
    fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            name: BOOK_INTERVIEW.to_string(),
            description: "Books an interview slot for a candidate and emails them a confirmation. \
                          Only call this once the full name, email, date and time are all known."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "full_name": {
                        "type": "string",
                        "description": "The candidate's full name",
                        "minLength": 1
                    },
                    "email": {
                        "type": "string",
                        "description": "Email address the confirmation is sent to",
                        "minLength": 1
                    },
                    "date": {
                        "type": "string",
                        "description": "Interview date as stated by the candidate",
                        "minLength": 1
                    },
                    "time": {
                        "type": "string",
                        "description": "Interview time as stated by the candidate",
                        "minLength": 1
                    }
                },
                "required": ["full_name", "email", "date", "time"]
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<String, AgentError> {
        let args: BookInterviewArgs =
            serde_json::from_value(arguments).map_err(|e| AgentError::ArgumentValidation {
                tool_name: BOOK_INTERVIEW.to_string(),
                message: e.to_string(),
            })?;

        let booking = NewBooking::from(args);
        booking.validate()?;

        log::info!(
            "Booking interview for {} <{}> on {} at {}",
            booking.full_name,
            booking.email,
            booking.interview_date,
            booking.interview_time
        );
        Ok(self.service.book(booking).await.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::{BookingStore, InMemoryBookingStore};
    use crate::mail::{LogMailer, MailSettings};

    fn tool() -> (BookInterviewTool, Arc<InMemoryBookingStore>) {
        let store = Arc::new(InMemoryBookingStore::new());
        let service = BookingService::new(
            store.clone(),
            Arc::new(LogMailer),
            MailSettings {
                sender: "hr@example.com".to_string(),
                organization: "Palm Mind Technology".to_string(),
                bcc: None,
            },
        );
        (BookInterviewTool::new(Arc::new(service)), store)
    }

    #[tokio::test]
    async fn test_books_with_trimmed_fields() {
        let (tool, store) = tool();
        let result = tool
            .execute(json!({
                "full_name": " Jane Doe ",
                "email": "jane@example.com",
                "date": "Jan 5th",
                "time": "3pm"
            }))
            .await
            .unwrap();

        assert!(result.contains("booked successfully"));
        let records = store.list().await.unwrap();
        assert_eq!(records[0].full_name, "Jane Doe");
        assert_eq!(records[0].interview_date, "Jan 5th");
    }

    #[tokio::test]
    async fn test_missing_field_is_rejected() {
        let (tool, store) = tool();
        let err = tool
            .execute(json!({"full_name": "Jane Doe", "email": "jane@example.com", "date": "Jan 5th"}))
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::ArgumentValidation { .. }));
        assert!(store.list().await.unwrap().is_empty());
    }
}
