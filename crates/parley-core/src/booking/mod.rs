//! Interview booking: persist the booking, then confirm it by email
//!
//! The booking is committed before any mail is sent, and an unsaved booking
//! never produces a confirmation. The outcome is reported as a
//! `BookingStatus` that tells the candidate which half of the work succeeded.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::errors::AgentError;
use crate::mail::{ConfirmationEmail, MailSettings, Mailer};
use crate::storage::Database;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewBooking {
    pub full_name: String,
    pub email: String,
    pub interview_date: String,
    pub interview_time: String,
}

impl NewBooking {
    /// All fields are free text and only required to be non-blank.
    pub fn validate(&self) -> Result<(), AgentError> {
        let fields = [
            ("full_name", &self.full_name),
            ("email", &self.email),
            ("date", &self.interview_date),
            ("time", &self.interview_time),
        ];
        let missing: Vec<&str> = fields
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(AgentError::ArgumentValidation {
                tool_name: "book_interview".to_string(),
                message: format!("empty fields: {}", missing.join(", ")),
            })
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookingRecord {
    pub id: i64,
    pub full_name: String,
    pub email: String,
    pub interview_date: String,
    pub interview_time: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn save(&self, booking: NewBooking) -> Result<BookingRecord, AgentError>;
    async fn list(&self) -> Result<Vec<BookingRecord>, AgentError>;
}

pub struct SqliteBookingStore {
    db: Database,
}

impl SqliteBookingStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl BookingStore for SqliteBookingStore {
    async fn save(&self, booking: NewBooking) -> Result<BookingRecord, AgentError> {
        let created_at = Utc::now();
        let row = booking.clone();
        let id = self
            .db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO bookings (full_name, email, interview_date, interview_time, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        row.full_name,
                        row.email,
                        row.interview_date,
                        row.interview_time,
                        created_at.to_rfc3339()
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;

        Ok(BookingRecord {
            id,
            full_name: booking.full_name,
            email: booking.email,
            interview_date: booking.interview_date,
            interview_time: booking.interview_time,
            created_at,
        })
    }

    async fn list(&self) -> Result<Vec<BookingRecord>, AgentError> {
        let rows: Vec<(i64, String, String, String, String, String)> = self
            .db
            .execute(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, full_name, email, interview_date, interview_time, created_at
                     FROM bookings ORDER BY id",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(id, full_name, email, interview_date, interview_time, created_at)| {
                Ok(BookingRecord {
                    id,
                    full_name,
                    email,
                    interview_date,
                    interview_time,
                    created_at: DateTime::parse_from_rfc3339(&created_at)
                        .map_err(|e| AgentError::Storage(format!("Invalid timestamp: {}", e)))?
                        .with_timezone(&Utc),
                })
            })
            .collect()
    }
}

#[derive(Default)]
pub struct InMemoryBookingStore {
    records: Mutex<Vec<BookingRecord>>,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn save(&self, booking: NewBooking) -> Result<BookingRecord, AgentError> {
        let mut records = self.records.lock().await;
        let record = BookingRecord {
            id: records.len() as i64 + 1,
            full_name: booking.full_name,
            email: booking.email,
            interview_date: booking.interview_date,
            interview_time: booking.interview_time,
            created_at: Utc::now(),
        };
        records.push(record.clone());
        Ok(record)
    }

    async fn list(&self) -> Result<Vec<BookingRecord>, AgentError> {
        Ok(self.records.lock().await.clone())
    }
}

/// Outcome of one booking attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum BookingStatus {
    Confirmed(BookingRecord),
    SavedEmailFailed { booking: BookingRecord, error: String },
    NotSaved { error: String },
}

impl BookingStatus {
    pub fn is_saved(&self) -> bool {
        !matches!(self, BookingStatus::NotSaved { .. })
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingStatus::Confirmed(booking) => write!(
                f,
                "Interview booked successfully for {} on {} at {}. A confirmation email has been sent to {}.",
                booking.full_name, booking.interview_date, booking.interview_time, booking.email
            ),
            BookingStatus::SavedEmailFailed { booking, error } => write!(
                f,
                "Booking saved for {} on {} at {}, but failed to send the confirmation email: {}",
                booking.full_name, booking.interview_date, booking.interview_time, error
            ),
            BookingStatus::NotSaved { error } => write!(
                f,
                "Failed to save booking to database: {}. No confirmation email was sent.",
                error
            ),
        }
    }
}

pub struct BookingService {
    store: Arc<dyn BookingStore>,
    mailer: Arc<dyn Mailer>,
    mail: MailSettings,
}

impl BookingService {
    pub fn new(store: Arc<dyn BookingStore>, mailer: Arc<dyn Mailer>, mail: MailSettings) -> Self {
        Self { store, mailer, mail }
    }

    pub async fn book(&self, booking: NewBooking) -> BookingStatus {
        let record = match self.store.save(booking).await {
            Ok(record) => record,
            Err(e) => {
                log::error!("Failed to save booking: {}", e);
                return BookingStatus::NotSaved {
                    error: e.to_string(),
                };
            }
        };
        log::info!("Saved booking {} for {}", record.id, record.email);

        let email = ConfirmationEmail::for_booking(&record, &self.mail);
        match self.mailer.send(&email).await {
            Ok(()) => BookingStatus::Confirmed(record),
            Err(e) => {
                log::error!("Booking {} saved but confirmation email failed: {}", record.id, e);
                BookingStatus::SavedEmailFailed {
                    booking: record,
                    error: e.to_string(),
                }
            }
        }
    }
}
