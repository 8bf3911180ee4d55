use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::NaiveDate;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{TimeRange, TimeslotError};
use crate::store::StoreError;

pub const CONFLICT_MESSAGE: &str = "This seat is already booked for the selected date and timeslot.";

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Invalid seat: {0}")]
    SeatNotFound(String),

    #[error("Invalid user: {0}")]
    InvalidUser(String),

    #[error("This seat is already booked for the selected date and timeslot. Seat {seat_number} on {date} is taken at {range}.")]
    Conflict {
        seat_number: String,
        date: NaiveDate,
        range: String,
    },

    #[error("Booking {0} not found")]
    NotFound(Uuid),

    #[error("User {0} not found")]
    UserNotFound(String),

    #[error("storage failure: {0}")]
    Store(#[from] StoreError),
}

impl BookingError {
    pub fn conflict(seat_number: &str, date: NaiveDate, range: Option<TimeRange>) -> Self {
        BookingError::Conflict {
            seat_number: seat_number.to_string(),
            date,
            range: range.map_or_else(|| "the requested time".to_string(), |r| r.to_string()),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            BookingError::InvalidInput(_)
            | BookingError::SeatNotFound(_)
            | BookingError::InvalidUser(_) => StatusCode::BAD_REQUEST,
            BookingError::Conflict { .. } => StatusCode::CONFLICT,
            BookingError::NotFound(_) | BookingError::UserNotFound(_) => StatusCode::NOT_FOUND,
            BookingError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<TimeslotError> for BookingError {
    fn from(e: TimeslotError) -> Self {
        BookingError::InvalidInput(e.to_string())
    }
}

impl IntoResponse for BookingError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            BookingError::Store(e) => {
                tracing::error!("store error: {:?}", e);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_taxonomy_to_status_codes() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let cases = [
            (BookingError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (BookingError::SeatNotFound("Z9".into()), StatusCode::BAD_REQUEST),
            (BookingError::InvalidUser("u".into()), StatusCode::BAD_REQUEST),
            (BookingError::conflict("A5", date, None), StatusCode::CONFLICT),
            (BookingError::NotFound(Uuid::nil()), StatusCode::NOT_FOUND),
            (BookingError::Store(StoreError::RangeOverlap), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.status(), status, "{err:?}");
        }
    }

    #[test]
    fn conflict_message_names_seat_date_and_range() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let range = TimeRange::parse("09:00", "10:00").unwrap();
        let msg = BookingError::conflict("A5", date, Some(range)).to_string();
        assert!(msg.starts_with(CONFLICT_MESSAGE));
        assert!(msg.contains("A5") && msg.contains("2024-06-01") && msg.contains("09:00-10:00"));
    }

    #[test]
    fn store_errors_do_not_leak_details() {
        let resp = BookingError::Store(StoreError::MissingReference("secret".into())).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
