pub mod bookings;
pub mod changes;
pub mod seats;
pub mod users;

use axum::{extract::rejection::JsonRejection, routing::get, Json, Router};
use chrono::NaiveDate;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::error::BookingError;

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .route("/", get(|| async { "Seat Booking API v1.0" }))
        .route("/health", get(|| async { "OK" }))
        .merge(seats::routes())
        .merge(bookings::routes())
        .merge(users::routes())
        .merge(changes::routes())
}

/* ---------- helpers ---------- */

// Тело запроса: ошибки разбора и валидации -> 400 с полем error
fn json_body<T: Validate>(payload: Result<Json<T>, JsonRejection>) -> Result<T, BookingError> {
    let Json(body) = payload.map_err(|e| BookingError::InvalidInput(e.body_text()))?;
    body.validate()
        .map_err(|e| BookingError::InvalidInput(e.to_string()))?;
    Ok(body)
}

/// `YYYY-MM-DD`; старый клиент присылает `created_at` с временем, оно отбрасывается.
fn parse_date(raw: &str) -> Result<NaiveDate, BookingError> {
    let raw = raw.trim();
    let day = match raw.char_indices().nth(10) {
        Some((idx, 'T' | ' ')) => &raw[..idx],
        _ => raw,
    };
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|_| BookingError::InvalidInput(format!("invalid date '{raw}', expected YYYY-MM-DD")))
}

fn parse_booking_id(raw: &str) -> Result<Uuid, BookingError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| BookingError::InvalidInput(format!("invalid booking id '{raw}'")))
}
