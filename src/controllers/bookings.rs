use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use validator::Validate;

use super::{json_body, parse_booking_id, parse_date};
use crate::error::BookingError;
use crate::models::TimeslotEncoding;
use crate::services::{BookingFilter, ReserveRequest, SeatRef, UpdateRequest};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bookings", get(list_bookings))
        .route("/bookings", post(create_booking))
        .route("/bookings/user/{user_id}", get(bookings_by_user))
        .route("/bookings/section/{section}/date/{date}", get(bookings_by_section_date))
        .route(
            "/bookings/section/{section}/date/{date}/timeslot/{timeslot}",
            get(bookings_by_section_date_slot),
        )
        .route("/bookings/date/{date}/timeslot/{timeslot}", get(bookings_by_date_slot))
        .route("/bookings/{id}", put(update_booking).delete(cancel_booking))
}

/* ---------- helpers ---------- */

// seatId бывает числом, строкой с числом или меткой места ("A5", "Square-A5")
fn seat_ref(seat_id: Option<Value>, seat_number: Option<String>) -> Result<Option<SeatRef>, BookingError> {
    if let Some(id) = seat_id {
        return match id {
            Value::Number(n) => n
                .as_i64()
                .map(|id| Some(SeatRef::Id(id)))
                .ok_or_else(|| BookingError::InvalidInput(format!("invalid seatId {n}"))),
            Value::String(s) => Ok(Some(match s.trim().parse::<i64>() {
                Ok(id) => SeatRef::Id(id),
                Err(_) => SeatRef::Number(s),
            })),
            Value::Null => Ok(seat_number.map(SeatRef::Number)),
            other => Err(BookingError::InvalidInput(format!("invalid seatId {other}"))),
        };
    }
    Ok(seat_number.map(SeatRef::Number))
}

fn timeslot(value: &Value) -> Result<TimeslotEncoding, BookingError> {
    Ok(TimeslotEncoding::decode(value)?)
}

fn bookings_json(bookings: Vec<crate::models::Booking>) -> Json<Value> {
    Json(json!({ "bookings": bookings }))
}

/* ---------- CREATE ---------- */

// POST /bookings
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    #[serde(alias = "created_at")]
    pub date: Option<String>,
    #[serde(alias = "Seat_id")]
    pub seat_id: Option<Value>,
    #[serde(alias = "Seat_Number")]
    #[validate(length(min = 1, max = 32))]
    pub seat_number: Option<String>,
    #[serde(alias = "Timeslot")]
    pub timeslot: Option<Value>,
    #[serde(alias = "User_id")]
    #[validate(length(min = 1, max = 128))]
    pub user_id: Option<String>,
}

async fn create_booking(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateBookingRequest>, JsonRejection>,
) -> Result<impl IntoResponse, BookingError> {
    let req = json_body(payload)?;

    let mut missing = Vec::new();
    if req.date.is_none() {
        missing.push("date");
    }
    if req.seat_id.as_ref().map_or(true, Value::is_null) && req.seat_number.is_none() {
        missing.push("seatId");
    }
    if req.timeslot.as_ref().map_or(true, Value::is_null) {
        missing.push("timeslot");
    }
    if req.user_id.is_none() {
        missing.push("userId");
    }
    if !missing.is_empty() {
        tracing::warn!("create_booking: missing fields {:?}", missing);
        return Err(BookingError::InvalidInput(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )));
    }

    let (Some(date), Some(slot), Some(user_id)) = (req.date, req.timeslot, req.user_id) else {
        return Err(BookingError::InvalidInput("Missing required fields".to_string()));
    };
    let Some(seat) = seat_ref(req.seat_id, req.seat_number)? else {
        return Err(BookingError::InvalidInput("Missing required fields: seatId".to_string()));
    };

    let booking = state
        .bookings
        .check_and_reserve(ReserveRequest {
            seat,
            date: parse_date(&date)?,
            timeslot: timeslot(&slot)?,
            user_id,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(json!({ "booking": booking }))))
}

/* ---------- UPDATE / CANCEL ---------- */

// PUT /bookings/{id}
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBookingRequest {
    #[serde(alias = "created_at")]
    pub date: Option<String>,
    #[serde(alias = "Seat_id")]
    pub seat_id: Option<Value>,
    #[serde(alias = "Seat_Number")]
    #[validate(length(min = 1, max = 32))]
    pub seat_number: Option<String>,
    #[serde(alias = "Timeslot")]
    pub timeslot: Option<Value>,
}

async fn update_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateBookingRequest>, JsonRejection>,
) -> Result<impl IntoResponse, BookingError> {
    let booking_id = parse_booking_id(&id)?;
    let req = json_body(payload)?;

    let update = UpdateRequest {
        seat: seat_ref(req.seat_id, req.seat_number)?,
        date: req.date.as_deref().map(parse_date).transpose()?,
        timeslot: req
            .timeslot
            .filter(|v| !v.is_null())
            .map(|v| timeslot(&v))
            .transpose()?,
    };
    if update.seat.is_none() && update.date.is_none() && update.timeslot.is_none() {
        return Err(BookingError::InvalidInput(
            "nothing to update: expected date, seatId or timeslot".to_string(),
        ));
    }

    let booking = state.bookings.update(booking_id, update).await?;
    Ok(Json(json!({ "booking": booking })))
}

// DELETE /bookings/{id}
async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, BookingError> {
    let booking_id = parse_booking_id(&id)?;
    state.bookings.cancel(booking_id).await?;
    Ok(Json(json!({ "success": true })))
}

/* ---------- QUERIES ---------- */

// GET /bookings
async fn list_bookings(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, BookingError> {
    let bookings = state.bookings.list_bookings(BookingFilter::All).await?;
    Ok(bookings_json(bookings))
}

// GET /bookings/user/{user_id}
async fn bookings_by_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, BookingError> {
    let bookings = state.bookings.list_bookings(BookingFilter::User(user_id)).await?;
    Ok(bookings_json(bookings))
}

// GET /bookings/section/{section}/date/{date}
async fn bookings_by_section_date(
    State(state): State<Arc<AppState>>,
    Path((section, date)): Path<(String, String)>,
) -> Result<impl IntoResponse, BookingError> {
    let filter = BookingFilter::Section { section, date: parse_date(&date)?, slot: None };
    let bookings = state.bookings.list_bookings(filter).await?;
    Ok(bookings_json(bookings))
}

// GET /bookings/section/{section}/date/{date}/timeslot/{timeslot}
async fn bookings_by_section_date_slot(
    State(state): State<Arc<AppState>>,
    Path((section, date, slot)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, BookingError> {
    let filter = BookingFilter::Section { section, date: parse_date(&date)?, slot: Some(slot) };
    let bookings = state.bookings.list_bookings(filter).await?;
    Ok(bookings_json(bookings))
}

// GET /bookings/date/{date}/timeslot/{timeslot}
async fn bookings_by_date_slot(
    State(state): State<Arc<AppState>>,
    Path((date, slot)): Path<(String, String)>,
) -> Result<impl IntoResponse, BookingError> {
    let filter = BookingFilter::Date { date: parse_date(&date)?, slot: Some(slot) };
    let bookings = state.bookings.list_bookings(filter).await?;
    Ok(bookings_json(bookings))
}
