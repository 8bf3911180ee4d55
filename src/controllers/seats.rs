use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde_json::json;
use std::sync::Arc;

use crate::error::BookingError;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/seats", get(get_seats))
}

// GET /seats - клиент сопоставляет метку места на плане с его seatId
async fn get_seats(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, BookingError> {
    let seats = state.bookings.list_seats().await?;
    Ok(Json(json!({ "seats": seats })))
}
