use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Deserializer};
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use super::json_body;
use crate::error::BookingError;
use crate::models::User;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", post(upsert_user))
        .route("/users/{user_id}", get(get_user))
}

// POST /users
// Клиент после входа регистрирует пользователя, чтобы брони показывали имя
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpsertUserRequest {
    #[serde(alias = "User_id", alias = "id")]
    #[validate(length(min = 1, max = 128))]
    pub user_id: String,
    // пустой email = не указан, как и в сервисе
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(email)]
    pub email: Option<String>,
    #[serde(alias = "Name")]
    #[validate(length(min = 1, max = 200))]
    pub name: String,
}

fn blank_as_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()))
}

async fn upsert_user(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<UpsertUserRequest>, JsonRejection>,
) -> Result<impl IntoResponse, BookingError> {
    let req = json_body(payload)?;
    let user = state
        .bookings
        .upsert_user(User {
            user_id: req.user_id,
            email: req.email,
            name: req.name,
        })
        .await?;
    tracing::debug!("user {} upserted", user.user_id);
    Ok(Json(json!({ "user": user })))
}

// GET /users/{user_id}
async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, BookingError> {
    let user = state.bookings.find_user(&user_id).await?;
    Ok(Json(json!({ "user": user })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(body: serde_json::Value) -> UpsertUserRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn blank_email_counts_as_absent() {
        let req = request(json!({ "userId": "u1", "email": "  ", "name": "Alice" }));
        assert_eq!(req.email, None);
        assert!(req.validate().is_ok());

        let req = request(json!({ "userId": "u1", "email": null, "name": "Alice" }));
        assert_eq!(req.email, None);
        let req = request(json!({ "userId": "u1", "name": "Alice" }));
        assert_eq!(req.email, None);
    }

    #[test]
    fn malformed_email_is_rejected() {
        let req = request(json!({ "userId": "u1", "email": "not-an-email", "name": "Alice" }));
        assert!(req.validate().is_err());
        let req = request(json!({ "id": "u1", "email": "alice@example.com", "Name": "Alice" }));
        assert!(req.validate().is_ok());
    }
}
