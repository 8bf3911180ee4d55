use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// Ссылка на пользователя из внешнего провайдера аутентификации.
// Сервис хранит только то, что нужно для отображения имени в брони
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub user_id: String,
    pub email: Option<String>,
    pub name: String,
}
