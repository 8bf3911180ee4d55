use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::timeslot::{Timeslot, TimeslotEncoding};

/// Бронь в том виде, в каком она лежит в хранилище.
///
/// `timeslot` остаётся в исходной кодировке: старые строки содержат тег,
/// новые - список интервалов. Разворачивает её только сервис бронирования.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub booking_id: Uuid,
    pub seat_id: i64,
    pub seat_number: String,
    pub date: NaiveDate,
    pub timeslot: TimeslotEncoding,
    pub user_id: String,
    pub user_name: String,
    pub created_at: DateTime<Utc>,
}

/// Проверенные данные для записи новой или замены существующей брони.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBooking {
    pub seat_id: i64,
    pub seat_number: String,
    pub date: NaiveDate,
    pub timeslot: Timeslot,
    pub user_id: String,
    pub user_name: String,
}

/// Фильтр выборки на стороне хранилища; все условия через AND.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingQuery {
    pub date: Option<NaiveDate>,
    pub section: Option<String>,
    pub user_id: Option<String>,
}
