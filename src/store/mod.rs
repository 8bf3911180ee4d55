//! Хранилище мест, пользователей и броней.
//!
//! Сервис бронирования работает с `BookingStore` и не знает, что под ним:
//! Postgres в проде или `MemoryStore` в тестах и локальном демо.
//! Оба бэкенда гарантируют на уровне записи, что интервалы броней одного места
//! в один день не пересекаются (`StoreError::RangeOverlap`).

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Booking, BookingQuery, NewBooking, Seat, User};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Нарушено ограничение на пересечение интервалов одного места и дня.
    #[error("time range overlaps an existing booking")]
    RangeOverlap,
    /// Ссылка на несуществующее место или пользователя.
    #[error("missing referenced row: {0}")]
    MissingReference(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn list_seats(&self) -> StoreResult<Vec<Seat>>;

    async fn find_seat_by_id(&self, seat_id: i64) -> StoreResult<Option<Seat>>;

    async fn find_seat_by_number(&self, seat_number: &str) -> StoreResult<Option<Seat>>;

    async fn find_user(&self, user_id: &str) -> StoreResult<Option<User>>;

    async fn upsert_user(&self, user: &User) -> StoreResult<User>;

    /// Брони по фильтру, упорядочены по дате, номеру места и времени создания.
    async fn list_bookings(&self, query: &BookingQuery) -> StoreResult<Vec<Booking>>;

    /// Все брони места на дату, кроме `exclude` (при редактировании).
    async fn bookings_for_seat_date(
        &self,
        seat_id: i64,
        date: NaiveDate,
        exclude: Option<Uuid>,
    ) -> StoreResult<Vec<Booking>>;

    async fn find_booking(&self, booking_id: Uuid) -> StoreResult<Option<Booking>>;

    async fn insert_booking(&self, booking: &NewBooking) -> StoreResult<Booking>;

    /// Атомарно заменяет место, дату и интервалы брони. `None` - брони нет.
    async fn replace_booking(
        &self,
        booking_id: Uuid,
        booking: &NewBooking,
    ) -> StoreResult<Option<Booking>>;

    /// Удаляет бронь и возвращает удалённую строку. `None` - брони нет.
    async fn delete_booking(&self, booking_id: Uuid) -> StoreResult<Option<Booking>>;
}
