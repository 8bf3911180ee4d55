use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{BookingStore, StoreError, StoreResult};
use crate::models::seat::in_section;
use crate::models::{Booking, BookingQuery, NewBooking, Seat, TimeRange, TimeslotEncoding, User};

const SECTIONS: [&str; 4] = ["A", "B", "C", "D"];
const SEATS_PER_SECTION: usize = 16;

/// Хранилище в памяти процесса.
///
/// Повторяет поведение `PgStore`, включая запрет пересечений на записи,
/// поэтому годится и для тестов, и для локального запуска без Postgres.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Tables>,
}

#[derive(Default)]
struct Tables {
    seats: Vec<Seat>,
    users: HashMap<String, User>,
    bookings: Vec<Booking>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Секции A-D по 16 мест, как в миграции `0002_seed_seats.sql`.
    pub fn seeded() -> Self {
        let numbers = SECTIONS
            .iter()
            .flat_map(|s| (1..=SEATS_PER_SECTION).map(move |n| format!("{s}{n}")));
        Self::with_seats(numbers)
    }

    pub fn with_seats<I, S>(numbers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let seats = numbers
            .into_iter()
            .enumerate()
            .map(|(i, number)| Seat {
                seat_id: i as i64 + 1,
                seat_number: number.into(),
                status: Some("available".to_string()),
            })
            .collect();
        Self {
            inner: RwLock::new(Tables { seats, ..Tables::default() }),
        }
    }

    /// Кладёт строку как есть, без проверок. Нужен для данных в старом формате.
    pub async fn insert_raw(&self, booking: Booking) {
        self.inner.write().await.bookings.push(booking);
    }
}

impl Tables {
    fn check_references(&self, booking: &NewBooking) -> StoreResult<()> {
        if !self.seats.iter().any(|s| s.seat_id == booking.seat_id) {
            return Err(StoreError::MissingReference("bookings_seat_id_fkey".to_string()));
        }
        if !self.users.contains_key(&booking.user_id) {
            return Err(StoreError::MissingReference("bookings_user_id_fkey".to_string()));
        }
        Ok(())
    }

    // Аналог booking_ranges_no_overlap: участвуют только строки со списком интервалов
    fn check_overlap(&self, booking: &NewBooking, exclude: Option<Uuid>) -> StoreResult<()> {
        let clash = self
            .bookings
            .iter()
            .filter(|b| b.seat_id == booking.seat_id && b.date == booking.date)
            .filter(|b| Some(b.booking_id) != exclude)
            .filter_map(|b| match &b.timeslot {
                TimeslotEncoding::RangeList(ranges) => Some(ranges.as_slice()),
                TimeslotEncoding::LegacyTag(_) | TimeslotEncoding::Unrecognized(_) => None,
            })
            .flatten()
            .any(|existing: &TimeRange| booking.timeslot.ranges().iter().any(|r| r.overlaps(existing)));
        if clash {
            Err(StoreError::RangeOverlap)
        } else {
            Ok(())
        }
    }
}

fn sort_bookings(bookings: &mut [Booking]) {
    bookings.sort_by(|a, b| {
        (a.date, &a.seat_number, a.created_at, a.booking_id)
            .cmp(&(b.date, &b.seat_number, b.created_at, b.booking_id))
    });
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn list_seats(&self) -> StoreResult<Vec<Seat>> {
        let mut seats = self.inner.read().await.seats.clone();
        seats.sort_by(|a, b| a.seat_number.cmp(&b.seat_number));
        Ok(seats)
    }

    async fn find_seat_by_id(&self, seat_id: i64) -> StoreResult<Option<Seat>> {
        let tables = self.inner.read().await;
        Ok(tables.seats.iter().find(|s| s.seat_id == seat_id).cloned())
    }

    async fn find_seat_by_number(&self, seat_number: &str) -> StoreResult<Option<Seat>> {
        let tables = self.inner.read().await;
        Ok(tables.seats.iter().find(|s| s.seat_number == seat_number).cloned())
    }

    async fn find_user(&self, user_id: &str) -> StoreResult<Option<User>> {
        Ok(self.inner.read().await.users.get(user_id).cloned())
    }

    async fn upsert_user(&self, user: &User) -> StoreResult<User> {
        let mut tables = self.inner.write().await;
        tables.users.insert(user.user_id.clone(), user.clone());
        Ok(user.clone())
    }

    async fn list_bookings(&self, query: &BookingQuery) -> StoreResult<Vec<Booking>> {
        let tables = self.inner.read().await;
        let mut found: Vec<Booking> = tables
            .bookings
            .iter()
            .filter(|b| query.date.map_or(true, |d| b.date == d))
            .filter(|b| {
                query
                    .section
                    .as_deref()
                    .map_or(true, |s| in_section(&b.seat_number, s))
            })
            .filter(|b| query.user_id.as_deref().map_or(true, |u| b.user_id == u))
            .cloned()
            .collect();
        sort_bookings(&mut found);
        Ok(found)
    }

    async fn bookings_for_seat_date(
        &self,
        seat_id: i64,
        date: NaiveDate,
        exclude: Option<Uuid>,
    ) -> StoreResult<Vec<Booking>> {
        let tables = self.inner.read().await;
        Ok(tables
            .bookings
            .iter()
            .filter(|b| b.seat_id == seat_id && b.date == date)
            .filter(|b| Some(b.booking_id) != exclude)
            .cloned()
            .collect())
    }

    async fn find_booking(&self, booking_id: Uuid) -> StoreResult<Option<Booking>> {
        let tables = self.inner.read().await;
        Ok(tables.bookings.iter().find(|b| b.booking_id == booking_id).cloned())
    }

    async fn insert_booking(&self, booking: &NewBooking) -> StoreResult<Booking> {
        let mut tables = self.inner.write().await;
        tables.check_references(booking)?;
        tables.check_overlap(booking, None)?;

        let created = Booking {
            booking_id: Uuid::new_v4(),
            seat_id: booking.seat_id,
            seat_number: booking.seat_number.clone(),
            date: booking.date,
            timeslot: booking.timeslot.clone().into(),
            user_id: booking.user_id.clone(),
            user_name: booking.user_name.clone(),
            created_at: Utc::now(),
        };
        tables.bookings.push(created.clone());
        Ok(created)
    }

    async fn replace_booking(
        &self,
        booking_id: Uuid,
        booking: &NewBooking,
    ) -> StoreResult<Option<Booking>> {
        let mut tables = self.inner.write().await;
        if !tables.bookings.iter().any(|b| b.booking_id == booking_id) {
            return Ok(None);
        }
        tables.check_references(booking)?;
        tables.check_overlap(booking, Some(booking_id))?;

        let Some(existing) = tables.bookings.iter_mut().find(|b| b.booking_id == booking_id) else {
            return Ok(None);
        };
        existing.seat_id = booking.seat_id;
        existing.seat_number = booking.seat_number.clone();
        existing.date = booking.date;
        existing.timeslot = booking.timeslot.clone().into();
        Ok(Some(existing.clone()))
    }

    async fn delete_booking(&self, booking_id: Uuid) -> StoreResult<Option<Booking>> {
        let mut tables = self.inner.write().await;
        let position = tables.bookings.iter().position(|b| b.booking_id == booking_id);
        Ok(position.map(|i| tables.bookings.remove(i)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Timeslot;

    fn new_booking(seat_id: i64, start: &str, end: &str) -> NewBooking {
        NewBooking {
            seat_id,
            seat_number: format!("A{seat_id}"),
            date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            timeslot: Timeslot::single(TimeRange::parse(start, end).unwrap()),
            user_id: "u1".into(),
            user_name: "Alice".into(),
        }
    }

    async fn store_with_user() -> MemoryStore {
        let store = MemoryStore::with_seats(["A1", "A2"]);
        store
            .upsert_user(&User { user_id: "u1".into(), email: None, name: "Alice".into() })
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn seeded_store_has_four_sections() {
        let seats = MemoryStore::seeded().list_seats().await.unwrap();
        assert_eq!(seats.len(), 64);
        assert!(seats.iter().any(|s| s.seat_number == "D16"));
    }

    #[tokio::test]
    async fn rejects_overlapping_insert() {
        let store = store_with_user().await;
        store.insert_booking(&new_booking(1, "09:00", "10:00")).await.unwrap();
        let err = store.insert_booking(&new_booking(1, "09:30", "10:30")).await.unwrap_err();
        assert!(matches!(err, StoreError::RangeOverlap));
        // другое место - не конфликт
        store.insert_booking(&new_booking(2, "09:30", "10:30")).await.unwrap();
    }

    #[tokio::test]
    async fn rejects_unknown_references() {
        let store = store_with_user().await;
        let err = store.insert_booking(&new_booking(99, "09:00", "10:00")).await.unwrap_err();
        assert!(matches!(err, StoreError::MissingReference(_)));
    }

    #[tokio::test]
    async fn replace_ignores_own_ranges() {
        let store = store_with_user().await;
        let b = store.insert_booking(&new_booking(1, "09:00", "10:00")).await.unwrap();
        let moved = store
            .replace_booking(b.booking_id, &new_booking(1, "09:30", "10:30"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(moved.booking_id, b.booking_id);
        assert!(store.replace_booking(Uuid::new_v4(), &new_booking(1, "11:00", "12:00")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_returns_removed_row_once() {
        let store = store_with_user().await;
        let b = store.insert_booking(&new_booking(1, "09:00", "10:00")).await.unwrap();
        assert!(store.delete_booking(b.booking_id).await.unwrap().is_some());
        assert!(store.delete_booking(b.booking_id).await.unwrap().is_none());
    }
}
