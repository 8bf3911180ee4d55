//! booking.rs
//!
//! Сервис бронирования: проверка конфликтов и жизненный цикл брони.
//!
//! Проверка "прочитать брони места на дату -> сравнить интервалы -> записать"
//! выполняется под замком `(seat_id, date)`. Хранилище дополнительно отвергает
//! пересечения на уровне записи, такой отказ тоже превращается в `Conflict`.
//!
//! Старые строки с тегом (`morning`/`afternoon`/`evening`) участвуют в проверке
//! через `LegacySlots`; строки с неизвестным тегом ни с чем не конфликтуют.

use chrono::{Local, NaiveDate};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::locks::SlotLocks;
use crate::error::BookingError;
use crate::models::seat::normalize_seat_label;
use crate::models::{
    Booking, BookingQuery, LegacySlots, NewBooking, Seat, TimeRange, Timeslot, TimeslotEncoding,
    User,
};
use crate::relay::{BookingChange, ChangeKind, ChangeRelay};
use crate::store::{BookingStore, StoreError};

/// Источник "сегодня" для запрета броней в прошлом.
pub type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(|| Local::now().date_naive())
}

/// Как клиент указал место: стабильным id или номером с плана.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeatRef {
    Id(i64),
    Number(String),
}

#[derive(Debug, Clone)]
pub struct ReserveRequest {
    pub seat: SeatRef,
    pub date: NaiveDate,
    pub timeslot: TimeslotEncoding,
    pub user_id: String,
}

/// Частичное изменение: отсутствующие поля берутся из текущей брони.
#[derive(Debug, Clone, Default)]
pub struct UpdateRequest {
    pub seat: Option<SeatRef>,
    pub date: Option<NaiveDate>,
    pub timeslot: Option<TimeslotEncoding>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingFilter {
    All,
    Date { date: NaiveDate, slot: Option<String> },
    Section { section: String, date: NaiveDate, slot: Option<String> },
    User(String),
}

#[derive(Clone)]
pub struct BookingService {
    store: Arc<dyn BookingStore>,
    slots: LegacySlots,
    clock: Clock,
    locks: SlotLocks,
    relay: ChangeRelay,
}

impl BookingService {
    pub fn new(store: Arc<dyn BookingStore>, slots: LegacySlots, relay: ChangeRelay) -> Self {
        Self {
            store,
            slots,
            clock: system_clock(),
            locks: SlotLocks::new(),
            relay,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn relay(&self) -> &ChangeRelay {
        &self.relay
    }

    /* ---------- запись ---------- */

    pub async fn check_and_reserve(&self, req: ReserveRequest) -> Result<Booking, BookingError> {
        let timeslot = req.timeslot.resolve(&self.slots)?;
        self.ensure_not_past(req.date)?;
        let seat = self.resolve_seat(&req.seat).await?;

        let _guard = self.locks.lock((seat.seat_id, req.date)).await;

        let existing = self
            .store
            .bookings_for_seat_date(seat.seat_id, req.date, None)
            .await?;
        self.ensure_no_conflict(&seat.seat_number, req.date, &timeslot, &existing)?;

        let user = self
            .store
            .find_user(&req.user_id)
            .await?
            .ok_or_else(|| BookingError::InvalidUser(req.user_id.clone()))?;

        let new_booking = NewBooking {
            seat_id: seat.seat_id,
            seat_number: seat.seat_number.clone(),
            date: req.date,
            timeslot,
            user_id: user.user_id,
            user_name: user.name,
        };
        let created = self
            .store
            .insert_booking(&new_booking)
            .await
            .map_err(|e| self.map_write_error(e, &new_booking))?;

        info!(
            "booking {} created: seat {} on {} at {} for {}",
            created.booking_id, created.seat_number, created.date, new_booking.timeslot, created.user_id
        );
        self.relay.publish(BookingChange {
            kind: ChangeKind::Insert,
            booking: created.clone(),
            previous: None,
        });
        Ok(created)
    }

    /// Изменение брони - это повторная проверка как при создании,
    /// без учёта самой изменяемой брони, и атомарная замена строки.
    ///
    /// Текущая строка перечитывается под замком её `(seat_id, date)`: все
    /// изменения одной брони идут под этим ключом, поэтому параллельная правка
    /// не затирается устаревшими данными.
    pub async fn update(&self, booking_id: Uuid, req: UpdateRequest) -> Result<Booking, BookingError> {
        let (current, seat, date, _guards) = loop {
            let snapshot = self.find_booking(booking_id).await?;
            let date = req.date.unwrap_or(snapshot.date);
            self.ensure_not_past(date)?;
            let seat = match &req.seat {
                Some(seat_ref) => self.resolve_seat(seat_ref).await?,
                None => Seat {
                    seat_id: snapshot.seat_id,
                    seat_number: snapshot.seat_number.clone(),
                    status: None,
                },
            };

            let guards = self
                .locks
                .lock_all(vec![(snapshot.seat_id, snapshot.date), (seat.seat_id, date)])
                .await;
            let current = self.find_booking(booking_id).await?;
            if (current.seat_id, current.date) == (snapshot.seat_id, snapshot.date) {
                break (current, seat, date, guards);
            }
            // бронь успели перенести - замки взяты не на тот ключ
            debug!("booking {} moved while waiting for lock, retrying", booking_id);
        };

        let timeslot = match &req.timeslot {
            Some(encoding) => encoding.resolve(&self.slots)?,
            None => current.timeslot.resolve(&self.slots)?,
        };

        let existing = self
            .store
            .bookings_for_seat_date(seat.seat_id, date, Some(booking_id))
            .await?;
        self.ensure_no_conflict(&seat.seat_number, date, &timeslot, &existing)?;

        let replacement = NewBooking {
            seat_id: seat.seat_id,
            seat_number: seat.seat_number.clone(),
            date,
            timeslot,
            user_id: current.user_id.clone(),
            user_name: current.user_name.clone(),
        };
        let updated = self
            .store
            .replace_booking(booking_id, &replacement)
            .await
            .map_err(|e| self.map_write_error(e, &replacement))?
            .ok_or(BookingError::NotFound(booking_id))?;

        info!(
            "booking {} updated: seat {} on {} at {}",
            booking_id, updated.seat_number, updated.date, replacement.timeslot
        );
        self.relay.publish(BookingChange {
            kind: ChangeKind::Update,
            booking: updated.clone(),
            previous: Some(current),
        });
        Ok(updated)
    }

    /// Отмена без проверки владельца: это ответственность вызывающей стороны.
    pub async fn cancel(&self, booking_id: Uuid) -> Result<Booking, BookingError> {
        let deleted = self
            .store
            .delete_booking(booking_id)
            .await?
            .ok_or(BookingError::NotFound(booking_id))?;

        info!("booking {} cancelled", booking_id);
        self.relay.publish(BookingChange {
            kind: ChangeKind::Delete,
            booking: deleted.clone(),
            previous: None,
        });
        Ok(deleted)
    }

    pub async fn upsert_user(&self, user: User) -> Result<User, BookingError> {
        let user = User {
            user_id: user.user_id.trim().to_string(),
            email: user.email.map(|e| e.trim().to_string()).filter(|e| !e.is_empty()),
            name: user.name.trim().to_string(),
        };
        if user.user_id.is_empty() {
            return Err(BookingError::InvalidInput("userId must not be empty".to_string()));
        }
        if user.name.is_empty() {
            return Err(BookingError::InvalidInput("name must not be empty".to_string()));
        }
        Ok(self.store.upsert_user(&user).await?)
    }

    /* ---------- чтение ---------- */

    pub async fn list_seats(&self) -> Result<Vec<Seat>, BookingError> {
        Ok(self.store.list_seats().await?)
    }

    pub async fn find_user(&self, user_id: &str) -> Result<User, BookingError> {
        self.store
            .find_user(user_id)
            .await?
            .ok_or_else(|| BookingError::UserNotFound(user_id.to_string()))
    }

    /// Сырые строки броней; доступность места вычисляет клиент.
    /// Фильтр по слоту оставляет брони, пересекающиеся с интервалом слота.
    pub async fn list_bookings(&self, filter: BookingFilter) -> Result<Vec<Booking>, BookingError> {
        let (query, slot) = match filter {
            BookingFilter::All => (BookingQuery::default(), None),
            BookingFilter::Date { date, slot } => (
                BookingQuery { date: Some(date), ..BookingQuery::default() },
                slot,
            ),
            BookingFilter::Section { section, date, slot } => (
                BookingQuery {
                    date: Some(date),
                    section: Some(validate_section(&section)?),
                    ..BookingQuery::default()
                },
                slot,
            ),
            BookingFilter::User(user_id) => (
                BookingQuery { user_id: Some(user_id), ..BookingQuery::default() },
                None,
            ),
        };
        let slot = slot
            .map(|s| TimeslotEncoding::decode(&serde_json::Value::String(s))?.resolve(&self.slots))
            .transpose()?;

        let bookings = self.store.list_bookings(&query).await?;
        Ok(match slot {
            None => bookings,
            Some(slot) => bookings
                .into_iter()
                .filter(|b| self.ranges_of(b).is_some_and(|ranges| ranges.overlaps(&slot)))
                .collect(),
        })
    }

    /* ---------- helpers ---------- */

    async fn find_booking(&self, booking_id: Uuid) -> Result<Booking, BookingError> {
        self.store
            .find_booking(booking_id)
            .await?
            .ok_or(BookingError::NotFound(booking_id))
    }

    fn ensure_not_past(&self, date: NaiveDate) -> Result<(), BookingError> {
        let today = (self.clock)();
        if date < today {
            return Err(BookingError::InvalidInput(format!(
                "cannot book {date}: date is in the past (today is {today})"
            )));
        }
        Ok(())
    }

    async fn resolve_seat(&self, seat: &SeatRef) -> Result<Seat, BookingError> {
        let found = match seat {
            SeatRef::Id(id) => self.store.find_seat_by_id(*id).await?,
            SeatRef::Number(label) => {
                self.store
                    .find_seat_by_number(normalize_seat_label(label))
                    .await?
            }
        };
        found.ok_or_else(|| {
            BookingError::SeatNotFound(match seat {
                SeatRef::Id(id) => id.to_string(),
                SeatRef::Number(label) => label.clone(),
            })
        })
    }

    /// Интервалы существующей брони; `None` для нераспознаваемых старых строк.
    fn ranges_of(&self, booking: &Booking) -> Option<Timeslot> {
        match booking.timeslot.resolve(&self.slots) {
            Ok(ranges) => Some(ranges),
            Err(e) => {
                warn!("booking {} skipped in overlap check: {}", booking.booking_id, e);
                None
            }
        }
    }

    fn ensure_no_conflict(
        &self,
        seat_number: &str,
        date: NaiveDate,
        requested: &Timeslot,
        existing: &[Booking],
    ) -> Result<(), BookingError> {
        for booking in existing {
            let Some(ranges) = self.ranges_of(booking) else {
                continue;
            };
            if let Some((mine, _theirs)) = requested.first_overlap(&ranges) {
                info!(
                    "booking rejected: seat {} on {} at {} overlaps booking {}",
                    seat_number, date, mine, booking.booking_id
                );
                return Err(BookingError::conflict(seat_number, date, Some(mine)));
            }
        }
        Ok(())
    }

    fn map_write_error(&self, e: StoreError, booking: &NewBooking) -> BookingError {
        match e {
            // гонка мимо замка (второй инстанс и т.п.) - ловит ограничение хранилища
            StoreError::RangeOverlap => {
                warn!(
                    "store rejected overlapping booking for seat {} on {}",
                    booking.seat_number, booking.date
                );
                BookingError::conflict(&booking.seat_number, booking.date, first_range(&booking.timeslot))
            }
            StoreError::MissingReference(constraint) if constraint.contains("user") => {
                BookingError::InvalidUser(booking.user_id.clone())
            }
            StoreError::MissingReference(_) => BookingError::SeatNotFound(booking.seat_number.clone()),
            other => BookingError::Store(other),
        }
    }
}

fn first_range(timeslot: &Timeslot) -> Option<TimeRange> {
    timeslot.ranges().first().copied()
}

fn validate_section(section: &str) -> Result<String, BookingError> {
    let section = section.trim();
    if section.is_empty() || !section.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(BookingError::InvalidInput(format!("invalid section '{section}'")));
    }
    Ok(section.to_string())
}
