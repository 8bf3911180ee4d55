use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::{types::Json, FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{BookingStore, StoreError, StoreResult};
use crate::database::Database;
use crate::models::{Booking, BookingQuery, NewBooking, Seat, TimeslotEncoding, User};

const BOOKING_COLUMNS: &str =
    "booking_id, seat_id, seat_number, booking_date, timeslot, user_id, user_name, created_at";

// SQLSTATE: exclusion_violation, foreign_key_violation
const EXCLUSION_VIOLATION: &str = "23P01";
const FOREIGN_KEY_VIOLATION: &str = "23503";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(db: &Database) -> Self {
        Self { pool: db.pool.clone() }
    }
}

#[derive(FromRow)]
struct BookingRow {
    booking_id: Uuid,
    seat_id: i64,
    seat_number: String,
    booking_date: NaiveDate,
    timeslot: Json<Value>,
    user_id: String,
    user_name: String,
    created_at: DateTime<Utc>,
}

impl From<BookingRow> for Booking {
    fn from(row: BookingRow) -> Self {
        let raw = row.timeslot.0;
        // нераспознанное значение отдаём как лежит в базе, сервис его пропустит с warn
        let timeslot = TimeslotEncoding::decode(&raw).unwrap_or_else(|e| {
            tracing::warn!("booking {} has undecodable timeslot {}: {}", row.booking_id, raw, e);
            TimeslotEncoding::Unrecognized(raw)
        });
        Booking {
            booking_id: row.booking_id,
            seat_id: row.seat_id,
            seat_number: row.seat_number,
            date: row.booking_date,
            timeslot,
            user_id: row.user_id,
            user_name: row.user_name,
            created_at: row.created_at,
        }
    }
}

/// Нарушения ограничений, которые сервис превращает в ответы 409/400.
/// `None` - обычная ошибка базы.
fn classify(code: Option<&str>, constraint: Option<&str>) -> Option<StoreError> {
    match code? {
        EXCLUSION_VIOLATION => Some(StoreError::RangeOverlap),
        FOREIGN_KEY_VIOLATION => Some(StoreError::MissingReference(
            constraint.unwrap_or("unknown").to_string(),
        )),
        _ => None,
    }
}

fn map_db_error(e: sqlx::Error) -> StoreError {
    let classified = e.as_database_error().and_then(|db| {
        let code = db.code();
        classify(code.as_deref(), db.constraint())
    });
    classified.unwrap_or(StoreError::Database(e))
}

fn timeslot_json(booking: &NewBooking) -> Json<Value> {
    Json(serde_json::to_value(&booking.timeslot).unwrap_or(Value::Null))
}

/// Строки `booking_ranges` для брони; в той же транзакции, что и сама бронь.
async fn insert_ranges(
    tx: &mut Transaction<'_, Postgres>,
    booking_id: Uuid,
    booking: &NewBooking,
) -> StoreResult<()> {
    let (starts, ends): (Vec<i32>, Vec<i32>) = booking
        .timeslot
        .ranges()
        .iter()
        .map(|r| (i32::from(r.start().minutes()), i32::from(r.end().minutes())))
        .unzip();

    sqlx::query(
        r#"
        INSERT INTO booking_ranges (booking_id, seat_id, booking_date, minutes)
        SELECT $1, $2, $3, int4range(r.s, r.e)
        FROM UNNEST($4::int4[], $5::int4[]) AS r(s, e)
        "#,
    )
    .bind(booking_id)
    .bind(booking.seat_id)
    .bind(booking.date)
    .bind(&starts)
    .bind(&ends)
    .execute(&mut **tx)
    .await
    .map_err(map_db_error)?;
    Ok(())
}

#[async_trait]
impl BookingStore for PgStore {
    async fn list_seats(&self) -> StoreResult<Vec<Seat>> {
        let seats = sqlx::query_as::<_, Seat>(
            "SELECT seat_id, seat_number, status FROM seats ORDER BY seat_number",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(seats)
    }

    async fn find_seat_by_id(&self, seat_id: i64) -> StoreResult<Option<Seat>> {
        let seat = sqlx::query_as::<_, Seat>(
            "SELECT seat_id, seat_number, status FROM seats WHERE seat_id = $1",
        )
        .bind(seat_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(seat)
    }

    async fn find_seat_by_number(&self, seat_number: &str) -> StoreResult<Option<Seat>> {
        let seat = sqlx::query_as::<_, Seat>(
            "SELECT seat_id, seat_number, status FROM seats WHERE seat_number = $1",
        )
        .bind(seat_number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(seat)
    }

    async fn find_user(&self, user_id: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT user_id, email, name FROM users WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn upsert_user(&self, user: &User) -> StoreResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (user_id, email, name)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE
            SET email = EXCLUDED.email, name = EXCLUDED.name, updated_at = NOW()
            RETURNING user_id, email, name
            "#,
        )
        .bind(&user.user_id)
        .bind(&user.email)
        .bind(&user.name)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn list_bookings(&self, query: &BookingQuery) -> StoreResult<Vec<Booking>> {
        let mut q = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE TRUE");
        let mut bind_idx = 1;
        if query.date.is_some() {
            q.push_str(&format!(" AND booking_date = ${}", bind_idx));
            bind_idx += 1;
        }
        if query.section.is_some() {
            q.push_str(&format!(" AND seat_number ILIKE ${} || '%'", bind_idx));
            bind_idx += 1;
        }
        if query.user_id.is_some() {
            q.push_str(&format!(" AND user_id = ${}", bind_idx));
        }
        q.push_str(" ORDER BY booking_date, seat_number, created_at, booking_id");

        let mut dbq = sqlx::query_as::<_, BookingRow>(&q);
        if let Some(date) = query.date {
            dbq = dbq.bind(date);
        }
        if let Some(section) = &query.section {
            dbq = dbq.bind(escape_like(section));
        }
        if let Some(user_id) = &query.user_id {
            dbq = dbq.bind(user_id);
        }

        let rows = dbq.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Booking::from).collect())
    }

    async fn bookings_for_seat_date(
        &self,
        seat_id: i64,
        date: NaiveDate,
        exclude: Option<Uuid>,
    ) -> StoreResult<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings
             WHERE seat_id = $1 AND booking_date = $2
               AND ($3::uuid IS NULL OR booking_id <> $3)
             ORDER BY created_at, booking_id"
        ))
        .bind(seat_id)
        .bind(date)
        .bind(exclude)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Booking::from).collect())
    }

    async fn find_booking(&self, booking_id: Uuid) -> StoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE booking_id = $1"
        ))
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Booking::from))
    }

    async fn insert_booking(&self, booking: &NewBooking) -> StoreResult<Booking> {
        let mut tx = self.pool.begin().await?;
        let booking_id = Uuid::new_v4();

        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "INSERT INTO bookings (booking_id, seat_id, seat_number, booking_date, timeslot, user_id, user_name)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {BOOKING_COLUMNS}"
        ))
        .bind(booking_id)
        .bind(booking.seat_id)
        .bind(&booking.seat_number)
        .bind(booking.date)
        .bind(timeslot_json(booking))
        .bind(&booking.user_id)
        .bind(&booking.user_name)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_db_error)?;

        insert_ranges(&mut tx, booking_id, booking).await?;

        tx.commit().await.map_err(map_db_error)?;
        Ok(row.into())
    }

    async fn replace_booking(
        &self,
        booking_id: Uuid,
        booking: &NewBooking,
    ) -> StoreResult<Option<Booking>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "UPDATE bookings
             SET seat_id = $2, seat_number = $3, booking_date = $4, timeslot = $5
             WHERE booking_id = $1
             RETURNING {BOOKING_COLUMNS}"
        ))
        .bind(booking_id)
        .bind(booking.seat_id)
        .bind(&booking.seat_number)
        .bind(booking.date)
        .bind(timeslot_json(booking))
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_db_error)?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query("DELETE FROM booking_ranges WHERE booking_id = $1")
            .bind(booking_id)
            .execute(&mut *tx)
            .await?;
        insert_ranges(&mut tx, booking_id, booking).await?;

        tx.commit().await.map_err(map_db_error)?;
        Ok(Some(row.into()))
    }

    async fn delete_booking(&self, booking_id: Uuid) -> StoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "DELETE FROM bookings WHERE booking_id = $1 RETURNING {BOOKING_COLUMNS}"
        ))
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Booking::from))
    }
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
