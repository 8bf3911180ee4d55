use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::seat::in_section;
use crate::models::Booking;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Событие изменения брони. Для клиента это сигнал перечитать данные,
/// а не авторитетный поток: порядок относительно HTTP-ответов не гарантирован.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingChange {
    pub kind: ChangeKind,
    pub booking: Booking,
    /// Для UPDATE - состояние до изменения (место или дата могли смениться).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<Booking>,
}

impl BookingChange {
    /// Касается ли событие подписки `(section, date)`; пустое условие совпадает со всем.
    pub fn matches(&self, section: Option<&str>, date: Option<NaiveDate>) -> bool {
        let hits = |b: &Booking| {
            section.map_or(true, |s| in_section(&b.seat_number, s)) && date.map_or(true, |d| b.date == d)
        };
        hits(&self.booking) || self.previous.as_ref().is_some_and(hits)
    }
}

/// Broadcast hub для изменений броней.
#[derive(Clone)]
pub struct ChangeRelay {
    sender: broadcast::Sender<BookingChange>,
}

impl ChangeRelay {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BookingChange> {
        self.sender.subscribe()
    }

    /// No-op, если никто не слушает.
    pub fn publish(&self, change: BookingChange) {
        let kind = change.kind;
        let booking_id = change.booking.booking_id;
        match self.sender.send(change) {
            Ok(receivers) => tracing::debug!("relay {:?} {} to {} subscribers", kind, booking_id, receivers),
            Err(_) => tracing::trace!("relay {:?} {}: no subscribers", kind, booking_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TimeslotEncoding;
    use chrono::Utc;
    use uuid::Uuid;

    fn booking(seat_number: &str, date: NaiveDate) -> Booking {
        Booking {
            booking_id: Uuid::new_v4(),
            seat_id: 1,
            seat_number: seat_number.into(),
            date,
            timeslot: TimeslotEncoding::LegacyTag("morning".into()),
            user_id: "u1".into(),
            user_name: "Alice".into(),
            created_at: Utc::now(),
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    #[tokio::test]
    async fn subscribe_and_receive() {
        let relay = ChangeRelay::new(8);
        let mut rx = relay.subscribe();
        let change = BookingChange { kind: ChangeKind::Insert, booking: booking("A1", day(1)), previous: None };
        relay.publish(change.clone());
        assert_eq!(rx.recv().await.unwrap(), change);
    }

    #[test]
    fn publish_without_subscribers_is_noop() {
        let relay = ChangeRelay::new(8);
        relay.publish(BookingChange { kind: ChangeKind::Delete, booking: booking("A1", day(1)), previous: None });
    }

    #[test]
    fn matches_section_and_date() {
        let change = BookingChange { kind: ChangeKind::Insert, booking: booking("B3", day(2)), previous: None };
        assert!(change.matches(None, None));
        assert!(change.matches(Some("b"), Some(day(2))));
        assert!(!change.matches(Some("A"), Some(day(2))));
        assert!(!change.matches(Some("B"), Some(day(3))));
    }

    #[test]
    fn update_matches_previous_location_too() {
        let change = BookingChange {
            kind: ChangeKind::Update,
            booking: booking("C1", day(5)),
            previous: Some(booking("A1", day(4))),
        };
        assert!(change.matches(Some("A"), Some(day(4))));
    }

    #[test]
    fn serializes_kind_uppercase() {
        let change = BookingChange { kind: ChangeKind::Delete, booking: booking("A1", day(1)), previous: None };
        let v = serde_json::to_value(&change).unwrap();
        assert_eq!(v["kind"], "DELETE");
        assert!(v.get("previous").is_none());
    }
}
