//! changes.rs
//!
//! WebSocket-поток изменений броней для обновления UI почти в реальном времени.
//! Каждое событие - JSON `BookingChange`. Если подписчик отстал и события
//! потерялись, ему уходит `{"kind":"RESYNC"}`: клиент должен перечитать брони.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
    routing::get,
    Router,
};
use chrono::NaiveDate;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use super::parse_date;
use crate::error::BookingError;
use crate::relay::BookingChange;
use crate::AppState;

const RESYNC_FRAME: &str = r#"{"kind":"RESYNC"}"#;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/bookings/changes", get(subscribe_changes))
}

#[derive(Debug, Deserialize)]
pub struct ChangesQuery {
    pub section: Option<String>,
    pub date: Option<String>,
}

// GET /bookings/changes?section=A&date=2024-06-01
async fn subscribe_changes(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(params): Query<ChangesQuery>,
) -> Result<Response, BookingError> {
    let date = params.date.as_deref().map(parse_date).transpose()?;
    let section = params.section.filter(|s| !s.trim().is_empty());
    let rx = state.bookings.relay().subscribe();
    Ok(ws.on_upgrade(move |socket| stream_changes(socket, rx, section, date)))
}

// Кадр для подписчика; `None` - событие не проходит фильтр, `Err` - канал закрыт.
fn frame_for(
    received: Result<BookingChange, RecvError>,
    section: Option<&str>,
    date: Option<NaiveDate>,
) -> Result<Option<String>, RecvError> {
    match received {
        Ok(change) if change.matches(section, date) => match serde_json::to_string(&change) {
            Ok(text) => Ok(Some(text)),
            Err(e) => {
                warn!("failed to serialize booking change: {:?}", e);
                Ok(None)
            }
        },
        Ok(_) => Ok(None),
        Err(RecvError::Lagged(skipped)) => {
            warn!("change subscriber lagged, {} events dropped", skipped);
            Ok(Some(RESYNC_FRAME.to_string()))
        }
        Err(e @ RecvError::Closed) => Err(e),
    }
}

async fn stream_changes(
    socket: WebSocket,
    mut rx: broadcast::Receiver<BookingChange>,
    section: Option<String>,
    date: Option<NaiveDate>,
) {
    debug!("change subscriber connected (section={:?}, date={:?})", section, date);
    let (mut sink, mut stream) = socket.split();
    loop {
        let outgoing = tokio::select! {
            change = rx.recv() => match frame_for(change, section.as_deref(), date) {
                Ok(Some(text)) => text,
                Ok(None) => continue,
                Err(_) => break,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // ping/pong отвечает сам axum, остальное игнорируем
                Some(Ok(_)) => continue,
            },
        };
        if sink.send(Message::Text(outgoing.into())).await.is_err() {
            break;
        }
    }
    debug!("change subscriber disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Booking, TimeslotEncoding};
    use crate::relay::{ChangeKind, ChangeRelay};
    use chrono::Utc;
    use uuid::Uuid;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn change(seat_number: &str) -> BookingChange {
        BookingChange {
            kind: ChangeKind::Insert,
            booking: Booking {
                booking_id: Uuid::new_v4(),
                seat_id: 1,
                seat_number: seat_number.into(),
                date: day(1),
                timeslot: TimeslotEncoding::LegacyTag("morning".into()),
                user_id: "u1".into(),
                user_name: "Alice".into(),
                created_at: Utc::now(),
            },
            previous: None,
        }
    }

    #[tokio::test]
    async fn lagging_subscriber_gets_resync() {
        let relay = ChangeRelay::new(2);
        let mut rx = relay.subscribe();
        for seat in ["A1", "A2", "A3", "A4"] {
            relay.publish(change(seat));
        }

        let frame = frame_for(rx.recv().await, None, None).unwrap().unwrap();
        assert_eq!(frame, r#"{"kind":"RESYNC"}"#);

        // после RESYNC поток продолжается с самых свежих событий
        let frame = frame_for(rx.recv().await, None, None).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["kind"], "INSERT");
        assert_eq!(value["booking"]["seatNumber"], "A3");
    }

    #[test]
    fn filtered_out_changes_produce_no_frame() {
        assert_eq!(frame_for(Ok(change("B7")), Some("A"), None).unwrap(), None);
        assert!(frame_for(Ok(change("A7")), Some("A"), Some(day(1))).unwrap().is_some());
        assert_eq!(frame_for(Ok(change("A7")), None, Some(day(2))).unwrap(), None);
        assert!(frame_for(Err(RecvError::Closed), None, None).is_err());
    }
}
