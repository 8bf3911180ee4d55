pub mod booking;
pub mod locks;

pub use booking::{BookingFilter, BookingService, Clock, ReserveRequest, SeatRef, UpdateRequest};
