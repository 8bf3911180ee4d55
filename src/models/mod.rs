pub mod user;
pub mod seat;
pub mod booking;
pub mod timeslot;

pub use user::User;
pub use seat::Seat;
pub use booking::{Booking, BookingQuery, NewBooking};
pub use timeslot::{LegacySlots, TimeOfDay, TimeRange, Timeslot, TimeslotEncoding, TimeslotError};
