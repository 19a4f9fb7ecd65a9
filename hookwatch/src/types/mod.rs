//! Core data types shared across the crate.

mod alert;
mod clock;
mod reading;

pub use alert::AlertRecord;
pub use clock::EpochClock;
pub use reading::{ConnectionState, Reading};
