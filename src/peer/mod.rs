//! Media-connection capability and engine adapter

pub mod connection;
pub mod rtc;

pub use connection::{MediaConnection, MediaEvent};
pub use rtc::RtcMediaConnection;
