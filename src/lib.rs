//! # TURBOVAC Pump Protocol Library
//!
//! Encodes and decodes the 24-byte telegrams spoken by Leybold TURBOVAC
//! turbomolecular pumps over RS-232/RS-485, and simulates a pump that
//! answers them.
//!
//! - [`telegram`] builds queries and reads replies in terms of parameters.
//! - [`frame`] and [`numeric`] are the bit-level codec underneath.
//! - [`catalogue`] describes every parameter, error and warning.
//! - [`pump`] is the virtual pump; [`connection`] serves it on an
//!   in-process serial line and [`link`] talks to a real or virtual pump.

pub mod catalogue;
pub mod codes;
pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod link;
pub mod logging;
pub mod numeric;
pub mod pump;
pub mod telegram;

pub use catalogue::Catalogue;
pub use config::PumpConfig;
pub use error::{Error, Result};
pub use frame::Telegram;
pub use link::PumpLink;
pub use pump::VirtualPump;
pub use telegram::{TelegramBuilder, TelegramReader};
