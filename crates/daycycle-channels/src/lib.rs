//! # Daycycle Channels
//! Chat transports. Telegram is the only one the campaign runs on.

pub mod telegram;

pub use telegram::{TelegramChannel, TelegramPollingStream};
