//! # Daycycle Core
//! Shared building blocks for the diary campaign: configuration, the error
//! model, participant-facing message types and the transport seam.

pub mod config;
pub mod error;
pub mod time;
pub mod traits;
pub mod types;

pub use config::DaycycleConfig;
pub use error::{DaycycleError, Result};
pub use time::DayTime;
pub use traits::Transport;
pub use types::{
    AttachmentKind, AttachmentRef, Identity, IncomingMessage, Keyboard, OutgoingMessage,
    ParticipantId,
};
