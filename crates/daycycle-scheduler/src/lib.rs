//! # Daycycle Scheduler
//!
//! Seven-day diary campaign: participant state machine, timezone-aware
//! one-shot timers, the nightly missed-day sweep and recovery after restart.
//!
//! ## Architecture
//! ```text
//! DayCycleScheduler (one tokio Mutex = one mutation path)
//!   ├── machine::apply      pure transitions over ParticipantRecord
//!   ├── RecordStore         JSON file or SQLite, whole-collection saves
//!   ├── TimerRegistry       reminder_<id>, next-day_<id>, daily-sweep
//!   │     └── tokio::spawn(sleep) → re-check live state → re-arm
//!   ├── Templates           Content → OutgoingMessage
//!   └── Transport           deliver / fetch_attachment
//! ```

pub mod clock;
pub mod content;
pub mod engine;
pub mod intake;
pub mod machine;
pub mod media;
pub mod persistence;
pub mod record;
pub mod report;
pub mod store;
pub mod timers;

pub use clock::{Clock, ManualClock, SystemClock};
pub use content::Templates;
pub use engine::{BootstrapSummary, DayCycleScheduler, Delivery, EventOutcome, SchedulerSettings};
pub use intake::Vocabulary;
pub use machine::{CareReply, Content, Event, ParticipantState};
pub use media::MediaStore;
pub use persistence::SqliteRecordStore;
pub use record::{FINAL_DAY, FIRST_DAY, ParticipantRecord};
pub use report::CampaignStats;
pub use store::{JsonRecordStore, MemoryRecordStore, RecordStore, Records};
pub use timers::{TimerKey, TimerPurpose};
