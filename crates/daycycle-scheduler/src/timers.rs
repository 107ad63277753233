//! Timer registry: one live one-shot timer per (participant, purpose).
//!
//! Installing into an occupied slot aborts the previous timer, so timers are
//! replaced, never stacked. Every install gets a fresh generation number; a
//! timer that wakes up after being superseded sees a different generation in
//! its slot and drops itself.

use chrono::DateTime;
use chrono_tz::Tz;
use daycycle_core::ParticipantId;
use std::collections::HashMap;
use std::fmt;
use tokio::task::AbortHandle;

/// Why a timer exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerPurpose {
    Reminder,
    NextDay,
    DailySweep,
}

impl fmt::Display for TimerPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerPurpose::Reminder => write!(f, "reminder"),
            TimerPurpose::NextDay => write!(f, "next-day"),
            TimerPurpose::DailySweep => write!(f, "daily-sweep"),
        }
    }
}

/// Timer identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKey {
    Reminder(ParticipantId),
    NextDay(ParticipantId),
    DailySweep,
}

impl TimerKey {
    pub fn purpose(&self) -> TimerPurpose {
        match self {
            TimerKey::Reminder(_) => TimerPurpose::Reminder,
            TimerKey::NextDay(_) => TimerPurpose::NextDay,
            TimerKey::DailySweep => TimerPurpose::DailySweep,
        }
    }

    pub fn participant(&self) -> Option<ParticipantId> {
        match self {
            TimerKey::Reminder(id) | TimerKey::NextDay(id) => Some(*id),
            TimerKey::DailySweep => None,
        }
    }
}

impl fmt::Display for TimerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.participant() {
            Some(id) => write!(f, "{}_{}", self.purpose(), id),
            None => write!(f, "{}", self.purpose()),
        }
    }
}

struct TimerSlot {
    generation: u64,
    fires_at: DateTime<Tz>,
    handle: AbortHandle,
}

/// Registry of live timers.
#[derive(Default)]
pub struct TimerRegistry {
    slots: HashMap<TimerKey, TimerSlot>,
    next_generation: u64,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a timer, superseding whatever occupied the slot.
    /// `spawn` receives the generation the timer must report when it fires.
    pub fn install<F>(&mut self, key: TimerKey, fires_at: DateTime<Tz>, spawn: F) -> u64
    where
        F: FnOnce(u64) -> AbortHandle,
    {
        self.next_generation += 1;
        let generation = self.next_generation;
        let handle = spawn(generation);
        if let Some(old) = self.slots.insert(
            key,
            TimerSlot {
                generation,
                fires_at,
                handle,
            },
        ) {
            old.handle.abort();
            tracing::debug!("⏱️ Replaced timer {key} (generation {})", old.generation);
        }
        generation
    }

    /// Cancel the timer in `key`'s slot. Returns whether one was live.
    pub fn cancel(&mut self, key: &TimerKey) -> bool {
        match self.slots.remove(key) {
            Some(slot) => {
                slot.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Claim a fired timer: succeeds only for the current generation,
    /// and empties the slot.
    pub fn claim(&mut self, key: &TimerKey, generation: u64) -> bool {
        match self.slots.get(key) {
            Some(slot) if slot.generation == generation => {
                self.slots.remove(key);
                true
            }
            _ => false,
        }
    }

    pub fn is_live(&self, key: &TimerKey) -> bool {
        self.slots.contains_key(key)
    }

    /// When the timer in `key`'s slot is due.
    pub fn fires_at(&self, key: &TimerKey) -> Option<DateTime<Tz>> {
        self.slots.get(key).map(|s| s.fires_at)
    }

    /// Live timers with the given purpose.
    pub fn count(&self, purpose: TimerPurpose) -> usize {
        self.slots.keys().filter(|k| k.purpose() == purpose).count()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Abort every timer.
    pub fn cancel_all(&mut self) {
        for (_, slot) in self.slots.drain() {
            slot.handle.abort();
        }
    }
}

impl Drop for TimerRegistry {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Europe::Moscow;

    fn sleeper() -> AbortHandle {
        tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        })
        .abort_handle()
    }

    fn at(hour: u32) -> DateTime<Tz> {
        Moscow.with_ymd_and_hms(2024, 1, 6, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_install_replaces_instead_of_stacking() {
        let mut registry = TimerRegistry::new();
        let key = TimerKey::Reminder(ParticipantId(1));

        let g1 = registry.install(key, at(9), |_| sleeper());
        let g2 = registry.install(key, at(10), |_| sleeper());

        assert_ne!(g1, g2);
        assert_eq!(registry.count(TimerPurpose::Reminder), 1);
        assert_eq!(registry.fires_at(&key), Some(at(10)));

        // A stale firing cannot claim the slot.
        assert!(!registry.claim(&key, g1));
        assert!(registry.claim(&key, g2));
        assert!(!registry.is_live(&key));
    }

    #[tokio::test]
    async fn test_slots_are_per_purpose_and_participant() {
        let mut registry = TimerRegistry::new();
        registry.install(TimerKey::Reminder(ParticipantId(1)), at(9), |_| sleeper());
        registry.install(TimerKey::NextDay(ParticipantId(1)), at(9), |_| sleeper());
        registry.install(TimerKey::Reminder(ParticipantId(2)), at(9), |_| sleeper());
        registry.install(TimerKey::DailySweep, at(0), |_| sleeper());
        assert_eq!(registry.len(), 4);
        assert_eq!(registry.count(TimerPurpose::Reminder), 2);

        assert!(registry.cancel(&TimerKey::Reminder(ParticipantId(1))));
        assert!(!registry.cancel(&TimerKey::Reminder(ParticipantId(1))));
        assert!(registry.is_live(&TimerKey::NextDay(ParticipantId(1))));

        registry.cancel_all();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_key_display() {
        assert_eq!(TimerKey::Reminder(ParticipantId(5)).to_string(), "reminder_5");
        assert_eq!(TimerKey::NextDay(ParticipantId(5)).to_string(), "next-day_5");
        assert_eq!(TimerKey::DailySweep.to_string(), "daily-sweep");
    }
}
