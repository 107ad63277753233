//! Day-cycle scheduler: the single serialized mutation path.
//!
//! Every inbound event and every fired timer goes through one
//! `tokio::sync::Mutex` guarding the record collection, the store and the
//! timer registry: load → transition → persist → re-arm happens under it,
//! deliveries go out after it is released.
//!
//! ```text
//! Transport ──IncomingMessage──▶ handle_message ─┐
//! Timer (reminder / next-day / sweep) ───────────┼─▶ machine::apply ─▶ store.save_all
//!                                                │                  └▶ TimerRegistry
//!                                                └─▶ Transport.deliver (after unlock)
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeDelta};
use chrono_tz::Tz;
use daycycle_core::config::{CampaignConfig, ContentConfig};
use daycycle_core::{
    AttachmentRef, DayTime, DaycycleError, Identity, IncomingMessage, OutgoingMessage,
    ParticipantId, Result, Transport,
};
use futures::future::{BoxFuture, FutureExt};
use tokio::sync::Mutex;

use crate::clock::{Clock, SystemClock, delay_until, local_moment, next_daily_occurrence};
use crate::content::Templates;
use crate::intake::Vocabulary;
use crate::machine::{self, Content, Effect, Event, ParticipantState};
use crate::media::MediaStore;
use crate::record::ParticipantRecord;
use crate::report::CampaignStats;
use crate::store::{RecordStore, Records};
use crate::timers::{TimerKey, TimerPurpose, TimerRegistry};

/// Timing parameters of the campaign.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub timezone: Tz,
    /// Delay between reminders while the day's response is missing.
    pub reminder_interval: Duration,
    /// Delay used when a next-day target is already in the past.
    pub catchup_delay: Duration,
    /// Local time of the daily missed-day sweep.
    pub sweep_time: DayTime,
}

impl SchedulerSettings {
    pub fn from_config(config: &CampaignConfig) -> Result<Self> {
        Ok(Self {
            timezone: config.timezone()?,
            reminder_interval: Duration::from_secs(config.reminder_interval_secs),
            catchup_delay: Duration::from_secs(config.catchup_delay_secs),
            sweep_time: config.sweep_time()?,
        })
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::Europe::Moscow,
            reminder_interval: Duration::from_secs(3600),
            catchup_delay: Duration::from_secs(10),
            sweep_time: DayTime::new(0, 1).unwrap_or_default(),
        }
    }
}

/// A rendered message for one participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub participant: ParticipantId,
    pub message: OutgoingMessage,
}

/// What `handle_event` produced.
#[derive(Debug, Default)]
pub struct EventOutcome {
    /// Messages for the caller to send, in order.
    pub deliveries: Vec<Delivery>,
    /// Set when the input was refused (e.g. a malformed time); nothing was mutated.
    pub rejection: Option<DaycycleError>,
}

/// Timers restored by [`DayCycleScheduler::bootstrap_from_store`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootstrapSummary {
    pub participants: usize,
    pub next_day: usize,
    pub reminders: usize,
    pub sweep_at: Option<DateTime<Tz>>,
}

struct CampaignState {
    records: Records,
    store: Box<dyn RecordStore>,
    timers: TimerRegistry,
}

impl CampaignState {
    /// Put `record` in place and persist the collection; restores the old
    /// record when the save fails.
    fn commit(&mut self, participant: ParticipantId, record: ParticipantRecord) -> Result<()> {
        let previous = self.records.insert(participant, record);
        if let Err(e) = self.store.save_all(&self.records) {
            match previous {
                Some(previous) => {
                    self.records.insert(participant, previous);
                }
                None => {
                    self.records.remove(&participant);
                }
            }
            return Err(e);
        }
        Ok(())
    }
}

struct Inner {
    state: Mutex<CampaignState>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    settings: SchedulerSettings,
    vocabulary: Vocabulary,
    templates: Templates,
    media: Option<MediaStore>,
}

/// Builder for [`DayCycleScheduler`].
pub struct SchedulerBuilder {
    store: Box<dyn RecordStore>,
    transport: Arc<dyn Transport>,
    clock: Option<Arc<dyn Clock>>,
    settings: SchedulerSettings,
    vocabulary: Vocabulary,
    content: ContentConfig,
    media: Option<MediaStore>,
}

impl SchedulerBuilder {
    pub fn settings(mut self, settings: SchedulerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn vocabulary(mut self, vocabulary: Vocabulary) -> Self {
        self.vocabulary = vocabulary;
        self
    }

    pub fn content(mut self, content: ContentConfig) -> Self {
        self.content = content;
        self
    }

    /// Store photo/video attachments of daily responses under `media`.
    pub fn media(mut self, media: MediaStore) -> Self {
        self.media = Some(media);
        self
    }

    /// Load the records and build the scheduler. No timer is armed until
    /// [`DayCycleScheduler::bootstrap_from_store`] runs.
    pub fn build(self) -> Result<DayCycleScheduler> {
        let records = self.store.load_all()?;
        tracing::info!(
            "📂 Loaded {} participant records from {} store",
            records.len(),
            self.store.name()
        );
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock::new(self.settings.timezone)),
        };
        let templates = Templates::new(
            self.content,
            self.vocabulary.yes_word(),
            self.vocabulary.no_word(),
        );
        Ok(DayCycleScheduler {
            inner: Arc::new(Inner {
                state: Mutex::new(CampaignState {
                    records,
                    store: self.store,
                    timers: TimerRegistry::new(),
                }),
                transport: self.transport,
                clock,
                settings: self.settings,
                vocabulary: self.vocabulary,
                templates,
                media: self.media,
            }),
        })
    }
}

/// The campaign scheduler. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct DayCycleScheduler {
    inner: Arc<Inner>,
}

impl DayCycleScheduler {
    pub fn builder(
        store: impl RecordStore + 'static,
        transport: Arc<dyn Transport>,
    ) -> SchedulerBuilder {
        SchedulerBuilder {
            store: Box::new(store),
            transport,
            clock: None,
            settings: SchedulerSettings::default(),
            vocabulary: Vocabulary::default(),
            content: ContentConfig::default(),
            media: None,
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.inner.settings
    }

    pub fn media(&self) -> Option<&MediaStore> {
        self.inner.media.as_ref()
    }

    /// Current campaign-local time.
    pub fn now(&self) -> DateTime<Tz> {
        self.inner
            .clock
            .now()
            .with_timezone(&self.inner.settings.timezone)
    }

    /// Current campaign-local date.
    pub fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    // ─── Event intake ─────────────────────────────────────────

    /// Apply `event` to an existing participant and return what to send.
    /// Timers requested by the transition are installed before returning.
    pub async fn handle_event(
        &self,
        participant: ParticipantId,
        event: Event,
    ) -> Result<EventOutcome> {
        let mut state = self.inner.state.lock().await;
        self.apply_locked(&mut state, participant, &event, None)
    }

    /// Transport-facing intake: registers first-time participants, refreshes
    /// their identity, stores attachments, applies the event and sends the
    /// resulting messages.
    pub async fn handle_message(&self, message: IncomingMessage) -> Result<()> {
        let participant = message.participant;
        let today = self.today();

        let wants_media = {
            let mut state = self.inner.state.lock().await;
            if !state.records.contains_key(&participant) {
                state
                    .commit(participant, ParticipantRecord::new(message.sender.clone()))
                    .inspect_err(|e| {
                        tracing::error!("❌ Could not register participant {participant}: {e}")
                    })?;
                tracing::info!("👤 New participant {participant}");
            }
            message.attachment.is_some()
                && state.records.get(&participant).is_some_and(|r| {
                    ParticipantState::of(r, today) == ParticipantState::NeedsDailyResponse
                })
        };

        let placeholder = self.inner.templates.media_placeholder();
        let event = match &message.attachment {
            // Media is always response content, whatever its caption says.
            Some(attachment) => {
                let mut text = message.text().unwrap_or(placeholder).to_string();
                if wants_media {
                    if let Some(note) = self.store_attachment(participant, attachment).await {
                        text.push_str(&note);
                    }
                }
                Event::FreeformInput(text)
            }
            None => self.inner.vocabulary.classify(message.text(), placeholder),
        };
        tracing::debug!("📨 {participant}: {event:?}");

        let outcome = {
            let mut state = self.inner.state.lock().await;
            self.apply_locked(&mut state, participant, &event, Some(&message.sender))?
        };
        if let Some(rejection) = &outcome.rejection {
            tracing::info!("↩️ Input from {participant} rejected: {rejection}");
        }
        self.deliver_all(outcome.deliveries).await;
        Ok(())
    }

    /// Send deliveries in order. Failures are logged and not retried.
    /// Returns how many failed.
    pub async fn deliver_all(&self, deliveries: Vec<Delivery>) -> usize {
        let mut failed = 0;
        for delivery in deliveries {
            let participant = delivery.participant;
            if let Err(e) = self
                .inner
                .transport
                .deliver(participant, delivery.message)
                .await
            {
                tracing::error!("❌ Delivery to {participant} failed: {e}");
                failed += 1;
            }
        }
        failed
    }

    fn apply_locked(
        &self,
        state: &mut CampaignState,
        participant: ParticipantId,
        event: &Event,
        identity: Option<&Identity>,
    ) -> Result<EventOutcome> {
        let Some(before) = state.records.get(&participant).cloned() else {
            tracing::warn!("⚠️ Event for unknown participant {participant} dropped");
            return Err(DaycycleError::NotFound(participant.to_string()));
        };
        let mut transition = machine::apply(&before, event, self.today());
        if let Some(identity) = identity {
            transition.record.identity = identity.clone();
        }

        if transition.record != before {
            state
                .commit(participant, transition.record.clone())
                .inspect_err(|e| {
                    tracing::error!("❌ Failed to persist {participant}, change dropped: {e}")
                })?;
        }

        for effect in &transition.effects {
            match effect {
                Effect::ScheduleReminder => {
                    self.install_reminder(state, participant);
                }
                Effect::CancelReminder => {
                    if state.timers.cancel(&TimerKey::Reminder(participant)) {
                        tracing::debug!("🔕 Reminder cancelled for {participant}");
                    }
                }
                Effect::ScheduleNextDay => {
                    self.install_next_day(state, participant);
                }
                Effect::Deliver(_) => {}
            }
        }

        let identity = &transition.record.identity;
        let deliveries = transition
            .contents()
            .map(|content| Delivery {
                participant,
                message: self.inner.templates.render(content, identity),
            })
            .collect();
        Ok(EventOutcome {
            deliveries,
            rejection: transition.rejection,
        })
    }

    async fn store_attachment(
        &self,
        participant: ParticipantId,
        attachment: &AttachmentRef,
    ) -> Option<String> {
        let media = self.inner.media.as_ref()?;
        attachment.kind.extension()?;
        let bytes = match self.inner.transport.fetch_attachment(attachment).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("⚠️ Could not fetch {} from {participant}: {e}", attachment.kind);
                return None;
            }
        };
        match media.save(participant, attachment.kind, &bytes, self.now()) {
            Ok(path) => Some(format!(" [attached {}: {}]", attachment.kind, path.display())),
            Err(e) => {
                tracing::warn!("⚠️ Could not store {} from {participant}: {e}", attachment.kind);
                None
            }
        }
    }

    // ─── Timers ───────────────────────────────────────────────

    /// (Re)arm the reminder for `participant`. Returns when it fires.
    pub async fn schedule_reminder(&self, participant: ParticipantId) -> Result<DateTime<Tz>> {
        let mut state = self.inner.state.lock().await;
        if !state.records.contains_key(&participant) {
            return Err(DaycycleError::NotFound(participant.to_string()));
        }
        Ok(self.install_reminder(&mut state, participant))
    }

    /// Cancel the reminder only. Returns whether one was live.
    pub async fn cancel_reminder(&self, participant: ParticipantId) -> bool {
        let mut state = self.inner.state.lock().await;
        state.timers.cancel(&TimerKey::Reminder(participant))
    }

    /// (Re)arm the next-day prompt. Returns the target, or `None` when nothing
    /// needs scheduling (no time chosen, campaign complete, already prompted).
    pub async fn schedule_next_day(
        &self,
        participant: ParticipantId,
    ) -> Result<Option<DateTime<Tz>>> {
        let mut state = self.inner.state.lock().await;
        if !state.records.contains_key(&participant) {
            return Err(DaycycleError::NotFound(participant.to_string()));
        }
        Ok(self.install_next_day(&mut state, participant))
    }

    /// Run the reminder for `participant` now, as if its timer fired.
    pub async fn fire_reminder(&self, participant: ParticipantId) -> Result<()> {
        self.reminder_fired(participant, None).await
    }

    /// Run the next-day prompt for `participant` now, as if its timer fired.
    pub async fn fire_next_day(&self, participant: ParticipantId) -> Result<()> {
        self.next_day_fired(participant, None).await
    }

    fn install_reminder(
        &self,
        state: &mut CampaignState,
        participant: ParticipantId,
    ) -> DateTime<Tz> {
        let now = self.now();
        let delay = self.inner.settings.reminder_interval;
        let fires_at = now + TimeDelta::from_std(delay).unwrap_or(TimeDelta::zero());
        self.arm(state, TimerKey::Reminder(participant), fires_at, delay);
        tracing::debug!("⏰ Reminder for {participant} at {fires_at}");
        fires_at
    }

    fn install_next_day(
        &self,
        state: &mut CampaignState,
        participant: ParticipantId,
    ) -> Option<DateTime<Tz>> {
        let key = TimerKey::NextDay(participant);
        let record = state.records.get(&participant)?;
        let (completed, time, last_response, last_prompt) = (
            record.completed,
            record.next_day_time,
            record.last_response_date,
            record.last_prompt_date,
        );

        if completed {
            state.timers.cancel(&key);
            tracing::debug!("🏁 {participant} finished the campaign, no next-day prompt");
            return None;
        }
        let Some(time) = time else {
            tracing::warn!("⚠️ No next-day time for {participant}, nothing scheduled");
            return None;
        };

        let now = self.now();
        let target_date = last_response.unwrap_or_else(|| now.date_naive()).succ_opt()?;
        if last_prompt.is_some_and(|d| d >= target_date) {
            tracing::debug!("📭 {participant} already prompted for {target_date}");
            return None;
        }

        let mut target = local_moment(self.inner.settings.timezone, target_date, time);
        if target <= now {
            let catchup = self.inner.settings.catchup_delay;
            target = now + TimeDelta::from_std(catchup).unwrap_or(TimeDelta::zero());
            tracing::info!("⏩ Next-day prompt for {participant} is overdue, catching up at {target}");
        }
        self.arm(state, key, target, delay_until(now, target));
        tracing::info!("📅 Next-day prompt for {participant} at {target}");
        Some(target)
    }

    fn install_sweep(&self, state: &mut CampaignState) -> DateTime<Tz> {
        let now = self.now();
        let next = next_daily_occurrence(now, self.inner.settings.sweep_time);
        self.arm(state, TimerKey::DailySweep, next, delay_until(now, next));
        tracing::debug!("🌙 Missed-day sweep armed for {next}");
        next
    }

    /// Spawn the sleeping task for `key`. It holds only a weak handle, so a
    /// dropped scheduler takes its timers with it.
    fn arm(&self, state: &mut CampaignState, key: TimerKey, fires_at: DateTime<Tz>, delay: Duration) {
        let weak = Arc::downgrade(&self.inner);
        state.timers.install(key, fires_at, move |generation| {
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Some(inner) = weak.upgrade() {
                    DayCycleScheduler { inner }.on_timer(key, generation).await;
                }
            })
            .abort_handle()
        });
    }

    fn on_timer(self, key: TimerKey, generation: u64) -> BoxFuture<'static, ()> {
        async move {
            let result = match key {
                TimerKey::Reminder(id) => self.reminder_fired(id, Some(generation)).await,
                TimerKey::NextDay(id) => self.next_day_fired(id, Some(generation)).await,
                TimerKey::DailySweep => self.sweep(Some(generation)).await.map(|_| ()),
            };
            if let Err(e) = result {
                tracing::warn!("⚠️ Timer {key} failed: {e}");
            }
        }
        .boxed()
    }

    async fn reminder_fired(&self, participant: ParticipantId, generation: Option<u64>) -> Result<()> {
        let key = TimerKey::Reminder(participant);
        let delivery = {
            let mut state = self.inner.state.lock().await;
            match generation {
                Some(generation) if !state.timers.claim(&key, generation) => {
                    tracing::debug!("💤 Stale reminder for {participant} ignored");
                    return Ok(());
                }
                _ => {}
            }
            let today = self.today();
            let Some(record) = state.records.get(&participant) else {
                state.timers.cancel(&key);
                return Err(DaycycleError::NotFound(participant.to_string()));
            };
            if record.completed || record.has_answered_on(today) {
                state.timers.cancel(&key);
                tracing::debug!("🔕 Reminder for {participant} no longer needed");
                return Ok(());
            }
            let message = self
                .inner
                .templates
                .render(&Content::Reminder, &record.identity);
            // Re-arm first: a failed delivery waits for the next natural firing.
            self.install_reminder(&mut state, participant);
            Delivery {
                participant,
                message,
            }
        };
        tracing::info!("🔔 Reminding {participant}");
        self.deliver_all(vec![delivery]).await;
        Ok(())
    }

    async fn next_day_fired(&self, participant: ParticipantId, generation: Option<u64>) -> Result<()> {
        let key = TimerKey::NextDay(participant);
        let (outcome, previous_prompt) = {
            let mut state = self.inner.state.lock().await;
            match generation {
                Some(generation) => {
                    if !state.timers.claim(&key, generation) {
                        tracing::debug!("💤 Stale next-day prompt for {participant} ignored");
                        return Ok(());
                    }
                }
                None => {
                    state.timers.cancel(&key);
                }
            }
            let previous_prompt = state
                .records
                .get(&participant)
                .and_then(|r| r.last_prompt_date);
            let outcome = self.apply_locked(&mut state, participant, &Event::DayTick, None)?;
            (outcome, previous_prompt)
        };
        if outcome.deliveries.is_empty() {
            return Ok(());
        }
        tracing::info!("🌅 New day prompt for {participant}");
        if self.deliver_all(outcome.deliveries).await > 0 {
            self.unmark_prompt(participant, previous_prompt).await;
        }
        Ok(())
    }

    /// The day prompt did not reach the participant: forget that it was sent,
    /// so the next bootstrap prompts again. Reminders cover the meantime.
    async fn unmark_prompt(&self, participant: ParticipantId, previous: Option<NaiveDate>) {
        let today = self.today();
        let mut state = self.inner.state.lock().await;
        let Some(mut record) = state.records.get(&participant).cloned() else {
            return;
        };
        if record.last_prompt_date != Some(today) {
            return;
        }
        record.last_prompt_date = previous;
        match state.commit(participant, record) {
            Ok(()) => tracing::warn!("⚠️ Day prompt for {participant} not delivered, will retry after restart"),
            Err(e) => tracing::error!("❌ Could not unmark day prompt for {participant}: {e}"),
        }
    }

    // ─── Missed-day sweep ─────────────────────────────────────

    /// Penalize every participant who let yesterday pass without a response,
    /// then re-arm the sweep for its next daily time. Returns how many
    /// participants were penalized.
    pub async fn run_missed_day_sweep(&self) -> Result<usize> {
        self.sweep(None).await
    }

    async fn sweep(&self, generation: Option<u64>) -> Result<usize> {
        let deliveries = {
            let mut state = self.inner.state.lock().await;
            match generation {
                Some(generation) if !state.timers.claim(&TimerKey::DailySweep, generation) => {
                    return Ok(0);
                }
                _ => {}
            }
            let result = self.penalize_missed(&mut state);
            self.install_sweep(&mut state);
            result?
        };
        let penalized = deliveries.len();
        tracing::info!("🌙 Missed-day sweep done: {penalized} participants moved on");
        self.deliver_all(deliveries).await;
        Ok(penalized)
    }

    fn penalize_missed(&self, state: &mut CampaignState) -> Result<Vec<Delivery>> {
        let today = self.today();
        let previous = state.records.clone();
        let mut deliveries = Vec::new();

        for (&participant, record) in state.records.iter_mut() {
            let transition = machine::apply(record, &Event::MissedTick, today);
            if transition.record == *record {
                continue;
            }
            deliveries.extend(transition.contents().map(|content| Delivery {
                participant,
                message: self.inner.templates.render(content, &transition.record.identity),
            }));
            *record = transition.record;
        }

        if deliveries.is_empty() {
            return Ok(deliveries);
        }
        if let Err(e) = state.store.save_all(&state.records) {
            state.records = previous;
            tracing::error!("❌ Missed-day sweep not persisted, rolled back: {e}");
            return Err(e);
        }
        Ok(deliveries)
    }

    // ─── Recovery ─────────────────────────────────────────────

    /// Reload the records and restore every timer: next-day prompts for
    /// participants with a chosen time, reminders for those still owing
    /// today's response, and the daily sweep. Safe to call repeatedly.
    pub async fn bootstrap_from_store(&self) -> Result<BootstrapSummary> {
        let mut state = self.inner.state.lock().await;
        state.records = state.store.load_all()?;
        let today = self.today();

        let mut summary = BootstrapSummary {
            participants: state.records.len(),
            ..BootstrapSummary::default()
        };
        let plan: Vec<(ParticipantId, bool, bool)> = state
            .records
            .iter()
            .map(|(&id, r)| {
                let needs_reminder = !r.completed && !r.has_answered_on(today);
                (id, r.next_day_time.is_some(), needs_reminder)
            })
            .collect();

        for (participant, has_time, needs_reminder) in plan {
            if has_time && self.install_next_day(&mut state, participant).is_some() {
                summary.next_day += 1;
            }
            if needs_reminder {
                self.install_reminder(&mut state, participant);
                summary.reminders += 1;
            }
        }
        summary.sweep_at = Some(self.install_sweep(&mut state));

        tracing::info!(
            "♻️ Restored timers for {} participants: {} next-day, {} reminders",
            summary.participants,
            summary.next_day,
            summary.reminders
        );
        Ok(summary)
    }

    // ─── Inspection ───────────────────────────────────────────

    /// Copy of every record.
    pub async fn snapshot(&self) -> Records {
        self.inner.state.lock().await.records.clone()
    }

    pub async fn record(&self, participant: ParticipantId) -> Option<ParticipantRecord> {
        self.inner.state.lock().await.records.get(&participant).cloned()
    }

    pub async fn stats(&self) -> CampaignStats {
        let today = self.today();
        CampaignStats::compute(&self.inner.state.lock().await.records, today)
    }

    /// When the timer in `key`'s slot fires, if one is live.
    pub async fn timer_deadline(&self, key: TimerKey) -> Option<DateTime<Tz>> {
        self.inner.state.lock().await.timers.fires_at(&key)
    }

    /// Number of live timers with the given purpose.
    pub async fn live_timers(&self, purpose: TimerPurpose) -> usize {
        self.inner.state.lock().await.timers.count(purpose)
    }

    /// Cancel every timer. The scheduler stays usable for inbound events.
    pub async fn shutdown(&self) {
        let mut state = self.inner.state.lock().await;
        let live = state.timers.len();
        state.timers.cancel_all();
        tracing::info!("🛑 Scheduler stopped, {live} timers cancelled");
    }
}
