//! Participant state machine: pure transitions over a [`ParticipantRecord`].
//!
//! ## States
//! ```text
//! NeedsCareAnswer ──yes──▶ NeedsCareFollowup ──text──┐
//!        │                                            ▼
//!        └────────no────────────────────────▶ NeedsDailyResponse
//!                                                     │ text
//!                                    day < 7 ◀────────┴────────▶ day == 7
//!                               NeedsNextDayTime                Complete
//! ```
//! `DayTick` starts a new day, `MissedTick` penalizes a skipped one.
//! No I/O happens here: the scheduler turns [`Effect`]s into deliveries,
//! timer installs and cancellations.

use chrono::NaiveDate;
use daycycle_core::{DayTime, DaycycleError};

use crate::record::{FINAL_DAY, FIRST_DAY, ParticipantRecord};

/// Where a participant stands on a given date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantState {
    NeedsCareAnswer,
    NeedsCareFollowup,
    NeedsDailyResponse,
    NeedsNextDayTime,
    Complete,
}

impl ParticipantState {
    /// Derive the state from the record flags.
    pub fn of(record: &ParticipantRecord, today: NaiveDate) -> Self {
        if record.has_answered_on(today) {
            return if record.completed {
                ParticipantState::Complete
            } else {
                ParticipantState::NeedsNextDayTime
            };
        }
        if record.completed {
            ParticipantState::Complete
        } else if !record.care_question_answered {
            ParticipantState::NeedsCareAnswer
        } else if record.waiting_for_care_response {
            ParticipantState::NeedsCareFollowup
        } else {
            ParticipantState::NeedsDailyResponse
        }
    }
}

/// Answer to the opt-in question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CareReply {
    Yes,
    No,
}

impl CareReply {
    pub fn label(&self) -> &'static str {
        match self {
            CareReply::Yes => "yes",
            CareReply::No => "no",
        }
    }
}

/// Something that happened to a participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The participant (re)opened the conversation.
    Start,
    CareAnswer(CareReply),
    /// Free text, or the stored description of a media message.
    FreeformInput(String),
    /// Raw text that looks like a next-day time.
    TimeInput(String),
    /// The next-day prompt is due.
    DayTick,
    /// The daily sweep runs.
    MissedTick,
}

/// Participant-facing content, rendered by [`crate::content::Templates`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Welcome,
    DayGreeting { day: u8 },
    CareQuestion,
    CareTips,
    CareDeclined,
    CareFollowupSaved,
    DayTask { day: u8 },
    AskNextDayTime,
    AlreadyAnswered { day: u8 },
    ResponseSaved,
    CampaignComplete,
    ThankYou,
    TimeConfirmed { time: DayTime },
    InvalidTime,
    Reminder,
    MissedDay,
}

/// Follow-up work requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Deliver(Content),
    ScheduleReminder,
    CancelReminder,
    ScheduleNextDay,
}

/// Result of applying one event.
#[derive(Debug)]
pub struct Transition {
    pub record: ParticipantRecord,
    pub effects: Vec<Effect>,
    /// Set when the input was refused; the record is then unchanged.
    pub rejection: Option<DaycycleError>,
}

impl Transition {
    fn new(record: ParticipantRecord) -> Self {
        Self {
            record,
            effects: Vec::new(),
            rejection: None,
        }
    }

    fn deliver(&mut self, content: Content) {
        self.effects.push(Effect::Deliver(content));
    }

    fn request(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    /// Content to send, in order.
    pub fn contents(&self) -> impl Iterator<Item = &Content> {
        self.effects.iter().filter_map(|e| match e {
            Effect::Deliver(c) => Some(c),
            _ => None,
        })
    }

    pub fn requests(&self, effect: &Effect) -> bool {
        self.effects.contains(effect)
    }
}

/// Missed-day rule: the previous day went by without a response.
pub fn is_missed(record: &ParticipantRecord, today: NaiveDate) -> bool {
    if record.completed || record.answered_today || record.last_missed_date == Some(today) {
        return false;
    }
    record.last_response_date != today.pred_opt()
}

/// Apply `event` to `record` on the campaign-local date `today`.
pub fn apply(record: &ParticipantRecord, event: &Event, today: NaiveDate) -> Transition {
    let state = ParticipantState::of(record, today);
    let mut t = Transition::new(record.clone());

    match event {
        Event::DayTick => day_tick(&mut t, state, today),
        Event::MissedTick => missed_tick(&mut t, today),
        Event::Start => start(&mut t, state, today),
        Event::TimeInput(raw) => time_input(&mut t, state, raw),
        Event::CareAnswer(reply) => match state {
            ParticipantState::NeedsCareAnswer => care_answer(&mut t, *reply, today),
            ParticipantState::Complete => t.deliver(Content::ThankYou),
            ParticipantState::NeedsNextDayTime => already_answered(&mut t),
            // Opt-in already resolved: the reply word counts as free-form input.
            _ => return apply(record, &Event::FreeformInput(reply.label().to_string()), today),
        },
        Event::FreeformInput(text) => match state {
            ParticipantState::NeedsCareAnswer => t.deliver(Content::CareQuestion),
            ParticipantState::NeedsCareFollowup => care_followup(&mut t, text, today),
            ParticipantState::NeedsDailyResponse => record_response(&mut t, text, today),
            ParticipantState::NeedsNextDayTime => already_answered(&mut t),
            ParticipantState::Complete => t.deliver(Content::ThankYou),
        },
    }
    t
}

fn day_tick(t: &mut Transition, state: ParticipantState, today: NaiveDate) {
    match state {
        ParticipantState::Complete => return,
        // Today's response came in before the prompt; the day is already done.
        ParticipantState::NeedsNextDayTime => {
            t.record.last_prompt_date = Some(today);
            return;
        }
        _ => {}
    }
    let r = &mut t.record;
    r.reset_daily_flags();
    r.last_prompt_date = Some(today);
    let day = r.day;
    t.deliver(Content::DayGreeting { day });
    t.deliver(Content::CareQuestion);
    t.request(Effect::ScheduleReminder);
}

fn missed_tick(t: &mut Transition, today: NaiveDate) {
    if !is_missed(&t.record, today) {
        return;
    }
    t.record.advance_day();
    t.record.reset_daily_flags();
    t.record.last_missed_date = Some(today);
    t.deliver(Content::MissedDay);
}

fn start(t: &mut Transition, state: ParticipantState, today: NaiveDate) {
    match state {
        ParticipantState::Complete => t.deliver(Content::ThankYou),
        ParticipantState::NeedsNextDayTime => already_answered(t),
        _ => {
            if t.record.last_response_date.is_none() {
                t.deliver(Content::Welcome);
            }
            let day = t.record.day;
            t.deliver(Content::DayGreeting { day });
            match state {
                ParticipantState::NeedsCareFollowup => t.deliver(Content::CareTips),
                ParticipantState::NeedsDailyResponse => offer_daily_task(t, today),
                _ => t.deliver(Content::CareQuestion),
            }
            t.request(Effect::ScheduleReminder);
        }
    }
}

fn time_input(t: &mut Transition, state: ParticipantState, raw: &str) {
    if state == ParticipantState::Complete {
        t.deliver(Content::ThankYou);
        return;
    }
    match raw.parse::<DayTime>() {
        Ok(time) => {
            t.record.next_day_time = Some(time);
            t.deliver(Content::TimeConfirmed { time });
            t.request(Effect::ScheduleNextDay);
        }
        Err(e) => {
            t.deliver(Content::InvalidTime);
            t.rejection = Some(e);
        }
    }
}

fn care_answer(t: &mut Transition, reply: CareReply, today: NaiveDate) {
    t.record.care_question_answered = true;
    match reply {
        CareReply::Yes => {
            t.record.waiting_for_care_response = true;
            t.deliver(Content::CareTips);
        }
        CareReply::No => {
            t.deliver(Content::CareDeclined);
            offer_daily_task(t, today);
        }
    }
}

fn care_followup(t: &mut Transition, text: &str, today: NaiveDate) {
    t.record
        .care_responses
        .entry(today)
        .or_default()
        .push(text.to_string());
    t.record.waiting_for_care_response = false;
    t.deliver(Content::CareFollowupSaved);
    offer_daily_task(t, today);
}

fn offer_daily_task(t: &mut Transition, today: NaiveDate) {
    if t.record.has_answered_on(today) {
        already_answered(t);
        return;
    }
    let day = t.record.day;
    t.deliver(Content::DayTask { day });
    if day < FINAL_DAY {
        t.deliver(Content::AskNextDayTime);
    }
}

fn record_response(t: &mut Transition, text: &str, today: NaiveDate) {
    let r = &mut t.record;
    let answered_day = r.day;
    r.responses.entry(today).or_default().push(text.to_string());
    r.answered_today = true;
    r.last_response_date = Some(today);
    t.request(Effect::CancelReminder);

    if answered_day < FINAL_DAY {
        t.record.advance_day();
        t.deliver(Content::ResponseSaved);
    } else {
        t.record.completed = true;
        t.deliver(Content::CampaignComplete);
        t.deliver(Content::ThankYou);
    }
}

fn already_answered(t: &mut Transition) {
    let day = t.record.day.saturating_sub(1).max(FIRST_DAY);
    t.deliver(Content::AlreadyAnswered { day });
}

#[cfg(test)]
mod tests {
    use super::*;
    use daycycle_core::Identity;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn fresh() -> ParticipantRecord {
        ParticipantRecord::new(Identity::default())
    }

    fn text(s: &str) -> Event {
        Event::FreeformInput(s.to_string())
    }

    #[test]
    fn test_state_derivation() {
        let today = date(5);
        let mut r = fresh();
        assert_eq!(ParticipantState::of(&r, today), ParticipantState::NeedsCareAnswer);

        r.care_question_answered = true;
        r.waiting_for_care_response = true;
        assert_eq!(ParticipantState::of(&r, today), ParticipantState::NeedsCareFollowup);

        r.waiting_for_care_response = false;
        assert_eq!(ParticipantState::of(&r, today), ParticipantState::NeedsDailyResponse);

        r.answered_today = true;
        r.last_response_date = Some(today);
        assert_eq!(ParticipantState::of(&r, today), ParticipantState::NeedsNextDayTime);

        // Stale flag from an earlier date does not block today's response.
        assert_eq!(ParticipantState::of(&r, date(6)), ParticipantState::NeedsDailyResponse);

        r.completed = true;
        assert_eq!(ParticipantState::of(&r, today), ParticipantState::Complete);
        assert_eq!(ParticipantState::of(&r, date(9)), ParticipantState::Complete);
    }

    #[test]
    fn test_care_yes_then_followup() {
        let today = date(5);
        let t = apply(&fresh(), &Event::CareAnswer(CareReply::Yes), today);
        assert!(t.record.care_question_answered);
        assert!(t.record.waiting_for_care_response);
        assert_eq!(t.contents().collect::<Vec<_>>(), vec![&Content::CareTips]);

        let t = apply(&t.record, &text("washed my coat"), today);
        assert!(!t.record.waiting_for_care_response);
        assert_eq!(t.record.care_responses[&today], vec!["washed my coat".to_string()]);
        assert!(t.record.responses.is_empty());
        let contents: Vec<_> = t.contents().cloned().collect();
        assert_eq!(
            contents,
            vec![
                Content::CareFollowupSaved,
                Content::DayTask { day: 1 },
                Content::AskNextDayTime
            ]
        );
    }

    #[test]
    fn test_care_no_goes_straight_to_daily_task() {
        let mut r = fresh();
        r.day = 3;
        let t = apply(&r, &Event::CareAnswer(CareReply::No), date(5));
        assert!(t.record.care_question_answered);
        assert!(!t.record.waiting_for_care_response);
        assert_eq!(
            ParticipantState::of(&t.record, date(5)),
            ParticipantState::NeedsDailyResponse
        );
        assert!(t.contents().any(|c| *c == Content::DayTask { day: 3 }));
    }

    #[test]
    fn test_no_time_request_on_final_day() {
        let mut r = fresh();
        r.day = FINAL_DAY;
        let t = apply(&r, &Event::CareAnswer(CareReply::No), date(5));
        assert!(!t.contents().any(|c| *c == Content::AskNextDayTime));
    }

    #[test]
    fn test_text_before_opt_in_reasks_question() {
        let r = fresh();
        let t = apply(&r, &text("hello"), date(5));
        assert_eq!(t.record, r);
        assert_eq!(t.contents().collect::<Vec<_>>(), vec![&Content::CareQuestion]);
    }

    #[test]
    fn test_daily_response_advances_day() {
        let today = date(5);
        let mut r = fresh();
        r.day = 3;
        r.care_question_answered = true;
        let t = apply(&r, &text("ok"), today);
        assert_eq!(t.record.day, 4);
        assert!(t.record.answered_today);
        assert_eq!(t.record.last_response_date, Some(today));
        assert_eq!(t.record.responses[&today], vec!["ok".to_string()]);
        assert!(t.requests(&Effect::CancelReminder));
        assert!(t.contents().any(|c| *c == Content::ResponseSaved));
        assert!(!t.record.completed);
    }

    #[test]
    fn test_final_response_completes_campaign() {
        let today = date(5);
        let mut r = fresh();
        r.day = FINAL_DAY;
        r.care_question_answered = true;
        let t = apply(&r, &text("done"), today);
        assert_eq!(t.record.day, FINAL_DAY);
        assert!(t.record.completed);
        let contents: Vec<_> = t.contents().cloned().collect();
        assert_eq!(contents, vec![Content::CampaignComplete, Content::ThankYou]);
        assert_eq!(ParticipantState::of(&t.record, today), ParticipantState::Complete);
    }

    #[test]
    fn test_second_response_same_day_is_idempotent() {
        let today = date(5);
        let mut r = fresh();
        r.care_question_answered = true;
        let first = apply(&r, &text("first"), today);
        let second = apply(&first.record, &text("second"), today);
        assert_eq!(second.record, first.record);
        assert_eq!(
            second.contents().collect::<Vec<_>>(),
            vec![&Content::AlreadyAnswered { day: 1 }]
        );
        let care = apply(&first.record, &Event::CareAnswer(CareReply::Yes), today);
        assert_eq!(care.record, first.record);
    }

    #[test]
    fn test_care_word_after_opt_in_counts_as_response() {
        // Lenient fallthrough: once the opt-in is resolved any input is the day's content.
        let today = date(5);
        let mut r = fresh();
        r.care_question_answered = true;
        let t = apply(&r, &Event::CareAnswer(CareReply::Yes), today);
        assert_eq!(t.record.responses[&today], vec!["yes".to_string()]);
        assert!(t.record.answered_today);
    }

    #[test]
    fn test_time_input_valid() {
        let t = apply(&fresh(), &Event::TimeInput("09:30".into()), date(5));
        assert_eq!(t.record.next_day_time.unwrap().to_string(), "09:30");
        assert!(t.requests(&Effect::ScheduleNextDay));
        assert!(t.rejection.is_none());
    }

    #[test]
    fn test_time_input_rejected_without_mutation() {
        let mut r = fresh();
        r.next_day_time = Some("08:00".parse().unwrap());
        for raw in ["24:00", "9:5", "12:75"] {
            let t = apply(&r, &Event::TimeInput(raw.into()), date(5));
            assert_eq!(t.record, r);
            assert!(matches!(t.rejection, Some(DaycycleError::Validation(_))));
            assert_eq!(t.contents().collect::<Vec<_>>(), vec![&Content::InvalidTime]);
            assert!(!t.requests(&Effect::ScheduleNextDay));
        }
    }

    #[test]
    fn test_day_tick_resets_flags() {
        let today = date(6);
        let mut r = fresh();
        r.day = 4;
        r.answered_today = true;
        r.care_question_answered = true;
        r.last_response_date = Some(date(5));
        let t = apply(&r, &Event::DayTick, today);
        assert!(!t.record.answered_today);
        assert!(!t.record.care_question_answered);
        assert!(!t.record.waiting_for_care_response);
        assert_eq!(t.record.last_prompt_date, Some(today));
        assert_eq!(t.record.day, 4);
        let contents: Vec<_> = t.contents().cloned().collect();
        assert_eq!(contents, vec![Content::DayGreeting { day: 4 }, Content::CareQuestion]);
        assert!(t.requests(&Effect::ScheduleReminder));
    }

    #[test]
    fn test_day_tick_after_early_response_keeps_the_day() {
        let today = date(6);
        let mut r = fresh();
        r.day = 5;
        r.answered_today = true;
        r.care_question_answered = true;
        r.last_response_date = Some(today);
        let t = apply(&r, &Event::DayTick, today);
        assert!(t.record.answered_today);
        assert!(t.record.care_question_answered);
        assert_eq!(t.record.day, 5);
        assert_eq!(t.record.last_prompt_date, Some(today));
        assert!(t.effects.is_empty());

        let again = apply(&t.record, &text("second note"), today);
        assert_eq!(again.record.day, 5);
        assert_eq!(again.record.responses, t.record.responses);
    }

    #[test]
    fn test_day_tick_ignored_when_complete() {
        let mut r = fresh();
        r.day = FINAL_DAY;
        r.completed = true;
        let t = apply(&r, &Event::DayTick, date(6));
        assert_eq!(t.record, r);
        assert!(t.effects.is_empty());
    }

    #[test]
    fn test_missed_tick_rules() {
        let today = date(7);
        let mut r = fresh();
        r.day = 3;
        r.care_question_answered = true;
        r.waiting_for_care_response = true;
        r.last_response_date = Some(date(5));
        let t = apply(&r, &Event::MissedTick, today);
        assert_eq!(t.record.day, 4);
        assert!(!t.record.care_question_answered);
        assert!(!t.record.waiting_for_care_response);
        assert_eq!(t.contents().collect::<Vec<_>>(), vec![&Content::MissedDay]);
        assert!(!t.effects.iter().any(|e| !matches!(e, Effect::Deliver(_))));

        // Responded yesterday: nothing happens.
        r.last_response_date = Some(date(6));
        let t = apply(&r, &Event::MissedTick, today);
        assert_eq!(t.record, r);
        assert!(t.effects.is_empty());

        // Already answered today: nothing happens.
        r.last_response_date = Some(today);
        r.answered_today = true;
        assert!(apply(&r, &Event::MissedTick, today).effects.is_empty());
    }

    #[test]
    fn test_missed_tick_once_per_date() {
        let today = date(7);
        let mut r = fresh();
        r.day = 2;
        r.last_response_date = Some(date(4));
        let first = apply(&r, &Event::MissedTick, today);
        assert_eq!(first.record.day, 3);
        assert_eq!(first.record.last_missed_date, Some(today));
        let second = apply(&first.record, &Event::MissedTick, today);
        assert_eq!(second.record, first.record);
        assert!(second.effects.is_empty());
        // The next night counts again.
        assert_eq!(apply(&first.record, &Event::MissedTick, date(8)).record.day, 4);
    }

    #[test]
    fn test_missed_tick_caps_day() {
        let mut r = fresh();
        r.day = FINAL_DAY;
        let t = apply(&r, &Event::MissedTick, date(9));
        assert_eq!(t.record.day, FINAL_DAY);
    }

    #[test]
    fn test_start_for_newcomer() {
        let t = apply(&fresh(), &Event::Start, date(5));
        let contents: Vec<_> = t.contents().cloned().collect();
        assert_eq!(
            contents,
            vec![Content::Welcome, Content::DayGreeting { day: 1 }, Content::CareQuestion]
        );
        assert!(t.requests(&Effect::ScheduleReminder));
    }

    #[test]
    fn test_start_after_answering() {
        let today = date(5);
        let mut r = fresh();
        r.day = 3;
        r.answered_today = true;
        r.last_response_date = Some(today);
        let t = apply(&r, &Event::Start, today);
        assert_eq!(
            t.contents().collect::<Vec<_>>(),
            vec![&Content::AlreadyAnswered { day: 2 }]
        );
        assert!(!t.requests(&Effect::ScheduleReminder));
    }

    #[test]
    fn test_day_never_decreases_over_random_walk() {
        let events = [
            Event::Start,
            Event::CareAnswer(CareReply::No),
            text("a"),
            Event::TimeInput("10:00".into()),
            Event::MissedTick,
            Event::DayTick,
            Event::CareAnswer(CareReply::Yes),
            text("b"),
            text("c"),
        ];
        let mut record = fresh();
        for d in 1..=28u32 {
            let today = NaiveDate::from_ymd_opt(2024, 2, d).unwrap();
            for (i, event) in events.iter().enumerate() {
                if (d as usize + i) % 3 == 0 {
                    continue;
                }
                let before = record.day;
                record = apply(&record, event, today).record;
                assert!(record.day >= before);
                assert!((FIRST_DAY..=FINAL_DAY).contains(&record.day));
                assert!(!record.waiting_for_care_response || record.care_question_answered);
            }
        }
    }
}
