//! Participant record: the durable progress of one participant.

use chrono::NaiveDate;
use daycycle_core::{DayTime, Identity};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// First day of the campaign.
pub const FIRST_DAY: u8 = 1;
/// Last day of the campaign; `day` never goes beyond it.
pub const FINAL_DAY: u8 = 7;

/// Progress of one participant through the campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    /// Day the participant is currently working on (1..=7).
    #[serde(default = "first_day")]
    pub day: u8,
    /// The free-form response for `last_response_date` has been recorded.
    #[serde(default)]
    pub answered_today: bool,
    /// The yes/no opt-in was answered for the current day.
    #[serde(default)]
    pub care_question_answered: bool,
    /// Opt-in answered "yes", follow-up text still pending.
    #[serde(default)]
    pub waiting_for_care_response: bool,
    #[serde(default)]
    pub last_response_date: Option<NaiveDate>,
    #[serde(default)]
    pub next_day_time: Option<DayTime>,
    #[serde(default, deserialize_with = "one_or_many_per_date")]
    pub responses: BTreeMap<NaiveDate, Vec<String>>,
    #[serde(default, deserialize_with = "one_or_many_per_date")]
    pub care_responses: BTreeMap<NaiveDate, Vec<String>>,
    #[serde(default, rename = "user_info")]
    pub identity: Identity,
    /// Response for the final day recorded.
    #[serde(default)]
    pub completed: bool,
    /// Date the last day prompt was delivered.
    #[serde(default)]
    pub last_prompt_date: Option<NaiveDate>,
    /// Date the last missed-day penalty was applied.
    #[serde(default)]
    pub last_missed_date: Option<NaiveDate>,
}

fn first_day() -> u8 {
    FIRST_DAY
}

impl ParticipantRecord {
    /// Fresh record for a first-time participant.
    pub fn new(identity: Identity) -> Self {
        Self {
            day: FIRST_DAY,
            answered_today: false,
            care_question_answered: false,
            waiting_for_care_response: false,
            last_response_date: None,
            next_day_time: None,
            responses: BTreeMap::new(),
            care_responses: BTreeMap::new(),
            identity,
            completed: false,
            last_prompt_date: None,
            last_missed_date: None,
        }
    }

    /// Response for `today` is already on record.
    pub fn has_answered_on(&self, today: NaiveDate) -> bool {
        self.answered_today && self.last_response_date == Some(today)
    }

    /// Advance one day, never past the final day.
    pub fn advance_day(&mut self) {
        self.day = (self.day + 1).clamp(FIRST_DAY, FINAL_DAY);
    }

    /// Clear the three per-day flags.
    pub fn reset_daily_flags(&mut self) {
        self.answered_today = false;
        self.care_question_answered = false;
        self.waiting_for_care_response = false;
    }

    /// Bring values read from disk back inside the invariants.
    pub fn normalize(&mut self) {
        self.day = self.day.clamp(FIRST_DAY, FINAL_DAY);
        if self.waiting_for_care_response {
            self.care_question_answered = true;
        }
    }

    /// Number of dates with at least one response.
    pub fn response_days(&self) -> usize {
        self.responses.len()
    }
}

/// Older files stored a single string per date instead of a list.
fn one_or_many_per_date<'de, D>(deserializer: D) -> Result<BTreeMap<NaiveDate, Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    let raw: Option<BTreeMap<NaiveDate, OneOrMany>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(date, entry)| {
            let list = match entry {
                OneOrMany::One(s) => vec![s],
                OneOrMany::Many(v) => v,
            };
            (date, list)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_is_capped() {
        let mut record = ParticipantRecord::new(Identity::default());
        for _ in 0..20 {
            record.advance_day();
        }
        assert_eq!(record.day, FINAL_DAY);
    }

    #[test]
    fn test_reads_legacy_layout() {
        let json = r#"{
            "day": 3,
            "answered_today": true,
            "care_question_answered": true,
            "waiting_for_care_response": false,
            "last_response_date": "2024-01-05",
            "responses": {"2024-01-04": "single entry", "2024-01-05": ["a", "b"]},
            "next_day_time": "09:30",
            "user_info": {"first_name": "Ann", "username": null, "user_id": 42}
        }"#;
        let record: ParticipantRecord = serde_json::from_str(json).unwrap();
        let d4 = NaiveDate::from_ymd_opt(2024, 1, 4).unwrap();
        let d5 = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(record.responses[&d4], vec!["single entry".to_string()]);
        assert_eq!(record.responses[&d5].len(), 2);
        assert!(record.care_responses.is_empty());
        assert_eq!(record.next_day_time.unwrap().to_string(), "09:30");
        assert_eq!(record.identity.display_name(), "Ann");
        assert!(!record.completed);
        assert!(record.has_answered_on(d5));
        assert!(!record.has_answered_on(d4));
    }

    #[test]
    fn test_null_maps_and_missing_fields() {
        let record: ParticipantRecord =
            serde_json::from_str(r#"{"responses": null, "next_day_time": null}"#).unwrap();
        assert_eq!(record.day, FIRST_DAY);
        assert!(record.responses.is_empty());
        assert!(record.next_day_time.is_none());
    }

    #[test]
    fn test_normalize_restores_invariants() {
        let mut record = ParticipantRecord::new(Identity::default());
        record.day = 0;
        record.waiting_for_care_response = true;
        record.normalize();
        assert_eq!(record.day, FIRST_DAY);
        assert!(record.care_question_answered);

        record.day = 12;
        record.normalize();
        assert_eq!(record.day, FINAL_DAY);
    }
}
