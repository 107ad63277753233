//! Campaign statistics for `/stats`.

use chrono::NaiveDate;
use serde::Serialize;

use crate::store::Records;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CampaignStats {
    /// Participants with a record.
    pub total: usize,
    /// Participants whose latest response is from the given date.
    pub active_today: usize,
    /// Sum over participants of dates with at least one response.
    pub total_response_days: usize,
    /// Participants who finished the final day.
    pub completed: usize,
}

impl CampaignStats {
    pub fn compute(records: &Records, today: NaiveDate) -> Self {
        records.values().fold(Self::default(), |mut acc, r| {
            acc.total += 1;
            if r.last_response_date == Some(today) {
                acc.active_today += 1;
            }
            acc.total_response_days += r.response_days();
            if r.completed {
                acc.completed += 1;
            }
            acc
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ParticipantRecord;
    use daycycle_core::{Identity, ParticipantId};

    #[test]
    fn test_compute() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let yesterday = today.pred_opt().unwrap();
        let mut records = Records::new();

        let mut a = ParticipantRecord::new(Identity::default());
        a.answered_today = true;
        a.last_response_date = Some(today);
        a.responses.insert(yesterday, vec!["x".into()]);
        a.responses.insert(today, vec!["y".into(), "z".into()]);
        records.insert(ParticipantId(1), a);

        let mut b = ParticipantRecord::new(Identity::default());
        b.answered_today = true;
        b.last_response_date = Some(yesterday);
        b.responses.insert(yesterday, vec!["x".into()]);
        b.completed = true;
        records.insert(ParticipantId(2), b);

        records.insert(ParticipantId(3), ParticipantRecord::new(Identity::default()));

        let stats = CampaignStats::compute(&records, today);
        assert_eq!(
            stats,
            CampaignStats {
                total: 3,
                active_today: 1,
                total_response_days: 3,
                completed: 1,
            }
        );
    }
}
