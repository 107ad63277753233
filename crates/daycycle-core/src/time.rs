//! Local wall-clock time of day in strict `HH:MM` form.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::DaycycleError;

/// Time of day chosen by a participant (or configured for the sweep).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DayTime {
    hour: u8,
    minute: u8,
}

impl DayTime {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    pub fn to_naive(&self) -> chrono::NaiveTime {
        chrono::NaiveTime::from_hms_opt(self.hour as u32, self.minute as u32, 0)
            .unwrap_or(chrono::NaiveTime::MIN)
    }

    /// Loose check used to route text that looks like a time attempt
    /// (`9:5`, `24:00`) to validation instead of treating it as a diary entry.
    pub fn looks_like_time(text: &str) -> bool {
        let Some((h, m)) = text.trim().split_once(':') else {
            return false;
        };
        let digits = |s: &str| !s.is_empty() && s.len() <= 2 && s.bytes().all(|b| b.is_ascii_digit());
        digits(h) && digits(m)
    }
}

impl FromStr for DayTime {
    type Err = DaycycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DaycycleError::Validation(format!("expected HH:MM, got '{s}'"));
        let (h, m) = s.trim().split_once(':').ok_or_else(invalid)?;
        let two_digits = |p: &str| p.len() == 2 && p.bytes().all(|b| b.is_ascii_digit());
        if !two_digits(h) || !two_digits(m) {
            return Err(invalid());
        }
        let hour: u8 = h.parse().map_err(|_| invalid())?;
        let minute: u8 = m.parse().map_err(|_| invalid())?;
        DayTime::new(hour, minute).ok_or_else(invalid)
    }
}

impl fmt::Display for DayTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl Serialize for DayTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DayTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_times() {
        assert_eq!("09:30".parse::<DayTime>().unwrap(), DayTime::new(9, 30).unwrap());
        assert_eq!("00:00".parse::<DayTime>().unwrap().to_string(), "00:00");
        assert_eq!(" 23:59 ".parse::<DayTime>().unwrap().to_string(), "23:59");
    }

    #[test]
    fn test_rejects_out_of_range_and_malformed() {
        for bad in ["24:00", "9:5", "12:60", "0930", "ab:cd", "", "12:3a", "123:00"] {
            let err = bad.parse::<DayTime>().unwrap_err();
            assert!(matches!(err, DaycycleError::Validation(_)), "{bad} accepted");
        }
    }

    #[test]
    fn test_looks_like_time() {
        assert!(DayTime::looks_like_time("9:5"));
        assert!(DayTime::looks_like_time("24:00"));
        assert!(!DayTime::looks_like_time("at 9:30 I went out"));
        assert!(!DayTime::looks_like_time("hello"));
    }

    #[test]
    fn test_serde_as_string() {
        let t = DayTime::new(7, 5).unwrap();
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(json, "\"07:05\"");
        let back: DayTime = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
        assert!(serde_json::from_str::<DayTime>("\"7:5\"").is_err());
    }
}
