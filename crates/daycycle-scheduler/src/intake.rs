//! Classification of inbound text into state machine events.

use daycycle_core::DayTime;
use daycycle_core::config::CampaignConfig;

use crate::machine::{CareReply, Event};

/// Words accepted as answers to the opt-in question (case-insensitive).
#[derive(Debug, Clone)]
pub struct Vocabulary {
    yes: Vec<String>,
    no: Vec<String>,
}

impl Vocabulary {
    pub fn new(yes: &[String], no: &[String]) -> Self {
        let norm = |words: &[String]| words.iter().map(|w| w.trim().to_lowercase()).collect();
        Self {
            yes: norm(yes),
            no: norm(no),
        }
    }

    pub fn from_config(config: &CampaignConfig) -> Self {
        Self::new(&config.yes_words, &config.no_words)
    }

    /// Preferred "yes" word, used for the keyboard.
    pub fn yes_word(&self) -> &str {
        self.yes.first().map(String::as_str).unwrap_or("yes")
    }

    /// Preferred "no" word, used for the keyboard.
    pub fn no_word(&self) -> &str {
        self.no.first().map(String::as_str).unwrap_or("no")
    }

    /// Map message text to an event. Media messages without a caption
    /// arrive as `None` and are always free-form.
    pub fn classify(&self, text: Option<&str>, placeholder: &str) -> Event {
        let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) else {
            return Event::FreeformInput(placeholder.to_string());
        };
        let lowered = text.to_lowercase();
        if lowered == "/start" || lowered.starts_with("/start@") {
            return Event::Start;
        }
        if self.yes.contains(&lowered) {
            return Event::CareAnswer(CareReply::Yes);
        }
        if self.no.contains(&lowered) {
            return Event::CareAnswer(CareReply::No);
        }
        if DayTime::looks_like_time(text) {
            return Event::TimeInput(text.to_string());
        }
        Event::FreeformInput(text.to_string())
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::from_config(&CampaignConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        let vocab = Vocabulary::default();
        assert_eq!(vocab.classify(Some("Да"), "-"), Event::CareAnswer(CareReply::Yes));
        assert_eq!(vocab.classify(Some(" no "), "-"), Event::CareAnswer(CareReply::No));
        assert_eq!(vocab.classify(Some("/start"), "-"), Event::Start);
        assert_eq!(vocab.classify(Some("09:30"), "-"), Event::TimeInput("09:30".into()));
        assert_eq!(vocab.classify(Some("9:5"), "-"), Event::TimeInput("9:5".into()));
        assert_eq!(
            vocab.classify(Some("woke up at 9:30, wore a scarf"), "-"),
            Event::FreeformInput("woke up at 9:30, wore a scarf".into())
        );
        assert_eq!(vocab.classify(None, "<media>"), Event::FreeformInput("<media>".into()));
        assert_eq!(vocab.classify(Some("  "), "<media>"), Event::FreeformInput("<media>".into()));
    }

    #[test]
    fn test_keyboard_words() {
        let vocab = Vocabulary::new(&["Да".into()], &["Нет".into(), "no".into()]);
        assert_eq!(vocab.yes_word(), "да");
        assert_eq!(vocab.no_word(), "нет");
    }
}
