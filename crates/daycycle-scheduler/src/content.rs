//! Rendering of [`Content`] into outgoing messages.

use daycycle_core::config::ContentConfig;
use daycycle_core::{Identity, Keyboard, OutgoingMessage};

use crate::machine::Content;

/// Configured texts plus the opt-in keyboard labels.
#[derive(Debug, Clone)]
pub struct Templates {
    texts: ContentConfig,
    yes_label: String,
    no_label: String,
}

impl Templates {
    pub fn new(texts: ContentConfig, yes_word: &str, no_word: &str) -> Self {
        Self {
            texts,
            yes_label: capitalize(yes_word),
            no_label: capitalize(no_word),
        }
    }

    /// Placeholder stored for media messages without caption.
    pub fn media_placeholder(&self) -> &str {
        &self.texts.media_placeholder
    }

    pub fn render(&self, content: &Content, identity: &Identity) -> OutgoingMessage {
        let t = &self.texts;
        match content {
            Content::Welcome => OutgoingMessage::text(&t.welcome),
            Content::DayGreeting { day } => {
                OutgoingMessage::text(t.day_greeting.replace("{day}", &day.to_string()))
            }
            Content::CareQuestion => OutgoingMessage::text(&t.care_question).with_keyboard(
                Keyboard::Choices(vec![self.yes_label.clone(), self.no_label.clone()]),
            ),
            Content::CareTips => OutgoingMessage::text(&t.care_tips).with_keyboard(Keyboard::Remove),
            Content::CareDeclined => {
                OutgoingMessage::text(&t.care_declined).with_keyboard(Keyboard::Remove)
            }
            Content::CareFollowupSaved => OutgoingMessage::text(&t.care_followup_saved),
            Content::DayTask { day } => {
                let text = t
                    .day_tasks
                    .get(usize::from(*day).saturating_sub(1))
                    .unwrap_or(&t.missing_day_task);
                OutgoingMessage::text(text.replace("{day}", &day.to_string()))
            }
            Content::AskNextDayTime => OutgoingMessage::text(&t.ask_next_day_time),
            Content::AlreadyAnswered { day } => {
                OutgoingMessage::text(t.already_answered.replace("{day}", &day.to_string()))
            }
            Content::ResponseSaved => OutgoingMessage::text(&t.response_saved),
            Content::CampaignComplete => OutgoingMessage::text(&t.campaign_complete),
            Content::ThankYou => OutgoingMessage::text(&t.thank_you),
            Content::TimeConfirmed { time } => {
                OutgoingMessage::text(t.time_confirmed.replace("{time}", &time.to_string()))
            }
            Content::InvalidTime => OutgoingMessage::text(&t.invalid_time),
            Content::Reminder => OutgoingMessage::text(
                t.reminder
                    .replace("{name}", &escape_html(identity.display_name())),
            ),
            Content::MissedDay => OutgoingMessage::text(&t.missed_day),
        }
    }
}

impl Default for Templates {
    fn default() -> Self {
        Self::new(ContentConfig::default(), "yes", "no")
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Escape user-provided text for Telegram HTML parse mode.
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
