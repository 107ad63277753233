//! Admin and reporting commands: `/stats`, `/admin`, `/export`,
//! `/media_users`, `/get_media <id>`.

use chrono::NaiveDate;
use daycycle_channels::TelegramChannel;
use daycycle_core::{AttachmentKind, OutgoingMessage, ParticipantId};
use daycycle_scheduler::media::kind_of;
use daycycle_scheduler::{CampaignStats, DayCycleScheduler, Records};
use std::path::PathBuf;
use std::time::Duration;

/// Files sent per `/get_media` call.
const MEDIA_BATCH: usize = 10;

/// Whether a chat may run admin commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminAccess {
    /// No admin id configured.
    Disabled,
    Denied { admin_id: i64 },
    Granted,
}

impl AdminAccess {
    pub fn check(admin_id: Option<i64>, chat: ParticipantId) -> Self {
        match admin_id {
            None => Self::Disabled,
            Some(id) if id == chat.0 => Self::Granted,
            Some(id) => Self::Denied { admin_id: id },
        }
    }

    /// Refusal text, `None` when access is granted.
    pub fn refusal(&self) -> Option<&'static str> {
        match self {
            Self::Disabled => Some("❌ Admin commands are disabled: ADMIN_ID is not configured."),
            Self::Denied { .. } => Some("❌ This command is only available to the admin."),
            Self::Granted => None,
        }
    }
}

pub struct AdminCommands {
    scheduler: DayCycleScheduler,
    telegram: TelegramChannel,
    admin_id: Option<i64>,
}

impl AdminCommands {
    pub fn new(
        scheduler: DayCycleScheduler,
        telegram: TelegramChannel,
        admin_id: Option<i64>,
    ) -> Self {
        Self {
            scheduler,
            telegram,
            admin_id,
        }
    }

    /// Run `command` for `chat`. Returns false when the command is not an admin command.
    pub async fn dispatch(
        &self,
        chat: ParticipantId,
        command: &str,
        args: &[String],
    ) -> daycycle_core::Result<bool> {
        match command {
            "stats" => self.stats(chat).await?,
            "admin" => self.whoami(chat).await?,
            "export" => self.export(chat).await?,
            "media_users" => self.media_users(chat).await?,
            "get_media" => self.get_media(chat, args).await?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    async fn reply(&self, chat: ParticipantId, text: impl Into<String>) -> daycycle_core::Result<()> {
        self.telegram
            .send_message(chat.0, &OutgoingMessage::text(text))
            .await
    }

    /// Sends the refusal and returns false unless `chat` is the admin.
    async fn authorize(&self, chat: ParticipantId) -> daycycle_core::Result<bool> {
        let access = AdminAccess::check(self.admin_id, chat);
        match access.refusal() {
            Some(text) => {
                tracing::info!("🔒 {chat} refused admin command ({access:?})");
                self.reply(chat, text).await?;
                Ok(false)
            }
            None => Ok(true),
        }
    }

    async fn stats(&self, chat: ParticipantId) -> daycycle_core::Result<()> {
        let stats = self.scheduler.stats().await;
        self.reply(chat, stats_text(&stats, self.scheduler.today()))
            .await
    }

    async fn whoami(&self, chat: ParticipantId) -> daycycle_core::Result<()> {
        let text = match AdminAccess::check(self.admin_id, chat) {
            AdminAccess::Granted => format!("✅ You are the admin! Your ID: {chat}"),
            AdminAccess::Denied { admin_id } => {
                format!("❌ You are not the admin.\nYour ID: {chat}\nAdmin ID: {admin_id}")
            }
            AdminAccess::Disabled => format!("❌ ADMIN_ID is not configured.\nYour ID: {chat}"),
        };
        self.reply(chat, text).await
    }

    async fn export(&self, chat: ParticipantId) -> daycycle_core::Result<()> {
        if !self.authorize(chat).await? {
            return Ok(());
        }
        let records = self.scheduler.snapshot().await;
        let bytes = serde_json::to_vec_pretty(&records)?;
        let today = self.scheduler.today();
        let caption = format!(
            "📊 Participant data as of {}\n👥 Participants: {}",
            today.format("%d.%m.%Y"),
            records.len()
        );
        self.telegram
            .send_document_bytes(chat.0, &export_file_name(today), bytes, Some(&caption))
            .await?;
        tracing::info!("📤 Exported {} records to admin {chat}", records.len());
        Ok(())
    }

    async fn media_users(&self, chat: ParticipantId) -> daycycle_core::Result<()> {
        if !self.authorize(chat).await? {
            return Ok(());
        }
        let Some(media) = self.scheduler.media() else {
            return self.reply(chat, "📭 Media storage is not configured.").await;
        };
        let listing = media.participants_with_media();
        let records = self.scheduler.snapshot().await;
        self.reply(chat, media_users_text(&listing, &records)).await
    }

    async fn get_media(&self, chat: ParticipantId, args: &[String]) -> daycycle_core::Result<()> {
        if !self.authorize(chat).await? {
            return Ok(());
        }
        let Some(target) = args.first().and_then(|a| a.parse::<ParticipantId>().ok()) else {
            return self
                .reply(
                    chat,
                    "ℹ️ Usage: <code>/get_media &lt;user_id&gt;</code>\nSee /media_users for ids.",
                )
                .await;
        };
        let files = self
            .scheduler
            .media()
            .map(|m| m.list_files(target))
            .unwrap_or_default();
        if files.is_empty() {
            return self
                .reply(chat, format!("📭 No media files for user {target}."))
                .await;
        }

        let (batch, remaining) = split_batch(files);
        self.reply(
            chat,
            format!("📁 Sending {} file(s) of user {target}...", batch.len()),
        )
        .await?;
        for (i, path) in batch.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            let caption = media_caption(path, target);
            if let Err(e) = self.telegram.send_file(chat.0, path, Some(&caption)).await {
                tracing::warn!("⚠️ Could not send {}: {e}", path.display());
            }
        }
        if remaining > 0 {
            self.reply(chat, format!("📎 {remaining} more file(s) not sent."))
                .await?;
        }
        Ok(())
    }
}

pub fn stats_text(stats: &CampaignStats, today: NaiveDate) -> String {
    format!(
        "📊 <b>Statistics</b>\n\n\
         👥 Participants: {}\n\
         ✍️ Responded today: {}\n\
         📝 Total responses: {}\n\
         🏁 Completed: {}\n\n\
         📅 {}",
        stats.total,
        stats.active_today,
        stats.total_response_days,
        stats.completed,
        today.format("%d.%m.%Y"),
    )
}

pub fn export_file_name(today: NaiveDate) -> String {
    format!("bot_data_{}.json", today.format("%Y%m%d"))
}

pub fn media_users_text(listing: &[(ParticipantId, usize)], records: &Records) -> String {
    if listing.is_empty() {
        return "📭 No participants have sent media yet.".into();
    }
    let mut text = String::from("📁 <b>Participants with media</b>\n");
    for (id, count) in listing {
        let identity = records.get(id).map(|r| &r.identity);
        let name = identity
            .and_then(|i| i.first_name.as_deref())
            .unwrap_or("Unknown");
        let handle = identity
            .and_then(|i| i.username.as_deref())
            .map(|u| format!(" (@{u})"))
            .unwrap_or_default();
        text.push_str(&format!(
            "\n👤 <b>{name}</b>{handle}\n   🆔: {id}\n   📁 Files: {count}\n   📥 <code>/get_media {id}</code>\n"
        ));
    }
    text
}

fn media_caption(path: &std::path::Path, participant: ParticipantId) -> String {
    let icon = match kind_of(path) {
        Some(AttachmentKind::Video) => "🎥",
        _ => "📸",
    };
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{icon} {name}\nUser: {participant}")
}

/// First batch of files and how many are left over.
fn split_batch(mut files: Vec<PathBuf>) -> (Vec<PathBuf>, usize) {
    let remaining = files.len().saturating_sub(MEDIA_BATCH);
    files.truncate(MEDIA_BATCH);
    (files, remaining)
}
