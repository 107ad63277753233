//! Telegram Bot channel: long polling, HTML messages with reply keyboards,
//! attachment download and multipart file uploads via the Bot API.

use async_trait::async_trait;
use daycycle_core::config::TelegramChannelConfig;
use daycycle_core::error::{DaycycleError, Result};
use daycycle_core::traits::Transport;
use daycycle_core::types::{
    AttachmentKind, AttachmentRef, Identity, IncomingMessage, Keyboard, OutgoingMessage,
    ParticipantId,
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

const API_BASE: &str = "https://api.telegram.org";

/// Telegram Bot channel.
#[derive(Clone)]
pub struct TelegramChannel {
    config: TelegramChannelConfig,
    client: reqwest::Client,
}

fn api_err(context: &str) -> impl FnOnce(reqwest::Error) -> DaycycleError + '_ {
    move |e| DaycycleError::Delivery(format!("Telegram {context} failed: {e}"))
}

impl TelegramChannel {
    pub fn new(config: TelegramChannelConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("{API_BASE}/bot{}/{}", self.config.bot_token, method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{API_BASE}/file/bot{}/{}", self.config.bot_token, file_path)
    }

    /// Unwrap a Bot API envelope.
    async fn read_result<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
        method: &str,
    ) -> Result<T> {
        let body: TelegramApiResponse<T> = response
            .json()
            .await
            .map_err(|e| DaycycleError::Delivery(format!("Invalid Telegram {method} response: {e}")))?;
        if !body.ok {
            return Err(DaycycleError::Delivery(format!(
                "Telegram {method} error: {}",
                body.description.unwrap_or_default()
            )));
        }
        body.result
            .ok_or_else(|| DaycycleError::Delivery(format!("Telegram {method}: empty result")))
    }

    /// Long-poll for updates after `offset`.
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<TelegramUpdate>> {
        let response = self
            .client
            .get(self.api_url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", "30".into()),
                ("allowed_updates", "[\"message\"]".into()),
            ])
            .send()
            .await
            .map_err(api_err("getUpdates"))?;
        Self::read_result(response, "getUpdates").await
    }

    /// Send an HTML message, with the keyboard if the message carries one.
    pub async fn send_message(&self, chat_id: i64, message: &OutgoingMessage) -> Result<()> {
        let body = send_message_body(chat_id, message);
        let response = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(api_err("sendMessage"))?;
        Self::read_result::<serde_json::Value>(response, "sendMessage").await?;
        Ok(())
    }

    /// Get bot info.
    pub async fn get_me(&self) -> Result<TelegramUser> {
        let response = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(api_err("getMe"))?;
        Self::read_result(response, "getMe").await
    }

    /// Resolve a file id to its download path.
    pub async fn get_file(&self, file_id: &str) -> Result<TelegramFile> {
        let response = self
            .client
            .get(self.api_url("getFile"))
            .query(&[("file_id", file_id)])
            .send()
            .await
            .map_err(api_err("getFile"))?;
        Self::read_result(response, "getFile").await
    }

    /// Download a file by id.
    pub async fn download(&self, file_id: &str) -> Result<Vec<u8>> {
        let file = self.get_file(file_id).await?;
        let path = file
            .file_path
            .ok_or_else(|| DaycycleError::Delivery(format!("Telegram file {file_id} has no path")))?;
        let response = self
            .client
            .get(self.file_url(&path))
            .send()
            .await
            .map_err(api_err("file download"))?
            .error_for_status()
            .map_err(api_err("file download"))?;
        let bytes = response.bytes().await.map_err(api_err("file download"))?;
        tracing::debug!("📥 Downloaded {} bytes ({path})", bytes.len());
        Ok(bytes.to_vec())
    }

    /// Upload in-memory bytes as a document.
    pub async fn send_document_bytes(
        &self,
        chat_id: i64,
        file_name: &str,
        bytes: Vec<u8>,
        caption: Option<&str>,
    ) -> Result<()> {
        self.upload(chat_id, UploadKind::Document, file_name.to_string(), bytes, caption)
            .await
    }

    /// Upload a file from disk as a photo, video or document, by extension.
    pub async fn send_file(&self, chat_id: i64, path: &Path, caption: Option<&str>) -> Result<()> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".into());
        let kind = UploadKind::for_path(path);
        self.upload(chat_id, kind, file_name, bytes, caption).await
    }

    async fn upload(
        &self,
        chat_id: i64,
        kind: UploadKind,
        file_name: String,
        bytes: Vec<u8>,
        caption: Option<&str>,
    ) -> Result<()> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
        let mut form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .part(kind.field(), part);
        if let Some(caption) = caption {
            form = form.text("caption", caption.to_string());
        }
        let response = self
            .client
            .post(self.api_url(kind.method()))
            .multipart(form)
            .send()
            .await
            .map_err(api_err(kind.method()))?;
        Self::read_result::<serde_json::Value>(response, kind.method()).await?;
        Ok(())
    }

    /// Start the polling loop: returns a stream of IncomingMessages.
    pub fn start_polling(self) -> TelegramPollingStream {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            let channel = self;
            let mut offset = 0i64;
            tracing::info!("📡 Telegram polling loop started");

            loop {
                match channel.get_updates(offset).await {
                    Ok(updates) => {
                        for update in updates {
                            offset = offset.max(update.update_id + 1);
                            let Some(msg) = update.to_incoming() else {
                                continue;
                            };
                            if tx.send(msg).is_err() {
                                tracing::info!("Telegram polling stopped (receiver dropped)");
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!("Telegram polling error: {e}");
                        tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
                    }
                }

                if tx.is_closed() {
                    return;
                }
                tokio::time::sleep(tokio::time::Duration::from_secs(channel.config.poll_interval))
                    .await;
            }
        });

        TelegramPollingStream { rx }
    }
}

/// Request body for `sendMessage`.
fn send_message_body(chat_id: i64, message: &OutgoingMessage) -> serde_json::Value {
    let mut body = serde_json::json!({
        "chat_id": chat_id,
        "text": message.text,
        "parse_mode": "HTML",
    });
    if let Some(keyboard) = &message.keyboard {
        body["reply_markup"] = reply_markup(keyboard);
    }
    body
}

/// Bot API `reply_markup` for a keyboard.
pub fn reply_markup(keyboard: &Keyboard) -> serde_json::Value {
    match keyboard {
        Keyboard::Choices(choices) => serde_json::json!({
            "keyboard": [choices.iter().map(|c| serde_json::json!({"text": c})).collect::<Vec<_>>()],
            "one_time_keyboard": true,
            "resize_keyboard": true,
        }),
        Keyboard::Remove => serde_json::json!({ "remove_keyboard": true }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UploadKind {
    Photo,
    Video,
    Document,
}

impl UploadKind {
    fn for_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "jpg" | "jpeg" | "png" => UploadKind::Photo,
            "mp4" | "mov" => UploadKind::Video,
            _ => UploadKind::Document,
        }
    }

    fn method(&self) -> &'static str {
        match self {
            UploadKind::Photo => "sendPhoto",
            UploadKind::Video => "sendVideo",
            UploadKind::Document => "sendDocument",
        }
    }

    fn field(&self) -> &'static str {
        match self {
            UploadKind::Photo => "photo",
            UploadKind::Video => "video",
            UploadKind::Document => "document",
        }
    }
}

/// Stream of incoming Telegram messages from polling.
pub struct TelegramPollingStream {
    rx: tokio::sync::mpsc::UnboundedReceiver<IncomingMessage>,
}

impl Stream for TelegramPollingStream {
    type Item = IncomingMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[async_trait]
impl Transport for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn deliver(&self, participant: ParticipantId, message: OutgoingMessage) -> Result<()> {
        self.send_message(participant.0, &message).await
    }

    async fn fetch_attachment(&self, attachment: &AttachmentRef) -> Result<Vec<u8>> {
        self.download(&attachment.file_id).await
    }
}

// --- Telegram API Types ---

#[derive(Debug, Deserialize)]
pub struct TelegramApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    pub from: Option<TelegramUser>,
    pub chat: TelegramChat,
    pub date: i64,
    pub text: Option<String>,
    pub caption: Option<String>,
    /// Available sizes, smallest first.
    #[serde(default)]
    pub photo: Vec<TelegramFileRef>,
    pub video: Option<TelegramFileRef>,
    pub document: Option<TelegramFileRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    pub is_bot: bool,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
    #[serde(rename = "type")]
    pub chat_type: String,
}

/// Any file-like object (photo size, video, document); only the id matters here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramFileRef {
    pub file_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramFile {
    pub file_id: String,
    pub file_size: Option<u64>,
    pub file_path: Option<String>,
}

impl TelegramMessage {
    fn attachment(&self) -> Option<AttachmentRef> {
        let (kind, file) = if let Some(largest) = self.photo.last() {
            (AttachmentKind::Photo, largest)
        } else if let Some(video) = &self.video {
            (AttachmentKind::Video, video)
        } else {
            (AttachmentKind::Document, self.document.as_ref()?)
        };
        Some(AttachmentRef {
            kind,
            file_id: file.file_id.clone(),
        })
    }
}

impl TelegramUpdate {
    /// Convert to an IncomingMessage. Bot messages and updates with neither
    /// text nor media are dropped.
    pub fn to_incoming(&self) -> Option<IncomingMessage> {
        let msg = self.message.as_ref()?;
        let from = msg.from.as_ref()?;
        if from.is_bot {
            return None;
        }
        let attachment = msg.attachment();
        let content = msg.text.clone().or_else(|| msg.caption.clone());
        if content.is_none() && attachment.is_none() {
            return None;
        }

        Some(IncomingMessage {
            channel: "telegram".into(),
            participant: ParticipantId(msg.chat.id),
            sender: Identity {
                first_name: Some(from.first_name.clone()),
                username: from.username.clone(),
                user_id: Some(from.id),
            },
            content,
            attachment,
            timestamp: chrono::DateTime::from_timestamp(msg.date, 0)
                .unwrap_or_else(chrono::Utc::now),
        })
    }
}
