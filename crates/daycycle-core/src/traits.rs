//! Transport seam between the scheduler and a chat platform.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{AttachmentRef, OutgoingMessage, ParticipantId};

/// Chat transport: delivers messages and fetches attached media.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport name ("telegram").
    fn name(&self) -> &str;

    /// Deliver one message to a participant.
    async fn deliver(&self, participant: ParticipantId, message: OutgoingMessage) -> Result<()>;

    /// Download the bytes behind an attachment reference.
    async fn fetch_attachment(&self, attachment: &AttachmentRef) -> Result<Vec<u8>>;
}
