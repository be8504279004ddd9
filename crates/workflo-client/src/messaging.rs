//! Outbound message delivery.
//!
//! Durability comes from the log-store append; the targeted push event is
//! only a latency optimization so the receiver sees the message before their
//! feed subscription refreshes. A failed push is therefore logged and
//! swallowed, while a failed append is the delivery failure the user must
//! hear about.

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, info, warn};

use workflo_shared::protocol::PushEvent;
use workflo_shared::types::{ConversationKey, MessageKind, MessageRecord, UserId};
use workflo_store::StoreError;

use crate::client::{now_ms, ChatClient};
use crate::events::{emit, ClientEvent};

#[derive(Error, Debug)]
pub enum DeliveryError {
    /// The log store rejected the append; nothing was delivered.
    #[error("Failed to persist message: {0}")]
    Append(#[source] StoreError),

    /// The attachment upload failed; no message was appended.
    #[error("Failed to upload attachment: {0}")]
    Upload(#[source] StoreError),
}

impl ChatClient {
    /// Send a text message. Returns the store-assigned id.
    pub async fn send_message(
        &mut self,
        receiver: &UserId,
        body: impl Into<String>,
    ) -> Result<String, DeliveryError> {
        let record = MessageRecord {
            sender_id: self.ctx.local_user.clone(),
            receiver_id: receiver.clone(),
            body: body.into(),
            kind: MessageKind::Text,
            file_name: None,
            created_at: now_ms(),
        };
        self.deliver(record).await
    }

    /// Upload an attachment, then send a message whose body is the blob URL.
    pub async fn send_attachment(
        &mut self,
        receiver: &UserId,
        file_name: &str,
        bytes: Bytes,
    ) -> Result<String, DeliveryError> {
        let key = ConversationKey::resolve(&self.ctx.local_user, receiver);
        let created_at = now_ms();
        let path = format!("media/{key}/{created_at}_{file_name}");
        let url = self
            .ctx
            .blobs
            .upload(&path, bytes)
            .await
            .map_err(DeliveryError::Upload)?;

        let record = MessageRecord {
            sender_id: self.ctx.local_user.clone(),
            receiver_id: receiver.clone(),
            body: url,
            kind: kind_for(file_name),
            file_name: Some(file_name.to_string()),
            created_at,
        };
        self.deliver(record).await
    }

    async fn deliver(&mut self, record: MessageRecord) -> Result<String, DeliveryError> {
        let key = record.conversation_key();
        let id = match self.ctx.log.append(&key, record.clone()).await {
            Ok(id) => id,
            Err(e) => {
                warn!(conversation = %key, error = %e, "Message append failed");
                emit(
                    &self.events_tx,
                    ClientEvent::DeliveryFailed {
                        conversation: key,
                        reason: e.to_string(),
                    },
                );
                return Err(DeliveryError::Append(e));
            }
        };

        let receiver = record.receiver_id.clone();
        if let Err(e) = self
            .push
            .publish(PushEvent::NewMessage(record), Some(&receiver))
        {
            debug!(to = %receiver, error = %e, "Push notification skipped, feed will deliver");
        }

        info!(conversation = %key, id = %id, "Message sent");
        Ok(id)
    }
}

fn kind_for(file_name: &str) -> MessageKind {
    let image = file_name
        .rsplit_once('.')
        .map(|(_, ext)| {
            matches!(
                ext.to_ascii_lowercase().as_str(),
                "png" | "jpg" | "jpeg" | "gif" | "webp"
            )
        })
        .unwrap_or(false);
    if image {
        MessageKind::Image
    } else {
        MessageKind::File
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_extension() {
        assert_eq!(kind_for("photo.PNG"), MessageKind::Image);
        assert_eq!(kind_for("clip.webp"), MessageKind::Image);
        assert_eq!(kind_for("report.pdf"), MessageKind::File);
        assert_eq!(kind_for("no_extension"), MessageKind::File);
    }
}
