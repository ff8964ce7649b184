//! Bounded memory of recently delivered messages.

use moka::sync::Cache;
use tracing::debug;

use tapline_core::types::id::MessageId;
use tapline_core::types::message::MessageStatus;

use crate::event::TransportEvent;

/// Remembers the last status delivered for recent message ids.
///
/// Drops a `NewMessage` whose id was already delivered and a
/// `MessageStatus` that does not move the message forward. Every other
/// event is admitted.
#[derive(Debug, Clone)]
pub struct MessageLedger {
    entries: Cache<MessageId, MessageStatus>,
}

impl MessageLedger {
    /// Ledger holding at most `capacity` message ids.
    pub fn new(capacity: u64) -> Self {
        Self {
            entries: Cache::builder().max_capacity(capacity.max(1)).build(),
        }
    }

    /// Whether `event` should reach listeners. Records what it admits.
    pub fn admit(&self, event: &TransportEvent) -> bool {
        match event {
            TransportEvent::NewMessage(message) => {
                let fresh = self
                    .entries
                    .entry(message.id.clone())
                    .or_insert(message.status)
                    .is_fresh();
                if !fresh {
                    debug!(message_id = %message.id, "Dropping already delivered message");
                }
                fresh
            }
            TransportEvent::MessageStatus(change) => {
                if let Some(current) = self.entries.get(&change.message_id)
                    && !current.can_advance_to(change.status)
                {
                    debug!(
                        message_id = %change.message_id,
                        current = %current,
                        status = %change.status,
                        "Dropping status that does not advance"
                    );
                    return false;
                }
                self.entries
                    .insert(change.message_id.clone(), change.status);
                true
            }
            _ => true,
        }
    }

    /// Record a message the caller already holds, such as the result of a
    /// send, so a later echo is dropped.
    pub fn remember(&self, message_id: &MessageId, status: MessageStatus) {
        self.entries.insert(message_id.clone(), status);
    }

    /// Last delivered status of a message, if remembered.
    pub fn status_of(&self, message_id: &MessageId) -> Option<MessageStatus> {
        self.entries.get(message_id)
    }

    /// Forget everything.
    pub fn clear(&self) {
        self.entries.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use tapline_core::types::id::{ConversationId, UserId};
    use tapline_core::types::message::{Message, SenderRole};

    use crate::event::StatusEvent;

    use super::*;

    fn message(id: &str) -> TransportEvent {
        TransportEvent::NewMessage(Message {
            id: MessageId::new(id),
            conversation_id: ConversationId::new("C1"),
            sender_id: UserId::new("u1"),
            sender_role: SenderRole::Broker,
            content: "offer".to_string(),
            timestamp: Utc::now(),
            status: MessageStatus::Sent,
            reply_to: None,
        })
    }

    fn status(id: &str, status: MessageStatus) -> TransportEvent {
        TransportEvent::MessageStatus(StatusEvent {
            message_id: MessageId::new(id),
            conversation_id: None,
            status,
        })
    }

    #[test]
    fn test_duplicate_message_dropped() {
        let ledger = MessageLedger::new(16);
        assert!(ledger.admit(&message("m1")));
        assert!(!ledger.admit(&message("m1")));
        assert!(ledger.admit(&message("m2")));
    }

    #[test]
    fn test_status_only_moves_forward() {
        let ledger = MessageLedger::new(16);
        assert!(ledger.admit(&message("m1")));
        assert!(ledger.admit(&status("m1", MessageStatus::Read)));
        assert!(!ledger.admit(&status("m1", MessageStatus::Delivered)));
        assert!(!ledger.admit(&status("m1", MessageStatus::Read)));
        assert_eq!(ledger.status_of(&MessageId::new("m1")), Some(MessageStatus::Read));
    }

    #[test]
    fn test_unknown_status_admitted() {
        let ledger = MessageLedger::new(16);
        assert!(ledger.admit(&status("m7", MessageStatus::Delivered)));
        assert!(ledger.admit(&TransportEvent::Connected));
    }
}
