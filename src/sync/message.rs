//! The sync message carried inside every authenticated datagram.

use crate::core::{FLAG_SHUTDOWN, MessageError, SYNC_MESSAGE_HEADER_SIZE};

/// One state-synchronization message (the plaintext of a datagram,
/// possibly spread over several fragments).
///
/// Wire format, little-endian:
/// ```text
/// +0   Flags            (1 byte)
/// +1   Timestamp        (4 bytes, ms since sender session start)
/// +5   Timestamp echo   (4 bytes, latest timestamp heard from peer)
/// +9   Base state num   (8 bytes, baseline the diff was computed from)
/// +17  New state num    (8 bytes, state the diff produces)
/// +25  Acked state num  (8 bytes, latest peer state we applied)
/// +33  Diff length      (4 bytes)
/// +37  Diff payload     (variable)
/// ```
///
/// An ack-only message carries `new == base` and an empty diff: it
/// advances the peer's acknowledgement cursor and feeds RTT estimation
/// without declaring new state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncMessage {
    /// Message flags ([`FLAG_SHUTDOWN`]).
    pub flags: u8,
    /// Sender clock, milliseconds since its session start.
    pub timestamp: u32,
    /// Echo of the latest timestamp heard from the peer.
    pub timestamp_echo: u32,
    /// State number the diff was computed against.
    pub base_state_num: u64,
    /// State number the diff produces when applied to the baseline.
    pub new_state_num: u64,
    /// Latest peer state number we have applied (the acknowledgement).
    pub acked_state_num: u64,
    /// Encoded diff payload; empty for ack-only messages.
    pub diff: Vec<u8>,
}

impl SyncMessage {
    /// Build a diff-carrying message.
    pub fn new(base_state_num: u64, new_state_num: u64, acked_state_num: u64, diff: Vec<u8>) -> Self {
        Self {
            flags: 0,
            timestamp: 0,
            timestamp_echo: 0,
            base_state_num,
            new_state_num,
            acked_state_num,
            diff,
        }
    }

    /// Build an ack-only message declaring `sent_num` as our newest state.
    pub fn ack_only(sent_num: u64, acked_state_num: u64) -> Self {
        Self::new(sent_num, sent_num, acked_state_num, Vec::new())
    }

    /// Whether the message declares no new state.
    pub fn is_ack_only(&self) -> bool {
        self.new_state_num == self.base_state_num
    }

    /// Whether the sender has requested shutdown.
    pub fn has_shutdown_flag(&self) -> bool {
        self.flags & FLAG_SHUTDOWN != 0
    }

    /// Mark the message as shutdown-flagged.
    pub fn set_shutdown_flag(&mut self) {
        self.flags |= FLAG_SHUTDOWN;
    }

    /// Total encoded size.
    pub fn wire_size(&self) -> usize {
        SYNC_MESSAGE_HEADER_SIZE + self.diff.len()
    }

    /// Encode to wire format.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.wire_size());
        buf.push(self.flags);
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf.extend_from_slice(&self.timestamp_echo.to_le_bytes());
        buf.extend_from_slice(&self.base_state_num.to_le_bytes());
        buf.extend_from_slice(&self.new_state_num.to_le_bytes());
        buf.extend_from_slice(&self.acked_state_num.to_le_bytes());
        buf.extend_from_slice(&(self.diff.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.diff);
        buf
    }

    /// Decode from wire format.
    pub fn decode(data: &[u8]) -> Result<Self, MessageError> {
        if data.len() < SYNC_MESSAGE_HEADER_SIZE {
            return Err(MessageError::TooShort {
                expected: SYNC_MESSAGE_HEADER_SIZE,
                actual: data.len(),
            });
        }

        let flags = data[0];
        let timestamp = u32::from_le_bytes(data[1..5].try_into().unwrap());
        let timestamp_echo = u32::from_le_bytes(data[5..9].try_into().unwrap());
        let base_state_num = u64::from_le_bytes(data[9..17].try_into().unwrap());
        let new_state_num = u64::from_le_bytes(data[17..25].try_into().unwrap());
        let acked_state_num = u64::from_le_bytes(data[25..33].try_into().unwrap());
        let diff_len = u32::from_le_bytes(data[33..37].try_into().unwrap()) as usize;

        if data.len() < SYNC_MESSAGE_HEADER_SIZE + diff_len {
            return Err(MessageError::TooShort {
                expected: SYNC_MESSAGE_HEADER_SIZE + diff_len,
                actual: data.len(),
            });
        }

        Ok(Self {
            flags,
            timestamp,
            timestamp_echo,
            base_state_num,
            new_state_num,
            acked_state_num,
            diff: data[SYNC_MESSAGE_HEADER_SIZE..SYNC_MESSAGE_HEADER_SIZE + diff_len].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let mut msg = SyncMessage::new(4, 5, 9, vec![1, 2, 3, 4, 5]);
        msg.timestamp = 1234;
        msg.timestamp_echo = 5678;
        msg.set_shutdown_flag();

        let encoded = msg.encode();
        assert_eq!(encoded.len(), SYNC_MESSAGE_HEADER_SIZE + 5);

        let decoded = SyncMessage::decode(&encoded).unwrap();
        assert_eq!(decoded, msg);
        assert!(decoded.has_shutdown_flag());
    }

    #[test]
    fn ack_only_shape() {
        let msg = SyncMessage::ack_only(7, 12);
        assert!(msg.is_ack_only());
        assert!(msg.diff.is_empty());
        assert_eq!(msg.new_state_num, 7);
        assert_eq!(msg.acked_state_num, 12);
    }

    #[test]
    fn diff_message_is_not_ack_only() {
        let msg = SyncMessage::new(2, 3, 0, vec![0xff]);
        assert!(!msg.is_ack_only());
    }

    #[test]
    fn decode_too_short() {
        let result = SyncMessage::decode(&[0u8; SYNC_MESSAGE_HEADER_SIZE - 1]);
        assert!(matches!(result, Err(MessageError::TooShort { .. })));
    }

    #[test]
    fn decode_truncated_diff() {
        let msg = SyncMessage::new(0, 1, 0, vec![9; 10]);
        let mut encoded = msg.encode();
        encoded.truncate(SYNC_MESSAGE_HEADER_SIZE + 4);
        assert!(matches!(
            SyncMessage::decode(&encoded),
            Err(MessageError::TooShort { .. })
        ));
    }

    #[test]
    fn trailing_bytes_ignored() {
        let msg = SyncMessage::new(1, 2, 3, vec![7, 7]);
        let mut encoded = msg.encode();
        encoded.extend_from_slice(&[0xaa; 16]);
        assert_eq!(SyncMessage::decode(&encoded).unwrap(), msg);
    }
}
