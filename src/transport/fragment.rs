//! Fragmentation of sync messages across datagrams.
//!
//! A message larger than the payload budget of one datagram is split
//! into fragments sharing a message id. Ids are monotonic per
//! direction, which lets the receiver tell stale duplicates from new
//! traffic. Reassembly state is bounded: under loss or hostile input
//! the oldest incomplete message is evicted first.
//!
//! Sub-header inside the plaintext (12 bytes):
//! ```text
//! [ message id (8, BE) | fragment index (2, BE) | fragment count (2, BE) ]
//! ```

use std::collections::BTreeMap;

use crate::core::{FRAGMENT_HEADER_SIZE, FragmentError};

/// One piece of a fragmented sync message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Id of the message this fragment belongs to.
    pub message_id: u64,
    /// Zero-based position of this fragment.
    pub index: u16,
    /// Total fragments in the message.
    pub count: u16,
    /// This fragment's slice of the message.
    pub payload: Vec<u8>,
}

impl Fragment {
    /// Serialize header + payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FRAGMENT_HEADER_SIZE + self.payload.len());
        buf.extend_from_slice(&self.message_id.to_be_bytes());
        buf.extend_from_slice(&self.index.to_be_bytes());
        buf.extend_from_slice(&self.count.to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Parse a fragment from a decrypted datagram payload.
    pub fn from_bytes(data: &[u8]) -> Result<Self, FragmentError> {
        if data.len() < FRAGMENT_HEADER_SIZE {
            return Err(FragmentError::Truncated(data.len()));
        }
        let message_id = u64::from_be_bytes(data[0..8].try_into().unwrap());
        let index = u16::from_be_bytes([data[8], data[9]]);
        let count = u16::from_be_bytes([data[10], data[11]]);

        if count == 0 {
            return Err(FragmentError::ZeroCount);
        }
        if index >= count {
            return Err(FragmentError::IndexOutOfRange { index, count });
        }

        Ok(Self {
            message_id,
            index,
            count,
            payload: data[FRAGMENT_HEADER_SIZE..].to_vec(),
        })
    }
}

/// Splits outgoing messages into fragments with monotonic ids.
#[derive(Debug)]
pub struct Fragmenter {
    // Id 0 is never issued; the assembly watermark starts there.
    next_message_id: u64,
    payload_mtu: usize,
}

impl Fragmenter {
    /// `payload_mtu` is the byte budget per fragment payload, after the
    /// datagram, AEAD and fragment headers are accounted for.
    pub fn new(payload_mtu: usize) -> Self {
        Self {
            next_message_id: 1,
            payload_mtu: payload_mtu.max(1),
        }
    }

    /// Split one message. An empty message (a heartbeat) still yields a
    /// single empty fragment so it travels as one datagram.
    ///
    /// A message needing more fragments than the 16-bit count field can
    /// express is refused rather than sent with a wrapped count.
    pub fn fragment(&mut self, message: &[u8]) -> Result<Vec<Fragment>, FragmentError> {
        let fragments = message.len().div_ceil(self.payload_mtu).max(1);
        if fragments > u16::MAX as usize {
            return Err(FragmentError::MessageTooLarge { fragments });
        }

        let id = self.next_message_id;
        self.next_message_id = self.next_message_id.wrapping_add(1);

        if message.is_empty() {
            return Ok(vec![Fragment {
                message_id: id,
                index: 0,
                count: 1,
                payload: Vec::new(),
            }]);
        }

        let count = fragments as u16;
        Ok(message
            .chunks(self.payload_mtu)
            .enumerate()
            .map(|(i, chunk)| Fragment {
                message_id: id,
                index: i as u16,
                count,
                payload: chunk.to_vec(),
            })
            .collect())
    }
}

#[derive(Debug)]
struct PartialMessage {
    count: u16,
    parts: Vec<Option<Vec<u8>>>,
    received: u16,
}

/// Reassembles fragments into complete messages.
///
/// At most `max_pending` messages may be incomplete at once; exceeding
/// the bound evicts the oldest (lowest) id.
#[derive(Debug)]
pub struct FragmentAssembly {
    pending: BTreeMap<u64, PartialMessage>,
    /// Highest message id fully delivered; anything at or below is stale.
    watermark: u64,
    max_pending: usize,
}

impl FragmentAssembly {
    /// Create an assembly bounded to `max_pending` incomplete messages.
    pub fn new(max_pending: usize) -> Self {
        Self {
            pending: BTreeMap::new(),
            watermark: 0,
            max_pending: max_pending.max(1),
        }
    }

    /// Feed one fragment.
    ///
    /// Returns the reassembled message once all of its fragments have
    /// arrived, in any order. Duplicates are ignored; fragments of
    /// already-delivered or evicted messages are silently dropped.
    pub fn add(&mut self, frag: Fragment) -> Result<Option<Vec<u8>>, FragmentError> {
        if frag.message_id <= self.watermark {
            tracing::trace!(id = frag.message_id, "stale fragment dropped");
            return Ok(None);
        }

        let entry = self
            .pending
            .entry(frag.message_id)
            .or_insert_with(|| PartialMessage {
                count: frag.count,
                parts: vec![None; frag.count as usize],
                received: 0,
            });

        if entry.count != frag.count {
            return Err(FragmentError::CountMismatch {
                id: frag.message_id,
                expected: entry.count,
                actual: frag.count,
            });
        }

        let slot = &mut entry.parts[frag.index as usize];
        if slot.is_none() {
            *slot = Some(frag.payload);
            entry.received += 1;
        }

        if entry.received == entry.count {
            let entry = self.pending.remove(&frag.message_id).unwrap();
            self.watermark = frag.message_id;
            // Older incomplete messages are superseded.
            self.pending.retain(|&id, _| id > frag.message_id);
            let mut message = Vec::new();
            for part in entry.parts {
                message.extend_from_slice(&part.unwrap());
            }
            return Ok(Some(message));
        }

        // Bound memory under loss: evict the oldest incomplete set.
        while self.pending.len() > self.max_pending {
            if let Some((&oldest, _)) = self.pending.iter().next() {
                tracing::debug!(id = oldest, "evicting oldest incomplete message");
                self.pending.remove(&oldest);
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let frag = Fragment {
            message_id: 42,
            index: 1,
            count: 3,
            payload: vec![1, 2, 3],
        };
        let restored = Fragment::from_bytes(&frag.to_bytes()).unwrap();
        assert_eq!(restored, frag);
    }

    #[test]
    fn malformed_fragments_rejected() {
        assert!(matches!(
            Fragment::from_bytes(&[0u8; FRAGMENT_HEADER_SIZE - 1]),
            Err(FragmentError::Truncated(_))
        ));

        let mut zero_count = Fragment {
            message_id: 1,
            index: 0,
            count: 1,
            payload: vec![],
        }
        .to_bytes();
        zero_count[10] = 0;
        zero_count[11] = 0;
        assert_eq!(
            Fragment::from_bytes(&zero_count),
            Err(FragmentError::ZeroCount)
        );

        let bad_index = Fragment {
            message_id: 1,
            index: 5,
            count: 2,
            payload: vec![],
        }
        .to_bytes();
        assert!(matches!(
            Fragment::from_bytes(&bad_index),
            Err(FragmentError::IndexOutOfRange { index: 5, count: 2 })
        ));
    }

    #[test]
    fn single_fragment_message() {
        let mut fragmenter = Fragmenter::new(100);
        let frags = fragmenter.fragment(b"small").unwrap();
        assert_eq!(frags.len(), 1);
        assert_eq!((frags[0].index, frags[0].count), (0, 1));

        let mut assembly = FragmentAssembly::new(4);
        assert_eq!(
            assembly.add(frags[0].clone()).unwrap(),
            Some(b"small".to_vec())
        );
    }

    #[test]
    fn heartbeat_is_one_empty_fragment() {
        let mut fragmenter = Fragmenter::new(100);
        let frags = fragmenter.fragment(b"").unwrap();
        assert_eq!(frags.len(), 1);
        assert!(frags[0].payload.is_empty());
    }

    #[test]
    fn oversized_message_refused() {
        let mut fragmenter = Fragmenter::new(1);
        let message = vec![0u8; u16::MAX as usize + 1];
        assert!(matches!(
            fragmenter.fragment(&message),
            Err(FragmentError::MessageTooLarge { fragments }) if fragments == message.len()
        ));

        // The id was not consumed; the next message fragments normally.
        let frags = fragmenter.fragment(b"ok").unwrap();
        assert_eq!(frags[0].message_id, 1);
    }

    #[test]
    fn ids_are_monotonic() {
        let mut fragmenter = Fragmenter::new(8);
        let a = fragmenter.fragment(b"one").unwrap();
        let b = fragmenter.fragment(b"two").unwrap();
        assert!(b[0].message_id > a[0].message_id);
    }

    #[test]
    fn reassembles_any_permutation() {
        let original: Vec<u8> = (0u8..=255).cycle().take(1000).collect();
        let mut fragmenter = Fragmenter::new(64);
        let frags = fragmenter.fragment(&original).unwrap();
        assert!(frags.len() > 2);

        // A handful of delivery orders, including fully reversed.
        let mut orders: Vec<Vec<usize>> = vec![
            (0..frags.len()).collect(),
            (0..frags.len()).rev().collect(),
        ];
        let mut rotated: Vec<usize> = (0..frags.len()).collect();
        rotated.rotate_left(frags.len() / 2);
        orders.push(rotated);

        for order in orders {
            let mut assembly = FragmentAssembly::new(4);
            let mut result = None;
            for &i in &order {
                if let Some(message) = assembly.add(frags[i].clone()).unwrap() {
                    result = Some(message);
                }
            }
            assert_eq!(result.as_deref(), Some(&original[..]), "order {order:?}");
        }
    }

    #[test]
    fn duplicate_fragments_are_idempotent() {
        let mut fragmenter = Fragmenter::new(4);
        let frags = fragmenter.fragment(b"abcdefgh").unwrap();
        assert_eq!(frags.len(), 2);

        let mut assembly = FragmentAssembly::new(4);
        assert_eq!(assembly.add(frags[0].clone()).unwrap(), None);
        assert_eq!(assembly.add(frags[0].clone()).unwrap(), None);
        assert_eq!(
            assembly.add(frags[1].clone()).unwrap(),
            Some(b"abcdefgh".to_vec())
        );
    }

    #[test]
    fn stale_ids_dropped_after_delivery() {
        let mut fragmenter = Fragmenter::new(100);
        let first = fragmenter.fragment(b"first").unwrap();
        let second = fragmenter.fragment(b"second").unwrap();

        let mut assembly = FragmentAssembly::new(4);
        assembly.add(second[0].clone()).unwrap();
        // A late duplicate of an older message id is not a new message.
        assert_eq!(assembly.add(first[0].clone()).unwrap(), None);
    }

    #[test]
    fn count_mismatch_detected() {
        let mut assembly = FragmentAssembly::new(4);
        assembly
            .add(Fragment {
                message_id: 3,
                index: 0,
                count: 4,
                payload: vec![1],
            })
            .unwrap();
        let err = assembly
            .add(Fragment {
                message_id: 3,
                index: 1,
                count: 5,
                payload: vec![2],
            })
            .unwrap_err();
        assert!(matches!(err, FragmentError::CountMismatch { id: 3, .. }));
    }

    #[test]
    fn oldest_incomplete_evicted_first() {
        let mut assembly = FragmentAssembly::new(2);
        // Three incomplete two-fragment messages.
        for id in 1..=3u64 {
            assembly
                .add(Fragment {
                    message_id: id,
                    index: 0,
                    count: 2,
                    payload: vec![id as u8],
                })
                .unwrap();
        }
        // Message 1 was evicted: completing it now goes nowhere.
        assert_eq!(
            assembly
                .add(Fragment {
                    message_id: 1,
                    index: 1,
                    count: 2,
                    payload: vec![9],
                })
                .unwrap(),
            None
        );
        // Message 3 is still live.
        assert_eq!(
            assembly
                .add(Fragment {
                    message_id: 3,
                    index: 1,
                    count: 2,
                    payload: vec![7],
                })
                .unwrap(),
            Some(vec![3, 7])
        );
    }
}
