//! The capability trait every synchronized state type implements.

use super::error::{ApplyError, DecodeError};

/// A state type that can be synchronized by diffing against snapshots.
///
/// The transport never ships a full state across the wire; it ships the
/// encoded difference between two numbered snapshots. Each concrete
/// type (a terminal screen, a keystroke buffer, a game world) supplies
/// its own diff representation and encoding.
///
/// # Requirements
///
/// - `apply_diff(diff_from(old))` on a clone of `old` MUST reproduce
///   `self` exactly.
/// - `encode_diff`/`decode_diff` MUST round-trip.
/// - Applying the same diff to the same snapshot twice MUST yield the
///   same result as applying it once (the transport deduplicates by
///   state number, but late datagrams can race).
///
/// # Example
///
/// ```
/// use statesync::{ApplyError, DecodeError, DiffableState};
///
/// #[derive(Clone, Default)]
/// struct Counter {
///     value: u64,
/// }
///
/// #[derive(Clone)]
/// struct CounterDiff {
///     delta: i64,
/// }
///
/// impl DiffableState for Counter {
///     type Diff = CounterDiff;
///
///     fn diff_from(&self, old: &Self) -> CounterDiff {
///         CounterDiff {
///             delta: self.value as i64 - old.value as i64,
///         }
///     }
///
///     fn apply_diff(&mut self, diff: &CounterDiff) -> Result<(), ApplyError> {
///         self.value = (self.value as i64 + diff.delta) as u64;
///         Ok(())
///     }
///
///     fn encode_diff(diff: &CounterDiff) -> Vec<u8> {
///         diff.delta.to_le_bytes().to_vec()
///     }
///
///     fn decode_diff(data: &[u8]) -> Result<CounterDiff, DecodeError> {
///         let bytes: [u8; 8] = data.try_into().map_err(|_| DecodeError::UnexpectedEof)?;
///         Ok(CounterDiff {
///             delta: i64::from_le_bytes(bytes),
///         })
///     }
///
///     fn is_diff_empty(diff: &CounterDiff) -> bool {
///         diff.delta == 0
///     }
/// }
/// ```
pub trait DiffableState: Clone {
    /// Minimal encoded difference between two snapshots.
    type Diff: Clone;

    /// Compute the diff that turns `old` into `self`. Pure.
    fn diff_from(&self, old: &Self) -> Self::Diff;

    /// Apply a diff produced by `diff_from` on a prior snapshot of the
    /// same type. Pure apart from mutating `self`.
    fn apply_diff(&mut self, diff: &Self::Diff) -> Result<(), ApplyError>;

    /// Serialize a diff for transmission. The encoding must be stable:
    /// retransmissions compare byte-for-byte.
    fn encode_diff(diff: &Self::Diff) -> Vec<u8>;

    /// Deserialize a diff from the wire.
    fn decode_diff(data: &[u8]) -> Result<Self::Diff, DecodeError>;

    /// Whether the diff represents no change. Used to suppress
    /// zero-byte payloads on otherwise ack-only traffic.
    fn is_diff_empty(diff: &Self::Diff) -> bool {
        let _ = diff;
        false
    }
}
