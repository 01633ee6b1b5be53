//! Crypto session: per-direction counters and anti-replay.
//!
//! One [`CryptoSession`] handles both directions of a transport. The
//! send counter increments on every encrypt and is never reused; the
//! receive side accepts a sequence number only if it clears a sliding
//! replay window, and the window is updated only after the tag
//! verifies, so forged datagrams cannot poison it.

use crate::core::{CryptoError, REPLAY_WINDOW_SIZE, SEQ_HEADER_SIZE};

use super::{
    aead::{SessionKey, decrypt, encrypt},
    nonce::{Role, construct_nonce},
};

/// Sliding-window replay filter over received sequence numbers.
///
/// Tracks the highest accepted number plus a bitmap of the
/// `REPLAY_WINDOW_SIZE` numbers below it. Numbers below the window are
/// rejected; numbers inside it are accepted once.
#[derive(Debug, Clone)]
pub struct ReplayWindow {
    bitmap: [u64; REPLAY_WINDOW_SIZE / 64],
    highest: u64,
    initialized: bool,
}

impl ReplayWindow {
    /// Create an empty window; the first sequence number seen anchors it.
    pub fn new() -> Self {
        Self {
            bitmap: [0; REPLAY_WINDOW_SIZE / 64],
            highest: 0,
            initialized: false,
        }
    }

    /// Highest sequence number accepted so far, if any.
    pub fn highest(&self) -> Option<u64> {
        self.initialized.then_some(self.highest)
    }

    /// Check a sequence number without mutating the window.
    pub fn is_replay(&self, seq: u64) -> bool {
        if !self.initialized || seq > self.highest {
            return false;
        }
        let diff = self.highest - seq;
        if diff >= REPLAY_WINDOW_SIZE as u64 {
            return true;
        }
        self.bit(diff as usize)
    }

    /// Accept a sequence number, marking it seen.
    ///
    /// Call only after the datagram authenticated.
    pub fn accept(&mut self, seq: u64) -> Result<(), CryptoError> {
        if !self.initialized {
            self.highest = seq;
            self.initialized = true;
            self.set_bit(0);
            return Ok(());
        }

        if seq > self.highest {
            self.shift(seq - self.highest);
            self.highest = seq;
            self.set_bit(0);
            return Ok(());
        }

        let diff = self.highest - seq;
        if diff >= REPLAY_WINDOW_SIZE as u64 || self.bit(diff as usize) {
            return Err(CryptoError::ReplayOrOutOfOrder(seq));
        }
        self.set_bit(diff as usize);
        Ok(())
    }

    fn bit(&self, index: usize) -> bool {
        (self.bitmap[index / 64] & (1u64 << (index % 64))) != 0
    }

    fn set_bit(&mut self, index: usize) {
        self.bitmap[index / 64] |= 1u64 << (index % 64);
    }

    fn shift(&mut self, by: u64) {
        if by >= REPLAY_WINDOW_SIZE as u64 {
            self.bitmap = [0; REPLAY_WINDOW_SIZE / 64];
            return;
        }
        let word_shift = (by / 64) as usize;
        let bit_shift = (by % 64) as u32;

        if word_shift > 0 {
            for i in (word_shift..self.bitmap.len()).rev() {
                self.bitmap[i] = self.bitmap[i - word_shift];
            }
            for word in self.bitmap.iter_mut().take(word_shift) {
                *word = 0;
            }
        }
        if bit_shift > 0 {
            let mut carry = 0u64;
            for word in self.bitmap.iter_mut() {
                let new_carry = *word >> (64 - bit_shift);
                *word = (*word << bit_shift) | carry;
                carry = new_carry;
            }
        }
    }
}

impl Default for ReplayWindow {
    fn default() -> Self {
        Self::new()
    }
}

/// Authenticated encryption for one session, both directions.
pub struct CryptoSession {
    key: SessionKey,
    role: Role,
    send_seq: u64,
    replay: ReplayWindow,
}

impl CryptoSession {
    /// Create a session from the out-of-band key and our role.
    pub fn new(key: SessionKey, role: Role) -> Self {
        Self {
            key,
            role,
            send_seq: 0,
            replay: ReplayWindow::new(),
        }
    }

    /// Our role in the session.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Next sequence number that `encrypt` will consume.
    pub fn send_seq(&self) -> u64 {
        self.send_seq
    }

    /// Highest sequence number accepted on the receive side, if any
    /// datagram has authenticated yet.
    pub fn highest_recv_seq(&self) -> Option<u64> {
        self.replay.highest()
    }

    /// Encrypt a plaintext for sending.
    ///
    /// Returns the sequence number the datagram must carry in its
    /// cleartext header, plus ciphertext and tag. The header bytes are
    /// the AAD, binding the sequence number to the payload.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<(u64, Vec<u8>), CryptoError> {
        if self.send_seq == u64::MAX {
            return Err(CryptoError::CounterExhausted);
        }
        let seq = self.send_seq;
        self.send_seq += 1;

        let nonce = construct_nonce(self.role.send_direction(), seq);
        let ciphertext = encrypt(&self.key, &nonce, &seq_aad(seq), plaintext)?;
        Ok((seq, ciphertext))
    }

    /// Decrypt a received datagram body.
    ///
    /// Replay screening happens before the (expensive) AEAD pass, but
    /// the window only advances after the tag verifies.
    pub fn decrypt(&mut self, seq: u64, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if self.replay.is_replay(seq) {
            return Err(CryptoError::ReplayOrOutOfOrder(seq));
        }

        let nonce = construct_nonce(self.role.recv_direction(), seq);
        let plaintext = decrypt(&self.key, &nonce, &seq_aad(seq), ciphertext)?;

        self.replay.accept(seq)?;
        Ok(plaintext)
    }
}

/// AAD for a datagram: exactly its cleartext header.
fn seq_aad(seq: u64) -> [u8; SEQ_HEADER_SIZE] {
    seq.to_be_bytes()
}
