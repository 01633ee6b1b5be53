//! Security layer: AEAD datagram protection keyed by the session secret.
//!
//! The session key is established over a separately authenticated
//! channel before a transport is constructed; this layer never derives
//! or transmits it. Each direction runs its own monotonic sequence
//! counter, bound into the nonce and the AAD, so replayed, reflected or
//! tampered datagrams all fail before any protocol state changes.

mod aead;
mod nonce;
mod session;

pub use aead::SessionKey;
pub use nonce::{Direction, Role, construct_nonce};
pub use session::{CryptoSession, ReplayWindow};
