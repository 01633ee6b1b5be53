//! Nonce construction.
//!
//! Both sides share one session key; the two directions are kept in
//! disjoint nonce spaces by a direction byte, so each (direction,
//! sequence number) pair is used at most once under the key.
//!
//! Layout (24 bytes):
//! ```text
//! [ direction (1) | zeros (15) | sequence number (8, LE) ]
//! ```

use crate::core::AEAD_NONCE_SIZE;

/// Direction of a datagram, from the client's point of view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Client → server (0x00).
    ClientToServer,
    /// Server → client (0x01).
    ServerToClient,
}

impl Direction {
    /// Byte representation used in the nonce.
    pub fn as_byte(self) -> u8 {
        match self {
            Direction::ClientToServer => 0x00,
            Direction::ServerToClient => 0x01,
        }
    }

    /// The opposite direction.
    pub fn opposite(self) -> Self {
        match self {
            Direction::ClientToServer => Direction::ServerToClient,
            Direction::ServerToClient => Direction::ClientToServer,
        }
    }
}

/// Which end of the session this transport is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// The roaming side that initiated the session.
    Client,
    /// The stationary side.
    Server,
}

impl Role {
    /// Direction of datagrams this role sends.
    pub fn send_direction(self) -> Direction {
        match self {
            Role::Client => Direction::ClientToServer,
            Role::Server => Direction::ServerToClient,
        }
    }

    /// Direction of datagrams this role receives.
    pub fn recv_direction(self) -> Direction {
        self.send_direction().opposite()
    }
}

/// Construct the 24-byte XChaCha20-Poly1305 nonce for one datagram.
pub fn construct_nonce(direction: Direction, seq: u64) -> [u8; AEAD_NONCE_SIZE] {
    let mut nonce = [0u8; AEAD_NONCE_SIZE];
    nonce[0] = direction.as_byte();
    nonce[16..24].copy_from_slice(&seq.to_le_bytes());
    nonce
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_layout() {
        let nonce = construct_nonce(Direction::ServerToClient, 42);
        assert_eq!(nonce[0], 0x01);
        assert_eq!(&nonce[1..16], &[0u8; 15]);
        assert_eq!(&nonce[16..24], &42u64.to_le_bytes());
    }

    #[test]
    fn directions_are_disjoint() {
        // Same sequence number, opposite directions: distinct nonces.
        let a = construct_nonce(Direction::ClientToServer, 7);
        let b = construct_nonce(Direction::ServerToClient, 7);
        assert_ne!(a, b);
    }

    #[test]
    fn role_directions() {
        assert_eq!(Role::Client.send_direction(), Direction::ClientToServer);
        assert_eq!(Role::Client.recv_direction(), Direction::ServerToClient);
        assert_eq!(Role::Server.send_direction(), Role::Client.recv_direction());
    }
}
