//! Datagram transport: framing, fragmentation, timing and the endpoint.
//!
//! The layering inside a datagram, outermost first:
//!
//! ```text
//! [ seq u64 BE ][ AEAD ciphertext + tag ]
//!                 └─ [ fragment header ][ fragment payload ]
//!                                          └─ part of one SyncMessage
//! ```

pub mod config;
pub mod endpoint;
pub mod fragment;
pub mod frame;
pub mod shutdown;
pub mod socket;
pub mod timing;

pub use config::TransportConfig;
pub use endpoint::{RecvEvent, Transport, TransportStats};
pub use fragment::{Fragment, FragmentAssembly, Fragmenter};
pub use frame::Datagram;
pub use shutdown::{ShutdownCoordinator, ShutdownPhase};
pub use socket::SspSocket;
pub use timing::{RttEstimator, TimestampTracker, TimingController};
