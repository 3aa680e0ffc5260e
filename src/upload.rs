//! Upload bandwidth allocation (choke/unchoke scheduling)
//!
//! This module decides which connected peers may download from us. Every
//! 10 seconds the scheduler ranks peers by how fast they reciprocate
//! (their upload to us while we are still downloading, our upload to them
//! once we are complete), keeps the best performers unchoked up to the
//! configured slot limit, and reserves one slot for a rotating optimistic
//! unchoke so unproven peers get a chance to demonstrate reciprocity.
//!
//! The scheduler owns no connections. The connection layer registers peers
//! with [`UploadScheduler::peer_joined`], feeds in interest and rate
//! changes, and receives choke/unchoke transitions through its
//! [`PeerEffects`] implementation.
//!
//! ```
//! use btcore::upload::{PeerEffects, PeerHandle, SlotLimit, TorrentId, UploadScheduler};
//!
//! struct Wire;
//!
//! impl PeerEffects for Wire {
//!     fn unchoke(&mut self, _peer: PeerHandle) { /* send Unchoke */ }
//!     fn choke(&mut self, _peer: PeerHandle) { /* send Choke */ }
//! }
//!
//! let mut scheduler = UploadScheduler::new(SlotLimit::default(), Wire);
//! let peer = scheduler.peer_joined(TorrentId(1));
//! scheduler.on_interest(peer);
//! ```

mod error;
mod scheduler;
mod service;

pub use error::UploadError;
pub use scheduler::{
    PeerEffects, PeerHandle, SlotLimit, TorrentId, UploadScheduler, CHOKE_INTERVAL,
};
pub use service::UploadService;
