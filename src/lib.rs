//! btcore - bandwidth allocation core for a BitTorrent daemon
//!
//! This crate provides the upload-side decision making of a BitTorrent
//! daemon together with the generic associative container the daemon uses
//! to index peers, pieces, and torrents.
//!
//! # Modules
//!
//! - [`upload`] - Tit-for-tat choke/unchoke scheduling with optimistic
//!   unchoke rotation
//! - [`table`] - Generic open-chained hash table with incremental growth

pub mod table;
pub mod upload;

pub use table::{Handle, Keyed, Table};
pub use upload::{
    PeerEffects, PeerHandle, SlotLimit, TorrentId, UploadError, UploadScheduler, UploadService,
};
