use std::str::FromStr;
use std::time::Duration;

use rand::Rng as _;

use super::error::UploadError;

/// Interval between periodic re-evaluations.
pub const CHOKE_INTERVAL: Duration = Duration::from_secs(10);

/// The optimistic candidate is rotated on every third tick.
const ROTATE_EVERY: u64 = 3;

const DEFAULT_MAX_DOWNLOADERS: usize = 4;

/// A stable reference to a peer registered with the scheduler.
///
/// Valid from [`UploadScheduler::peer_joined`] until the peer is removed;
/// using a handle after removal is a programming error and panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerHandle(u32);

/// Opaque identity of the torrent a peer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TorrentId(pub u64);

/// Maximum number of concurrent downloader slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotLimit {
    /// No limit: every peer is unchoked.
    Unlimited,
    /// At most this many downloaders; `Max(0)` chokes everyone.
    Max(usize),
}

impl Default for SlotLimit {
    fn default() -> Self {
        SlotLimit::Max(DEFAULT_MAX_DOWNLOADERS)
    }
}

impl FromStr for SlotLimit {
    type Err = UploadError;

    /// Parses "unlimited" (or "off"), "0", or a positive integer.
    fn from_str(s: &str) -> Result<Self, UploadError> {
        match s.trim() {
            "unlimited" | "off" => Ok(SlotLimit::Unlimited),
            other => other
                .parse::<usize>()
                .map(SlotLimit::Max)
                .map_err(|_| UploadError::InvalidSlotLimit(s.to_string())),
        }
    }
}

/// Choke/unchoke transitions applied back to the connection layer.
///
/// The scheduler calls these at most once per peer per re-evaluation, and
/// only on an actual state change; wiring them to peer-wire Choke/Unchoke
/// messages is the implementor's job.
pub trait PeerEffects {
    /// Permit upload to this peer.
    fn unchoke(&mut self, peer: PeerHandle);

    /// Refuse upload to this peer.
    fn choke(&mut self, peer: PeerHandle);
}

struct PeerEntry {
    torrent: TorrentId,
    /// Remote has expressed interest in data we hold.
    wants_data: bool,
    /// We are currently choking this peer. Peers join choked.
    choked: bool,
    rate_up: u64,
    rate_down: u64,
    /// Our transfer of this peer's torrent is complete.
    complete: bool,
    /// The peer is already running at its personal concurrency cap.
    at_capacity: bool,
    prev: Option<u32>,
    next: Option<u32>,
}

impl PeerEntry {
    /// The reciprocity metric: once we are complete only our upload to the
    /// peer matters for fairness, otherwise what the peer sends us does.
    fn rate(&self) -> u64 {
        if self.complete {
            self.rate_up
        } else {
            self.rate_down
        }
    }
}

enum PeerSlot {
    Occupied(PeerEntry),
    Vacant { next_free: Option<u32> },
}

/// Tit-for-tat upload scheduler with optimistic unchoke rotation.
///
/// Holds every peer eligible for upload consideration in a rotation order
/// that doubles as the optimistic-unchoke order. All methods run to
/// completion on the caller's thread; wrap the scheduler in a mutex and
/// drive [`tick`](UploadScheduler::tick) from a timer (see
/// [`UploadService`](super::UploadService)).
pub struct UploadScheduler<E: PeerEffects> {
    slots: Vec<PeerSlot>,
    free: Option<u32>,
    head: Option<u32>,
    tail: Option<u32>,
    count: usize,
    limit: SlotLimit,
    ticks: u64,
    effects: E,
}

impl<E: PeerEffects> UploadScheduler<E> {
    pub fn new(limit: SlotLimit, effects: E) -> Self {
        Self {
            slots: Vec::new(),
            free: None,
            head: None,
            tail: None,
            count: 0,
            limit,
            ticks: 0,
            effects,
        }
    }

    /// Number of registered peers.
    pub fn peer_count(&self) -> usize {
        self.count
    }

    /// Number of periodic ticks processed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn slot_limit(&self) -> SlotLimit {
        self.limit
    }

    /// Changes the slot limit and re-evaluates under the new limit.
    pub fn set_slot_limit(&mut self, limit: SlotLimit) {
        self.limit = limit;
        self.reevaluate();
    }

    /// Whether we currently permit upload to this peer.
    pub fn is_unchoked(&self, peer: PeerHandle) -> bool {
        !self.entry(peer).choked
    }

    /// Whether this peer currently wants data from us.
    pub fn wants_data(&self, peer: PeerHandle) -> bool {
        self.entry(peer).wants_data
    }

    /// Registered peers in rotation order.
    pub fn peers(&self) -> Peers<'_, E> {
        Peers {
            scheduler: self,
            cur: self.head,
        }
    }

    /// Borrow the injected effects, mainly for inspection in tests.
    pub fn effects(&self) -> &E {
        &self.effects
    }

    /// Registers a newly connected peer and re-evaluates.
    ///
    /// The peer starts choked and uninterested. It is placed at a uniform
    /// random offset in `[-2, count]` from the front of the rotation
    /// (offsets below 1 mean the front itself), so a fresh peer never
    /// permanently occupies either end of the optimistic-unchoke order.
    pub fn peer_joined(&mut self, torrent: TorrentId) -> PeerHandle {
        let peer = self.alloc(PeerEntry {
            torrent,
            wants_data: false,
            choked: true,
            rate_up: 0,
            rate_down: 0,
            complete: false,
            at_capacity: false,
            prev: None,
            next: None,
        });
        let offset = rand::rng().random_range(-2..=self.count as i64);
        if offset < 1 {
            self.link_front(peer);
        } else {
            let after = self.nth((offset - 1) as usize);
            self.link_after(after, peer);
        }
        self.count += 1;
        tracing::debug!(peer = peer.0, "peer joined upload rotation");
        self.reevaluate();
        peer
    }

    /// Deregisters a disconnected peer.
    ///
    /// Panics if no peers are registered. Re-evaluates only if the peer
    /// was an active downloader (interested and unchoked), since its
    /// departure may free a slot.
    pub fn peer_left(&mut self, peer: PeerHandle) {
        assert!(self.count > 0, "peer_left on empty rotation");
        let entry = self.entry(peer);
        let was_active = entry.wants_data && !entry.choked;
        self.unlink(peer);
        self.free_slot(peer);
        self.count -= 1;
        tracing::debug!(peer = peer.0, "peer left upload rotation");
        if was_active {
            self.reevaluate();
        }
    }

    /// Deregisters every peer of a torrent being torn down, then
    /// re-evaluates unconditionally.
    pub fn torrent_lost(&mut self, torrent: TorrentId) {
        let doomed: Vec<PeerHandle> = self
            .peers()
            .filter(|p| self.entry(*p).torrent == torrent)
            .collect();
        for peer in doomed {
            self.unlink(peer);
            self.free_slot(peer);
            self.count -= 1;
        }
        self.reevaluate();
    }

    /// The peer's "wants data" flag flipped to true.
    ///
    /// Re-evaluates only if we have the peer unchoked; interest changes on
    /// choked peers never affect an active slot.
    pub fn on_interest(&mut self, peer: PeerHandle) {
        let unchoked = {
            let entry = self.entry_mut(peer);
            entry.wants_data = true;
            !entry.choked
        };
        if unchoked {
            self.reevaluate();
        }
    }

    /// The peer's "wants data" flag flipped to false.
    pub fn on_uninterest(&mut self, peer: PeerHandle) {
        let unchoked = {
            let entry = self.entry_mut(peer);
            entry.wants_data = false;
            !entry.choked
        };
        if unchoked {
            self.reevaluate();
        }
    }

    /// Updates the peer's measured throughput, read at the next
    /// re-evaluation.
    pub fn set_rates(&mut self, peer: PeerHandle, up: u64, down: u64) {
        let entry = self.entry_mut(peer);
        entry.rate_up = up;
        entry.rate_down = down;
    }

    /// Marks every peer of `torrent` as (in)complete, switching the
    /// ranking metric between upload and download rate.
    pub fn set_transfer_complete(&mut self, torrent: TorrentId, complete: bool) {
        for slot in &mut self.slots {
            if let PeerSlot::Occupied(entry) = slot {
                if entry.torrent == torrent {
                    entry.complete = complete;
                }
            }
        }
    }

    /// Marks whether the peer is at its personal concurrency cap.
    pub fn set_at_capacity(&mut self, peer: PeerHandle, at_capacity: bool) {
        self.entry_mut(peer).at_capacity = at_capacity;
    }

    /// Periodic callback body: every third tick rotates the optimistic
    /// candidate to the front, then always re-evaluates.
    pub fn tick(&mut self) {
        self.ticks += 1;
        if self.ticks % ROTATE_EVERY == 0 {
            self.rotate_optimists();
        }
        self.reevaluate();
    }

    /// Moves front peers to the tail until one that is both interested and
    /// choked sits at the front, making it the next optimistic unchoke by
    /// position. At most `count` moves, so the order is restored intact
    /// when no peer qualifies.
    pub(crate) fn rotate_optimists(&mut self) {
        for _ in 0..self.count {
            let Some(front) = self.head else { return };
            let entry = self.entry(PeerHandle(front));
            if entry.wants_data && entry.choked {
                break;
            }
            self.unlink(PeerHandle(front));
            self.link_back(PeerHandle(front));
        }
    }

    /// Re-evaluates every peer's choke state under the slot limit.
    ///
    /// With `Max(k)`, the `k - 1` fastest reciprocating peers keep their
    /// slots by rate ranking and the remainder are filled in rotation
    /// order, which is where the optimistic candidate's front position
    /// takes effect. Effects fire only on actual transitions.
    pub fn reevaluate(&mut self) {
        match self.limit {
            SlotLimit::Unlimited => {
                let order: Vec<PeerHandle> = self.peers().collect();
                for peer in order {
                    self.apply_unchoke(peer);
                }
            }
            SlotLimit::Max(0) => {
                let order: Vec<PeerHandle> = self.peers().collect();
                for peer in order {
                    self.apply_choke(peer);
                }
            }
            SlotLimit::Max(k) if self.count > 0 => {
                let order: Vec<PeerHandle> = self.peers().collect();

                // Worthy candidates: below their personal cap with a
                // positive rate on the completion-selected metric.
                let mut worthy: Vec<(usize, PeerHandle)> = Vec::new();
                for (i, &peer) in order.iter().enumerate() {
                    let entry = self.entry(peer);
                    if !entry.at_capacity && entry.rate() > 0 {
                        worthy.push((i, peer));
                    }
                }
                worthy.sort_by_key(|&(_, peer)| self.entry(peer).rate());

                // The k - 1 fastest keep their slots; one slot is left for
                // the rotation-chosen optimistic candidate.
                let mut selected = vec![false; order.len()];
                let mut found = 0;
                for &(pos, peer) in worthy.iter().rev() {
                    if found >= k - 1 {
                        break;
                    }
                    if self.entry(peer).wants_data {
                        found += 1;
                    }
                    self.apply_unchoke(peer);
                    selected[pos] = true;
                }

                // Fill the remaining slots in rotation order; everyone
                // else is choked.
                for (i, &peer) in order.iter().enumerate() {
                    if selected[i] {
                        continue;
                    }
                    let entry = self.entry(peer);
                    if found < k && !entry.at_capacity && entry.wants_data {
                        found += 1;
                        self.apply_unchoke(peer);
                    } else {
                        self.apply_choke(peer);
                    }
                }
            }
            SlotLimit::Max(_) => {}
        }
    }

    fn apply_unchoke(&mut self, peer: PeerHandle) {
        let entry = self.entry_mut(peer);
        if entry.choked {
            entry.choked = false;
            tracing::debug!(peer = peer.0, "unchoke");
            self.effects.unchoke(peer);
        }
    }

    fn apply_choke(&mut self, peer: PeerHandle) {
        let entry = self.entry_mut(peer);
        if !entry.choked {
            entry.choked = true;
            tracing::debug!(peer = peer.0, "choke");
            self.effects.choke(peer);
        }
    }

    fn entry(&self, peer: PeerHandle) -> &PeerEntry {
        match &self.slots[peer.0 as usize] {
            PeerSlot::Occupied(entry) => entry,
            PeerSlot::Vacant { .. } => panic!("stale peer handle"),
        }
    }

    fn entry_mut(&mut self, peer: PeerHandle) -> &mut PeerEntry {
        match &mut self.slots[peer.0 as usize] {
            PeerSlot::Occupied(entry) => entry,
            PeerSlot::Vacant { .. } => panic!("stale peer handle"),
        }
    }

    fn alloc(&mut self, entry: PeerEntry) -> PeerHandle {
        match self.free {
            Some(i) => {
                let next_free = match &self.slots[i as usize] {
                    PeerSlot::Vacant { next_free } => *next_free,
                    PeerSlot::Occupied(_) => unreachable!("free list points at occupied slot"),
                };
                self.free = next_free;
                self.slots[i as usize] = PeerSlot::Occupied(entry);
                PeerHandle(i)
            }
            None => {
                self.slots.push(PeerSlot::Occupied(entry));
                PeerHandle((self.slots.len() - 1) as u32)
            }
        }
    }

    fn free_slot(&mut self, peer: PeerHandle) {
        self.slots[peer.0 as usize] = PeerSlot::Vacant { next_free: self.free };
        self.free = Some(peer.0);
    }

    fn nth(&self, n: usize) -> PeerHandle {
        let mut cur = self.head.expect("rotation is empty");
        for _ in 0..n {
            cur = self
                .entry(PeerHandle(cur))
                .next
                .expect("offset past end of rotation");
        }
        PeerHandle(cur)
    }

    fn unlink(&mut self, peer: PeerHandle) {
        let (prev, next) = {
            let entry = self.entry(peer);
            (entry.prev, entry.next)
        };
        match prev {
            Some(p) => self.entry_mut(PeerHandle(p)).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.entry_mut(PeerHandle(n)).prev = prev,
            None => self.tail = prev,
        }
        let entry = self.entry_mut(peer);
        entry.prev = None;
        entry.next = None;
    }

    fn link_front(&mut self, peer: PeerHandle) {
        let old = self.head;
        {
            let entry = self.entry_mut(peer);
            entry.prev = None;
            entry.next = old;
        }
        match old {
            Some(o) => self.entry_mut(PeerHandle(o)).prev = Some(peer.0),
            None => self.tail = Some(peer.0),
        }
        self.head = Some(peer.0);
    }

    fn link_back(&mut self, peer: PeerHandle) {
        let old = self.tail;
        {
            let entry = self.entry_mut(peer);
            entry.next = None;
            entry.prev = old;
        }
        match old {
            Some(o) => self.entry_mut(PeerHandle(o)).next = Some(peer.0),
            None => self.head = Some(peer.0),
        }
        self.tail = Some(peer.0);
    }

    fn link_after(&mut self, after: PeerHandle, peer: PeerHandle) {
        let next = self.entry(after).next;
        {
            let entry = self.entry_mut(peer);
            entry.prev = Some(after.0);
            entry.next = next;
        }
        self.entry_mut(after).next = Some(peer.0);
        match next {
            Some(n) => self.entry_mut(PeerHandle(n)).prev = Some(peer.0),
            None => self.tail = Some(peer.0),
        }
    }
}

/// Iterator over registered peers in rotation order.
pub struct Peers<'a, E: PeerEffects> {
    scheduler: &'a UploadScheduler<E>,
    cur: Option<u32>,
}

impl<E: PeerEffects> Iterator for Peers<'_, E> {
    type Item = PeerHandle;

    fn next(&mut self) -> Option<PeerHandle> {
        let i = self.cur?;
        self.cur = self.scheduler.entry(PeerHandle(i)).next;
        Some(PeerHandle(i))
    }
}
