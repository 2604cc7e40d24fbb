//! The streaming piece picker: a decorator around a base picker that biases request generation
//! toward the bytes a reader currently needs, without ever blocking normal download progress.

use std::sync::Arc;

use parking_lot::Mutex;
use torrentstream_core::{FileRange, Lengths, PieceWindow, ValidPieceIndex};

use crate::engine::{FileHandle, PeerHandle};
use crate::piece_set::PieceSet;

/// A single wire-level block request: a byte range within a piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRequest {
    pub piece: ValidPieceIndex,
    pub offset: u32,
    pub length: u32,
}

/// The piece-selection policy a [`StreamingPicker`] wraps: rarest-first, endgame, random-first,
/// or anything else the surrounding engine implements. The decorator only ever changes which
/// pieces are *offered* as `available`; all bookkeeping for in-flight requests lives here.
pub trait BasePicker: Send {
    /// Picks up to `count` blocks for `peer`, restricted to pieces set in `available`.
    fn pick_pieces(&mut self, peer: PeerHandle, available: &PieceSet, count: usize) -> Vec<BlockRequest>;

    /// Continues a request this peer already had outstanding, if any (e.g. because it stalled).
    fn continue_existing_request(&mut self, peer: PeerHandle) -> Option<BlockRequest>;

    /// Whether `available` contains any piece this picker still wants.
    fn is_interesting(&self, available: &PieceSet) -> bool;

    fn already_requested_block(&self, req: BlockRequest) -> bool;

    /// Returns `true` if a request was outstanding and is now cancelled.
    fn cancel_request(&mut self, req: BlockRequest) -> bool;

    fn received_block(&mut self, req: BlockRequest);

    /// Drops all bookkeeping, e.g. because the peer set changed dramatically.
    fn reset(&mut self);

    fn outstanding_for_piece(&self, piece: ValidPieceIndex) -> Vec<BlockRequest>;

    /// Pieces already received and hash-verified. Read-only from the picker's perspective;
    /// the engine is the one that flips bits here as pieces verify. Returns a snapshot rather
    /// than a borrow so implementations behind a lock (e.g. [`PickerHandle`]) can answer it
    /// without holding the lock past the call.
    fn have_pieces(&self) -> PieceSet;
}

/// Decorates a [`BasePicker`] with a high-priority window anchored at a reader's byte position.
///
/// Holds no per-block state of its own — only the window. Everything about in-flight requests
/// and which pieces are already downloaded stays in the wrapped base picker, so the decorator
/// can be dropped and recreated (e.g. across a seek that changes files) without losing any of
/// the base picker's progress.
pub struct StreamingPicker {
    base: Box<dyn BasePicker>,
    lengths: Lengths,
    window: PieceWindow,
    file: FileHandle,
}

impl StreamingPicker {
    pub fn new(
        base: Box<dyn BasePicker>,
        lengths: Lengths,
        file: FileHandle,
        high_priority_count: u32,
        look_ahead_count: u32,
    ) -> Self {
        let (first, last) = lengths
            .piece_range_for_file(file.offset_in_torrent, file.length)
            .expect("streamed file must have nonzero length");
        let file_range = FileRange { first_piece: first, last_piece: last };
        Self {
            base,
            window: PieceWindow::new(file_range, high_priority_count, look_ahead_count),
            lengths,
            file,
        }
    }

    pub fn file_range(&self) -> FileRange {
        self.window.file_range()
    }

    pub fn head_piece(&self) -> ValidPieceIndex {
        self.window.head_piece()
    }

    /// Re-aims the window at `byte_offset` within the streamed file and cancels any outstanding
    /// requests for pieces that fell out of the urgent band. Returns the cancelled requests so
    /// the caller can tell peer connections to send `Cancel` messages for them.
    pub fn seek_to_position(&mut self, byte_offset: u64) -> Vec<BlockRequest> {
        let old_urgent: Vec<ValidPieceIndex> = self.window.iter_urgent().collect();

        let absolute = self.file.offset_in_torrent + byte_offset.min(self.file.length);
        self.window.seek_to(&self.lengths, absolute);
        tracing::trace!(byte_offset, head_piece = self.window.head_piece().get(), "picker window re-aimed");

        let new_urgent: Vec<ValidPieceIndex> = self.window.iter_urgent().collect();
        let mut cancelled = Vec::new();
        for piece in old_urgent {
            if new_urgent.contains(&piece) {
                continue;
            }
            for req in self.base.outstanding_for_piece(piece) {
                if self.base.cancel_request(req) {
                    cancelled.push(req);
                }
            }
        }
        if !cancelled.is_empty() {
            tracing::debug!(count = cancelled.len(), "cancelled outstanding requests outside urgent window");
        }
        cancelled
    }

    fn restrict(&self, available: &PieceSet, have: &PieceSet, pieces: impl Iterator<Item = ValidPieceIndex>) -> PieceSet {
        let mut set = crate::piece_set::empty_piece_set(self.lengths.total_pieces());
        for piece in pieces {
            let idx = piece.get() as usize;
            let avail = available.get(idx).map(|b| *b).unwrap_or(false);
            let have = have.get(idx).map(|b| *b).unwrap_or(false);
            if avail && !have {
                set.set(idx, true);
            }
        }
        set
    }
}

impl BasePicker for StreamingPicker {
    fn pick_pieces(&mut self, peer: PeerHandle, available: &PieceSet, count: usize) -> Vec<BlockRequest> {
        let have = self.base.have_pieces();

        let urgent = self.restrict(available, &have, self.window.iter_urgent());
        if urgent.any() {
            let reqs = self.base.pick_pieces(peer, &urgent, count);
            if !reqs.is_empty() {
                return reqs;
            }
        }

        let prefetch = self.restrict(available, &have, self.window.iter_prefetch());
        if prefetch.any() {
            let reqs = self.base.pick_pieces(peer, &prefetch, count);
            if !reqs.is_empty() {
                return reqs;
            }
        }

        // Window exhausted or unavailable from this peer: don't block normal progress.
        self.base.pick_pieces(peer, available, count)
    }

    fn continue_existing_request(&mut self, peer: PeerHandle) -> Option<BlockRequest> {
        self.base.continue_existing_request(peer)
    }

    fn is_interesting(&self, available: &PieceSet) -> bool {
        self.base.is_interesting(available)
    }

    fn already_requested_block(&self, req: BlockRequest) -> bool {
        self.base.already_requested_block(req)
    }

    fn cancel_request(&mut self, req: BlockRequest) -> bool {
        self.base.cancel_request(req)
    }

    fn received_block(&mut self, req: BlockRequest) {
        self.base.received_block(req)
    }

    fn reset(&mut self) {
        self.base.reset()
    }

    fn outstanding_for_piece(&self, piece: ValidPieceIndex) -> Vec<BlockRequest> {
        self.base.outstanding_for_piece(piece)
    }

    fn have_pieces(&self) -> PieceSet {
        self.base.have_pieces()
    }
}

/// A handle to a [`StreamingPicker`] shared between the torrent session (which drives it through
/// [`BasePicker`]) and the [`crate::stream::LocalStream`] that re-aims it on seek.
///
/// There is deliberately no back-pointer from the base picker to this handle, or from the
/// torrent session to the stream: both sides hold an `Arc` to the same mutex-guarded picker,
/// which is the "real lock" realization of the main-loop serialization point described in the
/// design notes.
#[derive(Clone)]
pub struct PickerHandle(Arc<Mutex<StreamingPicker>>);

impl PickerHandle {
    pub fn new(picker: StreamingPicker) -> Self {
        Self(Arc::new(Mutex::new(picker)))
    }

    pub fn seek_to_position(&self, byte_offset: u64) -> Vec<BlockRequest> {
        self.0.lock().seek_to_position(byte_offset)
    }

    pub fn head_piece(&self) -> ValidPieceIndex {
        self.0.lock().head_piece()
    }

    pub fn have(&self, piece: ValidPieceIndex) -> bool {
        self.0
            .lock()
            .have_pieces()
            .get(piece.get() as usize)
            .map(|b| *b)
            .unwrap_or(false)
    }

    pub fn have_pieces(&self) -> PieceSet {
        self.0.lock().have_pieces()
    }

    /// Wraps this handle in a [`BasePicker`] installable on a [`crate::engine::TorrentHandle`].
    pub fn installable(&self) -> Box<dyn BasePicker> {
        Box::new(self.clone())
    }
}

impl BasePicker for PickerHandle {
    fn pick_pieces(&mut self, peer: PeerHandle, available: &PieceSet, count: usize) -> Vec<BlockRequest> {
        self.0.lock().pick_pieces(peer, available, count)
    }

    fn continue_existing_request(&mut self, peer: PeerHandle) -> Option<BlockRequest> {
        self.0.lock().continue_existing_request(peer)
    }

    fn is_interesting(&self, available: &PieceSet) -> bool {
        self.0.lock().is_interesting(available)
    }

    fn already_requested_block(&self, req: BlockRequest) -> bool {
        self.0.lock().already_requested_block(req)
    }

    fn cancel_request(&mut self, req: BlockRequest) -> bool {
        self.0.lock().cancel_request(req)
    }

    fn received_block(&mut self, req: BlockRequest) {
        self.0.lock().received_block(req)
    }

    fn reset(&mut self) {
        self.0.lock().reset()
    }

    fn outstanding_for_piece(&self, piece: ValidPieceIndex) -> Vec<BlockRequest> {
        self.0.lock().outstanding_for_piece(piece)
    }

    fn have_pieces(&self) -> PieceSet {
        self.0.lock().have_pieces()
    }
}
