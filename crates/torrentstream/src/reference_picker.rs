//! A minimal rarest-first-agnostic [`BasePicker`]: sequential-by-availability, one block at a
//! time per piece. Exists so the streaming window can be exercised end to end in tests without
//! pulling in a real peer swarm; a production engine supplies its own rarest-first/endgame
//! picker instead.

use std::collections::HashSet;

use torrentstream_core::{Lengths, ValidPieceIndex};

use crate::engine::PeerHandle;
use crate::picker::{BasePicker, BlockRequest};
use crate::piece_set::{empty_piece_set, PieceSet};

/// Tracks, per piece, which blocks have been requested and which have been received, the way
/// `chunk_tracker` tracks chunk status per piece. No per-peer affinity: any peer offering a
/// needed block may be asked for it.
pub struct ReferencePicker {
    lengths: Lengths,
    have: PieceSet,
    requested: HashSet<BlockRequest>,
}

impl ReferencePicker {
    pub fn new(lengths: Lengths) -> Self {
        Self {
            have: empty_piece_set(lengths.total_pieces()),
            lengths,
            requested: HashSet::new(),
        }
    }

    /// Marks a piece as downloaded and verified, as if its last block had just arrived.
    pub fn mark_have(&mut self, piece: ValidPieceIndex) {
        self.have.set(piece.get() as usize, true);
        self.requested.retain(|r| r.piece != piece);
    }

    fn needed_blocks(&self, piece: ValidPieceIndex) -> Vec<BlockRequest> {
        let piece_len = self.lengths.piece_length(piece);
        let block_len = self.lengths.block_length();
        let mut blocks = Vec::new();
        let mut offset = 0u32;
        while offset < piece_len {
            let length = block_len.min(piece_len - offset);
            let req = BlockRequest { piece, offset, length };
            if !self.requested.contains(&req) {
                blocks.push(req);
            }
            offset += length;
        }
        blocks
    }
}

impl BasePicker for ReferencePicker {
    fn pick_pieces(&mut self, _peer: PeerHandle, available: &PieceSet, count: usize) -> Vec<BlockRequest> {
        let mut picked = Vec::new();
        for idx in available.iter_ones() {
            if self.have.get(idx).map(|b| *b).unwrap_or(false) {
                continue;
            }
            let Some(piece) = self.lengths.validate_piece_index(idx as u32) else {
                continue;
            };
            for req in self.needed_blocks(piece) {
                if picked.len() >= count {
                    self.requested.extend(picked.iter().copied());
                    return picked;
                }
                picked.push(req);
            }
        }
        self.requested.extend(picked.iter().copied());
        picked
    }

    fn continue_existing_request(&mut self, _peer: PeerHandle) -> Option<BlockRequest> {
        None
    }

    fn is_interesting(&self, available: &PieceSet) -> bool {
        available.iter_ones().any(|idx| !self.have.get(idx).map(|b| *b).unwrap_or(false))
    }

    fn already_requested_block(&self, req: BlockRequest) -> bool {
        self.requested.contains(&req)
    }

    fn cancel_request(&mut self, req: BlockRequest) -> bool {
        self.requested.remove(&req)
    }

    fn received_block(&mut self, req: BlockRequest) {
        self.requested.remove(&req);
        let piece_len = self.lengths.piece_length(req.piece);
        let fully_received = self.needed_blocks(req.piece).is_empty() && req.offset + req.length >= piece_len;
        if fully_received {
            self.have.set(req.piece.get() as usize, true);
        }
    }

    fn reset(&mut self) {
        self.requested.clear();
    }

    fn outstanding_for_piece(&self, piece: ValidPieceIndex) -> Vec<BlockRequest> {
        self.requested.iter().filter(|r| r.piece == piece).copied().collect()
    }

    fn have_pieces(&self) -> PieceSet {
        self.have.clone()
    }
}
