//! A bitmap indexed by piece number, used for have-sets, have-sets-per-peer and priority bands.
//!
//! Mirrors the engine's own bitfield representation so windows and peer have-sets can be
//! intersected with plain bitwise ops instead of building intermediate `Vec`s.

pub type PieceSet = bitvec::vec::BitVec<u8, bitvec::order::Msb0>;

pub fn empty_piece_set(total_pieces: u32) -> PieceSet {
    PieceSet::repeat(false, total_pieces as usize)
}
