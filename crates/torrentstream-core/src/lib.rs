//! Piece and byte geometry shared between the streaming picker, the local stream and the
//! provider: how many pieces a torrent has, which piece a byte offset falls into, and which
//! pieces around a reader's position should be prioritised.
//!
//! This crate knows nothing about peers, disk I/O or torrent metadata parsing — it is pure
//! arithmetic over `(total_length, piece_length, block_length)`, kept separate so it can be
//! unit tested without spinning up any async runtime or engine collaborator.

pub mod error;
pub mod lengths;
pub mod window;

pub use error::GeometryError;
pub use lengths::{CurrentPiece, Lengths, PieceInfo, ValidPieceIndex, DEFAULT_BLOCK_LENGTH};
pub use window::{
    FileRange, PiecePriority, PieceWindow, DEFAULT_HIGH_PRIORITY_COUNT, DEFAULT_LOOK_AHEAD_COUNT,
};
