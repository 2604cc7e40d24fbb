//! Collaborator contract the core depends on but does not implement.
//!
//! Everything in this module describes the surrounding torrent engine: the peer wire protocol,
//! choking, tracker/DHT communication, disk I/O and piece hashing. A real client wires a concrete
//! implementation of [`Engine`] and [`TorrentHandle`] in; tests use an in-memory fake (see
//! `tests/` and [`crate::picker::BasePicker`]'s own fake in its unit tests).

use torrentstream_core::Lengths;

/// A torrent's SHA-1 info hash. Used by the engine to reject duplicate registrations.
pub type InfoHash = [u8; 20];

/// Identifies a peer connection for the purposes of request bookkeeping.
pub type PeerHandle = std::net::SocketAddr;

/// Index of a file within a torrent's file list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(pub usize);

/// A single file inside a torrent, as laid out in the torrent's byte space.
#[derive(Debug, Clone, Copy)]
pub struct FileHandle {
    pub id: FileId,
    pub offset_in_torrent: u64,
    pub length: u64,
}

/// The subset of a live torrent session's state this core distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TorrentRunState {
    Running,
    Paused,
    Stopped,
}

/// A single torrent's download session: the peer wire plumbing, the base piece picker and the
/// disk layer, all owned by the surrounding engine.
///
/// All methods execute on the engine's main loop and return once the corresponding state change
/// has been accepted; nothing here blocks on network I/O.
pub trait TorrentHandle: Send + Sync {
    fn info_hash(&self) -> InfoHash;

    fn lengths(&self) -> Lengths;

    fn file(&self, file_id: FileId) -> Option<FileHandle>;

    /// Installs a picker, replacing whatever was there before. For a torrent's first picker this
    /// must happen before [`Self::start`]; [`crate::provider::StreamProvider`] instead calls this
    /// once per opened stream, after `start`, because the streaming window it installs can't be
    /// aimed without knowing which file the caller wants to read.
    fn change_picker(&self, picker: Box<dyn crate::picker::BasePicker>);

    fn start(&self) -> anyhow::Result<()>;
    fn pause(&self) -> anyhow::Result<()>;
    fn stop(&self) -> anyhow::Result<()>;

    fn state(&self) -> TorrentRunState;

    /// True once the piece has been received and hash-verified.
    fn have(&self, piece: torrentstream_core::ValidPieceIndex) -> bool;

    /// Reads already-verified bytes at the given torrent-absolute offset.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> anyhow::Result<usize>;

    /// Registers to be woken (via [`crate::stream::PieceWaiter`]) whenever any piece verifies.
    fn subscribe_piece_verified(&self) -> crate::stream::PieceWaiter;
}

/// The registry that owns torrent sessions. A provider registers a torrent with the engine on
/// `start` and unregisters it on `stop`; at most one provider per infohash may be registered
/// at a time.
pub trait Engine: Send + Sync {
    fn contains(&self, infohash: InfoHash) -> bool;
    fn register(&self, torrent: std::sync::Arc<dyn TorrentHandle>) -> anyhow::Result<()>;
    fn unregister(&self, infohash: InfoHash) -> anyhow::Result<()>;
}
