//! End-to-end exercises wiring [`StreamProvider`], [`StreamingPicker`] and [`LocalStream`]
//! together against an in-memory fake engine, the way a real client wires them against its own
//! peer/storage layer.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use torrentstream::engine::{Engine, FileHandle, FileId, InfoHash, TorrentHandle, TorrentRunState};
use torrentstream::{BasePicker, Error, PieceWaiter, ReferencePicker, StreamConfig, StreamProvider};
use torrentstream_core::{Lengths, ValidPieceIndex};

struct FakeEngine {
    torrents: DashMap<InfoHash, Arc<dyn TorrentHandle>>,
}

impl FakeEngine {
    fn new() -> Arc<Self> {
        Arc::new(Self { torrents: DashMap::new() })
    }
}

impl Engine for FakeEngine {
    fn contains(&self, infohash: InfoHash) -> bool {
        self.torrents.contains_key(&infohash)
    }

    fn register(&self, torrent: Arc<dyn TorrentHandle>) -> anyhow::Result<()> {
        self.torrents.insert(torrent.info_hash(), torrent);
        Ok(())
    }

    fn unregister(&self, infohash: InfoHash) -> anyhow::Result<()> {
        self.torrents.remove(&infohash);
        Ok(())
    }
}

/// A torrent whose data is entirely in memory and whose pieces "download" the instant a test
/// calls [`FakeTorrent::mark_verified`] — there's no real peer wire protocol here, only enough
/// of [`TorrentHandle`] to drive [`torrentstream::LocalStream`] and [`StreamProvider`].
struct FakeTorrent {
    info_hash: InfoHash,
    lengths: Lengths,
    data: Vec<u8>,
    verified: Mutex<Vec<bool>>,
    run_state: Mutex<TorrentRunState>,
    waiter: PieceWaiter,
}

impl FakeTorrent {
    fn new(info_hash: InfoHash, lengths: Lengths, data: Vec<u8>) -> Arc<Self> {
        let total = lengths.total_pieces() as usize;
        Arc::new(Self {
            info_hash,
            lengths,
            data,
            verified: Mutex::new(vec![false; total]),
            run_state: Mutex::new(TorrentRunState::Stopped),
            waiter: PieceWaiter::new(),
        })
    }

    fn mark_verified(&self, piece: ValidPieceIndex) {
        self.verified.lock().unwrap()[piece.get() as usize] = true;
        self.waiter.wake();
    }
}

impl TorrentHandle for FakeTorrent {
    fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    fn lengths(&self) -> Lengths {
        self.lengths
    }

    fn file(&self, file_id: FileId) -> Option<FileHandle> {
        if file_id.0 != 0 {
            return None;
        }
        Some(FileHandle { id: file_id, offset_in_torrent: 0, length: self.lengths.total_length() })
    }

    fn change_picker(&self, _picker: Box<dyn BasePicker>) {}

    fn start(&self) -> anyhow::Result<()> {
        *self.run_state.lock().unwrap() = TorrentRunState::Running;
        Ok(())
    }

    fn pause(&self) -> anyhow::Result<()> {
        *self.run_state.lock().unwrap() = TorrentRunState::Paused;
        Ok(())
    }

    fn stop(&self) -> anyhow::Result<()> {
        *self.run_state.lock().unwrap() = TorrentRunState::Stopped;
        Ok(())
    }

    fn state(&self) -> TorrentRunState {
        *self.run_state.lock().unwrap()
    }

    fn have(&self, piece: ValidPieceIndex) -> bool {
        self.verified.lock().unwrap()[piece.get() as usize]
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> anyhow::Result<usize> {
        let offset = offset as usize;
        let n = buf.len().min(self.data.len().saturating_sub(offset));
        buf[..n].copy_from_slice(&self.data[offset..offset + n]);
        Ok(n)
    }

    fn subscribe_piece_verified(&self) -> PieceWaiter {
        self.waiter.clone()
    }
}

fn torrent(info_hash: InfoHash, piece_len: u32, total_len: u64) -> Arc<FakeTorrent> {
    let lengths = Lengths::new(total_len, piece_len).unwrap();
    let data: Vec<u8> = (0..total_len).map(|i| (i % 251) as u8).collect();
    FakeTorrent::new(info_hash, lengths, data)
}

#[tokio::test]
async fn full_sequential_read_across_growing_download() {
    let engine = FakeEngine::new();
    let t = torrent([1; 20], 16, 64);
    let provider = StreamProvider::register(engine, t.clone(), StreamConfig::default()).unwrap();
    provider.start().unwrap();

    let base = Box::new(ReferencePicker::new(provider.lengths()));
    let mut stream = provider.open_stream(FileId(0), base).unwrap();

    let reader_task = tokio::spawn(async move {
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        out
    });

    // Pieces verify one at a time, out of order with respect to issuance but the reader still
    // sees the file in order because it blocks on whichever piece it's currently positioned in.
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    for i in 0..4u32 {
        t.mark_verified(t.lengths.validate_piece_index(i).unwrap());
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let out = tokio::time::timeout(std::time::Duration::from_secs(2), reader_task)
        .await
        .expect("reader task must finish once all pieces verify")
        .unwrap();
    assert_eq!(out, t.data);
}

#[tokio::test]
async fn seek_forward_then_read_does_not_wait_for_skipped_pieces() {
    let engine = FakeEngine::new();
    let t = torrent([2; 20], 16, 64);
    let provider = StreamProvider::register(engine, t.clone(), StreamConfig::default()).unwrap();
    provider.start().unwrap();

    let base = Box::new(ReferencePicker::new(provider.lengths()));
    let mut stream = provider.open_stream(FileId(0), base).unwrap();

    stream.seek(std::io::SeekFrom::Start(48)).await.unwrap();
    t.mark_verified(t.lengths.validate_piece_index(3).unwrap());

    let mut buf = [0u8; 16];
    let n = tokio::time::timeout(std::time::Duration::from_millis(200), stream.read(&mut buf))
        .await
        .expect("read for the seeked-to piece must not block on earlier pieces")
        .unwrap();
    assert_eq!(n, 16);
    assert_eq!(buf, t.data[48..64]);
}

#[tokio::test]
async fn opening_two_streams_for_the_same_file_conflicts() {
    let engine = FakeEngine::new();
    let t = torrent([3; 20], 16, 64);
    let provider = StreamProvider::register(engine, t, StreamConfig::default()).unwrap();
    provider.start().unwrap();

    let base1 = Box::new(ReferencePicker::new(provider.lengths()));
    let _stream1 = provider.open_stream(FileId(0), base1).unwrap();

    let base2 = Box::new(ReferencePicker::new(provider.lengths()));
    let err = provider.open_stream(FileId(0), base2).unwrap_err();
    assert!(matches!(err, Error::Conflict));
}

#[tokio::test]
async fn registering_the_same_infohash_twice_conflicts_at_the_engine() {
    let engine = FakeEngine::new();
    let t1 = torrent([4; 20], 16, 64);
    let t2 = torrent([4; 20], 16, 64);
    let _provider1 = StreamProvider::register(engine.clone(), t1, StreamConfig::default()).unwrap();
    let err = StreamProvider::register(engine, t2, StreamConfig::default()).unwrap_err();
    assert!(matches!(err, Error::Conflict));
}

#[tokio::test]
async fn read_blocks_indefinitely_while_its_piece_never_verifies() {
    let engine = FakeEngine::new();
    let t = torrent([5; 20], 16, 64);
    let provider = StreamProvider::register(engine, t, StreamConfig::default()).unwrap();
    provider.start().unwrap();

    let base = Box::new(ReferencePicker::new(provider.lengths()));
    let mut stream = provider.open_stream(FileId(0), base).unwrap();

    let mut buf = [0u8; 16];
    let result = tokio::time::timeout(std::time::Duration::from_millis(20), stream.read(&mut buf)).await;
    assert!(result.is_err(), "read must not return until its piece verifies");
}
