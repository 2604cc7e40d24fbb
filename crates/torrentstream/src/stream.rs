//! A seekable, readable view of one file inside a downloading torrent.
//!
//! Reads block (via [`std::task::Waker`] registration, never by spinning) until the piece
//! covering the current position has verified, then read already-downloaded bytes straight off
//! disk. A seek re-aims the installed picker's priority window at the new position so the next
//! read doesn't have to wait for pieces the old position no longer cares about.

use std::future::Future;
use std::io::SeekFrom;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};
use tokio_util::sync::CancellationToken;

use crate::engine::{FileHandle, TorrentHandle};
use crate::error::Error;
use crate::picker::PickerHandle;

/// A broadcast wakeup channel for "some piece just verified". An engine implementation calls
/// [`PieceWaiter::wake`] once per completed piece (coalescing is fine: [`LocalStream`] always
/// rechecks `have()` before trusting a wakeup); [`LocalStream`] registers itself via
/// [`PieceWaiter::register`] each time it needs to block.
///
/// The single waker slot is sound only because [`crate::provider::StreamProvider`] enforces at
/// most one outstanding [`LocalStream`] per provider: two concurrent subscribers sharing one
/// slot would clobber each other's registration and leave one of them parked forever.
#[derive(Clone, Default)]
pub struct PieceWaiter(Arc<Mutex<Option<Waker>>>);

impl PieceWaiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wake(&self) {
        if let Some(waker) = self.0.lock().unwrap().take() {
            waker.wake();
        }
    }

    pub(crate) fn register(&self, waker: &Waker) {
        *self.0.lock().unwrap() = Some(waker.clone());
    }
}

/// Pending seek state between a call to [`AsyncSeek::start_seek`] and the following
/// [`AsyncSeek::poll_complete`].
enum PendingSeek {
    None,
    Requested(u64),
}

/// An `AsyncRead + AsyncSeek` view over one file of a torrent that may still be downloading.
///
/// At most one [`LocalStream`] should be constructed per provider at a time; the
/// [`crate::provider::StreamProvider`] that hands these out enforces that invariant.
pub struct LocalStream {
    engine: Arc<dyn TorrentHandle>,
    file: FileHandle,
    picker: PickerHandle,
    waiter: PieceWaiter,
    cancel: CancellationToken,
    /// Polled alongside the piece-verified waker whenever a read blocks, so cancelling a stream
    /// with a read already suspended wakes it instead of leaving it parked until an unrelated
    /// piece verifies (or forever, if the download stalls). Lives across polls so the waker
    /// registered with the token isn't dropped between them.
    cancel_wait: Option<Pin<Box<dyn Future<Output = ()> + Send>>>,
    position: u64,
    pending_seek: PendingSeek,
}

impl std::fmt::Debug for LocalStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStream")
            .field("file", &self.file)
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}

impl LocalStream {
    pub fn new(
        engine: Arc<dyn TorrentHandle>,
        file: FileHandle,
        picker: PickerHandle,
        cancel: CancellationToken,
    ) -> Self {
        let waiter = engine.subscribe_piece_verified();
        Self {
            engine,
            file,
            picker,
            waiter,
            cancel,
            cancel_wait: None,
            position: 0,
            pending_seek: PendingSeek::None,
        }
    }

    /// Polls for cancellation, registering `cx`'s waker with the token if not already cancelled
    /// so a later `cancel()` call wakes whatever task is parked in a read.
    fn poll_cancelled(&mut self, cx: &mut Context<'_>) -> bool {
        if self.cancel.is_cancelled() {
            return true;
        }
        let cancel = self.cancel.clone();
        let fut = self
            .cancel_wait
            .get_or_insert_with(|| Box::pin(async move { cancel.cancelled().await }));
        fut.as_mut().poll(cx).is_ready()
    }

    /// Current byte offset into the streamed file.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn len(&self) -> u64 {
        self.file.length
    }

    fn remaining(&self) -> u64 {
        self.file.length.saturating_sub(self.position)
    }
}

impl AsyncRead for LocalStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        if self.poll_cancelled(cx) {
            return Poll::Ready(Err(Error::Cancelled.into()));
        }
        if self.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        let lengths = self.engine.lengths();
        let absolute = self.file.offset_in_torrent + self.position;
        let current = lengths.current_piece(absolute);

        if !self.engine.have(current.id) {
            self.waiter.register(cx.waker());
            // Re-check after registering: the piece may have verified between the `have()`
            // check above and the registration landing, in which case no future wakeup would
            // otherwise arrive.
            if !self.engine.have(current.id) {
                return Poll::Pending;
            }
        }

        let want = (buf.remaining() as u64).min(current.piece_remaining as u64).min(self.remaining());
        let want = want as usize;
        let unfilled = buf.initialize_unfilled_to(want);
        match self.engine.read_at(absolute, unfilled) {
            Ok(n) => {
                buf.advance(n);
                self.position += n as u64;
                Poll::Ready(Ok(()))
            }
            Err(e) => Poll::Ready(Err(Error::Storage(e).into())),
        }
    }
}

impl AsyncSeek for LocalStream {
    fn start_seek(mut self: Pin<&mut Self>, position: SeekFrom) -> std::io::Result<()> {
        let target = match position {
            SeekFrom::Start(off) => off,
            SeekFrom::End(delta) => {
                let target = self.file.length as i64 + delta;
                if target < 0 {
                    return Err(Error::InvalidArgument("seek before start of file".into()).into());
                }
                target as u64
            }
            SeekFrom::Current(delta) => {
                let target = self.position as i64 + delta;
                if target < 0 {
                    return Err(Error::InvalidArgument("seek before start of file".into()).into());
                }
                target as u64
            }
        };
        if target > self.file.length {
            return Err(Error::InvalidArgument(format!(
                "seek to {target} past end of stream (length {})",
                self.file.length
            ))
            .into());
        }
        self.pending_seek = PendingSeek::Requested(target);
        Ok(())
    }

    fn poll_complete(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<u64>> {
        match std::mem::replace(&mut self.pending_seek, PendingSeek::None) {
            PendingSeek::None => Poll::Ready(Ok(self.position)),
            PendingSeek::Requested(target) => {
                self.picker.seek_to_position(target);
                self.position = target;
                Poll::Ready(Ok(self.position))
            }
        }
    }
}
