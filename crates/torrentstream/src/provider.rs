//! Owns the lifecycle of streaming a single torrent's files: registering the torrent with the
//! engine, installing the streaming picker, and handing out [`LocalStream`]s while the torrent
//! is active. Mirrors the `Inactive -> Active <-> Paused -> Stopped` state machine the rest of
//! this engine uses for managed torrents, scoped down to what streaming needs.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use torrentstream_core::Lengths;

use crate::config::StreamConfig;
use crate::engine::{Engine, FileId, InfoHash, TorrentHandle, TorrentRunState};
use crate::error::{Error, Result};
use crate::picker::PickerHandle;
use crate::stream::LocalStream;

/// The provider's own view of lifecycle state, distinct from [`TorrentRunState`]: a provider can
/// be `Inactive` even while its torrent handle still exists, if it was never started, or
/// `Stopped` once it has deliberately torn the torrent down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderState {
    /// No torrent registered with the engine yet.
    Inactive,
    /// Registered and accepting new streams.
    Active,
    /// Registered but not currently fetching; existing streams block until resumed.
    Paused,
    /// Torrent unregistered; the provider cannot be reused.
    Stopped,
}

/// Drives one torrent through registration, streaming and teardown.
///
/// Only one [`LocalStream`] may be open per provider at a time: opening a second stream before
/// the first is closed returns [`Error::Conflict`], the same way the engine rejects adding a
/// torrent whose infohash is already managed. A provider does not support streaming two files of
/// the same torrent concurrently.
pub struct StreamProvider {
    engine: Arc<dyn Engine>,
    torrent: Arc<dyn TorrentHandle>,
    config: StreamConfig,
    state: Mutex<ProviderState>,
    active_stream: Mutex<Option<FileId>>,
}

impl std::fmt::Debug for StreamProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamProvider")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("active_stream", &self.active_stream)
            .finish_non_exhaustive()
    }
}

impl StreamProvider {
    /// Registers `torrent` with `engine`. Fails with [`Error::Conflict`] if a torrent with the
    /// same infohash is already registered, mirroring `AddTorrentResponse::AlreadyManaged`.
    pub fn register(
        engine: Arc<dyn Engine>,
        torrent: Arc<dyn TorrentHandle>,
        config: StreamConfig,
    ) -> Result<Self> {
        if engine.contains(torrent.info_hash()) {
            return Err(Error::Conflict);
        }
        engine
            .register(torrent.clone())
            .map_err(Error::Storage)?;
        Ok(Self {
            engine,
            torrent,
            config,
            state: Mutex::new(ProviderState::Inactive),
            active_stream: Mutex::new(None),
        })
    }

    pub fn info_hash(&self) -> InfoHash {
        self.torrent.info_hash()
    }

    pub fn state(&self) -> ProviderState {
        *self.state.lock()
    }

    pub fn lengths(&self) -> Lengths {
        self.torrent.lengths()
    }

    /// Installs the streaming picker's base and starts the torrent. Only valid from `Inactive`;
    /// use [`Self::resume`] to leave `Paused`.
    pub fn start(&self) -> Result<()> {
        let mut state = self.state.lock();
        match *state {
            ProviderState::Inactive => {
                self.torrent.start().map_err(Error::Storage)?;
                *state = ProviderState::Active;
                tracing::debug!(infohash = ?self.torrent.info_hash(), "provider started");
                Ok(())
            }
            ProviderState::Active => Err(Error::InvalidState("provider already active")),
            ProviderState::Paused => Err(Error::InvalidState("provider is paused, call resume instead")),
            ProviderState::Stopped => Err(Error::InvalidState("provider already stopped")),
        }
    }

    /// Pauses the torrent. Existing streams remain open but reads for unverified pieces block
    /// until [`Self::resume`] is called.
    pub fn pause(&self) -> Result<()> {
        let mut state = self.state.lock();
        match *state {
            ProviderState::Active => {
                self.torrent.pause().map_err(Error::Storage)?;
                *state = ProviderState::Paused;
                tracing::debug!(infohash = ?self.torrent.info_hash(), "provider paused");
                Ok(())
            }
            ProviderState::Paused => Err(Error::InvalidState("provider already paused")),
            ProviderState::Inactive | ProviderState::Stopped => {
                Err(Error::InvalidState("provider is not active"))
            }
        }
    }

    /// Resumes a paused torrent. `Paused` implies `Active`: this returns to `Active`, never to
    /// `Inactive`.
    pub fn resume(&self) -> Result<()> {
        let mut state = self.state.lock();
        match *state {
            ProviderState::Paused => {
                self.torrent.start().map_err(Error::Storage)?;
                *state = ProviderState::Active;
                tracing::debug!(infohash = ?self.torrent.info_hash(), "provider resumed");
                Ok(())
            }
            ProviderState::Active => Err(Error::InvalidState("provider already active")),
            ProviderState::Inactive | ProviderState::Stopped => {
                Err(Error::InvalidState("provider is not paused"))
            }
        }
    }

    /// Unregisters the torrent from the engine and disposes the active stream slot. Terminal:
    /// the provider cannot be restarted, a fresh provider must be created instead.
    pub fn stop(&self) -> Result<()> {
        let mut state = self.state.lock();
        match *state {
            ProviderState::Active | ProviderState::Paused => {
                self.torrent.stop().map_err(Error::Storage)?;
                self.engine
                    .unregister(self.torrent.info_hash())
                    .map_err(Error::Storage)?;
                *self.active_stream.lock() = None;
                *state = ProviderState::Stopped;
                tracing::debug!(infohash = ?self.torrent.info_hash(), "provider stopped");
                Ok(())
            }
            ProviderState::Stopped => Ok(()),
            ProviderState::Inactive => Err(Error::InvalidState("provider is not active")),
        }
    }

    /// Opens a stream for `file_id`, installing a [`crate::picker::StreamingPicker`] aimed at
    /// the start of the file. Returns [`Error::Conflict`] if a stream is already open for this
    /// provider (at most one [`LocalStream`] may be outstanding at a time, regardless of which
    /// file it targets), and [`Error::InvalidState`] unless the provider is `Active` or `Paused`.
    pub fn open_stream(&self, file_id: FileId, base_picker: Box<dyn crate::picker::BasePicker>) -> Result<LocalStream> {
        {
            let state = self.state.lock();
            if !matches!(*state, ProviderState::Active | ProviderState::Paused) {
                return Err(Error::InvalidState("provider must be active or paused to open a stream"));
            }
        }

        let file = self
            .torrent
            .file(file_id)
            .ok_or_else(|| Error::InvalidArgument(format!("no such file: {file_id:?}")))?;

        {
            let mut active = self.active_stream.lock();
            if active.is_some() {
                return Err(Error::Conflict);
            }
            *active = Some(file_id);
        }

        let streaming = crate::picker::StreamingPicker::new(
            base_picker,
            self.torrent.lengths(),
            file,
            self.config.high_priority_count,
            self.config.look_ahead_count,
        );
        let handle = PickerHandle::new(streaming);
        self.torrent.change_picker(handle.installable());
        tracing::debug!(infohash = ?self.torrent.info_hash(), ?file_id, "stream opened");

        Ok(LocalStream::new(
            self.torrent.clone(),
            file,
            handle,
            CancellationToken::new(),
        ))
    }

    /// Releases the active-stream slot so a later [`Self::open_stream`] call succeeds again.
    /// Call this once the caller's [`LocalStream`] has been dropped.
    pub fn close_stream(&self, file_id: FileId) {
        let mut active = self.active_stream.lock();
        if *active == Some(file_id) {
            *active = None;
            tracing::debug!(infohash = ?self.torrent.info_hash(), ?file_id, "stream closed");
        }
    }

    pub fn run_state(&self) -> TorrentRunState {
        self.torrent.state()
    }
}
