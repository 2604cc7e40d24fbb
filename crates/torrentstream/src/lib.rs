//! Biases a torrent's piece picker toward a reader's current position, and exposes the
//! downloading file as a plain `AsyncRead + AsyncSeek` stream, so a file can be played or served
//! sequentially-with-seek while it is still being fetched from peers.
//!
//! The three pieces fit together as:
//! - [`picker::StreamingPicker`] decorates a [`picker::BasePicker`] with an urgent/prefetch
//!   window anchored at a byte offset.
//! - [`stream::LocalStream`] is the `AsyncRead + AsyncSeek` surface a consumer reads from; a
//!   seek re-aims the window.
//! - [`provider::StreamProvider`] owns a torrent's registration with the surrounding
//!   [`engine::Engine`] and hands out at most one [`stream::LocalStream`] at a time.
//!
//! [`engine`] describes everything this crate depends on but does not implement: the actual
//! peer wire protocol, disk storage and piece verification.

pub mod config;
pub mod engine;
pub mod error;
pub mod picker;
pub mod piece_set;
pub mod provider;
pub mod reference_picker;
pub mod stream;

#[cfg(feature = "http-stream")]
pub mod http_stream;

pub use config::StreamConfig;
pub use error::{Error, Result};
pub use picker::{BasePicker, BlockRequest, PickerHandle, StreamingPicker};
pub use piece_set::PieceSet;
pub use provider::{ProviderState, StreamProvider};
pub use reference_picker::ReferencePicker;
pub use stream::{LocalStream, PieceWaiter};
