use torrentstream_core::GeometryError;

/// Errors surfaced by the stream provider and local stream across their public API.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("provider is not in a state that allows this operation: {0}")]
    InvalidState(&'static str),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("a stream is already active for this file")]
    Conflict,

    #[error("operation cancelled")]
    Cancelled,

    #[error("torrent geometry error")]
    Geometry(#[from] GeometryError),

    #[error("storage error")]
    Storage(#[source] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        use std::io::ErrorKind;
        let kind = match &err {
            Error::InvalidState(_) => ErrorKind::Other,
            Error::InvalidArgument(_) => ErrorKind::InvalidInput,
            Error::Conflict => ErrorKind::AlreadyExists,
            Error::Cancelled => ErrorKind::Interrupted,
            Error::Geometry(_) => ErrorKind::InvalidInput,
            Error::Storage(_) => ErrorKind::Other,
        };
        std::io::Error::new(kind, err)
    }
}
