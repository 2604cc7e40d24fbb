#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryError {
    #[error("torrent with 0 length is useless")]
    ZeroLength,
    #[error("piece length must be greater than 0")]
    ZeroPieceLength,
    #[error("invalid piece index {0}")]
    InvalidPieceIndex(u32),
}

pub type Result<T> = core::result::Result<T, GeometryError>;
