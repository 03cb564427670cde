use thiserror::Error;

/// Errors that can occur while bringing the engine up.
///
/// Nothing on the per-packet hot path returns this type: a parser that hits
/// truncated or malformed input empties its `Datum` and the processor moves
/// on to the next packet. `EngineError` is reserved for the init boundary
/// (archive load, configuration load/validation, pipeline bring-up).
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("archive is missing required entry: {0}")]
    MissingArchiveEntry(&'static str),

    #[error("fingerprint database entry malformed: {0}")]
    MalformedDbLine(String),

    #[error("no packet source configured")]
    NoPacketSource,
}

pub type Result<T> = std::result::Result<T, EngineError>;
