use thiserror::Error;

/// Error taxonomy for shard I/O and query evaluation.
///
/// Recoverable per-shard failures (`Format`, `Io`, `Checksum`, `Version`)
/// never abort a whole query; the searcher excludes the shard and attaches a
/// warning to the result. Only `InvalidQuery` and `NoShards` surface to the
/// caller of a search.
#[derive(Debug, Error)]
pub enum ShardError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("shard format error: {0}")]
    Format(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    Checksum { stored: u32, computed: u32 },

    #[error("unsupported shard format version {found} (supported {min}..={max})")]
    Version { found: u32, min: u32, max: u32 },

    #[error("query cancelled")]
    Cancelled,

    #[error("no shards available")]
    NoShards,
}

impl ShardError {
    pub fn format(msg: impl Into<String>) -> Self {
        ShardError::Format(msg.into())
    }

    /// Whether a search should drop the shard and keep going rather than
    /// fail the query.
    pub fn is_shard_local(&self) -> bool {
        matches!(
            self,
            ShardError::Format(_)
                | ShardError::Io(_)
                | ShardError::Checksum { .. }
                | ShardError::Version { .. }
        )
    }

    /// Process exit code for the merge/explode CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            ShardError::Io(_) => 1,
            ShardError::Format(_) | ShardError::Checksum { .. } => 2,
            ShardError::Version { .. } => 3,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, ShardError>;
