use thiserror::Error;

/// Failure taxonomy for the playback core.
///
/// Everything except [`RuntimeError::ReplayDivergence`] is recovered where it
/// happens: the condition is logged and playback keeps going, because one
/// missing resource or one malformed script line must never abort a session.
/// Divergence between full playback and state-only replay breaks save/resume
/// and is treated as fatal wherever it is detected.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("resource not found: {key}")]
    ResourceNotFound { key: String },

    #[error("stale handle {handle} in bucket {key}")]
    StaleHandle { key: String, handle: u64 },

    #[error("progress task already registered: {id}")]
    DuplicateTaskId { id: String },

    #[error("command {command} rejected arguments: {raw:?}")]
    InvalidArgument { command: String, raw: String },

    #[error("replay divergence at split {split}: playback left {executed}, replay left {simulated}")]
    ReplayDivergence {
        split: usize,
        executed: String,
        simulated: String,
    },
}
