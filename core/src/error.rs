use thiserror::Error;

pub type Result<T, E = CollectError> = std::result::Result<T, E>;

/// Errors surfaced by the collection, lowering, merge, and reporting
/// operations in this crate.
///
/// Some variants (`StaleIsolate`, `ResumeFailed`) are raised internally but
/// are meant to be caught and discarded by the collector itself per the
/// "swallow" policy described on each call site; they still need to be
/// constructible so that call sites can match on them before dropping them.
#[derive(Error, Debug)]
pub enum CollectError {
    #[error("timed out connecting to VM service at '{uri}' after {elapsed_ms}ms")]
    ConnectTimeout { uri: String, elapsed_ms: u64 },

    #[error("timed out waiting for all isolates to pause after {elapsed_ms}ms")]
    PauseTimeout { elapsed_ms: u64 },

    #[error("no isolates reported by the VM")]
    NoIsolates,

    #[error("isolate '{0}' became stale (sentinel) mid-collection")]
    StaleIsolate(String),

    #[error("failed to resume isolate '{0}': {1}")]
    ResumeFailed(String, String),

    #[error("invalid coverage entry: {0}")]
    InvalidCoverageEntry(String),

    #[error("inconsistent function name for line {line}: '{existing}' vs '{incoming}'")]
    InconsistentFunctionName {
        line: u32,
        existing: String,
        incoming: String,
    },

    #[error("pretty-print requested function coverage but hit map has none")]
    MissingFunctionCoverage,

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("source map error: {0}")]
    SourceMap(#[from] sourcemap::Error),

    #[error("rpc error: {0}")]
    Rpc(String),
}
