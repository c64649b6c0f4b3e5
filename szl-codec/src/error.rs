use thiserror::Error;

/// Decoding and encoding failures.
///
/// Everything a hostile or truncated byte string can trigger maps to one of
/// these; kernels surface them as merge errors, the runtime as undefs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("invalid value: {0}")]
    InvalidValue(&'static str),
    #[error("unexpected end of encoded data")]
    UnexpectedEnd,
}
