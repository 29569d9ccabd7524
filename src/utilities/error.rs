use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

/// Every failure the crate can surface. None of these are retryable at this
/// layer; group transitions that fail leave the state untouched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("input ends before the field being read")]
    TruncatedInput,

    #[error("length prefix exceeds the remaining buffer")]
    LengthOverflow,

    #[error("trailing bytes after the outermost decode")]
    TrailingBytes,

    #[error("value does not fit its declared length prefix")]
    OversizedField,

    #[error("unknown discriminator for {0}")]
    UnknownVariant(&'static str),

    #[error("inconsistent lengths for {0}")]
    InconsistentLength(&'static str),

    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    #[error("cipher suite is not supported")]
    UnknownSuite,

    #[error("crypto primitive failure: {0}")]
    Crypto(&'static str),

    #[error("decryption failed")]
    DecryptError,

    #[error("signature does not verify")]
    InvalidSignature,

    #[error("confirmation does not verify")]
    InvalidConfirmation,

    #[error("handshake prior epoch {got} does not match current epoch {current}")]
    StaleEpoch { current: u32, got: u32 },

    #[error("no owned private key covers the copath resolution")]
    NoDecryptionKey,

    #[error("roster slot is empty")]
    MissingRosterEntry,
}
