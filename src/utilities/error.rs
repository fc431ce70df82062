//! Crate-wide error type. Errors surface to the caller; the core never
//! retries, never logs, and never catches.

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // Malformed input bytes.
    #[error("buffer too small")]
    BufferTooSmall,
    #[error("length prefix overflows its {0}-byte width")]
    LengthOverflow(u8),
    #[error("trailing bytes after message")]
    TrailingBytes,
    #[error("invalid optional value")]
    InvalidOptionalValue,
    #[error("invalid credential type value")]
    InvalidCredentialTypeValue,
    #[error("invalid group operation type value")]
    InvalidGroupOperationTypeValue,
    #[error("node array length is not a valid tree size")]
    InvalidTreeSize,

    // Underlying primitive failure.
    #[error("signature error: {0}")]
    Signature(#[from] signature::Error),
    #[error("invalid public key encoding")]
    InvalidPublicKey,
    #[error("invalid private key encoding")]
    InvalidPrivateKey,
    #[error("crypto backend error: {0}")]
    RustCryptoError(String),
    #[error("ciphertext shorter than the authentication tag")]
    CiphertextTooShort,

    // Well-formed input that violates the protocol.
    #[error("unsupported cipher suite")]
    UnsupportedCipherSuite,
    #[error("unsupported protocol version")]
    UnsupportedProtocolVersion,
    #[error("mismatched cipher suites")]
    CipherSuiteMismatch,
    #[error("handshake prior epoch does not match the current epoch")]
    WrongEpoch,
    #[error("signer index is blank or out of range")]
    UnknownSigner,
    #[error("handshake signature is invalid")]
    InvalidSignature,
    #[error("confirmation mac mismatch")]
    ConfirmationMismatch,
    #[error("welcome info hash does not match the prior group state")]
    WelcomeInfoHashMismatch,
    #[error("no init key for the group's cipher suite")]
    NoMatchingInitKey,
    #[error("add would overwrite an occupied leaf")]
    DuplicateLeaf,
    #[error("no path ciphertext could be decrypted")]
    UndecryptablePathSecret,
    #[error("direct path does not match the sender's tree position")]
    InvalidDirectPath,
    #[error("this member has been removed from the group")]
    Removed,
    #[error("cannot process a handshake created at this leaf")]
    OwnHandshake,
    #[error("operation requires a leaf position in the group")]
    PreliminaryGroupState,
    #[error("epoch counter is at its maximum")]
    EpochOverflow,

    // Caller misuse.
    #[error("invalid AES key size")]
    InvalidAeadKeySize,
    #[error("invalid AES-GCM nonce size")]
    InvalidAeadNonceSize,
    #[error("requested output length exceeds the hash length")]
    ExpandOutputTooLong,
    #[error("invalid secret length")]
    InvalidSecretSize,
    #[error("leaf index out of range")]
    LeafIndexOutOfRange,
    #[error("leaf is blank")]
    BlankLeaf,
    #[error("credential does not match the identity key")]
    CredentialKeyMismatch,
}
