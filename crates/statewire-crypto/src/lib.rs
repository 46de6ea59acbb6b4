//! Cryptographic primitives for statewire.
//!
//! Channel state authorization is recoverable ECDSA over secp256k1: a
//! party signs the keccak digest of the canonical state encoding, and
//! anyone holding the 65-byte signature can recover the signer's
//! settlement address without a separate public-key exchange. This is
//! the scheme the settlement contract itself verifies, so a signature
//! accepted off-chain is exactly as strong as one accepted on-chain.
//!
//! Layout:
//! - [`hash`]: keccak-256 and SHA-256 digests
//! - [`keys`]: key material and address derivation
//! - [`payload`]: the canonical byte encoding both parties sign
//! - [`sig`]: sign / recover / verify over that encoding

pub mod hash;
pub mod keys;
pub mod payload;
pub mod sig;

pub use hash::{keccak256, sha256};
pub use keys::{KeyPair, Signer};
pub use payload::StatePayload;
pub use sig::{recover_signer, verify_signature};
