//! Recoverable signature verification.
//!
//! Signatures are 65 bytes: `r ‖ s ‖ v` with `v = recovery_id + 27`.
//! Verification never takes a public key — it recovers the signer's
//! address from the signature and compares it against the expected
//! party, exactly as the settlement contract does on-chain.

use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, VerifyingKey};
use sha3::{Digest, Keccak256};

use statewire_types::{Address, Result, Signature, StatewireError};

use crate::keys::address_of;

/// The prefixed digest actually fed to ECDSA, binding the signature to
/// this signing scheme so it cannot double as a raw ledger transaction.
pub(crate) fn eth_signed_digest(digest: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(b"\x19Ethereum Signed Message:\n32");
    hasher.update(digest);
    hasher.finalize().into()
}

/// Recover the settlement address that produced `sig` over `digest`.
pub fn recover_signer(digest: &[u8; 32], sig: &Signature) -> Result<Address> {
    let bytes = sig.as_bytes();
    if bytes.len() != Signature::LEN {
        return Err(StatewireError::InvalidSignature {
            reason: format!("expected {} bytes, got {}", Signature::LEN, bytes.len()),
        });
    }
    let rs = EcdsaSignature::from_slice(&bytes[..64]).map_err(|e| {
        StatewireError::InvalidSignature {
            reason: format!("malformed r/s: {e}"),
        }
    })?;
    let rec_byte = bytes[64].checked_sub(27).ok_or_else(|| {
        StatewireError::InvalidSignature {
            reason: format!("recovery byte {} below 27", bytes[64]),
        }
    })?;
    let rec_id = RecoveryId::from_byte(rec_byte).ok_or_else(|| {
        StatewireError::InvalidSignature {
            reason: format!("invalid recovery id {rec_byte}"),
        }
    })?;

    let prehash = eth_signed_digest(digest);
    let key = VerifyingKey::recover_from_prehash(&prehash, &rs, rec_id).map_err(|e| {
        StatewireError::InvalidSignature {
            reason: format!("recovery failed: {e}"),
        }
    })?;
    Ok(address_of(&key))
}

/// Check that `sig` over `digest` recovers to `expected`.
pub fn verify_signature(digest: &[u8; 32], sig: &Signature, expected: &Address) -> Result<()> {
    let recovered = recover_signer(digest, sig)?;
    if recovered == *expected {
        Ok(())
    } else {
        Err(StatewireError::InvalidSignature {
            reason: format!("recovered {recovered}, expected {expected}"),
        })
    }
}
