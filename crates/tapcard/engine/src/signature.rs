//! Card signature normalization and binding checks

use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use nexum_tapcard::RawSignature;

use crate::{Error, Result};

/// Parse an `r || s` card signature and move `s` into the low half of the curve order
pub(crate) fn normalized(raw: &RawSignature) -> Result<Signature> {
    let signature =
        Signature::from_slice(raw).map_err(|_| Error::SignatureFormat("not a valid r || s pair"))?;
    Ok(signature.normalize_s().unwrap_or(signature))
}

/// Normalize a signature and check it was made by `key` over `digest`
///
/// Returns the recovery id that yields `key`.
pub(crate) fn bind(
    key: &VerifyingKey,
    digest: &[u8],
    raw: &RawSignature,
) -> Result<(Signature, RecoveryId)> {
    let signature = normalized(raw)?;
    let recovery_id = RecoveryId::trial_recovery_from_prehash(key, digest, &signature)
        .map_err(|_| Error::SignatureFormat("signature does not bind the digest"))?;
    Ok((signature, recovery_id))
}

/// Check the number of signatures against the number of digests
pub(crate) fn expect_count(signatures: &[RawSignature], expected: usize) -> Result<()> {
    if signatures.len() != expected {
        return Err(Error::SignatureFormat(
            "signature count does not match digest count",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::SigningKey;
    use k256::ecdsa::signature::hazmat::PrehashSigner;

    #[test]
    fn test_high_s_is_normalized_and_bound() {
        let key = SigningKey::random(&mut rand_v8::thread_rng());
        let digest = [7u8; 32];
        let signature: Signature = key.sign_prehash(&digest).unwrap();

        // Flip s into the high half; the card may answer either form.
        let high = Signature::from_scalars(signature.r(), -*signature.s()).unwrap();
        let raw: RawSignature = high.to_bytes().as_slice().try_into().unwrap();

        let (bound, _) = bind(key.verifying_key(), &digest, &raw).unwrap();
        assert!(bound.normalize_s().is_none());

        let other = [8u8; 32];
        assert!(matches!(
            bind(key.verifying_key(), &other, &raw),
            Err(Error::SignatureFormat(_))
        ));
    }
}
