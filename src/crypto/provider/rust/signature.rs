use bytes::Bytes;
use p256::elliptic_curve::ops::Reduce;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use signature::{Signer, Verifier};

use crate::crypto::cipher_suite::SignatureScheme;
use crate::crypto::key_pair::SignatureKeyPair;
use crate::crypto::provider::hash_to_group;
use crate::crypto::{Key, SignaturePrivateKey, SignaturePublicKey};
use crate::utilities::error::{Error, Result};

#[derive(Default, Debug, Copy, Clone, Eq, PartialEq)]
pub(super) struct SignatureSchemeWrapper(pub(super) SignatureScheme);

impl crate::crypto::provider::Signature for SignatureSchemeWrapper {
    fn derive_key_pair(&self, secret: &[u8]) -> Result<SignatureKeyPair> {
        match self.0 {
            SignatureScheme::P256_SHA256 => {
                let digest = hash_to_group(secret);
                let scalar = <p256::Scalar as Reduce<p256::U256>>::reduce_bytes(
                    p256::FieldBytes::from_slice(&digest),
                );
                let scalar = Option::<p256::NonZeroScalar>::from(p256::NonZeroScalar::new(scalar))
                    .ok_or(Error::Crypto("derived zero scalar"))?;
                let secret_key = p256::SecretKey::from(scalar);
                let public = secret_key.public_key().to_encoded_point(false);
                Ok(SignatureKeyPair {
                    private_key: Key::new(secret_key.to_bytes().to_vec()),
                    public_key: Key::new(public.as_bytes().to_vec()),
                    signature_scheme: self.0,
                })
            }
            SignatureScheme::Ed25519 => {
                let digest = hash_to_group(secret);
                let signing_key = ed25519_dalek::SigningKey::from_bytes(&digest);
                Ok(SignatureKeyPair {
                    private_key: Key::new(digest.to_vec()),
                    public_key: Key::new(signing_key.verifying_key().to_bytes().to_vec()),
                    signature_scheme: self.0,
                })
            }
        }
    }

    fn sign(&self, private_key: &SignaturePrivateKey, message: &[u8]) -> Result<Bytes> {
        match self.0 {
            SignatureScheme::P256_SHA256 => {
                let secret_key = p256::SecretKey::from_slice(private_key.as_ref())
                    .map_err(|_| Error::Crypto("invalid p256 signing key"))?;
                let signing_key = p256::ecdsa::SigningKey::from(&secret_key);
                let signature: p256::ecdsa::Signature = signing_key.sign(message);
                Ok(Bytes::from(signature.to_bytes().to_vec()))
            }
            SignatureScheme::Ed25519 => {
                let bytes: [u8; 32] = private_key
                    .as_ref()
                    .try_into()
                    .map_err(|_| Error::Crypto("invalid ed25519 signing key"))?;
                let signing_key = ed25519_dalek::SigningKey::from_bytes(&bytes);
                let signature: ed25519_dalek::Signature = signing_key.sign(message);
                Ok(Bytes::from(signature.to_bytes().to_vec()))
            }
        }
    }

    fn verify(
        &self,
        public_key: &SignaturePublicKey,
        message: &[u8],
        signature: &[u8],
    ) -> Result<()> {
        match self.0 {
            SignatureScheme::P256_SHA256 => {
                let verifying_key = p256::ecdsa::VerifyingKey::from_sec1_bytes(public_key.as_ref())
                    .map_err(|_| Error::InvalidSignature)?;
                let signature = p256::ecdsa::Signature::from_slice(signature)
                    .map_err(|_| Error::InvalidSignature)?;
                verifying_key
                    .verify(message, &signature)
                    .map_err(|_| Error::InvalidSignature)
            }
            SignatureScheme::Ed25519 => {
                let bytes: [u8; 32] = public_key
                    .as_ref()
                    .try_into()
                    .map_err(|_| Error::InvalidSignature)?;
                let verifying_key = ed25519_dalek::VerifyingKey::from_bytes(&bytes)
                    .map_err(|_| Error::InvalidSignature)?;
                let signature = ed25519_dalek::Signature::from_slice(signature)
                    .map_err(|_| Error::InvalidSignature)?;
                verifying_key
                    .verify(message, &signature)
                    .map_err(|_| Error::InvalidSignature)
            }
        }
    }
}
