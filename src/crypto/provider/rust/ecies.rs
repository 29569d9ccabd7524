use aes_gcm::aead::consts::U12;
use aes_gcm::{aead::AeadInPlace, Aes128Gcm, Key as AesKey, KeyInit, Nonce};
use bytes::{Bytes, BytesMut};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use p256::elliptic_curve::ops::Reduce;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use sha2::Sha256;

use crate::crypto::key_pair::HpkeKeyPair;
use crate::crypto::provider::{hash_to_group, Aead, HpkeSuite, Kdf, Kem};
use crate::crypto::{HpkeCiphertext, HpkePrivateKey, HpkePublicKey, Key};
use crate::utilities::error::{Error, Result};
use crate::utilities::serde::{serialize_opaque, write_uint};

const AEAD_KEY_SIZE: usize = 16;
const AEAD_NONCE_SIZE: usize = 12;

#[derive(Default, Debug, Copy, Clone, Eq, PartialEq)]
pub(super) struct HpkeSuiteWrapper(pub(super) HpkeSuite);

fn p256_secret_from_seed(seed: &[u8]) -> Result<p256::SecretKey> {
    let digest = hash_to_group(seed);
    let scalar = <p256::Scalar as Reduce<p256::U256>>::reduce_bytes(p256::FieldBytes::from_slice(
        &digest,
    ));
    let scalar = Option::<p256::NonZeroScalar>::from(p256::NonZeroScalar::new(scalar))
        .ok_or(Error::Crypto("derived zero scalar"))?;
    Ok(p256::SecretKey::from(scalar))
}

fn p256_agree(private_key: &[u8], public_key: &[u8]) -> Result<[u8; 32]> {
    let sk = p256::SecretKey::from_slice(private_key)
        .map_err(|_| Error::Crypto("invalid p256 private key"))?;
    let pk = p256::PublicKey::from_sec1_bytes(public_key)
        .map_err(|_| Error::Crypto("invalid p256 public key"))?;
    let shared = p256::ecdh::diffie_hellman(sk.to_nonzero_scalar(), pk.as_affine());
    let mut out = [0u8; 32];
    out.copy_from_slice(shared.raw_secret_bytes().as_slice());
    Ok(out)
}

fn x25519_key_bytes(data: &[u8]) -> Result<[u8; 32]> {
    data.try_into()
        .map_err(|_| Error::Crypto("invalid x25519 key length"))
}

fn x25519_agree(private_key: &[u8], public_key: &[u8]) -> Result<[u8; 32]> {
    let sk = x25519_dalek::StaticSecret::from(x25519_key_bytes(private_key)?);
    let pk = x25519_dalek::PublicKey::from(x25519_key_bytes(public_key)?);
    Ok(*sk.diffie_hellman(&pk).as_bytes())
}

/// `key = HKDF-Expand(shared, ECIESLabel(Length, "mls10 ecies " + Label))`
/// where the label struct is a u16 length followed by the label as
/// `opaque<1>`.
fn ecies_info(label: &[u8], length: usize) -> Result<Bytes> {
    let mut full_label = Vec::with_capacity(12 + label.len());
    full_label.extend_from_slice(b"mls10 ecies ");
    full_label.extend_from_slice(label);

    let mut info = BytesMut::new();
    write_uint(length as u64, 2, &mut info)?;
    serialize_opaque(&full_label, 1, &mut info)?;
    Ok(info.freeze())
}

impl HpkeSuiteWrapper {
    fn agree(&self, private_key: &[u8], public_key: &[u8]) -> Result<[u8; 32]> {
        match self.0.kem {
            Kem::KEM_P256_SHA256 => p256_agree(private_key, public_key),
            Kem::KEM_X25519_SHA256 => x25519_agree(private_key, public_key),
        }
    }

    fn ecies_key_nonce(&self, shared: &[u8]) -> Result<(Bytes, Bytes)> {
        let key = self.kdf_expand_inner(shared, &ecies_info(b"key", AEAD_KEY_SIZE)?, AEAD_KEY_SIZE)?;
        let nonce = self.kdf_expand_inner(
            shared,
            &ecies_info(b"nonce", AEAD_NONCE_SIZE)?,
            AEAD_NONCE_SIZE,
        )?;
        Ok((key, nonce))
    }

    fn kdf_expand_inner(&self, secret: &[u8], info: &[u8], length: usize) -> Result<Bytes> {
        match self.0.kdf {
            Kdf::KDF_HKDF_SHA256 => {
                let hkdf =
                    Hkdf::<Sha256>::from_prk(secret).map_err(|_| Error::Crypto("hkdf prk"))?;
                let mut out = vec![0u8; length];
                hkdf.expand(info, &mut out)
                    .map_err(|_| Error::Crypto("hkdf expand length"))?;
                Ok(Bytes::from(out))
            }
        }
    }
}

impl crate::crypto::provider::Hpke for HpkeSuiteWrapper {
    fn derive_key_pair(&self, secret: &[u8]) -> Result<HpkeKeyPair> {
        match self.0.kem {
            Kem::KEM_P256_SHA256 => {
                let secret_key = p256_secret_from_seed(secret)?;
                let public = secret_key.public_key().to_encoded_point(false);
                Ok(HpkeKeyPair {
                    private_key: Key::new(secret_key.to_bytes().to_vec()),
                    public_key: Key::new(public.as_bytes().to_vec()),
                })
            }
            Kem::KEM_X25519_SHA256 => {
                let digest = hash_to_group(secret);
                let secret_key = x25519_dalek::StaticSecret::from(digest);
                let public_key = x25519_dalek::PublicKey::from(&secret_key);
                Ok(HpkeKeyPair {
                    private_key: Key::new(secret_key.to_bytes().to_vec()),
                    public_key: Key::new(public_key.as_bytes().to_vec()),
                })
            }
        }
    }

    fn kdf_extract(&self, salt: &[u8], ikm: &[u8]) -> Result<Bytes> {
        match self.0.kdf {
            Kdf::KDF_HKDF_SHA256 => {
                let mut m = <Hmac<Sha256> as hmac::digest::KeyInit>::new_from_slice(salt)
                    .map_err(|_| Error::Crypto("invalid hmac key"))?;
                m.update(ikm);
                Ok(Bytes::from(m.finalize().into_bytes().to_vec()))
            }
        }
    }

    fn kdf_expand(&self, secret: &[u8], info: &[u8], length: usize) -> Result<Bytes> {
        self.kdf_expand_inner(secret, info, length)
    }

    fn aead_key_size(&self) -> usize {
        match self.0.aead {
            Aead::AEAD_AES128GCM => AEAD_KEY_SIZE,
        }
    }

    fn aead_nonce_size(&self) -> usize {
        match self.0.aead {
            Aead::AEAD_AES128GCM => AEAD_NONCE_SIZE,
        }
    }

    fn seal(
        &self,
        recipient: &HpkePublicKey,
        plaintext: &[u8],
        ephemeral_secret: &[u8],
    ) -> Result<HpkeCiphertext> {
        let ephemeral = self.derive_key_pair(ephemeral_secret)?;
        let shared = self.agree(ephemeral.private_key.as_ref(), recipient.as_ref())?;
        let (key, nonce) = self.ecies_key_nonce(&shared)?;

        let ciphertext = match self.0.aead {
            Aead::AEAD_AES128GCM => {
                let key: &AesKey<Aes128Gcm> = key.as_ref().into();
                let nonce: &Nonce<U12> = nonce.as_ref().into();

                let cipher = Aes128Gcm::new(key);
                let mut in_out = plaintext.to_vec();
                cipher
                    .encrypt_in_place(nonce, &[], &mut in_out)
                    .map_err(|_| Error::Crypto("aead encrypt"))?;
                Bytes::from(in_out)
            }
        };

        Ok(HpkeCiphertext {
            kem_output: ephemeral.public_key,
            ciphertext,
        })
    }

    fn open(&self, secret_key: &HpkePrivateKey, input: &HpkeCiphertext) -> Result<Bytes> {
        let shared = self.agree(secret_key.as_ref(), input.kem_output.as_ref())?;
        let (key, nonce) = self.ecies_key_nonce(&shared)?;

        match self.0.aead {
            Aead::AEAD_AES128GCM => {
                let key: &AesKey<Aes128Gcm> = key.as_ref().into();
                let nonce: &Nonce<U12> = nonce.as_ref().into();

                let cipher = Aes128Gcm::new(key);
                let mut in_out = input.ciphertext.to_vec();
                cipher
                    .decrypt_in_place(nonce, &[], &mut in_out)
                    .map_err(|_| Error::DecryptError)?;
                Ok(Bytes::from(in_out))
            }
        }
    }
}
