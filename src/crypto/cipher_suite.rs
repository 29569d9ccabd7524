//! Cipher suites and signature schemes.
//!
//! A suite fixes the DH group, signature scheme, hash, AEAD and the derived
//! key and nonce lengths. Every cryptographic operation in the crate is
//! parameterised by one of these values; nothing is fixed at compile time.

use std::fmt::{Display, Formatter};

use crate::utilities::error::{Error, Result};

#[allow(non_camel_case_types)]
#[derive(Default, Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(u16)]
pub enum CipherSuite {
    #[default]
    /// ECDH over P-256 with SHA-256, AES-128-GCM and ECDSA signatures.
    P256_SHA256_AES128GCM = 0x0000,
    /// X25519 with SHA-256, AES-128-GCM and Ed25519 signatures.
    X25519_SHA256_AES128GCM = 0x0001,
}

impl CipherSuite {
    /// The signature scheme paired with this suite's DH group.
    pub fn signature_scheme(self) -> SignatureScheme {
        match self {
            CipherSuite::P256_SHA256_AES128GCM => SignatureScheme::P256_SHA256,
            CipherSuite::X25519_SHA256_AES128GCM => SignatureScheme::Ed25519,
        }
    }
}

impl TryFrom<u16> for CipherSuite {
    type Error = Error;

    fn try_from(v: u16) -> Result<Self> {
        match v {
            0x0000 => Ok(CipherSuite::P256_SHA256_AES128GCM),
            0x0001 => Ok(CipherSuite::X25519_SHA256_AES128GCM),
            _ => Err(Error::UnknownSuite),
        }
    }
}

impl From<CipherSuite> for u16 {
    fn from(val: CipherSuite) -> u16 {
        val as u16
    }
}

impl Display for CipherSuite {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

#[allow(non_camel_case_types)]
#[derive(Default, Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(u16)]
pub enum SignatureScheme {
    #[default]
    /// ECDSA over P-256 with SHA-256.
    P256_SHA256 = 0x0403,
    /// EdDSA over edwards25519.
    Ed25519 = 0x0807,
}

impl TryFrom<u16> for SignatureScheme {
    type Error = Error;

    fn try_from(v: u16) -> Result<Self> {
        match v {
            0x0403 => Ok(SignatureScheme::P256_SHA256),
            0x0807 => Ok(SignatureScheme::Ed25519),
            _ => Err(Error::UnknownVariant("SignatureScheme")),
        }
    }
}

impl From<SignatureScheme> for u16 {
    fn from(val: SignatureScheme) -> u16 {
        val as u16
    }
}

#[derive(Default, Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum ProtocolVersion {
    #[default]
    Mls10 = 0xFF,
}

impl TryFrom<u8> for ProtocolVersion {
    type Error = Error;

    fn try_from(v: u8) -> Result<Self> {
        match v {
            0xFF => Ok(ProtocolVersion::Mls10),
            _ => Err(Error::UnknownVariant("ProtocolVersion")),
        }
    }
}

impl From<ProtocolVersion> for u8 {
    fn from(val: ProtocolVersion) -> u8 {
        val as u8
    }
}
