use crate::crypto::cipher_suite::{CipherSuite, ProtocolVersion};

/// Protocol version and cipher suite a group is created with. Fixed for the
/// lifetime of the group.
#[derive(Default, Debug, Clone, Copy, Eq, PartialEq)]
pub struct CryptoConfig {
    pub version: ProtocolVersion,
    pub cipher_suite: CipherSuite,
}

#[derive(Default, Debug, Clone, Copy, Eq, PartialEq)]
pub struct GroupConfig {
    pub crypto_config: CryptoConfig,
}

impl GroupConfig {
    pub fn with_cipher_suite(cipher_suite: CipherSuite) -> Self {
        Self {
            crypto_config: CryptoConfig {
                version: ProtocolVersion::Mls10,
                cipher_suite,
            },
        }
    }
}
