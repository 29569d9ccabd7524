use crate::crypto::cipher_suite::SignatureScheme;
use crate::crypto::{HpkePrivateKey, HpkePublicKey, SignaturePrivateKey, SignaturePublicKey};

/// A DH key pair used for path encryption. The private half never leaves the
/// member that derived it.
#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct HpkeKeyPair {
    pub private_key: HpkePrivateKey,
    pub public_key: HpkePublicKey,
}

/// A long-lived signing identity.
#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct SignatureKeyPair {
    pub private_key: SignaturePrivateKey,
    pub public_key: SignaturePublicKey,
    pub signature_scheme: SignatureScheme,
}
