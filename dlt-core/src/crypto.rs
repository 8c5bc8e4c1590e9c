//! Cryptographic operations for the permit flow
//!
//! This module provides:
//! - Keccak-256 hashing
//! - EIP-712 structured-data hashing (domain separator, permit struct hash,
//!   signing digest)
//! - secp256k1 signature recovery with low-S enforcement
//! - A `KeyPair` utility so holders can produce permit signatures offline

use crate::{
    error::{Error, Result},
    types::{Address, Amount, MainId, PermitSignature, SubId},
};
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use sha3::{Digest, Keccak256};
use std::fmt;

/// EIP-712 domain type descriptor; its hash anchors every domain separator
const DOMAIN_TYPE: &str =
    "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";

/// Permit struct type descriptor; the field order fixes the hash layout
const PERMIT_TYPE: &str = "Permit(address owner,address spender,uint256 mainId,uint256 subId,\
uint256 amount,uint256 nonce,uint256 deadline)";

/// Half of the secp256k1 curve order; S must lie strictly below it
/// (malleability rejection)
const SECP256K1_HALF_ORDER: [u8; 32] = [
    0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0x5D, 0x57, 0x6E, 0x73, 0x57, 0xA4, 0x50, 0x1D, 0xDF, 0xE9, 0x2F, 0x46, 0x68, 0x1B, 0x20, 0xA0,
];

/// Hash arbitrary bytes with Keccak-256
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

// 32-byte word encoders; every structured-data field is left-padded
// big-endian, addresses occupy the low 20 bytes.

fn word_u64(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

fn word_u128(value: u128) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

fn word_address(address: Address) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_bytes());
    word
}

/// Compute the domain separator binding signatures to one ledger instance
///
/// Inputs are the ledger's human-readable name, its version string, the
/// network/chain identifier, and the ledger's own address. Computed once at
/// construction and immutable afterwards.
pub fn domain_separator(name: &str, version: &str, chain_id: u64, ledger: Address) -> [u8; 32] {
    let mut buffer = Vec::with_capacity(32 * 5);
    buffer.extend_from_slice(&keccak256(DOMAIN_TYPE.as_bytes()));
    buffer.extend_from_slice(&keccak256(name.as_bytes()));
    buffer.extend_from_slice(&keccak256(version.as_bytes()));
    buffer.extend_from_slice(&word_u64(chain_id));
    buffer.extend_from_slice(&word_address(ledger));
    keccak256(&buffer)
}

/// Hash one permit message (without the domain)
#[allow(clippy::too_many_arguments)]
pub fn permit_struct_hash(
    owner: Address,
    spender: Address,
    main_id: MainId,
    sub_id: SubId,
    amount: Amount,
    nonce: u64,
    deadline: u64,
) -> [u8; 32] {
    let mut buffer = Vec::with_capacity(32 * 8);
    buffer.extend_from_slice(&keccak256(PERMIT_TYPE.as_bytes()));
    buffer.extend_from_slice(&word_address(owner));
    buffer.extend_from_slice(&word_address(spender));
    buffer.extend_from_slice(&word_u64(main_id));
    buffer.extend_from_slice(&word_u64(sub_id));
    buffer.extend_from_slice(&word_u128(amount));
    buffer.extend_from_slice(&word_u64(nonce));
    buffer.extend_from_slice(&word_u64(deadline));
    keccak256(&buffer)
}

/// Combine a domain separator and a struct hash into the digest that is
/// actually signed (the two-step `0x19 0x01` framing)
pub fn permit_digest(domain: &[u8; 32], struct_hash: &[u8; 32]) -> [u8; 32] {
    let mut buffer = Vec::with_capacity(2 + 64);
    buffer.extend_from_slice(&[0x19, 0x01]);
    buffer.extend_from_slice(domain);
    buffer.extend_from_slice(struct_hash);
    keccak256(&buffer)
}

/// S values in the upper half of the curve order are rejected: for every
/// signature (r, s) there is a sibling (r, n - s), and admitting both would
/// let a third party mint a "new" signature from a captured one.
fn is_low_s(s: &[u8; 32]) -> bool {
    for (byte, half) in s.iter().zip(SECP256K1_HALF_ORDER.iter()) {
        match byte.cmp(half) {
            std::cmp::Ordering::Less => return true,
            std::cmp::Ordering::Greater => return false,
            std::cmp::Ordering::Equal => {}
        }
    }
    false
}

/// Derive the 20-byte account address from a public key: the trailing bytes
/// of the Keccak-256 of its uncompressed form
pub fn address_from_key(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    // Skip the 0x04 uncompressed-point tag
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&hash[12..]);
    Address::new(bytes)
}

/// Recover the signing account from a digest and a recoverable signature
///
/// Accepts recovery ids 0, 1, 27, and 28; anything else, a malleable
/// (high-S) signature, or a failed curve recovery yields
/// [`Error::InvalidSignature`].
pub fn recover_address(digest: &[u8; 32], signature: &PermitSignature) -> Result<Address> {
    let recovery_id = match signature.v {
        0 | 27 => RecoveryId::try_from(0u8),
        1 | 28 => RecoveryId::try_from(1u8),
        _ => return Err(Error::InvalidSignature),
    }
    .map_err(|_| Error::InvalidSignature)?;

    if !is_low_s(&signature.s) {
        return Err(Error::InvalidSignature);
    }

    let mut bytes = [0u8; 64];
    bytes[..32].copy_from_slice(&signature.r);
    bytes[32..].copy_from_slice(&signature.s);
    let parsed = EcdsaSignature::from_slice(&bytes).map_err(|_| Error::InvalidSignature)?;

    let recovered = VerifyingKey::recover_from_prehash(digest, &parsed, recovery_id)
        .map_err(|_| Error::InvalidSignature)?;
    Ok(address_from_key(&recovered))
}

/// secp256k1 key pair for producing permit signatures offline
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut rand::thread_rng()),
        }
    }

    /// Create from a 32-byte seed, deterministically
    ///
    /// Fails when the seed is not a valid secret scalar.
    pub fn from_seed(seed: &[u8; 32]) -> Result<Self> {
        let signing_key = SigningKey::from_slice(seed)
            .map_err(|_| Error::Config("seed is not a valid secret key".to_string()))?;
        Ok(Self { signing_key })
    }

    /// The account address this key controls
    pub fn address(&self) -> Address {
        address_from_key(self.signing_key.verifying_key())
    }

    /// Sign a 32-byte digest, normalizing to low-S form and flipping the
    /// recovery id when normalization inverted S
    pub fn sign_digest(&self, digest: &[u8; 32]) -> PermitSignature {
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(digest)
            .expect("signing a 32-byte digest cannot fail");

        let mut v = recovery_id.to_byte() + 27;
        let signature = match signature.normalize_s() {
            Some(normalized) => {
                v = if v == 27 { 28 } else { 27 };
                normalized
            }
            None => signature,
        };

        let bytes = signature.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        PermitSignature { r, s, v }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPair({})", self.address())
    }
}
