// Secrets Engine — Crypto primitives
//
// scrypt key derivation, AES-256-GCM authenticated encryption, HMAC-SHA256
// keyed hashing, and CSPRNG helpers. The same master key drives the AEAD,
// the blind name index, and the integrity seal.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use hmac::{Hmac, Mac};
use rand::RngCore;
use scrypt::Params;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::{Error, Result};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Length of the derived master key in bytes (AES-256).
pub const MASTER_KEY_LEN: usize = 32;

/// Length of the on-disk keyfile in bytes.
pub const KEYFILE_LEN: usize = 32;

/// Length of the KDF salt in bytes.
pub const SALT_LEN: usize = 32;

/// AES-GCM IV length in bytes.
pub const IV_LEN: usize = 12;

/// AES-GCM authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

// scrypt parameters: N=2^17 (128 MiB working set), r=8, p=1.
const SCRYPT_LOG_N: u8 = 17;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;

/// The derived master key. Zeroized on drop.
pub type MasterKey = Zeroizing<[u8; MASTER_KEY_LEN]>;

type HmacSha256 = Hmac<Sha256>;

// ─── Key derivation ──────────────────────────────────────────────────────────

/// Derive the master key from the machine identity, the on-disk keyfile, and
/// the per-store salt. The password is `machine_id ‖ keyfile`; the output is
/// a deterministic function of all three inputs.
pub fn derive_master_key(
    machine_id: &str,
    keyfile: &[u8; KEYFILE_LEN],
    salt: &[u8; SALT_LEN],
) -> Result<MasterKey> {
    let mut password = Zeroizing::new(Vec::with_capacity(machine_id.len() + KEYFILE_LEN));
    password.extend_from_slice(machine_id.as_bytes());
    password.extend_from_slice(keyfile);

    let params = Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, MASTER_KEY_LEN)
        .map_err(|e| Error::Initialization(format!("invalid scrypt parameters: {e}")))?;

    let mut key = Zeroizing::new([0u8; MASTER_KEY_LEN]);
    scrypt::scrypt(&password, salt, &params, &mut *key)
        .map_err(|e| Error::Initialization(format!("scrypt derivation failed: {e}")))?;

    Ok(key)
}

// ─── AEAD ────────────────────────────────────────────────────────────────────

/// Encrypt a UTF-8 string under the master key with a fresh random IV.
/// Returns the IV and the ciphertext with the 16-byte tag appended.
pub fn encrypt(master_key: &[u8; MASTER_KEY_LEN], plaintext: &str) -> Result<([u8; IV_LEN], Vec<u8>)> {
    let cipher = build_cipher(master_key)?;

    let mut iv = [0u8; IV_LEN];
    rand::rng().fill_bytes(&mut iv);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext.as_bytes())
        .map_err(|_| Error::Initialization("AEAD encryption failed".to_string()))?;

    Ok((iv, ciphertext))
}

/// Decrypt `ciphertext ‖ tag` under the master key and IV. The optional
/// `key_hash` is truncated into the error for diagnostics; plaintext never
/// appears in error output.
pub fn decrypt(
    master_key: &[u8; MASTER_KEY_LEN],
    iv: &[u8],
    data: &[u8],
    key_hash: Option<&str>,
) -> Result<String> {
    if data.len() < TAG_LEN {
        return Err(decryption_error(key_hash, "ciphertext shorter than the authentication tag"));
    }
    if iv.len() != IV_LEN {
        return Err(decryption_error(key_hash, "unexpected IV length"));
    }

    let cipher = build_cipher(master_key)?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(iv), data)
        .map_err(|_| decryption_error(key_hash, "authentication tag mismatch"))?;

    String::from_utf8(plaintext)
        .map_err(|_| decryption_error(key_hash, "plaintext is not valid UTF-8"))
}

fn build_cipher(master_key: &[u8; MASTER_KEY_LEN]) -> Result<Aes256Gcm> {
    Aes256Gcm::new_from_slice(master_key)
        .map_err(|e| Error::Initialization(format!("invalid AEAD key: {e}")))
}

fn decryption_error(key_hash: Option<&str>, reason: &str) -> Error {
    let key_hash = key_hash
        .map(|h| h.chars().take(16).collect())
        .unwrap_or_else(|| "<unknown>".to_string());
    Error::Decryption {
        key_hash,
        reason: reason.to_string(),
    }
}

// ─── Keyed and plain hashing ─────────────────────────────────────────────────

/// HMAC-SHA256 over `data`, returned as raw bytes.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    // HMAC-SHA256 accepts keys of any length per RFC 2104
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).expect("any key length is valid");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// HMAC-SHA256 over `data` as lowercase hex, 64 chars. Used for the blind
/// name index and the integrity seal.
pub fn hmac_hex(key: &[u8], data: &[u8]) -> String {
    hex::encode(hmac_sha256(key, data))
}

/// Plain SHA-256 over a byte buffer.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// `N` bytes from the CSPRNG. Used for salts and the keyfile.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::rng().fill_bytes(&mut bytes);
    bytes
}

// ─── Tests ───────────────────────────────────────────────────────────────────
