// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Key handling for the relayer and for provisioned binding wallets.
//!
//! The relayer key arrives either as raw hex or as a PKCS#8/SEC1 PEM file.
//! Binding wallets are generated here and persisted as PEM by the key vault.

use alloy::{primitives::Address, signers::local::PrivateKeySigner};
use k256::SecretKey;

/// Errors raised while parsing or generating keys.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Key generation failed: {0}")]
    Generation(String),
}

/// Parse a private key from PEM format to hex string.
///
/// # Returns
/// * `Ok(String)` - Hex-encoded private key (64 characters, no 0x prefix)
/// * `Err(KeyError)` - If PEM parsing fails
pub fn pem_to_hex(pem_bytes: &[u8]) -> Result<String, KeyError> {
    let pem_str = std::str::from_utf8(pem_bytes)
        .map_err(|e| KeyError::InvalidPrivateKey(format!("Invalid UTF-8: {}", e)))?;

    let pem = pem::parse(pem_str)
        .map_err(|e| KeyError::InvalidPrivateKey(format!("Invalid PEM: {}", e)))?;

    let secret_key = SecretKey::from_sec1_der(pem.contents())
        .or_else(|_| parse_pkcs8_to_secret_key(pem.contents()))
        .map_err(|e| KeyError::InvalidPrivateKey(format!("Invalid key format: {}", e)))?;

    Ok(alloy::hex::encode(secret_key.to_bytes()))
}

fn parse_pkcs8_to_secret_key(der: &[u8]) -> Result<SecretKey, String> {
    use k256::pkcs8::DecodePrivateKey;
    SecretKey::from_pkcs8_der(der).map_err(|e| e.to_string())
}

/// Create a signer from a hex private key (with or without `0x`).
pub fn signer_from_hex(private_key_hex: &str) -> Result<PrivateKeySigner, KeyError> {
    let trimmed = private_key_hex.trim();
    let hex = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let key_bytes =
        alloy::hex::decode(hex).map_err(|e| KeyError::InvalidPrivateKey(e.to_string()))?;

    PrivateKeySigner::from_slice(&key_bytes)
        .map_err(|e| KeyError::InvalidPrivateKey(e.to_string()))
}

/// Create a signer from PEM-encoded private key bytes.
pub fn signer_from_pem(pem_bytes: &[u8]) -> Result<PrivateKeySigner, KeyError> {
    let hex_key = pem_to_hex(pem_bytes)?;
    signer_from_hex(&hex_key)
}

/// Generate a secp256k1 keypair.
///
/// Returns the PKCS#8 PEM encoding of the private key and the derived EVM
/// address.
pub fn generate_keypair() -> Result<(String, Address), KeyError> {
    use k256::ecdsa::SigningKey;
    use k256::elliptic_curve::rand_core::OsRng;
    use k256::pkcs8::EncodePrivateKey;

    let signing_key = SigningKey::random(&mut OsRng);
    let private_key_pem = signing_key
        .to_pkcs8_pem(k256::pkcs8::LineEnding::LF)
        .map_err(|e| KeyError::Generation(format!("failed to encode private key: {e}")))?;

    let public_key = signing_key.verifying_key().to_encoded_point(false);
    let address = Address::from_raw_public_key(&public_key.as_bytes()[1..]);

    Ok((private_key_pem.to_string(), address))
}
