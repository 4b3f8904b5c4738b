//! AWS Signature Version 4 primitives for POST policies

use super::SignerError;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Algorithm identifier sent as `x-amz-algorithm`
pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, SignerError> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| SignerError::Signing(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Derive the signing key for `date` (`YYYYMMDD`), `region` and `service`
pub fn signing_key(
    secret_access_key: &str,
    date: &str,
    region: &str,
    service: &str,
) -> Result<Vec<u8>, SignerError> {
    let k_secret = format!("AWS4{}", secret_access_key);
    let k_date = hmac_sha256(k_secret.as_bytes(), date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

/// Hex signature of `string_to_sign` under `signing_key`
pub fn sign(signing_key: &[u8], string_to_sign: &str) -> Result<String, SignerError> {
    Ok(hex::encode(hmac_sha256(signing_key, string_to_sign.as_bytes())?))
}

/// `x-amz-credential` value
pub fn credential_scope(access_key_id: &str, date: &str, region: &str, service: &str) -> String {
    format!("{}/{}/{}/{}/aws4_request", access_key_id, date, region, service)
}
