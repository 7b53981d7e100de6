//! Request signing schemes used by the payment providers.
//!
//! Both schemes sign the same canonical string: every non-empty parameter except `sign` and `sign_type`, sorted by
//! key, joined as `k1=v1&k2=v2`.
use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub fn canonical_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .filter(|(k, v)| !v.is_empty() && k.as_str() != "sign" && k.as_str() != "sign_type")
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// The Epay scheme: lower-case hex MD5 of the canonical string with the merchant key appended.
pub fn md5_sign(params: &BTreeMap<String, String>, key: &str) -> String {
    let payload = format!("{}{key}", canonical_query(params));
    format!("{:x}", md5::compute(payload.as_bytes()))
}

/// Checks an Epay signature in either hex case. The digests are compared in constant time.
pub fn md5_verify(params: &BTreeMap<String, String>, key: &str, signature: &str) -> bool {
    let Some(received) = decode_hex(signature.trim()) else {
        return false;
    };
    let payload = format!("{}{key}", canonical_query(params));
    constant_time_eq(&md5::compute(payload.as_bytes()).0, &received)
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    (0..s.len()).step_by(2).map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok()).collect()
}

/// Compares two byte strings without exiting early on the first difference. Only the length is leaked.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Base64-encoded HMAC-SHA256 of the canonical string, keyed with a shared secret.
pub fn hmac_sign(params: &BTreeMap<String, String>, secret: &str) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        // HMAC accepts keys of any length
        Err(_) => return String::new(),
    };
    mac.update(canonical_query(params).as_bytes());
    base64::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a base64 HMAC-SHA256 signature.
pub fn hmac_verify(params: &BTreeMap<String, String>, secret: &str, signature: &str) -> bool {
    let Ok(expected) = base64::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(canonical_query(params).as_bytes());
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod test {
    use super::*;

    fn params() -> BTreeMap<String, String> {
        [
            ("pid", "1001"),
            ("out_trade_no", "20241001000001"),
            ("money", "1.00"),
            ("name", "VIP"),
            ("sign", "ignored"),
            ("sign_type", "MD5"),
            ("empty", ""),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn canonical_form() {
        assert_eq!(canonical_query(&params()), "money=1.00&name=VIP&out_trade_no=20241001000001&pid=1001");
    }

    #[test]
    fn md5_signatures() {
        let sig = md5_sign(&params(), "key");
        let expected = format!("{:x}", md5::compute("money=1.00&name=VIP&out_trade_no=20241001000001&pid=1001key"));
        assert_eq!(sig, expected);
        assert!(md5_verify(&params(), "key", &sig.to_ascii_uppercase()));
        assert!(!md5_verify(&params(), "other", &sig));
    }

    #[test]
    fn md5_signatures_must_match_every_byte() {
        let sig = md5_sign(&params(), "key");
        assert!(md5_verify(&params(), "key", &format!(" {sig}\n")));
        let mut last_digit_changed = sig.clone();
        let last = if sig.ends_with('0') { "1" } else { "0" };
        last_digit_changed.replace_range(31.., last);
        assert!(!md5_verify(&params(), "key", &last_digit_changed));
        assert!(!md5_verify(&params(), "key", &sig[..30]));
        assert!(!md5_verify(&params(), "key", &format!("{sig}00")));
        assert!(!md5_verify(&params(), "key", "zz"));
        assert!(!md5_verify(&params(), "key", "é"));
        assert!(!md5_verify(&params(), "key", ""));
    }

    #[test]
    fn constant_time_comparison() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn hmac_signatures() {
        let sig = hmac_sign(&params(), "secret");
        assert!(hmac_verify(&params(), "secret", &sig));
        assert!(!hmac_verify(&params(), "wrong", &sig));
        assert!(!hmac_verify(&params(), "secret", "not base64!"));
        let mut tampered = params();
        tampered.insert("money".into(), "0.01".into());
        assert!(!hmac_verify(&tampered, "secret", &sig));
    }
}
