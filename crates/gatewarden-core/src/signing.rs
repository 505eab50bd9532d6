//! Payload signing for the agree button and the `/start` deep link.
//!
//! Both carry the session id as a urlsafe-base64 token (16 bytes → 22 chars,
//! no padding) plus the first 8 bytes of `HMAC-SHA256(secret,
//! "{group_id}:{user_id}:{session_id}")`, base64-encoded to 11 chars. The
//! signature binds the session to its group and user so a callback forged
//! for another session never verifies.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// urlsafe base64 of 16 bytes without padding.
pub const TOKEN_LEN: usize = 22;
/// urlsafe base64 of 8 bytes without padding.
pub const SIG_LEN: usize = 11;

pub fn encode_session_id(session_id: Uuid) -> String {
    URL_SAFE_NO_PAD.encode(session_id.as_bytes())
}

pub fn decode_session_id(token: &str) -> Option<Uuid> {
    let bytes = URL_SAFE_NO_PAD.decode(token).ok()?;
    Uuid::from_slice(&bytes).ok()
}

/// `urlsafeB64NoPad(HMAC-SHA256(secret, data)[:len])`.
pub fn sign(secret: &str, data: &str, len: usize) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(data.as_bytes());
    let digest = mac.finalize().into_bytes();
    URL_SAFE_NO_PAD.encode(&digest[..len])
}

fn session_data(group_id: i64, user_id: i64, session_id: Uuid) -> String {
    format!("{group_id}:{user_id}:{session_id}")
}

pub fn callback_signature(secret: &str, group_id: i64, user_id: i64, session_id: Uuid) -> String {
    sign(secret, &session_data(group_id, user_id, session_id), 8)
}

pub fn verify_callback_signature(
    secret: &str,
    group_id: i64,
    user_id: i64,
    session_id: Uuid,
    signature: &str,
) -> bool {
    let expected = callback_signature(secret, group_id, user_id, session_id);
    // Length mismatch short-circuits inside ct_eq without leaking position.
    expected.as_bytes().ct_eq(signature.as_bytes()).into()
}

/// Inline-button payload: `agree:{user_id}:{token}:{sig}`.
pub fn agree_callback_data(secret: &str, group_id: i64, user_id: i64, session_id: Uuid) -> String {
    let token = encode_session_id(session_id);
    let sig = callback_signature(secret, group_id, user_id, session_id);
    format!("agree:{user_id}:{token}:{sig}")
}

/// Deep-link suffix: `{token}{sig}`, no separator.
pub fn start_payload(secret: &str, group_id: i64, user_id: i64, session_id: Uuid) -> String {
    let token = encode_session_id(session_id);
    let sig = callback_signature(secret, group_id, user_id, session_id);
    format!("{token}{sig}")
}

/// Recover the session id from a deep-link payload.
///
/// The payload is an opaque key: group and user are read from the stored
/// session, then checked by [`verify_start_payload`].
pub fn parse_start_payload(payload: &str) -> Option<Uuid> {
    if payload.len() < TOKEN_LEN + 1 {
        return None;
    }
    decode_session_id(&payload[..TOKEN_LEN])
}

pub fn verify_start_payload(
    secret: &str,
    group_id: i64,
    user_id: i64,
    session_id: Uuid,
    payload: &str,
) -> bool {
    if payload.len() < TOKEN_LEN + SIG_LEN {
        return false;
    }
    let token = &payload[..TOKEN_LEN];
    let sig = &payload[TOKEN_LEN..TOKEN_LEN + SIG_LEN];
    match decode_session_id(token) {
        Some(id) if id == session_id => {}
        _ => return false,
    }
    let expected = callback_signature(secret, group_id, user_id, session_id);
    expected.as_bytes().ct_eq(sig.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";
    const GROUP: i64 = -1001234567890;
    const USER: i64 = 100;

    #[test]
    fn token_is_22_chars_and_roundtrips() {
        let id = Uuid::new_v4();
        let token = encode_session_id(id);
        assert_eq!(token.len(), TOKEN_LEN);
        assert_eq!(decode_session_id(&token), Some(id));
    }

    #[test]
    fn signature_is_11_chars() {
        let sig = callback_signature(SECRET, GROUP, USER, Uuid::new_v4());
        assert_eq!(sig.len(), SIG_LEN);
    }

    #[test]
    fn callback_data_format() {
        let id = Uuid::new_v4();
        let data = agree_callback_data(SECRET, GROUP, USER, id);
        let parts: Vec<&str> = data.splitn(4, ':').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "agree");
        assert_eq!(parts[1], "100");
        assert_eq!(parts[2].len(), TOKEN_LEN);
        assert_eq!(parts[3].len(), SIG_LEN);
    }

    #[test]
    fn valid_signature_verifies() {
        let id = Uuid::new_v4();
        let sig = callback_signature(SECRET, GROUP, USER, id);
        assert!(verify_callback_signature(SECRET, GROUP, USER, id, &sig));
    }

    #[test]
    fn any_single_char_tamper_is_rejected() {
        let id = Uuid::new_v4();
        let sig = callback_signature(SECRET, GROUP, USER, id);
        for i in 0..sig.len() {
            let mut bytes = sig.clone().into_bytes();
            bytes[i] = if bytes[i] == b'A' { b'B' } else { b'A' };
            let tampered = String::from_utf8(bytes).unwrap();
            if tampered == sig {
                continue;
            }
            assert!(!verify_callback_signature(SECRET, GROUP, USER, id, &tampered));
        }
    }

    #[test]
    fn wrong_user_or_group_is_rejected() {
        let id = Uuid::new_v4();
        let sig = callback_signature(SECRET, GROUP, USER, id);
        assert!(!verify_callback_signature(SECRET, GROUP, USER + 1, id, &sig));
        assert!(!verify_callback_signature(SECRET, GROUP + 1, USER, id, &sig));
        assert!(!verify_callback_signature("other", GROUP, USER, id, &sig));
    }

    #[test]
    fn start_payload_roundtrip() {
        let id = Uuid::new_v4();
        let payload = start_payload(SECRET, GROUP, USER, id);
        assert_eq!(payload.len(), TOKEN_LEN + SIG_LEN);
        assert_eq!(parse_start_payload(&payload), Some(id));
        assert!(verify_start_payload(SECRET, GROUP, USER, id, &payload));
    }

    #[test]
    fn start_payload_token_mismatch_is_rejected() {
        let id = Uuid::new_v4();
        let other = Uuid::new_v4();
        let payload = start_payload(SECRET, GROUP, USER, id);
        assert!(!verify_start_payload(SECRET, GROUP, USER, other, &payload));
    }

    #[test]
    fn start_payload_tamper_is_rejected() {
        let id = Uuid::new_v4();
        let payload = start_payload(SECRET, GROUP, USER, id);
        let mut bytes = payload.into_bytes();
        let last = bytes.len() - 1;
        bytes[last] = if bytes[last] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(bytes).unwrap();
        assert!(!verify_start_payload(SECRET, GROUP, USER, id, &tampered));
    }

    #[test]
    fn short_payload_is_rejected() {
        assert_eq!(parse_start_payload("tooshort"), None);
        assert!(!verify_start_payload(SECRET, GROUP, USER, Uuid::new_v4(), "short"));
    }
}
