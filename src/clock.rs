//! Clock & identifier service (C1).
//!
//! Free functions only — this service carries no configuration of its own
//! that changes its behavior at runtime, beyond what each caller passes in.
//! All generators use `rand::rng()`, which is a CSPRNG-backed thread-local
//! source, per spec §4.1's "cryptographically strong source" requirement.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use rand::Rng;

/// Current UTC time. Centralized so tests can reason about a single
/// source of "now" per call site, and so a future fixed-clock test harness
/// only needs to wrap this one function.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Characters used for license key segments and short codes. Excludes
/// visually ambiguous characters (0, O, I, 1) the way the teacher's
/// `license_key.rs` charset does, generalized to this domain's key shape.
const KEY_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

fn random_segment(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| {
            let idx = rng.random_range(0..KEY_CHARSET.len());
            KEY_CHARSET[idx] as char
        })
        .collect()
}

/// Generate a license key in the spec's `LIC-XXXX-YYYY-ZZZZ` shape: a fixed
/// `LIC` prefix followed by three four-character segments.
pub fn generate_license_key() -> String {
    format!(
        "LIC-{}-{}-{}",
        random_segment(4),
        random_segment(4),
        random_segment(4)
    )
}

/// Mask a license key for logging: preserve only the two leading segments
/// (prefix + first random segment), collapse the rest to `****` (P5).
pub fn mask_license_key(key: &str) -> String {
    let parts: Vec<&str> = key.split('-').collect();
    if parts.len() < 2 {
        return "****".to_string();
    }
    let masked_tail = vec!["****"; parts.len() - 2];
    let mut out = vec![parts[0], parts[1]];
    out.extend(masked_tail);
    out.join("-")
}

/// Derive a device identifier from a MAC address: strip separators, upper
/// case, and prefix with `ESP32-`.
pub fn device_id_from_mac(mac: &str) -> String {
    let clean: String = mac
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_uppercase();
    format!("ESP32-{clean}")
}

/// Build a URL-safe, lower-kebab slug from a tenant name, truncated to 50
/// characters and optionally collision-suffixed.
///
/// Idempotent: the same `(name, collision_count)` input always produces the
/// same output (P6).
pub fn generate_tenant_slug(name: &str, collision_count: u32) -> String {
    let mut slug: String = name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();

    while slug.contains("--") {
        slug = slug.replace("--", "-");
    }
    let slug = slug.trim_matches('-');

    let suffix = if collision_count > 0 {
        format!("-{collision_count}")
    } else {
        String::new()
    };

    let max_base_len = 50usize.saturating_sub(suffix.len());
    let truncated: String = slug.chars().take(max_base_len).collect();
    let truncated = truncated.trim_end_matches('-');

    format!("{truncated}{suffix}")
}

/// Six-digit customer-visible code. Caller retries on collision.
pub fn generate_short_code() -> String {
    let mut rng = rand::rng();
    format!("{:06}", rng.random_range(0..1_000_000u32))
}

/// 32-plus bytes of entropy, URL-safe encoded, for stream/view tokens.
pub fn generate_stream_token() -> String {
    random_url_safe_token(32)
}

/// Short-lived customer view token, same entropy budget as stream tokens.
pub fn generate_customer_view_token() -> String {
    format!("tok_{}", random_url_safe_token(16))
}

fn random_url_safe_token(num_bytes: usize) -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..num_bytes).map(|_| rng.random::<u8>()).collect();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Temporary password: 8 characters, guaranteed to include an uppercase
/// letter, a digit, and a punctuation character.
pub fn generate_temporary_password() -> String {
    let mut rng = rand::rng();
    const UPPER: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
    const DIGITS: &[u8] = b"0123456789";
    const PUNCT: &[u8] = b"!@#$%&*";
    const ALL: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghjkmnpqrstuvwxyz0123456789!@#$%&*";

    let mut chars = vec![
        UPPER[rng.random_range(0..UPPER.len())] as char,
        DIGITS[rng.random_range(0..DIGITS.len())] as char,
        PUNCT[rng.random_range(0..PUNCT.len())] as char,
    ];
    for _ in 0..5 {
        chars.push(ALL[rng.random_range(0..ALL.len())] as char);
    }
    // Shuffle with Fisher-Yates so the guaranteed classes aren't always
    // in the first three positions.
    for i in (1..chars.len()).rev() {
        let j = rng.random_range(0..=i);
        chars.swap(i, j);
    }
    chars.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn license_key_has_expected_shape() {
        let key = generate_license_key();
        let parts: Vec<&str> = key.split('-').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "LIC");
        for seg in &parts[1..] {
            assert_eq!(seg.len(), 4);
        }
    }

    #[test]
    fn mask_preserves_only_two_leading_segments() {
        let masked = mask_license_key("LIC-ABCD-EFGH-IJKL");
        assert_eq!(masked, "LIC-ABCD-****-****");
        assert!(!masked.contains("EFGH"));
        assert!(!masked.contains("IJKL"));
    }

    #[test]
    fn mask_handles_degenerate_input() {
        assert_eq!(mask_license_key(""), "****");
        assert_eq!(mask_license_key("short"), "****");
    }

    #[test]
    fn device_id_from_mac_strips_separators() {
        assert_eq!(
            device_id_from_mac("a1:b2:c3:d4:e5:f6"),
            "ESP32-A1B2C3D4E5F6"
        );
        assert_eq!(
            device_id_from_mac("A1-B2-C3-D4-E5-F6"),
            "ESP32-A1B2C3D4E5F6"
        );
    }

    #[test]
    fn slug_is_idempotent_and_bounded() {
        let a = generate_tenant_slug("Rays PPF Delhi!!", 0);
        let b = generate_tenant_slug("Rays PPF Delhi!!", 0);
        assert_eq!(a, b);
        assert!(a.len() <= 50);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'));
    }

    #[test]
    fn slug_collision_suffix_is_deterministic() {
        let base = generate_tenant_slug("Acme Workshop", 0);
        let suffixed = generate_tenant_slug("Acme Workshop", 2);
        assert_eq!(suffixed, format!("{base}-2"));
    }

    #[test]
    fn slug_never_exceeds_fifty_chars_even_with_long_name_and_suffix() {
        let long_name = "a".repeat(200);
        let slug = generate_tenant_slug(&long_name, 42);
        assert!(slug.len() <= 50);
        assert!(slug.ends_with("-42"));
    }

    #[test]
    fn temporary_password_meets_policy() {
        for _ in 0..50 {
            let pw = generate_temporary_password();
            assert_eq!(pw.chars().count(), 8);
            assert!(pw.chars().any(|c| c.is_ascii_uppercase()));
            assert!(pw.chars().any(|c| c.is_ascii_digit()));
            assert!(pw.chars().any(|c| "!@#$%&*".contains(c)));
        }
    }

    #[test]
    fn stream_token_is_url_safe() {
        let tok = generate_stream_token();
        assert!(tok
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert!(tok.len() >= 32);
    }
}
