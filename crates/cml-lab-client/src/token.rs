//! Bearer token inspection.
//!
//! The controller issues JWTs. The client never validates their signature
//! (the controller does that), it only reads the `exp` claim so an expired
//! token can be replaced before a request is wasted on a 401.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

/// Tokens expiring within this window are treated as already expired.
const EXPIRY_SKEW_SECONDS: i64 = 30;

#[derive(Debug, Deserialize)]
struct ExpiryClaims {
    #[serde(default)]
    exp: Option<i64>,
}

/// Read the expiry time of a JWT without validating its signature.
///
/// Returns `None` if the token is not a JWT or carries no `exp` claim.
#[must_use]
pub fn token_expiry(token: &str) -> Option<DateTime<Utc>> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<ExpiryClaims>(token, &DecodingKey::from_secret(&[]), &validation).ok()?;
    DateTime::from_timestamp(data.claims.exp?, 0)
}

/// Returns true if the token is a JWT whose `exp` lies before `now` (plus skew).
#[must_use]
pub fn is_expired(token: &str, now: DateTime<Utc>) -> bool {
    token_expiry(token)
        .is_some_and(|exp| exp <= now + Duration::seconds(EXPIRY_SKEW_SECONDS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    #[derive(Serialize)]
    struct Claims {
        sub: String,
        exp: i64,
    }

    fn jwt(exp: i64) -> String {
        encode(
            &Header::default(),
            &Claims {
                sub: "admin".into(),
                exp,
            },
            &EncodingKey::from_secret(b"controller-secret"),
        )
        .unwrap()
    }

    #[test]
    fn reads_expiry() {
        let exp = Utc::now().timestamp() + 3600;
        assert_eq!(token_expiry(&jwt(exp)).unwrap().timestamp(), exp);
    }

    #[test]
    fn opaque_tokens_never_expire() {
        assert!(token_expiry("secret").is_none());
        assert!(!is_expired("secret", Utc::now()));
    }

    #[test]
    fn expired_and_fresh() {
        let now = Utc::now();
        assert!(is_expired(&jwt(now.timestamp() - 10), now));
        assert!(is_expired(&jwt(now.timestamp() + 5), now));
        assert!(!is_expired(&jwt(now.timestamp() + 3600), now));
    }
}
