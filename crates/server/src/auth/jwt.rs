use anyhow::{anyhow, bail, Context};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

pub const ACCESS_TOKEN_TTL_SECONDS: i64 = 15 * 60;

/// Claims carried by an access token.
///
/// Account lifecycle (registration, approval, login) lives outside this
/// server; it issues these tokens after authenticating the user. The
/// `session_id` identifies the browser session and keys the session
/// unlock set, so unlocks never leak across devices.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AccessTokenClaims {
    sub: String,
    session_id: Uuid,
    is_admin: bool,
    iat: i64,
    exp: i64,
}

/// The authenticated actor resolved from a validated token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: i64,
    pub session_id: Uuid,
    pub is_admin: bool,
}

#[derive(Clone)]
pub struct JwtAccessTokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtAccessTokenService {
    pub fn new(secret: &str) -> anyhow::Result<Self> {
        if secret.len() < 32 {
            bail!("jwt secret must be at least 32 characters long");
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }

    pub fn issue_token(
        &self,
        user_id: i64,
        session_id: Uuid,
        is_admin: bool,
    ) -> anyhow::Result<String> {
        self.issue_token_at(user_id, session_id, is_admin, current_unix_timestamp()?)
    }

    fn issue_token_at(
        &self,
        user_id: i64,
        session_id: Uuid,
        is_admin: bool,
        issued_at: i64,
    ) -> anyhow::Result<String> {
        let claims = AccessTokenClaims {
            sub: user_id.to_string(),
            session_id,
            is_admin,
            iat: issued_at,
            exp: issued_at + ACCESS_TOKEN_TTL_SECONDS,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .context("failed to encode access token")
    }

    pub fn validate_token(&self, token: &str) -> anyhow::Result<Actor> {
        let claims = decode::<AccessTokenClaims>(token, &self.decoding_key, &self.validation)
            .context("failed to decode access token")?
            .claims;

        let user_id = claims.sub.parse::<i64>().with_context(|| {
            format!("access token subject '{}' is not a numeric user id", claims.sub)
        })?;

        Ok(Actor { user_id, session_id: claims.session_id, is_admin: claims.is_admin })
    }
}

fn current_unix_timestamp() -> anyhow::Result<i64> {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|error| anyhow!("system clock is before unix epoch: {error}"))?;

    i64::try_from(duration.as_secs()).context("unix timestamp overflow")
}

#[cfg(test)]
mod tests {
    use super::{current_unix_timestamp, JwtAccessTokenService, ACCESS_TOKEN_TTL_SECONDS};
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
    use serde::Serialize;
    use uuid::Uuid;

    const TEST_SECRET: &str = "sotto_test_secret_that_is_definitely_long_enough";

    #[test]
    fn issues_and_validates_tokens() {
        let service = JwtAccessTokenService::new(TEST_SECRET).expect("service should initialize");
        let session_id = Uuid::new_v4();

        let token = service.issue_token(42, session_id, false).expect("token should be issued");
        let actor = service.validate_token(&token).expect("token should validate");

        assert_eq!(actor.user_id, 42);
        assert_eq!(actor.session_id, session_id);
        assert!(!actor.is_admin);
    }

    #[test]
    fn preserves_admin_flag() {
        let service = JwtAccessTokenService::new(TEST_SECRET).expect("service should initialize");
        let token =
            service.issue_token(1, Uuid::new_v4(), true).expect("token should be issued");
        let actor = service.validate_token(&token).expect("token should validate");
        assert!(actor.is_admin);
    }

    #[test]
    fn rejects_short_secrets() {
        assert!(JwtAccessTokenService::new("too-short").is_err());
    }

    #[test]
    fn rejects_tampered_tokens() {
        let service = JwtAccessTokenService::new(TEST_SECRET).expect("service should initialize");
        let token =
            service.issue_token(1, Uuid::new_v4(), false).expect("token should be issued");
        let tampered = format!("{token}x");

        assert!(service.validate_token(&tampered).is_err());
    }

    #[test]
    fn rejects_expired_tokens() {
        let service = JwtAccessTokenService::new(TEST_SECRET).expect("service should initialize");
        let issued_at = current_unix_timestamp().expect("current timestamp should resolve")
            - ACCESS_TOKEN_TTL_SECONDS
            - 1;
        let token = service
            .issue_token_at(1, Uuid::new_v4(), false, issued_at)
            .expect("token should be issued");

        assert!(service.validate_token(&token).is_err());
    }

    #[test]
    fn rejects_tokens_with_non_numeric_subject() {
        #[derive(Serialize)]
        struct InvalidSubjectClaims {
            sub: &'static str,
            session_id: Uuid,
            is_admin: bool,
            iat: i64,
            exp: i64,
        }

        let service = JwtAccessTokenService::new(TEST_SECRET).expect("service should initialize");
        let now = current_unix_timestamp().expect("current timestamp should resolve");
        let claims = InvalidSubjectClaims {
            sub: "not-a-number",
            session_id: Uuid::new_v4(),
            is_admin: false,
            iat: now,
            exp: now + ACCESS_TOKEN_TTL_SECONDS,
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
        )
        .expect("token should encode");

        assert!(service.validate_token(&token).is_err());
    }
}
