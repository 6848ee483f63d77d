//! Join Tokens
//!
//! A hunter joins with a JWT minted by the game's auth provider. The token
//! names the hunter (`sub`) and may carry the wallet their finished games
//! are recorded under. Tokens are app-scoped: one whose `aud` names a
//! different app id is refused.
//!
//! Expiry is checked against the session clock, not the library's wall
//! clock, so tests can move time.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::game::state::ViewId;
use crate::ledger::PlayerAddress;

/// Token verification settings.
#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    /// Required `iss`, if any.
    pub issuer: Option<String>,
    /// Required `aud`. When unset, a token's `aud` must name the join's app id.
    pub audience: Option<String>,
    /// RS256 public key (PEM). Takes precedence over `secret`.
    pub public_key_pem: Option<String>,
    /// HS256 shared secret.
    pub secret: Option<String>,
    /// Ignore `exp`. Local testing only.
    pub skip_expiry: bool,
    /// Accept any non-empty key as a guest when no verifier is configured.
    pub allow_anonymous: bool,
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}

impl AuthConfig {
    /// Read `AUTH_*` variables.
    pub fn from_env() -> Self {
        Self {
            issuer: std::env::var("AUTH_ISSUER").ok(),
            audience: std::env::var("AUTH_AUDIENCE").ok(),
            public_key_pem: std::env::var("AUTH_PUBLIC_KEY_PEM").ok(),
            secret: std::env::var("AUTH_SECRET").ok(),
            skip_expiry: env_flag("AUTH_SKIP_EXPIRY"),
            allow_anonymous: env_flag("AUTH_ALLOW_ANONYMOUS"),
        }
    }

    /// True when tokens can be verified.
    pub fn is_configured(&self) -> bool {
        self.public_key_pem.is_some() || self.secret.is_some()
    }

    fn decoding_key(&self) -> Result<(DecodingKey, Algorithm), AuthError> {
        if let Some(pem) = &self.public_key_pem {
            let key = DecodingKey::from_rsa_pem(pem.as_bytes())
                .map_err(|e| AuthError::DecodeError(format!("invalid public key: {}", e)))?;
            return Ok((key, Algorithm::RS256));
        }
        match &self.secret {
            Some(secret) => Ok((DecodingKey::from_secret(secret.as_bytes()), Algorithm::HS256)),
            None => Err(AuthError::NotConfigured),
        }
    }
}

/// `aud` as either a single string or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// One audience.
    One(String),
    /// Several audiences.
    Many(Vec<String>),
}

impl Audience {
    /// True if `name` is among the audiences.
    pub fn contains(&self, name: &str) -> bool {
        match self {
            Audience::One(aud) => aud == name,
            Audience::Many(auds) => auds.iter().any(|aud| aud == name),
        }
    }
}

/// Claims carried by a join token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Hunter account id.
    pub sub: String,
    /// Expiry (Unix seconds, 0 for none).
    #[serde(default)]
    pub exp: u64,
    /// Issued at (Unix seconds).
    #[serde(default)]
    pub iat: u64,
    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// App ids the token is good for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,
    /// Wallet for score submission, `0x`-prefixed hex.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet: Option<String>,
}

/// A verified hunter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Account id from the token.
    pub subject: String,
    /// Stable view id derived from the account id.
    pub view_id: ViewId,
    /// Where this hunter's scores go, if they signed in with a wallet.
    pub wallet: Option<PlayerAddress>,
}

impl Identity {
    fn from_claims(claims: TokenClaims) -> Result<Self, AuthError> {
        if claims.sub.trim().is_empty() {
            return Err(AuthError::MissingSubject);
        }
        let wallet = claims
            .wallet
            .as_deref()
            .map(|w| w.parse::<PlayerAddress>().map_err(|_| AuthError::InvalidWallet(w.to_string())))
            .transpose()?;

        Ok(Self {
            view_id: view_id_for(&claims.sub),
            subject: claims.sub,
            wallet,
        })
    }
}

/// The view id a hunter account always joins as.
pub fn view_id_for(subject: &str) -> ViewId {
    let hash = Sha256::new()
        .chain_update(b"monad-hunter-view:")
        .chain_update(subject.as_bytes())
        .finalize();

    let mut id = [0u8; 16];
    id.copy_from_slice(&hash[..16]);
    ViewId::new(id)
}

/// Token rejections.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// No verifier on this server.
    #[error("authentication not configured")]
    NotConfigured,
    /// Not a JWT.
    #[error("invalid token format")]
    InvalidFormat,
    /// Signature does not verify.
    #[error("invalid signature")]
    InvalidSignature,
    /// Past `exp`.
    #[error("token expired")]
    Expired,
    /// `iss` mismatch.
    #[error("invalid issuer")]
    InvalidIssuer,
    /// `aud` names another app or audience.
    #[error("token is not valid for {0}")]
    WrongAudience(String),
    /// Empty `sub`.
    #[error("token has no subject")]
    MissingSubject,
    /// `wallet` is not a 20-byte hex address.
    #[error("invalid wallet claim: {0}")]
    InvalidWallet(String),
    /// Anything else from the JWT decoder.
    #[error("decode error: {0}")]
    DecodeError(String),
}

/// Verify a join token for `app_id` at `now_secs`.
pub fn validate_token(
    token: &str,
    config: &AuthConfig,
    app_id: &str,
    now_secs: u64,
) -> Result<Identity, AuthError> {
    let (key, algorithm) = config.decoding_key()?;

    // Signature only; claims are checked below
    let mut validation = Validation::new(algorithm);
    validation.required_spec_claims.clear();
    validation.validate_exp = false;
    validation.validate_aud = false;

    let claims = decode::<TokenClaims>(token, &key, &validation)
        .map_err(map_jwt_error)?
        .claims;

    if let Some(issuer) = &config.issuer {
        if claims.iss.as_deref() != Some(issuer.as_str()) {
            return Err(AuthError::InvalidIssuer);
        }
    }

    match (&config.audience, &claims.aud) {
        (Some(required), aud) => {
            if !aud.as_ref().is_some_and(|aud| aud.contains(required)) {
                return Err(AuthError::WrongAudience(required.clone()));
            }
        }
        (None, Some(aud)) if !aud.contains(app_id) => {
            return Err(AuthError::WrongAudience(app_id.to_string()));
        }
        (None, _) => {}
    }

    if !config.skip_expiry && claims.exp > 0 && now_secs > claims.exp {
        return Err(AuthError::Expired);
    }

    Identity::from_claims(claims)
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    use jsonwebtoken::errors::ErrorKind;
    match err.kind() {
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
            AuthError::InvalidFormat
        }
        _ => AuthError::DecodeError(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::session::DEFAULT_APP_ID;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "hunter-auth-test-secret-0123456789";
    const NOW: u64 = 1_700_000_000;
    const WALLET: &str = "0x00000000000000000000000000000000000000aa";

    fn hs256() -> AuthConfig {
        AuthConfig { secret: Some(SECRET.into()), ..Default::default() }
    }

    fn sign(claims: &TokenClaims) -> String {
        encode(&Header::new(Algorithm::HS256), claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
    }

    fn hunter(sub: &str) -> TokenClaims {
        TokenClaims { sub: sub.into(), exp: NOW + 600, iat: NOW, ..Default::default() }
    }

    #[test]
    fn test_wallet_becomes_player_address() {
        let token = sign(&TokenClaims { wallet: Some(WALLET.into()), ..hunter("hunter-1") });
        let identity = validate_token(&token, &hs256(), DEFAULT_APP_ID, NOW).unwrap();

        assert_eq!(identity.subject, "hunter-1");
        assert_eq!(identity.view_id, view_id_for("hunter-1"));
        assert_eq!(identity.wallet, Some(WALLET.parse::<PlayerAddress>().unwrap()));
    }

    #[test]
    fn test_malformed_wallet_refused() {
        let token = sign(&TokenClaims { wallet: Some("0xnot-hex".into()), ..hunter("hunter-1") });
        assert_eq!(
            validate_token(&token, &hs256(), DEFAULT_APP_ID, NOW),
            Err(AuthError::InvalidWallet("0xnot-hex".into()))
        );
    }

    #[test]
    fn test_token_scoped_to_app() {
        let token = sign(&TokenClaims {
            aud: Some(Audience::Many(vec!["com.other.game".into(), DEFAULT_APP_ID.into()])),
            ..hunter("hunter-1")
        });
        assert!(validate_token(&token, &hs256(), DEFAULT_APP_ID, NOW).is_ok());
        assert_eq!(
            validate_token(&token, &hs256(), "com.third.game", NOW),
            Err(AuthError::WrongAudience("com.third.game".into()))
        );

        // An unscoped token is good for any app
        let token = sign(&hunter("hunter-1"));
        assert!(validate_token(&token, &hs256(), "com.third.game", NOW).is_ok());
    }

    #[test]
    fn test_configured_audience_wins() {
        let config = AuthConfig { audience: Some("hunter-lobby".into()), ..hs256() };

        let token = sign(&TokenClaims { aud: Some(Audience::One("hunter-lobby".into())), ..hunter("h") });
        assert!(validate_token(&token, &config, DEFAULT_APP_ID, NOW).is_ok());

        let token = sign(&hunter("h"));
        assert_eq!(
            validate_token(&token, &config, DEFAULT_APP_ID, NOW),
            Err(AuthError::WrongAudience("hunter-lobby".into()))
        );
    }

    #[test]
    fn test_expiry_follows_clock() {
        let token = sign(&hunter("hunter-1"));
        assert!(validate_token(&token, &hs256(), DEFAULT_APP_ID, NOW + 600).is_ok());
        assert_eq!(validate_token(&token, &hs256(), DEFAULT_APP_ID, NOW + 601), Err(AuthError::Expired));

        let lenient = AuthConfig { skip_expiry: true, ..hs256() };
        assert!(validate_token(&token, &lenient, DEFAULT_APP_ID, NOW + 10_000).is_ok());
    }

    #[test]
    fn test_rejections() {
        let token = sign(&hunter("hunter-1"));

        let wrong_key = AuthConfig { secret: Some("another-secret-entirely-0000".into()), ..Default::default() };
        assert_eq!(validate_token(&token, &wrong_key, DEFAULT_APP_ID, NOW), Err(AuthError::InvalidSignature));

        let issuer = AuthConfig { issuer: Some("hunter-auth".into()), ..hs256() };
        assert_eq!(validate_token(&token, &issuer, DEFAULT_APP_ID, NOW), Err(AuthError::InvalidIssuer));

        assert_eq!(
            validate_token(&sign(&hunter(" ")), &hs256(), DEFAULT_APP_ID, NOW),
            Err(AuthError::MissingSubject)
        );
        assert_eq!(validate_token("guest", &hs256(), DEFAULT_APP_ID, NOW), Err(AuthError::InvalidFormat));
        assert_eq!(
            validate_token(&token, &AuthConfig::default(), DEFAULT_APP_ID, NOW),
            Err(AuthError::NotConfigured)
        );
    }

    #[test]
    fn test_view_id_stable_per_hunter() {
        assert_eq!(view_id_for("hunter-1"), view_id_for("hunter-1"));
        assert_ne!(view_id_for("hunter-1"), view_id_for("hunter-2"));
    }
}
