use std::fmt;

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{de, Deserialize, Deserializer, Serialize};

/// Token type claim value for tokens that may be sent as bearer credentials.
const ACCESS_TOKEN_TYPE: &str = "access";

/// Role claim, which servers issue either as one string or as a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoleClaim {
    One(String),
    Many(Vec<String>),
    Other(serde_json::Value),
}

impl RoleClaim {
    pub fn roles(&self) -> Vec<&str> {
        match self {
            RoleClaim::One(role) => vec![role.as_str()],
            RoleClaim::Many(roles) => roles.iter().map(String::as_str).collect(),
            RoleClaim::Other(_) => Vec::new(),
        }
    }
}

/// Claims carried by a server-issued token.
///
/// Only the fields the client acts on are modelled. The server signs the
/// token, but the client never holds the key, so claims are read without
/// verifying the signature. The server remains the authority on validity.
///
/// Only `exp` must have a definite shape; informational claims of an
/// unexpected type are read as absent instead of failing the decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<RoleClaim>,
    #[serde(
        default,
        rename = "type",
        alias = "typ",
        alias = "token_type",
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub token_type: Option<String>,
    /// Expiry, seconds since the Unix epoch
    #[serde(deserialize_with = "numeric_date")]
    pub exp: i64,
    #[serde(
        default,
        deserialize_with = "lenient_numeric_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub iat: Option<i64>,
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

/// JWT NumericDate: seconds since the epoch, possibly fractional.
fn numeric_seconds(value: &serde_json::Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
}

fn numeric_date<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    numeric_seconds(&value)
        .ok_or_else(|| de::Error::custom(format!("expected a NumericDate, found {}", value)))
}

fn lenient_numeric_date<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(numeric_seconds(&serde_json::Value::deserialize(deserializer)?))
}

impl TokenClaims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at() {
            Some(expiry) => now >= expiry,
            None => true,
        }
    }

    /// Tokens without a type claim are treated as access tokens.
    pub fn is_access_token(&self) -> bool {
        self.token_type
            .as_deref()
            .map(|t| t.eq_ignore_ascii_case(ACCESS_TOKEN_TYPE))
            .unwrap_or(true)
    }

    pub fn roles(&self) -> Vec<&str> {
        self.role.as_ref().map(RoleClaim::roles).unwrap_or_default()
    }

    /// Roles joined for display, or `None` when the token carries none.
    pub fn role_display(&self) -> Option<String> {
        let roles = self.roles();
        (!roles.is_empty()).then(|| roles.join(", "))
    }
}

/// Outcome of checking a token before it is exposed to the rest of the app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenStatus {
    Valid(TokenClaims),
    Expired,
    WrongType(String),
    Malformed(String),
}

impl TokenStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, TokenStatus::Valid(_))
    }
}

/// Opaque bearer credential issued by the auth endpoint.
///
/// `Debug` never prints the token itself.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    /// Decode the claims without verifying the signature.
    pub fn claims(&self) -> Result<TokenClaims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let data = decode::<TokenClaims>(&self.0, &DecodingKey::from_secret(&[]), &validation)?;
        Ok(data.claims)
    }

    pub fn check_at(&self, now: DateTime<Utc>) -> TokenStatus {
        if self.0.is_empty() {
            return TokenStatus::Malformed("empty token".to_string());
        }
        match self.claims() {
            Ok(claims) if !claims.is_access_token() => {
                TokenStatus::WrongType(claims.token_type.unwrap_or_default())
            }
            Ok(claims) if claims.is_expired_at(now) => TokenStatus::Expired,
            Ok(claims) => TokenStatus::Valid(claims),
            Err(e) => TokenStatus::Malformed(e.to_string()),
        }
    }

    pub fn check(&self) -> TokenStatus {
        self.check_at(Utc::now())
    }

    pub fn is_valid(&self) -> bool {
        self.check().is_valid()
    }

    /// Time left before expiry, or `None` if the claims cannot be read.
    pub fn time_until_expiry(&self) -> Option<Duration> {
        let expiry = self.claims().ok()?.expires_at()?;
        Some(expiry - Utc::now())
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self) -> i64 {
        self.time_until_expiry()
            .map(|d| d.num_minutes().max(0))
            .unwrap_or(0)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token(<{} bytes>)", self.0.len())
    }
}

#[cfg(test)]
pub(crate) mod test_tokens {
    use jsonwebtoken::{encode, EncodingKey, Header};

    use super::*;

    pub fn mint(claims: serde_json::Value) -> Token {
        let raw = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"server-side-secret"),
        )
        .expect("Failed to encode test token");
        Token::new(raw)
    }

    pub fn access_token(exp_offset: Duration) -> Token {
        let now = Utc::now();
        mint(serde_json::json!({
            "sub": "alice",
            "role": "USER",
            "exp": (now + exp_offset).timestamp(),
            "iat": now.timestamp(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::test_tokens::*;
    use super::*;

    #[test]
    fn test_valid_access_token() {
        let token = access_token(Duration::hours(1));
        match token.check() {
            TokenStatus::Valid(claims) => {
                assert_eq!(claims.sub.as_deref(), Some("alice"));
                assert_eq!(claims.roles(), vec!["USER"]);
            }
            other => panic!("expected valid token, got {:?}", other),
        }
        assert!(token.minutes_until_expiry() >= 59);
    }

    #[test]
    fn test_expired_token() {
        let token = access_token(Duration::minutes(-5));
        assert_eq!(token.check(), TokenStatus::Expired);
        assert!(!token.is_valid());
        assert_eq!(token.minutes_until_expiry(), 0);
    }

    #[test]
    fn test_expiry_boundary() {
        let exp = Utc::now() + Duration::minutes(10);
        let token = mint(serde_json::json!({ "exp": exp.timestamp() }));
        let just_before = Utc.timestamp_opt(exp.timestamp() - 1, 0).unwrap();
        let at_expiry = Utc.timestamp_opt(exp.timestamp(), 0).unwrap();
        assert!(token.check_at(just_before).is_valid());
        assert_eq!(token.check_at(at_expiry), TokenStatus::Expired);
    }

    #[test]
    fn test_token_type_claim() {
        let exp = (Utc::now() + Duration::hours(1)).timestamp();

        let refresh = mint(serde_json::json!({ "exp": exp, "type": "refresh" }));
        assert_eq!(refresh.check(), TokenStatus::WrongType("refresh".to_string()));

        let access = mint(serde_json::json!({ "exp": exp, "token_type": "ACCESS" }));
        assert!(access.is_valid());

        let typ = mint(serde_json::json!({ "exp": exp, "typ": "id" }));
        assert!(matches!(typ.check(), TokenStatus::WrongType(_)));
    }

    #[test]
    fn test_role_list_and_odd_claims_are_accepted() {
        let exp = (Utc::now() + Duration::hours(1)).timestamp();
        let token = mint(serde_json::json!({
            "sub": "alice",
            "role": ["ROLE_USER", "ROLE_LIBRARIAN"],
            "exp": exp,
        }));
        match token.check() {
            TokenStatus::Valid(claims) => {
                assert_eq!(claims.roles(), vec!["ROLE_USER", "ROLE_LIBRARIAN"]);
                assert_eq!(claims.role_display().as_deref(), Some("ROLE_USER, ROLE_LIBRARIAN"));
            }
            other => panic!("expected valid token, got {:?}", other),
        }

        // Numeric subject, object role and fractional dates still decode
        let odd = mint(serde_json::json!({
            "sub": 42,
            "role": { "name": "USER" },
            "exp": exp as f64 + 0.5,
            "iat": "yesterday",
        }));
        match odd.check() {
            TokenStatus::Valid(claims) => {
                assert_eq!(claims.sub.as_deref(), Some("42"));
                assert!(claims.roles().is_empty());
                assert_eq!(claims.role_display(), None);
                assert_eq!(claims.exp, exp);
                assert_eq!(claims.iat, None);
            }
            other => panic!("expected valid token, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_tokens() {
        assert!(matches!(Token::new("").check(), TokenStatus::Malformed(_)));
        assert!(matches!(
            Token::new("not-a-jwt").check(),
            TokenStatus::Malformed(_)
        ));
        // Structurally valid but without an expiry
        let no_exp = mint(serde_json::json!({ "sub": "alice" }));
        assert!(matches!(no_exp.check(), TokenStatus::Malformed(_)));
        let text_exp = mint(serde_json::json!({ "exp": "tomorrow" }));
        assert!(matches!(text_exp.check(), TokenStatus::Malformed(_)));
    }

    #[test]
    fn test_debug_redacts_token() {
        let token = access_token(Duration::hours(1));
        let printed = format!("{:?}", token);
        assert!(!printed.contains(token.as_str()));
        assert!(printed.starts_with("Token(<"));
    }
}
