//! JWT issuing and validation
//!
//! Tokens are HS256-signed with a shared secret so both the auth and api
//! services can verify them. The payload is `{userId, email, role, iat, exp}`.

use crate::error::JwtError;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

const DEFAULT_EXPIRES_IN: u64 = 7 * 24 * 60 * 60;

/// Account roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
    Sales,
    Warehouse,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::Sales => "sales",
            Role::Warehouse => "warehouse",
        }
    }

    /// Back-office roles
    pub fn is_staff(&self) -> bool {
        !matches!(self, Role::User)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            "sales" => Ok(Role::Sales),
            "warehouse" => Ok(Role::Warehouse),
            other => Err(format!("Unknown role: {}", other)),
        }
    }
}

/// JWT configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// HMAC secret
    pub secret: String,
    /// Token lifetime in seconds (default: 7 days)
    pub expires_in: u64,
}

impl JwtConfig {
    /// Create a new JwtConfig from environment variables
    ///
    /// # Environment Variables
    /// - `JWT_SECRET`: signing secret (required)
    /// - `JWT_EXPIRES_IN`: lifetime such as `7d`, `12h`, `30m`, `45s` or plain seconds (default: 7d)
    pub fn from_env() -> Result<Self, JwtError> {
        let secret = std::env::var("JWT_SECRET")
            .map_err(|_| JwtError::Configuration("JWT_SECRET environment variable not set".into()))?;

        if secret.trim().is_empty() {
            return Err(JwtError::Configuration("JWT_SECRET must not be empty".into()));
        }

        let expires_in = match std::env::var("JWT_EXPIRES_IN") {
            Ok(raw) => parse_duration(&raw).ok_or_else(|| {
                JwtError::Configuration(format!("Invalid JWT_EXPIRES_IN value: {}", raw))
            })?,
            Err(_) => DEFAULT_EXPIRES_IN,
        };

        Ok(JwtConfig { secret, expires_in })
    }
}

/// Parse `7d` / `12h` / `30m` / `45s` / `3600` into seconds
pub fn parse_duration(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let (digits, multiplier) = match raw.chars().last()? {
        'd' => (&raw[..raw.len() - 1], 86_400),
        'h' => (&raw[..raw.len() - 1], 3_600),
        'm' => (&raw[..raw.len() - 1], 60),
        's' => (&raw[..raw.len() - 1], 1),
        c if c.is_ascii_digit() => (raw, 1),
        _ => return None,
    };

    let value: u64 = digits.parse().ok()?;
    if value == 0 {
        return None;
    }
    value.checked_mul(multiplier)
}

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
    /// Issued at time
    pub iat: u64,
    /// Expiration time
    pub exp: u64,
}

/// JWT service
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    expires_in: u64,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        JwtService {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            expires_in: config.expires_in,
        }
    }

    /// Sign a token for the given account
    pub fn generate(&self, user_id: Uuid, email: &str, role: Role) -> Result<String, JwtError> {
        let now = now_secs()?;
        let claims = Claims {
            user_id,
            email: email.to_string(),
            role,
            iat: now,
            exp: now + self.expires_in,
        };

        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?)
    }

    /// Verify signature and expiry
    pub fn validate(&self, token: &str) -> Result<Claims, JwtError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        Ok(data.claims)
    }
}

fn now_secs() -> Result<u64, JwtError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| JwtError::Configuration(format!("System clock error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn service() -> JwtService {
        JwtService::new(&JwtConfig {
            secret: "test-secret".to_string(),
            expires_in: 3600,
        })
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("7d"), Some(604_800));
        assert_eq!(parse_duration("12h"), Some(43_200));
        assert_eq!(parse_duration("30m"), Some(1_800));
        assert_eq!(parse_duration("45s"), Some(45));
        assert_eq!(parse_duration("3600"), Some(3_600));
        assert_eq!(parse_duration("0d"), None);
        assert_eq!(parse_duration("7w"), None);
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("d"), None);
    }

    #[test]
    fn test_generate_and_validate() {
        let jwt = service();
        let id = Uuid::new_v4();
        let token = jwt.generate(id, "test@example.com", Role::User).unwrap();

        let claims = jwt.validate(&token).unwrap();
        assert_eq!(claims.user_id, id);
        assert_eq!(claims.email, "test@example.com");
        assert_eq!(claims.role, Role::User);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_payload_uses_camel_case_user_id() {
        let claims = Claims {
            user_id: Uuid::nil(),
            email: "a@b.co".to_string(),
            role: Role::Warehouse,
            iat: 1,
            exp: 2,
        };
        let json = serde_json::to_value(&claims).unwrap();
        assert!(json.get("userId").is_some());
        assert_eq!(json["role"], "warehouse");
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = service()
            .generate(Uuid::new_v4(), "a@b.co", Role::Admin)
            .unwrap();
        let other = JwtService::new(&JwtConfig {
            secret: "other-secret".to_string(),
            expires_in: 3600,
        });
        assert!(other.validate(&token).is_err());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let jwt = service();
        let claims = Claims {
            user_id: Uuid::new_v4(),
            email: "a@b.co".to_string(),
            role: Role::User,
            iat: 1_000,
            exp: 2_000,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();
        assert!(jwt.validate(&token).is_err());
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("sales".parse::<Role>(), Ok(Role::Sales));
        assert!("root".parse::<Role>().is_err());
        assert!(Role::Warehouse.is_staff());
        assert!(!Role::User.is_staff());
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        unsafe {
            std::env::set_var("JWT_SECRET", "s3cret");
            std::env::set_var("JWT_EXPIRES_IN", "2h");
        }
        let config = JwtConfig::from_env().unwrap();
        assert_eq!(config.secret, "s3cret");
        assert_eq!(config.expires_in, 7_200);

        unsafe {
            std::env::remove_var("JWT_SECRET");
            std::env::remove_var("JWT_EXPIRES_IN");
        }
        assert!(matches!(
            JwtConfig::from_env(),
            Err(JwtError::Configuration(_))
        ));
    }
}
