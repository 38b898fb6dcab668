//! Service configuration

use std::env;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_ORIGIN: &str = "http://localhost:3000";

/// Auth service settings
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Address the HTTP server binds to
    pub bind_addr: String,
    /// Whether the process runs with `APP_ENV=production`
    pub production: bool,
    /// CORS allow-list
    pub allowed_origins: Vec<String>,
}

impl AuthConfig {
    /// Create a new AuthConfig from environment variables
    ///
    /// # Environment Variables
    /// - `AUTH_BIND_ADDR`: listen address (default: 0.0.0.0:3000)
    /// - `APP_ENV`: `production` makes OTP email failures fatal (default: development)
    /// - `ALLOWED_ORIGINS`: comma separated CORS origins (default: http://localhost:3000)
    pub fn from_env() -> Self {
        let bind_addr = env::var("AUTH_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());

        let production = env::var("APP_ENV")
            .map(|v| v.eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        let allowed_origins = parse_origins(
            &env::var("ALLOWED_ORIGINS").unwrap_or_else(|_| DEFAULT_ORIGIN.to_string()),
        );

        Self {
            bind_addr,
            production,
            allowed_origins,
        }
    }
}

pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_defaults() {
        unsafe {
            env::remove_var("AUTH_BIND_ADDR");
            env::remove_var("APP_ENV");
            env::remove_var("ALLOWED_ORIGINS");
        }

        let config = AuthConfig::from_env();
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert!(!config.production);
        assert_eq!(config.allowed_origins, vec![DEFAULT_ORIGIN.to_string()]);
    }

    #[test]
    #[serial]
    fn test_production_and_origins() {
        unsafe {
            env::set_var("APP_ENV", "Production");
            env::set_var("ALLOWED_ORIGINS", "https://shop.example.com, https://admin.example.com,");
        }

        let config = AuthConfig::from_env();
        assert!(config.production);
        assert_eq!(
            config.allowed_origins,
            vec![
                "https://shop.example.com".to_string(),
                "https://admin.example.com".to_string()
            ]
        );

        unsafe {
            env::remove_var("APP_ENV");
            env::remove_var("ALLOWED_ORIGINS");
        }
    }
}
