//! Service configuration

use std::env;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3001";
const DEFAULT_CLIENT_URL: &str = "http://localhost:3000";

/// API service settings
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: String,
    pub production: bool,
    pub allowed_origins: Vec<String>,
    /// Storefront base URL used in notification links
    pub client_url: String,
    pub run_migrations: bool,
}

impl ApiConfig {
    /// Create a new ApiConfig from environment variables
    ///
    /// # Environment Variables
    /// - `API_BIND_ADDR`: listen address (default: 0.0.0.0:3001)
    /// - `APP_ENV`: `production` or anything else (default: development)
    /// - `ALLOWED_ORIGINS`: comma separated CORS origins (default: http://localhost:3000)
    /// - `CLIENT_URL`: storefront URL (default: http://localhost:3000)
    /// - `RUN_MIGRATIONS`: apply migrations at start-up (default: true)
    pub fn from_env() -> Self {
        let bind_addr = env::var("API_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());

        let production = env::var("APP_ENV")
            .map(|v| v.eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| DEFAULT_CLIENT_URL.to_string())
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();

        let client_url = env::var("CLIENT_URL")
            .unwrap_or_else(|_| DEFAULT_CLIENT_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let run_migrations = env::var("RUN_MIGRATIONS")
            .map(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "false" | "0" | "no"))
            .unwrap_or(true);

        Self {
            bind_addr,
            production,
            allowed_origins,
            client_url,
            run_migrations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_defaults() {
        unsafe {
            env::remove_var("API_BIND_ADDR");
            env::remove_var("APP_ENV");
            env::remove_var("ALLOWED_ORIGINS");
            env::remove_var("CLIENT_URL");
            env::remove_var("RUN_MIGRATIONS");
        }

        let config = ApiConfig::from_env();
        assert_eq!(config.bind_addr, "0.0.0.0:3001");
        assert!(!config.production);
        assert_eq!(config.allowed_origins, vec!["http://localhost:3000"]);
        assert_eq!(config.client_url, "http://localhost:3000");
        assert!(config.run_migrations);
    }

    #[test]
    #[serial]
    fn test_overrides() {
        unsafe {
            env::set_var("APP_ENV", "Production");
            env::set_var("CLIENT_URL", "https://shop.example.com/");
            env::set_var("RUN_MIGRATIONS", "false");
            env::set_var("ALLOWED_ORIGINS", "https://a.example.com, https://b.example.com");
        }

        let config = ApiConfig::from_env();
        assert!(config.production);
        assert_eq!(config.client_url, "https://shop.example.com");
        assert!(!config.run_migrations);
        assert_eq!(config.allowed_origins.len(), 2);

        unsafe {
            env::remove_var("APP_ENV");
            env::remove_var("CLIENT_URL");
            env::remove_var("RUN_MIGRATIONS");
            env::remove_var("ALLOWED_ORIGINS");
        }
    }
}
