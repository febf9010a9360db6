//! Configuration module
//!
//! Settings for the storage adapter and the authorization services, read from
//! the environment (and a `.env` file when present).

use std::env;

const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const INVITATION_TTL_DAYS: i64 = 7;
const INVITATION_TOKEN_BYTES: usize = 32;
const SUPER_ADMIN_ROLE: &str = "super_admin";

#[derive(Clone, Debug)]
pub struct GatehouseConfig {
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub environment: String,
    pub invitation_ttl_days: i64,
    pub invitation_token_bytes: usize,
    /// Name of the global role whose holders pass every check.
    pub super_admin_role: String,
    /// Seed the system roles, permissions and role templates on startup.
    pub seed_system_catalog: bool,
}

impl Default for GatehouseConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            db_max_connections: MAX_CONNECTIONS,
            db_timeout_seconds: CONNECTION_TIMEOUT_SECS,
            environment: "development".to_string(),
            invitation_ttl_days: INVITATION_TTL_DAYS,
            invitation_token_bytes: INVITATION_TOKEN_BYTES,
            super_admin_role: SUPER_ADMIN_ROLE.to_string(),
            seed_system_catalog: true,
        }
    }
}

impl GatehouseConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let config = Self {
            database_url: env::var("DATABASE_URL").ok(),
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| MAX_CONNECTIONS.to_string())
                .parse()
                .unwrap_or(MAX_CONNECTIONS),
            db_timeout_seconds: env::var("DB_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| CONNECTION_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(CONNECTION_TIMEOUT_SECS),
            environment,
            invitation_ttl_days: env::var("INVITATION_TTL_DAYS")
                .unwrap_or_else(|_| INVITATION_TTL_DAYS.to_string())
                .parse()
                .unwrap_or(INVITATION_TTL_DAYS),
            invitation_token_bytes: env::var("INVITATION_TOKEN_BYTES")
                .unwrap_or_else(|_| INVITATION_TOKEN_BYTES.to_string())
                .parse()
                .unwrap_or(INVITATION_TOKEN_BYTES),
            super_admin_role: env::var("SUPER_ADMIN_ROLE")
                .unwrap_or_else(|_| SUPER_ADMIN_ROLE.to_string()),
            seed_system_catalog: env::var("SEED_SYSTEM_CATALOG")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(true),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.invitation_ttl_days <= 0 {
            return Err(anyhow::anyhow!("INVITATION_TTL_DAYS must be positive"));
        }

        if self.invitation_token_bytes < 16 {
            return Err(anyhow::anyhow!(
                "INVITATION_TOKEN_BYTES must be at least 16"
            ));
        }

        if self.super_admin_role.trim().is_empty() {
            return Err(anyhow::anyhow!("SUPER_ADMIN_ROLE cannot be empty"));
        }

        if let Some(url) = &self.database_url {
            if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                return Err(anyhow::anyhow!(
                    "DATABASE_URL must be a PostgreSQL connection string"
                ));
            }
        }

        Ok(())
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn invitation_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.invitation_ttl_days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = GatehouseConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.invitation_ttl(), chrono::Duration::days(7));
        assert_eq!(config.super_admin_role, "super_admin");
    }

    #[test]
    fn rejects_short_tokens() {
        let config = GatehouseConfig {
            invitation_token_bytes: 8,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_non_postgres_urls() {
        let config = GatehouseConfig {
            database_url: Some("mysql://localhost/db".into()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn production_detection() {
        let config = GatehouseConfig {
            environment: "PROD".into(),
            ..Default::default()
        };
        assert!(config.is_production());
    }
}
