use std::net::SocketAddr;
use std::path::PathBuf;

/// Upper bound for `PARLOR_SESSION_TTL_HOURS`: one year.
const MAX_SESSION_TTL_HOURS: i64 = 24 * 365;

/// Session secrets that ship in sample `.env` files and MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("PARLOR_SESSION_SECRET is unset or still a placeholder")]
    MissingSecret,

    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub session_secret: String,
    pub host: String,
    pub port: u16,
    pub public_dir: PathBuf,
    pub upload_dir: PathBuf,
    pub session_ttl_hours: i64,
    pub max_upload_mb: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the config from any variable source; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let session_secret = lookup("PARLOR_SESSION_SECRET").unwrap_or_default();
        if session_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&session_secret.as_str()) {
            return Err(ConfigError::MissingSecret);
        }

        Ok(Self {
            database_url: var("PARLOR_DATABASE_URL", "parlor.db"),
            session_secret,
            host: var("PARLOR_HOST", "0.0.0.0"),
            port: parse("PARLOR_PORT", var("PARLOR_PORT", "3000"))?,
            public_dir: var("PARLOR_PUBLIC_DIR", "public").into(),
            upload_dir: var("PARLOR_UPLOAD_DIR", "uploads").into(),
            session_ttl_hours: session_ttl_hours(var("PARLOR_SESSION_TTL_HOURS", "24"))?,
            max_upload_mb: parse("PARLOR_MAX_UPLOAD_MB", var("PARLOR_MAX_UPLOAD_MB", "10"))?,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr, ConfigError> {
        let value = format!("{}:{}", self.host, self.port);
        value
            .parse()
            .map_err(|_| ConfigError::Invalid { name: "PARLOR_HOST", value })
    }
}

fn session_ttl_hours(value: String) -> Result<i64, ConfigError> {
    let hours: i64 = parse("PARLOR_SESSION_TTL_HOURS", value.clone())?;
    if !(1..=MAX_SESSION_TTL_HOURS).contains(&hours) {
        return Err(ConfigError::Invalid { name: "PARLOR_SESSION_TTL_HOURS", value });
    }
    Ok(hours)
}

fn parse<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::Invalid { name, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[("PARLOR_SESSION_SECRET", "s3cret")])).unwrap();
        assert_eq!(config.database_url, "parlor.db");
        assert_eq!(config.port, 3000);
        assert_eq!(config.session_ttl_hours, 24);
        assert_eq!(config.max_upload_mb, 10);
        assert_eq!(config.addr().unwrap().port(), 3000);
    }

    #[test]
    fn test_secret_is_required() {
        assert!(matches!(Config::from_lookup(lookup(&[])), Err(ConfigError::MissingSecret)));
        assert!(matches!(
            Config::from_lookup(lookup(&[("PARLOR_SESSION_SECRET", "dev-secret-change-me")])),
            Err(ConfigError::MissingSecret)
        ));
    }

    #[test]
    fn test_invalid_port() {
        let result = Config::from_lookup(lookup(&[
            ("PARLOR_SESSION_SECRET", "s3cret"),
            ("PARLOR_PORT", "http"),
        ]));
        assert!(matches!(result, Err(ConfigError::Invalid { name: "PARLOR_PORT", .. })));
    }

    #[test]
    fn test_session_ttl_range() {
        for bad in ["0", "-5", "3000000000"] {
            let result = Config::from_lookup(lookup(&[
                ("PARLOR_SESSION_SECRET", "s3cret"),
                ("PARLOR_SESSION_TTL_HOURS", bad),
            ]));
            assert!(
                matches!(result, Err(ConfigError::Invalid { name: "PARLOR_SESSION_TTL_HOURS", .. })),
                "{bad} should be rejected"
            );
        }

        let config = Config::from_lookup(lookup(&[
            ("PARLOR_SESSION_SECRET", "s3cret"),
            ("PARLOR_SESSION_TTL_HOURS", "8760"),
        ]))
        .unwrap();
        assert_eq!(config.session_ttl_hours, 8760);
    }
}
