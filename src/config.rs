use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_refresh_secret: String,
    /// Lifetime of the access token issued at sign-in.
    pub jwt_access_minutes: i64,
    /// Lifetime of an access token minted from a valid refresh token.
    pub jwt_renewed_minutes: i64,
    pub jwt_refresh_days: i64,
    pub upload_dir: String,
    /// Scheme + host used to build absolute URLs for avatars and post images.
    pub public_base_url: String,
    pub cors_origins: Vec<String>,
    pub host: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            jwt_refresh_secret: required("JWT_REFRESH_SECRET")?,
            jwt_access_minutes: env::var("JWT_ACCESS_MINUTES")
                .unwrap_or_else(|_| "75".into())
                .parse()?,
            jwt_renewed_minutes: env::var("JWT_RENEWED_MINUTES")
                .unwrap_or_else(|_| "15".into())
                .parse()?,
            jwt_refresh_days: env::var("JWT_REFRESH_DAYS")
                .unwrap_or_else(|_| "7".into())
                .parse()?,
            upload_dir: env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".into()),
            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".into())
                .trim_end_matches('/')
                .to_string(),
            cors_origins: parse_origins(
                &env::var("CORS_ORIGINS").unwrap_or_else(|_| "http://localhost:8081".into()),
            ),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()?,
        })
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).map_err(|_| anyhow::anyhow!("Missing required env var: {}", key))
}

/// Comma-separated origin allow-list; blanks are dropped.
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|o| o.trim().trim_end_matches('/').to_string())
        .filter(|o| !o.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origins_are_trimmed_and_blank_entries_dropped() {
        let origins = parse_origins(" http://localhost:8081 ,, http://10.0.0.2:8081/ ");
        assert_eq!(
            origins,
            vec!["http://localhost:8081".to_string(), "http://10.0.0.2:8081".to_string()]
        );
    }
}
