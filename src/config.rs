use std::env;

use chrono_tz::Tz;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_name: String,
    pub environment: String,
    pub api_prefix: String,
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub database_url: Option<String>,
    pub db_pool_max_connections: u32,
    pub db_pool_min_connections: u32,
    pub db_pool_acquire_timeout_seconds: u64,
    pub db_pool_idle_timeout_seconds: u64,
    pub jwt_secret: Option<String>,
    pub jwt_ttl_hours: i64,
    pub user_cache_ttl_seconds: u64,
    pub user_cache_max_entries: u64,
    pub rate_limit_per_second: u64,
    pub rate_limit_burst_size: u32,
    pub timezone: Tz,
    pub scheduler_enabled: bool,
    pub scheduler_daily_hour: u32,
    pub geocoder_url: String,
    pub geocoder_user_agent: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            app_name: env_or("APP_NAME", "Rental Manager API"),
            environment: env_or("ENVIRONMENT", "development"),
            api_prefix: normalize_prefix(&env_or("API_PREFIX", "/api")),
            host: env_or("HOST", "0.0.0.0"),
            port: env_parse_or("PORT", 8000),
            cors_origins: parse_csv(&env_or("CORS_ORIGINS", "http://localhost:3000")),
            database_url: env_opt("DATABASE_URL"),
            db_pool_max_connections: env_parse_or("DB_POOL_MAX_CONNECTIONS", 5),
            db_pool_min_connections: env_parse_or("DB_POOL_MIN_CONNECTIONS", 1),
            db_pool_acquire_timeout_seconds: env_parse_or("DB_POOL_ACQUIRE_TIMEOUT_SECONDS", 5),
            db_pool_idle_timeout_seconds: env_parse_or("DB_POOL_IDLE_TIMEOUT_SECONDS", 600),
            jwt_secret: env_opt("JWT_SECRET"),
            jwt_ttl_hours: env_parse_or("JWT_TTL_HOURS", 24 * 7),
            user_cache_ttl_seconds: env_parse_or("USER_CACHE_TTL_SECONDS", 30),
            user_cache_max_entries: env_parse_or("USER_CACHE_MAX_ENTRIES", 10_000),
            rate_limit_per_second: env_parse_or("RATE_LIMIT_PER_SECOND", 10),
            rate_limit_burst_size: env_parse_or("RATE_LIMIT_BURST_SIZE", 100),
            timezone: parse_timezone(env_opt("APP_TIMEZONE").as_deref()),
            scheduler_enabled: env_parse_bool_or("SCHEDULER_ENABLED", true),
            scheduler_daily_hour: env_parse_or("SCHEDULER_DAILY_HOUR", 1u32).min(23),
            geocoder_url: env_or(
                "GEOCODER_URL",
                "https://nominatim.openstreetmap.org/reverse",
            ),
            geocoder_user_agent: env_or("GEOCODER_USER_AGENT", "rental-backend-rs/0.1"),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.trim().eq_ignore_ascii_case("production")
    }

    /// Calendar date in the business timezone. Contract ranges are compared
    /// against this, never against the UTC date.
    pub fn today(&self) -> chrono::NaiveDate {
        chrono::Utc::now().with_timezone(&self.timezone).date_naive()
    }
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn env_parse_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    env_opt(key)
        .and_then(|raw| raw.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_parse_bool_or(key: &str, default: bool) -> bool {
    match env_opt(key).as_deref().map(str::to_ascii_lowercase) {
        Some(value) if value == "1" || value == "true" || value == "yes" || value == "on" => true,
        Some(value) if value == "0" || value == "false" || value == "no" || value == "off" => false,
        Some(_) => default,
        None => default,
    }
}

fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn parse_timezone(raw: Option<&str>) -> Tz {
    match raw.map(str::parse::<Tz>) {
        Some(Ok(tz)) => tz,
        Some(Err(_)) => {
            tracing::warn!("APP_TIMEZONE is not a valid IANA zone, using Asia/Bangkok");
            chrono_tz::Asia::Bangkok
        }
        None => chrono_tz::Asia::Bangkok,
    }
}

fn normalize_prefix(raw: &str) -> String {
    let mut prefix = raw.trim().to_string();
    if prefix.is_empty() {
        return "/api".to_string();
    }
    if !prefix.starts_with('/') {
        prefix.insert(0, '/');
    }
    while prefix.ends_with('/') && prefix.len() > 1 {
        prefix.pop();
    }
    prefix
}

#[cfg(test)]
impl AppConfig {
    pub fn for_tests() -> Self {
        Self {
            app_name: "Rental Manager API".to_string(),
            environment: "test".to_string(),
            api_prefix: "/api".to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origins: vec!["http://localhost:3000".to_string()],
            database_url: None,
            db_pool_max_connections: 1,
            db_pool_min_connections: 0,
            db_pool_acquire_timeout_seconds: 1,
            db_pool_idle_timeout_seconds: 60,
            jwt_secret: Some("test-secret".to_string()),
            jwt_ttl_hours: 1,
            user_cache_ttl_seconds: 1,
            user_cache_max_entries: 16,
            rate_limit_per_second: 10,
            rate_limit_burst_size: 100,
            timezone: chrono_tz::Asia::Bangkok,
            scheduler_enabled: false,
            scheduler_daily_hour: 1,
            geocoder_url: "http://127.0.0.1:9/reverse".to_string(),
            geocoder_user_agent: "rental-backend-rs/test".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{normalize_prefix, parse_csv, parse_timezone};

    #[test]
    fn normalizes_prefix() {
        assert_eq!(normalize_prefix("api"), "/api");
        assert_eq!(normalize_prefix("/api/"), "/api");
        assert_eq!(normalize_prefix(""), "/api");
    }

    #[test]
    fn parses_csv_skipping_blanks() {
        assert_eq!(
            parse_csv(" http://a.test , ,http://b.test"),
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
    }

    #[test]
    fn falls_back_to_bangkok() {
        assert_eq!(parse_timezone(None), chrono_tz::Asia::Bangkok);
        assert_eq!(parse_timezone(Some("Not/AZone")), chrono_tz::Asia::Bangkok);
        assert_eq!(parse_timezone(Some("Europe/Paris")), chrono_tz::Europe::Paris);
    }
}
