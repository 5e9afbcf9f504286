use super::parsing::{
    env_optional, env_or_default, is_valid_cookie_name, normalize_key_prefix, parse_bool,
    parse_cors_origins, parse_environment, parse_u16, parse_u64,
};
use super::secret::load_or_create_secret_key;
use super::types::{
    ApiSettings, AttemptSettings, ConfigError, CorsSettings, DatabaseSettings,
    InternalApiSettings, RedisSettings, RuntimeSettings, S3Settings, SecuritySettings,
    ServerHost, ServerPort, ServerSettings, Settings, TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("LMS_HOST", "0.0.0.0");
        let port = env_or_default("LMS_PORT", "8080");

        let environment =
            parse_environment(env_optional("LMS_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("LMS_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "LMS Testing API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let secret_key = match env_optional("SECRET_KEY") {
            Some(value) => value,
            None => load_or_create_secret_key(),
        };

        let algorithm = env_or_default("ALGORITHM", "HS256");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "lms");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "lms_testing");
        let database_url = env_optional("DATABASE_URL");

        let redis_host = env_or_default("REDIS_HOST", "localhost");
        let redis_port = parse_u16("REDIS_PORT", env_or_default("REDIS_PORT", "6379"))?;
        let redis_db = parse_u16("REDIS_DB", env_or_default("REDIS_DB", "0"))?;
        let redis_password = env_or_default("REDIS_PASSWORD", "");

        let s3_endpoint = env_or_default("S3_ENDPOINT", "http://localhost:9000");
        let s3_access_key = env_or_default("S3_ACCESS_KEY", "");
        let s3_secret_key = env_or_default("S3_SECRET_KEY", "");
        let s3_bucket = env_or_default("S3_BUCKET", "testing-snapshots");
        let s3_region = env_or_default("S3_REGION", "us-east-1");
        let snapshot_prefix = normalize_key_prefix(&env_or_default("SNAPSHOT_PREFIX", "snapshots"));

        let save_rate_limit =
            parse_u64("SAVE_RATE_LIMIT", env_or_default("SAVE_RATE_LIMIT", "60"))?;
        let save_rate_window_seconds = parse_u64(
            "SAVE_RATE_WINDOW_SECONDS",
            env_or_default("SAVE_RATE_WINDOW_SECONDS", "60"),
        )?;
        let student_cookie_name = env_or_default("STUDENT_COOKIE_NAME", "testing_student_id");
        let student_cookie_max_age_days = parse_u64(
            "STUDENT_COOKIE_MAX_AGE_DAYS",
            env_or_default("STUDENT_COOKIE_MAX_AGE_DAYS", "365"),
        )?;

        let internal_api_token = env_or_default("INTERNAL_API_TOKEN", "");

        let log_level = env_or_default("LMS_LOG_LEVEL", "info");
        let json = env_optional("LMS_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            security: SecuritySettings { secret_key, algorithm },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
            },
            redis: RedisSettings {
                host: redis_host,
                port: redis_port,
                db: redis_db,
                password: redis_password,
            },
            s3: S3Settings {
                endpoint: s3_endpoint,
                access_key: s3_access_key,
                secret_key: s3_secret_key,
                bucket: s3_bucket,
                region: s3_region,
                snapshot_prefix,
            },
            attempts: AttemptSettings {
                save_rate_limit,
                save_rate_window_seconds,
                student_cookie_name,
                student_cookie_max_age_days,
            },
            internal: InternalApiSettings { token: internal_api_token },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn security(&self) -> &SecuritySettings {
        &self.security
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn redis(&self) -> &RedisSettings {
        &self.redis
    }

    pub(crate) fn s3(&self) -> &S3Settings {
        &self.s3
    }

    pub(crate) fn attempts(&self) -> &AttemptSettings {
        &self.attempts
    }

    pub(crate) fn internal(&self) -> &InternalApiSettings {
        &self.internal
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.s3.snapshot_prefix.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "SNAPSHOT_PREFIX",
                value: String::from("<empty>"),
            });
        }

        if self.attempts.save_rate_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "SAVE_RATE_LIMIT",
                value: "0".to_string(),
            });
        }

        if self.attempts.save_rate_window_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "SAVE_RATE_WINDOW_SECONDS",
                value: "0".to_string(),
            });
        }

        if !is_valid_cookie_name(&self.attempts.student_cookie_name) {
            return Err(ConfigError::InvalidValue {
                field: "STUDENT_COOKIE_NAME",
                value: self.attempts.student_cookie_name.clone(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }
        if !self.s3.is_configured() {
            return Err(ConfigError::MissingSecret("S3_ACCESS_KEY/S3_SECRET_KEY"));
        }
        if self.internal.token.is_empty() {
            return Err(ConfigError::MissingSecret("INTERNAL_API_TOKEN"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Settings;
    use crate::core::config::ConfigError;
    use crate::test_support;

    #[tokio::test]
    async fn defaults_load_in_development() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();

        let settings = Settings::load().expect("settings");
        assert_eq!(settings.s3().snapshot_prefix, "snapshots");
        assert_eq!(settings.attempts().student_cookie_name, "testing_student_id");
        assert!(!settings.s3().is_configured());
    }

    #[tokio::test]
    async fn strict_mode_requires_internal_token() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        test_support::set_test_storage_env();
        std::env::set_var("LMS_STRICT_CONFIG", "1");
        std::env::remove_var("INTERNAL_API_TOKEN");

        let result = Settings::load();
        std::env::set_var("LMS_STRICT_CONFIG", "0");

        assert!(matches!(result, Err(ConfigError::MissingSecret("INTERNAL_API_TOKEN"))));
    }

    #[tokio::test]
    async fn zero_rate_window_is_rejected() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::set_var("SAVE_RATE_WINDOW_SECONDS", "0");

        let result = Settings::load();
        std::env::remove_var("SAVE_RATE_WINDOW_SECONDS");

        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field: "SAVE_RATE_WINDOW_SECONDS", .. })
        ));
    }
}
