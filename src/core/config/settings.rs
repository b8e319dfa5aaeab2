use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_cors_origins, parse_environment,
    parse_kind_thresholds, parse_u16, parse_u32, parse_u64, parse_violation_kinds,
};
use super::secret::resolve_secret_key;
use super::types::{
    ApiSettings, AttemptSettings, ConfigError, CorsSettings, DatabaseSettings,
    EvaluationSettings, RedisSettings, RuntimeSettings, SecuritySettings, ServerHost, ServerPort,
    ServerSettings, Settings, TelemetrySettings, ViolationSettings,
};

const DEFAULT_UNCOUNTED_KINDS: &[&str] = &["window-blur"];

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("EXAMS_HOST", "0.0.0.0");
        let port = env_or_default("EXAMS_PORT", "8000");

        let environment =
            parse_environment(env_optional("EXAMS_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("EXAMS_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Proctored Exams API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let secret_key = resolve_secret_key(env_optional("SECRET_KEY"));
        let access_token_expire_minutes = parse_u64(
            "ACCESS_TOKEN_EXPIRE_MINUTES",
            env_or_default("ACCESS_TOKEN_EXPIRE_MINUTES", "720"),
        )?;
        let algorithm = env_or_default("ALGORITHM", "HS256");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "exams");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "exams_db");
        let database_url = env_optional("DATABASE_URL");
        let max_connections = parse_u32(
            "DATABASE_MAX_CONNECTIONS",
            env_or_default("DATABASE_MAX_CONNECTIONS", "20"),
        )?;

        let redis_host = env_or_default("REDIS_HOST", "localhost");
        let redis_port = parse_u16("REDIS_PORT", env_or_default("REDIS_PORT", "6379"))?;
        let redis_db = parse_u16("REDIS_DB", env_or_default("REDIS_DB", "0"))?;
        let redis_password = env_or_default("REDIS_PASSWORD", "");

        let start_rate_limit_per_minute = parse_u64(
            "START_RATE_LIMIT_PER_MINUTE",
            env_or_default("START_RATE_LIMIT_PER_MINUTE", "20"),
        )?;
        let sweep_interval_seconds = parse_u64(
            "ATTEMPT_SWEEP_INTERVAL_SECONDS",
            env_or_default("ATTEMPT_SWEEP_INTERVAL_SECONDS", "60"),
        )?;
        let integrity_check_interval_seconds = parse_u64(
            "INTEGRITY_CHECK_INTERVAL_SECONDS",
            env_or_default("INTEGRITY_CHECK_INTERVAL_SECONDS", "900"),
        )?;

        let warn_threshold = parse_u32(
            "VIOLATION_WARN_THRESHOLD",
            env_or_default("VIOLATION_WARN_THRESHOLD", "3"),
        )?;
        let force_threshold = parse_u32(
            "VIOLATION_FORCE_THRESHOLD",
            env_or_default("VIOLATION_FORCE_THRESHOLD", "5"),
        )?;
        let uncounted = parse_violation_kinds(
            std::env::var("VIOLATION_UNCOUNTED_TYPES").ok(),
            DEFAULT_UNCOUNTED_KINDS,
        );
        let per_kind = parse_kind_thresholds(env_optional("VIOLATION_TYPE_THRESHOLDS"))?;

        let evaluation_url = env_optional("EVALUATION_URL");
        let evaluation_api_key = env_or_default("EVALUATION_API_KEY", "");
        let evaluation_timeout = parse_u64(
            "EVALUATION_TIMEOUT_SECONDS",
            env_or_default("EVALUATION_TIMEOUT_SECONDS", "15"),
        )?;

        let log_level = env_or_default("EXAMS_LOG_LEVEL", "info");
        let json = env_optional("EXAMS_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            security: SecuritySettings { secret_key, access_token_expire_minutes, algorithm },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
                max_connections,
            },
            redis: RedisSettings {
                host: redis_host,
                port: redis_port,
                db: redis_db,
                password: redis_password,
            },
            attempts: AttemptSettings {
                start_rate_limit_per_minute,
                sweep_interval_seconds,
                integrity_check_interval_seconds,
            },
            violations: ViolationSettings { warn_threshold, force_threshold, uncounted, per_kind },
            evaluation: EvaluationSettings {
                url: evaluation_url,
                api_key: evaluation_api_key,
                request_timeout_seconds: evaluation_timeout,
            },
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

    pub(crate) fn attempts(&self) -> &AttemptSettings {
        &self.attempts
    }

    pub(crate) fn violations(&self) -> &ViolationSettings {
        &self.violations
    }

    pub(crate) fn evaluation(&self) -> &EvaluationSettings {
        &self.evaluation
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.violations.force_threshold == 0 {
            return Err(ConfigError::InvalidValue {
                field: "VIOLATION_FORCE_THRESHOLD",
                value: "0".to_string(),
            });
        }

        if self.violations.warn_threshold >= self.violations.force_threshold {
            return Err(ConfigError::InvalidValue {
                field: "VIOLATION_WARN_THRESHOLD",
                value: self.violations.warn_threshold.to_string(),
            });
        }

        if self.attempts.sweep_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "ATTEMPT_SWEEP_INTERVAL_SECONDS",
                value: "0".to_string(),
            });
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                field: "DATABASE_MAX_CONNECTIONS",
                value: "0".to_string(),
            });
        }

        if let Some(url) = &self.evaluation.url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidValue {
                    field: "EVALUATION_URL",
                    value: url.clone(),
                });
            }
        }

        if !self.runtime.strict_config {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }
        if self.security.secret_key.len() < 32 {
            return Err(ConfigError::MissingSecret("SECRET_KEY"));
        }
        if self.evaluation.url.is_some() && self.evaluation.api_key.is_empty() {
            return Err(ConfigError::MissingSecret("EVALUATION_API_KEY"));
        }

        Ok(())
    }
}
