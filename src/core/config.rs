mod parsing;
mod secret;
mod settings;
mod types;

pub(crate) use types::{ConfigError, Environment, Settings, ThresholdPair, ViolationSettings};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::types::ViolationKind;
    use crate::test_support;

    #[tokio::test]
    async fn load_uses_defaults() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::remove_var("VIOLATION_WARN_THRESHOLD");
        std::env::remove_var("VIOLATION_FORCE_THRESHOLD");
        std::env::remove_var("VIOLATION_UNCOUNTED_TYPES");
        std::env::remove_var("VIOLATION_TYPE_THRESHOLDS");

        let settings = Settings::load().expect("settings");

        assert_eq!(settings.server_addr(), "0.0.0.0:8000");
        assert_eq!(settings.api().api_v1_str, "/api/v1");
        assert_eq!(settings.violations().warn_threshold, 3);
        assert_eq!(settings.violations().force_threshold, 5);
        assert_eq!(settings.violations().uncounted, vec![ViolationKind::WindowBlur]);
        assert!(settings.violations().per_kind.is_empty());
        assert_eq!(settings.runtime().environment, Environment::Test);
        assert!(settings.evaluation().url.is_none());
    }

    #[tokio::test]
    async fn load_rejects_warn_above_force() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::set_var("VIOLATION_WARN_THRESHOLD", "6");
        std::env::set_var("VIOLATION_FORCE_THRESHOLD", "5");

        let result = Settings::load();

        std::env::remove_var("VIOLATION_WARN_THRESHOLD");
        std::env::remove_var("VIOLATION_FORCE_THRESHOLD");
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field: "VIOLATION_WARN_THRESHOLD", .. })
        ));
    }

    #[tokio::test]
    async fn load_rejects_warn_equal_to_force() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::set_var("VIOLATION_WARN_THRESHOLD", "5");
        std::env::set_var("VIOLATION_FORCE_THRESHOLD", "5");

        let result = Settings::load();

        std::env::remove_var("VIOLATION_WARN_THRESHOLD");
        std::env::remove_var("VIOLATION_FORCE_THRESHOLD");
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field: "VIOLATION_WARN_THRESHOLD", .. })
        ));
    }

    #[tokio::test]
    async fn load_parses_violation_overrides() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::set_var("VIOLATION_UNCOUNTED_TYPES", "");
        std::env::set_var("VIOLATION_TYPE_THRESHOLDS", "copy-paste=1:2, tab-switch=2:4");

        let result = Settings::load();

        std::env::remove_var("VIOLATION_UNCOUNTED_TYPES");
        std::env::remove_var("VIOLATION_TYPE_THRESHOLDS");
        let settings = result.expect("settings");
        assert!(settings.violations().uncounted.is_empty());
        assert_eq!(settings.violations().per_kind.len(), 2);
        assert_eq!(settings.violations().per_kind[0].0, ViolationKind::CopyPaste);
        assert_eq!(settings.violations().per_kind[0].1.warn, 1);
        assert_eq!(settings.violations().per_kind[0].1.force, 2);
    }

    #[tokio::test]
    async fn strict_mode_requires_database_password() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::set_var("EXAMS_STRICT_CONFIG", "1");
        std::env::remove_var("DATABASE_URL");
        std::env::remove_var("POSTGRES_PASSWORD");

        let result = Settings::load();

        std::env::set_var("EXAMS_STRICT_CONFIG", "0");
        assert!(matches!(result, Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"))));
    }
}
