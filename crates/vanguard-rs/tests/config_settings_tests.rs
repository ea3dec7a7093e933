use std::io::Write;
use vanguard_rs::config::settings::load_settings_from;
use vanguard_rs::config::validation::ConfigValidator;
use vanguard_rs::models::settings::GatewaySettings;

const FULL_CONFIG: &str = r#"{
  "version": 1,
  "discovery": {
    "cache_enabled": true,
    "services": {
      "user-service": [
        {
          "id": "u1",
          "service_name": "user-service",
          "host": "localhost",
          "port": 3001,
          "metadata": { "version": "v1", "region": "eu" }
        },
        {
          "id": "u2",
          "service_name": "user-service",
          "host": "localhost",
          "port": 3002,
          "metadata": { "version": "v2" }
        }
      ]
    }
  },
  "resilience": {
    "default_timeout_ms": 3000,
    "default_retry": { "max_attempts": 3, "backoff_ms": 100 },
    "default_circuit_breaker": {
      "failure_threshold": 5,
      "cooldown_ms": 30000,
      "half_open_max_calls": 3
    }
  },
  "metrics": { "enabled": true, "window_ms": 60000 },
  "routes": [
    {
      "path": "/api/users/**",
      "methods": ["GET", "POST"],
      "service_name": "user-service",
      "strip_prefix": "/api",
      "add_prefix": "/v1",
      "filter": { "metadata": { "region": "eu" } },
      "version_route": {
        "strategy": "header",
        "header": "X-API-Version",
        "routes": {
          "v1": { "weight": 100 },
          "v2": { "weight": 0, "allow_explicit": true }
        }
      },
      "canary": {
        "stable": { "version": "v1", "weight": 90 },
        "canary": { "version": "v2", "weight": 10 },
        "promotion": {
          "strategy": "error-rate",
          "error_threshold": 5,
          "evaluation_window": "5m",
          "step_interval": "10m",
          "steps": [10, 25, 50, 75, 100],
          "auto_promote": true,
          "auto_rollback": true,
          "min_requests": 10
        }
      },
      "traffic_policy": {
        "mirror": { "service": "users-shadow", "percentage": 10 }
      },
      "rate_limit": { "strategy": "sliding-window", "max": 100, "window": 60000 }
    }
  ]
}"#;

fn parse(config: &str) -> GatewaySettings {
    serde_json::from_str(config).expect("config should parse")
}

#[test]
fn full_schema_round_trips_through_serde() {
    let settings = parse(FULL_CONFIG);
    assert_eq!(settings.version, 1);
    assert_eq!(settings.routes.len(), 1);
    assert_eq!(settings.resilience.default_timeout_ms, 3000);
    assert_eq!(settings.discovery.services["user-service"].len(), 2);

    let route = &settings.routes[0];
    assert_eq!(route.service_name, "user-service");
    assert_eq!(route.strip_prefix.as_deref(), Some("/api"));
    assert_eq!(route.rate_limit.as_ref().unwrap().max, 100);

    let canary = route.canary.as_ref().unwrap();
    assert_eq!(canary.stable.weight, 90);
    assert_eq!(
        canary.promotion.evaluation_window.as_millis(),
        5 * 60 * 1000
    );
    assert_eq!(canary.promotion.step_interval.as_millis(), 10 * 60 * 1000);
    assert_eq!(canary.promotion.steps, vec![10, 25, 50, 75, 100]);

    let version_route = route.version_route.as_ref().unwrap();
    assert!(version_route.routes["v2"].allow_explicit);

    assert!(settings.validate().is_ok());
}

#[test]
fn loads_settings_from_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(FULL_CONFIG.as_bytes()).unwrap();

    let settings = load_settings_from(file.path().to_str().unwrap()).unwrap();
    assert_eq!(settings.routes.len(), 1);
}

#[test]
fn missing_file_is_an_error() {
    assert!(load_settings_from("/nonexistent/config.json").is_err());
}

#[test]
fn malformed_json_is_an_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"{ not json").unwrap();
    assert!(load_settings_from(file.path().to_str().unwrap()).is_err());
}

#[test]
fn unsupported_version_fails_validation() {
    let mut settings = parse(FULL_CONFIG);
    settings.version = 2;
    assert!(settings.validate().is_err());
}

#[test]
fn canary_weights_must_sum_to_100() {
    let mut settings = parse(FULL_CONFIG);
    settings.routes[0].canary.as_mut().unwrap().stable.weight = 80;
    assert!(settings.validate().is_err());
}

#[test]
fn canary_steps_must_be_strictly_increasing() {
    let mut settings = parse(FULL_CONFIG);
    settings.routes[0].canary.as_mut().unwrap().promotion.steps = vec![10, 50, 25];
    assert!(settings.validate().is_err());

    settings.routes[0].canary.as_mut().unwrap().promotion.steps = vec![10, 10];
    assert!(settings.validate().is_err());
}

#[test]
fn invalid_method_fails_validation() {
    let mut settings = parse(FULL_CONFIG);
    settings.routes[0].methods = Some(vec!["FETCH".to_string()]);
    assert!(settings.validate().is_err());
}

#[test]
fn invalid_pattern_fails_validation() {
    let mut settings = parse(FULL_CONFIG);
    settings.routes[0].path = "/api/**/users".to_string();
    assert!(settings.validate().is_err());
}

#[test]
fn comprehensive_validation_flags_duplicates_as_errors() {
    let mut settings = parse(FULL_CONFIG);
    let duplicate = settings.routes[0].clone();
    settings.routes.push(duplicate);

    let result = ConfigValidator::validate_comprehensive(&settings);
    assert!(!result.is_valid);
    assert!(result
        .errors
        .iter()
        .any(|e| e.contains("Duplicate route pattern")));
}

#[test]
fn comprehensive_validation_warns_without_failing() {
    let settings = parse(FULL_CONFIG);
    let result = ConfigValidator::validate_comprehensive(&settings);

    assert!(result.is_valid);
    // Canary and version routing on the same route is suspicious but legal
    assert!(result
        .warnings
        .iter()
        .any(|w| w.contains("canary takes precedence")));
}

#[test]
fn unreachable_version_entries_are_warned_about() {
    let mut settings = parse(FULL_CONFIG);
    let version_route = settings.routes[0].version_route.as_mut().unwrap();
    version_route.routes.get_mut("v2").unwrap().allow_explicit = false;

    let result = ConfigValidator::validate_comprehensive(&settings);
    assert!(result.is_valid);
    assert!(result.warnings.iter().any(|w| w.contains("unreachable")));
}
