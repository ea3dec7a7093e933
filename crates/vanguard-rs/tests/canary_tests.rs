use std::sync::Arc;
use std::time::Duration;
use vanguard_rs::models::route::{
    CanaryConfig, PromotionPolicy, PromotionStrategy, VersionWeight,
};
use vanguard_rs::services::canary::{CanaryDecision, CanaryEngine, CanaryState, CanaryTarget};
use vanguard_rs::services::events::{CollectingEventSink, EventKind, EventSink};
use vanguard_rs::utils::duration::DurationValue;

const EVAL_WINDOW: Duration = Duration::from_secs(300);
const STEP_INTERVAL: Duration = Duration::from_secs(600);

fn canary_config(auto_promote: bool, auto_rollback: bool) -> CanaryConfig {
    CanaryConfig {
        stable: VersionWeight {
            version: "v1".to_string(),
            weight: 90,
        },
        canary: VersionWeight {
            version: "v2".to_string(),
            weight: 10,
        },
        promotion: PromotionPolicy {
            strategy: PromotionStrategy::ErrorRate,
            error_threshold: 5.0,
            latency_threshold_ms: 1_000,
            min_requests: 10,
            evaluation_window: DurationValue(EVAL_WINDOW),
            step_interval: DurationValue(STEP_INTERVAL),
            steps: vec![10, 25, 50, 75, 100],
            auto_promote,
            auto_rollback,
        },
    }
}

fn engine_with_sink(config: CanaryConfig) -> (CanaryEngine, Arc<CollectingEventSink>) {
    let sink = Arc::new(CollectingEventSink::new());
    let events: Arc<dyn EventSink> = sink.clone();
    let engine = CanaryEngine::new("/api/users/**", "user-service", config, events);
    (engine, sink)
}

fn drive_traffic(engine: &CanaryEngine, successes: u32, failures: u32) {
    for _ in 0..successes {
        engine.record_success(CanaryTarget::Canary, Duration::from_millis(20));
    }
    for _ in 0..failures {
        engine.record_failure(CanaryTarget::Canary, Duration::from_millis(20), Some("500"));
    }
}

fn assert_weights_sum_to_100(engine: &CanaryEngine) {
    let status = engine.status();
    assert!(status.canary_weight <= 100);
    assert_eq!(status.stable_weight + status.canary_weight, 100);
}

#[tokio::test]
async fn initial_state_uses_configured_weights() {
    let (engine, _) = engine_with_sink(canary_config(true, true));
    let status = engine.status();

    assert_eq!(status.state, CanaryState::Active);
    assert_eq!(status.canary_weight, 10);
    assert_eq!(status.stable_weight, 90);
    assert_eq!(status.stable_version, "v1");
    assert_eq!(status.canary_version, "v2");
    assert_eq!(status.step_index, None);
    assert_eq!(status.total_steps, 5);
    assert_weights_sum_to_100(&engine);
}

#[tokio::test]
async fn select_version_honors_weight_extremes() {
    let (engine, _) = engine_with_sink(CanaryConfig {
        stable: VersionWeight {
            version: "v1".to_string(),
            weight: 100,
        },
        canary: VersionWeight {
            version: "v2".to_string(),
            weight: 0,
        },
        promotion: canary_config(true, true).promotion,
    });

    for _ in 0..100 {
        assert_eq!(engine.select_version(), CanaryTarget::Stable);
    }
    assert_eq!(engine.version_of(CanaryTarget::Stable), "v1");
    assert_eq!(engine.version_of(CanaryTarget::Canary), "v2");
}

#[tokio::test]
async fn evaluation_holds_below_min_requests() {
    let (engine, sink) = engine_with_sink(canary_config(true, true));
    drive_traffic(&engine, 5, 4);

    assert_eq!(engine.evaluate_now(), CanaryDecision::Hold);
    let status = engine.status();
    assert_eq!(status.state, CanaryState::Active);
    assert_eq!(status.canary_weight, 10);
    assert!(status.last_evaluation.is_some());
    assert_eq!(sink.count(EventKind::CanaryRollback), 0);
    assert_eq!(sink.count(EventKind::CanaryPromote), 0);
}

#[tokio::test]
async fn error_rate_breach_rolls_back_automatically() {
    let (engine, sink) = engine_with_sink(canary_config(true, true));
    // 4 failures out of 20 = 20% failure rate, threshold is 5%
    drive_traffic(&engine, 16, 4);

    assert_eq!(engine.evaluate_now(), CanaryDecision::Rollback);

    let status = engine.status();
    assert_eq!(status.state, CanaryState::RolledBack);
    assert_eq!(status.canary_weight, 0);
    assert_eq!(status.stable_weight, 100);
    assert_weights_sum_to_100(&engine);

    let rollbacks: Vec<_> = sink
        .events()
        .into_iter()
        .filter(|e| e.kind == EventKind::CanaryRollback)
        .collect();
    assert_eq!(rollbacks.len(), 1);
    assert_eq!(rollbacks[0].data["trigger"], serde_json::json!("auto"));
    assert_eq!(rollbacks[0].route, "/api/users/**");
    assert_eq!(rollbacks[0].service, "user-service");
}

#[tokio::test]
async fn rolled_back_engine_is_frozen() {
    let (engine, sink) = engine_with_sink(canary_config(true, true));
    drive_traffic(&engine, 0, 20);
    engine.evaluate_now();
    assert_eq!(engine.status().state, CanaryState::RolledBack);

    // No further evaluation, promotion, or pause changes anything
    drive_traffic(&engine, 50, 0);
    assert_eq!(engine.evaluate_now(), CanaryDecision::Hold);
    engine.promote();
    engine.pause();

    let status = engine.status();
    assert_eq!(status.state, CanaryState::RolledBack);
    assert_eq!(status.canary_weight, 0);
    assert_eq!(sink.count(EventKind::CanaryPromote), 0);
}

#[tokio::test(start_paused = true)]
async fn healthy_canary_schedules_one_step_advance() {
    let (engine, sink) = engine_with_sink(canary_config(true, true));
    drive_traffic(&engine, 20, 0);

    assert_eq!(engine.evaluate_now(), CanaryDecision::Promote);
    // A second healthy evaluation must not stack another timer
    assert_eq!(engine.evaluate_now(), CanaryDecision::Promote);

    // Weight is unchanged until the step interval elapses
    assert_eq!(engine.status().canary_weight, 10);

    tokio::time::sleep(STEP_INTERVAL + Duration::from_millis(10)).await;

    let status = engine.status();
    assert_eq!(status.canary_weight, 25);
    assert_eq!(status.stable_weight, 75);
    assert_eq!(status.step_index, Some(1));
    assert_eq!(sink.count(EventKind::CanaryPromote), 1);
    assert_weights_sum_to_100(&engine);
}

#[tokio::test(start_paused = true)]
async fn progression_reaches_promoted_and_stops() {
    let (engine, sink) = engine_with_sink(canary_config(true, true));

    // Walk the whole progression: 10 -> 25 -> 50 -> 75 -> 100
    for expected in [25, 50, 75, 100] {
        drive_traffic(&engine, 20, 0);
        engine.evaluate_now();
        tokio::time::sleep(STEP_INTERVAL + Duration::from_millis(10)).await;
        assert_eq!(engine.status().canary_weight, expected);
    }

    let status = engine.status();
    assert_eq!(status.state, CanaryState::Promoted);
    assert_eq!(status.canary_weight, 100);
    assert_eq!(status.stable_weight, 0);
    assert_eq!(sink.count(EventKind::CanaryComplete), 1);
    assert_eq!(sink.count(EventKind::CanaryPromote), 4);

    // Promoted engines accept no further transitions
    drive_traffic(&engine, 0, 20);
    assert_eq!(engine.evaluate_now(), CanaryDecision::Hold);
    engine.rollback();
    assert_eq!(engine.status().state, CanaryState::Promoted);

    for _ in 0..50 {
        assert_eq!(engine.select_version(), CanaryTarget::Canary);
    }
}

#[tokio::test]
async fn automation_flags_turn_decisions_into_holds() {
    let (engine, sink) = engine_with_sink(canary_config(false, true));
    drive_traffic(&engine, 20, 0);
    assert_eq!(engine.evaluate_now(), CanaryDecision::Hold);
    assert_eq!(sink.count(EventKind::CanaryPromote), 0);

    let (engine, sink) = engine_with_sink(canary_config(true, false));
    drive_traffic(&engine, 0, 20);
    assert_eq!(engine.evaluate_now(), CanaryDecision::Hold);
    assert_eq!(engine.status().state, CanaryState::Active);
    assert_eq!(sink.count(EventKind::CanaryRollback), 0);
}

#[tokio::test]
async fn latency_strategy_compares_p99() {
    let mut config = canary_config(true, true);
    config.promotion.strategy = PromotionStrategy::Latency;
    config.promotion.latency_threshold_ms = 100;
    config.promotion.auto_promote = false;

    let (engine, _) = engine_with_sink(config);
    for _ in 0..20 {
        engine.record_success(CanaryTarget::Canary, Duration::from_millis(250));
    }

    assert_eq!(engine.evaluate_now(), CanaryDecision::Rollback);
    assert_eq!(engine.status().state, CanaryState::RolledBack);
}

#[tokio::test]
async fn custom_evaluator_drives_decisions() {
    let mut config = canary_config(true, true);
    config.promotion.strategy = PromotionStrategy::Custom;

    let (engine, _) = engine_with_sink(config);
    drive_traffic(&engine, 20, 0);

    // Without an installed evaluator the engine holds
    assert_eq!(engine.evaluate_now(), CanaryDecision::Hold);

    engine.set_custom_evaluator(|snapshot| {
        if snapshot.total_calls >= 20 {
            CanaryDecision::Rollback
        } else {
            CanaryDecision::Hold
        }
    });
    assert_eq!(engine.evaluate_now(), CanaryDecision::Rollback);
    assert_eq!(engine.status().state, CanaryState::RolledBack);
}

#[tokio::test]
async fn manual_rollback_reports_manual_trigger() {
    let (engine, sink) = engine_with_sink(canary_config(true, true));
    engine.rollback();

    let rollbacks: Vec<_> = sink
        .events()
        .into_iter()
        .filter(|e| e.kind == EventKind::CanaryRollback)
        .collect();
    assert_eq!(rollbacks.len(), 1);
    assert_eq!(rollbacks[0].data["trigger"], serde_json::json!("manual"));
}

#[tokio::test]
async fn manual_promote_advances_immediately() {
    let (engine, sink) = engine_with_sink(canary_config(true, true));
    engine.promote();

    let status = engine.status();
    assert_eq!(status.canary_weight, 25);
    assert_eq!(status.step_index, Some(1));
    assert_eq!(sink.count(EventKind::CanaryPromote), 1);
}

#[tokio::test(start_paused = true)]
async fn pause_preserves_weights_and_resume_restarts_evaluation() {
    let (engine, sink) = engine_with_sink(canary_config(true, true));
    engine.start();
    assert_eq!(sink.count(EventKind::CanaryStarted), 1);

    engine.pause();
    let status = engine.status();
    assert_eq!(status.state, CanaryState::Paused);
    assert_eq!(status.canary_weight, 10);
    assert_eq!(sink.count(EventKind::CanaryPaused), 1);

    // Paused engines evaluate to hold even with plenty of bad traffic
    drive_traffic(&engine, 0, 20);
    assert_eq!(engine.evaluate_now(), CanaryDecision::Hold);
    assert_eq!(engine.status().state, CanaryState::Paused);

    engine.resume();
    assert_eq!(engine.status().state, CanaryState::Active);
    assert_eq!(sink.count(EventKind::CanaryResumed), 1);

    // The restarted evaluation loop picks up the recorded failures
    tokio::time::sleep(EVAL_WINDOW + Duration::from_millis(10)).await;
    assert_eq!(engine.status().state, CanaryState::RolledBack);

    engine.stop();
}

#[tokio::test(start_paused = true)]
async fn evaluation_loop_rolls_back_unhealthy_canary() {
    let (engine, sink) = engine_with_sink(canary_config(true, true));
    drive_traffic(&engine, 16, 4);
    engine.start();

    tokio::time::sleep(EVAL_WINDOW + Duration::from_millis(10)).await;

    assert_eq!(engine.status().state, CanaryState::RolledBack);
    assert_eq!(engine.status().canary_weight, 0);
    assert_eq!(sink.count(EventKind::CanaryRollback), 1);

    // Terminal transition cleared the timers; more windows change nothing
    tokio::time::sleep(EVAL_WINDOW * 3).await;
    assert_eq!(sink.count(EventKind::CanaryRollback), 1);
    assert_eq!(sink.count(EventKind::CanaryPromote), 0);
}

#[tokio::test]
async fn reset_is_the_only_exit_from_terminal_states() {
    let (engine, _) = engine_with_sink(canary_config(true, true));
    drive_traffic(&engine, 0, 20);
    engine.evaluate_now();
    assert_eq!(engine.status().state, CanaryState::RolledBack);

    engine.reset();
    let status = engine.status();
    assert_eq!(status.state, CanaryState::Active);
    assert_eq!(status.canary_weight, 10);
    assert_eq!(status.step_index, None);
    assert_eq!(status.canary_metrics.total_calls, 0);
}

#[tokio::test]
async fn start_and_stop_are_idempotent() {
    let (engine, sink) = engine_with_sink(canary_config(true, true));
    engine.start();
    engine.start();
    assert_eq!(sink.count(EventKind::CanaryStarted), 1);

    engine.stop();
    engine.stop();
}
