//! Integration tests for the power decision engine.
//!
//! Every test drives the engine through a [`ScriptedSource`]; the first
//! scripted reading is always consumed as the baseline.

use std::sync::Arc;

use assert_matches::assert_matches;
use wattgate_core::{
    PowerDecisionEngine, PowerError, PowerMetrics, SafetyLimits, SafetyStatus, ScriptedSource,
    TelemetrySource, ZeroPowerPolicy, MEMORY_TIPS, RUNTIME_TIPS,
};

fn at(power: f64, temperature: f64) -> PowerMetrics {
    PowerMetrics::new(power, temperature, 1800, 9501)
}

fn engine_with(readings: &[PowerMetrics]) -> PowerDecisionEngine<ScriptedSource> {
    let source = readings
        .iter()
        .fold(ScriptedSource::new(), |source, m| source.then(*m));
    PowerDecisionEngine::new(source).expect("baseline sample should succeed")
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// The first sample ever taken becomes the baseline.
#[test]
fn baseline_is_first_sample() {
    let engine = engine_with(&[at(150.0, 45.0), at(300.0, 70.0)]);
    assert_eq!(*engine.baseline(), at(150.0, 45.0));
    assert_eq!(engine.source().calls(), 1);
}

/// A failing baseline sample yields `DeviceInitFailed` and no engine.
#[test]
fn failed_baseline_is_device_init_failure() {
    let source = ScriptedSource::new().then_fail("driver not loaded");
    let result = PowerDecisionEngine::new(source);
    assert_matches!(result, Err(PowerError::DeviceInitFailed(reason)) if reason == "driver not loaded");
}

/// Acquisition failures are reported as `DeviceInitFailed` as well.
#[test]
fn failed_acquisition_is_device_init_failure() {
    let result = PowerDecisionEngine::<ScriptedSource>::acquire(|| {
        Err(PowerError::TelemetryUnavailable("permission denied".into()))
    });
    assert_matches!(result, Err(PowerError::DeviceInitFailed(_)));
}

/// The source is dropped when construction fails, releasing shared handles.
#[test]
fn failed_construction_drops_the_source() {
    let source = Arc::new(ScriptedSource::new().then_fail("device removed"));
    let result = PowerDecisionEngine::new(Arc::clone(&source));
    assert!(result.is_err());
    assert_eq!(Arc::strong_count(&source), 1);
}

// ---------------------------------------------------------------------------
// optimize_batch_size
// ---------------------------------------------------------------------------

/// Baseline 150 W, current 300 W / 70 °C, target 200 W -> floor(32 * 200 / 300) = 21.
#[test]
fn batch_scaled_when_over_target() {
    let engine = engine_with(&[at(150.0, 45.0), at(300.0, 70.0)]);
    assert_eq!(engine.optimize_batch_size(32, 200.0).unwrap(), 21);
}

#[test]
fn batch_unchanged_at_or_below_target() {
    let engine = engine_with(&[at(150.0, 45.0), at(180.0, 60.0), at(200.0, 60.0)]);
    assert_eq!(engine.optimize_batch_size(32, 200.0).unwrap(), 32);
    assert_eq!(engine.optimize_batch_size(32, 200.0).unwrap(), 32);
}

/// A zero power reading is treated as "at or below target".
#[test]
fn zero_power_returns_requested_size() {
    let engine = engine_with(&[at(150.0, 45.0), at(0.0, 40.0)]);
    assert_eq!(engine.optimize_batch_size(32, 200.0).unwrap(), 32);
}

#[test]
fn scaled_batch_never_drops_below_one() {
    let engine = engine_with(&[at(150.0, 45.0), at(400.0, 70.0)]);
    assert_eq!(engine.optimize_batch_size(2, 10.0).unwrap(), 1);
}

#[test]
fn batch_for_workload_uses_leading_dimension() {
    let engine = engine_with(&[at(150.0, 45.0), at(300.0, 70.0)]);
    let shape = vec![32usize, 3, 224, 224];
    assert_eq!(engine.optimize_batch_for(&shape, 200.0).unwrap(), 21);
}

#[test]
fn invalid_batch_inputs_rejected_without_sampling() {
    let engine = engine_with(&[at(150.0, 45.0)]);
    assert_matches!(engine.optimize_batch_size(0, 200.0), Err(PowerError::InvalidInput(_)));
    assert_matches!(engine.optimize_batch_size(8, 0.0), Err(PowerError::InvalidInput(_)));
    assert_matches!(engine.optimize_batch_size(8, f64::NAN), Err(PowerError::InvalidInput(_)));
    assert_eq!(engine.source().calls(), 1);
}

// ---------------------------------------------------------------------------
// suggest_efficient_config / batch_factor
// ---------------------------------------------------------------------------

#[test]
fn suggestion_uses_construction_baseline() {
    let engine = engine_with(&[at(150.0, 45.0), at(300.0, 70.0), at(300.0, 70.0)]);

    let first = engine.suggest_efficient_config().unwrap();
    let second = engine.suggest_efficient_config().unwrap();

    // 150 / 300 * (1 - 0.70) = 0.15 both times: the baseline was not re-sampled.
    assert!((first.batch_factor - 0.15).abs() < 1e-9);
    assert_eq!(first, second);
    assert_eq!(*engine.baseline(), at(150.0, 45.0));
}

#[test]
fn suggestion_carries_static_tips() {
    let engine = engine_with(&[at(150.0, 45.0), at(200.0, 60.0)]);
    let config = engine.suggest_efficient_config().unwrap();
    assert_eq!(config.memory_tips, MEMORY_TIPS);
    assert_eq!(config.runtime_tips, RUNTIME_TIPS);
    assert_eq!(config.memory_tips.len(), 3);
    assert_eq!(config.runtime_tips.len(), 3);
}

#[test]
fn batch_factor_never_exceeds_one() {
    let engine = engine_with(&[at(300.0, 45.0)]);
    for power in [1.0, 50.0, 150.0, 300.0, 600.0] {
        for temperature in [0.0, 30.0, 60.0, 90.0] {
            let factor = engine.batch_factor(&at(power, temperature)).unwrap();
            assert!(factor <= 1.0, "power {power} temp {temperature} gave {factor}");
            assert!(factor >= 0.0);
        }
    }
}

#[test]
fn zero_power_suggestion_follows_policy() {
    let substitute = engine_with(&[at(150.0, 45.0), at(0.0, 50.0)]);
    let config = substitute.suggest_efficient_config().unwrap();
    assert!((config.batch_factor - 0.5).abs() < 1e-9);

    let source = ScriptedSource::new().then(at(150.0, 45.0)).then(at(0.0, 50.0));
    let reject = PowerDecisionEngine::with_policy(source, ZeroPowerPolicy::Reject).unwrap();
    assert_matches!(
        reject.suggest_efficient_config(),
        Err(PowerError::DivisionGuardTriggered { .. })
    );
}

// ---------------------------------------------------------------------------
// Safety gate
// ---------------------------------------------------------------------------

/// 260 W against a 250 W limit fails even though temperature is fine.
#[test]
fn power_over_limit_is_unsafe() {
    let engine = engine_with(&[at(150.0, 45.0), at(260.0, 75.0)]);
    let limits = SafetyLimits::new(250.0).with_temperature(80.0);
    assert!(!engine.is_within_safety_limits(&limits).unwrap());
}

#[test]
fn temperature_over_limit_is_unsafe() {
    let engine = engine_with(&[at(150.0, 45.0), at(200.0, 81.0)]);
    assert_matches!(
        engine.check_safety(&SafetyLimits::new(250.0)),
        Ok(SafetyStatus::TemperatureExceeded { .. })
    );
}

#[test]
fn limits_are_inclusive() {
    let engine = engine_with(&[at(150.0, 45.0), at(250.0, 80.0)]);
    assert!(engine.is_within_safety_limits(&SafetyLimits::new(250.0)).unwrap());
}

/// A reading that cannot be compared against the limits does not pass.
#[test]
fn nan_reading_fails_the_gate() {
    let engine = engine_with(&[at(150.0, 45.0), at(180.0, f64::NAN)]);
    assert!(!engine.is_within_safety_limits(&SafetyLimits::new(250.0)).unwrap());
}

/// Each call re-samples the device.
#[test]
fn safety_gate_is_never_cached() {
    let engine = engine_with(&[at(150.0, 45.0), at(200.0, 60.0), at(270.0, 60.0)]);
    let limits = SafetyLimits::new(250.0);
    assert!(engine.is_within_safety_limits(&limits).unwrap());
    assert!(!engine.is_within_safety_limits(&limits).unwrap());
    assert_eq!(engine.source().calls(), 3);
}

// ---------------------------------------------------------------------------
// Failure handling and lifecycle
// ---------------------------------------------------------------------------

/// A failed sample surfaces as `TelemetryUnavailable` and the engine stays usable.
#[test]
fn telemetry_failures_are_not_sticky() {
    let source = ScriptedSource::new()
        .then(at(150.0, 45.0))
        .then_fail("device removed")
        .then(at(300.0, 70.0));
    let engine = PowerDecisionEngine::new(source).unwrap();

    assert_matches!(
        engine.optimize_batch_size(32, 200.0),
        Err(PowerError::TelemetryUnavailable(_))
    );
    assert_eq!(engine.optimize_batch_size(32, 200.0).unwrap(), 21);
}

#[test]
fn engines_share_nothing() {
    let a = engine_with(&[at(100.0, 40.0), at(300.0, 70.0)]);
    let b = engine_with(&[at(250.0, 60.0), at(300.0, 70.0)]);
    assert_ne!(a.baseline(), b.baseline());
    assert_ne!(
        a.suggest_efficient_config().unwrap().batch_factor,
        b.suggest_efficient_config().unwrap().batch_factor
    );
}

#[test]
fn engine_can_be_sampled_from_many_threads() {
    let engine = Arc::new(engine_with(&[at(150.0, 45.0), at(200.0, 60.0)]));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || engine.is_within_safety_limits(&SafetyLimits::new(250.0)))
        })
        .collect();

    for handle in handles {
        assert!(handle.join().expect("thread").unwrap());
    }
    assert_eq!(engine.source().calls(), 5);
}

#[test]
fn shutdown_releases_source() {
    let engine = engine_with(&[at(150.0, 45.0)]);
    assert!(engine.shutdown().is_ok());
}

#[test]
fn raw_sample_passthrough() {
    let engine = engine_with(&[at(150.0, 45.0), at(175.0, 52.0)]);
    assert_eq!(engine.sample().unwrap(), at(175.0, 52.0));
    assert_eq!(engine.source().describe(), "scripted");
}

#[test]
fn policy_is_reported_and_source_handed_back() {
    let source = ScriptedSource::new().then(at(150.0, 45.0)).then(at(160.0, 50.0));
    let engine = PowerDecisionEngine::with_policy(source, ZeroPowerPolicy::Reject).unwrap();
    assert_eq!(engine.zero_power_policy(), ZeroPowerPolicy::Reject);
    assert_eq!(engine_with(&[at(1.0, 1.0)]).zero_power_policy(), ZeroPowerPolicy::Substitute);

    let source = engine.into_source();
    assert_eq!(source.calls(), 1);
    assert_eq!(source.sample().unwrap(), at(160.0, 50.0));
}
