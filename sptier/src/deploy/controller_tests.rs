//! State machine tests for the auto-retry controller.

use super::*;
use crate::cancellation::CancellationToken;
use crate::errors::AdvisorError;
use crate::testing::{ScriptedResponse, ScriptedStarter, ThresholdStarter};
use crate::tiers::TierTable;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn controller(starter: Arc<dyn ProcessorStarter>) -> AutoRetryController {
    AutoRetryController::new(starter, TierTable::shared_default())
}

fn minimum(tier: &str) -> String {
    format!("Invalid tier for this stream processor. Minimum tier for this workload: {tier} or larger.")
}

fn exhausted(err: AdvisorError) -> crate::errors::ExhaustedError {
    match err {
        AdvisorError::Exhausted(inner) => inner,
        other => panic!("expected Exhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn test_accepted_on_first_attempt() {
    let starter = Arc::new(ScriptedStarter::new().then_accept());
    let deployment = controller(starter.clone())
        .deploy("orders", "SP10", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(deployment.tier, "SP10");
    assert_eq!(deployment.attempts(), 1);
    assert!(!deployment.escalated());
    assert_eq!(
        deployment.states,
        vec![
            AttemptState::Idle,
            AttemptState::Attempting { tier: "SP10".to_string() },
            AttemptState::Succeeded { tier: "SP10".to_string() },
        ]
    );
    assert!(deployment.states.last().unwrap().is_terminal());
}

#[tokio::test]
async fn test_escalates_once_to_suggested_tier() {
    let starter = Arc::new(ScriptedStarter::new().then_reject(minimum("SP30")).then_accept());
    let deployment = controller(starter.clone())
        .deploy("orders", "SP5", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(deployment.tier, "SP30");
    assert!(deployment.escalated());
    assert_eq!(starter.tiers_tried(), vec!["SP5", "SP30"]);
    assert_eq!(deployment.history, vec![AttemptRecord::new("SP5", minimum("SP30"))]);
}

#[tokio::test]
async fn test_same_suggestion_twice_exhausts_within_two_attempts() {
    let starter = Arc::new(
        ScriptedStarter::new()
            .then_reject(minimum("SP10"))
            .then_reject(minimum("SP10"))
            .then_accept(),
    );
    let err = controller(starter.clone())
        .deploy("orders", "SP5", &CancellationToken::new())
        .await
        .unwrap_err();

    let err = exhausted(err);
    assert_eq!(err.reason, ExhaustReason::NoProgress { tier: "SP10".to_string() });
    assert_eq!(err.history.len(), 2);
    assert_eq!(starter.tiers_tried(), vec!["SP5", "SP10"]);
}

#[tokio::test]
async fn test_suggestion_not_larger_exhausts_without_retry() {
    let starter = Arc::new(ScriptedStarter::new().then_reject(minimum("SP5")).then_accept());
    let err = exhausted(
        controller(starter.clone())
            .deploy("orders", "SP10", &CancellationToken::new())
            .await
            .unwrap_err(),
    );
    assert_eq!(err.reason, ExhaustReason::NoProgress { tier: "SP5".to_string() });
    assert_eq!(starter.calls().len(), 1);
}

#[tokio::test]
async fn test_tier_outside_table_is_never_attempted() {
    let starter = Arc::new(ScriptedStarter::new().then_reject(minimum("SP100")).then_accept());
    let err = exhausted(
        controller(starter.clone())
            .deploy("orders", "SP50", &CancellationToken::new())
            .await
            .unwrap_err(),
    );
    assert_eq!(err.reason, ExhaustReason::UnknownTier { tier: "SP100".to_string() });
    assert_eq!(starter.tiers_tried(), vec!["SP50"]);
}

#[tokio::test]
async fn test_unparseable_rejection_exhausts() {
    let starter = Arc::new(ScriptedStarter::new().then_reject("connection 'kafkaProd' not found"));
    let err = exhausted(
        controller(starter)
            .deploy("orders", "SP2", &CancellationToken::new())
            .await
            .unwrap_err(),
    );
    assert_eq!(err.reason, ExhaustReason::UnparseableRejection);
    assert_eq!(err.history[0].rejection_reason, "connection 'kafkaProd' not found");
}

#[tokio::test]
async fn test_parallelism_pair_maps_through_table() {
    let starter = Arc::new(
        ScriptedStarter::new()
            .then_reject("Requested: 40, Limit: 8")
            .then_accept(),
    );
    let deployment = controller(starter)
        .deploy("orders", "SP10", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(deployment.tier, "SP30");
}

#[tokio::test]
async fn test_timeout_counts_as_rejection_without_suggestion() {
    let starter = Arc::new(ScriptedStarter::new().then(ScriptedResponse::Hang));
    let err = exhausted(
        controller(starter)
            .with_attempt_timeout(Duration::from_millis(20))
            .deploy("orders", "SP5", &CancellationToken::new())
            .await
            .unwrap_err(),
    );
    assert_eq!(err.reason, ExhaustReason::Timeout);
    assert_eq!(err.history, vec![AttemptRecord::new("SP5", "timeout")]);
}

#[tokio::test]
async fn test_transport_failure_exhausts() {
    let starter = Arc::new(ScriptedStarter::new().then(ScriptedResponse::Fail("connection reset".into())));
    let err = exhausted(
        controller(starter)
            .deploy("orders", "SP5", &CancellationToken::new())
            .await
            .unwrap_err(),
    );
    assert_eq!(err.reason, ExhaustReason::Transport);
    assert!(err.history[0].rejection_reason.contains("connection reset"));
}

#[tokio::test]
async fn test_cancelled_before_first_attempt() {
    let starter = Arc::new(ScriptedStarter::new().then_accept());
    let token = CancellationToken::new();
    token.cancel("interrupted");

    let err = controller(starter.clone()).deploy("orders", "SP5", &token).await.unwrap_err();
    match err {
        AdvisorError::Cancelled { reason, history } => {
            assert_eq!(reason, "interrupted");
            assert!(history.is_empty());
        }
        other => panic!("expected Cancelled, got {other:?}"),
    }
    assert!(starter.calls().is_empty());
}

#[tokio::test]
async fn test_unknown_initial_tier_is_config_error() {
    let starter = Arc::new(ScriptedStarter::new().then_accept());
    let err = controller(starter.clone())
        .deploy("orders", "SP7", &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.error_kind(), "ConfigError");
    assert!(starter.calls().is_empty());
}

#[tokio::test]
async fn test_initial_tier_is_case_insensitive() {
    let starter = Arc::new(ScriptedStarter::new().then_accept());
    let deployment = controller(starter.clone())
        .deploy("orders", "sp10", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(starter.tiers_tried(), vec!["SP10"]);
    assert_eq!(deployment.tier, "SP10");
    assert_eq!(deployment.requested_tier, "SP10");
    assert!(!deployment.escalated());
}

#[tokio::test]
async fn test_attempts_bounded_by_table_size() {
    let table = TierTable::shared_default();
    let names: Vec<String> = table.tiers().iter().map(|t| t.name.clone()).collect();

    // Every rejection points one tier up, and the top tier points at itself.
    let mut starter = ScriptedStarter::new();
    for next in names.iter().skip(1).chain(names.last()) {
        starter = starter.then_reject(minimum(next));
    }
    let starter = Arc::new(starter);

    let err = exhausted(
        controller(starter.clone())
            .deploy("orders", &names[0], &CancellationToken::new())
            .await
            .unwrap_err(),
    );
    assert_eq!(starter.tiers_tried(), names);
    assert!(err.history.len() <= table.len());
    assert_eq!(err.reason, ExhaustReason::NoProgress { tier: "SP50".to_string() });
}

#[tokio::test]
async fn test_threshold_provider_converges() {
    let table = TierTable::shared_default();
    let starter = Arc::new(ThresholdStarter::new(table.clone()).with_minimum("orders", "SP30"));
    let deployment = AutoRetryController::new(starter.clone(), table)
        .deploy("orders", "SP2", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(deployment.tier, "SP30");
    assert_eq!(deployment.attempts(), 2);
}

#[tokio::test]
async fn test_with_mock_starter() {
    let mut mock = MockProcessorStarter::new();
    mock.expect_start_with_tier()
        .withf(|processor, tier| processor == "orders" && tier == "SP10")
        .times(1)
        .returning(|_, _| Ok(StartOutcome::Accepted));

    let deployment = controller(Arc::new(mock))
        .deploy("orders", "SP10", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(deployment.attempts(), 1);
}

#[tokio::test]
async fn test_provider_rejection_error_is_treated_as_rejection() {
    let mut mock = MockProcessorStarter::new();
    let mut seq = mockall::Sequence::new();
    mock.expect_start_with_tier()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| {
            Err(AdvisorError::ProviderRejection {
                status: 400,
                detail: "Minimum tier for this workload: SP10 or larger.".to_string(),
            })
        });
    mock.expect_start_with_tier()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(StartOutcome::Accepted));

    let deployment = controller(Arc::new(mock))
        .deploy("orders", "SP5", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(deployment.tier, "SP10");
}
