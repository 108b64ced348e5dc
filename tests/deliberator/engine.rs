use std::time::Duration;

use tokio_util::sync::CancellationToken;

use spl::{
    deliberator::{
        Deliberator,
        error::{BackendError, BackendErrorKind, invalid_request, unavailable},
        reliability::BreakerStatus,
    },
    types::{Confidence, Request},
};

use crate::support::{SequenceBackend, Step, config};

fn request(content: &str) -> Request {
    Request::new("u1", content)
}

#[tokio::test]
async fn given_transient_failures_when_deliberating_then_retries_until_success() {
    let backend = SequenceBackend::new(vec![
        Step::Fail(unavailable("blip")),
        Step::Fail(unavailable("blip")),
        Step::Answer("billing", 0.93),
    ]);
    let deliberator = Deliberator::new(backend.clone(), config(2, 10));

    let deliberation = deliberator
        .deliberate(&request("Invoice overdue"), &CancellationToken::new())
        .await
        .expect("third attempt succeeds");

    assert_eq!(deliberation.category, "billing");
    assert_eq!(deliberation.attempts, 3);
    assert_eq!(backend.calls(), 3);
    let candidate = deliberation.candidate.expect("confident answer yields a candidate");
    assert_eq!(candidate.name, "learned:billing:invoice");
    assert_eq!(candidate.predicate, r"\binvoice\b");
}

#[tokio::test]
async fn given_non_retryable_failure_when_deliberating_then_no_retry_happens() {
    let backend = SequenceBackend::new(vec![Step::Fail(invalid_request("bad prompt"))]);
    let deliberator = Deliberator::new(backend.clone(), config(3, 10));

    let failure = deliberator
        .deliberate(&request("anything at all"), &CancellationToken::new())
        .await
        .expect_err("invalid request is final");

    assert_eq!(failure.error.kind, BackendErrorKind::InvalidRequest);
    assert_eq!(failure.attempts, 1);
    assert!(failure.backend_invoked());
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn given_slow_backend_when_deliberating_then_timeout_is_a_failure() {
    let backend = SequenceBackend::new(vec![Step::Sleep(Duration::from_millis(500))]);
    let deliberator = Deliberator::new(backend.clone(), config(0, 10));

    let failure = deliberator
        .deliberate(&request("slow question"), &CancellationToken::new())
        .await
        .expect_err("timeout must fail");

    assert_eq!(failure.error.kind, BackendErrorKind::Timeout);
    assert_eq!(failure.attempts, 1);
}

#[tokio::test]
async fn given_repeated_failures_when_breaker_opens_then_calls_fail_fast_without_backend() {
    let backend = SequenceBackend::new(vec![Step::Fail(unavailable("down"))]);
    let deliberator = Deliberator::new(backend.clone(), config(0, 2));
    let cancel = CancellationToken::new();

    for _ in 0..2 {
        deliberator
            .deliberate(&request("probe message"), &cancel)
            .await
            .expect_err("backend is down");
    }
    assert_eq!(deliberator.breaker_status().await, BreakerStatus::Open);

    let failure = deliberator
        .deliberate(&request("probe message"), &cancel)
        .await
        .expect_err("breaker is open");
    assert_eq!(failure.error.kind, BackendErrorKind::CircuitOpen);
    assert!(!failure.backend_invoked());
    assert_eq!(backend.calls(), 2);
}

#[tokio::test]
async fn given_out_of_range_confidence_when_deliberating_then_protocol_violation_is_returned() {
    let backend = SequenceBackend::new(vec![Step::Answer("billing", 1.7)]);
    let deliberator = Deliberator::new(backend, config(0, 10));

    let failure = deliberator
        .deliberate(&request("Invoice overdue"), &CancellationToken::new())
        .await
        .expect_err("confidence above one is rejected");
    assert_eq!(failure.error.kind, BackendErrorKind::ProtocolViolation);
}

#[tokio::test]
async fn given_cancelled_token_when_deliberating_then_backend_is_not_called() {
    let backend = SequenceBackend::new(vec![Step::Answer("billing", 0.9)]);
    let deliberator = Deliberator::new(backend.clone(), config(0, 10));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let failure = deliberator
        .deliberate(&request("Invoice overdue"), &cancel)
        .await
        .expect_err("cancelled before the call");
    assert_eq!(failure.error.kind, BackendErrorKind::Cancelled);
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn given_in_flight_call_when_cancelled_then_deliberation_stops() {
    let backend = SequenceBackend::new(vec![Step::Sleep(Duration::from_millis(40))]);
    let mut slow = config(0, 10);
    slow.request_timeout_ms = 5_000;
    let deliberator = Deliberator::new(backend, slow);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        trigger.cancel();
    });

    let failure = deliberator
        .deliberate(&request("long thinking"), &cancel)
        .await
        .expect_err("cancellation interrupts the call");
    assert_eq!(failure.error.kind, BackendErrorKind::Cancelled);
    assert_eq!(failure.attempts, 1);
}

#[tokio::test]
async fn given_answer_below_learning_threshold_when_deliberating_then_no_candidate() {
    let backend = SequenceBackend::new(vec![Step::Answer("billing", 0.89)]);
    let deliberator = Deliberator::new(backend, config(0, 10));

    let deliberation = deliberator
        .deliberate(&request("Invoice overdue"), &CancellationToken::new())
        .await
        .expect("answer is valid");
    assert_eq!(deliberation.confidence, Confidence::constant(0.89));
    assert!(deliberation.candidate.is_none());
}

#[test]
fn retryable_defaults_follow_the_error_kind() {
    assert!(unavailable("x").retryable);
    assert!(!BackendError::new(BackendErrorKind::ProtocolViolation, "x").retryable);
}
