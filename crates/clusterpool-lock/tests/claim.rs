//! Claim protocol tests.
//!
//! Run against the redb-backed registry on an in-memory store, so every
//! conflict below is produced by the store's real version check.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use clusterpool_core::{Labels, LockKeys, labels};
use clusterpool_lock::{ClaimOptions, LockError, LockManager};

use common::*;

#[tokio::test]
async fn locks_the_only_unlocked_cluster() {
    let dir = tempfile::tempdir().unwrap();
    let m = manager(dir.path());
    seed(m.registry(), &[cluster("a", &[]), cluster("b", &["locked=tok1"])]);

    let claim = m.lock(None, &Labels::new()).await.unwrap().unwrap();

    assert_eq!(claim.cluster.name, "a");
    assert_eq!(claim.cluster.labels["locked"], claim.token);
    assert_eq!(stored_labels(m.registry(), "a")["locked"], claim.token);
    assert_eq!(stored_labels(m.registry(), "b")["locked"], "tok1");
}

#[tokio::test]
async fn filter_mismatch_means_no_cluster() {
    let dir = tempfile::tempdir().unwrap();
    let m = manager(dir.path());
    seed(m.registry(), &[cluster("a", &["region=us"])]);

    let result = m.lock(None, &labels::parse(["region=eu"])).await.unwrap();

    assert!(result.is_none());
    assert!(!stored_labels(m.registry(), "a").contains_key("locked"));
}

#[tokio::test]
async fn fully_locked_pool_is_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let m = manager(dir.path());
    seed(
        m.registry(),
        &[cluster("a", &["locked=x"]), cluster("b", &["locked=y"])],
    );

    assert!(m.lock(Some("t1"), &Labels::new()).await.unwrap().is_none());
}

#[tokio::test]
async fn empty_pool_is_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let m = manager(dir.path());
    assert!(m.lock(None, &Labels::new()).await.unwrap().is_none());
}

#[tokio::test]
async fn records_test_name_and_keeps_filter_labels() {
    let dir = tempfile::tempdir().unwrap();
    let m = manager(dir.path());
    seed(m.registry(), &[cluster("a", &["region=us", "kind=gke"])]);

    let claim = m
        .lock(Some("Nightly E2E"), &labels::parse(["region=us"]))
        .await
        .unwrap()
        .unwrap();

    let stored = stored_labels(m.registry(), "a");
    assert_eq!(stored["test"], "nightly-e2e");
    assert_eq!(stored["region"], "us");
    assert_eq!(stored["kind"], "gke");
    assert_eq!(stored["locked"], claim.token);
}

#[tokio::test]
async fn custom_label_keys() {
    let dir = tempfile::tempdir().unwrap();
    let m = manager(dir.path()).with_keys(LockKeys::new("owner", "run"));
    // `locked` means nothing under these keys.
    seed(m.registry(), &[cluster("a", &["locked=stale"]), cluster("b", &["owner=ci-1"])]);

    let claim = m.lock(Some("r1"), &Labels::new()).await.unwrap().unwrap();

    assert_eq!(claim.cluster.name, "a");
    assert_eq!(claim.cluster.labels["owner"], claim.token);
    assert_eq!(claim.cluster.labels["run"], "r1");
    assert_eq!(claim.cluster.labels["locked"], "stale");
}

#[tokio::test]
async fn lost_race_moves_to_next_candidate() {
    let dir = tempfile::tempdir().unwrap();
    let m = faulty_manager(dir.path(), Fault::RivalClaims { times: 1 });
    seed(&m.registry().inner, &[cluster("a", &[]), cluster("b", &[])]);

    let claim = m.lock(None, &Labels::new()).await.unwrap().unwrap();

    assert_eq!(m.registry().update_calls(), 2);
    let rival = if claim.cluster.name == "a" { "b" } else { "a" };
    assert_eq!(stored_labels(&m.registry().inner, rival)["locked"], "rival");
    assert_eq!(
        stored_labels(&m.registry().inner, &claim.cluster.name)["locked"],
        claim.token
    );
}

#[tokio::test]
async fn lost_race_on_last_candidate_means_no_cluster() {
    let dir = tempfile::tempdir().unwrap();
    let m = faulty_manager(dir.path(), Fault::RivalClaims { times: 1 });
    seed(&m.registry().inner, &[cluster("a", &[])]);

    let result = m.lock(None, &Labels::new()).await.unwrap();

    assert!(result.is_none());
    // Conflicting candidates are not retried.
    assert_eq!(m.registry().update_calls(), 1);
    assert_eq!(stored_labels(&m.registry().inner, "a")["locked"], "rival");
}

#[tokio::test]
async fn systemic_error_aborts_without_trying_other_candidates() {
    let dir = tempfile::tempdir().unwrap();
    let m = faulty_manager(dir.path(), Fault::FailUpdate);
    seed(&m.registry().inner, &[cluster("a", &[]), cluster("b", &[]), cluster("c", &[])]);

    let err = m.lock(None, &Labels::new()).await.unwrap_err();

    assert!(
        matches!(&err, LockError::Registry { op: "update_labels", message, .. } if message == "connection reset"),
        "unexpected error: {err}"
    );
    assert!(err.is_registry_failure());
    assert_eq!(m.registry().update_calls(), 1);
}

#[tokio::test]
async fn list_failure_is_an_error_not_an_empty_pool() {
    let dir = tempfile::tempdir().unwrap();
    let m = faulty_manager(dir.path(), Fault::FailList);
    seed(&m.registry().inner, &[cluster("a", &[])]);

    let err = m.lock(None, &Labels::new()).await.unwrap_err();

    assert!(matches!(err, LockError::Registry { op: "list", .. }), "unexpected error: {err}");
    assert!(err.to_string().contains("redb:in-memory"));
}

#[tokio::test]
async fn timed_out_write_fails_instead_of_moving_on() {
    let dir = tempfile::tempdir().unwrap();
    let m = faulty_manager(dir.path(), Fault::SlowUpdate(Duration::from_secs(30))).with_options(
        ClaimOptions {
            op_timeout: Duration::from_millis(50),
            conflict_backoff: Duration::ZERO,
        },
    );
    seed(&m.registry().inner, &[cluster("a", &[]), cluster("b", &[])]);

    let err = m.lock(None, &Labels::new()).await.unwrap_err();

    assert!(matches!(err, LockError::Timeout { op: "update_labels", .. }), "unexpected error: {err}");
    assert_eq!(m.registry().update_calls(), 1);
}

#[tokio::test]
async fn conflict_pause_still_claims() {
    let dir = tempfile::tempdir().unwrap();
    let m = faulty_manager(dir.path(), Fault::RivalClaims { times: 1 }).with_options(ClaimOptions {
        op_timeout: Duration::from_secs(5),
        conflict_backoff: Duration::from_millis(20),
    });
    seed(&m.registry().inner, &[cluster("a", &[]), cluster("b", &[])]);

    assert!(m.lock(None, &Labels::new()).await.unwrap().is_some());
}

#[tokio::test]
async fn exhausted_claim_returns_without_pausing() {
    let dir = tempfile::tempdir().unwrap();
    let m = faulty_manager(dir.path(), Fault::RivalClaims { times: 1 }).with_options(ClaimOptions {
        op_timeout: Duration::from_secs(5),
        conflict_backoff: Duration::from_secs(3600),
    });
    seed(&m.registry().inner, &[cluster("a", &[])]);

    let result = tokio::time::timeout(Duration::from_secs(5), m.lock(None, &Labels::new()))
        .await
        .expect("no pause after the last candidate")
        .unwrap();

    assert!(result.is_none());
}

#[tokio::test]
async fn two_concurrent_callers_one_cluster() {
    let dir = tempfile::tempdir().unwrap();
    let registry = store_registry(dir.path());
    seed(&registry, &[cluster("a", &[])]);

    let first = Arc::new(LockManager::new(registry.clone()).with_options(fast_options()));
    let second = Arc::new(LockManager::new(registry.clone()).with_options(fast_options()));

    let (r1, r2) = tokio::join!(
        tokio::spawn({
            let m = first.clone();
            async move { m.lock(Some("run-1"), &Labels::new()).await }
        }),
        tokio::spawn({
            let m = second.clone();
            async move { m.lock(Some("run-2"), &Labels::new()).await }
        }),
    );
    let results = [r1.unwrap().unwrap(), r2.unwrap().unwrap()];

    let winners: Vec<_> = results.iter().flatten().collect();
    assert_eq!(winners.len(), 1, "exactly one caller must win: {results:?}");
    assert_eq!(stored_labels(&registry, "a")["locked"], winners[0].token);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_callers_never_share_a_cluster() {
    let dir = tempfile::tempdir().unwrap();
    let registry = store_registry(dir.path());
    seed(
        &registry,
        &[cluster("a", &[]), cluster("b", &[]), cluster("c", &[])],
    );

    let mut handles = Vec::new();
    for i in 0..12 {
        let m = LockManager::new(registry.clone()).with_options(fast_options());
        handles.push(tokio::spawn(async move {
            m.lock(Some(&format!("run-{i}")), &Labels::new()).await
        }));
    }

    let mut claims = Vec::new();
    for handle in handles {
        if let Some(claim) = handle.await.unwrap().unwrap() {
            claims.push(claim);
        }
    }

    assert!(claims.len() <= 3);
    let names: HashSet<_> = claims.iter().map(|c| c.cluster.name.clone()).collect();
    assert_eq!(names.len(), claims.len(), "a cluster was handed out twice");
    for claim in &claims {
        assert_eq!(
            stored_labels(&registry, &claim.cluster.name)["locked"],
            claim.token,
            "claim on {} was overwritten",
            claim.cluster.name
        );
    }
}
