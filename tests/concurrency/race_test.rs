//! Writers racing on one natural key get exactly one success and a
//! `Conflict` for everyone else. No racer sees an internal error.

use warden::association::ExecutionTiming;
use warden::{ErrorKind, Result};

use crate::common::{new_guardrail, on_disk_fixture, r};

const RACERS: usize = 8;

/// Count successes and collect the kinds of every failure.
async fn settle<T>(handles: Vec<tokio::task::JoinHandle<Result<T>>>) -> (usize, Vec<ErrorKind>) {
    let mut ok = 0;
    let mut failures = Vec::new();
    for handle in handles {
        match handle.await.expect("racer panicked") {
            Ok(_) => ok += 1,
            Err(e) => failures.push(e.kind()),
        }
    }
    (ok, failures)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_creates_yield_one_guardrail() {
    let (fx, _dir) = on_disk_fixture().await;

    let handles = (0..RACERS)
        .map(|_| {
            let warden = fx.warden.clone();
            tokio::spawn(async move { warden.guardrails.create(new_guardrail("pii")).await })
        })
        .collect();
    let (ok, failures) = settle(handles).await;

    assert_eq!(ok, 1);
    assert_eq!(failures, vec![ErrorKind::Conflict; RACERS - 1]);
    assert_eq!(fx.warden.guardrails.list(None).await.expect("list").len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_attaches_yield_one_association() {
    let (fx, _dir) = on_disk_fixture().await;
    fx.warden
        .guardrails
        .create(new_guardrail("pii"))
        .await
        .expect("create");

    for tool in ["default/fetch", "default/search"] {
        let handles = (0..RACERS)
            .map(|_| {
                let warden = fx.warden.clone();
                let tool = r(tool);
                tokio::spawn(async move {
                    warden
                        .tools
                        .attach(&tool, &r("default/pii"), ExecutionTiming::PreExecution, None)
                        .await
                })
            })
            .collect();
        let (ok, failures) = settle(handles).await;

        assert_eq!(ok, 1, "{tool}");
        assert_eq!(failures, vec![ErrorKind::Conflict; RACERS - 1], "{tool}");
        assert_eq!(fx.warden.tools.list(&r(tool)).await.expect("list").len(), 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_workload_adds_yield_one_association() {
    let (fx, _dir) = on_disk_fixture().await;
    fx.warden
        .guardrails
        .create(new_guardrail("audit"))
        .await
        .expect("create");

    let handles = (0..RACERS)
        .map(|_| {
            let warden = fx.warden.clone();
            tokio::spawn(async move {
                warden
                    .workloads
                    .add(
                        &r("default/wf1"),
                        &r("default/fetch"),
                        &r("default/audit"),
                        ExecutionTiming::PreExecution,
                        None,
                    )
                    .await
            })
        })
        .collect();
    let (ok, failures) = settle(handles).await;

    assert_eq!(ok, 1);
    assert_eq!(failures, vec![ErrorKind::Conflict; RACERS - 1]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_propagations_copy_each_guardrail_once() {
    let (fx, _dir) = on_disk_fixture().await;
    let (wf2, fetch) = (r("default/wf2"), r("default/fetch"));
    for name in ["auth", "pii"] {
        fx.warden
            .guardrails
            .create(new_guardrail(name))
            .await
            .expect("create");
        fx.warden
            .tools
            .attach(&fetch, &r(&format!("default/{name}")), ExecutionTiming::PreExecution, None)
            .await
            .expect("attach");
    }

    let handles: Vec<_> = (0..RACERS)
        .map(|_| {
            let warden = fx.warden.clone();
            let (wf2, fetch) = (wf2.clone(), fetch.clone());
            tokio::spawn(async move {
                warden
                    .inheritance
                    .on_tool_added_to_workload(&wf2, &fetch)
                    .await
            })
        })
        .collect();

    let mut copied = 0;
    for handle in handles {
        let report = handle
            .await
            .expect("racer panicked")
            .expect("propagation is idempotent under contention");
        assert_eq!(report.copied + report.already_present, 2);
        copied += report.copied;
    }
    assert_eq!(copied, 2);

    let rows = fx.warden.workloads.list(&wf2, &fetch).await.expect("list");
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| row.is_inherited()));
}
