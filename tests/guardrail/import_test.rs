//! Bulk import with per-item outcomes.

use std::sync::Arc;

use warden::auth::{Role, StaticAuthorizer};
use warden::guardrail::import::ImportOutcome;
use warden::ErrorKind;

use crate::common::{fixture, fixture_with, new_guardrail};

#[tokio::test]
async fn bad_items_do_not_abort_the_batch() {
    let fx = fixture().await;
    fx.warden
        .guardrails
        .create(new_guardrail("existing"))
        .await
        .expect("seed");

    let mut invalid = new_guardrail("bad");
    invalid.name = "Not_A_Label".to_owned();
    let batch = vec![
        new_guardrail("first"),
        new_guardrail("existing"),
        invalid,
        new_guardrail("last"),
    ];

    let report = fx.warden.guardrails.import(batch).await.expect("import");
    assert_eq!(report.imported, 2);
    assert_eq!(report.failed, 2);
    assert_eq!(report.items.len(), 4);

    assert!(matches!(report.items[0].outcome, ImportOutcome::Imported { .. }));
    match &report.items[1].outcome {
        ImportOutcome::Failed { kind, .. } => assert_eq!(*kind, ErrorKind::Conflict),
        other => panic!("expected conflict, got {other:?}"),
    }
    match &report.items[2].outcome {
        ImportOutcome::Failed { kind, .. } => assert_eq!(*kind, ErrorKind::InvalidArgument),
        other => panic!("expected invalid argument, got {other:?}"),
    }
    assert_eq!(report.items[3].index, 3);
    assert_eq!(report.items[3].name, "last");

    let names: Vec<String> = fx
        .warden
        .guardrails
        .list(None)
        .await
        .expect("list")
        .into_iter()
        .map(|g| g.name)
        .collect();
    assert_eq!(names, ["existing", "first", "last"]);
}

#[tokio::test]
async fn duplicates_within_one_batch_keep_the_first() {
    let fx = fixture().await;
    let report = fx
        .warden
        .guardrails
        .import(vec![new_guardrail("twice"), new_guardrail("twice")])
        .await
        .expect("import");
    assert_eq!(report.imported, 1);
    assert_eq!(report.failed, 1);
}

#[tokio::test]
async fn import_requires_admin() {
    let fx = fixture_with(Arc::new(StaticAuthorizer::new(Role::Editor))).await;
    let err = fx
        .warden
        .guardrails
        .import(vec![new_guardrail("x")])
        .await
        .expect_err("editor cannot import");
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    assert!(fx.warden.guardrails.list(None).await.expect("list").is_empty());
}

#[tokio::test]
async fn report_serializes_with_status_tags() {
    let fx = fixture().await;
    let report = fx
        .warden
        .guardrails
        .import(vec![new_guardrail("ok")])
        .await
        .expect("import");
    let json = serde_json::to_value(&report).expect("serialize");
    assert_eq!(json["imported"], 1);
    assert_eq!(json["items"][0]["status"], "imported");
    assert_eq!(json["items"][0]["name"], "ok");
    assert!(json["items"][0]["id"].is_string());
}
