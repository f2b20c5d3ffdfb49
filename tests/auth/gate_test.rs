//! Mutation gating by role and fail-closed behavior.

use std::sync::Arc;

use warden::association::ExecutionTiming;
use warden::auth::{Role, StaticAuthorizer, Unavailable};
use warden::error::Denial;
use warden::{Error, ErrorKind};

use crate::common::{fixture_with, new_guardrail, r};

#[tokio::test]
async fn viewer_cannot_mutate_but_can_read() {
    let fx = fixture_with(Arc::new(StaticAuthorizer::new(Role::Viewer))).await;

    let err = fx
        .warden
        .guardrails
        .create(new_guardrail("pii"))
        .await
        .expect_err("viewer create");
    match err {
        Error::PermissionDenied(Denial::Policy(reason)) => {
            assert!(reason.contains("viewer"), "{reason}");
        }
        other => panic!("expected policy denial, got {other:?}"),
    }

    assert!(fx.warden.guardrails.list(None).await.expect("list").is_empty());
    assert!(fx
        .warden
        .tools
        .list(&r("default/fetch"))
        .await
        .expect("tool list")
        .is_empty());
}

#[tokio::test]
async fn editor_can_attach_but_not_delete_guardrails() {
    let fx = fixture_with(Arc::new(StaticAuthorizer::new(Role::Editor))).await;
    fx.warden
        .guardrails
        .create(new_guardrail("pii"))
        .await
        .expect("editor create");
    fx.warden
        .tools
        .attach(
            &r("default/fetch"),
            &r("default/pii"),
            ExecutionTiming::PreExecution,
            None,
        )
        .await
        .expect("editor attach");
    fx.warden
        .tools
        .detach(&r("default/fetch"), &r("default/pii"))
        .await
        .expect("editor detach");

    let err = fx
        .warden
        .guardrails
        .delete(&r("default/pii"))
        .await
        .expect_err("editor delete");
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    assert!(fx
        .warden
        .guardrails
        .find(&r("default/pii"))
        .await
        .expect("find")
        .is_some());
}

#[tokio::test]
async fn admin_can_delete() {
    let fx = fixture_with(Arc::new(StaticAuthorizer::new(Role::Admin))).await;
    fx.warden
        .guardrails
        .create(new_guardrail("pii"))
        .await
        .expect("create");
    fx.warden
        .guardrails
        .delete(&r("default/pii"))
        .await
        .expect("admin delete");
}

#[tokio::test]
async fn provider_outage_denies_every_mutation() {
    let fx = fixture_with(Arc::new(Unavailable::new("policy service timeout"))).await;

    let create = fx
        .warden
        .guardrails
        .create(new_guardrail("pii"))
        .await
        .expect_err("create");
    assert!(matches!(
        create,
        Error::PermissionDenied(Denial::ProviderUnavailable(_))
    ));

    let attach = fx
        .warden
        .tools
        .attach(
            &r("default/fetch"),
            &r("default/pii"),
            ExecutionTiming::PreExecution,
            None,
        )
        .await
        .expect_err("attach");
    assert_eq!(attach.kind(), ErrorKind::PermissionDenied);

    let propagate = fx
        .warden
        .inheritance
        .on_tool_added_to_workload(&r("default/wf1"), &r("default/fetch"))
        .await
        .expect_err("propagate");
    assert_eq!(propagate.kind(), ErrorKind::PermissionDenied);

    let import = fx
        .warden
        .guardrails
        .import(vec![new_guardrail("x")])
        .await
        .expect_err("import");
    assert_eq!(import.kind(), ErrorKind::PermissionDenied);
}

#[tokio::test]
async fn denial_precedes_validation() {
    let fx = fixture_with(Arc::new(StaticAuthorizer::new(Role::Viewer))).await;
    let mut invalid = new_guardrail("x");
    invalid.name = "NOT VALID".to_owned();
    let err = fx
        .warden
        .guardrails
        .create(invalid)
        .await
        .expect_err("denied");
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
}

#[tokio::test]
async fn lifecycle_purge_is_not_gated() {
    let fx = fixture_with(Arc::new(Unavailable::new("down"))).await;
    fx.warden
        .lifecycle
        .on_entity_deleted(warden::catalog::ResourceKind::Tool, &r("default/fetch"))
        .await
        .expect("purge runs without authorization");
}
