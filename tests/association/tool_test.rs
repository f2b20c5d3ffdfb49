//! Tool-level attachments.

use warden::association::ExecutionTiming;
use warden::ErrorKind;

use crate::common::{fixture, new_guardrail, r};

#[tokio::test]
async fn attach_and_list() {
    let fx = fixture().await;
    fx.warden
        .guardrails
        .create(new_guardrail("pii"))
        .await
        .expect("create pii");
    fx.warden
        .guardrails
        .create(new_guardrail("auth"))
        .await
        .expect("create auth");

    let fetch = r("default/fetch");
    fx.warden
        .tools
        .attach(
            &fetch,
            &r("default/pii"),
            ExecutionTiming::PostExecution,
            Some("mask=email".to_owned()),
        )
        .await
        .expect("attach pii");
    fx.warden
        .tools
        .attach(&fetch, &r("default/auth"), ExecutionTiming::PreExecution, None)
        .await
        .expect("attach auth");

    let listed = fx.warden.tools.list(&fetch).await.expect("list");
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].guardrail, r("default/auth"));
    assert_eq!(listed[0].execution_timing, ExecutionTiming::PreExecution);
    assert_eq!(listed[1].guardrail, r("default/pii"));
    assert_eq!(listed[1].parameters.as_deref(), Some("mask=email"));

    assert!(fx
        .warden
        .tools
        .list(&r("default/search"))
        .await
        .expect("list other")
        .is_empty());
}

#[tokio::test]
async fn duplicate_attachment_is_conflict() {
    let fx = fixture().await;
    fx.warden
        .guardrails
        .create(new_guardrail("pii"))
        .await
        .expect("create");
    let fetch = r("default/fetch");
    fx.warden
        .tools
        .attach(&fetch, &r("default/pii"), ExecutionTiming::PreExecution, None)
        .await
        .expect("first attach");

    let err = fx
        .warden
        .tools
        .attach(&fetch, &r("default/pii"), ExecutionTiming::PostExecution, None)
        .await
        .expect_err("second attach");
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(fx.warden.tools.list(&fetch).await.expect("list").len(), 1);
}

#[tokio::test]
async fn unknown_tool_or_guardrail_is_not_found() {
    let fx = fixture().await;
    fx.warden
        .guardrails
        .create(new_guardrail("pii"))
        .await
        .expect("create");

    let err = fx
        .warden
        .tools
        .attach(
            &r("default/ghost"),
            &r("default/pii"),
            ExecutionTiming::PreExecution,
            None,
        )
        .await
        .expect_err("unknown tool");
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().contains("tool not found"));

    let err = fx
        .warden
        .tools
        .attach(
            &r("default/fetch"),
            &r("default/ghost"),
            ExecutionTiming::PreExecution,
            None,
        )
        .await
        .expect_err("unknown guardrail");
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().contains("guardrail not found"));
}

#[tokio::test]
async fn oversized_parameters_are_invalid() {
    let fx = fixture().await;
    fx.warden
        .guardrails
        .create(new_guardrail("pii"))
        .await
        .expect("create");
    let err = fx
        .warden
        .tools
        .attach(
            &r("default/fetch"),
            &r("default/pii"),
            ExecutionTiming::PreExecution,
            Some("x".repeat(10_001)),
        )
        .await
        .expect_err("too large");
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn detach_removes_and_missing_detach_is_not_found() {
    let fx = fixture().await;
    fx.warden
        .guardrails
        .create(new_guardrail("pii"))
        .await
        .expect("create");
    let fetch = r("default/fetch");
    fx.warden
        .tools
        .attach(&fetch, &r("default/pii"), ExecutionTiming::PreExecution, None)
        .await
        .expect("attach");

    fx.warden
        .tools
        .detach(&fetch, &r("default/pii"))
        .await
        .expect("detach");
    assert!(fx.warden.tools.list(&fetch).await.expect("list").is_empty());

    let err = fx
        .warden
        .tools
        .detach(&fetch, &r("default/pii"))
        .await
        .expect_err("already detached");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn renamed_guardrail_shows_new_key_in_listings() {
    let fx = fixture().await;
    fx.warden
        .guardrails
        .create(new_guardrail("old"))
        .await
        .expect("create");
    let fetch = r("default/fetch");
    fx.warden
        .tools
        .attach(&fetch, &r("default/old"), ExecutionTiming::PreExecution, None)
        .await
        .expect("attach");

    fx.warden
        .guardrails
        .update(
            &r("default/old"),
            warden::guardrail::GuardrailPatch {
                name: Some("new".to_owned()),
                ..Default::default()
            },
        )
        .await
        .expect("rename");

    let listed = fx.warden.tools.list(&fetch).await.expect("list");
    assert_eq!(listed[0].guardrail, r("default/new"));
}
