//! Purging associations of tools and workloads deleted elsewhere.

use warden::association::ExecutionTiming;
use warden::catalog::ResourceKind;
use warden::lifecycle::PurgeReport;

use crate::common::{fixture, new_guardrail, r, Fixture};

/// `auth` on fetch and search, adopted by wf1 (fetch) and wf2 (fetch, search).
async fn wired() -> Fixture {
    let fx = fixture().await;
    fx.warden
        .guardrails
        .create(new_guardrail("auth"))
        .await
        .expect("create");
    for tool in ["default/fetch", "default/search"] {
        fx.warden
            .tools
            .attach(&r(tool), &r("default/auth"), ExecutionTiming::PreExecution, None)
            .await
            .expect("attach");
    }
    for (workload, tool) in [
        ("default/wf1", "default/fetch"),
        ("default/wf2", "default/fetch"),
        ("default/wf2", "default/search"),
    ] {
        fx.warden
            .inheritance
            .on_tool_added_to_workload(&r(workload), &r(tool))
            .await
            .expect("propagate");
    }
    fx
}

#[tokio::test]
async fn deleting_a_tool_purges_every_reference_to_it() {
    let fx = wired().await;
    let fetch = r("default/fetch");
    fx.catalog.remove(ResourceKind::Tool, &fetch);

    let report = fx
        .warden
        .lifecycle
        .on_entity_deleted(ResourceKind::Tool, &fetch)
        .await
        .expect("purge");
    assert_eq!(
        report,
        PurgeReport {
            tool_associations: 1,
            workload_tool_associations: 2,
        }
    );

    let guardrail = fx
        .warden
        .guardrails
        .get(&r("default/auth"))
        .await
        .expect("get");
    assert_eq!(guardrail.usage.tools.len(), 1);
    assert_eq!(guardrail.usage.tools[0].tool, r("default/search"));
    assert_eq!(guardrail.usage.workload_tools.len(), 1);
    assert_eq!(guardrail.usage.workload_tools[0].workload, r("default/wf2"));
}

#[tokio::test]
async fn deleting_a_workload_purges_only_its_rows() {
    let fx = wired().await;
    let report = fx
        .warden
        .lifecycle
        .on_entity_deleted(ResourceKind::Workload, &r("default/wf2"))
        .await
        .expect("purge");
    assert_eq!(report.tool_associations, 0);
    assert_eq!(report.workload_tool_associations, 2);

    let counts = fx
        .warden
        .references
        .count_references(
            &fx.warden
                .guardrails
                .find(&r("default/auth"))
                .await
                .expect("find")
                .expect("exists")
                .id,
        )
        .await
        .expect("count");
    assert_eq!(counts.tool, 2);
    assert_eq!(counts.workload_tool, 1);
}

#[tokio::test]
async fn purge_is_idempotent() {
    let fx = wired().await;
    let fetch = r("default/fetch");
    fx.warden
        .lifecycle
        .on_entity_deleted(ResourceKind::Tool, &fetch)
        .await
        .expect("first purge");
    let again = fx
        .warden
        .lifecycle
        .on_entity_deleted(ResourceKind::Tool, &fetch)
        .await
        .expect("second purge");
    assert_eq!(again, PurgeReport::default());
}

#[tokio::test]
async fn purged_guardrail_becomes_deletable() {
    let fx = wired().await;
    for tool in ["default/fetch", "default/search"] {
        fx.warden
            .lifecycle
            .on_entity_deleted(ResourceKind::Tool, &r(tool))
            .await
            .expect("purge");
    }
    fx.warden
        .guardrails
        .delete(&r("default/auth"))
        .await
        .expect("delete after purge");
}
