//! End-to-end tests of inspection and deletion against a scripted registry.
//!
//! The repository holds two bundles: `a` declares the shared component `d1`
//! and its own component `d2`, `b` declares only `d1`.

use std::sync::Arc;

use cnabtool_content::{
    delete_cnab, inspect, ContentError, ContentGraph, DeleteOptions, DeletionStatus, GraphIssue,
    ItemKind, ShortReport,
};
use cnabtool_registry::testing::{cnab_index, json_response, RawResponseExt, ScriptedTransport};
use cnabtool_registry::{MediaType, Reference, RegistryClient};

const BASE: &str = "https://registry.example.com/v2/bundles/app";

const A: &str = "sha256:aaaa";
const B: &str = "sha256:bbbb";
const D1: &str = "sha256:d1d1";
const D2: &str = "sha256:d2d2";

fn manifest_url(tag_or_digest: &str) -> String {
    format!("{BASE}/manifests/{tag_or_digest}")
}

/// Registry with bundles `a` and `b` and components `d1` and `d2`, all tagged.
fn registry(extra_tags: &[&str]) -> ScriptedTransport {
    let mut tags = vec!["a", "b", "d1", "d2"];
    tags.extend_from_slice(extra_tags);

    ScriptedTransport::new()
        .serve_tags(format!("{BASE}/tags/list/"), "bundles/app", &tags)
        .serve_manifest(
            manifest_url("a"),
            MediaType::OCI_INDEX,
            A,
            &cnab_index(&[
                (D1, MediaType::V2_MANIFEST, "postgres"),
                (D2, MediaType::OCI_MANIFEST, "config"),
            ]),
        )
        .serve_manifest(
            manifest_url("b"),
            MediaType::OCI_INDEX,
            B,
            &cnab_index(&[(D1, MediaType::V2_MANIFEST, "postgres")]),
        )
        .serve_manifest(
            manifest_url("d1"),
            MediaType::V2_MANIFEST,
            D1,
            r#"{"schemaVersion": 2, "layers": []}"#,
        )
        .on_get_any(
            manifest_url("d2"),
            json_response(200, r#"{"schemaVersion": 2, "config": {}}"#)
                .with_header("content-type", MediaType::OCI_MANIFEST)
                .with_header("docker-content-digest", D2),
        )
}

fn accept_deletes(transport: ScriptedTransport, digests: &[&str]) -> ScriptedTransport {
    digests.iter().fold(transport, |transport, digest| {
        transport.on_delete(manifest_url(digest), json_response(202, ""))
    })
}

fn client(reference: &str, transport: ScriptedTransport) -> (RegistryClient, Arc<ScriptedTransport>) {
    let transport = Arc::new(transport);
    let reference = Reference::parse(reference).unwrap();
    (
        RegistryClient::with_transport(reference, transport.clone()),
        transport,
    )
}

async fn inspected(client: &RegistryClient) -> ContentGraph {
    let root = client.get_manifest().await.unwrap();
    inspect(client, &root).await.unwrap()
}

// =============================================================================
// Inspection
// =============================================================================

#[tokio::test]
async fn test_inspect_builds_refcounts() {
    let (client, _) = client("registry.example.com/bundles/app:a", registry(&[]));
    let graph = inspected(&client).await;

    assert_eq!(graph.len(), 4);
    assert!(graph.issues().is_empty());
    assert_eq!(graph.pending().count(), 0);

    let d1 = graph.by_digest(D1).unwrap();
    assert_eq!(d1.uplinks.len(), 2);
    assert_eq!(d1.kind, ItemKind::Declared("postgres".into()));

    let d2 = graph.by_digest(D2).unwrap();
    assert_eq!(d2.uplinks.len(), 1);
    assert_eq!(d2.uplinks[0].digest, A);
    assert_eq!(d2.kind, ItemKind::Declared("config".into()));

    assert_eq!(graph.by_tag("a").unwrap().downlinks.len(), 2);
    assert_eq!(graph.by_tag("b").unwrap().kind, ItemKind::CnabIndex);
}

#[tokio::test]
async fn test_refcount_matches_declaring_indexes() {
    let (client, _) = client("registry.example.com/bundles/app:b", registry(&[]));
    let graph = inspected(&client).await;

    for record in graph.records() {
        let declaring = graph
            .records()
            .filter(|parent| parent.downlinks.iter().any(|l| l.digest == record.digest))
            .count();
        assert_eq!(record.uplinks.len(), declaring, "record {}", record.digest);
    }
}

#[tokio::test]
async fn test_loosely_typed_entry_still_counts_as_use() {
    let loose = serde_json::json!({
        "schemaVersion": 2,
        "manifests": [{
            "mediaType": MediaType::V2_MANIFEST,
            "digest": D1,
            "size": "512",
            "annotations": null,
        }],
    })
    .to_string();
    let transport = accept_deletes(registry(&[]), &[A, D2]).serve_manifest(
        manifest_url("b"),
        MediaType::OCI_INDEX,
        B,
        &loose,
    );
    let (client, transport) = client("registry.example.com/bundles/app:a", transport);
    let graph = inspected(&client).await;

    assert_eq!(graph.by_tag("b").unwrap().downlinks.len(), 1);
    assert_eq!(graph.by_digest(D1).unwrap().uplinks.len(), 2);

    let report = delete_cnab(&client, &graph, DeleteOptions::new(), |_| {})
        .await
        .unwrap();
    assert_eq!(report.plan.tags().collect::<Vec<_>>(), vec!["d2", "a"]);
    assert!(transport
        .requests_with("DELETE")
        .iter()
        .all(|r| r.url != manifest_url(D1)));
}

#[tokio::test]
async fn test_same_digest_through_two_tags_is_one_record() {
    let transport = registry(&["latest"]).serve_manifest(
        manifest_url("latest"),
        MediaType::OCI_INDEX,
        A,
        &cnab_index(&[
            (D1, MediaType::V2_MANIFEST, "postgres"),
            (D2, MediaType::OCI_MANIFEST, "config"),
        ]),
    );
    let (client, _) = client("registry.example.com/bundles/app:a", transport);
    let graph = inspected(&client).await;

    assert_eq!(graph.len(), 4);
    assert_eq!(graph.by_tag("latest").unwrap().digest, A);
    assert_eq!(graph.by_digest(A).unwrap().tag, "a");
    assert_eq!(graph.by_digest(D2).unwrap().uplinks.len(), 1);
}

#[tokio::test]
async fn test_failing_tag_is_skipped() {
    let transport = registry(&["broken"]).on_get_any(
        manifest_url("broken"),
        json_response(500, r#"{"errors": []}"#),
    );
    let (client, _) = client("registry.example.com/bundles/app:a", transport);
    let graph = inspected(&client).await;

    assert_eq!(graph.len(), 4);
    assert!(graph.by_tag("broken").is_none());
    assert!(matches!(
        &graph.issues()[0],
        GraphIssue::SkippedTag { tag, .. } if tag == "broken"
    ));
}

#[tokio::test]
async fn test_untagged_component_is_lost() {
    let transport = registry(&["c"]).serve_manifest(
        manifest_url("c"),
        MediaType::OCI_INDEX,
        "sha256:cccc",
        &cnab_index(&[(D1, MediaType::V2_MANIFEST, "postgres"), ("sha256:d3d3", MediaType::OCI_MANIFEST, "redis")]),
    );
    let (client, _) = client("registry.example.com/bundles/app:a", transport);
    let graph = inspected(&client).await;

    assert_eq!(graph.by_tag("c").unwrap().lost, 1);
    assert_eq!(graph.by_digest(D1).unwrap().uplinks.len(), 3);
    assert_eq!(graph.pending().collect::<Vec<_>>(), vec!["sha256:d3d3"]);

    let report = ShortReport::new(&client.reference().to_string(), &graph);
    let c = report.item_list.iter().find(|i| i.tag == "c").unwrap();
    assert_eq!((c.links, c.lost), (2, 1));
}

#[tokio::test]
async fn test_root_must_be_index() {
    let (client, _) = client("registry.example.com/bundles/app:d1", registry(&[]));
    let root = client.get_manifest().await.unwrap();

    let err = inspect(&client, &root).await.unwrap_err();
    assert!(matches!(err, ContentError::UnexpectedRootMediaType { .. }));
}

#[tokio::test]
async fn test_tag_list_failure_aborts_inspection() {
    let transport = registry(&[]).fail_get(format!("{BASE}/tags/list/"));
    let (client, _) = client("registry.example.com/bundles/app:a", transport);
    let root = client.get_manifest().await.unwrap();

    let err = inspect(&client, &root).await.unwrap_err();
    assert!(err.is_fatal());
}

// =============================================================================
// Deletion
// =============================================================================

#[tokio::test]
async fn test_delete_keeps_shared_component() {
    let (client, transport) = client(
        "registry.example.com/bundles/app:a",
        accept_deletes(registry(&[]), &[A, D2]),
    );
    let graph = inspected(&client).await;

    let report = delete_cnab(&client, &graph, DeleteOptions::new(), |_| {}).await.unwrap();
    assert_eq!(report.plan.tags().collect::<Vec<_>>(), vec!["d2", "a"]);
    assert_eq!(report.failures(), 0);

    let deleted: Vec<_> = transport
        .requests_with("DELETE")
        .into_iter()
        .map(|r| r.url)
        .collect();
    assert_eq!(deleted, vec![manifest_url(D2), manifest_url(A)]);
}

#[tokio::test]
async fn test_shared_component_goes_with_last_bundle() {
    let (client, _) = client(
        "registry.example.com/bundles/app:b",
        accept_deletes(registry(&[]), &[B]),
    );
    let graph = inspected(&client).await;

    let report = delete_cnab(&client, &graph, DeleteOptions::new(), |_| {}).await.unwrap();
    assert_eq!(report.plan.tags().collect::<Vec<_>>(), vec!["b"]);
}

#[tokio::test]
async fn test_dry_run_issues_no_delete() {
    let (client, transport) = client(
        "registry.example.com/bundles/app:a",
        accept_deletes(registry(&[]), &[A, D2]),
    );
    let graph = inspected(&client).await;

    let dry = delete_cnab(&client, &graph, DeleteOptions::new().with_dry_run(true), |_| {})
        .await
        .unwrap();
    assert!(transport.requests_with("DELETE").is_empty());
    assert!(dry
        .outcomes
        .iter()
        .all(|o| o.status == DeletionStatus::Skipped));

    let real = delete_cnab(&client, &graph, DeleteOptions::new(), |_| {}).await.unwrap();
    assert_eq!(dry.plan, real.plan);
    assert_eq!(transport.requests_with("DELETE").len(), 2);
}

#[tokio::test]
async fn test_rejected_delete_does_not_stop_plan() {
    let transport = registry(&[])
        .on_delete(
            manifest_url(D2),
            json_response(405, r#"{"errors":[{"code":"UNSUPPORTED"}]}"#),
        )
        .on_delete(manifest_url(A), json_response(202, ""));
    let (client, transport) = client("registry.example.com/bundles/app:a", transport);
    let graph = inspected(&client).await;

    let report = delete_cnab(&client, &graph, DeleteOptions::new(), |_| {}).await.unwrap();
    assert_eq!(report.failures(), 1);
    assert!(matches!(
        &report.outcomes[0].status,
        DeletionStatus::Failed { code: 405, body } if body.contains("UNSUPPORTED")
    ));
    assert_eq!(report.outcomes[1].status, DeletionStatus::Deleted);
    assert_eq!(transport.requests_with("DELETE").len(), 2);
}

#[tokio::test]
async fn test_delete_network_failure_aborts() {
    let transport = registry(&[]).fail_delete(manifest_url(D2));
    let (client, transport) = client("registry.example.com/bundles/app:a", transport);
    let graph = inspected(&client).await;

    let err = delete_cnab(&client, &graph, DeleteOptions::new(), |_| {})
        .await
        .unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(transport.requests_with("DELETE").len(), 1);
}

#[tokio::test]
async fn test_completed_deletions_are_reported_before_abort() {
    let transport = accept_deletes(registry(&[]), &[D2]).fail_delete(manifest_url(A));
    let (client, transport) = client("registry.example.com/bundles/app:a", transport);
    let graph = inspected(&client).await;

    let mut seen = Vec::new();
    let err = delete_cnab(&client, &graph, DeleteOptions::new(), |outcome| {
        seen.push(outcome.clone());
    })
    .await
    .unwrap_err();

    assert!(err.is_fatal());
    assert_eq!(transport.requests_with("DELETE").len(), 2);
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].entry.tag, "d2");
    assert_eq!(seen[0].url, manifest_url(D2));
    assert_eq!(seen[0].status, DeletionStatus::Deleted);
}

#[tokio::test]
async fn test_delete_requires_tag() {
    let transport = registry(&[]).serve_manifest(
        manifest_url(A),
        MediaType::OCI_INDEX,
        A,
        &cnab_index(&[(D2, MediaType::OCI_MANIFEST, "config")]),
    );
    let (client, _) = client(&format!("registry.example.com/bundles/app@{A}"), transport);
    let graph = inspected(&client).await;

    let err = delete_cnab(&client, &graph, DeleteOptions::new().with_dry_run(true), |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, ContentError::TargetNotFound { .. }));
}
