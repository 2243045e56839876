//! Reference counting over a completed graph.
//!
//! Every CNAB index registers itself as an uplink on each component it
//! declares. A component's uplink count is the number of distinct indexes
//! still using it, which is what decides whether deleting one bundle may
//! remove the component.

use crate::graph::{ContentGraph, GraphIssue, ItemKind, Link, RecordId};

/// Outcome of a reachability pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reachability {
    /// Uplinks added.
    pub linked: usize,
    /// Declared components missing from the graph.
    pub lost: usize,
    /// Components whose declared role was overwritten by a different one.
    pub conflicts: usize,
}

/// Links every declared component back to the indexes declaring it.
///
/// Indexes are visited in discovery order, using the kinds the graph had
/// before the pass. When a new uplink is added the component takes the role
/// its parent declares for it; if a later parent declares a different role
/// the later one wins and the conflict is recorded.
pub fn complete(graph: &mut ContentGraph) -> Reachability {
    let mut summary = Reachability::default();
    let conflicts_before = count_conflicts(graph);

    for parent in graph.index_ids() {
        let Some(record) = graph.get(parent) else {
            continue;
        };
        let parent_digest = record.digest.clone();
        let parent_tag = record.tag.clone();
        let parent_kind = record.kind.to_string();
        let downlinks = record.downlinks.clone();

        for link in downlinks {
            match graph.id_by_digest(&link.digest) {
                Some(child) => {
                    if add_uplink(graph, child, &parent_digest, &parent_kind, &link.annotation) {
                        summary.linked += 1;
                    }
                }
                None => {
                    tracing::error!(
                        cnab = %parent_tag,
                        component = %link.digest,
                        "Declared component was not found"
                    );
                    if let Some(record) = graph.get_mut(parent) {
                        record.lost += 1;
                    }
                    graph.record_issue(GraphIssue::DanglingDownlink {
                        parent_tag: parent_tag.clone(),
                        parent_digest: parent_digest.clone(),
                        child_digest: link.digest,
                    });
                    summary.lost += 1;
                }
            }
        }
    }

    summary.conflicts = count_conflicts(graph) - conflicts_before;

    tracing::debug!(
        linked = summary.linked,
        lost = summary.lost,
        conflicts = summary.conflicts,
        "Reachability complete"
    );
    summary
}

fn count_conflicts(graph: &ContentGraph) -> usize {
    graph
        .issues()
        .iter()
        .filter(|issue| matches!(issue, GraphIssue::KindConflict { .. }))
        .count()
}

/// Adds an uplink from `parent_digest` unless one exists. Returns true if added.
fn add_uplink(
    graph: &mut ContentGraph,
    child: RecordId,
    parent_digest: &str,
    parent_kind: &str,
    declared: &str,
) -> bool {
    let Some(record) = graph.get_mut(child) else {
        return false;
    };
    if record.has_uplink(parent_digest) {
        return false;
    }

    record.uplinks.push(Link {
        digest: parent_digest.to_string(),
        annotation: parent_kind.to_string(),
    });

    let conflict = match &record.kind {
        ItemKind::Declared(previous) if previous != declared => Some(previous.clone()),
        _ => None,
    };
    record.kind = ItemKind::Declared(declared.to_string());
    let digest = record.digest.clone();

    if let Some(previous) = conflict {
        tracing::warn!(
            digest = %digest,
            previous = %previous,
            declared,
            parent = parent_digest,
            "Component declared with conflicting roles"
        );
        graph.record_issue(GraphIssue::KindConflict {
            digest,
            previous,
            declared: declared.to_string(),
            parent_digest: parent_digest.to_string(),
        });
    }
    true
}

#[cfg(test)]
mod tests {
    use cnabtool_registry::{MediaType, RegistryResponse};

    use super::*;

    fn response(digest: &str, media: &str) -> RegistryResponse {
        RegistryResponse {
            status: 200,
            media: MediaType::new(media),
            digest: digest.to_string(),
            content: "{}".to_string(),
            ..Default::default()
        }
    }

    fn add_index(graph: &mut ContentGraph, tag: &str, digest: &str, links: &[(&str, &str)]) {
        let (id, _) = graph.insert_or_get(&response(digest, MediaType::OCI_INDEX), tag);
        graph.get_mut(id).unwrap().downlinks = links
            .iter()
            .map(|(digest, annotation)| Link {
                digest: (*digest).to_string(),
                annotation: (*annotation).to_string(),
            })
            .collect();
    }

    fn add_component(graph: &mut ContentGraph, tag: &str, digest: &str) {
        graph.insert_or_get(&response(digest, MediaType::OCI_MANIFEST), tag);
    }

    #[test]
    fn test_shared_component_counts_both_parents() {
        let mut graph = ContentGraph::new();
        add_index(&mut graph, "a", "sha256:a", &[("sha256:d1", "db"), ("sha256:d2", "web")]);
        add_index(&mut graph, "b", "sha256:b", &[("sha256:d1", "db")]);
        add_component(&mut graph, "d1", "sha256:d1");
        add_component(&mut graph, "d2", "sha256:d2");

        let summary = complete(&mut graph);
        assert_eq!(summary.linked, 3);
        assert_eq!(summary.lost, 0);

        let d1 = graph.by_digest("sha256:d1").unwrap();
        assert_eq!(d1.uplinks.len(), 2);
        assert_eq!(d1.kind, ItemKind::Declared("db".into()));
        assert_eq!(d1.uplinks[0].annotation, "cnab");

        assert_eq!(graph.by_digest("sha256:d2").unwrap().uplinks.len(), 1);
    }

    #[test]
    fn test_second_pass_adds_nothing() {
        let mut graph = ContentGraph::new();
        add_index(&mut graph, "a", "sha256:a", &[("sha256:d1", "db")]);
        add_component(&mut graph, "d1", "sha256:d1");

        complete(&mut graph);
        let again = complete(&mut graph);
        assert_eq!(again.linked, 0);
        assert_eq!(graph.by_digest("sha256:d1").unwrap().uplinks.len(), 1);
    }

    #[test]
    fn test_missing_component_counts_as_lost() {
        let mut graph = ContentGraph::new();
        add_index(&mut graph, "a", "sha256:a", &[("sha256:gone", "db")]);

        let summary = complete(&mut graph);
        assert_eq!(summary.lost, 1);
        assert_eq!(graph.by_digest("sha256:a").unwrap().lost, 1);
        assert_eq!(
            graph.issues(),
            &[GraphIssue::DanglingDownlink {
                parent_tag: "a".into(),
                parent_digest: "sha256:a".into(),
                child_digest: "sha256:gone".into(),
            }]
        );
    }

    #[test]
    fn test_conflicting_roles_last_parent_wins() {
        let mut graph = ContentGraph::new();
        add_index(&mut graph, "a", "sha256:a", &[("sha256:d1", "db")]);
        add_index(&mut graph, "b", "sha256:b", &[("sha256:d1", "cache")]);
        add_component(&mut graph, "d1", "sha256:d1");

        let summary = complete(&mut graph);
        assert_eq!(summary.conflicts, 1);
        assert_eq!(
            graph.by_digest("sha256:d1").unwrap().kind,
            ItemKind::Declared("cache".into())
        );
        assert!(matches!(
            graph.issues()[0],
            GraphIssue::KindConflict { ref previous, ref declared, .. }
                if previous == "db" && declared == "cache"
        ));
    }
}
