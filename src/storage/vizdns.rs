//! DNS hierarchy visualization data.
//!
//! Known hostnames are folded into a tree keyed by domain labels (most
//! significant first) under a synthetic `DOTROOT` node, then flattened
//! into the node/link lists the front-end graph expects.

use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VizNode {
    pub name: String,
    pub id: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VizLink {
    pub source: usize,
    pub target: usize,
}

#[derive(Debug, Serialize)]
pub struct VizGraph {
    pub nodes: Vec<VizNode>,
    pub links: Vec<VizLink>,
}

/// Label tree; BTreeMap keeps sibling order stable across runs.
#[derive(Debug, Default)]
struct LabelTree(BTreeMap<String, LabelTree>);

impl LabelTree {
    fn insert(&mut self, labels: &[String]) {
        if let Some((first, rest)) = labels.split_first() {
            self.0.entry(first.clone()).or_default().insert(rest);
        }
    }
}

/// Build the graph from hostnames.
///
/// Each hostname is split on `.`, the first `crop` labels are dropped
/// (hiding the host-specific part), the remainder is reversed so the most
/// significant label comes first, and the path is inserted under `DOTROOT`.
/// Hostnames fully consumed by the crop contribute nothing.
pub fn hostname_graph<I>(hostnames: I, crop: usize) -> VizGraph
where
    I: IntoIterator<Item = String>,
{
    let mut tree = LabelTree::default();

    for hostname in hostnames {
        if hostname.is_empty() {
            continue;
        }
        let labels: Vec<String> = hostname
            .split('.')
            .skip(crop)
            .map(|l| l.to_string())
            .collect();
        if labels.is_empty() {
            continue;
        }

        let mut path = vec!["DOTROOT".to_string()];
        path.extend(labels.into_iter().rev());
        tree.insert(&path);
    }

    let mut graph = VizGraph {
        nodes: Vec::new(),
        links: Vec::new(),
    };
    flatten(&tree, None, &mut graph);
    graph
}

fn flatten(tree: &LabelTree, parent_id: Option<usize>, graph: &mut VizGraph) {
    for (name, subtree) in &tree.0 {
        let node_id = graph.nodes.len();
        graph.nodes.push(VizNode {
            name: name.clone(),
            id: node_id,
        });
        if let Some(parent_id) = parent_id {
            graph.links.push(VizLink {
                source: parent_id,
                target: node_id,
            });
        }
        flatten(subtree, Some(node_id), graph);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(graph: &VizGraph) -> Vec<&str> {
        graph.nodes.iter().map(|n| n.name.as_str()).collect()
    }

    #[test]
    fn test_empty_input_yields_empty_graph() {
        let graph = hostname_graph(Vec::new(), 1);
        assert!(graph.nodes.is_empty());
        assert!(graph.links.is_empty());
    }

    #[test]
    fn test_single_hostname_crops_leftmost_label() {
        let graph = hostname_graph(vec!["www.example.org".to_string()], 1);

        // DOTROOT -> org -> example; "www" is cropped away
        assert_eq!(names(&graph), vec!["DOTROOT", "org", "example"]);
        assert_eq!(
            graph.links,
            vec![
                VizLink { source: 0, target: 1 },
                VizLink { source: 1, target: 2 },
            ]
        );
    }

    #[test]
    fn test_shared_suffixes_merge() {
        let graph = hostname_graph(
            vec![
                "a.prod.example.org".to_string(),
                "b.prod.example.org".to_string(),
                "c.dev.example.org".to_string(),
            ],
            1,
        );

        // One org/example spine, two branches beneath it.
        let name_list = names(&graph);
        assert_eq!(
            name_list.iter().filter(|n| **n == "example").count(),
            1,
            "shared labels must not duplicate"
        );
        assert!(name_list.contains(&"prod"));
        assert!(name_list.contains(&"dev"));
        // Every node except the root has exactly one incoming link.
        assert_eq!(graph.links.len(), graph.nodes.len() - 1);
    }

    #[test]
    fn test_crop_zero_keeps_full_hostname() {
        let graph = hostname_graph(vec!["www.example.org".to_string()], 0);
        assert_eq!(names(&graph), vec!["DOTROOT", "org", "example", "www"]);
    }

    #[test]
    fn test_hostname_consumed_by_crop_is_skipped() {
        let graph = hostname_graph(vec!["localhost".to_string()], 1);
        assert!(graph.nodes.is_empty());
    }

    #[test]
    fn test_links_reference_valid_nodes() {
        let graph = hostname_graph(
            vec![
                "a.x.example.org".to_string(),
                "b.y.example.net".to_string(),
            ],
            1,
        );
        for link in &graph.links {
            assert!(link.source < graph.nodes.len());
            assert!(link.target < graph.nodes.len());
            assert!(link.source < link.target, "parents are emitted before children");
        }
        // Root is first and has no incoming link.
        assert_eq!(graph.nodes[0].name, "DOTROOT");
        assert!(graph.links.iter().all(|l| l.target != 0));
    }
}
