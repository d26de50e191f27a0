//! Region tree construction and rendering.

use std::collections::BTreeMap;

use crate::scanner::RegionMarker;

/// A node in the region tree view.
#[derive(Clone, Debug, Default)]
pub struct TreeNode {
    /// Last path segment; empty for the synthetic root.
    pub name: String,
    pub full_path: String,
    /// Location of the marker that exactly matches this node, if any.
    pub file: Option<String>,
    pub start: usize,
    pub end: usize,
    pub children: Vec<TreeNode>,
}

/// Build a tree from a flat marker list. Intermediate nodes are created
/// for every path segment; file metadata attaches to the node whose full
/// path exactly matches a marker (first marker wins for duplicates).
#[must_use]
pub fn build_tree(markers: &[RegionMarker]) -> TreeNode {
    // Node data for every declared path and its ancestors, path-sorted so
    // parents are visited before children.
    let mut data: BTreeMap<String, Option<(String, usize, usize)>> = BTreeMap::new();
    for m in markers {
        let segments: Vec<&str> = m.path.split('.').collect();
        for i in 0..segments.len() {
            data.entry(segments[..=i].join(".")).or_insert(None);
        }
        let slot = data.get_mut(&m.path).expect("marker path just inserted");
        if slot.is_none() {
            *slot = Some((m.file.display().to_string(), m.start_line, m.end_line));
        }
    }

    let mut root = TreeNode::default();
    for (full_path, location) in data {
        let mut cur = &mut root;
        for seg in full_path.split('.') {
            let idx = match cur.children.iter().position(|c| c.name == seg) {
                Some(idx) => idx,
                None => {
                    cur.children.push(TreeNode {
                        name: seg.to_owned(),
                        ..TreeNode::default()
                    });
                    cur.children.len() - 1
                }
            };
            cur = &mut cur.children[idx];
        }
        cur.full_path = full_path.clone();
        if let Some((file, start, end)) = location {
            cur.file = Some(file);
            cur.start = start;
            cur.end = end;
        }
    }

    root
}

/// Render the tree with box-drawing connectors and `file:start-end`
/// annotations on marker-bearing nodes.
#[must_use]
pub fn format_tree(node: &TreeNode) -> String {
    let mut out = String::new();
    render(node, "", true, &mut out);
    out
}

fn render(node: &TreeNode, prefix: &str, is_last: bool, out: &mut String) {
    if !node.name.is_empty() {
        let connector = if is_last { "└── " } else { "├── " };
        out.push_str(prefix);
        out.push_str(connector);
        out.push_str(&node.name);
        if let Some(file) = &node.file {
            out.push_str(&format!("    [{}:{}-{}]", file, node.start, node.end));
        }
        out.push('\n');
    }

    let child_prefix = if node.name.is_empty() {
        prefix.to_owned()
    } else if is_last {
        format!("{prefix}    ")
    } else {
        format!("{prefix}│   ")
    };

    let count = node.children.len();
    for (i, child) in node.children.iter().enumerate() {
        render(child, &child_prefix, i + 1 == count, out);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
