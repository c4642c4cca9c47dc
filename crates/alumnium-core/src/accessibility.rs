//! Accessibility tree snapshot
//!
//! Drivers flatten the page (or native view hierarchy) into a list of
//! [`AxNode`]s linked by parent ids. The tree is what the interpreter reasons
//! over, what areas scope into, and what `alumnium_get_accessibility_tree`
//! dumps.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write as _;

use crate::{Error, Result};

/// One node of the accessibility tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxNode {
    /// Driver-assigned identifier, unique within one snapshot
    pub id: u32,
    pub role: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub parent: Option<u32>,
    #[serde(default, skip_deserializing)]
    pub children: Vec<u32>,
    /// Extra properties (checked, disabled, href, ...)
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl AxNode {
    pub fn new(id: u32, role: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            role: role.into(),
            name: name.into(),
            value: None,
            parent: None,
            children: Vec::new(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_parent(mut self, parent: u32) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Snapshot of a page's accessibility tree
#[derive(Debug, Clone, Default)]
pub struct AccessibilityTree {
    nodes: Vec<AxNode>,
    index: HashMap<u32, usize>,
}

impl AccessibilityTree {
    /// Build a tree from nodes linked by `parent`; `children` are recomputed.
    ///
    /// Node ids must be unique. Nodes whose parent is missing from the list
    /// become roots, as do nodes whose parent chain loops back to themselves.
    pub fn from_nodes(mut nodes: Vec<AxNode>) -> Result<Self> {
        let mut index: HashMap<u32, usize> = HashMap::with_capacity(nodes.len());
        for (pos, node) in nodes.iter().enumerate() {
            if index.insert(node.id, pos).is_some() {
                return Err(Error::Driver(format!(
                    "snapshot contains duplicate node id {}",
                    node.id
                )));
            }
        }

        for pos in 0..nodes.len() {
            let id = nodes[pos].id;
            let mut seen = HashSet::new();
            let mut current = nodes[pos].parent;
            while let Some(parent) = current {
                if parent == id {
                    nodes[pos].parent = None;
                    break;
                }
                if !seen.insert(parent) {
                    break;
                }
                current = index.get(&parent).and_then(|&p| nodes[p].parent);
            }
        }

        Ok(Self::link(nodes, index))
    }

    fn link(mut nodes: Vec<AxNode>, index: HashMap<u32, usize>) -> Self {
        for node in nodes.iter_mut() {
            node.children.clear();
        }

        let links: Vec<(usize, u32)> = nodes
            .iter()
            .filter_map(|node| {
                let parent = node.parent?;
                index.get(&parent).map(|&pos| (pos, node.id))
            })
            .collect();
        for (parent_pos, child) in links {
            nodes[parent_pos].children.push(child);
        }

        for node in nodes.iter_mut() {
            if node.parent.is_some_and(|p| !index.contains_key(&p)) {
                node.parent = None;
            }
        }

        Self { nodes, index }
    }

    pub fn get(&self, id: u32) -> Option<&AxNode> {
        self.index.get(&id).map(|&pos| &self.nodes[pos])
    }

    pub fn contains(&self, id: u32) -> bool {
        self.index.contains_key(&id)
    }

    pub fn nodes(&self) -> &[AxNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> impl Iterator<Item = &AxNode> {
        self.nodes.iter().filter(|node| node.parent.is_none())
    }

    /// Restrict the tree to `root` and its descendants
    pub fn subtree(&self, root: u32) -> Option<AccessibilityTree> {
        self.get(root)?;

        let mut keep = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.get(id) {
                keep.push(node.clone());
                stack.extend(node.children.iter().rev().copied());
            }
        }

        if let Some(first) = keep.first_mut() {
            first.parent = None;
        }
        let index = keep
            .iter()
            .enumerate()
            .map(|(pos, node)| (node.id, pos))
            .collect();
        Some(Self::link(keep, index))
    }

    /// Indented text dump, one node per line
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for root in self.roots() {
            self.write_node(&mut out, root, 0);
        }
        out
    }

    fn write_node(&self, out: &mut String, node: &AxNode, depth: usize) {
        let _ = write!(out, "{}- {} [id={}]", "  ".repeat(depth), node.role, node.id);
        if !node.name.is_empty() {
            let _ = write!(out, " \"{}\"", node.name);
        }
        if let Some(value) = &node.value {
            let _ = write!(out, " value=\"{}\"", value);
        }
        for (key, value) in &node.attributes {
            let _ = write!(out, " {}={}", key, value);
        }
        out.push('\n');

        for child in &node.children {
            if let Some(child) = self.get(*child) {
                self.write_node(out, child, depth + 1);
            }
        }
    }

    /// SHA-256 of the text dump, hex encoded
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(self.to_text()))
    }
}
