//! Hardware topology tree.
//!
//! Components (machines, chips, caches, cores, hardware threads, memory) live
//! in an arena owned by [`Topology`] and are addressed by [`NodeId`]. Every
//! component carries a numeric id, a [`ComponentKind`] and a typed attribute
//! map.
//!
//! The tree is built once and then only read while counters are attributed
//! to it, so a `&Topology` can be shared by every measurement thread.

pub mod sysfs;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};

/// Index of a component inside its [`Topology`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    /// Position of the component in the arena
    pub fn index(self) -> usize {
        self.0
    }
}

/// The kinds of component a topology is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    /// Generic root grouping several machines
    Topology,
    /// A single machine
    Node,
    /// Main memory
    Memory,
    /// A socket / package
    Chip,
    /// A data, instruction or unified cache
    Cache,
    /// Any intermediate grouping (die, cluster, GPU partition)
    Subdivision,
    /// A NUMA region
    Numa,
    /// A physical core
    Core,
    /// A hardware thread, the unit counter readings are attributed to
    Thread,
}

impl ComponentKind {
    /// Lower-case label
    pub fn as_str(self) -> &'static str {
        match self {
            ComponentKind::Topology => "topology",
            ComponentKind::Node => "node",
            ComponentKind::Memory => "memory",
            ComponentKind::Chip => "chip",
            ComponentKind::Cache => "cache",
            ComponentKind::Subdivision => "subdivision",
            ComponentKind::Numa => "numa",
            ComponentKind::Core => "core",
            ComponentKind::Thread => "thread",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed value stored in a component's attribute map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Signed integer
    Int(i64),
    /// Unsigned integer (sizes, frequencies)
    UInt(u64),
    /// Floating point value
    Float(f64),
    /// Free text
    Text(String),
    /// Flag
    Bool(bool),
}

impl AttributeValue {
    /// Returns the value if it is an unsigned integer
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            AttributeValue::UInt(v) => Some(*v),
            AttributeValue::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Returns the value if it is text
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Int(v) => write!(f, "{}", v),
            AttributeValue::UInt(v) => write!(f, "{}", v),
            AttributeValue::Float(v) => write!(f, "{}", v),
            AttributeValue::Text(v) => f.write_str(v),
            AttributeValue::Bool(v) => write!(f, "{}", v),
        }
    }
}

/// A single component of the hardware topology.
#[derive(Debug, Clone)]
pub struct Component {
    id: u32,
    kind: ComponentKind,
    name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attributes: BTreeMap<String, AttributeValue>,
}

impl Component {
    /// Numeric id (hardware thread number for threads, package id for chips, ...)
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Component kind
    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    /// Human readable name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent component, `None` for roots
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Direct children in insertion order
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// All attributes, ordered by key
    pub fn attributes(&self) -> &BTreeMap<String, AttributeValue> {
        &self.attributes
    }
}

/// Arena holding a forest of components.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    nodes: Vec<Component>,
}

impl Topology {
    /// Create an empty topology
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a machine with `sockets` chips of `cores` cores with `threads`
    /// hardware threads each. Threads are numbered consecutively from 0.
    pub fn uniform(sockets: u32, cores: u32, threads: u32) -> (Self, NodeId) {
        let mut topo = Topology::new();
        let root = topo.add_root(ComponentKind::Node, 0, "machine");

        let mut thread_id = 0;
        let mut core_id = 0;
        for socket in 0..sockets {
            let chip = topo.add_child(root, ComponentKind::Chip, socket, format!("package {}", socket));
            for _ in 0..cores {
                let core = topo.add_child(chip, ComponentKind::Core, core_id, format!("core {}", core_id));
                for _ in 0..threads {
                    topo.add_child(core, ComponentKind::Thread, thread_id, format!("cpu {}", thread_id));
                    thread_id += 1;
                }
                core_id += 1;
            }
        }

        (topo, root)
    }

    /// Add a component without a parent
    pub fn add_root(&mut self, kind: ComponentKind, id: u32, name: impl Into<String>) -> NodeId {
        self.push(None, kind, id, name.into())
    }

    /// Add a component below `parent`
    ///
    /// # Panics
    ///
    /// Panics if `parent` does not belong to this topology.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        kind: ComponentKind,
        id: u32,
        name: impl Into<String>,
    ) -> NodeId {
        assert!(parent.0 < self.nodes.len(), "parent {:?} is not part of this topology", parent);
        let node = self.push(Some(parent), kind, id, name.into());
        self.nodes[parent.0].children.push(node);
        node
    }

    fn push(&mut self, parent: Option<NodeId>, kind: ComponentKind, id: u32, name: String) -> NodeId {
        let node = NodeId(self.nodes.len());
        self.nodes.push(Component {
            id,
            kind,
            name,
            parent,
            children: Vec::new(),
            attributes: BTreeMap::new(),
        });
        node
    }

    /// Number of components
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the topology has no components
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a component
    pub fn get(&self, node: NodeId) -> Option<&Component> {
        self.nodes.get(node.0)
    }

    /// Find the component with `id` and `kind` in the subtree rooted at
    /// `root`, the root itself included. Depth-first, first match wins.
    pub fn find(&self, root: NodeId, id: u32, kind: ComponentKind) -> Option<NodeId> {
        self.subtree(root).find(|&node| {
            let component = &self.nodes[node.0];
            component.id == id && component.kind == kind
        })
    }

    /// Components of `kind` in the subtree rooted at `root`
    pub fn find_all(&self, root: NodeId, kind: ComponentKind) -> Vec<NodeId> {
        self.subtree(root)
            .filter(|node| self.nodes[node.0].kind == kind)
            .collect()
    }

    /// Pre-order iterator over the subtree rooted at `root`
    pub fn subtree(&self, root: NodeId) -> Subtree<'_> {
        let stack = if root.0 < self.nodes.len() {
            vec![root]
        } else {
            Vec::new()
        };
        Subtree { topology: self, stack }
    }

    /// Distance from `node` to its root
    pub fn depth(&self, node: NodeId) -> usize {
        let mut depth = 0;
        let mut current = self.get(node).and_then(Component::parent);
        while let Some(parent) = current {
            depth += 1;
            current = self.nodes[parent.0].parent;
        }
        depth
    }

    /// Set (or replace) a typed attribute
    pub fn set_attribute(&mut self, node: NodeId, key: impl Into<String>, value: AttributeValue) {
        if let Some(component) = self.nodes.get_mut(node.0) {
            component.attributes.insert(key.into(), value);
        }
    }

    /// Read a typed attribute
    pub fn attribute(&self, node: NodeId, key: &str) -> Option<&AttributeValue> {
        self.get(node)?.attributes.get(key)
    }

    /// Write an indented listing of the subtree rooted at `root`
    pub fn write_tree<W: Write>(&self, root: NodeId, out: &mut W) -> io::Result<()> {
        let base = self.depth(root);
        for node in self.subtree(root) {
            let component = &self.nodes[node.0];
            let indent = (self.depth(node) - base) * 2;
            write!(
                out,
                "{:indent$}{} {} ({})",
                "",
                component.kind,
                component.id,
                component.name,
                indent = indent
            )?;
            for (key, value) in &component.attributes {
                write!(out, " {}={}", key, value)?;
            }
            writeln!(out)?;
        }
        Ok(())
    }
}

/// Pre-order traversal returned by [`Topology::subtree`].
pub struct Subtree<'a> {
    topology: &'a Topology,
    stack: Vec<NodeId>,
}

impl Iterator for Subtree<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let node = self.stack.pop()?;
        let children = &self.topology.nodes[node.0].children;
        self.stack.extend(children.iter().rev());
        Some(node)
    }
}
