//! Knowledge graph over paths and chunks.
//!
//! Path nodes (tree entries plus the root `""`) live in their own namespace,
//! apart from chunk nodes and `symbol:{name}` placeholders for unresolved
//! dependencies, so a file named like a chunk id stays distinct from it.
//! `contains` edges mirror the directory tree; `imports`/`references` edges
//! run from chunks to the chunk or symbol they depend on.
use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::dump::{EntryKind, PathEntry};
use crate::indexer::{CodeChunk, DependencyKind, DependencyLink, LinkTarget};

/// Id of the repository root node.
pub const ROOT_ID: &str = "";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    Contains,
    Imports,
    References,
}

impl From<DependencyKind> for Relation {
    fn from(kind: DependencyKind) -> Self {
        match kind {
            DependencyKind::Imports => Relation::Imports,
            DependencyKind::References => Relation::References,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Root,
    Directory,
    File,
    Chunk,
    Symbol,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub relation: Relation,
}

#[derive(Debug, Default)]
pub struct KnowledgeGraph {
    paths: HashMap<String, GraphNode>,
    nodes: HashMap<String, GraphNode>,
    edges: Vec<GraphEdge>,
    edge_keys: HashSet<(String, String, Relation)>,
    outgoing: HashMap<String, Vec<usize>>,
    children: HashMap<String, Vec<String>>,
    parents: HashMap<String, String>,
    file_chunks: HashMap<String, Vec<String>>,
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or(ROOT_ID)
}

pub fn symbol_id(name: &str) -> String {
    format!("symbol:{name}")
}

fn add_node(nodes: &mut HashMap<String, GraphNode>, id: &str, kind: NodeKind) {
    nodes.entry(id.to_string()).or_insert_with(|| GraphNode {
        id: id.to_string(),
        kind,
    });
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the full graph for one ingestion pass.
    pub fn build(entries: &[PathEntry], chunks: &[CodeChunk], links: &[DependencyLink]) -> Self {
        let mut graph = Self::new();
        graph.add_structure(entries);
        graph.add_chunks(chunks);
        graph.add_links(links);
        graph
    }

    /// Adds a node per entry plus the root, then a `contains` edge from each
    /// entry's parent when that parent exists.
    pub fn add_structure(&mut self, entries: &[PathEntry]) {
        add_node(&mut self.paths, ROOT_ID, NodeKind::Root);
        for entry in entries {
            let kind = match entry.kind {
                EntryKind::Directory => NodeKind::Directory,
                EntryKind::File => NodeKind::File,
            };
            add_node(&mut self.paths, &entry.path, kind);
        }

        for entry in entries {
            let parent = parent_of(&entry.path);
            if !self.paths.contains_key(parent) || self.parents.contains_key(&entry.path) {
                continue;
            }
            self.parents
                .insert(entry.path.clone(), parent.to_string());
            self.children
                .entry(parent.to_string())
                .or_default()
                .push(entry.path.clone());
            self.add_edge(parent, &entry.path, Relation::Contains);
        }
    }

    /// Adds a node per chunk and indexes chunk ids by file path in order.
    pub fn add_chunks(&mut self, chunks: &[CodeChunk]) {
        for chunk in chunks {
            if self.nodes.contains_key(&chunk.id) {
                continue;
            }
            add_node(&mut self.nodes, &chunk.id, NodeKind::Chunk);
            self.file_chunks
                .entry(chunk.file_path.clone())
                .or_default()
                .push(chunk.id.clone());
        }
    }

    /// Adds dependency edges. Links whose source or chunk target is unknown
    /// are ignored; symbol targets get a node on demand.
    pub fn add_links(&mut self, links: &[DependencyLink]) {
        for link in links {
            if !self.nodes.contains_key(&link.source) {
                continue;
            }
            let target = match &link.target {
                LinkTarget::Chunk(id) => {
                    if !self.nodes.contains_key(id) {
                        continue;
                    }
                    id.clone()
                }
                LinkTarget::Symbol(name) => {
                    let id = symbol_id(name);
                    add_node(&mut self.nodes, &id, NodeKind::Symbol);
                    id
                }
            };
            self.add_edge(&link.source, &target, link.kind.into());
        }
    }

    fn add_edge(&mut self, source: &str, target: &str, relation: Relation) {
        let key = (source.to_string(), target.to_string(), relation);
        if !self.edge_keys.insert(key) {
            return;
        }
        // Traversal follows dependency edges only.
        if relation != Relation::Contains {
            self.outgoing
                .entry(source.to_string())
                .or_default()
                .push(self.edges.len());
        }
        self.edges.push(GraphEdge {
            source: source.to_string(),
            target: target.to_string(),
            relation,
        });
    }

    /// Chunk or symbol node.
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    /// Root, directory or file node.
    pub fn path_node(&self, path: &str) -> Option<&GraphNode> {
        self.paths.get(path)
    }

    pub fn node_count(&self) -> usize {
        self.paths.len() + self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    /// Chunk ids of a file in chunk order.
    pub fn file_chunks(&self, path: &str) -> &[String] {
        self.file_chunks
            .get(path)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Paths one hop away: siblings, plus direct children for directories
    /// (the root counts as one). Unknown paths have no related files.
    pub fn related_files(&self, path: &str) -> Vec<String> {
        let Some(node) = self.paths.get(path) else {
            return Vec::new();
        };

        let mut related = Vec::new();
        if let Some(parent) = self.parents.get(path) {
            if let Some(siblings) = self.children.get(parent) {
                related.extend(siblings.iter().filter(|s| *s != path).cloned());
            }
        }

        if matches!(node.kind, NodeKind::Directory | NodeKind::Root) {
            if let Some(children) = self.children.get(path) {
                related.extend(children.iter().cloned());
            }
        }

        related
    }

    /// Chunks reachable from `chunk_id` over outgoing `imports`/`references`
    /// edges within `max_depth` hops, breadth-first, excluding the source.
    pub fn related_chunks(&self, chunk_id: &str, max_depth: usize) -> Vec<String> {
        let mut result = Vec::new();
        if max_depth == 0 || !self.nodes.contains_key(chunk_id) {
            return result;
        }

        let mut visited = HashSet::new();
        visited.insert(chunk_id.to_string());
        let mut queue = VecDeque::new();
        queue.push_back((chunk_id, 0usize));

        while let Some((node_id, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            let Some(edge_ids) = self.outgoing.get(node_id) else {
                continue;
            };
            for &idx in edge_ids {
                let edge = &self.edges[idx];
                if !visited.insert(edge.target.clone()) {
                    continue;
                }
                if self
                    .nodes
                    .get(&edge.target)
                    .is_some_and(|n| n.kind == NodeKind::Chunk)
                {
                    result.push(edge.target.clone());
                }
                queue.push_back((edge.target.as_str(), depth + 1));
            }
        }

        result
    }
}
