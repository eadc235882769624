//! Path-segment tree mapping (verb, path) to a route binding.
//!
//! # Responsibilities
//! - Tokenize URL patterns on `/` into literal and `{param}` segments
//! - Share identical segments between bindings
//! - Resolve a concrete path depth by depth, capturing parameters
//! - Enumerate leaves for the discovery endpoint
//!
//! # Design Decisions
//! - Nodes live in an arena (`Vec<PathNode>`) and refer to each other by index
//! - A leaf is an explicit node variant holding one slot per verb
//! - Lookup prefers the literal child at each depth and never backtracks
//! - Immutable once published; rebuilt off to the side when plugins change

use std::sync::Arc;

use thiserror::Error;

use crate::config::SiblingPolicy;
use crate::routing::binding::{HttpVerb, RouteBinding, VERB_COUNT};

pub type NodeId = usize;

const ROOT: NodeId = 0;

#[derive(Debug)]
pub enum PathNode {
    Segment { name: String, children: Vec<NodeId> },
    Param { name: String, children: Vec<NodeId> },
    Leaf { bindings: [Option<Arc<RouteBinding>>; VERB_COUNT] },
}

impl PathNode {
    fn children(&self) -> &[NodeId] {
        match self {
            PathNode::Segment { children, .. } | PathNode::Param { children, .. } => children,
            PathNode::Leaf { .. } => &[],
        }
    }

    fn children_mut(&mut self) -> Option<&mut Vec<NodeId>> {
        match self {
            PathNode::Segment { children, .. } | PathNode::Param { children, .. } => Some(children),
            PathNode::Leaf { .. } => None,
        }
    }

    fn label(&self) -> String {
        match self {
            PathNode::Segment { name, .. } => name.clone(),
            PathNode::Param { name, .. } => format!("{{{name}}}"),
            PathNode::Leaf { .. } => String::new(),
        }
    }
}

/// A path parameter captured during lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlParameter {
    pub key: String,
    pub value: String,
}

impl UrlParameter {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub binding: Arc<RouteBinding>,
    /// Leaf-most parameter first.
    pub params: Vec<UrlParameter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupError {
    /// No segment chain matches the path.
    NotFound,
    /// The path exists but nothing is bound for this verb.
    VerbNotBound,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("route {pattern}: segment '{segment}' is ambiguous with sibling '{sibling}'")]
    AmbiguousSibling {
        pattern: String,
        segment: String,
        sibling: String,
    },

    #[error("route {pattern}: malformed segment '{segment}'")]
    MalformedPattern { pattern: String, segment: String },
}

/// One discoverable path: the shared pattern and its bound verbs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSummary {
    pub pattern: String,
    pub verbs: Vec<HttpVerb>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PatternSegment<'a> {
    Literal(&'a str),
    Param(&'a str),
}

fn parse_pattern(pattern: &str) -> Result<Vec<PatternSegment<'_>>, RouteError> {
    split_path(pattern)
        .map(|segment| {
            if let Some(inner) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                if !inner.is_empty() && !inner.contains(['{', '}', '/']) {
                    return Ok(PatternSegment::Param(inner));
                }
            } else if !segment.contains(['{', '}']) {
                return Ok(PatternSegment::Literal(segment));
            }
            Err(RouteError::MalformedPattern {
                pattern: pattern.to_string(),
                segment: segment.to_string(),
            })
        })
        .collect()
}

/// Non-empty `/`-separated segments.
fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

#[derive(Debug)]
pub struct RoutingTree {
    nodes: Vec<PathNode>,
    policy: SiblingPolicy,
}

impl Default for RoutingTree {
    fn default() -> Self {
        Self::new(SiblingPolicy::default())
    }
}

impl RoutingTree {
    pub fn new(policy: SiblingPolicy) -> Self {
        Self {
            nodes: vec![PathNode::Segment {
                name: String::new(),
                children: Vec::new(),
            }],
            policy,
        }
    }

    /// Build a tree, dropping (and logging) bindings that fail to insert.
    pub fn from_bindings(policy: SiblingPolicy, bindings: impl IntoIterator<Item = RouteBinding>) -> Self {
        let mut tree = Self::new(policy);
        for binding in bindings {
            let verb = binding.verb;
            if let Err(e) = tree.insert(binding) {
                tracing::error!(verb = %verb, error = %e, "Route binding dropped");
            }
        }
        tree
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes[ROOT].children().is_empty()
    }

    /// Insert a binding. Re-inserting the same (pattern, verb) replaces the
    /// slot without growing the tree.
    pub fn insert(&mut self, binding: RouteBinding) -> Result<(), RouteError> {
        let segments = parse_pattern(&binding.pattern)?;

        let mut node = ROOT;
        for segment in segments {
            node = match self.find_child(node, segment) {
                Some(existing) => existing,
                None => {
                    self.check_siblings(node, segment, &binding.pattern)?;
                    let new = match segment {
                        PatternSegment::Literal(name) => PathNode::Segment {
                            name: name.to_string(),
                            children: Vec::new(),
                        },
                        PatternSegment::Param(name) => PathNode::Param {
                            name: name.to_string(),
                            children: Vec::new(),
                        },
                    };
                    self.push_child(node, new)
                }
            };
        }

        let leaf = match self.leaf_of(node) {
            Some(leaf) => leaf,
            None => self.push_child(
                node,
                PathNode::Leaf {
                    bindings: Default::default(),
                },
            ),
        };

        if let PathNode::Leaf { bindings } = &mut self.nodes[leaf] {
            let slot = &mut bindings[binding.verb.index()];
            if slot.is_some() {
                tracing::debug!(pattern = %binding.pattern, verb = %binding.verb, "Route binding replaced");
            }
            *slot = Some(Arc::new(binding));
        }
        Ok(())
    }

    /// Resolve `path` (no query string) for `verb`.
    pub fn lookup(&self, verb: HttpVerb, path: &str) -> Result<RouteMatch, LookupError> {
        let mut node = ROOT;
        let mut params = Vec::new();

        for segment in split_path(path) {
            let children = self.nodes[node].children();
            let literal = children.iter().copied().find(
                |&c| matches!(&self.nodes[c], PathNode::Segment { name, .. } if name == segment),
            );
            if let Some(next) = literal {
                node = next;
                continue;
            }

            let param = children.iter().copied().find_map(|c| match &self.nodes[c] {
                PathNode::Param { name, .. } => Some((c, name)),
                _ => None,
            });
            match param {
                Some((next, name)) => {
                    params.push(UrlParameter::new(name.as_str(), segment));
                    node = next;
                }
                None => return Err(LookupError::NotFound),
            }
        }

        let leaf = self.leaf_of(node).ok_or(LookupError::NotFound)?;
        let binding = match &self.nodes[leaf] {
            PathNode::Leaf { bindings } => bindings[verb.index()].clone(),
            _ => None,
        }
        .ok_or(LookupError::VerbNotBound)?;

        params.reverse();
        Ok(RouteMatch { binding, params })
    }

    /// Depth-first listing of every leaf.
    pub fn discover(&self) -> Vec<RouteSummary> {
        let mut out = Vec::new();
        let mut stack = vec![ROOT];
        while let Some(node) = stack.pop() {
            match &self.nodes[node] {
                PathNode::Leaf { bindings } => {
                    let verbs: Vec<HttpVerb> = HttpVerb::ALL
                        .into_iter()
                        .filter(|v| bindings[v.index()].is_some())
                        .collect();
                    if let Some(binding) = bindings.iter().flatten().next() {
                        out.push(RouteSummary {
                            pattern: binding.pattern.clone(),
                            verbs,
                        });
                    }
                }
                other => stack.extend(other.children().iter().rev()),
            }
        }
        out
    }

    fn find_child(&self, node: NodeId, segment: PatternSegment<'_>) -> Option<NodeId> {
        self.nodes[node].children().iter().copied().find(|&c| {
            match (&self.nodes[c], segment) {
                (PathNode::Segment { name, .. }, PatternSegment::Literal(s)) => name == s,
                (PathNode::Param { name, .. }, PatternSegment::Param(s)) => name == s,
                _ => false,
            }
        })
    }

    fn leaf_of(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node]
            .children()
            .iter()
            .copied()
            .find(|&c| matches!(self.nodes[c], PathNode::Leaf { .. }))
    }

    /// A parameter may not share a depth with a literal or with a
    /// differently named parameter. Only the literal case is tolerated
    /// under [`SiblingPolicy::Permissive`]: lookup follows a single
    /// parameter child, so a second one would be unreachable.
    fn check_siblings(&self, node: NodeId, segment: PatternSegment<'_>, pattern: &str) -> Result<(), RouteError> {
        let conflict = self.nodes[node].children().iter().copied().find(|&c| {
            match (&self.nodes[c], segment) {
                (PathNode::Param { .. }, PatternSegment::Literal(_)) => true,
                (PathNode::Segment { .. }, PatternSegment::Param(_)) => true,
                (PathNode::Param { name, .. }, PatternSegment::Param(s)) => name != s,
                _ => false,
            }
        });
        let Some(sibling) = conflict else {
            return Ok(());
        };

        let err = RouteError::AmbiguousSibling {
            pattern: pattern.to_string(),
            segment: match segment {
                PatternSegment::Literal(s) => s.to_string(),
                PatternSegment::Param(s) => format!("{{{s}}}"),
            },
            sibling: self.nodes[sibling].label(),
        };
        let both_params = matches!(
            (&self.nodes[sibling], segment),
            (PathNode::Param { .. }, PatternSegment::Param(_))
        );
        match self.policy {
            SiblingPolicy::Strict => Err(err),
            SiblingPolicy::Permissive if both_params => Err(err),
            SiblingPolicy::Permissive => {
                tracing::warn!(error = %err, "Ambiguous route accepted; literal segment wins at lookup");
                Ok(())
            }
        }
    }

    fn push_child(&mut self, parent: NodeId, node: PathNode) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(node);
        if let Some(children) = self.nodes[parent].children_mut() {
            children.push(id);
        }
        id
    }
}
