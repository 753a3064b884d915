// Query AST — §4.A.
// A balanced sequence of value nodes interleaved with operator nodes, plus
// recursive groups. The expand/transpile passes in `kql::expand` and
// `kql::transpile` consume this tree; the parser in `kql::parser` produces
// it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CompareOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    And,
    Or,
    Not,
}

/// One node of the query tree (§4.A).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    /// A single textual value under `key`.
    String { key: String, value: String },
    /// A boolean value under `key`.
    Boolean { key: String, value: bool },
    /// A timestamp comparison under `key`.
    DateTime {
        key: String,
        op: CompareOp,
        value: String,
    },
    /// A binary/unary operator consumed as a clause-selector during
    /// transpile; never itself a builder.
    Operator(Operator),
    /// A parenthesized sub-expression, optionally carrying its own default
    /// key (propagated to child value nodes with an empty key, §4.B).
    Group { key: Option<String>, nodes: Vec<Node> },
}

impl Node {
    pub fn is_operator(&self) -> bool {
        matches!(self, Node::Operator(_))
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            Node::String { key, .. } | Node::Boolean { key, .. } | Node::DateTime { key, .. } => {
                Some(key.as_str())
            }
            Node::Group { key, .. } => key.as_deref(),
            Node::Operator(_) => None,
        }
    }
}

/// A parsed KQL expression: a flat, balanced list of value/operator nodes
/// at the top level (groups nest their own lists).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub nodes: Vec<Node>,
}

impl Query {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }
}
