// Copyright 2025 STARGA Inc.
// Licensed under the Apache License, Version 2.0 (the “License”);
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an “AS IS” BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Part of the ADGEN project (Algorithmic Differentiation code GENeration).

//! Deduplicated operation graph recorded during a symbolic trace.
//!
//! Nodes live in a single arena and are referenced by [`NodeId`]. A node may
//! only reference nodes that already exist, so a graph built through
//! [`Graph::record`] is acyclic by construction. Structurally identical
//! operations are merged at record time and operations whose arguments are all
//! literal constants are folded into a new constant.

mod parse;
mod plan;
mod print;
mod verify;

use std::collections::HashMap;
use std::fmt;

use crate::naming::is_c_identifier;
use crate::opt::fold;

pub use parse::{parse_graph, ParseError};
pub use plan::{topological_order, EmissionPlan, PlanEntry};
pub use print::format_graph;
pub use verify::verify_graph;

/// Stable identity of a node inside its owning [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Abs,
    Sign,
    Exp,
    Log,
    Sqrt,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
}

impl UnaryOp {
    pub const ALL: [UnaryOp; 15] = [
        UnaryOp::Neg,
        UnaryOp::Abs,
        UnaryOp::Sign,
        UnaryOp::Exp,
        UnaryOp::Log,
        UnaryOp::Sqrt,
        UnaryOp::Sin,
        UnaryOp::Cos,
        UnaryOp::Tan,
        UnaryOp::Asin,
        UnaryOp::Acos,
        UnaryOp::Atan,
        UnaryOp::Sinh,
        UnaryOp::Cosh,
        UnaryOp::Tanh,
    ];

    pub fn mnemonic(self) -> &'static str {
        match self {
            UnaryOp::Neg => "neg",
            UnaryOp::Abs => "abs",
            UnaryOp::Sign => "sign",
            UnaryOp::Exp => "exp",
            UnaryOp::Log => "log",
            UnaryOp::Sqrt => "sqrt",
            UnaryOp::Sin => "sin",
            UnaryOp::Cos => "cos",
            UnaryOp::Tan => "tan",
            UnaryOp::Asin => "asin",
            UnaryOp::Acos => "acos",
            UnaryOp::Atan => "atan",
            UnaryOp::Sinh => "sinh",
            UnaryOp::Cosh => "cosh",
            UnaryOp::Tanh => "tanh",
        }
    }

    pub fn from_mnemonic(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.mnemonic() == s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinOp {
    pub const ALL: [BinOp; 5] = [BinOp::Add, BinOp::Sub, BinOp::Mul, BinOp::Div, BinOp::Pow];

    pub fn mnemonic(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::Div => "div",
            BinOp::Pow => "pow",
        }
    }

    pub fn from_mnemonic(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.mnemonic() == s)
    }

    pub fn is_commutative(self) -> bool {
        matches!(self, BinOp::Add | BinOp::Mul)
    }
}

/// Operation performed by a node.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Constant(f64),
    /// The k-th independent (input) variable.
    Independent(usize),
    Unary(UnaryOp),
    Binary(BinOp),
    /// Ordered list of scalar elements.
    Array,
    /// Element `i` of an `Array` argument.
    Element(usize),
    /// Call to an externally provided function returning a scalar.
    Call(String),
}

impl Op {
    pub fn mnemonic(&self) -> &str {
        match self {
            Op::Constant(_) => "const",
            Op::Independent(_) => "indep",
            Op::Unary(op) => op.mnemonic(),
            Op::Binary(op) => op.mnemonic(),
            Op::Array => "array",
            Op::Element(_) => "elem",
            Op::Call(_) => "call",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Call(name) => write!(f, "call {name}"),
            other => f.write_str(other.mnemonic()),
        }
    }
}

/// Storage assigned to a node when a graph is finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Temporary(usize),
    Array(usize),
}

/// Deduplication key: operation kind (constants by bit pattern) plus the
/// ordered argument identities.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum OpKey {
    Constant(u64),
    Unary(UnaryOp),
    Binary(BinOp),
    Array,
    Element(usize),
    Call(String),
}

impl OpKey {
    fn of(op: &Op) -> Option<Self> {
        match op {
            Op::Constant(v) => Some(OpKey::Constant(v.to_bits())),
            Op::Independent(_) => None,
            Op::Unary(u) => Some(OpKey::Unary(*u)),
            Op::Binary(b) => Some(OpKey::Binary(*b)),
            Op::Array => Some(OpKey::Array),
            Op::Element(i) => Some(OpKey::Element(*i)),
            Op::Call(name) => Some(OpKey::Call(name.clone())),
        }
    }
}

/// Structural errors raised while recording or finalizing a graph.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum GraphError {
    /// A back-edge was found while ordering the graph.
    #[error("cyclic reference through node {node}")]
    CyclicReference { node: NodeId },
    /// The identity does not belong to this graph.
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    /// The argument list does not fit the operation.
    #[error("malformed arguments for '{op}': {message}")]
    MalformedArguments { op: String, message: String },
    /// A node references a node that was recorded after it.
    #[error("node {node} references later node {arg}")]
    ForwardReference { node: NodeId, arg: NodeId },
    /// Display names are printed quoted, one node per line.
    #[error("node {node} cannot be named {name:?}: quotes and control characters are not allowed")]
    InvalidName { node: NodeId, name: String },
    /// Independent variables must be numbered 0..n without gaps.
    #[error("independent numbering is not dense: expected input {expected}, found {found}")]
    InputNumbering { expected: usize, found: usize },
}

impl GraphError {
    fn malformed(op: &Op, message: impl Into<String>) -> Self {
        GraphError::MalformedArguments {
            op: op.to_string(),
            message: message.into(),
        }
    }
}

/// One operation in the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    op: Op,
    args: Vec<NodeId>,
    name: Option<String>,
    slot: Option<Slot>,
    usage: usize,
    temporary: bool,
}

impl Node {
    pub fn new(op: Op, args: Vec<NodeId>) -> Self {
        Self {
            op,
            args,
            name: None,
            slot: None,
            usage: 0,
            temporary: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_temporary(mut self, requested: bool) -> Self {
        self.temporary = requested;
        self
    }

    pub fn op(&self) -> &Op {
        &self.op
    }

    pub fn args(&self) -> &[NodeId] {
        &self.args
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Storage assigned by the last [`Graph::finalize`].
    pub fn slot(&self) -> Option<Slot> {
        self.slot
    }

    pub fn usage(&self) -> usize {
        self.usage
    }

    pub fn is_temporary_requested(&self) -> bool {
        self.temporary
    }

    pub fn is_array(&self) -> bool {
        matches!(self.op, Op::Array)
    }
}

/// Arena owning every recorded node plus the input and output boundaries.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    index: HashMap<(OpKey, Vec<NodeId>), NodeId>,
    independents: Vec<NodeId>,
    dependents: Vec<NodeId>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a graph from raw nodes.
    ///
    /// Argument ranges and arities are validated but ordering is not, so a
    /// cyclic graph can be represented; [`Graph::finalize`] rejects it.
    pub fn from_parts(nodes: Vec<Node>, dependents: Vec<NodeId>) -> Result<Self, GraphError> {
        for (i, node) in nodes.iter().enumerate() {
            check_arguments(&nodes, &node.op, &node.args)?;
            if let Some(name) = &node.name {
                check_name(NodeId(i), name)?;
            }
        }

        let mut inputs: Vec<(usize, NodeId)> = nodes
            .iter()
            .enumerate()
            .filter_map(|(i, node)| match node.op {
                Op::Independent(k) => Some((k, NodeId(i))),
                _ => None,
            })
            .collect();
        inputs.sort();
        for (expected, (found, _)) in inputs.iter().enumerate() {
            if *found != expected {
                return Err(GraphError::InputNumbering {
                    expected,
                    found: *found,
                });
            }
        }

        for dep in &dependents {
            if dep.0 >= nodes.len() {
                return Err(GraphError::UnknownNode(*dep));
            }
            if nodes[dep.0].is_array() {
                return Err(GraphError::malformed(
                    &nodes[dep.0].op,
                    "an array cannot be a dependent",
                ));
            }
        }

        let mut graph = Graph {
            nodes,
            index: HashMap::new(),
            independents: inputs.into_iter().map(|(_, id)| id).collect(),
            dependents,
        };
        for node in &mut graph.nodes {
            node.usage = 0;
            node.slot = None;
        }
        for i in 0..graph.nodes.len() {
            for a in 0..graph.nodes[i].args.len() {
                let arg = graph.nodes[i].args[a];
                graph.nodes[arg.0].usage += 1;
            }
            if let Some(op_key) = OpKey::of(&graph.nodes[i].op) {
                graph
                    .index
                    .entry((op_key, graph.nodes[i].args.clone()))
                    .or_insert(NodeId(i));
            }
        }
        for dep in graph.dependents.clone() {
            graph.nodes[dep.0].usage += 1;
        }
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    /// Node lookup for identities produced by this graph.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not produced by this graph.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    pub fn independents(&self) -> &[NodeId] {
        &self.independents
    }

    pub fn dependents(&self) -> &[NodeId] {
        &self.dependents
    }

    /// Create and register the next independent variable.
    pub fn independent(&mut self) -> NodeId {
        let k = self.independents.len();
        let id = self.push(Node::new(Op::Independent(k), Vec::new()));
        self.independents.push(id);
        id
    }

    pub fn constant(&mut self, value: f64) -> NodeId {
        let key = (OpKey::Constant(value.to_bits()), Vec::new());
        if let Some(&existing) = self.index.get(&key) {
            self.nodes[existing.0].usage += 1;
            return existing;
        }
        let id = self.push(Node::new(Op::Constant(value), Vec::new()));
        self.index.insert(key, id);
        id
    }

    /// Append an operation, or return the structurally identical node that
    /// already exists. Operations over literal constants fold eagerly.
    pub fn record(&mut self, op: Op, args: &[NodeId]) -> Result<NodeId, GraphError> {
        match op {
            Op::Independent(_) => {
                return Err(GraphError::malformed(
                    &op,
                    "independent variables are created with Graph::independent",
                ))
            }
            Op::Constant(value) => {
                if !args.is_empty() {
                    return Err(GraphError::malformed(&op, "constants take no arguments"));
                }
                return Ok(self.constant(value));
            }
            _ => {}
        }
        check_arguments(&self.nodes, &op, args)?;

        let constants: Option<Vec<f64>> = args.iter().map(|a| self.constant_value(*a)).collect();
        if let Some(values) = constants {
            if let Some(folded) = fold::fold(&op, &values) {
                return Ok(self.constant(folded));
            }
        }

        let mut args = args.to_vec();
        if let Op::Binary(b) = op {
            if b.is_commutative() && args[1] < args[0] {
                args.swap(0, 1);
            }
        }

        let Some(op_key) = OpKey::of(&op) else {
            return Err(GraphError::malformed(&op, "operation cannot be recorded"));
        };
        let key = (op_key, args);
        if let Some(&existing) = self.index.get(&key) {
            self.nodes[existing.0].usage += 1;
            return Ok(existing);
        }
        for arg in &key.1 {
            self.nodes[arg.0].usage += 1;
        }
        let id = self.push(Node::new(op, key.1.clone()));
        self.index.insert(key, id);
        Ok(id)
    }

    pub fn unary(&mut self, op: UnaryOp, x: NodeId) -> Result<NodeId, GraphError> {
        self.record(Op::Unary(op), &[x])
    }

    pub fn binary(&mut self, op: BinOp, lhs: NodeId, rhs: NodeId) -> Result<NodeId, GraphError> {
        self.record(Op::Binary(op), &[lhs, rhs])
    }

    pub fn array(&mut self, elements: &[NodeId]) -> Result<NodeId, GraphError> {
        self.record(Op::Array, elements)
    }

    pub fn element(&mut self, array: NodeId, index: usize) -> Result<NodeId, GraphError> {
        self.record(Op::Element(index), &[array])
    }

    pub fn call(&mut self, name: &str, args: &[NodeId]) -> Result<NodeId, GraphError> {
        self.record(Op::Call(name.to_string()), args)
    }

    /// Register `id` as the next dependent (output); returns its index.
    pub fn mark_dependent(&mut self, id: NodeId) -> Result<usize, GraphError> {
        let node = self.nodes.get_mut(id.0).ok_or(GraphError::UnknownNode(id))?;
        if node.is_array() {
            return Err(GraphError::malformed(
                &node.op,
                "an array cannot be a dependent",
            ));
        }
        node.usage += 1;
        self.dependents.push(id);
        Ok(self.dependents.len() - 1)
    }

    pub fn set_name(&mut self, id: NodeId, name: impl Into<String>) -> Result<(), GraphError> {
        let name = name.into();
        let node = self.nodes.get_mut(id.0).ok_or(GraphError::UnknownNode(id))?;
        check_name(id, &name)?;
        node.name = Some(name);
        Ok(())
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.get(id).and_then(Node::name)
    }

    /// Force `id` into a named temporary even when it is used only once.
    pub fn request_temporary(&mut self, id: NodeId) -> Result<(), GraphError> {
        let node = self.nodes.get_mut(id.0).ok_or(GraphError::UnknownNode(id))?;
        node.temporary = true;
        Ok(())
    }

    pub fn constant_value(&self, id: NodeId) -> Option<f64> {
        match self.get(id)?.op {
            Op::Constant(v) => Some(v),
            _ => None,
        }
    }

    pub fn usage(&self, id: NodeId) -> usize {
        self.get(id).map_or(0, Node::usage)
    }

    pub fn arguments(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map_or(&[][..], Node::args)
    }

    /// Nodes that reference `id` as an argument, in recording order.
    pub fn users(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes()
            .filter(|(_, node)| node.args.contains(&id))
            .map(|(user, _)| user)
            .collect()
    }

    fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }
}

pub(crate) fn set_slot(node: &mut Node, slot: Option<Slot>) {
    node.slot = slot;
}

/// Arity and operand-kind checks shared by recording, rebuilding and
/// verification.
pub(crate) fn check_arguments(nodes: &[Node], op: &Op, args: &[NodeId]) -> Result<(), GraphError> {
    for arg in args {
        if arg.0 >= nodes.len() {
            return Err(GraphError::UnknownNode(*arg));
        }
    }
    let scalar_args = |args: &[NodeId]| -> Result<(), GraphError> {
        if args.iter().any(|a| nodes[a.0].is_array()) {
            return Err(GraphError::malformed(op, "array used as a scalar operand"));
        }
        Ok(())
    };
    let arity = |expected: usize| -> Result<(), GraphError> {
        if args.len() != expected {
            return Err(GraphError::malformed(
                op,
                format!("expected {expected} arguments, found {}", args.len()),
            ));
        }
        Ok(())
    };

    match op {
        Op::Constant(_) | Op::Independent(_) => arity(0),
        Op::Unary(_) => {
            arity(1)?;
            scalar_args(args)
        }
        Op::Binary(_) => {
            arity(2)?;
            scalar_args(args)
        }
        Op::Array => {
            if args.is_empty() {
                return Err(GraphError::malformed(op, "arrays need at least one element"));
            }
            scalar_args(args)
        }
        Op::Element(index) => {
            arity(1)?;
            let array = &nodes[args[0].0];
            if !array.is_array() {
                return Err(GraphError::malformed(op, format!("{} is not an array", args[0])));
            }
            if *index >= array.args.len() {
                return Err(GraphError::malformed(
                    op,
                    format!(
                        "index {index} out of bounds for array of length {}",
                        array.args.len()
                    ),
                ));
            }
            Ok(())
        }
        Op::Call(name) => {
            if !is_c_identifier(name) {
                return Err(GraphError::malformed(
                    op,
                    format!("function name {name:?} is not a C identifier"),
                ));
            }
            Ok(())
        }
    }
}

fn check_name(node: NodeId, name: &str) -> Result<(), GraphError> {
    if name.chars().any(|c| c == '"' || c.is_control()) {
        return Err(GraphError::InvalidName {
            node,
            name: name.to_string(),
        });
    }
    Ok(())
}
