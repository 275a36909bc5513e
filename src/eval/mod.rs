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

//! Graph replay against an arbitrary arithmetic.
//!
//! [`GraphEvaluator`] walks a recorded graph in topological order and
//! recomputes every node with the operators of a caller-chosen [`Arithmetic`]
//! type. Replaying into [`NodeId`] records a new graph; replaying into
//! [`Dual`] differentiates the old one.

mod dual;

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::ir::{topological_order, BinOp, Graph, GraphError, NodeId, Op, UnaryOp};
use crate::opt::fold;

pub use dual::{jacobian_graph, Dual};

/// Errors raised while replaying a graph.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("operation '{op}' at {node} is not supported by this arithmetic")]
    UnsupportedOperation { node: NodeId, op: String },
    #[error("operation '{op}' is not supported by this arithmetic")]
    Unsupported { op: String },
    #[error("no value bound for {node}")]
    MissingBinding { node: NodeId },
    #[error("expected {expected} inputs, found {found}")]
    InputCount { expected: usize, found: usize },
    #[error("operand kind mismatch at {node}: {message}")]
    OperandKind { node: NodeId, message: String },
    #[error("external function '{name}' failed: {message}")]
    Function { name: String, message: String },
    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl EvalError {
    /// Attach the node being evaluated to context-free errors.
    fn at(self, node: NodeId) -> Self {
        match self {
            EvalError::Unsupported { op } => EvalError::UnsupportedOperation { node, op },
            other => other,
        }
    }
}

/// Value flowing through a replay: scalars, or the elements of an array node.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand<T> {
    Scalar(T),
    Array(Vec<T>),
}

/// Arithmetic capability a graph can be replayed against.
///
/// `Context` is the active trace results are created in (for example the
/// graph that [`NodeId`] values belong to).
pub trait Arithmetic: Clone {
    type Context;

    fn constant(ctx: &mut Self::Context, value: f64) -> Result<Self, EvalError>;

    fn unary(ctx: &mut Self::Context, op: UnaryOp, x: &Self) -> Result<Self, EvalError>;

    fn binary(ctx: &mut Self::Context, op: BinOp, lhs: &Self, rhs: &Self) -> Result<Self, EvalError>;

    fn call(_ctx: &mut Self::Context, name: &str, _args: &[Operand<Self>]) -> Result<Self, EvalError> {
        Err(EvalError::Unsupported {
            op: format!("call {name}"),
        })
    }

    /// Literal value, when known without evaluation.
    fn as_constant(&self, _ctx: &Self::Context) -> Option<f64> {
        None
    }

    /// Attach a display name; types without naming support ignore it.
    fn set_name(&mut self, _ctx: &mut Self::Context, _name: &str) -> Result<(), EvalError> {
        Ok(())
    }
}

impl Arithmetic for f64 {
    type Context = ();

    fn constant(_: &mut (), value: f64) -> Result<Self, EvalError> {
        Ok(value)
    }

    fn unary(_: &mut (), op: UnaryOp, x: &Self) -> Result<Self, EvalError> {
        Ok(fold::apply_unary(op, *x))
    }

    fn binary(_: &mut (), op: BinOp, lhs: &Self, rhs: &Self) -> Result<Self, EvalError> {
        Ok(fold::apply_binary(op, *lhs, *rhs))
    }

    fn as_constant(&self, _: &()) -> Option<f64> {
        Some(*self)
    }
}

/// Replays into another graph: each operation is recorded, so the new graph
/// gets the same deduplication and folding as a fresh trace.
impl Arithmetic for NodeId {
    type Context = Graph;

    fn constant(ctx: &mut Graph, value: f64) -> Result<Self, EvalError> {
        Ok(ctx.constant(value))
    }

    fn unary(ctx: &mut Graph, op: UnaryOp, x: &Self) -> Result<Self, EvalError> {
        Ok(ctx.unary(op, *x)?)
    }

    fn binary(ctx: &mut Graph, op: BinOp, lhs: &Self, rhs: &Self) -> Result<Self, EvalError> {
        Ok(ctx.binary(op, *lhs, *rhs)?)
    }

    fn call(ctx: &mut Graph, name: &str, args: &[Operand<Self>]) -> Result<Self, EvalError> {
        let mut ids = Vec::with_capacity(args.len());
        for arg in args {
            ids.push(match arg {
                Operand::Scalar(id) => *id,
                Operand::Array(items) => ctx.array(items)?,
            });
        }
        Ok(ctx.call(name, &ids)?)
    }

    fn as_constant(&self, ctx: &Graph) -> Option<f64> {
        ctx.constant_value(*self)
    }

    fn set_name(&mut self, ctx: &mut Graph, name: &str) -> Result<(), EvalError> {
        Ok(ctx.set_name(*self, name)?)
    }
}

type ExternalFn<'f, T> =
    Box<dyn Fn(&mut <T as Arithmetic>::Context, &[Operand<T>]) -> Result<T, EvalError> + 'f>;

/// Replays a source graph; see the module docs.
pub struct GraphEvaluator<'g, T: Arithmetic> {
    graph: &'g Graph,
    functions: HashMap<String, ExternalFn<'g, T>>,
}

impl<'g, T: Arithmetic> GraphEvaluator<'g, T> {
    pub fn new(graph: &'g Graph) -> Self {
        Self {
            graph,
            functions: HashMap::new(),
        }
    }

    /// Implementation for calls to `name`; takes precedence over
    /// [`Arithmetic::call`].
    pub fn with_function<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut T::Context, &[Operand<T>]) -> Result<T, EvalError> + 'g,
    {
        self.functions.insert(name.into(), Box::new(f));
        self
    }

    pub fn graph(&self) -> &'g Graph {
        self.graph
    }

    /// Evaluate the dependents with the independents bound in order.
    pub fn evaluate(&self, inputs: &[T], ctx: &mut T::Context) -> Result<Vec<T>, EvalError> {
        let independents = self.graph.independents();
        if inputs.len() != independents.len() {
            return Err(EvalError::InputCount {
                expected: independents.len(),
                found: inputs.len(),
            });
        }
        let bindings: BTreeMap<NodeId, T> = independents
            .iter()
            .copied()
            .zip(inputs.iter().cloned())
            .collect();
        self.evaluate_with(&bindings, ctx)
    }

    /// Evaluate the dependents with arbitrary nodes bound to values.
    ///
    /// Bound nodes are taken as given and their arguments are not visited, so
    /// binding an intermediate node cuts the graph at that point.
    pub fn evaluate_with(
        &self,
        bindings: &BTreeMap<NodeId, T>,
        ctx: &mut T::Context,
    ) -> Result<Vec<T>, EvalError> {
        let graph = self.graph;
        let order = topological_order(graph, graph.dependents(), |id| bindings.contains_key(&id))?;
        let mut values: Vec<Option<Operand<T>>> = vec![None; graph.len()];

        for id in order {
            if let Some(bound) = bindings.get(&id) {
                values[id.0] = Some(Operand::Scalar(bound.clone()));
                continue;
            }
            let node = graph.node(id);
            let args = node.args();
            let mut value = match node.op() {
                Op::Constant(c) => Operand::Scalar(T::constant(ctx, *c).map_err(|e| e.at(id))?),
                Op::Independent(_) => return Err(EvalError::MissingBinding { node: id }),
                Op::Unary(op) => {
                    let x = scalar(&values, args[0], id)?;
                    Operand::Scalar(T::unary(ctx, *op, x).map_err(|e| e.at(id))?)
                }
                Op::Binary(op) => {
                    let lhs = scalar(&values, args[0], id)?;
                    let rhs = scalar(&values, args[1], id)?;
                    Operand::Scalar(T::binary(ctx, *op, lhs, rhs).map_err(|e| e.at(id))?)
                }
                Op::Array => Operand::Array(
                    args.iter()
                        .map(|a| scalar(&values, *a, id).cloned())
                        .collect::<Result<_, _>>()?,
                ),
                Op::Element(index) => match operand(&values, args[0])? {
                    Operand::Array(items) => match items.get(*index) {
                        Some(item) => Operand::Scalar(item.clone()),
                        None => {
                            return Err(EvalError::OperandKind {
                                node: id,
                                message: format!("index {index} out of bounds"),
                            })
                        }
                    },
                    Operand::Scalar(_) => {
                        return Err(EvalError::OperandKind {
                            node: id,
                            message: format!("{} is bound to a scalar", args[0]),
                        })
                    }
                },
                Op::Call(name) => {
                    let operands = args
                        .iter()
                        .map(|a| operand(&values, *a).cloned())
                        .collect::<Result<Vec<_>, _>>()?;
                    let result = match self.functions.get(name) {
                        Some(f) => f(ctx, &operands),
                        None => T::call(ctx, name, &operands),
                    };
                    Operand::Scalar(result.map_err(|e| e.at(id))?)
                }
            };

            if let (Some(name), Operand::Scalar(v)) = (node.name(), &mut value) {
                v.set_name(ctx, name)?;
            }
            values[id.0] = Some(value);
        }

        debug!(dependents = graph.dependents().len(), "replayed graph");
        graph
            .dependents()
            .iter()
            .map(|dep| scalar(&values, *dep, *dep).cloned())
            .collect()
    }
}

fn operand<T>(values: &[Option<Operand<T>>], id: NodeId) -> Result<&Operand<T>, EvalError> {
    values
        .get(id.0)
        .and_then(Option::as_ref)
        .ok_or(EvalError::MissingBinding { node: id })
}

fn scalar<T>(values: &[Option<Operand<T>>], id: NodeId, user: NodeId) -> Result<&T, EvalError> {
    match operand(values, id)? {
        Operand::Scalar(v) => Ok(v),
        Operand::Array(_) => Err(EvalError::OperandKind {
            node: user,
            message: format!("{id} is an array"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f64_replay_matches_direct_arithmetic() {
        let mut g = Graph::new();
        let a = g.independent();
        let b = g.independent();
        let q = g.binary(BinOp::Div, a, b).unwrap();
        let s = g.unary(UnaryOp::Sqrt, q).unwrap();
        g.mark_dependent(s).unwrap();

        let out = GraphEvaluator::new(&g).evaluate(&[8.0, 2.0], &mut ()).unwrap();
        assert_eq!(out, vec![2.0]);
    }

    #[test]
    fn unsupported_calls_name_the_node() {
        let mut g = Graph::new();
        let a = g.independent();
        let f = g.call("ext", &[a]).unwrap();
        g.mark_dependent(f).unwrap();

        let err = GraphEvaluator::<f64>::new(&g)
            .evaluate(&[1.0], &mut ())
            .unwrap_err();
        assert_eq!(
            err,
            EvalError::UnsupportedOperation {
                node: f,
                op: "call ext".into()
            }
        );
    }

    #[test]
    fn registered_functions_take_precedence() {
        let mut g = Graph::new();
        let a = g.independent();
        let b = g.independent();
        let arr = g.array(&[a, b]).unwrap();
        let f = g.call("sum", &[arr]).unwrap();
        g.mark_dependent(f).unwrap();

        let eval = GraphEvaluator::<f64>::new(&g).with_function("sum", |_: &mut (), args: &[Operand<f64>]| {
            match &args[0] {
                Operand::Array(items) => Ok(items.iter().sum::<f64>()),
                Operand::Scalar(x) => Ok(*x),
            }
        });
        assert_eq!(eval.evaluate(&[1.5, 2.5], &mut ()).unwrap(), vec![4.0]);
    }

    #[test]
    fn wrong_input_count_is_reported() {
        let mut g = Graph::new();
        let a = g.independent();
        g.mark_dependent(a).unwrap();
        let err = GraphEvaluator::<f64>::new(&g).evaluate(&[], &mut ()).unwrap_err();
        assert_eq!(
            err,
            EvalError::InputCount {
                expected: 1,
                found: 0
            }
        );
    }
}
