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

//! Source emission from an [`EmissionPlan`].
//!
//! The [`Emitter`] walks the plan in order, inlining single-use nodes at their
//! point of use and assigning materialized nodes to the temporaries picked by
//! finalization. Spelling is delegated to a [`Syntax`] policy and every
//! identifier comes from a [`VariableNamer`].

pub mod c;
pub mod latex;

use tracing::{debug, warn};

use crate::ir::{BinOp, EmissionPlan, Graph, GraphError, NodeId, Op, Slot, UnaryOp};
use crate::naming::{IndependentVar, NamingWarning, VariableNamer};

pub use c::CSyntax;
pub use latex::LatexSyntax;

/// Operator spelling and statement punctuation of one output language.
pub trait Syntax {
    fn constant(&self, value: f64) -> String;

    fn unary(&self, op: UnaryOp, x: &str) -> String;

    fn binary(&self, op: BinOp, lhs: &str, rhs: &str) -> String;

    fn call(&self, name: &str, args: &[String]) -> String;

    /// Element `index` of a temporary array.
    fn element(&self, array: &str, index: usize) -> String;

    /// Reference to `len` consecutive inputs from `first` through `last`.
    fn array_view(&self, first: &str, last: &str, len: usize) -> String;

    fn assign(&self, target: &str, expr: &str) -> String;

    fn declarations(&self, _temporaries: &[String], _arrays: &[(String, usize)]) -> Vec<String> {
        Vec::new()
    }
}

/// Shape of one argument of an external function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Scalar,
    Array(usize),
}

/// External function referenced by emitted code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalFunction {
    pub name: String,
    pub params: Vec<ParamKind>,
}

/// Result of one emitter run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Emission {
    /// Assignments in dependency order, dependents last.
    pub statements: Vec<String>,
    /// Scalar temporaries that must be declared.
    pub temporaries: Vec<String>,
    /// Temporary arrays that must be declared, with their lengths.
    pub arrays: Vec<(String, usize)>,
    pub functions: Vec<ExternalFunction>,
    pub warnings: Vec<NamingWarning>,
}

impl Emission {
    /// Declarations followed by statements, one per line.
    pub fn render(&self, syntax: &dyn Syntax, indent: &str) -> String {
        let mut out = String::new();
        for line in syntax
            .declarations(&self.temporaries, &self.arrays)
            .iter()
            .chain(&self.statements)
        {
            out.push_str(indent);
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

pub struct Emitter<'n, S> {
    syntax: S,
    namer: &'n dyn VariableNamer,
}

impl<'n, S: Syntax> Emitter<'n, S> {
    pub fn new(syntax: S, namer: &'n dyn VariableNamer) -> Self {
        Self { syntax, namer }
    }

    pub fn syntax(&self) -> &S {
        &self.syntax
    }

    pub fn emit(&self, plan: &EmissionPlan<'_>) -> Result<Emission, GraphError> {
        let graph = plan.graph();
        let mut text: Vec<Option<String>> = vec![None; graph.len()];
        let mut views = vec![false; graph.len()];
        let mut out = Emission::default();

        for entry in plan.entries() {
            let id = entry.node;
            let node = graph.node(id);
            let rendered = match node.op() {
                Op::Constant(value) => self.syntax.constant(*value),
                Op::Independent(index) => self.namer.independent(IndependentVar {
                    node: id,
                    index: *index,
                }),
                Op::Array => {
                    if let Some(view) = self.array_view(graph, node.args(), &mut out.warnings) {
                        views[id.0] = true;
                        view
                    } else {
                        let Some(Slot::Array(slot)) = entry.slot else {
                            return Err(GraphError::MalformedArguments {
                                op: node.op().to_string(),
                                message: format!("array {id} has no array slot"),
                            });
                        };
                        let name = self.namer.temporary_array(slot);
                        for (i, arg) in node.args().iter().enumerate() {
                            let value = lookup(&text, *arg)?;
                            out.statements
                                .push(self.syntax.assign(&self.syntax.element(&name, i), value));
                        }
                        out.arrays.push((name.clone(), node.args().len()));
                        name
                    }
                }
                Op::Element(index) => {
                    let array = node.args()[0];
                    if views[array.0] {
                        lookup(&text, graph.node(array).args()[*index])?.to_string()
                    } else {
                        self.syntax.element(lookup(&text, array)?, *index)
                    }
                }
                Op::Unary(op) => {
                    let x = lookup(&text, node.args()[0])?;
                    self.materialize(self.syntax.unary(*op, x), entry.slot, &mut out)
                }
                Op::Binary(op) => {
                    let lhs = lookup(&text, node.args()[0])?;
                    let rhs = lookup(&text, node.args()[1])?;
                    self.materialize(self.syntax.binary(*op, lhs, rhs), entry.slot, &mut out)
                }
                Op::Call(name) => {
                    register_function(graph, name, node.args(), &mut out.functions)?;
                    let args = node
                        .args()
                        .iter()
                        .map(|a| lookup(&text, *a).map(str::to_string))
                        .collect::<Result<Vec<_>, _>>()?;
                    self.materialize(self.syntax.call(name, &args), entry.slot, &mut out)
                }
            };
            text[id.0] = Some(rendered);
        }

        for (index, dep) in graph.dependents().iter().enumerate() {
            let value = lookup(&text, *dep)?;
            out.statements
                .push(self.syntax.assign(&self.namer.dependent(index), value));
        }

        debug!(
            statements = out.statements.len(),
            temporaries = out.temporaries.len(),
            arrays = out.arrays.len(),
            "emitted plan"
        );
        Ok(out)
    }

    fn materialize(&self, expr: String, slot: Option<Slot>, out: &mut Emission) -> String {
        match slot {
            Some(Slot::Temporary(slot)) => {
                let name = self.namer.temporary(slot);
                out.statements.push(self.syntax.assign(&name, &expr));
                out.temporaries.push(name.clone());
                name
            }
            _ => expr,
        }
    }

    /// A view is possible only when every adjacent pair of elements is a pair
    /// of consecutive inputs of the same array.
    fn array_view(
        &self,
        graph: &Graph,
        args: &[NodeId],
        warnings: &mut Vec<NamingWarning>,
    ) -> Option<String> {
        let vars = args
            .iter()
            .map(|a| match graph.node(*a).op() {
                Op::Independent(index) => Some(IndependentVar {
                    node: *a,
                    index: *index,
                }),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()?;

        for pair in vars.windows(2) {
            if !self.namer.is_consecutive_in_indep_array(pair[0], pair[1]) {
                return None;
            }
            if !self.namer.is_in_same_independent_array(pair[0], pair[1]) {
                let warning = NamingWarning::InconsistentAdjacency {
                    first: pair[0].index,
                    second: pair[1].index,
                };
                warn!("{warning}");
                warnings.push(warning);
                return None;
            }
        }

        let first = self.namer.independent(*vars.first()?);
        let last = self.namer.independent(*vars.last()?);
        Some(self.syntax.array_view(&first, &last, vars.len()))
    }
}

fn lookup(text: &[Option<String>], id: NodeId) -> Result<&str, GraphError> {
    text.get(id.0)
        .and_then(|t| t.as_deref())
        .ok_or(GraphError::UnknownNode(id))
}

fn register_function(
    graph: &Graph,
    name: &str,
    args: &[NodeId],
    functions: &mut Vec<ExternalFunction>,
) -> Result<(), GraphError> {
    let params: Vec<ParamKind> = args
        .iter()
        .map(|a| {
            let node = graph.node(*a);
            if node.is_array() {
                ParamKind::Array(node.args().len())
            } else {
                ParamKind::Scalar
            }
        })
        .collect();

    match functions.iter().find(|f| f.name == name) {
        Some(existing) if existing.params != params => Err(GraphError::MalformedArguments {
            op: format!("call {name}"),
            message: "called with inconsistent argument shapes".into(),
        }),
        Some(_) => Ok(()),
        None => {
            functions.push(ExternalFunction {
                name: name.to_string(),
                params,
            });
            Ok(())
        }
    }
}
