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

//! Forward-mode differentiation over any [`Arithmetic`].

use tracing::debug;

use crate::ir::{BinOp, Graph, NodeId, UnaryOp};

use super::{Arithmetic, EvalError, GraphEvaluator, Operand};

/// Value paired with its directional derivative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dual<T> {
    pub value: T,
    pub derivative: T,
}

impl<T> Dual<T> {
    pub fn new(value: T, derivative: T) -> Self {
        Self { value, derivative }
    }
}

fn is_literal<T: Arithmetic>(x: &T, ctx: &T::Context, literal: f64) -> bool {
    x.as_constant(ctx) == Some(literal)
}

// The helpers below skip terms whose derivative factor is a literal zero or
// one. Without this, a graph replayed into `NodeId` would carry every
// `0 * ...` term into the derivative program.

fn add<T: Arithmetic>(ctx: &mut T::Context, a: &T, b: &T) -> Result<T, EvalError> {
    if is_literal(a, ctx, 0.0) {
        Ok(b.clone())
    } else if is_literal(b, ctx, 0.0) {
        Ok(a.clone())
    } else {
        T::binary(ctx, BinOp::Add, a, b)
    }
}

fn sub<T: Arithmetic>(ctx: &mut T::Context, a: &T, b: &T) -> Result<T, EvalError> {
    if is_literal(b, ctx, 0.0) {
        Ok(a.clone())
    } else if is_literal(a, ctx, 0.0) {
        T::unary(ctx, UnaryOp::Neg, b)
    } else {
        T::binary(ctx, BinOp::Sub, a, b)
    }
}

fn mul<T: Arithmetic>(ctx: &mut T::Context, a: &T, b: &T) -> Result<T, EvalError> {
    if is_literal(a, ctx, 0.0) || is_literal(b, ctx, 1.0) {
        Ok(a.clone())
    } else if is_literal(b, ctx, 0.0) || is_literal(a, ctx, 1.0) {
        Ok(b.clone())
    } else {
        T::binary(ctx, BinOp::Mul, a, b)
    }
}

fn div<T: Arithmetic>(ctx: &mut T::Context, a: &T, b: &T) -> Result<T, EvalError> {
    if is_literal(a, ctx, 0.0) || is_literal(b, ctx, 1.0) {
        Ok(a.clone())
    } else {
        T::binary(ctx, BinOp::Div, a, b)
    }
}

fn neg<T: Arithmetic>(ctx: &mut T::Context, a: &T) -> Result<T, EvalError> {
    if is_literal(a, ctx, 0.0) {
        Ok(a.clone())
    } else {
        T::unary(ctx, UnaryOp::Neg, a)
    }
}

impl<T: Arithmetic> Arithmetic for Dual<T> {
    type Context = T::Context;

    fn constant(ctx: &mut T::Context, value: f64) -> Result<Self, EvalError> {
        Ok(Dual::new(T::constant(ctx, value)?, T::constant(ctx, 0.0)?))
    }

    fn unary(ctx: &mut T::Context, op: UnaryOp, x: &Self) -> Result<Self, EvalError> {
        let value = T::unary(ctx, op, &x.value)?;
        let dx = &x.derivative;
        if is_literal(dx, ctx, 0.0) {
            return Ok(Dual::new(value, dx.clone()));
        }
        let u = &x.value;
        let derivative = match op {
            UnaryOp::Neg => neg(ctx, dx)?,
            UnaryOp::Abs => {
                let s = T::unary(ctx, UnaryOp::Sign, u)?;
                mul(ctx, &s, dx)?
            }
            UnaryOp::Sign => T::constant(ctx, 0.0)?,
            UnaryOp::Exp => mul(ctx, &value, dx)?,
            UnaryOp::Log => div(ctx, dx, u)?,
            UnaryOp::Sqrt => {
                let two = T::constant(ctx, 2.0)?;
                let denom = mul(ctx, &two, &value)?;
                div(ctx, dx, &denom)?
            }
            UnaryOp::Sin => {
                let c = T::unary(ctx, UnaryOp::Cos, u)?;
                mul(ctx, &c, dx)?
            }
            UnaryOp::Cos => {
                let s = T::unary(ctx, UnaryOp::Sin, u)?;
                let t = mul(ctx, &s, dx)?;
                neg(ctx, &t)?
            }
            UnaryOp::Tan => {
                let one = T::constant(ctx, 1.0)?;
                let sq = mul(ctx, &value, &value)?;
                let sec2 = add(ctx, &one, &sq)?;
                mul(ctx, &sec2, dx)?
            }
            UnaryOp::Asin | UnaryOp::Acos => {
                let one = T::constant(ctx, 1.0)?;
                let sq = mul(ctx, u, u)?;
                let diff = sub(ctx, &one, &sq)?;
                let root = T::unary(ctx, UnaryOp::Sqrt, &diff)?;
                let d = div(ctx, dx, &root)?;
                if op == UnaryOp::Acos {
                    neg(ctx, &d)?
                } else {
                    d
                }
            }
            UnaryOp::Atan => {
                let one = T::constant(ctx, 1.0)?;
                let sq = mul(ctx, u, u)?;
                let denom = add(ctx, &one, &sq)?;
                div(ctx, dx, &denom)?
            }
            UnaryOp::Sinh => {
                let c = T::unary(ctx, UnaryOp::Cosh, u)?;
                mul(ctx, &c, dx)?
            }
            UnaryOp::Cosh => {
                let s = T::unary(ctx, UnaryOp::Sinh, u)?;
                mul(ctx, &s, dx)?
            }
            UnaryOp::Tanh => {
                let one = T::constant(ctx, 1.0)?;
                let sq = mul(ctx, &value, &value)?;
                let sech2 = sub(ctx, &one, &sq)?;
                mul(ctx, &sech2, dx)?
            }
        };
        Ok(Dual::new(value, derivative))
    }

    fn binary(ctx: &mut T::Context, op: BinOp, lhs: &Self, rhs: &Self) -> Result<Self, EvalError> {
        let value = T::binary(ctx, op, &lhs.value, &rhs.value)?;
        let (a, da) = (&lhs.value, &lhs.derivative);
        let (b, db) = (&rhs.value, &rhs.derivative);
        let derivative = match op {
            BinOp::Add => add(ctx, da, db)?,
            BinOp::Sub => sub(ctx, da, db)?,
            BinOp::Mul => {
                let left = mul(ctx, da, b)?;
                let right = mul(ctx, a, db)?;
                add(ctx, &left, &right)?
            }
            BinOp::Div => {
                let scaled = mul(ctx, &value, db)?;
                let num = sub(ctx, da, &scaled)?;
                div(ctx, &num, b)?
            }
            BinOp::Pow => {
                // d(a^b) = b * a^(b - 1) * da + a^b * ln(a) * db
                let mut total = T::constant(ctx, 0.0)?;
                if !is_literal(da, ctx, 0.0) {
                    let one = T::constant(ctx, 1.0)?;
                    let exponent = sub(ctx, b, &one)?;
                    let power = T::binary(ctx, BinOp::Pow, a, &exponent)?;
                    let factor = mul(ctx, b, &power)?;
                    total = mul(ctx, &factor, da)?;
                }
                if !is_literal(db, ctx, 0.0) {
                    let ln = T::unary(ctx, UnaryOp::Log, a)?;
                    let factor = mul(ctx, &value, &ln)?;
                    let term = mul(ctx, &factor, db)?;
                    total = add(ctx, &total, &term)?;
                }
                total
            }
        };
        Ok(Dual::new(value, derivative))
    }

    /// External functions have no derivative rule, so a call is only
    /// supported when every argument is passive.
    fn call(ctx: &mut T::Context, name: &str, args: &[Operand<Self>]) -> Result<Self, EvalError> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            let passive = match arg {
                Operand::Scalar(d) => is_literal(&d.derivative, ctx, 0.0),
                Operand::Array(items) => items.iter().all(|d| is_literal(&d.derivative, ctx, 0.0)),
            };
            if !passive {
                return Err(EvalError::Unsupported {
                    op: format!("derivative of call {name}"),
                });
            }
            values.push(match arg {
                Operand::Scalar(d) => Operand::Scalar(d.value.clone()),
                Operand::Array(items) => {
                    Operand::Array(items.iter().map(|d| d.value.clone()).collect())
                }
            });
        }
        Ok(Dual::new(T::call(ctx, name, &values)?, T::constant(ctx, 0.0)?))
    }

    fn as_constant(&self, ctx: &T::Context) -> Option<f64> {
        if is_literal(&self.derivative, ctx, 0.0) {
            self.value.as_constant(ctx)
        } else {
            None
        }
    }

    fn set_name(&mut self, ctx: &mut T::Context, name: &str) -> Result<(), EvalError> {
        self.value.set_name(ctx, name)
    }
}

/// Build a graph computing the dense Jacobian of `graph`.
///
/// The result has the same inputs and `m * n` dependents in row-major order
/// (`d y_i / d x_j` at `i * n + j`). One forward pass is replayed per input;
/// the primal part of each pass deduplicates against the previous ones.
pub fn jacobian_graph(graph: &Graph) -> Result<Graph, EvalError> {
    let n = graph.independents().len();
    let m = graph.dependents().len();
    let mut out = Graph::new();
    let inputs: Vec<NodeId> = (0..n).map(|_| out.independent()).collect();
    let zero = out.constant(0.0);
    let one = out.constant(1.0);

    let evaluator = GraphEvaluator::<Dual<NodeId>>::new(graph);
    let mut columns = Vec::with_capacity(n);
    for j in 0..n {
        let seeds: Vec<Dual<NodeId>> = inputs
            .iter()
            .enumerate()
            .map(|(k, x)| Dual::new(*x, if k == j { one } else { zero }))
            .collect();
        let column = evaluator.evaluate(&seeds, &mut out)?;
        columns.push(column);
    }

    for i in 0..m {
        for column in &columns {
            out.mark_dependent(column[i].derivative)?;
        }
    }

    debug!(inputs = n, outputs = m, nodes = out.len(), "built jacobian graph");
    Ok(out)
}
