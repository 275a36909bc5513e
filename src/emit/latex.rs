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

use crate::ir::{BinOp, UnaryOp};

use super::Syntax;

/// Typeset math for an `align`-style environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatexSyntax;

impl Syntax for LatexSyntax {
    fn constant(&self, value: f64) -> String {
        if value.is_nan() {
            "\\mathrm{NaN}".to_string()
        } else if value.is_infinite() {
            if value > 0.0 {
                "\\infty".to_string()
            } else {
                "\\left(-\\infty\\right)".to_string()
            }
        } else if value.is_sign_negative() {
            format!("\\left({:?}\\right)", value)
        } else {
            format!("{:?}", value)
        }
    }

    fn unary(&self, op: UnaryOp, x: &str) -> String {
        let function = match op {
            UnaryOp::Neg => return format!("\\left(-{x}\\right)"),
            UnaryOp::Abs => return format!("\\left|{x}\\right|"),
            UnaryOp::Exp => return format!("e^{{{x}}}"),
            UnaryOp::Sqrt => return format!("\\sqrt{{{x}}}"),
            UnaryOp::Sign => "\\operatorname{sgn}",
            UnaryOp::Log => "\\ln",
            UnaryOp::Sin => "\\sin",
            UnaryOp::Cos => "\\cos",
            UnaryOp::Tan => "\\tan",
            UnaryOp::Asin => "\\arcsin",
            UnaryOp::Acos => "\\arccos",
            UnaryOp::Atan => "\\arctan",
            UnaryOp::Sinh => "\\sinh",
            UnaryOp::Cosh => "\\cosh",
            UnaryOp::Tanh => "\\tanh",
        };
        format!("{function}\\left({x}\\right)")
    }

    fn binary(&self, op: BinOp, lhs: &str, rhs: &str) -> String {
        match op {
            BinOp::Add => format!("\\left({lhs} + {rhs}\\right)"),
            BinOp::Sub => format!("\\left({lhs} - {rhs}\\right)"),
            BinOp::Mul => format!("\\left({lhs} \\cdot {rhs}\\right)"),
            BinOp::Div => format!("\\frac{{{lhs}}}{{{rhs}}}"),
            BinOp::Pow => format!("{{{lhs}}}^{{{rhs}}}"),
        }
    }

    fn call(&self, name: &str, args: &[String]) -> String {
        format!(
            "\\mathrm{{{}}}\\left({}\\right)",
            name.replace('_', "\\_"),
            args.join(", ")
        )
    }

    fn element(&self, array: &str, index: usize) -> String {
        format!("{array}\\left[{index}\\right]")
    }

    fn array_view(&self, first: &str, last: &str, len: usize) -> String {
        match len {
            1 => first.to_string(),
            2 => format!("\\left({first}, {last}\\right)"),
            _ => format!("\\left({first}, \\ldots, {last}\\right)"),
        }
    }

    fn assign(&self, target: &str, expr: &str) -> String {
        format!("{target} = {expr} \\\\")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fractions_and_powers() {
        assert_eq!(LatexSyntax.binary(BinOp::Div, "a", "b"), "\\frac{a}{b}");
        assert_eq!(LatexSyntax.binary(BinOp::Pow, "a", "2.0"), "{a}^{2.0}");
        assert_eq!(LatexSyntax.unary(UnaryOp::Exp, "x_{0}"), "e^{x_{0}}");
    }

    #[test]
    fn function_names_escape_underscores() {
        assert_eq!(
            LatexSyntax.call("my_fn", &["x_{0}".to_string()]),
            "\\mathrm{my\\_fn}\\left(x_{0}\\right)"
        );
    }
}
