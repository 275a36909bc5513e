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

/// Temporaries declared per `double` line.
const DECLARATIONS_PER_LINE: usize = 8;

/// C99 spelling against `<math.h>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CSyntax;

impl Syntax for CSyntax {
    fn constant(&self, value: f64) -> String {
        if value.is_nan() {
            "NAN".to_string()
        } else if value == f64::INFINITY {
            "INFINITY".to_string()
        } else if value == f64::NEG_INFINITY {
            "(-INFINITY)".to_string()
        } else if value.is_sign_negative() {
            format!("({:?})", value)
        } else {
            format!("{:?}", value)
        }
    }

    fn unary(&self, op: UnaryOp, x: &str) -> String {
        match op {
            UnaryOp::Neg => format!("(-{x})"),
            UnaryOp::Abs => format!("fabs({x})"),
            UnaryOp::Sign => format!("(({x}) > 0 ? 1.0 : (({x}) < 0 ? -1.0 : 0.0))"),
            other => format!("{}({x})", other.mnemonic()),
        }
    }

    fn binary(&self, op: BinOp, lhs: &str, rhs: &str) -> String {
        match op {
            BinOp::Add => format!("({lhs} + {rhs})"),
            BinOp::Sub => format!("({lhs} - {rhs})"),
            BinOp::Mul => format!("({lhs} * {rhs})"),
            BinOp::Div => format!("({lhs} / {rhs})"),
            BinOp::Pow => format!("pow({lhs}, {rhs})"),
        }
    }

    fn call(&self, name: &str, args: &[String]) -> String {
        format!("{name}({})", args.join(", "))
    }

    fn element(&self, array: &str, index: usize) -> String {
        format!("{array}[{index}]")
    }

    fn array_view(&self, first: &str, _last: &str, _len: usize) -> String {
        format!("&{first}")
    }

    fn assign(&self, target: &str, expr: &str) -> String {
        format!("{target} = {expr};")
    }

    fn declarations(&self, temporaries: &[String], arrays: &[(String, usize)]) -> Vec<String> {
        let mut lines: Vec<String> = temporaries
            .chunks(DECLARATIONS_PER_LINE)
            .map(|chunk| format!("double {};", chunk.join(", ")))
            .collect();
        lines.extend(
            arrays
                .iter()
                .map(|(name, len)| format!("double {name}[{len}];")),
        );
        lines
    }
}
