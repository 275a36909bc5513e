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

//! Display names for graph positions.
//!
//! The emitter never invents identifiers; every name it writes comes from a
//! [`VariableNamer`]. Two namers ship with the crate: [`DefaultNamer`], which
//! derives names from prefixes and indices, and [`CustomNamer`], which pins
//! user-chosen names for some inputs and outputs.

use crate::ir::NodeId;

/// An independent node together with its input position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndependentVar {
    pub node: NodeId,
    pub index: usize,
}

/// Naming strategy consulted by the emitter.
///
/// Adjacency answers drive array-view compaction. A namer that is unsure
/// must answer `false`: claiming adjacency for inputs that are not stored
/// next to each other produces wrong code.
pub trait VariableNamer {
    fn independent(&self, var: IndependentVar) -> String;

    fn dependent(&self, index: usize) -> String;

    /// True when `second` is stored immediately after `first`.
    fn is_consecutive_in_indep_array(&self, first: IndependentVar, second: IndependentVar) -> bool;

    fn is_in_same_independent_array(&self, a: IndependentVar, b: IndependentVar) -> bool;

    fn temporary(&self, slot: usize) -> String {
        format!("v{slot}")
    }

    fn temporary_array(&self, slot: usize) -> String {
        format!("a{slot}")
    }
}

/// How an index is attached to a prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameStyle {
    /// `x[3]`, temporaries `v3`.
    Indexed,
    /// `x_{3}`, temporaries `v_{3}`.
    Subscript,
}

/// Prefix-plus-index naming. All inputs live in one array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultNamer {
    dependent: String,
    independent: String,
    temporary: String,
    array: String,
    style: NameStyle,
}

impl DefaultNamer {
    /// Names suitable for C: `x[i]`, `y[i]`, `v0`, `a0`.
    pub fn c() -> Self {
        Self {
            dependent: "y".into(),
            independent: "x".into(),
            temporary: "v".into(),
            array: "a".into(),
            style: NameStyle::Indexed,
        }
    }

    /// Names suitable for typeset output: `x_{i}`, `y_{i}`, `v_{i}`.
    pub fn latex() -> Self {
        Self {
            dependent: "y".into(),
            independent: "x".into(),
            temporary: "v".into(),
            array: "\\mathbf{a}".into(),
            style: NameStyle::Subscript,
        }
    }

    pub fn with_prefixes(
        mut self,
        dependent: impl Into<String>,
        independent: impl Into<String>,
        temporary: impl Into<String>,
    ) -> Self {
        self.dependent = dependent.into();
        self.independent = independent.into();
        self.temporary = temporary.into();
        self
    }

    pub fn with_dependent_prefix(mut self, dependent: impl Into<String>) -> Self {
        self.dependent = dependent.into();
        self
    }

    pub fn with_array_prefix(mut self, array: impl Into<String>) -> Self {
        self.array = array.into();
        self
    }

    pub fn style(&self) -> NameStyle {
        self.style
    }

    pub fn independent_prefix(&self) -> &str {
        &self.independent
    }

    pub fn dependent_prefix(&self) -> &str {
        &self.dependent
    }

    pub fn temporary_prefix(&self) -> &str {
        &self.temporary
    }

    pub fn array_prefix(&self) -> &str {
        &self.array
    }

    /// Checks that the C identifiers this namer produces cannot collide.
    ///
    /// The independent and dependent prefixes are whole parameter names,
    /// as is everything in `reserved`; the temporary and array prefixes are
    /// followed by a slot number. Parameter names must not shadow C keywords
    /// or the math functions generated code calls.
    pub fn check_c_names(&self, reserved: &[&str]) -> Result<(), NameClash> {
        let mut names: Vec<(&str, bool)> = vec![
            (self.independent.as_str(), false),
            (self.dependent.as_str(), false),
            (self.temporary.as_str(), true),
            (self.array.as_str(), true),
        ];
        names.extend(reserved.iter().map(|name| (*name, false)));

        for &(name, _) in &names {
            if !is_c_identifier(name) {
                return Err(NameClash::NotIdentifier(name.to_string()));
            }
        }
        for name in [self.independent.as_str(), self.dependent.as_str()] {
            if C_RESERVED.contains(&name) {
                return Err(NameClash::Reserved(name.to_string()));
            }
        }
        for (i, &a) in names.iter().enumerate() {
            for &b in &names[i + 1..] {
                if names_collide(a, b) {
                    return Err(NameClash::Collision {
                        first: a.0.to_string(),
                        second: b.0.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn indexed(&self, prefix: &str, index: usize) -> String {
        match self.style {
            NameStyle::Indexed => format!("{prefix}[{index}]"),
            NameStyle::Subscript => format!("{prefix}_{{{index}}}"),
        }
    }

    fn numbered(&self, prefix: &str, index: usize) -> String {
        match self.style {
            NameStyle::Indexed => format!("{prefix}{index}"),
            NameStyle::Subscript => format!("{prefix}_{{{index}}}"),
        }
    }
}

impl Default for DefaultNamer {
    fn default() -> Self {
        Self::c()
    }
}

impl VariableNamer for DefaultNamer {
    fn independent(&self, var: IndependentVar) -> String {
        self.indexed(&self.independent, var.index)
    }

    fn dependent(&self, index: usize) -> String {
        self.indexed(&self.dependent, index)
    }

    fn is_consecutive_in_indep_array(&self, first: IndependentVar, second: IndependentVar) -> bool {
        first.index + 1 == second.index
    }

    fn is_in_same_independent_array(&self, _a: IndependentVar, _b: IndependentVar) -> bool {
        true
    }

    fn temporary(&self, slot: usize) -> String {
        self.numbered(&self.temporary, slot)
    }

    fn temporary_array(&self, slot: usize) -> String {
        self.numbered(&self.array, slot)
    }
}

/// User-supplied names for the leading inputs and outputs.
///
/// Positions beyond the supplied lists fall back to a [`DefaultNamer`]. An
/// input with its own name is a standalone variable, so it is never adjacent
/// to anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomNamer {
    dependent_names: Vec<String>,
    independent_names: Vec<String>,
    fallback: DefaultNamer,
}

impl CustomNamer {
    pub fn new(dependent_names: Vec<String>, independent_names: Vec<String>) -> Self {
        Self {
            dependent_names,
            independent_names,
            fallback: DefaultNamer::c(),
        }
    }

    pub fn with_fallback(mut self, fallback: DefaultNamer) -> Self {
        self.fallback = fallback;
        self
    }

    fn is_array_element(&self, var: IndependentVar) -> bool {
        var.index >= self.independent_names.len()
    }
}

impl VariableNamer for CustomNamer {
    fn independent(&self, var: IndependentVar) -> String {
        match self.independent_names.get(var.index) {
            Some(name) => name.clone(),
            None => self.fallback.independent(var),
        }
    }

    fn dependent(&self, index: usize) -> String {
        match self.dependent_names.get(index) {
            Some(name) => name.clone(),
            None => self.fallback.dependent(index),
        }
    }

    fn is_consecutive_in_indep_array(&self, first: IndependentVar, second: IndependentVar) -> bool {
        self.is_array_element(first)
            && self.is_array_element(second)
            && self.fallback.is_consecutive_in_indep_array(first, second)
    }

    fn is_in_same_independent_array(&self, a: IndependentVar, b: IndependentVar) -> bool {
        self.is_array_element(a) && self.is_array_element(b)
    }

    fn temporary(&self, slot: usize) -> String {
        self.fallback.temporary(slot)
    }

    fn temporary_array(&self, slot: usize) -> String {
        self.fallback.temporary_array(slot)
    }
}

/// Keywords and library names a generated parameter must not shadow.
const C_RESERVED: &[&str] = &[
    "auto", "break", "case", "char", "const", "continue", "default", "do", "double", "else",
    "enum", "extern", "float", "for", "goto", "if", "inline", "int", "long", "register",
    "restrict", "return", "short", "signed", "sizeof", "static", "struct", "switch",
    "typedef", "union", "unsigned", "void", "volatile", "while", "sin", "cos", "tan",
    "asin", "acos", "atan", "sinh", "cosh", "tanh", "exp", "log", "sqrt", "fabs", "pow",
    "INFINITY", "NAN", "uint64_t",
];

pub(crate) fn is_c_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `long` is `short` followed by one or more digits.
fn extends_with_digits(long: &str, short: &str) -> bool {
    long.strip_prefix(short)
        .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
}

/// Whether two names can spell the same identifier. A numbered prefix
/// stands for every `prefix<N>`.
fn names_collide((a, a_numbered): (&str, bool), (b, b_numbered): (&str, bool)) -> bool {
    match (a_numbered, b_numbered) {
        (false, false) => a == b,
        (false, true) => extends_with_digits(a, b),
        (true, false) => extends_with_digits(b, a),
        (true, true) => a == b || extends_with_digits(a, b) || extends_with_digits(b, a),
    }
}

/// Generated C names that would not compile or would alias each other.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameClash {
    #[error("'{0}' is not a C identifier")]
    NotIdentifier(String),
    #[error("'{0}' is reserved in generated C code")]
    Reserved(String),
    #[error("generated names from '{first}' and '{second}' collide")]
    Collision { first: String, second: String },
}

/// Inconsistent answers observed while negotiating array views.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NamingWarning {
    #[error("namer reports inputs {first} and {second} as adjacent but not in the same array; treating them as separate")]
    InconsistentAdjacency { first: usize, second: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(index: usize) -> IndependentVar {
        IndependentVar {
            node: NodeId(index),
            index,
        }
    }

    #[test]
    fn default_names_follow_style() {
        let c = DefaultNamer::c();
        assert_eq!(c.independent(var(2)), "x[2]");
        assert_eq!(c.dependent(0), "y[0]");
        assert_eq!(c.temporary(4), "v4");

        let tex = DefaultNamer::latex();
        assert_eq!(tex.independent(var(2)), "x_{2}");
        assert_eq!(tex.temporary(4), "v_{4}");
        assert_eq!(tex.temporary_array(1), "\\mathbf{a}_{1}");
    }

    #[test]
    fn default_adjacency_is_index_based() {
        let c = DefaultNamer::c();
        assert!(c.is_consecutive_in_indep_array(var(1), var(2)));
        assert!(!c.is_consecutive_in_indep_array(var(2), var(1)));
        assert!(!c.is_consecutive_in_indep_array(var(1), var(3)));
    }

    #[test]
    fn individually_named_inputs_are_never_adjacent() {
        let namer = CustomNamer::new(vec!["f".into()], vec!["p".into(), "q".into()]);
        assert_eq!(namer.independent(var(0)), "p");
        assert_eq!(namer.independent(var(2)), "x[2]");
        assert_eq!(namer.dependent(0), "f");
        assert_eq!(namer.dependent(1), "y[1]");

        assert!(!namer.is_consecutive_in_indep_array(var(0), var(1)));
        // last named input next to the first unnamed one
        assert!(!namer.is_consecutive_in_indep_array(var(1), var(2)));
        assert!(!namer.is_in_same_independent_array(var(1), var(2)));
        assert!(namer.is_consecutive_in_indep_array(var(2), var(3)));
    }

    #[test]
    fn default_c_names_do_not_collide() {
        assert_eq!(DefaultNamer::c().check_c_names(&["jac"]), Ok(()));
    }

    #[test]
    fn temporaries_cannot_reuse_the_array_prefix() {
        let namer = DefaultNamer::c().with_prefixes("y", "x", "a");
        assert_eq!(
            namer.check_c_names(&[]),
            Err(NameClash::Collision {
                first: "a".into(),
                second: "a".into()
            })
        );
    }

    #[test]
    fn numbered_names_can_spell_a_parameter() {
        // v1 is both the input array and temporary slot 1
        let namer = DefaultNamer::c().with_prefixes("y", "v1", "v");
        assert!(matches!(
            namer.check_c_names(&[]),
            Err(NameClash::Collision { .. })
        ));
        // v10 is temporary slot 10 and array slot 0
        let namer = DefaultNamer::c().with_array_prefix("v1");
        assert!(matches!(
            namer.check_c_names(&[]),
            Err(NameClash::Collision { .. })
        ));
        let namer = DefaultNamer::c().with_prefixes("y", "x", "va");
        assert_eq!(namer.check_c_names(&[]), Ok(()));
    }

    #[test]
    fn reserved_parameter_names_are_checked() {
        let namer = DefaultNamer::c().with_prefixes("y", "jac", "v");
        assert!(matches!(
            namer.check_c_names(&["jac"]),
            Err(NameClash::Collision { .. })
        ));
        let namer = DefaultNamer::c().with_prefixes("y", "sin", "v");
        assert_eq!(
            namer.check_c_names(&[]),
            Err(NameClash::Reserved("sin".into()))
        );
        let namer = DefaultNamer::c().with_prefixes("y", "x", "2v");
        assert_eq!(
            namer.check_c_names(&[]),
            Err(NameClash::NotIdentifier("2v".into()))
        );
    }
}
