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

//! Parser for the textual graph format produced by [`format_graph`](super::format_graph).

use crate::lexer::{lex, Token};

use super::{BinOp, Graph, Node, NodeId, Op, UnaryOp};

/// Maximum input size in bytes (10 MB).
pub const MAX_INPUT_SIZE: usize = 10 * 1024 * 1024;

/// Maximum number of nodes in a single graph.
pub const MAX_NODE_COUNT: usize = 1_000_000;

/// Error type for graph parsing. Line 0 refers to the graph as a whole.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("graph:{line}: error: {message}")]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

impl ParseError {
    fn at(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// Parse a graph from its textual form.
///
/// Node identities must appear in order (`%0`, `%1`, ...) so that the parsed
/// graph keeps the identities of the printed one.
pub fn parse_graph(input: &str) -> Result<Graph, ParseError> {
    if input.len() > MAX_INPUT_SIZE {
        return Err(ParseError::at(
            0,
            format!(
                "input too large: {} bytes (max {} bytes)",
                input.len(),
                MAX_INPUT_SIZE
            ),
        ));
    }

    let mut nodes: Vec<Node> = Vec::new();
    let mut dependents = Vec::new();

    for (idx, raw) in input.lines().enumerate() {
        let line = idx + 1;
        let tokens = lex(raw)
            .map_err(|bad| ParseError::at(line, format!("unexpected input '{bad}'")))?;
        let mut cursor = Cursor {
            tokens: &tokens,
            pos: 0,
            line,
        };

        match cursor.peek() {
            None | Some(Token::RBrace) => continue,
            Some(Token::Ident(word)) if word == "graph" => continue,
            Some(Token::Ident(word)) if word == "dep" => {
                cursor.pos += 1;
                dependents.push(cursor.node()?);
                cursor.finish()?;
            }
            Some(Token::Node(id)) => {
                if *id != nodes.len() {
                    return Err(ParseError::at(
                        line,
                        format!("expected node %{}, found %{}", nodes.len(), id),
                    ));
                }
                if nodes.len() >= MAX_NODE_COUNT {
                    return Err(ParseError::at(line, "too many nodes"));
                }
                cursor.pos += 1;
                cursor.expect(&Token::Eq, "'='")?;
                nodes.push(cursor.node_body()?);
            }
            Some(other) => {
                return Err(ParseError::at(line, format!("unexpected token {other:?}")));
            }
        }
    }

    Graph::from_parts(nodes, dependents).map_err(|err| ParseError::at(0, err.to_string()))
}

struct Cursor<'t> {
    tokens: &'t [Token],
    pos: usize,
    line: usize,
}

impl<'t> Cursor<'t> {
    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<&'t Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::at(self.line, message)
    }

    fn expect(&mut self, token: &Token, what: &str) -> Result<(), ParseError> {
        match self.bump() {
            Some(found) if found == token => Ok(()),
            Some(found) => Err(self.error(format!("expected {what}, found {found:?}"))),
            None => Err(self.error(format!("expected {what}"))),
        }
    }

    fn node(&mut self) -> Result<NodeId, ParseError> {
        match self.bump() {
            Some(Token::Node(id)) => Ok(NodeId(*id)),
            _ => Err(self.error("expected a node reference")),
        }
    }

    fn ident(&mut self) -> Result<&'t str, ParseError> {
        match self.bump() {
            Some(Token::Ident(word)) => Ok(word),
            _ => Err(self.error("expected an identifier")),
        }
    }

    fn count(&mut self) -> Result<usize, ParseError> {
        match self.bump() {
            Some(Token::Number(n)) if *n >= 0.0 && n.fract() == 0.0 => Ok(*n as usize),
            _ => Err(self.error("expected a non-negative integer")),
        }
    }

    fn number(&mut self) -> Result<f64, ParseError> {
        let negative = matches!(self.peek(), Some(Token::Minus));
        if negative {
            self.pos += 1;
        }
        let value = match self.bump() {
            Some(Token::Number(n)) if !negative => *n,
            Some(Token::Ident(word)) if word == "inf" => f64::INFINITY,
            Some(Token::Ident(word)) if word == "nan" || word == "NaN" => f64::NAN,
            _ => return Err(self.error("expected a number")),
        };
        Ok(if negative { -value } else { value })
    }

    fn node_list(&mut self) -> Result<Vec<NodeId>, ParseError> {
        let mut args = Vec::new();
        if !matches!(self.peek(), Some(Token::Node(_))) {
            return Ok(args);
        }
        args.push(self.node()?);
        while matches!(self.peek(), Some(Token::Comma)) {
            self.pos += 1;
            args.push(self.node()?);
        }
        Ok(args)
    }

    fn node_body(&mut self) -> Result<Node, ParseError> {
        let word = self.ident()?;
        let node = match word {
            "const" => Node::new(Op::Constant(self.number()?), Vec::new()),
            "indep" => Node::new(Op::Independent(self.count()?), Vec::new()),
            "array" => Node::new(Op::Array, self.node_list()?),
            "elem" => {
                let index = self.count()?;
                Node::new(Op::Element(index), vec![self.node()?])
            }
            "call" => {
                let name = self.ident()?.to_string();
                Node::new(Op::Call(name), self.node_list()?)
            }
            other => {
                let op = if let Some(u) = UnaryOp::from_mnemonic(other) {
                    Op::Unary(u)
                } else if let Some(b) = BinOp::from_mnemonic(other) {
                    Op::Binary(b)
                } else {
                    return Err(self.error(format!("unknown operation '{other}'")));
                };
                Node::new(op, self.node_list()?)
            }
        };
        let node = match self.peek() {
            Some(Token::Str(name)) => {
                self.pos += 1;
                node.with_name(name.clone())
            }
            _ => node,
        };
        let node = if matches!(self.peek(), Some(Token::Bang)) {
            self.pos += 1;
            match self.ident()? {
                "temp" => node.with_temporary(true),
                other => return Err(self.error(format!("unknown marker '!{other}'"))),
            }
        } else {
            node
        };
        self.finish()?;
        Ok(node)
    }

    fn finish(&self) -> Result<(), ParseError> {
        match self.peek() {
            None => Ok(()),
            Some(extra) => Err(self.error(format!("unexpected trailing token {extra:?}"))),
        }
    }
}
