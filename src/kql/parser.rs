// KQL parser — §4.A, grammar in SPEC_FULL.md §6.
//
//   expr     := term ( WS (AND|OR|NOT|WS) term )*
//   term     := [key ':'] (quoted | word | group)
//   group    := '(' expr ')'
//   range    := key op datetime         op ∈ {<,<=,>,>=}
//
// A hand-written recursive-descent parser over a small token stream.
// Produces a balanced sequence of non-operator nodes interleaved with
// binary operator nodes; unary NOT precedes its operand. Empty input is
// invalid, matching the parser contract in §4.A.

use crate::errors::{Error, Result};
use crate::kql::ast::{CompareOp, Node, Operator, Query};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    Colon,
    Cmp(CompareOp),
    Word(String),
    Quoted(String),
}

struct Tokenizer<'a> {
    chars: Vec<char>,
    pos: usize,
    _src: &'a str,
}

impl<'a> Tokenizer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            chars: src.chars().collect(),
            pos: 0,
            _src: src,
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        while let Some(c) = self.peek_char() {
            match c {
                c if c.is_whitespace() => {
                    self.pos += 1;
                }
                '(' => {
                    tokens.push(Token::LParen);
                    self.pos += 1;
                }
                ')' => {
                    tokens.push(Token::RParen);
                    self.pos += 1;
                }
                ':' => {
                    tokens.push(Token::Colon);
                    self.pos += 1;
                }
                '<' => {
                    self.pos += 1;
                    if self.peek_char() == Some('=') {
                        self.pos += 1;
                        tokens.push(Token::Cmp(CompareOp::Lte));
                    } else {
                        tokens.push(Token::Cmp(CompareOp::Lt));
                    }
                }
                '>' => {
                    self.pos += 1;
                    if self.peek_char() == Some('=') {
                        self.pos += 1;
                        tokens.push(Token::Cmp(CompareOp::Gte));
                    } else {
                        tokens.push(Token::Cmp(CompareOp::Gt));
                    }
                }
                '"' => {
                    self.pos += 1;
                    let mut s = String::new();
                    loop {
                        match self.peek_char() {
                            None => {
                                return Err(Error::InvalidQuery(
                                    "unterminated quoted string".to_string(),
                                ))
                            }
                            Some('"') => {
                                self.pos += 1;
                                break;
                            }
                            Some('\\') => {
                                self.pos += 1;
                                if let Some(escaped) = self.peek_char() {
                                    s.push(escaped);
                                    self.pos += 1;
                                }
                            }
                            Some(other) => {
                                s.push(other);
                                self.pos += 1;
                            }
                        }
                    }
                    tokens.push(Token::Quoted(s));
                }
                _ => {
                    let start = self.pos;
                    while let Some(c) = self.peek_char() {
                        if c.is_whitespace() || matches!(c, '(' | ')' | ':' | '<' | '>' | '"') {
                            break;
                        }
                        self.pos += 1;
                    }
                    let word: String = self.chars[start..self.pos].iter().collect();
                    tokens.push(Token::Word(word));
                }
            }
        }
        Ok(tokens)
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn keyword(word: &str) -> Option<Operator> {
        match word.to_ascii_uppercase().as_str() {
            "AND" => Some(Operator::And),
            "OR" => Some(Operator::Or),
            "NOT" => Some(Operator::Not),
            _ => None,
        }
    }

    /// Parses a node list until EOF or a closing paren (not consumed here).
    fn parse_node_list(&mut self) -> Result<Vec<Node>> {
        let mut nodes = Vec::new();
        // true once a term has been pushed and we're looking for the
        // operator (or implicit-AND boundary) before the next term.
        let mut expect_operator = false;

        loop {
            match self.peek() {
                None | Some(Token::RParen) => break,
                Some(Token::Word(w)) if expect_operator && Self::keyword(w) == Some(Operator::Not) => {
                    // NOT directly follows a term with no explicit AND/OR:
                    // it attaches to the *next* term, not this boundary, so
                    // it is consumed by the branch below without inserting
                    // an implicit AND first (mirrors the source grammar's
                    // `term (WS (AND|OR|NOT|WS) term)*`).
                    expect_operator = false;
                }
                Some(Token::Word(w)) if expect_operator && Self::keyword(w).is_some() => {
                    let op = Self::keyword(w).unwrap();
                    self.advance();
                    nodes.push(Node::Operator(op));
                    expect_operator = false;
                }
                Some(_) if expect_operator => {
                    // No explicit operator between two terms: implicit AND.
                    nodes.push(Node::Operator(Operator::And));
                    expect_operator = false;
                }
                Some(Token::Word(w)) if Self::keyword(w) == Some(Operator::Not) => {
                    self.advance();
                    nodes.push(Node::Operator(Operator::Not));
                }
                Some(_) => {
                    let term = self.parse_term()?;
                    nodes.push(term);
                    expect_operator = true;
                }
            }
        }

        Ok(nodes)
    }

    fn parse_term(&mut self) -> Result<Node> {
        // Optional `key:` or `key <op>` prefix.
        let key: Option<String> = match (self.peek(), self.peek_at(1)) {
            (Some(Token::Word(w)), Some(Token::Colon)) => {
                let w = w.clone();
                self.advance();
                self.advance();
                Some(w)
            }
            (Some(Token::Word(w)), Some(Token::Cmp(op))) => {
                let w = w.clone();
                let op = *op;
                self.advance();
                self.advance();
                return self.parse_datetime_value(w, op);
            }
            _ => None,
        };
        let key = key.unwrap_or_default();

        match self.advance() {
            Some(Token::LParen) => {
                let inner = self.parse_node_list()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(Node::Group {
                        key: if key.is_empty() { None } else { Some(key) },
                        nodes: inner,
                    }),
                    _ => Err(Error::InvalidQuery("unterminated group".to_string())),
                }
            }
            Some(Token::Quoted(s)) => Ok(Node::String { key, value: s }),
            Some(Token::Word(w)) => Ok(value_node(key, w)),
            other => Err(Error::InvalidQuery(format!(
                "expected a term, found {other:?}"
            ))),
        }
    }

    fn parse_datetime_value(&mut self, key: String, op: CompareOp) -> Result<Node> {
        match self.advance() {
            Some(Token::Word(value)) | Some(Token::Quoted(value)) => {
                Ok(Node::DateTime { key, op, value })
            }
            other => Err(Error::InvalidQuery(format!(
                "expected a datetime value after comparison operator, found {other:?}"
            ))),
        }
    }
}

fn value_node(key: String, word: String) -> Node {
    match word.to_ascii_lowercase().as_str() {
        "true" => Node::Boolean { key, value: true },
        "false" => Node::Boolean { key, value: false },
        _ => Node::String { key, value: word },
    }
}

/// Parse KQL text into a `Query`. Empty input is invalid.
pub fn parse(input: &str) -> Result<Query> {
    if input.trim().is_empty() {
        return Err(Error::InvalidQuery("empty KQL input".to_string()));
    }
    let tokens = Tokenizer::new(input).tokenize()?;
    let mut parser = Parser { tokens, pos: 0 };
    let nodes = parser.parse_node_list()?;
    if parser.pos != parser.tokens.len() {
        return Err(Error::InvalidQuery(
            "trailing input after expression".to_string(),
        ));
    }
    if nodes.is_empty() {
        return Err(Error::InvalidQuery("empty KQL input".to_string()));
    }
    Ok(Query::new(nodes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_input() {
        assert!(parse("").is_err());
        assert!(parse("   ").is_err());
    }

    #[test]
    fn parses_bare_word_with_empty_key() {
        let q = parse("report").unwrap();
        assert_eq!(q.nodes.len(), 1);
        assert_eq!(
            q.nodes[0],
            Node::String {
                key: "".to_string(),
                value: "report".to_string()
            }
        );
    }

    #[test]
    fn parses_key_value_term() {
        let q = parse("mediatype:folder").unwrap();
        assert_eq!(
            q.nodes[0],
            Node::String {
                key: "mediatype".to_string(),
                value: "folder".to_string()
            }
        );
    }

    #[test]
    fn parses_quoted_phrase() {
        let q = parse(r#"name:"hello world""#).unwrap();
        assert_eq!(
            q.nodes[0],
            Node::String {
                key: "name".to_string(),
                value: "hello world".to_string()
            }
        );
    }

    #[test]
    fn parses_explicit_and_or() {
        let q = parse("a AND b OR c").unwrap();
        assert_eq!(q.nodes.len(), 5);
        assert_eq!(q.nodes[1], Node::Operator(Operator::And));
        assert_eq!(q.nodes[3], Node::Operator(Operator::Or));
    }

    #[test]
    fn implicit_and_between_bare_terms() {
        let q = parse("a b").unwrap();
        assert_eq!(q.nodes.len(), 3);
        assert_eq!(q.nodes[1], Node::Operator(Operator::And));
    }

    #[test]
    fn parses_unary_not() {
        let q = parse("NOT tag:secret").unwrap();
        assert_eq!(q.nodes[0], Node::Operator(Operator::Not));
        assert_eq!(
            q.nodes[1],
            Node::String {
                key: "tag".to_string(),
                value: "secret".to_string()
            }
        );
    }

    #[test]
    fn parses_group_with_key() {
        let q = parse("tag:(a OR b)").unwrap();
        match &q.nodes[0] {
            Node::Group { key, nodes } => {
                assert_eq!(key.as_deref(), Some("tag"));
                assert_eq!(nodes.len(), 3);
            }
            other => panic!("expected group, got {other:?}"),
        }
    }

    #[test]
    fn parses_datetime_range() {
        let q = parse("mtime>2024-01-01T00:00:00Z").unwrap();
        assert_eq!(
            q.nodes[0],
            Node::DateTime {
                key: "mtime".to_string(),
                op: CompareOp::Gt,
                value: "2024-01-01T00:00:00Z".to_string()
            }
        );
    }

    #[test]
    fn parses_boolean_literal() {
        let q = parse("hidden:true").unwrap();
        assert_eq!(
            q.nodes[0],
            Node::Boolean {
                key: "hidden".to_string(),
                value: true
            }
        );
    }
}
