//! Lexer and recursive-descent parser for calc expressions
//!
//! Precedence, lowest first:
//! 1. ternary `c ? a : b` (right associative)
//! 2. `OR` / `||`
//! 3. `AND` / `&&`
//! 4. comparisons `< > <= >= == !=` (`=` and `#` are accepted as EPICS spellings)
//! 5. `+ -`
//! 6. `* /`
//! 7. unary `NOT` / `!`, `-`, `+`

use crate::error::{CalcError, Result};
use crate::{is_operand, MAX_EXPRESSION_LENGTH, MAX_NESTING_DEPTH};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Operand(char),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    And,
    Or,
    Not,
    Question,
    Colon,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

/// Parsed expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Literal(f64),
    Operand(char),
    Unary(UnaryOp, Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
    Select {
        condition: Box<Node>,
        then: Box<Node>,
        otherwise: Box<Node>,
    },
}

impl Node {
    /// Visit every operand letter referenced by this tree
    pub fn collect_operands(&self, out: &mut Vec<char>) {
        match self {
            Node::Literal(_) => {},
            Node::Operand(c) => out.push(*c),
            Node::Unary(_, inner) => inner.collect_operands(out),
            Node::Binary(_, lhs, rhs) => {
                lhs.collect_operands(out);
                rhs.collect_operands(out);
            },
            Node::Select {
                condition,
                then,
                otherwise,
            } => {
                condition.collect_operands(out);
                then.collect_operands(out);
                otherwise.collect_operands(out);
            },
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<(usize, Token)>> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let start = i;

        if !c.is_ascii() {
            return Err(CalcError::syntax(start, "non-ASCII character"));
        }
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || (c == b'.' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit))
        {
            while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                i += 1;
            }
            // Optional exponent: e.g. 1e-3
            if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
                let mut j = i + 1;
                if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
                    j += 1;
                }
                if j < bytes.len() && bytes[j].is_ascii_digit() {
                    while j < bytes.len() && bytes[j].is_ascii_digit() {
                        j += 1;
                    }
                    i = j;
                }
            }
            let text = &source[start..i];
            let value: f64 = text
                .parse()
                .map_err(|_| CalcError::syntax(start, format!("invalid number '{}'", text)))?;
            tokens.push((start, Token::Number(value)));
            continue;
        }

        if c.is_ascii_alphabetic() {
            while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
                i += 1;
            }
            let word = &source[start..i];
            let token = if word.eq_ignore_ascii_case("AND") {
                Token::And
            } else if word.eq_ignore_ascii_case("OR") {
                Token::Or
            } else if word.eq_ignore_ascii_case("NOT") {
                Token::Not
            } else {
                let mut chars = word.chars();
                match (chars.next(), chars.next()) {
                    (Some(letter), None) if is_operand(letter) => Token::Operand(letter),
                    _ => {
                        return Err(CalcError::syntax(
                            start,
                            format!("unknown identifier '{}' (operands are A-L)", word),
                        ))
                    },
                }
            };
            tokens.push((start, token));
            continue;
        }

        let next = bytes.get(i + 1).copied();
        let (token, width) = match (c, next) {
            (b'+', _) => (Token::Plus, 1),
            (b'-', _) => (Token::Minus, 1),
            (b'*', _) => (Token::Star, 1),
            (b'/', _) => (Token::Slash, 1),
            (b'(', _) => (Token::LParen, 1),
            (b')', _) => (Token::RParen, 1),
            (b'?', _) => (Token::Question, 1),
            (b':', _) => (Token::Colon, 1),
            (b'<', Some(b'=')) => (Token::Le, 2),
            (b'<', _) => (Token::Lt, 1),
            (b'>', Some(b'=')) => (Token::Ge, 2),
            (b'>', _) => (Token::Gt, 1),
            (b'=', Some(b'=')) => (Token::Eq, 2),
            (b'=', _) => (Token::Eq, 1),
            (b'!', Some(b'=')) => (Token::Ne, 2),
            (b'!', _) => (Token::Not, 1),
            (b'#', _) => (Token::Ne, 1),
            (b'&', Some(b'&')) => (Token::And, 2),
            (b'|', Some(b'|')) => (Token::Or, 2),
            _ => {
                return Err(CalcError::syntax(
                    start,
                    format!("unexpected character '{}'", c as char),
                ))
            },
        };
        tokens.push((start, token));
        i += width;
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    depth: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).map(|(_, t)| *t)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|(offset, _)| *offset)
            .unwrap_or(self.end)
    }

    fn eat(&mut self, token: Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(CalcError::syntax(self.offset(), format!("expected {}", what)))
        }
    }

    fn ternary(&mut self) -> Result<Node> {
        let condition = self.or()?;
        if !self.eat(Token::Question) {
            return Ok(condition);
        }
        let then = self.ternary()?;
        self.expect(Token::Colon, "':' in conditional")?;
        let otherwise = self.ternary()?;
        Ok(Node::Select {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn or(&mut self) -> Result<Node> {
        let mut lhs = self.and()?;
        while self.eat(Token::Or) {
            let rhs = self.and()?;
            lhs = Node::Binary(BinaryOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Node> {
        let mut lhs = self.comparison()?;
        while self.eat(Token::And) {
            let rhs = self.comparison()?;
            lhs = Node::Binary(BinaryOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn comparison(&mut self) -> Result<Node> {
        let mut lhs = self.additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Ge) => BinaryOp::Ge,
                Some(Token::Eq) => BinaryOp::Eq,
                Some(Token::Ne) => BinaryOp::Ne,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.additive()?;
            lhs = Node::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn additive(&mut self) -> Result<Node> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.multiplicative()?;
            lhs = Node::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn multiplicative(&mut self) -> Result<Node> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Node::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Node> {
        match self.peek() {
            Some(Token::Not) => {
                self.pos += 1;
                Ok(Node::Unary(UnaryOp::Not, Box::new(self.unary()?)))
            },
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(Node::Unary(UnaryOp::Neg, Box::new(self.unary()?)))
            },
            Some(Token::Plus) => {
                self.pos += 1;
                self.unary()
            },
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Node> {
        let offset = self.offset();
        match self.peek() {
            Some(Token::Number(value)) => {
                self.pos += 1;
                Ok(Node::Literal(value))
            },
            Some(Token::Operand(letter)) => {
                self.pos += 1;
                Ok(Node::Operand(letter))
            },
            Some(Token::LParen) => {
                self.pos += 1;
                self.depth += 1;
                if self.depth > MAX_NESTING_DEPTH {
                    return Err(CalcError::TooDeep);
                }
                let inner = self.ternary()?;
                self.expect(Token::RParen, "')'")?;
                self.depth -= 1;
                Ok(inner)
            },
            Some(_) => Err(CalcError::syntax(offset, "expected a number, operand or '('")),
            None => Err(CalcError::syntax(offset, "unexpected end of expression")),
        }
    }
}

/// Parse an expression into its tree
pub fn parse(source: &str) -> Result<Node> {
    if source.len() > MAX_EXPRESSION_LENGTH {
        return Err(CalcError::TooLong(source.len()));
    }

    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(CalcError::syntax(0, "empty expression"));
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        end: source.len(),
    };
    let root = parser.ternary()?;
    if parser.pos != parser.tokens.len() {
        return Err(CalcError::syntax(parser.offset(), "unexpected trailing input"));
    }
    Ok(root)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence_tree() {
        let tree = parse("A + B * 2").unwrap();
        assert_eq!(
            tree,
            Node::Binary(
                BinaryOp::Add,
                Box::new(Node::Operand('A')),
                Box::new(Node::Binary(
                    BinaryOp::Mul,
                    Box::new(Node::Operand('B')),
                    Box::new(Node::Literal(2.0)),
                )),
            )
        );
    }

    #[test]
    fn test_ternary_is_right_associative() {
        let tree = parse("A ? 1 : B ? 2 : 3").unwrap();
        match tree {
            Node::Select { otherwise, .. } => {
                assert!(matches!(*otherwise, Node::Select { .. }));
            },
            other => panic!("expected select, got {:?}", other),
        }
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        assert_eq!(parse("A and B").unwrap(), parse("A AND B").unwrap());
        assert_eq!(parse("not A").unwrap(), parse("!A").unwrap());
        assert_eq!(parse("A # B").unwrap(), parse("A != B").unwrap());
        assert_eq!(parse("A = B").unwrap(), parse("A == B").unwrap());
    }

    #[test]
    fn test_scientific_literals() {
        assert_eq!(parse("1e3").unwrap(), Node::Literal(1000.0));
        assert_eq!(parse(".5").unwrap(), Node::Literal(0.5));
        assert_eq!(parse("2.5E-1").unwrap(), Node::Literal(0.25));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(matches!(parse(""), Err(CalcError::Syntax { .. })));
        assert!(matches!(parse("2 + + "), Err(CalcError::Syntax { .. })));
        assert!(matches!(parse("(A + B"), Err(CalcError::Syntax { .. })));
        assert!(matches!(parse("A B"), Err(CalcError::Syntax { .. })));
        assert!(matches!(parse("A ? B"), Err(CalcError::Syntax { .. })));
        assert!(matches!(parse("M + 1"), Err(CalcError::Syntax { .. })));
        assert!(matches!(parse("abs(A)"), Err(CalcError::Syntax { .. })));
        assert!(matches!(parse("A & B"), Err(CalcError::Syntax { .. })));
    }

    #[test]
    fn test_error_position() {
        match parse("A + $") {
            Err(CalcError::Syntax { position, .. }) => assert_eq!(position, 4),
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_limits() {
        let long = "1+".repeat(200) + "1";
        assert!(matches!(parse(&long), Err(CalcError::TooLong(_))));

        let deep = format!("{}A{}", "(".repeat(11), ")".repeat(11));
        assert_eq!(parse(&deep), Err(CalcError::TooDeep));

        let ok = format!("{}A{}", "(".repeat(10), ")".repeat(10));
        assert!(parse(&ok).is_ok());
    }
}
