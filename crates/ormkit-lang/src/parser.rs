//! Recursive descent parser for filter expressions.
//!
//! Grammar:
//!
//! ```text
//! expr  := and ("or" and)*
//! and   := term ("and" term)*
//! term  := "(" expr ")" | IDENT operator "?"
//! ```

use crate::ast::FilterCondition;
use crate::error::ParseError;
use crate::expr::Operator;
use crate::lexer::{Lexer, SpannedToken, Token};
use crate::span::{Span, Spanned};

/// Parser for the filter language.
pub struct Parser<'source> {
    lexer: Lexer<'source>,
    source: &'source str,
    next_placeholder: usize,
}

impl<'source> Parser<'source> {
    /// Create a new parser for the given source.
    pub fn new(source: &'source str) -> Self {
        Self {
            lexer: Lexer::new(source),
            source,
            next_placeholder: 0,
        }
    }

    /// Parse a complete filter; trailing input is an error.
    pub fn parse_filter(&mut self) -> Result<FilterCondition, ParseError> {
        let condition = self.parse_or_condition()?;

        if let Some(tok) = self.lexer.next_token()? {
            return Err(ParseError::new(
                format!("unexpected {} after expression", tok.token.describe()),
                tok.span,
            )
            .with_hint("combine conditions with 'and' or 'or'"));
        }

        Ok(condition)
    }

    /// Parse OR conditions.
    fn parse_or_condition(&mut self) -> Result<FilterCondition, ParseError> {
        let mut left = self.parse_and_condition()?;

        while self.consume_if(&Token::Or)? {
            let right = self.parse_and_condition()?;
            left = match left {
                FilterCondition::Or(mut conditions) => {
                    conditions.push(right);
                    FilterCondition::Or(conditions)
                }
                _ => FilterCondition::Or(vec![left, right]),
            };
        }

        Ok(left)
    }

    /// Parse AND conditions.
    fn parse_and_condition(&mut self) -> Result<FilterCondition, ParseError> {
        let mut left = self.parse_term()?;

        while self.consume_if(&Token::And)? {
            let right = self.parse_term()?;
            left = match left {
                FilterCondition::And(mut conditions) => {
                    conditions.push(right);
                    FilterCondition::And(conditions)
                }
                _ => FilterCondition::And(vec![left, right]),
            };
        }

        Ok(left)
    }

    /// Parse a parenthesised expression or a single comparison.
    fn parse_term(&mut self) -> Result<FilterCondition, ParseError> {
        let tok = self.next_token()?;
        match tok.token {
            Token::LParen => {
                let inner = self.parse_or_condition()?;
                let close = self.next_token()?;
                if close.token != Token::RParen {
                    return Err(ParseError::new(
                        format!("expected ')', found {}", close.token.describe()),
                        close.span,
                    ));
                }
                Ok(inner)
            }
            Token::Ident(name) => {
                let field = Spanned::new(name, tok.span);
                let op = self.parse_operator(field.span)?;
                let placeholder = self.expect_placeholder()?;
                Ok(FilterCondition::Comparison {
                    field,
                    op,
                    placeholder,
                })
            }
            other => Err(ParseError::new(
                format!("expected attribute name or '(', found {}", other.describe()),
                tok.span,
            )),
        }
    }

    fn parse_operator(&mut self, field_span: Span) -> Result<Spanned<Operator>, ParseError> {
        let tok = self.lexer.next_token()?.ok_or_else(|| {
            ParseError::new(
                "unexpected end of input, expected operator",
                Span::new(field_span.end, self.source.len()),
            )
        })?;

        let op = match tok.token {
            Token::Eq => Operator::Eq,
            Token::Ne => Operator::Ne,
            Token::Gt => Operator::Gt,
            Token::Lt => Operator::Lt,
            Token::Ge => Operator::Ge,
            Token::Le => Operator::Le,
            Token::StartsWith => Operator::StartsWith,
            Token::Contains => Operator::Contains,
            Token::In => Operator::In,
            Token::NotIn => Operator::NotIn,
            other => {
                return Err(ParseError::new(
                    format!("expected operator, found {}", other.describe()),
                    tok.span,
                ))
            }
        };

        Ok(Spanned::new(op, tok.span))
    }

    fn expect_placeholder(&mut self) -> Result<Spanned<usize>, ParseError> {
        let tok = self.next_token()?;
        if tok.token != Token::Placeholder {
            return Err(ParseError::new(
                format!("expected '?', found {}", tok.token.describe()),
                tok.span,
            )
            .with_hint("values are passed as arguments through '?' placeholders"));
        }

        let index = self.next_placeholder;
        self.next_placeholder += 1;
        Ok(Spanned::new(index, tok.span))
    }

    fn consume_if(&mut self, expected: &Token) -> Result<bool, ParseError> {
        let matches = self.lexer.peek()?.is_some_and(|tok| &tok.token == expected);
        if matches {
            self.lexer.next_token()?;
        }
        Ok(matches)
    }

    /// Get the next token or error if EOF.
    fn next_token(&mut self) -> Result<SpannedToken, ParseError> {
        self.lexer.next_token()?.ok_or_else(|| {
            ParseError::new(
                "unexpected end of input",
                Span::new(self.source.len(), self.source.len()),
            )
        })
    }
}

/// Parse a source string into a filter condition.
pub fn parse(source: &str) -> Result<FilterCondition, ParseError> {
    Parser::new(source).parse_filter()
}
