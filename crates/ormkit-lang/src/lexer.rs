//! Lexer for filter expressions using logos.
//!
//! Two-word operators (`starts with`, `not in`) are assembled from their
//! words after logos has split the input, so both words keep ordinary word
//! boundaries and any amount of whitespace may separate them.

use crate::error::ParseError;
use crate::span::Span;
use logos::Logos;

/// Token types for the filter language.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token {
    // Comparison operators
    #[token("=")]
    Eq,
    #[token("!=")]
    Ne,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,

    // Keyword operators
    #[token("contains")]
    Contains,
    #[token("in")]
    In,
    /// `starts with`, produced by word pairing.
    StartsWith,
    /// `not in`, produced by word pairing.
    NotIn,

    // Logical connectives
    #[token("and")]
    And,
    #[token("or")]
    Or,

    // Identifier
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    /// Positional argument placeholder.
    #[token("?")]
    Placeholder,

    /// Inline value. Never valid, lexed only to report it well.
    #[regex(r"[0-9][0-9A-Za-z_.]*", |lex| lex.slice().to_string())]
    #[regex(r#"'[^']*'|"[^"]*""#, |lex| lex.slice().to_string())]
    Literal(String),

    // Punctuation
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
}

impl Token {
    /// Human-readable rendering for error messages.
    pub fn describe(&self) -> String {
        match self {
            Token::Eq => "'='".into(),
            Token::Ne => "'!='".into(),
            Token::Le => "'<='".into(),
            Token::Ge => "'>='".into(),
            Token::Lt => "'<'".into(),
            Token::Gt => "'>'".into(),
            Token::Contains => "'contains'".into(),
            Token::In => "'in'".into(),
            Token::StartsWith => "'starts with'".into(),
            Token::NotIn => "'not in'".into(),
            Token::And => "'and'".into(),
            Token::Or => "'or'".into(),
            Token::Ident(name) => format!("identifier '{}'", name),
            Token::Placeholder => "'?'".into(),
            Token::Literal(text) => format!("literal {}", text),
            Token::LParen => "'('".into(),
            Token::RParen => "')'".into(),
        }
    }
}

/// A token with its span in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

/// Lexer that produces spanned tokens.
pub struct Lexer<'source> {
    inner: logos::Lexer<'source, Token>,
    pending: Option<SpannedToken>,
    peeked: Option<Option<SpannedToken>>,
}

impl<'source> Lexer<'source> {
    /// Create a new lexer for the given source.
    pub fn new(source: &'source str) -> Self {
        Self {
            inner: Token::lexer(source),
            pending: None,
            peeked: None,
        }
    }

    /// Peek at the next token without consuming it.
    pub fn peek(&mut self) -> Result<Option<&SpannedToken>, ParseError> {
        if self.peeked.is_none() {
            self.peeked = Some(self.next_paired()?);
        }
        Ok(self.peeked.as_ref().and_then(|o| o.as_ref()))
    }

    /// Get the next token.
    pub fn next_token(&mut self) -> Result<Option<SpannedToken>, ParseError> {
        match self.peeked.take() {
            Some(peeked) => Ok(peeked),
            None => self.next_paired(),
        }
    }

    /// Get the source string.
    pub fn source(&self) -> &'source str {
        self.inner.source()
    }

    fn next_paired(&mut self) -> Result<Option<SpannedToken>, ParseError> {
        let Some(first) = self.next_raw()? else {
            return Ok(None);
        };

        let pair = match &first.token {
            Token::Ident(word) if word == "starts" => Some((Token::StartsWith, "with")),
            Token::Ident(word) if word == "not" => Some((Token::NotIn, "in")),
            _ => None,
        };
        let Some((combined, second_word)) = pair else {
            return Ok(Some(first));
        };

        let second = self.next_raw()?;
        let matches = match second.as_ref().map(|t| &t.token) {
            Some(Token::Ident(word)) => word == second_word,
            Some(Token::In) => second_word == "in",
            _ => false,
        };

        if matches {
            let span = first.span.merge(second.map(|t| t.span).unwrap_or(first.span));
            Ok(Some(SpannedToken {
                token: combined,
                span,
            }))
        } else {
            self.pending = second;
            Ok(Some(first))
        }
    }

    fn next_raw(&mut self) -> Result<Option<SpannedToken>, ParseError> {
        if let Some(pending) = self.pending.take() {
            return Ok(Some(pending));
        }

        match self.inner.next() {
            Some(Ok(token)) => Ok(Some(SpannedToken {
                token,
                span: self.inner.span().into(),
            })),
            Some(Err(())) => {
                let span: Span = self.inner.span().into();
                let text = self.inner.slice();
                let mut err = ParseError::new(format!("unexpected character '{}'", text), span);
                if text == "!" {
                    err = err.with_hint("use '!=' for inequality");
                }
                Err(err)
            }
            None => Ok(None),
        }
    }
}

/// Tokenize a source string into a vector of spanned tokens.
pub fn tokenize(source: &str) -> Result<Vec<SpannedToken>, ParseError> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.token)
            .collect()
    }

    #[test]
    fn test_simple_filter() {
        assert_eq!(
            kinds("model = ? and make = ?"),
            vec![
                Token::Ident("model".into()),
                Token::Eq,
                Token::Placeholder,
                Token::And,
                Token::Ident("make".into()),
                Token::Eq,
                Token::Placeholder,
            ]
        );
    }

    #[test]
    fn test_longest_match_operators() {
        assert_eq!(
            kinds("a >= ? or b <= ? or c != ?"),
            vec![
                Token::Ident("a".into()),
                Token::Ge,
                Token::Placeholder,
                Token::Or,
                Token::Ident("b".into()),
                Token::Le,
                Token::Placeholder,
                Token::Or,
                Token::Ident("c".into()),
                Token::Ne,
                Token::Placeholder,
            ]
        );
    }

    #[test]
    fn test_reserved_words_need_boundary() {
        // keyword prefixes stay identifiers
        assert_eq!(
            kinds("inventory android order"),
            vec![
                Token::Ident("inventory".into()),
                Token::Ident("android".into()),
                Token::Ident("order".into()),
            ]
        );
        assert_eq!(kinds("containsx"), vec![Token::Ident("containsx".into())]);
    }

    #[test]
    fn test_two_word_operators() {
        let tokens = tokenize("name starts  with ? and tag not\tin ?").unwrap();
        assert_eq!(tokens[1].token, Token::StartsWith);
        assert_eq!(tokens[1].span, Span::new(5, 17));
        assert_eq!(tokens[5].token, Token::NotIn);

        // a lone "starts" is just a word
        assert_eq!(
            kinds("starts = ?"),
            vec![Token::Ident("starts".into()), Token::Eq, Token::Placeholder]
        );
        // "not inside" does not pair
        assert_eq!(
            kinds("not inside"),
            vec![Token::Ident("not".into()), Token::Ident("inside".into())]
        );
    }

    #[test]
    fn test_invalid_character_is_positioned() {
        let err = tokenize("model = ? & make").unwrap_err();
        assert_eq!(err.span, Span::new(10, 11));

        let err = tokenize("model ! ?").unwrap_err();
        assert_eq!(err.hint.as_deref(), Some("use '!=' for inequality"));
    }

    #[test]
    fn test_inline_literals_are_tokens() {
        assert_eq!(
            kinds("model = 5230 or make = 'Nokia'"),
            vec![
                Token::Ident("model".into()),
                Token::Eq,
                Token::Literal("5230".into()),
                Token::Or,
                Token::Ident("make".into()),
                Token::Eq,
                Token::Literal("'Nokia'".into()),
            ]
        );
    }

    #[test]
    fn test_lexer_peek() {
        let mut lexer = Lexer::new("(a)");
        assert_eq!(
            lexer.peek().unwrap().map(|t| &t.token),
            Some(&Token::LParen)
        );
        assert_eq!(
            lexer.next_token().unwrap().map(|t| t.token),
            Some(Token::LParen)
        );
        assert_eq!(
            lexer.next_token().unwrap().map(|t| t.token),
            Some(Token::Ident("a".into()))
        );
    }
}
