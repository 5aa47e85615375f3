//! Token kinds and structures for GraphQL documents.

use batchql_core::Span;

/// The kind of a token.
///
/// GraphQL has no reserved words: `query`, `type` or `on` are plain names and
/// the parser gives them meaning by position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TokenKind {
    Eof,

    // Lexical tokens
    Name,
    Int,
    Float,
    String,
    BlockString,

    // Punctuators
    Bang,
    Dollar,
    Amp,
    LParen,
    RParen,
    Spread,
    Colon,
    Eq,
    At,
    LBracket,
    RBracket,
    LBrace,
    Pipe,
    RBrace,
}

impl TokenKind {
    #[must_use]
    pub const fn is_punctuator(self) -> bool {
        !matches!(
            self,
            Self::Eof | Self::Name | Self::Int | Self::Float | Self::String | Self::BlockString
        )
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eof => "<EOF>",
            Self::Name => "Name",
            Self::Int => "Int",
            Self::Float => "Float",
            Self::String => "String",
            Self::BlockString => "BlockString",
            Self::Bang => "!",
            Self::Dollar => "$",
            Self::Amp => "&",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::Spread => "...",
            Self::Colon => ":",
            Self::Eq => "=",
            Self::At => "@",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::LBrace => "{",
            Self::Pipe => "|",
            Self::RBrace => "}",
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_punctuator() {
            write!(f, "\"{}\"", self.as_str())
        } else {
            f.write_str(self.as_str())
        }
    }
}

/// A token with its kind and source span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    #[must_use]
    #[inline]
    pub const fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    #[must_use]
    #[inline]
    pub const fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }

    /// Describes the token the way GraphQL syntax errors do, e.g. `Name "foo"`.
    #[must_use]
    pub fn describe(&self, source: &str) -> String {
        match self.kind {
            TokenKind::Name
            | TokenKind::Int
            | TokenKind::Float
            | TokenKind::String
            | TokenKind::BlockString => {
                let text = &source[std::ops::Range::<usize>::from(self.span)];
                let text = match self.kind {
                    TokenKind::BlockString => text.trim_start_matches("\"\"\"").trim_end_matches("\"\"\""),
                    TokenKind::String => text.trim_matches('"'),
                    _ => text,
                };
                format!("{} \"{}\"", self.kind.as_str(), text)
            }
            kind => kind.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_tokens() {
        let source = "invalid { \"str\"";
        assert_eq!(
            Token::new(TokenKind::Name, Span::new(0, 7)).describe(source),
            "Name \"invalid\""
        );
        assert_eq!(
            Token::new(TokenKind::LBrace, Span::new(8, 9)).describe(source),
            "\"{\""
        );
        assert_eq!(
            Token::new(TokenKind::String, Span::new(10, 15)).describe(source),
            "String \"str\""
        );
        assert_eq!(Token::new(TokenKind::Eof, Span::empty(15)).describe(source), "<EOF>");
    }
}
