//! Lexer for GraphQL documents.

use crate::token::{Token, TokenKind};
use batchql_core::diagnostics::codes;
use batchql_core::{Diagnostic, Span};

/// A lexer over GraphQL source text.
pub struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: u32,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer.
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
        }
    }

    /// Returns the source being lexed.
    #[inline]
    pub fn source(&self) -> &'a str {
        self.source
    }

    /// Returns the current position.
    #[inline]
    pub fn pos(&self) -> u32 {
        self.pos
    }

    /// Peeks at the current byte without consuming.
    #[inline]
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos as usize).copied()
    }

    /// Peeks at the byte at offset from current position.
    #[inline]
    fn peek_at(&self, offset: u32) -> Option<u8> {
        self.bytes.get((self.pos + offset) as usize).copied()
    }

    /// Advances by one byte.
    #[inline]
    fn advance(&mut self) {
        self.pos += 1;
    }

    /// Advances by n bytes.
    #[inline]
    fn advance_by(&mut self, n: u32) {
        self.pos += n;
    }

    fn error(&self, span: Span, message: impl std::fmt::Display) -> Diagnostic {
        Diagnostic::error(codes::SYNTAX, format!("Syntax Error: {message}")).with_span(span)
    }

    /// Scans the next token.
    pub fn next_token(&mut self) -> Result<Token, Diagnostic> {
        self.skip_ignored();

        let start = self.pos;

        let Some(c) = self.peek() else {
            return Ok(Token::new(TokenKind::Eof, Span::empty(start)));
        };

        let kind = match c {
            b'!' => self.punct(TokenKind::Bang),
            b'$' => self.punct(TokenKind::Dollar),
            b'&' => self.punct(TokenKind::Amp),
            b'(' => self.punct(TokenKind::LParen),
            b')' => self.punct(TokenKind::RParen),
            b':' => self.punct(TokenKind::Colon),
            b'=' => self.punct(TokenKind::Eq),
            b'@' => self.punct(TokenKind::At),
            b'[' => self.punct(TokenKind::LBracket),
            b']' => self.punct(TokenKind::RBracket),
            b'{' => self.punct(TokenKind::LBrace),
            b'|' => self.punct(TokenKind::Pipe),
            b'}' => self.punct(TokenKind::RBrace),
            b'.' => {
                if self.peek_at(1) == Some(b'.') && self.peek_at(2) == Some(b'.') {
                    self.advance_by(3);
                    TokenKind::Spread
                } else {
                    return Err(self.error(Span::new(start, start + 1), "Unexpected character: \".\"."));
                }
            }
            b'"' => self.scan_string(start)?,
            b'-' | b'0'..=b'9' => self.scan_number(start)?,
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.scan_name(),
            _ => {
                let ch = self.source[start as usize..].chars().next().unwrap_or('\u{fffd}');
                return Err(self.error(
                    Span::new(start, start + ch.len_utf8() as u32),
                    format_args!("Unexpected character: \"{ch}\"."),
                ));
            }
        };

        Ok(Token::new(kind, Span::new(start, self.pos)))
    }

    #[inline]
    fn punct(&mut self, kind: TokenKind) -> TokenKind {
        self.advance();
        kind
    }

    /// Skips whitespace, line terminators, commas and comments.
    fn skip_ignored(&mut self) {
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\r' | b'\n' | b',') => {
                    self.advance();
                }
                Some(b'#') => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' || c == b'\r' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some(0xEF) if self.peek_at(1) == Some(0xBB) && self.peek_at(2) == Some(0xBF) => {
                    // UTF-8 BOM
                    self.advance_by(3);
                }
                _ => break,
            }
        }
    }

    fn scan_name(&mut self) -> TokenKind {
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == b'_' {
                self.advance();
            } else {
                break;
            }
        }
        TokenKind::Name
    }

    fn scan_digits(&mut self) -> usize {
        let mut count = 0;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.advance();
                count += 1;
            } else {
                break;
            }
        }
        count
    }

    fn scan_number(&mut self, start: u32) -> Result<TokenKind, Diagnostic> {
        let mut is_float = false;

        if self.peek() == Some(b'-') {
            self.advance();
        }

        if self.peek() == Some(b'0') {
            self.advance();
            if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                return Err(self.error(
                    Span::new(self.pos, self.pos + 1),
                    "Invalid number, unexpected digit after 0.",
                ));
            }
        } else if self.scan_digits() == 0 {
            return Err(self.error(Span::new(start, self.pos + 1), "Invalid number, expected digit."));
        }

        if self.peek() == Some(b'.') {
            is_float = true;
            self.advance();
            if self.scan_digits() == 0 {
                return Err(self.error(Span::new(start, self.pos + 1), "Invalid number, expected digit."));
            }
        }

        if let Some(b'e' | b'E') = self.peek() {
            is_float = true;
            self.advance();
            if let Some(b'+' | b'-') = self.peek() {
                self.advance();
            }
            if self.scan_digits() == 0 {
                return Err(self.error(Span::new(start, self.pos + 1), "Invalid number, expected digit."));
            }
        }

        if is_float {
            Ok(TokenKind::Float)
        } else {
            Ok(TokenKind::Int)
        }
    }

    fn scan_string(&mut self, start: u32) -> Result<TokenKind, Diagnostic> {
        self.advance(); // Opening quote

        if self.peek() == Some(b'"') && self.peek_at(1) == Some(b'"') {
            self.advance_by(2);
            return self.scan_block_string(start);
        }

        loop {
            match self.peek() {
                None | Some(b'\n' | b'\r') => {
                    return Err(self.error(Span::empty(self.pos), "Unterminated string."));
                }
                Some(b'"') => {
                    self.advance();
                    return Ok(TokenKind::String);
                }
                Some(b'\\') => {
                    self.advance_by(2);
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn scan_block_string(&mut self, start: u32) -> Result<TokenKind, Diagnostic> {
        loop {
            match self.peek() {
                None => {
                    return Err(self.error(Span::new(start, self.pos), "Unterminated string."));
                }
                Some(b'"') if self.peek_at(1) == Some(b'"') && self.peek_at(2) == Some(b'"') => {
                    self.advance_by(3);
                    return Ok(TokenKind::BlockString);
                }
                Some(b'\\')
                    if self.peek_at(1) == Some(b'"')
                        && self.peek_at(2) == Some(b'"')
                        && self.peek_at(3) == Some(b'"') =>
                {
                    self.advance_by(4);
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    /// Gets the text at the given span.
    pub fn span_text(&self, span: Span) -> &'a str {
        &self.source[span.start as usize..span.end as usize]
    }
}

/// Decodes the raw text of a `String` token, quotes included.
pub fn string_value(raw: &str) -> String {
    let inner = &raw[1..raw.len().saturating_sub(1).max(1)];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }

    out
}

/// Decodes the raw text of a `BlockString` token, removing the common
/// indentation and the leading and trailing blank lines.
pub fn block_string_value(raw: &str) -> String {
    let inner = &raw[3..raw.len().saturating_sub(3).max(3)];
    let inner = inner.replace("\\\"\"\"", "\"\"\"");
    let lines: Vec<&str> = inner.lines().collect();

    let common_indent = lines
        .iter()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0);

    let mut dedented: Vec<&str> = lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            if i == 0 || line.len() < common_indent {
                line.trim_start_matches([' ', '\t']).trim_end()
            } else {
                line[common_indent..].trim_end()
            }
        })
        .collect();

    while dedented.first().is_some_and(|line| line.is_empty()) {
        dedented.remove(0);
    }
    while dedented.last().is_some_and(|line| line.is_empty()) {
        dedented.pop();
    }

    dedented.join("\n")
}

/// Tokenizes the entire source.
pub fn tokenize(source: &str) -> Result<Vec<Token>, Diagnostic> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();

    loop {
        let token = lexer.next_token()?;
        let is_eof = token.is_eof();
        tokens.push(token);
        if is_eof {
            break;
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_punctuation() {
        assert_eq!(
            kinds("! $ & ( ) ... : = @ [ ] { | }"),
            vec![
                TokenKind::Bang,
                TokenKind::Dollar,
                TokenKind::Amp,
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::Spread,
                TokenKind::Colon,
                TokenKind::Eq,
                TokenKind::At,
                TokenKind::LBracket,
                TokenKind::RBracket,
                TokenKind::LBrace,
                TokenKind::Pipe,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_commas_and_comments_are_ignored() {
        assert_eq!(
            kinds("query, # a comment\n { ping }"),
            vec![
                TokenKind::Name,
                TokenKind::LBrace,
                TokenKind::Name,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("42 -17 3.14 1e10 2.5e-3"),
            vec![
                TokenKind::Int,
                TokenKind::Int,
                TokenKind::Float,
                TokenKind::Float,
                TokenKind::Float,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_leading_zero_is_rejected() {
        let err = tokenize("007").unwrap_err();
        assert_eq!(err.message, "Syntax Error: Invalid number, unexpected digit after 0.");
    }

    #[test]
    fn test_strings() {
        assert_eq!(
            kinds(r#""hello" "wor\"ld" """block string""""#),
            vec![
                TokenKind::String,
                TokenKind::String,
                TokenKind::BlockString,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("\"open").unwrap_err();
        assert_eq!(err.message, "Syntax Error: Unterminated string.");
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize("{ % }").unwrap_err();
        insta::assert_snapshot!(err.message, @r#"Syntax Error: Unexpected character: "%"."#);
    }

    #[test]
    fn test_string_value_escapes() {
        assert_eq!(string_value(r#""a\nb\"cA""#), "a\nb\"cA");
    }

    #[test]
    fn test_block_string_dedent() {
        let raw = "\"\"\"\n    Hello,\n      World!\n\n    Yours\n  \"\"\"";
        assert_eq!(block_string_value(raw), "Hello,\n  World!\n\nYours");
    }
}
