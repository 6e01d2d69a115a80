use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Ident(String),
    Number(f64),
    Str(String),
    Punct(&'static str),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub(crate) kind: TokenKind,
    pub(crate) pos: usize,
    /// A line terminator separates this token from the previous one; used
    /// for automatic semicolon insertion.
    pub(crate) newline_before: bool,
}

// Longest first so that `===` wins over `==` and `=`.
const PUNCTUATORS: &[&str] = &[
    "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "++", "--", "+=", "-=", "*=", "/=", "{",
    "}", "(", ")", "[", "]", ";", ",", ".", "?", ":", "=", "+", "-", "*", "/", "%", "!", "<",
    ">",
];

#[derive(Debug)]
struct Cursor<'a> {
    src: &'a str,
    i: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, i: 0 }
    }

    fn eof(&self) -> bool {
        self.i >= self.src.len()
    }

    fn bytes(&self) -> &'a [u8] {
        self.src.as_bytes()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes().get(self.i).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes().get(self.i + offset).copied()
    }

    fn consume_ascii(&mut self, token: &str) -> bool {
        if self.src[self.i..].starts_with(token) {
            self.i += token.len();
            true
        } else {
            false
        }
    }

    /// Returns whether a line terminator was skipped.
    fn skip_ws_and_comments(&mut self) -> Result<bool> {
        let mut newline = false;
        loop {
            while let Some(b) = self.peek() {
                if b == b'\n' || b == b'\r' {
                    newline = true;
                    self.i += 1;
                } else if b.is_ascii_whitespace() {
                    self.i += 1;
                } else if self.src[self.i..].starts_with('\u{00A0}') {
                    self.i += '\u{00A0}'.len_utf8();
                } else {
                    break;
                }
            }
            if self.consume_ascii("//") {
                while let Some(b) = self.peek() {
                    if b == b'\n' {
                        break;
                    }
                    self.i += 1;
                }
                continue;
            }
            if self.consume_ascii("/*") {
                let Some(end) = self.src[self.i..].find("*/") else {
                    return Err(Error::ScriptParse("unterminated comment".into()));
                };
                newline |= self.src[self.i..self.i + end].contains('\n');
                self.i += end + 2;
                continue;
            }
            return Ok(newline);
        }
    }

    fn parse_identifier(&mut self) -> Option<String> {
        let bytes = self.bytes();
        let start = self.i;
        let first = *bytes.get(self.i)?;
        if !(first == b'_' || first == b'$' || first.is_ascii_alphabetic()) {
            return None;
        }
        self.i += 1;
        while let Some(b) = bytes.get(self.i).copied() {
            if b == b'_' || b == b'$' || b.is_ascii_alphanumeric() {
                self.i += 1;
            } else {
                break;
            }
        }
        Some(self.src[start..self.i].to_string())
    }

    fn parse_number(&mut self) -> Result<f64> {
        let bytes = self.bytes();
        let start = self.i;
        if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x' | b'X')) {
            self.i += 2;
            let digits_start = self.i;
            while self.peek().is_some_and(|b| b.is_ascii_hexdigit()) {
                self.i += 1;
            }
            let digits = &self.src[digits_start..self.i];
            return u64::from_str_radix(digits, 16)
                .map(|value| value as f64)
                .map_err(|_| Error::ScriptParse(format!("invalid hex literal at {start}")));
        }
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.i += 1;
        }
        if self.peek() == Some(b'.') {
            self.i += 1;
            while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                self.i += 1;
            }
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            let mark = self.i;
            self.i += 1;
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.i += 1;
            }
            if self.peek().is_some_and(|b| b.is_ascii_digit()) {
                while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                    self.i += 1;
                }
            } else {
                self.i = mark;
            }
        }
        if bytes
            .get(self.i)
            .is_some_and(|b| b.is_ascii_alphabetic() || *b == b'_' || *b == b'$')
        {
            return Err(Error::ScriptParse(format!(
                "identifier starts immediately after numeric literal at {}",
                self.i
            )));
        }
        self.src[start..self.i]
            .parse::<f64>()
            .map_err(|_| Error::ScriptParse(format!("invalid number literal at {start}")))
    }

    fn parse_string_literal(&mut self) -> Result<String> {
        let quote = self
            .peek()
            .ok_or_else(|| Error::ScriptParse("expected string literal".into()))?;
        self.i += 1;
        let start = self.i;
        let bytes = self.bytes();
        while self.i < bytes.len() {
            let b = bytes[self.i];
            if b == b'\\' {
                self.i += 2;
                continue;
            }
            if b == b'\n' {
                break;
            }
            if b == quote {
                let raw = &self.src[start..self.i];
                self.i += 1;
                return Ok(unescape_string(raw));
            }
            self.i += 1;
        }
        Err(Error::ScriptParse(format!(
            "unterminated string literal at {}",
            start - 1
        )))
    }
}

pub(crate) fn tokenize(src: &str) -> Result<Vec<Token>> {
    let mut cursor = Cursor::new(src);
    let mut tokens = Vec::new();
    loop {
        let newline_before = cursor.skip_ws_and_comments()?;
        let pos = cursor.i;
        if cursor.eof() {
            tokens.push(Token {
                kind: TokenKind::Eof,
                pos,
                newline_before,
            });
            return Ok(tokens);
        }

        let b = cursor.peek().unwrap_or_default();
        let kind = if let Some(ident) = cursor.parse_identifier() {
            TokenKind::Ident(ident)
        } else if b.is_ascii_digit()
            || (b == b'.' && cursor.peek_at(1).is_some_and(|next| next.is_ascii_digit()))
        {
            TokenKind::Number(cursor.parse_number()?)
        } else if b == b'\'' || b == b'"' {
            TokenKind::Str(cursor.parse_string_literal()?)
        } else if let Some(punct) = PUNCTUATORS.iter().find(|p| cursor.consume_ascii(p)) {
            TokenKind::Punct(*punct)
        } else {
            let ch = src[pos..].chars().next().unwrap_or('?');
            return Err(Error::ScriptParse(format!(
                "unexpected character '{ch}' at {pos}"
            )));
        };
        tokens.push(Token {
            kind,
            pos,
            newline_before,
        });
    }
}

fn unescape_string(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    let mut chars = src.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        let Some(escaped) = chars.next() else {
            break;
        };
        match escaped {
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            '0' => out.push('\0'),
            'u' | 'x' => {
                let width = if escaped == 'u' { 4 } else { 2 };
                let hex = chars.clone().take(width).collect::<String>();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) if hex.len() == width => {
                        out.push(decoded);
                        for _ in 0..width {
                            chars.next();
                        }
                    }
                    _ => out.push(escaped),
                }
            }
            '\n' => {}
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Result<Vec<TokenKind>> {
        Ok(tokenize(src)?.into_iter().map(|token| token.kind).collect())
    }

    #[test]
    fn punctuators_prefer_longest_match() -> Result<()> {
        assert_eq!(
            kinds("a === b")?,
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Punct("==="),
                TokenKind::Ident("b".into()),
                TokenKind::Eof,
            ]
        );
        Ok(())
    }

    #[test]
    fn strings_and_numbers_decode() -> Result<()> {
        assert_eq!(
            kinds(r#"'a\'b' "A" 1.5e2 0x10"#)?,
            vec![
                TokenKind::Str("a'b".into()),
                TokenKind::Str("A".into()),
                TokenKind::Number(150.0),
                TokenKind::Number(16.0),
                TokenKind::Eof,
            ]
        );
        Ok(())
    }

    #[test]
    fn newlines_are_tracked_across_comments() -> Result<()> {
        let tokens = tokenize("a /* x\n */ b // c\nd")?;
        let flags = tokens.iter().map(|t| t.newline_before).collect::<Vec<_>>();
        assert_eq!(flags, vec![false, true, true, false]);
        Ok(())
    }

    #[test]
    fn unterminated_string_is_an_error() {
        assert!(matches!(tokenize("'abc"), Err(Error::ScriptParse(_))));
    }
}
