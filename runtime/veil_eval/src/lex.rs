//! Byte-offset scanner over expression source text.
//!
//! The evaluator parses and evaluates in one pass, so there is no token
//! stream: the scanner exposes peek/advance over `&str` with byte
//! positions, and this module additionally scans the literal forms whose
//! shape does not depend on evaluation (strings, blob bytes, identifiers).
//! Number scanning lives in `veil_value::number` because string-to-number
//! coercion shares it.

use crate::error::{self, Result};

/// Cursor into expression source text.
pub(crate) struct Scanner<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    pub(crate) fn new(src: &'a str) -> Scanner<'a> {
        Scanner { src, pos: 0 }
    }

    #[inline]
    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    #[inline]
    pub(crate) fn set_pos(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// Unconsumed input.
    #[inline]
    pub(crate) fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    #[inline]
    pub(crate) fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    /// Next char without consuming it.
    #[inline]
    pub(crate) fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    /// Char at byte offset `n` past the cursor.
    pub(crate) fn peek_at(&self, n: usize) -> Option<char> {
        self.src.get(self.pos + n..).and_then(|s| s.chars().next())
    }

    /// Consume and return the next char.
    pub(crate) fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    /// Consume `ch` if it is next.
    pub(crate) fn eat(&mut self, ch: char) -> bool {
        if self.peek() == Some(ch) {
            self.pos += ch.len_utf8();
            true
        } else {
            false
        }
    }

    /// Consume `s` if the input starts with it.
    pub(crate) fn eat_str(&mut self, s: &str) -> bool {
        if self.rest().starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    /// Consume `ch` or fail with a syntax error naming `what`.
    pub(crate) fn expect(&mut self, ch: char, what: &str) -> Result<()> {
        if self.eat(ch) {
            Ok(())
        } else {
            Err(error::syntax(format!("missing {what}"), self.pos))
        }
    }

    pub(crate) fn skip_ws(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_ascii_whitespace() {
                self.pos += ch.len_utf8();
            } else {
                break;
            }
        }
    }

    /// Advance by `n` bytes.
    #[inline]
    pub(crate) fn advance(&mut self, n: usize) {
        self.pos += n;
    }

    /// Source text between two previously observed positions.
    pub(crate) fn slice(&self, start: usize, end: usize) -> &'a str {
        &self.src[start..end]
    }
}

/// First char of an identifier.
#[inline]
pub(crate) fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

/// Subsequent chars of an identifier. `#` appears in autoload names and is
/// validated by the scope resolver, not here.
#[inline]
pub(crate) fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '#'
}

/// Byte length of the identifier at the start of `s`, 0 when none.
pub(crate) fn ident_len(s: &str) -> usize {
    let mut chars = s.char_indices();
    match chars.next() {
        Some((_, ch)) if is_ident_start(ch) => {}
        _ => return 0,
    }
    for (i, ch) in chars {
        if !is_ident_char(ch) {
            return i;
        }
    }
    s.len()
}

/// Decode one escape sequence; `s` starts after the backslash. Returns the
/// decoded text and the bytes consumed. Unknown escapes copy the char.
pub(crate) fn decode_escape(s: &str) -> (String, usize) {
    let bytes = s.as_bytes();
    let Some(&first) = bytes.first() else {
        return (String::new(), 0);
    };
    match first {
        b'\\' => ("\\".into(), 1),
        b'"' => ("\"".into(), 1),
        b'n' => ("\n".into(), 1),
        b'r' => ("\r".into(), 1),
        b't' => ("\t".into(), 1),
        b'e' => ("\u{1b}".into(), 1),
        b'b' => ("\u{8}".into(), 1),
        b'f' => ("\u{c}".into(), 1),
        b'x' | b'X' => {
            let mut value: u32 = 0;
            let mut used = 1;
            while used <= 2 {
                match bytes.get(used).copied().filter(u8::is_ascii_hexdigit) {
                    Some(d) => {
                        value = value * 16 + hex_digit(d);
                        used += 1;
                    }
                    None => break,
                }
            }
            if used == 1 {
                // No hex digits: the 'x' is copied literally.
                ("x".into(), 1)
            } else {
                (char_from(value), used)
            }
        }
        b'u' | b'U' => {
            let max = if first == b'u' { 4 } else { 8 };
            let mut value: u32 = 0;
            let mut used = 1;
            while used <= max {
                match bytes.get(used).copied().filter(u8::is_ascii_hexdigit) {
                    Some(d) => {
                        value = value.saturating_mul(16).saturating_add(hex_digit(d));
                        used += 1;
                    }
                    None => break,
                }
            }
            if used == 1 {
                ((first as char).to_string(), 1)
            } else {
                (char_from(value), used)
            }
        }
        b'0'..=b'7' => {
            let mut value: u32 = 0;
            let mut used = 0;
            while used < 3 {
                match bytes.get(used).copied().filter(|b| (b'0'..=b'7').contains(b)) {
                    Some(d) => {
                        value = value * 8 + u32::from(d - b'0');
                        used += 1;
                    }
                    None => break,
                }
            }
            (char_from(value & 0xff), used)
        }
        _ => {
            // Unknown escape: the char itself.
            match s.chars().next() {
                Some(ch) => (ch.to_string(), ch.len_utf8()),
                None => (String::new(), 0),
            }
        }
    }
}

fn hex_digit(b: u8) -> u32 {
    match b {
        b'0'..=b'9' => u32::from(b - b'0'),
        b'a'..=b'f' => u32::from(b - b'a') + 10,
        _ => u32::from(b - b'A') + 10,
    }
}

fn char_from(value: u32) -> String {
    char::from_u32(value).unwrap_or(char::REPLACEMENT_CHARACTER).to_string()
}

/// Scan a single-quoted string; `s` starts at the opening quote. `''`
/// stands for one quote. Returns the content and the bytes consumed.
pub(crate) fn scan_single_quoted(s: &str, base: usize) -> Result<(String, usize)> {
    debug_assert!(s.starts_with('\''));
    let mut out = String::new();
    let mut i = 1;
    let bytes = s.as_bytes();
    loop {
        let Some(&b) = bytes.get(i) else {
            return Err(error::unterminated("string", base + i));
        };
        if b == b'\'' {
            if bytes.get(i + 1) == Some(&b'\'') {
                out.push('\'');
                i += 2;
            } else {
                return Ok((out, i + 1));
            }
        } else {
            let ch = s[i..].chars().next().unwrap_or('\0');
            out.push(ch);
            i += ch.len_utf8();
        }
    }
}

/// Scan a double-quoted string with escapes; `s` starts at the opening
/// quote. Returns the content and the bytes consumed.
pub(crate) fn scan_double_quoted(s: &str, base: usize) -> Result<(String, usize)> {
    debug_assert!(s.starts_with('"'));
    let mut out = String::new();
    let mut i = 1;
    loop {
        let Some(ch) = s[i..].chars().next() else {
            return Err(error::unterminated("string", base + i));
        };
        match ch {
            '"' => return Ok((out, i + 1)),
            '\\' => {
                let (decoded, used) = decode_escape(&s[i + 1..]);
                if used == 0 {
                    return Err(error::unterminated("string", base + i));
                }
                out.push_str(&decoded);
                i += 1 + used;
            }
            _ => {
                out.push(ch);
                i += ch.len_utf8();
            }
        }
    }
}

/// Scan a blob literal; `s` starts at the `0z` prefix. Bytes are hex
/// pairs, optionally separated by single dots. Returns the bytes and the
/// bytes of source consumed.
pub(crate) fn scan_blob(s: &str, base: usize) -> Result<(Vec<u8>, usize)> {
    debug_assert!(s[..2].eq_ignore_ascii_case("0z"));
    let bytes = s.as_bytes();
    let mut out = Vec::new();
    let mut i = 2;
    while let Some(&b) = bytes.get(i) {
        if b == b'.' {
            // A separator must sit between byte pairs.
            if out.is_empty() || !bytes.get(i + 1).copied().is_some_and(|n| n.is_ascii_hexdigit()) {
                break;
            }
            i += 1;
            continue;
        }
        if !b.is_ascii_hexdigit() {
            break;
        }
        let Some(&lo) = bytes.get(i + 1).filter(|b| b.is_ascii_hexdigit()) else {
            return Err(error::syntax("blob literal with an odd number of hex digits", base + i));
        };
        #[expect(clippy::cast_possible_truncation, reason = "two hex digits fit a byte")]
        out.push((hex_digit(b) * 16 + hex_digit(lo)) as u8);
        i += 2;
    }
    Ok((out, i))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_ident_len() {
        assert_eq!(ident_len("abc+1"), 3);
        assert_eq!(ident_len("_x9"), 3);
        assert_eq!(ident_len("auto#load"), 9);
        assert_eq!(ident_len("1abc"), 0);
        assert_eq!(ident_len(""), 0);
    }

    #[test]
    fn test_single_quoted() {
        assert_eq!(scan_single_quoted("'ab'", 0).ok(), Some(("ab".into(), 4)));
        assert_eq!(scan_single_quoted("'it''s'", 0).ok(), Some(("it's".into(), 7)));
        assert!(scan_single_quoted("'oops", 0).is_err());
    }

    #[test]
    fn test_double_quoted_escapes() {
        assert_eq!(scan_double_quoted(r#""a\tb""#, 0).ok(), Some(("a\tb".into(), 6)));
        assert_eq!(scan_double_quoted(r#""\x41B""#, 0).ok(), Some(("AB".into(), 7)));
        assert_eq!(scan_double_quoted(r#""\101""#, 0).ok(), Some(("A".into(), 6)));
        // unknown escape copies the char
        assert_eq!(scan_double_quoted(r#""\q""#, 0).ok(), Some(("q".into(), 4)));
        assert!(scan_double_quoted("\"oops", 0).is_err());
    }

    #[test]
    fn test_blob_literal() {
        assert_eq!(scan_blob("0zDEADBEEF", 0).ok(), Some((vec![0xde, 0xad, 0xbe, 0xef], 10)));
        assert_eq!(scan_blob("0zDE.AD", 0).ok(), Some((vec![0xde, 0xad], 7)));
        assert_eq!(scan_blob("0z", 0).ok(), Some((vec![], 2)));
        assert!(scan_blob("0zABC", 0).is_err());
    }

    #[test]
    fn test_scanner_cursor() {
        let mut s = Scanner::new("  a+b");
        s.skip_ws();
        assert_eq!(s.pos(), 2);
        assert_eq!(s.bump(), Some('a'));
        assert!(s.eat('+'));
        assert!(!s.eat('+'));
        assert_eq!(s.rest(), "b");
        assert!(!s.at_end());
    }
}
