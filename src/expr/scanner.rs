//! Character-level scanner shared by every grammar production.
//!
//! The compiler is a hand-written recursive descent parser; there is no separate
//! token stream. Productions that care about whitespace (document paths) read
//! characters directly, everything else calls [`Scanner::skip_ws`] first.
use super::SyntaxError;

/// Words that can never be read as a bare identifier.
const RESERVED: &[&str] = &[
    "and", "or", "not", "is", "in", "like", "regexp", "between", "overlaps", "escape", "div",
    "interval", "null", "true", "false",
];

#[derive(Debug, Clone)]
pub(crate) struct Scanner<'a> {
    src: &'a str,
    pos: usize,
}

pub(crate) fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

pub(crate) fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

pub(crate) fn is_reserved(word: &str) -> bool {
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(word))
}

impl<'a> Scanner<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn reset(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    pub fn slice(&self, start: usize, end: usize) -> &'a str {
        &self.src[start..end]
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.src.len()
    }

    pub fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    pub fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    pub fn peek_nth(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    pub fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    /// Consumes `c` if it is the next character.
    pub fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    pub fn eat_str(&mut self, s: &str) -> bool {
        if self.rest().starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    /// Consumes `s` unless it is immediately followed by one of `not_followed_by`.
    /// Used to tell `<` from `<<`/`<=`, `&` from `&&` and so on.
    pub fn eat_op(&mut self, s: &str, not_followed_by: &[char]) -> bool {
        let rest = self.rest();
        if !rest.starts_with(s) {
            return false;
        }
        match rest[s.len()..].chars().next() {
            Some(next) if not_followed_by.contains(&next) => false,
            _ => {
                self.pos += s.len();
                true
            }
        }
    }

    /// Returns the identifier-shaped word at the cursor without consuming it.
    pub fn peek_word(&self) -> Option<&'a str> {
        let rest = self.rest();
        let mut chars = rest.char_indices();
        match chars.next() {
            Some((_, c)) if is_ident_start(c) => {}
            _ => return None,
        }
        let end = chars
            .find(|(_, c)| !is_ident_char(*c))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        Some(&rest[..end])
    }

    pub fn peek_keyword(&self, keyword: &str) -> bool {
        self.peek_word()
            .is_some_and(|w| w.eq_ignore_ascii_case(keyword))
    }

    pub fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += keyword.len();
            true
        } else {
            false
        }
    }

    /// Looks past whitespace for `keyword` without moving the cursor.
    pub fn peek_keyword_ws(&self, keyword: &str) -> bool {
        let mut ahead = self.clone();
        ahead.skip_ws();
        ahead.peek_keyword(keyword)
    }

    pub fn expect(&mut self, c: char, what: &str) -> Result<(), SyntaxError> {
        self.skip_ws();
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    pub fn error(&self, message: impl Into<String>) -> SyntaxError {
        self.error_at(self.pos, message)
    }

    pub fn error_at(&self, position: usize, message: impl Into<String>) -> SyntaxError {
        let message = message.into();
        let found = match self.src[position.min(self.src.len())..].chars().next() {
            Some(c) => format!("'{c}'"),
            None => "end of input".to_string(),
        };
        SyntaxError {
            position,
            message: format!("{message}, found {found}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_respect_word_boundaries() {
        let sc = Scanner::new("INTERVALS");
        assert!(!sc.peek_keyword("interval"));

        let mut sc = Scanner::new("Not in");
        assert!(sc.eat_keyword("NOT"));
        assert!(sc.peek_keyword_ws("in"));
        assert_eq!(sc.pos(), 3);
    }

    #[test]
    fn operators_are_not_prefixes_of_longer_ones() {
        let mut sc = Scanner::new("<<");
        assert!(!sc.eat_op("<", &['<', '=', '>']));
        assert!(sc.eat_op("<<", &[]));
        assert!(sc.is_eof());
    }

    #[test]
    fn words_and_reserved() {
        let sc = Scanner::new("foo_bar$1 + 2");
        assert_eq!(sc.peek_word(), Some("foo_bar$1"));
        assert!(is_reserved("BETWEEN"));
        assert!(!is_reserved("name"));
    }

    #[test]
    fn error_reports_position() {
        let mut sc = Scanner::new("abc");
        sc.bump();
        let err = sc.error("expected digit");
        assert_eq!(err.position, 1);
        assert!(err.message.contains("'b'"));
    }
}
