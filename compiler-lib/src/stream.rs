//! Cursor over the lexed token vector.
//!
//! The parser consumes tokens strictly left to right; speculative lookahead
//! (e.g. "is this a local variable declaration?") is expressed with
//! `save`/`restore` bookmarks instead of unbounded peeking.

use crate::lexer::{Token, TokenKind};

pub struct TokenStream<'f> {
    tokens: Vec<Token<'f>>,
    cursor: usize,
    bookmarks: Vec<usize>,
}

impl<'f> TokenStream<'f> {
    /// Whitespace and comments carry no syntactic information; they are
    /// dropped here so that `peek`/`read`/`unread` move over significant
    /// tokens only.
    pub fn new(tokens: Vec<Token<'f>>) -> Self {
        let tokens = tokens
            .into_iter()
            .filter(|token| {
                !matches!(token.data, TokenKind::Whitespace | TokenKind::Comment)
            })
            .collect();

        Self {
            tokens,
            cursor: 0,
            bookmarks: Vec::new(),
        }
    }

    /// Returns the next token without advancing, `None` at end of input.
    pub fn peek(&self) -> Option<Token<'f>> {
        self.tokens.get(self.cursor).copied()
    }

    /// Returns and consumes the next token.
    pub fn read(&mut self) -> Option<Token<'f>> {
        let token = self.tokens.get(self.cursor).copied();
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    /// Moves the cursor back one position.
    pub fn unread(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    /// Push a cursor bookmark. Nested lookahead pushes nested bookmarks.
    pub fn save(&mut self) {
        self.bookmarks.push(self.cursor);
    }

    /// Pop the most recent bookmark and rewind to it.
    pub fn restore(&mut self) {
        self.cursor = self
            .bookmarks
            .pop()
            .expect("restore without a matching save");
    }

    /// Pop the most recent bookmark without rewinding, committing the
    /// lookahead that was performed since the matching `save`.
    pub fn discard(&mut self) {
        self.bookmarks
            .pop()
            .expect("discard without a matching save");
    }

    /// Advances until a token with the given lexeme has been consumed and
    /// returns it, or `None` if the stream ran out first.
    pub fn read_until(&mut self, lexeme: &str) -> Option<Token<'f>> {
        while self.cursor < self.tokens.len() {
            let index = self.cursor;
            self.cursor += 1;
            if self.tokens[index].data.lexeme() == lexeme {
                return Some(self.tokens[index]);
            }
        }
        None
    }

    /// True while unread tokens remain.
    pub fn has_token(&self) -> bool {
        self.cursor < self.tokens.len()
    }

    /// Span of the most recently read token, used for end-of-input errors.
    pub fn previous_span(&self) -> Option<asciifile::Span> {
        if self.cursor == 0 {
            None
        } else {
            self.tokens.get(self.cursor - 1).map(|token| token.span)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lexer::Lexer, strtab::StringTable};
    use asciifile::AsciiFile;

    fn stream(input: &'static str) -> TokenStream<'static> {
        let strtab = Box::leak(Box::new(StringTable::new()));
        let file = Box::leak(Box::new(AsciiFile::new(input.as_bytes()).unwrap()));
        let tokens = Lexer::new(strtab, file)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        TokenStream::new(tokens)
    }

    #[test]
    fn whitespace_is_transparent() {
        let mut stream = stream("a   b\n\tc");
        assert_eq!(stream.read().unwrap().data.lexeme(), "a");
        assert_eq!(stream.read().unwrap().data.lexeme(), "b");
        assert_eq!(stream.read().unwrap().data.lexeme(), "c");
        assert!(stream.read().is_none());
        assert!(!stream.has_token());
    }

    #[test]
    fn peek_does_not_advance() {
        let mut stream = stream("x y");
        assert_eq!(stream.peek().unwrap().data.lexeme(), "x");
        assert_eq!(stream.peek().unwrap().data.lexeme(), "x");
        assert_eq!(stream.read().unwrap().data.lexeme(), "x");
        assert_eq!(stream.peek().unwrap().data.lexeme(), "y");
    }

    #[test]
    fn unread_steps_back() {
        let mut stream = stream("x y");
        stream.read();
        stream.unread();
        assert_eq!(stream.read().unwrap().data.lexeme(), "x");
    }

    #[test]
    fn nested_save_restore() {
        let mut stream = stream("a b c d");
        stream.read();
        stream.save();
        stream.read();
        stream.save();
        stream.read();
        stream.restore();
        assert_eq!(stream.peek().unwrap().data.lexeme(), "c");
        stream.restore();
        assert_eq!(stream.peek().unwrap().data.lexeme(), "b");
    }

    #[test]
    fn read_until_consumes_match() {
        let mut stream = stream("int x ; class Foo");
        assert_eq!(stream.read_until("class").unwrap().data.lexeme(), "class");
        assert_eq!(stream.read().unwrap().data.lexeme(), "Foo");
        assert!(stream.read_until("class").is_none());
        assert!(!stream.has_token());
    }
}
