use crate::strtab::{StringTable, Symbol};
use asciifile::{AsciiFile, Position, Span, Spanned};
use derive_more::Display;
use failure::Fail;
use std::{convert::TryFrom, fmt};

pub type TokenResult<'f> = Result<Token<'f>, LexicalError>;

pub type Token<'f> = Spanned<TokenKind<'f>>;
pub type LexicalError = Spanned<ErrorKind>;

pub type IntLit<'f> = &'f str;

/// Keywords are single-ticked, operators back-ticked
#[derive(Debug, PartialEq, Eq, Clone, Copy, Display)]
pub enum TokenKind<'f> {
    #[display(fmt = "'{}'", _0)]
    Keyword(Keyword),
    #[display(fmt = "`{}`", _0)]
    Operator(Operator),
    #[display(fmt = "identifier `{}`", _0)]
    Identifier(Symbol<'f>),
    #[display(fmt = "integer literal `{}`", _0)]
    IntegerLiteral(IntLit<'f>),
    #[display(fmt = "hex literal `{}`", _0)]
    HexLiteral(IntLit<'f>),
    #[display(fmt = "binary literal `{}`", _0)]
    BinaryLiteral(IntLit<'f>),
    #[display(fmt = "a comment")]
    Comment,
    #[display(fmt = "whitespace")]
    Whitespace,
}

impl<'f> TokenKind<'f> {
    /// The source spelling of the token. Keywords and operators have a fixed
    /// spelling, the remaining kinds preserve their lexeme verbatim.
    pub fn lexeme(&self) -> &'f str {
        match self {
            TokenKind::Keyword(keyword) => keyword.as_str(),
            TokenKind::Operator(operator) => operator.as_str(),
            TokenKind::Identifier(symbol) => symbol.as_str(),
            TokenKind::IntegerLiteral(lit)
            | TokenKind::HexLiteral(lit)
            | TokenKind::BinaryLiteral(lit) => lit,
            TokenKind::Comment => "",
            TokenKind::Whitespace => "",
        }
    }

    pub fn is_identifier(&self) -> bool {
        matches!(self, TokenKind::Identifier(_))
    }

    pub fn is_operator(&self) -> bool {
        matches!(self, TokenKind::Operator(_))
    }

    pub fn is_number(&self) -> bool {
        matches!(
            self,
            TokenKind::IntegerLiteral(_) | TokenKind::HexLiteral(_) | TokenKind::BinaryLiteral(_)
        )
    }
}

#[derive(Debug, Fail)]
pub enum ErrorKind {
    #[fail(display = "unclosed comment")]
    UnclosedComment,
    #[fail(display = "unexpected character '{}'", _0)]
    UnexpectedCharacter(char),
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord)]
pub enum Keyword {
    Boolean,
    Break,
    Class,
    Continue,
    Do,
    Else,
    Extends,
    False,
    For,
    If,
    Int,
    New,
    Public,
    Return,
    Static,
    This,
    True,
    Void,
    While,
}

impl Keyword {
    pub fn as_str(self) -> &'static str {
        use self::Keyword::*;
        match self {
            Boolean => "boolean",
            Break => "break",
            Class => "class",
            Continue => "continue",
            Do => "do",
            Else => "else",
            Extends => "extends",
            False => "false",
            For => "for",
            If => "if",
            Int => "int",
            New => "new",
            Public => "public",
            Return => "return",
            Static => "static",
            This => "this",
            True => "true",
            Void => "void",
            While => "while",
        }
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for Keyword {
    type Error = ();

    fn try_from(s: &str) -> Result<Keyword, Self::Error> {
        use self::Keyword::*;

        match s {
            "boolean" => Ok(Boolean),
            "break" => Ok(Break),
            "class" => Ok(Class),
            "continue" => Ok(Continue),
            "do" => Ok(Do),
            "else" => Ok(Else),
            "extends" => Ok(Extends),
            "false" => Ok(False),
            "for" => Ok(For),
            "if" => Ok(If),
            "int" => Ok(Int),
            "new" => Ok(New),
            "public" => Ok(Public),
            "return" => Ok(Return),
            "static" => Ok(Static),
            "this" => Ok(This),
            "true" => Ok(True),
            "void" => Ok(Void),
            "while" => Ok(While),
            _ => Err(()),
        }
    }
}

// Use non-semantic names, since e.g. '<' might mean more than 'less-than'
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord)]
pub enum Operator {
    Ampersand,
    AmpersandEqual,
    Caret,
    CaretEqual,
    Comma,
    Dot,
    DoubleAmpersand,
    DoubleEqual,
    DoubleLeftChevron,
    DoubleLeftChevronEqual,
    DoubleMinus,
    DoublePipe,
    DoublePlus,
    DoubleRightChevron,
    DoubleRightChevronEqual,
    Equal,
    Exclaim,
    ExclaimEqual,
    LeftBrace,
    LeftBracket,
    LeftChevron,
    LeftChevronEqual,
    LeftParen,
    Minus,
    MinusEqual,
    Percent,
    PercentEqual,
    Pipe,
    PipeEqual,
    Plus,
    PlusEqual,
    RightBrace,
    RightBracket,
    RightChevron,
    RightChevronEqual,
    RightParen,
    Semicolon,
    Slash,
    SlashEqual,
    Star,
    StarEqual,
    Tilde,
    TripleRightChevron,
    TripleRightChevronEqual,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        use self::Operator::*;
        match self {
            TripleRightChevronEqual => ">>>=",
            DoubleLeftChevronEqual => "<<=",
            DoubleRightChevronEqual => ">>=",
            TripleRightChevron => ">>>",
            AmpersandEqual => "&=",
            CaretEqual => "^=",
            DoubleAmpersand => "&&",
            DoubleEqual => "==",
            DoubleLeftChevron => "<<",
            DoubleMinus => "--",
            DoublePipe => "||",
            DoublePlus => "++",
            DoubleRightChevron => ">>",
            ExclaimEqual => "!=",
            LeftChevronEqual => "<=",
            MinusEqual => "-=",
            PercentEqual => "%=",
            PipeEqual => "|=",
            PlusEqual => "+=",
            RightChevronEqual => ">=",
            SlashEqual => "/=",
            StarEqual => "*=",
            Ampersand => "&",
            Caret => "^",
            Comma => ",",
            Dot => ".",
            Equal => "=",
            Exclaim => "!",
            LeftBrace => "{",
            LeftBracket => "[",
            LeftChevron => "<",
            LeftParen => "(",
            Minus => "-",
            Percent => "%",
            Pipe => "|",
            Plus => "+",
            RightBrace => "}",
            RightBracket => "]",
            RightChevron => ">",
            RightParen => ")",
            Semicolon => ";",
            Slash => "/",
            Star => "*",
            Tilde => "~",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Operator spellings grouped by length, longest match first.
#[rustfmt::skip]
const OPERATORS: &[&[(&str, Operator)]] = &[
    &[(">>>=", Operator::TripleRightChevronEqual)],
    &[
        (">>>", Operator::TripleRightChevron),
        ("<<=", Operator::DoubleLeftChevronEqual),
        (">>=", Operator::DoubleRightChevronEqual),
    ],
    &[
        ("!=", Operator::ExclaimEqual),
        ("*=", Operator::StarEqual),
        ("++", Operator::DoublePlus),
        ("+=", Operator::PlusEqual),
        ("-=", Operator::MinusEqual),
        ("--", Operator::DoubleMinus),
        ("/=", Operator::SlashEqual),
        ("<<", Operator::DoubleLeftChevron),
        ("<=", Operator::LeftChevronEqual),
        ("==", Operator::DoubleEqual),
        (">=", Operator::RightChevronEqual),
        (">>", Operator::DoubleRightChevron),
        ("%=", Operator::PercentEqual),
        ("&=", Operator::AmpersandEqual),
        ("&&", Operator::DoubleAmpersand),
        ("^=", Operator::CaretEqual),
        ("|=", Operator::PipeEqual),
        ("||", Operator::DoublePipe),
    ],
    &[
        ("!", Operator::Exclaim),
        ("(", Operator::LeftParen),
        (")", Operator::RightParen),
        ("*", Operator::Star),
        ("+", Operator::Plus),
        (",", Operator::Comma),
        ("-", Operator::Minus),
        (".", Operator::Dot),
        ("/", Operator::Slash),
        (";", Operator::Semicolon),
        ("<", Operator::LeftChevron),
        ("=", Operator::Equal),
        (">", Operator::RightChevron),
        ("%", Operator::Percent),
        ("&", Operator::Ampersand),
        ("[", Operator::LeftBracket),
        ("]", Operator::RightBracket),
        ("^", Operator::Caret),
        ("{", Operator::LeftBrace),
        ("}", Operator::RightBrace),
        ("~", Operator::Tilde),
        ("|", Operator::Pipe),
    ],
];

/// Test if the given character is whitespace according to the MiniJava
/// specification
fn is_minijava_whitespace(c: char) -> bool {
    match c {
        ' ' | '\n' | '\r' | '\t' => true,
        _ => false,
    }
}

fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_identifier_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_number_continue(c: char) -> bool {
    c.is_ascii_digit() || c == '_'
}

fn is_hex_continue(c: char) -> bool {
    c.is_ascii_hexdigit() || c == '_'
}

fn is_binary_continue(c: char) -> bool {
    c == '0' || c == '1' || c == '_'
}

pub struct Lexer<'f, 's> {
    src: &'f str,
    offset: usize,
    position: Position,
    strtab: &'s StringTable<'f>,
}

impl<'f, 's> Lexer<'f, 's> {
    pub fn new(strtab: &'s StringTable<'f>, file: &'f AsciiFile<'f>) -> Self {
        Self {
            src: file.as_str(),
            offset: 0,
            position: Position::at_file_start(),
            strtab,
        }
    }

    fn peek(&self) -> Option<char> {
        self.src.as_bytes().get(self.offset).map(|b| *b as char)
    }

    fn peek_at(&self, lookahead: usize) -> Option<char> {
        self.src
            .as_bytes()
            .get(self.offset + lookahead)
            .map(|b| *b as char)
    }

    /// Consume the next character, keeping row and column in sync.
    /// Returns the position the character was at.
    fn bump(&mut self) -> Position {
        let at = self.position;
        let chr = self.src.as_bytes()[self.offset] as char;
        self.offset += 1;
        self.position = if chr == '\n' {
            self.position.next_line()
        } else {
            self.position.next_column()
        };
        at
    }

    fn matches(&self, needle: &str) -> bool {
        self.src[self.offset..].starts_with(needle)
    }

    fn lex_token(&mut self) -> Option<TokenResult<'f>> {
        let chr = self.peek()?;

        Some(match chr {
            c if is_identifier_start(c) => Ok(self.lex_identifier_or_keyword()),
            c if c.is_ascii_digit() => Ok(self.lex_number()),
            c if is_minijava_whitespace(c) => Ok(self.lex_whitespace()),
            '/' if self.matches("//") => Ok(self.lex_line_comment()),
            '/' if self.matches("/*") => self.lex_block_comment(),
            _ => match self.lex_operator() {
                Some(token) => Ok(token),
                None => {
                    let at = self.bump();
                    Err(LexicalError::new(
                        Span::from_single_position(at),
                        ErrorKind::UnexpectedCharacter(chr),
                    ))
                }
            },
        })
    }

    fn lex_while<P>(&mut self, predicate: P) -> (Span, &'f str)
    where
        P: Fn(char) -> bool,
    {
        let start_offset = self.offset;
        let start = self.position;
        let mut end = self.bump();
        while let Some(chr) = self.peek() {
            if !predicate(chr) {
                break;
            }
            end = self.bump();
        }
        (Span::new(start, end), &self.src[start_offset..self.offset])
    }

    fn lex_identifier_or_keyword(&mut self) -> Token<'f> {
        let (span, lexeme) = self.lex_while(is_identifier_continue);

        let kind = match Keyword::try_from(lexeme) {
            Ok(keyword) => TokenKind::Keyword(keyword),
            Err(()) => TokenKind::Identifier(self.strtab.intern(lexeme)),
        };

        Token::new(span, kind)
    }

    fn lex_number(&mut self) -> Token<'f> {
        if self.matches("0x") || self.matches("0X") {
            let start_offset = self.offset;
            let start = self.bump();
            let mut end = self.bump();
            while let Some(chr) = self.peek() {
                if !is_hex_continue(chr) {
                    break;
                }
                end = self.bump();
            }
            let lexeme = &self.src[start_offset..self.offset];
            return Token::new(Span::new(start, end), TokenKind::HexLiteral(lexeme));
        }

        if self.matches("0b") || self.matches("0B") {
            let start_offset = self.offset;
            let start = self.bump();
            let mut end = self.bump();
            while let Some(chr) = self.peek() {
                if !is_binary_continue(chr) {
                    break;
                }
                end = self.bump();
            }
            let lexeme = &self.src[start_offset..self.offset];
            return Token::new(Span::new(start, end), TokenKind::BinaryLiteral(lexeme));
        }

        let (span, lexeme) = self.lex_while(is_number_continue);
        Token::new(span, TokenKind::IntegerLiteral(lexeme))
    }

    fn lex_whitespace(&mut self) -> Token<'f> {
        let (span, _) = self.lex_while(is_minijava_whitespace);
        Token::new(span, TokenKind::Whitespace)
    }

    fn lex_line_comment(&mut self) -> Token<'f> {
        let (span, _) = self.lex_while(|chr| chr != '\n');
        Token::new(span, TokenKind::Comment)
    }

    fn lex_block_comment(&mut self) -> TokenResult<'f> {
        let start = self.bump();
        let mut end = self.bump();

        loop {
            if self.matches("*/") {
                self.bump();
                end = self.bump();
                break;
            }
            match self.peek() {
                Some(_) => {
                    end = self.bump();
                }
                None => {
                    return Err(LexicalError::new(
                        Span::new(start, end),
                        ErrorKind::UnclosedComment,
                    ));
                }
            }
        }

        Ok(Token::new(Span::new(start, end), TokenKind::Comment))
    }

    fn lex_operator(&mut self) -> Option<Token<'f>> {
        for group in OPERATORS {
            for (spelling, operator) in group.iter().copied() {
                if self.matches(spelling) {
                    let start = self.position;
                    let mut end = start;
                    for _ in 0..spelling.len() {
                        end = self.bump();
                    }
                    return Some(Token::new(
                        Span::new(start, end),
                        TokenKind::Operator(operator),
                    ));
                }
            }
        }
        None
    }
}

impl<'f, 's> Iterator for Lexer<'f, 's> {
    type Item = TokenResult<'f>;

    fn next(&mut self) -> Option<Self::Item> {
        self.lex_token()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_kinds(input: &'static str) -> Vec<TokenKind<'static>> {
        let strtab = Box::leak(Box::new(StringTable::new()));
        let file = Box::leak(Box::new(AsciiFile::new(input.as_bytes()).unwrap()));
        Lexer::new(strtab, file)
            .map(|token| token.unwrap().data)
            .filter(|kind| !matches!(kind, TokenKind::Whitespace | TokenKind::Comment))
            .collect()
    }

    #[test]
    fn keywords_and_identifiers() {
        let kinds = lex_kinds("class Foo extends Bar");
        assert_eq!(kinds.len(), 4);
        assert_eq!(kinds[0], TokenKind::Keyword(Keyword::Class));
        assert_eq!(kinds[0].lexeme(), "class");
        assert!(kinds[1].is_identifier());
        assert_eq!(kinds[1].lexeme(), "Foo");
        assert_eq!(kinds[2], TokenKind::Keyword(Keyword::Extends));
        assert_eq!(kinds[3].lexeme(), "Bar");
    }

    #[test]
    fn longest_operator_wins() {
        let kinds = lex_kinds(">>>= >>> >>= >> >= >");
        let expected = [">>>=", ">>>", ">>=", ">>", ">=", ">"];
        assert_eq!(kinds.len(), expected.len());
        for (kind, expected) in kinds.iter().zip(expected.iter()) {
            assert_eq!(&kind.lexeme(), expected);
        }
    }

    #[test]
    fn number_literals_keep_their_spelling() {
        let kinds = lex_kinds("42 1_000 0xAF_12 0b1010");
        assert_eq!(kinds[0], TokenKind::IntegerLiteral("42"));
        assert_eq!(kinds[1], TokenKind::IntegerLiteral("1_000"));
        assert_eq!(kinds[2], TokenKind::HexLiteral("0xAF_12"));
        assert_eq!(kinds[3], TokenKind::BinaryLiteral("0b1010"));
    }

    #[test]
    fn comments_are_skippable_tokens() {
        let kinds = lex_kinds("a // rest of line\nb /* block\ncomment */ c");
        assert_eq!(kinds.len(), 3);
        assert_eq!(kinds[0].lexeme(), "a");
        assert_eq!(kinds[1].lexeme(), "b");
        assert_eq!(kinds[2].lexeme(), "c");
    }

    #[test]
    fn unclosed_comment_is_an_error() {
        let file = AsciiFile::new(b"/* no end").unwrap();
        let strtab = StringTable::new();
        let result: Result<Vec<_>, _> = Lexer::new(&strtab, &file).collect();
        match result {
            Err(error) => assert!(matches!(error.data, ErrorKind::UnclosedComment)),
            Ok(_) => panic!("expected an unclosed comment error"),
        }
    }

    #[test]
    fn token_positions_are_tracked() {
        let file = AsciiFile::new(b"a\n  b").unwrap();
        let strtab = StringTable::new();
        let tokens: Vec<_> = Lexer::new(&strtab, &file).map(|t| t.unwrap()).collect();
        let b = tokens
            .iter()
            .find(|token| token.data.lexeme() == "b")
            .unwrap();
        assert_eq!(b.span.start.line_number(), 2);
        assert_eq!(b.span.start.column_number(), 3);
    }

    #[test]
    fn unexpected_character() {
        let file = AsciiFile::new(b"a @ b").unwrap();
        let strtab = StringTable::new();
        let result: Result<Vec<_>, _> = Lexer::new(&strtab, &file).collect();
        match result {
            Err(error) => {
                assert!(matches!(error.data, ErrorKind::UnexpectedCharacter('@')));
                assert_eq!(error.span.start.column_number(), 3);
            }
            Ok(_) => panic!("expected a lexical error"),
        }
    }
}
