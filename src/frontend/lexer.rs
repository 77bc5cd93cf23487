use std::{
    collections::{BTreeMap, VecDeque},
    str::Chars,
};

use itertools::{PeekNth, peek_nth};
use once_cell::sync::Lazy;
use strum::EnumString;

use crate::frontend::SourceFile;

#[derive(Debug)]
pub struct Lexer<'source> {
    source: &'source SourceFile,
    position: usize,
    line_number: usize,
    line_start: usize,
    chars: PeekNth<Chars<'source>>,
    peek_buffer: VecDeque<Token>,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /* Words */
    Keyword(Keyword), // function
    Identifier,       // _compiled_program_main

    /* Literals */
    IntegerLiteral, // -1
    StringLiteral,  // "hello, world"

    /* Delimiters */
    OpenParen,    // (
    CloseParen,   // )
    OpenBracket,  // [
    CloseBracket, // ]
    OpenBrace,    // {
    CloseBrace,   // }
    Semicolon,    // ;
    Comma,        // ,
    Colon,        // :
    Equals,       // =

    /* Binary Ops */
    Plus,                 // +
    Minus,                // -
    Asterisk,             // *
    Divide,               // /
    Modulus,              // %
    BitwiseXor,           // ^
    DoubleEquals,         // ==
    NotEquals,            // !=
    LessThan,             // <
    LessThanOrEqualTo,    // <=
    GreaterThan,          // >
    GreaterThanOrEqualTo, // >=
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Keyword {
    Function,
    Let,
    Const,
    Goto,
    If,
    Return,
    #[strum(serialize = "MEM")]
    Mem,
}

/// Table of single char tokens (matched after longer sequences are checked for)
static SINGLE_TOKENS: Lazy<BTreeMap<char, TokenKind>> = Lazy::new(|| {
    BTreeMap::from([
        ('(', TokenKind::OpenParen),
        (')', TokenKind::CloseParen),
        ('[', TokenKind::OpenBracket),
        (']', TokenKind::CloseBracket),
        ('{', TokenKind::OpenBrace),
        ('}', TokenKind::CloseBrace),
        (';', TokenKind::Semicolon),
        (',', TokenKind::Comma),
        (':', TokenKind::Colon),
        ('=', TokenKind::Equals),
        ('+', TokenKind::Plus),
        ('-', TokenKind::Minus),
        ('*', TokenKind::Asterisk),
        ('/', TokenKind::Divide),
        ('%', TokenKind::Modulus),
        ('^', TokenKind::BitwiseXor),
        ('<', TokenKind::LessThan),
        ('>', TokenKind::GreaterThan),
    ])
});

#[derive(Debug, Clone, Copy)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source SourceFile) -> Self {
        Self {
            source,
            chars: peek_nth(source.contents.chars()),
            position: 0,
            line_number: 0,
            line_start: 0,
            peek_buffer: VecDeque::new(),
        }
    }

    pub fn source(&self) -> &'source SourceFile {
        self.source
    }

    pub fn line_number(&self) -> usize {
        self.line_number
    }

    pub fn column(&self) -> usize {
        self.position - self.line_start + 1
    }

    fn report_fatal_error(&self, message: &str) -> ! {
        eprintln!(
            "Fatal error reported in Lexer ({}:{}:{}):",
            self.source.origin,
            self.line_number + 1,
            self.column()
        );
        eprintln!("{message}");
        std::process::exit(1);
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.position += c.len_utf8();

        if c == '\n' {
            self.line_number += 1;
            self.line_start = self.position;
        }

        Some(c)
    }

    fn ignore_whitespace(&mut self) {
        while self.chars.peek().is_some_and(|c| c.is_ascii_whitespace()) {
            self.advance();
        }
    }

    fn ignore_line(&mut self) {
        while self.chars.peek().is_some_and(|c| *c != '\n') {
            self.advance();
        }
    }

    fn read_string(&mut self) -> Token {
        let start_position = self.position;

        // Opening quote
        self.advance();

        while let Some(c) = self.chars.peek().copied() {
            if c == '\n' {
                self.report_fatal_error("Reached end of line while reading string literal");
            }

            self.advance();

            // Skip whatever is escaped, including quotes
            if c == '\\' {
                self.advance();
                continue;
            }

            if c == '"' {
                return Token {
                    span: self.new_span(start_position),
                    kind: TokenKind::StringLiteral,
                };
            }
        }

        self.report_fatal_error("Reached end of file while reading string literal")
    }

    // Keyword or identifier
    fn read_word(&mut self) -> Token {
        let start_position = self.position;

        while self
            .chars
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || *c == '_')
        {
            self.advance();
        }

        let span = self.new_span(start_position);
        let kind = match self.source.value_of_span(span).parse() {
            Ok(keyword) => TokenKind::Keyword(keyword),
            Err(_) => TokenKind::Identifier,
        };

        Token { kind, span }
    }

    fn read_number(&mut self) -> Token {
        let start_position = self.position;

        // Sign or first digit
        self.advance();

        while self.chars.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }

        Token {
            kind: TokenKind::IntegerLiteral,
            span: self.new_span(start_position),
        }
    }

    fn read_single(&mut self, kind: TokenKind) -> Token {
        let start_position = self.position;

        self.advance();

        Token {
            kind,
            span: self.new_span(start_position),
        }
    }

    fn read_double(&mut self, kind: TokenKind) -> Token {
        let start_position = self.position;

        self.advance();
        self.advance();

        Token {
            kind,
            span: self.new_span(start_position),
        }
    }

    fn new_span(&self, start: usize) -> Span {
        Span {
            start,
            end: self.position,
        }
    }

    pub fn peek(&mut self) -> Option<Token> {
        if !self.peek_buffer.is_empty() {
            return self.peek_buffer.front().cloned();
        }

        if let Some(token) = self.next() {
            self.peek_buffer.push_back(token);
        }

        self.peek_buffer.front().cloned()
    }

    pub fn next(&mut self) -> Option<Token> {
        if !self.peek_buffer.is_empty() {
            return self.peek_buffer.pop_front();
        }

        while let Some(c) = self.chars.peek().copied() {
            if !c.is_ascii() {
                self.report_fatal_error(&format!("Unexpected non-ascii character in stream: `{c}`"))
            }

            let token = match c {
                // Ignore whitespace
                c if c.is_ascii_whitespace() => {
                    self.ignore_whitespace();
                    continue;
                }
                // Ignore comments
                '/' if self.chars.peek_nth(1).is_some_and(|c| *c == '/') => {
                    self.ignore_line();
                    continue;
                }

                '"' => self.read_string(),

                // Integer literals, where a minus directly before a digit is a sign
                n if n.is_ascii_digit() => self.read_number(),
                '-' if self.chars.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) => {
                    self.read_number()
                }

                // Identifiers and keywords
                a if a.is_ascii_alphabetic() || a == '_' => self.read_word(),

                // Double Equals (==)
                '=' if self.chars.peek_nth(1).is_some_and(|c| *c == '=') => {
                    self.read_double(TokenKind::DoubleEquals)
                }
                // Not Equals (!=)
                '!' if self.chars.peek_nth(1).is_some_and(|c| *c == '=') => {
                    self.read_double(TokenKind::NotEquals)
                }
                // Less than or equal (<=)
                '<' if self.chars.peek_nth(1).is_some_and(|c| *c == '=') => {
                    self.read_double(TokenKind::LessThanOrEqualTo)
                }
                // Greater than or equal (>=)
                '>' if self.chars.peek_nth(1).is_some_and(|c| *c == '=') => {
                    self.read_double(TokenKind::GreaterThanOrEqualTo)
                }

                s => match SINGLE_TOKENS.get(&s) {
                    Some(kind) => self.read_single(*kind),
                    None => {
                        self.report_fatal_error(&format!("Unexpected character in stream: `{s}`"))
                    }
                },
            };

            return Some(token);
        }

        None
    }
}
