//! Indentation-aware tokenizer for Python source.
//!
//! Comments and insignificant whitespace are dropped; `Newline`, `Indent` and
//! `Dedent` tokens are synthesized the way the reference tokenizer does it:
//! newlines inside brackets or after a backslash continuation are implicit line
//! joins, and blank or comment-only lines never affect indentation.

use crate::{ParseError, TextRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    False,
    None,
    True,
    And,
    As,
    Assert,
    Async,
    Await,
    Break,
    Class,
    Continue,
    Def,
    Del,
    Elif,
    Else,
    Except,
    Finally,
    For,
    From,
    Global,
    If,
    Import,
    In,
    Is,
    Lambda,
    Nonlocal,
    Not,
    Or,
    Pass,
    Raise,
    Return,
    Try,
    While,
    With,
    Yield,
}

impl Keyword {
    #[must_use]
    pub fn from_ident(ident: &str) -> Option<Keyword> {
        let kw = match ident {
            "False" => Keyword::False,
            "None" => Keyword::None,
            "True" => Keyword::True,
            "and" => Keyword::And,
            "as" => Keyword::As,
            "assert" => Keyword::Assert,
            "async" => Keyword::Async,
            "await" => Keyword::Await,
            "break" => Keyword::Break,
            "class" => Keyword::Class,
            "continue" => Keyword::Continue,
            "def" => Keyword::Def,
            "del" => Keyword::Del,
            "elif" => Keyword::Elif,
            "else" => Keyword::Else,
            "except" => Keyword::Except,
            "finally" => Keyword::Finally,
            "for" => Keyword::For,
            "from" => Keyword::From,
            "global" => Keyword::Global,
            "if" => Keyword::If,
            "import" => Keyword::Import,
            "in" => Keyword::In,
            "is" => Keyword::Is,
            "lambda" => Keyword::Lambda,
            "nonlocal" => Keyword::Nonlocal,
            "not" => Keyword::Not,
            "or" => Keyword::Or,
            "pass" => Keyword::Pass,
            "raise" => Keyword::Raise,
            "return" => Keyword::Return,
            "try" => Keyword::Try,
            "while" => Keyword::While,
            "with" => Keyword::With,
            "yield" => Keyword::Yield,
            _ => return None,
        };
        Some(kw)
    }
}

/// Returns `true` if `ident` is a reserved word and cannot be used as a name.
#[must_use]
pub fn is_keyword(ident: &str) -> bool {
    Keyword::from_ident(ident).is_some()
}

/// Returns `true` if `ident` is a syntactically valid, non-reserved identifier.
#[must_use]
pub fn is_identifier(ident: &str) -> bool {
    let mut chars = ident.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first == '_' || unicode_ident::is_xid_start(first))
        && chars.all(unicode_ident::is_xid_continue)
        && !is_keyword(ident)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Name,
    Keyword(Keyword),
    Number,
    String,
    /// A string literal with an `f` prefix.
    FString,

    Newline,
    Indent,
    Dedent,
    EndOfFile,

    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Colon,
    ColonEqual,
    Comma,
    Semicolon,
    Dot,
    Ellipsis,
    Arrow,
    At,
    AtEqual,
    Equal,

    Plus,
    PlusEqual,
    Minus,
    MinusEqual,
    Star,
    StarEqual,
    DoubleStar,
    DoubleStarEqual,
    Slash,
    SlashEqual,
    DoubleSlash,
    DoubleSlashEqual,
    Percent,
    PercentEqual,
    Amper,
    AmperEqual,
    Vbar,
    VbarEqual,
    Circumflex,
    CircumflexEqual,
    LeftShift,
    LeftShiftEqual,
    RightShift,
    RightShiftEqual,
    Tilde,

    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    EqEqual,
    NotEqual,

    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub range: TextRange,
}

impl Token {
    #[must_use]
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.range.start..self.range.end]
    }
}

// Longest operators first so that prefix matching picks the longest token.
const OPERATORS: &[(&str, TokenKind)] = &[
    ("**=", TokenKind::DoubleStarEqual),
    ("//=", TokenKind::DoubleSlashEqual),
    ("<<=", TokenKind::LeftShiftEqual),
    (">>=", TokenKind::RightShiftEqual),
    ("...", TokenKind::Ellipsis),
    ("->", TokenKind::Arrow),
    (":=", TokenKind::ColonEqual),
    ("**", TokenKind::DoubleStar),
    ("//", TokenKind::DoubleSlash),
    ("<<", TokenKind::LeftShift),
    (">>", TokenKind::RightShift),
    ("<=", TokenKind::LessEqual),
    (">=", TokenKind::GreaterEqual),
    ("==", TokenKind::EqEqual),
    ("!=", TokenKind::NotEqual),
    ("+=", TokenKind::PlusEqual),
    ("-=", TokenKind::MinusEqual),
    ("*=", TokenKind::StarEqual),
    ("/=", TokenKind::SlashEqual),
    ("%=", TokenKind::PercentEqual),
    ("&=", TokenKind::AmperEqual),
    ("|=", TokenKind::VbarEqual),
    ("^=", TokenKind::CircumflexEqual),
    ("@=", TokenKind::AtEqual),
    ("(", TokenKind::LParen),
    (")", TokenKind::RParen),
    ("[", TokenKind::LBracket),
    ("]", TokenKind::RBracket),
    ("{", TokenKind::LBrace),
    ("}", TokenKind::RBrace),
    (":", TokenKind::Colon),
    (",", TokenKind::Comma),
    (";", TokenKind::Semicolon),
    (".", TokenKind::Dot),
    ("@", TokenKind::At),
    ("=", TokenKind::Equal),
    ("+", TokenKind::Plus),
    ("-", TokenKind::Minus),
    ("*", TokenKind::Star),
    ("/", TokenKind::Slash),
    ("%", TokenKind::Percent),
    ("&", TokenKind::Amper),
    ("|", TokenKind::Vbar),
    ("^", TokenKind::Circumflex),
    ("~", TokenKind::Tilde),
    ("<", TokenKind::Less),
    (">", TokenKind::Greater),
];

const TAB_SIZE: usize = 8;

/// Tokenize a whole module.
pub fn lex(text: &str) -> (Vec<Token>, Vec<ParseError>) {
    Lexer::new(text, 0, 0).run()
}

/// Tokenize an expression fragment that starts at byte `offset` of the
/// enclosing file (used for f-string replacement fields).
///
/// Newlines never terminate the fragment and no indentation tokens are produced.
pub(crate) fn lex_fragment(fragment: &str, offset: usize) -> (Vec<Token>, Vec<ParseError>) {
    Lexer::new(fragment, offset, 1).run()
}

struct Lexer<'a> {
    text: &'a str,
    pos: usize,
    base: usize,
    paren_depth: usize,
    indents: Vec<usize>,
    at_line_start: bool,
    tokens: Vec<Token>,
    errors: Vec<ParseError>,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str, base: usize, paren_depth: usize) -> Self {
        Self {
            text,
            pos: 0,
            base,
            paren_depth,
            indents: vec![0],
            at_line_start: paren_depth == 0,
            tokens: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn run(mut self) -> (Vec<Token>, Vec<ParseError>) {
        while self.pos < self.text.len() {
            if self.at_line_start {
                self.at_line_start = false;
                if self.handle_indentation() {
                    continue;
                }
            }
            self.next_token();
        }

        let end = self.text.len();
        if self.paren_depth == 0 && self.line_has_tokens() {
            self.push(TokenKind::Newline, end, end);
        }
        if self.paren_depth == 0 {
            while self.indents.len() > 1 {
                self.indents.pop();
                self.push(TokenKind::Dedent, end, end);
            }
        }
        self.push(TokenKind::EndOfFile, end, end);
        (self.tokens, self.errors)
    }

    fn push(&mut self, kind: TokenKind, start: usize, end: usize) {
        self.tokens.push(Token {
            kind,
            range: TextRange::new(self.base + start, self.base + end),
        });
    }

    fn error(&mut self, message: impl Into<String>, start: usize, end: usize) {
        self.errors.push(ParseError {
            message: message.into(),
            range: TextRange::new(self.base + start, self.base + end),
        });
    }

    fn line_has_tokens(&self) -> bool {
        matches!(
            self.tokens.last().map(|t| t.kind),
            Some(kind) if !matches!(kind, TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent)
        )
    }

    fn peek_char(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn peek_char_at(&self, byte_offset: usize) -> Option<char> {
        self.text.get(self.pos + byte_offset..)?.chars().next()
    }

    /// Measures the indentation of the line starting at `self.pos`.
    ///
    /// Returns `true` if the whole line was consumed (blank or comment-only).
    fn handle_indentation(&mut self) -> bool {
        let line_start = self.pos;
        let mut width = 0usize;
        let bytes = self.text.as_bytes();
        let mut idx = self.pos;
        while idx < bytes.len() {
            match bytes[idx] {
                b' ' => width += 1,
                b'\t' => width = (width / TAB_SIZE + 1) * TAB_SIZE,
                b'\x0c' => width = 0,
                _ => break,
            }
            idx += 1;
        }

        match bytes.get(idx) {
            None => {
                self.pos = idx;
                return true;
            }
            Some(b'\n') | Some(b'\r') | Some(b'#') => {
                // Blank / comment-only lines don't take part in indentation.
                self.pos = idx;
                self.skip_comment();
                self.consume_line_break();
                self.at_line_start = true;
                return true;
            }
            Some(b'\\') => {
                // A continuation at the start of a line; let the regular path deal with it.
            }
            _ => {}
        }

        self.pos = idx;
        let current = *self.indents.last().unwrap_or(&0);
        if width > current {
            self.indents.push(width);
            self.push(TokenKind::Indent, line_start, idx);
        } else if width < current {
            while self.indents.len() > 1 && *self.indents.last().unwrap_or(&0) > width {
                self.indents.pop();
                self.push(TokenKind::Dedent, idx, idx);
            }
            if *self.indents.last().unwrap_or(&0) != width {
                self.error(
                    "unindent does not match any outer indentation level",
                    line_start,
                    idx,
                );
                self.indents.push(width);
            }
        }
        false
    }

    fn skip_comment(&mut self) {
        if self.peek_char() == Some('#') {
            while let Some(ch) = self.peek_char() {
                if ch == '\n' || ch == '\r' {
                    break;
                }
                self.pos += ch.len_utf8();
            }
        }
    }

    fn consume_line_break(&mut self) -> bool {
        match self.peek_char() {
            Some('\r') => {
                self.pos += 1;
                if self.peek_char() == Some('\n') {
                    self.pos += 1;
                }
                true
            }
            Some('\n') => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn next_token(&mut self) {
        let Some(ch) = self.peek_char() else {
            return;
        };
        let start = self.pos;

        match ch {
            ' ' | '\t' | '\x0c' => {
                self.pos += 1;
            }
            '#' => self.skip_comment(),
            '\n' | '\r' => {
                self.consume_line_break();
                if self.paren_depth == 0 {
                    if self.line_has_tokens() {
                        self.push(TokenKind::Newline, start, start);
                    }
                    self.at_line_start = true;
                }
            }
            '\\' => {
                self.pos += 1;
                if !self.consume_line_break() {
                    self.error("unexpected character after line continuation", start, self.pos);
                }
            }
            '0'..='9' => self.number(),
            '.' if matches!(self.peek_char_at(1), Some('0'..='9')) => self.number(),
            '"' | '\'' => self.string(start, false),
            _ if ch == '_' || unicode_ident::is_xid_start(ch) => {
                if let Some(is_fstring) = self.string_prefix() {
                    self.string(start, is_fstring);
                } else {
                    self.identifier();
                }
            }
            _ => self.operator(),
        }
    }

    fn identifier(&mut self) {
        let start = self.pos;
        while let Some(ch) = self.peek_char() {
            if ch == '_' || unicode_ident::is_xid_continue(ch) {
                self.pos += ch.len_utf8();
            } else {
                break;
            }
        }
        let kind = match Keyword::from_ident(&self.text[start..self.pos]) {
            Some(kw) => TokenKind::Keyword(kw),
            None => TokenKind::Name,
        };
        self.push(kind, start, self.pos);
    }

    /// If a string prefix (`r`, `b`, `f`, `rb`, ...) followed by a quote starts at
    /// the current position, consumes the prefix and reports whether it is an
    /// f-string.
    fn string_prefix(&mut self) -> Option<bool> {
        let rest = &self.text[self.pos..];
        let prefix_len = rest
            .bytes()
            .take(3)
            .take_while(|b| matches!(b, b'r' | b'R' | b'b' | b'B' | b'u' | b'U' | b'f' | b'F'))
            .count();
        if prefix_len == 0 || prefix_len > 2 {
            return None;
        }
        if !matches!(rest.as_bytes().get(prefix_len), Some(b'"') | Some(b'\'')) {
            return None;
        }
        let prefix = &rest[..prefix_len];
        let is_fstring = prefix.contains(['f', 'F']);
        self.pos += prefix_len;
        Some(is_fstring)
    }

    fn string(&mut self, start: usize, is_fstring: bool) {
        let quote = self.text.as_bytes()[self.pos];
        let triple = self.text[self.pos..].as_bytes().starts_with(&[quote, quote, quote]);
        self.pos += if triple { 3 } else { 1 };

        let kind = if is_fstring {
            TokenKind::FString
        } else {
            TokenKind::String
        };

        loop {
            let Some(ch) = self.peek_char() else {
                self.error("unterminated string literal", start, self.pos);
                self.push(kind, start, self.pos);
                return;
            };
            match ch {
                '\\' => {
                    self.pos += 1;
                    if let Some(escaped) = self.peek_char() {
                        self.pos += escaped.len_utf8();
                    }
                }
                '\n' | '\r' if !triple => {
                    self.error("unterminated string literal", start, self.pos);
                    self.push(kind, start, self.pos);
                    return;
                }
                _ if ch as u32 == u32::from(quote) => {
                    if !triple {
                        self.pos += 1;
                        break;
                    }
                    if self.text[self.pos..]
                        .as_bytes()
                        .starts_with(&[quote, quote, quote])
                    {
                        self.pos += 3;
                        break;
                    }
                    self.pos += 1;
                }
                _ => self.pos += ch.len_utf8(),
            }
        }
        self.push(kind, start, self.pos);
    }

    fn number(&mut self) {
        let start = self.pos;
        while let Some(ch) = self.peek_char() {
            match ch {
                '0'..='9' | 'a'..='z' | 'A'..='Z' | '_' | '.' => {
                    let is_exponent = matches!(ch, 'e' | 'E');
                    self.pos += 1;
                    let is_hex = self.text[start..self.pos].starts_with("0x")
                        || self.text[start..self.pos].starts_with("0X");
                    if is_exponent && !is_hex && matches!(self.peek_char(), Some('+' | '-')) {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
        self.push(TokenKind::Number, start, self.pos);
    }

    fn operator(&mut self) {
        let start = self.pos;
        let rest = &self.text[self.pos..];
        for (op, kind) in OPERATORS {
            if rest.starts_with(op) {
                self.pos += op.len();
                match kind {
                    TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => {
                        self.paren_depth += 1;
                    }
                    TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                        self.paren_depth = self.paren_depth.saturating_sub(1);
                    }
                    _ => {}
                }
                self.push(*kind, start, self.pos);
                return;
            }
        }

        let ch = rest.chars().next().unwrap_or('\0');
        self.pos += ch.len_utf8().max(1);
        self.error(format!("unexpected character {ch:?}"), start, self.pos);
        self.push(TokenKind::Unknown, start, self.pos);
    }
}
