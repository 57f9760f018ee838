//! Tokenizer for computed-field snippets.
//!
//! Snippets are line oriented: a logical line ends in `Newline`, and changes
//! in leading whitespace produce `Indent`/`Dedent` pairs for block bodies.
//! Newlines inside brackets are ignored.

use crate::error::ExprError;

// ── Token ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),

    // Keywords
    True,
    False,
    None,
    And,
    Or,
    Not,
    If,
    Elif,
    Else,
    For,
    In,
    Is,
    Pass,
    Del,

    // Operators
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    SlashSlash,
    Percent,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    // Assignment
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    SlashSlashAssign,
    PercentAssign,

    // Punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Dot,
    Semicolon,

    // Layout
    Newline,
    Indent,
    Dedent,
    Eof,
}

/// A token tagged with its 1-based source line.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
}

fn keyword(ident: &str) -> Option<Token> {
    Some(match ident {
        "True" => Token::True,
        "False" => Token::False,
        "None" => Token::None,
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        "if" => Token::If,
        "elif" => Token::Elif,
        "else" => Token::Else,
        "for" => Token::For,
        "in" => Token::In,
        "is" => Token::Is,
        "pass" => Token::Pass,
        "del" => Token::Del,
        _ => return None,
    })
}

// ── Lexer ───────────────────────────────────────────────────────────

struct Lexer {
    src: Vec<char>,
    pos: usize,
    line: usize,
    depth: usize,
    indents: Vec<usize>,
    at_line_start: bool,
    out: Vec<Spanned>,
}

impl Lexer {
    fn new(src: &str) -> Self {
        Self {
            src: src.chars().collect(),
            pos: 0,
            line: 1,
            depth: 0,
            indents: vec![0],
            at_line_start: true,
            out: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.src.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<char> {
        self.src.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn eat(&mut self, ch: char) -> bool {
        if self.peek() == Some(ch) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> ExprError {
        ExprError::Syntax {
            line: self.line,
            message: message.into(),
        }
    }

    fn push(&mut self, token: Token) {
        self.out.push(Spanned {
            token,
            line: self.line,
        });
    }

    fn end_logical_line(&mut self) {
        if self
            .out
            .last()
            .is_some_and(|t| !matches!(t.token, Token::Newline | Token::Indent | Token::Dedent))
        {
            self.push(Token::Newline);
        }
    }

    /// Measure indentation at the start of a line and emit layout tokens.
    /// Blank and comment-only lines are skipped entirely.
    fn handle_indentation(&mut self) -> Result<(), ExprError> {
        let mut width = 0;
        while let Some(c) = self.peek() {
            match c {
                ' ' => width += 1,
                '\t' => width = (width / 8 + 1) * 8,
                _ => break,
            }
            self.pos += 1;
        }
        match self.peek() {
            None | Some('\n') | Some('#') => return Ok(()),
            Some('\r') if self.peek2() == Some('\n') => return Ok(()),
            _ => {}
        }
        self.at_line_start = false;

        let current = self.indents.last().copied().unwrap_or(0);
        if width > current {
            self.indents.push(width);
            self.push(Token::Indent);
        } else if width < current {
            while self.indents.last().is_some_and(|&w| w > width) {
                self.indents.pop();
                self.push(Token::Dedent);
            }
            if self.indents.last().copied() != Some(width) {
                return Err(self.error("unindent does not match any outer indentation level"));
            }
        }
        Ok(())
    }

    fn read_number(&mut self, first: char) -> Result<Token, ExprError> {
        let mut s = String::from(first);
        let mut is_float = false;
        let digits = |lx: &mut Lexer, s: &mut String| {
            while let Some(c) = lx.peek() {
                if c.is_ascii_digit() {
                    s.push(c);
                } else if c != '_' {
                    break;
                }
                lx.pos += 1;
            }
        };
        digits(self, &mut s);
        if self.peek() == Some('.') && self.peek2().is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            s.push('.');
            self.pos += 1;
            digits(self, &mut s);
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let save = self.pos;
            self.pos += 1;
            let mut exp = String::from("e");
            if let Some(sign @ ('+' | '-')) = self.peek() {
                exp.push(sign);
                self.pos += 1;
            }
            if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                s.push_str(&exp);
                digits(self, &mut s);
            } else {
                self.pos = save;
            }
        }
        if is_float {
            s.parse()
                .map(Token::Float)
                .map_err(|_| self.error(format!("invalid number literal '{s}'")))
        } else {
            s.parse()
                .map(Token::Int)
                .map_err(|_| self.error(format!("integer literal '{s}' out of range")))
        }
    }

    fn read_string(&mut self, quote: char) -> Result<Token, ExprError> {
        let mut s = String::new();
        loop {
            match self.advance() {
                None | Some('\n') => return Err(self.error("unterminated string literal")),
                Some('\\') => match self.advance() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some('r') => s.push('\r'),
                    Some('0') => s.push('\0'),
                    Some('\n') => self.line += 1,
                    Some(c) => s.push(c),
                    None => return Err(self.error("unterminated string literal")),
                },
                Some(c) if c == quote => return Ok(Token::Str(s)),
                Some(c) => s.push(c),
            }
        }
    }

    fn read_ident(&mut self, first: char) -> Token {
        let mut s = String::from(first);
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                s.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        keyword(&s).unwrap_or(Token::Ident(s))
    }

    fn with_assign(&mut self, plain: Token, assign: Token) -> Token {
        if self.eat('=') { assign } else { plain }
    }

    fn run(mut self) -> Result<Vec<Spanned>, ExprError> {
        loop {
            if self.at_line_start && self.depth == 0 {
                self.handle_indentation()?;
            }
            let Some(ch) = self.advance() else { break };
            let token = match ch {
                '\n' => {
                    self.line += 1;
                    if self.depth == 0 {
                        self.end_logical_line();
                        self.at_line_start = true;
                    }
                    continue;
                }
                ' ' | '\t' | '\r' => continue,
                '#' => {
                    while self.peek().is_some_and(|c| c != '\n') {
                        self.pos += 1;
                    }
                    continue;
                }
                '\\' if self.peek() == Some('\n') => {
                    self.pos += 1;
                    self.line += 1;
                    continue;
                }
                c if c.is_ascii_digit() => self.read_number(c)?,
                '"' | '\'' => self.read_string(ch)?,
                c if c.is_alphabetic() || c == '_' => self.read_ident(c),
                '+' => self.with_assign(Token::Plus, Token::PlusAssign),
                '-' => self.with_assign(Token::Minus, Token::MinusAssign),
                '*' => {
                    if self.eat('*') {
                        Token::StarStar
                    } else {
                        self.with_assign(Token::Star, Token::StarAssign)
                    }
                }
                '/' => {
                    if self.eat('/') {
                        self.with_assign(Token::SlashSlash, Token::SlashSlashAssign)
                    } else {
                        self.with_assign(Token::Slash, Token::SlashAssign)
                    }
                }
                '%' => self.with_assign(Token::Percent, Token::PercentAssign),
                '=' => self.with_assign(Token::Assign, Token::Eq),
                '!' if self.eat('=') => Token::Ne,
                '<' => self.with_assign(Token::Lt, Token::Le),
                '>' => self.with_assign(Token::Gt, Token::Ge),
                '(' | '[' => {
                    self.depth += 1;
                    if ch == '(' { Token::LParen } else { Token::LBracket }
                }
                ')' | ']' => {
                    self.depth = self.depth.saturating_sub(1);
                    if ch == ')' { Token::RParen } else { Token::RBracket }
                }
                ',' => Token::Comma,
                ':' => Token::Colon,
                '.' => Token::Dot,
                ';' => Token::Semicolon,
                other => return Err(self.error(format!("unexpected character '{other}'"))),
            };
            self.push(token);
        }

        self.end_logical_line();
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(Token::Dedent);
        }
        self.push(Token::Eof);
        Ok(self.out)
    }
}

/// Tokenize a multi-statement snippet.
pub fn tokenize(src: &str) -> Result<Vec<Spanned>, ExprError> {
    Lexer::new(src).run()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        tokenize(src).unwrap().into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn operators_and_literals() {
        assert_eq!(
            kinds("x //= 2 ** 3.5"),
            vec![
                Token::Ident("x".into()),
                Token::SlashSlashAssign,
                Token::Int(2),
                Token::StarStar,
                Token::Float(3.5),
                Token::Newline,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn indented_block_emits_layout_tokens() {
        let toks = kinds("for c in s:\n    n += 1\nn");
        assert!(toks.contains(&Token::Indent));
        assert!(toks.contains(&Token::Dedent));
        assert_eq!(toks.last(), Some(&Token::Eof));
    }

    #[test]
    fn newlines_inside_brackets_are_ignored() {
        let toks = kinds("[1,\n 2]");
        assert_eq!(toks.iter().filter(|t| **t == Token::Newline).count(), 1);
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let toks = kinds("# leading\n\nx = 1  # trailing\n");
        assert_eq!(
            toks,
            vec![
                Token::Ident("x".into()),
                Token::Assign,
                Token::Int(1),
                Token::Newline,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn bad_dedent_is_a_syntax_error() {
        let err = tokenize("if x:\n    a = 1\n  b = 2").unwrap_err();
        assert!(matches!(err, ExprError::Syntax { line: 3, .. }));
    }

    #[test]
    fn unterminated_string_is_reported() {
        assert!(matches!(tokenize("'abc"), Err(ExprError::Syntax { .. })));
    }
}
