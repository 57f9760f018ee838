//! AST and recursive-descent parser.
//!
//! Operator precedence (lowest → highest):
//!   conditional  →  or  →  and  →  not  →  comparison  →  additive  →
//!   multiplicative  →  unary  →  power  →  postfix  →  primary

use super::lexer::{self, Spanned, Token};
use super::value::Value;
use crate::error::ExprError;

// ── AST ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Rem,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Is,
    IsNot,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Name(String),
    List(Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(Box<Expr>, Vec<(CmpOp, Expr)>),
    Conditional {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
    Call(String, Vec<Expr>),
    Method {
        receiver: Box<Expr>,
        name: String,
        args: Vec<Expr>,
    },
    Index(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    /// `a = b = value`; targets in source order.
    Assign {
        targets: Vec<String>,
        value: Expr,
    },
    AugAssign {
        target: String,
        op: BinOp,
        value: Expr,
    },
    /// `target: annotation [= value]`; the annotation is discarded.
    AnnAssign {
        target: String,
        value: Option<Expr>,
    },
    If {
        branches: Vec<(Expr, Vec<Stmt>)>,
        orelse: Vec<Stmt>,
    },
    For {
        var: String,
        iter: Expr,
        body: Vec<Stmt>,
    },
    Pass,
    Del(Vec<String>),
}

/// A parsed snippet.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub body: Vec<Stmt>,
}

// ── Parser ──────────────────────────────────────────────────────────

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Spanned>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).map(|t| &t.token).unwrap_or(&Token::Eof)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens
            .get(self.pos + offset)
            .map(|t| &t.token)
            .unwrap_or(&Token::Eof)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn advance(&mut self) -> Token {
        let t = self.peek().clone();
        self.pos += 1;
        t
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == expected {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> ExprError {
        ExprError::Syntax {
            line: self.line(),
            message: message.into(),
        }
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<(), ExprError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(format!("expected {what}, found {:?}", self.peek())))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, ExprError> {
        match self.advance() {
            Token::Ident(name) => Ok(name),
            other => {
                self.pos -= 1;
                Err(self.error(format!("expected {what}, found {other:?}")))
            }
        }
    }

    // ── Statements ──────────────────────────────────────────────────

    fn parse_program(&mut self) -> Result<Program, ExprError> {
        let mut body = Vec::new();
        loop {
            while matches!(self.peek(), Token::Newline | Token::Semicolon) {
                self.pos += 1;
            }
            match self.peek() {
                Token::Eof => break,
                Token::Indent => return Err(self.error("unexpected indent")),
                _ => body.extend(self.parse_statement()?),
            }
        }
        Ok(Program { body })
    }

    /// One compound statement, or a `;`-separated run of simple statements
    /// ending in a newline.
    fn parse_statement(&mut self) -> Result<Vec<Stmt>, ExprError> {
        match self.peek() {
            Token::If => Ok(vec![self.parse_if()?]),
            Token::For => Ok(vec![self.parse_for()?]),
            _ => self.parse_simple_line(),
        }
    }

    fn parse_simple_line(&mut self) -> Result<Vec<Stmt>, ExprError> {
        let mut stmts = vec![self.parse_simple()?];
        while self.eat(&Token::Semicolon) {
            if matches!(self.peek(), Token::Newline | Token::Eof) {
                break;
            }
            stmts.push(self.parse_simple()?);
        }
        match self.peek() {
            Token::Newline => {
                self.pos += 1;
                Ok(stmts)
            }
            Token::Eof | Token::Dedent => Ok(stmts),
            other => Err(self.error(format!("unexpected {other:?} after statement"))),
        }
    }

    fn parse_suite(&mut self) -> Result<Vec<Stmt>, ExprError> {
        self.expect(&Token::Colon, "':'")?;
        if !self.eat(&Token::Newline) {
            return self.parse_simple_line();
        }
        self.expect(&Token::Indent, "an indented block")?;
        let mut body = Vec::new();
        loop {
            while matches!(self.peek(), Token::Newline | Token::Semicolon) {
                self.pos += 1;
            }
            match self.peek() {
                Token::Dedent => {
                    self.pos += 1;
                    break;
                }
                Token::Eof => break,
                _ => body.extend(self.parse_statement()?),
            }
        }
        Ok(body)
    }

    fn parse_if(&mut self) -> Result<Stmt, ExprError> {
        self.expect(&Token::If, "'if'")?;
        let mut branches = Vec::new();
        let test = self.parse_expr()?;
        branches.push((test, self.parse_suite()?));
        let mut orelse = Vec::new();
        loop {
            if self.eat(&Token::Elif) {
                let test = self.parse_expr()?;
                branches.push((test, self.parse_suite()?));
            } else if self.eat(&Token::Else) {
                orelse = self.parse_suite()?;
                break;
            } else {
                break;
            }
        }
        Ok(Stmt::If { branches, orelse })
    }

    fn parse_for(&mut self) -> Result<Stmt, ExprError> {
        self.expect(&Token::For, "'for'")?;
        let var = self.expect_ident("a loop variable")?;
        self.expect(&Token::In, "'in'")?;
        let iter = self.parse_expr()?;
        let body = self.parse_suite()?;
        Ok(Stmt::For { var, iter, body })
    }

    fn parse_simple(&mut self) -> Result<Stmt, ExprError> {
        match self.peek() {
            Token::Pass => {
                self.pos += 1;
                return Ok(Stmt::Pass);
            }
            Token::Del => {
                self.pos += 1;
                let mut names = vec![self.expect_ident("a name after 'del'")?];
                while self.eat(&Token::Comma) {
                    names.push(self.expect_ident("a name after ','")?);
                }
                return Ok(Stmt::Del(names));
            }
            _ => {}
        }

        let first = self.parse_expr()?;
        let aug = match self.peek() {
            Token::PlusAssign => Some(BinOp::Add),
            Token::MinusAssign => Some(BinOp::Sub),
            Token::StarAssign => Some(BinOp::Mul),
            Token::SlashAssign => Some(BinOp::Div),
            Token::SlashSlashAssign => Some(BinOp::FloorDiv),
            Token::PercentAssign => Some(BinOp::Rem),
            _ => None,
        };
        if let Some(op) = aug {
            let target = self.assign_target(first)?;
            self.pos += 1;
            let value = self.parse_expr()?;
            return Ok(Stmt::AugAssign { target, op, value });
        }

        match self.peek() {
            Token::Assign => {
                let mut targets = vec![self.assign_target(first)?];
                self.pos += 1;
                let mut value = self.parse_expr()?;
                while self.eat(&Token::Assign) {
                    targets.push(self.assign_target(value)?);
                    value = self.parse_expr()?;
                }
                Ok(Stmt::Assign { targets, value })
            }
            Token::Colon => {
                let target = self.assign_target(first)?;
                self.pos += 1;
                self.parse_expr()?;
                let value = if self.eat(&Token::Assign) {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                Ok(Stmt::AnnAssign { target, value })
            }
            _ => Ok(Stmt::Expr(first)),
        }
    }

    fn assign_target(&self, expr: Expr) -> Result<String, ExprError> {
        match expr {
            Expr::Name(name) => Ok(name),
            other => Err(self.error(format!("cannot assign to {}", describe(&other)))),
        }
    }

    // ── Expressions ─────────────────────────────────────────────────

    fn parse_expr(&mut self) -> Result<Expr, ExprError> {
        let body = self.parse_or()?;
        if self.eat(&Token::If) {
            let test = self.parse_or()?;
            self.expect(&Token::Else, "'else' in conditional expression")?;
            let orelse = self.parse_expr()?;
            return Ok(Expr::Conditional {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            });
        }
        Ok(body)
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Token::Or) {
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_not()?;
        while self.eat(&Token::And) {
            let rhs = self.parse_not()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, ExprError> {
        if self.eat(&Token::Not) {
            let operand = self.parse_not()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExprError> {
        let lhs = self.parse_additive()?;
        let mut ops = Vec::new();
        loop {
            let (op, width) = match (self.peek(), self.peek_at(1)) {
                (Token::Eq, _) => (CmpOp::Eq, 1),
                (Token::Ne, _) => (CmpOp::Ne, 1),
                (Token::Lt, _) => (CmpOp::Lt, 1),
                (Token::Le, _) => (CmpOp::Le, 1),
                (Token::Gt, _) => (CmpOp::Gt, 1),
                (Token::Ge, _) => (CmpOp::Ge, 1),
                (Token::In, _) => (CmpOp::In, 1),
                (Token::Not, Token::In) => (CmpOp::NotIn, 2),
                (Token::Is, Token::Not) => (CmpOp::IsNot, 2),
                (Token::Is, _) => (CmpOp::Is, 1),
                _ => break,
            };
            self.pos += width;
            ops.push((op, self.parse_additive()?));
        }
        if ops.is_empty() {
            Ok(lhs)
        } else {
            Ok(Expr::Compare(Box::new(lhs), ops))
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::SlashSlash => BinOp::FloorDiv,
                Token::Percent => BinOp::Rem,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        let op = match self.peek() {
            Token::Minus => UnaryOp::Neg,
            Token::Plus => UnaryOp::Pos,
            _ => return self.parse_power(),
        };
        self.pos += 1;
        let operand = self.parse_unary()?;
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    fn parse_power(&mut self) -> Result<Expr, ExprError> {
        let base = self.parse_postfix()?;
        if self.eat(&Token::StarStar) {
            let exp = self.parse_unary()?;
            return Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exp)));
        }
        Ok(base)
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, ExprError> {
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            if self.eat(&Token::Comma) {
                if self.eat(&Token::RParen) {
                    break;
                }
                continue;
            }
            self.expect(&Token::RParen, "')'")?;
            break;
        }
        Ok(args)
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Token::LParen => {
                    self.pos += 1;
                    let args = self.parse_args()?;
                    expr = match expr {
                        Expr::Name(name) => Expr::Call(name, args),
                        Expr::Method { receiver, name, args: prev } if prev.is_empty() => {
                            Expr::Method {
                                receiver,
                                name,
                                args,
                            }
                        }
                        other => {
                            return Err(self.error(format!("{} is not callable", describe(&other))));
                        }
                    };
                }
                Token::LBracket => {
                    self.pos += 1;
                    let index = self.parse_expr()?;
                    self.expect(&Token::RBracket, "']'")?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                Token::Dot => {
                    self.pos += 1;
                    let name = self.expect_ident("an attribute name")?;
                    if self.peek() != &Token::LParen {
                        return Err(self.error(format!("attribute access '.{name}' must be a call")));
                    }
                    expr = Expr::Method {
                        receiver: Box::new(expr),
                        name,
                        args: Vec::new(),
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        let line = self.line();
        match self.advance() {
            Token::Int(n) => Ok(Expr::Literal(Value::Int(n))),
            Token::Float(x) => Ok(Expr::Literal(Value::Float(x))),
            Token::Str(s) => {
                // Adjacent literals concatenate.
                let mut s = s;
                while let Token::Str(next) = self.peek() {
                    s.push_str(next);
                    self.pos += 1;
                }
                Ok(Expr::Literal(Value::Str(s)))
            }
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::None => Ok(Expr::Literal(Value::None)),
            Token::Ident(name) => Ok(Expr::Name(name)),
            Token::LParen => {
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::LBracket => {
                let mut items = Vec::new();
                if !self.eat(&Token::RBracket) {
                    loop {
                        items.push(self.parse_expr()?);
                        if self.eat(&Token::Comma) {
                            if self.eat(&Token::RBracket) {
                                break;
                            }
                            continue;
                        }
                        self.expect(&Token::RBracket, "']'")?;
                        break;
                    }
                }
                Ok(Expr::List(items))
            }
            other => Err(ExprError::Syntax {
                line,
                message: format!("unexpected {other:?}"),
            }),
        }
    }
}

fn describe(expr: &Expr) -> &'static str {
    match expr {
        Expr::Literal(_) => "literal",
        Expr::Name(_) => "name",
        Expr::List(_) => "list display",
        Expr::Call(..) | Expr::Method { .. } => "function call",
        Expr::Index(..) => "subscript",
        Expr::Conditional { .. } => "conditional expression",
        Expr::Compare(..) => "comparison",
        _ => "expression",
    }
}

// ── Entry points ────────────────────────────────────────────────────

/// Parse a multi-statement snippet.
pub fn parse_program(src: &str) -> Result<Program, ExprError> {
    Parser::new(lexer::tokenize(src)?).parse_program()
}
