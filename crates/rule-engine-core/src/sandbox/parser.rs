//! 语法分析
//!
//! 递归下降解析，优先级从低到高：三元 `?:`、`??`、`||`、`&&`、相等、比较、
//! 拼接 `.`、加减、乘除取模、一元运算、下标。

use super::ast::{BinaryOp, Expr, LogicalOp, Program, Stmt, UnaryOp};
use super::lexer::Token;
use crate::error::{Result, RuleError};
use serde_json::{Value, json};

pub struct Parser {
    tokens: Vec<Token>,
    cursor: usize,
    depth: usize,
    max_depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>, max_depth: usize) -> Self {
        Self {
            tokens,
            cursor: 0,
            depth: 0,
            max_depth,
        }
    }

    /// 解析单个表达式规则，允许以分号结尾
    pub fn parse_expression_program(mut self) -> Result<Program> {
        let expr = self.expression()?;
        self.eat(&Token::Semicolon);
        self.expect_end()?;
        Ok(Program::Expression(expr))
    }

    /// 解析脚本规则
    pub fn parse_script_program(mut self) -> Result<Program> {
        let mut stmts = Vec::new();
        while self.peek().is_some() {
            stmts.push(self.statement()?);
        }
        Ok(Program::Script(stmts))
    }

    // ==================== 游标操作 ====================

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.cursor + offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.cursor).cloned();
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<()> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(&format!("期望 {expected:?}")))
        }
    }

    fn expect_end(&self) -> Result<()> {
        match self.peek() {
            None => Ok(()),
            Some(_) => Err(self.error("表达式之后存在多余内容")),
        }
    }

    fn error(&self, message: &str) -> RuleError {
        match self.peek() {
            Some(token) => RuleError::ParseError(format!(
                "{message}，第 {} 个 token 处为 {token:?}",
                self.cursor
            )),
            None => RuleError::ParseError(format!("{message}，源码意外结束")),
        }
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(RuleError::RestrictedOperation(format!(
                "嵌套层级超过上限 {}",
                self.max_depth
            )));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    // ==================== 语句 ====================

    fn statement(&mut self) -> Result<Stmt> {
        self.enter()?;
        let stmt = self.statement_inner();
        self.leave();
        stmt
    }

    fn statement_inner(&mut self) -> Result<Stmt> {
        match self.peek() {
            Some(token) if token.is_keyword("return") => {
                self.advance();
                if self.eat(&Token::Semicolon) || self.peek().is_none() {
                    return Ok(Stmt::Return(None));
                }
                let expr = self.expression()?;
                self.end_of_statement()?;
                Ok(Stmt::Return(Some(expr)))
            }
            Some(token) if token.is_keyword("if") => {
                self.advance();
                self.expect(&Token::LParen)?;
                let condition = self.expression()?;
                self.expect(&Token::RParen)?;
                let then = self.block()?;
                let otherwise = if self.peek().is_some_and(|t| t.is_keyword("else")) {
                    self.advance();
                    self.block()?
                } else if self.peek().is_some_and(|t| t.is_keyword("elseif")) {
                    // elseif 视为 else { if ... }
                    self.tokens[self.cursor] = Token::Ident("if".to_string());
                    vec![self.statement()?]
                } else {
                    Vec::new()
                };
                Ok(Stmt::If {
                    condition,
                    then,
                    otherwise,
                })
            }
            Some(Token::Variable(name)) if self.peek_at(1) == Some(&Token::Assign) => {
                let name = name.clone();
                self.cursor += 2;
                let value = self.expression()?;
                self.end_of_statement()?;
                Ok(Stmt::Assign { name, value })
            }
            Some(Token::Semicolon) => {
                self.advance();
                Ok(Stmt::Expr(Expr::Literal(Value::Null)))
            }
            Some(_) => {
                let expr = self.expression()?;
                self.end_of_statement()?;
                Ok(Stmt::Expr(expr))
            }
            None => Err(self.error("期望语句")),
        }
    }

    fn end_of_statement(&mut self) -> Result<()> {
        if self.eat(&Token::Semicolon) || self.peek().is_none() || self.peek() == Some(&Token::RBrace)
        {
            Ok(())
        } else {
            Err(self.error("语句缺少分号"))
        }
    }

    fn block(&mut self) -> Result<Vec<Stmt>> {
        if self.eat(&Token::LBrace) {
            let mut stmts = Vec::new();
            while !self.eat(&Token::RBrace) {
                if self.peek().is_none() {
                    return Err(self.error("代码块未闭合"));
                }
                stmts.push(self.statement()?);
            }
            Ok(stmts)
        } else {
            Ok(vec![self.statement()?])
        }
    }

    // ==================== 表达式 ====================

    pub fn expression(&mut self) -> Result<Expr> {
        self.enter()?;
        let expr = self.ternary();
        self.leave();
        expr
    }

    fn ternary(&mut self) -> Result<Expr> {
        let condition = self.coalesce()?;
        if !self.eat(&Token::Question) {
            return Ok(condition);
        }
        let then = if self.eat(&Token::Colon) {
            None
        } else {
            let then = self.expression()?;
            self.expect(&Token::Colon)?;
            Some(Box::new(then))
        };
        let otherwise = self.expression()?;
        Ok(Expr::Ternary {
            condition: Box::new(condition),
            then,
            otherwise: Box::new(otherwise),
        })
    }

    fn coalesce(&mut self) -> Result<Expr> {
        let left = self.logical_or()?;
        if self.eat(&Token::Coalesce) {
            // 右结合
            self.enter()?;
            let right = self.coalesce();
            self.leave();
            return Ok(Expr::Coalesce {
                left: Box::new(left),
                right: Box::new(right?),
            });
        }
        Ok(left)
    }

    fn logical_or(&mut self) -> Result<Expr> {
        let mut left = self.logical_and()?;
        while self.eat(&Token::Or) || self.eat_keyword("or") {
            let right = self.logical_and()?;
            left = Expr::Logical {
                op: LogicalOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn logical_and(&mut self) -> Result<Expr> {
        let mut left = self.equality()?;
        while self.eat(&Token::And) || self.eat_keyword("and") {
            let right = self.equality()?;
            left = Expr::Logical {
                op: LogicalOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek().is_some_and(|t| t.is_keyword(keyword)) {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    fn equality(&mut self) -> Result<Expr> {
        let mut left = self.comparison()?;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => BinaryOp::Eq,
                Some(Token::NotEq) => BinaryOp::NotEq,
                Some(Token::Identical) => BinaryOp::Identical,
                Some(Token::NotIdentical) => BinaryOp::NotIdentical,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.comparison()?;
            left = binary(op, left, right);
        }
    }

    fn comparison(&mut self) -> Result<Expr> {
        let mut left = self.concat()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Lte) => BinaryOp::Lte,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Gte) => BinaryOp::Gte,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.concat()?;
            left = binary(op, left, right);
        }
    }

    fn concat(&mut self) -> Result<Expr> {
        let mut left = self.additive()?;
        while self.eat(&Token::Dot) {
            let right = self.additive()?;
            left = binary(BinaryOp::Concat, left, right);
        }
        Ok(left)
    }

    fn additive(&mut self) -> Result<Expr> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.multiplicative()?;
            left = binary(op, left, right);
        }
    }

    fn multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Mod,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.unary()?;
            left = binary(op, left, right);
        }
    }

    fn unary(&mut self) -> Result<Expr> {
        let op = match self.peek() {
            Some(Token::Bang) => UnaryOp::Not,
            Some(Token::Minus) => UnaryOp::Neg,
            Some(Token::Plus) => {
                self.advance();
                return self.unary();
            }
            _ => return self.postfix(),
        };
        self.advance();
        self.enter()?;
        let operand = self.unary();
        self.leave();
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand?),
        })
    }

    fn postfix(&mut self) -> Result<Expr> {
        let mut expr = self.primary()?;
        while self.eat(&Token::LBracket) {
            let index = self.expression()?;
            self.expect(&Token::RBracket)?;
            expr = Expr::Index {
                target: Box::new(expr),
                index: Box::new(index),
            };
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr> {
        let Some(token) = self.advance() else {
            return Err(self.error("期望表达式"));
        };
        match token {
            Token::Int(v) => Ok(Expr::Literal(json!(v))),
            Token::Float(v) => Ok(Expr::Literal(json!(v))),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::Variable(name) => Ok(Expr::Variable(name)),
            Token::LParen => {
                let expr = self.expression()?;
                self.expect(&Token::RParen)?;
                Ok(expr)
            }
            Token::LBracket => self.array_literal(),
            Token::Ident(name) => self.identifier(name),
            other => {
                self.cursor -= 1;
                Err(self.error(&format!("无法识别的表达式开头 {other:?}")))
            }
        }
    }

    fn identifier(&mut self, name: String) -> Result<Expr> {
        match name.to_ascii_lowercase().as_str() {
            "true" => return Ok(Expr::Literal(Value::Bool(true))),
            "false" => return Ok(Expr::Literal(Value::Bool(false))),
            "null" => return Ok(Expr::Literal(Value::Null)),
            _ => {}
        }

        if self.eat(&Token::LParen) {
            let args = self.arguments()?;
            return Ok(Expr::Call { name, args });
        }

        if self.eat(&Token::DoubleColon) {
            let method = match self.advance() {
                Some(Token::Ident(method)) => method,
                _ => return Err(self.error("静态调用缺少方法名")),
            };
            self.expect(&Token::LParen)?;
            let args = self.arguments()?;
            return Ok(Expr::StaticCall {
                class: name,
                method,
                args,
            });
        }

        Ok(Expr::Constant(name))
    }

    fn arguments(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            if self.eat(&Token::RParen) {
                return Ok(args);
            }
            self.expect(&Token::Comma)?;
        }
    }

    fn array_literal(&mut self) -> Result<Expr> {
        let mut entries = Vec::new();
        loop {
            if self.eat(&Token::RBracket) {
                return Ok(Expr::Array(entries));
            }
            let first = self.expression()?;
            if self.eat(&Token::DoubleArrow) {
                let value = self.expression()?;
                entries.push((Some(first), value));
            } else {
                entries.push((None, first));
            }
            if !self.eat(&Token::Comma) {
                self.expect(&Token::RBracket)?;
                return Ok(Expr::Array(entries));
            }
        }
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}
