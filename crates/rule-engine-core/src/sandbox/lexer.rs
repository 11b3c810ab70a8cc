//! 词法分析
//!
//! 将规则源码切分为 Token 序列。字符串支持单引号（仅 `\\` 与 `\'` 转义）和双引号
//! （常见转义，不做变量插值）两种写法。

use crate::error::{Result, RuleError};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    /// `$name`
    Variable(String),
    /// 函数名、类名、常量名及关键字
    Ident(String),

    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Semicolon,
    Colon,
    DoubleColon,
    Question,
    DoubleArrow,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Dot,
    Bang,
    Assign,

    Eq,
    NotEq,
    Identical,
    NotIdentical,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
    Coalesce,
}

impl Token {
    /// 判断是否为指定关键字（大小写不敏感）
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Ident(name) if name.eq_ignore_ascii_case(keyword))
    }
}

pub struct Lexer<'a> {
    source: &'a str,
    cursor: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self { source, cursor: 0 }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn peek(&self) -> Option<char> {
        self.source[self.cursor..].chars().next()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.source[self.cursor..].chars().nth(offset)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.cursor += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.cursor += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                // 单行注释
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                Some('#') => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                _ => return,
            }
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>> {
        self.skip_trivia();
        let start = self.cursor;
        let Some(c) = self.bump() else {
            return Ok(None);
        };

        let token = match c {
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            '{' => Token::LBrace,
            '}' => Token::RBrace,
            ',' => Token::Comma,
            ';' => Token::Semicolon,
            ':' => {
                if self.eat(':') {
                    Token::DoubleColon
                } else {
                    Token::Colon
                }
            }
            '?' => {
                if self.eat('?') {
                    Token::Coalesce
                } else {
                    Token::Question
                }
            }
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '%' => Token::Percent,
            '.' => {
                if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    return self.number(start).map(Some);
                }
                Token::Dot
            }
            '!' => {
                if self.eat('=') {
                    if self.eat('=') {
                        Token::NotIdentical
                    } else {
                        Token::NotEq
                    }
                } else {
                    Token::Bang
                }
            }
            '=' => {
                if self.eat('=') {
                    if self.eat('=') {
                        Token::Identical
                    } else {
                        Token::Eq
                    }
                } else if self.eat('>') {
                    Token::DoubleArrow
                } else {
                    Token::Assign
                }
            }
            '<' => {
                if self.eat('=') {
                    Token::Lte
                } else if self.eat('>') {
                    Token::NotEq
                } else {
                    Token::Lt
                }
            }
            '>' => {
                if self.eat('=') {
                    Token::Gte
                } else {
                    Token::Gt
                }
            }
            '&' => {
                if self.eat('&') {
                    Token::And
                } else {
                    return Err(self.unexpected('&', start));
                }
            }
            '|' => {
                if self.eat('|') {
                    Token::Or
                } else {
                    return Err(self.unexpected('|', start));
                }
            }
            '\'' => Token::Str(self.single_quoted(start)?),
            '"' => Token::Str(self.double_quoted(start)?),
            '$' => {
                let name = self.identifier();
                if name.is_empty() {
                    return Err(RuleError::ParseError(format!("位置 {start} 处变量名为空")));
                }
                Token::Variable(name)
            }
            '\\' => {
                // 完全限定名前缀，如 `\PHP_EOL`
                let name = self.identifier();
                if name.is_empty() {
                    return Err(self.unexpected('\\', start));
                }
                Token::Ident(name)
            }
            c if c.is_ascii_digit() => return self.number(start).map(Some),
            c if is_ident_start(c) => {
                let rest = self.identifier();
                Token::Ident(format!("{c}{rest}"))
            }
            other => return Err(self.unexpected(other, start)),
        };
        Ok(Some(token))
    }

    fn identifier(&mut self) -> String {
        let start = self.cursor;
        while let Some(c) = self.peek() {
            if is_ident_start(c) || c.is_ascii_digit() {
                self.bump();
            } else {
                break;
            }
        }
        self.source[start..self.cursor].to_string()
    }

    fn number(&mut self, start: usize) -> Result<Token> {
        let mut is_float = self.source[start..self.cursor].contains('.');
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '_' {
                self.bump();
            } else if c == '.' && !is_float && self.peek_at(1).is_some_and(|n| n.is_ascii_digit()) {
                is_float = true;
                self.bump();
            } else if (c == 'e' || c == 'E')
                && (self.peek_at(1).is_some_and(|n| n.is_ascii_digit())
                    || (matches!(self.peek_at(1), Some('+') | Some('-'))
                        && self.peek_at(2).is_some_and(|n| n.is_ascii_digit())))
            {
                is_float = true;
                self.bump();
                if matches!(self.peek(), Some('+') | Some('-')) {
                    self.bump();
                }
            } else {
                break;
            }
        }

        let text: String = self.source[start..self.cursor]
            .chars()
            .filter(|c| *c != '_')
            .collect();
        if !is_float {
            if let Ok(value) = text.parse::<i64>() {
                return Ok(Token::Int(value));
            }
        }
        text.parse::<f64>()
            .map(Token::Float)
            .map_err(|_| RuleError::ParseError(format!("位置 {start} 处无效的数字: {text}")))
    }

    fn single_quoted(&mut self, start: usize) -> Result<String> {
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('\'') => return Ok(out),
                Some('\\') => match self.peek() {
                    Some('\\') | Some('\'') => {
                        if let Some(c) = self.bump() {
                            out.push(c);
                        }
                    }
                    _ => out.push('\\'),
                },
                Some(c) => out.push(c),
                None => {
                    return Err(RuleError::ParseError(format!(
                        "位置 {start} 处的字符串未闭合"
                    )));
                }
            }
        }
    }

    fn double_quoted(&mut self, start: usize) -> Result<String> {
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('0') => out.push('\0'),
                    Some('\\') => out.push('\\'),
                    Some('"') => out.push('"'),
                    Some('$') => out.push('$'),
                    Some(other) => {
                        out.push('\\');
                        out.push(other);
                    }
                    None => break,
                },
                Some(c) => out.push(c),
                None => break,
            }
        }
        Err(RuleError::ParseError(format!("位置 {start} 处的字符串未闭合")))
    }

    fn unexpected(&self, c: char, position: usize) -> RuleError {
        RuleError::ParseError(format!("位置 {position} 处出现非法字符 '{c}'"))
    }
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}
