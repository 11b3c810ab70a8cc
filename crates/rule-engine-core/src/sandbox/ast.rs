//! 沙箱语法树

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
    Eq,
    NotEq,
    Identical,
    NotIdentical,
    Lt,
    Lte,
    Gt,
    Gte,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Variable(String),
    /// 数组字面量，键为 None 时按顺序追加
    Array(Vec<(Option<Expr>, Expr)>),
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
    StaticCall {
        class: String,
        method: String,
        args: Vec<Expr>,
    },
    Constant(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Coalesce {
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `cond ? a : b`，`then` 为 None 时即 `cond ?: b`
    Ternary {
        condition: Box<Expr>,
        then: Option<Box<Expr>>,
        otherwise: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    Assign { name: String, value: Expr },
    Return(Option<Expr>),
    If {
        condition: Expr,
        then: Vec<Stmt>,
        otherwise: Vec<Stmt>,
    },
}

/// 编译产物
///
/// 表达式规则只有一个求值表达式，脚本规则由语句序列组成，结果取 `return` 的值。
#[derive(Debug, Clone, PartialEq)]
pub enum Program {
    Expression(Expr),
    Script(Vec<Stmt>),
}

/// 程序引用的外部符号，编译期用于白名单校验
#[derive(Debug, Default, Clone)]
pub struct References {
    pub functions: Vec<String>,
    pub static_calls: Vec<(String, String)>,
    pub constants: Vec<String>,
}

impl References {
    pub fn collect(program: &Program) -> Self {
        let mut refs = Self::default();
        match program {
            Program::Expression(expr) => refs.visit_expr(expr),
            Program::Script(stmts) => stmts.iter().for_each(|s| refs.visit_stmt(s)),
        }
        refs
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expr(expr) | Stmt::Assign { value: expr, .. } => self.visit_expr(expr),
            Stmt::Return(expr) => {
                if let Some(expr) = expr {
                    self.visit_expr(expr);
                }
            }
            Stmt::If {
                condition,
                then,
                otherwise,
            } => {
                self.visit_expr(condition);
                then.iter().for_each(|s| self.visit_stmt(s));
                otherwise.iter().for_each(|s| self.visit_stmt(s));
            }
        }
    }

    fn visit_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Literal(_) | Expr::Variable(_) => {}
            Expr::Constant(name) => self.constants.push(name.clone()),
            Expr::Array(entries) => {
                for (key, value) in entries {
                    if let Some(key) = key {
                        self.visit_expr(key);
                    }
                    self.visit_expr(value);
                }
            }
            Expr::Index { target, index } => {
                self.visit_expr(target);
                self.visit_expr(index);
            }
            Expr::Call { name, args } => {
                self.functions.push(name.clone());
                args.iter().for_each(|a| self.visit_expr(a));
            }
            Expr::StaticCall {
                class,
                method,
                args,
            } => {
                self.static_calls.push((class.clone(), method.clone()));
                args.iter().for_each(|a| self.visit_expr(a));
            }
            Expr::Unary { operand, .. } => self.visit_expr(operand),
            Expr::Binary { left, right, .. }
            | Expr::Logical { left, right, .. }
            | Expr::Coalesce { left, right } => {
                self.visit_expr(left);
                self.visit_expr(right);
            }
            Expr::Ternary {
                condition,
                then,
                otherwise,
            } => {
                self.visit_expr(condition);
                if let Some(then) = then {
                    self.visit_expr(then);
                }
                self.visit_expr(otherwise);
            }
        }
    }
}
