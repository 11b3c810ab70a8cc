//! 语法树求值

use super::CallableScope;
use super::ast::{BinaryOp, Expr, LogicalOp, Program, Stmt, UnaryOp};
use super::builtins;
use super::ops;
use crate::error::{Result, RuleError};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;

/// 语句执行后的控制流
enum Flow {
    Next,
    Return(Value),
}

pub struct Interpreter<'a> {
    scope: &'a dyn CallableScope,
    variables: HashMap<String, Value>,
}

impl<'a> Interpreter<'a> {
    pub fn new(scope: &'a dyn CallableScope, inputs: &Map<String, Value>) -> Self {
        Self {
            scope,
            variables: inputs
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    pub fn run(mut self, program: &Program) -> Result<Value> {
        match program {
            Program::Expression(expr) => self.eval(expr),
            Program::Script(stmts) => match self.exec_block(stmts)? {
                Flow::Return(value) => Ok(value),
                Flow::Next => Ok(Value::Null),
            },
        }
    }

    fn exec_block(&mut self, stmts: &[Stmt]) -> Result<Flow> {
        for stmt in stmts {
            if let Flow::Return(value) = self.exec(stmt)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Next)
    }

    fn exec(&mut self, stmt: &Stmt) -> Result<Flow> {
        match stmt {
            Stmt::Expr(expr) => {
                self.eval(expr)?;
                Ok(Flow::Next)
            }
            Stmt::Assign { name, value } => {
                let value = self.eval(value)?;
                self.variables.insert(name.clone(), value);
                Ok(Flow::Next)
            }
            Stmt::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(expr)?,
                    None => Value::Null,
                };
                Ok(Flow::Return(value))
            }
            Stmt::If {
                condition,
                then,
                otherwise,
            } => {
                if ops::truthy(&self.eval(condition)?) {
                    self.exec_block(then)
                } else {
                    self.exec_block(otherwise)
                }
            }
        }
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Variable(name) => Ok(self.variables.get(name).cloned().unwrap_or(Value::Null)),
            Expr::Array(entries) => self.eval_array(entries),
            Expr::Index { target, index } => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                Ok(ops::index(&target, &index))
            }
            Expr::Call { name, args } => {
                let args = self.eval_args(args)?;
                if let Some(builtin) = builtins::lookup(name) {
                    return builtin(&args);
                }
                match self.scope.function(name) {
                    Some(function) => function(&args),
                    None => Err(RuleError::RestrictedOperation(format!(
                        "函数 {name} 未注册"
                    ))),
                }
            }
            Expr::StaticCall {
                class,
                method,
                args,
            } => {
                let args = self.eval_args(args)?;
                match self.scope.static_method(class, method) {
                    Some(function) => function(&args),
                    None => Err(RuleError::RestrictedOperation(format!(
                        "静态方法 {class}::{method} 未注册"
                    ))),
                }
            }
            Expr::Constant(name) => self.scope.constant(name).ok_or_else(|| {
                RuleError::RestrictedOperation(format!("常量 {name} 未注册"))
            }),
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!ops::truthy(&value))),
                    UnaryOp::Neg => ops::arithmetic('*', &value, &Value::from(-1)),
                }
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary(*op, &left, &right)
            }
            Expr::Logical { op, left, right } => {
                let left = ops::truthy(&self.eval(left)?);
                let result = match op {
                    LogicalOp::And => left && ops::truthy(&self.eval(right)?),
                    LogicalOp::Or => left || ops::truthy(&self.eval(right)?),
                };
                Ok(Value::Bool(result))
            }
            Expr::Coalesce { left, right } => {
                let left = self.eval(left)?;
                if ops::is_absent(&left) {
                    self.eval(right)
                } else {
                    Ok(left)
                }
            }
            Expr::Ternary {
                condition,
                then,
                otherwise,
            } => {
                let condition = self.eval(condition)?;
                if ops::truthy(&condition) {
                    match then {
                        Some(then) => self.eval(then),
                        None => Ok(condition),
                    }
                } else {
                    self.eval(otherwise)
                }
            }
        }
    }

    fn eval_args(&mut self, args: &[Expr]) -> Result<Vec<Value>> {
        args.iter().map(|arg| self.eval(arg)).collect()
    }

    /// 全部无键时得到列表，否则得到对象，无键元素按自增下标补键
    fn eval_array(&mut self, entries: &[(Option<Expr>, Expr)]) -> Result<Value> {
        if entries.iter().all(|(key, _)| key.is_none()) {
            let items = entries
                .iter()
                .map(|(_, value)| self.eval(value))
                .collect::<Result<Vec<_>>>()?;
            return Ok(Value::Array(items));
        }

        let mut map = Map::new();
        // 超出 i64 范围后不再允许追加无键元素
        let mut next_index: Option<i64> = Some(0);
        for (key, value) in entries {
            let key = match key {
                Some(key) => {
                    let key = self.eval(key)?;
                    if let Value::Number(n) = &key
                        && let Some(i) = n.as_i64()
                    {
                        next_index = match (next_index, i.checked_add(1)) {
                            (Some(current), Some(after)) => Some(current.max(after)),
                            _ => None,
                        };
                    }
                    ops::key_as_string(&key).ok_or_else(|| {
                        RuleError::ExecutionError("数组键只能是标量".to_string())
                    })?
                }
                None => {
                    let index = next_index.ok_or_else(|| {
                        RuleError::ExecutionError("数组下一个元素的位置已被占用".to_string())
                    })?;
                    next_index = index.checked_add(1);
                    index.to_string()
                }
            };
            let value = self.eval(value)?;
            map.insert(key, value);
        }
        Ok(Value::Object(map))
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
    let compare = |expected: fn(Ordering) -> bool| {
        Value::Bool(ops::loose_cmp(left, right).is_some_and(expected))
    };

    Ok(match op {
        BinaryOp::Add => ops::arithmetic('+', left, right)?,
        BinaryOp::Sub => ops::arithmetic('-', left, right)?,
        BinaryOp::Mul => ops::arithmetic('*', left, right)?,
        BinaryOp::Div => ops::arithmetic('/', left, right)?,
        BinaryOp::Mod => ops::arithmetic('%', left, right)?,
        BinaryOp::Concat => {
            let mut s = ops::to_string(left)?;
            s.push_str(&ops::to_string(right)?);
            Value::String(s)
        }
        BinaryOp::Eq => Value::Bool(ops::loose_eq(left, right)),
        BinaryOp::NotEq => Value::Bool(!ops::loose_eq(left, right)),
        BinaryOp::Identical => Value::Bool(ops::strict_eq(left, right)),
        BinaryOp::NotIdentical => Value::Bool(!ops::strict_eq(left, right)),
        BinaryOp::Lt => compare(|o| o == Ordering::Less),
        BinaryOp::Lte => compare(|o| o != Ordering::Greater),
        BinaryOp::Gt => compare(|o| o == Ordering::Greater),
        BinaryOp::Gte => compare(|o| o != Ordering::Less),
    })
}

#[cfg(test)]
mod tests {
    use super::super::{EmptyScope, Sandbox};
    use serde_json::{Map, Value, json};

    fn run_expr(source: &str, inputs: Value) -> Value {
        let sandbox = Sandbox::default();
        let program = sandbox.compile_expression(source, &EmptyScope).unwrap();
        let inputs: Map<String, Value> = inputs.as_object().cloned().unwrap_or_default();
        sandbox.execute(&program, &inputs, &EmptyScope).unwrap()
    }

    fn run_script(source: &str, inputs: Value) -> Value {
        let sandbox = Sandbox::default();
        let program = sandbox.compile_script(source, &EmptyScope).unwrap();
        let inputs: Map<String, Value> = inputs.as_object().cloned().unwrap_or_default();
        sandbox.execute(&program, &inputs, &EmptyScope).unwrap()
    }

    #[test]
    fn test_loose_and_strict_equality() {
        assert_eq!(run_expr("(2) == ('2')", json!({})), json!(true));
        assert_eq!(run_expr("(2) === ('2')", json!({})), json!(false));
        assert_eq!(run_expr("('哈哈哈') > (2)", json!({})), json!(true));
        assert_eq!(run_expr("(555) > ('实际值')", json!({})), json!(false));
    }

    #[test]
    fn test_int_overflow_does_not_panic() {
        let inputs = json!({"data": {"a": i64::MIN}});
        assert_eq!(run_expr("$data['a'] % -1", inputs.clone()), json!(0));
        assert_eq!(run_expr("-$data['a']", inputs.clone()), json!(-(i64::MIN as f64)));
        assert!(run_expr("$data['a'] / -1", inputs).is_f64());

        let map = run_expr("[9223372036854775806 => 'a', 'b']", json!({}));
        assert_eq!(map["9223372036854775807"], json!("b"));

        let sandbox = Sandbox::default();
        let program = sandbox
            .compile_expression("[9223372036854775807 => 'a', 'b']", &EmptyScope)
            .unwrap();
        assert!(sandbox.execute(&program, &Map::new(), &EmptyScope).is_err());
    }

    #[test]
    fn test_missing_variable_and_index() {
        assert_eq!(run_expr("$data['a']['b']", json!({"data": {}})), Value::Null);
        assert_eq!(run_expr("$nothing", json!({})), Value::Null);
    }

    #[test]
    fn test_isset_and_coalesce() {
        let inputs = json!({"data": {"x": [], "y": 1}});
        assert_eq!(run_expr("(!isset(($data['x'])))", inputs.clone()), json!(true));
        assert_eq!(run_expr("isset($data['y'])", inputs.clone()), json!(true));
        assert_eq!(run_expr("(($data['x']) ?? '') === ''", inputs), json!(true));
    }

    #[test]
    fn test_concat_and_ternary() {
        assert_eq!(run_expr("'a' . 1 . 'b'", json!({})), json!("a1b"));
        assert_eq!(run_expr("1 > 2 ? 'yes' : 'no'", json!({})), json!("no"));
        assert_eq!(run_expr("'' ?: 'fallback'", json!({})), json!("fallback"));
    }

    #[test]
    fn test_logical_short_circuit() {
        // 右侧若被求值会因除零报错
        assert_eq!(run_expr("false && (1 / 0)", json!({})), json!(false));
        assert_eq!(run_expr("true || (1 / 0)", json!({})), json!(true));
    }

    #[test]
    fn test_array_literal() {
        assert_eq!(run_expr("[1, 'a']", json!({})), json!([1, "a"]));
        assert_eq!(
            run_expr("['k' => 1, 2]", json!({})),
            json!({"k": 1, "0": 2})
        );
    }

    #[test]
    fn test_script_with_assignment_and_branches() {
        let source = r#"
            $total = $a + $b;
            if ($total > 10) {
                return 'big';
            } elseif ($total > 5) {
                return 'medium';
            } else {
                return 'small';
            }
        "#;
        assert_eq!(run_script(source, json!({"a": 3, "b": 4})), json!("medium"));
        assert_eq!(run_script(source, json!({"a": 30, "b": 4})), json!("big"));
        assert_eq!(run_script("$x = 1;", json!({})), Value::Null);
    }

    #[test]
    fn test_division_by_zero_is_error() {
        let sandbox = Sandbox::default();
        let program = sandbox.compile_expression("1 / 0", &EmptyScope).unwrap();
        assert!(sandbox.execute(&program, &Map::new(), &EmptyScope).is_err());
    }
}
