//! 条件
//!
//! 条件是 AND / OR 组成的树，叶子为运算项或比较项，整体生成一段布尔代码交给规则引擎执行。

pub mod builder;

use crate::component::Component;
use crate::context::EngineContext;
use crate::error::Result;
use crate::expression::{ExpressionItem, trans};
use crate::value::Value;
use rule_engine_core::sandbox::ops;
use serde_json::{Map, Value as JsonValue, json};
use tracing::debug;

pub use builder::ConditionBuilder;

// ==================== 枚举 ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ops {
    And,
    Or,
}

impl Ops {
    pub fn make(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "AND" => Some(Self::And),
            "OR" => Some(Self::Or),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }

    fn operator(&self) -> &'static str {
        match self {
            Self::And => " && ",
            Self::Or => " || ",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareType {
    Equals,
    NoEquals,
    Gt,
    Lt,
    Gte,
    Lte,
    Contains,
    NoContains,
    Empty,
    NotEmpty,
    Valuable,
    NoValuable,
}

impl CompareType {
    pub fn make(value: &str) -> Option<Self> {
        let compare_type = match value {
            "equals" => Self::Equals,
            "no_equals" => Self::NoEquals,
            "gt" => Self::Gt,
            "lt" => Self::Lt,
            "gte" => Self::Gte,
            "lte" => Self::Lte,
            "contains" => Self::Contains,
            "no_contains" => Self::NoContains,
            "empty" => Self::Empty,
            "not_empty" => Self::NotEmpty,
            "valuable" => Self::Valuable,
            "no_valuable" => Self::NoValuable,
            _ => return None,
        };
        Some(compare_type)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NoEquals => "no_equals",
            Self::Gt => "gt",
            Self::Lt => "lt",
            Self::Gte => "gte",
            Self::Lte => "lte",
            Self::Contains => "contains",
            Self::NoContains => "no_contains",
            Self::Empty => "empty",
            Self::NotEmpty => "not_empty",
            Self::Valuable => "valuable",
            Self::NoValuable => "no_valuable",
        }
    }

    /// 判空类比较只有左侧
    pub fn is_right_operands_required(&self) -> bool {
        !matches!(
            self,
            Self::Empty | Self::NotEmpty | Self::Valuable | Self::NoValuable
        )
    }
}

// ==================== 条件项 ====================

#[derive(Debug, Clone, PartialEq)]
pub enum ConditionItem {
    Operation {
        template: Option<Component>,
        operands: Value,
    },
    Compare {
        template: Option<Component>,
        left_operands: Value,
        condition: CompareType,
        right_operands: Option<Value>,
    },
}

impl ConditionItem {
    pub fn template(&self) -> Option<&Component> {
        match self {
            Self::Operation { template, .. } | Self::Compare { template, .. } => template.as_ref(),
        }
    }

    /// 参与运算的所有值
    pub fn values(&self) -> Vec<&Value> {
        match self {
            Self::Operation { operands, .. } => vec![operands],
            Self::Compare {
                left_operands,
                right_operands,
                ..
            } => std::iter::once(left_operands)
                .chain(right_operands.as_ref())
                .collect(),
        }
    }

    pub fn code(&self) -> String {
        let (left_operands, condition, right_operands) = match self {
            Self::Operation { operands, .. } => return format!("({})", operands.code()),
            Self::Compare {
                left_operands,
                condition,
                right_operands,
                ..
            } => (left_operands, condition, right_operands),
        };

        let left = left_operands.code();
        let right = right_operands.as_ref().map(Value::code).unwrap_or_default();
        let literal_only = left_operands.is_literal_only()
            && right_operands.as_ref().is_none_or(Value::is_literal_only);

        match condition {
            CompareType::Equals => {
                let op = if literal_only { "===" } else { "==" };
                format!("(({left}) {op} ({right}))")
            }
            CompareType::NoEquals => {
                let op = if literal_only { "!==" } else { "!=" };
                format!("(({left}) {op} ({right}))")
            }
            CompareType::Gt => format!("(({left}) > ({right}))"),
            CompareType::Lt => format!("(({left}) < ({right}))"),
            CompareType::Gte => format!("(({left}) >= ({right}))"),
            CompareType::Lte => format!("(({left}) <= ({right}))"),
            CompareType::Contains => format!("(str_contains(({left}), ({right})))"),
            CompareType::NoContains => format!("(!str_contains(({left}), ({right})))"),
            CompareType::Empty => format!("((!isset(({left}))))"),
            CompareType::NotEmpty => format!("((isset(({left}))))"),
            CompareType::Valuable => format!("((({left}) ?? '') === '')"),
            CompareType::NoValuable => format!("((({left}) ?? '') !== '')"),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        let template = self.template().map(Component::to_json);
        match self {
            Self::Operation { operands, .. } => json!({
                "type": "operation",
                "template": template,
                "operands": operands.to_json(),
            }),
            Self::Compare {
                left_operands,
                condition,
                right_operands,
                ..
            } => json!({
                "type": "compare",
                "template": template,
                "left_operands": left_operands.to_json(),
                "condition": condition.as_str(),
                "right_operands": right_operands.as_ref().map(Value::to_json),
            }),
        }
    }
}

// ==================== 条件树 ====================

#[derive(Debug, Clone, PartialEq)]
pub enum ConditionNode {
    Group(Condition),
    Item(ConditionItem),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    ops: Ops,
    children: Vec<ConditionNode>,
}

impl Condition {
    pub fn new(ops: Ops, children: Vec<ConditionNode>) -> Self {
        Self { ops, children }
    }

    pub fn ops(&self) -> Ops {
        self.ops
    }

    pub fn children(&self) -> &[ConditionNode] {
        &self.children
    }

    /// 深度优先的第一个条件项
    pub fn first_row(&self) -> Option<&ConditionItem> {
        self.children.iter().find_map(|child| match child {
            ConditionNode::Item(item) => Some(item),
            ConditionNode::Group(group) => group.first_row(),
        })
    }

    /// 深度优先的全部条件项
    pub fn items(&self) -> Vec<&ConditionItem> {
        let mut items = Vec::new();
        for child in &self.children {
            match child {
                ConditionNode::Item(item) => items.push(item),
                ConditionNode::Group(group) => items.extend(group.items()),
            }
        }
        items
    }

    pub fn all_field_items(&self) -> Vec<&ExpressionItem> {
        self.items()
            .into_iter()
            .flat_map(ConditionItem::values)
            .flat_map(Value::all_field_items)
            .collect()
    }

    pub fn code(&self) -> String {
        let codes: Vec<_> = self
            .children
            .iter()
            .map(|child| match child {
                ConditionNode::Group(group) => group.code(),
                ConditionNode::Item(item) => item.code(),
            })
            .collect();
        format!("({})", codes.join(self.ops.operator()))
    }

    /// 执行条件，结果按真值转为布尔
    pub fn result(&self, ctx: &EngineContext, source: &JsonValue) -> Result<bool> {
        let mut data = match source {
            JsonValue::Object(map) => map.clone(),
            _ => Map::new(),
        };
        for value in self.items().into_iter().flat_map(ConditionItem::values) {
            if let Some(expression) = value.expression() {
                trans::bind_trans_values(expression, &mut data, true);
            }
        }

        let code = self.code();
        debug!(code = %code, "执行条件");
        let result = ctx.run(&code, &JsonValue::Object(data))?;
        Ok(ops::truthy(&result))
    }

    pub fn to_json(&self) -> JsonValue {
        let children: Vec<_> = self
            .children
            .iter()
            .map(|child| match child {
                ConditionNode::Group(group) => group.to_json(),
                ConditionNode::Item(item) => item.to_json(),
            })
            .collect();
        json!({
            "ops": self.ops.as_str(),
            "children": children,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compare(left: Value, condition: CompareType, right: Option<Value>) -> ConditionNode {
        ConditionNode::Item(ConditionItem::Compare {
            template: None,
            left_operands: left,
            condition,
            right_operands: right,
        })
    }

    #[test]
    fn test_compare_type() {
        for name in [
            "equals", "no_equals", "gt", "lt", "gte", "lte", "contains", "no_contains", "empty",
            "not_empty", "valuable", "no_valuable",
        ] {
            assert_eq!(CompareType::make(name).unwrap().as_str(), name);
        }
        assert!(CompareType::make("like").is_none());
        assert!(CompareType::Gt.is_right_operands_required());
        assert!(!CompareType::Valuable.is_right_operands_required());
    }

    #[test]
    fn test_ops() {
        assert_eq!(Ops::make("and"), Some(Ops::And));
        assert_eq!(Ops::make("OR"), Some(Ops::Or));
        assert!(Ops::make("XOR").is_none());
    }

    #[test]
    fn test_compare_codes() {
        let field = || Value::build_expression("a").unwrap();
        let text = || Value::build_const("x");
        let cases = [
            (CompareType::Equals, "((($data['a']) == ('x')))"),
            (CompareType::NoEquals, "((($data['a']) != ('x')))"),
            (CompareType::Lte, "((($data['a']) <= ('x')))"),
            (CompareType::Contains, "((str_contains(($data['a']), ('x'))))"),
            (CompareType::NoContains, "((!str_contains(($data['a']), ('x'))))"),
            (CompareType::NotEmpty, "(((isset(($data['a'])))))"),
            (CompareType::NoValuable, "(((($data['a']) ?? '') !== ''))"),
        ];
        for (compare_type, expected) in cases {
            let condition = Condition::new(Ops::And, vec![compare(field(), compare_type, text())]);
            assert_eq!(condition.code(), expected, "{}", compare_type.as_str());
        }

        let condition = Condition::new(
            Ops::Or,
            vec![compare(Value::build_const("1").unwrap(), CompareType::NoEquals, text())],
        );
        assert_eq!(condition.code(), "(((1) !== ('x')))");
    }

    #[test]
    fn test_result_with_contains() {
        let ctx = EngineContext::default();
        let condition = Condition::new(
            Ops::And,
            vec![compare(
                Value::build_expression("title").unwrap(),
                CompareType::Contains,
                Value::build_const("规则"),
            )],
        );
        assert!(condition.result(&ctx, &json!({"title": "规则引擎"})).unwrap());
        assert!(!condition.result(&ctx, &json!({"title": "表单"})).unwrap());
    }

    #[test]
    fn test_first_row_depth_first() {
        let nested = Condition::new(
            Ops::Or,
            vec![compare(Value::build_expression("b").unwrap(), CompareType::Empty, None)],
        );
        let condition = Condition::new(
            Ops::And,
            vec![
                ConditionNode::Group(nested),
                compare(Value::build_expression("a").unwrap(), CompareType::Empty, None),
            ],
        );
        let first = condition.first_row().unwrap();
        assert_eq!(first.values()[0].code(), "$data['b']");
        assert_eq!(condition.items().len(), 2);
        assert_eq!(condition.all_field_items().len(), 2);
    }
}
