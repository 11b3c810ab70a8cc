//! 条件构建器

use super::{CompareType, Condition, ConditionItem, ConditionNode, Ops};
use crate::component::Component;
use crate::error::{FlowExprError, Result};
use crate::expression::Expression;
use crate::value::Value;
use serde_json::Value as JsonValue;

#[derive(Debug, Default, Clone, Copy)]
pub struct ConditionBuilder;

impl ConditionBuilder {
    pub fn new() -> Self {
        Self
    }

    /// 构建条件树，没有子节点时返回 None
    pub fn build(&self, raw: &JsonValue) -> Result<Option<Condition>> {
        let Some(map) = raw.as_object().filter(|m| !m.is_empty()) else {
            return Ok(None);
        };
        let ops_name = map.get("ops").and_then(JsonValue::as_str).unwrap_or_default();
        let ops = Ops::make(ops_name)
            .ok_or_else(|| FlowExprError::validation(format!("无效的逻辑运算符 {ops_name}")))?;
        let Some(children) = map
            .get("children")
            .and_then(JsonValue::as_array)
            .filter(|c| !c.is_empty())
        else {
            return Ok(None);
        };

        let mut nodes = Vec::with_capacity(children.len());
        for child in children {
            let is_group = child
                .get("ops")
                .is_some_and(|ops| !ops.is_null() && ops.as_str() != Some(""));
            if is_group {
                if let Some(group) = self.build(child)? {
                    nodes.push(ConditionNode::Group(group));
                }
            } else {
                nodes.push(ConditionNode::Item(self.build_item(child)?));
            }
        }
        // 子分组全部为空时整棵树也为空
        if nodes.is_empty() {
            return Ok(None);
        }
        Ok(Some(Condition::new(ops, nodes)))
    }

    /// 组件的默认结构，没有结构时返回 None
    pub fn template(&self, raw: Option<&JsonValue>) -> Result<Option<Condition>> {
        match raw {
            Some(raw) => self.build(raw),
            None => Ok(None),
        }
    }

    fn build_item(&self, raw: &JsonValue) -> Result<ConditionItem> {
        let item_type = raw.get("type").and_then(JsonValue::as_str).unwrap_or_default();
        let mut template = match raw.get("template") {
            Some(raw_template) => Component::fast_create(raw_template)?,
            None => None,
        };

        match item_type {
            "operation" => {
                let operands = match template.as_mut() {
                    Some(component) => template_value(component, "operands")?,
                    None => raw.get("operands").and_then(Value::build),
                };
                let operands = operands
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| FlowExprError::validation("比较值 不能为空"))?;
                Ok(ConditionItem::Operation { template, operands })
            }
            "compare" => {
                let (left_operands, condition, right_operands) = match template.as_mut() {
                    Some(component) => (
                        template_value(component, "left_operands")?,
                        template_value(component, "condition")?
                            .as_ref()
                            .and_then(Value::expression)
                            .and_then(Expression::const_literal)
                            .and_then(JsonValue::as_str)
                            .and_then(CompareType::make),
                        template_value(component, "right_operands")?,
                    ),
                    None => (
                        raw.get("left_operands").and_then(Value::build),
                        raw.get("condition")
                            .and_then(JsonValue::as_str)
                            .and_then(CompareType::make),
                        raw.get("right_operands").and_then(Value::build),
                    ),
                };

                let condition =
                    condition.ok_or_else(|| FlowExprError::validation("比较类型 不能为空"))?;
                let left_operands = left_operands
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| FlowExprError::validation("左侧比较值 不能为空"))?;
                if condition.is_right_operands_required()
                    && right_operands.as_ref().is_none_or(Value::is_empty)
                {
                    return Err(FlowExprError::validation("右侧比较值 不能为空"));
                }
                Ok(ConditionItem::Compare {
                    template,
                    left_operands,
                    condition,
                    right_operands,
                })
            }
            other => Err(FlowExprError::validation(format!("无效的条件类型 {other}"))),
        }
    }
}

/// 模板控件中某个字段展示的值
fn template_value(component: &mut Component, key: &str) -> Result<Option<Value>> {
    let widget = component.widget()?;
    Ok(widget.property(key).and_then(|property| property.shown_value()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn const_value(raw: &str) -> JsonValue {
        json!({"type": "const", "const_value": [{"type": "input", "value": raw, "name": "", "args": null}], "expression_value": null})
    }

    fn field_value(path: &str) -> JsonValue {
        json!({"type": "expression", "const_value": null, "expression_value": [{"type": "fields", "value": path, "name": "", "args": null}]})
    }

    #[test]
    fn test_build_empty() {
        let builder = ConditionBuilder::new();
        assert!(builder.build(&json!({})).unwrap().is_none());
        assert!(builder.build(&json!({"ops": "AND", "children": []})).unwrap().is_none());
        assert!(builder.build(&json!({"ops": "XOR", "children": []})).is_err());
    }

    #[test]
    fn test_validation_errors() {
        let builder = ConditionBuilder::new();
        let cases = [
            (json!({"type": "operation", "operands": null}), "比较值 不能为空"),
            (
                json!({"type": "compare", "left_operands": field_value("a"), "condition": "like"}),
                "比较类型 不能为空",
            ),
            (
                json!({"type": "compare", "left_operands": null, "condition": "empty"}),
                "左侧比较值 不能为空",
            ),
            (
                json!({"type": "compare", "left_operands": field_value("a"), "condition": "gt", "right_operands": null}),
                "右侧比较值 不能为空",
            ),
        ];
        for (child, message) in cases {
            let err = builder
                .build(&json!({"ops": "AND", "children": [child]}))
                .unwrap_err();
            assert_eq!(err.to_string(), message);
        }
    }

    #[test]
    fn test_optional_right_operands() {
        let condition = ConditionBuilder::new()
            .build(&json!({
                "ops": "AND",
                "children": [{"type": "compare", "left_operands": field_value("a"), "condition": "not_empty"}]
            }))
            .unwrap()
            .unwrap();
        assert_eq!(condition.code(), "(((isset(($data['a'])))))");
    }

    #[test]
    fn test_nested_group_skipped_when_empty() {
        let condition = ConditionBuilder::new()
            .build(&json!({
                "ops": "OR",
                "children": [
                    {"ops": "AND", "children": []},
                    {"type": "compare", "left_operands": field_value("a"), "condition": "equals", "right_operands": const_value("1")}
                ]
            }))
            .unwrap()
            .unwrap();
        assert_eq!(condition.children().len(), 1);
        assert_eq!(condition.code(), "((($data['a']) == (1)))");
    }

    #[test]
    fn test_all_groups_empty() {
        let raw = json!({
            "ops": "AND",
            "children": [
                {"ops": "AND", "children": []},
                {"ops": "OR", "children": [{"ops": "AND", "children": []}]}
            ]
        });
        assert!(ConditionBuilder::new().build(&raw).unwrap().is_none());
        assert!(ConditionBuilder::new().template(Some(&raw)).unwrap().is_none());
        assert!(ConditionBuilder::new().template(None).unwrap().is_none());
    }
}
