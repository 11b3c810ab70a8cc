//! 代码生成
//!
//! 字段引用生成 `$data['a']['b'][0]`，函数调用生成 `name((arg1),(arg2))`，
//! 字符串模板的各片段以 `.` 拼接。

use super::{Expression, ExpressionItem, ExpressionType, ValueType, display};
use rule_engine_core::sandbox::ops::{self, Numeric};
use serde_json::Value as JsonValue;

/// 字段路径的一段
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// 解析 `a.b[0].c` 形式的字段路径
pub fn parse_field_path(path: &str) -> Vec<PathSegment> {
    let mut segments = Vec::new();
    for part in path.split('.') {
        let (key, mut rest) = match part.find('[') {
            Some(pos) => (&part[..pos], &part[pos..]),
            None => (part, ""),
        };
        if !key.is_empty() {
            segments.push(PathSegment::Key(key.to_string()));
        }
        while let Some(inner) = rest.strip_prefix('[') {
            let Some(end) = inner.find(']') else {
                segments.push(PathSegment::Key(inner.to_string()));
                break;
            };
            let token = inner[..end].trim();
            match token.parse::<usize>() {
                Ok(index) => segments.push(PathSegment::Index(index)),
                Err(_) => segments.push(PathSegment::Key(
                    token.trim_matches(|c| c == '\'' || c == '"').to_string(),
                )),
            }
            rest = &inner[end + 1..];
        }
    }
    segments
}

/// 按字段路径取值，路径不存在时为 None
pub fn data_get<'a>(source: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    parse_field_path(path)
        .iter()
        .try_fold(source, |current, segment| match (segment, current) {
            (PathSegment::Key(key), JsonValue::Object(map)) => map.get(key),
            (PathSegment::Key(key), JsonValue::Array(list)) => {
                key.parse::<usize>().ok().and_then(|i| list.get(i))
            }
            (PathSegment::Index(i), JsonValue::Array(list)) => list.get(*i),
            (PathSegment::Index(i), JsonValue::Object(map)) => map.get(&i.to_string()),
            _ => None,
        })
}

/// 单引号字符串字面量
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// JSON 值对应的字面量代码
pub fn literal(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "null".to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => ops::number_to_string(n),
        JsonValue::String(s) => quote(s),
        JsonValue::Array(list) => {
            let items: Vec<_> = list.iter().map(literal).collect();
            format!("[{}]", items.join(", "))
        }
        JsonValue::Object(map) => {
            let items: Vec<_> = map
                .iter()
                .map(|(k, v)| format!("{} => {}", quote(k), literal(v)))
                .collect();
            format!("[{}]", items.join(", "))
        }
    }
}

/// 固定值字面量：数字与数字字符串输出为数字，其余按字符串
fn const_literal(value: &JsonValue) -> String {
    match (value, ops::as_numeric(value)) {
        (JsonValue::String(_), Some(Numeric::Int(i))) => i.to_string(),
        (JsonValue::String(_), Some(Numeric::Float(f))) => {
            let code = f.to_string();
            if code.contains(['.', 'e', 'i', 'N']) {
                code
            } else {
                format!("{code}.0")
            }
        }
        (other, _) => literal(other),
    }
}

pub fn field_code(item: &ExpressionItem) -> String {
    if let Some(key) = item.trans_key() {
        return format!("$data[{}]", quote(&key));
    }
    let mut code = String::from("$data");
    for segment in parse_field_path(&item.value_str()) {
        match segment {
            PathSegment::Key(key) => code.push_str(&format!("[{}]", quote(&key))),
            PathSegment::Index(i) => code.push_str(&format!("[{i}]")),
        }
    }
    code
}

fn methods_code(item: &ExpressionItem) -> String {
    let args: Vec<_> = item
        .args()
        .unwrap_or_default()
        .iter()
        .map(|arg| format!("({})", arg.code()))
        .collect();
    format!("{}({})", item.value_str(), args.join(","))
}

pub fn item_code(item: &ExpressionItem) -> String {
    match item.item_type() {
        ExpressionType::Input => match item.value_type() {
            ValueType::Const => const_literal(item.value()),
            ValueType::Expression => item.value_str(),
        },
        ExpressionType::Field => field_code(item),
        ExpressionType::Methods => methods_code(item),
        _ => literal(&display::static_value(item)),
    }
}

fn template_fragment(item: &ExpressionItem) -> String {
    match item.item_type() {
        ExpressionType::Input => match item.value() {
            JsonValue::String(s) => quote(s),
            other => quote(&other.to_string()),
        },
        _ => item_code(item),
    }
}

pub fn expression_code(expression: &Expression) -> String {
    if expression.is_string_template() {
        let fragments: Vec<_> = expression.items().iter().map(template_fragment).collect();
        return fragments.join(".");
    }
    expression.items().iter().map(item_code).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::ExpressionItem;
    use serde_json::json;

    #[test]
    fn test_parse_field_path() {
        assert_eq!(
            parse_field_path("product_qty[0]"),
            vec![PathSegment::Key("product_qty".into()), PathSegment::Index(0)]
        );
        assert_eq!(
            parse_field_path("9527.list[1]['name']"),
            vec![
                PathSegment::Key("9527".into()),
                PathSegment::Key("list".into()),
                PathSegment::Index(1),
                PathSegment::Key("name".into()),
            ]
        );
    }

    #[test]
    fn test_data_get() {
        let source = json!({"a": {"b": [10, {"c": "x"}]}, "1": "one"});
        assert_eq!(data_get(&source, "a.b[0]"), Some(&json!(10)));
        assert_eq!(data_get(&source, "a.b.1.c"), Some(&json!("x")));
        assert_eq!(data_get(&source, "a.missing"), None);
        assert_eq!(data_get(&source, "1"), Some(&json!("one")));
    }

    #[test]
    fn test_field_code() {
        let item = ExpressionItem::new(ExpressionType::Field, "9527.xxx");
        assert_eq!(field_code(&item), "$data['9527']['xxx']");

        let item = ExpressionItem::new(ExpressionType::Field, "it's[2]");
        assert_eq!(field_code(&item), "$data['it\\'s'][2]");
    }

    #[test]
    fn test_input_code_by_value_type() {
        let raw = ExpressionItem::new(ExpressionType::Input, "*23+");
        assert_eq!(item_code(&raw), "*23+");

        let number = raw.clone().with_value_type(ValueType::Const);
        assert_eq!(item_code(&number), "'*23+'");

        let number = ExpressionItem::new(ExpressionType::Input, "23.5").with_value_type(ValueType::Const);
        assert_eq!(item_code(&number), "23.5");
    }

    #[test]
    fn test_literal() {
        assert_eq!(literal(&json!(["a", 1, true, null])), "['a', 1, true, null]");
        assert_eq!(literal(&json!({"k": "v"})), "['k' => 'v']");
    }
}
