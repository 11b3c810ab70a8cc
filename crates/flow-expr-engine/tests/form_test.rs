//! 表单与控件集成测试：组件构建、取值、加密字段与脱敏展示

use flow_expr_engine::{Component, EngineContext, FlowExprError, FormType};
use serde_json::{Value as JsonValue, json};

const AES_KEY: &str = "flow-integration-secret";

fn const_value(raw: &str) -> JsonValue {
    json!({
        "type": "const",
        "const_value": [{"type": "input", "value": raw, "name": "", "args": null}],
        "expression_value": null
    })
}

fn order_component() -> JsonValue {
    json!({
        "id": "component-order",
        "version": "1",
        "type": "form",
        "structure": {
            "type": "object",
            "key": "root",
            "sort": 0,
            "required": ["price", "qty"],
            "properties": {
                "price": {"type": "number", "title": "单价", "sort": 0, "value": const_value("10")},
                "qty": {"type": "number", "title": "数量", "sort": 1, "value": const_value("3")},
                "total": {
                    "type": "number",
                    "title": "总价",
                    "sort": 2,
                    "value": {
                        "type": "expression",
                        "const_value": null,
                        "expression_value": [
                            {"type": "fields", "value": "component-order.price", "name": "单价", "args": null},
                            {"type": "input", "value": "*", "name": "", "args": null},
                            {"type": "fields", "value": "component-order.qty", "name": "数量", "args": null}
                        ]
                    }
                },
                "token": {
                    "type": "string",
                    "title": "令牌",
                    "sort": 3,
                    "encryption": true,
                    "value": const_value("t0ken")
                },
                "tags": {
                    "type": "array",
                    "title": "标签",
                    "sort": 4,
                    "items": {"type": "string", "key": "items"}
                }
            }
        }
    })
}

#[test]
fn test_key_value_uses_previous_fields() {
    let ctx = EngineContext::default().with_aes_key(AES_KEY);
    let mut component = Component::fast_create(&order_component())
        .unwrap()
        .unwrap()
        .with_aes_key(AES_KEY);
    let form = component.form().unwrap();

    let result = form.key_value(&ctx, &json!({}), true, "", true).unwrap();
    assert_eq!(result["price"], json!("10"));
    assert_eq!(result["qty"], json!("3"));
    assert_eq!(result["total"], json!("30"));
    assert_eq!(result["token"], json!("t0ken"));
    assert_eq!(result["tags"], json!([]));
}

#[test]
fn test_encrypted_field_is_hidden() {
    let mut component = Component::fast_create(&order_component())
        .unwrap()
        .unwrap()
        .with_aes_key(AES_KEY);
    let form = component.form().unwrap();
    let token = form.property("token").unwrap();
    assert!(token.value().is_none());
    assert!(token.encryption_value().is_some());
    assert!(!component.to_json().to_string().contains("t0ken"));

    let ctx = EngineContext::default().with_aes_key("another-secret");
    let form = component.form().unwrap();
    assert!(matches!(
        form.key_value(&ctx, &json!({}), true, "", true),
        Err(FlowExprError::Crypto(_))
    ));
}

#[test]
fn test_encrypted_field_without_configured_key() {
    let raw = json!({
        "id": "component-login",
        "type": "form",
        "structure": {
            "type": "object",
            "properties": {
                "pwd": {"type": "string", "encryption": true, "value": const_value("TOPSECRET")}
            }
        }
    });
    let mut component = Component::fast_create(&raw).unwrap().unwrap();
    let form = component.form().unwrap();
    assert!(form.property("pwd").unwrap().encryption_value().is_some());

    let stored = component.to_json().to_string();
    assert!(!stored.contains("TOPSECRET"));

    let ctx = EngineContext::default();
    let result = component
        .form()
        .unwrap()
        .key_value(&ctx, &json!({}), true, "", true)
        .unwrap();
    assert_eq!(result, json!({"pwd": "TOPSECRET"}));
}

#[test]
fn test_required_field_missing() {
    let ctx = EngineContext::default();
    let mut component = Component::fast_create(&json!({
        "id": "component-user",
        "type": "form",
        "structure": {
            "type": "object",
            "required": ["name"],
            "properties": {"name": {"type": "string", "title": "姓名"}}
        }
    }))
    .unwrap()
    .unwrap();
    let form = component.form().unwrap();

    let err = form.key_value(&ctx, &json!({}), true, "", true).unwrap_err();
    assert_eq!(err.code(), "SCHEMA_MISMATCH");
    assert_eq!(err.to_string(), "[name]姓名 不能为空");

    let result = form.key_value(&ctx, &json!({}), false, "", true).unwrap();
    assert_eq!(result, json!({"name": null}));
}

#[test]
fn test_type_coercion_error() {
    let ctx = EngineContext::default();
    let mut component = Component::fast_create(&json!({
        "type": "form",
        "structure": {
            "type": "object",
            "properties": {
                "flag": {
                    "type": "object",
                    "value": {
                        "type": "expression",
                        "const_value": null,
                        "expression_value": [{"type": "fields", "value": "input.flag", "name": "", "args": null}]
                    }
                }
            }
        }
    }))
    .unwrap()
    .unwrap();
    let form = component.form().unwrap();

    let result = form
        .key_value(&ctx, &json!({"input": {"flag": {"a": 1}}}), true, "", true)
        .unwrap();
    assert_eq!(result, json!({"flag": {"a": 1}}));

    let err = form
        .key_value(&ctx, &json!({"input": {"flag": "on"}}), true, "", true)
        .unwrap_err();
    assert_eq!(err.code(), "TYPE_COERCION_ERROR");
}

#[test]
fn test_append_const_value_then_title_value() {
    let mut component = Component::fast_create(&order_component())
        .unwrap()
        .unwrap()
        .with_aes_key(AES_KEY);
    let form = component.form_mut().unwrap();
    form.append_const_value(&json!({"price": 25, "tags": ["a", "b"]}), AES_KEY)
        .unwrap();

    let tags = form.property("tags").unwrap();
    assert_eq!(tags.form_type(), FormType::Array);
    assert_eq!(tags.complex_value(), Some(&json!(["a", "b"])));

    let ctx = EngineContext::default().with_aes_key(AES_KEY);
    let form = component.form().unwrap();
    let result = form.key_value(&ctx, &json!({}), true, "", true).unwrap();
    // 写入的固定值不带数据类型，原样返回
    assert_eq!(result["price"], json!(25));
    assert_eq!(result["total"], json!("75"));
    assert_eq!(result["tags"], json!(["a", "b"]));

    let preview = form.title_value(&result).unwrap();
    assert_eq!(preview["单价"], json!(25));
    assert_eq!(preview["标签"], json!(["a", "b"]));
}

#[test]
fn test_is_match_and_tile_list() {
    let mut component = Component::fast_create(&order_component())
        .unwrap()
        .unwrap()
        .with_aes_key(AES_KEY);
    let form = component.form().unwrap();

    assert!(form.is_match(&json!({"price": 1, "qty": 2}), true).unwrap());
    assert!(!form.is_match(&json!({"price": 1}), false).unwrap());
    assert!(form.is_match(&json!({"price": 1}), true).is_err());
    assert!(!form.is_match(&json!({"price": 1, "qty": 2, "tags": "x"}), false).unwrap());

    let tiles = form.tile_list("", "");
    assert_eq!(tiles[0], ("price".to_string(), "单价".to_string()));
    assert!(tiles.contains(&("tags".to_string(), "标签".to_string())));
}

#[test]
fn test_widget_masks_sensitive_values() {
    let raw = json!({
        "id": "component-login",
        "type": "widget",
        "structure": {
            "type": "object",
            "properties": {
                "account": {
                    "type": "string",
                    "value": const_value("admin"),
                    "display_config": {"label": "账号", "widget_type": "input", "required": true, "allow_expression": true}
                },
                "password": {
                    "type": "string",
                    "value": const_value("p@ssw0rd"),
                    "display_config": {"label": "密码", "widget_type": "password", "required": true, "allow_expression": false}
                }
            }
        }
    });
    let ctx = EngineContext::default().with_desensitize_mask("###");

    let mut masked = Component::fast_create(&raw)
        .unwrap()
        .unwrap()
        .with_show_options(ctx.show_options(true));
    let widget = masked.widget().unwrap();
    widget.validate().unwrap();
    let shown = widget.property("password").unwrap().shown_value().unwrap();
    assert_eq!(shown.expression().unwrap().const_literal(), Some(&json!("###")));
    assert!(!masked.to_json().to_string().contains("p@ssw0rd"));

    let mut plain = Component::fast_create(&raw)
        .unwrap()
        .unwrap()
        .with_show_options(ctx.show_options(false));
    let widget = plain.widget().unwrap();
    let shown = widget.property("password").unwrap().shown_value().unwrap();
    assert_eq!(
        shown.expression().unwrap().const_literal(),
        Some(&json!("p@ssw0rd"))
    );
    let account = widget.property("account").unwrap().shown_value().unwrap();
    assert_eq!(account.expression().unwrap().const_literal(), Some(&json!("admin")));
}
