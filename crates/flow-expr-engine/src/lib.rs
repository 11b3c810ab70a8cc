//! 低代码表达式引擎
//!
//! 把前端提交的 JSON 结构（表达式、值、条件、表单、控件）构建为类型化的模型，
//! 生成代码并交给规则引擎的原生沙箱执行。
//!
//! ```text
//! Component { id, version, type, structure }
//!   ├─ Expression ── ExpressionItem（字段 / 函数 / 字面量 / 展示值）
//!   ├─ Value ─────── 固定值或表达式 + DataType 格式化
//!   ├─ Condition ─── AND / OR 树，叶子为运算项或比较项
//!   └─ Form / Widget ─ 字段树，取值、标题、校验、脱敏
//!                          │
//!                          ▼
//!                 EngineContext ── CodeRunner ── rule_engine_core
//! ```

pub mod code_runner;
pub mod component;
pub mod condition;
pub mod context;
pub mod error;
pub mod expression;
pub mod form;
pub mod value;
pub mod widget;

pub use code_runner::{CodeRunner, SandboxCodeRunner};
pub use component::{Component, Structure, StructureType};
pub use condition::{CompareType, Condition, ConditionBuilder, ConditionItem, ConditionNode, Ops};
pub use context::EngineContext;
pub use error::{FlowExprError, Result};
pub use expression::{Expression, ExpressionBuilder, ExpressionItem, ExpressionType, ValueType};
pub use form::{Form, FormBuilder, FormType, WidgetBuilder};
pub use value::{DataType, Value, ValueSource};
pub use widget::{DisplayConfig, SelectExtra, ShowOptions, Widget};
