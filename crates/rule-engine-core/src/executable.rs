//! 可执行代码注册表
//!
//! 宿主侧向规则源码暴露的函数、类（静态方法集合）与常量按规则分组登记。
//! 查找时先查当前分组，未命中再回落到 [`COMMON_GROUP`]。

use crate::sandbox::{CallableScope, HostFunction};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// 默认分组
pub const COMMON_GROUP: &str = "common";

#[derive(Clone)]
pub struct ExecutableFunction {
    name: String,
    function: HostFunction,
    group: Option<String>,
}

impl ExecutableFunction {
    pub fn new<F>(name: impl Into<String>, function: F, group: Option<&str>) -> Self
    where
        F: Fn(&[Value]) -> crate::Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            function: Arc::new(function),
            group: group.map(str::to_string),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// 一组静态方法，源码中以 `Class::method(...)` 调用
#[derive(Clone)]
pub struct ExecutableClass {
    name: String,
    methods: HashMap<String, HostFunction>,
    group: Option<String>,
}

impl ExecutableClass {
    pub fn new(name: impl Into<String>, group: Option<&str>) -> Self {
        Self {
            name: name.into(),
            methods: HashMap::new(),
            group: group.map(str::to_string),
        }
    }

    pub fn with_method<F>(mut self, method: &str, function: F) -> Self
    where
        F: Fn(&[Value]) -> crate::Result<Value> + Send + Sync + 'static,
    {
        self.methods
            .insert(method.to_ascii_lowercase(), Arc::new(function));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone)]
pub struct ExecutableConstant {
    name: String,
    value: Value,
    group: Option<String>,
}

impl ExecutableConstant {
    pub fn new(name: impl Into<String>, value: Value, group: Option<&str>) -> Self {
        Self {
            name: name.into(),
            value,
            group: group.map(str::to_string),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Clone)]
pub enum ExecutableCode {
    Function(ExecutableFunction),
    Class(ExecutableClass),
    Constant(ExecutableConstant),
}

impl ExecutableCode {
    pub fn name(&self) -> &str {
        match self {
            Self::Function(f) => f.name(),
            Self::Class(c) => c.name(),
            Self::Constant(c) => c.name(),
        }
    }

    pub fn group(&self) -> &str {
        let group = match self {
            Self::Function(f) => f.group.as_deref(),
            Self::Class(c) => c.group.as_deref(),
            Self::Constant(c) => c.group.as_deref(),
        };
        group.unwrap_or(COMMON_GROUP)
    }
}

/// 分组内已登记的符号，函数名与类名大小写不敏感，常量区分大小写
#[derive(Default)]
struct GroupEntries {
    functions: HashMap<String, (String, HostFunction)>,
    classes: HashMap<String, (String, HashMap<String, HostFunction>)>,
    constants: HashMap<String, Value>,
}

/// 执行代码的名称清单
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutableNames {
    pub functions: Vec<String>,
    pub classes: Vec<String>,
    pub constants: Vec<String>,
}

#[derive(Clone, Default)]
pub struct ExecutableRegistry {
    groups: Arc<RwLock<HashMap<String, GroupEntries>>>,
}

impl ExecutableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记执行代码，同名覆盖
    pub fn register(&self, code: ExecutableCode) {
        let group = code.group().to_string();
        let name = code.name().to_string();
        let mut groups = self.groups.write();
        let entries = groups.entry(group.clone()).or_default();
        let kind = match code {
            ExecutableCode::Function(f) => {
                entries
                    .functions
                    .insert(f.name.to_ascii_lowercase(), (f.name, f.function));
                "function"
            }
            ExecutableCode::Class(c) => {
                entries
                    .classes
                    .insert(c.name.to_ascii_lowercase(), (c.name, c.methods));
                "class"
            }
            ExecutableCode::Constant(c) => {
                entries.constants.insert(c.name, c.value);
                "constant"
            }
        };
        info!(group = %group, kind, "执行代码已注册: {}", name);
    }

    /// 分组可见的符号名（含公共分组）
    pub fn names(&self, group: &str) -> ExecutableNames {
        let groups = self.groups.read();
        let mut names = ExecutableNames::default();
        for g in lookup_order(group) {
            let Some(entries) = groups.get(g) else {
                continue;
            };
            for (name, _) in entries.functions.values() {
                push_unique(&mut names.functions, name);
            }
            for (name, _) in entries.classes.values() {
                push_unique(&mut names.classes, name);
            }
            for name in entries.constants.keys() {
                push_unique(&mut names.constants, name);
            }
        }
        names.functions.sort();
        names.classes.sort();
        names.constants.sort();
        names
    }

    /// 绑定到某个分组的调用作用域
    pub fn scope(&self, group: &str) -> GroupScope {
        GroupScope {
            registry: self.clone(),
            group: group.to_string(),
        }
    }

    fn find<T>(&self, group: &str, pick: impl Fn(&GroupEntries) -> Option<T>) -> Option<T> {
        let groups = self.groups.read();
        lookup_order(group)
            .into_iter()
            .filter_map(|g| groups.get(g))
            .find_map(pick)
    }
}

fn lookup_order(group: &str) -> Vec<&str> {
    if group == COMMON_GROUP {
        vec![COMMON_GROUP]
    } else {
        vec![group, COMMON_GROUP]
    }
}

fn push_unique(list: &mut Vec<String>, name: &str) {
    if !list.iter().any(|n| n == name) {
        list.push(name.to_string());
    }
}

/// 分组作用域，实现沙箱的符号查找
#[derive(Clone)]
pub struct GroupScope {
    registry: ExecutableRegistry,
    group: String,
}

impl GroupScope {
    pub fn group(&self) -> &str {
        &self.group
    }
}

impl CallableScope for GroupScope {
    fn function(&self, name: &str) -> Option<HostFunction> {
        let key = name.to_ascii_lowercase();
        self.registry.find(&self.group, |entries| {
            entries.functions.get(&key).map(|(_, f)| f.clone())
        })
    }

    fn static_method(&self, class: &str, method: &str) -> Option<HostFunction> {
        let class = class.trim_start_matches('\\').to_ascii_lowercase();
        let method = method.to_ascii_lowercase();
        let found = self.registry.find(&self.group, |entries| {
            entries
                .classes
                .get(&class)
                .and_then(|(_, methods)| methods.get(&method).cloned())
        });
        if found.is_none() {
            debug!(group = %self.group, "静态方法未找到: {}::{}", class, method);
        }
        found
    }

    fn constant(&self, name: &str) -> Option<Value> {
        self.registry
            .find(&self.group, |entries| entries.constants.get(name).cloned())
    }
}
