//! 资源/操作模式匹配与条件求值

use super::Attributes;

/// 模式匹配：`*` 匹配任意值，`foo*` 匹配以 `foo` 开头的值，否则要求完全相等
pub fn matches_pattern(pattern: &str, value: &str) -> bool {
    if pattern == "*" || pattern == value {
        return true;
    }
    match pattern.strip_suffix('*') {
        Some(prefix) => value.starts_with(prefix),
        None => false,
    }
}

pub fn matches_resource(pattern: &str, requested: &str) -> bool {
    matches_pattern(pattern, requested)
}

pub fn matches_action(pattern: &str, requested: &str) -> bool {
    matches_pattern(pattern, requested)
}

/// 条件求值
///
/// 条件为空时恒成立；否则每个键都必须出现在上下文中且值严格相等（不做类型转换）。
pub fn evaluate_conditions(conditions: &Attributes, context: &Attributes) -> bool {
    conditions
        .iter()
        .all(|(key, expected)| context.get(key) == Some(expected))
}
