// ==========================================
// 劳动力产能规划系统 - 策略快照
// ==========================================
// 职责: 一次操作内使用的只读策略视图
// 红线: 快照不提供默认值, 缺省由调用点显式给出
// ==========================================

use crate::domain::types::PolicyValue;
use std::collections::HashMap;

// ==========================================
// PolicySnapshot
// ==========================================
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicySnapshot {
    values: HashMap<String, PolicyValue>,
}

impl PolicySnapshot {
    pub fn new(values: HashMap<String, PolicyValue>) -> Self {
        Self { values }
    }

    /// 链式设置 (测试与预演场景构造快照)
    pub fn with(mut self, key: &str, value: PolicyValue) -> Self {
        self.values.insert(key.to_string(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&PolicyValue> {
        self.values.get(key)
    }

    /// 读取布尔策略; 键缺失或类型不符返回 None
    pub fn bool(&self, key: &str) -> Option<bool> {
        match self.values.get(key) {
            Some(PolicyValue::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        match self.values.get(key) {
            Some(PolicyValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(PolicyValue::Text(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_reads_do_not_coerce() {
        let snapshot = PolicySnapshot::default()
            .with("A", PolicyValue::Bool(false))
            .with("B", PolicyValue::Int(3))
            .with("C", PolicyValue::Text("PH-".to_string()));

        assert_eq!(snapshot.bool("A"), Some(false));
        assert_eq!(snapshot.int("A"), None);
        assert_eq!(snapshot.int("B"), Some(3));
        assert_eq!(snapshot.text("C"), Some("PH-"));
        assert_eq!(snapshot.bool("MISSING"), None);
        assert_eq!(snapshot.len(), 3);
    }
}
