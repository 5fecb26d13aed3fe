// ==========================================
// 劳动力产能规划系统 - 领域类型定义
// ==========================================
// 职责: 资源类型、策略分类、策略取值等基础枚举
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 资源类型 (Resource Kind)
// ==========================================
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceKind {
    Actual,      // 在职员工
    Placeholder, // 待招聘占位
}

impl ResourceKind {
    /// 转换为字符串 (用于数据库存储)
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Actual => "ACTUAL",
            ResourceKind::Placeholder => "PLACEHOLDER",
        }
    }

    /// 从字符串解析
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTUAL" => Some(ResourceKind::Actual),
            "PLACEHOLDER" => Some(ResourceKind::Placeholder),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 策略分类 (Policy Category)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyCategory {
    Availability, // 可用性窗口
    Allocation,   // 分配规则
    Reporting,    // 报表口径
}

impl PolicyCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyCategory::Availability => "AVAILABILITY",
            PolicyCategory::Allocation => "ALLOCATION",
            PolicyCategory::Reporting => "REPORTING",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AVAILABILITY" => Some(PolicyCategory::Availability),
            "ALLOCATION" => Some(PolicyCategory::Allocation),
            "REPORTING" => Some(PolicyCategory::Reporting),
            _ => None,
        }
    }
}

impl fmt::Display for PolicyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 策略取值 (Policy Value)
// ==========================================
// 红线: 类型由种子值确定,更新时不得改变类型
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl PolicyValue {
    /// 类型标签 (用于数据库存储)
    pub fn type_tag(&self) -> &'static str {
        match self {
            PolicyValue::Bool(_) => "BOOL",
            PolicyValue::Int(_) => "INT",
            PolicyValue::Float(_) => "FLOAT",
            PolicyValue::Text(_) => "TEXT",
        }
    }

    /// 原始字符串表示 (用于数据库存储)
    pub fn to_raw(&self) -> String {
        match self {
            PolicyValue::Bool(v) => v.to_string(),
            PolicyValue::Int(v) => v.to_string(),
            PolicyValue::Float(v) => v.to_string(),
            PolicyValue::Text(v) => v.clone(),
        }
    }

    /// 根据类型标签解析原始字符串
    ///
    /// # 返回
    /// - None: 类型标签未知或取值无法解析
    pub fn from_raw(type_tag: &str, raw: &str) -> Option<Self> {
        match type_tag {
            "BOOL" => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Some(PolicyValue::Bool(true)),
                "false" | "0" => Some(PolicyValue::Bool(false)),
                _ => None,
            },
            "INT" => raw.trim().parse::<i64>().ok().map(PolicyValue::Int),
            "FLOAT" => raw.trim().parse::<f64>().ok().map(PolicyValue::Float),
            "TEXT" => Some(PolicyValue::Text(raw.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for PolicyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_raw())
    }
}
