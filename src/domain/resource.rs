// ==========================================
// 劳动力产能规划系统 - 资源领域模型
// ==========================================
// 职责: 在职员工与待招聘占位的统一资源实体
// 红线: 在用资源ID不得复用; 已转换的占位保留用于审计
// ==========================================

use crate::domain::types::ResourceKind;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ==========================================
// Resource - 劳动力资源
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    // ===== 主键 =====
    pub resource_id: String,             // 资源ID (占位为 前缀+序号)
    pub kind: ResourceKind,              // 资源类型

    // ===== 匹配维度 =====
    pub platform: String,                // 平台
    pub location: String,                // 站点
    pub states: Vec<String>,             // 可服务州
    pub skills: Vec<String>,             // 技能 (对应需求 case_type)

    // ===== 可用窗口 =====
    pub available_from: Option<NaiveDate>,
    pub available_until: Option<NaiveDate>,

    // ===== 生命周期 =====
    pub is_active: bool,
    pub replaced_by: Option<String>,     // 占位转正后指向的真实资源ID
}

impl Resource {
    /// 创建在职员工资源
    pub fn actual(
        resource_id: &str,
        platform: &str,
        location: &str,
        states: Vec<String>,
        skills: Vec<String>,
    ) -> Self {
        Self {
            resource_id: resource_id.to_string(),
            kind: ResourceKind::Actual,
            platform: platform.to_string(),
            location: location.to_string(),
            states,
            skills,
            available_from: None,
            available_until: None,
            is_active: true,
            replaced_by: None,
        }
    }

    /// 创建占位资源 (匹配维度取自需求行)
    pub fn placeholder(
        resource_id: String,
        platform: &str,
        location: &str,
        state: &str,
        skill: &str,
    ) -> Self {
        Self {
            resource_id,
            kind: ResourceKind::Placeholder,
            platform: platform.to_string(),
            location: location.to_string(),
            states: vec![state.to_string()],
            skills: vec![skill.to_string()],
            available_from: None,
            available_until: None,
            is_active: true,
            replaced_by: None,
        }
    }

    pub fn with_window(mut self, from: Option<NaiveDate>, until: Option<NaiveDate>) -> Self {
        self.available_from = from;
        self.available_until = until;
        self
    }

    pub fn is_placeholder(&self) -> bool {
        self.kind == ResourceKind::Placeholder
    }
}

// ==========================================
// 占位ID 生成
// ==========================================

/// 占位序号位宽
pub const PLACEHOLDER_SEQ_WIDTH: usize = 6;

/// 生成占位ID, 例如 `PH-000042`
pub fn format_placeholder_id(prefix: &str, seq: u32) -> String {
    format!("{}{:0width$}", prefix, seq, width = PLACEHOLDER_SEQ_WIDTH)
}

/// 从占位ID解析序号 (前缀不符或序号非法时返回 None)
pub fn parse_placeholder_seq(prefix: &str, resource_id: &str) -> Option<u32> {
    resource_id.strip_prefix(prefix)?.parse::<u32>().ok()
}

/// 把多值字段编码为数据库存储格式 (逗号分隔)
pub fn join_values(values: &[String]) -> String {
    values.join(",")
}

/// 解析数据库中的多值字段
pub fn split_values(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_id_format_and_parse() {
        let id = format_placeholder_id("PH-", 42);
        assert_eq!(id, "PH-000042");
        assert_eq!(parse_placeholder_seq("PH-", &id), Some(42));
        assert_eq!(parse_placeholder_seq("PH-", "EMP-001"), None);
        assert_eq!(parse_placeholder_seq("PH-", "PH-abc"), None);
    }

    #[test]
    fn test_split_values_ignores_blanks() {
        assert_eq!(split_values("CA, TX,,NY "), vec!["CA", "TX", "NY"]);
        assert!(split_values("").is_empty());
    }
}
