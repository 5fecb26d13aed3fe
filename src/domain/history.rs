// ==========================================
// 劳动力产能规划系统 - 变更历史领域模型
// ==========================================
// 职责: 字段路径/字段集合/快照 + 变更记录 + 历史日志
// 红线: 变更记录只能由前后快照差异推导,不得硬编码字段列表
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;

// ==========================================
// FieldPath - 字段路径 ("{group}.{field}")
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldPath {
    pub group: String, // 分组 (如月份标签 Apr-2025)
    pub field: String, // 字段名
}

impl FieldPath {
    pub fn new(group: &str, field: &str) -> Self {
        Self {
            group: group.to_string(),
            field: field.to_string(),
        }
    }

    pub fn dotted(&self) -> String {
        format!("{}.{}", self.group, self.field)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.field)
    }
}

// ==========================================
// FieldSchema - 受跟踪字段集合 (有序)
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    paths: Vec<FieldPath>,
}

impl FieldSchema {
    pub fn new(paths: Vec<FieldPath>) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &[FieldPath] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

// ==========================================
// FieldSnapshot - 字段快照
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldSnapshot {
    values: BTreeMap<FieldPath, i64>,
}

impl FieldSnapshot {
    pub fn insert(&mut self, path: FieldPath, value: i64) {
        self.values.insert(path, value);
    }

    pub fn get(&self, path: &FieldPath) -> Option<i64> {
        self.values.get(path).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ==========================================
// FieldChange / ChangeRecord - 变更记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub path: String,      // 点分路径
    pub group: String,
    pub field: String,
    pub old_value: i64,
    pub new_value: i64,
    pub delta: i64,        // new - old (带符号)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub changes: Vec<FieldChange>,
    pub modified_fields: Vec<String>,
}

impl ChangeRecord {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// 简短摘要文本
    pub fn summary_text(&self) -> String {
        if self.changes.is_empty() {
            return "无字段变更".to_string();
        }
        self.changes
            .iter()
            .map(|c| format!("{} {:+}", c.path, c.delta))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

// ==========================================
// HistoryChangeType - 历史变更类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryChangeType {
    RampApply,           // 应用 Ramp
    AllocationRun,       // 执行分配
    PlaceholderConvert,  // 占位转正
}

impl HistoryChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryChangeType::RampApply => "RAMP_APPLY",
            HistoryChangeType::AllocationRun => "ALLOCATION_RUN",
            HistoryChangeType::PlaceholderConvert => "PLACEHOLDER_CONVERT",
        }
    }
}

// ==========================================
// HistoryLog - 历史日志
// ==========================================
// 对齐: history_log 表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryLog {
    pub history_log_id: String,      // UUID
    pub entity_type: String,         // 实体类型 (forecast_demand)
    pub entity_id: String,           // 实体ID
    pub change_type: String,
    pub month_key: Option<String>,
    pub actor: String,
    pub notes: Option<String>,
    pub summary: String,
    pub change_record_json: Option<JsonValue>,
    pub created_at: NaiveDateTime,
}

impl HistoryLog {
    pub fn new(entity_type: &str, entity_id: &str, change_type: HistoryChangeType, actor: &str) -> Self {
        Self {
            history_log_id: uuid::Uuid::new_v4().to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            change_type: change_type.as_str().to_string(),
            month_key: None,
            actor: actor.to_string(),
            notes: None,
            summary: String::new(),
            change_record_json: None,
            created_at: chrono::Utc::now().naive_utc(),
        }
    }

    /// 设置变更记录 (转换为JSON)
    pub fn with_change_record(mut self, record: &ChangeRecord) -> Self {
        self.summary = record.summary_text();
        self.change_record_json = serde_json::to_value(record).ok();
        self
    }

    pub fn with_month_key(mut self, month_key: &str) -> Self {
        self.month_key = Some(month_key.to_string());
        self
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }
}
