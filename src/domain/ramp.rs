// ==========================================
// 劳动力产能规划系统 - Ramp 领域模型
// ==========================================
// 职责: Ramp 周输入、Ramp 记录、复合键
// 红线: 复合键 (forecast_id, month_key, ramp_percent, working_days) 相同则更新,不重复插入
// ==========================================

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// 默认应用人
pub const RAMP_APPLIED_BY_SYSTEM: &str = "system";

// ==========================================
// RampWeek - 单周 Ramp 输入
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RampWeek {
    pub label: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub working_days: i64,
    pub ramp_percent: f64,
    pub ramp_employees: i64,
}

// ==========================================
// RampRecord - 已应用的 Ramp 记录
// ==========================================
// 对齐: ramp_record 表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RampRecord {
    pub ramp_id: i64,
    pub forecast_id: i64,
    pub month_key: String,
    pub week_label: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub working_days: i64,
    pub ramp_percent: f64,
    pub employee_count: i64,
    pub notes: Option<String>,
    pub applied_at: NaiveDateTime,
    pub applied_by: String,
}

impl RampRecord {
    pub fn key(&self) -> RampKey {
        RampKey::new(self.forecast_id, &self.month_key, self.ramp_percent, self.working_days)
    }
}

// ==========================================
// RampKey - 复合键
// ==========================================
// ramp_percent 以百分之一精度存入键,保证可哈希
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RampKey {
    pub forecast_id: i64,
    pub month_key: String,
    pub ramp_percent_centi: i64,
    pub working_days: i64,
}

impl RampKey {
    pub fn new(forecast_id: i64, month_key: &str, ramp_percent: f64, working_days: i64) -> Self {
        Self {
            forecast_id,
            month_key: month_key.to_string(),
            ramp_percent_centi: Self::percent_centi(ramp_percent),
            working_days,
        }
    }

    /// ramp_percent 的键值 (百分之一精度)
    pub fn percent_centi(ramp_percent: f64) -> i64 {
        (ramp_percent * 100.0).round() as i64
    }
}

// ==========================================
// AppliedRamp - 已应用 Ramp 查询结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "weeks", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppliedRamp {
    Applied(Vec<RampRecord>), // 按开始日期排序
    NoneApplied,
}
