// ==========================================
// 劳动力产能规划系统 - Ramp 计算引擎
// ==========================================
// 职责: Ramp 请求校验 + 逐周产能计算 + 槽位投影
// 红线: 校验在任何存储访问之前完成
// 红线: 有效 FTE 增量取各周人数最大值 (不是求和)
// 红线: 纯计算, 不写库
// ==========================================

use crate::domain::calendar::{MonthConfiguration, MonthKey};
use crate::domain::forecast::MonthSlot;
use crate::domain::ramp::{RampKey, RampWeek};
use crate::engine::capacity_calc::CapacityCalculator;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::instrument;

// ==========================================
// 月度配置缺失时的默认值
// ==========================================
pub const DEFAULT_WORKING_DAYS: f64 = 21.0;
pub const DEFAULT_OCCUPANCY: f64 = 0.95;
pub const DEFAULT_SHRINKAGE: f64 = 0.10;
pub const DEFAULT_WORK_HOURS: f64 = 9.0;

// ==========================================
// RampValidationError - 请求校验错误
// ==========================================
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RampValidationError {
    #[error("月份键格式错误: {0}")]
    MalformedMonthKey(String),

    #[error("至少需要提交一周 Ramp")]
    NoWeeks,

    #[error("第{index}周 ({label}) ramp_employees 不能为负: {value}")]
    NegativeEmployees { index: usize, label: String, value: i64 },

    #[error("第{index}周 ({label}) ramp_percent 超出 0-100: {value}")]
    PercentOutOfRange { index: usize, label: String, value: f64 },

    #[error("第{index}周 ({label}) working_days 不能为负: {value}")]
    NegativeWorkingDays { index: usize, label: String, value: i64 },

    #[error("第{index}周 ({label}) 结束日期早于开始日期")]
    InvertedDates { index: usize, label: String },

    #[error("第{index}周 ({label}) 与 {first_label} 的 (ramp_percent, working_days) 重复")]
    DuplicateKey {
        index: usize,
        label: String,
        first_label: String,
    },

    #[error("total_ramp_employees 与各周人数之和不一致: 声明 {declared}, 实际 {actual}")]
    TotalMismatch { declared: i64, actual: i64 },

    #[error("所有周的 ramp_employees 均为 0")]
    AllZero,
}

impl RampValidationError {
    /// 给调用方的修正提示
    pub fn guidance(&self) -> Option<String> {
        match self {
            RampValidationError::MalformedMonthKey(_) => {
                Some("月份键须为 YYYY-MM, 例如 2025-04".to_string())
            }
            RampValidationError::TotalMismatch { actual, .. } => {
                Some(format!("将 total_ramp_employees 设为 {}", actual))
            }
            RampValidationError::AllZero => {
                Some("至少一周的 ramp_employees 需大于 0".to_string())
            }
            RampValidationError::PercentOutOfRange { .. } => {
                Some("ramp_percent 取值范围为 0 到 100".to_string())
            }
            RampValidationError::DuplicateKey { first_label, .. } => Some(format!(
                "同一 (ramp_percent, working_days) 只能提交一周, 请与 {} 合并",
                first_label
            )),
            _ => None,
        }
    }
}

// ==========================================
// RampValidator
// ==========================================
pub struct RampValidator;

impl RampValidator {
    /// 仅校验月份键
    pub fn parse_month_key(month_key: &str) -> Result<MonthKey, RampValidationError> {
        MonthKey::parse(month_key).ok_or_else(|| RampValidationError::MalformedMonthKey(month_key.to_string()))
    }

    /// 校验完整的 Ramp 请求
    ///
    /// # 返回
    /// - Ok(MonthKey): 解析后的月份
    pub fn validate(
        month_key: &str,
        weeks: &[RampWeek],
        total_ramp_employees: i64,
    ) -> Result<MonthKey, RampValidationError> {
        let month = Self::parse_month_key(month_key)?;

        if weeks.is_empty() {
            return Err(RampValidationError::NoWeeks);
        }

        // (ramp_percent, working_days) -> 首次出现的周标签
        let mut seen: HashMap<(i64, i64), &str> = HashMap::new();
        for (index, week) in weeks.iter().enumerate() {
            if week.ramp_employees < 0 {
                return Err(RampValidationError::NegativeEmployees {
                    index,
                    label: week.label.clone(),
                    value: week.ramp_employees,
                });
            }
            if !week.ramp_percent.is_finite() || !(0.0..=100.0).contains(&week.ramp_percent) {
                return Err(RampValidationError::PercentOutOfRange {
                    index,
                    label: week.label.clone(),
                    value: week.ramp_percent,
                });
            }
            if week.working_days < 0 {
                return Err(RampValidationError::NegativeWorkingDays {
                    index,
                    label: week.label.clone(),
                    value: week.working_days,
                });
            }
            if week.end_date < week.start_date {
                return Err(RampValidationError::InvertedDates {
                    index,
                    label: week.label.clone(),
                });
            }
            let key = (RampKey::percent_centi(week.ramp_percent), week.working_days);
            if let Some(first_label) = seen.insert(key, &week.label) {
                return Err(RampValidationError::DuplicateKey {
                    index,
                    label: week.label.clone(),
                    first_label: first_label.to_string(),
                });
            }
        }

        let actual: i64 = weeks.iter().map(|w| w.ramp_employees).sum();
        if actual != total_ramp_employees {
            return Err(RampValidationError::TotalMismatch {
                declared: total_ramp_employees,
                actual,
            });
        }
        if actual == 0 {
            return Err(RampValidationError::AllZero);
        }

        Ok(month)
    }
}

// ==========================================
// RampConfigUsed - 实际采用的月度参数
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfigSource {
    Configured,
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RampConfigUsed {
    pub working_days: f64,
    pub occupancy: f64,
    pub shrinkage: f64,
    pub work_hours: f64,
    pub source: ConfigSource,
}

impl RampConfigUsed {
    /// 采用已配置值, 缺失时回退默认值并记录告警
    pub fn resolve(config: Option<&MonthConfiguration>, month: MonthKey, worktype: &str) -> Self {
        match config {
            Some(c) => Self {
                working_days: c.working_days,
                occupancy: c.occupancy,
                shrinkage: c.shrinkage,
                work_hours: c.work_hours,
                source: ConfigSource::Configured,
            },
            None => {
                tracing::warn!(
                    month = %month,
                    worktype = %worktype,
                    "月度配置缺失，使用默认产能参数"
                );
                Self::defaults()
            }
        }
    }

    pub fn defaults() -> Self {
        Self {
            working_days: DEFAULT_WORKING_DAYS,
            occupancy: DEFAULT_OCCUPANCY,
            shrinkage: DEFAULT_SHRINKAGE,
            work_hours: DEFAULT_WORK_HOURS,
            source: ConfigSource::Default,
        }
    }
}

// ==========================================
// 计算结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RampWeekImpact {
    pub label: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub working_days: i64,
    pub ramp_percent: f64,
    pub ramp_employees: i64,
    pub week_capacity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RampComputation {
    pub weeks: Vec<RampWeekImpact>,
    pub total_ramp_capacity: f64,
    pub max_ramp_employees: i64,
    pub config: RampConfigUsed,
}

impl RampComputation {
    /// 写入 capacity 的增量 (四舍五入)
    pub fn capacity_delta(&self) -> i64 {
        self.total_ramp_capacity.round() as i64
    }
}

/// 单槽位前后投影
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotProjection {
    pub fte_available_before: i64,
    pub fte_available_after: i64,
    pub capacity_before: i64,
    pub capacity_after: i64,
}

impl SlotProjection {
    pub fn fte_available_delta(&self) -> i64 {
        self.fte_available_after - self.fte_available_before
    }

    pub fn capacity_delta(&self) -> i64 {
        self.capacity_after - self.capacity_before
    }
}

// ==========================================
// RampCalculator
// ==========================================
pub struct RampCalculator;

impl RampCalculator {
    /// 逐周计算 Ramp 产能
    ///
    /// week_capacity = ramp_employees × target_cph × work_hours × occupancy × (1 − shrinkage) × working_days
    ///
    /// ramp_percent 只作为记录键与展示, 不参与产能公式
    #[instrument(skip(weeks, config), fields(week_count = weeks.len()))]
    pub fn compute(target_cph: f64, weeks: &[RampWeek], config: &RampConfigUsed) -> RampComputation {
        let impacts: Vec<RampWeekImpact> = weeks
            .iter()
            .map(|week| RampWeekImpact {
                label: week.label.clone(),
                start_date: week.start_date,
                end_date: week.end_date,
                working_days: week.working_days,
                ramp_percent: week.ramp_percent,
                ramp_employees: week.ramp_employees,
                week_capacity: CapacityCalculator::ramp_week_capacity(
                    week.ramp_employees,
                    target_cph,
                    config.work_hours,
                    config.occupancy,
                    config.shrinkage,
                    week.working_days,
                ),
            })
            .collect();

        let total_ramp_capacity: f64 = impacts.iter().map(|w| w.week_capacity).sum();
        let max_ramp_employees = impacts.iter().map(|w| w.ramp_employees).max().unwrap_or(0);

        tracing::debug!(total_ramp_capacity, max_ramp_employees, "Ramp 计算完成");

        RampComputation {
            weeks: impacts,
            total_ramp_capacity,
            max_ramp_employees,
            config: config.clone(),
        }
    }

    /// 槽位投影: fte_available += max, capacity += round(total)
    pub fn project(slot: &MonthSlot, computation: &RampComputation) -> SlotProjection {
        SlotProjection {
            fte_available_before: slot.fte_available,
            fte_available_after: slot.fte_available + computation.max_ramp_employees,
            capacity_before: slot.capacity,
            capacity_after: slot.capacity + computation.capacity_delta(),
        }
    }
}
