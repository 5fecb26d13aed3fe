// ==========================================
// 劳动力产能规划系统 - 周分配与月度汇总
// ==========================================
// 红线: 同一资源在同一 (year, week) 至多一条有效分配
// 红线: 月度汇总只能由周分配 + 需求重算,不得手工修改
// ==========================================

use crate::domain::types::ResourceKind;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ==========================================
// WeeklyAssignment - 周分配
// ==========================================
// 对齐: weekly_assignment 表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyAssignment {
    pub assignment_id: String,
    pub resource_id: String,
    pub resource_kind: ResourceKind,
    pub forecast_id: i64,

    // ===== 周期 =====
    pub year: i32,
    pub week_number: u32,
    pub week_start: NaiveDate,

    // ===== 档位与产能 =====
    pub tier_name: String,
    pub tier_percentage: f64,
    pub weekly_capacity: f64,

    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

impl WeeklyAssignment {
    /// 档位比例 (0.0 - 1.0)
    pub fn tier_fraction(&self) -> f64 {
        self.tier_percentage / 100.0
    }

    pub fn week_key(&self) -> (i32, u32) {
        (self.year, self.week_number)
    }
}

// ==========================================
// TierBreakdown - 档位明细
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierBreakdown {
    pub tier_name: String,
    pub capacity: f64,
    pub fte_equivalent: f64, // 档位比例之和 (按资源去重)
    pub resource_count: usize,
}

// ==========================================
// MonthlyCapacitySummary - 月度产能汇总
// ==========================================
// 对齐: monthly_capacity_summary 表 (物化视图,可安全覆盖)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyCapacitySummary {
    pub month: u32,
    pub year: i32,

    // ===== 人数 =====
    pub actual_fte: usize,
    pub placeholder_fte: usize,

    // ===== 产能 =====
    pub actual_capacity: f64,
    pub placeholder_capacity: f64,
    pub total_capacity: f64,

    // ===== 缺口 =====
    pub forecast_demand: f64,
    pub capacity_gap: f64, // total_capacity - forecast_demand

    pub tier_breakdown: Vec<TierBreakdown>,
    pub generated_at: NaiveDateTime,
}

// ==========================================
// AllocationCounts - 分配计数 (按资源类型)
// ==========================================
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationCounts {
    pub actual: usize,
    pub placeholder: usize,
}

impl AllocationCounts {
    pub fn record(&mut self, kind: ResourceKind) {
        match kind {
            ResourceKind::Actual => self.actual += 1,
            ResourceKind::Placeholder => self.placeholder += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.actual + self.placeholder
    }
}
