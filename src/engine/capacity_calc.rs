// ==========================================
// 劳动力产能规划系统 - 产能计算器
// ==========================================
// 公式: tier_fraction × working_days × work_hours × (1 − shrinkage) × occupancy × target_cph
// 红线: 纯算术, 参数合法性由调用方保证
// ==========================================

use crate::domain::calendar::WeekConfiguration;

/// 周路径无占用率概念时使用的占用率
pub const NEUTRAL_OCCUPANCY: f64 = 1.0;

// ==========================================
// CapacityInputs - 计算参数
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapacityInputs {
    pub tier_fraction: f64,
    pub working_days: f64,
    pub work_hours: f64,
    pub shrinkage: f64,
    pub occupancy: f64,
    pub target_cph: f64,
}

impl CapacityInputs {
    /// 周配置 + 档位比例 + 目标处理量
    pub fn from_week(week: &WeekConfiguration, tier_fraction: f64, target_cph: f64) -> Self {
        Self {
            tier_fraction,
            working_days: week.working_days,
            work_hours: week.work_hours,
            shrinkage: week.shrinkage,
            occupancy: week.occupancy.unwrap_or(NEUTRAL_OCCUPANCY),
            target_cph,
        }
    }
}

// ==========================================
// CapacityCalculator
// ==========================================
pub struct CapacityCalculator;

impl CapacityCalculator {
    /// 单个资源在一个周期内的产能
    pub fn capacity(inputs: &CapacityInputs) -> f64 {
        inputs.tier_fraction
            * inputs.working_days
            * inputs.work_hours
            * (1.0 - inputs.shrinkage)
            * inputs.occupancy
            * inputs.target_cph
    }

    /// Ramp 单周产能 (人数替代档位比例)
    pub fn ramp_week_capacity(
        ramp_employees: i64,
        target_cph: f64,
        work_hours: f64,
        occupancy: f64,
        shrinkage: f64,
        working_days: i64,
    ) -> f64 {
        Self::capacity(&CapacityInputs {
            tier_fraction: ramp_employees as f64,
            working_days: working_days as f64,
            work_hours,
            shrinkage,
            occupancy,
            target_cph,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::calendar::{iso_week_end, iso_week_start};

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_weekly_capacity_without_occupancy_uses_one() {
        let week = WeekConfiguration {
            year: 2025,
            week_number: 15,
            week_start: iso_week_start(2025, 15).unwrap(),
            week_end: iso_week_end(2025, 15).unwrap(),
            month: 4,
            month_year: 2025,
            working_days: 5.0,
            work_hours: 8.0,
            shrinkage: 0.25,
            occupancy: None,
        };
        let inputs = CapacityInputs::from_week(&week, 0.5, 4.0);
        // 0.5 × 5 × 8 × 0.75 × 1.0 × 4 = 60
        assert!(approx(CapacityCalculator::capacity(&inputs), 60.0));
    }

    #[test]
    fn test_weekly_capacity_applies_explicit_occupancy() {
        let week = WeekConfiguration {
            year: 2025,
            week_number: 16,
            week_start: iso_week_start(2025, 16).unwrap(),
            week_end: iso_week_end(2025, 16).unwrap(),
            month: 4,
            month_year: 2025,
            working_days: 4.0,
            work_hours: 9.0,
            shrinkage: 0.10,
            occupancy: Some(0.95),
        };
        let inputs = CapacityInputs::from_week(&week, 1.0, 4.5);
        assert!(approx(CapacityCalculator::capacity(&inputs), 4.0 * 9.0 * 0.9 * 0.95 * 4.5));
    }

    #[test]
    fn test_ramp_week_capacity() {
        let v = CapacityCalculator::ramp_week_capacity(2, 4.5, 9.0, 0.95, 0.10, 4);
        assert!(approx(v, 2.0 * 4.5 * 9.0 * 0.95 * 0.9 * 4.0));
        assert_eq!(CapacityCalculator::ramp_week_capacity(0, 4.5, 9.0, 0.95, 0.10, 4), 0.0);
    }
}
