// ==========================================
// 劳动力产能规划系统 - 月度产能汇总引擎
// ==========================================
// 职责: 由有效周分配 + 需求行重算月度汇总
// 口径: 周归属其周一所在月份; 缺口 = 总产能 − 需求
// 红线: 每次全量重算, 不做增量累加
// ==========================================

use crate::domain::assignment::{MonthlyCapacitySummary, TierBreakdown, WeeklyAssignment};
use crate::domain::calendar::MonthKey;
use crate::domain::forecast::ForecastDemand;
use crate::domain::types::ResourceKind;
use chrono::NaiveDateTime;
use std::collections::{BTreeMap, HashSet};
use tracing::instrument;

#[derive(Default)]
struct TierAccumulator {
    percentage: f64,
    capacity: f64,
    resources: HashSet<String>,
}

pub struct AggregationEngine;

impl AggregationEngine {
    /// 汇总某月产能
    ///
    /// # 参数
    /// - assignments: 候选周分配 (非有效或不在该月的会被忽略)
    /// - demands: 需求行 (窗口覆盖该月的行计入需求)
    /// - include_placeholders: 占位产能是否计入总产能与档位明细
    #[instrument(skip(assignments, demands), fields(month = %month, assignment_count = assignments.len()))]
    pub fn summarize(
        month: MonthKey,
        assignments: &[WeeklyAssignment],
        demands: &[ForecastDemand],
        include_placeholders: bool,
        generated_at: NaiveDateTime,
    ) -> MonthlyCapacitySummary {
        let mut actual_resources: HashSet<&str> = HashSet::new();
        let mut placeholder_resources: HashSet<&str> = HashSet::new();
        let mut actual_capacity = 0.0;
        let mut placeholder_capacity = 0.0;
        let mut tiers: BTreeMap<String, TierAccumulator> = BTreeMap::new();

        for assignment in assignments
            .iter()
            .filter(|a| a.is_active && month.contains(a.week_start))
        {
            match assignment.resource_kind {
                ResourceKind::Actual => {
                    actual_resources.insert(assignment.resource_id.as_str());
                    actual_capacity += assignment.weekly_capacity;
                }
                ResourceKind::Placeholder => {
                    placeholder_resources.insert(assignment.resource_id.as_str());
                    placeholder_capacity += assignment.weekly_capacity;
                    if !include_placeholders {
                        continue;
                    }
                }
            }

            let entry = tiers.entry(assignment.tier_name.clone()).or_default();
            entry.percentage = assignment.tier_percentage;
            entry.capacity += assignment.weekly_capacity;
            entry.resources.insert(assignment.resource_id.clone());
        }

        let total_capacity = if include_placeholders {
            actual_capacity + placeholder_capacity
        } else {
            actual_capacity
        };

        let forecast_demand: f64 = demands
            .iter()
            .filter_map(|d| d.resolve_slot(month).map(|slot| d.months[slot].forecast as f64))
            .sum();

        let mut tier_rows: Vec<(f64, TierBreakdown)> = tiers
            .into_iter()
            .map(|(tier_name, acc)| {
                let resource_count = acc.resources.len();
                (
                    acc.percentage,
                    TierBreakdown {
                        tier_name,
                        capacity: acc.capacity,
                        fte_equivalent: resource_count as f64 * acc.percentage / 100.0,
                        resource_count,
                    },
                )
            })
            .collect();
        // 档位按百分比降序
        tier_rows.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.tier_name.cmp(&b.1.tier_name)));

        MonthlyCapacitySummary {
            month: month.month,
            year: month.year,
            actual_fte: actual_resources.len(),
            placeholder_fte: placeholder_resources.len(),
            actual_capacity,
            placeholder_capacity,
            total_capacity,
            forecast_demand,
            capacity_gap: total_capacity - forecast_demand,
            tier_breakdown: tier_rows.into_iter().map(|(_, row)| row).collect(),
            generated_at,
        }
    }
}
