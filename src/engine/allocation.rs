// ==========================================
// 劳动力产能规划系统 - 资源匹配与分配引擎
// ==========================================
// 职责: 按需求行逐周匹配资源, 生成周分配
// 规则:
// 1) 精确匹配 platform / location / state ∈ states / case_type ∈ skills, 仅在用资源
// 2) 可用性窗口过滤
// 3) 在职员工优先于占位, 同类按资源ID排序
// 4) 不足时按策略创建占位 (单需求单次运行有上限, 超限记录诊断并停止该需求)
// 5) 档位: 外部指定优先, 否则默认档位
// 6) 产能由 CapacityCalculator 计算
// 红线: 纯计算, 不写库; 持久化与冲突检查由调用方在事务内完成
// ==========================================

use crate::config::policy_keys;
use crate::config::PolicySnapshot;
use crate::domain::assignment::{AllocationCounts, WeeklyAssignment};
use crate::domain::calendar::WeekConfiguration;
use crate::domain::forecast::ForecastDemand;
use crate::domain::resource::{format_placeholder_id, Resource};
use crate::domain::tier::CapacityTier;
use crate::domain::types::ResourceKind;
use crate::engine::availability::{AvailabilityEvaluator, AvailabilityPolicy};
use crate::engine::capacity_calc::{CapacityCalculator, CapacityInputs};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::instrument;

// ==========================================
// AllocationPolicy - 一次运行使用的策略
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationPolicy {
    pub availability: AvailabilityPolicy,
    pub auto_create_placeholders: bool,
    pub max_placeholders_per_request: usize,
    pub placeholder_prefix: String,
    pub default_tier_name: String,
}

impl AllocationPolicy {
    pub fn from_snapshot(snapshot: &PolicySnapshot) -> Self {
        Self {
            availability: AvailabilityPolicy::from_snapshot(snapshot),
            auto_create_placeholders: snapshot
                .bool(policy_keys::AUTO_CREATE_PLACEHOLDERS)
                .unwrap_or(true),
            max_placeholders_per_request: snapshot
                .int(policy_keys::MAX_PLACEHOLDERS_PER_REQUEST)
                .map(|v| v.max(0) as usize)
                .unwrap_or(50),
            placeholder_prefix: snapshot
                .text(policy_keys::PLACEHOLDER_ID_PREFIX)
                .unwrap_or("PH-")
                .to_string(),
            default_tier_name: snapshot
                .text(policy_keys::DEFAULT_TIER_NAME)
                .unwrap_or("100%")
                .to_string(),
        }
    }
}

// ==========================================
// AllocationInput - 引擎输入
// ==========================================
pub struct AllocationInput<'a> {
    pub demands: &'a [ForecastDemand],
    /// 在用资源 (含已有占位)
    pub resources: &'a [Resource],
    /// 范围内的周配置
    pub weeks: &'a [WeekConfiguration],
    /// 在用档位
    pub tiers: &'a [CapacityTier],
    /// 外部指定档位: resource_id -> tier_name
    pub tier_overrides: &'a HashMap<String, String>,
    /// 范围内已有的有效分配
    pub existing: &'a [WeeklyAssignment],
    /// 下一个占位序号
    pub next_placeholder_seq: u32,
    pub now: NaiveDateTime,
}

// ==========================================
// AllocationDiagnostic - 非致命诊断
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationDiagnostic {
    /// 占位数达到上限, 该需求停止分配
    PlaceholderCapExceeded {
        forecast_id: i64,
        cap: usize,
        year: i32,
        week_number: u32,
        unfilled: usize,
    },
    /// 未开启自动占位时的人员缺口
    Shortfall {
        forecast_id: i64,
        year: i32,
        week_number: u32,
        required: usize,
        filled: usize,
    },
    /// 写入时检测到同周已有有效分配
    Conflict {
        resource_id: String,
        year: i32,
        week_number: u32,
    },
    /// 档位不存在或已停用
    UnknownTier {
        resource_id: String,
        tier_name: String,
    },
}

impl AllocationDiagnostic {
    pub fn message(&self) -> String {
        match self {
            AllocationDiagnostic::PlaceholderCapExceeded {
                forecast_id,
                cap,
                year,
                week_number,
                unfilled,
            } => format!(
                "需求{}在{}-W{:02}占位数达到上限{}, 剩余{}人未分配, 停止该需求",
                forecast_id, year, week_number, cap, unfilled
            ),
            AllocationDiagnostic::Shortfall {
                forecast_id,
                year,
                week_number,
                required,
                filled,
            } => format!(
                "需求{}在{}-W{:02}人员不足: 需要{}, 已分配{}",
                forecast_id, year, week_number, required, filled
            ),
            AllocationDiagnostic::Conflict {
                resource_id,
                year,
                week_number,
            } => format!("资源{}在{}-W{:02}已有有效分配", resource_id, year, week_number),
            AllocationDiagnostic::UnknownTier { resource_id, tier_name } => {
                format!("资源{}的档位{}不存在或已停用", resource_id, tier_name)
            }
        }
    }
}

// ==========================================
// AllocationOutcome - 引擎输出
// ==========================================
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllocationOutcome {
    pub assignments: Vec<WeeklyAssignment>,
    pub new_placeholders: Vec<Resource>,
    pub diagnostics: Vec<AllocationDiagnostic>,
    pub counts: AllocationCounts,
}

// ==========================================
// AllocationEngine
// ==========================================
pub struct AllocationEngine {
    policy: AllocationPolicy,
}

impl AllocationEngine {
    pub fn new(policy: AllocationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &AllocationPolicy {
        &self.policy
    }

    /// 执行分配 (纯计算)
    #[instrument(skip(self, input), fields(
        demands = input.demands.len(),
        resources = input.resources.len(),
        weeks = input.weeks.len()
    ))]
    pub fn allocate(&self, input: &AllocationInput<'_>) -> AllocationOutcome {
        let mut outcome = AllocationOutcome::default();

        let tiers: HashMap<&str, &CapacityTier> = input
            .tiers
            .iter()
            .filter(|t| t.is_active)
            .map(|t| (t.tier_name.as_str(), t))
            .collect();

        // (resource_id, year, week) 已占用
        let mut busy: HashSet<(String, i32, u32)> = input
            .existing
            .iter()
            .filter(|a| a.is_active)
            .map(|a| (a.resource_id.clone(), a.year, a.week_number))
            .collect();

        // (forecast_id, year, week) 已有人数
        let mut filled: HashMap<(i64, i32, u32), usize> = HashMap::new();
        for a in input.existing.iter().filter(|a| a.is_active) {
            *filled.entry((a.forecast_id, a.year, a.week_number)).or_insert(0) += 1;
        }

        let mut pool: Vec<Resource> = input
            .resources
            .iter()
            .filter(|r| r.is_active)
            .cloned()
            .collect();
        let mut next_seq = input.next_placeholder_seq;

        let mut weeks: Vec<&WeekConfiguration> = input.weeks.iter().collect();
        weeks.sort_by_key(|w| (w.week_start, w.year, w.week_number));

        let mut demands: Vec<&ForecastDemand> = input.demands.iter().collect();
        demands.sort_by_key(|d| d.forecast_id);

        for demand in demands {
            let mut created_for_demand = 0usize;

            'weeks: for week in &weeks {
                let Some(slot) = demand.resolve_slot(week.month_key()) else {
                    continue;
                };
                let required = demand.months[slot].fte_required.max(0) as usize;
                let already = filled
                    .get(&(demand.forecast_id, week.year, week.week_number))
                    .copied()
                    .unwrap_or(0);
                if already >= required {
                    continue;
                }
                let needed = required - already;

                // === 步骤 1-3: 匹配 + 可用性 + 排序 ===
                let mut candidates: Vec<&Resource> = pool
                    .iter()
                    .filter(|r| matches_demand(r, demand))
                    .filter(|r| !busy.contains(&(r.resource_id.clone(), week.year, week.week_number)))
                    .filter(|r| {
                        AvailabilityEvaluator::is_available(
                            r,
                            week.week_start,
                            week.week_end,
                            &self.policy.availability,
                        )
                    })
                    .collect();
                candidates.sort_by(|a, b| {
                    kind_rank(a.kind)
                        .cmp(&kind_rank(b.kind))
                        .then_with(|| a.resource_id.cmp(&b.resource_id))
                });
                let mut chosen: Vec<Resource> = candidates.into_iter().take(needed).cloned().collect();

                // === 步骤 4: 占位补足 ===
                let mut stop_demand = false;
                if chosen.len() < needed {
                    if self.policy.auto_create_placeholders {
                        while chosen.len() < needed {
                            if created_for_demand >= self.policy.max_placeholders_per_request {
                                let diagnostic = AllocationDiagnostic::PlaceholderCapExceeded {
                                    forecast_id: demand.forecast_id,
                                    cap: self.policy.max_placeholders_per_request,
                                    year: week.year,
                                    week_number: week.week_number,
                                    unfilled: needed - chosen.len(),
                                };
                                tracing::warn!(forecast_id = demand.forecast_id, "{}", diagnostic.message());
                                outcome.diagnostics.push(diagnostic);
                                stop_demand = true;
                                break;
                            }
                            let placeholder = Resource::placeholder(
                                format_placeholder_id(&self.policy.placeholder_prefix, next_seq),
                                &demand.platform,
                                &demand.location,
                                &demand.state,
                                &demand.case_type,
                            );
                            next_seq += 1;
                            created_for_demand += 1;
                            pool.push(placeholder.clone());
                            outcome.new_placeholders.push(placeholder.clone());
                            chosen.push(placeholder);
                        }
                    } else {
                        let diagnostic = AllocationDiagnostic::Shortfall {
                            forecast_id: demand.forecast_id,
                            year: week.year,
                            week_number: week.week_number,
                            required,
                            filled: already + chosen.len(),
                        };
                        tracing::debug!(forecast_id = demand.forecast_id, "{}", diagnostic.message());
                        outcome.diagnostics.push(diagnostic);
                    }
                }

                // === 步骤 5-6: 档位 + 产能 ===
                for resource in chosen {
                    let tier_name = input
                        .tier_overrides
                        .get(&resource.resource_id)
                        .cloned()
                        .unwrap_or_else(|| self.policy.default_tier_name.clone());
                    let Some(tier) = tiers.get(tier_name.as_str()) else {
                        outcome.diagnostics.push(AllocationDiagnostic::UnknownTier {
                            resource_id: resource.resource_id.clone(),
                            tier_name,
                        });
                        continue;
                    };

                    let weekly_capacity = CapacityCalculator::capacity(&CapacityInputs::from_week(
                        week,
                        tier.fraction(),
                        demand.target_cph,
                    ));

                    busy.insert((resource.resource_id.clone(), week.year, week.week_number));
                    *filled
                        .entry((demand.forecast_id, week.year, week.week_number))
                        .or_insert(0) += 1;
                    outcome.counts.record(resource.kind);
                    outcome.assignments.push(WeeklyAssignment {
                        assignment_id: uuid::Uuid::new_v4().to_string(),
                        resource_id: resource.resource_id,
                        resource_kind: resource.kind,
                        forecast_id: demand.forecast_id,
                        year: week.year,
                        week_number: week.week_number,
                        week_start: week.week_start,
                        tier_name: tier.tier_name.clone(),
                        tier_percentage: tier.percentage,
                        weekly_capacity,
                        is_active: true,
                        created_at: input.now,
                    });
                }

                if stop_demand {
                    break 'weeks;
                }
            }
        }

        tracing::info!(
            actual = outcome.counts.actual,
            placeholder = outcome.counts.placeholder,
            new_placeholders = outcome.new_placeholders.len(),
            diagnostics = outcome.diagnostics.len(),
            "分配计算完成"
        );
        outcome
    }
}

fn matches_demand(resource: &Resource, demand: &ForecastDemand) -> bool {
    resource.is_active
        && resource.platform == demand.platform
        && resource.location == demand.location
        && resource.states.iter().any(|s| *s == demand.state)
        && resource.skills.iter().any(|s| *s == demand.case_type)
}

fn kind_rank(kind: ResourceKind) -> u8 {
    match kind {
        ResourceKind::Actual => 0,
        ResourceKind::Placeholder => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::calendar::{iso_week_end, iso_week_start};
    use crate::domain::forecast::{MonthSlot, FORECAST_WINDOW_MONTHS};
    use crate::domain::tier::default_tiers;
    use crate::domain::types::PolicyValue;
    use chrono::NaiveDate;

    fn demand(forecast_id: i64, fte_required: i64) -> ForecastDemand {
        let mut months = [MonthSlot::default(); FORECAST_WINDOW_MONTHS];
        months[0].fte_required = fte_required;
        ForecastDemand {
            forecast_id,
            platform: "Amisys".to_string(),
            location: "Domestic".to_string(),
            main_lob: "Medicaid".to_string(),
            state: "TX".to_string(),
            case_type: "Claims".to_string(),
            worktype: "Domestic".to_string(),
            target_cph: 4.0,
            start_year: 2025,
            start_month: 4,
            months,
        }
    }

    fn week(week_number: u32) -> WeekConfiguration {
        WeekConfiguration {
            year: 2025,
            week_number,
            week_start: iso_week_start(2025, week_number).unwrap(),
            week_end: iso_week_end(2025, week_number).unwrap(),
            month: 4,
            month_year: 2025,
            working_days: 5.0,
            work_hours: 8.0,
            shrinkage: 0.0,
            occupancy: None,
        }
    }

    fn actual(id: &str) -> Resource {
        Resource::actual(id, "Amisys", "Domestic", vec!["TX".to_string()], vec!["Claims".to_string()])
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 4, 1).unwrap().and_hms_opt(9, 0, 0).unwrap()
    }

    fn run(
        policy: AllocationPolicy,
        demands: &[ForecastDemand],
        resources: &[Resource],
        weeks: &[WeekConfiguration],
        existing: &[WeeklyAssignment],
        overrides: &HashMap<String, String>,
    ) -> AllocationOutcome {
        let tiers = default_tiers();
        AllocationEngine::new(policy).allocate(&AllocationInput {
            demands,
            resources,
            weeks,
            tiers: &tiers,
            tier_overrides: overrides,
            existing,
            next_placeholder_seq: 1,
            now: now(),
        })
    }

    fn default_policy() -> AllocationPolicy {
        AllocationPolicy::from_snapshot(&PolicySnapshot::default())
    }

    #[test]
    fn test_actuals_preferred_then_placeholders_fill_gap() {
        let resources = vec![actual("EMP-002"), actual("EMP-001")];
        let outcome = run(
            default_policy(),
            &[demand(1, 3)],
            &resources,
            &[week(15)],
            &[],
            &HashMap::new(),
        );

        assert_eq!(outcome.counts, AllocationCounts { actual: 2, placeholder: 1 });
        let ids: Vec<&str> = outcome.assignments.iter().map(|a| a.resource_id.as_str()).collect();
        assert_eq!(ids, vec!["EMP-001", "EMP-002", "PH-000001"]);
        // 1.0 × 5 × 8 × 1.0 × 1.0 × 4
        assert_eq!(outcome.assignments[0].weekly_capacity, 160.0);
        assert!(outcome.diagnostics.is_empty());
    }

    #[test]
    fn test_placeholders_are_reused_across_weeks() {
        let outcome = run(
            default_policy(),
            &[demand(1, 2)],
            &[],
            &[week(15), week(16)],
            &[],
            &HashMap::new(),
        );
        assert_eq!(outcome.new_placeholders.len(), 2);
        assert_eq!(outcome.assignments.len(), 4);
    }

    #[test]
    fn test_placeholder_cap_counted_per_demand() {
        let policy = AllocationPolicy {
            max_placeholders_per_request: 3,
            ..default_policy()
        };
        let outcome = run(
            policy,
            &[demand(1, 2), demand(2, 5)],
            &[],
            &[week(15)],
            &[],
            &HashMap::new(),
        );

        // 需求 1 新建 2 个; 需求 2 当周无空闲占位, 新建 3 个后达到上限
        assert_eq!(outcome.new_placeholders.len(), 5);
        assert_eq!(outcome.counts.placeholder, 5);
        assert!(matches!(
            outcome.diagnostics.as_slice(),
            [AllocationDiagnostic::PlaceholderCapExceeded { forecast_id: 2, cap: 3, unfilled: 2, .. }]
        ));
        assert_eq!(outcome.new_placeholders[4].resource_id, "PH-000005");
    }

    #[test]
    fn test_cap_exceeded_records_diagnostic() {
        let policy = AllocationPolicy {
            max_placeholders_per_request: 2,
            ..default_policy()
        };
        let outcome = run(
            policy,
            &[demand(1, 3)],
            &[],
            &[week(15), week(16)],
            &[],
            &HashMap::new(),
        );

        assert_eq!(outcome.new_placeholders.len(), 2);
        // 第 15 周已建的两个占位保留分配, 第 16 周不再处理
        assert_eq!(outcome.assignments.len(), 2);
        assert!(outcome.assignments.iter().all(|a| a.week_number == 15));
        assert!(matches!(
            outcome.diagnostics.as_slice(),
            [AllocationDiagnostic::PlaceholderCapExceeded { unfilled: 1, week_number: 15, .. }]
        ));
    }

    #[test]
    fn test_shortfall_when_auto_create_disabled() {
        let snapshot = PolicySnapshot::default()
            .with(policy_keys::AUTO_CREATE_PLACEHOLDERS, PolicyValue::Bool(false));
        let outcome = run(
            AllocationPolicy::from_snapshot(&snapshot),
            &[demand(1, 2)],
            &[actual("EMP-001")],
            &[week(15)],
            &[],
            &HashMap::new(),
        );
        assert_eq!(outcome.counts, AllocationCounts { actual: 1, placeholder: 0 });
        assert!(matches!(
            outcome.diagnostics.as_slice(),
            [AllocationDiagnostic::Shortfall { required: 2, filled: 1, .. }]
        ));
    }

    #[test]
    fn test_availability_and_matching_filters() {
        let late = actual("EMP-001").with_window(NaiveDate::from_ymd_opt(2025, 4, 14), None);
        let wrong_state = Resource::actual(
            "EMP-002",
            "Amisys",
            "Domestic",
            vec!["CA".to_string()],
            vec!["Claims".to_string()],
        );
        let snapshot = PolicySnapshot::default()
            .with(policy_keys::AUTO_CREATE_PLACEHOLDERS, PolicyValue::Bool(false));
        let outcome = run(
            AllocationPolicy::from_snapshot(&snapshot),
            &[demand(1, 1)],
            &[late, wrong_state],
            &[week(15), week(16)],
            &[],
            &HashMap::new(),
        );

        // 第 15 周 (04-07) 早于到岗日, 仅第 16 周分配
        assert_eq!(outcome.assignments.len(), 1);
        assert_eq!(outcome.assignments[0].week_number, 16);
        assert_eq!(outcome.assignments[0].resource_id, "EMP-001");
    }

    #[test]
    fn test_existing_assignments_count_and_block() {
        let existing = WeeklyAssignment {
            assignment_id: "a-1".to_string(),
            resource_id: "EMP-001".to_string(),
            resource_kind: ResourceKind::Actual,
            forecast_id: 9,
            year: 2025,
            week_number: 15,
            week_start: iso_week_start(2025, 15).unwrap(),
            tier_name: "100%".to_string(),
            tier_percentage: 100.0,
            weekly_capacity: 160.0,
            is_active: true,
            created_at: now(),
        };
        let snapshot = PolicySnapshot::default()
            .with(policy_keys::AUTO_CREATE_PLACEHOLDERS, PolicyValue::Bool(false));
        let outcome = run(
            AllocationPolicy::from_snapshot(&snapshot),
            &[demand(1, 1)],
            &[actual("EMP-001")],
            &[week(15)],
            &[existing],
            &HashMap::new(),
        );
        // EMP-001 当周已被需求 9 占用
        assert!(outcome.assignments.is_empty());
        assert_eq!(outcome.diagnostics.len(), 1);
    }

    #[test]
    fn test_tier_override_and_unknown_tier() {
        let mut overrides = HashMap::new();
        overrides.insert("EMP-001".to_string(), "50%".to_string());
        overrides.insert("EMP-002".to_string(), "10%".to_string());
        let snapshot = PolicySnapshot::default()
            .with(policy_keys::AUTO_CREATE_PLACEHOLDERS, PolicyValue::Bool(false));
        let outcome = run(
            AllocationPolicy::from_snapshot(&snapshot),
            &[demand(1, 2)],
            &[actual("EMP-001"), actual("EMP-002")],
            &[week(15)],
            &[],
            &overrides,
        );

        assert_eq!(outcome.assignments.len(), 1);
        assert_eq!(outcome.assignments[0].tier_name, "50%");
        assert_eq!(outcome.assignments[0].weekly_capacity, 80.0);
        assert!(outcome
            .diagnostics
            .iter()
            .any(|d| matches!(d, AllocationDiagnostic::UnknownTier { tier_name, .. } if tier_name == "10%")));
    }

    #[test]
    fn test_weeks_outside_window_skipped() {
        let mut october = week(40);
        october.month = 10;
        october.month_year = 2025;
        let outcome = run(
            default_policy(),
            &[demand(1, 1)],
            &[],
            &[october],
            &[],
            &HashMap::new(),
        );
        // 10 月在窗口 (4-9 月) 之外
        assert!(outcome.assignments.is_empty());
    }
}
