// ==========================================
// 劳动力产能规划系统 - 分配 API
// ==========================================
// 职责: 分配运行 (含预演)、直接分配、资源登记、占位转正、资源停用
// 红线: 同一资源同一周至多一条有效分配, 冲突记录诊断, 不覆盖
// 红线: 分配运行在一个 IMMEDIATE 事务内完成"检查后写入"
// 红线: 预演返回同样结构, 不落库
// ==========================================

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};
use crate::config::{policy_keys, PolicyStore};
use crate::domain::assignment::{AllocationCounts, WeeklyAssignment};
use crate::domain::calendar::{MonthKey, WeekConfiguration};
use crate::domain::history::{HistoryChangeType, HistoryLog};
use crate::domain::resource::Resource;
use crate::domain::types::ResourceKind;
use crate::engine::allocation::{
    AllocationDiagnostic, AllocationEngine, AllocationInput, AllocationPolicy,
};
use crate::engine::availability::AvailabilityEvaluator;
use crate::engine::capacity_calc::{CapacityCalculator, CapacityInputs};
use crate::engine::events::{InvalidationScope, OptionalCacheInvalidator};
use crate::repository::error::RepositoryError;
use crate::repository::{
    AssignmentRepository, ForecastRepository, HistoryLogRepository, ResourceRepository,
    TierRepository, WeekConfigRepository,
};

/// 历史日志中的实体类型
pub const ALLOCATION_ENTITY: &str = "allocation_run";
pub const RESOURCE_ENTITY: &str = "resource";

// ==========================================
// 请求 / 响应 DTO
// ==========================================

/// 分配运行请求
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AllocationRequest {
    /// 参与分配的月份 (YYYY-MM)
    pub months: Vec<String>,
    /// 为空时对全部需求行分配
    #[serde(default)]
    pub forecast_ids: Option<Vec<i64>>,
    /// 外部指定档位: resource_id -> tier_name
    #[serde(default)]
    pub tier_overrides: HashMap<String, String>,
    #[serde(default)]
    pub dry_run: bool,
}

/// 分配运行结果 (预演与正式运行结构一致)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationRunResult {
    pub run_id: String,
    pub dry_run: bool,
    pub counts: AllocationCounts,
    pub assignments: Vec<WeeklyAssignment>,
    pub new_placeholders: Vec<String>,
    pub diagnostics: Vec<AllocationDiagnostic>,
    pub history_log_id: Option<String>,
}

/// 直接分配请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirectAssignRequest {
    pub resource_id: String,
    pub forecast_id: i64,
    pub year: i32,
    pub week_number: u32,
    #[serde(default)]
    pub tier_name: Option<String>,
}

/// 占位转正结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionResult {
    pub placeholder_id: String,
    pub actual_id: String,
    pub transferred_assignments: usize,
    pub history_log_id: Option<String>,
}

/// 资源停用结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeactivationResult {
    pub resource_id: String,
    pub assignments_deactivated: usize,
}

// ==========================================
// AllocationApi
// ==========================================

/// 分配 API
///
/// 职责：
/// 1. 分配运行: 匹配 → 可用性 → 占位补足 → 产能 → 写入
/// 2. 直接分配 (人工指定资源与周)
/// 3. 资源登记 / 占位转正 / 资源停用
pub struct AllocationApi {
    conn: Arc<Mutex<Connection>>,
    policy_store: Arc<PolicyStore>,
    resource_repo: Arc<ResourceRepository>,
    assignment_repo: Arc<AssignmentRepository>,
    history_repo: Arc<HistoryLogRepository>,
    invalidator: Arc<OptionalCacheInvalidator>,
}

impl AllocationApi {
    pub fn new(
        conn: Arc<Mutex<Connection>>,
        policy_store: Arc<PolicyStore>,
        resource_repo: Arc<ResourceRepository>,
        assignment_repo: Arc<AssignmentRepository>,
        history_repo: Arc<HistoryLogRepository>,
        invalidator: Arc<OptionalCacheInvalidator>,
    ) -> Self {
        Self {
            conn,
            policy_store,
            resource_repo,
            assignment_repo,
            history_repo,
            invalidator,
        }
    }

    fn lock_conn(&self) -> ApiResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", e)))
    }

    // ==========================================
    // 分配运行
    // ==========================================

    /// 执行分配 (dry_run 时不落库)
    ///
    /// # 返回
    /// - Ok(AllocationRunResult): 按资源类型计数 + 诊断
    /// - Err(Unprocessable): 月份键格式错误
    /// - Err(ValidationError): 未指定月份
    pub fn run_allocation(&self, request: &AllocationRequest) -> ApiResult<AllocationRunResult> {
        let months = parse_months(&request.months)?;

        // 策略快照在加锁前读取 (PolicyStore 自行加锁)
        let policy = AllocationPolicy::from_snapshot(&self.policy_store.snapshot()?);
        let engine = AllocationEngine::new(policy);
        let run_id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().naive_utc();

        let (outcome, persisted) = {
            let mut conn = self.lock_conn()?;
            let tx = begin_immediate(&mut conn)?;

            let mut demands = ForecastRepository::list_all_tx(&tx)?;
            if let Some(ids) = &request.forecast_ids {
                demands.retain(|d| ids.contains(&d.forecast_id));
            }
            let resources = ResourceRepository::list_active_tx(&tx)?;
            let tiers = TierRepository::list_active_tx(&tx)?;
            let mut weeks: Vec<WeekConfiguration> = Vec::new();
            for month in &months {
                weeks.extend(WeekConfigRepository::list_by_month_tx(&tx, *month)?);
            }
            let existing = match (
                weeks.iter().map(|w| w.week_start).min(),
                weeks.iter().map(|w| w.week_start).max(),
            ) {
                (Some(from), Some(to)) => AssignmentRepository::list_active_in_range_tx(&tx, from, to)?,
                _ => Vec::new(),
            };
            let next_placeholder_seq =
                ResourceRepository::next_placeholder_seq_tx(&tx, &engine.policy().placeholder_prefix)?;

            let mut outcome = engine.allocate(&AllocationInput {
                demands: &demands,
                resources: &resources,
                weeks: &weeks,
                tiers: &tiers,
                tier_overrides: &request.tier_overrides,
                existing: &existing,
                next_placeholder_seq,
                now,
            });

            if request.dry_run {
                // tx 未提交即丢弃, 等同回滚
                (outcome, false)
            } else {
                persist_outcome(&tx, &mut outcome)?;
                tx.commit()
                    .map_err(|e| ApiError::DatabaseTransactionError(e.to_string()))?;
                (outcome, true)
            }
        };

        let mut history_log_id = None;
        if persisted {
            let notes = format!(
                "actual={}, placeholder={}, new_placeholders={}, diagnostics={}",
                outcome.counts.actual,
                outcome.counts.placeholder,
                outcome.new_placeholders.len(),
                outcome.diagnostics.len()
            );
            let log = HistoryLog::new(ALLOCATION_ENTITY, &run_id, HistoryChangeType::AllocationRun, "system")
                .with_notes(Some(notes));
            history_log_id = self.write_history(&log);
            self.invalidator
                .notify(InvalidationScope::AllocationMonths { months: months.clone() });
        }

        tracing::info!(
            run_id = %run_id,
            dry_run = request.dry_run,
            actual = outcome.counts.actual,
            placeholder = outcome.counts.placeholder,
            diagnostics = outcome.diagnostics.len(),
            "分配运行完成"
        );

        Ok(AllocationRunResult {
            run_id,
            dry_run: request.dry_run,
            counts: outcome.counts,
            assignments: outcome.assignments,
            new_placeholders: outcome
                .new_placeholders
                .into_iter()
                .map(|r| r.resource_id)
                .collect(),
            diagnostics: outcome.diagnostics,
            history_log_id,
        })
    }

    // ==========================================
    // 直接分配
    // ==========================================

    /// 人工指定资源、需求行与周进行分配
    ///
    /// # 返回
    /// - Err(AssignmentConflict): 资源当周已有有效分配
    /// - Err(BusinessRuleViolation): 资源停用或不在可用窗口内
    pub fn assign_direct(&self, request: &DirectAssignRequest) -> ApiResult<WeeklyAssignment> {
        let snapshot = self.policy_store.snapshot()?;
        let policy = AllocationPolicy::from_snapshot(&snapshot);

        let (assignment, month) = {
            let mut conn = self.lock_conn()?;
            let tx = begin_immediate(&mut conn)?;

            let resource = ResourceRepository::find_by_id_tx(&tx, &request.resource_id)?
                .ok_or_else(|| ApiError::NotFound(format!("资源(id={})不存在", request.resource_id)))?;
            if !resource.is_active {
                return Err(ApiError::BusinessRuleViolation(format!(
                    "资源{}已停用",
                    resource.resource_id
                )));
            }
            let demand = ForecastRepository::find_by_id_tx(&tx, request.forecast_id)?
                .ok_or_else(|| ApiError::NotFound(format!("需求行(id={})不存在", request.forecast_id)))?;
            let week = WeekConfigRepository::find_tx(&tx, request.year, request.week_number)?
                .ok_or_else(|| {
                    ApiError::NotFound(format!("周配置({}-W{:02})不存在", request.year, request.week_number))
                })?;
            if demand.resolve_slot(week.month_key()).is_none() {
                return Err(ApiError::validation(format!(
                    "周{}-W{:02}所属月份{}不在需求行(id={})的报告期内",
                    week.year,
                    week.week_number,
                    week.month_key(),
                    demand.forecast_id
                )));
            }

            let decision =
                AvailabilityEvaluator::evaluate(&resource, week.week_start, week.week_end, &policy.availability);
            if !decision.is_available() {
                return Err(ApiError::BusinessRuleViolation(decision.reason()));
            }

            let tier_name = request
                .tier_name
                .clone()
                .unwrap_or_else(|| policy.default_tier_name.clone());
            let tier = TierRepository::find_by_name_tx(&tx, &tier_name)?
                .filter(|t| t.is_active)
                .ok_or_else(|| ApiError::NotFound(format!("档位{}不存在或已停用", tier_name)))?;

            let assignment = WeeklyAssignment {
                assignment_id: uuid::Uuid::new_v4().to_string(),
                resource_id: resource.resource_id.clone(),
                resource_kind: resource.kind,
                forecast_id: demand.forecast_id,
                year: week.year,
                week_number: week.week_number,
                week_start: week.week_start,
                tier_name: tier.tier_name.clone(),
                tier_percentage: tier.percentage,
                weekly_capacity: CapacityCalculator::capacity(&CapacityInputs::from_week(
                    &week,
                    tier.fraction(),
                    demand.target_cph,
                )),
                is_active: true,
                created_at: chrono::Utc::now().naive_utc(),
            };
            AssignmentRepository::insert_tx(&tx, &assignment)?;
            tx.commit()
                .map_err(|e| ApiError::DatabaseTransactionError(e.to_string()))?;
            (assignment, week.month_key())
        };

        self.invalidator
            .notify(InvalidationScope::AllocationMonths { months: vec![month] });
        tracing::info!(
            resource_id = %assignment.resource_id,
            forecast_id = assignment.forecast_id,
            year = assignment.year,
            week = assignment.week_number,
            "直接分配完成"
        );
        Ok(assignment)
    }

    // ==========================================
    // 资源生命周期
    // ==========================================

    /// 登记在职员工资源
    pub fn register_resource(&self, resource: &Resource) -> ApiResult<()> {
        validate_actual(resource)?;
        if self.resource_repo.find_by_id(&resource.resource_id)?.is_some() {
            return Err(ApiError::BusinessRuleViolation(format!(
                "资源ID{}已被使用",
                resource.resource_id
            )));
        }
        self.resource_repo.insert(resource)?;
        self.invalidator.notify(InvalidationScope::Resource {
            resource_id: resource.resource_id.clone(),
        });
        tracing::info!(resource_id = %resource.resource_id, "资源已登记");
        Ok(())
    }

    /// 占位转正: 新建在职资源 → 转移有效分配 → 标记占位被替换并停用
    pub fn convert_placeholder(&self, placeholder_id: &str, actual: &Resource) -> ApiResult<ConversionResult> {
        validate_actual(actual)?;

        let transferred = {
            let mut conn = self.lock_conn()?;
            let tx = begin_immediate(&mut conn)?;

            let placeholder = ResourceRepository::find_by_id_tx(&tx, placeholder_id)?
                .ok_or_else(|| ApiError::NotFound(format!("资源(id={})不存在", placeholder_id)))?;
            if placeholder.kind != ResourceKind::Placeholder || !placeholder.is_active {
                return Err(ApiError::BusinessRuleViolation(format!(
                    "资源{}不是在用占位",
                    placeholder_id
                )));
            }
            if ResourceRepository::exists_tx(&tx, &actual.resource_id)? {
                return Err(ApiError::BusinessRuleViolation(format!(
                    "资源ID{}已被使用",
                    actual.resource_id
                )));
            }

            ResourceRepository::insert_tx(&tx, actual)?;
            let assignments = AssignmentRepository::list_active_by_resource_tx(&tx, placeholder_id)?;
            for assignment in &assignments {
                AssignmentRepository::transfer_tx(&tx, assignment, &actual.resource_id, ResourceKind::Actual)?;
            }
            ResourceRepository::mark_replaced_tx(&tx, placeholder_id, &actual.resource_id)?;

            tx.commit()
                .map_err(|e| ApiError::DatabaseTransactionError(e.to_string()))?;
            assignments.len()
        };

        let log = HistoryLog::new(
            RESOURCE_ENTITY,
            placeholder_id,
            HistoryChangeType::PlaceholderConvert,
            "system",
        )
        .with_notes(Some(format!(
            "replaced_by={}, transferred={}",
            actual.resource_id, transferred
        )));
        let history_log_id = self.write_history(&log);

        self.invalidator.notify(InvalidationScope::Resource {
            resource_id: placeholder_id.to_string(),
        });
        tracing::info!(
            placeholder_id,
            actual_id = %actual.resource_id,
            transferred,
            "占位已转正"
        );

        Ok(ConversionResult {
            placeholder_id: placeholder_id.to_string(),
            actual_id: actual.resource_id.clone(),
            transferred_assignments: transferred,
            history_log_id,
        })
    }

    /// 停用资源; CASCADE_DEACTIVATE_ASSIGNMENTS 开启时同步停用其有效分配
    pub fn deactivate_resource(&self, resource_id: &str) -> ApiResult<DeactivationResult> {
        let cascade = self
            .policy_store
            .snapshot()?
            .bool(policy_keys::CASCADE_DEACTIVATE_ASSIGNMENTS)
            .unwrap_or(true);

        let assignments_deactivated = {
            let mut conn = self.lock_conn()?;
            let tx = begin_immediate(&mut conn)?;

            if ResourceRepository::deactivate_tx(&tx, resource_id)? == 0 {
                return match ResourceRepository::exists_tx(&tx, resource_id)? {
                    true => Err(ApiError::BusinessRuleViolation(format!("资源{}已停用", resource_id))),
                    false => Err(ApiError::NotFound(format!("资源(id={})不存在", resource_id))),
                };
            }
            let count = if cascade {
                AssignmentRepository::deactivate_by_resource_tx(&tx, resource_id)?
            } else {
                0
            };
            tx.commit()
                .map_err(|e| ApiError::DatabaseTransactionError(e.to_string()))?;
            count
        };

        self.invalidator.notify(InvalidationScope::Resource {
            resource_id: resource_id.to_string(),
        });
        tracing::info!(resource_id, cascade, assignments_deactivated, "资源已停用");

        Ok(DeactivationResult {
            resource_id: resource_id.to_string(),
            assignments_deactivated,
        })
    }

    /// 资源的有效分配
    pub fn list_assignments(&self, resource_id: &str) -> ApiResult<Vec<WeeklyAssignment>> {
        Ok(self.assignment_repo.list_active_by_resource(resource_id)?)
    }

    fn write_history(&self, log: &HistoryLog) -> Option<String> {
        match self.history_repo.insert(log) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(entity_type = %log.entity_type, entity_id = %log.entity_id, error = %e, "历史日志写入失败");
                None
            }
        }
    }
}

// ==========================================
// 辅助函数
// ==========================================

fn begin_immediate(conn: &mut Connection) -> ApiResult<Transaction<'_>> {
    conn.transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| ApiError::DatabaseTransactionError(e.to_string()))
}

fn parse_months(raw: &[String]) -> ApiResult<Vec<MonthKey>> {
    if raw.is_empty() {
        return Err(ApiError::ValidationError {
            message: "至少需要指定一个月份".to_string(),
            guidance: Some("months 例如 [\"2025-04\"]".to_string()),
        });
    }
    let mut months = raw
        .iter()
        .map(|m| MonthKey::parse(m).ok_or_else(|| ApiError::Unprocessable(format!("月份键格式错误: {}", m))))
        .collect::<ApiResult<Vec<_>>>()?;
    months.sort();
    months.dedup();
    Ok(months)
}

fn validate_actual(resource: &Resource) -> ApiResult<()> {
    if resource.kind != ResourceKind::Actual {
        return Err(ApiError::InvalidInput("只能登记在职员工资源".to_string()));
    }
    if resource.resource_id.trim().is_empty() {
        return Err(ApiError::InvalidInput("资源ID不能为空".to_string()));
    }
    if let (Some(from), Some(until)) = (resource.available_from, resource.available_until) {
        if until < from {
            return Err(ApiError::InvalidInput(format!(
                "可用窗口非法: {} ~ {}",
                from, until
            )));
        }
    }
    Ok(())
}

/// 写入占位与分配; 写入时发现冲突则记录诊断并跳过
fn persist_outcome(
    tx: &Transaction<'_>,
    outcome: &mut crate::engine::allocation::AllocationOutcome,
) -> ApiResult<()> {
    for placeholder in &outcome.new_placeholders {
        ResourceRepository::insert_tx(tx, placeholder)?;
    }

    let mut kept = Vec::with_capacity(outcome.assignments.len());
    let mut counts = AllocationCounts::default();
    for assignment in outcome.assignments.drain(..) {
        match AssignmentRepository::insert_tx(tx, &assignment) {
            Ok(()) => {
                counts.record(assignment.resource_kind);
                kept.push(assignment);
            }
            Err(RepositoryError::AssignmentConflict {
                resource_id,
                year,
                week_number,
            }) => {
                tracing::warn!(resource_id = %resource_id, year, week_number, "分配冲突, 跳过");
                outcome.diagnostics.push(AllocationDiagnostic::Conflict {
                    resource_id,
                    year,
                    week_number,
                });
            }
            Err(e) => return Err(e.into()),
        }
    }
    outcome.assignments = kept;
    outcome.counts = counts;
    Ok(())
}
