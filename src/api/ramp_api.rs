// ==========================================
// 劳动力产能规划系统 - Ramp API
// ==========================================
// 职责: 已应用 Ramp 查询、Ramp 预览、Ramp 应用
// 红线: 请求校验在任何存储访问之前完成
// 红线: 应用为叠加语义 (非幂等), 读-算-写在同一 IMMEDIATE 事务内
// 红线: 审计日志失败不回滚已提交的 Ramp
// ==========================================

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDateTime;
use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::error::{ApiError, ApiResult};
use crate::api::validator::parse_request;
use crate::config::CapacityConfigReader;
use crate::domain::calendar::MonthKey;
use crate::domain::forecast::{ForecastDemand, MonthSlot};
use crate::domain::history::{ChangeRecord, HistoryChangeType, HistoryLog};
use crate::domain::ramp::{AppliedRamp, RampWeek, RAMP_APPLIED_BY_SYSTEM};
use crate::engine::events::{InvalidationScope, OptionalCacheInvalidator};
use crate::engine::history_diff::HistoryDiffLogger;
use crate::engine::ramp::{
    RampCalculator, RampComputation, RampConfigUsed, RampValidator, RampWeekImpact, SlotProjection,
};
use crate::repository::{
    plan_ramp_upserts, ForecastRepository, HistoryLogRepository, RampRepository,
};

/// 历史日志中的实体类型
pub const FORECAST_ENTITY: &str = "forecast_demand";

// ==========================================
// 请求 DTO
// ==========================================

/// Ramp 请求允许的顶层字段
pub const RAMP_REQUEST_FIELDS: &[&str] = &["weeks", "totalRampEmployees", "notes"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RampRequest {
    pub weeks: Vec<RampWeek>,
    pub total_ramp_employees: i64,
    #[serde(default)]
    pub notes: Option<String>,
}

impl RampRequest {
    /// 从原始 JSON 解析 (白名单 + 严格反序列化)
    pub fn from_json(body: Value) -> ApiResult<Self> {
        parse_request(body, RAMP_REQUEST_FIELDS)
    }
}

// ==========================================
// 响应 DTO
// ==========================================

/// Ramp 预览结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactReport {
    pub forecast_id: i64,
    pub month_key: String,
    pub month_label: String,
    pub current: MonthSlot,
    pub projected: MonthSlot,
    pub diff: SlotProjection,
    pub weeks: Vec<RampWeekImpact>,
    pub total_ramp_capacity: f64,
    pub max_ramp_employees: i64,
    pub config_used: RampConfigUsed,
}

/// Ramp 应用结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyResult {
    pub forecast_id: i64,
    pub month_key: String,
    pub fte_available_before: i64,
    pub fte_available_after: i64,
    pub capacity_before: i64,
    pub capacity_after: i64,
    pub ramp_records_inserted: usize,
    pub ramp_records_updated: usize,
    pub change_record: ChangeRecord,
    pub history_log_id: Option<String>,
}

// ==========================================
// RampApi
// ==========================================

/// Ramp API
///
/// 职责：
/// 1. 查询某需求行某月已应用的 Ramp
/// 2. 预览 Ramp 对槽位的影响 (不落库)
/// 3. 应用 Ramp: 槽位叠加 + Ramp 记录按复合键写入 + 历史差异 + 缓存失效
pub struct RampApi {
    conn: Arc<Mutex<Connection>>,
    forecast_repo: Arc<ForecastRepository>,
    ramp_repo: Arc<RampRepository>,
    history_repo: Arc<HistoryLogRepository>,
    config_reader: Arc<dyn CapacityConfigReader>,
    invalidator: Arc<OptionalCacheInvalidator>,
}

impl RampApi {
    pub fn new(
        conn: Arc<Mutex<Connection>>,
        forecast_repo: Arc<ForecastRepository>,
        ramp_repo: Arc<RampRepository>,
        history_repo: Arc<HistoryLogRepository>,
        config_reader: Arc<dyn CapacityConfigReader>,
        invalidator: Arc<OptionalCacheInvalidator>,
    ) -> Self {
        Self {
            conn,
            forecast_repo,
            ramp_repo,
            history_repo,
            config_reader,
            invalidator,
        }
    }

    fn lock_conn(&self) -> ApiResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", e)))
    }

    /// 查询已应用的 Ramp
    ///
    /// # 返回
    /// - Ok(AppliedRamp::Applied): 按开始日期排序
    /// - Ok(AppliedRamp::NoneApplied): 该月未应用过 Ramp
    /// - Err(Unprocessable): 月份键格式错误
    /// - Err(NotFound): 需求行不存在
    /// - Err(ValidationError): 月份不在需求行窗口内
    pub fn get_applied_ramp(&self, forecast_id: i64, month_key: &str) -> ApiResult<AppliedRamp> {
        let month = RampValidator::parse_month_key(month_key)?;
        let demand = self.load_demand(forecast_id)?;
        resolve_slot(&demand, month)?;

        let records = self
            .ramp_repo
            .list_by_forecast_month(forecast_id, &month.to_string())?;
        if records.is_empty() {
            Ok(AppliedRamp::NoneApplied)
        } else {
            Ok(AppliedRamp::Applied(records))
        }
    }

    /// 预览 Ramp (只读)
    pub async fn preview_ramp(
        &self,
        forecast_id: i64,
        month_key: &str,
        request: &RampRequest,
    ) -> ApiResult<ImpactReport> {
        let month = RampValidator::validate(month_key, &request.weeks, request.total_ramp_employees)?;
        let demand = self.load_demand(forecast_id)?;
        let slot = resolve_slot(&demand, month)?;
        let computation = self.compute(&demand, month, &request.weeks).await?;

        let current = demand.months[slot];
        let diff = RampCalculator::project(&current, &computation);
        let projected = MonthSlot {
            fte_available: diff.fte_available_after,
            capacity: diff.capacity_after,
            ..current
        };

        Ok(ImpactReport {
            forecast_id,
            month_key: month.to_string(),
            month_label: month.label(),
            current,
            projected,
            diff,
            weeks: computation.weeks,
            total_ramp_capacity: computation.total_ramp_capacity,
            max_ramp_employees: computation.max_ramp_employees,
            config_used: computation.config,
        })
    }

    /// 应用 Ramp
    ///
    /// # 流程
    /// 1. 校验请求 (不访问存储)
    /// 2. 读取需求行与月度配置, 计算 Ramp
    /// 3. IMMEDIATE 事务: 重读需求行 → 快照 → 写槽位 → 写 Ramp 记录 → 提交
    /// 4. 历史差异 (失败只告警)
    /// 5. 缓存失效
    pub async fn apply_ramp(
        &self,
        forecast_id: i64,
        month_key: &str,
        request: &RampRequest,
    ) -> ApiResult<ApplyResult> {
        let month = RampValidator::validate(month_key, &request.weeks, request.total_ramp_employees)?;
        let demand = self.load_demand(forecast_id)?;
        resolve_slot(&demand, month)?;
        let computation = self.compute(&demand, month, &request.weeks).await?;

        let applied_at = chrono::Utc::now().naive_utc();
        let committed = self.commit_ramp(forecast_id, month, request, &computation, applied_at)?;

        let history_log_id = match self.record_history(forecast_id, month, &committed.change_record, request) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(forecast_id, month = %month, error = %e, "Ramp 历史日志写入失败");
                None
            }
        };

        self.invalidator
            .notify(InvalidationScope::ForecastMonth { forecast_id, month });

        tracing::info!(
            forecast_id,
            month = %month,
            fte_delta = committed.projection.fte_available_delta(),
            capacity_delta = committed.projection.capacity_delta(),
            inserted = committed.inserted,
            updated = committed.updated,
            "Ramp 已应用"
        );

        Ok(ApplyResult {
            forecast_id,
            month_key: month.to_string(),
            fte_available_before: committed.projection.fte_available_before,
            fte_available_after: committed.projection.fte_available_after,
            capacity_before: committed.projection.capacity_before,
            capacity_after: committed.projection.capacity_after,
            ramp_records_inserted: committed.inserted,
            ramp_records_updated: committed.updated,
            change_record: committed.change_record,
            history_log_id,
        })
    }

    // ==========================================
    // 内部步骤
    // ==========================================

    fn load_demand(&self, forecast_id: i64) -> ApiResult<ForecastDemand> {
        self.forecast_repo
            .find_by_id(forecast_id)?
            .ok_or_else(|| ApiError::NotFound(format!("需求行(id={})不存在", forecast_id)))
    }

    async fn compute(
        &self,
        demand: &ForecastDemand,
        month: MonthKey,
        weeks: &[RampWeek],
    ) -> ApiResult<RampComputation> {
        let config = self
            .config_reader
            .get_month_config(month.year, month.month, &demand.worktype)
            .await
            .map_err(|e| {
                tracing::error!(month = %month, worktype = %demand.worktype, error = %e, "月度配置读取失败");
                ApiError::InternalError(format!("月度配置读取失败: {}", e))
            })?;
        let used = RampConfigUsed::resolve(config.as_ref(), month, &demand.worktype);
        Ok(RampCalculator::compute(demand.target_cph, weeks, &used))
    }

    fn commit_ramp(
        &self,
        forecast_id: i64,
        month: MonthKey,
        request: &RampRequest,
        computation: &RampComputation,
        applied_at: NaiveDateTime,
    ) -> ApiResult<CommittedRamp> {
        let mut conn = self.lock_conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| ApiError::DatabaseTransactionError(e.to_string()))?;

        let current = ForecastRepository::find_by_id_tx(&tx, forecast_id)?
            .ok_or_else(|| ApiError::NotFound(format!("需求行(id={})不存在", forecast_id)))?;
        let slot = resolve_slot(&current, month)?;
        let before = current.snapshot();

        let projection = RampCalculator::project(&current.months[slot], computation);
        ForecastRepository::update_slot_capacity_tx(
            &tx,
            forecast_id,
            slot,
            projection.fte_available_after,
            projection.capacity_after,
        )?;

        let mut updated_row = current.clone();
        updated_row.months[slot].fte_available = projection.fte_available_after;
        updated_row.months[slot].capacity = projection.capacity_after;

        let month_key = month.to_string();
        let existing = RampRepository::list_by_forecast_month_tx(&tx, forecast_id, &month_key)?;
        let upserts = plan_ramp_upserts(
            &existing,
            forecast_id,
            &month_key,
            &request.weeks,
            request.notes.as_deref(),
            applied_at,
        );
        let (inserted, updated) = RampRepository::apply_upserts_tx(&tx, &upserts)?;

        tx.commit()
            .map_err(|e| ApiError::DatabaseTransactionError(e.to_string()))?;

        let change_record =
            HistoryDiffLogger::diff(&before, &updated_row.snapshot(), &current.tracked_schema());

        Ok(CommittedRamp {
            projection,
            change_record,
            inserted,
            updated,
        })
    }

    fn record_history(
        &self,
        forecast_id: i64,
        month: MonthKey,
        change_record: &ChangeRecord,
        request: &RampRequest,
    ) -> ApiResult<String> {
        let log = HistoryLog::new(
            FORECAST_ENTITY,
            &forecast_id.to_string(),
            HistoryChangeType::RampApply,
            RAMP_APPLIED_BY_SYSTEM,
        )
        .with_change_record(change_record)
        .with_month_key(&month.to_string())
        .with_notes(request.notes.clone());
        Ok(self.history_repo.insert(&log)?)
    }
}

struct CommittedRamp {
    projection: SlotProjection,
    change_record: ChangeRecord,
    inserted: usize,
    updated: usize,
}

fn resolve_slot(demand: &ForecastDemand, month: MonthKey) -> ApiResult<usize> {
    demand.resolve_slot(month).ok_or_else(|| ApiError::ValidationError {
        message: format!("月份{}不在需求行(id={})的报告期内", month, demand.forecast_id),
        guidance: Some(format!(
            "可选月份: {}",
            demand
                .window()
                .iter()
                .map(|m| m.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_rejects_unknown_fields() {
        let body = json!({
            "weeks": [],
            "totalRampEmployees": 0,
            "extra": true
        });
        assert!(matches!(
            RampRequest::from_json(body),
            Err(ApiError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_request_rejects_unknown_week_fields() {
        let body = json!({
            "weeks": [{
                "label": "Wk1",
                "startDate": "2025-04-07",
                "endDate": "2025-04-11",
                "workingDays": 5,
                "rampPercent": 50.0,
                "rampEmployees": 2,
                "bonus": 1
            }],
            "totalRampEmployees": 2
        });
        assert!(RampRequest::from_json(body).is_err());
    }

    #[test]
    fn test_request_parses_camel_case() {
        let body = json!({
            "weeks": [{
                "label": "Wk1",
                "startDate": "2025-04-07",
                "endDate": "2025-04-11",
                "workingDays": 5,
                "rampPercent": 50.0,
                "rampEmployees": 2
            }],
            "totalRampEmployees": 2,
            "notes": "新人入职"
        });
        let request = RampRequest::from_json(body).unwrap();
        assert_eq!(request.weeks[0].ramp_employees, 2);
        assert_eq!(request.notes.as_deref(), Some("新人入职"));
    }
}
