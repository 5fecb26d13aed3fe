// ==========================================
// 劳动力产能规划系统 - 产能 API
// ==========================================
// 职责: 月度汇总 (只读/物化)、周历生成、档位与策略管理、历史查询
// 红线: 汇总每次全量重算, 物化表只做覆盖写入
// ==========================================

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDate;
use rusqlite::Connection;
use tracing::instrument;

use crate::api::error::{ApiError, ApiResult};
use crate::api::ramp_api::FORECAST_ENTITY;
use crate::config::{policy_keys, CapacityConfigReader, PolicyEntry, PolicyStore};
use crate::domain::assignment::MonthlyCapacitySummary;
use crate::domain::calendar::{MonthKey, WeekConfiguration};
use crate::domain::history::HistoryLog;
use crate::domain::tier::CapacityTier;
use crate::domain::types::{PolicyCategory, PolicyValue};
use crate::engine::aggregation::AggregationEngine;
use crate::engine::events::{InvalidationScope, OptionalCacheInvalidator};
use crate::engine::week_calendar::WeekCalendar;
use crate::repository::{
    AssignmentRepository, ForecastRepository, HistoryLogRepository, SummaryRepository,
    TierRepository, WeekConfigRepository,
};

/// 历史查询默认条数
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

// ==========================================
// CapacityApi
// ==========================================

/// 产能 API
///
/// 职责：
/// 1. 月度产能汇总 (实时计算 / 重算并物化)
/// 2. 由月度配置生成周历
/// 3. 档位管理、策略管理
/// 4. 需求行历史查询
pub struct CapacityApi {
    conn: Arc<Mutex<Connection>>,
    policy_store: Arc<PolicyStore>,
    tier_repo: Arc<TierRepository>,
    summary_repo: Arc<SummaryRepository>,
    week_config_repo: Arc<WeekConfigRepository>,
    history_repo: Arc<HistoryLogRepository>,
    config_reader: Arc<dyn CapacityConfigReader>,
    invalidator: Arc<OptionalCacheInvalidator>,
}

impl CapacityApi {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        conn: Arc<Mutex<Connection>>,
        policy_store: Arc<PolicyStore>,
        tier_repo: Arc<TierRepository>,
        summary_repo: Arc<SummaryRepository>,
        week_config_repo: Arc<WeekConfigRepository>,
        history_repo: Arc<HistoryLogRepository>,
        config_reader: Arc<dyn CapacityConfigReader>,
        invalidator: Arc<OptionalCacheInvalidator>,
    ) -> Self {
        Self {
            conn,
            policy_store,
            tier_repo,
            summary_repo,
            week_config_repo,
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

    // ==========================================
    // 月度汇总
    // ==========================================

    /// 实时计算月度汇总 (不落库)
    pub fn summarize(&self, month_key: &str) -> ApiResult<MonthlyCapacitySummary> {
        let month = parse_month(month_key)?;
        let include_placeholders = self.include_placeholders()?;

        let mut conn = self.lock_conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| ApiError::DatabaseTransactionError(e.to_string()))?;
        let summary = compute_summary(&tx, month, include_placeholders)?;
        Ok(summary)
    }

    /// 重算并覆盖写入 monthly_capacity_summary
    #[instrument(skip(self))]
    pub fn refresh_month_summary(&self, month_key: &str) -> ApiResult<MonthlyCapacitySummary> {
        let month = parse_month(month_key)?;
        let include_placeholders = self.include_placeholders()?;

        let summary = {
            let mut conn = self.lock_conn()?;
            let tx = conn
                .transaction()
                .map_err(|e| ApiError::DatabaseTransactionError(e.to_string()))?;
            let summary = compute_summary(&tx, month, include_placeholders)?;
            SummaryRepository::upsert_tx(&tx, &summary)?;
            tx.commit()
                .map_err(|e| ApiError::DatabaseTransactionError(e.to_string()))?;
            summary
        };

        self.invalidator
            .notify(InvalidationScope::AllocationMonths { months: vec![month] });
        tracing::info!(
            month = %month,
            total_capacity = summary.total_capacity,
            capacity_gap = summary.capacity_gap,
            "月度汇总已刷新"
        );
        Ok(summary)
    }

    /// 读取已物化的月度汇总
    pub fn get_stored_summary(&self, month_key: &str) -> ApiResult<Option<MonthlyCapacitySummary>> {
        let month = parse_month(month_key)?;
        Ok(self.summary_repo.find(month.year, month.month)?)
    }

    fn include_placeholders(&self) -> ApiResult<bool> {
        Ok(self
            .policy_store
            .snapshot()?
            .bool(policy_keys::INCLUDE_PLACEHOLDERS_IN_CAPACITY)
            .unwrap_or(true))
    }

    // ==========================================
    // 周历
    // ==========================================

    /// 由月度配置生成该月周配置并写入
    ///
    /// # 返回
    /// - Err(NotFound): 该月 (year, month, worktype) 无月度配置
    pub async fn generate_weeks(
        &self,
        month_key: &str,
        worktype: &str,
        holidays: &[NaiveDate],
    ) -> ApiResult<Vec<WeekConfiguration>> {
        let month = parse_month(month_key)?;
        let config = self
            .config_reader
            .get_month_config(month.year, month.month, worktype)
            .await
            .map_err(|e| ApiError::InternalError(format!("月度配置读取失败: {}", e)))?
            .ok_or_else(|| {
                ApiError::NotFound(format!("月度配置({}, worktype={})不存在", month, worktype))
            })?;

        let weeks = WeekCalendar::generate_for_month(&config, holidays);
        self.week_config_repo.upsert_batch(&weeks)?;

        self.invalidator.notify(InvalidationScope::Reference);
        tracing::info!(month = %month, worktype, weeks = weeks.len(), "周历已生成");
        Ok(weeks)
    }

    pub fn list_weeks(&self, month_key: &str) -> ApiResult<Vec<WeekConfiguration>> {
        let month = parse_month(month_key)?;
        Ok(self.week_config_repo.list_by_month(month)?)
    }

    // ==========================================
    // 档位管理
    // ==========================================

    pub fn list_tiers(&self) -> ApiResult<Vec<CapacityTier>> {
        Ok(self.tier_repo.list_active()?)
    }

    /// 新建档位 (名称唯一, 百分比 0-100)
    pub fn create_tier(&self, tier_name: &str, percentage: f64) -> ApiResult<CapacityTier> {
        if tier_name.trim().is_empty() {
            return Err(ApiError::InvalidInput("档位名称不能为空".to_string()));
        }
        if !CapacityTier::is_valid_percentage(percentage) {
            return Err(ApiError::InvalidInput(format!("档位百分比超出 0-100: {}", percentage)));
        }
        if self.tier_repo.find_by_name(tier_name)?.is_some() {
            return Err(ApiError::BusinessRuleViolation(format!("档位{}已存在", tier_name)));
        }

        let tier = CapacityTier::new(tier_name, percentage);
        self.tier_repo.insert(&tier)?;
        self.invalidator.notify(InvalidationScope::Reference);
        tracing::info!(tier_name, percentage, "档位已创建");
        Ok(tier)
    }

    /// 修改档位百分比; 已被分配引用的档位拒绝修改
    pub fn update_tier_percentage(&self, tier_name: &str, percentage: f64) -> ApiResult<()> {
        if !CapacityTier::is_valid_percentage(percentage) {
            return Err(ApiError::InvalidInput(format!("档位百分比超出 0-100: {}", percentage)));
        }
        self.tier_repo.update_percentage(tier_name, percentage)?;
        self.invalidator.notify(InvalidationScope::Reference);
        Ok(())
    }

    pub fn deactivate_tier(&self, tier_name: &str) -> ApiResult<()> {
        self.tier_repo.deactivate(tier_name)?;
        self.invalidator.notify(InvalidationScope::Reference);
        tracing::info!(tier_name, "档位已停用");
        Ok(())
    }

    // ==========================================
    // 策略管理
    // ==========================================

    pub fn list_policies(&self, category: PolicyCategory) -> ApiResult<Vec<PolicyEntry>> {
        Ok(self.policy_store.list_by_category(category)?)
    }

    /// 修改策略值 (类型必须与现值一致)
    pub fn update_policy(&self, key: &str, value: PolicyValue) -> ApiResult<()> {
        self.policy_store.set(key, value)?;
        self.invalidator.notify(InvalidationScope::Reference);
        tracing::info!(policy_key = key, "策略已更新");
        Ok(())
    }

    // ==========================================
    // 历史查询
    // ==========================================

    /// 需求行的历史日志 (最新在前)
    pub fn list_forecast_history(&self, forecast_id: i64, limit: Option<usize>) -> ApiResult<Vec<HistoryLog>> {
        Ok(self.history_repo.list_by_entity(
            FORECAST_ENTITY,
            &forecast_id.to_string(),
            limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
        )?)
    }
}

fn parse_month(month_key: &str) -> ApiResult<MonthKey> {
    MonthKey::parse(month_key).ok_or_else(|| {
        ApiError::Unprocessable(format!("月份键格式错误: {} (须为 YYYY-MM)", month_key))
    })
}

fn compute_summary(
    conn: &Connection,
    month: MonthKey,
    include_placeholders: bool,
) -> ApiResult<MonthlyCapacitySummary> {
    let (Some(first), Some(last)) = (month.first_day(), month.last_day()) else {
        return Err(ApiError::InternalError(format!("月份边界计算失败: {}", month)));
    };
    let assignments = AssignmentRepository::list_active_in_range_tx(conn, first, last)?;
    let demands = ForecastRepository::list_all_tx(conn)?;
    Ok(AggregationEngine::summarize(
        month,
        &assignments,
        &demands,
        include_placeholders,
        chrono::Utc::now().naive_utc(),
    ))
}
