// ==========================================
// 劳动力产能规划系统 - 命令行入口
// ==========================================
// 职责: 初始化数据库 (建表 + 种子策略 + 默认档位) 并输出当前状态
// ==========================================

use anyhow::{Context, Result};
use workforce_capacity::app::{get_default_db_path, AppState};
use workforce_capacity::domain::types::PolicyCategory;

/// 日志格式环境变量 (取值 json 时输出 JSON 行)
const LOG_FORMAT_ENV: &str = "WORKFORCE_CAPACITY_LOG_FORMAT";

fn main() -> Result<()> {
    match std::env::var(LOG_FORMAT_ENV).as_deref() {
        Ok("json") => workforce_capacity::logging::init_json(),
        _ => workforce_capacity::logging::init(),
    }

    tracing::info!("==================================================");
    tracing::info!("{}", workforce_capacity::APP_NAME);
    tracing::info!("系统版本: {}", workforce_capacity::VERSION);
    tracing::info!("==================================================");

    let db_path = std::env::args()
        .nth(1)
        .unwrap_or_else(get_default_db_path);
    tracing::info!("使用数据库: {}", db_path);

    let state = AppState::new(db_path).map_err(anyhow::Error::msg).context("初始化AppState失败")?;

    let tiers = state.tier_repo.list_active().context("读取档位失败")?;
    for tier in &tiers {
        tracing::info!(tier_name = %tier.tier_name, percentage = tier.percentage, "产能档位");
    }

    for category in [
        PolicyCategory::Availability,
        PolicyCategory::Allocation,
        PolicyCategory::Reporting,
    ] {
        let entries = state
            .policy_store
            .list_by_category(category)
            .with_context(|| format!("读取策略失败: {}", category.as_str()))?;
        for entry in entries {
            tracing::info!(
                category = category.as_str(),
                policy_key = %entry.policy_key,
                value = %entry.value.to_raw(),
                active = entry.is_active,
                "策略"
            );
        }
    }

    let forecasts = state.forecast_repo.list_all().context("读取需求行失败")?;
    let resources = state.resource_repo.list_active().context("读取资源失败")?;
    tracing::info!(
        forecasts = forecasts.len(),
        active_resources = resources.len(),
        "数据库就绪"
    );
    Ok(())
}
