// ==========================================
// 劳动力产能规划系统 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态和API实例
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::{AllocationApi, CapacityApi, RampApi};
use crate::config::{CapacityConfigReader, ConfigManager, PolicyStore};
use crate::db::{init_schema, open_sqlite_connection};
use crate::engine::events::OptionalCacheInvalidator;
use crate::repository::{
    AssignmentRepository, ForecastRepository, HistoryLogRepository, RampRepository,
    ResourceRepository, SummaryRepository, TierRepository, WeekConfigRepository,
};

/// 数据库路径环境变量
pub const DB_PATH_ENV: &str = "WORKFORCE_CAPACITY_DB_PATH";

/// 应用状态
///
/// 包含所有API实例和共享资源; 全部仓储共用一个受互斥锁保护的连接
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// Ramp API
    pub ramp_api: Arc<RampApi>,

    /// 分配 API
    pub allocation_api: Arc<AllocationApi>,

    /// 产能 API
    pub capacity_api: Arc<CapacityApi>,

    /// 策略存储
    pub policy_store: Arc<PolicyStore>,

    /// 月度配置管理器
    pub config_manager: Arc<ConfigManager>,

    /// 需求行仓储 (外部需求源写入)
    pub forecast_repo: Arc<ForecastRepository>,

    /// 资源仓储
    pub resource_repo: Arc<ResourceRepository>,

    /// 档位仓储
    pub tier_repo: Arc<TierRepository>,
}

impl AppState {
    /// 创建新的AppState实例 (不接入外部缓存)
    pub fn new(db_path: String) -> Result<Self, String> {
        Self::with_invalidator(db_path, OptionalCacheInvalidator::none())
    }

    /// 创建AppState并接入缓存失效器
    ///
    /// # 说明
    /// 该方法会：
    /// 1. 打开数据库并幂等建表
    /// 2. 写入种子策略与默认档位 (已存在则跳过)
    /// 3. 创建所有Repository与API实例
    pub fn with_invalidator(
        db_path: String,
        invalidator: OptionalCacheInvalidator,
    ) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = open_sqlite_connection(&db_path).map_err(|e| format!("无法打开数据库: {}", e))?;
        init_schema(&conn).map_err(|e| format!("数据库建表失败: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 配置层
        // ==========================================
        let policy_store = Arc::new(PolicyStore::new(conn.clone()));
        let seeded = policy_store
            .seed_defaults()
            .map_err(|e| format!("种子策略写入失败: {}", e))?;
        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );
        let config_reader: Arc<dyn CapacityConfigReader> = config_manager.clone();

        // ==========================================
        // Repository层
        // ==========================================
        let forecast_repo = Arc::new(ForecastRepository::new(conn.clone()));
        let resource_repo = Arc::new(ResourceRepository::new(conn.clone()));
        let assignment_repo = Arc::new(AssignmentRepository::new(conn.clone()));
        let tier_repo = Arc::new(TierRepository::new(conn.clone()));
        let ramp_repo = Arc::new(RampRepository::new(conn.clone()));
        let history_repo = Arc::new(HistoryLogRepository::new(conn.clone()));
        let summary_repo = Arc::new(SummaryRepository::new(conn.clone()));
        let week_config_repo = Arc::new(WeekConfigRepository::new(conn.clone()));

        let tiers_seeded = tier_repo
            .seed_defaults()
            .map_err(|e| format!("默认档位写入失败: {}", e))?;

        let invalidator = Arc::new(invalidator);

        // ==========================================
        // API层
        // ==========================================
        let ramp_api = Arc::new(RampApi::new(
            conn.clone(),
            forecast_repo.clone(),
            ramp_repo,
            history_repo.clone(),
            config_reader.clone(),
            invalidator.clone(),
        ));
        let allocation_api = Arc::new(AllocationApi::new(
            conn.clone(),
            policy_store.clone(),
            resource_repo.clone(),
            assignment_repo,
            history_repo.clone(),
            invalidator.clone(),
        ));
        let capacity_api = Arc::new(CapacityApi::new(
            conn,
            policy_store.clone(),
            tier_repo.clone(),
            summary_repo,
            week_config_repo,
            history_repo,
            config_reader,
            invalidator,
        ));

        tracing::info!(
            policies_seeded = seeded,
            tiers_seeded,
            "AppState初始化完成"
        );

        Ok(Self {
            db_path,
            ramp_api,
            allocation_api,
            capacity_api,
            policy_store,
            config_manager,
            forecast_repo,
            resource_repo,
            tier_repo,
        })
    }
}

/// 获取默认数据库路径
///
/// 优先级: 环境变量 WORKFORCE_CAPACITY_DB_PATH → 用户数据目录 → 当前目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var(DB_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./workforce_capacity.db");

    if let Some(data_dir) = dirs::data_dir() {
        // 开发环境使用独立目录，避免污染生产数据
        #[cfg(debug_assertions)]
        {
            path = data_dir.join("workforce-capacity-dev");
        }

        #[cfg(not(debug_assertions))]
        {
            path = data_dir.join("workforce-capacity");
        }

        // 目录创建失败时由后续打开数据库报错
        std::fs::create_dir_all(&path).ok();
        path = path.join("workforce_capacity.db");
    }

    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_default_db_path() {
        let path = get_default_db_path();
        assert!(!path.is_empty());
        assert!(path.ends_with(".db"));
    }

    #[test]
    fn test_app_state_seeds_on_fresh_database() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("state.db").to_string_lossy().to_string();

        let state = AppState::new(db_path.clone()).unwrap();
        assert_eq!(state.tier_repo.list_active().unwrap().len(), 4);
        assert!(state.policy_store.snapshot().unwrap().len() >= 8);

        // 再次打开不重复写入
        drop(state);
        let state = AppState::new(db_path).unwrap();
        assert_eq!(state.tier_repo.list_active().unwrap().len(), 4);
    }
}
