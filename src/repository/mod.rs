// ==========================================
// 劳动力产能规划系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod assignment_repo;
pub mod error;
pub mod forecast_repo;
pub mod history_log_repo;
pub mod ramp_repo;
pub mod resource_repo;
pub mod summary_repo;
pub mod tier_repo;
pub mod week_config_repo;

// 重导出核心仓储
pub use assignment_repo::AssignmentRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use forecast_repo::ForecastRepository;
pub use history_log_repo::HistoryLogRepository;
pub use ramp_repo::{plan_ramp_upserts, RampRepository, RampUpsert};
pub use resource_repo::ResourceRepository;
pub use summary_repo::SummaryRepository;
pub use tier_repo::TierRepository;
pub use week_config_repo::WeekConfigRepository;
