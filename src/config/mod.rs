// ==========================================
// 劳动力产能规划系统 - 配置层
// ==========================================
// 职责: 策略存储 (availability_policy) + 月度产能配置 (month_configuration)
// ==========================================

pub mod capacity_config_trait;
pub mod config_manager;
pub mod policy_snapshot;
pub mod policy_store;

pub use capacity_config_trait::{CapacityConfigReader, ConfigReadError};
pub use config_manager::ConfigManager;
pub use policy_snapshot::PolicySnapshot;
pub use policy_store::{policy_keys, seed_policies, PolicyEntry, PolicyError, PolicyResult, PolicyStore};
