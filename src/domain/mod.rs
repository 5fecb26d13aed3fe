// ==========================================
// 劳动力产能规划系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、值对象
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod assignment;
pub mod calendar;
pub mod forecast;
pub mod history;
pub mod ramp;
pub mod resource;
pub mod tier;
pub mod types;

// 重导出核心类型
pub use assignment::{AllocationCounts, MonthlyCapacitySummary, TierBreakdown, WeeklyAssignment};
pub use calendar::{MonthConfiguration, MonthKey, WeekConfiguration};
pub use forecast::{ForecastDemand, ForecastField, MonthSlot, FORECAST_WINDOW_MONTHS};
pub use history::{
    ChangeRecord, FieldChange, FieldPath, FieldSchema, FieldSnapshot, HistoryChangeType,
    HistoryLog,
};
pub use ramp::{AppliedRamp, RampKey, RampRecord, RampWeek};
pub use resource::Resource;
pub use tier::CapacityTier;
pub use types::{PolicyCategory, PolicyValue, ResourceKind};
