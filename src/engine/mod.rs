// ==========================================
// 劳动力产能规划系统 - 引擎层
// ==========================================
// 职责: 实现分配/产能/Ramp/差异规则, 不拼 SQL
// 红线: Engine 不拼 SQL, 被拒绝或跳过的决策必须输出原因
// ==========================================

pub mod aggregation;
pub mod allocation;
pub mod availability;
pub mod capacity_calc;
pub mod events;
pub mod history_diff;
pub mod ramp;
pub mod week_calendar;

// 重导出核心引擎
pub use aggregation::AggregationEngine;
pub use allocation::{
    AllocationDiagnostic, AllocationEngine, AllocationInput, AllocationOutcome, AllocationPolicy,
};
pub use availability::{AvailabilityDecision, AvailabilityEvaluator, AvailabilityPolicy};
pub use capacity_calc::{CapacityCalculator, CapacityInputs};
pub use events::{
    CacheInvalidator, InvalidationScope, NoOpCacheInvalidator, OptionalCacheInvalidator,
};
pub use history_diff::HistoryDiffLogger;
pub use ramp::{
    ConfigSource, RampCalculator, RampComputation, RampConfigUsed, RampValidationError, RampValidator,
    RampWeekImpact, SlotProjection,
};
pub use week_calendar::WeekCalendar;
