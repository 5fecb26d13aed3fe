// ==========================================
// 劳动力产能规划系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 资源分配与产能引擎 (传输层、报表、鉴权由外部协作方负责)
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 配置层 - 策略与月度配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// 应用层 - 状态组装
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{PolicyCategory, PolicyValue, ResourceKind};

// 领域实体
pub use domain::{
    CapacityTier, ForecastDemand, MonthConfiguration, MonthKey, MonthlyCapacitySummary,
    RampRecord, RampWeek, Resource, WeekConfiguration, WeeklyAssignment,
};

// 引擎
pub use engine::{
    AggregationEngine, AllocationEngine, AvailabilityEvaluator, CapacityCalculator,
    HistoryDiffLogger, RampCalculator, WeekCalendar,
};

// API
pub use api::{AllocationApi, ApiError, CapacityApi, ErrorKind, RampApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "劳动力产能规划系统";
