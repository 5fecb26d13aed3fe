// ==========================================
// 劳动力产能规划系统 - API 层
// ==========================================
// 职责: 提供业务 API 接口, 供外部传输层 (HTTP/CLI) 调用
// ==========================================

pub mod allocation_api;
pub mod capacity_api;
pub mod error;
pub mod ramp_api;
pub mod validator;

// 重导出核心类型
pub use allocation_api::{
    AllocationApi, AllocationRequest, AllocationRunResult, ConversionResult, DeactivationResult,
    DirectAssignRequest,
};
pub use capacity_api::CapacityApi;
pub use error::{ApiError, ApiResult, ErrorKind};
pub use ramp_api::{ApplyResult, ImpactReport, RampApi, RampRequest};
pub use validator::{ensure_allowed_fields, parse_request};
