// ==========================================
// 劳动力产能规划系统 - 请求边界校验器
// ==========================================
// 职责: 请求体字段白名单校验 + 反序列化
// 红线: 出现白名单外字段即拒绝, 不静默丢弃
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// 校验请求体只包含允许的顶层字段
///
/// # 返回
/// - Ok(()): 校验通过
/// - Err(ApiError::ValidationError): 非对象或存在未知字段
pub fn ensure_allowed_fields(body: &Value, allowed: &[&str]) -> ApiResult<()> {
    let Some(object) = body.as_object() else {
        return Err(ApiError::validation("请求体必须是 JSON 对象"));
    };

    let mut unknown: Vec<&str> = object
        .keys()
        .map(|k| k.as_str())
        .filter(|k| !allowed.contains(k))
        .collect();
    if unknown.is_empty() {
        return Ok(());
    }

    unknown.sort_unstable();
    Err(ApiError::ValidationError {
        message: format!("存在不允许的字段: {}", unknown.join(", ")),
        guidance: Some(format!("允许的字段: {}", allowed.join(", "))),
    })
}

/// 白名单校验后反序列化为请求 DTO
pub fn parse_request<T: DeserializeOwned>(body: Value, allowed: &[&str]) -> ApiResult<T> {
    ensure_allowed_fields(&body, allowed)?;
    serde_json::from_value(body).map_err(|e| ApiError::ValidationError {
        message: format!("请求体解析失败: {}", e),
        guidance: None,
    })
}
