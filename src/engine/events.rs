// ==========================================
// 劳动力产能规划系统 - 缓存失效通知
// ==========================================
// 职责: 定义缓存失效 trait，由外部缓存层实现
// 说明: 每次提交成功的变更之后发出, 发送失败只记日志
// ==========================================

use crate::domain::calendar::MonthKey;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;

// ==========================================
// 失效范围
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvalidationScope {
    /// 单条需求行的某月 (Ramp 应用)
    ForecastMonth { forecast_id: i64, month: MonthKey },
    /// 分配变更涉及的月份
    AllocationMonths { months: Vec<MonthKey> },
    /// 单个资源 (停用/转正)
    Resource { resource_id: String },
    /// 策略或档位变更, 全量失效
    Reference,
}

impl InvalidationScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvalidationScope::ForecastMonth { .. } => "ForecastMonth",
            InvalidationScope::AllocationMonths { .. } => "AllocationMonths",
            InvalidationScope::Resource { .. } => "Resource",
            InvalidationScope::Reference => "Reference",
        }
    }
}

// ==========================================
// CacheInvalidator Trait
// ==========================================
pub trait CacheInvalidator: Send + Sync {
    fn invalidate(&self, scope: InvalidationScope) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// 空操作实现 (无外部缓存时使用)
#[derive(Debug, Clone, Default)]
pub struct NoOpCacheInvalidator;

impl CacheInvalidator for NoOpCacheInvalidator {
    fn invalidate(&self, scope: InvalidationScope) -> Result<(), Box<dyn Error + Send + Sync>> {
        tracing::debug!(scope = scope.as_str(), "NoOpCacheInvalidator: 跳过缓存失效");
        Ok(())
    }
}

/// 可选的缓存失效包装
pub struct OptionalCacheInvalidator {
    inner: Option<Arc<dyn CacheInvalidator>>,
}

impl OptionalCacheInvalidator {
    pub fn with_invalidator(invalidator: Arc<dyn CacheInvalidator>) -> Self {
        Self {
            inner: Some(invalidator),
        }
    }

    pub fn none() -> Self {
        Self { inner: None }
    }

    /// 发出失效通知; 失败只记录告警, 不影响已提交的变更
    pub fn notify(&self, scope: InvalidationScope) {
        let Some(invalidator) = &self.inner else {
            tracing::debug!(scope = scope.as_str(), "未配置缓存失效器，跳过");
            return;
        };
        let label = scope.as_str();
        if let Err(e) = invalidator.invalidate(scope) {
            tracing::warn!(scope = label, error = %e, "缓存失效通知失败");
        }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}

impl Default for OptionalCacheInvalidator {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Failing;

    impl CacheInvalidator for Failing {
        fn invalidate(&self, _scope: InvalidationScope) -> Result<(), Box<dyn Error + Send + Sync>> {
            Err("cache down".into())
        }
    }

    #[derive(Default)]
    struct Recording(Mutex<Vec<InvalidationScope>>);

    impl CacheInvalidator for Recording {
        fn invalidate(&self, scope: InvalidationScope) -> Result<(), Box<dyn Error + Send + Sync>> {
            self.0.lock().unwrap().push(scope);
            Ok(())
        }
    }

    #[test]
    fn test_failure_is_swallowed() {
        let wrapper = OptionalCacheInvalidator::with_invalidator(Arc::new(Failing));
        wrapper.notify(InvalidationScope::Reference);
        assert!(wrapper.is_configured());
    }

    #[test]
    fn test_scope_is_forwarded() {
        let recording = Arc::new(Recording::default());
        let wrapper = OptionalCacheInvalidator::with_invalidator(recording.clone());
        wrapper.notify(InvalidationScope::Resource {
            resource_id: "EMP-001".to_string(),
        });
        assert_eq!(recording.0.lock().unwrap().len(), 1);
        OptionalCacheInvalidator::none().notify(InvalidationScope::Reference);
    }
}
