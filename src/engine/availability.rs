// ==========================================
// 劳动力产能规划系统 - 可用性判定引擎
// ==========================================
// 职责: 判定资源在某周是否可分配 (到岗/离岗窗口)
// 红线: 纯函数, 不读库; 所有判定必须输出 reason
// ==========================================

use crate::config::policy_keys;
use crate::config::PolicySnapshot;
use crate::domain::resource::Resource;
use chrono::NaiveDate;

// ==========================================
// AvailabilityPolicy - 窗口校验开关
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvailabilityPolicy {
    pub enforce_available_from: bool,
    pub enforce_available_until: bool,
}

impl AvailabilityPolicy {
    /// 从策略快照读取; 缺失时按开启处理
    pub fn from_snapshot(snapshot: &PolicySnapshot) -> Self {
        Self {
            enforce_available_from: snapshot
                .bool(policy_keys::ENFORCE_AVAILABLE_FROM)
                .unwrap_or(true),
            enforce_available_until: snapshot
                .bool(policy_keys::ENFORCE_AVAILABLE_UNTIL)
                .unwrap_or(true),
        }
    }
}

impl Default for AvailabilityPolicy {
    fn default() -> Self {
        Self {
            enforce_available_from: true,
            enforce_available_until: true,
        }
    }
}

// ==========================================
// AvailabilityDecision - 判定结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvailabilityDecision {
    Available,
    BeforeAvailableFrom { available_from: NaiveDate },
    AfterAvailableUntil { available_until: NaiveDate },
}

impl AvailabilityDecision {
    pub fn is_available(&self) -> bool {
        matches!(self, AvailabilityDecision::Available)
    }

    pub fn reason(&self) -> String {
        match self {
            AvailabilityDecision::Available => "AVAILABLE".to_string(),
            AvailabilityDecision::BeforeAvailableFrom { available_from } => {
                format!("BEFORE_AVAILABLE_FROM: 周开始早于到岗日 {}", available_from)
            }
            AvailabilityDecision::AfterAvailableUntil { available_until } => {
                format!("AFTER_AVAILABLE_UNTIL: 周结束晚于离岗日 {}", available_until)
            }
        }
    }
}

// ==========================================
// AvailabilityEvaluator
// ==========================================
pub struct AvailabilityEvaluator;

impl AvailabilityEvaluator {
    /// 判定资源在 [week_start, week_end] 周内是否可用
    ///
    /// 规则:
    /// 1) available_from 已设置且开启校验: week_start < available_from 则不可用
    /// 2) available_until 已设置且开启校验: week_end > available_until 则不可用
    /// 3) 未设置的边界或关闭的校验不构成约束
    pub fn evaluate(
        resource: &Resource,
        week_start: NaiveDate,
        week_end: NaiveDate,
        policy: &AvailabilityPolicy,
    ) -> AvailabilityDecision {
        if let Some(available_from) = resource.available_from {
            if policy.enforce_available_from && week_start < available_from {
                return AvailabilityDecision::BeforeAvailableFrom { available_from };
            }
        }
        if let Some(available_until) = resource.available_until {
            if policy.enforce_available_until && week_end > available_until {
                return AvailabilityDecision::AfterAvailableUntil { available_until };
            }
        }
        AvailabilityDecision::Available
    }

    pub fn is_available(
        resource: &Resource,
        week_start: NaiveDate,
        week_end: NaiveDate,
        policy: &AvailabilityPolicy,
    ) -> bool {
        Self::evaluate(resource, week_start, week_end, policy).is_available()
    }
}
