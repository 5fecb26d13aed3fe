// ==========================================
// 劳动力产能规划系统 - 产能档位领域模型
// ==========================================
// 红线: 档位一旦被分配引用即不可修改,只能软停用
// ==========================================

use serde::{Deserialize, Serialize};

// ==========================================
// CapacityTier - 产能档位
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityTier {
    pub tier_name: String,  // 档位名称 (唯一), 如 "50%"
    pub percentage: f64,    // 产出百分比 (0-100)
    pub is_active: bool,
}

impl CapacityTier {
    pub fn new(tier_name: &str, percentage: f64) -> Self {
        Self {
            tier_name: tier_name.to_string(),
            percentage,
            is_active: true,
        }
    }

    /// 档位比例 (0.0 - 1.0), 供产能计算使用
    pub fn fraction(&self) -> f64 {
        self.percentage / 100.0
    }

    /// 百分比是否在合法区间
    pub fn is_valid_percentage(percentage: f64) -> bool {
        percentage.is_finite() && (0.0..=100.0).contains(&percentage)
    }
}

/// 系统默认档位 (25/50/75/100)
pub fn default_tiers() -> Vec<CapacityTier> {
    [25.0, 50.0, 75.0, 100.0]
        .iter()
        .map(|p| CapacityTier::new(&format!("{}%", p), *p))
        .collect()
}
