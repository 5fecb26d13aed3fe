// ==========================================
// 劳动力产能规划系统 - 需求预测领域模型
// ==========================================
// 职责: 需求行 (站点/LOB/州/案件类型) 及其 6 个月滚动窗口
// 红线: ForecastDemand 是 Ramp 计算的唯一写入目标
// ==========================================

use crate::domain::calendar::MonthKey;
use crate::domain::history::{FieldPath, FieldSchema, FieldSnapshot};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 滚动窗口月份数
pub const FORECAST_WINDOW_MONTHS: usize = 6;

// ==========================================
// ForecastField - 受跟踪字段
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastField {
    Forecast,     // 预测量
    FteRequired,  // 需求 FTE
    FteAvailable, // 可用 FTE
    Capacity,     // 产能
}

impl ForecastField {
    pub const ALL: [ForecastField; 4] = [
        ForecastField::Forecast,
        ForecastField::FteRequired,
        ForecastField::FteAvailable,
        ForecastField::Capacity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ForecastField::Forecast => "forecast",
            ForecastField::FteRequired => "fte_required",
            ForecastField::FteAvailable => "fte_available",
            ForecastField::Capacity => "capacity",
        }
    }
}

impl fmt::Display for ForecastField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// MonthSlot - 单月数值
// ==========================================
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthSlot {
    pub forecast: i64,
    pub fte_required: i64,
    pub fte_available: i64,
    pub capacity: i64,
}

impl MonthSlot {
    pub fn get(&self, field: ForecastField) -> i64 {
        match field {
            ForecastField::Forecast => self.forecast,
            ForecastField::FteRequired => self.fte_required,
            ForecastField::FteAvailable => self.fte_available,
            ForecastField::Capacity => self.capacity,
        }
    }
}

// ==========================================
// ForecastDemand - 需求行
// ==========================================
// 对齐: forecast_demand 表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastDemand {
    // ===== 主键 =====
    pub forecast_id: i64,

    // ===== 匹配维度 =====
    pub platform: String,
    pub location: String,        // 站点
    pub main_lob: String,
    pub state: String,
    pub case_type: String,
    pub worktype: String,        // 月度配置检索维度

    // ===== 产出参数 =====
    pub target_cph: f64,         // 目标每小时处理量

    // ===== 报告期 =====
    pub start_year: i32,         // 窗口首月 (年)
    pub start_month: u32,        // 窗口首月 (月)

    // ===== 月度数值 =====
    pub months: [MonthSlot; FORECAST_WINDOW_MONTHS],
}

impl ForecastDemand {
    /// 窗口首月
    pub fn start_key(&self) -> Option<MonthKey> {
        MonthKey::new(self.start_year, self.start_month)
    }

    /// 第 index 个槽位对应的月份
    pub fn month_at(&self, index: usize) -> Option<MonthKey> {
        if index >= FORECAST_WINDOW_MONTHS {
            return None;
        }
        self.start_key().map(|start| start.plus_months(index as u32))
    }

    /// 窗口内全部月份 (按槽位顺序)
    pub fn window(&self) -> Vec<MonthKey> {
        (0..FORECAST_WINDOW_MONTHS)
            .filter_map(|i| self.month_at(i))
            .collect()
    }

    /// 将月份解析为槽位下标
    ///
    /// # 返回
    /// - None: 月份不在本行的 6 个月窗口内
    pub fn resolve_slot(&self, key: MonthKey) -> Option<usize> {
        self.window().iter().position(|m| *m == key)
    }

    /// 受跟踪字段集合: 6 个月 × {forecast, fte_required, fte_available, capacity}
    pub fn tracked_schema(&self) -> FieldSchema {
        let paths = self
            .window()
            .iter()
            .flat_map(|month| {
                ForecastField::ALL
                    .iter()
                    .map(move |field| FieldPath::new(&month.label(), field.as_str()))
            })
            .collect();
        FieldSchema::new(paths)
    }

    /// 当前受跟踪字段快照
    pub fn snapshot(&self) -> FieldSnapshot {
        let mut snapshot = FieldSnapshot::default();
        for (index, month) in self.window().iter().enumerate() {
            let slot = &self.months[index];
            for field in ForecastField::ALL {
                snapshot.insert(FieldPath::new(&month.label(), field.as_str()), slot.get(field));
            }
        }
        snapshot
    }
}
