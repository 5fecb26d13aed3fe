// ==========================================
// 劳动力产能规划系统 - 日历与周期配置
// ==========================================
// 职责: 月度配置、ISO 周配置、月份键 (YYYY-MM)
// 口径: 周以周一为起点、周日为终点; 周归属于其周一所在月份
// ==========================================

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// MonthKey - 月份键
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32, // 1-12
}

const MONTH_ABBR: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) {
            Some(Self { year, month })
        } else {
            None
        }
    }

    /// 严格解析 `YYYY-MM`
    ///
    /// 规则: 长度必须为 7, 第 5 位为 '-', 其余为数字, 月份 01-12
    pub fn parse(raw: &str) -> Option<Self> {
        let bytes = raw.as_bytes();
        if bytes.len() != 7 || bytes[4] != b'-' {
            return None;
        }
        let digits_ok = bytes[..4].iter().chain(&bytes[5..]).all(|b| b.is_ascii_digit());
        if !digits_ok {
            return None;
        }
        let year = raw[..4].parse::<i32>().ok()?;
        let month = raw[5..].parse::<u32>().ok()?;
        Self::new(year, month)
    }

    /// 向后偏移 n 个月
    pub fn plus_months(&self, n: u32) -> Self {
        let zero_based = self.month - 1 + n;
        Self {
            year: self.year + (zero_based / 12) as i32,
            month: zero_based % 12 + 1,
        }
    }

    /// 月份展示标签, 例如 `Apr-2025` (历史记录字段路径使用)
    pub fn label(&self) -> String {
        format!("{}-{}", MONTH_ABBR[(self.month - 1) as usize], self.year)
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    pub fn last_day(&self) -> Option<NaiveDate> {
        self.plus_months(1).first_day().map(|d| d - Duration::days(1))
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

// ==========================================
// MonthConfiguration - 月度产能参数
// ==========================================
// 对齐: month_configuration 表 (year, month, worktype)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthConfiguration {
    pub year: i32,
    pub month: u32,
    pub worktype: String,
    pub working_days: f64,
    pub occupancy: f64,
    pub shrinkage: f64,
    pub work_hours: f64,
}

// ==========================================
// WeekConfiguration - 周产能参数
// ==========================================
// 主键: (year, week_number) 为 ISO 周
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekConfiguration {
    pub year: i32,               // ISO 周所属年
    pub week_number: u32,        // ISO 周序号
    pub week_start: NaiveDate,   // 周一
    pub week_end: NaiveDate,     // 周日
    pub month: u32,              // 归属月份
    pub month_year: i32,         // 归属月份的年
    pub working_days: f64,
    pub work_hours: f64,
    pub shrinkage: f64,
    pub occupancy: Option<f64>,  // 周路径无占用率概念时为空
}

impl WeekConfiguration {
    pub fn month_key(&self) -> MonthKey {
        MonthKey {
            year: self.month_year,
            month: self.month,
        }
    }
}

/// ISO 周的周一
pub fn iso_week_start(year: i32, week_number: u32) -> Option<NaiveDate> {
    NaiveDate::from_isoywd_opt(year, week_number, Weekday::Mon)
}

/// ISO 周的周日
pub fn iso_week_end(year: i32, week_number: u32) -> Option<NaiveDate> {
    NaiveDate::from_isoywd_opt(year, week_number, Weekday::Sun)
}
