// ==========================================
// 劳动力产能规划系统 - 周历生成
// ==========================================
// 职责: 由月度配置按日历推导该月的 ISO 周配置
// 口径: 周一落在该月的周归属该月; 工作日为周一至周五, 节假日扣减
//       周匹配路径不带占用率 (计算时按 1.0), 占用率只作用于 Ramp 路径
// ==========================================

use crate::domain::calendar::{MonthConfiguration, MonthKey, WeekConfiguration};
use chrono::{Datelike, Duration, NaiveDate};
use std::collections::HashSet;

pub struct WeekCalendar;

impl WeekCalendar {
    /// 生成某月的周配置 (按周一排序)
    ///
    /// # 返回
    /// - 空列表: 月份非法
    pub fn generate_for_month(config: &MonthConfiguration, holidays: &[NaiveDate]) -> Vec<WeekConfiguration> {
        let Some(month) = MonthKey::new(config.year, config.month) else {
            return Vec::new();
        };
        let (Some(first), Some(last)) = (month.first_day(), month.last_day()) else {
            return Vec::new();
        };
        let holidays: HashSet<NaiveDate> = holidays.iter().copied().collect();

        let offset = first.weekday().num_days_from_monday() as i64;
        let mut monday = if offset == 0 {
            first
        } else {
            first + Duration::days(7 - offset)
        };

        let mut weeks = Vec::new();
        while monday <= last {
            let sunday = monday + Duration::days(6);
            let working_days = (0..5)
                .map(|i| monday + Duration::days(i))
                .filter(|day| !holidays.contains(day))
                .count() as f64;
            let iso = monday.iso_week();

            weeks.push(WeekConfiguration {
                year: iso.year(),
                week_number: iso.week(),
                week_start: monday,
                week_end: sunday,
                month: month.month,
                month_year: month.year,
                working_days,
                work_hours: config.work_hours,
                shrinkage: config.shrinkage,
                occupancy: None,
            });
            monday = monday + Duration::days(7);
        }

        weeks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(year: i32, month: u32) -> MonthConfiguration {
        MonthConfiguration {
            year,
            month,
            worktype: "Domestic".to_string(),
            working_days: 21.0,
            occupancy: 0.95,
            shrinkage: 0.10,
            work_hours: 9.0,
        }
    }

    #[test]
    fn test_april_2025_weeks_start_on_mondays_in_month() {
        let weeks = WeekCalendar::generate_for_month(&config(2025, 4), &[]);
        let starts: Vec<u32> = weeks.iter().map(|w| w.week_start.day()).collect();
        assert_eq!(starts, vec![7, 14, 21, 28]);
        assert_eq!(weeks[0].week_number, 15);
        // 4/28 的周跨入 5 月, 仍归属 4 月
        assert_eq!(weeks[3].week_end, NaiveDate::from_ymd_opt(2025, 5, 4).unwrap());
        assert_eq!(weeks[3].month, 4);
        assert!(weeks.iter().all(|w| w.working_days == 5.0));
        // 月度占用率不下沉到周配置
        assert!(weeks.iter().all(|w| w.occupancy.is_none()));
        assert!(weeks.iter().all(|w| w.shrinkage == 0.10 && w.work_hours == 9.0));
    }

    #[test]
    fn test_holidays_reduce_working_days() {
        let holiday = NaiveDate::from_ymd_opt(2025, 4, 18).unwrap(); // 周五
        let weekend = NaiveDate::from_ymd_opt(2025, 4, 19).unwrap(); // 周六, 不扣减
        let weeks = WeekCalendar::generate_for_month(&config(2025, 4), &[holiday, weekend]);
        assert_eq!(weeks[1].working_days, 4.0);
        assert_eq!(weeks[2].working_days, 5.0);
    }

    #[test]
    fn test_iso_year_at_boundary() {
        // 2024-12-30 为周一, 属于 ISO 2025 年第 1 周, 归属 2024-12
        let weeks = WeekCalendar::generate_for_month(&config(2024, 12), &[]);
        let last = weeks.last().unwrap();
        assert_eq!((last.year, last.week_number), (2025, 1));
        assert_eq!((last.month_year, last.month), (2024, 12));
    }

    #[test]
    fn test_invalid_month_yields_nothing() {
        assert!(WeekCalendar::generate_for_month(&config(2025, 13), &[]).is_empty());
    }
}
