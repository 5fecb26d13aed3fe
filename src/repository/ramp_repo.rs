// ==========================================
// 劳动力产能规划系统 - Ramp 记录数据仓储
// ==========================================
// 红线: 复合键 (forecast_id, month_key, ramp_percent, working_days)
//       命中则更新, 未命中则插入; 未提交的已有记录保持不变
// ==========================================

use crate::domain::ramp::{RampKey, RampRecord, RampWeek, RAMP_APPLIED_BY_SYSTEM};
use crate::repository::error::{
    parse_date_column, parse_datetime_column, RepositoryError, RepositoryResult, DATETIME_FMT,
    DATE_FMT,
};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, Row};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const RAMP_COLUMNS: &str = r#"
    ramp_id, forecast_id, month_key, week_label, start_date, end_date,
    working_days, ramp_percent, employee_count, notes, applied_at, applied_by
"#;

// ==========================================
// RampUpsert - 写入计划
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub enum RampUpsert {
    Insert(RampRecord),
    Update(RampRecord), // 携带已有 ramp_id
}

/// 根据已有记录与本次提交的周生成写入计划 (纯函数)
///
/// 请求校验已拒绝同一提交内的重复复合键; 直接调用时若仍有重复, 以最后一次为准
pub fn plan_ramp_upserts(
    existing: &[RampRecord],
    forecast_id: i64,
    month_key: &str,
    weeks: &[RampWeek],
    notes: Option<&str>,
    applied_at: NaiveDateTime,
) -> Vec<RampUpsert> {
    let by_key: HashMap<RampKey, &RampRecord> = existing.iter().map(|r| (r.key(), r)).collect();

    let mut order: Vec<RampKey> = Vec::new();
    let mut planned: HashMap<RampKey, RampUpsert> = HashMap::new();

    for week in weeks {
        let key = RampKey::new(forecast_id, month_key, week.ramp_percent, week.working_days);
        let upsert = match by_key.get(&key) {
            Some(current) => RampUpsert::Update(RampRecord {
                week_label: week.label.clone(),
                start_date: week.start_date,
                end_date: week.end_date,
                employee_count: week.ramp_employees,
                notes: notes.map(str::to_string).or_else(|| current.notes.clone()),
                applied_at,
                ..(*current).clone()
            }),
            None => RampUpsert::Insert(RampRecord {
                ramp_id: 0,
                forecast_id,
                month_key: month_key.to_string(),
                week_label: week.label.clone(),
                start_date: week.start_date,
                end_date: week.end_date,
                working_days: week.working_days,
                ramp_percent: week.ramp_percent,
                employee_count: week.ramp_employees,
                notes: notes.map(str::to_string),
                applied_at,
                applied_by: RAMP_APPLIED_BY_SYSTEM.to_string(),
            }),
        };
        if !planned.contains_key(&key) {
            order.push(key.clone());
        }
        planned.insert(key, upsert);
    }

    order
        .into_iter()
        .filter_map(|key| planned.remove(&key))
        .collect()
}

// ==========================================
// RampRepository - Ramp 记录仓储
// ==========================================
pub struct RampRepository {
    conn: Arc<Mutex<Connection>>,
}

impl RampRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 查询某需求某月的 Ramp 记录 (按开始日期排序)
    pub fn list_by_forecast_month(&self, forecast_id: i64, month_key: &str) -> RepositoryResult<Vec<RampRecord>> {
        let conn = self.get_conn()?;
        Self::list_by_forecast_month_tx(&conn, forecast_id, month_key)
    }

    // ==========================================
    // 事务内操作
    // ==========================================

    pub fn list_by_forecast_month_tx(
        conn: &Connection,
        forecast_id: i64,
        month_key: &str,
    ) -> RepositoryResult<Vec<RampRecord>> {
        let sql = format!(
            "SELECT {} FROM ramp_record WHERE forecast_id = ?1 AND month_key = ?2 ORDER BY start_date, ramp_id",
            RAMP_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params![forecast_id, month_key], map_ramp_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// 执行写入计划
    ///
    /// # 返回
    /// - Ok((inserted, updated))
    pub fn apply_upserts_tx(conn: &Connection, upserts: &[RampUpsert]) -> RepositoryResult<(usize, usize)> {
        let mut inserted = 0;
        let mut updated = 0;
        for upsert in upserts {
            match upsert {
                RampUpsert::Insert(record) => {
                    Self::insert_tx(conn, record)?;
                    inserted += 1;
                }
                RampUpsert::Update(record) => {
                    Self::update_tx(conn, record)?;
                    updated += 1;
                }
            }
        }
        Ok((inserted, updated))
    }

    pub fn insert_tx(conn: &Connection, record: &RampRecord) -> RepositoryResult<i64> {
        conn.execute(
            r#"
            INSERT INTO ramp_record (
                forecast_id, month_key, week_label, start_date, end_date,
                working_days, ramp_percent, employee_count, notes, applied_at, applied_by
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                record.forecast_id,
                record.month_key,
                record.week_label,
                record.start_date.format(DATE_FMT).to_string(),
                record.end_date.format(DATE_FMT).to_string(),
                record.working_days,
                record.ramp_percent,
                record.employee_count,
                record.notes,
                record.applied_at.format(DATETIME_FMT).to_string(),
                record.applied_by,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// 更新命中记录 (人数、标签、日期、应用时间、备注)
    pub fn update_tx(conn: &Connection, record: &RampRecord) -> RepositoryResult<()> {
        let rows = conn.execute(
            r#"
            UPDATE ramp_record
            SET employee_count = ?2, week_label = ?3, start_date = ?4, end_date = ?5,
                applied_at = ?6, notes = ?7
            WHERE ramp_id = ?1
            "#,
            params![
                record.ramp_id,
                record.employee_count,
                record.week_label,
                record.start_date.format(DATE_FMT).to_string(),
                record.end_date.format(DATE_FMT).to_string(),
                record.applied_at.format(DATETIME_FMT).to_string(),
                record.notes,
            ],
        )?;
        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "RampRecord".to_string(),
                id: record.ramp_id.to_string(),
            });
        }
        Ok(())
    }
}

fn map_ramp_row(row: &Row) -> rusqlite::Result<RampRecord> {
    Ok(RampRecord {
        ramp_id: row.get(0)?,
        forecast_id: row.get(1)?,
        month_key: row.get(2)?,
        week_label: row.get(3)?,
        start_date: parse_date_column(4, &row.get::<_, String>(4)?)?,
        end_date: parse_date_column(5, &row.get::<_, String>(5)?)?,
        working_days: row.get(6)?,
        ramp_percent: row.get(7)?,
        employee_count: row.get(8)?,
        notes: row.get(9)?,
        applied_at: parse_datetime_column(10, &row.get::<_, String>(10)?)?,
        applied_by: row.get(11)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn week(label: &str, day: u32, working_days: i64, pct: f64, employees: i64) -> RampWeek {
        RampWeek {
            label: label.to_string(),
            start_date: NaiveDate::from_ymd_opt(2025, 4, day).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 4, day + 4).unwrap(),
            working_days,
            ramp_percent: pct,
            ramp_employees: employees,
        }
    }

    fn applied_at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 4, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_plan_inserts_when_nothing_exists() {
        let weeks = vec![week("W1", 7, 4, 50.0, 2), week("W2", 14, 5, 80.0, 9)];
        let plan = plan_ramp_upserts(&[], 7, "2025-04", &weeks, None, applied_at());
        assert_eq!(plan.len(), 2);
        assert!(plan.iter().all(|u| matches!(u, RampUpsert::Insert(r) if r.applied_by == "system")));
    }

    #[test]
    fn test_plan_updates_matching_key_and_leaves_others() {
        let existing = RampRecord {
            ramp_id: 11,
            forecast_id: 7,
            month_key: "2025-04".to_string(),
            week_label: "old".to_string(),
            start_date: NaiveDate::from_ymd_opt(2025, 4, 7).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 4, 11).unwrap(),
            working_days: 4,
            ramp_percent: 50.0,
            employee_count: 1,
            notes: Some("first".to_string()),
            applied_at: applied_at(),
            applied_by: "planner".to_string(),
        };
        let weeks = vec![week("W1", 7, 4, 50.0, 3)];
        let plan = plan_ramp_upserts(&[existing], 7, "2025-04", &weeks, None, applied_at());

        assert_eq!(plan.len(), 1);
        match &plan[0] {
            RampUpsert::Update(r) => {
                assert_eq!(r.ramp_id, 11);
                assert_eq!(r.employee_count, 3);
                assert_eq!(r.week_label, "W1");
                assert_eq!(r.applied_by, "planner");
                assert_eq!(r.notes.as_deref(), Some("first"));
            }
            other => panic!("expected update, got {:?}", other),
        }
    }

    #[test]
    fn test_plan_collapses_duplicate_keys_in_one_request() {
        let weeks = vec![week("W1", 7, 4, 50.0, 2), week("W1b", 7, 4, 50.0, 6)];
        let plan = plan_ramp_upserts(&[], 7, "2025-04", &weeks, Some("n"), applied_at());
        assert_eq!(plan.len(), 1);
        assert!(matches!(&plan[0], RampUpsert::Insert(r) if r.employee_count == 6));
    }
}
