// ==========================================
// 劳动力产能规划系统 - 周配置数据仓储
// ==========================================
// 主键: (year, week_number) 为 ISO 周
// ==========================================

use crate::domain::calendar::{MonthKey, WeekConfiguration};
use crate::repository::error::{parse_date_column, RepositoryError, RepositoryResult, DATE_FMT};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const WEEK_COLUMNS: &str = r#"
    year, week_number, week_start, week_end, month, month_year,
    working_days, work_hours, shrinkage, occupancy
"#;

pub struct WeekConfigRepository {
    conn: Arc<Mutex<Connection>>,
}

impl WeekConfigRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 批量写入 (同一 ISO 周覆盖)
    pub fn upsert_batch(&self, weeks: &[WeekConfiguration]) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        for week in weeks {
            tx.execute(
                r#"
                INSERT OR REPLACE INTO week_configuration (
                    year, week_number, week_start, week_end, month, month_year,
                    working_days, work_hours, shrinkage, occupancy
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
                params![
                    week.year,
                    week.week_number,
                    week.week_start.format(DATE_FMT).to_string(),
                    week.week_end.format(DATE_FMT).to_string(),
                    week.month,
                    week.month_year,
                    week.working_days,
                    week.work_hours,
                    week.shrinkage,
                    week.occupancy,
                ],
            )?;
        }
        tx.commit()?;
        Ok(weeks.len())
    }

    pub fn list_by_month(&self, month: MonthKey) -> RepositoryResult<Vec<WeekConfiguration>> {
        let conn = self.get_conn()?;
        Self::list_by_month_tx(&conn, month)
    }

    pub fn list_all(&self) -> RepositoryResult<Vec<WeekConfiguration>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM week_configuration ORDER BY week_start", WEEK_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let weeks = stmt
            .query_map([], map_week_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(weeks)
    }

    /// 归属于某月的周 (按周一排序)
    pub fn list_by_month_tx(conn: &Connection, month: MonthKey) -> RepositoryResult<Vec<WeekConfiguration>> {
        let sql = format!(
            "SELECT {} FROM week_configuration WHERE month_year = ?1 AND month = ?2 ORDER BY week_start",
            WEEK_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let weeks = stmt
            .query_map(params![month.year, month.month], map_week_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(weeks)
    }

    pub fn find_tx(conn: &Connection, year: i32, week_number: u32) -> RepositoryResult<Option<WeekConfiguration>> {
        let sql = format!(
            "SELECT {} FROM week_configuration WHERE year = ?1 AND week_number = ?2",
            WEEK_COLUMNS
        );
        let week = conn
            .query_row(&sql, params![year, week_number], map_week_row)
            .optional()?;
        Ok(week)
    }
}

fn map_week_row(row: &Row) -> rusqlite::Result<WeekConfiguration> {
    Ok(WeekConfiguration {
        year: row.get(0)?,
        week_number: row.get(1)?,
        week_start: parse_date_column(2, &row.get::<_, String>(2)?)?,
        week_end: parse_date_column(3, &row.get::<_, String>(3)?)?,
        month: row.get(4)?,
        month_year: row.get(5)?,
        working_days: row.get(6)?,
        work_hours: row.get(7)?,
        shrinkage: row.get(8)?,
        occupancy: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory_with_schema;
    use crate::domain::calendar::{iso_week_end, iso_week_start};

    fn week(year: i32, week_number: u32, month: u32, working_days: f64) -> WeekConfiguration {
        WeekConfiguration {
            year,
            week_number,
            week_start: iso_week_start(year, week_number).unwrap(),
            week_end: iso_week_end(year, week_number).unwrap(),
            month,
            month_year: year,
            working_days,
            work_hours: 9.0,
            shrinkage: 0.1,
            occupancy: None,
        }
    }

    #[test]
    fn test_upsert_batch_and_list_by_month() {
        let repo = WeekConfigRepository::new(Arc::new(Mutex::new(open_in_memory_with_schema().unwrap())));
        repo.upsert_batch(&[week(2025, 14, 3, 5.0), week(2025, 15, 4, 5.0), week(2025, 16, 4, 5.0)])
            .unwrap();
        // 覆盖第 15 周
        repo.upsert_batch(&[week(2025, 15, 4, 4.0)]).unwrap();

        let april = repo.list_by_month(MonthKey::new(2025, 4).unwrap()).unwrap();
        assert_eq!(april.len(), 2);
        assert_eq!(april[0].week_number, 15);
        assert_eq!(april[0].working_days, 4.0);
        assert_eq!(repo.list_all().unwrap().len(), 3);
    }
}
