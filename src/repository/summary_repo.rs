// ==========================================
// 劳动力产能规划系统 - 月度汇总数据仓储
// ==========================================
// 说明: 汇总为物化结果, 每次全量重算后覆盖写入
// ==========================================

use crate::domain::assignment::{MonthlyCapacitySummary, TierBreakdown};
use crate::repository::error::{parse_datetime_column, RepositoryError, RepositoryResult, DATETIME_FMT};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

pub struct SummaryRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SummaryRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn find(&self, year: i32, month: u32) -> RepositoryResult<Option<MonthlyCapacitySummary>> {
        let conn = self.get_conn()?;
        let summary = conn
            .query_row(
                r#"
                SELECT month, year, actual_fte, placeholder_fte, actual_capacity,
                       placeholder_capacity, total_capacity, forecast_demand, capacity_gap,
                       tier_breakdown_json, generated_at
                FROM monthly_capacity_summary
                WHERE year = ?1 AND month = ?2
                "#,
                params![year, month],
                map_summary_row,
            )
            .optional()?;
        Ok(summary)
    }

    /// 覆盖写入
    pub fn upsert_tx(conn: &Connection, summary: &MonthlyCapacitySummary) -> RepositoryResult<()> {
        let tier_json = serde_json::to_string(&summary.tier_breakdown)?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO monthly_capacity_summary (
                month, year, actual_fte, placeholder_fte, actual_capacity,
                placeholder_capacity, total_capacity, forecast_demand, capacity_gap,
                tier_breakdown_json, generated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                summary.month,
                summary.year,
                summary.actual_fte as i64,
                summary.placeholder_fte as i64,
                summary.actual_capacity,
                summary.placeholder_capacity,
                summary.total_capacity,
                summary.forecast_demand,
                summary.capacity_gap,
                tier_json,
                summary.generated_at.format(DATETIME_FMT).to_string(),
            ],
        )?;
        Ok(())
    }
}

fn map_summary_row(row: &Row) -> rusqlite::Result<MonthlyCapacitySummary> {
    let tier_raw: String = row.get(9)?;
    let tier_breakdown: Vec<TierBreakdown> = serde_json::from_str(&tier_raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(MonthlyCapacitySummary {
        month: row.get(0)?,
        year: row.get(1)?,
        actual_fte: row.get::<_, i64>(2)? as usize,
        placeholder_fte: row.get::<_, i64>(3)? as usize,
        actual_capacity: row.get(4)?,
        placeholder_capacity: row.get(5)?,
        total_capacity: row.get(6)?,
        forecast_demand: row.get(7)?,
        capacity_gap: row.get(8)?,
        tier_breakdown,
        generated_at: parse_datetime_column(10, &row.get::<_, String>(10)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory_with_schema;
    use chrono::NaiveDate;

    fn summary(total: f64) -> MonthlyCapacitySummary {
        MonthlyCapacitySummary {
            month: 4,
            year: 2025,
            actual_fte: 2,
            placeholder_fte: 1,
            actual_capacity: total - 10.0,
            placeholder_capacity: 10.0,
            total_capacity: total,
            forecast_demand: 100.0,
            capacity_gap: total - 100.0,
            tier_breakdown: vec![TierBreakdown {
                tier_name: "100%".to_string(),
                capacity: total,
                fte_equivalent: 3.0,
                resource_count: 3,
            }],
            generated_at: NaiveDate::from_ymd_opt(2025, 4, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_upsert_overwrites_existing_month() {
        let repo = SummaryRepository::new(Arc::new(Mutex::new(open_in_memory_with_schema().unwrap())));
        {
            let conn = repo.get_conn().unwrap();
            SummaryRepository::upsert_tx(&conn, &summary(50.0)).unwrap();
            SummaryRepository::upsert_tx(&conn, &summary(80.0)).unwrap();
        }
        assert_eq!(repo.find(2025, 4).unwrap(), Some(summary(80.0)));
        assert_eq!(repo.find(2025, 5).unwrap(), None);
    }
}
