// ==========================================
// 劳动力产能规划系统 - 周分配数据仓储
// ==========================================
// 红线: 同一资源同一 (year, week) 至多一条有效分配
// 说明: 存储层由部分唯一索引 ux_weekly_assignment_active 兜底,
//       调用方仍需在事务内先查后插, 冲突以 AssignmentConflict 返回
// ==========================================

use crate::domain::assignment::WeeklyAssignment;
use crate::domain::types::ResourceKind;
use crate::repository::error::{
    parse_date_column, parse_datetime_column, RepositoryError, RepositoryResult, DATETIME_FMT,
    DATE_FMT,
};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const ASSIGNMENT_COLUMNS: &str = r#"
    assignment_id, resource_id, resource_kind, forecast_id, year, week_number,
    week_start, tier_name, tier_percentage, weekly_capacity, is_active, created_at
"#;

// ==========================================
// AssignmentRepository - 周分配仓储
// ==========================================
pub struct AssignmentRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AssignmentRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn list_active_by_resource(&self, resource_id: &str) -> RepositoryResult<Vec<WeeklyAssignment>> {
        let conn = self.get_conn()?;
        Self::list_active_by_resource_tx(&conn, resource_id)
    }

    // ==========================================
    // 事务内操作
    // ==========================================

    /// 插入分配 (先查后插)
    ///
    /// # 返回
    /// - Err(AssignmentConflict): 该资源当周已有有效分配
    pub fn insert_tx(conn: &Connection, assignment: &WeeklyAssignment) -> RepositoryResult<()> {
        if assignment.is_active
            && Self::find_active_for_week_tx(
                conn,
                &assignment.resource_id,
                assignment.year,
                assignment.week_number,
            )?
            .is_some()
        {
            return Err(RepositoryError::AssignmentConflict {
                resource_id: assignment.resource_id.clone(),
                year: assignment.year,
                week_number: assignment.week_number,
            });
        }

        let result = conn.execute(
            r#"
            INSERT INTO weekly_assignment (
                assignment_id, resource_id, resource_kind, forecast_id, year, week_number,
                week_start, tier_name, tier_percentage, weekly_capacity, is_active, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                assignment.assignment_id,
                assignment.resource_id,
                assignment.resource_kind.as_str(),
                assignment.forecast_id,
                assignment.year,
                assignment.week_number,
                assignment.week_start.format(DATE_FMT).to_string(),
                assignment.tier_name,
                assignment.tier_percentage,
                assignment.weekly_capacity,
                assignment.is_active,
                assignment.created_at.format(DATETIME_FMT).to_string(),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) => match RepositoryError::from(e) {
                // 并发写入穿透先查后插时由部分唯一索引拦截
                RepositoryError::UniqueConstraintViolation(msg) if msg.contains("weekly_assignment.resource_id") => {
                    Err(RepositoryError::AssignmentConflict {
                        resource_id: assignment.resource_id.clone(),
                        year: assignment.year,
                        week_number: assignment.week_number,
                    })
                }
                other => Err(other),
            },
        }
    }

    pub fn find_active_for_week_tx(
        conn: &Connection,
        resource_id: &str,
        year: i32,
        week_number: u32,
    ) -> RepositoryResult<Option<WeeklyAssignment>> {
        let sql = format!(
            "SELECT {} FROM weekly_assignment WHERE resource_id = ?1 AND year = ?2 AND week_number = ?3 AND is_active = 1",
            ASSIGNMENT_COLUMNS
        );
        let found = conn
            .query_row(&sql, params![resource_id, year, week_number], map_assignment_row)
            .optional()?;
        Ok(found)
    }

    /// week_start 落在 [from, to] 内的全部有效分配
    pub fn list_active_in_range_tx(
        conn: &Connection,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RepositoryResult<Vec<WeeklyAssignment>> {
        let sql = format!(
            "SELECT {} FROM weekly_assignment WHERE is_active = 1 AND week_start >= ?1 AND week_start <= ?2 ORDER BY week_start, resource_id",
            ASSIGNMENT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params![from.format(DATE_FMT).to_string(), to.format(DATE_FMT).to_string()],
                map_assignment_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn list_active_by_resource_tx(
        conn: &Connection,
        resource_id: &str,
    ) -> RepositoryResult<Vec<WeeklyAssignment>> {
        let sql = format!(
            "SELECT {} FROM weekly_assignment WHERE resource_id = ?1 AND is_active = 1 ORDER BY week_start",
            ASSIGNMENT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![resource_id], map_assignment_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// 停用某资源的全部有效分配
    pub fn deactivate_by_resource_tx(conn: &Connection, resource_id: &str) -> RepositoryResult<usize> {
        let rows = conn.execute(
            "UPDATE weekly_assignment SET is_active = 0 WHERE resource_id = ?1 AND is_active = 1",
            params![resource_id],
        )?;
        Ok(rows)
    }

    /// 将单条有效分配转移给另一资源 (占位转正)
    ///
    /// # 返回
    /// - Err(AssignmentConflict): 目标资源当周已有有效分配
    pub fn transfer_tx(
        conn: &Connection,
        assignment: &WeeklyAssignment,
        to_resource_id: &str,
        to_kind: ResourceKind,
    ) -> RepositoryResult<()> {
        if Self::find_active_for_week_tx(conn, to_resource_id, assignment.year, assignment.week_number)?
            .is_some()
        {
            return Err(RepositoryError::AssignmentConflict {
                resource_id: to_resource_id.to_string(),
                year: assignment.year,
                week_number: assignment.week_number,
            });
        }

        let rows = conn.execute(
            "UPDATE weekly_assignment SET resource_id = ?2, resource_kind = ?3 WHERE assignment_id = ?1 AND is_active = 1",
            params![assignment.assignment_id, to_resource_id, to_kind.as_str()],
        )?;
        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "WeeklyAssignment".to_string(),
                id: assignment.assignment_id.clone(),
            });
        }
        Ok(())
    }
}

fn map_assignment_row(row: &Row) -> rusqlite::Result<WeeklyAssignment> {
    let kind_raw: String = row.get(2)?;
    let resource_kind = ResourceKind::parse(&kind_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("未知资源类型: {}", kind_raw).into(),
        )
    })?;

    Ok(WeeklyAssignment {
        assignment_id: row.get(0)?,
        resource_id: row.get(1)?,
        resource_kind,
        forecast_id: row.get(3)?,
        year: row.get(4)?,
        week_number: row.get(5)?,
        week_start: parse_date_column(6, &row.get::<_, String>(6)?)?,
        tier_name: row.get(7)?,
        tier_percentage: row.get(8)?,
        weekly_capacity: row.get(9)?,
        is_active: row.get(10)?,
        created_at: parse_datetime_column(11, &row.get::<_, String>(11)?)?,
    })
}
