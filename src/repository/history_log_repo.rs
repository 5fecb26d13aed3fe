// ==========================================
// 劳动力产能规划系统 - 变更历史数据仓储
// ==========================================
// 红线: 历史日志只追加, 不修改
// ==========================================

use crate::domain::history::HistoryLog;
use crate::repository::error::{parse_datetime_column, RepositoryError, RepositoryResult, DATETIME_FMT};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const HISTORY_COLUMNS: &str = r#"
    history_log_id, entity_type, entity_id, change_type, month_key, actor,
    notes, summary, change_record_json, created_at
"#;

// ==========================================
// HistoryLogRepository - 历史日志仓储
// ==========================================
pub struct HistoryLogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl HistoryLogRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 插入历史日志
    ///
    /// # 返回
    /// - `Ok(history_log_id)`
    pub fn insert(&self, log: &HistoryLog) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        Self::insert_tx(&conn, log)
    }

    pub fn find_by_id(&self, history_log_id: &str) -> RepositoryResult<Option<HistoryLog>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM history_log WHERE history_log_id = ?1", HISTORY_COLUMNS);
        let log = conn
            .query_row(&sql, params![history_log_id], map_history_row)
            .optional()?;
        Ok(log)
    }

    /// 查询某实体的历史 (最新在前)
    pub fn list_by_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
        limit: usize,
    ) -> RepositoryResult<Vec<HistoryLog>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM history_log WHERE entity_type = ?1 AND entity_id = ?2 ORDER BY created_at DESC, rowid DESC LIMIT ?3",
            HISTORY_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let logs = stmt
            .query_map(params![entity_type, entity_id, limit as i64], map_history_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(logs)
    }

    pub fn insert_tx(conn: &Connection, log: &HistoryLog) -> RepositoryResult<String> {
        conn.execute(
            r#"
            INSERT INTO history_log (
                history_log_id, entity_type, entity_id, change_type, month_key, actor,
                notes, summary, change_record_json, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                log.history_log_id,
                log.entity_type,
                log.entity_id,
                log.change_type,
                log.month_key,
                log.actor,
                log.notes,
                log.summary,
                log.change_record_json.as_ref().map(|v| v.to_string()),
                log.created_at.format(DATETIME_FMT).to_string(),
            ],
        )?;
        Ok(log.history_log_id.clone())
    }
}

fn map_history_row(row: &Row) -> rusqlite::Result<HistoryLog> {
    let change_record_json = row
        .get::<_, Option<String>>(8)?
        .map(|raw| {
            serde_json::from_str(&raw).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
            })
        })
        .transpose()?;

    Ok(HistoryLog {
        history_log_id: row.get(0)?,
        entity_type: row.get(1)?,
        entity_id: row.get(2)?,
        change_type: row.get(3)?,
        month_key: row.get(4)?,
        actor: row.get(5)?,
        notes: row.get(6)?,
        summary: row.get(7)?,
        change_record_json,
        created_at: parse_datetime_column(9, &row.get::<_, String>(9)?)?,
    })
}
