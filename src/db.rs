// ==========================================
// 劳动力产能规划系统 - SQLite 连接与建库
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为 (外键 + busy_timeout)
// - 幂等建库: 所有表使用 IF NOT EXISTS, 并记录 schema_version
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置, 保证任何等待都有上限
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 打开内存库并建表 (测试与预演使用)
pub fn open_in_memory_with_schema() -> rusqlite::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure_sqlite_connection(&conn)?;
    init_schema(&conn)?;
    Ok(conn)
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// forecast_demand 的 6 个月槽位列名
///
/// 顺序: m1_forecast, m1_fte_required, m1_fte_available, m1_capacity, m2_forecast, ...
pub fn forecast_slot_columns() -> Vec<String> {
    (1..=crate::domain::FORECAST_WINDOW_MONTHS)
        .flat_map(|i| {
            crate::domain::ForecastField::ALL
                .iter()
                .map(move |f| format!("m{}_{}", i, f.as_str()))
        })
        .collect()
}

/// 幂等建库
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    let slot_ddl = forecast_slot_columns()
        .iter()
        .map(|c| format!("{} INTEGER NOT NULL DEFAULT 0", c))
        .collect::<Vec<_>>()
        .join(",\n            ");

    conn.execute_batch(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS availability_policy (
            policy_key TEXT PRIMARY KEY,
            category TEXT NOT NULL,
            value_type TEXT NOT NULL,
            policy_value TEXT NOT NULL,
            description TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS month_configuration (
            year INTEGER NOT NULL,
            month INTEGER NOT NULL,
            worktype TEXT NOT NULL,
            working_days REAL NOT NULL,
            occupancy REAL NOT NULL,
            shrinkage REAL NOT NULL,
            work_hours REAL NOT NULL,
            PRIMARY KEY (year, month, worktype)
        );

        CREATE TABLE IF NOT EXISTS week_configuration (
            year INTEGER NOT NULL,
            week_number INTEGER NOT NULL,
            week_start TEXT NOT NULL,
            week_end TEXT NOT NULL,
            month INTEGER NOT NULL,
            month_year INTEGER NOT NULL,
            working_days REAL NOT NULL,
            work_hours REAL NOT NULL,
            shrinkage REAL NOT NULL,
            occupancy REAL,
            PRIMARY KEY (year, week_number)
        );

        CREATE TABLE IF NOT EXISTS resource (
            resource_id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            platform TEXT NOT NULL,
            location TEXT NOT NULL,
            states TEXT NOT NULL DEFAULT '',
            skills TEXT NOT NULL DEFAULT '',
            available_from TEXT,
            available_until TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            replaced_by TEXT REFERENCES resource(resource_id),
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS capacity_tier (
            tier_name TEXT PRIMARY KEY,
            percentage REAL NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS forecast_demand (
            forecast_id INTEGER PRIMARY KEY,
            platform TEXT NOT NULL,
            location TEXT NOT NULL,
            main_lob TEXT NOT NULL,
            state TEXT NOT NULL,
            case_type TEXT NOT NULL,
            worktype TEXT NOT NULL,
            target_cph REAL NOT NULL,
            start_year INTEGER NOT NULL,
            start_month INTEGER NOT NULL,
            {slot_ddl}
        );

        CREATE TABLE IF NOT EXISTS weekly_assignment (
            assignment_id TEXT PRIMARY KEY,
            resource_id TEXT NOT NULL REFERENCES resource(resource_id),
            resource_kind TEXT NOT NULL,
            forecast_id INTEGER NOT NULL REFERENCES forecast_demand(forecast_id),
            year INTEGER NOT NULL,
            week_number INTEGER NOT NULL,
            week_start TEXT NOT NULL,
            tier_name TEXT NOT NULL REFERENCES capacity_tier(tier_name),
            tier_percentage REAL NOT NULL,
            weekly_capacity REAL NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS ux_weekly_assignment_active
            ON weekly_assignment(resource_id, year, week_number)
            WHERE is_active = 1;

        CREATE INDEX IF NOT EXISTS ix_weekly_assignment_week_start
            ON weekly_assignment(week_start);

        CREATE TABLE IF NOT EXISTS monthly_capacity_summary (
            year INTEGER NOT NULL,
            month INTEGER NOT NULL,
            actual_fte INTEGER NOT NULL,
            placeholder_fte INTEGER NOT NULL,
            actual_capacity REAL NOT NULL,
            placeholder_capacity REAL NOT NULL,
            total_capacity REAL NOT NULL,
            forecast_demand REAL NOT NULL,
            capacity_gap REAL NOT NULL,
            tier_breakdown_json TEXT NOT NULL,
            generated_at TEXT NOT NULL,
            PRIMARY KEY (year, month)
        );

        CREATE TABLE IF NOT EXISTS ramp_record (
            ramp_id INTEGER PRIMARY KEY AUTOINCREMENT,
            forecast_id INTEGER NOT NULL REFERENCES forecast_demand(forecast_id),
            month_key TEXT NOT NULL,
            week_label TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            working_days INTEGER NOT NULL,
            ramp_percent REAL NOT NULL,
            employee_count INTEGER NOT NULL,
            notes TEXT,
            applied_at TEXT NOT NULL,
            applied_by TEXT NOT NULL,
            UNIQUE (forecast_id, month_key, ramp_percent, working_days)
        );

        CREATE TABLE IF NOT EXISTS history_log (
            history_log_id TEXT PRIMARY KEY,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            change_type TEXT NOT NULL,
            month_key TEXT,
            actor TEXT NOT NULL,
            notes TEXT,
            summary TEXT NOT NULL,
            change_record_json TEXT,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS ix_history_log_entity
            ON history_log(entity_type, entity_id, created_at);
        "#
    ))?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = open_in_memory_with_schema().unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn test_forecast_slot_columns_layout() {
        let cols = forecast_slot_columns();
        assert_eq!(cols.len(), 24);
        assert_eq!(cols[0], "m1_forecast");
        assert_eq!(cols[3], "m1_capacity");
        assert_eq!(cols[23], "m6_capacity");
    }

    #[test]
    fn test_read_schema_version_without_table() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), None);
    }
}
