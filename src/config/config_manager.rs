// ==========================================
// 劳动力产能规划系统 - 配置管理器
// ==========================================
// 职责: 月度产能配置的加载、查询、写入
// 存储: month_configuration 表 (year, month, worktype)
// ==========================================

use crate::config::capacity_config_trait::{CapacityConfigReader, ConfigReadError};
use crate::db::open_sqlite_connection;
use crate::domain::calendar::MonthConfiguration;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::error::Error;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 读取月度配置 (同步)
    pub fn find_month_config(
        &self,
        year: i32,
        month: u32,
        worktype: &str,
    ) -> Result<Option<MonthConfiguration>, ConfigReadError> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let config = conn
            .query_row(
                r#"
                SELECT year, month, worktype, working_days, occupancy, shrinkage, work_hours
                FROM month_configuration
                WHERE year = ?1 AND month = ?2 AND worktype = ?3
                "#,
                params![year, month, worktype],
                |row| {
                    Ok(MonthConfiguration {
                        year: row.get(0)?,
                        month: row.get(1)?,
                        worktype: row.get(2)?,
                        working_days: row.get(3)?,
                        occupancy: row.get(4)?,
                        shrinkage: row.get(5)?,
                        work_hours: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(config)
    }

    /// 写入月度配置 (同键覆盖)
    ///
    /// # 返回
    /// - Err: 参数越界 (shrinkage/occupancy 须在 [0,1], 其余非负)
    pub fn upsert_month_config(&self, config: &MonthConfiguration) -> Result<(), ConfigReadError> {
        if !(0.0..=1.0).contains(&config.shrinkage) || !(0.0..=1.0).contains(&config.occupancy) {
            return Err(format!(
                "月度配置越界: shrinkage={}, occupancy={}",
                config.shrinkage, config.occupancy
            )
            .into());
        }
        if config.working_days < 0.0 || config.work_hours < 0.0 {
            return Err(format!(
                "月度配置越界: working_days={}, work_hours={}",
                config.working_days, config.work_hours
            )
            .into());
        }

        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            r#"
            INSERT INTO month_configuration (year, month, worktype, working_days, occupancy, shrinkage, work_hours)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(year, month, worktype) DO UPDATE SET
                working_days = excluded.working_days,
                occupancy = excluded.occupancy,
                shrinkage = excluded.shrinkage,
                work_hours = excluded.work_hours
            "#,
            params![
                config.year,
                config.month,
                config.worktype,
                config.working_days,
                config.occupancy,
                config.shrinkage,
                config.work_hours,
            ],
        )?;
        tracing::info!(
            year = config.year,
            month = config.month,
            worktype = %config.worktype,
            "月度配置已写入"
        );
        Ok(())
    }
}

// ==========================================
// CapacityConfigReader Trait 实现
// ==========================================
#[async_trait]
impl CapacityConfigReader for ConfigManager {
    async fn get_month_config(
        &self,
        year: i32,
        month: u32,
        worktype: &str,
    ) -> Result<Option<MonthConfiguration>, ConfigReadError> {
        self.find_month_config(year, month, worktype)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory_with_schema;

    fn manager() -> ConfigManager {
        ConfigManager::from_connection(Arc::new(Mutex::new(open_in_memory_with_schema().unwrap()))).unwrap()
    }

    fn april(working_days: f64) -> MonthConfiguration {
        MonthConfiguration {
            year: 2025,
            month: 4,
            worktype: "Domestic".to_string(),
            working_days,
            occupancy: 0.95,
            shrinkage: 0.10,
            work_hours: 9.0,
        }
    }

    #[tokio::test]
    async fn test_missing_config_reads_none() {
        let m = manager();
        assert_eq!(m.get_month_config(2025, 4, "Domestic").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_upsert_overwrites_same_key() {
        let m = manager();
        m.upsert_month_config(&april(21.0)).unwrap();
        m.upsert_month_config(&april(20.0)).unwrap();
        let found = m.get_month_config(2025, 4, "Domestic").await.unwrap().unwrap();
        assert_eq!(found, april(20.0));
        assert_eq!(m.get_month_config(2025, 4, "Global").await.unwrap(), None);
    }

    #[test]
    fn test_out_of_range_config_rejected() {
        let m = manager();
        let mut bad = april(21.0);
        bad.shrinkage = 1.5;
        assert!(m.upsert_month_config(&bad).is_err());
    }
}
