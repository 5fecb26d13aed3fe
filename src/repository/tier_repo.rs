// ==========================================
// 劳动力产能规划系统 - 产能档位数据仓储
// ==========================================
// 红线: 已被分配引用的档位不可修改, 只能软停用
// ==========================================

use crate::domain::tier::{default_tiers, CapacityTier};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

// ==========================================
// TierRepository - 档位仓储
// ==========================================
pub struct TierRepository {
    conn: Arc<Mutex<Connection>>,
}

impl TierRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 写入默认档位 (已存在则跳过)
    pub fn seed_defaults(&self) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let mut inserted = 0;
        for tier in default_tiers() {
            inserted += conn.execute(
                "INSERT OR IGNORE INTO capacity_tier (tier_name, percentage, is_active) VALUES (?1, ?2, 1)",
                params![tier.tier_name, tier.percentage],
            )?;
        }
        Ok(inserted)
    }

    /// 新建档位
    ///
    /// # 返回
    /// - Err(UniqueConstraintViolation): 名称重复
    pub fn insert(&self, tier: &CapacityTier) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO capacity_tier (tier_name, percentage, is_active) VALUES (?1, ?2, ?3)",
            params![tier.tier_name, tier.percentage, tier.is_active],
        )?;
        Ok(())
    }

    pub fn find_by_name(&self, tier_name: &str) -> RepositoryResult<Option<CapacityTier>> {
        let conn = self.get_conn()?;
        Self::find_by_name_tx(&conn, tier_name)
    }

    pub fn list_active(&self) -> RepositoryResult<Vec<CapacityTier>> {
        let conn = self.get_conn()?;
        Self::list_active_tx(&conn)
    }

    /// 软停用档位
    pub fn deactivate(&self, tier_name: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            "UPDATE capacity_tier SET is_active = 0 WHERE tier_name = ?1",
            params![tier_name],
        )?;
        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "CapacityTier".to_string(),
                id: tier_name.to_string(),
            });
        }
        Ok(())
    }

    /// 修改档位百分比 (仅限未被引用的档位)
    pub fn update_percentage(&self, tier_name: &str, percentage: f64) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        if Self::find_by_name_tx(&tx, tier_name)?.is_none() {
            return Err(RepositoryError::NotFound {
                entity: "CapacityTier".to_string(),
                id: tier_name.to_string(),
            });
        }
        if Self::is_referenced_tx(&tx, tier_name)? {
            return Err(RepositoryError::BusinessRuleViolation(format!(
                "档位{}已被分配引用, 不可修改, 只能停用",
                tier_name
            )));
        }

        tx.execute(
            "UPDATE capacity_tier SET percentage = ?2 WHERE tier_name = ?1",
            params![tier_name, percentage],
        )?;
        tx.commit()?;
        Ok(())
    }

    // ==========================================
    // 事务内操作
    // ==========================================

    pub fn find_by_name_tx(conn: &Connection, tier_name: &str) -> RepositoryResult<Option<CapacityTier>> {
        let tier = conn
            .query_row(
                "SELECT tier_name, percentage, is_active FROM capacity_tier WHERE tier_name = ?1",
                params![tier_name],
                map_tier_row,
            )
            .optional()?;
        Ok(tier)
    }

    pub fn list_active_tx(conn: &Connection) -> RepositoryResult<Vec<CapacityTier>> {
        let mut stmt = conn.prepare(
            "SELECT tier_name, percentage, is_active FROM capacity_tier WHERE is_active = 1 ORDER BY percentage",
        )?;
        let tiers = stmt
            .query_map([], map_tier_row)?
            .collect::<rusqlite::Result<Vec<CapacityTier>>>()?;
        Ok(tiers)
    }

    /// 是否被任一分配引用 (含已停用分配)
    pub fn is_referenced_tx(conn: &Connection, tier_name: &str) -> RepositoryResult<bool> {
        let found = conn
            .query_row(
                "SELECT 1 FROM weekly_assignment WHERE tier_name = ?1 LIMIT 1",
                params![tier_name],
                |_row| Ok(true),
            )
            .optional()?;
        Ok(found.unwrap_or(false))
    }
}

fn map_tier_row(row: &Row) -> rusqlite::Result<CapacityTier> {
    Ok(CapacityTier {
        tier_name: row.get(0)?,
        percentage: row.get(1)?,
        is_active: row.get(2)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory_with_schema;

    fn setup() -> TierRepository {
        let repo = TierRepository::new(Arc::new(Mutex::new(open_in_memory_with_schema().unwrap())));
        repo.seed_defaults().unwrap();
        repo
    }

    #[test]
    fn test_seed_defaults_is_idempotent() {
        let repo = setup();
        assert_eq!(repo.seed_defaults().unwrap(), 0);
        let names: Vec<String> = repo.list_active().unwrap().into_iter().map(|t| t.tier_name).collect();
        assert_eq!(names, vec!["25%", "50%", "75%", "100%"]);
    }

    #[test]
    fn test_deactivated_tier_leaves_active_list() {
        let repo = setup();
        repo.deactivate("25%").unwrap();
        assert_eq!(repo.list_active().unwrap().len(), 3);
        assert!(!repo.find_by_name("25%").unwrap().unwrap().is_active);
        assert!(matches!(
            repo.deactivate("10%"),
            Err(RepositoryError::NotFound { .. })
        ));
    }

    #[test]
    fn test_unreferenced_tier_percentage_can_change() {
        let repo = setup();
        repo.update_percentage("75%", 70.0).unwrap();
        assert_eq!(repo.find_by_name("75%").unwrap().unwrap().percentage, 70.0);
    }
}
