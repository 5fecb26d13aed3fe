// ==========================================
// 劳动力产能规划系统 - 资源数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 说明: `*_tx` 关联函数运行在调用方事务内, 用于原子操作单元
// ==========================================

use crate::domain::resource::{join_values, parse_placeholder_seq, split_values, Resource};
use crate::domain::types::ResourceKind;
use crate::repository::error::{parse_date_column, RepositoryError, RepositoryResult, DATE_FMT};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const RESOURCE_COLUMNS: &str = r#"
    resource_id, kind, platform, location, states, skills,
    available_from, available_until, is_active, replaced_by
"#;

// ==========================================
// ResourceRepository - 资源仓储
// ==========================================
pub struct ResourceRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ResourceRepository {
    /// 从已有连接创建仓储实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 便捷读写 (自行加锁)
    // ==========================================

    pub fn insert(&self, resource: &Resource) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        Self::insert_tx(&conn, resource)
    }

    pub fn find_by_id(&self, resource_id: &str) -> RepositoryResult<Option<Resource>> {
        let conn = self.get_conn()?;
        Self::find_by_id_tx(&conn, resource_id)
    }

    pub fn list_active(&self) -> RepositoryResult<Vec<Resource>> {
        let conn = self.get_conn()?;
        Self::list_active_tx(&conn)
    }

    // ==========================================
    // 事务内操作
    // ==========================================

    /// 插入资源
    ///
    /// # 返回
    /// - Err(UniqueConstraintViolation): 资源ID已存在 (含已停用资源, ID 不得复用)
    pub fn insert_tx(conn: &Connection, resource: &Resource) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO resource (
                resource_id, kind, platform, location, states, skills,
                available_from, available_until, is_active, replaced_by
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                resource.resource_id,
                resource.kind.as_str(),
                resource.platform,
                resource.location,
                join_values(&resource.states),
                join_values(&resource.skills),
                resource.available_from.map(|d| d.format(DATE_FMT).to_string()),
                resource.available_until.map(|d| d.format(DATE_FMT).to_string()),
                resource.is_active,
                resource.replaced_by,
            ],
        )?;
        Ok(())
    }

    pub fn find_by_id_tx(conn: &Connection, resource_id: &str) -> RepositoryResult<Option<Resource>> {
        let sql = format!("SELECT {} FROM resource WHERE resource_id = ?1", RESOURCE_COLUMNS);
        let resource = conn
            .query_row(&sql, params![resource_id], map_resource_row)
            .optional()?;
        Ok(resource)
    }

    pub fn exists_tx(conn: &Connection, resource_id: &str) -> RepositoryResult<bool> {
        let found = conn
            .query_row(
                "SELECT 1 FROM resource WHERE resource_id = ?1",
                params![resource_id],
                |_row| Ok(true),
            )
            .optional()?;
        Ok(found.unwrap_or(false))
    }

    /// 查询全部在用资源 (按ID排序, 保证分配结果可复现)
    pub fn list_active_tx(conn: &Connection) -> RepositoryResult<Vec<Resource>> {
        let sql = format!(
            "SELECT {} FROM resource WHERE is_active = 1 ORDER BY resource_id",
            RESOURCE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let resources = stmt
            .query_map([], map_resource_row)?
            .collect::<rusqlite::Result<Vec<Resource>>>()?;
        Ok(resources)
    }

    /// 下一个占位序号
    ///
    /// 扫描所有带前缀的资源ID (不区分 kind, 含已停用),
    /// 在职员工若恰好持有占位格式的ID也会被跳过, 保证新ID不与任何既有ID冲突
    pub fn next_placeholder_seq_tx(conn: &Connection, prefix: &str) -> RepositoryResult<u32> {
        let mut stmt = conn.prepare(
            "SELECT resource_id FROM resource WHERE substr(resource_id, 1, length(?1)) = ?1",
        )?;
        let ids = stmt
            .query_map(params![prefix], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        let max_seq = ids
            .iter()
            .filter_map(|id| parse_placeholder_seq(prefix, id))
            .max()
            .unwrap_or(0);
        Ok(max_seq + 1)
    }

    /// 停用资源
    ///
    /// # 返回
    /// - Ok(rows): 被更新的行数 (0 表示不存在或已停用)
    pub fn deactivate_tx(conn: &Connection, resource_id: &str) -> RepositoryResult<usize> {
        let rows = conn.execute(
            "UPDATE resource SET is_active = 0 WHERE resource_id = ?1 AND is_active = 1",
            params![resource_id],
        )?;
        Ok(rows)
    }

    /// 占位转正: 记录 replaced_by 并停用
    pub fn mark_replaced_tx(
        conn: &Connection,
        placeholder_id: &str,
        replaced_by: &str,
    ) -> RepositoryResult<usize> {
        let rows = conn.execute(
            r#"
            UPDATE resource
            SET replaced_by = ?2, is_active = 0
            WHERE resource_id = ?1 AND kind = ?3 AND is_active = 1
            "#,
            params![placeholder_id, replaced_by, ResourceKind::Placeholder.as_str()],
        )?;
        Ok(rows)
    }
}

fn map_resource_row(row: &Row) -> rusqlite::Result<Resource> {
    let kind_raw: String = row.get(1)?;
    let kind = ResourceKind::parse(&kind_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            format!("未知资源类型: {}", kind_raw).into(),
        )
    })?;

    let available_from = row
        .get::<_, Option<String>>(6)?
        .map(|s| parse_date_column(6, &s))
        .transpose()?;
    let available_until = row
        .get::<_, Option<String>>(7)?
        .map(|s| parse_date_column(7, &s))
        .transpose()?;

    Ok(Resource {
        resource_id: row.get(0)?,
        kind,
        platform: row.get(2)?,
        location: row.get(3)?,
        states: split_values(&row.get::<_, String>(4)?),
        skills: split_values(&row.get::<_, String>(5)?),
        available_from,
        available_until,
        is_active: row.get(8)?,
        replaced_by: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory_with_schema;
    use chrono::NaiveDate;

    fn setup() -> ResourceRepository {
        ResourceRepository::new(Arc::new(Mutex::new(open_in_memory_with_schema().unwrap())))
    }

    #[test]
    fn test_insert_and_find_roundtrip_keeps_window() {
        let repo = setup();
        let resource = Resource::actual(
            "EMP-001",
            "Amisys",
            "Domestic",
            vec!["TX".to_string(), "CA".to_string()],
            vec!["Claims".to_string()],
        )
        .with_window(NaiveDate::from_ymd_opt(2025, 4, 14), None);
        repo.insert(&resource).unwrap();

        let found = repo.find_by_id("EMP-001").unwrap().unwrap();
        assert_eq!(found, resource);
    }

    #[test]
    fn test_identifier_is_never_reused() {
        let repo = setup();
        let resource = Resource::actual("EMP-001", "Amisys", "Domestic", vec![], vec![]);
        repo.insert(&resource).unwrap();
        {
            let conn = repo.get_conn().unwrap();
            ResourceRepository::deactivate_tx(&conn, "EMP-001").unwrap();
        }
        let err = repo.insert(&resource).unwrap_err();
        assert!(matches!(err, RepositoryError::UniqueConstraintViolation(_)));
    }

    #[test]
    fn test_next_placeholder_seq_counts_inactive_placeholders() {
        let repo = setup();
        let conn = repo.get_conn().unwrap();
        assert_eq!(ResourceRepository::next_placeholder_seq_tx(&conn, "PH-").unwrap(), 1);

        let ph = Resource::placeholder("PH-000007".to_string(), "Amisys", "Domestic", "TX", "Claims");
        ResourceRepository::insert_tx(&conn, &ph).unwrap();
        ResourceRepository::deactivate_tx(&conn, "PH-000007").unwrap();

        assert_eq!(ResourceRepository::next_placeholder_seq_tx(&conn, "PH-").unwrap(), 8);
        assert!(ResourceRepository::list_active_tx(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_next_placeholder_seq_skips_actual_ids_with_prefix() {
        let repo = setup();
        let conn = repo.get_conn().unwrap();

        // 在职员工持有占位格式ID
        let actual = Resource::actual("PH-000003", "Amisys", "Domestic", vec![], vec![]);
        ResourceRepository::insert_tx(&conn, &actual).unwrap();
        // 前缀不同或后缀非数字的ID不参与
        let other = Resource::actual("PHX-000900", "Amisys", "Domestic", vec![], vec![]);
        ResourceRepository::insert_tx(&conn, &other).unwrap();
        let named = Resource::actual("PH-lead", "Amisys", "Domestic", vec![], vec![]);
        ResourceRepository::insert_tx(&conn, &named).unwrap();

        assert_eq!(ResourceRepository::next_placeholder_seq_tx(&conn, "PH-").unwrap(), 4);
    }
}
