// ==========================================
// 劳动力产能规划系统 - 可用性/分配策略存储
// ==========================================
// 存储: availability_policy 表 (key + category + 类型化取值)
// 红线: 未知键返回 NotFound, 存储层不做默认值
// 红线: 已有键的取值类型不可修改
// 红线: 种子只在缺失时写入, 不覆盖人工调整
// ==========================================

use crate::config::policy_snapshot::PolicySnapshot;
use crate::domain::types::{PolicyCategory, PolicyValue};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

// ==========================================
// 策略键常量
// ==========================================
pub mod policy_keys {
    // 可用性窗口
    pub const ENFORCE_AVAILABLE_FROM: &str = "ENFORCE_AVAILABLE_FROM";
    pub const ENFORCE_AVAILABLE_UNTIL: &str = "ENFORCE_AVAILABLE_UNTIL";

    // 分配
    pub const AUTO_CREATE_PLACEHOLDERS: &str = "AUTO_CREATE_PLACEHOLDERS";
    pub const MAX_PLACEHOLDERS_PER_REQUEST: &str = "MAX_PLACEHOLDERS_PER_REQUEST";
    pub const PLACEHOLDER_ID_PREFIX: &str = "PLACEHOLDER_ID_PREFIX";
    pub const DEFAULT_TIER_NAME: &str = "DEFAULT_TIER_NAME";
    pub const CASCADE_DEACTIVATE_ASSIGNMENTS: &str = "CASCADE_DEACTIVATE_ASSIGNMENTS";

    // 报表
    pub const INCLUDE_PLACEHOLDERS_IN_CAPACITY: &str = "INCLUDE_PLACEHOLDERS_IN_CAPACITY";
}

// ==========================================
// PolicyError - 策略存储错误
// ==========================================
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("策略不存在: {0}")]
    NotFound(String),

    #[error("策略类型不匹配 (key={key}): 期望 {expected}, 实际 {actual}")]
    TypeMismatch {
        key: String,
        expected: String,
        actual: String,
    },

    #[error("策略取值无法解析 (key={key}): {raw}")]
    CorruptValue { key: String, raw: String },

    #[error("数据库锁获取失败: {0}")]
    LockError(String),

    #[error("策略存储访问失败: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type PolicyResult<T> = Result<T, PolicyError>;

// ==========================================
// PolicyEntry - 策略条目
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyEntry {
    pub policy_key: String,
    pub category: PolicyCategory,
    pub value: PolicyValue,
    pub description: Option<String>,
    pub is_active: bool,
}

impl PolicyEntry {
    fn seed(key: &str, category: PolicyCategory, value: PolicyValue, description: &str) -> Self {
        Self {
            policy_key: key.to_string(),
            category,
            value,
            description: Some(description.to_string()),
            is_active: true,
        }
    }
}

/// 种子策略
pub fn seed_policies() -> Vec<PolicyEntry> {
    use policy_keys::*;
    vec![
        PolicyEntry::seed(
            ENFORCE_AVAILABLE_FROM,
            PolicyCategory::Availability,
            PolicyValue::Bool(true),
            "到岗日之前的周不可分配",
        ),
        PolicyEntry::seed(
            ENFORCE_AVAILABLE_UNTIL,
            PolicyCategory::Availability,
            PolicyValue::Bool(true),
            "离岗日之后结束的周不可分配",
        ),
        PolicyEntry::seed(
            AUTO_CREATE_PLACEHOLDERS,
            PolicyCategory::Allocation,
            PolicyValue::Bool(true),
            "人员不足时自动创建占位资源",
        ),
        PolicyEntry::seed(
            MAX_PLACEHOLDERS_PER_REQUEST,
            PolicyCategory::Allocation,
            PolicyValue::Int(50),
            "单个需求单次运行最多创建的占位数",
        ),
        PolicyEntry::seed(
            PLACEHOLDER_ID_PREFIX,
            PolicyCategory::Allocation,
            PolicyValue::Text("PH-".to_string()),
            "占位资源ID前缀",
        ),
        PolicyEntry::seed(
            DEFAULT_TIER_NAME,
            PolicyCategory::Allocation,
            PolicyValue::Text("100%".to_string()),
            "未指定档位时使用的档位",
        ),
        PolicyEntry::seed(
            CASCADE_DEACTIVATE_ASSIGNMENTS,
            PolicyCategory::Allocation,
            PolicyValue::Bool(true),
            "停用资源时同步停用其有效分配",
        ),
        PolicyEntry::seed(
            INCLUDE_PLACEHOLDERS_IN_CAPACITY,
            PolicyCategory::Reporting,
            PolicyValue::Bool(true),
            "月度汇总总产能是否包含占位产能",
        ),
    ]
}

// ==========================================
// PolicyStore - 策略存储
// ==========================================
pub struct PolicyStore {
    conn: Arc<Mutex<Connection>>,
}

impl PolicyStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> PolicyResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| PolicyError::LockError(e.to_string()))
    }

    /// 写入种子策略 (已存在的键保持不变)
    ///
    /// # 返回
    /// - 实际新写入的条目数
    pub fn seed_defaults(&self) -> PolicyResult<usize> {
        let conn = self.get_conn()?;
        let mut inserted = 0;
        for entry in seed_policies() {
            inserted += conn.execute(
                r#"
                INSERT OR IGNORE INTO availability_policy (
                    policy_key, category, value_type, policy_value, description, is_active
                ) VALUES (?1, ?2, ?3, ?4, ?5, 1)
                "#,
                params![
                    entry.policy_key,
                    entry.category.as_str(),
                    entry.value.type_tag(),
                    entry.value.to_raw(),
                    entry.description,
                ],
            )?;
        }
        if inserted > 0 {
            tracing::info!(inserted, "写入种子策略");
        }
        Ok(inserted)
    }

    /// 读取单个策略条目
    ///
    /// # 返回
    /// - Err(NotFound): 键不存在或已停用
    pub fn get_entry(&self, key: &str) -> PolicyResult<PolicyEntry> {
        let conn = self.get_conn()?;
        Self::load_entry(&conn, key)?
            .filter(|entry| entry.is_active)
            .ok_or_else(|| PolicyError::NotFound(key.to_string()))
    }

    pub fn get(&self, key: &str) -> PolicyResult<PolicyValue> {
        Ok(self.get_entry(key)?.value)
    }

    pub fn get_bool(&self, key: &str) -> PolicyResult<bool> {
        match self.get(key)? {
            PolicyValue::Bool(v) => Ok(v),
            other => Err(type_mismatch(key, "BOOL", &other)),
        }
    }

    pub fn get_int(&self, key: &str) -> PolicyResult<i64> {
        match self.get(key)? {
            PolicyValue::Int(v) => Ok(v),
            other => Err(type_mismatch(key, "INT", &other)),
        }
    }

    pub fn get_text(&self, key: &str) -> PolicyResult<String> {
        match self.get(key)? {
            PolicyValue::Text(v) => Ok(v),
            other => Err(type_mismatch(key, "TEXT", &other)),
        }
    }

    /// 更新策略取值 (单键原子更新)
    ///
    /// # 返回
    /// - Err(NotFound): 键不存在
    /// - Err(TypeMismatch): 新值类型与已有类型不一致
    pub fn set(&self, key: &str, value: PolicyValue) -> PolicyResult<()> {
        let conn = self.get_conn()?;
        let current = Self::load_entry(&conn, key)?.ok_or_else(|| PolicyError::NotFound(key.to_string()))?;
        if current.value.type_tag() != value.type_tag() {
            return Err(type_mismatch(key, current.value.type_tag(), &value));
        }

        conn.execute(
            r#"
            UPDATE availability_policy
            SET policy_value = ?2, updated_at = datetime('now')
            WHERE policy_key = ?1 AND value_type = ?3
            "#,
            params![key, value.to_raw(), value.type_tag()],
        )?;
        tracing::info!(policy_key = key, value = %value, "策略已更新");
        Ok(())
    }

    /// 启用/停用策略 (停用后读取视为不存在)
    pub fn set_active(&self, key: &str, is_active: bool) -> PolicyResult<()> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            "UPDATE availability_policy SET is_active = ?2, updated_at = datetime('now') WHERE policy_key = ?1",
            params![key, is_active],
        )?;
        if rows == 0 {
            return Err(PolicyError::NotFound(key.to_string()));
        }
        Ok(())
    }

    /// 按分类列出有效策略
    pub fn list_by_category(&self, category: PolicyCategory) -> PolicyResult<Vec<PolicyEntry>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT policy_key, category, value_type, policy_value, description, is_active
            FROM availability_policy
            WHERE category = ?1 AND is_active = 1
            ORDER BY policy_key
            "#,
        )?;
        let raw_rows = stmt
            .query_map(params![category.as_str()], map_raw_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        raw_rows.into_iter().map(RawPolicyRow::into_entry).collect()
    }

    /// 读取全部有效策略形成快照 (每个操作只读一次)
    pub fn snapshot(&self) -> PolicyResult<PolicySnapshot> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT policy_key, category, value_type, policy_value, description, is_active
            FROM availability_policy
            WHERE is_active = 1
            "#,
        )?;
        let raw_rows = stmt
            .query_map([], map_raw_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut values = HashMap::with_capacity(raw_rows.len());
        for raw in raw_rows {
            let entry = raw.into_entry()?;
            values.insert(entry.policy_key, entry.value);
        }
        Ok(PolicySnapshot::new(values))
    }

    fn load_entry(conn: &Connection, key: &str) -> PolicyResult<Option<PolicyEntry>> {
        let raw = conn
            .query_row(
                r#"
                SELECT policy_key, category, value_type, policy_value, description, is_active
                FROM availability_policy
                WHERE policy_key = ?1
                "#,
                params![key],
                map_raw_row,
            )
            .optional()?;
        raw.map(RawPolicyRow::into_entry).transpose()
    }
}

fn type_mismatch(key: &str, expected: &str, actual: &PolicyValue) -> PolicyError {
    PolicyError::TypeMismatch {
        key: key.to_string(),
        expected: expected.to_string(),
        actual: actual.type_tag().to_string(),
    }
}

struct RawPolicyRow {
    policy_key: String,
    category: String,
    value_type: String,
    policy_value: String,
    description: Option<String>,
    is_active: bool,
}

impl RawPolicyRow {
    fn into_entry(self) -> PolicyResult<PolicyEntry> {
        let value = PolicyValue::from_raw(&self.value_type, &self.policy_value).ok_or_else(|| {
            PolicyError::CorruptValue {
                key: self.policy_key.clone(),
                raw: format!("{}:{}", self.value_type, self.policy_value),
            }
        })?;
        let category = PolicyCategory::parse(&self.category).ok_or_else(|| PolicyError::CorruptValue {
            key: self.policy_key.clone(),
            raw: self.category.clone(),
        })?;
        Ok(PolicyEntry {
            policy_key: self.policy_key,
            category,
            value,
            description: self.description,
            is_active: self.is_active,
        })
    }
}

fn map_raw_row(row: &rusqlite::Row) -> rusqlite::Result<RawPolicyRow> {
    Ok(RawPolicyRow {
        policy_key: row.get(0)?,
        category: row.get(1)?,
        value_type: row.get(2)?,
        policy_value: row.get(3)?,
        description: row.get(4)?,
        is_active: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory_with_schema;

    fn setup() -> PolicyStore {
        let store = PolicyStore::new(Arc::new(Mutex::new(open_in_memory_with_schema().unwrap())));
        store.seed_defaults().unwrap();
        store
    }

    #[test]
    fn test_seed_values_readable() {
        let store = setup();
        assert!(store.get_bool(policy_keys::ENFORCE_AVAILABLE_FROM).unwrap());
        assert_eq!(store.get_int(policy_keys::MAX_PLACEHOLDERS_PER_REQUEST).unwrap(), 50);
        assert_eq!(store.get_text(policy_keys::PLACEHOLDER_ID_PREFIX).unwrap(), "PH-");
        assert_eq!(store.get_text(policy_keys::DEFAULT_TIER_NAME).unwrap(), "100%");
    }

    #[test]
    fn test_unknown_key_is_not_found() {
        let store = setup();
        assert!(matches!(store.get("NOPE"), Err(PolicyError::NotFound(_))));
        assert!(matches!(
            store.set("NOPE", PolicyValue::Bool(true)),
            Err(PolicyError::NotFound(_))
        ));
    }

    #[test]
    fn test_reseed_does_not_overwrite_operator_edit() {
        let store = setup();
        store.set(policy_keys::AUTO_CREATE_PLACEHOLDERS, PolicyValue::Bool(false)).unwrap();
        assert_eq!(store.seed_defaults().unwrap(), 0);
        assert!(!store.get_bool(policy_keys::AUTO_CREATE_PLACEHOLDERS).unwrap());
    }

    #[test]
    fn test_type_cannot_change() {
        let store = setup();
        let err = store
            .set(policy_keys::MAX_PLACEHOLDERS_PER_REQUEST, PolicyValue::Text("50".to_string()))
            .unwrap_err();
        assert!(matches!(err, PolicyError::TypeMismatch { .. }));
        assert!(matches!(
            store.get_bool(policy_keys::PLACEHOLDER_ID_PREFIX),
            Err(PolicyError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_inactive_policy_behaves_as_missing() {
        let store = setup();
        store.set_active(policy_keys::ENFORCE_AVAILABLE_UNTIL, false).unwrap();
        assert!(matches!(
            store.get(policy_keys::ENFORCE_AVAILABLE_UNTIL),
            Err(PolicyError::NotFound(_))
        ));
        assert_eq!(store.snapshot().unwrap().bool(policy_keys::ENFORCE_AVAILABLE_UNTIL), None);
    }

    #[test]
    fn test_list_by_category() {
        let store = setup();
        let reporting = store.list_by_category(PolicyCategory::Reporting).unwrap();
        assert_eq!(reporting.len(), 1);
        assert_eq!(reporting[0].policy_key, policy_keys::INCLUDE_PLACEHOLDERS_IN_CAPACITY);
        assert_eq!(store.list_by_category(PolicyCategory::Availability).unwrap().len(), 2);
        assert_eq!(store.snapshot().unwrap().len(), 8);
    }
}
