// ==========================================
// 劳动力产能规划系统 - 变更差异记录器
// ==========================================
// 职责: 对比前后快照, 按受跟踪字段集合生成 ChangeRecord
// 红线: 只依赖字段集合, 不感知具体业务 (Ramp/分配)
// 口径: 一侧缺失的字段按 0 处理; 差值为 0 的字段不输出
// ==========================================

use crate::domain::history::{ChangeRecord, FieldChange, FieldSchema, FieldSnapshot};

pub struct HistoryDiffLogger;

impl HistoryDiffLogger {
    /// 生成变更记录 (按字段集合顺序输出)
    pub fn diff(before: &FieldSnapshot, after: &FieldSnapshot, schema: &FieldSchema) -> ChangeRecord {
        let mut record = ChangeRecord::default();

        for path in schema.paths() {
            let old_value = before.get(path).unwrap_or(0);
            let new_value = after.get(path).unwrap_or(0);
            let delta = new_value - old_value;
            if delta == 0 {
                continue;
            }

            let dotted = path.dotted();
            record.changes.push(FieldChange {
                path: dotted.clone(),
                group: path.group.clone(),
                field: path.field.clone(),
                old_value,
                new_value,
                delta,
            });
            record.modified_fields.push(dotted);
        }

        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::history::FieldPath;

    fn schema() -> FieldSchema {
        FieldSchema::new(vec![
            FieldPath::new("Apr-2025", "fte_available"),
            FieldPath::new("Apr-2025", "capacity"),
            FieldPath::new("May-2025", "capacity"),
        ])
    }

    fn snapshot(values: &[(&str, &str, i64)]) -> FieldSnapshot {
        let mut s = FieldSnapshot::default();
        for (g, f, v) in values {
            s.insert(FieldPath::new(g, f), *v);
        }
        s
    }

    #[test]
    fn test_no_op_diff_is_empty() {
        let s = snapshot(&[("Apr-2025", "capacity", 100), ("May-2025", "capacity", 7)]);
        let record = HistoryDiffLogger::diff(&s, &s, &schema());
        assert!(record.is_empty());
        assert!(record.modified_fields.is_empty());
    }

    #[test]
    fn test_only_changed_fields_reported_with_signed_delta() {
        let before = snapshot(&[
            ("Apr-2025", "fte_available", 10),
            ("Apr-2025", "capacity", 1000),
            ("May-2025", "capacity", 900),
        ]);
        let after = snapshot(&[
            ("Apr-2025", "fte_available", 19),
            ("Apr-2025", "capacity", 1000),
            ("May-2025", "capacity", 850),
        ]);
        let record = HistoryDiffLogger::diff(&before, &after, &schema());

        assert_eq!(record.len(), 2);
        assert_eq!(record.modified_fields, vec!["Apr-2025.fte_available", "May-2025.capacity"]);
        assert_eq!(record.changes[0].delta, 9);
        assert_eq!(record.changes[1].delta, -50);
        assert_eq!(record.changes[1].new_value, 850);
    }

    #[test]
    fn test_missing_side_counts_as_zero() {
        let before = FieldSnapshot::default();
        let after = snapshot(&[("Apr-2025", "capacity", 5)]);
        let record = HistoryDiffLogger::diff(&before, &after, &schema());
        assert_eq!(record.len(), 1);
        assert_eq!(record.changes[0].old_value, 0);
    }

    #[test]
    fn test_fields_outside_schema_ignored() {
        let before = snapshot(&[("Jun-2025", "capacity", 1)]);
        let after = snapshot(&[("Jun-2025", "capacity", 2)]);
        assert!(HistoryDiffLogger::diff(&before, &after, &schema()).is_empty());
    }
}
