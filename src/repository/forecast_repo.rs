// ==========================================
// 劳动力产能规划系统 - 需求预测数据仓储
// ==========================================
// 对齐: forecast_demand 表 (6 个月槽位列 m{1..6}_{field})
// ==========================================

use crate::db::forecast_slot_columns;
use crate::domain::forecast::{ForecastDemand, MonthSlot, FORECAST_WINDOW_MONTHS};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const BASE_COLUMNS: [&str; 10] = [
    "forecast_id",
    "platform",
    "location",
    "main_lob",
    "state",
    "case_type",
    "worktype",
    "target_cph",
    "start_year",
    "start_month",
];

fn select_sql() -> String {
    let mut columns: Vec<String> = BASE_COLUMNS.iter().map(|c| c.to_string()).collect();
    columns.extend(forecast_slot_columns());
    format!("SELECT {} FROM forecast_demand", columns.join(", "))
}

// ==========================================
// ForecastRepository - 需求仓储
// ==========================================
pub struct ForecastRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ForecastRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn insert(&self, demand: &ForecastDemand) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        Self::insert_tx(&conn, demand)
    }

    pub fn find_by_id(&self, forecast_id: i64) -> RepositoryResult<Option<ForecastDemand>> {
        let conn = self.get_conn()?;
        Self::find_by_id_tx(&conn, forecast_id)
    }

    pub fn list_all(&self) -> RepositoryResult<Vec<ForecastDemand>> {
        let conn = self.get_conn()?;
        Self::list_all_tx(&conn)
    }

    // ==========================================
    // 事务内操作
    // ==========================================

    pub fn insert_tx(conn: &Connection, demand: &ForecastDemand) -> RepositoryResult<()> {
        let mut columns: Vec<String> = BASE_COLUMNS.iter().map(|c| c.to_string()).collect();
        columns.extend(forecast_slot_columns());
        let placeholders = (1..=columns.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO forecast_demand ({}) VALUES ({})",
            columns.join(", "),
            placeholders
        );

        let mut values: Vec<rusqlite::types::Value> = vec![
            demand.forecast_id.into(),
            demand.platform.clone().into(),
            demand.location.clone().into(),
            demand.main_lob.clone().into(),
            demand.state.clone().into(),
            demand.case_type.clone().into(),
            demand.worktype.clone().into(),
            demand.target_cph.into(),
            (demand.start_year as i64).into(),
            (demand.start_month as i64).into(),
        ];
        for slot in demand.months.iter() {
            values.push(slot.forecast.into());
            values.push(slot.fte_required.into());
            values.push(slot.fte_available.into());
            values.push(slot.capacity.into());
        }

        conn.execute(&sql, params_from_iter(values))?;
        Ok(())
    }

    pub fn find_by_id_tx(conn: &Connection, forecast_id: i64) -> RepositoryResult<Option<ForecastDemand>> {
        let sql = format!("{} WHERE forecast_id = ?1", select_sql());
        let demand = conn
            .query_row(&sql, params![forecast_id], map_forecast_row)
            .optional()?;
        Ok(demand)
    }

    pub fn list_all_tx(conn: &Connection) -> RepositoryResult<Vec<ForecastDemand>> {
        let sql = format!("{} ORDER BY forecast_id", select_sql());
        let mut stmt = conn.prepare(&sql)?;
        let demands = stmt
            .query_map([], map_forecast_row)?
            .collect::<rusqlite::Result<Vec<ForecastDemand>>>()?;
        Ok(demands)
    }

    /// 写回单个槽位的可用 FTE 与产能 (Ramp 仅改这两列)
    pub fn update_slot_capacity_tx(
        conn: &Connection,
        forecast_id: i64,
        slot_index: usize,
        fte_available: i64,
        capacity: i64,
    ) -> RepositoryResult<()> {
        if slot_index >= FORECAST_WINDOW_MONTHS {
            return Err(RepositoryError::FieldValueError {
                field: "slot_index".to_string(),
                message: format!("槽位越界: {}", slot_index),
            });
        }
        let n = slot_index + 1;
        let sql = format!(
            "UPDATE forecast_demand SET m{n}_fte_available = ?2, m{n}_capacity = ?3 WHERE forecast_id = ?1"
        );
        let rows = conn.execute(&sql, params![forecast_id, fte_available, capacity])?;
        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "ForecastDemand".to_string(),
                id: forecast_id.to_string(),
            });
        }
        Ok(())
    }
}

fn map_forecast_row(row: &Row) -> rusqlite::Result<ForecastDemand> {
    let mut months = [MonthSlot::default(); FORECAST_WINDOW_MONTHS];
    let base = BASE_COLUMNS.len();
    for (i, slot) in months.iter_mut().enumerate() {
        let offset = base + i * 4;
        slot.forecast = row.get(offset)?;
        slot.fte_required = row.get(offset + 1)?;
        slot.fte_available = row.get(offset + 2)?;
        slot.capacity = row.get(offset + 3)?;
    }

    Ok(ForecastDemand {
        forecast_id: row.get(0)?,
        platform: row.get(1)?,
        location: row.get(2)?,
        main_lob: row.get(3)?,
        state: row.get(4)?,
        case_type: row.get(5)?,
        worktype: row.get(6)?,
        target_cph: row.get(7)?,
        start_year: row.get(8)?,
        start_month: row.get(9)?,
        months,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory_with_schema;

    fn sample() -> ForecastDemand {
        let mut months = [MonthSlot::default(); FORECAST_WINDOW_MONTHS];
        for (i, m) in months.iter_mut().enumerate() {
            m.forecast = 1000 + i as i64;
            m.fte_required = 10;
            m.fte_available = 8;
            m.capacity = 900;
        }
        ForecastDemand {
            forecast_id: 42,
            platform: "Amisys".to_string(),
            location: "Domestic".to_string(),
            main_lob: "Medicaid".to_string(),
            state: "TX".to_string(),
            case_type: "Claims".to_string(),
            worktype: "Domestic".to_string(),
            target_cph: 4.5,
            start_year: 2025,
            start_month: 4,
            months,
        }
    }

    #[test]
    fn test_insert_find_roundtrip() {
        let repo = ForecastRepository::new(Arc::new(Mutex::new(open_in_memory_with_schema().unwrap())));
        repo.insert(&sample()).unwrap();
        assert_eq!(repo.find_by_id(42).unwrap(), Some(sample()));
        assert_eq!(repo.find_by_id(43).unwrap(), None);
    }

    #[test]
    fn test_update_slot_touches_only_two_columns() {
        let repo = ForecastRepository::new(Arc::new(Mutex::new(open_in_memory_with_schema().unwrap())));
        repo.insert(&sample()).unwrap();
        {
            let conn = repo.get_conn().unwrap();
            ForecastRepository::update_slot_capacity_tx(&conn, 42, 2, 17, 1234).unwrap();
        }
        let after = repo.find_by_id(42).unwrap().unwrap();
        let mut expected = sample();
        expected.months[2].fte_available = 17;
        expected.months[2].capacity = 1234;
        assert_eq!(after, expected);
    }

    #[test]
    fn test_update_missing_row_is_not_found() {
        let repo = ForecastRepository::new(Arc::new(Mutex::new(open_in_memory_with_schema().unwrap())));
        let conn = repo.get_conn().unwrap();
        let err = ForecastRepository::update_slot_capacity_tx(&conn, 1, 0, 1, 1).unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }
}
