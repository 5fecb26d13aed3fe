// ==========================================
// 分配 API 集成测试
// ==========================================
// 覆盖: 分配运行 (含 dry run)、占位上限、可用性策略、
//       直接分配冲突、占位转正、资源停用级联
// ==========================================


#[cfg(test)]
mod allocation_api_test {
    use crate::test_helpers::*;
    use workforce_capacity::api::{AllocationRequest, DirectAssignRequest};
    use workforce_capacity::app::AppState;
    use workforce_capacity::config::policy_keys;
    use workforce_capacity::engine::{AllocationDiagnostic, InvalidationScope};
    use workforce_capacity::{ApiError, ErrorKind, MonthKey, PolicyValue, ResourceKind};

    fn april_request(dry_run: bool) -> AllocationRequest {
        AllocationRequest {
            months: vec!["2025-04".to_string()],
            dry_run,
            ..Default::default()
        }
    }

    /// 需求 3 人/周, 两名匹配在职员工
    async fn standard_setup() -> (tempfile::NamedTempFile, AppState) {
        let (tmp, state) = create_test_state();
        seed_april(&state, &[demand_with_april(1, 2000, 3, 0, 0)]).await;
        state.allocation_api.register_resource(&matching_actual("EMP-001")).unwrap();
        state.allocation_api.register_resource(&matching_actual("EMP-002")).unwrap();
        (tmp, state)
    }

    fn set_policy(state: &AppState, key: &str, value: PolicyValue) {
        state.capacity_api.update_policy(key, value).unwrap();
    }

    // ==========================================
    // 分配运行
    // ==========================================

    #[tokio::test]
    async fn test_run_prefers_actuals_and_reuses_placeholder() {
        let (_tmp, state, recorder) = create_test_state_with_recorder();
        seed_april(&state, &[demand_with_april(1, 2000, 3, 0, 0)]).await;
        state.allocation_api.register_resource(&matching_actual("EMP-001")).unwrap();
        state.allocation_api.register_resource(&matching_actual("EMP-002")).unwrap();
        // 州不匹配
        let mut outsider = matching_actual("EMP-900");
        outsider.states = vec!["CA".to_string()];
        state.allocation_api.register_resource(&outsider).unwrap();

        let result = state.allocation_api.run_allocation(&april_request(false)).unwrap();

        assert!(!result.dry_run);
        assert_eq!(result.counts.actual, 8);
        assert_eq!(result.counts.placeholder, 4);
        assert_eq!(result.new_placeholders, vec!["PH-000001".to_string()]);
        assert!(result.diagnostics.is_empty());
        assert!(result.history_log_id.is_some());
        assert!(result.assignments.iter().all(|a| a.resource_id != "EMP-900"));
        assert!(result
            .assignments
            .iter()
            .all(|a| approx(a.weekly_capacity, april_weekly_capacity())));

        assert_eq!(state.allocation_api.list_assignments("EMP-001").unwrap().len(), 4);
        assert_eq!(state.allocation_api.list_assignments("PH-000001").unwrap().len(), 4);
        let placeholder = state.resource_repo.find_by_id("PH-000001").unwrap().unwrap();
        assert_eq!(placeholder.kind, ResourceKind::Placeholder);
        assert_eq!(placeholder.states, vec!["TX".to_string()]);

        assert!(recorder.scopes().contains(&InvalidationScope::AllocationMonths {
            months: vec![MonthKey::new(2025, 4).unwrap()],
        }));

        // 已满足的需求不再重复分配
        let again = state.allocation_api.run_allocation(&april_request(false)).unwrap();
        assert_eq!(again.counts.total(), 0);
        assert!(again.new_placeholders.is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_persists_nothing() {
        let (_tmp, state) = standard_setup().await;

        let result = state.allocation_api.run_allocation(&april_request(true)).unwrap();
        assert!(result.dry_run);
        assert_eq!(result.counts.actual, 8);
        assert_eq!(result.counts.placeholder, 4);
        assert!(result.history_log_id.is_none());

        assert!(state.allocation_api.list_assignments("EMP-001").unwrap().is_empty());
        assert!(state.resource_repo.find_by_id("PH-000001").unwrap().is_none());

        // dry run 未占用序号
        let real = state.allocation_api.run_allocation(&april_request(false)).unwrap();
        assert_eq!(real.new_placeholders, vec!["PH-000001".to_string()]);
    }

    #[tokio::test]
    async fn test_new_placeholder_skips_actual_holding_placeholder_id() {
        let (_tmp, state) = create_test_state();
        seed_april(&state, &[demand_with_april(1, 2000, 3, 0, 0)]).await;
        state.allocation_api.register_resource(&matching_actual("EMP-001")).unwrap();
        // 在职员工的ID恰好是占位格式
        state.allocation_api.register_resource(&matching_actual("PH-000001")).unwrap();

        let result = state.allocation_api.run_allocation(&april_request(false)).unwrap();
        assert_eq!(result.counts.actual, 8);
        assert_eq!(result.counts.placeholder, 4);
        assert_eq!(result.new_placeholders, vec!["PH-000002".to_string()]);
        assert!(result.diagnostics.is_empty());

        let holder = state.resource_repo.find_by_id("PH-000001").unwrap().unwrap();
        assert_eq!(holder.kind, ResourceKind::Actual);
        assert_eq!(state.allocation_api.list_assignments("PH-000001").unwrap().len(), 4);
        assert_eq!(state.allocation_api.list_assignments("PH-000002").unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_placeholder_cap_stops_demand() {
        let (_tmp, state) = create_test_state();
        seed_april(&state, &[demand_with_april(1, 2000, 3, 0, 0)]).await;
        set_policy(&state, policy_keys::MAX_PLACEHOLDERS_PER_REQUEST, PolicyValue::Int(2));

        let result = state.allocation_api.run_allocation(&april_request(false)).unwrap();

        assert_eq!(result.counts.placeholder, 2);
        assert_eq!(result.new_placeholders.len(), 2);
        assert_eq!(result.diagnostics.len(), 1);
        match &result.diagnostics[0] {
            AllocationDiagnostic::PlaceholderCapExceeded {
                forecast_id,
                cap,
                week_number,
                unfilled,
                ..
            } => {
                assert_eq!(*forecast_id, 1);
                assert_eq!(*cap, 2);
                assert_eq!(*week_number, 15);
                assert_eq!(*unfilled, 1);
            }
            other => panic!("Expected PlaceholderCapExceeded, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_shortfall_reported_when_auto_create_disabled() {
        let (_tmp, state) = create_test_state();
        seed_april(&state, &[demand_with_april(1, 2000, 1, 0, 0)]).await;
        set_policy(&state, policy_keys::AUTO_CREATE_PLACEHOLDERS, PolicyValue::Bool(false));

        let result = state.allocation_api.run_allocation(&april_request(false)).unwrap();
        assert_eq!(result.counts.total(), 0);
        assert_eq!(result.diagnostics.len(), 4);
        assert!(result
            .diagnostics
            .iter()
            .all(|d| matches!(d, AllocationDiagnostic::Shortfall { required: 1, filled: 0, .. })));
    }

    #[tokio::test]
    async fn test_available_from_policy_toggle() {
        let (_tmp, state) = create_test_state();
        seed_april(&state, &[demand_with_april(1, 2000, 1, 0, 0)]).await;
        set_policy(&state, policy_keys::AUTO_CREATE_PLACEHOLDERS, PolicyValue::Bool(false));
        let late_joiner = matching_actual("EMP-003").with_window(Some(date(2025, 4, 14)), None);
        state.allocation_api.register_resource(&late_joiner).unwrap();

        let dry = state.allocation_api.run_allocation(&april_request(true)).unwrap();
        assert_eq!(dry.counts.actual, 3);
        assert!(dry.assignments.iter().all(|a| a.week_number >= 16));
        assert_eq!(dry.diagnostics.len(), 1);

        set_policy(&state, policy_keys::ENFORCE_AVAILABLE_FROM, PolicyValue::Bool(false));
        let relaxed = state.allocation_api.run_allocation(&april_request(true)).unwrap();
        assert_eq!(relaxed.counts.actual, 4);
        assert!(relaxed.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_tier_override_applied() {
        let (_tmp, state) = standard_setup().await;
        let mut request = april_request(true);
        request
            .tier_overrides
            .insert("EMP-001".to_string(), "50%".to_string());

        let result = state.allocation_api.run_allocation(&request).unwrap();
        let half: Vec<_> = result
            .assignments
            .iter()
            .filter(|a| a.resource_id == "EMP-001")
            .collect();
        assert_eq!(half.len(), 4);
        assert!(half
            .iter()
            .all(|a| a.tier_name == "50%" && approx(a.weekly_capacity, april_weekly_capacity() * 0.5)));
    }

    #[tokio::test]
    async fn test_run_rejects_bad_months() {
        let (_tmp, state) = create_test_state();

        let err = state
            .allocation_api
            .run_allocation(&AllocationRequest::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);

        let request = AllocationRequest {
            months: vec!["2025/04".to_string()],
            ..Default::default()
        };
        let err = state.allocation_api.run_allocation(&request).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unprocessable);
    }

    // ==========================================
    // 直接分配
    // ==========================================

    #[tokio::test]
    async fn test_direct_assign_conflict_and_availability() {
        let (_tmp, state) = standard_setup().await;
        state.allocation_api.run_allocation(&april_request(false)).unwrap();

        let conflict = DirectAssignRequest {
            resource_id: "EMP-001".to_string(),
            forecast_id: 1,
            year: 2025,
            week_number: 15,
            tier_name: None,
        };
        let err = state.allocation_api.assign_direct(&conflict).unwrap_err();
        assert!(matches!(err, ApiError::AssignmentConflict { week_number: 15, .. }));
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let late_joiner = matching_actual("EMP-003").with_window(Some(date(2025, 4, 14)), None);
        state.allocation_api.register_resource(&late_joiner).unwrap();
        let too_early = DirectAssignRequest {
            resource_id: "EMP-003".to_string(),
            ..conflict.clone()
        };
        let err = state.allocation_api.assign_direct(&too_early).unwrap_err();
        assert!(matches!(err, ApiError::BusinessRuleViolation(_)));

        let ok = DirectAssignRequest {
            resource_id: "EMP-003".to_string(),
            week_number: 16,
            tier_name: Some("50%".to_string()),
            ..conflict
        };
        let assignment = state.allocation_api.assign_direct(&ok).unwrap();
        assert_eq!(assignment.tier_percentage, 50.0);
        assert!(approx(assignment.weekly_capacity, april_weekly_capacity() * 0.5));
        assert_eq!(state.allocation_api.list_assignments("EMP-003").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_direct_assign_unknown_references() {
        let (_tmp, state) = standard_setup().await;
        let request = DirectAssignRequest {
            resource_id: "EMP-404".to_string(),
            forecast_id: 1,
            year: 2025,
            week_number: 15,
            tier_name: None,
        };
        assert_eq!(
            state.allocation_api.assign_direct(&request).unwrap_err().kind(),
            ErrorKind::NotFound
        );

        let unknown_week = DirectAssignRequest {
            resource_id: "EMP-001".to_string(),
            week_number: 30,
            ..request
        };
        assert_eq!(
            state.allocation_api.assign_direct(&unknown_week).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    // ==========================================
    // 资源生命周期
    // ==========================================

    #[tokio::test]
    async fn test_register_rejects_duplicate_and_placeholder() {
        let (_tmp, state) = standard_setup().await;
        let err = state
            .allocation_api
            .register_resource(&matching_actual("EMP-001"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let mut placeholder = matching_actual("PH-999999");
        placeholder.kind = ResourceKind::Placeholder;
        let err = state.allocation_api.register_resource(&placeholder).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[tokio::test]
    async fn test_convert_placeholder_transfers_assignments() {
        let (_tmp, state) = standard_setup().await;
        state.allocation_api.run_allocation(&april_request(false)).unwrap();

        let result = state
            .allocation_api
            .convert_placeholder("PH-000001", &matching_actual("EMP-100"))
            .unwrap();
        assert_eq!(result.transferred_assignments, 4);
        assert!(result.history_log_id.is_some());

        let moved = state.allocation_api.list_assignments("EMP-100").unwrap();
        assert_eq!(moved.len(), 4);
        assert!(moved.iter().all(|a| a.resource_kind == ResourceKind::Actual));
        assert!(state.allocation_api.list_assignments("PH-000001").unwrap().is_empty());

        let placeholder = state.resource_repo.find_by_id("PH-000001").unwrap().unwrap();
        assert!(!placeholder.is_active);
        assert_eq!(placeholder.replaced_by.as_deref(), Some("EMP-100"));

        // 已转正的占位不可再次转换
        let err = state
            .allocation_api
            .convert_placeholder("PH-000001", &matching_actual("EMP-101"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(state.resource_repo.find_by_id("EMP-101").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_convert_rejects_used_actual_id() {
        let (_tmp, state) = standard_setup().await;
        state.allocation_api.run_allocation(&april_request(false)).unwrap();

        let err = state
            .allocation_api
            .convert_placeholder("PH-000001", &matching_actual("EMP-001"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        // 事务回滚, 占位保持在用
        assert_eq!(state.allocation_api.list_assignments("PH-000001").unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_deactivate_cascades_by_policy() {
        let (_tmp, state) = standard_setup().await;
        state.allocation_api.run_allocation(&april_request(false)).unwrap();

        let result = state.allocation_api.deactivate_resource("EMP-001").unwrap();
        assert_eq!(result.assignments_deactivated, 4);
        assert!(state.allocation_api.list_assignments("EMP-001").unwrap().is_empty());

        let err = state.allocation_api.deactivate_resource("EMP-001").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        let err = state.allocation_api.deactivate_resource("EMP-404").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        set_policy(&state, policy_keys::CASCADE_DEACTIVATE_ASSIGNMENTS, PolicyValue::Bool(false));
        let result = state.allocation_api.deactivate_resource("EMP-002").unwrap();
        assert_eq!(result.assignments_deactivated, 0);
        assert_eq!(state.allocation_api.list_assignments("EMP-002").unwrap().len(), 4);
    }
}
