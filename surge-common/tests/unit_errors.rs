use surge_common::PlanError;

#[test]
fn test_non_increasing_offset_display() {
    let err = PlanError::NonIncreasingOffset(2);
    assert_eq!(
        err.to_string(),
        "Stage 2: duration offset must increase over the previous stage"
    );
}

#[test]
fn test_invalid_spawn_rate_display() {
    let err = PlanError::InvalidSpawnRate(0, 0.0);
    assert_eq!(
        err.to_string(),
        "Stage 0: spawn rate must be positive and finite, got 0"
    );
}

#[test]
fn test_plan_file_display() {
    let err = PlanError::PlanFile("no such file".to_string());
    assert_eq!(err.to_string(), "Failed to load plan: no such file");
}

#[test]
fn test_error_equality() {
    let err1 = PlanError::NonIncreasingOffset(1);
    let err2 = PlanError::NonIncreasingOffset(1);
    let err3 = PlanError::NonIncreasingOffset(3);

    assert_eq!(err1, err2);
    assert_ne!(err1, err3);
}
