//! ErrorLog interface tests.
//!
//! These tests verify the contract of the ErrorLog trait. They only assume
//! the log's application name is not shared with other writers, so they can
//! run against a table that holds other data.

use chrono::{Duration, TimeZone, Utc};
use uuid::Uuid;

use elmah_dynamodb::{ErrorEvent, ErrorLog, ErrorLogError};

fn event_at(message: &str, minute: i64) -> ErrorEvent {
    ErrorEvent::new(message)
        .with_type("System.InvalidOperationException")
        .with_source("contract")
        .with_status_code(500)
        .with_time(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute))
}

// =============================================================================
// ErrorLog::log / get_error tests
// =============================================================================

pub async fn test_log_and_get<L: ErrorLog>(log: &L) {
    let mut event = event_at("round trip", 0).with_user("alice");
    event.detail = "round trip\n  caused by: disk full".to_string();
    event.form = vec![("tag".to_string(), "a".to_string())];

    let id = log.log(&event).await.expect("log should succeed");
    assert!(Uuid::parse_str(&id).is_ok(), "id should be a uuid");

    let entry = log
        .get_error(&id)
        .await
        .expect("get_error should succeed")
        .expect("error should exist");

    assert_eq!(entry.id, id);
    assert_eq!(entry.error, event, "all fields should survive storage");
    assert_eq!(entry.log_name, log.name());
}

pub async fn test_log_ids_unique<L: ErrorLog>(log: &L) {
    let event = event_at("same error", 1);

    let first = log.log(&event).await.unwrap();
    let second = log.log(&event).await.unwrap();

    assert_ne!(first, second, "every log call gets a new id");
}

pub async fn test_get_error_invalid_id<L: ErrorLog>(log: &L) {
    for id in ["", "not-a-uuid", "1234"] {
        let err = log.get_error(id).await.unwrap_err();
        assert_eq!(err, ErrorLogError::InvalidId(id.to_string()));
    }
}

pub async fn test_get_error_unknown_id<L: ErrorLog>(log: &L) {
    let result = log
        .get_error(&Uuid::new_v4().to_string())
        .await
        .expect("miss should not be an error");
    assert!(result.is_none(), "unknown id should be None");
}

// =============================================================================
// ErrorLog::get_errors tests
// =============================================================================

/// Logs e1, e2, e3 at increasing times, then reads two pages of size 2.
pub async fn test_get_errors_pages<L: ErrorLog>(log: &L) {
    let e1 = log.log(&event_at("e1", 10)).await.unwrap();
    let e2 = log.log(&event_at("e2", 11)).await.unwrap();
    let e3 = log.log(&event_at("e3", 12)).await.unwrap();

    let mut first = Vec::new();
    let total = log.get_errors(0, 2, &mut first).await.unwrap();
    let ids: Vec<&str> = first.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec![e3.as_str(), e2.as_str()], "newest first");
    assert!(total >= 3, "total {} should count all three", total);

    let mut second = Vec::new();
    log.get_errors(1, 2, &mut second).await.unwrap();
    let ids: Vec<&str> = second.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec![e1.as_str()]);
    assert_eq!(second[0].error.message, "e1");
}

pub async fn test_get_errors_past_end<L: ErrorLog>(log: &L) {
    log.log(&event_at("only", 20)).await.unwrap();

    let mut sink = Vec::new();
    let total = log.get_errors(50, 10, &mut sink).await.unwrap();

    assert!(sink.is_empty(), "page past the end should be empty");
    assert!(total >= 1);
}

pub async fn test_get_errors_total_covers_page<L: ErrorLog>(log: &L) {
    for i in 0..5 {
        log.log(&event_at(&format!("burst {}", i), 30 + i)).await.unwrap();
    }

    let mut sink = Vec::new();
    let total = log.get_errors(0, 4, &mut sink).await.unwrap();

    assert_eq!(sink.len(), 4);
    assert!(total >= sink.len());
    for pair in sink.windows(2) {
        assert!(pair[0].error.time >= pair[1].error.time, "descending time");
    }
}

// =============================================================================
// Test runner macro
// =============================================================================

/// Run all ErrorLog interface tests against a log.
///
/// Each group expects a log whose application has not been written to.
#[macro_export]
macro_rules! run_error_log_tests {
    ($new_log:expr) => {
        use $crate::contract::error_log_tests::*;

        test_log_and_get(&$new_log).await;
        println!("  test_log_and_get: PASSED");

        test_log_ids_unique(&$new_log).await;
        println!("  test_log_ids_unique: PASSED");

        test_get_error_invalid_id(&$new_log).await;
        println!("  test_get_error_invalid_id: PASSED");

        test_get_error_unknown_id(&$new_log).await;
        println!("  test_get_error_unknown_id: PASSED");

        test_get_errors_pages(&$new_log).await;
        println!("  test_get_errors_pages: PASSED");

        test_get_errors_past_end(&$new_log).await;
        println!("  test_get_errors_past_end: PASSED");

        test_get_errors_total_covers_page(&$new_log).await;
        println!("  test_get_errors_total_covers_page: PASSED");
    };
}
