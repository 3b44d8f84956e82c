//! # Tests for Handlers
//!
//! Unit tests for the analytics API handlers. Parameter validation runs
//! before any query is issued, so these tests exercise the rejection paths
//! against a default (unconnected) database handle.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::handlers::channels::{ChannelActivityQuery, channel_activity};
use crate::handlers::reports::{TopProductsQuery, top_products};
use crate::handlers::search::{SearchMessagesQuery, escape_like, search_messages};
use crate::handlers::{bounded_limit, root};
use crate::server::AppState;

fn test_state() -> AppState {
    AppState {
        config: Arc::new(AppConfig::default()),
        db: DatabaseConnection::default(),
    }
}

#[tokio::test]
async fn root_returns_service_info() {
    let response = root().await;
    assert_eq!(response.0.service, "medwarehouse");
    assert_eq!(response.0.version, env!("CARGO_PKG_VERSION"));
}

#[test]
fn bounded_limit_applies_default_and_bounds() {
    assert_eq!(bounded_limit(None, 10, 100).unwrap(), 10);
    assert_eq!(bounded_limit(Some(100), 10, 100).unwrap(), 100);
    assert_eq!(bounded_limit(Some(1), 10, 100).unwrap(), 1);

    for out_of_range in [0, -3, 101] {
        let err = bounded_limit(Some(out_of_range), 10, 100).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "VALIDATION_FAILED".into());
    }
}

#[tokio::test]
async fn top_products_rejects_out_of_range_limit() {
    let result = top_products(
        State(test_state()),
        Query(TopProductsQuery { limit: Some(101) }),
    )
    .await;

    let err = result.unwrap_err();
    assert_eq!(err.status, StatusCode::BAD_REQUEST);
    assert_eq!(err.code, "VALIDATION_FAILED".into());
}

#[tokio::test]
async fn channel_activity_rejects_out_of_range_days() {
    let result = channel_activity(
        State(test_state()),
        Path("CheMed123".to_string()),
        Query(ChannelActivityQuery { days: Some(366) }),
    )
    .await;

    let err = result.unwrap_err();
    assert_eq!(err.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn search_rejects_empty_query() {
    for query in [None, Some(String::new()), Some("   ".to_string())] {
        let result = search_messages(
            State(test_state()),
            Query(SearchMessagesQuery {
                query,
                limit: None,
            }),
        )
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "VALIDATION_FAILED".into());
    }
}

#[tokio::test]
async fn search_rejects_out_of_range_limit() {
    let result = search_messages(
        State(test_state()),
        Query(SearchMessagesQuery {
            query: Some("paracetamol".to_string()),
            limit: Some(0),
        }),
    )
    .await;

    assert_eq!(result.unwrap_err().status, StatusCode::BAD_REQUEST);
}

#[test]
fn like_metacharacters_are_escaped() {
    assert_eq!(escape_like("50%_off"), "50\\%\\_off");
    assert_eq!(escape_like(r"back\slash"), r"back\\slash");
    assert_eq!(escape_like("plain"), "plain");
}
