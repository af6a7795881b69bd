//! Tests for pagination module

use super::*;
use pretty_assertions::assert_eq;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::{json, Value};
use test_case::test_case;

fn page<'a>(body: &'a Value, headers: &'a HeaderMap, records: &'a [Value]) -> PageResponse<'a> {
    PageResponse::new(body, headers, records)
}

fn records(count: usize) -> Vec<Value> {
    (0..count).map(|i| json!({"id": i})).collect()
}

// ============================================================================
// NextPage Tests
// ============================================================================

#[test]
fn test_next_page_with_param() {
    let next = NextPage::with_param("page", "2");
    assert!(next.is_continue());
    assert!(!next.is_done());
    assert_eq!(
        next,
        NextPage::Continue {
            query_params: PageParams::from([("page".to_string(), "2".to_string())]),
            url: None,
        }
    );
}

#[test]
fn test_next_page_with_url() {
    let next = NextPage::with_url("https://api.example.com/page2");
    let NextPage::Continue { query_params, url } = next else {
        panic!("Expected Continue");
    };
    assert!(query_params.is_empty());
    assert_eq!(url.as_deref(), Some("https://api.example.com/page2"));
}

// ============================================================================
// StopCondition Tests
// ============================================================================

#[test]
fn test_stop_condition_empty_page() {
    let state = PaginationState::new();
    let body = json!({});
    assert_eq!(
        check_stop_condition(&StopCondition::EmptyPage, &body, 0, &state),
        StopResult::Stop
    );
    assert_eq!(
        check_stop_condition(&StopCondition::EmptyPage, &body, 10, &state),
        StopResult::Continue
    );
}

#[test_case(json!({"has_more": false}), StopResult::Stop ; "matching value")]
#[test_case(json!({"has_more": true}), StopResult::Continue ; "other value")]
#[test_case(json!({}), StopResult::Continue ; "missing field")]
fn test_stop_condition_field(body: Value, expected: StopResult) {
    let condition = StopCondition::field("has_more", false);
    assert_eq!(
        check_stop_condition(&condition, &body, 10, &PaginationState::new()),
        expected
    );
}

#[test]
fn test_stop_condition_total_count() {
    let condition = StopCondition::total_count("meta.total");
    let body = json!({"meta": {"total": 100}});

    let mut state = PaginationState::new();
    state.add_fetched(50);
    assert!(check_stop_condition(&condition, &body, 50, &state).should_continue());

    state.add_fetched(50);
    assert!(check_stop_condition(&condition, &body, 50, &state).should_stop());
}

#[test]
fn test_stop_condition_total_pages() {
    let condition = StopCondition::total_pages("total_pages");
    let body = json!({"total_pages": "5"});

    let mut state = PaginationState::with_page(3);
    assert!(check_stop_condition(&condition, &body, 10, &state).should_continue());

    state.page = 5;
    assert!(check_stop_condition(&condition, &body, 10, &state).should_stop());
}

// ============================================================================
// Cursor Paginator Tests
// ============================================================================

#[test]
fn test_cursor_paginator_initial_params() {
    let paginator = CursorPaginator::new("starting_after", "next_cursor", StopCondition::EmptyPage);
    assert!(paginator.initial_params(&PaginationState::new()).is_empty());

    let mut state = PaginationState::new();
    state.set_cursor("obj_123".to_string());
    assert_eq!(
        paginator.initial_params(&state).get("starting_after").map(String::as_str),
        Some("obj_123")
    );
}

#[test]
fn test_cursor_paginator_from_response_path() {
    let paginator =
        CursorPaginator::new("cursor", "meta.next_cursor", StopCondition::EmptyPage);
    let body = json!({"data": [{"id": 1}, {"id": 2}], "meta": {"next_cursor": "cursor_abc"}});
    let headers = HeaderMap::new();
    let recs = records(2);
    let mut state = PaginationState::new();

    let next = paginator.next_page(&page(&body, &headers, &recs), &mut state);

    assert_eq!(next, NextPage::with_param("cursor", "cursor_abc"));
    assert_eq!(state.cursor.as_deref(), Some("cursor_abc"));
    assert_eq!(state.total_fetched, 2);
}

#[test]
fn test_cursor_paginator_from_last_record() {
    let paginator = CursorPaginator::from_last_record(
        "starting_after",
        "id",
        StopCondition::field("has_more", false),
    );
    let body = json!({"has_more": true});
    let headers = HeaderMap::new();
    let recs = vec![json!({"id": "cus_1"}), json!({"id": "cus_2"})];
    let mut state = PaginationState::new();

    let next = paginator.next_page(&page(&body, &headers, &recs), &mut state);
    assert_eq!(next, NextPage::with_param("starting_after", "cus_2"));

    let body = json!({"has_more": false});
    let next = paginator.next_page(&page(&body, &headers, &recs), &mut state);
    assert!(next.is_done());
    assert!(state.done);
}

#[test]
fn test_cursor_paginator_stops_without_cursor() {
    let paginator = CursorPaginator::new("cursor", "next_cursor", StopCondition::EmptyPage);
    let headers = HeaderMap::new();
    let recs = records(1);

    for body in [json!({"next_cursor": null}), json!({"next_cursor": ""}), json!({})] {
        let mut state = PaginationState::new();
        assert!(paginator
            .next_page(&page(&body, &headers, &recs), &mut state)
            .is_done());
    }
}

#[test]
fn test_cursor_paginator_stops_on_empty_page() {
    let paginator = CursorPaginator::new("cursor", "next_cursor", StopCondition::EmptyPage);
    let body = json!({"next_cursor": "abc"});
    let headers = HeaderMap::new();
    let mut state = PaginationState::new();

    assert!(paginator
        .next_page(&page(&body, &headers, &[]), &mut state)
        .is_done());
}

// ============================================================================
// Offset Paginator Tests
// ============================================================================

#[test]
fn test_offset_paginator() {
    let paginator = OffsetPaginator::new("offset", "limit", 50, StopCondition::EmptyPage);
    let body = json!({});
    let headers = HeaderMap::new();
    let mut state = PaginationState::new();

    let initial = paginator.initial_params(&state);
    assert_eq!(initial.get("offset").map(String::as_str), Some("0"));
    assert_eq!(initial.get("limit").map(String::as_str), Some("50"));

    let full = records(50);
    let next = paginator.next_page(&page(&body, &headers, &full), &mut state);
    assert_eq!(
        next,
        NextPage::with_params(PageParams::from([
            ("limit".to_string(), "50".to_string()),
            ("offset".to_string(), "50".to_string()),
        ]))
    );

    let short = records(25);
    assert!(paginator
        .next_page(&page(&body, &headers, &short), &mut state)
        .is_done());
    assert_eq!(state.total_fetched, 75);
}

#[test]
fn test_offset_paginator_stops_on_total_count() {
    let paginator =
        OffsetPaginator::new("offset", "limit", 50, StopCondition::total_count("total"));
    let body = json!({"total": 75});
    let headers = HeaderMap::new();
    let full = records(50);
    let mut state = PaginationState::new();

    assert!(paginator
        .next_page(&page(&body, &headers, &full), &mut state)
        .is_continue());
    assert!(paginator
        .next_page(&page(&body, &headers, &full), &mut state)
        .is_done());
}

// ============================================================================
// Page Number Paginator Tests
// ============================================================================

#[test]
fn test_page_number_paginator_advances_from_start_page() {
    let paginator = PageNumberPaginator::new("page", 1).with_page_size("per_page", 2);
    let body = json!({});
    let headers = HeaderMap::new();
    let mut state = PaginationState::new();

    let initial = paginator.initial_params(&state);
    assert_eq!(initial.get("page").map(String::as_str), Some("1"));
    assert_eq!(initial.get("per_page").map(String::as_str), Some("2"));

    let full = records(2);
    let next = paginator.next_page(&page(&body, &headers, &full), &mut state);
    let NextPage::Continue { query_params, .. } = next else {
        panic!("Expected Continue");
    };
    assert_eq!(query_params.get("page").map(String::as_str), Some("2"));

    let short = records(1);
    assert!(paginator
        .next_page(&page(&body, &headers, &short), &mut state)
        .is_done());
}

#[test]
fn test_page_number_paginator_stops_on_total_pages() {
    let paginator = PageNumberPaginator::new("page", 1)
        .with_stop_condition(StopCondition::total_pages("total_pages"));
    let body = json!({"total_pages": 2});
    let headers = HeaderMap::new();
    let recs = records(10);
    let mut state = PaginationState::new();

    assert!(paginator
        .next_page(&page(&body, &headers, &recs), &mut state)
        .is_continue());
    assert!(paginator
        .next_page(&page(&body, &headers, &recs), &mut state)
        .is_done());
    assert_eq!(state.page, 2);
}

// ============================================================================
// Link Header Paginator Tests
// ============================================================================

#[test_case(
    "<https://api.example.com/items?page=2>; rel=\"next\", <https://api.example.com/items?page=1>; rel=\"prev\"",
    Some("https://api.example.com/items?page=2") ;
    "next and prev"
)]
#[test_case(
    "<https://api.example.com/items?page=1>; rel=\"prev\"",
    None ;
    "prev only"
)]
#[test_case(
    "<https://api.example.com/items?page=3>; rel=\"next last\"",
    Some("https://api.example.com/items?page=3") ;
    "multiple rels"
)]
fn test_link_header_paginator(link: &'static str, expected: Option<&str>) {
    let paginator = LinkHeaderPaginator::default();
    let body = Value::Null;
    let mut headers = HeaderMap::new();
    headers.insert("link", HeaderValue::from_static(link));
    let recs = records(1);
    let mut state = PaginationState::new();

    let next = paginator.next_page(&page(&body, &headers, &recs), &mut state);
    let url = match next {
        NextPage::Continue { url, .. } => url,
        NextPage::Done => None,
    };
    assert_eq!(url.as_deref(), expected);
}

#[test]
fn test_link_header_paginator_stops_without_header() {
    let paginator = LinkHeaderPaginator::default();
    let body = Value::Null;
    let headers = HeaderMap::new();
    let mut state = PaginationState::new();
    assert!(paginator
        .next_page(&page(&body, &headers, &records(3)), &mut state)
        .is_done());
}

// ============================================================================
// Next URL Paginator Tests
// ============================================================================

#[test]
fn test_next_url_paginator_nested_path() {
    let paginator = NextUrlPaginator::new("pagination.next");
    let body = json!({
        "pagination": {"next": "https://api.example.com/items?cursor=abc", "prev": null}
    });
    let headers = HeaderMap::new();
    let mut state = PaginationState::new();

    assert_eq!(
        paginator.next_page(&page(&body, &headers, &records(3)), &mut state),
        NextPage::with_url("https://api.example.com/items?cursor=abc")
    );
}

#[test_case(json!({"next_url": null}) ; "null")]
#[test_case(json!({"next_url": ""}) ; "empty")]
#[test_case(json!({}) ; "missing")]
fn test_next_url_paginator_stops(body: Value) {
    let paginator = NextUrlPaginator::new("next_url");
    let headers = HeaderMap::new();
    let mut state = PaginationState::new();
    assert!(paginator
        .next_page(&page(&body, &headers, &records(3)), &mut state)
        .is_done());
}

#[test]
fn test_no_paginator_single_page() {
    let body = json!({"next": "ignored"});
    let headers = HeaderMap::new();
    let mut state = PaginationState::new();
    assert!(NoPaginator
        .next_page(&page(&body, &headers, &records(3)), &mut state)
        .is_done());
    assert_eq!(state.total_fetched, 3);
}

// ============================================================================
// PaginatorConfig Tests
// ============================================================================

#[test]
fn test_paginator_config_from_yaml() {
    let config: PaginatorConfig = serde_yaml::from_str(
        r"
type: cursor
cursor_param: starting_after
last_record_field: id
stop_condition:
  type: field
  path: has_more
  value: false
",
    )
    .unwrap();
    assert_eq!(
        config,
        PaginatorConfig::Cursor {
            cursor_param: "starting_after".to_string(),
            cursor_path: None,
            last_record_field: Some("id".to_string()),
            stop_condition: StopCondition::field("has_more", false),
        }
    );
    assert!(config.build().is_ok());

    let config: PaginatorConfig = serde_yaml::from_str("type: offset\nlimit_value: 100").unwrap();
    let paginator = config.build().unwrap();
    let params = paginator.initial_params(&PaginationState::new());
    assert_eq!(params.get("limit").map(String::as_str), Some("100"));
}

#[test]
fn test_paginator_config_defaults_to_none() {
    assert_eq!(PaginatorConfig::default(), PaginatorConfig::None);
}

#[test]
fn test_paginator_config_rejects_ambiguous_cursor() {
    let config = PaginatorConfig::Cursor {
        cursor_param: "cursor".to_string(),
        cursor_path: Some("next".to_string()),
        last_record_field: Some("id".to_string()),
        stop_condition: StopCondition::EmptyPage,
    };
    assert!(config.build().is_err());

    let config = PaginatorConfig::Offset {
        offset_param: "offset".to_string(),
        limit_param: "limit".to_string(),
        limit_value: 0,
        stop_condition: StopCondition::EmptyPage,
    };
    assert!(config.build().is_err());
}
