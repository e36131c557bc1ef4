//! Commission rate resolution tests: precedence, effective windows,
//! and the configured fallback.

mod common;

use chrono::{Duration, Utc};
use common::{confirm_booking, create_vehicle, request_hold, staff_action, TestApp, TEST_VENDOR_ID};
use serde_json::{json, Value};
use uuid::Uuid;

async fn create_rate(app: &TestApp, body: Value) -> Value {
    let response = app
        .client
        .post(format!("{}/admin/commission-rates", app.address))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201, "rate creation failed");
    response.json().await.unwrap()
}

async fn resolved_percent(app: &TestApp, vendor_id: Uuid, category: &str) -> Option<i32> {
    app.db
        .resolve_commission_rate(vendor_id, category)
        .await
        .unwrap()
        .map(|rate| rate.percent)
}

#[tokio::test]
async fn vendor_rate_beats_category_rate_beats_global() {
    let app = TestApp::spawn().await;
    let vendor = app.vendor_id();
    let other_vendor = Uuid::new_v4();

    create_rate(&app, json!({ "percent": 8 })).await;
    create_rate(&app, json!({ "category": "vehicle", "percent": 15 })).await;
    create_rate(&app, json!({ "vendor_id": TEST_VENDOR_ID, "percent": 25 })).await;

    assert_eq!(resolved_percent(&app, vendor, "vehicle").await, Some(25));
    assert_eq!(resolved_percent(&app, other_vendor, "vehicle").await, Some(15));
    assert_eq!(resolved_percent(&app, other_vendor, "room").await, Some(8));

    app.cleanup().await;
}

#[tokio::test]
async fn inactive_rates_are_skipped() {
    let app = TestApp::spawn().await;
    let vendor = app.vendor_id();

    create_rate(&app, json!({ "category": "vehicle", "percent": 15 })).await;
    let vendor_rate = create_rate(&app, json!({ "vendor_id": TEST_VENDOR_ID, "percent": 25 })).await;

    let response = app
        .client
        .patch(format!(
            "{}/admin/commission-rates/{}",
            app.address,
            vendor_rate["rate_id"].as_str().unwrap()
        ))
        .json(&json!({ "is_active": false }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    assert_eq!(resolved_percent(&app, vendor, "vehicle").await, Some(15));

    app.cleanup().await;
}

#[tokio::test]
async fn rates_outside_their_effective_window_are_skipped() {
    let app = TestApp::spawn().await;
    let vendor = app.vendor_id();
    let now = Utc::now();

    // Expired promotion
    create_rate(
        &app,
        json!({
            "vendor_id": TEST_VENDOR_ID,
            "percent": 5,
            "effective_from": (now - Duration::days(30)).to_rfc3339(),
            "effective_until": (now - Duration::days(1)).to_rfc3339()
        }),
    )
    .await;
    // Not yet effective
    create_rate(
        &app,
        json!({
            "vendor_id": TEST_VENDOR_ID,
            "percent": 30,
            "effective_from": (now + Duration::days(7)).to_rfc3339()
        }),
    )
    .await;
    // Currently effective
    create_rate(
        &app,
        json!({
            "vendor_id": TEST_VENDOR_ID,
            "percent": 20,
            "effective_from": (now - Duration::days(1)).to_rfc3339(),
            "effective_until": (now + Duration::days(30)).to_rfc3339()
        }),
    )
    .await;

    assert_eq!(resolved_percent(&app, vendor, "vehicle").await, Some(20));

    app.cleanup().await;
}

#[tokio::test]
async fn most_recently_created_wins_within_a_level() {
    let app = TestApp::spawn().await;
    let vendor = app.vendor_id();

    create_rate(&app, json!({ "percent": 8 })).await;
    create_rate(&app, json!({ "percent": 12 })).await;

    assert_eq!(resolved_percent(&app, vendor, "vehicle").await, Some(12));

    app.cleanup().await;
}

#[tokio::test]
async fn no_matching_row_resolves_to_nothing() {
    let app = TestApp::spawn().await;
    assert_eq!(resolved_percent(&app, app.vendor_id(), "vehicle").await, None);
    app.cleanup().await;
}

#[tokio::test]
async fn percent_above_one_hundred_is_rejected() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .post(format!("{}/admin/commission-rates", app.address))
        .json(&json!({ "percent": 101 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 422);

    app.cleanup().await;
}

#[tokio::test]
async fn settlement_uses_the_resolved_vendor_rate() {
    let app = TestApp::spawn().await;
    create_rate(&app, json!({ "vendor_id": TEST_VENDOR_ID, "percent": 25 })).await;

    let asset = create_vehicle(&app, 50_000, 7_000, 0).await;
    let end = Utc::now() - Duration::minutes(10);
    let start = end - Duration::hours(24);

    let (_, hold) = request_hold(&app, asset["asset_id"].as_str().unwrap(), start, end).await;
    let booking_id = hold["booking_id"].as_str().unwrap();
    let total = hold["total_amount"].as_i64().unwrap();

    confirm_booking(&app, hold["order_ref"].as_str().unwrap(), total).await;
    staff_action(&app, booking_id, "pickup", json!({})).await;
    staff_action(&app, booking_id, "return", json!({})).await;
    let (status, settled) = staff_action(&app, booking_id, "settle", json!({})).await;
    assert_eq!(status, 200);

    assert_eq!(settled["platform_fee"], total * 25 / 100);
    assert_eq!(
        settled["platform_fee"].as_i64().unwrap() + settled["vendor_amount"].as_i64().unwrap(),
        total
    );

    app.cleanup().await;
}

#[tokio::test]
async fn settlement_falls_back_to_the_configured_default() {
    let app = TestApp::spawn().await;

    let asset = create_vehicle(&app, 50_000, 7_000, 0).await;
    let end = Utc::now() - Duration::minutes(10);
    let start = end - Duration::hours(24);

    let (_, hold) = request_hold(&app, asset["asset_id"].as_str().unwrap(), start, end).await;
    let booking_id = hold["booking_id"].as_str().unwrap();
    let total = hold["total_amount"].as_i64().unwrap();

    confirm_booking(&app, hold["order_ref"].as_str().unwrap(), total).await;
    staff_action(&app, booking_id, "pickup", json!({})).await;
    staff_action(&app, booking_id, "return", json!({})).await;
    let (status, settled) = staff_action(&app, booking_id, "settle", json!({})).await;
    assert_eq!(status, 200);

    // No commission_rates rows exist: the configured 10% applies.
    assert_eq!(settled["platform_fee"], total / 10);

    app.cleanup().await;
}

#[tokio::test]
async fn deleted_rates_stop_resolving() {
    let app = TestApp::spawn().await;
    let vendor = app.vendor_id();

    create_rate(&app, json!({ "category": "vehicle", "percent": 15 })).await;
    let vendor_rate = create_rate(&app, json!({ "vendor_id": TEST_VENDOR_ID, "percent": 25 })).await;
    assert_eq!(resolved_percent(&app, vendor, "vehicle").await, Some(25));

    let response = app
        .client
        .delete(format!(
            "{}/admin/commission-rates/{}",
            app.address,
            vendor_rate["rate_id"].as_str().unwrap()
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);

    assert_eq!(resolved_percent(&app, vendor, "vehicle").await, Some(15));

    app.cleanup().await;
}
