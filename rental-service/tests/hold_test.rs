//! Hold creation, availability, and overlap-invariant tests.

mod common;

use chrono::Duration;
use common::{create_vehicle, request_hold, window, TestApp};
use rental_service::config::BookingPolicyConfig;
use serde_json::json;

#[tokio::test]
async fn quote_splits_twenty_six_hours_into_day_plus_two() {
    let app = TestApp::spawn().await;
    let asset = create_vehicle(&app, 50_000, 7_000, 0).await;
    let (start, end) = window(24, 26);

    let response = app
        .client
        .post(format!("{}/quotes", app.address))
        .json(&json!({
            "asset_id": asset["asset_id"],
            "start_utc": start.to_rfc3339(),
            "end_utc": end.to_rfc3339()
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let quote: serde_json::Value = response.json().await.unwrap();
    assert_eq!(quote["total_hours"], 26);
    assert_eq!(quote["rental_days"], 1);
    assert_eq!(quote["remainder_hours"], 2);
    assert_eq!(quote["base_amount"], 64_000);
    assert_eq!(quote["available"], true);

    app.cleanup().await;
}

#[tokio::test]
async fn quote_rejects_inverted_window() {
    let app = TestApp::spawn().await;
    let asset = create_vehicle(&app, 50_000, 7_000, 0).await;
    let (start, end) = window(24, 26);

    let response = app
        .client
        .post(format!("{}/quotes", app.address))
        .json(&json!({
            "asset_id": asset["asset_id"],
            "start_utc": end.to_rfc3339(),
            "end_utc": start.to_rfc3339()
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], "invalid_window");

    app.cleanup().await;
}

#[tokio::test]
async fn overlapping_hold_is_rejected_with_conflict() {
    let app = TestApp::spawn().await;
    let asset = create_vehicle(&app, 50_000, 7_000, 0).await;
    let asset_id = asset["asset_id"].as_str().unwrap();
    let (start, end) = window(24, 26);

    let (status, first) = request_hold(&app, asset_id, start, end).await;
    assert_eq!(status, 201, "first hold should succeed: {}", first);

    // Shifted but overlapping window
    let (status, second) =
        request_hold(&app, asset_id, start + Duration::hours(2), end + Duration::hours(2)).await;
    assert_eq!(status, 409);
    assert_eq!(second["code"], "unavailable");

    app.cleanup().await;
}

#[tokio::test]
async fn adjacent_half_open_windows_do_not_conflict() {
    let app = TestApp::spawn().await;
    let asset = create_vehicle(&app, 50_000, 7_000, 0).await;
    let asset_id = asset["asset_id"].as_str().unwrap();
    let (start, end) = window(24, 24);

    let (status, _) = request_hold(&app, asset_id, start, end).await;
    assert_eq!(status, 201);

    // [end, end+24h) shares only the boundary instant, which is free.
    let (status, body) = request_hold(&app, asset_id, end, end + Duration::hours(24)).await;
    assert_eq!(status, 201, "adjacent window should be free: {}", body);

    app.cleanup().await;
}

#[tokio::test]
async fn concurrent_overlapping_holds_leave_exactly_one_survivor() {
    let app = TestApp::spawn().await;
    let asset = create_vehicle(&app, 50_000, 7_000, 0).await;
    let asset_id = asset["asset_id"].as_str().unwrap().to_string();
    let (start, end) = window(24, 26);

    let attempts = 8;
    let results = futures::future::join_all(
        (0..attempts).map(|_| request_hold(&app, &asset_id, start, end)),
    )
    .await;

    let created = results.iter().filter(|(status, _)| *status == 201).count();
    let conflicts = results
        .iter()
        .filter(|(status, body)| *status == 409 && body["code"] == "unavailable")
        .count();

    assert_eq!(created, 1, "exactly one concurrent hold must survive");
    assert_eq!(conflicts, attempts - 1, "losers must see a conflict");

    app.cleanup().await;
}

#[tokio::test]
async fn different_assets_do_not_interact() {
    let app = TestApp::spawn().await;
    let first = create_vehicle(&app, 50_000, 7_000, 0).await;
    let second = create_vehicle(&app, 60_000, 8_000, 0).await;
    let (start, end) = window(24, 26);

    let (status, _) = request_hold(&app, first["asset_id"].as_str().unwrap(), start, end).await;
    assert_eq!(status, 201);
    let (status, _) = request_hold(&app, second["asset_id"].as_str().unwrap(), start, end).await;
    assert_eq!(status, 201);

    app.cleanup().await;
}

#[tokio::test]
async fn block_claims_the_interval() {
    let app = TestApp::spawn().await;
    let asset = create_vehicle(&app, 50_000, 7_000, 0).await;
    let asset_id = asset["asset_id"].as_str().unwrap();
    let (start, end) = window(24, 26);

    let response = app
        .client
        .post(format!("{}/assets/{}/blocks", app.address, asset_id))
        .json(&json!({
            "start_utc": start.to_rfc3339(),
            "end_utc": end.to_rfc3339(),
            "reason": "maintenance"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let block: serde_json::Value = response.json().await.unwrap();

    let (status, body) = request_hold(&app, asset_id, start, end).await;
    assert_eq!(status, 409);
    assert_eq!(body["code"], "unavailable");

    // Releasing the block frees the interval.
    let response = app
        .client
        .delete(format!(
            "{}/blocks/{}",
            app.address,
            block["block_id"].as_str().unwrap()
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);

    let (status, _) = request_hold(&app, asset_id, start, end).await;
    assert_eq!(status, 201);

    app.cleanup().await;
}

#[tokio::test]
async fn block_cannot_land_on_an_active_booking() {
    let app = TestApp::spawn().await;
    let asset = create_vehicle(&app, 50_000, 7_000, 0).await;
    let asset_id = asset["asset_id"].as_str().unwrap();
    let (start, end) = window(24, 26);

    let (status, _) = request_hold(&app, asset_id, start, end).await;
    assert_eq!(status, 201);

    let response = app
        .client
        .post(format!("{}/assets/{}/blocks", app.address, asset_id))
        .json(&json!({
            "start_utc": start.to_rfc3339(),
            "end_utc": end.to_rfc3339(),
            "source": "external_sync"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);

    app.cleanup().await;
}

#[tokio::test]
async fn expiry_sweep_frees_past_due_holds() {
    let app = TestApp::spawn_with_policy(BookingPolicyConfig {
        hold_ttl_minutes: 0,
        return_grace_minutes: 30,
        default_commission_percent: 10,
    })
    .await;
    let asset = create_vehicle(&app, 50_000, 7_000, 0).await;
    let asset_id = asset["asset_id"].as_str().unwrap();
    let (start, end) = window(24, 26);

    let (status, hold) = request_hold(&app, asset_id, start, end).await;
    assert_eq!(status, 201);
    let booking_id = hold["booking_id"].as_str().unwrap();

    let response = app
        .client
        .post(format!("{}/admin/holds/expire", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["expired"].as_u64().unwrap() >= 1);

    let booking = common::get_booking(&app, booking_id).await;
    assert_eq!(booking["status"], "expired");

    // The sweep is idempotent; a second run moves nothing.
    let response = app
        .client
        .post(format!("{}/admin/holds/expire", app.address))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["expired"], 0);

    // The transition was logged once.
    let response = app
        .client
        .get(format!("{}/bookings/{}/transitions", app.address, booking_id))
        .send()
        .await
        .unwrap();
    let transitions: Vec<serde_json::Value> = response.json().await.unwrap();
    let expirations = transitions
        .iter()
        .filter(|t| t["to_status"] == "expired")
        .count();
    assert_eq!(expirations, 1);

    app.cleanup().await;
}

#[tokio::test]
async fn lazy_expiry_frees_the_interval_for_new_holds() {
    let app = TestApp::spawn_with_policy(BookingPolicyConfig {
        hold_ttl_minutes: 0,
        return_grace_minutes: 30,
        default_commission_percent: 10,
    })
    .await;
    let asset = create_vehicle(&app, 50_000, 7_000, 0).await;
    let asset_id = asset["asset_id"].as_str().unwrap();
    let (start, end) = window(24, 26);

    let (status, first) = request_hold(&app, asset_id, start, end).await;
    assert_eq!(status, 201);

    // No sweep has run, but the first hold is already past due.
    let (status, _) = request_hold(&app, asset_id, start, end).await;
    assert_eq!(status, 201);

    let booking = common::get_booking(&app, first["booking_id"].as_str().unwrap()).await;
    assert_eq!(booking["status"], "expired");

    app.cleanup().await;
}

#[tokio::test]
async fn availability_endpoint_reflects_holds() {
    let app = TestApp::spawn().await;
    let asset = create_vehicle(&app, 50_000, 7_000, 0).await;
    let asset_id = asset["asset_id"].as_str().unwrap();
    let (start, end) = window(24, 26);

    let url = format!(
        "{}/assets/{}/availability?start_utc={}&end_utc={}",
        app.address,
        asset_id,
        urlencoded(&start.to_rfc3339()),
        urlencoded(&end.to_rfc3339())
    );

    let response = app.client.get(&url).send().await.unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["available"], true);

    let (status, _) = request_hold(&app, asset_id, start, end).await;
    assert_eq!(status, 201);

    let response = app.client.get(&url).send().await.unwrap();
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["available"], false);

    app.cleanup().await;
}

#[tokio::test]
async fn deactivated_assets_take_no_new_holds() {
    let app = TestApp::spawn().await;
    let asset = create_vehicle(&app, 50_000, 7_000, 0).await;
    let asset_id = asset["asset_id"].as_str().unwrap();
    let (start, end) = window(24, 26);

    let response = app
        .client
        .patch(format!("{}/assets/{}", app.address, asset_id))
        .json(&json!({ "is_active": false }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let patched: serde_json::Value = response.json().await.unwrap();
    assert_eq!(patched["is_active"], false);

    let (status, body) = request_hold(&app, asset_id, start, end).await;
    assert_eq!(status, 404, "inactive assets must not take holds: {}", body);

    app.cleanup().await;
}

fn urlencoded(value: &str) -> String {
    value.replace('+', "%2B").replace(':', "%3A")
}

#[tokio::test]
async fn underage_driver_fails_eligibility() {
    let app = TestApp::spawn().await;
    let asset = create_vehicle(&app, 50_000, 7_000, 0).await;
    let (start, end) = window(24, 26);

    let response = app
        .client
        .post(format!("{}/bookings", app.address))
        .json(&json!({
            "asset_id": asset["asset_id"],
            "start_utc": start.to_rfc3339(),
            "end_utc": end.to_rfc3339(),
            "customer": {
                "name": "Sam Park",
                "phone": "+82-10-1111-2222",
                "birth_date": "2010-01-15"
            }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 422);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], "eligibility_failed");

    app.cleanup().await;
}
