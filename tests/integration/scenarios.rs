//! End-to-end request scenarios through the router, the aggregator and
//! the outcome publisher.

use axum::body::Body;
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{Request, StatusCode};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use weather_services::aggregator::{Aggregator, ReadingFilter, ReadingOutcome};
use weather_services::providers::{ProviderSet, TemperatureProvider};
use weather_services::publisher::OutcomePublisher;
use weather_services::server::{build_router, ServiceState};
use weather_services::types::{OutcomeStatus, TemperatureResult};

use crate::mock_provider::{MemorySink, MockProvider, Reply};

const CLIENT: ([u8; 4], u16) = ([203, 0, 113, 7], 54321);

fn provider_set(mocks: Vec<Arc<MockProvider>>) -> ProviderSet {
    mocks
        .into_iter()
        .map(|m| m as Arc<dyn TemperatureProvider>)
        .collect()
}

fn service(mocks: Vec<Arc<MockProvider>>, filter: ReadingFilter) -> (Router, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::default());
    let state = Arc::new(ServiceState::new(
        Aggregator::new(provider_set(mocks), Duration::from_secs(2), filter),
        OutcomePublisher::new(sink.clone(), "CALL-REST-API"),
    ));
    let router = build_router(state).layer(MockConnectInfo(SocketAddr::from(CLIENT)));
    (router, sink)
}

async fn request(router: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let resp = router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn celsius(json: &serde_json::Value) -> f64 {
    json["celsius_temp"].as_f64().unwrap()
}

#[tokio::test]
async fn test_scenario_all_providers_succeed() {
    let (router, sink) = service(
        vec![
            MockProvider::celsius("owm", 20.0),
            MockProvider::celsius("apixu", 22.0),
            MockProvider::celsius("wb", 24.0),
        ],
        ReadingFilter::PositiveOnly,
    );

    let (status, json) = request(&router, "/api/temperature/hanoi").await;
    assert_eq!(status, StatusCode::OK);
    let body: TemperatureResult = serde_json::from_value(json).unwrap();
    assert_eq!(body, TemperatureResult::from_celsius("hanoi", 22.0));

    let events = sink.wait_for(1).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["status"], "Success");
    assert_eq!(sink.messages()[0].0, "CALL-REST-API");
}

#[tokio::test]
async fn test_scenario_one_provider_errors_and_service_keeps_serving() {
    let flaky = MockProvider::failing("apixu");
    let (router, sink) = service(
        vec![
            MockProvider::celsius("owm", 20.0),
            flaky.clone(),
            MockProvider::celsius("wb", 24.0),
        ],
        ReadingFilter::PositiveOnly,
    );

    let (status, json) = request(&router, "/api/temperature/hanoi").await;
    assert_eq!(status, StatusCode::OK);
    assert!((celsius(&json) - 22.0).abs() < 1e-9);

    // The same service answers the next request once the provider recovers.
    flaky.set_reply(Reply::Celsius(22.0));
    let (status, json) = request(&router, "/api/temperature/hanoi").await;
    assert_eq!(status, StatusCode::OK);
    assert!((celsius(&json) - 22.0).abs() < 1e-9);
    assert_eq!(flaky.calls(), 2);

    let events = sink.wait_for(2).await;
    let statuses: Vec<_> = events.iter().map(|e| e["status"].as_str().unwrap().to_string()).collect();
    assert!(statuses.contains(&"Failure".to_string()));
    assert!(statuses.contains(&"Success".to_string()));
}

#[tokio::test]
async fn test_scenario_every_provider_errors() {
    let (router, sink) = service(
        vec![
            MockProvider::failing("owm"),
            MockProvider::failing("apixu"),
            MockProvider::failing("wb"),
        ],
        ReadingFilter::PositiveOnly,
    );

    let (status, json) = request(&router, "/api/temperature/hue").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["city_name"], "hue");

    let events = sink.wait_for(1).await;
    assert_eq!(events[0]["status"], "Failure");
}

#[tokio::test]
async fn test_scenario_negative_reading_excluded() {
    let (router, sink) = service(
        vec![MockProvider::celsius("owm", -5.0), MockProvider::celsius("wb", 20.0)],
        ReadingFilter::PositiveOnly,
    );

    let (status, json) = request(&router, "/api/temperature/sapa").await;
    assert_eq!(status, StatusCode::OK);
    assert!((celsius(&json) - 20.0).abs() < 1e-9);

    let events = sink.wait_for(1).await;
    assert_eq!(events[0]["status"], "Success");
}

#[tokio::test]
async fn test_scenario_any_finite_filter_keeps_sub_zero() {
    let (router, _) = service(
        vec![MockProvider::celsius("owm", -5.0), MockProvider::celsius("wb", 20.0)],
        ReadingFilter::AnyFinite,
    );
    let (_, json) = request(&router, "/api/temperature/sapa").await;
    assert!((celsius(&json) - 7.5).abs() < 1e-9);
}

#[tokio::test]
async fn test_outcome_event_shape() {
    let (router, sink) = service(vec![MockProvider::celsius("owm", 30.0)], ReadingFilter::PositiveOnly);
    request(&router, "/api/temperature/hanoi").await;

    let events = sink.wait_for(1).await;
    let event = events[0].as_object().unwrap();
    assert_eq!(event.len(), 4);
    assert_eq!(event["endpoint"], "/api/temperature/hanoi");
    assert_eq!(event["ip"], "203.0.113.7");
    assert_eq!(event["status"], "Success");
    let time = event["time"].as_str().unwrap();
    assert!(chrono::NaiveDateTime::parse_from_str(time, "%Y-%m-%d %H:%M:%S").is_ok());
}

#[tokio::test]
async fn test_city_path_segment_reaches_every_provider() {
    let a = MockProvider::celsius("a", 10.0);
    let b = MockProvider::celsius("b", 12.0);
    let (router, _) = service(vec![a.clone(), b.clone()], ReadingFilter::PositiveOnly);
    request(&router, "/api/temperature/da-nang").await;
    assert_eq!(a.cities(), vec!["da-nang"]);
    assert_eq!(b.cities(), vec!["da-nang"]);
}

#[tokio::test(start_paused = true)]
async fn test_slow_provider_times_out_as_failure() {
    let slow = MockProvider::delayed("slow", 40.0, Duration::from_secs(600));
    let providers = provider_set(vec![MockProvider::celsius("owm", 18.0), slow.clone()]);
    let aggregate = Aggregator::new(providers, Duration::from_secs(2), ReadingFilter::PositiveOnly)
        .temperature("hanoi")
        .await;

    assert!((aggregate.celsius - 18.0).abs() < 1e-9);
    assert_eq!(aggregate.status, OutcomeStatus::Failure);
    assert_eq!(aggregate.readings[1].outcome, ReadingOutcome::TimedOut(Duration::from_secs(2)));
    assert_eq!(slow.calls(), 1);
}

#[tokio::test]
async fn test_concurrent_requests_each_publish_once() {
    let (router, sink) = service(
        vec![
            MockProvider::delayed("owm", 20.0, Duration::from_millis(20)),
            MockProvider::delayed("wb", 24.0, Duration::from_millis(5)),
        ],
        ReadingFilter::PositiveOnly,
    );

    let requests = (0..10).map(|i| {
        let router = router.clone();
        async move { request(&router, &format!("/api/temperature/city-{i}")).await }
    });
    let results = spawn_all(requests).await;
    for (status, json) in results {
        assert_eq!(status, StatusCode::OK);
        assert!((celsius(&json) - 22.0).abs() < 1e-9);
    }

    let events = sink.wait_for(10).await;
    assert_eq!(events.len(), 10);
}

/// Spawn every future and collect the outputs in order.
async fn spawn_all<F>(futs: impl Iterator<Item = F>) -> Vec<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    let handles: Vec<_> = futs.map(tokio::spawn).collect();
    let mut out = Vec::with_capacity(handles.len());
    for h in handles {
        out.push(h.await.unwrap());
    }
    out
}
