// std
use std::sync::Arc;
// crates.io
use httpmock::prelude::*;
use time::Duration;
// self
use xubio_session::{
	auth::ClientCredentials,
	clock::ManualClock,
	error::Error,
	http::HttpClient,
	token::TokenManager,
	url::Url,
};

const CLIENT_ID: &str = "client-id";
const CLIENT_SECRET: &str = "client-secret";
// base64("client-id:client-secret")
const BASIC: &str = "Basic Y2xpZW50LWlkOmNsaWVudC1zZWNyZXQ=";

fn build_manager(server: &MockServer, clock: &ManualClock) -> TokenManager {
	let endpoint =
		Url::parse(&server.url("/TokenEndpoint")).expect("Mock token endpoint should parse.");

	TokenManager::new(endpoint)
		.with_credentials(ClientCredentials::new(CLIENT_ID, CLIENT_SECRET))
		.with_http_client(HttpClient::new().expect("HTTP client should build."))
		.with_clock(Arc::new(clock.clone()))
}

#[tokio::test]
async fn token_is_cached_until_renewal_point() {
	let server = MockServer::start_async().await;
	let clock = ManualClock::default();
	let manager = build_manager(&server, &clock);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/TokenEndpoint")
				.header("authorization", BASIC)
				.header("content-type", "application/x-www-form-urlencoded")
				.body("grant_type=client_credentials");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"abc123\",\"expires_in\":3600}");
		})
		.await;
	let first = manager.get_valid_token().await.expect("Initial token request should succeed.");

	assert_eq!(first.expose(), "abc123");

	clock.advance(Duration::seconds(3_239));

	let second = manager.get_valid_token().await.expect("Cached token should be served.");

	assert_eq!(second.expose(), "abc123");

	mock.assert_calls_async(1).await;

	clock.advance(Duration::seconds(1));

	manager.get_valid_token().await.expect("Renewed token request should succeed.");

	mock.assert_calls_async(2).await;
}

#[tokio::test]
async fn expired_token_is_fetched_again_after_an_hour() {
	let server = MockServer::start_async().await;
	let clock = ManualClock::default();
	let manager = build_manager(&server, &clock);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/TokenEndpoint");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"abc123\",\"expires_in\":3600}");
		})
		.await;

	manager.get_valid_token().await.expect("Initial token request should succeed.");

	assert!(manager.is_valid());

	clock.advance(Duration::seconds(3_601));

	assert!(!manager.is_valid());

	manager.get_valid_token().await.expect("Expired token should be replaced.");

	mock.assert_calls_async(2).await;
}

#[tokio::test]
async fn legacy_token_alias_and_default_lifetime_are_accepted() {
	let server = MockServer::start_async().await;
	let clock = ManualClock::default();
	let manager = build_manager(&server, &clock);
	let _mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/TokenEndpoint");
			then.status(200).header("content-type", "application/json").body("{\"token\":\"legacy\"}");
		})
		.await;
	let token = manager.get_valid_token().await.expect("Legacy reply should be accepted.");
	let cached = manager.cached().expect("Token should be cached.");

	assert_eq!(token.expose(), "legacy");
	assert_eq!(cached.expires_at - cached.issued_at, Duration::seconds(3_240));
}

#[tokio::test]
async fn concurrent_misses_share_one_request() {
	let server = MockServer::start_async().await;
	let clock = ManualClock::default();
	let manager = build_manager(&server, &clock);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/TokenEndpoint");
			then.status(200)
				.delay(std::time::Duration::from_millis(100))
				.header("content-type", "application/json")
				.body("{\"access_token\":\"shared\",\"expires_in\":600}");
		})
		.await;
	let (first, second) = tokio::join!(manager.get_valid_token(), manager.get_valid_token());

	assert_eq!(first.expect("First caller should succeed.").expose(), "shared");
	assert_eq!(second.expect("Second caller should succeed.").expose(), "shared");

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn force_refresh_always_hits_the_endpoint() {
	let server = MockServer::start_async().await;
	let clock = ManualClock::default();
	let manager = build_manager(&server, &clock);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/TokenEndpoint");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"fresh\",\"expires_in\":3600}");
		})
		.await;

	manager.get_valid_token().await.expect("Initial token request should succeed.");
	manager.force_refresh().await.expect("Forced refresh should succeed.");

	mock.assert_calls_async(2).await;
}

#[tokio::test]
async fn rejected_credentials_surface_status_and_body() {
	let server = MockServer::start_async().await;
	let clock = ManualClock::default();
	let manager = build_manager(&server, &clock);
	let _mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/TokenEndpoint");
			then.status(401).body("invalid_client");
		})
		.await;
	let err = manager.get_valid_token().await.expect_err("Rejected credentials should fail.");

	match err {
		Error::Authentication { status, message } => {
			assert_eq!(status, Some(401));
			assert_eq!(message, "invalid_client");
		},
		other => panic!("Unexpected error variant: {other:?}."),
	}

	assert!(!manager.is_valid());
}

#[tokio::test]
async fn reply_without_token_is_a_protocol_error() {
	let server = MockServer::start_async().await;
	let clock = ManualClock::default();
	let manager = build_manager(&server, &clock);
	let _mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/TokenEndpoint");
			then.status(200).header("content-type", "application/json").body("{\"expires_in\":3600}");
		})
		.await;
	let err = manager.get_valid_token().await.expect_err("Missing token should fail.");

	assert!(matches!(err, Error::Protocol(_)), "Unexpected error: {err:?}.");
	assert!(!err.to_string().contains(CLIENT_SECRET));
}

#[tokio::test]
async fn oversized_lifetime_is_capped_instead_of_overflowing() {
	let server = MockServer::start_async().await;
	let clock = ManualClock::default();
	let manager = build_manager(&server, &clock);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/TokenEndpoint");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"abc\",\"expires_in\":1000000000000}");
		})
		.await;
	let token = manager.get_valid_token().await.expect("Oversized lifetime should be accepted.");
	let cached = manager.cached().expect("Token should be cached.");

	assert_eq!(token.expose(), "abc");
	assert_eq!(cached.expires_at - cached.issued_at, Duration::seconds(77_760));

	clock.advance(Duration::days(1));

	manager.get_valid_token().await.expect("Capped token should be renewed.");

	mock.assert_calls_async(2).await;
}
