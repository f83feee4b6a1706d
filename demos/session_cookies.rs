//! Demonstrates obtaining Xubio session cookies from the remote login service, serving repeat
//! lookups from the cache, and probing the session before use.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
// self
use xubio_session::{
	auth::{LoginCredentials, cookie_header},
	session::{LoginService, SessionCookieClient},
	url::Url,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let login_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/login");
			then.status(200).header("content-type", "application/json").body(
				"{\"success\":true,\"cookies\":[{\"name\":\"SESSION\",\"value\":\"demo-session\",\"domain\":\".xubio.com\",\"path\":\"/\",\"expires\":-1,\"httpOnly\":true,\"secure\":true,\"sameSite\":\"Lax\"}]}",
			);
		})
		.await;
	let _probe_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/dashboard/cardsdashboard").header("cookie", "SESSION=demo-session");
			then.status(200).header("content-type", "application/json").body("[]");
		})
		.await;
	let service = LoginService::new(Url::parse(&server.base_url())?);
	let client = SessionCookieClient::new(Arc::new(service))?
		.with_probe_url(Url::parse(&server.url("/api/dashboard/cardsdashboard"))?);
	let credentials = LoginCredentials::new("ops@example.com", "demo-password");
	let cookies = client.get_session_cookies(&credentials, false).await?;
	let cached = client.get_session_cookies(&credentials, false).await?;

	println!("Cookie header: {}.", cookie_header(&cached));
	println!("Session valid: {}.", client.validate_cookies(&cookies).await);

	login_mock.assert_calls_async(1).await;

	Ok(())
}
