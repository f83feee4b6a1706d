//! Shared HTTP transport and failure classification.
//!
//! Every outbound call in the crate goes through [`HttpClient`], and every transport failure is
//! classified by [`classify_send_error`] so timeouts, unreachable hosts, and builder problems
//! surface as the same [`Error`] variants regardless of which layer issued the call.

// std
use std::ops::Deref;
// crates.io
use reqwest::{Response, header::CONTENT_TYPE, redirect::Policy};
// self
use crate::{_prelude::*, error::ConfigError};

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// [`HttpClient::new`] follows redirects like a browser `fetch`. Session probes must see the
/// redirect an expired session produces, so they use [`HttpClient::without_redirects`]. Bring a
/// custom [`ReqwestClient`] through [`HttpClient::with_client`] when proxies or TLS settings need
/// tuning.
#[derive(Clone, Debug, Default)]
pub struct HttpClient(pub ReqwestClient);
impl HttpClient {
	/// Builds a client with reqwest's default redirect policy.
	pub fn new() -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder().build()?;

		Ok(Self(client))
	}

	/// Builds a client that never follows redirects.
	pub fn without_redirects() -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder().redirect(Policy::none()).build()?;

		Ok(Self(client))
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
impl AsRef<ReqwestClient> for HttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
impl Deref for HttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

/// Fully buffered HTTP response.
#[derive(Clone, Debug)]
pub(crate) struct BufferedResponse {
	pub(crate) status: StatusCode,
	pub(crate) content_type: Option<String>,
	pub(crate) body: Vec<u8>,
}
impl BufferedResponse {
	/// Reads the whole body of `response`.
	pub(crate) async fn read(response: Response, url: &Url) -> Result<Self> {
		let status = response.status();
		let content_type = response
			.headers()
			.get(CONTENT_TYPE)
			.and_then(|value| value.to_str().ok())
			.map(str::to_owned);
		let body = response
			.bytes()
			.await
			.map_err(|err| classify_send_error(err, url, "Response body read"))?
			.to_vec();

		Ok(Self { status, content_type, body })
	}

	/// Body as lossy UTF-8 text, trimmed.
	pub(crate) fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).trim().to_owned()
	}
}

/// Returns the host component of `url` for error messages.
pub fn host_of(url: &Url) -> String {
	match (url.host_str(), url.port()) {
		(Some(host), Some(port)) => format!("{host}:{port}"),
		(Some(host), None) => host.to_owned(),
		_ => url.as_str().to_owned(),
	}
}

/// Appends `path` to the path of `base`, keeping any prefix `base` already carries.
///
/// Unlike [`Url::join`], `https://xubio.com/API/1.1` + `/clienteBean` keeps the `/API/1.1` prefix.
pub fn join_path(base: &Url, path: &str) -> Result<Url, ConfigError> {
	let joined = format!("{}/{}", base.as_str().trim_end_matches('/'), path.trim_start_matches('/'));

	Url::parse(&joined)
		.map_err(|source| ConfigError::InvalidEndpoint { endpoint: path.to_owned(), source })
}

/// Maps a reqwest failure for a call to `url` into the crate taxonomy.
pub fn classify_send_error(err: ReqwestError, url: &Url, operation: &'static str) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return Error::Timeout { operation, after: None };
	}

	Error::network(host_of(url), err)
}

/// Converts a `time` duration into the `std` duration expected by tokio timers.
pub(crate) fn std_duration(duration: Duration) -> std::time::Duration {
	if duration.is_negative() { std::time::Duration::ZERO } else { duration.unsigned_abs() }
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn host_includes_explicit_port() {
		let url = Url::parse("http://127.0.0.1:8080/login").expect("Fixture URL should parse.");

		assert_eq!(host_of(&url), "127.0.0.1:8080");

		let url = Url::parse("https://xubio-login.fly.dev/login").expect("Fixture URL should parse.");

		assert_eq!(host_of(&url), "xubio-login.fly.dev");
	}

	#[test]
	fn join_keeps_base_prefix() {
		let base = Url::parse("https://xubio.com/API/1.1").expect("Fixture URL should parse.");

		assert_eq!(
			join_path(&base, "/clienteBean").expect("Join should succeed.").as_str(),
			"https://xubio.com/API/1.1/clienteBean"
		);

		let base = Url::parse("https://xubio-login.fly.dev/").expect("Fixture URL should parse.");

		assert_eq!(
			join_path(&base, "login").expect("Join should succeed.").as_str(),
			"https://xubio-login.fly.dev/login"
		);
	}

	#[test]
	fn negative_durations_clamp_to_zero() {
		assert_eq!(std_duration(Duration::seconds(-5)), std::time::Duration::ZERO);
		assert_eq!(std_duration(Duration::milliseconds(1_500)), std::time::Duration::from_millis(1_500));
	}

	#[tokio::test]
	async fn unreachable_host_is_a_network_error() {
		let client = HttpClient::new().expect("Client should build.");
		let port = std::net::TcpListener::bind("127.0.0.1:0")
			.and_then(|listener| listener.local_addr())
			.expect("Ephemeral port should be available.")
			.port();
		let url = Url::parse(&format!("http://127.0.0.1:{port}/health"))
			.expect("Fixture URL should parse.");
		let err = client
			.get(url.clone())
			.send()
			.await
			.map(|_| ())
			.map_err(|err| classify_send_error(err, &url, "Probe"))
			.expect_err("Nothing should listen on a released port.");

		match err {
			Error::Network { host, .. } => assert_eq!(host, format!("127.0.0.1:{port}")),
			other => panic!("Unexpected error variant: {other:?}."),
		}
	}
}
