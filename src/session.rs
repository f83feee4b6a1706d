//! Session cookie client.
//!
//! Cookies come from a [`SessionLogin`] provider, either the remote login service
//! ([`LoginService`]) or local browser automation, and are cached per username for a fixed
//! lifetime. [`SessionCookieClient::validate_cookies`] is advisory: every failure is reported as
//! `false`.

// crates.io
use reqwest::header::{ACCEPT, COOKIE};
// self
use crate::{
	_prelude::*,
	auth::{Cookie, LoginCredentials, cookie_header},
	cache::TtlCache,
	clock::Clock,
	error::ConfigError,
	http::{self, BufferedResponse, HttpClient},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	shape::{self, LoginServiceHealth},
};

/// Boxed future returned by [`SessionLogin`] implementations.
pub type LoginFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<Cookie>>> + 'a + Send>>;

/// Exchanges username/password credentials for session cookies.
pub trait SessionLogin
where
	Self: Send + Sync,
{
	/// Performs one login and returns the resulting cookies.
	fn login<'a>(&'a self, credentials: &'a LoginCredentials) -> LoginFuture<'a>;
}

/// Client for the remote login service (`POST /login`, `GET /health`).
#[derive(Clone, Debug)]
pub struct LoginService {
	http: HttpClient,
	base: Url,
	timeout: Duration,
}
impl LoginService {
	/// Production login service.
	pub const DEFAULT_URL: &str = "https://xubio-login.fly.dev";
	/// Deadline for one login call.
	pub const DEFAULT_TIMEOUT: Duration = Duration::seconds(60);

	/// Creates a client for the service rooted at `base`.
	pub fn new(base: Url) -> Self {
		Self { http: HttpClient::default(), base, timeout: Self::DEFAULT_TIMEOUT }
	}

	/// Replaces the HTTP client.
	pub fn with_http_client(mut self, http: HttpClient) -> Self {
		self.http = http;

		self
	}

	/// Overrides the login deadline.
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;

		self
	}

	/// Service base URL.
	pub fn base(&self) -> &Url {
		&self.base
	}

	/// Posts `credentials` to `/login` and returns the normalized cookies.
	pub async fn request_cookies(&self, credentials: &LoginCredentials) -> Result<Vec<Cookie>> {
		const OPERATION: &str = "Login service request";

		let url = http::join_path(&self.base, "/login")?;
		let body = serde_json::json!({
			"username": credentials.username,
			"password": credentials.password.expose(),
		});
		let call = async {
			let response = self
				.http
				.post(url.clone())
				.header(ACCEPT, "application/json")
				.json(&body)
				.send()
				.await
				.map_err(|err| http::classify_send_error(err, &url, OPERATION))?;

			BufferedResponse::read(response, &url).await
		};
		let response = tokio::time::timeout(http::std_duration(self.timeout), call)
			.await
			.map_err(|_| Error::Timeout { operation: OPERATION, after: Some(self.timeout) })??;

		if !response.status.is_success() {
			let status = response.status.as_u16();
			let message = shape::parse_error_message(&response.body)
				.unwrap_or_else(|| format!("HTTP {status}"));

			tracing::warn!(status, "Login service rejected the credentials.");

			return Err(Error::Authentication { status: Some(status), message });
		}

		Ok(shape::parse_login_reply(&response.body)?)
	}

	/// Queries `GET /health`.
	pub async fn health(&self) -> Result<LoginServiceHealth> {
		const OPERATION: &str = "Login service health check";

		let url = http::join_path(&self.base, "/health")?;
		let response = self
			.http
			.get(url.clone())
			.header(ACCEPT, "application/json")
			.send()
			.await
			.map_err(|err| http::classify_send_error(err, &url, OPERATION))?;
		let response = BufferedResponse::read(response, &url).await?;

		if !response.status.is_success() {
			let status = response.status.as_u16();

			return Err(Error::Authentication {
				status: Some(status),
				message: shape::parse_error_message(&response.body)
					.unwrap_or_else(|| format!("HTTP {status}")),
			});
		}

		Ok(shape::parse_health(&response.body)?)
	}
}
impl SessionLogin for LoginService {
	fn login<'a>(&'a self, credentials: &'a LoginCredentials) -> LoginFuture<'a> {
		Box::pin(self.request_cookies(credentials))
	}
}

/// Caching session cookie client.
pub struct SessionCookieClient {
	login: Arc<dyn SessionLogin>,
	http: HttpClient,
	probe_url: Url,
	cache: Arc<TtlCache<String, Vec<Cookie>>>,
	ttl: Duration,
	singleflight: AsyncMutex<()>,
}
impl SessionCookieClient {
	/// Cached cookie lifetime.
	pub const DEFAULT_TTL: Duration = Duration::minutes(55);
	/// Protected resource probed by [`SessionCookieClient::validate_cookies`].
	pub const DEFAULT_PROBE_URL: &str = "https://xubio.com/api/dashboard/cardsdashboard";

	/// Creates a client backed by `login`.
	pub fn new(login: Arc<dyn SessionLogin>) -> Result<Self> {
		let probe_url = Url::parse(Self::DEFAULT_PROBE_URL)
			.map_err(|source| ConfigError::InvalidUrl { var: "XUBIO_PROBE_URL", source })?;

		Ok(Self {
			login,
			http: HttpClient::without_redirects()?,
			probe_url,
			cache: Arc::new(TtlCache::default()),
			ttl: Self::DEFAULT_TTL,
			singleflight: AsyncMutex::new(()),
		})
	}

	/// Overrides the validation probe.
	pub fn with_probe_url(mut self, probe_url: Url) -> Self {
		self.probe_url = probe_url;

		self
	}

	/// Replaces the HTTP client used for validation probes.
	///
	/// The client should not follow redirects, or an expired session redirected to a login page
	/// reads as valid.
	pub fn with_http_client(mut self, http: HttpClient) -> Self {
		self.http = http;

		self
	}

	/// Shares an existing cookie cache.
	pub fn with_cache(mut self, cache: Arc<TtlCache<String, Vec<Cookie>>>) -> Self {
		self.cache = cache;

		self
	}

	/// Replaces the cache with an empty one driven by `clock`.
	pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
		self.with_cache(Arc::new(TtlCache::new(clock)))
	}

	/// Overrides the cached cookie lifetime.
	pub fn with_ttl(mut self, ttl: Duration) -> Self {
		self.ttl = ttl;

		self
	}

	/// Underlying cache.
	pub fn cache(&self) -> &Arc<TtlCache<String, Vec<Cookie>>> {
		&self.cache
	}

	/// Cached cookies for `username`, if still fresh.
	pub fn cached(&self, username: &str) -> Option<Vec<Cookie>> {
		self.cache.get(&username.to_owned())
	}

	/// Returns session cookies for `credentials`, logging in on a miss or when `force_refresh` is set.
	pub async fn get_session_cookies(
		&self,
		credentials: &LoginCredentials,
		force_refresh: bool,
	) -> Result<Vec<Cookie>> {
		const KIND: FlowKind = FlowKind::Session;

		let span = FlowSpan::new(KIND, "get_session_cookies");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let key = credentials.username.clone();

				if !force_refresh && let Some(hit) = self.cache.get(&key) {
					obs::record_flow_outcome(KIND, FlowOutcome::CacheHit);

					return Ok(hit);
				}

				credentials.ensure_complete()?;

				let _singleflight = self.singleflight.lock().await;

				if !force_refresh && let Some(hit) = self.cache.get(&key) {
					obs::record_flow_outcome(KIND, FlowOutcome::CacheHit);

					return Ok(hit);
				}

				let cookies = self.login.login(credentials).await?;

				self.cache.set(key, cookies.clone(), self.ttl);

				tracing::info!(count = cookies.len(), "Obtained session cookies.");

				Ok(cookies)
			})
			.await;

		obs::record_result(KIND, &result);

		result
	}

	/// Drops the cached cookies for `username`.
	pub fn invalidate(&self, username: &str) {
		self.cache.invalidate(&username.to_owned());
	}

	/// Drops whatever the cache holds.
	pub fn reset(&self) {
		self.cache.reset();
	}

	/// Probes a protected resource with `cookies`; never fails.
	pub async fn validate_cookies(&self, cookies: &[Cookie]) -> bool {
		let response = self
			.http
			.get(self.probe_url.clone())
			.header(COOKIE, cookie_header(cookies))
			.header(ACCEPT, "application/json")
			.send()
			.await;

		match response {
			Ok(response) => {
				let valid = response.status().is_success();

				tracing::debug!(status = response.status().as_u16(), valid, "Cookie validation probe finished.");

				valid
			},
			Err(err) => {
				tracing::warn!(host = %http::host_of(&self.probe_url), error = %err, "Cookie validation probe failed.");

				false
			},
		}
	}
}
impl Debug for SessionCookieClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionCookieClient")
			.field("probe_url", &self.probe_url.as_str())
			.field("ttl", &self.ttl)
			.field("cache", &self.cache)
			.finish()
	}
}
