//! Client-credentials token manager.
//!
//! [`TokenManager`] keeps at most one bearer token in memory. Tokens are renewed early: a grant
//! advertising `expires_in = E` seconds is cached for `0.9 * E`, so callers never hold a token in
//! the last tenth of its lifetime. Concurrent cache misses share one token request through a
//! single-flight guard.

// crates.io
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
// self
use crate::{
	_prelude::*,
	auth::{ClientCredentials, Secret},
	cache::{TtlCache, expiry_after},
	clock::Clock,
	error::ConfigError,
	http::{self, BufferedResponse, HttpClient},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	shape,
};

/// Boxed future returned by [`TokenSource`] implementations.
pub type TokenFuture<'a> = Pin<Box<dyn Future<Output = Result<Secret>> + 'a + Send>>;

/// Fraction of the advertised lifetime a token is trusted for, in per-mille.
pub const RENEWAL_PERMILLE: i128 = 900;

/// Supplies bearer tokens to the request dispatcher.
pub trait TokenSource
where
	Self: 'static + Send + Sync,
{
	/// Returns a token that is valid right now, fetching one when needed.
	fn valid_token(&self) -> TokenFuture<'_>;

	/// Discards any cached token and fetches a new one.
	fn refresh_token(&self) -> TokenFuture<'_>;
}

/// Token held by the manager's cache.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedToken {
	/// Bearer token.
	pub token: Secret,
	/// Instant the grant was received.
	pub issued_at: OffsetDateTime,
	/// Instant the manager stops serving the token.
	pub expires_at: OffsetDateTime,
}

/// Caching client-credentials token manager.
pub struct TokenManager {
	http: HttpClient,
	endpoint: Url,
	credentials: Option<ClientCredentials>,
	cache: Arc<TtlCache<String, CachedToken>>,
	singleflight: AsyncMutex<()>,
}
impl TokenManager {
	/// Production token endpoint.
	pub const DEFAULT_ENDPOINT: &str = "https://xubio.com/API/1.1/TokenEndpoint";

	/// Creates a manager for `endpoint` with no credentials configured yet.
	pub fn new(endpoint: Url) -> Self {
		Self {
			http: HttpClient::default(),
			endpoint,
			credentials: None,
			cache: Arc::new(TtlCache::default()),
			singleflight: AsyncMutex::new(()),
		}
	}

	/// Sets the client credentials used for the grant.
	pub fn with_credentials(mut self, credentials: ClientCredentials) -> Self {
		self.credentials = Some(credentials);

		self
	}

	/// Replaces the HTTP client.
	pub fn with_http_client(mut self, http: HttpClient) -> Self {
		self.http = http;

		self
	}

	/// Shares an existing token cache.
	pub fn with_cache(mut self, cache: Arc<TtlCache<String, CachedToken>>) -> Self {
		self.cache = cache;

		self
	}

	/// Replaces the cache with an empty one driven by `clock`.
	pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
		self.with_cache(Arc::new(TtlCache::new(clock)))
	}

	/// Token endpoint this manager posts to.
	pub fn endpoint(&self) -> &Url {
		&self.endpoint
	}

	/// Underlying cache.
	pub fn cache(&self) -> &Arc<TtlCache<String, CachedToken>> {
		&self.cache
	}

	/// Currently cached, unexpired token.
	pub fn cached(&self) -> Option<CachedToken> {
		let credentials = self.credentials.as_ref()?;

		self.cache.get(&credentials.client_id)
	}

	/// Returns `true` when a cached token can be served without network I/O.
	pub fn is_valid(&self) -> bool {
		self.cached().is_some()
	}

	/// Drops the cached token.
	pub fn reset(&self) {
		self.cache.reset();
	}

	/// Returns a valid token, requesting a new one only on a cache miss.
	pub async fn get_valid_token(&self) -> Result<Secret> {
		const KIND: FlowKind = FlowKind::Token;

		let span = FlowSpan::new(KIND, "get_valid_token");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let credentials = self.credentials()?;

				if let Some(hit) = self.cache.get(&credentials.client_id) {
					obs::record_flow_outcome(KIND, FlowOutcome::CacheHit);

					return Ok(hit.token);
				}

				let _singleflight = self.singleflight.lock().await;

				// Another caller may have filled the cache while this one waited.
				if let Some(hit) = self.cache.get(&credentials.client_id) {
					obs::record_flow_outcome(KIND, FlowOutcome::CacheHit);

					return Ok(hit.token);
				}

				self.fetch(credentials).await.map(|cached| cached.token)
			})
			.await;

		obs::record_result(KIND, &result);

		result
	}

	/// Discards the cached token and requests a new one.
	pub async fn force_refresh(&self) -> Result<Secret> {
		const KIND: FlowKind = FlowKind::Token;

		let span = FlowSpan::new(KIND, "force_refresh");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let credentials = self.credentials()?;
				let _singleflight = self.singleflight.lock().await;

				self.cache.invalidate(&credentials.client_id);
				self.fetch(credentials).await.map(|cached| cached.token)
			})
			.await;

		obs::record_result(KIND, &result);

		result
	}

	fn credentials(&self) -> Result<&ClientCredentials> {
		let credentials = self
			.credentials
			.as_ref()
			.ok_or(ConfigError::MissingSetting { name: "XUBIO_CLIENT_ID" })?;

		if credentials.client_id.is_empty() {
			return Err(ConfigError::MissingSetting { name: "XUBIO_CLIENT_ID" }.into());
		}
		if credentials.client_secret.is_blank() {
			return Err(ConfigError::MissingSetting { name: "XUBIO_SECRET_ID" }.into());
		}

		Ok(credentials)
	}

	async fn fetch(&self, credentials: &ClientCredentials) -> Result<CachedToken> {
		const OPERATION: &str = "Token request";

		let response = self
			.http
			.post(self.endpoint.clone())
			.header(AUTHORIZATION, credentials.basic_authorization().expose())
			.header(CONTENT_TYPE, "application/x-www-form-urlencoded")
			.header(ACCEPT, "application/json")
			.body("grant_type=client_credentials")
			.send()
			.await
			.map_err(|err| http::classify_send_error(err, &self.endpoint, OPERATION))?;
		let response = BufferedResponse::read(response, &self.endpoint).await?;

		if !response.status.is_success() {
			let status = response.status.as_u16();
			let body = response.text();

			tracing::warn!(status, "Token endpoint rejected the client credentials.");

			return Err(Error::Authentication {
				status: Some(status),
				message: if body.is_empty() { format!("HTTP {status}") } else { body },
			});
		}

		let grant = shape::parse_token_grant(&response.body)?;
		let issued_at = self.cache.clock().now();
		let cached = CachedToken {
			token: grant.access_token,
			issued_at,
			expires_at: expiry_after(issued_at, renewal_window(grant.expires_in)),
		};

		self.cache.set_until(credentials.client_id.clone(), cached.clone(), cached.expires_at);

		tracing::debug!(expires_at = %cached.expires_at, "Cached new access token.");

		Ok(cached)
	}
}
impl TokenSource for TokenManager {
	fn valid_token(&self) -> TokenFuture<'_> {
		Box::pin(self.get_valid_token())
	}

	fn refresh_token(&self) -> TokenFuture<'_> {
		Box::pin(self.force_refresh())
	}
}
impl Debug for TokenManager {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenManager")
			.field("endpoint", &self.endpoint.as_str())
			.field("client_id", &self.credentials.as_ref().map(|c| c.client_id.as_str()))
			.field("cache", &self.cache)
			.finish()
	}
}

/// Portion of `expires_in` during which a token is served from cache.
pub fn renewal_window(expires_in: Duration) -> Duration {
	let millis = expires_in.whole_milliseconds() * RENEWAL_PERMILLE / 1_000;

	Duration::milliseconds(i64::try_from(millis).unwrap_or(i64::MAX))
}
