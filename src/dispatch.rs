//! Bearer-authenticated request dispatcher.
//!
//! Every request asks its [`TokenSource`] for a valid token, sends once, and on `401` forces a
//! single token refresh followed by a single retry. Identical concurrent `GET`s are coalesced
//! through [`PendingRegistry`]: all callers observe the outcome of one upstream call.

pub mod pending;

pub use pending::PendingRegistry;

// crates.io
use futures::future::FutureExt;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
// self
use crate::{
	_prelude::*,
	auth::Secret,
	http::{self, BufferedResponse, HttpClient},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	shape,
	token::{TokenManager, TokenSource},
};

/// Outbound API request description.
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceRequest {
	/// Endpoint path relative to the API base (for example `/clienteBean`).
	pub endpoint: String,
	/// HTTP method.
	pub method: Method,
	/// Optional JSON body, sent for non-`GET` methods.
	pub payload: Option<Value>,
	/// Query parameters, in insertion order.
	pub query: Vec<(String, String)>,
}
impl ResourceRequest {
	/// Creates a request without payload or query.
	pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
		Self { endpoint: endpoint.into(), method, payload: None, query: Vec::new() }
	}

	/// Shorthand for a `GET` request.
	pub fn get(endpoint: impl Into<String>) -> Self {
		Self::new(Method::GET, endpoint)
	}

	/// Shorthand for a `POST` request carrying `payload`.
	pub fn post(endpoint: impl Into<String>, payload: Value) -> Self {
		Self::new(Method::POST, endpoint).with_payload(payload)
	}

	/// Sets the JSON body.
	pub fn with_payload(mut self, payload: Value) -> Self {
		self.payload = Some(payload);

		self
	}

	/// Appends a query parameter.
	pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.query.push((key.into(), value.into()));

		self
	}

	/// Coalescing key for `GET` requests; `None` for every other method.
	///
	/// The key is `METHOD:endpoint:query` with the query form-urlencoded in insertion order, so
	/// identical parameter lists always map to the same key.
	pub fn dedup_key(&self) -> Option<String> {
		if self.method != Method::GET {
			return None;
		}

		let query = url::form_urlencoded::Serializer::new(String::new())
			.extend_pairs(self.query.iter())
			.finish();

		Some(format!("{}:{}:{query}", self.method, self.endpoint))
	}

	fn has_body(&self) -> bool {
		self.payload.is_some() && self.method != Method::GET
	}
}

/// Decoded response body.
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseBody {
	/// JSON body (an empty object when the declared JSON failed to parse).
	Json(Value),
	/// Non-JSON body.
	Text(String),
	/// No body.
	Empty,
}

/// Upstream response handed back to callers, whatever its status.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiResponse {
	/// HTTP status code.
	pub status: u16,
	/// `Content-Type` header, when present.
	pub content_type: Option<String>,
	/// Decoded body.
	pub body: ResponseBody,
}
impl ApiResponse {
	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// JSON body, when the response carried one.
	pub fn json(&self) -> Option<&Value> {
		match &self.body {
			ResponseBody::Json(value) => Some(value),
			_ => None,
		}
	}

	fn from_buffered(response: BufferedResponse) -> Self {
		let is_json = response
			.content_type
			.as_deref()
			.is_some_and(|value| value.to_ascii_lowercase().contains("application/json"));
		let body = if is_json {
			ResponseBody::Json(
				serde_json::from_slice(&response.body)
					.unwrap_or_else(|_| Value::Object(Default::default())),
			)
		} else if response.body.is_empty() {
			ResponseBody::Empty
		} else {
			ResponseBody::Text(response.text())
		};

		Self { status: response.status.as_u16(), content_type: response.content_type, body }
	}

	fn rejection_message(&self) -> String {
		let message = match &self.body {
			ResponseBody::Json(value) => serde_json::to_vec(value)
				.ok()
				.and_then(|bytes| shape::parse_error_message(&bytes)),
			ResponseBody::Text(text) => Some(text.clone()),
			ResponseBody::Empty => None,
		};

		message.unwrap_or_else(|| format!("HTTP {}", self.status))
	}
}

/// Sends API requests with bearer tokens, one `401` retry, and `GET` coalescing.
pub struct Dispatcher<T = TokenManager>
where
	T: ?Sized + TokenSource,
{
	http: HttpClient,
	base: Url,
	tokens: Arc<T>,
	pending: PendingRegistry,
}
impl<T> Dispatcher<T>
where
	T: ?Sized + TokenSource,
{
	/// Production API base.
	pub const DEFAULT_BASE: &str = "https://xubio.com/API/1.1";

	/// Creates a dispatcher rooted at `base`.
	pub fn new(base: Url, tokens: Arc<T>) -> Self {
		Self { http: HttpClient::default(), base, tokens, pending: PendingRegistry::default() }
	}

	/// Replaces the HTTP client.
	pub fn with_http_client(mut self, http: HttpClient) -> Self {
		self.http = http;

		self
	}

	/// API base URL.
	pub fn base(&self) -> &Url {
		&self.base
	}

	/// Token source used for every request.
	pub fn tokens(&self) -> &Arc<T> {
		&self.tokens
	}

	/// Registry of in-flight `GET`s.
	pub fn pending(&self) -> &PendingRegistry {
		&self.pending
	}

	/// Dispatches `request`, returning the upstream response for any status except a repeated `401`.
	pub async fn request_resource(&self, request: ResourceRequest) -> Result<ApiResponse> {
		const KIND: FlowKind = FlowKind::Dispatch;

		let span = FlowSpan::new(KIND, "request_resource");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let prepared = self.prepare(&request)?;
				let http = self.http.clone();
				let tokens = self.tokens.clone();

				match request.dedup_key() {
					Some(key) => {
						self.pending
							.join_or_start(key, move || execute(http, tokens, prepared).boxed())
							.await
					},
					None => execute(http, tokens, prepared).await,
				}
			})
			.await;

		obs::record_result(KIND, &result);

		result
	}

	fn prepare(&self, request: &ResourceRequest) -> Result<PreparedRequest> {
		let mut url = http::join_path(&self.base, &request.endpoint)?;

		if !request.query.is_empty() {
			url.query_pairs_mut().extend_pairs(request.query.iter());
		}

		let body = if request.has_body() { request.payload.as_ref().map(Value::to_string) } else { None };

		Ok(PreparedRequest { method: request.method.clone(), url, body })
	}
}
impl<T> Debug for Dispatcher<T>
where
	T: ?Sized + TokenSource,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Dispatcher")
			.field("base", &self.base.as_str())
			.field("pending", &self.pending)
			.finish()
	}
}

#[derive(Clone, Debug)]
struct PreparedRequest {
	method: Method,
	url: Url,
	body: Option<String>,
}

async fn execute<T>(http: HttpClient, tokens: Arc<T>, request: PreparedRequest) -> Result<ApiResponse>
where
	T: ?Sized + TokenSource,
{
	let token = tokens.valid_token().await?;
	let first = send(&http, &request, &token).await?;

	if first.status != StatusCode::UNAUTHORIZED.as_u16() {
		return Ok(first);
	}

	tracing::warn!(url = %request.url, "Upstream answered 401; refreshing the token once.");

	let token = tokens.refresh_token().await?;
	let retry = send(&http, &request, &token).await?;

	if retry.status == StatusCode::UNAUTHORIZED.as_u16() {
		return Err(Error::Authentication { status: Some(retry.status), message: retry.rejection_message() });
	}

	Ok(retry)
}

async fn send(http: &HttpClient, request: &PreparedRequest, token: &Secret) -> Result<ApiResponse> {
	const OPERATION: &str = "API request";

	let mut builder = http
		.request(request.method.clone(), request.url.clone())
		.header(AUTHORIZATION, format!("Bearer {}", token.expose()))
		.header(ACCEPT, "application/json");

	if let Some(body) = &request.body {
		builder = builder.header(CONTENT_TYPE, "application/json").body(body.clone());
	}

	let response = builder
		.send()
		.await
		.map_err(|err| http::classify_send_error(err, &request.url, OPERATION))?;
	let response = BufferedResponse::read(response, &request.url).await?;

	Ok(ApiResponse::from_buffered(response))
}
