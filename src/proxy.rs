//! Framework-agnostic rendition of the `/api/proxy` HTTP surface.
//!
//! [`Proxy::handle`] turns an inbound request into a dispatched API call and answers with CORS
//! headers on every response. Upstream statuses pass through verbatim. Internal failures become a
//! generic `500` that never echoes credentials, tokens, or upstream error text.

// self
use crate::{
	_prelude::*,
	dispatch::{ApiResponse, Dispatcher, ResourceRequest, ResponseBody},
	token::{TokenManager, TokenSource},
};

/// `Access-Control-Allow-Origin` value.
pub const ALLOW_ORIGIN: &str = "*";
/// `Access-Control-Allow-Methods` value.
pub const ALLOW_METHODS: &str = "GET, POST, PUT, PATCH, OPTIONS";
/// `Access-Control-Allow-Headers` value.
pub const ALLOW_HEADERS: &str = "Content-Type, Authorization, Accept";
/// Mount point stripped from inbound paths.
pub const MOUNT_PREFIX: &str = "/api/proxy";
/// Query parameter naming the upstream path explicitly.
pub const PATH_PARAM: &str = "path";

const INTERNAL_ERROR: &str = "Internal proxy error";

/// Inbound proxy request.
#[derive(Clone, Debug, PartialEq)]
pub struct ProxyRequest {
	/// HTTP method.
	pub method: Method,
	/// Request path, including the mount prefix.
	pub path: String,
	/// Query parameters, including `path` when present.
	pub query: Vec<(String, String)>,
	/// JSON body.
	pub body: Option<Value>,
}
impl ProxyRequest {
	/// Creates a request for `path` without query or body.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self { method, path: path.into(), query: Vec::new(), body: None }
	}

	/// Builds a request from a full inbound URL.
	pub fn from_url(method: Method, url: &Url) -> Self {
		Self {
			method,
			path: url.path().to_owned(),
			query: url.query_pairs().map(|(key, value)| (key.into_owned(), value.into_owned())).collect(),
			body: None,
		}
	}

	/// Appends a query parameter.
	pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.query.push((key.into(), value.into()));

		self
	}

	/// Sets the JSON body.
	pub fn with_body(mut self, body: Value) -> Self {
		self.body = Some(body);

		self
	}

	/// Upstream endpoint: the `path` parameter, or the request path minus [`MOUNT_PREFIX`].
	///
	/// Always starts with `/`.
	pub fn upstream_endpoint(&self) -> String {
		let explicit = self
			.query
			.iter()
			.find(|(key, value)| key == PATH_PARAM && !value.is_empty())
			.map(|(_, value)| value.as_str());
		let raw = explicit.unwrap_or_else(|| {
			let path = self.path.split('?').next().unwrap_or_default();

			path.strip_prefix(MOUNT_PREFIX).unwrap_or(path)
		});

		if raw.starts_with('/') { raw.to_owned() } else { format!("/{raw}") }
	}

	/// Query forwarded upstream: everything except `path`.
	pub fn upstream_query(&self) -> Vec<(String, String)> {
		self.query.iter().filter(|(key, _)| key != PATH_PARAM).cloned().collect()
	}
}

/// Response produced by [`Proxy::handle`].
#[derive(Clone, Debug, PartialEq)]
pub struct ProxyResponse {
	/// HTTP status code.
	pub status: u16,
	/// Response headers, CORS headers included.
	pub headers: Vec<(&'static str, String)>,
	/// Response body.
	pub body: ResponseBody,
}
impl ProxyResponse {
	fn new(status: u16, body: ResponseBody) -> Self {
		let headers = vec![
			("Access-Control-Allow-Origin", ALLOW_ORIGIN.to_owned()),
			("Access-Control-Allow-Methods", ALLOW_METHODS.to_owned()),
			("Access-Control-Allow-Headers", ALLOW_HEADERS.to_owned()),
		];

		Self { status, headers, body }
	}

	fn error(status: u16, message: &str) -> Self {
		Self::new(status, ResponseBody::Json(serde_json::json!({ "error": message })))
			.with_header("Content-Type", "application/json")
	}

	fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
		self.headers.push((name, value.into()));

		self
	}

	/// First header named `name`, compared case-insensitively.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers
			.iter()
			.find(|(key, _)| key.eq_ignore_ascii_case(name))
			.map(|(_, value)| value.as_str())
	}
}
impl From<ApiResponse> for ProxyResponse {
	fn from(response: ApiResponse) -> Self {
		let content_type = response.content_type.unwrap_or_else(|| "application/json".into());

		Self::new(response.status, response.body).with_header("Content-Type", content_type)
	}
}

/// Proxy surface backed by a [`Dispatcher`].
pub struct Proxy<T = TokenManager>
where
	T: ?Sized + TokenSource,
{
	dispatcher: Arc<Dispatcher<T>>,
}
impl<T> Proxy<T>
where
	T: ?Sized + TokenSource,
{
	/// Creates a proxy forwarding through `dispatcher`.
	pub fn new(dispatcher: Arc<Dispatcher<T>>) -> Self {
		Self { dispatcher }
	}

	/// Answers one inbound request.
	pub async fn handle(&self, request: ProxyRequest) -> ProxyResponse {
		if request.method == Method::OPTIONS {
			return ProxyResponse::new(200, ResponseBody::Empty);
		}
		if ![Method::GET, Method::POST, Method::PUT, Method::PATCH].contains(&request.method) {
			return ProxyResponse::error(405, "Method not allowed")
				.with_header("Allow", ALLOW_METHODS);
		}

		let mut upstream = ResourceRequest::new(request.method.clone(), request.upstream_endpoint());

		upstream.query = request.upstream_query();

		if let Some(body) = request.body {
			upstream = upstream.with_payload(body);
		}

		tracing::info!(method = %upstream.method, endpoint = %upstream.endpoint, "Proxying request.");

		match self.dispatcher.request_resource(upstream).await {
			Ok(response) => response.into(),
			Err(Error::Authentication { status, .. }) => {
				tracing::warn!(?status, "Upstream rejected the proxied request.");

				ProxyResponse::error(status.unwrap_or(401), "Authentication failed")
			},
			Err(err) => {
				tracing::error!(error = %err, "Proxy request failed.");

				ProxyResponse::error(500, INTERNAL_ERROR)
			},
		}
	}
}
impl<T> Debug for Proxy<T>
where
	T: ?Sized + TokenSource,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Proxy").field("dispatcher", &self.dispatcher).finish()
	}
}
