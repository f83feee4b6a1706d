//! W3C WebDriver driver for [`BrowserLauncher`]/[`BrowserSession`].
//!
//! Speaks the HTTP wire protocol of chromedriver, geckodriver, and Selenium; no browser library
//! is linked into the process.

// crates.io
use serde::de::DeserializeOwned;
use tokio::sync::oneshot;
// self
use crate::{
	_prelude::*,
	auth::Cookie,
	browser::{BrowserError, BrowserFuture, BrowserLauncher, BrowserSession},
	http::{self, HttpClient},
	shape::{self, RawCookie},
};

/// JSON key of a W3C element reference.
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

#[derive(Deserialize)]
struct Reply<T> {
	value: T,
}

#[derive(Deserialize)]
struct NewSession {
	#[serde(rename = "sessionId")]
	session_id: String,
}

#[derive(Deserialize)]
struct WireError {
	#[serde(default)]
	error: String,
	#[serde(default)]
	message: String,
}

/// Launches browsers through a WebDriver endpoint.
#[derive(Clone, Debug)]
pub struct WebDriverLauncher {
	http: HttpClient,
	endpoint: Url,
	capabilities: Value,
	poll_interval: Duration,
}
impl WebDriverLauncher {
	/// Default chromedriver address.
	pub const DEFAULT_ENDPOINT: &str = "http://localhost:9515";

	/// Creates a launcher for the driver at `endpoint` requesting headless Chrome.
	pub fn new(endpoint: Url) -> Self {
		Self {
			http: HttpClient::default(),
			endpoint,
			capabilities: Self::headless_chrome(),
			poll_interval: Duration::milliseconds(250),
		}
	}

	/// Replaces the HTTP client.
	pub fn with_http_client(mut self, http: HttpClient) -> Self {
		self.http = http;

		self
	}

	/// Replaces the `alwaysMatch` capabilities.
	pub fn with_capabilities(mut self, capabilities: Value) -> Self {
		self.capabilities = capabilities;

		self
	}

	/// Delay between element lookups while waiting for a selector.
	pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
		self.poll_interval = poll_interval;

		self
	}

	/// Headless Chrome capabilities suitable for containers.
	pub fn headless_chrome() -> Value {
		serde_json::json!({
			"browserName": "chrome",
			"goog:chromeOptions": {
				"args": [
					"--headless=new",
					"--no-sandbox",
					"--disable-setuid-sandbox",
					"--disable-dev-shm-usage",
					"--disable-gpu",
					"--window-size=1280,800",
				],
			},
		})
	}

	async fn start(&self) -> Result<Box<dyn BrowserSession>, BrowserError> {
		let url = http::join_path(&self.endpoint, "/session")
			.map_err(|err| BrowserError::Command { command: "new session", message: err.to_string() })?;
		let body = serde_json::json!({ "capabilities": { "alwaysMatch": self.capabilities } });
		let created: NewSession = exchange(&self.http, Method::POST, url, Some(body), "new session").await?;

		tracing::debug!(session_id = %created.session_id, "WebDriver session started.");

		Ok(Box::new(WebDriverSession {
			http: self.http.clone(),
			session_url: format!(
				"{}/session/{}",
				self.endpoint.as_str().trim_end_matches('/'),
				created.session_id
			),
			poll_interval: self.poll_interval,
		}))
	}
}
impl BrowserLauncher for WebDriverLauncher {
	/// Starts the session on a detached task; a session that arrives after the caller stopped
	/// waiting is deleted instead of left running.
	fn launch(&self) -> BrowserFuture<'_, Box<dyn BrowserSession>> {
		let launcher = self.clone();
		let (tx, rx) = oneshot::channel();

		tokio::spawn(async move {
			if let Err(Ok(orphan)) = tx.send(launcher.start().await) {
				tracing::warn!("WebDriver session started after its launch was abandoned; deleting it.");

				if let Err(err) = orphan.close().await {
					tracing::warn!(error = %err, "Failed to delete the abandoned WebDriver session.");
				}
			}
		});

		Box::pin(async move {
			rx.await.map_err(|_| BrowserError::Command {
				command: "new session",
				message: "launch task ended without a result".into(),
			})?
		})
	}
}

/// One WebDriver session.
#[derive(Debug)]
struct WebDriverSession {
	http: HttpClient,
	session_url: String,
	poll_interval: Duration,
}
impl WebDriverSession {
	async fn command<T>(
		&self,
		method: Method,
		path: &str,
		body: Option<Value>,
		command: &'static str,
	) -> Result<T, BrowserError>
	where
		T: DeserializeOwned,
	{
		let url = if path.is_empty() {
			self.session_url.clone()
		} else {
			format!("{}/{path}", self.session_url)
		};
		let url = Url::parse(&url)
			.map_err(|err| BrowserError::Command { command, message: err.to_string() })?;

		exchange(&self.http, method, url, body, command).await
	}

	async fn find(&self, selector: &str) -> Result<Option<String>, BrowserError> {
		let body = serde_json::json!({ "using": "css selector", "value": selector });

		match self.command::<Value>(Method::POST, "element", Some(body), "find element").await {
			Ok(reference) => reference
				.get(ELEMENT_KEY)
				.or_else(|| reference.get("ELEMENT"))
				.and_then(Value::as_str)
				.map(|id| Some(id.to_owned()))
				.ok_or_else(|| BrowserError::Command {
					command: "find element",
					message: "reply carries no element reference".into(),
				}),
			Err(BrowserError::NoSuchElement { .. }) => Ok(None),
			Err(err) => Err(err),
		}
	}

	async fn element(&self, selector: &str) -> Result<String, BrowserError> {
		self.find(selector)
			.await?
			.ok_or_else(|| BrowserError::NoSuchElement { selector: selector.to_owned() })
	}

	async fn wait(&self, selector: &str, visible: bool) -> Result<(), BrowserError> {
		loop {
			if let Some(id) = self.find(selector).await? {
				if !visible {
					return Ok(());
				}

				let displayed: bool = self
					.command(Method::GET, &format!("element/{id}/displayed"), None, "is displayed")
					.await?;

				if displayed {
					return Ok(());
				}
			}

			tokio::time::sleep(http::std_duration(self.poll_interval)).await;
		}
	}

	async fn type_into(&self, selector: &str, text: &str) -> Result<(), BrowserError> {
		let id = self.element(selector).await?;
		let body = serde_json::json!({ "text": text });

		self.command::<Value>(Method::POST, &format!("element/{id}/value"), Some(body), "send keys")
			.await
			.map(drop)
	}

	async fn press(&self, selector: &str) -> Result<(), BrowserError> {
		let id = self.element(selector).await?;

		self.command::<Value>(
			Method::POST,
			&format!("element/{id}/click"),
			Some(serde_json::json!({})),
			"click",
		)
		.await
		.map(drop)
	}

	async fn all_cookies(&self) -> Result<Vec<Cookie>, BrowserError> {
		let raw: Vec<RawCookie> = self.command(Method::GET, "cookie", None, "get cookies").await?;

		Ok(raw.into_iter().map(RawCookie::normalize).collect())
	}
}
impl BrowserSession for WebDriverSession {
	fn navigate<'a>(&'a self, url: &'a Url) -> BrowserFuture<'a, ()> {
		Box::pin(async move {
			let body = serde_json::json!({ "url": url.as_str() });

			self.command::<Value>(Method::POST, "url", Some(body), "navigate").await.map(drop)
		})
	}

	fn wait_for_selector<'a>(&'a self, selector: &'a str, visible: bool) -> BrowserFuture<'a, ()> {
		Box::pin(self.wait(selector, visible))
	}

	fn fill<'a>(&'a self, selector: &'a str, text: &'a str) -> BrowserFuture<'a, ()> {
		Box::pin(self.type_into(selector, text))
	}

	fn click<'a>(&'a self, selector: &'a str) -> BrowserFuture<'a, ()> {
		Box::pin(self.press(selector))
	}

	fn current_url(&self) -> BrowserFuture<'_, String> {
		Box::pin(self.command(Method::GET, "url", None, "get url"))
	}

	fn cookies(&self) -> BrowserFuture<'_, Vec<Cookie>> {
		Box::pin(self.all_cookies())
	}

	fn close(&self) -> BrowserFuture<'_, ()> {
		Box::pin(async move {
			self.command::<Value>(Method::DELETE, "", None, "delete session").await.map(drop)
		})
	}
}

async fn exchange<T>(
	http: &HttpClient,
	method: Method,
	url: Url,
	body: Option<Value>,
	command: &'static str,
) -> Result<T, BrowserError>
where
	T: DeserializeOwned,
{
	let mut request = http.request(method, url);

	if let Some(body) = &body {
		request = request.json(body);
	}

	let response = request.send().await.map_err(BrowserError::transport)?;
	let status = response.status();
	let bytes = response.bytes().await.map_err(BrowserError::transport)?;

	if !status.is_success() {
		let wire = shape::decode::<Reply<WireError>>("WebDriver", &bytes).ok().map(|reply| reply.value);

		return Err(match wire {
			Some(wire) if wire.error == "no such element" =>
				BrowserError::NoSuchElement { selector: wire.message },
			Some(wire) => BrowserError::Command {
				command,
				message: if wire.message.is_empty() { wire.error } else { wire.message },
			},
			None => BrowserError::Command { command, message: format!("HTTP {}", status.as_u16()) },
		});
	}

	shape::decode::<Reply<T>>("WebDriver", &bytes)
		.map(|reply| reply.value)
		.map_err(|err| BrowserError::Command { command, message: err.to_string() })
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn headless_capabilities_disable_the_sandbox() {
		let capabilities = WebDriverLauncher::headless_chrome();
		let args = capabilities["goog:chromeOptions"]["args"]
			.as_array()
			.expect("Chrome args should be an array.");

		assert_eq!(capabilities["browserName"], "chrome");
		assert!(args.iter().any(|arg| arg == "--no-sandbox"));
		assert!(args.iter().any(|arg| arg == "--headless=new"));
	}
}
