// std
use std::sync::{
	Arc,
	atomic::{AtomicUsize, Ordering},
};
// crates.io
use futures::future;
use httpmock::prelude::*;
use serde_json::json;
use time::Duration;
// self
use xubio_session::{
	auth::{Cookie, LoginCredentials},
	browser::{
		BrowserError, BrowserFuture, BrowserLauncher, BrowserLogin, BrowserLoginConfig,
		BrowserSession, LoginState, StepTimeouts, WebDriverLauncher, webdriver::ELEMENT_KEY,
	},
	error::Error,
	http::HttpClient,
	session::SessionCookieClient,
	url::Url,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Fault {
	None,
	LaunchFails,
	NavigationHangs,
	UsernameFieldHangs,
	ClickFails,
	RedirectNeverHappens,
}

#[derive(Default)]
struct Counters {
	launches: AtomicUsize,
	closes: AtomicUsize,
}

struct FakeLauncher {
	fault: Fault,
	counters: Arc<Counters>,
}
impl BrowserLauncher for FakeLauncher {
	fn launch(&self) -> BrowserFuture<'_, Box<dyn BrowserSession>> {
		self.counters.launches.fetch_add(1, Ordering::SeqCst);

		let fault = self.fault;
		let counters = self.counters.clone();

		Box::pin(async move {
			if fault == Fault::LaunchFails {
				return Err(BrowserError::Command { command: "launch", message: "no chrome".into() });
			}

			Ok(Box::new(FakeSession { fault, counters }) as Box<dyn BrowserSession>)
		})
	}
}

struct FakeSession {
	fault: Fault,
	counters: Arc<Counters>,
}
impl BrowserSession for FakeSession {
	fn navigate<'a>(&'a self, _url: &'a Url) -> BrowserFuture<'a, ()> {
		if self.fault == Fault::NavigationHangs {
			return Box::pin(future::pending());
		}

		Box::pin(future::ready(Ok(())))
	}

	fn wait_for_selector<'a>(&'a self, selector: &'a str, _visible: bool) -> BrowserFuture<'a, ()> {
		if self.fault == Fault::UsernameFieldHangs && selector == "input#Username" {
			return Box::pin(future::pending());
		}

		Box::pin(future::ready(Ok(())))
	}

	fn fill<'a>(&'a self, _selector: &'a str, _text: &'a str) -> BrowserFuture<'a, ()> {
		Box::pin(future::ready(Ok(())))
	}

	fn click<'a>(&'a self, selector: &'a str) -> BrowserFuture<'a, ()> {
		if self.fault == Fault::ClickFails {
			return Box::pin(future::ready(Err(BrowserError::NoSuchElement {
				selector: selector.to_owned(),
			})));
		}

		Box::pin(future::ready(Ok(())))
	}

	fn current_url(&self) -> BrowserFuture<'_, String> {
		let url = if self.fault == Fault::RedirectNeverHappens {
			"https://connect.visma.com/login?ReturnUrl=%2Fxubio.com"
		} else {
			"https://xubio.com/NXV/dashboard"
		};

		Box::pin(future::ready(Ok(url.to_owned())))
	}

	fn cookies(&self) -> BrowserFuture<'_, Vec<Cookie>> {
		Box::pin(future::ready(Ok(vec![
			Cookie::new("SESSION", "s-1", ".xubio.com"),
			Cookie::new("idsrv.session", "v-1", "connect.visma.com"),
		])))
	}

	fn close(&self) -> BrowserFuture<'_, ()> {
		self.counters.closes.fetch_add(1, Ordering::SeqCst);

		Box::pin(future::ready(Ok(())))
	}
}

fn fast_config() -> BrowserLoginConfig {
	let mut config = BrowserLoginConfig::new(
		Url::parse(BrowserLoginConfig::DEFAULT_LOGIN_URL).expect("Default login URL should parse."),
	);

	config.timeouts = StepTimeouts::uniform(Duration::milliseconds(200));
	config.poll_interval = Duration::milliseconds(10);

	config
}

fn build_login(fault: Fault) -> (BrowserLogin, Arc<Counters>) {
	let counters = Arc::new(Counters::default());
	let launcher = FakeLauncher { fault, counters: counters.clone() };

	(BrowserLogin::new(Arc::new(launcher), fast_config()), counters)
}

fn credentials() -> LoginCredentials {
	LoginCredentials::new("ops@example.com", "hunter2")
}

#[tokio::test]
async fn successful_login_keeps_target_domain_cookies_and_closes() {
	let (login, counters) = build_login(Fault::None);
	let cookies = login.login_to_xubio(&credentials()).await.expect("Login should succeed.");

	assert_eq!(cookies.len(), 1);
	assert_eq!(cookies[0].name, "SESSION");
	assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn every_timed_out_state_still_closes_the_browser_once() {
	for (fault, state) in [
		(Fault::NavigationHangs, LoginState::NavigateToLoginPage),
		(Fault::UsernameFieldHangs, LoginState::WaitForUsernameField),
		(Fault::RedirectNeverHappens, LoginState::WaitForRedirect),
	] {
		let (login, counters) = build_login(fault);
		let err = login.login_to_xubio(&credentials()).await.expect_err("Hung state should time out.");

		match err {
			Error::LoginTimeout { state: failed, after } => {
				assert_eq!(failed, state);
				assert_eq!(after, Duration::milliseconds(200));
			},
			other => panic!("Unexpected error variant for {fault:?}: {other:?}."),
		}

		assert_eq!(counters.closes.load(Ordering::SeqCst), 1, "{fault:?}");
	}
}

#[tokio::test]
async fn driver_failures_close_the_browser_before_propagating() {
	let (login, counters) = build_login(Fault::ClickFails);
	let err = login.login_to_xubio(&credentials()).await.expect_err("Click failure should fail.");

	assert!(matches!(
		err,
		Error::Browser { state: LoginState::FillCredentials, source: BrowserError::NoSuchElement { .. } }
	));
	assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_launch_has_nothing_to_close() {
	let (login, counters) = build_login(Fault::LaunchFails);
	let err = login.login_to_xubio(&credentials()).await.expect_err("Launch failure should fail.");

	assert!(matches!(err, Error::Browser { state: LoginState::Launch, .. }));
	assert_eq!(counters.closes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn incomplete_credentials_never_launch_a_browser() {
	let (login, counters) = build_login(Fault::None);
	let err = login
		.login_to_xubio(&LoginCredentials::new("ops@example.com", " "))
		.await
		.expect_err("Blank password should fail.");

	assert!(matches!(err, Error::Config(_)));
	assert_eq!(counters.launches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn browser_login_backs_the_session_cookie_client() {
	let (login, counters) = build_login(Fault::None);
	let client = SessionCookieClient::new(Arc::new(login)).expect("Session client should build.");

	client.get_session_cookies(&credentials(), false).await.expect("Login should succeed.");
	client.get_session_cookies(&credentials(), false).await.expect("Cache should hit.");

	assert_eq!(counters.launches.load(Ordering::SeqCst), 1);
}

fn webdriver_login(server: &MockServer) -> BrowserLogin {
	let launcher = WebDriverLauncher::new(Url::parse(&server.base_url()).expect("Mock URL should parse."))
		.with_http_client(HttpClient::new().expect("HTTP client should build."))
		.with_poll_interval(Duration::milliseconds(10));

	BrowserLogin::new(Arc::new(launcher), fast_config())
}

async fn mock_element(server: &MockServer, selector: &str, id: &str) {
	let reply = json!({ "value": { ELEMENT_KEY: id } }).to_string();

	server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/session/s1/element")
				.json_body(json!({ "using": "css selector", "value": selector }));
			then.status(200).header("content-type", "application/json").body(reply);
		})
		.await;
}

async fn mock_null<'a>(server: &'a MockServer, method: httpmock::Method, path: &str) -> httpmock::Mock<'a> {
	server
		.mock_async(|when, then| {
			when.method(method).path(path);
			then.status(200).header("content-type", "application/json").body("{\"value\":null}");
		})
		.await
}

#[tokio::test]
async fn webdriver_flow_drives_the_two_step_form() {
	let server = MockServer::start_async().await;
	let _session = server
		.mock_async(|when, then| {
			when.method(POST).path("/session");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"value\":{\"sessionId\":\"s1\",\"capabilities\":{}}}");
		})
		.await;
	let navigate = mock_null(&server, POST, "/session/s1/url").await;

	mock_element(&server, "input#Username", "user").await;
	mock_element(&server, "input#Password", "pass").await;
	mock_element(&server, "#LoginButton", "btn").await;

	for id in ["user", "pass"] {
		let path = format!("/session/s1/element/{id}/displayed");

		server
			.mock_async(|when, then| {
				when.method(GET).path(path.as_str());
				then.status(200).header("content-type", "application/json").body("{\"value\":true}");
			})
			.await;
	}

	let username = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/session/s1/element/user/value")
				.json_body(json!({ "text": "ops@example.com" }));
			then.status(200).header("content-type", "application/json").body("{\"value\":null}");
		})
		.await;
	let password = mock_null(&server, POST, "/session/s1/element/pass/value").await;
	let click = mock_null(&server, POST, "/session/s1/element/btn/click").await;
	let _url = server
		.mock_async(|when, then| {
			when.method(GET).path("/session/s1/url");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"value\":\"https://xubio.com/NXV/dashboard\"}");
		})
		.await;
	let _cookies = server
		.mock_async(|when, then| {
			when.method(GET).path("/session/s1/cookie");
			then.status(200).header("content-type", "application/json").body(
				json!({ "value": [
					{ "name": "SESSION", "value": "s-1", "domain": ".xubio.com", "path": "/",
					  "expiry": 1767225600, "httpOnly": true, "secure": true, "sameSite": "Lax" },
					{ "name": "idsrv", "value": "v-1", "domain": "connect.visma.com", "path": "/" }
				]})
				.to_string(),
			);
		})
		.await;
	let delete = mock_null(&server, DELETE, "/session/s1").await;
	let cookies = webdriver_login(&server)
		.login_to_xubio(&credentials())
		.await
		.expect("WebDriver login should succeed.");

	assert_eq!(cookies.len(), 1);
	assert_eq!(cookies[0].expires, Some(1_767_225_600));
	assert!(cookies[0].http_only);

	navigate.assert_calls_async(1).await;
	username.assert_calls_async(1).await;
	password.assert_calls_async(1).await;
	click.assert_calls_async(2).await;
	delete.assert_calls_async(1).await;
}

#[tokio::test]
async fn webdriver_missing_field_times_out_and_deletes_the_session() {
	let server = MockServer::start_async().await;
	let _session = server
		.mock_async(|when, then| {
			when.method(POST).path("/session");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"value\":{\"sessionId\":\"s1\",\"capabilities\":{}}}");
		})
		.await;
	let _navigate = mock_null(&server, POST, "/session/s1/url").await;
	let lookup = server
		.mock_async(|when, then| {
			when.method(POST).path("/session/s1/element");
			then.status(404).header("content-type", "application/json").body(
				"{\"value\":{\"error\":\"no such element\",\"message\":\"Unable to locate element\",\"stacktrace\":\"\"}}",
			);
		})
		.await;
	let delete = mock_null(&server, DELETE, "/session/s1").await;
	let err = webdriver_login(&server)
		.login_to_xubio(&credentials())
		.await
		.expect_err("Missing username field should time out.");

	assert!(matches!(err, Error::LoginTimeout { state: LoginState::WaitForUsernameField, .. }));

	delete.assert_calls_async(1).await;

	assert!(lookup.calls_async().await > 1);
}

#[tokio::test]
async fn webdriver_session_created_after_launch_timeout_is_deleted() {
	let server = MockServer::start_async().await;
	let _session = server
		.mock_async(|when, then| {
			when.method(POST).path("/session");
			then.status(200)
				.header("content-type", "application/json")
				.delay(std::time::Duration::from_millis(400))
				.body("{\"value\":{\"sessionId\":\"s1\",\"capabilities\":{}}}");
		})
		.await;
	let delete = mock_null(&server, DELETE, "/session/s1").await;
	let err = webdriver_login(&server)
		.login_to_xubio(&credentials())
		.await
		.expect_err("Slow driver should time out the launch.");

	assert!(matches!(err, Error::LoginTimeout { state: LoginState::Launch, .. }));

	delete.assert_calls_async(0).await;

	tokio::time::sleep(std::time::Duration::from_millis(600)).await;

	delete.assert_calls_async(1).await;
}
