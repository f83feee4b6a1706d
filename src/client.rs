//! [`XubioClient`] facade wiring configuration into the token, dispatch, and session layers.

// self
use crate::{
	_prelude::*,
	auth::{ClientCredentials, Cookie, Secret},
	browser::{BrowserLogin, BrowserLoginConfig, WebDriverLauncher},
	config::XubioConfig,
	dispatch::{ApiResponse, Dispatcher, ResourceRequest},
	http::HttpClient,
	proxy::Proxy,
	session::{LoginService, SessionCookieClient, SessionLogin},
	token::TokenManager,
};

/// One shared HTTP client, token manager, dispatcher, and session cookie client.
///
/// The cookie validation probe keeps its own non-redirecting client.
#[derive(Debug)]
pub struct XubioClient {
	config: XubioConfig,
	http: HttpClient,
	tokens: Arc<TokenManager>,
	dispatcher: Arc<Dispatcher>,
	login_service: LoginService,
	sessions: SessionCookieClient,
}
impl XubioClient {
	/// Builds every layer from `config`, logging in through the remote login service.
	pub fn from_config(config: XubioConfig) -> Result<Self> {
		let http = HttpClient::new()?;
		let credentials = ClientCredentials::new(
			config.client_id.as_deref().unwrap_or_default(),
			config.client_secret.as_ref().map(Secret::expose).unwrap_or_default(),
		);
		let tokens = Arc::new(
			TokenManager::new(config.token_endpoint.clone())
				.with_credentials(credentials)
				.with_http_client(http.clone()),
		);
		let dispatcher = Arc::new(
			Dispatcher::new(config.api_base.clone(), tokens.clone()).with_http_client(http.clone()),
		);
		let login_service =
			LoginService::new(config.login_service_url.clone()).with_http_client(http.clone());
		let sessions = SessionCookieClient::new(Arc::new(login_service.clone()))?
			.with_probe_url(config.probe_url.clone());

		Ok(Self { config, http, tokens, dispatcher, login_service, sessions })
	}

	/// Loads the configuration from the environment (and `.env`) and builds the client.
	pub fn from_env() -> Result<Self> {
		Self::from_config(XubioConfig::load()?)
	}

	/// Replaces the session cookie provider, for example with [`XubioClient::browser_login`].
	pub fn with_login(mut self, login: Arc<dyn SessionLogin>) -> Result<Self> {
		self.sessions = SessionCookieClient::new(login)?.with_probe_url(self.config.probe_url.clone());

		Ok(self)
	}

	/// Browser login driven through the configured WebDriver endpoint.
	pub fn browser_login(&self) -> BrowserLogin {
		let launcher =
			WebDriverLauncher::new(self.config.webdriver_url.clone()).with_http_client(self.http.clone());

		BrowserLogin::new(Arc::new(launcher), BrowserLoginConfig::new(self.config.browser_login_url.clone()))
	}

	/// Active configuration.
	pub fn config(&self) -> &XubioConfig {
		&self.config
	}

	/// Token manager.
	pub fn tokens(&self) -> &Arc<TokenManager> {
		&self.tokens
	}

	/// Request dispatcher.
	pub fn dispatcher(&self) -> &Arc<Dispatcher> {
		&self.dispatcher
	}

	/// Remote login service client.
	pub fn login_service(&self) -> &LoginService {
		&self.login_service
	}

	/// Session cookie client.
	pub fn sessions(&self) -> &SessionCookieClient {
		&self.sessions
	}

	/// Proxy surface forwarding through this client's dispatcher.
	pub fn proxy(&self) -> Proxy {
		Proxy::new(self.dispatcher.clone())
	}

	/// Dispatches `request` through the shared dispatcher.
	pub async fn request(&self, request: ResourceRequest) -> Result<ApiResponse> {
		self.dispatcher.request_resource(request).await
	}

	/// Session cookies for the configured username and password.
	pub async fn session_cookies(&self, force_refresh: bool) -> Result<Vec<Cookie>> {
		let credentials = self.config.login_credentials()?;

		self.sessions.get_session_cookies(&credentials, force_refresh).await
	}
}
