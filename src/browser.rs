//! Headless browser login automation.
//!
//! [`BrowserLogin`] walks the [`LoginState`] machine against a browser reached through the
//! [`BrowserLauncher`]/[`BrowserSession`] seams. Every state runs under its own bound from
//! [`StepTimeouts`]; the first bound that fires, or the first driver failure, aborts the attempt.
//! Whatever happens, a launched browser is closed exactly once before the outcome is returned.

pub mod state;
pub mod webdriver;

pub use state::*;
pub use webdriver::WebDriverLauncher;

// self
use crate::{
	_prelude::*,
	auth::{Cookie, LoginCredentials},
	error::SharedSource,
	http,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	session::{LoginFuture, SessionLogin},
};

/// Boxed future returned by browser seams.
pub type BrowserFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BrowserError>> + 'a + Send>>;

/// Failure reported by a browser driver.
#[derive(Clone, Debug, ThisError)]
pub enum BrowserError {
	/// The driver rejected a command.
	#[error("Browser command {command} failed: {message}.")]
	Command {
		/// Command label.
		command: &'static str,
		/// Driver-supplied message.
		message: String,
	},
	/// No element matches the selector.
	#[error("No element matches `{selector}`.")]
	NoSuchElement {
		/// CSS selector.
		selector: String,
	},
	/// A step ran before the browser was launched.
	#[error("Browser has not been launched.")]
	NotLaunched,
	/// The login produced no cookies for the target domain.
	#[error("Login produced no cookies for {domain}.")]
	NoCookies {
		/// Target domain.
		domain: String,
	},
	/// The driver could not be reached.
	#[error("Browser driver transport failed.")]
	Transport {
		/// Transport failure.
		#[source]
		source: SharedSource,
	},
}
impl BrowserError {
	/// Wraps a transport failure.
	pub fn transport(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Transport { source: Arc::new(src) }
	}
}

/// Starts browser sessions.
pub trait BrowserLauncher
where
	Self: Send + Sync,
{
	/// Launches a fresh browser.
	fn launch(&self) -> BrowserFuture<'_, Box<dyn BrowserSession>>;
}

/// Commands the login runner issues against one browser.
pub trait BrowserSession
where
	Self: Send + Sync,
{
	/// Navigates to `url` and waits for the load to finish.
	fn navigate<'a>(&'a self, url: &'a Url) -> BrowserFuture<'a, ()>;

	/// Waits until `selector` matches an element, and optionally until it is displayed.
	fn wait_for_selector<'a>(&'a self, selector: &'a str, visible: bool) -> BrowserFuture<'a, ()>;

	/// Types `text` into the element matching `selector`.
	fn fill<'a>(&'a self, selector: &'a str, text: &'a str) -> BrowserFuture<'a, ()>;

	/// Clicks the element matching `selector`.
	fn click<'a>(&'a self, selector: &'a str) -> BrowserFuture<'a, ()>;

	/// URL of the current page.
	fn current_url(&self) -> BrowserFuture<'_, String>;

	/// Every cookie visible to the current page, normalized.
	fn cookies(&self) -> BrowserFuture<'_, Vec<Cookie>>;

	/// Shuts the browser down.
	fn close(&self) -> BrowserFuture<'_, ()>;
}

/// CSS selectors of the identity provider's two-step form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoginSelectors {
	/// Username input.
	pub username: String,
	/// Button that reveals the password step.
	pub next: String,
	/// Password input.
	pub password: String,
	/// Final submit button.
	pub submit: String,
}
impl Default for LoginSelectors {
	fn default() -> Self {
		Self {
			username: "input#Username".into(),
			next: "#LoginButton".into(),
			password: "input#Password".into(),
			submit: "#LoginButton".into(),
		}
	}
}

/// Tunables for [`BrowserLogin`].
#[derive(Clone, Debug)]
pub struct BrowserLoginConfig {
	/// Page that starts the login.
	pub login_url: Url,
	/// Domain whose cookies are kept.
	pub target_domain: String,
	/// Substring identifying identity provider URLs.
	pub identity_provider_marker: String,
	/// Form selectors.
	pub selectors: LoginSelectors,
	/// Per-state bounds.
	pub timeouts: StepTimeouts,
	/// Delay between redirect checks.
	pub poll_interval: Duration,
}
impl BrowserLoginConfig {
	/// Production login page.
	pub const DEFAULT_LOGIN_URL: &str = "https://xubio.com/NXV/vismaConnect/login";

	/// Default settings aimed at `login_url`.
	pub fn new(login_url: Url) -> Self {
		Self {
			login_url,
			target_domain: "xubio.com".into(),
			identity_provider_marker: "visma".into(),
			selectors: LoginSelectors::default(),
			timeouts: StepTimeouts::default(),
			poll_interval: Duration::milliseconds(250),
		}
	}

	/// Returns `true` once `url` is on the target domain and off the identity provider.
	pub fn is_post_login(&self, url: &str) -> bool {
		let url = url.to_ascii_lowercase();

		url.contains(&self.target_domain.to_ascii_lowercase())
			&& !url.contains(&self.identity_provider_marker.to_ascii_lowercase())
	}
}

#[derive(Default)]
struct LoginRun {
	session: Option<Box<dyn BrowserSession>>,
	cookies: Vec<Cookie>,
}

/// Logs into Xubio through a real browser and returns the session cookies.
pub struct BrowserLogin {
	launcher: Arc<dyn BrowserLauncher>,
	config: BrowserLoginConfig,
}
impl BrowserLogin {
	/// Creates a runner with `config`.
	pub fn new(launcher: Arc<dyn BrowserLauncher>, config: BrowserLoginConfig) -> Self {
		Self { launcher, config }
	}

	/// Active settings.
	pub fn config(&self) -> &BrowserLoginConfig {
		&self.config
	}

	/// Runs the full state machine for `credentials`.
	pub async fn login_to_xubio(&self, credentials: &LoginCredentials) -> Result<Vec<Cookie>> {
		const KIND: FlowKind = FlowKind::BrowserLogin;

		let span = FlowSpan::new(KIND, "login_to_xubio");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				credentials.ensure_complete()?;

				let mut run = LoginRun::default();
				let outcome = self.drive(&mut run, credentials).await;

				self.close(&mut run).await;

				if let Err(err) = &outcome {
					tracing::warn!(error = %err, "Browser login failed.");
				}

				outcome.map(|()| run.cookies)
			})
			.await;

		obs::record_result(KIND, &result);

		result
	}

	async fn drive(&self, run: &mut LoginRun, credentials: &LoginCredentials) -> Result<()> {
		let mut state = LoginState::INITIAL;

		while !state.is_terminal() {
			let bound = self.config.timeouts.for_state(state);

			tracing::debug!(%state, "Entering browser login state.");

			match tokio::time::timeout(http::std_duration(bound), self.step(state, run, credentials)).await
			{
				Ok(Ok(())) => {},
				Ok(Err(source)) => return Err(Error::Browser { state, source }),
				Err(_) => return Err(Error::LoginTimeout { state, after: bound }),
			}

			state = state.next().unwrap_or(LoginState::Close);
		}

		Ok(())
	}

	async fn step(
		&self,
		state: LoginState,
		run: &mut LoginRun,
		credentials: &LoginCredentials,
	) -> Result<(), BrowserError> {
		let LoginRun { session, cookies } = run;

		if state == LoginState::Launch {
			*session = Some(self.launcher.launch().await?);

			return Ok(());
		}

		let session = session.as_deref().ok_or(BrowserError::NotLaunched)?;
		let selectors = &self.config.selectors;

		match state {
			LoginState::Launch | LoginState::Close => Ok(()),
			LoginState::NavigateToLoginPage => session.navigate(&self.config.login_url).await,
			LoginState::WaitForUsernameField => session.wait_for_selector(&selectors.username, true).await,
			LoginState::FillCredentials => {
				session.fill(&selectors.username, &credentials.username).await?;
				session.click(&selectors.next).await?;
				session.wait_for_selector(&selectors.password, true).await?;
				session.fill(&selectors.password, credentials.password.expose()).await
			},
			LoginState::Submit => session.click(&selectors.submit).await,
			LoginState::WaitForRedirect => loop {
				let url = session.current_url().await?;

				if self.config.is_post_login(&url) {
					tracing::debug!("Browser left the identity provider.");

					return Ok(());
				}

				tokio::time::sleep(http::std_duration(self.config.poll_interval)).await;
			},
			LoginState::ExtractCookies => {
				let domain = &self.config.target_domain;
				let scoped = session
					.cookies()
					.await?
					.into_iter()
					.filter(|cookie| cookie.matches_domain(domain))
					.collect::<Vec<_>>();

				if scoped.is_empty() {
					return Err(BrowserError::NoCookies { domain: domain.clone() });
				}

				*cookies = scoped;

				Ok(())
			},
		}
	}

	async fn close(&self, run: &mut LoginRun) {
		let Some(session) = run.session.take() else {
			return;
		};
		let bound = self.config.timeouts.close;

		match tokio::time::timeout(http::std_duration(bound), session.close()).await {
			Ok(Ok(())) => tracing::debug!("Browser closed."),
			Ok(Err(err)) => tracing::warn!(error = %err, "Browser close failed."),
			Err(_) => tracing::warn!(after = %bound, "Browser close timed out."),
		}
	}
}
impl SessionLogin for BrowserLogin {
	fn login<'a>(&'a self, credentials: &'a LoginCredentials) -> LoginFuture<'a> {
		Box::pin(self.login_to_xubio(credentials))
	}
}
impl Debug for BrowserLogin {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("BrowserLogin").field("config", &self.config).finish()
	}
}
