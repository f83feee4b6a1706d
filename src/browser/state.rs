//! Login state machine and per-state bounds.

// self
use crate::_prelude::*;

/// Allowed transitions, in execution order.
pub const TRANSITIONS: [(LoginState, LoginState); 7] = [
	(LoginState::Launch, LoginState::NavigateToLoginPage),
	(LoginState::NavigateToLoginPage, LoginState::WaitForUsernameField),
	(LoginState::WaitForUsernameField, LoginState::FillCredentials),
	(LoginState::FillCredentials, LoginState::Submit),
	(LoginState::Submit, LoginState::WaitForRedirect),
	(LoginState::WaitForRedirect, LoginState::ExtractCookies),
	(LoginState::ExtractCookies, LoginState::Close),
];

/// States of one browser login attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LoginState {
	/// Start the browser.
	Launch,
	/// Open the identity provider login page.
	NavigateToLoginPage,
	/// Wait until the username field is visible.
	WaitForUsernameField,
	/// Enter username, continue, then enter password.
	FillCredentials,
	/// Submit the form.
	Submit,
	/// Wait until the browser has left the identity provider.
	WaitForRedirect,
	/// Read cookies scoped to the target domain.
	ExtractCookies,
	/// Shut the browser down. Terminal.
	Close,
}
impl LoginState {
	/// Entry state.
	pub const INITIAL: Self = Self::Launch;

	/// Successor of this state; `None` for [`LoginState::Close`].
	pub fn next(self) -> Option<Self> {
		TRANSITIONS.iter().find(|(from, _)| *from == self).map(|(_, to)| *to)
	}

	/// Returns `true` for the terminal state.
	pub const fn is_terminal(self) -> bool {
		matches!(self, Self::Close)
	}

	/// Returns a stable label suitable for logs.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Launch => "launch",
			Self::NavigateToLoginPage => "navigate_to_login_page",
			Self::WaitForUsernameField => "wait_for_username_field",
			Self::FillCredentials => "fill_credentials",
			Self::Submit => "submit",
			Self::WaitForRedirect => "wait_for_redirect",
			Self::ExtractCookies => "extract_cookies",
			Self::Close => "close",
		}
	}
}
impl Display for LoginState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Upper bound for each [`LoginState`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepTimeouts {
	/// [`LoginState::Launch`].
	pub launch: Duration,
	/// [`LoginState::NavigateToLoginPage`].
	pub navigation: Duration,
	/// [`LoginState::WaitForUsernameField`].
	pub username_field: Duration,
	/// [`LoginState::FillCredentials`], including the password field wait.
	pub credentials: Duration,
	/// [`LoginState::Submit`].
	pub submit: Duration,
	/// [`LoginState::WaitForRedirect`].
	pub redirect: Duration,
	/// [`LoginState::ExtractCookies`].
	pub extract: Duration,
	/// [`LoginState::Close`].
	pub close: Duration,
}
impl StepTimeouts {
	/// Applies `bound` to every state.
	pub const fn uniform(bound: Duration) -> Self {
		Self {
			launch: bound,
			navigation: bound,
			username_field: bound,
			credentials: bound,
			submit: bound,
			redirect: bound,
			extract: bound,
			close: bound,
		}
	}

	/// Bound for `state`.
	pub const fn for_state(&self, state: LoginState) -> Duration {
		match state {
			LoginState::Launch => self.launch,
			LoginState::NavigateToLoginPage => self.navigation,
			LoginState::WaitForUsernameField => self.username_field,
			LoginState::FillCredentials => self.credentials,
			LoginState::Submit => self.submit,
			LoginState::WaitForRedirect => self.redirect,
			LoginState::ExtractCookies => self.extract,
			LoginState::Close => self.close,
		}
	}
}
impl Default for StepTimeouts {
	fn default() -> Self {
		Self {
			launch: Duration::seconds(30),
			navigation: Duration::seconds(30),
			username_field: Duration::seconds(15),
			credentials: Duration::seconds(20),
			submit: Duration::seconds(10),
			redirect: Duration::seconds(30),
			extract: Duration::seconds(10),
			close: Duration::seconds(10),
		}
	}
}
