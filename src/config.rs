//! Environment configuration.
//!
//! Values come from process environment variables, optionally seeded from a `.env` file. Empty or
//! whitespace-only values count as unset. Credentials are optional at load time; operations that
//! need them fail with [`ConfigError::MissingSetting`] when they are used.

// self
use crate::{
	_prelude::*,
	auth::{ClientCredentials, LoginCredentials, Secret},
	browser::{BrowserLoginConfig, WebDriverLauncher},
	dispatch::Dispatcher,
	error::ConfigError,
	session::{LoginService, SessionCookieClient},
	token::TokenManager,
};

/// Environment variable names.
pub mod vars {
	/// OAuth client identifier.
	pub const CLIENT_ID: &str = "XUBIO_CLIENT_ID";
	/// OAuth client secret.
	pub const SECRET_ID: &str = "XUBIO_SECRET_ID";
	/// Cookie-login username.
	pub const USERNAME: &str = "XUBIO_USERNAME";
	/// Cookie-login password.
	pub const PASSWORD: &str = "XUBIO_PASSWORD";
	/// Login service base URL.
	pub const LOGIN_URL: &str = "FLY_LOGIN_URL";
	/// REST API base URL.
	pub const API_BASE: &str = "XUBIO_API_BASE";
	/// OAuth token endpoint.
	pub const TOKEN_ENDPOINT: &str = "XUBIO_TOKEN_ENDPOINT";
	/// Cookie validation probe.
	pub const PROBE_URL: &str = "XUBIO_PROBE_URL";
	/// WebDriver endpoint used for local browser logins.
	pub const WEBDRIVER_URL: &str = "XUBIO_WEBDRIVER_URL";
	/// Browser login page.
	pub const BROWSER_LOGIN_URL: &str = "XUBIO_BROWSER_LOGIN_URL";
	/// Disables `.env` loading when `1` or `true`.
	pub const DOTENV_DISABLED: &str = "DOTENV_DISABLED";
}

/// Resolved configuration.
#[derive(Clone, Debug)]
pub struct XubioConfig {
	/// OAuth client identifier.
	pub client_id: Option<String>,
	/// OAuth client secret.
	pub client_secret: Option<Secret>,
	/// Cookie-login username.
	pub username: Option<String>,
	/// Cookie-login password.
	pub password: Option<Secret>,
	/// Login service base URL.
	pub login_service_url: Url,
	/// REST API base URL.
	pub api_base: Url,
	/// OAuth token endpoint.
	pub token_endpoint: Url,
	/// Cookie validation probe.
	pub probe_url: Url,
	/// WebDriver endpoint.
	pub webdriver_url: Url,
	/// Browser login page.
	pub browser_login_url: Url,
}
impl XubioConfig {
	/// Loads `.env` (unless disabled) and then reads the process environment.
	pub fn load() -> Result<Self, ConfigError> {
		load_dotenv()?;

		Self::from_env()
	}

	/// Reads the process environment only.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Resolves every setting through `lookup`.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let value = |name: &str| {
			lookup(name).map(|raw| raw.trim().to_owned()).filter(|value| !value.is_empty())
		};
		let url = |name: &'static str, default: &str| {
			let raw = value(name).unwrap_or_else(|| default.to_owned());

			Url::parse(&raw).map_err(|source| ConfigError::InvalidUrl { var: name, source })
		};

		Ok(Self {
			client_id: value(vars::CLIENT_ID),
			client_secret: value(vars::SECRET_ID).map(Secret::new),
			username: value(vars::USERNAME),
			password: value(vars::PASSWORD).map(Secret::new),
			login_service_url: url(vars::LOGIN_URL, LoginService::DEFAULT_URL)?,
			api_base: url(vars::API_BASE, Dispatcher::<TokenManager>::DEFAULT_BASE)?,
			token_endpoint: url(vars::TOKEN_ENDPOINT, TokenManager::DEFAULT_ENDPOINT)?,
			probe_url: url(vars::PROBE_URL, SessionCookieClient::DEFAULT_PROBE_URL)?,
			webdriver_url: url(vars::WEBDRIVER_URL, WebDriverLauncher::DEFAULT_ENDPOINT)?,
			browser_login_url: url(vars::BROWSER_LOGIN_URL, BrowserLoginConfig::DEFAULT_LOGIN_URL)?,
		})
	}

	/// Client credentials, or the name of the first missing half.
	pub fn client_credentials(&self) -> Result<ClientCredentials, ConfigError> {
		ClientCredentials::from_parts(self.client_id.as_deref(), self.client_secret.as_ref())
	}

	/// Login credentials, or the name of the first missing half.
	pub fn login_credentials(&self) -> Result<LoginCredentials, ConfigError> {
		LoginCredentials::from_parts(self.username.as_deref(), self.password.as_ref())
	}
}

/// Loads `.env` from the working directory unless `DOTENV_DISABLED` is `1` or `true`.
///
/// A missing file is not an error.
pub fn load_dotenv() -> Result<(), ConfigError> {
	if dotenv_disabled() {
		return Ok(());
	}

	match dotenvy::dotenv() {
		Ok(path) => {
			tracing::debug!(path = %path.display(), "Loaded .env file.");

			Ok(())
		},
		Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
		Err(dotenvy::Error::LineParse(_, index)) => Err(ConfigError::DotenvParse { index }),
		Err(dotenvy::Error::Io(err)) => Err(ConfigError::DotenvIo { kind: err.kind() }),
		Err(_) => Err(ConfigError::DotenvIo { kind: std::io::ErrorKind::InvalidData }),
	}
}

fn dotenv_disabled() -> bool {
	matches!(std::env::var(vars::DOTENV_DISABLED).ok().as_deref(), Some("1" | "true"))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn lookup(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
		move |name| pairs.iter().find(|(key, _)| *key == name).map(|(_, value)| (*value).to_owned())
	}

	#[test]
	fn defaults_apply_when_unset() {
		let config = XubioConfig::from_lookup(|_| None).expect("Defaults should resolve.");

		assert_eq!(config.login_service_url.as_str(), "https://xubio-login.fly.dev/");
		assert_eq!(config.api_base.as_str(), "https://xubio.com/API/1.1");
		assert_eq!(config.token_endpoint.as_str(), "https://xubio.com/API/1.1/TokenEndpoint");
		assert_eq!(config.webdriver_url.as_str(), "http://localhost:9515/");
		assert!(config.client_id.is_none());
	}

	#[test]
	fn blank_values_count_as_unset() {
		let config = XubioConfig::from_lookup(lookup(&[
			(vars::CLIENT_ID, "  "),
			(vars::SECRET_ID, " s3cret "),
			(vars::LOGIN_URL, "   "),
		]))
		.expect("Config should resolve.");

		assert!(config.client_id.is_none());
		assert_eq!(config.client_secret.as_ref().map(Secret::expose), Some("s3cret"));
		assert_eq!(config.login_service_url.as_str(), "https://xubio-login.fly.dev/");

		let err = config.client_credentials().expect_err("Missing client id should fail.");

		assert!(matches!(err, ConfigError::MissingSetting { name: "XUBIO_CLIENT_ID" }));
	}

	#[test]
	fn invalid_urls_name_the_variable() {
		let err = XubioConfig::from_lookup(lookup(&[(vars::API_BASE, "not a url")]))
			.expect_err("Invalid URL should fail.");

		assert!(matches!(err, ConfigError::InvalidUrl { var: "XUBIO_API_BASE", .. }));
	}

	#[test]
	fn environment_is_read_through_from_env() {
		temp_env::with_vars(
			[
				(vars::CLIENT_ID, Some("client")),
				(vars::SECRET_ID, Some("secret")),
				(vars::USERNAME, Some("ops@example.com")),
				(vars::PASSWORD, None),
			],
			|| {
				let config = XubioConfig::from_env().expect("Environment config should resolve.");
				let credentials = config.client_credentials().expect("Client credentials are set.");

				assert_eq!(credentials.client_id, "client");

				let err = config.login_credentials().expect_err("Password is unset.");

				assert!(matches!(err, ConfigError::MissingSetting { name: "XUBIO_PASSWORD" }));
			},
		);
	}

	#[test]
	fn dotenv_can_be_disabled() {
		temp_env::with_var(vars::DOTENV_DISABLED, Some("true"), || {
			assert!(dotenv_disabled());
			load_dotenv().expect("Disabled loading should be a no-op.");
		});
		temp_env::with_var(vars::DOTENV_DISABLED, Some("0"), || assert!(!dotenv_disabled()));
	}
}
