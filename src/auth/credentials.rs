//! Client-credentials and username/password pairs.

// crates.io
use base64::{Engine, engine::general_purpose::STANDARD};
// self
use crate::{_prelude::*, auth::Secret, error::ConfigError};

/// OAuth client identifier + secret used for the client-credentials grant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientCredentials {
	/// Client identifier (not secret, safe to log).
	pub client_id: String,
	/// Client secret.
	pub client_secret: Secret,
}
impl ClientCredentials {
	/// Builds a pair, trimming surrounding whitespace from both halves.
	pub fn new(client_id: impl AsRef<str>, client_secret: impl AsRef<str>) -> Self {
		Self {
			client_id: client_id.as_ref().trim().to_owned(),
			client_secret: Secret::new(client_secret.as_ref().trim()),
		}
	}

	/// Builds a pair from optional halves, failing on the first missing or blank one.
	pub fn from_parts(
		client_id: Option<&str>,
		client_secret: Option<&Secret>,
	) -> Result<Self, ConfigError> {
		let client_id = client_id
			.filter(|value| !value.trim().is_empty())
			.ok_or(ConfigError::MissingSetting { name: "XUBIO_CLIENT_ID" })?;
		let client_secret = client_secret
			.filter(|value| !value.is_blank())
			.ok_or(ConfigError::MissingSetting { name: "XUBIO_SECRET_ID" })?;

		Ok(Self::new(client_id, client_secret.expose()))
	}

	/// Value of the `Authorization` header for HTTP Basic client authentication.
	pub fn basic_authorization(&self) -> Secret {
		let raw = format!("{}:{}", self.client_id, self.client_secret.expose());

		Secret::new(format!("Basic {}", STANDARD.encode(raw)))
	}
}

/// Username + password used by cookie-based logins.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginCredentials {
	/// Account e-mail / username.
	pub username: String,
	/// Account password.
	pub password: Secret,
}
impl LoginCredentials {
	/// Builds a credential pair.
	pub fn new(username: impl Into<String>, password: impl Into<Secret>) -> Self {
		Self { username: username.into(), password: password.into() }
	}

	/// Builds a pair from optional halves, failing on the first missing or blank one.
	pub fn from_parts(username: Option<&str>, password: Option<&Secret>) -> Result<Self, ConfigError> {
		let username = username
			.filter(|value| !value.trim().is_empty())
			.ok_or(ConfigError::MissingSetting { name: "XUBIO_USERNAME" })?;
		let password = password
			.filter(|value| !value.is_blank())
			.ok_or(ConfigError::MissingSetting { name: "XUBIO_PASSWORD" })?;

		Ok(Self::new(username.trim(), password.clone()))
	}

	/// Fails when either half is blank.
	pub fn ensure_complete(&self) -> Result<(), ConfigError> {
		Self::from_parts(Some(&self.username), Some(&self.password)).map(|_| ())
	}
}
impl Debug for LoginCredentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LoginCredentials")
			.field("username", &self.username)
			.field("password", &self.password)
			.finish()
	}
}
