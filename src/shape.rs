//! Response parsers and validators.
//!
//! Every accepted field alias is listed here once. Callers receive either a fully validated value
//! or a [`ShapeMismatch`]; no call site guesses field names on its own.

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::{Cookie, SameSite, Secret},
};

/// Field names accepted for the bearer token, in order of preference.
pub const TOKEN_FIELD_ALIASES: [&str; 2] = ["access_token", "token"];
/// Field names accepted for the upstream error message, in order of preference.
pub const ERROR_MESSAGE_ALIASES: [&str; 2] = ["message", "error"];
/// Token lifetime assumed when the token endpoint omits `expires_in`.
pub const DEFAULT_EXPIRES_IN: Duration = Duration::seconds(3_600);
/// Longest token lifetime honored; larger advertised values are capped to it.
pub const MAX_EXPIRES_IN: Duration = Duration::days(1);

/// Raised when a response violates the expected contract.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ShapeMismatch {
	/// Body is not JSON or a field has the wrong type.
	#[error("{context} response is malformed at `{path}`: {message}.")]
	Malformed {
		/// Response being parsed.
		context: &'static str,
		/// JSON path of the failure.
		path: String,
		/// Parser message.
		message: String,
	},
	/// A required field (or all of its aliases) is absent.
	#[error("{context} response is missing {field}.")]
	MissingField {
		/// Response being parsed.
		context: &'static str,
		/// Field label, including aliases.
		field: &'static str,
	},
	/// A field is present but unusable.
	#[error("{context} response has an invalid {field}: {reason}.")]
	InvalidField {
		/// Response being parsed.
		context: &'static str,
		/// Field name.
		field: &'static str,
		/// Why the value was rejected.
		reason: String,
	},
	/// The login service answered `success: false`.
	#[error("Login service reported an unsuccessful login.")]
	LoginUnsuccessful,
	/// The login service returned an empty cookie array.
	#[error("Login service returned an empty cookies array.")]
	EmptyCookies,
}

/// Validated token endpoint reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenGrant {
	/// Bearer token.
	pub access_token: Secret,
	/// Advertised lifetime.
	pub expires_in: Duration,
}

/// Parsed `GET /health` reply of the login service.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct LoginServiceHealth {
	/// Reported status (`ok` when healthy).
	pub status: String,
	/// Service name.
	#[serde(default)]
	pub service: Option<String>,
	/// Server timestamp, verbatim.
	#[serde(default)]
	pub timestamp: Option<String>,
}
impl LoginServiceHealth {
	/// Returns `true` when the service reports `ok`.
	pub fn is_ok(&self) -> bool {
		self.status.eq_ignore_ascii_case("ok")
	}
}

#[derive(Deserialize)]
struct RawTokenGrant {
	#[serde(default)]
	access_token: Option<String>,
	#[serde(default)]
	token: Option<String>,
	#[serde(default)]
	expires_in: Option<Value>,
}

#[derive(Deserialize)]
struct RawLoginReply {
	#[serde(default)]
	success: Option<bool>,
	#[serde(default)]
	cookies: Option<Vec<RawCookie>>,
}

#[derive(Deserialize)]
struct RawErrorReply {
	#[serde(default)]
	message: Option<Value>,
	#[serde(default)]
	error: Option<Value>,
}

/// Cookie as reported by the login service or a browser driver, before normalization.
#[derive(Clone, Debug, Deserialize)]
pub(crate) struct RawCookie {
	name: String,
	value: String,
	#[serde(default)]
	domain: Option<String>,
	#[serde(default)]
	path: Option<String>,
	#[serde(default)]
	expires: Option<f64>,
	#[serde(default)]
	expiry: Option<f64>,
	#[serde(default, rename = "httpOnly", alias = "http_only")]
	http_only: Option<bool>,
	#[serde(default)]
	secure: Option<bool>,
	#[serde(default, rename = "sameSite", alias = "same_site")]
	same_site: Option<String>,
}
impl RawCookie {
	/// Normalizes into the canonical [`Cookie`] shape.
	///
	/// Negative or missing expiry means a session cookie; `sameSite` defaults to `Lax`.
	pub(crate) fn normalize(self) -> Cookie {
		let expires = self
			.expires
			.or(self.expiry)
			.filter(|secs| secs.is_finite() && *secs >= 0.)
			.map(|secs| secs.trunc() as i64);

		Cookie {
			name: self.name,
			value: self.value,
			domain: self.domain.unwrap_or_default(),
			path: self.path.unwrap_or_else(|| "/".into()),
			expires,
			http_only: self.http_only.unwrap_or(false),
			secure: self.secure.unwrap_or(false),
			same_site: self.same_site.as_deref().map(SameSite::from_label).unwrap_or_default(),
		}
	}
}

/// Decodes `body` as `T`, reporting the failing JSON path.
pub(crate) fn decode<T>(context: &'static str, body: &[u8]) -> Result<T, ShapeMismatch>
where
	T: DeserializeOwned,
{
	let mut de = serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(&mut de).map_err(|err| ShapeMismatch::Malformed {
		context,
		path: err.path().to_string(),
		message: err.inner().to_string(),
	})
}

/// Validates a token endpoint reply.
///
/// Accepts [`TOKEN_FIELD_ALIASES`]; `expires_in` may be a number or a numeric string,
/// defaults to [`DEFAULT_EXPIRES_IN`], and is capped at [`MAX_EXPIRES_IN`].
pub fn parse_token_grant(body: &[u8]) -> Result<TokenGrant, ShapeMismatch> {
	const CONTEXT: &str = "Token endpoint";

	let raw: RawTokenGrant = decode(CONTEXT, body)?;
	let access_token = [raw.access_token, raw.token]
		.into_iter()
		.flatten()
		.find(|value| !value.trim().is_empty())
		.ok_or(ShapeMismatch::MissingField { context: CONTEXT, field: "access_token/token" })?;
	let expires_in = match raw.expires_in {
		None | Some(Value::Null) => DEFAULT_EXPIRES_IN,
		Some(value) => parse_expires_in(CONTEXT, &value)?,
	};

	Ok(TokenGrant { access_token: Secret::new(access_token), expires_in })
}

fn parse_expires_in(context: &'static str, value: &Value) -> Result<Duration, ShapeMismatch> {
	let invalid = |reason: &str| ShapeMismatch::InvalidField {
		context,
		field: "expires_in",
		reason: reason.into(),
	};
	let secs = match value {
		Value::Number(number) => number
			.as_i64()
			.or_else(|| number.as_f64().map(|secs| secs.trunc() as i64))
			.ok_or_else(|| invalid("not representable"))?,
		Value::String(text) => text.trim().parse::<i64>().map_err(|_| invalid("not an integer"))?,
		_ => return Err(invalid("expected a number")),
	};

	if secs <= 0 {
		return Err(invalid("must be positive"));
	}

	Ok(Duration::seconds(secs).min(MAX_EXPIRES_IN))
}

/// Validates a successful `/login` reply and returns its normalized cookies.
pub fn parse_login_reply(body: &[u8]) -> Result<Vec<Cookie>, ShapeMismatch> {
	const CONTEXT: &str = "Login service";

	let raw: RawLoginReply = decode(CONTEXT, body)?;

	if raw.success == Some(false) {
		return Err(ShapeMismatch::LoginUnsuccessful);
	}

	let cookies = raw.cookies.ok_or(ShapeMismatch::MissingField { context: CONTEXT, field: "cookies" })?;

	if cookies.is_empty() {
		return Err(ShapeMismatch::EmptyCookies);
	}

	Ok(cookies.into_iter().map(RawCookie::normalize).collect())
}

/// Extracts an upstream error message using [`ERROR_MESSAGE_ALIASES`].
///
/// Returns `None` when the body is not JSON or carries no usable message.
pub fn parse_error_message(body: &[u8]) -> Option<String> {
	let raw: RawErrorReply = decode("Error", body).ok()?;

	[raw.message, raw.error].into_iter().flatten().find_map(|value| match value {
		Value::String(text) if !text.trim().is_empty() => Some(text),
		_ => None,
	})
}

/// Validates a login service health reply.
pub fn parse_health(body: &[u8]) -> Result<LoginServiceHealth, ShapeMismatch> {
	decode("Login service health", body)
}
