//! Crate-level error types shared by the token, session, browser, and dispatch layers.
//!
//! [`Error`] is `Clone` so a single coalesced request outcome can be handed to every waiter;
//! underlying sources are therefore kept behind [`Arc`].

// self
use crate::{_prelude::*, browser::LoginState, shape::ShapeMismatch};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Shared, cloneable error source.
pub type SharedSource = Arc<dyn StdError + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Clone, Debug, ThisError)]
pub enum Error {
	/// Local configuration problem (missing secrets, bad URLs).
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Upstream rejected the credentials or the session.
	#[error("Upstream rejected the request ({}): {message}.", display_status(.status))]
	Authentication {
		/// HTTP status returned by the upstream, when known.
		status: Option<u16>,
		/// Upstream-supplied message.
		message: String,
	},
	/// Response shape violates the expected contract.
	#[error(transparent)]
	Protocol(#[from] ShapeMismatch),
	/// A call exceeded its deadline.
	#[error("{operation} timed out.")]
	Timeout {
		/// Operation label.
		operation: &'static str,
		/// Deadline that fired, when the crate enforced it.
		after: Option<Duration>,
	},
	/// The remote host could not be reached.
	#[error("Network error: cannot reach {host}.")]
	Network {
		/// Host that could not be reached.
		host: String,
		/// Transport failure.
		#[source]
		source: SharedSource,
	},
	/// A browser login step exceeded its bound.
	#[error("Browser login timed out in state {state} after {after}.")]
	LoginTimeout {
		/// State whose bound fired.
		state: LoginState,
		/// Bound that fired.
		after: Duration,
	},
	/// The browser driver failed while executing a login step.
	#[error("Browser login failed in state {state}.")]
	Browser {
		/// State that failed.
		state: LoginState,
		/// Driver failure.
		#[source]
		source: crate::browser::BrowserError,
	},
}
impl Error {
	/// Returns `true` for failures that may succeed on a later attempt.
	pub fn is_transient(&self) -> bool {
		matches!(self, Self::Timeout { .. } | Self::Network { .. } | Self::LoginTimeout { .. })
	}

	/// Returns the upstream status attached to authentication failures.
	pub fn upstream_status(&self) -> Option<u16> {
		match self {
			Self::Authentication { status, .. } => *status,
			_ => None,
		}
	}

	/// Wraps a transport failure that prevented reaching `host`.
	pub fn network(host: impl Into<String>, src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Network { host: host.into(), source: Arc::new(src) }
	}
}

/// Configuration and validation failures.
#[derive(Clone, Debug, ThisError)]
pub enum ConfigError {
	/// A required secret or credential is not configured.
	#[error("Required setting {name} is not configured.")]
	MissingSetting {
		/// Setting (environment variable) name.
		name: &'static str,
	},
	/// A configured URL cannot be parsed.
	#[error("Setting {var} is not a valid URL.")]
	InvalidUrl {
		/// Setting (environment variable) name.
		var: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// An endpoint path cannot be joined onto its base URL.
	#[error("Endpoint `{endpoint}` cannot be joined onto the base URL.")]
	InvalidEndpoint {
		/// Offending endpoint.
		endpoint: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// The `.env` file exists but could not be parsed.
	#[error("The .env file is malformed near byte {index}.")]
	DotenvParse {
		/// Byte index reported by the parser.
		index: usize,
	},
	/// The `.env` file exists but could not be read.
	#[error("The .env file could not be read ({kind}).")]
	DotenvIo {
		/// I/O error kind.
		kind: std::io::ErrorKind,
	},
	/// HTTP client or request could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying builder failure.
		#[source]
		source: SharedSource,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::HttpClientBuild { source: Arc::new(src) }
	}
}
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

fn display_status(status: &Option<u16>) -> String {
	match status {
		Some(code) => format!("HTTP {code}"),
		None => "no status".into(),
	}
}
