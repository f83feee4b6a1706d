//! Canonical session cookie shape and `Cookie` header rendering.

// self
use crate::_prelude::*;

/// `SameSite` attribute of a cookie.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SameSite {
	/// Sent only for same-site requests.
	Strict,
	/// Sent for same-site requests and top-level navigations.
	#[default]
	Lax,
	/// Sent for every request.
	None,
}
impl SameSite {
	/// Parses a driver-reported label, case-insensitively.
	///
	/// Unknown labels map to [`SameSite::Lax`].
	pub fn from_label(label: &str) -> Self {
		match label.trim().to_ascii_lowercase().as_str() {
			"strict" => Self::Strict,
			"none" | "no_restriction" => Self::None,
			_ => Self::Lax,
		}
	}

	/// Returns the attribute spelling.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Strict => "Strict",
			Self::Lax => "Lax",
			Self::None => "None",
		}
	}
}
impl Display for SameSite {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Session cookie in the shape exchanged with the login service.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
	/// Cookie name.
	pub name: String,
	/// Cookie value; treated as a credential.
	pub value: String,
	/// Domain the cookie is scoped to.
	pub domain: String,
	/// Path the cookie is scoped to.
	pub path: String,
	/// Expiry as Unix seconds; `None` for session cookies.
	pub expires: Option<i64>,
	/// `HttpOnly` flag.
	pub http_only: bool,
	/// `Secure` flag.
	pub secure: bool,
	/// `SameSite` attribute.
	pub same_site: SameSite,
}
impl Cookie {
	/// Creates a host cookie with default attributes.
	pub fn new(name: impl Into<String>, value: impl Into<String>, domain: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			value: value.into(),
			domain: domain.into(),
			path: "/".into(),
			expires: None,
			http_only: false,
			secure: false,
			same_site: SameSite::Lax,
		}
	}

	/// Returns `true` when the cookie belongs to `domain` or one of its subdomains.
	pub fn matches_domain(&self, domain: &str) -> bool {
		let own = self.domain.trim_start_matches('.').to_ascii_lowercase();
		let target = domain.trim_start_matches('.').to_ascii_lowercase();

		own == target || own.ends_with(&format!(".{target}"))
	}
}
impl Debug for Cookie {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Cookie")
			.field("name", &self.name)
			.field("value", &"<redacted>")
			.field("domain", &self.domain)
			.field("path", &self.path)
			.field("expires", &self.expires)
			.field("http_only", &self.http_only)
			.field("secure", &self.secure)
			.field("same_site", &self.same_site)
			.finish()
	}
}

/// Renders cookies as a `Cookie` request header value (`name=value; name2=value2`).
pub fn cookie_header(cookies: &[Cookie]) -> String {
	cookies
		.iter()
		.map(|cookie| format!("{}={}", cookie.name, cookie.value))
		.collect::<Vec<_>>()
		.join("; ")
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn header_joins_name_value_pairs() {
		let cookies = [Cookie::new("SESSION", "abc", "xubio.com"), Cookie::new("XSRF", "x1", "xubio.com")];

		assert_eq!(cookie_header(&cookies), "SESSION=abc; XSRF=x1");
		assert_eq!(cookie_header(&[]), "");
	}

	#[test]
	fn domain_matching_accepts_subdomains_only() {
		let dotted = Cookie::new("a", "1", ".xubio.com");
		let sub = Cookie::new("a", "1", "app.xubio.com");
		let foreign = Cookie::new("a", "1", "connect.visma.com");
		let lookalike = Cookie::new("a", "1", "notxubio.com");

		assert!(dotted.matches_domain("xubio.com"));
		assert!(sub.matches_domain("xubio.com"));
		assert!(!foreign.matches_domain("xubio.com"));
		assert!(!lookalike.matches_domain("xubio.com"));
	}

	#[test]
	fn serializes_in_login_service_shape() {
		let cookie = Cookie::new("SESSION", "abc", "xubio.com");
		let json = serde_json::to_value(&cookie).expect("Cookie should serialize.");

		assert_eq!(json["httpOnly"], Value::Bool(false));
		assert_eq!(json["sameSite"], Value::String("Lax".into()));
		assert!(!format!("{cookie:?}").contains("abc"));
	}

	#[test]
	fn same_site_labels_parse_leniently() {
		assert_eq!(SameSite::from_label("STRICT"), SameSite::Strict);
		assert_eq!(SameSite::from_label("no_restriction"), SameSite::None);
		assert_eq!(SameSite::from_label(""), SameSite::Lax);
	}
}
