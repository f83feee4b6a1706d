//! Session plumbing for the Xubio API: cached client-credentials tokens, cookie sessions obtained
//! from a login service or a headless browser, and a request dispatcher that coalesces GETs and
//! retries once on `401`.
//!
//! All state is process-memory only. Every cache-gated operation is safe to execute redundantly,
//! so a cold start (or a second process) simply re-fetches instead of sharing state.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod browser;
pub mod cache;
pub mod client;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod obs;
pub mod proxy;
pub mod session;
pub mod shape;
pub mod token;

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::Mutex;
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError, Method, StatusCode};
	pub use serde::{Deserialize, Serialize};
	pub use serde_json::Value;
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use client::XubioClient;
pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _, temp_env as _};
