#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! HTTP GET helper with phase timeouts and scoped response bodies
//!
//! A [`Getter`] owns one pooled hyper transport, built once and shared by
//! every call, with a single timeout applied to:
//! - connection setup (DNS, dial, TLS handshake via rustls)
//! - waiting for the response headers, from the moment the connection is
//!   ready and again on every redirect hop
//!
//! Two operations are exposed through the [`HttpGetter`] trait:
//! - [`HttpGetter::get`] returns the response with an open [`Body`] the caller
//!   must read and close
//! - [`HttpGetter::wrap_get`] hands the response to a callback and closes the
//!   body afterwards on every exit path
//!
//! Timeouts are reported as [`GetError::Timeout`], and their messages contain
//! "timeout". Nothing is retried.
//!
//! # Example
//!
//! ```ignore
//! use http_getter::{Getter, HttpGetter};
//! use std::time::Duration;
//!
//! let getter = Getter::new(Duration::ZERO); // 3s default
//!
//! let mut resp = getter.get("https://example.com/").await?;
//! let body = resp.body_mut().bytes().await?;
//! resp.into_body().close().await;
//! ```

mod capability;
mod config;
mod connector;
mod error;
mod getter;
mod header_timeout;
mod response;

pub use capability::HttpGetter;
pub use config::{BODY_DRAIN_LIMIT, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT, GetterConfig};
pub use connector::TimeoutConnector;
pub use error::{
    BodyError, BoxError, ConnectTimeout, FetchError, GetError, HeaderTimeout, InvalidUriKind,
    TimeoutPhase,
};
pub use getter::Getter;
pub use response::{Body, GetResponse, ResponseBody};
