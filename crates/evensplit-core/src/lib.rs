//! evensplit core - the client session lifecycle for the evensplit
//! expense-splitting service.
//!
//! Data flows one way: a call goes out through [`api::ApiClient`], a
//! failure is routed through [`interceptor::AuthErrorInterceptor`], an
//! `Unauthorized` clears the [`auth::SessionStore`], and the
//! [`navigation::Navigator`] follows the session back to the login flow.

pub mod api;
pub mod auth;
pub mod config;
pub mod interceptor;
pub mod navigation;

pub use api::{ApiClient, ApiError, ApiRequest};
pub use auth::{AuthState, DeviceStorage, SessionStore, SessionWatch};
pub use config::Config;
pub use interceptor::{
    handle_auth_error, AuthErrorInterceptor, CallOutcome, ChannelNotifier, ExpiryNotifier,
    LogNotifier, SessionExpired,
};
pub use navigation::{Flow, NavigationError, Navigator, Route};
