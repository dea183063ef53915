//! Shared policy for failed API calls.
//!
//! Every call site routes its `ApiError` through here before presenting
//! anything. `Unauthorized` ends the session and is fully handled; every
//! other kind is returned to the caller untouched.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::api::ApiError;
use crate::auth::{AuthState, SessionStore};

/// User-facing text for an expired session
pub const SESSION_EXPIRED_MESSAGE: &str = "Your session is expired. Please log in again.";

/// Emitted once when a live session is ended by an `Unauthorized` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionExpired {
    pub at: DateTime<Utc>,
}

impl SessionExpired {
    pub fn now() -> Self {
        Self { at: Utc::now() }
    }

    pub fn message(&self) -> &'static str {
        SESSION_EXPIRED_MESSAGE
    }
}

/// Delivers the session-expired notice to the user.
pub trait ExpiryNotifier: Send + Sync {
    fn session_expired(&self, notice: &SessionExpired);
}

/// Writes the notice to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl ExpiryNotifier for LogNotifier {
    fn session_expired(&self, notice: &SessionExpired) {
        warn!(at = %notice.at, "{}", notice.message());
    }
}

/// Forwards notices to a channel, for front ends that render them later.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<SessionExpired>,
}

impl ChannelNotifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionExpired>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ExpiryNotifier for ChannelNotifier {
    fn session_expired(&self, notice: &SessionExpired) {
        if self.tx.send(notice.clone()).is_err() {
            debug!("Expiry notice dropped, receiver gone");
        }
    }
}

/// Decide whether `error` ends the session.
///
/// Returns `true` when the error was `Unauthorized`: the token is cleared
/// and the caller must not report the error itself. The notice fires only
/// for the call that moved the session from authenticated to anonymous, so
/// concurrent failures from one expiry produce a single notice.
pub async fn handle_auth_error(
    error: &ApiError,
    session: &SessionStore,
    notifier: &dyn ExpiryNotifier,
) -> bool {
    if !error.is_unauthorized() {
        return false;
    }

    let previous = session.set_token(None).await;
    if previous == AuthState::Authenticated {
        notifier.session_expired(&SessionExpired::now());
    } else {
        debug!("Unauthorized while already anonymous, no notice");
    }
    true
}

/// Result of a call after the auth-error policy has run.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome<T> {
    Done(T),
    /// The session ended; the user has already been told
    LoggedOut,
    /// Left for the caller to present
    Failed(ApiError),
}

impl<T> CallOutcome<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            CallOutcome::Done(value) => Some(value),
            _ => None,
        }
    }
}

/// `handle_auth_error` bound to a session and notifier.
#[derive(Clone)]
pub struct AuthErrorInterceptor {
    session: SessionStore,
    notifier: Arc<dyn ExpiryNotifier>,
}

impl AuthErrorInterceptor {
    pub fn new(session: SessionStore, notifier: Arc<dyn ExpiryNotifier>) -> Self {
        Self { session, notifier }
    }

    pub async fn handle(&self, error: &ApiError) -> bool {
        handle_auth_error(error, &self.session, self.notifier.as_ref()).await
    }

    pub async fn intercept<T>(&self, result: Result<T, ApiError>) -> CallOutcome<T> {
        match result {
            Ok(value) => CallOutcome::Done(value),
            Err(e) if self.handle(&e).await => CallOutcome::LoggedOut,
            Err(e) => CallOutcome::Failed(e),
        }
    }
}
