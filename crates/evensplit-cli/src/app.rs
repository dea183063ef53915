//! Command handling for the evensplit CLI.
//!
//! `App` wires the core pieces together once per process: configuration,
//! the session store hydrated from durable storage, the API client, the
//! auth-error interceptor and the session-gated navigator.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use evensplit_core::api::SignUpRequest;
use evensplit_core::{
    ApiClient, ApiRequest, AuthErrorInterceptor, CallOutcome, ChannelNotifier, Config, Navigator,
    SessionExpired, SessionStore,
};
use futures::future::join_all;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

pub const USAGE: &str = "\
Usage: evensplit <command>

Commands:
  status                 Show whether you are logged in
  login [email]          Log in and remember the session
  signup                 Create an account
  logout                 End the session
  get <path>             GET an API path and print the JSON response
  post <path> <json>     POST a JSON body to an API path
  batch <path>...        GET several paths concurrently
  help                   Show this message

Environment:
  EVENSPLIT_API_URL      Override the API base URL
  EVENSPLIT_LOG_DIR      Also write logs to a daily file in this directory
  RUST_LOG               Log filter (default: warn)";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Status,
    Login { email: Option<String> },
    Signup,
    Logout,
    Get { path: String },
    Post { path: String, body: Value },
    Batch { paths: Vec<String> },
    Help,
}

impl Command {
    pub fn parse(args: &[String]) -> Result<Self> {
        let Some(name) = args.first() else {
            return Ok(Command::Status);
        };
        let rest = &args[1..];

        let command = match name.as_str() {
            "status" => Command::Status,
            "login" => Command::Login {
                email: rest.first().cloned(),
            },
            "signup" => Command::Signup,
            "logout" => Command::Logout,
            "get" => match rest {
                [path] => Command::Get { path: path.clone() },
                _ => bail!("get takes exactly one path"),
            },
            "post" => match rest {
                [path, body] => Command::Post {
                    path: path.clone(),
                    body: serde_json::from_str(body).context("POST body must be valid JSON")?,
                },
                _ => bail!("post takes a path and a JSON body"),
            },
            "batch" if !rest.is_empty() => Command::Batch {
                paths: rest.to_vec(),
            },
            "batch" => bail!("batch takes at least one path"),
            "help" | "-h" | "--help" => Command::Help,
            other => bail!("Unknown command: {}", other),
        };
        Ok(command)
    }
}

pub struct App {
    config: Config,
    session: SessionStore,
    api: ApiClient,
    interceptor: AuthErrorInterceptor,
    notices: UnboundedReceiver<SessionExpired>,
    navigator: Navigator,
}

impl App {
    pub async fn new() -> Result<Self> {
        let config = Config::load()?;
        let storage = config.open_storage()?;
        let session = SessionStore::new(storage);
        let state = session.initialize().await;
        debug!(?state, backend = ?config.storage, "Session initialized");

        let api = ApiClient::with_timeout(
            config.api_base_url.clone(),
            session.clone(),
            config.request_timeout(),
        )?;

        let (notifier, notices) = ChannelNotifier::channel();
        let interceptor = AuthErrorInterceptor::new(session.clone(), Arc::new(notifier));
        let navigator = Navigator::new(session.subscribe());

        Ok(Self {
            config,
            session,
            api,
            interceptor,
            notices,
            navigator,
        })
    }

    pub async fn run(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Status => self.status(),
            Command::Login { email } => self.login(email).await,
            Command::Signup => self.signup().await,
            Command::Logout => self.logout().await,
            Command::Get { path } => self.print_call(ApiRequest::get(path)).await,
            Command::Post { path, body } => self.print_call(ApiRequest::post(path, body)).await,
            Command::Batch { paths } => self.batch(paths).await,
            Command::Help => Ok(()),
        }
    }

    /// Print any session-expired notices raised during the command
    pub fn print_notices(&mut self) {
        while let Ok(notice) = self.notices.try_recv() {
            eprintln!("{}", notice.message());
        }
    }

    pub fn print_flow(&mut self) {
        self.navigator.sync();
        eprintln!("[{}]", self.navigator.current().title());
    }

    fn status(&self) -> Result<()> {
        if self.session.is_authenticated() {
            println!("Logged in ({})", self.config.api_base_url);
        } else {
            println!("Not logged in ({})", self.config.api_base_url);
        }
        Ok(())
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    async fn login(&mut self, email: Option<String>) -> Result<()> {
        let email = match email {
            Some(email) => email,
            None => Self::prompt_with_default("Email", self.config.last_email.as_deref())?,
        };
        if email.is_empty() {
            bail!("Email required");
        }
        let password = rpassword::prompt_password("Password: ")?;

        // Refused credentials say nothing about the current session, so
        // this bypasses the interceptor
        let response = self
            .api
            .login(&email, &password)
            .await
            .context("Login failed")?;

        // Wait for the token to land before anything uses it
        self.session.set_token(Some(response.token)).await;

        self.config.last_email = Some(email);
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }

        info!("Login successful");
        println!("Logged in successfully!");
        Ok(())
    }

    async fn signup(&mut self) -> Result<()> {
        let request = SignUpRequest {
            first_name: Self::prompt("First name")?,
            last_name: Self::prompt("Last name")?,
            username: Self::prompt("Username")?,
            email: Self::prompt("Email")?,
            password: rpassword::prompt_password("Password: ")?,
        };
        if [
            &request.first_name,
            &request.last_name,
            &request.username,
            &request.email,
            &request.password,
        ]
        .iter()
        .any(|field| field.is_empty())
        {
            bail!("All fields are required");
        }

        let response = self
            .api
            .signup(&request)
            .await
            .context("Failed to sign up")?;
        println!(
            "{}",
            response
                .message
                .unwrap_or_else(|| "Account created. You can now log in.".to_string())
        );
        Ok(())
    }

    async fn logout(&mut self) -> Result<()> {
        if !self.session.is_authenticated() {
            println!("Not logged in");
            return Ok(());
        }

        self.session.logout().await;
        println!("Logged out");
        Ok(())
    }

    fn prompt(label: &str) -> Result<String> {
        Self::prompt_with_default(label, None)
    }

    fn prompt_with_default(label: &str, default: Option<&str>) -> Result<String> {
        match default {
            Some(value) => print!("{} [{}]: ", label, value),
            None => print!("{}: ", label),
        }
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim();

        Ok(match default {
            Some(value) if input.is_empty() => value.to_string(),
            _ => input.to_string(),
        })
    }

    // =========================================================================
    // API calls
    // =========================================================================

    /// Run a request through the auth-error policy.
    /// `Ok(None)` means the session ended and the user has been notified.
    async fn call(&self, request: ApiRequest) -> Result<Option<Value>> {
        let endpoint = request.endpoint.clone();
        match self.interceptor.intercept(self.api.execute(request).await).await {
            CallOutcome::Done(value) => Ok(Some(value)),
            CallOutcome::LoggedOut => Ok(None),
            CallOutcome::Failed(e) => Err(e).with_context(|| format!("Request to {} failed", endpoint)),
        }
    }

    async fn print_call(&self, request: ApiRequest) -> Result<()> {
        if let Some(value) = self.call(request).await? {
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Ok(())
    }

    /// Issue every GET at once; each failure goes through the interceptor
    /// independently, so a shared expiry yields one notice.
    async fn batch(&self, paths: Vec<String>) -> Result<()> {
        let results = join_all(
            paths
                .iter()
                .map(|path| self.call(ApiRequest::get(path.clone()))),
        )
        .await;

        let mut failures = 0;
        for (path, result) in paths.iter().zip(results) {
            match result {
                Ok(Some(value)) => println!("{}: {}", path, value),
                Ok(None) => println!("{}: session ended", path),
                Err(e) => {
                    failures += 1;
                    println!("{}: {:#}", path, e);
                }
            }
        }

        if failures > 0 {
            bail!("{} of {} requests failed", failures, paths.len());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_defaults_to_status() {
        assert_eq!(Command::parse(&[]).unwrap(), Command::Status);
    }

    #[test]
    fn test_parse_login() {
        assert_eq!(
            Command::parse(&args(&["login"])).unwrap(),
            Command::Login { email: None }
        );
        assert_eq!(
            Command::parse(&args(&["login", "ada@example.com"])).unwrap(),
            Command::Login {
                email: Some("ada@example.com".into())
            }
        );
    }

    #[test]
    fn test_parse_post_body() {
        let cmd = Command::parse(&args(&["post", "/groups", r#"{"name":"Trip"}"#])).unwrap();
        assert_eq!(
            cmd,
            Command::Post {
                path: "/groups".into(),
                body: serde_json::json!({ "name": "Trip" }),
            }
        );
        assert!(Command::parse(&args(&["post", "/groups", "{nope"])).is_err());
        assert!(Command::parse(&args(&["post", "/groups"])).is_err());
    }

    #[test]
    fn test_parse_get_and_batch() {
        assert_eq!(
            Command::parse(&args(&["get", "/groups"])).unwrap(),
            Command::Get {
                path: "/groups".into()
            }
        );
        assert!(Command::parse(&args(&["get"])).is_err());
        assert_eq!(
            Command::parse(&args(&["batch", "/groups", "/invitations"])).unwrap(),
            Command::Batch {
                paths: vec!["/groups".into(), "/invitations".into()]
            }
        );
        assert!(Command::parse(&args(&["batch"])).is_err());
    }

    #[test]
    fn test_parse_unknown() {
        let err = Command::parse(&args(&["settle"])).unwrap_err();
        assert!(err.to_string().contains("Unknown command"));
        assert_eq!(Command::parse(&args(&["--help"])).unwrap(), Command::Help);
    }
}
