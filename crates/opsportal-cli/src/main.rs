//! opsportal - operator CLI for the ops portal session.
//!
//! Logs in against the CMS, keeps the stored session fresh, and reports its
//! state. The portal screens call the same session layer; this binary is the
//! headless way to drive it.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use opsportal_core::{ApiClient, AuthError, Config, SessionManager};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ============================================================================
// Constants
// ============================================================================

/// Log file name inside the cache directory
const LOG_FILE_PREFIX: &str = "opsportal.log";

const USAGE: &str = "\
Usage: opsportal <command>

Commands:
  login [email]   Log in and verify administrator access
  logout          End the session and forget the stored tokens
  status          Show the stored session without contacting the server
  check           Verify the stored session against the server
  token           Print a fresh access token (refreshing if needed)
  watch           Keep the session renewed until interrupted
";

/// Initialize the tracing subscriber for logging.
/// Stderr gets `RUST_LOG` (default `warn`); the cache dir log file gets `info`.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr_layer = fmt::layer().with_writer(io::stderr).with_filter(filter);

    let file = config.cache_dir().ok().and_then(|dir| {
        std::fs::create_dir_all(&dir).ok()?;
        let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
        Some(tracing_appender::non_blocking(appender))
    });

    match file {
        Some((writer, guard)) => {
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(EnvFilter::new("info"));
            tracing_subscriber::registry()
                .with(stderr_layer)
                .with(file_layer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(stderr_layer).init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let mut config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config ({}), using defaults", e);
            Config::default()
        }
    };
    let _log_guard = init_tracing(&config);

    let args: Vec<String> = std::env::args().collect();
    let Some(command) = args.get(1) else {
        eprint!("{}", USAGE);
        std::process::exit(2);
    };

    let api = ApiClient::new(&config.base_url, config.request_timeout())?;
    info!(command = %command, base_url = %api.base_url(), "opsportal starting");
    let storage = config.open_storage()?;
    let session = SessionManager::with_storage(Arc::new(api), storage, config.session_options());

    let result = match command.as_str() {
        "login" => login(&session, &mut config, args.get(2).cloned()).await,
        "logout" => {
            session.logout().await;
            println!("Logged out.");
            Ok(())
        }
        "status" => {
            print_status(&session);
            Ok(())
        }
        "check" => check(&session).await,
        "token" => {
            let token = session.authorized_token().await.map_err(explain)?;
            println!("{}", token);
            Ok(())
        }
        "watch" => watch(&session, &config).await,
        "-h" | "--help" | "help" => {
            print!("{}", USAGE);
            Ok(())
        }
        other => {
            eprint!("Unknown command: {}\n\n{}", other, USAGE);
            std::process::exit(2);
        }
    };

    session.shutdown();
    result
}

async fn login(session: &SessionManager, config: &mut Config, email_arg: Option<String>) -> Result<()> {
    let email = match email_arg
        .or_else(|| std::env::var("OPSPORTAL_EMAIL").ok())
        .filter(|e| !e.trim().is_empty())
    {
        Some(email) => email,
        None => prompt_email(config.last_email.as_deref())?,
    };
    let password = match std::env::var("OPSPORTAL_PASSWORD") {
        Ok(p) if !p.is_empty() => p,
        _ => rpassword::prompt_password("Password: ")?,
    };

    eprintln!("Authenticating...");
    session.login(&email, &password).await.map_err(explain)?;
    let check = session.check_authentication().await.map_err(explain)?;

    config.last_email = Some(email);
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }

    println!("Logged in as {}.", check.user.display_name());
    Ok(())
}

fn prompt_email(last: Option<&str>) -> Result<String> {
    match last {
        Some(last) => print!("Email [{}]: ", last),
        None => print!("Email: "),
    }
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input).context("Failed to read email")?;
    let input = input.trim();

    match (input.is_empty(), last) {
        (true, Some(last)) => Ok(last.to_string()),
        (true, None) => Err(anyhow::anyhow!("Email required")),
        (false, _) => Ok(input.to_string()),
    }
}

async fn check(session: &SessionManager) -> Result<()> {
    let check = session.check_authentication().await.map_err(explain)?;
    let user = &check.user;
    println!("Session valid.");
    println!("  User:  {} <{}>", user.display_name(), user.email);
    if let Some(role) = user.role.as_ref() {
        println!("  Role:  {}", role.name().unwrap_or_else(|| role.id()));
    }
    print_status(session);
    Ok(())
}

fn print_status(session: &SessionManager) {
    let status = session.token_status();
    println!("  State: {}", session.state());
    if status.has_tokens {
        let expiry = session
            .credential_store()
            .current()
            .map(|p| p.expires_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        println!(
            "  Token: {} ({}m left, expires {})",
            if status.is_expired { "needs refresh" } else { "fresh" },
            status.minutes_remaining(),
            expiry
        );
    } else {
        println!("  Token: none - run `opsportal login`");
    }
}

async fn watch(session: &SessionManager, config: &Config) -> Result<()> {
    session.check_authentication().await.map_err(explain)?;
    session.start_auto_refresh(config.auto_refresh_interval());
    println!(
        "Keeping session fresh (checking every {}s, renewing {}s before expiry). Press Ctrl+C to stop.",
        config.auto_refresh_interval().as_secs(),
        session.options().refresh_buffer.as_secs()
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    session.stop_auto_refresh();
    print_status(session);
    Ok(())
}

/// Turn a session error into a message an operator can act on.
fn explain(err: AuthError) -> anyhow::Error {
    let hint = match &err {
        AuthError::Authentication(_) => "Check the email and password.",
        AuthError::Network(_) => "Unable to reach the server. Try again.",
        AuthError::SessionExpired(_) | AuthError::NoSession => "Run `opsportal login`.",
        AuthError::AccessDenied(_) => "This portal is limited to administrators.",
        AuthError::Remote(_) => "The server sent an unexpected response.",
    };
    anyhow::anyhow!("{} {}", err, hint)
}
