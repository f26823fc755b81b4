//! DougChat client - terminal chat.
//!
//! # Commands
//!
//! - `dougchat register`: Create an account and sign in
//! - `dougchat login`: Sign in to an existing account
//! - `dougchat logout`: Sign out and forget the stored session
//! - `dougchat whoami`: Show the signed-in user
//! - `dougchat chat`: Open the chat room
//!
//! # Environment Variables
//!
//! See the [`config`](dougchat_client::config) module for available
//! configuration options.

use std::io::{self, Write};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures_util::future::BoxFuture;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use dougchat_client::api::{ApiError, ChatApi};
use dougchat_client::config::Config;
use dougchat_client::forms::{AuthForm, AuthMode, FormOutcome};
use dougchat_client::page::{ChatPage, PageError, PageMode, SubmitOutcome};
use dougchat_client::prompt;
use dougchat_client::realtime;
use dougchat_client::session::SessionFile;
use dougchat_client::types::Message;

/// Typed in the chat to load the next older page.
const OLDER_COMMAND: &str = "/more";

/// Typed in the chat to leave.
const QUIT_COMMAND: &str = "/quit";

type PageLoad = BoxFuture<'static, Result<Vec<Message>, ApiError>>;

/// DougChat - realtime chat in the terminal.
#[derive(Parser, Debug)]
#[command(name = "dougchat")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    DOUGCHAT_SERVER_URL        Server URL (required)
    DOUGCHAT_SESSION_PATH      Session token file (default: ~/.dougchat/session)
    RUST_LOG                   Log filter for stderr output (default: warn)

EXAMPLES:
    # Create an account
    dougchat register --email ann@example.com

    # Chat, loading older messages with /more
    dougchat chat --paginate")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new account and sign in.
    Register {
        /// Account email. Prompted for when omitted.
        #[arg(short, long)]
        email: Option<String>,
    },

    /// Log in to an existing account.
    Login {
        /// Account email. Prompted for when omitted.
        #[arg(short, long)]
        email: Option<String>,
    },

    /// Sign out and remove the stored session.
    Logout,

    /// Show the signed-in user.
    Whoami,

    /// Open the chat room.
    ///
    /// Type a line and press Enter to send it. Ctrl+C or /quit leaves.
    Chat {
        /// Load older messages on /more.
        #[arg(short, long)]
        paginate: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let config = Config::from_env().context("Failed to load configuration")?;
    let session_file = SessionFile::new(&config.session_path);

    // Prompt before starting the runtime; stdin reads here are blocking.
    let form = match &cli.command {
        Command::Register { email } => Some(fill_form(AuthMode::Register, email.clone())?),
        Command::Login { email } => Some(fill_form(AuthMode::Login, email.clone())?),
        _ => None,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    runtime.block_on(async {
        match (cli.command, form) {
            (Command::Register { .. } | Command::Login { .. }, Some(form)) => {
                run_auth(&config, &session_file, form).await
            }
            (Command::Logout, _) => run_logout(&config, &session_file).await,
            (Command::Whoami, _) => run_whoami(&config, &session_file).await,
            (Command::Chat { paginate }, _) => {
                let mode = if paginate {
                    PageMode::Paginated
                } else {
                    PageMode::PushOnly
                };
                run_chat(&config, &session_file, mode).await
            }
            (Command::Register { .. } | Command::Login { .. }, None) => {
                bail!("auth form was not filled in")
            }
        }
    })
}

/// Prompts for whatever the command line did not provide.
fn fill_form(mode: AuthMode, email: Option<String>) -> Result<AuthForm> {
    let mut form = AuthForm::with_mode(mode);
    eprintln!("{}", mode.title());

    let email = match email {
        Some(email) => email,
        None => prompt::read_line("Email: ").context("Failed to read email")?,
    };
    form.set_email(email);
    form.set_password(prompt::read_password("Password: ").context("Failed to read password")?);

    Ok(form)
}

/// Signs in or up, then stores the session token.
async fn run_auth(config: &Config, session_file: &SessionFile, mut form: AuthForm) -> Result<()> {
    let api = ChatApi::new(&config.server_url, None).context("Failed to create HTTP client")?;
    let mode = form.mode();

    match form.submit(&api).await {
        FormOutcome::SignedIn(session) => {
            session_file
                .save(&session.access_token)
                .context("Failed to store session")?;
            info!(user_id = %session.user.id, "Signed in");
            println!(
                "Signed in as {}",
                session.user.email.as_deref().unwrap_or(&session.user.id)
            );
            Ok(())
        }
        FormOutcome::Invalid | FormOutcome::Failed => {
            let error = form.error().unwrap_or("Something went wrong").to_string();
            let other = mode.toggled();
            eprintln!(
                "{} {}: dougchat {}",
                mode.prompt(),
                mode.toggle_label(),
                command_name(other)
            );
            bail!(error)
        }
    }
}

fn command_name(mode: AuthMode) -> &'static str {
    match mode {
        AuthMode::Login => "login",
        AuthMode::Register => "register",
    }
}

async fn run_logout(config: &Config, session_file: &SessionFile) -> Result<()> {
    if let Some(token) = session_file.load().context("Failed to read session")? {
        let api = ChatApi::new(&config.server_url, Some(token))
            .context("Failed to create HTTP client")?;
        if let Err(err) = api.sign_out().await {
            warn!(error = %err, "Sign-out request failed, forgetting session anyway");
        }
    }

    session_file.clear().context("Failed to remove session")?;
    println!("Signed out");
    Ok(())
}

async fn run_whoami(config: &Config, session_file: &SessionFile) -> Result<()> {
    let token = session_file.load().context("Failed to read session")?;
    let api = ChatApi::new(&config.server_url, token).context("Failed to create HTTP client")?;

    match api.current_user().await.context("Failed to look up user")? {
        Some(user) => println!("{}", user.email.unwrap_or(user.id)),
        None => println!("Not signed in"),
    }
    Ok(())
}

/// Runs the chat page until Ctrl+C, /quit, end of input or the feed closing.
async fn run_chat(config: &Config, session_file: &SessionFile, mode: PageMode) -> Result<()> {
    let Some(token) = session_file.load().context("Failed to read session")? else {
        bail!("Not signed in. Run `dougchat login` or `dougchat register` first.");
    };
    let api = ChatApi::new(&config.server_url, Some(token.clone()))
        .context("Failed to create HTTP client")?;

    let mut page = match ChatPage::mount(api, mode).await {
        Ok(page) => page,
        Err(err) => {
            if matches!(err, PageError::Fetch(ApiError::NotAuthenticated)) {
                bail!("Session expired. Run `dougchat login` to sign in again.");
            }
            return Err(err).context("Failed to load messages");
        }
    };
    let mut subscription = realtime::subscribe(&config.server_url, &token)
        .await
        .context("Failed to subscribe to new messages")?;

    for message in page.messages() {
        println!("{}", message.display_line());
    }
    if mode == PageMode::Paginated {
        eprintln!("(type {OLDER_COMMAND} for older messages)");
    }
    page.take_scroll_request();
    io::stdout().flush()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pending: Option<PageLoad> = None;

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Ctrl+C received, leaving chat");
                break;
            }

            row = subscription.recv() => {
                let Some(row) = row else {
                    eprintln!("Realtime connection closed");
                    break;
                };
                if let Some(message) = page.on_insert(&row) {
                    println!("{}", message.display_line());
                }
            }

            result = next_page(&mut pending), if pending.is_some() => {
                pending = None;
                match page.finish_load_older(result) {
                    Ok(0) => eprintln!("(no older messages)"),
                    Ok(added) => {
                        println!("--- {added} older messages ---");
                        for message in &page.messages()[..added] {
                            println!("{}", message.display_line());
                        }
                        println!("---");
                    }
                    Err(err) => eprintln!("{err}"),
                }
            }

            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read input")? else {
                    break;
                };
                let input = line.trim();
                match input {
                    QUIT_COMMAND => break,
                    OLDER_COMMAND => match page.begin_load_older() {
                        Some(offset) => {
                            let api = page.backend().clone();
                            pending = Some(Box::pin(async move { api.fetch_page(offset).await }));
                        }
                        None if page.is_loading() => eprintln!("(already loading)"),
                        None => eprintln!("(no older messages)"),
                    },
                    _ => {
                        page.set_draft(input);
                        match page.submit().await {
                            Ok(SubmitOutcome::Sent | SubmitOutcome::EmptyDraft) => {}
                            Ok(SubmitOutcome::NoUser) => eprintln!("Not signed in; message not sent"),
                            Err(err) => eprintln!("{err}"),
                        }
                    }
                }
            }
        }

        if page.take_scroll_request() {
            io::stdout().flush()?;
        }
    }

    subscription.unsubscribe();
    Ok(())
}

/// Resolves with the in-flight older-page load. Never resolves when idle.
async fn next_page(pending: &mut Option<PageLoad>) -> Result<Vec<Message>, ApiError> {
    match pending {
        Some(load) => load.await,
        None => std::future::pending().await,
    }
}

/// Logs to stderr so chat output on stdout stays clean.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .compact()
        .with_target(true)
        .init();
}
