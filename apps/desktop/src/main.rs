use std::{
    io::{self, BufRead, Write},
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use client_core::{AppClient, AuthFlow, ClientError, ClientEvent, SessionState};
use shared::domain::{Account, AccountId, ChatId};
use storage::Storage;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, prepare_database_url};

#[derive(Parser, Debug)]
#[command(name = "desktop", about = "Manage messaging accounts through the backend")]
struct Cli {
    /// Overrides the configured backend base URL.
    #[arg(long)]
    api_url: Option<String>,
    /// Overrides where the session token is kept.
    #[arg(long)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Create a client user (does not sign in).
    Register {
        email: String,
        #[arg(long)]
        password: Option<String>,
    },
    Login {
        email: String,
        #[arg(long)]
        password: Option<String>,
    },
    Logout,
    /// Validate the stored session and show its claims.
    Status,
    Accounts,
    /// Register a phone number and, unless told otherwise, authorize it.
    AddAccount {
        phone_number: String,
        #[arg(long)]
        no_authorize: bool,
    },
    Authorize {
        account_id: i64,
    },
    DeleteAccount {
        account_id: i64,
    },
    LogoutAccount {
        account_id: i64,
    },
    Chats {
        #[arg(long)]
        account_id: Option<i64>,
    },
    Messages {
        account_id: i64,
        chat_id: i64,
    },
}

impl Command {
    fn needs_session(&self) -> bool {
        !matches!(
            self,
            Self::Register { .. } | Self::Login { .. } | Self::Logout
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = load_settings();
    if let Some(api_url) = cli.api_url {
        settings.api_url = api_url;
    }
    if let Some(database_url) = cli.database_url {
        settings.database_url = database_url;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let database_url = prepare_database_url(&settings.database_url);
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(%database_url, %error, "failed to open client database");
        error
    })?;
    let mut client = AppClient::new(&settings.api_url, Arc::new(storage))
        .with_context(|| format!("invalid api url '{}'", settings.api_url))?;
    let mut events = client.subscribe_events();
    info!(api_url = %settings.api_url, "desktop: client ready");

    if cli.command.needs_session()
        && client.session_manager.restore().await == SessionState::Unauthenticated
    {
        bail!("not signed in; run `desktop login <email>` first");
    }

    let outcome = run(&mut client, cli.command).await;
    report_session_events(&mut events);
    outcome
}

async fn run(client: &mut AppClient, command: Command) -> Result<()> {
    match command {
        Command::Register { email, password } => {
            let password = secret_or_prompt(password, "password")?;
            let user = client
                .session_manager
                .register(&email, &password)
                .await
                .map_err(|err| friendly(err, "Registration failed"))?;
            println!(
                "registered {}; sign in with `desktop login`",
                user.email.as_deref().unwrap_or(&email)
            );
        }
        Command::Login { email, password } => {
            let password = secret_or_prompt(password, "password")?;
            client
                .session_manager
                .login(&email, &password)
                .await
                .map_err(|err| friendly(err, "Login failed"))?;
            println!("signed in as {email}");
        }
        Command::Logout => {
            client.session_manager.logout().await;
            println!("signed out");
        }
        Command::Status => print_status(client).await?,
        Command::Accounts => {
            client.accounts.refresh().await?;
            print_accounts(client).await;
        }
        Command::AddAccount {
            phone_number,
            no_authorize,
        } => {
            let account = client
                .accounts
                .create(&phone_number)
                .await
                .map_err(|err| friendly(err, "Failed to add account"))?;
            println!("added account {} ({})", account.id, account.phone_number);
            if !no_authorize {
                authorize(client, account).await?;
            }
        }
        Command::Authorize { account_id } => {
            let account = find_account(client, account_id).await?;
            authorize(client, account).await?;
        }
        Command::DeleteAccount { account_id } => {
            client.accounts.refresh().await?;
            client
                .accounts
                .remove(AccountId(account_id))
                .await
                .map_err(|err| friendly(err, "Failed to delete account"))?;
            println!("deleted account {account_id}");
        }
        Command::LogoutAccount { account_id } => {
            let logged_out = client
                .accounts
                .logout_account(AccountId(account_id))
                .await
                .map_err(|err| friendly(err, "Failed to log out account"))?;
            if logged_out {
                println!("account {account_id} logged out");
            } else {
                println!("account {account_id} had no active session");
            }
        }
        Command::Chats { account_id } => {
            client.accounts.refresh().await?;
            if let Some(account_id) = account_id {
                client.accounts.select(AccountId(account_id)).await?;
            }
            let chats = client
                .accounts
                .chats_for_selected()
                .await
                .map_err(|err| friendly(err, "Failed to load chats"))?;
            for chat in chats {
                println!("{:>12}  {:<32} unread={}", chat.id.0, chat.title, chat.unread_count);
            }
        }
        Command::Messages {
            account_id,
            chat_id,
        } => {
            let messages = client
                .gateway
                .list_messages(AccountId(account_id), ChatId(chat_id))
                .await
                .map_err(|err| friendly(err, "Failed to load messages"))?;
            for message in messages {
                let arrow = if message.is_outgoing { ">" } else { "<" };
                println!(
                    "{} {arrow} {}: {}",
                    message.date.format("%Y-%m-%d %H:%M"),
                    message.sender,
                    message.text
                );
            }
        }
    }
    Ok(())
}

/// Walks the server-driven login steps for one account, prompting on stdin.
/// An empty answer abandons the flow.
async fn authorize(client: &mut AppClient, account: Account) -> Result<()> {
    let label = account.display_name();
    let started = client.auth.start(account).await;
    if let Some(feedback) = step_feedback(started, client.auth.flow())? {
        eprintln!("{feedback}");
    }

    loop {
        let step = match client.auth.flow().clone() {
            AuthFlow::Idle => {
                println!("{label} is authorized");
                return Ok(());
            }
            AuthFlow::CodeNeeded { message, .. } => {
                println!("{message}");
                let code = prompt("verification code")?;
                if code.is_empty() {
                    client.auth.cancel();
                    bail!("authorization cancelled");
                }
                client.auth.submit_code(&code).await
            }
            AuthFlow::PasswordNeeded { message, .. } => {
                println!("{message}");
                let password = prompt("two-factor password")?;
                if password.is_empty() {
                    client.auth.cancel();
                    bail!("authorization cancelled");
                }
                client.auth.submit_password(&password).await
            }
            AuthFlow::Failed { account, message } => {
                println!("{message}");
                if !prompt("start over? [y/N]")?.eq_ignore_ascii_case("y") {
                    client.auth.cancel();
                    bail!("authorization failed for {label}");
                }
                client.auth.start(account).await
            }
        };

        if let Some(feedback) = step_feedback(step, client.auth.flow())? {
            eprintln!("{feedback}");
        }
    }
}

/// Decides what a login step's outcome means for the prompt loop. A rejected
/// session ends the loop; any other failure is reported and the loop asks again.
fn step_feedback<T>(result: client_core::Result<T>, flow: &AuthFlow) -> Result<Option<String>> {
    match result {
        Ok(_) => Ok(None),
        Err(err @ ClientError::Unauthorized) => Err(friendly(err, "Session expired")),
        // a failed start already carries its message in the flow
        Err(_) if matches!(flow, AuthFlow::Failed { .. }) => Ok(None),
        Err(err) => Ok(Some(err.user_message("Request failed; try again"))),
    }
}

async fn find_account(client: &AppClient, account_id: i64) -> Result<Account> {
    client.accounts.refresh().await?;
    client
        .accounts
        .get(AccountId(account_id))
        .await
        .with_context(|| format!("no account with id {account_id}"))
}

async fn print_status(client: &AppClient) -> Result<()> {
    let user = client.session_manager.current_user().await?;
    println!(
        "signed in as {}",
        user.email.as_deref().unwrap_or("<unknown>")
    );
    if let Some(claims) = client.session.claims().await {
        if let Some(exp) = claims.exp.and_then(|exp| DateTime::<Utc>::from_timestamp(exp, 0)) {
            println!("token expires {}", exp.format("%Y-%m-%d %H:%M:%S UTC"));
        }
    }
    Ok(())
}

async fn print_accounts(client: &AppClient) {
    let selected = client.accounts.selected().await.map(|account| account.id);
    let accounts = client.accounts.accounts().await;
    if accounts.is_empty() {
        println!("no accounts; add one with `desktop add-account <phone>`");
        return;
    }
    for account in accounts {
        let marker = if Some(account.id) == selected { "*" } else { " " };
        let status = if account.is_authorized {
            "authorized"
        } else {
            "not authorized"
        };
        println!(
            "{marker} {:>6}  {:<32} {status}",
            account.id.0,
            account.display_name()
        );
    }
}

fn report_session_events(events: &mut broadcast::Receiver<ClientEvent>) {
    while let Ok(event) = events.try_recv() {
        if event == ClientEvent::LoginRequired {
            warn!("desktop: server rejected the session");
            eprintln!("Your session has expired. Sign in again with `desktop login <email>`.");
        }
    }
}

fn friendly(err: ClientError, fallback: &str) -> anyhow::Error {
    let message = err.user_message(fallback);
    anyhow::Error::new(err).context(message)
}

fn secret_or_prompt(value: Option<String>, label: &str) -> Result<String> {
    match value {
        Some(value) => Ok(value),
        None => prompt(label),
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{label}: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read from stdin")?;
    Ok(line.trim().to_string())
}

#[cfg(test)]
#[path = "tests/cli_tests.rs"]
mod tests;
