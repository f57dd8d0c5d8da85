use anyhow::{Context, Result};
use dialoguer::Password;
use serde::Serialize;
use std::sync::Arc;

use tasktrack_client::api;
use tasktrack_client::auth::{SessionNavigator, SqliteTokenStore};
use tasktrack_client::config::{ActivityCommand, Command, Config, CreateTaskArgs, TaskCommand};
use tasktrack_client::models::{ActivityFilter, NewTask, SignupRequest, UserRole};
use tasktrack_client::{AuthHttpClient, ClientError};

#[tokio::main]
async fn main() -> Result<()> {
    let (config, command) = Config::load()?;
    config.validate()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("Token database: {}", config.token_db.display());
    let store = Arc::new(
        SqliteTokenStore::open(&config.token_db).with_context(|| {
            format!("Failed to open token database {}", config.token_db.display())
        })?,
    );
    let navigator = Arc::new(SessionNavigator::new("/"));
    let client = AuthHttpClient::new(&config.client_options(), store, navigator.clone())?;

    let report_expiry = command.reports_session_expiry();
    let result = run(&client, command).await;

    if report_expiry && !navigator.redirects().is_empty() {
        eprintln!("Session expired. Log in again with: tasktrack login --email <email>");
    }

    result
}

async fn run(client: &AuthHttpClient, command: Command) -> Result<()> {
    match command {
        Command::Login { email, password } => {
            let password = match password {
                Some(p) => p,
                None => Password::new()
                    .with_prompt("Password")
                    .interact()
                    .context("Failed to read password")?,
            };
            api::auth::login(client, &email, &password)
                .await
                .map_err(describe)?;
            println!("Login successful!");
        }

        Command::Logout => {
            api::auth::logout(client);
            println!("Logged out.");
        }

        Command::Signup {
            email,
            username,
            role,
        } => {
            let role = role.as_deref().map(parse_role).transpose()?;
            let password = Password::new()
                .with_prompt("Password")
                .with_confirmation("Confirm password", "Passwords do not match")
                .interact()
                .context("Failed to read password")?;

            let message = api::auth::signup(
                client,
                &SignupRequest {
                    email,
                    username,
                    password,
                    role,
                },
            )
            .await
            .map_err(describe)?;
            println!("{}", message);
        }

        Command::Whoami => print_json(&api::auth::profile(client).await.map_err(describe)?)?,

        Command::Users => print_json(&api::auth::users(client).await.map_err(describe)?)?,

        Command::Tasks(task_command) => run_tasks(client, task_command).await?,

        Command::Activity(activity_command) => {
            let activities = match activity_command {
                ActivityCommand::List {
                    task_id,
                    action,
                    search,
                    limit,
                } => {
                    let filter = ActivityFilter {
                        task_id,
                        action,
                        search,
                        limit,
                    };
                    api::activity::list(client, &filter).await
                }
                ActivityCommand::Recent => api::activity::recent(client).await,
                ActivityCommand::Task { id } => api::activity::by_task(client, id).await,
            };
            print_json(&activities.map_err(describe)?)?;
        }

        Command::Status => match client.credentials().access_token()? {
            Some(token) => {
                let prefix: String = token.chars().take(12).collect();
                let refresh = client.credentials().refresh_token()?.is_some();
                println!("Logged in (access token: {}..., refresh token stored: {})", prefix, refresh);
            }
            None => println!("Not logged in."),
        },
    }

    Ok(())
}

async fn run_tasks(client: &AuthHttpClient, command: TaskCommand) -> Result<()> {
    match command {
        TaskCommand::List => print_json(&api::tasks::list(client).await.map_err(describe)?),
        TaskCommand::Show { id } => print_json(&api::tasks::get(client, id).await.map_err(describe)?),
        TaskCommand::Create(args) => {
            let task = new_task(args)?;
            print_json(&api::tasks::create(client, &task).await.map_err(describe)?)
        }
        TaskCommand::Status { id, status } => {
            let status = status.parse().map_err(anyhow::Error::msg)?;
            print_json(
                &api::tasks::update_status(client, id, status)
                    .await
                    .map_err(describe)?,
            )
        }
        TaskCommand::Delete { id } => {
            api::tasks::delete(client, id).await.map_err(describe)?;
            println!("Task {} deleted.", id);
            Ok(())
        }
    }
}

fn new_task(args: CreateTaskArgs) -> Result<NewTask> {
    let priority = args
        .priority
        .as_deref()
        .map(str::parse)
        .transpose()
        .map_err(anyhow::Error::msg)?;
    let deadline = args
        .deadline
        .as_deref()
        .map(|d| chrono::NaiveDate::parse_from_str(d, "%Y-%m-%d"))
        .transpose()
        .context("Deadline must be YYYY-MM-DD")?;

    Ok(NewTask {
        title: args.title,
        description: args.description,
        assigned_to: args.assigned_to,
        status: None,
        priority,
        deadline,
    })
}

fn parse_role(s: &str) -> Result<UserRole> {
    match s.to_lowercase().as_str() {
        "admin" => Ok(UserRole::Admin),
        "staff" => Ok(UserRole::Staff),
        other => anyhow::bail!("Invalid role '{}', expected admin or staff", other),
    }
}

/// Prefer the server's own message for API errors
fn describe(err: ClientError) -> anyhow::Error {
    match err.detail() {
        Some(detail) => anyhow::anyhow!("{} ({})", detail, err),
        None => err.into(),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
