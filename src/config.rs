use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::auth::RotationPolicy;
use crate::http_client::ClientOptions;

/// tasktrack - task tracker command line client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Task tracker API base URL
    #[arg(short = 'u', long, env = "TASKTRACK_BASE_URL", default_value = "http://127.0.0.1:8000")]
    pub base_url: String,

    /// Token refresh endpoint path
    #[arg(long, env = "TASKTRACK_REFRESH_PATH", default_value = "/auth/token/refresh/")]
    pub refresh_path: String,

    /// Login route the session is sent to when it cannot be refreshed
    #[arg(long, env = "TASKTRACK_LOGIN_ROUTE", default_value = "/auth/login")]
    pub login_route: String,

    /// Path to the token database
    #[arg(short = 'd', long, env = "TASKTRACK_TOKEN_DB")]
    pub token_db: Option<String>,

    /// Store refresh tokens returned by the refresh endpoint
    #[arg(long, env = "TASKTRACK_ROTATE_REFRESH", default_value = "false")]
    pub rotate_refresh: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    /// HTTP connect timeout in seconds
    #[arg(long, env = "HTTP_CONNECT_TIMEOUT", default_value = "30")]
    pub connect_timeout: u64,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "60")]
    pub http_timeout: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Log in and store the token pair
    Login {
        #[arg(short, long)]
        email: String,
        /// Prompted for when omitted
        #[arg(short, long, env = "TASKTRACK_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Clear stored tokens
    Logout,
    /// Create an account
    Signup {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        username: String,
        /// admin or staff
        #[arg(short, long)]
        role: Option<String>,
    },
    /// Show the logged-in user
    Whoami,
    /// List all users (admin only)
    Users,
    /// Task operations
    #[command(subcommand)]
    Tasks(TaskCommand),
    /// Activity log
    #[command(subcommand)]
    Activity(ActivityCommand),
    /// Show whether tokens are stored
    Status,
}

impl Command {
    /// Whether a login redirect during this command means the session expired
    /// (logout redirects on its own)
    pub fn reports_session_expiry(&self) -> bool {
        !matches!(self, Command::Logout)
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum TaskCommand {
    List,
    Show { id: u64 },
    Create(CreateTaskArgs),
    /// Set task status (pending, in_progress, completed)
    Status { id: u64, status: String },
    Delete { id: u64 },
}

#[derive(Args, Debug, Clone)]
pub struct CreateTaskArgs {
    #[arg(short, long)]
    pub title: String,
    #[arg(short = 'D', long, default_value = "")]
    pub description: String,
    #[arg(short, long)]
    pub assigned_to: String,
    #[arg(short, long)]
    pub priority: Option<String>,
    /// YYYY-MM-DD
    #[arg(long)]
    pub deadline: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ActivityCommand {
    List {
        #[arg(long)]
        task_id: Option<u64>,
        #[arg(long)]
        action: Option<String>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
    },
    Recent,
    /// Activity for one task
    Task { id: u64 },
}

#[derive(Clone, Debug)]
pub struct Config {
    // API
    pub base_url: String,
    pub refresh_path: String,
    pub login_route: String,
    pub rotation: RotationPolicy,

    // Storage
    pub token_db: PathBuf,

    // HTTP client
    pub http_max_connections: usize,
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,

    pub log_level: String,
}

impl Config {
    /// Load configuration with priority: CLI > ENV > .env > defaults
    pub fn load() -> Result<(Self, Command)> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let args = CliArgs::parse();
        let command = args.command.clone();
        Ok((Self::from_args(args)?, command))
    }

    pub fn from_args(args: CliArgs) -> Result<Self> {
        let token_db = match args.token_db {
            Some(path) => expand_tilde(&path),
            None => default_token_db()
                .context("Could not determine a data directory, set TASKTRACK_TOKEN_DB")?,
        };

        Ok(Config {
            base_url: args.base_url,
            refresh_path: args.refresh_path,
            login_route: args.login_route,
            rotation: if args.rotate_refresh {
                RotationPolicy::Rotate
            } else {
                RotationPolicy::Keep
            },
            token_db,
            http_max_connections: std::env::var("HTTP_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(20),
            http_connect_timeout: args.connect_timeout,
            http_request_timeout: args.http_timeout,
            log_level: args.log_level,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            anyhow::bail!("TASKTRACK_BASE_URL must be an http(s) URL: {}", self.base_url);
        }
        if !self.refresh_path.starts_with('/') {
            anyhow::bail!("TASKTRACK_REFRESH_PATH must start with '/': {}", self.refresh_path);
        }
        if !self.login_route.starts_with('/') {
            anyhow::bail!("TASKTRACK_LOGIN_ROUTE must start with '/': {}", self.login_route);
        }
        Ok(())
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            base_url: self.base_url.clone(),
            refresh_path: self.refresh_path.clone(),
            login_route: self.login_route.clone(),
            rotation: self.rotation,
            max_connections: self.http_max_connections,
            connect_timeout: self.http_connect_timeout,
            request_timeout: self.http_request_timeout,
        }
    }
}

/// `<data dir>/tasktrack/tokens.sqlite3`
fn default_token_db() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("tasktrack").join("tokens.sqlite3"))
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
