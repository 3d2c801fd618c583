use std::env;
use std::fs::File;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use dotenv::dotenv;
use log::{LevelFilter, warn};
use simplelog::{ColorChoice, CombinedLogger, SharedLogger, TermLogger, TerminalMode, WriteLogger};

pub mod cache;
pub mod idp;
pub mod store;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("document store unavailable: {0}")]
    Unavailable(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("subscription failed: {0}")]
    Subscription(String),
    #[error("invalid environment: {0}")]
    InvalidEnv(String),

    #[error(transparent)]
    _ParseJson(#[from] serde_json::Error),
    #[error(transparent)]
    _Io(#[from] std::io::Error),
    #[error(transparent)]
    _Logger(#[from] log::SetLoggerError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Env {
    Local,
    Dev,
    Stage,
    Production,
}

impl Env {
    pub fn log_to_file(&self) -> bool {
        match self {
            Env::Local => false,
            Env::Dev | Env::Stage | Env::Production => true,
        }
    }
}

impl FromStr for Env {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local" => Ok(Env::Local),
            "dev" => Ok(Env::Dev),
            "stg" => Ok(Env::Stage),
            "prod" => Ok(Env::Production),
            other => Err(Error::InvalidEnv(other.to_owned())),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub env: Env,
    pub log_level: LevelFilter,
    pub log_file: String,
    /// Zero disables the user info cache.
    pub user_info_ttl: Duration,
    pub fixture_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            env: Env::Local,
            log_level: LevelFilter::Info,
            log_file: "service.log".into(),
            user_info_ttl: Duration::from_secs(300),
            fixture_file: None,
        }
    }
}

impl Config {
    pub fn env() -> Result<Self> {
        dotenv().ok();

        let default = Self::default();

        let env = match env::var("ENV") {
            Ok(env) => env.parse()?,
            Err(_) => default.env,
        };

        let log_level = env::var("RUST_LOG")
            .ok()
            .and_then(|level| LevelFilter::from_str(&level).ok())
            .unwrap_or(default.log_level);

        let log_file = env::var("SERVICE_NAME")
            .map(|name| format!("{name}.log"))
            .unwrap_or(default.log_file);

        let user_info_ttl = match env::var("USER_INFO_TTL") {
            Ok(ttl) => match ttl.parse() {
                Ok(secs) => Duration::from_secs(secs),
                Err(e) => {
                    warn!("ignoring USER_INFO_TTL={ttl}: {e}");
                    default.user_info_ttl
                }
            },
            Err(_) => default.user_info_ttl,
        };

        let fixture_file = env::var("FIXTURE_FILE").ok().map(PathBuf::from);

        Ok(Self {
            env,
            log_level,
            log_file,
            user_info_ttl,
            fixture_file,
        })
    }
}

pub fn init_logger(config: &Config) -> Result<()> {
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        config.log_level,
        simplelog::Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];

    if config.env.log_to_file() {
        loggers.push(WriteLogger::new(
            config.log_level,
            simplelog::Config::default(),
            File::create(&config.log_file)?,
        ));
    }

    CombinedLogger::init(loggers)?;
    Ok(())
}
