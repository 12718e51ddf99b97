use clap::builder::TypedValueParser as _;
use clap::Parser;
use dotenvy::dotenv;
use hub::config::{DEFAULT_BROADCAST_QUEUE_CAPACITY, DEFAULT_CLIENT_QUEUE_CAPACITY};
use hub::{HubConfig, IdentityPolicy};
use log::LevelFilter;
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Debug, PartialEq)]
pub enum RustEnv {
    Development,
    Production,
    Staging,
}

#[derive(Debug, PartialEq, Eq)]
pub struct RustEnvParseError;

impl FromStr for RustEnv {
    type Err = RustEnvParseError;
    fn from_str(level: &str) -> Result<RustEnv, Self::Err> {
        match level.to_lowercase().as_str() {
            "development" => Ok(RustEnv::Development),
            "production" => Ok(RustEnv::Production),
            "staging" => Ok(RustEnv::Staging),
            _ => Err(RustEnvParseError),
        }
    }
}

impl fmt::Display for RustEnv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RustEnv::Development => write!(f, "development"),
            RustEnv::Production => write!(f, "production"),
            RustEnv::Staging => write!(f, "staging"),
        }
    }
}

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// A list of full CORS origin URLs that are allowed to receive server responses.
    /// Use `*` to allow any origin.
    #[arg(
        long,
        env,
        value_delimiter = ',',
        use_value_delimiter = true,
        default_value = "http://localhost:3000,https://localhost:3000"
    )]
    pub allowed_origins: Vec<String>,

    /// The host interface to listen for incoming connections
    #[arg(short, long, env, default_value = "127.0.0.1")]
    pub interface: Option<String>,

    /// The host TCP port to listen for incoming connections
    #[arg(short, long, env, default_value_t = 4000)]
    pub port: u16,

    /// Number of envelopes a client may fall behind before it is disconnected
    #[arg(long, env, default_value_t = DEFAULT_CLIENT_QUEUE_CAPACITY,
        value_parser = clap::value_parser!(u32).range(1..).map(|n| n as usize))]
    pub client_queue_capacity: usize,

    /// Number of pending broadcasts buffered before new ones are dropped
    #[arg(long, env, default_value_t = DEFAULT_BROADCAST_QUEUE_CAPACITY,
        value_parser = clap::value_parser!(u32).range(1..).map(|n| n as usize))]
    pub broadcast_queue_capacity: usize,

    /// How a connection's identity is derived: `reported` trusts the `user_id` of
    /// each inbound envelope, `bound` fixes it when the connection is admitted.
    #[arg(
        long,
        env,
        default_value_t = IdentityPolicy::Reported,
        value_parser = clap::builder::PossibleValuesParser::new(["reported", "bound", "REPORTED", "BOUND"])
            .map(|s| s.parse::<IdentityPolicy>().unwrap()),
    )]
    pub identity_policy: IdentityPolicy,

    /// Deliver a client's own broadcasts back to it
    #[arg(long, env, default_value_t = true, action = clap::ArgAction::Set)]
    pub echo_to_sender: bool,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .map(|s| s.parse::<LevelFilter>().unwrap()),
        )]
    pub log_level_filter: LevelFilter,

    /// Set the Rust runtime environment to use.
    #[arg(
    short,
    long,
    env,
    default_value_t = RustEnv::Development,
    value_parser = clap::builder::PossibleValuesParser::new([
        "DEVELOPMENT", "PRODUCTION", "STAGING",
        "development", "production", "staging"
    ])
        .map(|s| s.parse::<RustEnv>().unwrap()),
    )]
    pub runtime_env: RustEnv,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        Config::parse()
    }

    pub fn interface(&self) -> &str {
        self.interface.as_deref().unwrap_or("127.0.0.1")
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.interface(), self.port)
    }

    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|origin| origin == "*")
    }

    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            client_queue_capacity: self.client_queue_capacity,
            broadcast_queue_capacity: self.broadcast_queue_capacity,
            identity_policy: self.identity_policy,
            echo_to_sender: self.echo_to_sender,
        }
    }

    pub fn runtime_env(&self) -> RustEnv {
        self.runtime_env.clone()
    }

    pub fn is_production(&self) -> bool {
        self.runtime_env() == RustEnv::Production
    }
}
