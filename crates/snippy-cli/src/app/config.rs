use anyhow::bail;
use clap::{Parser, Subcommand};
use snippy::{BreakerConfig, IdentityConfig, RetryConfig};

/// Runtime configuration for the `snippy` binary.
///
/// Every retry and breaker knob can be set from a flag or an environment
/// variable (a `.env` file is honoured). Defaults match production tuning.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "snippy",
    version,
    about = "Generate Snippy identifiers and exercise snippet counters"
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Attempts before a short ID falls back to the timestamp form.
    ///
    /// Environment variable: `SHORT_ID_MAX_ATTEMPTS`
    #[arg(long, env = "SHORT_ID_MAX_ATTEMPTS", default_value_t = RetryConfig::SHORT_ID.max_attempts, global = true)]
    pub short_id_max_attempts: u32,

    /// Delay before the first short ID retry, in milliseconds.
    ///
    /// Environment variable: `SHORT_ID_INITIAL_DELAY_MS`
    #[arg(long, env = "SHORT_ID_INITIAL_DELAY_MS", default_value_t = RetryConfig::SHORT_ID.initial_delay_ms, global = true)]
    pub short_id_initial_delay_ms: u64,

    /// Cap on any single short ID retry delay, in milliseconds.
    ///
    /// Environment variable: `SHORT_ID_MAX_DELAY_MS`
    #[arg(long, env = "SHORT_ID_MAX_DELAY_MS", default_value_t = RetryConfig::SHORT_ID.max_delay_ms, global = true)]
    pub short_id_max_delay_ms: u64,

    /// Attempts before a username falls back to the timestamp form.
    ///
    /// Environment variable: `USERNAME_MAX_ATTEMPTS`
    #[arg(long, env = "USERNAME_MAX_ATTEMPTS", default_value_t = RetryConfig::USERNAME.max_attempts, global = true)]
    pub username_max_attempts: u32,

    /// Environment variable: `USERNAME_INITIAL_DELAY_MS`
    #[arg(long, env = "USERNAME_INITIAL_DELAY_MS", default_value_t = RetryConfig::USERNAME.initial_delay_ms, global = true)]
    pub username_initial_delay_ms: u64,

    /// Environment variable: `USERNAME_MAX_DELAY_MS`
    #[arg(long, env = "USERNAME_MAX_DELAY_MS", default_value_t = RetryConfig::USERNAME.max_delay_ms, global = true)]
    pub username_max_delay_ms: u64,

    /// Attempts for store calls that fail with a connectivity error.
    ///
    /// Environment variable: `CONNECTION_MAX_ATTEMPTS`
    #[arg(long, env = "CONNECTION_MAX_ATTEMPTS", default_value_t = RetryConfig::CONNECTION.max_attempts, global = true)]
    pub connection_max_attempts: u32,

    /// Environment variable: `CONNECTION_INITIAL_DELAY_MS`
    #[arg(long, env = "CONNECTION_INITIAL_DELAY_MS", default_value_t = RetryConfig::CONNECTION.initial_delay_ms, global = true)]
    pub connection_initial_delay_ms: u64,

    /// Environment variable: `CONNECTION_MAX_DELAY_MS`
    #[arg(long, env = "CONNECTION_MAX_DELAY_MS", default_value_t = RetryConfig::CONNECTION.max_delay_ms, global = true)]
    pub connection_max_delay_ms: u64,

    /// Growth factor between consecutive retry delays, shared by all
    /// policies.
    ///
    /// Environment variable: `BACKOFF_MULTIPLIER`
    #[arg(long, env = "BACKOFF_MULTIPLIER", default_value_t = 2, global = true)]
    pub backoff_multiplier: u32,

    /// Consecutive connectivity failures that open the circuit breaker.
    ///
    /// Environment variable: `BREAKER_FAILURE_THRESHOLD`
    #[arg(long, env = "BREAKER_FAILURE_THRESHOLD", default_value_t = 5, global = true)]
    pub breaker_failure_threshold: u32,

    /// How long the breaker stays open before letting a trial call through,
    /// in milliseconds.
    ///
    /// Environment variable: `BREAKER_RECOVERY_MS`
    #[arg(long, env = "BREAKER_RECOVERY_MS", default_value_t = 10_000, global = true)]
    pub breaker_recovery_ms: u64,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print freshly assigned snippet short IDs, one per line.
    ShortId {
        #[arg(short, long, default_value_t = 1)]
        count: usize,
    },
    /// Print usernames derived from a display name, one per line.
    Username {
        /// Display name to derive the base from. Omit for a random
        /// adjective-animal base.
        #[arg(short, long)]
        display_name: Option<String>,
        #[arg(short, long, default_value_t = 1)]
        count: usize,
    },
    /// Run a concurrent workload against the in-memory store, check every
    /// counter against its child rows and print a JSON report.
    Demo {
        #[arg(long, env = "DEMO_USERS", default_value_t = 16)]
        users: usize,
        #[arg(long, env = "DEMO_SNIPPETS", default_value_t = 8)]
        snippets: usize,
        /// Operations issued per user.
        #[arg(long, env = "DEMO_ROUNDS", default_value_t = 32)]
        rounds: usize,
    },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub identity: IdentityConfig,
    pub command: Command,
}

impl TryFrom<CliArgs> for AppConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        match &args.command {
            Command::ShortId { count } | Command::Username { count, .. } if *count == 0 => {
                bail!("--count must be greater than 0");
            }
            Command::Demo { users, snippets, .. } if *users == 0 || *snippets == 0 => {
                bail!("DEMO_USERS and DEMO_SNIPPETS must be greater than 0");
            }
            Command::Demo { users, snippets, .. } if snippets > users => {
                bail!("DEMO_SNIPPETS ({snippets}) exceeds DEMO_USERS ({users})");
            }
            _ => {}
        }

        let policy = |max_attempts, initial_delay_ms, max_delay_ms| RetryConfig {
            max_attempts,
            initial_delay_ms,
            max_delay_ms,
            multiplier: args.backoff_multiplier,
        };
        let identity = IdentityConfig {
            short_id: policy(
                args.short_id_max_attempts,
                args.short_id_initial_delay_ms,
                args.short_id_max_delay_ms,
            ),
            username: policy(
                args.username_max_attempts,
                args.username_initial_delay_ms,
                args.username_max_delay_ms,
            ),
            connection: policy(
                args.connection_max_attempts,
                args.connection_initial_delay_ms,
                args.connection_max_delay_ms,
            ),
            breaker: BreakerConfig {
                failure_threshold: args.breaker_failure_threshold,
                recovery_ms: args.breaker_recovery_ms,
            },
        };
        identity.validate()?;

        Ok(Self {
            identity,
            command: args.command,
        })
    }
}
