use core::time::Duration;

use anyhow::bail;
use clap::{Parser, Subcommand, ValueEnum};
use consul_uid::{
    AllocatorConfig, Backoff, DEFAULT_MAX_ATTEMPTS, DEFAULT_RELEASE_ATTEMPTS, Namespace,
    SessionSettings,
};
use consul_uid_http::{ClientConfig, DEFAULT_HOST, DEFAULT_PORT, Scheme};

/// Consul refuses session TTLs outside of this range.
const MIN_SESSION_TTL_SECS: u64 = 10;
const MAX_SESSION_TTL_SECS: u64 = 86_400;

/// Runtime configuration for the `consul-uid` binary.
///
/// All values are parsed from CLI arguments or environment variables. The
/// defaults talk to a local agent and follow the plain allocation protocol:
/// ten attempts, no backoff between them.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "consul-uid",
    version,
    about = "Allocate a stable, cluster-unique integer for this node through Consul"
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Allocation domain. Keys live under `.extensions/uid/<NAME>`.
    ///
    /// Environment variable: `CONSUL_UID_NAME`
    #[arg(short, long, env = "CONSUL_UID_NAME")]
    pub name: Option<String>,

    /// Identity to allocate for. Defaults to the agent's member name.
    ///
    /// Environment variable: `CONSUL_UID_CLIENT_ID`
    #[arg(long, env = "CONSUL_UID_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Locked attempts before giving up.
    ///
    /// Environment variable: `CONSUL_UID_MAX_ATTEMPTS`
    #[arg(
        long,
        env = "CONSUL_UID_MAX_ATTEMPTS",
        default_value_t = DEFAULT_MAX_ATTEMPTS
    )]
    pub max_attempts: u32,

    /// Delay policy between attempts.
    ///
    /// Environment variable: `CONSUL_UID_BACKOFF`
    #[arg(
        long,
        env = "CONSUL_UID_BACKOFF",
        value_enum,
        default_value_t = BackoffKind::None
    )]
    pub backoff: BackoffKind,

    /// First (or fixed) backoff delay, in milliseconds.
    ///
    /// Environment variable: `CONSUL_UID_BACKOFF_BASE_MS`
    #[arg(long, env = "CONSUL_UID_BACKOFF_BASE_MS", default_value_t = 50)]
    pub backoff_base_ms: u64,

    /// Upper bound of the exponential backoff, in milliseconds.
    ///
    /// Environment variable: `CONSUL_UID_BACKOFF_MAX_MS`
    #[arg(long, env = "CONSUL_UID_BACKOFF_MAX_MS", default_value_t = 2_000)]
    pub backoff_max_ms: u64,

    /// Lock release writes tried per attempt before relying on the session.
    ///
    /// Environment variable: `CONSUL_UID_RELEASE_ATTEMPTS`
    #[arg(
        long,
        env = "CONSUL_UID_RELEASE_ATTEMPTS",
        default_value_t = DEFAULT_RELEASE_ATTEMPTS
    )]
    pub release_attempts: u32,

    /// Lock delay applied by Consul if the session dies holding the lock.
    ///
    /// Environment variable: `CONSUL_UID_LOCK_DELAY_SECS`
    #[arg(long, env = "CONSUL_UID_LOCK_DELAY_SECS", default_value_t = 15)]
    pub lock_delay_secs: u64,

    /// Session TTL; `0` creates a session without a TTL.
    ///
    /// Environment variable: `CONSUL_UID_SESSION_TTL_SECS`
    #[arg(long, env = "CONSUL_UID_SESSION_TTL_SECS", default_value_t = 30)]
    pub session_ttl_secs: u64,

    /// Leave the session to expire instead of destroying it on exit.
    ///
    /// Environment variable: `CONSUL_UID_KEEP_SESSION`
    #[arg(long, env = "CONSUL_UID_KEEP_SESSION", default_value_t = false)]
    pub keep_session: bool,

    /// `http` or `https`.
    ///
    /// Environment variable: `CONSUL_SCHEME`
    #[arg(long, env = "CONSUL_SCHEME", default_value = "http")]
    pub scheme: String,

    /// Environment variable: `CONSUL_HOST`
    #[arg(long, env = "CONSUL_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Environment variable: `CONSUL_PORT`
    #[arg(long, env = "CONSUL_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Datacenter to address. Defaults to the agent's own.
    ///
    /// Environment variable: `CONSUL_DATACENTER`
    #[arg(long, env = "CONSUL_DATACENTER")]
    pub datacenter: Option<String>,

    /// ACL token.
    ///
    /// Environment variable: `CONSUL_HTTP_TOKEN`
    #[arg(long, env = "CONSUL_HTTP_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Per-request timeout, in seconds.
    ///
    /// Environment variable: `CONSUL_TIMEOUT_SECS`
    #[arg(long, env = "CONSUL_TIMEOUT_SECS", default_value_t = 10)]
    pub timeout_secs: u64,

    /// HTTP proxy for requests to the agent.
    ///
    /// Environment variable: `CONSUL_PROXY`
    #[arg(long, env = "CONSUL_PROXY")]
    pub proxy: Option<String>,

    /// Log output format (written to stderr).
    ///
    /// Environment variable: `CONSUL_UID_LOG_FORMAT`
    #[arg(
        long,
        env = "CONSUL_UID_LOG_FORMAT",
        value_enum,
        default_value_t = LogFormat::Pretty
    )]
    pub log_format: LogFormat,
}

#[derive(Subcommand, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Command {
    /// Print this client's id, allocating it on first use.
    #[default]
    Get,
    /// Print this client's id only if it has already been assigned.
    Peek,
    /// Print the identity ids are assigned to.
    Whoami,
    /// Check that the agent answers.
    Ping,
}

#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackoffKind {
    #[default]
    None,
    Fixed,
    Exponential,
    /// Exponential with full jitter.
    Jittered,
}

#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub command: Command,
    /// `None` only for commands that never allocate.
    pub allocator: Option<AllocatorConfig>,
    pub consul: ClientConfig,
    pub log_format: LogFormat,
}

impl TryFrom<CliArgs> for AppConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let command = args.command.unwrap_or_default();

        if args.max_attempts == 0 {
            bail!("CONSUL_UID_MAX_ATTEMPTS must be greater than 0");
        }
        if args.release_attempts == 0 {
            bail!("CONSUL_UID_RELEASE_ATTEMPTS must be greater than 0");
        }
        if args.backoff != BackoffKind::None && args.backoff_base_ms == 0 {
            bail!("CONSUL_UID_BACKOFF_BASE_MS must be greater than 0");
        }
        if args.backoff_max_ms < args.backoff_base_ms {
            bail!(
                "CONSUL_UID_BACKOFF_MAX_MS ({}) must not be below CONSUL_UID_BACKOFF_BASE_MS ({})",
                args.backoff_max_ms,
                args.backoff_base_ms
            );
        }
        if args.session_ttl_secs != 0
            && !(MIN_SESSION_TTL_SECS..=MAX_SESSION_TTL_SECS).contains(&args.session_ttl_secs)
        {
            bail!(
                "CONSUL_UID_SESSION_TTL_SECS ({}) must be 0 or between {} and {}",
                args.session_ttl_secs,
                MIN_SESSION_TTL_SECS,
                MAX_SESSION_TTL_SECS
            );
        }
        if args.timeout_secs == 0 {
            bail!("CONSUL_TIMEOUT_SECS must be greater than 0");
        }

        let base = Duration::from_millis(args.backoff_base_ms);
        let max = Duration::from_millis(args.backoff_max_ms);
        let backoff = match args.backoff {
            BackoffKind::None => Backoff::None,
            BackoffKind::Fixed => Backoff::Fixed(base),
            BackoffKind::Exponential => Backoff::exponential(base, max),
            BackoffKind::Jittered => Backoff::Exponential {
                base,
                max,
                jitter: true,
            },
        };

        let allocator = match args.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => {
                // Surface a bad name before touching the network.
                Namespace::new(name)?;
                let ttl = Duration::from_secs(args.session_ttl_secs);
                let session = SessionSettings {
                    lock_delay: Duration::from_secs(args.lock_delay_secs),
                    ttl: (args.session_ttl_secs != 0).then_some(ttl),
                    ..SessionSettings::default()
                };
                let mut config = AllocatorConfig::new(name)
                    .with_max_attempts(args.max_attempts)
                    .with_backoff(backoff)
                    .with_release_attempts(args.release_attempts)
                    .with_destroy_session(!args.keep_session)
                    .with_session(session);
                config.client_id = args.client_id;
                Some(config)
            }
            _ if command == Command::Ping => None,
            _ => bail!("CONSUL_UID_NAME must be set"),
        };

        let mut consul = ClientConfig::default()
            .with_scheme(args.scheme.parse::<Scheme>()?)
            .with_host(args.host)
            .with_port(args.port)
            .with_timeout(Duration::from_secs(args.timeout_secs));
        consul.datacenter = args.datacenter.filter(|dc| !dc.trim().is_empty());
        consul.token = args.token.filter(|token| !token.trim().is_empty());
        consul.proxy = args.proxy.filter(|proxy| !proxy.trim().is_empty());
        consul.base_url()?;

        Ok(Self {
            command,
            allocator,
            consul,
            log_format: args.log_format,
        })
    }
}
