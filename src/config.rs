//! Configuration types for ftp-inventory
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation
//! - Credential resolution (arguments, environment, then terminal prompt)

use crate::error::ConfigError;
use crate::inventory::InventoryFormat;
use crate::redirect::Dialect;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use console::Term;
use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

/// Upper bound on per-file attempts
const MAX_ATTEMPTS: u32 = 20;

/// Hash chunk size limits
const MIN_CHUNK_SIZE: usize = 512;
const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Prefix of inventory output files
pub const INVENTORY_PREFIX: &str = "ftp_inventory";

/// Regex for validating a redirect base URL
static BASE_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    // Matches: https://host[:port][/prefix]
    Regex::new(r"^https?://[^\s/:]+(:\d+)?(/\S*)?$").expect("Invalid base URL regex")
});

/// FTP media inventory, reconciliation and redirect generation
#[derive(Parser, Debug, Clone)]
#[command(
    name = "ftp-inventory",
    version,
    about = "Inventory an FTP tree with MD5 hashes and generate redirects for moved files",
    long_about = "Walks a remote FTP directory tree, hashes every file with MD5 and saves the \
                  result as a CSV or JSON inventory.\n\n\
                  Two inventories taken before and after a reorganization can then be \
                  reconciled by content hash to produce URL mappings and Apache/Nginx \
                  redirect rules.",
    after_help = "EXAMPLES:\n    \
        FTP_HOST=ftp.example.com FTP_USER=web ftp-inventory scan --start /uploaded-files\n    \
        ftp-inventory scan --host ftp.example.com --user web --format json\n    \
        ftp-inventory scan --resume ftp_inventory_20240501_120000.checkpoint.json\n    \
        ftp-inventory rehash ftp_inventory_20240501_120000.json\n    \
        ftp-inventory reconcile before.json after.csv --base-url https://example.com"
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Walk a remote tree and hash every file
    Scan {
        #[command(flatten)]
        remote: RemoteArgs,

        #[command(flatten)]
        hash: HashArgs,

        /// Remote directory to start from
        #[arg(short = 's', long, default_value = "/", value_name = "PATH")]
        start: String,

        /// Directory for output files
        #[arg(short = 'o', long, default_value = ".", value_name = "DIR")]
        output_dir: PathBuf,

        /// Inventory format(s) to write
        #[arg(short = 'f', long, value_enum, default_value_t = FormatArg::Both)]
        format: FormatArg,

        /// Earlier inventory or checkpoint whose digests are reused for unchanged files
        #[arg(long, value_name = "INVENTORY")]
        resume: Option<PathBuf>,
    },

    /// Re-hash only the files an inventory could not hash
    Rehash {
        /// Inventory to complete
        #[arg(value_name = "INVENTORY")]
        input: PathBuf,

        #[command(flatten)]
        remote: RemoteArgs,

        #[command(flatten)]
        hash: HashArgs,

        /// Directory for output files
        #[arg(short = 'o', long, default_value = ".", value_name = "DIR")]
        output_dir: PathBuf,

        /// Inventory format(s) to write
        #[arg(short = 'f', long, value_enum, default_value_t = FormatArg::Both)]
        format: FormatArg,
    },

    /// Compare two inventories and generate redirects for moved files
    Reconcile {
        /// Inventory taken before the reorganization
        #[arg(value_name = "BEFORE")]
        before: PathBuf,

        /// Inventory taken after the reorganization
        #[arg(value_name = "AFTER")]
        after: PathBuf,

        /// Website base URL used to build old/new URLs
        #[arg(short = 'b', long, value_name = "URL")]
        base_url: Option<String>,

        /// Redirect dialect(s) to write
        #[arg(short = 'd', long, value_enum, default_value_t = DialectArg::Both)]
        dialect: DialectArg,

        /// Directory for output files
        #[arg(short = 'o', long, default_value = ".", value_name = "DIR")]
        output_dir: PathBuf,

        /// Skip the url_mappings CSV/JSON export
        #[arg(long)]
        no_mappings: bool,
    },
}

/// FTP endpoint and credentials
#[derive(Args, Debug, Clone)]
pub struct RemoteArgs {
    /// FTP server hostname
    #[arg(long, env = "FTP_HOST", value_name = "HOST")]
    pub host: Option<String>,

    /// FTP username
    #[arg(short = 'u', long, env = "FTP_USER", value_name = "USER")]
    pub user: Option<String>,

    /// FTP password
    #[arg(long, env = "FTP_PASS", hide_env_values = true, value_name = "PASS")]
    pub password: Option<String>,

    /// FTP control port
    #[arg(short = 'P', long, env = "FTP_PORT", default_value = "21", value_name = "PORT")]
    pub port: u16,

    /// Socket read/write timeout in seconds
    #[arg(long, default_value = "60", value_name = "SECS")]
    pub timeout: u64,

    /// Connect attempts beyond the first when (re)connecting
    #[arg(long, default_value = "3", value_name = "NUM")]
    pub connect_retries: u32,
}

/// Hash pass tuning
#[derive(Args, Debug, Clone)]
pub struct HashArgs {
    /// Attempts per file, including the one that succeeds
    #[arg(short = 'r', long = "retries", default_value = "3", value_name = "NUM")]
    pub max_attempts: u32,

    /// Reconnect before every Nth file (0 disables)
    #[arg(long, default_value = "50", value_name = "NUM")]
    pub reconnect_interval: usize,

    /// Bytes fed to MD5 per update
    #[arg(long, default_value = "8192", value_name = "BYTES")]
    pub chunk_size: usize,

    /// Save a checkpoint every N files (0 disables)
    #[arg(long = "checkpoint-every", default_value = "25", value_name = "NUM")]
    pub checkpoint_interval: usize,

    /// Pause between attempts on the same file, in milliseconds
    #[arg(long, default_value = "500", value_name = "MS")]
    pub retry_delay_ms: u64,
}

/// `--format` values
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatArg {
    Csv,
    Json,
    Both,
}

impl FormatArg {
    pub fn formats(self) -> Vec<InventoryFormat> {
        match self {
            FormatArg::Csv => vec![InventoryFormat::Csv],
            FormatArg::Json => vec![InventoryFormat::Json],
            FormatArg::Both => vec![InventoryFormat::Csv, InventoryFormat::Json],
        }
    }
}

/// `--dialect` values
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialectArg {
    Apache,
    Nginx,
    Both,
}

impl DialectArg {
    pub fn dialects(self) -> Vec<Dialect> {
        match self {
            DialectArg::Apache => vec![Dialect::Apache],
            DialectArg::Nginx => vec![Dialect::Nginx],
            DialectArg::Both => vec![Dialect::Apache, Dialect::Nginx],
        }
    }
}

/// Validated FTP connection settings
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
    pub connect_retries: u32,
}

// Keep the password out of logs
impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("timeout", &self.timeout)
            .field("connect_retries", &self.connect_retries)
            .finish()
    }
}

impl RemoteConfig {
    /// Resolve credentials, prompting on the terminal when `interactive`
    pub fn from_args(args: &RemoteArgs, interactive: bool) -> Result<Self, ConfigError> {
        let host = resolve_credential(args.host.clone(), "FTP host", "FTP_HOST", false, interactive)?;
        let username =
            resolve_credential(args.user.clone(), "username", "FTP_USER", false, interactive)?;
        let password =
            resolve_credential(args.password.clone(), "password", "FTP_PASS", true, interactive)?;

        Ok(Self {
            host,
            port: args.port,
            username,
            password,
            timeout: Duration::from_secs(args.timeout.max(1)),
            connect_retries: args.connect_retries,
        })
    }
}

fn resolve_credential(
    value: Option<String>,
    name: &'static str,
    env: &'static str,
    secret: bool,
    interactive: bool,
) -> Result<String, ConfigError> {
    if let Some(value) = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        return Ok(value);
    }

    let term = Term::stderr();
    if !interactive || !term.is_term() {
        return Err(ConfigError::MissingCredential { name, env });
    }

    term.write_str(&format!("{}: ", capitalize(name)))
        .and_then(|_| {
            if secret {
                term.read_secure_line()
            } else {
                term.read_line()
            }
        })
        .map_err(|e| ConfigError::Prompt {
            name,
            reason: e.to_string(),
        })
        .map(|line| line.trim().to_string())
        .and_then(|line| {
            if line.is_empty() {
                Err(ConfigError::MissingCredential { name, env })
            } else {
                Ok(line)
            }
        })
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Validated hash pass settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashConfig {
    /// Attempts per file, inclusive of the succeeding one
    pub max_attempts: u32,

    /// Scheduled reconnect cadence (0 disables)
    pub reconnect_interval: usize,

    /// Bytes per MD5 update
    pub chunk_size: usize,

    /// Checkpoint cadence (0 disables)
    pub checkpoint_interval: usize,

    /// Pause between attempts on one file
    pub retry_delay: Duration,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            reconnect_interval: 50,
            chunk_size: 8192,
            checkpoint_interval: 25,
            retry_delay: Duration::from_millis(500),
        }
    }
}

impl HashConfig {
    pub fn from_args(args: &HashArgs) -> Result<Self, ConfigError> {
        if args.max_attempts == 0 || args.max_attempts > MAX_ATTEMPTS {
            return Err(ConfigError::InvalidAttempts {
                count: args.max_attempts,
                max: MAX_ATTEMPTS,
            });
        }

        if args.chunk_size < MIN_CHUNK_SIZE || args.chunk_size > MAX_CHUNK_SIZE {
            return Err(ConfigError::InvalidChunkSize {
                size: args.chunk_size,
                min: MIN_CHUNK_SIZE,
                max: MAX_CHUNK_SIZE,
            });
        }

        Ok(Self {
            max_attempts: args.max_attempts,
            reconnect_interval: args.reconnect_interval,
            chunk_size: args.chunk_size,
            checkpoint_interval: args.checkpoint_interval,
            retry_delay: Duration::from_millis(args.retry_delay_ms),
        })
    }
}

/// Validated `scan` configuration
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub remote: RemoteConfig,
    pub hash: HashConfig,
    pub start_path: String,
    pub output_dir: PathBuf,
    pub formats: Vec<InventoryFormat>,
    pub resume: Option<PathBuf>,
    pub show_progress: bool,
}

/// Validated `rehash` configuration
#[derive(Debug, Clone)]
pub struct RehashConfig {
    pub remote: RemoteConfig,
    pub hash: HashConfig,
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub formats: Vec<InventoryFormat>,
    pub show_progress: bool,
}

/// Validated `reconcile` configuration
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    pub before: PathBuf,
    pub after: PathBuf,
    pub base_url: Option<String>,
    pub dialects: Vec<Dialect>,
    pub output_dir: PathBuf,
    pub write_mappings: bool,
    pub show_progress: bool,
}

/// Validated runtime configuration, one per subcommand
#[derive(Debug, Clone)]
pub enum RunConfig {
    Scan(ScanConfig),
    Rehash(RehashConfig),
    Reconcile(ReconcileConfig),
}

impl RunConfig {
    /// Create and validate configuration from CLI arguments
    ///
    /// `interactive` allows prompting for missing credentials.
    pub fn from_args(args: CliArgs, interactive: bool) -> Result<Self, ConfigError> {
        let show_progress = !args.quiet;

        match args.command {
            Command::Scan {
                remote,
                hash,
                start,
                output_dir,
                format,
                resume,
            } => {
                let start_path = validate_start_path(&start)?;
                validate_output_dir(&output_dir)?;
                if let Some(resume) = &resume {
                    validate_inventory_path(resume)?;
                }
                Ok(RunConfig::Scan(ScanConfig {
                    hash: HashConfig::from_args(&hash)?,
                    remote: RemoteConfig::from_args(&remote, interactive)?,
                    start_path,
                    output_dir,
                    formats: format.formats(),
                    resume,
                    show_progress,
                }))
            }

            Command::Rehash {
                input,
                remote,
                hash,
                output_dir,
                format,
            } => {
                validate_inventory_path(&input)?;
                validate_output_dir(&output_dir)?;
                Ok(RunConfig::Rehash(RehashConfig {
                    hash: HashConfig::from_args(&hash)?,
                    remote: RemoteConfig::from_args(&remote, interactive)?,
                    input,
                    output_dir,
                    formats: format.formats(),
                    show_progress,
                }))
            }

            Command::Reconcile {
                before,
                after,
                base_url,
                dialect,
                output_dir,
                no_mappings,
            } => {
                validate_inventory_path(&before)?;
                validate_inventory_path(&after)?;
                validate_output_dir(&output_dir)?;
                let base_url = base_url
                    .map(|url| validate_base_url(&url))
                    .transpose()?
                    .flatten();
                Ok(RunConfig::Reconcile(ReconcileConfig {
                    before,
                    after,
                    base_url,
                    dialects: dialect.dialects(),
                    output_dir,
                    write_mappings: !no_mappings,
                    show_progress,
                }))
            }
        }
    }
}

/// Normalize a remote start path: absolute, no trailing slash (except root)
pub fn validate_start_path(path: &str) -> Result<String, ConfigError> {
    let path = path.trim();
    if !path.starts_with('/') {
        return Err(ConfigError::InvalidStartPath {
            path: path.to_string(),
        });
    }
    let trimmed = path.trim_end_matches('/');
    Ok(if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    })
}

/// Validate a base URL; blank means "no base URL"
pub fn validate_base_url(url: &str) -> Result<Option<String>, ConfigError> {
    let url = url.trim();
    if url.is_empty() {
        return Ok(None);
    }
    if !BASE_URL_REGEX.is_match(url) {
        return Err(ConfigError::InvalidBaseUrl {
            url: url.to_string(),
            reason: "expected http(s)://host[/prefix]".into(),
        });
    }
    Ok(Some(url.trim_end_matches('/').to_string()))
}

fn validate_output_dir(dir: &Path) -> Result<(), ConfigError> {
    if !dir.is_dir() {
        return Err(ConfigError::InvalidOutputPath {
            path: dir.to_path_buf(),
            reason: "not an existing directory".into(),
        });
    }
    Ok(())
}

fn validate_inventory_path(path: &Path) -> Result<(), ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::InvalidInventory {
            path: path.to_path_buf(),
            reason: "file does not exist".into(),
        });
    }
    Ok(())
}

/// Timestamped output path: `<dir>/<prefix>_<YYYYmmdd_HHMMSS><suffix>`
pub fn timestamped_path(dir: &Path, prefix: &str, at: DateTime<Utc>, suffix: &str) -> PathBuf {
    dir.join(format!("{}_{}{}", prefix, at.format("%Y%m%d_%H%M%S"), suffix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn remote_args() -> RemoteArgs {
        RemoteArgs {
            host: Some("ftp.example.com".into()),
            user: Some("web".into()),
            password: Some("secret".into()),
            port: 21,
            timeout: 60,
            connect_retries: 3,
        }
    }

    fn hash_args() -> HashArgs {
        HashArgs {
            max_attempts: 3,
            reconnect_interval: 50,
            chunk_size: 8192,
            checkpoint_interval: 25,
            retry_delay_ms: 0,
        }
    }

    #[test]
    fn test_cli_parses_scan() {
        let args = CliArgs::try_parse_from([
            "ftp-inventory",
            "scan",
            "--host",
            "ftp.example.com",
            "--user",
            "web",
            "--password",
            "pw",
            "--start",
            "/uploaded-files/",
            "--format",
            "json",
            "-v",
        ])
        .unwrap();
        assert!(args.verbose);
        match args.command {
            Command::Scan { start, format, hash, .. } => {
                assert_eq!(start, "/uploaded-files/");
                assert_eq!(format, FormatArg::Json);
                assert_eq!(hash.max_attempts, 3);
                assert_eq!(hash.reconnect_interval, 50);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_remote_config_from_args() {
        let config = RemoteConfig::from_args(&remote_args(), false).unwrap();
        assert_eq!(config.host, "ftp.example.com");
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert!(!format!("{:?}", config).contains("secret"));
    }

    #[test]
    fn test_missing_credential_without_prompt() {
        let mut args = remote_args();
        args.password = Some("   ".into());
        assert!(matches!(
            RemoteConfig::from_args(&args, false),
            Err(ConfigError::MissingCredential { env: "FTP_PASS", .. })
        ));
    }

    #[test]
    fn test_hash_config_validation() {
        assert_eq!(HashConfig::from_args(&hash_args()).unwrap().max_attempts, 3);

        let mut args = hash_args();
        args.max_attempts = 0;
        assert!(matches!(
            HashConfig::from_args(&args),
            Err(ConfigError::InvalidAttempts { .. })
        ));

        let mut args = hash_args();
        args.chunk_size = 1;
        assert!(matches!(
            HashConfig::from_args(&args),
            Err(ConfigError::InvalidChunkSize { .. })
        ));
    }

    #[test]
    fn test_start_path_normalized() {
        assert_eq!(validate_start_path("/").unwrap(), "/");
        assert_eq!(validate_start_path("/img/").unwrap(), "/img");
        assert!(validate_start_path("img").is_err());
    }

    #[test]
    fn test_base_url_validation() {
        assert_eq!(
            validate_base_url("https://example.com/").unwrap().as_deref(),
            Some("https://example.com")
        );
        assert_eq!(validate_base_url("  ").unwrap(), None);
        assert!(validate_base_url("example.com").is_err());
    }

    #[test]
    fn test_reconcile_requires_existing_inventories() {
        let dir = tempdir().unwrap();
        let before = dir.path().join("before.json");
        std::fs::write(&before, "{}").unwrap();

        let args = CliArgs::try_parse_from([
            "ftp-inventory",
            "reconcile",
            before.to_str().unwrap(),
            dir.path().join("missing.csv").to_str().unwrap(),
            "-o",
            dir.path().to_str().unwrap(),
        ])
        .unwrap();

        assert!(matches!(
            RunConfig::from_args(args, false),
            Err(ConfigError::InvalidInventory { .. })
        ));
    }

    #[test]
    fn test_timestamped_path() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 5).unwrap();
        let path = timestamped_path(Path::new("/tmp"), INVENTORY_PREFIX, at, ".json");
        assert_eq!(path, PathBuf::from("/tmp/ftp_inventory_20240501_123005.json"));
    }
}
