use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::OnceLock,
    time::Duration,
};

use clap::Parser;
use regex::Regex;

use crate::api::API_BASE;

pub const TOKEN_VAR: &str = "FANSLY_TOKEN";
pub const USER_AGENT_VAR: &str = "USER_AGENT";
pub const BASEPATH_VAR: &str = "BASEPATH";

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Parser, Debug, Clone)]
#[clap(name = "fansly-live", version, about = "Record a Fansly livestream with ffmpeg")]
pub struct Cli {
    /// Creator's username to record
    #[clap(long)]
    pub name: Option<String>,

    /// Creator's username, if --name is not given
    #[clap(value_name = "CREATOR")]
    pub creator: Option<String>,

    /// Fansly authentication token [env: FANSLY_TOKEN]
    #[clap(long)]
    pub token: Option<String>,

    /// User agent string [env: USER_AGENT]
    #[clap(long)]
    pub agent: Option<String>,

    /// Base path for downloads [env: BASEPATH]
    #[clap(long)]
    pub path: Option<PathBuf>,

    /// Path to a KEY=VALUE env file
    #[clap(long, default_value = ".env")]
    pub env: PathBuf,

    /// Also save the stream record as JSON
    #[clap(long)]
    pub metadata: bool,

    /// Keep polling until the creator goes live
    #[clap(long)]
    pub wait: bool,

    /// Seconds between polls with --wait
    #[clap(long, default_value = "60")]
    pub poll_interval: u64,

    /// Total attempts for transient failures
    #[clap(long, default_value = "7", value_parser = clap::value_parser!(u32).range(1..))]
    pub attempts: u32,

    /// Base delay in seconds between attempts, grows by this much each retry
    #[clap(long, default_value = "1")]
    pub retry_delay: u64,

    /// HTTP request timeout in seconds
    #[clap(long, default_value = "30")]
    pub timeout: u64,

    /// Stop recording after this many seconds
    #[clap(long)]
    pub max_duration: Option<u64>,

    /// ffmpeg executable
    #[clap(long, default_value = "ffmpeg")]
    pub ffmpeg: PathBuf,

    #[clap(long, hide = true, default_value = API_BASE)]
    pub api_base: String,

    /// Debug output
    #[clap(short, long)]
    pub verbose: bool,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("No username provided. Use --name or provide it as the first argument")]
    MissingCreator,
    #[error("Invalid username: {0}")]
    InvalidCreator(String),
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Everything a run needs, assembled once from flags, env file and environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub creator: String,
    pub token: String,
    pub user_agent: String,
    pub base_path: PathBuf,
    pub metadata: bool,
    pub wait: bool,
    pub poll_interval: Duration,
    pub attempts: u32,
    pub retry_delay: Duration,
    pub http_timeout: Duration,
    pub max_duration: Option<Duration>,
    pub ffmpeg: PathBuf,
    pub api_base: String,
}

fn creator_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.-]{1,64}$").expect("should never happen"))
}

/// Parse one `KEY=VALUE` line.
///
/// Values are taken literally, trimmed, so tokens may contain `$` or `#` and
/// user agents may contain spaces. Quoted values without `$` go through dotenv
/// for its escape handling. Other quoted values only lose their quotes.
fn parse_env_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    let key = key.strip_prefix("export ").map(str::trim).unwrap_or(key);
    if key.is_empty() {
        return None;
    }

    let value = value.trim();
    let quoted = value.len() >= 2
        && (value.starts_with('"') && value.ends_with('"')
            || value.starts_with('\'') && value.ends_with('\''));
    if !quoted {
        return Some((key.to_string(), value.to_string()));
    }

    if !value.contains('$') {
        if let Some(Ok(pair)) = dotenv::from_read_iter(line.as_bytes()).next() {
            return Some(pair);
        }
    }

    Some((key.to_string(), value[1..value.len() - 1].to_string()))
}

/// Read `KEY=VALUE` pairs without touching the process environment.
///
/// A missing file yields no variables. Blank lines and `#` comments are
/// ignored; lines without `=` are skipped.
pub fn load_env_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No env file at {}", path.display());
            return Ok(HashMap::new());
        }
        Err(e) => return Err(e.into()),
    };

    let mut vars = HashMap::new();
    for line in content.lines() {
        match parse_env_line(line) {
            Some((key, value)) => {
                vars.insert(key, value);
            }
            None => trace!("Skipping env line: {}", line),
        }
    }

    Ok(vars)
}

impl Config {
    /// Resolve with flag > env file > process environment precedence.
    pub fn resolve<F>(
        cli: Cli,
        file: &HashMap<String, String>,
        env: F,
    ) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| {
            file.get(key)
                .cloned()
                .or_else(|| env(key))
                .filter(|v| !v.is_empty())
        };

        let creator = cli
            .name
            .or(cli.creator)
            .filter(|c| !c.is_empty())
            .ok_or(ConfigError::MissingCreator)?;
        if !creator_pattern().is_match(&creator) {
            return Err(ConfigError::InvalidCreator(creator));
        }

        let token = cli.token.or_else(|| lookup(TOKEN_VAR)).unwrap_or_default();
        if token.is_empty() {
            warn!("No token provided, the API will likely refuse the request");
        }

        let user_agent = cli
            .agent
            .or_else(|| lookup(USER_AGENT_VAR))
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

        let base_path = match cli.path.or_else(|| lookup(BASEPATH_VAR).map(PathBuf::from)) {
            Some(path) => path,
            None => {
                info!("No basepath provided. Using current working directory");
                std::env::current_dir()?
            }
        };

        Ok(Config {
            creator,
            token,
            user_agent,
            base_path,
            metadata: cli.metadata,
            wait: cli.wait,
            poll_interval: Duration::from_secs(cli.poll_interval),
            attempts: cli.attempts,
            retry_delay: Duration::from_secs(cli.retry_delay),
            http_timeout: Duration::from_secs(cli.timeout),
            max_duration: cli.max_duration.map(Duration::from_secs),
            ffmpeg: cli.ffmpeg,
            api_base: cli.api_base,
        })
    }

    /// Parse the command line, reading the env file only when the token or
    /// user agent flag is missing.
    pub fn from_cli(cli: Cli) -> Result<Config, ConfigError> {
        let file = if cli.token.is_none() || cli.agent.is_none() {
            load_env_file(&cli.env)?
        } else {
            HashMap::new()
        };

        Config::resolve(cli, &file, |key| std::env::var(key).ok())
    }

    /// `<base>/FanslyDownloader/Fansly/<creator>`
    pub fn recording_dir(&self) -> PathBuf {
        self.base_path
            .join("FanslyDownloader")
            .join("Fansly")
            .join(&self.creator)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("fansly-live").chain(args.iter().copied()))
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn env_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "# credentials\n\nFANSLY_TOKEN=abc123\nmalformed\nUSER_AGENT=Mozilla/5.0\n"
        )
        .unwrap();

        let vars = load_env_file(file.path()).expect("Could not load env file");
        assert_eq!(vars.get(TOKEN_VAR).map(String::as_str), Some("abc123"));
        assert_eq!(vars.get(USER_AGENT_VAR).map(String::as_str), Some("Mozilla/5.0"));
        assert_eq!(vars.len(), 2);
    }

    #[test]
    fn env_file_values_are_literal() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "FANSLY_TOKEN=ab$cd#ef\n\
             USER_AGENT=Mozilla/5.0 (X11; Linux x86_64) Firefox/120.0\n\
             BASEPATH= /data/rec \n\
             QUOTED=\"two words\"\n\
             export EXPORTED=yes\n\
             HASHED=abc#def\n\
             SINGLE='a $b'\n\
             =no-key\n"
        )
        .unwrap();

        let vars = load_env_file(file.path()).expect("Could not load env file");
        let get = |key: &str| vars.get(key).map(String::as_str);

        assert_eq!(get(TOKEN_VAR), Some("ab$cd#ef"));
        assert_eq!(
            get(USER_AGENT_VAR),
            Some("Mozilla/5.0 (X11; Linux x86_64) Firefox/120.0")
        );
        assert_eq!(get(BASEPATH_VAR), Some("/data/rec"));
        assert_eq!(get("QUOTED"), Some("two words"));
        assert_eq!(get("EXPORTED"), Some("yes"));
        assert_eq!(get("HASHED"), Some("abc#def"));
        assert_eq!(get("SINGLE"), Some("a $b"));
        assert_eq!(vars.len(), 7);
    }

    #[test]
    fn missing_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let vars = load_env_file(&dir.path().join(".env")).unwrap();
        assert!(vars.is_empty());
    }

    #[test]
    fn creator_from_flag_or_positional() {
        let config = Config::resolve(cli(&["--name", "alice", "--path", "/tmp"]), &HashMap::new(), no_env)
            .unwrap();
        assert_eq!(config.creator, "alice");

        let config = Config::resolve(cli(&["bob", "--path", "/tmp"]), &HashMap::new(), no_env).unwrap();
        assert_eq!(config.creator, "bob");

        let config = Config::resolve(cli(&["--name", "alice", "bob", "--path", "/tmp"]), &HashMap::new(), no_env)
            .unwrap();
        assert_eq!(config.creator, "alice");
    }

    #[test]
    fn missing_or_invalid_creator() {
        let err = Config::resolve(cli(&["--path", "/tmp"]), &HashMap::new(), no_env).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCreator));

        let err = Config::resolve(cli(&["../etc", "--path", "/tmp"]), &HashMap::new(), no_env).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCreator(_)));
    }

    #[test]
    fn precedence() {
        let file = HashMap::from([
            (TOKEN_VAR.to_string(), "from-file".to_string()),
            (BASEPATH_VAR.to_string(), "/data".to_string()),
        ]);
        let env = |key: &str| match key {
            TOKEN_VAR => Some("from-env".to_string()),
            USER_AGENT_VAR => Some("agent-from-env".to_string()),
            _ => None,
        };

        let config = Config::resolve(cli(&["alice"]), &file, env).unwrap();
        assert_eq!(config.token, "from-file");
        assert_eq!(config.user_agent, "agent-from-env");
        assert_eq!(config.base_path, PathBuf::from("/data"));

        let config = Config::resolve(cli(&["alice", "--token", "from-flag"]), &file, env).unwrap();
        assert_eq!(config.token, "from-flag");
    }

    #[test]
    fn defaults() {
        let config = Config::resolve(cli(&["alice", "--path", "/srv"]), &HashMap::new(), no_env).unwrap();
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(config.attempts, 7);
        assert_eq!(config.retry_delay, Duration::from_secs(1));
        assert_eq!(config.api_base, API_BASE);
        assert!(!config.metadata);
        assert_eq!(
            config.recording_dir(),
            PathBuf::from("/srv/FanslyDownloader/Fansly/alice")
        );
    }
}
