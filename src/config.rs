use crate::error::TelnetResult;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Connection parameters for a Telnet session. Prompt patterns are regex
/// source strings, compiled when the session is opened.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    /// Connect deadline, and the quiet period after which a `Timeout`
    /// notification is emitted.
    pub timeout_ms: u64,
    pub shell_prompt: String,
    pub login_prompt: String,
    pub password_prompt: String,
    pub username: String,
    pub password: String,
    /// Line boundary used to split collected command output.
    pub input_record_separator: String,
    /// Line terminator appended to everything the session writes.
    pub output_record_separator: String,
    /// Leading output lines attributable to the remote echoing the sent
    /// command; stripped from results.
    pub echo_lines: usize,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 23,
            timeout_ms: 500,
            shell_prompt: r"(?:/ )?#\s".to_string(),
            login_prompt: r"(?i)login[: ]*$".to_string(),
            password_prompt: r"(?i)Password: ".to_string(),
            username: "root".to_string(),
            password: "guest".to_string(),
            input_record_separator: "\r\n".to_string(),
            output_record_separator: "\n".to_string(),
            echo_lines: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub connection: ConnectOptions,
    pub logging: LoggingConfig,
}

/// Run commands over a Telnet session and print their output.
#[derive(Debug, Parser)]
#[command(author, version = crate::version::VERSION, about)]
pub struct Cli {
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub host: Option<String>,
    #[arg(long)]
    pub port: Option<u16>,
    #[arg(long)]
    pub username: Option<String>,
    #[arg(long)]
    pub password: Option<String>,
    #[arg(long)]
    pub timeout_ms: Option<u64>,
    #[arg(long)]
    pub shell_prompt: Option<String>,
    #[arg(long)]
    pub log_level: Option<String>,
    /// Print one JSON object per command instead of raw lines.
    #[arg(long)]
    pub json: bool,
    #[arg(value_name = "COMMAND", required = true)]
    pub commands: Vec<String>,
}

impl Config {
    pub fn load(cli: &Cli) -> TelnetResult<Self> {
        let mut config = if let Some(path) = &cli.config {
            Self::from_file(path)?
        } else if Path::new("telexec.toml").exists() {
            Self::from_file(Path::new("telexec.toml"))?
        } else {
            Self::default()
        };

        config.apply_env();
        config.apply_cli(cli);
        Ok(config)
    }

    pub fn from_file(path: &Path) -> TelnetResult<Self> {
        let content = fs::read_to_string(path)?;
        let parsed: Self = toml::from_str(&content)?;
        Ok(parsed)
    }

    fn apply_env(&mut self) {
        if let Ok(value) = env::var("TELEXEC_HOST") {
            self.connection.host = value;
        }
        if let Ok(value) = env::var("TELEXEC_PORT")
            && let Ok(port) = value.parse()
        {
            self.connection.port = port;
        }
        if let Ok(value) = env::var("TELEXEC_USERNAME") {
            self.connection.username = value;
        }
        if let Ok(value) = env::var("TELEXEC_PASSWORD") {
            self.connection.password = value;
        }
        if let Ok(value) = env::var("TELEXEC_TIMEOUT_MS")
            && let Ok(timeout) = value.parse()
        {
            self.connection.timeout_ms = timeout;
        }
        if let Ok(value) = env::var("TELEXEC_LOG_LEVEL") {
            self.logging.level = value;
        }
    }

    fn apply_cli(&mut self, cli: &Cli) {
        if let Some(host) = &cli.host {
            self.connection.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.connection.port = port;
        }
        if let Some(username) = &cli.username {
            self.connection.username = username.clone();
        }
        if let Some(password) = &cli.password {
            self.connection.password = password.clone();
        }
        if let Some(timeout) = cli.timeout_ms {
            self.connection.timeout_ms = timeout;
        }
        if let Some(pattern) = &cli.shell_prompt {
            self.connection.shell_prompt = pattern.clone();
        }
        if let Some(level) = &cli.log_level {
            self.logging.level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let options = ConnectOptions::default();
        assert_eq!(options.host, "127.0.0.1");
        assert_eq!(options.port, 23);
        assert_eq!(options.timeout_ms, 500);
        assert_eq!(options.username, "root");
        assert_eq!(options.password, "guest");
        assert_eq!(options.input_record_separator, "\r\n");
        assert_eq!(options.output_record_separator, "\n");
        assert_eq!(options.echo_lines, 1);
    }

    #[test]
    fn config_file_overrides_merge_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "[connection]\nhost = \"192.0.2.7\"\nport = 2323\nusername = \"admin\"\n\n[logging]\nlevel = \"debug\"\n"
        )
        .expect("write config");

        let config = Config::from_file(file.path()).expect("parse config");
        assert_eq!(config.connection.host, "192.0.2.7");
        assert_eq!(config.connection.port, 2323);
        assert_eq!(config.connection.username, "admin");
        // untouched fields keep their defaults
        assert_eq!(config.connection.password, "guest");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "text");
    }

    #[test]
    fn cli_flags_override_file_values() {
        let mut config = Config::default();
        let cli = Cli {
            config: None,
            host: Some("10.0.0.9".to_string()),
            port: Some(10023),
            username: None,
            password: None,
            timeout_ms: Some(1_500),
            shell_prompt: Some(r"\$ $".to_string()),
            log_level: Some("trace".to_string()),
            json: false,
            commands: vec!["uptime".to_string()],
        };
        config.apply_cli(&cli);
        assert_eq!(config.connection.host, "10.0.0.9");
        assert_eq!(config.connection.port, 10023);
        assert_eq!(config.connection.timeout_ms, 1_500);
        assert_eq!(config.connection.shell_prompt, r"\$ $");
        assert_eq!(config.connection.username, "root");
        assert_eq!(config.logging.level, "trace");
    }
}
