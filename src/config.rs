use crate::service::EmailAddress;
use crate::store::RetryPolicy;
use anyhow::{Result, anyhow};
use clap::Parser;

/// Runtime settings. Every flag can also come from the environment or a `.env` file.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "gymdesk")]
#[command(about = "Gym administration back office")]
pub struct AppConfig {
    #[arg(long, env = "GYMDESK_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "GYMDESK_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Rows per page when a request does not ask for a size.
    #[arg(long, env = "GYMDESK_PAGE_SIZE", default_value_t = 10)]
    pub page_size: usize,

    #[arg(long, env = "GYMDESK_STORE_RETRY_ATTEMPTS", default_value_t = 3)]
    pub store_retry_attempts: u32,

    #[arg(long, env = "GYMDESK_STORE_RETRY_BACKOFF_MS", default_value_t = 25)]
    pub store_retry_backoff_ms: u64,

    #[arg(long, env = "GYMDESK_STORE_RETRY_MAX_BACKOFF_MS", default_value_t = 500)]
    pub store_retry_max_backoff_ms: u64,

    /// Mail API endpoint. Without one, messages are only logged.
    #[arg(long, env = "GYMDESK_MAIL_ENDPOINT")]
    pub mail_endpoint: Option<String>,

    #[arg(long, env = "GYMDESK_MAIL_API_KEY", hide_env_values = true)]
    pub mail_api_key: Option<String>,

    #[arg(long, env = "GYMDESK_MAIL_FROM", default_value = "Gym Desk <no-reply@gymdesk.local>")]
    pub mail_from: String,

    /// Load sample data into the empty store at startup.
    #[arg(long, env = "GYMDESK_SEED", default_value_t = false, action = clap::ArgAction::Set)]
    pub seed: bool,
}

impl AppConfig {
    /// Parses the command line after loading `.env`.
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        Self::parse()
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.store_retry_attempts.max(1),
            initial_backoff_ms: self.store_retry_backoff_ms,
            max_backoff_ms: self.store_retry_max_backoff_ms.max(self.store_retry_backoff_ms),
        }
    }

    /// `"Name <address>"` or a bare address.
    pub fn mail_sender(&self) -> Result<EmailAddress> {
        let raw = self.mail_from.trim();
        let (name, address) = match raw.split_once('<') {
            Some((name, rest)) => {
                let address = rest
                    .strip_suffix('>')
                    .ok_or_else(|| anyhow!("GYMDESK_MAIL_FROM is missing a closing '>'"))?;
                (name.trim(), address.trim())
            }
            None => ("", raw),
        };
        if !address.contains('@') {
            return Err(anyhow!("GYMDESK_MAIL_FROM must contain an e-mail address"));
        }
        Ok(EmailAddress {
            name: name.to_string(),
            address: address.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let config = AppConfig::try_parse_from([
            "gymdesk",
            "--port",
            "9090",
            "--page-size",
            "20",
            "--seed",
            "true",
        ])
        .unwrap();
        assert_eq!(config.address(), "0.0.0.0:9090");
        assert_eq!(config.page_size, 20);
        assert!(config.seed);
        assert_eq!(config.retry_policy().max_attempts, 3);
    }

    #[test]
    fn mail_sender_accepts_named_and_bare_addresses() {
        let mut config = AppConfig::try_parse_from(["gymdesk"]).unwrap();
        let named = config.mail_sender().unwrap();
        assert_eq!(named.name, "Gym Desk");
        assert_eq!(named.address, "no-reply@gymdesk.local");

        config.mail_from = "desk@gym.ca".to_string();
        assert_eq!(config.mail_sender().unwrap().name, "");

        config.mail_from = "Desk <desk@gym.ca".to_string();
        assert!(config.mail_sender().is_err());
    }
}
