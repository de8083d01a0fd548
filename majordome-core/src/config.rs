//! Injected deployment configuration.
//!
//! The broker is constructed with an explicit [`MqConfig`] rather than
//! reading a config file or process-wide globals. Deployments that keep
//! their settings in a key-value store can build one with
//! [`MqConfig::from_pairs`]; the format of that store is not this crate's
//! concern.

use thiserror::Error;

use crate::endpoint::Endpoint;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing configuration key: {0}")]
    MissingKey(&'static str),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Broker deployment configuration.
#[derive(Debug, Clone)]
pub struct MqConfig {
    /// Address the broker binds on.
    pub ip: String,
    /// Port for the main request/reply endpoint (workers and clients).
    pub req_rep_port: u16,
    /// Optional second port bound exclusively for clients.
    pub client_port: Option<u16>,
}

impl MqConfig {
    /// Create a configuration for the main endpoint.
    pub fn new(ip: impl Into<String>, req_rep_port: u16) -> Self {
        Self {
            ip: ip.into(),
            req_rep_port,
            client_port: None,
        }
    }

    /// Bind a second, client-only endpoint.
    #[must_use]
    pub const fn with_client_port(mut self, port: u16) -> Self {
        self.client_port = Some(port);
        self
    }

    /// Build a configuration from an opaque key-value source.
    ///
    /// Recognized keys: `ip`, `req_rep_port`, `client_port`. Unknown keys
    /// are ignored; `ip` and `req_rep_port` are mandatory.
    ///
    /// # Examples
    ///
    /// ```
    /// use majordome_core::config::MqConfig;
    ///
    /// let cfg = MqConfig::from_pairs([
    ///     ("ip", "127.0.0.1"),
    ///     ("req_rep_port", "40410"),
    /// ]).unwrap();
    /// assert_eq!(cfg.req_rep_port, 40410);
    /// ```
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut ip = None;
        let mut req_rep_port = None;
        let mut client_port = None;

        for (key, value) in pairs {
            match key {
                "ip" => ip = Some(value.to_owned()),
                "req_rep_port" => {
                    req_rep_port = Some(parse_port("req_rep_port", value)?);
                }
                "client_port" => {
                    client_port = Some(parse_port("client_port", value)?);
                }
                _ => {}
            }
        }

        Ok(Self {
            ip: ip.ok_or(ConfigError::MissingKey("ip"))?,
            req_rep_port: req_rep_port.ok_or(ConfigError::MissingKey("req_rep_port"))?,
            client_port,
        })
    }

    /// The main endpoint (workers and clients).
    pub fn endpoint(&self) -> Result<Endpoint, ConfigError> {
        parse_endpoint(&self.ip, self.req_rep_port)
    }

    /// The client-only endpoint, if configured.
    pub fn client_endpoint(&self) -> Result<Option<Endpoint>, ConfigError> {
        self.client_port
            .map(|port| parse_endpoint(&self.ip, port))
            .transpose()
    }
}

fn parse_port(key: &'static str, value: &str) -> Result<u16, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_owned(),
    })
}

fn parse_endpoint(ip: &str, port: u16) -> Result<Endpoint, ConfigError> {
    Endpoint::parse(&format!("{ip}:{port}")).map_err(|e| ConfigError::InvalidValue {
        key: "ip",
        value: e.to_string(),
    })
}
