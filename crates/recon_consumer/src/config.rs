//! Configuration for the consumer.

use crate::error::{ConsumerError, ConsumerResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

const NO_SECURITY_GROUP: &str = "no-security";

/// Connection and subscription settings for a [`Consumer`](crate::Consumer).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Organization whose topics are consumed.
    pub org_id: Option<String>,
    /// Comma separated broker addresses.
    pub brokers: String,
    /// Whether brokers require authentication.
    pub security_enabled: bool,
    /// Broker security protocol, e.g. `SASL_SSL`.
    pub security_protocol: String,
    /// SASL mechanism, e.g. `SCRAM-SHA-512`.
    pub authentication_mechanism: String,
    /// SASL username; doubles as the consumer group.
    pub username: Option<String>,
    /// SASL password.
    pub password: Option<String>,
    /// How long one poll may block, in milliseconds.
    pub poll_timeout_ms: u64,
}

impl ConsumerConfig {
    /// Creates a configuration for `org_id` with security disabled.
    pub fn new(org_id: impl Into<String>) -> Self {
        Self {
            org_id: Some(org_id.into()),
            ..Self::default()
        }
    }

    /// Sets the broker list.
    pub fn with_brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = brokers.into();
        self
    }

    /// Enables SASL authentication with the given credentials.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.security_enabled = true;
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Sets the poll timeout.
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// How long one poll may block.
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    /// Topics to subscribe to: run requests and the change log.
    pub fn topics(&self) -> Vec<String> {
        match self.org_id.as_deref().filter(|org| !org.is_empty()) {
            Some(org) => vec![format!("{org}.runs"), format!("{org}.change.log")],
            None => vec!["runs".to_string(), "change.log".to_string()],
        }
    }

    /// Consumer group: the username when security is on.
    pub fn group_id(&self) -> &str {
        match (&self.username, self.security_enabled) {
            (Some(username), true) => username.as_str(),
            _ => NO_SECURITY_GROUP,
        }
    }

    /// Checks that security settings are complete.
    pub fn validate(&self) -> ConsumerResult<()> {
        if !self.security_enabled {
            return Ok(());
        }
        if self.username.as_deref().map_or(true, str::is_empty) {
            return Err(ConsumerError::Config(
                "security is enabled but no username is set".into(),
            ));
        }
        if self.password.is_none() {
            return Err(ConsumerError::Config(
                "security is enabled but no password is set".into(),
            ));
        }
        Ok(())
    }

    /// Broker client properties in librdkafka naming. Offsets are always
    /// committed manually.
    pub fn client_properties(&self) -> BTreeMap<String, String> {
        let mut props = BTreeMap::new();
        props.insert("bootstrap.servers".to_string(), self.brokers.clone());
        props.insert("group.id".to_string(), self.group_id().to_string());
        props.insert("enable.auto.commit".to_string(), "false".to_string());

        if self.security_enabled {
            props.insert(
                "security.protocol".to_string(),
                self.security_protocol.clone(),
            );
            props.insert(
                "sasl.mechanism".to_string(),
                self.authentication_mechanism.clone(),
            );
            if let Some(username) = &self.username {
                props.insert("sasl.username".to_string(), username.clone());
            }
            if let Some(password) = &self.password {
                props.insert("sasl.password".to_string(), password.clone());
            }
        }
        props
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            org_id: None,
            brokers: "localhost:9092".to_string(),
            security_enabled: false,
            security_protocol: "SASL_SSL".to_string(),
            authentication_mechanism: "SCRAM-SHA-512".to_string(),
            username: None,
            password: None,
            poll_timeout_ms: 1000,
        }
    }
}

impl fmt::Debug for ConsumerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerConfig")
            .field("org_id", &self.org_id)
            .field("brokers", &self.brokers)
            .field("security_enabled", &self.security_enabled)
            .field("security_protocol", &self.security_protocol)
            .field("authentication_mechanism", &self.authentication_mechanism)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("poll_timeout_ms", &self.poll_timeout_ms)
            .finish()
    }
}
