use std::fmt;

use rdkafka::ClientConfig;

use crate::config::AuthConfig;
use crate::{Error, Result};

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// The single SASL mechanism a client authenticates with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaslMechanism {
    Plain(Credentials),
    ScramSha256(Credentials),
    ScramSha512(Credentials),
}

impl SaslMechanism {
    /// Picks the mechanism for `auth`.
    ///
    /// A non-zero `scram` selects SCRAM with that hash strength and must be
    /// 256 or 512. Zero selects PLAIN.
    pub fn select(auth: &AuthConfig) -> Result<Self> {
        let credentials = Credentials::new(&auth.username, &auth.password);

        match auth.scram {
            0 => Ok(Self::Plain(credentials)),
            256 => Ok(Self::ScramSha256(credentials)),
            512 => Ok(Self::ScramSha512(credentials)),
            other => Err(Error::Sasl(format!(
                "invalid scram alg {}: must be 256 or 512",
                other
            ))),
        }
    }

    /// Like [`SaslMechanism::select`], but yields `None` when no SASL
    /// credentials are configured at all: the client then relies on its TLS
    /// certificate, or on an unauthenticated listener.
    pub fn for_client(auth: &AuthConfig) -> Result<Option<Self>> {
        if auth.username.is_empty() && auth.password.is_empty() && auth.scram == 0 {
            return Ok(None);
        }
        Self::select(auth).map(Some)
    }

    /// Name as understood by `sasl.mechanism`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Plain(_) => "PLAIN",
            Self::ScramSha256(_) => "SCRAM-SHA-256",
            Self::ScramSha512(_) => "SCRAM-SHA-512",
        }
    }

    pub fn credentials(&self) -> &Credentials {
        match self {
            Self::Plain(c) | Self::ScramSha256(c) | Self::ScramSha512(c) => c,
        }
    }

    pub fn apply(&self, client_config: &mut ClientConfig) {
        let credentials = self.credentials();
        client_config
            .set("sasl.mechanism", self.name())
            .set("sasl.username", &credentials.username)
            .set("sasl.password", &credentials.password);
    }
}
