//! AWS credential resolution.
//!
//! Credentials decide how Redshift authorizes itself against the staging
//! bucket. Resolution is pure precedence logic over strings that were already
//! read from configuration and the environment.

use secrecy::{ExposeSecret, SecretString};
use std::fmt;

/// Environment variable holding the fallback access key.
pub const ENV_AWS_ACCESS_KEY: &str = "AWS_ACCESS_KEY";
/// Environment variable holding the fallback secret key.
pub const ENV_AWS_SECRET_KEY: &str = "AWS_SECRET_KEY";

/// Where an explicit key pair came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Configuration,
    Environment,
}

/// The principal Redshift uses to read staged files.
#[derive(Clone)]
pub enum Credentials {
    /// The cluster uses its own ambient identity (its default IAM role).
    RuntimeDetermined,
    /// An explicit access/secret key pair.
    Explicit {
        access_key: String,
        secret_key: SecretString,
        source: CredentialSource,
    },
}

impl Credentials {
    pub fn explicit(
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        source: CredentialSource,
    ) -> Self {
        Credentials::Explicit {
            access_key: access_key.into(),
            secret_key: SecretString::from(secret_key.into()),
            source,
        }
    }

    /// Resolve credentials: explicit pair, then environment pair, then ambient.
    ///
    /// Both halves of a pair must be present and non-empty; a lone key on
    /// either side is treated as absent.
    pub fn resolve(
        explicit_access_key: Option<&str>,
        explicit_secret_key: Option<&str>,
        environment_access_key: Option<&str>,
        environment_secret_key: Option<&str>,
    ) -> Self {
        if let Some((access, secret)) = complete_pair(explicit_access_key, explicit_secret_key) {
            return Credentials::explicit(access, secret, CredentialSource::Configuration);
        }
        if let Some((access, secret)) =
            complete_pair(environment_access_key, environment_secret_key)
        {
            return Credentials::explicit(access, secret, CredentialSource::Environment);
        }
        Credentials::RuntimeDetermined
    }

    pub fn is_runtime_determined(&self) -> bool {
        matches!(self, Credentials::RuntimeDetermined)
    }

    pub fn source(&self) -> Option<CredentialSource> {
        match self {
            Credentials::RuntimeDetermined => None,
            Credentials::Explicit { source, .. } => Some(*source),
        }
    }

    pub fn access_key(&self) -> Option<&str> {
        match self {
            Credentials::RuntimeDetermined => None,
            Credentials::Explicit { access_key, .. } => Some(access_key),
        }
    }

    /// The authorization clause of a COPY command. Exposes the secret; only
    /// the command compiler calls this.
    pub(crate) fn authorization_clause(&self) -> String {
        match self {
            Credentials::RuntimeDetermined => "IAM_ROLE default".to_string(),
            Credentials::Explicit {
                access_key,
                secret_key,
                ..
            } => format!(
                "CREDENTIALS 'aws_access_key_id={};aws_secret_access_key={}'",
                access_key.replace('\'', "''"),
                secret_key.expose_secret().replace('\'', "''")
            ),
        }
    }

    /// The authorization clause with the secret masked, for logs.
    pub(crate) fn redacted_clause(&self) -> String {
        match self {
            Credentials::RuntimeDetermined => "IAM_ROLE default".to_string(),
            Credentials::Explicit { access_key, .. } => format!(
                "CREDENTIALS 'aws_access_key_id={};aws_secret_access_key=***REDACTED***'",
                access_key.replace('\'', "''")
            ),
        }
    }
}

fn complete_pair<'a>(
    access: Option<&'a str>,
    secret: Option<&'a str>,
) -> Option<(&'a str, &'a str)> {
    let access = access.filter(|v| !v.trim().is_empty())?;
    let secret = secret.filter(|v| !v.trim().is_empty())?;
    Some((access, secret))
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::RuntimeDetermined => f.write_str("RuntimeDetermined"),
            Credentials::Explicit {
                access_key, source, ..
            } => f
                .debug_struct("Explicit")
                .field("access_key", access_key)
                .field("secret_key", &"***REDACTED***")
                .field("source", source)
                .finish(),
        }
    }
}

impl PartialEq for Credentials {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Credentials::RuntimeDetermined, Credentials::RuntimeDetermined) => true,
            (
                Credentials::Explicit {
                    access_key: a1,
                    secret_key: s1,
                    source: src1,
                },
                Credentials::Explicit {
                    access_key: a2,
                    secret_key: s2,
                    source: src2,
                },
            ) => a1 == a2 && s1.expose_secret() == s2.expose_secret() && src1 == src2,
            _ => false,
        }
    }
}
