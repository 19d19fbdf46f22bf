//! Naming-service boundary.
//!
//! Environment (property set) -> NamingClient::open -> NamingSession { lookup | list }
//! ConnectionContext wraps an open session plus where/how it was obtained.
//! The protocol itself lives behind `NamingClient` (see `bridge`).
//!
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

use crate::error::NamingError;

pub mod bridge;

pub const INITIAL_CONTEXT_FACTORY: &str = "java.naming.factory.initial";
pub const PROVIDER_URL: &str = "java.naming.provider.url";
pub const URL_PKG_PREFIXES: &str = "java.naming.factory.url.pkgs";
pub const SECURITY_PRINCIPAL: &str = "java.naming.security.principal";
pub const SECURITY_CREDENTIALS: &str = "java.naming.security.credentials";

/// Property set used to open a naming session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Environment {
    props: BTreeMap<String, String>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.props.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.props.get(key).map(String::as_str)
    }

    pub fn provider_url(&self) -> Option<&str> {
        self.get(PROVIDER_URL)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.props.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Renders `{key=value, ...}` with the credentials value masked.
impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (k, v)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            if k == SECURITY_CREDENTIALS {
                write!(f, "{k}=****")?;
            } else {
                write!(f, "{k}={v}")?;
            }
        }
        f.write_str("}")
    }
}

/// Build `<protocol>://<address>`, appending `default_port` when the address carries none.
///
/// Without a default port the address is used verbatim. With one, a port-less
/// host is rewritten (`iiop://host` becomes `iiop://host:2809`) so the
/// reachability probe always has an endpoint; addresses that already carry a
/// port or a path are left untouched.
pub fn compose_provider_url(protocol: &str, address: &str, default_port: Option<u16>) -> String {
    let composed = format!("{protocol}://{address}");
    let Some(port) = default_port else {
        return composed;
    };
    match Url::parse(&composed) {
        Ok(url) if url.host().is_some() && url.port().is_none() && !address.contains('/') => {
            format!("{composed}:{port}")
        }
        _ => composed,
    }
}

/// Parsed provider URL (scheme + endpoint).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderUrl {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl ProviderUrl {
    /// `host:port` suitable for a socket connect.
    pub fn endpoint(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for ProviderUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.endpoint())
    }
}

pub fn parse_provider_url(raw: &str) -> Result<ProviderUrl, NamingError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| NamingError::Configuration(format!("invalid provider URL '{raw}': {e}")))?;
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| NamingError::Configuration(format!("provider URL '{raw}' has no host")))?;
    let port = url
        .port()
        .ok_or_else(|| NamingError::Configuration(format!("provider URL '{raw}' has no port")))?;
    Ok(ProviderUrl {
        scheme: url.scheme().to_string(),
        host: host.trim_start_matches('[').trim_end_matches(']').to_string(),
        port,
    })
}

/// A bound object as reported by the naming service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub name: String,
    pub class_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// One child entry of a naming context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameClassPair {
    pub name: String,
    pub class_name: String,
    /// True when the entry is itself a context that can be listed.
    #[serde(default)]
    pub is_context: bool,
}

/// Opens naming sessions. Implemented by the vendor client bridge.
pub trait NamingClient {
    fn open(&self, env: &Environment) -> Result<Box<dyn NamingSession>, NamingError>;
}

/// An open session against the naming service. Lookups only.
pub trait NamingSession {
    fn lookup(&self, name: &str) -> Result<Binding, NamingError>;
    fn list(&self, name: &str) -> Result<Vec<NameClassPair>, NamingError>;
}

/// Established session handle handed to a command.
pub struct ConnectionContext {
    vendor: String,
    provider_url: String,
    principal: Option<String>,
    session: Box<dyn NamingSession>,
}

impl ConnectionContext {
    pub fn new(
        vendor: impl Into<String>,
        provider_url: impl Into<String>,
        principal: Option<String>,
        session: Box<dyn NamingSession>,
    ) -> Self {
        Self {
            vendor: vendor.into(),
            provider_url: provider_url.into(),
            principal,
            session,
        }
    }

    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    pub fn provider_url(&self) -> &str {
        &self.provider_url
    }

    pub fn principal(&self) -> Option<&str> {
        self.principal.as_deref()
    }

    pub fn lookup(&self, name: &str) -> Result<Binding, NamingError> {
        self.session.lookup(name)
    }

    pub fn list(&self, name: &str) -> Result<Vec<NameClassPair>, NamingError> {
        self.session.list(name)
    }
}

impl fmt::Debug for ConnectionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionContext")
            .field("vendor", &self.vendor)
            .field("provider_url", &self.provider_url)
            .field("principal", &self.principal)
            .finish_non_exhaustive()
    }
}
