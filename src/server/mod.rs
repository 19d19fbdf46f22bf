//! Server vendor strategies and connection resolution.
//!
//! ServerProfile  : per-vendor recipe (protocol, port, factory properties, caching policy)
//! ConnectionResolver : picks the profile for `--type`, composes the provider URL,
//!                      attaches credentials and obtains a ConnectionContext.
//!
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, trace};

use crate::config::{Config, Credentials};
use crate::error::{ConnectionError, NamingError, ProfileError};
use crate::naming::{
    ConnectionContext, Environment, NamingClient, PROVIDER_URL, SECURITY_CREDENTIALS,
    SECURITY_PRINCIPAL, compose_provider_url,
};

mod jboss;
mod weblogic;
mod websphere;

pub use jboss::JBoss;
pub use weblogic::WebLogic;
pub use websphere::WebSphere;

/// Server type used when none is configured.
pub const DEFAULT_SERVER_TYPE: &str = "websphere";

/// Whether a profile reuses the context it built last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextCaching {
    /// Reuse the last successfully built context for the same provider/principal.
    Memoized,
    /// Perform a fresh handshake on every call.
    Fresh,
}

impl ContextCaching {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextCaching::Memoized => "memoized",
            ContextCaching::Fresh => "fresh",
        }
    }
}

/// Inputs a profile needs to build a context.
#[derive(Debug, Clone)]
pub struct ContextRequest {
    pub provider_url: String,
    pub credentials: Option<Credentials>,
    /// Include the composed property set in misconfiguration diagnostics.
    pub verbose: bool,
}

pub trait ServerProfile {
    fn vendor_name(&self) -> &str;

    /// Matched against the configured server type.
    fn type_key(&self) -> &str;

    fn default_protocol(&self) -> &str;

    /// Appended when the server address carries no port.
    fn default_port(&self) -> Option<u16> {
        None
    }

    fn caching(&self) -> ContextCaching {
        ContextCaching::Fresh
    }

    /// Vendor-specific naming properties (context factory, URL packages).
    fn vendor_properties(&self, env: &mut Environment);

    fn environment(&self, request: &ContextRequest) -> Environment {
        let mut env = Environment::new();
        self.vendor_properties(&mut env);
        if let Some(creds) = &request.credentials {
            env.set(SECURITY_PRINCIPAL, creds.principal.as_str())
                .set(SECURITY_CREDENTIALS, creds.secret.as_str());
        }
        env.set(PROVIDER_URL, request.provider_url.as_str());
        env
    }

    fn build_context(
        &self,
        request: &ContextRequest,
        client: &dyn NamingClient,
    ) -> Result<ConnectionContext, ConnectionError> {
        let env = self.environment(request);
        trace!(vendor = self.vendor_name(), properties = %env, "Creating initial context");

        match client.open(&env) {
            Ok(session) => Ok(ConnectionContext::new(
                self.vendor_name(),
                request.provider_url.as_str(),
                request.credentials.as_ref().map(|c| c.principal.clone()),
                session,
            )),
            Err(NamingError::Communication(reason)) => Err(ConnectionError::Unreachable {
                url: request.provider_url.clone(),
                reason,
            }),
            Err(other) => Err(ConnectionError::Misconfigured {
                reason: other.to_string(),
                properties: request.verbose.then(|| env.to_string()),
            }),
        }
    }
}

/// Source of connection contexts for the dispatch engine.
pub trait ContextResolver {
    fn resolve(&self, config: &Config) -> Result<Rc<ConnectionContext>, ConnectionError>;
}

/// Resolves contexts through the registered server profiles.
pub struct ConnectionResolver {
    profiles: Vec<Box<dyn ServerProfile>>,
    client: Box<dyn NamingClient>,
    memo: RefCell<HashMap<String, Rc<ConnectionContext>>>,
}

impl ConnectionResolver {
    /// Resolver with no profiles registered.
    pub fn new(client: Box<dyn NamingClient>) -> Self {
        Self {
            profiles: Vec::new(),
            client,
            memo: RefCell::new(HashMap::new()),
        }
    }

    /// Resolver with WebSphere, JBoss and WebLogic registered.
    pub fn with_builtin_profiles(client: Box<dyn NamingClient>) -> Result<Self, ProfileError> {
        let mut resolver = Self::new(client);
        resolver.register(Box::new(WebSphere))?;
        resolver.register(Box::new(JBoss))?;
        resolver.register(Box::new(WebLogic))?;
        Ok(resolver)
    }

    /// Register a profile. Type keys are unique (case-insensitive).
    pub fn register(&mut self, profile: Box<dyn ServerProfile>) -> Result<(), ProfileError> {
        if self.profile(profile.type_key()).is_some() {
            return Err(ProfileError::AlreadyRegistered {
                key: profile.type_key().to_string(),
            });
        }
        debug!(
            vendor = profile.vendor_name(),
            key = profile.type_key(),
            caching = profile.caching().as_str(),
            "Registered server profile"
        );
        self.profiles.push(profile);
        Ok(())
    }

    pub fn profile(&self, key: &str) -> Option<&dyn ServerProfile> {
        self.profiles
            .iter()
            .find(|p| p.type_key().eq_ignore_ascii_case(key.trim()))
            .map(AsRef::as_ref)
    }

    /// Registered profiles, sorted by type key.
    pub fn profiles(&self) -> Vec<&dyn ServerProfile> {
        let mut all: Vec<&dyn ServerProfile> = self.profiles.iter().map(AsRef::as_ref).collect();
        all.sort_by(|a, b| a.type_key().cmp(b.type_key()));
        all
    }

    fn available_keys(&self) -> String {
        self.profiles()
            .into_iter()
            .map(|p| p.type_key())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl ContextResolver for ConnectionResolver {
    fn resolve(&self, config: &Config) -> Result<Rc<ConnectionContext>, ConnectionError> {
        let key = config
            .server_type
            .as_deref()
            .unwrap_or(DEFAULT_SERVER_TYPE);
        let profile = self
            .profile(key)
            .ok_or_else(|| ConnectionError::UnknownServerType {
                key: key.to_string(),
                available: self.available_keys(),
            })?;

        let address = config
            .server
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConnectionError::Misconfigured {
                reason: "no server address specified (use --server or ASX_SERVER)".to_string(),
                properties: None,
            })?;

        let protocol = config
            .protocol
            .as_deref()
            .unwrap_or(profile.default_protocol());
        let provider_url = compose_provider_url(protocol, address, profile.default_port());

        if config.has_partial_credentials() {
            debug!("Only one of username/password supplied; connecting without credentials");
        }
        let request = ContextRequest {
            provider_url,
            credentials: config.credentials(),
            verbose: config.verbose,
        };

        match profile.caching() {
            ContextCaching::Fresh => profile
                .build_context(&request, self.client.as_ref())
                .map(Rc::new),
            ContextCaching::Memoized => {
                let memo_key = format!(
                    "{}|{}|{}",
                    profile.type_key(),
                    request.provider_url,
                    request
                        .credentials
                        .as_ref()
                        .map(|c| c.principal.as_str())
                        .unwrap_or("")
                );
                let cached = self.memo.borrow().get(&memo_key).cloned();
                if let Some(ctx) = cached {
                    debug!(vendor = profile.vendor_name(), "Reusing memoized context");
                    return Ok(ctx);
                }
                let ctx = Rc::new(profile.build_context(&request, self.client.as_ref())?);
                self.memo.borrow_mut().insert(memo_key, Rc::clone(&ctx));
                Ok(ctx)
            }
        }
    }
}
