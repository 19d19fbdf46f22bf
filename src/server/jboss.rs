use super::{ContextCaching, ServerProfile};
use crate::naming::{Environment, INITIAL_CONTEXT_FACTORY, URL_PKG_PREFIXES};

/// JBoss AS (JNP naming, port 1099). Builds a fresh context on every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct JBoss;

impl ServerProfile for JBoss {
    fn vendor_name(&self) -> &str {
        "JBoss"
    }

    fn type_key(&self) -> &str {
        "jboss"
    }

    fn default_protocol(&self) -> &str {
        "jnp"
    }

    fn default_port(&self) -> Option<u16> {
        Some(1099)
    }

    fn caching(&self) -> ContextCaching {
        ContextCaching::Fresh
    }

    fn vendor_properties(&self, env: &mut Environment) {
        env.set(INITIAL_CONTEXT_FACTORY, "org.jnp.interfaces.NamingContextFactory")
            .set(URL_PKG_PREFIXES, "org.jboss.naming:org.jnp.interfaces");
    }
}
