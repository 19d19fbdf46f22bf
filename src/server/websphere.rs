use super::{ContextCaching, ServerProfile};
use crate::naming::{Environment, INITIAL_CONTEXT_FACTORY};

/// IBM WebSphere (CosNaming over IIOP, bootstrap port 2809).
///
/// The context is memoized: repeated resolutions within one run reuse the
/// same session instead of repeating the IIOP bootstrap handshake.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSphere;

impl ServerProfile for WebSphere {
    fn vendor_name(&self) -> &str {
        "WebSphere"
    }

    fn type_key(&self) -> &str {
        "websphere"
    }

    fn default_protocol(&self) -> &str {
        "iiop"
    }

    fn default_port(&self) -> Option<u16> {
        Some(2809)
    }

    fn caching(&self) -> ContextCaching {
        ContextCaching::Memoized
    }

    fn vendor_properties(&self, env: &mut Environment) {
        env.set(
            INITIAL_CONTEXT_FACTORY,
            "com.ibm.websphere.naming.WsnInitialContextFactory",
        );
    }
}
