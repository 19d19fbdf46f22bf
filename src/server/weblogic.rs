use super::ServerProfile;
use crate::naming::{Environment, INITIAL_CONTEXT_FACTORY};

/// Oracle WebLogic (T3, port 7001). Uses the default fresh-context policy.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebLogic;

impl ServerProfile for WebLogic {
    fn vendor_name(&self) -> &str {
        "WebLogic"
    }

    fn type_key(&self) -> &str {
        "weblogic"
    }

    fn default_protocol(&self) -> &str {
        "t3"
    }

    fn default_port(&self) -> Option<u16> {
        Some(7001)
    }

    fn vendor_properties(&self, env: &mut Environment) {
        env.set(INITIAL_CONTEXT_FACTORY, "weblogic.jndi.WLInitialContextFactory");
    }
}
