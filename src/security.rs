//! Process-wide security policy bootstrap.
//!
//! The bundled client policy is installed once, before the first connection,
//! and forwarded to the naming bridge. Installing again is detected and skipped.

use std::sync::OnceLock;
use tracing::debug;

const BUNDLED_POLICY: &str = include_str!("../resources/client.policy");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityPolicy {
    /// Where the policy text came from (for diagnostics).
    pub source: String,
    pub text: String,
}

impl SecurityPolicy {
    pub fn bundled() -> Self {
        Self {
            source: "bundled:client.policy".to_string(),
            text: BUNDLED_POLICY.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    Installed,
    AlreadyInstalled,
}

/// One-time initialization performed before the first dispatch.
pub trait SecurityBootstrap {
    fn ensure_installed(&self) -> BootstrapOutcome;
}

/// Init-once holder for an installed policy.
#[derive(Debug, Default)]
pub struct PolicySlot {
    cell: OnceLock<SecurityPolicy>,
}

impl PolicySlot {
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }

    pub fn install(&self, policy: SecurityPolicy) -> BootstrapOutcome {
        let mut fresh = false;
        let active = self.cell.get_or_init(|| {
            fresh = true;
            policy
        });
        if fresh {
            debug!(source = %active.source, "Security policy installed");
            BootstrapOutcome::Installed
        } else {
            debug!(source = %active.source, "Security policy already installed; skipping");
            BootstrapOutcome::AlreadyInstalled
        }
    }

    pub fn get(&self) -> Option<&SecurityPolicy> {
        self.cell.get()
    }
}

static PROCESS_POLICY: PolicySlot = PolicySlot::new();

/// The policy installed for this process, if the bootstrap already ran.
pub fn installed_policy() -> Option<&'static SecurityPolicy> {
    PROCESS_POLICY.get()
}

/// Installs the bundled policy into the process-wide slot.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessPolicy;

impl SecurityBootstrap for ProcessPolicy {
    fn ensure_installed(&self) -> BootstrapOutcome {
        PROCESS_POLICY.install(SecurityPolicy::bundled())
    }
}
