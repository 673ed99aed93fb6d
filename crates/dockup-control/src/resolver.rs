//! Container address resolution with bounded retries
//!
//! A container that just started is not always resolvable yet (DNS records
//! of user-defined networks appear shortly after `start`), so lookups are
//! retried a fixed number of times with a fixed delay in between.

use async_trait::async_trait;
use std::io;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Default number of lookup attempts
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default delay between failed attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Resolution errors
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Container has no hostname to resolve")]
    EmptyHostname,

    #[error("Unable to resolve {hostname} after {attempts} attempts: {reason}")]
    Exhausted {
        hostname: String,
        attempts: u32,
        reason: String,
    },
}

/// Name lookup backend
#[async_trait]
pub trait Lookup: Send + Sync {
    /// All addresses for `hostname`, in resolver order
    async fn lookup(&self, hostname: &str) -> io::Result<Vec<IpAddr>>;
}

/// Lookup through the system resolver
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLookup;

#[async_trait]
impl Lookup for SystemLookup {
    async fn lookup(&self, hostname: &str) -> io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((hostname, 0)).await?;
        Ok(addrs.map(|addr| addr.ip()).collect())
    }
}

/// How often and how patiently to retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Resolves container hostnames to a single address
#[derive(Clone)]
pub struct HostnameResolver {
    lookup: Arc<dyn Lookup>,
    policy: RetryPolicy,
}

impl HostnameResolver {
    pub fn new(lookup: Arc<dyn Lookup>) -> Self {
        Self {
            lookup,
            policy: RetryPolicy::default(),
        }
    }

    /// Resolver backed by the system resolver with the default policy
    pub fn system() -> Self {
        Self::new(Arc::new(SystemLookup))
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Resolve `hostname`, returning the first address of the first
    /// successful lookup
    ///
    /// An empty answer counts as a failed attempt. There is no delay after
    /// the last attempt.
    pub async fn resolve(&self, hostname: &str) -> Result<IpAddr, ResolveError> {
        if hostname.is_empty() {
            return Err(ResolveError::EmptyHostname);
        }

        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let reason = match self.lookup.lookup(hostname).await {
                Ok(addrs) => match addrs.first() {
                    Some(addr) => {
                        debug!("Resolved {} to {} (attempt {})", hostname, addr, attempt);
                        return Ok(*addr);
                    }
                    None => "no addresses returned".to_string(),
                },
                Err(e) => e.to_string(),
            };

            if attempt >= max_attempts {
                return Err(ResolveError::Exhausted {
                    hostname: hostname.to_string(),
                    attempts: attempt,
                    reason,
                });
            }

            info!(
                "Unable to resolve {} ({}), retrying... ({}/{})",
                hostname, reason, attempt, max_attempts
            );
            tokio::time::sleep(self.policy.delay).await;
        }
    }
}

impl std::fmt::Debug for HostnameResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostnameResolver")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
