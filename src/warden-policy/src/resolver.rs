//! Name resolution with an admin binding and runtime overrides.
//!
//! Precedence is fixed: admin binding, then override table, then the
//! fallback resolver (the system resolver by default).

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::overrides::OverrideTable;

/// Default reserved admin name.
pub const DEFAULT_ADMIN_NAME: &str = "i";

/// Name resolution failure.
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// The lookup succeeded but returned no address.
    #[error("no address found for {0}")]
    NotFound(String),

    /// The lookup itself failed.
    #[error("failed to resolve {name}: {source}")]
    Lookup {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Resolution callback consumed by the proxy transport.
#[async_trait]
pub trait NameResolver: Send + Sync {
    async fn resolve(&self, name: &str) -> Result<IpAddr, ResolutionError>;
}

/// Resolver backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl NameResolver for SystemResolver {
    /// Return the first IPv4 address found, or the first address of any
    /// family when there is none.
    async fn resolve(&self, name: &str) -> Result<IpAddr, ResolutionError> {
        let addrs: Vec<IpAddr> = tokio::net::lookup_host((name, 0))
            .await
            .map_err(|source| ResolutionError::Lookup {
                name: name.to_string(),
                source,
            })?
            .map(|addr| addr.ip())
            .collect();

        addrs
            .iter()
            .find(|ip| ip.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| ResolutionError::NotFound(name.to_string()))
    }
}

/// The reserved name that always resolves to loopback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminBinding {
    name: String,
    address: IpAddr,
}

impl AdminBinding {
    /// Bind `name` to `127.0.0.1`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: IpAddr::V4(Ipv4Addr::LOCALHOST),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> IpAddr {
        self.address
    }
}

impl Default for AdminBinding {
    fn default() -> Self {
        Self::new(DEFAULT_ADMIN_NAME)
    }
}

/// Layered resolver used by the gate.
#[derive(Clone)]
pub struct Resolver {
    admin: Option<AdminBinding>,
    overrides: OverrideTable,
    fallback: Arc<dyn NameResolver>,
}

impl Resolver {
    pub fn new(admin: Option<AdminBinding>, overrides: OverrideTable) -> Self {
        Self {
            admin,
            overrides,
            fallback: Arc::new(SystemResolver),
        }
    }

    /// Replace the system resolver used when neither the admin binding nor
    /// an override applies.
    pub fn with_fallback(mut self, fallback: Arc<dyn NameResolver>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn admin(&self) -> Option<&AdminBinding> {
        self.admin.as_ref()
    }

    /// The live override table shared with the registration surface.
    pub fn overrides(&self) -> &OverrideTable {
        &self.overrides
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("admin", &self.admin)
            .field("overrides", &self.overrides.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl NameResolver for Resolver {
    async fn resolve(&self, name: &str) -> Result<IpAddr, ResolutionError> {
        if let Some(admin) = &self.admin
            && admin.name() == name
        {
            return Ok(admin.address());
        }

        if let Some(address) = self.overrides.get(name) {
            return Ok(address);
        }

        self.fallback.resolve(name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fallback that counts calls and always answers with one address.
    #[derive(Default)]
    struct CountingResolver {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl NameResolver for CountingResolver {
        async fn resolve(&self, _name: &str) -> Result<IpAddr, ResolutionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 9)))
        }
    }

    fn resolver_with(fallback: Arc<CountingResolver>) -> Resolver {
        Resolver::new(Some(AdminBinding::new("i")), OverrideTable::new()).with_fallback(fallback)
    }

    #[tokio::test]
    async fn test_admin_wins_over_everything() {
        let fallback = Arc::new(CountingResolver::default());
        let resolver = resolver_with(fallback.clone());
        resolver
            .overrides()
            .insert("i", IpAddr::V4(Ipv4Addr::new(10, 9, 9, 9)));

        let ip = resolver.resolve("i").await.unwrap();
        assert_eq!(ip, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_override_skips_fallback() {
        let fallback = Arc::new(CountingResolver::default());
        let resolver = resolver_with(fallback.clone());
        resolver
            .overrides()
            .insert("db.lan", IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)));

        let ip = resolver.resolve("db.lan").await.unwrap();
        assert_eq!(ip, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)));
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_goes_to_fallback() {
        let fallback = Arc::new(CountingResolver::default());
        let resolver = resolver_with(fallback.clone());

        let ip = resolver.resolve("docs.rs").await.unwrap();
        assert_eq!(ip, IpAddr::V4(Ipv4Addr::new(203, 0, 113, 9)));
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_without_admin_binding() {
        let fallback = Arc::new(CountingResolver::default());
        let resolver = Resolver::new(None, OverrideTable::new()).with_fallback(fallback.clone());

        resolver.resolve("i").await.unwrap();
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_system_resolver_invalid_name() {
        let result = SystemResolver
            .resolve("this-host-does-not-exist-12345.invalid")
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_system_resolver_literal() {
        let ip = SystemResolver.resolve("127.0.0.1").await.unwrap();
        assert_eq!(ip, IpAddr::V4(Ipv4Addr::LOCALHOST));
    }
}
