//! Session factory: owns the connection provider and the shared metadata
//! registry, and opens sessions.

use crate::{Session, SessionConfig};
use rowmap_core::{ConnectionProvider, Entity, EntityMetadata, MetadataRegistry, Result};
use std::sync::Arc;

/// Opens [`Session`]s over connections from a [`ConnectionProvider`].
///
/// Entity metadata is derived at most once per type for the factory's
/// lifetime and shared by every session it opens.
pub struct SessionFactory<P: ConnectionProvider> {
    provider: P,
    registry: Arc<MetadataRegistry>,
    config: SessionConfig,
}

impl<P: ConnectionProvider> SessionFactory<P> {
    pub fn new(provider: P) -> Self {
        Self::with_config(provider, SessionConfig::default())
    }

    pub fn with_config(provider: P, config: SessionConfig) -> Self {
        Self {
            provider,
            registry: Arc::new(MetadataRegistry::new()),
            config,
        }
    }

    /// Acquire a connection, begin a transaction and wrap both in a session.
    #[tracing::instrument(level = "debug", skip(self))]
    #[allow(clippy::result_large_err)]
    pub fn open_session(&self) -> Result<Session<P::Connection>> {
        let connection = self.provider.connect()?;
        Session::begin(connection, Arc::clone(&self.registry), self.config.clone())
    }

    /// Metadata for `E`, derived on first request.
    #[allow(clippy::result_large_err)]
    pub fn metadata<E: Entity>(&self) -> Result<Arc<EntityMetadata<E>>> {
        self.registry.get::<E>()
    }

    pub fn registry(&self) -> &Arc<MetadataRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

impl<P: ConnectionProvider + std::fmt::Debug> std::fmt::Debug for SessionFactory<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionFactory")
            .field("provider", &self.provider)
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}
