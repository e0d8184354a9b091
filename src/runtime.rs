//! Process-level state shared by every context: engine configuration and the
//! replaceable fallback handlers.

use crate::config::{EhmConfig, EngineConfig};
use crate::context::Context;
use crate::error::EhmError;
use crate::fallback::{FallbackHandler, FallbackOverrides, Fallbacks, Uncaught};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

struct RuntimeInner {
    config: EngineConfig,
    fallbacks: RwLock<Fallbacks>,
}

/// Creates contexts and holds the fallbacks they escalate to.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                config,
                fallbacks: RwLock::new(Fallbacks::default()),
            }),
        }
    }

    /// Build a runtime from a loaded configuration, validating it first.
    pub fn from_config(config: &EhmConfig) -> Result<Self, EhmError> {
        config.validate().map_err(|errors| {
            let msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            EhmError::Config(msgs.join("\n"))
        })?;
        Ok(Self::new(config.engine.clone()))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// A context using the runtime's fallbacks.
    pub fn context(&self, name: &str) -> Context {
        self.builder(name).build()
    }

    pub fn builder(&self, name: &str) -> ContextBuilder {
        ContextBuilder {
            runtime: self.clone(),
            name: name.to_string(),
            overrides: FallbackOverrides::default(),
        }
    }

    /// Replace the handler for thrown events nothing catches.
    pub fn set_terminate_handler<F>(&self, handler: F)
    where
        F: Fn(&Uncaught) + Send + Sync + 'static,
    {
        self.inner.fallbacks.write().terminate = Arc::new(handler) as FallbackHandler;
        debug!("Terminate handler replaced");
    }

    /// Replace the handler for resumed events nothing handles.
    pub fn set_unexpected_handler<F>(&self, handler: F)
    where
        F: Fn(&Uncaught) + Send + Sync + 'static,
    {
        self.inner.fallbacks.write().unexpected = Arc::new(handler) as FallbackHandler;
        debug!("Unexpected handler replaced");
    }

    pub fn fallbacks(&self) -> Fallbacks {
        self.inner.fallbacks.read().clone()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/// Context bootstrap with optional per-context fallbacks.
pub struct ContextBuilder {
    runtime: Runtime,
    name: String,
    overrides: FallbackOverrides,
}

impl ContextBuilder {
    pub fn terminate_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Uncaught) + Send + Sync + 'static,
    {
        self.overrides.terminate = Some(Arc::new(handler) as FallbackHandler);
        self
    }

    pub fn unexpected_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Uncaught) + Send + Sync + 'static,
    {
        self.overrides.unexpected = Some(Arc::new(handler) as FallbackHandler);
        self
    }

    pub fn build(self) -> Context {
        let ctx = Context::new(self.runtime, &self.name, self.overrides);
        debug!(ctx = %ctx.name(), id = %ctx.id(), "Context created");
        ctx
    }
}
