//! Service - long-lived process component with begin/end hooks

use std::any::Any;

use tracing::{debug, error, warn};

use super::ProcessEnv;
use crate::{Error, Result};

/// Process-wide component living as long as its [`Process`](super::Process).
///
/// `begin_seq` runs in registration order before any stage, `end_seq` in
/// reverse order after the last one.
pub trait Service: Any {
    /// Hook run before the stage sequence.
    ///
    /// # Errors
    ///
    /// Implementations report setup failures; the process still tears down.
    fn begin_seq(&mut self, _env: &ProcessEnv) -> Result<()> {
        Ok(())
    }

    /// Hook run after the stage sequence, even when a stage failed.
    ///
    /// # Errors
    ///
    /// Implementations report teardown failures.
    fn end_seq(&mut self) -> Result<()> {
        Ok(())
    }

    /// Upcast for typed lookup.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for typed lookup.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Ordered registry of named services.
#[derive(Default)]
pub struct ServiceRegistry {
    services: Vec<(String, Box<dyn Service>)>,
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl ServiceRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service. An existing service with the same name is
    /// replaced in place, keeping its teardown position.
    pub fn add(&mut self, name: impl Into<String>, service: Box<dyn Service>) {
        let name = name.into();
        match self.services.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => {
                warn!(service = %name, "overwriting service");
                slot.1 = service;
            }
            None => self.services.push((name, service)),
        }
    }

    /// Names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.services.iter().map(|(n, _)| n.as_str())
    }

    /// Number of registered services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// True when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Typed lookup.
    #[must_use]
    pub fn get<T: Service>(&self, name: &str) -> Option<&T> {
        self.services
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, s)| s.as_any().downcast_ref::<T>())
    }

    /// Typed mutable lookup.
    pub fn get_mut<T: Service>(&mut self, name: &str) -> Option<&mut T> {
        self.services
            .iter_mut()
            .find(|(n, _)| n == name)
            .and_then(|(_, s)| s.as_any_mut().downcast_mut::<T>())
    }

    /// Typed lookup that fails loudly.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingService`] if absent or of another type.
    pub fn require<T: Service>(&self, name: &str) -> Result<&T> {
        self.get(name).ok_or_else(|| {
            error!(service = name, "no service labelled with this name");
            Error::MissingService(name.to_string())
        })
    }

    /// Typed mutable lookup that fails loudly.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingService`] if absent or of another type.
    pub fn require_mut<T: Service>(&mut self, name: &str) -> Result<&mut T> {
        self.get_mut(name).ok_or_else(|| {
            error!(service = name, "no service labelled with this name");
            Error::MissingService(name.to_string())
        })
    }

    /// Run every `begin_seq` in registration order, stopping at the first failure.
    pub(crate) fn begin_all(&mut self, env: &ProcessEnv) -> Result<()> {
        for (name, service) in &mut self.services {
            debug!(service = %name, "entering beginSeq");
            service.begin_seq(env)?;
        }
        Ok(())
    }

    /// Pop and tear down every service, last registered first.
    ///
    /// All services are torn down even if one fails; the first error is returned.
    pub(crate) fn end_all(&mut self) -> Result<()> {
        let mut first_err = None;
        while let Some((name, mut service)) = self.services.pop() {
            debug!(service = %name, "entering endSeq");
            if let Err(e) = service.end_seq() {
                error!(service = %name, error = %e, "service teardown failed");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
