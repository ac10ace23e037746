//! Staged service lifecycle.
//!
//! ```text
//! Created|Closed --begin_initialize--> Initializing --stage drop--> Initialized | Error
//! Initialized --close--> Closed
//! any --compromise--> Compromised (terminal)
//! ```

use keycypher_spec::{LifecycleError, LifecycleResult, ServiceState};
use parking_lot::Mutex;

#[derive(Debug)]
struct Inner {
    state: ServiceState,
    compromise: Option<String>,
}

/// Shared state machine embedded in every service.
#[derive(Debug)]
pub struct Lifecycle {
    service: &'static str,
    inner: Mutex<Inner>,
}

impl Lifecycle {
    pub fn new(service: &'static str) -> Self {
        Self {
            service,
            inner: Mutex::new(Inner {
                state: ServiceState::Created,
                compromise: None,
            }),
        }
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    pub fn state(&self) -> ServiceState {
        self.inner.lock().state
    }

    /// Reason recorded by the first compromise, if any.
    pub fn compromise_reason(&self) -> Option<String> {
        self.inner.lock().compromise.clone()
    }

    pub fn assert_ready(&self) -> LifecycleResult<()> {
        self.expect(ServiceState::Initialized)
    }

    pub fn assert_initializing(&self) -> LifecycleResult<()> {
        self.expect(ServiceState::Initializing)
    }

    /// Move into `Initializing`. Allowed from `Created` and `Closed`.
    pub(crate) fn begin(&self) -> LifecycleResult<()> {
        let mut inner = self.inner.lock();
        self.refuse_if_compromised(&inner)?;
        if !inner.state.can_initialize() {
            return Err(LifecycleError::StateMismatch {
                service: self.service,
                current: inner.state,
                expected: ServiceState::Created,
            });
        }
        inner.state = ServiceState::Initializing;
        tracing::info!(service = self.service, "initializing");
        Ok(())
    }

    /// Leave `Initializing` for `Initialized` or `Error`.
    pub(crate) fn finish(&self, configured: bool) -> ServiceState {
        let mut inner = self.inner.lock();
        if inner.state != ServiceState::Initializing {
            return inner.state;
        }
        if configured {
            inner.state = ServiceState::Initialized;
            tracing::info!(service = self.service, "initialized");
        } else {
            inner.state = ServiceState::Error;
            tracing::warn!(
                service = self.service,
                "initialization ended without required configuration"
            );
        }
        inner.state
    }

    /// Close from `Initialized`, running `release` first. Closing a closed
    /// service does nothing.
    pub(crate) fn close_with(&self, release: impl FnOnce()) -> LifecycleResult<()> {
        let mut inner = self.inner.lock();
        self.refuse_if_compromised(&inner)?;
        match inner.state {
            ServiceState::Closed => Ok(()),
            ServiceState::Initialized => {
                release();
                inner.state = ServiceState::Closed;
                tracing::info!(service = self.service, "closed");
                Ok(())
            }
            current => Err(LifecycleError::StateMismatch {
                service: self.service,
                current,
                expected: ServiceState::Initialized,
            }),
        }
    }

    /// Enter the terminal `Compromised` state and return the error every
    /// later call will see.
    pub fn compromise(&self, reason: impl Into<String>) -> LifecycleError {
        let mut inner = self.inner.lock();
        if inner.compromise.is_none() {
            let reason = reason.into();
            tracing::error!(
                service = self.service,
                previous = %inner.state,
                reason = %reason,
                "service compromised"
            );
            inner.compromise = Some(reason);
        }
        inner.state = ServiceState::Compromised;
        self.compromised_error(&inner)
    }

    fn expect(&self, expected: ServiceState) -> LifecycleResult<()> {
        let inner = self.inner.lock();
        self.refuse_if_compromised(&inner)?;
        if inner.state != expected {
            return Err(LifecycleError::StateMismatch {
                service: self.service,
                current: inner.state,
                expected,
            });
        }
        Ok(())
    }

    fn refuse_if_compromised(&self, inner: &Inner) -> LifecycleResult<()> {
        if inner.state == ServiceState::Compromised {
            return Err(self.compromised_error(inner));
        }
        Ok(())
    }

    fn compromised_error(&self, inner: &Inner) -> LifecycleError {
        LifecycleError::Compromised {
            service: self.service,
            reason: inner.compromise.clone().unwrap_or_default(),
        }
    }
}

/// Lifecycle contract shared by every service.
pub trait Service: Send + Sync {
    fn lifecycle(&self) -> &Lifecycle;

    /// Whether the minimum configuration is in place.
    fn is_configured(&self) -> bool;

    /// Drop configuration and scrub held key material. Called by `close`.
    fn release(&self);

    /// Enter `Initializing`. Configure the service while the returned stage
    /// is alive; dropping it completes initialization.
    fn begin_initialize(&self) -> LifecycleResult<Stage<'_>>
    where
        Self: Sized,
    {
        self.lifecycle().begin()?;
        Ok(Stage { service: self })
    }

    fn state(&self) -> ServiceState {
        self.lifecycle().state()
    }

    fn is_initialized(&self) -> bool {
        self.state() == ServiceState::Initialized
    }

    fn is_ready(&self) -> bool {
        self.is_initialized() && self.is_configured()
    }

    fn assert_ready(&self) -> LifecycleResult<()> {
        self.lifecycle().assert_ready()
    }

    fn assert_initializing(&self) -> LifecycleResult<()> {
        self.lifecycle().assert_initializing()
    }

    fn close(&self) -> LifecycleResult<()> {
        self.lifecycle().close_with(|| self.release())
    }

    fn compromise(&self, reason: &str) -> LifecycleError {
        let err = self.lifecycle().compromise(reason);
        self.release();
        err
    }
}

/// Scope of an initialization phase.
///
/// Dropping the stage moves the service to `Initialized` when it is
/// configured and to `Error` otherwise, including when the drop happens
/// during a panic.
#[must_use = "initialization completes when the stage is dropped"]
pub struct Stage<'a> {
    service: &'a dyn Service,
}

impl Stage<'_> {
    /// End the stage now and report whether the service became ready.
    pub fn complete(self) -> LifecycleResult<()> {
        let service = self.service;
        drop(self);
        service.assert_ready()
    }
}

impl Drop for Stage<'_> {
    fn drop(&mut self) {
        let configured = !std::thread::panicking() && self.service.is_configured();
        self.service.lifecycle().finish(configured);
    }
}
