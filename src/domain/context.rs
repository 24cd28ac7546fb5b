//! Operation Context
//!
//! Contains metadata about the current operation for tracing, plus the
//! caller's cancellation signal.

use std::net::IpAddr;
use tokio::sync::watch;
use uuid::Uuid;

/// Context for an operation, used for tracing and cancellation.
#[derive(Debug, Clone)]
pub struct OperationContext {
    /// Authenticated user id supplied by the identity gateway
    pub request_user_id: Option<Uuid>,

    /// Correlation ID for request tracing
    pub correlation_id: Option<Uuid>,

    /// Client IP address
    pub client_ip: Option<IpAddr>,

    cancelled: Option<watch::Receiver<bool>>,
}

impl OperationContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self {
            request_user_id: None,
            correlation_id: None,
            client_ip: None,
            cancelled: None,
        }
    }

    /// Create context with request user ID
    pub fn with_request_user(mut self, user_id: Uuid) -> Self {
        self.request_user_id = Some(user_id);
        self
    }

    /// Create context with correlation ID
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Create context with client IP
    pub fn with_client_ip(mut self, ip: IpAddr) -> Self {
        self.client_ip = Some(ip);
        self
    }

    /// Attach a cancellation signal; the returned handle cancels this context.
    pub fn cancellable(mut self) -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        self.cancelled = Some(rx);
        (self, CancelHandle { tx })
    }

    /// Whether the caller has given up on this operation
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Generate a new correlation ID if not present
    pub fn ensure_correlation_id(&mut self) -> Uuid {
        *self.correlation_id.get_or_insert_with(Uuid::new_v4)
    }
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Caller-side half of a context's cancellation signal.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Cancel the context when the returned guard is dropped, unless
    /// [`CancelOnDrop::disarm`] was called first.
    pub fn cancel_on_drop(self) -> CancelOnDrop {
        CancelOnDrop {
            handle: Some(self),
        }
    }
}

/// Cancels its context on drop. Used by the HTTP layer so a request future
/// dropped by a disconnecting client marks its context cancelled.
#[derive(Debug)]
pub struct CancelOnDrop {
    handle: Option<CancelHandle>,
}

impl CancelOnDrop {
    pub fn disarm(mut self) {
        self.handle = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.cancel();
        }
    }
}
