//! Poll-driven dependency install queue.

use crate::events::{noop_sink, SharedEventSink};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Opaque handle to an asynchronous install request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestHandle(pub u64);

/// State of one install request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum InstallState {
    /// Still in flight.
    Pending,
    /// Installed.
    Completed,
    /// Finished unsuccessfully.
    Failed(String),
}

impl InstallState {
    /// Returns true once the request is no longer in flight.
    #[must_use]
    pub fn is_done(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// The host's non-blocking package API.
#[cfg_attr(test, mockall::automock)]
pub trait PackageClient: Send {
    /// Starts installing `package` and returns immediately.
    fn add(&mut self, package: &str) -> RequestHandle;

    /// Reports the current state of a request without blocking.
    fn poll(&mut self, handle: RequestHandle) -> InstallState;
}

/// One requested package and its last observed state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallRequest {
    /// Package identifier, e.g. `com.unity.xr.openxr@1.9.0`.
    pub package: String,
    /// Handle returned by the client.
    pub handle: RequestHandle,
    /// Last observed state.
    pub state: InstallState,
}

/// Queue lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueState {
    /// Not started.
    Idle,
    /// Waiting on the request for the package at this index.
    Requesting(usize),
    /// Every package has been requested and has finished.
    Drained,
}

/// What a call to [`InstallQueue::start`] or [`InstallQueue::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStep {
    /// The queue has not been started; nothing happened.
    Idle,
    /// The in-flight request is still pending.
    Waiting,
    /// A request was issued for the package at this index.
    Requested(usize),
    /// The queue just drained. Returned exactly once.
    Drained,
    /// The queue had already drained.
    Finished,
}

/// Outcome of a drained queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallReport {
    /// Packages in request order.
    pub requested: Vec<String>,
    /// Packages whose request failed, with the reason.
    pub failed: Vec<(String, String)>,
}

impl InstallReport {
    /// Packages that installed successfully.
    #[must_use]
    pub fn installed(&self) -> Vec<&str> {
        self.requested
            .iter()
            .filter(|p| !self.failed.iter().any(|(f, _)| f == *p))
            .map(String::as_str)
            .collect()
    }

    /// Returns true if any request failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Installs packages strictly one at a time.
///
/// The queue never holds more than one pending request: the next package is
/// only requested on the tick that observes the previous request finished.
/// A failed request is logged and the queue moves on; failures never stop
/// the queue and are only visible through the [`InstallReport`].
pub struct InstallQueue {
    packages: Vec<String>,
    state: QueueState,
    requests: Vec<InstallRequest>,
    events: SharedEventSink,
}

impl std::fmt::Debug for InstallQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallQueue")
            .field("packages", &self.packages)
            .field("state", &self.state)
            .field("requests", &self.requests)
            .finish_non_exhaustive()
    }
}

impl InstallQueue {
    /// Creates an idle queue for `packages`, installed in the given order.
    #[must_use]
    pub fn new(packages: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            packages: packages.into_iter().map(Into::into).collect(),
            state: QueueState::Idle,
            requests: Vec::new(),
            events: noop_sink(),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: SharedEventSink) -> Self {
        self.events = events;
        self
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> QueueState {
        self.state
    }

    /// Returns true once every request has finished.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.state == QueueState::Drained
    }

    /// All requests issued so far.
    #[must_use]
    pub fn requests(&self) -> &[InstallRequest] {
        &self.requests
    }

    /// The request currently in flight, if any.
    #[must_use]
    pub fn in_flight(&self) -> Option<&InstallRequest> {
        self.requests.iter().find(|r| r.state == InstallState::Pending)
    }

    /// Starts the queue, requesting the first package.
    ///
    /// An empty queue drains immediately. Starting a queue that is already
    /// running does nothing.
    pub fn start(&mut self, client: &mut dyn PackageClient) -> QueueStep {
        if self.state != QueueState::Idle {
            warn!(state = ?self.state, "Install queue already started");
            return QueueStep::Waiting;
        }
        info!(count = self.packages.len(), "Queuing packages for installation");
        if self.packages.is_empty() {
            return self.drain();
        }
        self.request(0, client)
    }

    /// Polls the in-flight request and advances when it has finished.
    pub fn tick(&mut self, client: &mut dyn PackageClient) -> QueueStep {
        let index = match self.state {
            QueueState::Idle => return QueueStep::Idle,
            QueueState::Drained => return QueueStep::Finished,
            QueueState::Requesting(index) => index,
        };

        let request = &mut self.requests[index];
        let state = client.poll(request.handle);
        if !state.is_done() {
            return QueueStep::Waiting;
        }
        request.state = state.clone();

        match state {
            InstallState::Failed(reason) => {
                warn!(package = %request.package, %reason, "Package installation failed, continuing");
                self.events.try_emit(
                    "install.failed",
                    Some(serde_json::json!({"package": request.package, "reason": reason})),
                );
            }
            _ => {
                info!(package = %request.package, "Package installed");
                self.events
                    .try_emit("install.completed", Some(serde_json::json!({"package": request.package})));
            }
        }

        let next = index + 1;
        if next < self.packages.len() {
            self.request(next, client)
        } else {
            self.drain()
        }
    }

    /// Summary of the queue so far.
    #[must_use]
    pub fn report(&self) -> InstallReport {
        InstallReport {
            requested: self.requests.iter().map(|r| r.package.clone()).collect(),
            failed: self
                .requests
                .iter()
                .filter_map(|r| match &r.state {
                    InstallState::Failed(reason) => Some((r.package.clone(), reason.clone())),
                    _ => None,
                })
                .collect(),
        }
    }

    fn request(&mut self, index: usize, client: &mut dyn PackageClient) -> QueueStep {
        debug_assert!(self.in_flight().is_none());
        let package = self.packages[index].clone();
        info!(%package, index, "Requesting package installation");
        let handle = client.add(&package);
        self.events
            .try_emit("install.requested", Some(serde_json::json!({"package": package, "index": index})));
        self.requests.push(InstallRequest {
            package,
            handle,
            state: InstallState::Pending,
        });
        self.state = QueueState::Requesting(index);
        QueueStep::Requested(index)
    }

    fn drain(&mut self) -> QueueStep {
        self.state = QueueState::Drained;
        let report = self.report();
        debug!(requested = report.requested.len(), failed = report.failed.len(), "Install queue drained");
        self.events.try_emit(
            "install.drained",
            Some(serde_json::json!({
                "requested": report.requested.len(),
                "failed": report.failed.len(),
            })),
        );
        QueueStep::Drained
    }
}
