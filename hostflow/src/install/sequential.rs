//! Async rendition of the install queue for hosts that expose futures.

use super::queue::{InstallReport, InstallState, PackageClient};
use crate::events::SharedEventSink;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::time::Duration;
use tracing::{info, warn};

/// Installs one package and resolves when it has finished.
#[async_trait]
pub trait PackageInstaller: Send + Sync {
    /// Installs `package`.
    ///
    /// # Errors
    ///
    /// Returns the failure reason reported by the host.
    async fn install(&self, package: &str) -> Result<(), String>;
}

/// Adapts a polling [`PackageClient`] into a [`PackageInstaller`] by polling
/// on a fixed period.
pub struct PollingInstaller<C> {
    client: Mutex<C>,
    period: Duration,
}

impl<C: PackageClient> PollingInstaller<C> {
    /// Wraps `client`, polling every `period`.
    #[must_use]
    pub fn new(client: C, period: Duration) -> Self {
        Self {
            client: Mutex::new(client),
            period,
        }
    }

    /// Returns the wrapped client.
    #[must_use]
    pub fn into_inner(self) -> C {
        self.client.into_inner()
    }
}

#[async_trait]
impl<C: PackageClient> PackageInstaller for PollingInstaller<C> {
    async fn install(&self, package: &str) -> Result<(), String> {
        let handle = self.client.lock().add(package);
        loop {
            let state = self.client.lock().poll(handle);
            match state {
                InstallState::Pending => tokio::time::sleep(self.period).await,
                InstallState::Completed => return Ok(()),
                InstallState::Failed(reason) => return Err(reason),
            }
        }
    }
}

/// Installs `packages` one after another, awaiting each before starting the
/// next. Failures are logged and reported, never fatal.
pub async fn install_sequentially(
    installer: &dyn PackageInstaller,
    packages: &[String],
    events: &SharedEventSink,
) -> InstallReport {
    let outcomes: Vec<(String, Result<(), String>)> = stream::iter(packages.iter().cloned())
        .then(|package| async move {
            info!(%package, "Installing package");
            events
                .emit("install.requested", Some(serde_json::json!({"package": package})))
                .await;
            let outcome = installer.install(&package).await;
            (package, outcome)
        })
        .collect()
        .await;

    let mut report = InstallReport::default();
    for (package, outcome) in outcomes {
        if let Err(reason) = outcome {
            warn!(%package, %reason, "Package installation failed, continuing");
            events
                .emit("install.failed", Some(serde_json::json!({"package": package, "reason": reason})))
                .await;
            report.failed.push((package.clone(), reason));
        } else {
            events
                .emit("install.completed", Some(serde_json::json!({"package": package})))
                .await;
        }
        report.requested.push(package);
    }
    events
        .emit(
            "install.drained",
            Some(serde_json::json!({"requested": report.requested.len(), "failed": report.failed.len()})),
        )
        .await;
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{noop_sink, CollectingEventSink};
    use crate::testing::ScriptedPackageClient;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct OverlapDetector {
        active: AtomicUsize,
        max_active: AtomicUsize,
        order: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PackageInstaller for OverlapDetector {
        async fn install(&self, package: &str) -> Result<(), String> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.order.lock().push(package.to_string());
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_installs_never_overlap() {
        let installer = OverlapDetector {
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            order: Mutex::new(Vec::new()),
        };
        let packages: Vec<String> = ["x", "y", "z"].iter().map(ToString::to_string).collect();

        let report = install_sequentially(&installer, &packages, &noop_sink()).await;

        assert_eq!(installer.max_active.load(Ordering::SeqCst), 1);
        assert_eq!(*installer.order.lock(), packages);
        assert_eq!(report.requested, packages);
        assert!(!report.has_failures());
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_installer_reports_failures() {
        let client = ScriptedPackageClient::new().with_polls_until_done(3).failing("b");
        let installer = PollingInstaller::new(client, Duration::from_millis(100));
        let sink = Arc::new(CollectingEventSink::new());
        let events: SharedEventSink = sink.clone();
        let packages = vec!["a".to_string(), "b".to_string()];

        let report = install_sequentially(&installer, &packages, &events).await;

        assert_eq!(report.installed(), vec!["a"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(installer.into_inner().added(), vec!["a", "b"]);
        assert_eq!(sink.events_of_type("install.drained").len(), 1);
        assert_eq!(sink.events_of_type("install.requested").len(), 2);
    }

    #[test]
    fn test_empty_list_drains_immediately() {
        let installer = PollingInstaller::new(ScriptedPackageClient::new(), Duration::from_millis(10));

        let report = tokio_test::block_on(install_sequentially(&installer, &[], &noop_sink()));

        assert!(report.requested.is_empty());
        assert!(installer.into_inner().added().is_empty());
    }
}
