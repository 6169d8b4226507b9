//! Image trust gate: provenance check plus vulnerability scan, with the
//! verdict cached per image for the process lifetime.
//!
//! Inconclusive checks fail closed: an image whose provenance cannot be
//! confirmed or whose scan cannot be completed is treated as untrusted and
//! no container is ever created from it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use bollard::Docker;
use bollard::query_parameters::CreateImageOptions;
use chrono::{DateTime, Utc};
use crucible_core::ExecError;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Label every trusted base image must carry.
const PROVENANCE_LABEL: &str = "org.opencontainers.image.created";

/// CVEs that unconditionally disqualify an image.
const CRITICAL_CVES: &[&str] = &[
    "CVE-2021-44228",
    "CVE-2021-45046",
    "CVE-2022-22963",
    "CVE-2022-22965",
];

/// Image registry/inspection seam.
#[async_trait]
pub trait ImageInspector: Send + Sync {
    /// Return the image's labels, pulling the image first if it is not
    /// present locally.
    async fn labels(&self, image: &str) -> Result<HashMap<String, String>>;
}

/// External vulnerability-scan seam. Any error is treated as an
/// inconclusive scan and the image fails closed.
#[async_trait]
pub trait VulnerabilityScanner: Send + Sync {
    /// Produce a textual scan report for the image.
    async fn scan(&self, image: &str) -> Result<String>;
}

/// Production inspector backed by the Docker image API.
#[derive(Clone)]
pub struct DockerInspector {
    docker: Docker,
}

impl std::fmt::Debug for DockerInspector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerInspector").finish_non_exhaustive()
    }
}

impl DockerInspector {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    async fn pull(&self, image: &str) -> Result<()> {
        let (name, tag) = parse_image_ref(image);
        info!(image, "pulling image");

        let options = CreateImageOptions {
            from_image: Some(name.to_owned()),
            tag: (!tag.is_empty()).then(|| tag.to_owned()),
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(item) = stream.next().await {
            item.context("image pull failed")?;
        }
        Ok(())
    }
}

#[async_trait]
impl ImageInspector for DockerInspector {
    async fn labels(&self, image: &str) -> Result<HashMap<String, String>> {
        if self.docker.inspect_image(image).await.is_err() {
            self.pull(image).await?;
        }

        let inspect = self
            .docker
            .inspect_image(image)
            .await
            .context("image inspect failed")?;

        Ok(inspect
            .config
            .and_then(|c| c.labels)
            .unwrap_or_default())
    }
}

/// Scanner backed by the trivy CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrivyScanner;

#[async_trait]
impl VulnerabilityScanner for TrivyScanner {
    async fn scan(&self, image: &str) -> Result<String> {
        let output = tokio::process::Command::new("trivy")
            .args(["image", "--light", image])
            .output()
            .await
            .context("failed to run trivy")?;

        if !output.status.success() {
            anyhow::bail!("trivy exited with {}", output.status.code().unwrap_or(-1));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Trust decision for one image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustStatus {
    Trusted,
    Untrusted(String),
    Vulnerable(String),
}

/// Cached verdict: the decision and when the check ran.
#[derive(Debug, Clone)]
pub struct TrustVerdict {
    pub status: TrustStatus,
    pub scanned_at: DateTime<Utc>,
}

/// Gate every image passes through before a container is created from it.
pub struct VulnerabilityGate {
    inspector: Arc<dyn ImageInspector>,
    scanner: Arc<dyn VulnerabilityScanner>,
    verdicts: Mutex<HashMap<String, Arc<OnceCell<TrustVerdict>>>>,
}

impl std::fmt::Debug for VulnerabilityGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulnerabilityGate").finish_non_exhaustive()
    }
}

impl VulnerabilityGate {
    pub fn new(inspector: Arc<dyn ImageInspector>, scanner: Arc<dyn VulnerabilityScanner>) -> Self {
        Self {
            inspector,
            scanner,
            verdicts: Mutex::new(HashMap::new()),
        }
    }

    /// Verify an image is safe to run.
    ///
    /// The first call per image performs the provenance check and scan;
    /// concurrent first calls for the same image share one check, and
    /// every later call reuses the cached verdict without rescanning.
    pub async fn ensure_trusted(&self, image: &str) -> Result<(), ExecError> {
        let cell = {
            let mut map = match self.verdicts.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            Arc::clone(map.entry(image.to_owned()).or_default())
        };

        let verdict = cell.get_or_init(|| self.check(image)).await;

        match &verdict.status {
            TrustStatus::Trusted => Ok(()),
            TrustStatus::Untrusted(reason) => Err(ExecError::UntrustedImage {
                image: image.to_owned(),
                reason: reason.clone(),
            }),
            TrustStatus::Vulnerable(cve) => Err(ExecError::VulnerableImage {
                image: image.to_owned(),
                cve: cve.clone(),
            }),
        }
    }

    /// Drop a cached verdict so the next use of the image rescans.
    pub fn invalidate(&self, image: &str) {
        let mut map = match self.verdicts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if map.remove(image).is_some() {
            debug!(image, "trust verdict invalidated");
        }
    }

    async fn check(&self, image: &str) -> TrustVerdict {
        let status = self.check_inner(image).await;
        match &status {
            TrustStatus::Trusted => info!(image, "image trusted"),
            TrustStatus::Untrusted(reason) => warn!(image, reason, "image untrusted"),
            TrustStatus::Vulnerable(cve) => warn!(image, cve, "image vulnerable"),
        }
        TrustVerdict {
            status,
            scanned_at: Utc::now(),
        }
    }

    async fn check_inner(&self, image: &str) -> TrustStatus {
        let labels = match self.inspector.labels(image).await {
            Ok(labels) => labels,
            Err(e) => return TrustStatus::Untrusted(format!("inspect failed: {e}")),
        };

        if !labels.contains_key(PROVENANCE_LABEL) {
            return TrustStatus::Untrusted(format!(
                "missing provenance label {PROVENANCE_LABEL}"
            ));
        }

        let report = match self.scanner.scan(image).await {
            Ok(report) => report,
            Err(e) => return TrustStatus::Untrusted(format!("vulnerability scan failed: {e}")),
        };

        match critical_cve_in(&report) {
            Some(cve) => TrustStatus::Vulnerable(cve.to_owned()),
            None => TrustStatus::Trusted,
        }
    }
}

/// First known-critical CVE mentioned in a scan report, if any.
fn critical_cve_in(report: &str) -> Option<&'static str> {
    CRITICAL_CVES.iter().find(|cve| report.contains(**cve)).copied()
}

/// Split an image reference into name and tag. Digest references are
/// passed through whole; a missing tag means `latest`.
fn parse_image_ref(image: &str) -> (&str, &str) {
    if image.contains('@') {
        return (image, "");
    }
    if let Some((name, tag)) = image.rsplit_once(':')
        && !tag.contains('/')
    {
        return (name, tag);
    }
    (image, "latest")
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakeInspector {
        labels: HashMap<String, String>,
        calls: AtomicUsize,
    }

    impl FakeInspector {
        fn stamped() -> Self {
            let mut labels = HashMap::new();
            labels.insert(PROVENANCE_LABEL.to_owned(), "2024-01-01".to_owned());
            Self {
                labels,
                calls: AtomicUsize::new(0),
            }
        }

        fn unstamped() -> Self {
            Self {
                labels: HashMap::new(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ImageInspector for FakeInspector {
        async fn labels(&self, _image: &str) -> Result<HashMap<String, String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.labels.clone())
        }
    }

    struct FakeScanner {
        report: String,
        fail: bool,
        calls: AtomicUsize,
    }

    impl FakeScanner {
        fn clean() -> Self {
            Self {
                report: "no critical findings".to_owned(),
                fail: false,
                calls: AtomicUsize::new(0),
            }
        }

        fn with_report(report: &str) -> Self {
            Self {
                report: report.to_owned(),
                fail: false,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                report: String::new(),
                fail: true,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl VulnerabilityScanner for FakeScanner {
        async fn scan(&self, _image: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // Yield so concurrent first-checks actually overlap.
            tokio::time::sleep(Duration::from_millis(5)).await;
            if self.fail {
                anyhow::bail!("scanner unavailable");
            }
            Ok(self.report.clone())
        }
    }

    fn gate(
        inspector: FakeInspector,
        scanner: FakeScanner,
    ) -> (VulnerabilityGate, Arc<FakeScanner>) {
        let scanner = Arc::new(scanner);
        let dyn_scanner: Arc<dyn VulnerabilityScanner> = scanner.clone();
        let gate = VulnerabilityGate::new(Arc::new(inspector), dyn_scanner);
        (gate, scanner)
    }

    #[tokio::test]
    async fn stamped_clean_image_is_trusted() {
        let (gate, _) = gate(FakeInspector::stamped(), FakeScanner::clean());
        assert!(gate.ensure_trusted("python:3.11-slim").await.is_ok());
    }

    #[tokio::test]
    async fn missing_provenance_label_is_untrusted() {
        let (gate, scanner) = gate(FakeInspector::unstamped(), FakeScanner::clean());
        let err = gate.ensure_trusted("python:3.11-slim").await.unwrap_err();
        assert!(matches!(err, ExecError::UntrustedImage { .. }));
        // The scan never runs for an image that fails provenance.
        assert_eq!(scanner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn critical_cve_is_vulnerable() {
        let (gate, _) = gate(
            FakeInspector::stamped(),
            FakeScanner::with_report("found CVE-2021-44228 (log4shell)"),
        );
        let err = gate.ensure_trusted("bad:latest").await.unwrap_err();
        match err {
            ExecError::VulnerableImage { cve, .. } => assert_eq!(cve, "CVE-2021-44228"),
            other => panic!("expected VulnerableImage, got {other}"),
        }
    }

    #[tokio::test]
    async fn scanner_failure_fails_closed() {
        let (gate, _) = gate(FakeInspector::stamped(), FakeScanner::failing());
        let err = gate.ensure_trusted("python:3.11-slim").await.unwrap_err();
        match err {
            ExecError::UntrustedImage { reason, .. } => {
                assert!(reason.contains("scan failed"));
            }
            other => panic!("expected UntrustedImage, got {other}"),
        }
    }

    #[tokio::test]
    async fn verdict_is_cached_after_first_check() {
        let (gate, scanner) = gate(FakeInspector::stamped(), FakeScanner::clean());
        gate.ensure_trusted("python:3.11-slim").await.unwrap();
        gate.ensure_trusted("python:3.11-slim").await.unwrap();
        gate.ensure_trusted("python:3.11-slim").await.unwrap();
        assert_eq!(scanner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn negative_verdicts_are_cached_too() {
        let (gate, scanner) = gate(FakeInspector::stamped(), FakeScanner::failing());
        assert!(gate.ensure_trusted("python:3.11-slim").await.is_err());
        assert!(gate.ensure_trusted("python:3.11-slim").await.is_err());
        assert_eq!(scanner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_first_checks_share_one_scan() {
        let (gate, scanner) = gate(FakeInspector::stamped(), FakeScanner::clean());
        let (a, b, c) = tokio::join!(
            gate.ensure_trusted("python:3.11-slim"),
            gate.ensure_trusted("python:3.11-slim"),
            gate.ensure_trusted("python:3.11-slim")
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(scanner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_images_scan_independently() {
        let (gate, scanner) = gate(FakeInspector::stamped(), FakeScanner::clean());
        let (a, b) = tokio::join!(
            gate.ensure_trusted("python:3.11-slim"),
            gate.ensure_trusted("node:20-slim")
        );
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(scanner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_rescan() {
        let (gate, scanner) = gate(FakeInspector::stamped(), FakeScanner::clean());
        gate.ensure_trusted("python:3.11-slim").await.unwrap();
        gate.invalidate("python:3.11-slim");
        gate.ensure_trusted("python:3.11-slim").await.unwrap();
        assert_eq!(scanner.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn image_refs_split_into_name_and_tag() {
        assert_eq!(parse_image_ref("python:3.11-slim"), ("python", "3.11-slim"));
        assert_eq!(parse_image_ref("python"), ("python", "latest"));
        assert_eq!(
            parse_image_ref("localhost:5000/python"),
            ("localhost:5000/python", "latest")
        );
        let digest = "python@sha256:abcdef";
        assert_eq!(parse_image_ref(digest), (digest, ""));
    }
}
