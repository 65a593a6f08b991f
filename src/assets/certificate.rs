//! Certificate manager.
//!
//! Keeps a non-expired certificate triple on disk for each control plane.
//! A cached certificate is re-checked on every call and only re-fetched once
//! it is absent or past its `NotAfter`.

use std::path::{Path, PathBuf};
use tracing::{debug, info};
use x509_parser::pem::parse_x509_pem;

use crate::cloud::{ControlPlane, TlsBundle};
use crate::config::{CA_FILE, CERT_FILE, CONFIG_FILE_MODE, HomeLayout, KEY_FILE, set_mode};
use crate::error::{CertificateError, Result};

/// Mode of the per-control-plane certificate directory.
pub(crate) const DIR_MODE: u32 = 0o755;

/// Ensures certificate triples exist under the home layout.
#[derive(Debug, Clone)]
pub struct CertificateManager {
    /// Home directory layout.
    layout: HomeLayout,
}

/// Outcome of checking the cached certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CachedCertificate {
    /// No certificate on disk.
    Missing,
    /// Certificate present with `NotAfter` in the future.
    Valid,
    /// Certificate present but expired.
    Expired,
}

impl CertificateManager {
    /// Creates a manager for the given layout.
    #[must_use]
    pub const fn new(layout: HomeLayout) -> Self {
        Self { layout }
    }

    /// Ensures a valid certificate triple exists for `control_plane_id` and
    /// returns the directory holding it.
    ///
    /// # Errors
    ///
    /// Returns an error if a cached certificate cannot be parsed, the bundle
    /// cannot be fetched or the files cannot be written.
    pub async fn ensure(
        &self,
        client: &dyn ControlPlane,
        control_plane_id: &str,
    ) -> Result<PathBuf> {
        let dir = self.layout.tls_dir(control_plane_id);
        let cert_path = dir.join(CERT_FILE);

        match check_cached(&cert_path)? {
            CachedCertificate::Valid => {
                debug!("Certificate for {control_plane_id} is still valid");
                return Ok(dir);
            }
            CachedCertificate::Expired => info!("Certificate for {control_plane_id} expired, refreshing"),
            CachedCertificate::Missing => info!("Fetching certificate for {control_plane_id}"),
        }

        let bundle = client
            .tls_bundle(control_plane_id)
            .await
            .map_err(CertificateError::Fetch)?;

        persist(&dir, &bundle)?;
        Ok(dir)
    }
}

fn check_cached(cert_path: &Path) -> Result<CachedCertificate> {
    if !cert_path.exists() {
        return Ok(CachedCertificate::Missing);
    }

    let unreadable = |message: String| CertificateError::Unreadable {
        path: cert_path.to_path_buf(),
        message,
    };

    let content = std::fs::read(cert_path).map_err(|e| unreadable(e.to_string()))?;
    let (_, pem) = parse_x509_pem(&content).map_err(|e| unreadable(format!("invalid PEM: {e}")))?;
    let cert = pem
        .parse_x509()
        .map_err(|e| unreadable(format!("invalid certificate: {e}")))?;

    let not_after = cert.validity().not_after.timestamp();
    if not_after > chrono::Utc::now().timestamp() {
        Ok(CachedCertificate::Valid)
    } else {
        Ok(CachedCertificate::Expired)
    }
}

fn persist(dir: &Path, bundle: &TlsBundle) -> std::result::Result<(), CertificateError> {
    std::fs::create_dir_all(dir).map_err(persist_err(dir))?;
    set_mode(dir, DIR_MODE).map_err(persist_err(dir))?;

    for (name, content) in [
        (CERT_FILE, &bundle.certificate),
        (KEY_FILE, &bundle.private_key),
        (CA_FILE, &bundle.ca_certificate),
    ] {
        let path = dir.join(name);
        std::fs::write(&path, content).map_err(persist_err(&path))?;
        set_mode(&path, CONFIG_FILE_MODE).map_err(persist_err(&path))?;
    }

    debug!("Wrote certificate triple to {}", dir.display());
    Ok(())
}

fn persist_err(path: &Path) -> impl FnOnce(std::io::Error) -> CertificateError {
    let path = path.to_path_buf();
    move |source| CertificateError::Persist { path, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::MockControlPlane;
    use rcgen::{CertificateParams, KeyPair};
    use tempfile::TempDir;

    fn self_signed(year: i32) -> String {
        let mut params =
            CertificateParams::new(vec![String::from("gateway.local")]).expect("params");
        params.not_before = rcgen::date_time_ymd(2000, 1, 1);
        params.not_after = rcgen::date_time_ymd(year, 1, 1);
        let key = KeyPair::generate().expect("key");
        params.self_signed(&key).expect("cert").pem()
    }

    fn bundle(certificate: String) -> TlsBundle {
        TlsBundle {
            certificate,
            private_key: String::from("KEY"),
            ca_certificate: String::from("CA"),
        }
    }

    fn write_cached(layout: &HomeLayout, pem: &str) {
        let dir = layout.tls_dir("cp-1");
        std::fs::create_dir_all(&dir).expect("mkdir");
        std::fs::write(dir.join(CERT_FILE), pem).expect("write");
        std::fs::write(dir.join(KEY_FILE), "OLD KEY").expect("write");
        std::fs::write(dir.join(CA_FILE), "OLD CA").expect("write");
    }

    #[tokio::test]
    async fn test_fetches_when_missing() {
        let home = TempDir::new().expect("tempdir");
        let layout = HomeLayout::new(home.path());
        let fresh = self_signed(2099);

        let mut client = MockControlPlane::new();
        let returned = fresh.clone();
        client
            .expect_tls_bundle()
            .times(1)
            .returning(move |_| Ok(bundle(returned.clone())));

        let manager = CertificateManager::new(layout.clone());
        let dir = manager.ensure(&client, "cp-1").await.expect("ensure");

        assert_eq!(dir, layout.tls_dir("cp-1"));
        assert_eq!(std::fs::read_to_string(dir.join(CERT_FILE)).expect("read"), fresh);
        assert_eq!(std::fs::read_to_string(dir.join(CA_FILE)).expect("read"), "CA");
    }

    #[tokio::test]
    async fn test_valid_certificate_is_not_refetched() {
        let home = TempDir::new().expect("tempdir");
        let layout = HomeLayout::new(home.path());
        write_cached(&layout, &self_signed(2099));

        let mut client = MockControlPlane::new();
        client.expect_tls_bundle().times(0);

        let manager = CertificateManager::new(layout);
        manager.ensure(&client, "cp-1").await.expect("first");
        manager.ensure(&client, "cp-1").await.expect("second");
    }

    #[tokio::test]
    async fn test_expired_certificate_is_refetched_once() {
        let home = TempDir::new().expect("tempdir");
        let layout = HomeLayout::new(home.path());
        write_cached(&layout, &self_signed(2001));
        let fresh = self_signed(2099);

        let mut client = MockControlPlane::new();
        let returned = fresh.clone();
        client
            .expect_tls_bundle()
            .times(1)
            .returning(move |_| Ok(bundle(returned.clone())));

        let manager = CertificateManager::new(layout.clone());
        let dir = manager.ensure(&client, "cp-1").await.expect("ensure");

        assert_eq!(std::fs::read_to_string(dir.join(CERT_FILE)).expect("read"), fresh);
        assert_eq!(std::fs::read_to_string(dir.join(KEY_FILE)).expect("read"), "KEY");
        assert_eq!(std::fs::read_to_string(dir.join(CA_FILE)).expect("read"), "CA");
    }

    #[tokio::test]
    async fn test_corrupt_certificate_is_reported() {
        let home = TempDir::new().expect("tempdir");
        let layout = HomeLayout::new(home.path());
        write_cached(&layout, "not a certificate");

        let mut client = MockControlPlane::new();
        client.expect_tls_bundle().times(0);

        let manager = CertificateManager::new(layout);
        let err = manager.ensure(&client, "cp-1").await.expect_err("corrupt");

        assert!(err.to_string().contains("check certificate availability"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_written_files_are_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let home = TempDir::new().expect("tempdir");
        let layout = HomeLayout::new(home.path());

        let mut client = MockControlPlane::new();
        client
            .expect_tls_bundle()
            .returning(|_| Ok(bundle(String::from("CERT"))));

        let manager = CertificateManager::new(layout);
        let dir = manager.ensure(&client, "cp-1").await.expect("ensure");

        let dir_mode = std::fs::metadata(&dir).expect("meta").permissions().mode();
        let key_mode = std::fs::metadata(dir.join(KEY_FILE)).expect("meta").permissions().mode();
        assert_eq!(dir_mode & 0o777, 0o755);
        assert_eq!(key_mode & 0o777, 0o644);
    }
}
