//! Cloud lua module fetcher.
//!
//! Downloads the gzip-compressed module archive and unpacks it under the home
//! directory, where it is later bind-mounted or copied into the target.

use flate2::read::GzDecoder;
use std::fs::File;
use std::io::Cursor;
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};
use tracing::{debug, info};

use crate::cloud::ControlPlane;
use crate::config::{CLOUD_MODULE_DIR_NAME, CONFIG_FILE_MODE, HomeLayout, set_mode};
use crate::error::{AssetError, Result};

use super::certificate::DIR_MODE;

/// Downloads and extracts the cloud lua module.
#[derive(Debug, Clone)]
pub struct AssetFetcher {
    /// Home directory layout.
    layout: HomeLayout,
}

impl AssetFetcher {
    /// Creates a fetcher for the given layout.
    #[must_use]
    pub const fn new(layout: HomeLayout) -> Self {
        Self { layout }
    }

    /// Ensures the module is extracted and returns the directory the
    /// archive's top-level directory lives in.
    ///
    /// An already extracted, non-empty module directory is reused as is.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive cannot be downloaded, is corrupt or
    /// cannot be written to disk.
    pub async fn fetch_and_extract(&self, client: &dyn ControlPlane) -> Result<PathBuf> {
        let root = self.layout.cloud_module_root().to_path_buf();
        let module_dir = self.layout.cloud_module_dir();

        if is_populated(&module_dir) {
            debug!("Cloud lua module already present at {}", module_dir.display());
            return Ok(root);
        }

        info!("Downloading cloud lua module");
        let bytes = client.script_archive().await.map_err(AssetError::Download)?;
        debug!("Downloaded {} bytes", bytes.len());

        if let Err(e) = extract(&bytes, &root) {
            // Never leave a partial module behind.
            let _ = std::fs::remove_dir_all(&module_dir);
            return Err(e.into());
        }

        if !module_dir.is_dir() {
            return Err(AssetError::Corrupt {
                message: format!("archive does not contain {CLOUD_MODULE_DIR_NAME}/"),
            }
            .into());
        }

        info!("Extracted cloud lua module to {}", module_dir.display());
        Ok(root)
    }
}

fn is_populated(dir: &Path) -> bool {
    std::fs::read_dir(dir).is_ok_and(|mut entries| entries.next().is_some())
}

fn corrupt(e: impl std::fmt::Display) -> AssetError {
    AssetError::Corrupt {
        message: e.to_string(),
    }
}

fn extract_err(path: &Path) -> impl FnOnce(std::io::Error) -> AssetError {
    let path = path.to_path_buf();
    move |source| AssetError::Extract { path, source }
}

fn create_dir(path: &Path) -> std::result::Result<(), AssetError> {
    std::fs::create_dir_all(path).map_err(extract_err(path))?;
    set_mode(path, DIR_MODE).map_err(extract_err(path))
}

/// Unpacks a gzip-compressed tar archive into `root`.
fn extract(bytes: &[u8], root: &Path) -> std::result::Result<(), AssetError> {
    create_dir(root)?;

    let mut archive = Archive::new(GzDecoder::new(Cursor::new(bytes)));

    for entry in archive.entries().map_err(corrupt)? {
        let mut entry = entry.map_err(corrupt)?;
        let relative = entry.path().map_err(corrupt)?.into_owned();

        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(corrupt(format!(
                "entry escapes extraction root: {}",
                relative.display()
            )));
        }

        let target = root.join(&relative);

        match entry.header().entry_type() {
            EntryType::Directory => create_dir(&target)?,
            EntryType::Regular => {
                if let Some(parent) = target.parent() {
                    create_dir(parent)?;
                }

                let declared = entry.header().size().map_err(corrupt)?;
                let mut file = File::create(&target).map_err(extract_err(&target))?;
                let written = std::io::copy(&mut entry, &mut file).map_err(corrupt)?;
                drop(file);

                if written != declared {
                    let _ = std::fs::remove_file(&target);
                    return Err(corrupt(format!(
                        "entry {} is truncated: {written} of {declared} bytes",
                        relative.display()
                    )));
                }
                set_mode(&target, CONFIG_FILE_MODE).map_err(extract_err(&target))?;
            }
            other => debug!("Skipping {:?} entry {}", other, relative.display()),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::testing::module_archive;
    use crate::cloud::MockControlPlane;
    use crate::error::{ControlPlaneError, DeployError};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_extracts_archive() {
        let home = TempDir::new().expect("tempdir");
        let layout = HomeLayout::new(home.path());

        let mut client = MockControlPlane::new();
        client
            .expect_script_archive()
            .times(1)
            .returning(|| Ok(module_archive()));

        let fetcher = AssetFetcher::new(layout.clone());
        let root = fetcher.fetch_and_extract(&client).await.expect("extract");

        assert_eq!(root, home.path());
        let ops = layout.cloud_module_dir().join("apisix/cli/ops.lua");
        assert_eq!(std::fs::read_to_string(ops).expect("read"), "return {}\n");
    }

    #[tokio::test]
    async fn test_existing_module_is_reused() {
        let home = TempDir::new().expect("tempdir");
        let layout = HomeLayout::new(home.path());
        std::fs::create_dir_all(layout.cloud_module_dir()).expect("mkdir");
        std::fs::write(layout.cloud_module_dir().join("cloud.lua"), "cached").expect("write");

        let mut client = MockControlPlane::new();
        client.expect_script_archive().times(0);

        let fetcher = AssetFetcher::new(layout);
        fetcher.fetch_and_extract(&client).await.expect("reuse");
    }

    #[tokio::test]
    async fn test_download_and_corruption_are_distinguished() {
        let home = TempDir::new().expect("tempdir");
        let layout = HomeLayout::new(home.path());

        let mut unreachable = MockControlPlane::new();
        unreachable
            .expect_script_archive()
            .returning(|| Err(ControlPlaneError::network("connection refused")));
        let err = AssetFetcher::new(layout.clone())
            .fetch_and_extract(&unreachable)
            .await
            .expect_err("download fails");
        assert!(matches!(err, DeployError::Asset(AssetError::Download(_))));

        let mut garbage = MockControlPlane::new();
        garbage
            .expect_script_archive()
            .returning(|| Ok(b"definitely not gzip".to_vec()));
        let err = AssetFetcher::new(layout)
            .fetch_and_extract(&garbage)
            .await
            .expect_err("corrupt");
        assert!(matches!(err, DeployError::Asset(AssetError::Corrupt { .. })));
    }

    #[test]
    fn test_oversized_entry_is_corrupt() {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        use std::io::Write;

        let mut header = tar::Header::new_gnu();
        header.set_path("cloud_lua_module/huge.lua").expect("path");
        header.set_entry_type(EntryType::Regular);
        header.set_size(1 << 50);
        header.set_mode(0o644);
        header.set_cksum();

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(header.as_bytes()).expect("header");
        encoder.write_all(&[0_u8; 512]).expect("body");
        let bytes = encoder.finish().expect("gzip");

        let root = TempDir::new().expect("tempdir");
        let err = extract(&bytes, root.path()).expect_err("corrupt");

        assert!(matches!(err, AssetError::Corrupt { .. }));
        assert!(!root.path().join("cloud_lua_module/huge.lua").exists());
    }

    #[tokio::test]
    async fn test_failed_extraction_leaves_no_module() {
        let home = TempDir::new().expect("tempdir");
        let layout = HomeLayout::new(home.path());

        let mut archive = module_archive();
        archive.truncate(archive.len() / 2);
        let mut client = MockControlPlane::new();
        client
            .expect_script_archive()
            .returning(move || Ok(archive.clone()));

        let err = AssetFetcher::new(layout.clone())
            .fetch_and_extract(&client)
            .await
            .expect_err("truncated archive");

        assert!(matches!(err, DeployError::Asset(AssetError::Corrupt { .. })));
        assert!(!is_populated(&layout.cloud_module_dir()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_extracted_tree_is_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let home = TempDir::new().expect("tempdir");
        let layout = HomeLayout::new(home.path());

        let mut client = MockControlPlane::new();
        client.expect_script_archive().returning(|| Ok(module_archive()));

        AssetFetcher::new(layout.clone())
            .fetch_and_extract(&client)
            .await
            .expect("extract");

        let cli = layout.cloud_module_dir().join("apisix/cli");
        let dir_mode = std::fs::metadata(&cli).expect("meta").permissions().mode();
        let file_mode = std::fs::metadata(cli.join("env.lua")).expect("meta").permissions().mode();
        assert_eq!(dir_mode & 0o777, 0o755);
        assert_eq!(file_mode & 0o777, 0o644);
    }
}
