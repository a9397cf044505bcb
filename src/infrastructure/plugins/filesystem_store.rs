use std::io::Read;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use tokio::task;
use walkdir::WalkDir;

use crate::application::ports::plugin_package_store::{PackageError, PluginPackageStore};
use crate::domain::plugins::PluginManifest;
use crate::domain::plugins::manifest::MANIFEST_FILE;

/// Plugin packages under a single root directory:
/// `<root>/<name>/<version>/...` plus scratch archives at `<root>/*.zip`.
pub struct FilesystemPluginStore {
    root: PathBuf,
}

impl FilesystemPluginStore {
    pub fn new(configured_dir: &str) -> anyhow::Result<Self> {
        let root = Self::resolve_root(configured_dir)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve_root(configured_dir: &str) -> anyhow::Result<PathBuf> {
        let configured = configured_dir.trim();
        let path = if configured.is_empty() {
            PathBuf::from("./plugin")
        } else {
            PathBuf::from(configured)
        };
        if !path.exists() {
            std::fs::create_dir_all(&path)
                .with_context(|| format!("create plugin root {}", path.display()))?;
        }
        Ok(path.canonicalize().unwrap_or(path))
    }

    /// Directory prefix inside the archive that holds `config.json`: the
    /// archive root or exactly one directory down.
    fn manifest_prefix<R: Read + std::io::Seek>(
        zip: &mut zip::ZipArchive<R>,
    ) -> Option<(usize, PathBuf)> {
        let mut nested = None;
        for i in 0..zip.len() {
            let Ok(file) = zip.by_index(i) else {
                continue;
            };
            let Some(path) = file.enclosed_name().map(|p| p.to_path_buf()) else {
                continue;
            };
            if file.is_dir() || path.file_name().is_none_or(|n| n != MANIFEST_FILE) {
                continue;
            }
            let depth = path
                .components()
                .filter(|c| matches!(c, Component::Normal(_)))
                .count();
            match depth {
                1 => return Some((i, PathBuf::new())),
                2 if nested.is_none() => {
                    let prefix = path.parent().map(Path::to_path_buf).unwrap_or_default();
                    nested = Some((i, prefix));
                }
                _ => {}
            }
        }
        nested
    }

    fn open_zip(archive: &Path) -> Result<zip::ZipArchive<std::fs::File>, PackageError> {
        let file = std::fs::File::open(archive)
            .with_context(|| format!("open {}", archive.display()))
            .map_err(PackageError::Io)?;
        zip::ZipArchive::new(file).map_err(|e| PackageError::NotZip(anyhow!(e)))
    }

    fn peek_manifest_blocking(archive: &Path) -> Result<PluginManifest, PackageError> {
        let mut zip = Self::open_zip(archive)?;
        let (index, _) = Self::manifest_prefix(&mut zip).ok_or(PackageError::ManifestMissing)?;
        let mut file = zip
            .by_index(index)
            .map_err(|e| PackageError::Unzip(anyhow!(e)))?;
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)
            .map_err(|e| PackageError::Unzip(anyhow!(e)))?;
        PluginManifest::from_slice(&contents).map_err(PackageError::Unmarshal)
    }

    fn extract_archive(
        zip: &mut zip::ZipArchive<std::fs::File>,
        dest_root: &Path,
    ) -> Result<(), PackageError> {
        for i in 0..zip.len() {
            let mut file = zip
                .by_index(i)
                .map_err(|e| PackageError::Unzip(anyhow!(e)))?;
            let Some(rel_path) = file.enclosed_name().map(|p| p.to_path_buf()) else {
                continue;
            };

            if let Some(mode) = file.unix_mode() {
                if (mode & 0o170000) == 0o120000 {
                    continue;
                }
            }

            let outpath = dest_root.join(&rel_path);
            if file.is_dir() {
                std::fs::create_dir_all(&outpath).map_err(|e| PackageError::Unzip(anyhow!(e)))?;
            } else {
                if let Some(parent) = outpath.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| PackageError::Unzip(anyhow!(e)))?;
                }
                let mut outfile =
                    std::fs::File::create(&outpath).map_err(|e| PackageError::Unzip(anyhow!(e)))?;
                std::io::copy(&mut file, &mut outfile)
                    .map_err(|e| PackageError::Unzip(anyhow!(e)))?;
            }
        }
        Ok(())
    }

    /// Copies `src` over `dest`, overwriting files that already exist.
    fn copy_tree(src: &Path, dest: &Path) -> anyhow::Result<()> {
        for entry in WalkDir::new(src).follow_links(false) {
            let entry = entry?;
            let rel = entry.path().strip_prefix(src)?;
            let target = dest.join(rel);
            if entry.file_type().is_dir() {
                std::fs::create_dir_all(&target)?;
            } else if entry.file_type().is_file() {
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::copy(entry.path(), &target)
                    .with_context(|| format!("copy {}", entry.path().display()))?;
            }
        }
        Ok(())
    }

    fn install_archive_blocking(root: &Path, archive: &Path, dest: &Path) -> Result<(), PackageError> {
        let mut zip = Self::open_zip(archive)?;
        let prefix = Self::manifest_prefix(&mut zip)
            .map(|(_, prefix)| prefix)
            .unwrap_or_default();

        std::fs::create_dir_all(root).map_err(|e| PackageError::Io(anyhow!(e)))?;
        let scratch = tempfile::Builder::new()
            .prefix(".unpack-")
            .tempdir_in(root)
            .map_err(|e| PackageError::Io(anyhow!(e)))?;
        Self::extract_archive(&mut zip, scratch.path())?;

        std::fs::create_dir_all(dest).map_err(|e| PackageError::Io(anyhow!(e)))?;
        Self::copy_tree(&scratch.path().join(prefix), dest).map_err(PackageError::Unzip)?;
        Ok(())
    }
}

#[async_trait]
impl PluginPackageStore for FilesystemPluginStore {
    fn plugin_root(&self) -> PathBuf {
        self.root.clone()
    }

    async fn peek_manifest(&self, archive: &Path) -> Result<PluginManifest, PackageError> {
        let archive = archive.to_path_buf();
        task::spawn_blocking(move || Self::peek_manifest_blocking(&archive))
            .await
            .map_err(|e| PackageError::Io(anyhow!(e)))?
    }

    async fn install_archive(&self, archive: &Path, dest: &Path) -> Result<(), PackageError> {
        let root = self.root.clone();
        let archive = archive.to_path_buf();
        let dest = dest.to_path_buf();
        task::spawn_blocking(move || Self::install_archive_blocking(&root, &archive, &dest))
            .await
            .map_err(|e| PackageError::Io(anyhow!(e)))?
    }

    async fn read_manifest(&self, dir: &Path) -> Result<PluginManifest, PackageError> {
        let path = dir.join(MANIFEST_FILE);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(PackageError::ManifestMissing);
            }
            Err(err) => return Err(PackageError::Io(anyhow!(err))),
        };
        PluginManifest::from_slice(&bytes).map_err(PackageError::Unmarshal)
    }

    async fn md5_hex(&self, file: &Path) -> anyhow::Result<String> {
        let path = file.to_path_buf();
        task::spawn_blocking(move || -> anyhow::Result<String> {
            let mut reader = std::fs::File::open(&path)
                .with_context(|| format!("open {}", path.display()))?;
            let mut ctx = md5::Context::new();
            let mut buf = [0u8; 64 * 1024];
            loop {
                let n = reader.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                ctx.consume(&buf[..n]);
            }
            Ok(format!("{:x}", ctx.finalize()))
        })
        .await?
    }

    #[cfg(unix)]
    async fn make_executable(&self, path: &Path) -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o744))
            .await
            .with_context(|| format!("chmod {}", path.display()))
    }

    #[cfg(not(unix))]
    async fn make_executable(&self, _path: &Path) -> anyhow::Result<()> {
        Ok(())
    }

    async fn remove_path(&self, path: &Path) -> anyhow::Result<()> {
        match tokio::fs::symlink_metadata(path).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await?,
            Ok(_) => tokio::fs::remove_file(path).await?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use tempfile::TempDir;
    use zip::write::FileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, body) in entries {
            zip.start_file(*name, FileOptions::default()).unwrap();
            zip.write_all(body).unwrap();
        }
        zip.finish().unwrap();
    }

    #[tokio::test]
    async fn nested_manifest_is_found_and_flattened() {
        let temp = TempDir::new().unwrap();
        let store = FilesystemPluginStore::new(temp.path().to_str().unwrap()).unwrap();
        let archive = temp.path().join("demo.zip");
        write_zip(
            &archive,
            &[
                ("demo/config.json", br#"{"name":"demo","version":"1.0","runPath":"main"}"#),
                ("demo/main", b"#!/bin/sh\nexit 0\n"),
            ],
        );

        let manifest = store.peek_manifest(&archive).await.unwrap();
        assert_eq!(manifest.name, "demo");

        let dest = store.install_dir("demo", "1.0");
        store.install_archive(&archive, &dest).await.unwrap();
        assert!(dest.join("main").is_file());
        assert!(dest.join(MANIFEST_FILE).is_file());
        assert_eq!(store.read_manifest(&dest).await.unwrap().run_path, "main");
    }

    #[tokio::test]
    async fn archive_without_manifest_is_rejected() {
        let temp = TempDir::new().unwrap();
        let store = FilesystemPluginStore::new(temp.path().to_str().unwrap()).unwrap();
        let archive = temp.path().join("bad.zip");
        write_zip(&archive, &[("a/b/config.json", b"{}"), ("readme", b"x")]);
        assert!(matches!(
            store.peek_manifest(&archive).await,
            Err(PackageError::ManifestMissing)
        ));

        let not_zip = temp.path().join("plain.zip");
        std::fs::write(&not_zip, b"not a zip").unwrap();
        assert!(matches!(
            store.peek_manifest(&not_zip).await,
            Err(PackageError::NotZip(_))
        ));
    }

    #[tokio::test]
    async fn md5_is_lower_hex() {
        let temp = TempDir::new().unwrap();
        let store = FilesystemPluginStore::new(temp.path().to_str().unwrap()).unwrap();
        let file = temp.path().join("f");
        std::fs::write(&file, b"hello").unwrap();
        assert_eq!(
            store.md5_hex(&file).await.unwrap(),
            "5d41402abc4b2a76b9719d911017c592"
        );
    }
}
