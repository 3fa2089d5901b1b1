use super::Session;
use crate::context::Elevation;
use crate::engine::{is_unchanged, temp_path, PutOptions, PutOutcome, Source, TransferProgress};
use crate::errors::TaskError;
use std::ffi::OsString;
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

impl Session {
    pub fn put(&mut self, source: impl Into<Source>, dest: &str) -> Result<PutOutcome, TaskError> {
        self.put_with(source, dest, &PutOptions::default())
    }

    /// Uploads `source` to `dest` (relative to the active `cd`).
    ///
    /// Files are staged under the configured temp directory and moved into
    /// place with elevation, so `dest` may be anywhere `sudo` can write.
    /// Directories are mirrored recursively.
    pub fn put_with(
        &mut self,
        source: impl Into<Source>,
        dest: &str,
        options: &PutOptions,
    ) -> Result<PutOutcome, TaskError> {
        let source = source.into();
        let dest = self.context.resolve_path(dest);
        if let Source::Path(path) = &source {
            if path.is_dir() {
                return self.put_dir(path, &dest, options);
            }
        }
        self.put_file(&source, &dest, options)
    }

    fn put_file(
        &mut self,
        source: &Source,
        dest: &str,
        options: &PutOptions,
    ) -> Result<PutOutcome, TaskError> {
        if self.is_dry_run() {
            self.logger.info(
                "put skipped (dry run)",
                Some(&serde_json::json!({ "dest": dest })),
            );
            return Ok(PutOutcome::DryRun);
        }
        if !options.force {
            if let Some(local) = source.local_stat()? {
                let remote = self.transfers.stat(self.transport.as_mut(), dest)?;
                if remote.map(|r| is_unchanged(&local, &r)).unwrap_or(false) {
                    self.logger.info(
                        "put skipped, remote is current",
                        Some(&serde_json::json!({ "dest": dest, "size": local.size })),
                    );
                    return Ok(PutOutcome::Skipped);
                }
            }
        }

        let staged = temp_path(&self.config.temp_dir(), dest);
        let (mut reader, total) = source.open()?;
        let bytes = self
            .transfers
            .upload(self.transport.as_mut(), &mut reader, &staged, total)?;
        drop(reader);

        let mut root = self.sudo(Elevation::new());
        root.mv(&staged, dest)?;
        if let Some(owner) = options.owner.as_deref() {
            root.chown(owner, dest)?;
        }
        drop(root);

        self.logger.info(
            "put",
            Some(&serde_json::json!({ "dest": dest, "bytes": bytes })),
        );
        Ok(PutOutcome::Transferred { bytes })
    }

    fn put_dir(
        &mut self,
        root: &Path,
        dest: &str,
        options: &PutOptions,
    ) -> Result<PutOutcome, TaskError> {
        let dest = dest.trim_end_matches('/');
        self.ensure_remote_dir(dest, options.owner.as_deref())?;
        let mut files = 0;
        for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|err| {
                TaskError::invalid_params(format!("Cannot walk {}: {}", root.display(), err))
            })?;
            let relative = entry.path().strip_prefix(root).map_err(|_| {
                TaskError::invalid_params(format!(
                    "{} is outside {}",
                    entry.path().display(),
                    root.display()
                ))
            })?;
            let parts = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>();
            let remote = format!("{}/{}", dest, parts.join("/"));
            if entry.file_type().is_dir() {
                self.ensure_remote_dir(&remote, options.owner.as_deref())?;
            } else {
                self.put_file(&Source::Path(entry.path().to_path_buf()), &remote, options)?;
                files += 1;
            }
        }
        Ok(PutOutcome::Directory { files })
    }

    /// Creates `dir` with elevation and hands it back to the login user, then
    /// to `owner` when given.
    fn ensure_remote_dir(&mut self, dir: &str, owner: Option<&str>) -> Result<(), TaskError> {
        let login = self.username().to_string();
        let mut root = self.sudo(Elevation::new());
        root.mkdir(dir)?;
        root.chown(&login, dir)?;
        if let Some(owner) = owner {
            root.chown(owner, dir)?;
        }
        Ok(())
    }

    /// Downloads `remote` into the local file `local`, replacing it.
    ///
    /// Bytes land in a `.<name>.part` sibling first; `local` is only replaced
    /// once the download completes and is left untouched on failure.
    pub fn get(&mut self, remote: &str, local: impl AsRef<Path>) -> Result<u64, TaskError> {
        let remote = self.context.resolve_path(remote);
        let local = local.as_ref();
        if self.is_dry_run() {
            self.logger.info(
                "get skipped (dry run)",
                Some(&serde_json::json!({
                    "remote": remote,
                    "local": local.display().to_string(),
                })),
            );
            return Ok(0);
        }
        let partial = partial_path(local)?;
        let result = self.download_to(&remote, &partial);
        let bytes = match result {
            Ok(bytes) => bytes,
            Err(err) => {
                let _ = std::fs::remove_file(&partial);
                return Err(err);
            }
        };
        std::fs::rename(&partial, local).map_err(|err| {
            let _ = std::fs::remove_file(&partial);
            TaskError::transfer(format!("Cannot replace {}: {}", local.display(), err))
        })?;
        Ok(bytes)
    }

    fn download_to(&mut self, remote: &str, path: &Path) -> Result<u64, TaskError> {
        let mut file = File::create(path).map_err(|err| {
            TaskError::transfer(format!("Cannot create {}: {}", path.display(), err))
        })?;
        let bytes = self
            .transfers
            .download(self.transport.as_mut(), remote, &mut file)?;
        file.sync_all()?;
        Ok(bytes)
    }

    /// Downloads `remote` into `sink` and rewinds it to the start.
    pub fn get_into<W: Write + Seek>(
        &mut self,
        remote: &str,
        sink: &mut W,
    ) -> Result<u64, TaskError> {
        let remote = self.context.resolve_path(remote);
        let bytes = if self.is_dry_run() {
            self.logger.info(
                "get skipped (dry run)",
                Some(&serde_json::json!({ "remote": remote })),
            );
            0
        } else {
            self.transfers
                .download(self.transport.as_mut(), &remote, &mut *sink)?
        };
        sink.seek(SeekFrom::Start(0))?;
        Ok(bytes)
    }

    /// Called with the running byte count of every upload and download.
    pub fn on_progress<F>(&mut self, hook: F)
    where
        F: FnMut(&TransferProgress<'_>) + 'static,
    {
        self.transfers.set_progress(Some(Box::new(hook)));
    }

    pub fn clear_progress(&mut self) {
        self.transfers.set_progress(None);
    }
}

fn partial_path(local: &Path) -> Result<PathBuf, TaskError> {
    let name = local.file_name().ok_or_else(|| {
        TaskError::invalid_params(format!("{} is not a file path", local.display()))
    })?;
    let mut partial = OsString::from(".");
    partial.push(name);
    partial.push(".part");
    Ok(local.with_file_name(partial))
}
