//! Git checkout plus shell command builder.
//!
//! Each build gets its own scratch directory under the workspace:
//!
//! ```text
//! <workspace>/<name>-<version>-<nonce>/
//!   src/   # shallow clone of the tag
//!   out/   # $RABBIT_OUTPUT, filled by the build command
//! ```
//!
//! After the command succeeds every regular file in `out/` is moved into a
//! staging directory next to `<releases_path>/<name>/<version>/`, checksummed,
//! and the staging directory is then renamed over the release directory. A
//! reader sees either the old set of files or the new one, never a mix. The
//! scratch directory is removed whether the build succeeded or not.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{BuildError, Builder, Result, validate_path_component};
use crate::config::BuildConfig;
use crate::types::Binary;

/// Environment variable holding the project name during the build command.
pub const ENV_NAME: &str = "RABBIT_NAME";
/// Environment variable holding the version during the build command.
pub const ENV_VERSION: &str = "RABBIT_VERSION";
/// Environment variable holding the directory artifacts must be written to.
pub const ENV_OUTPUT: &str = "RABBIT_OUTPUT";

/// Builds releases by cloning the tag and running a shell command.
#[derive(Debug, Clone)]
pub struct GitBuilder {
    workspace: PathBuf,
    releases_path: PathBuf,
    command: String,
}

impl GitBuilder {
    pub fn new(
        workspace: impl Into<PathBuf>,
        releases_path: impl Into<PathBuf>,
        command: impl Into<String>,
    ) -> Self {
        GitBuilder {
            workspace: workspace.into(),
            releases_path: releases_path.into(),
            command: command.into(),
        }
    }

    pub fn from_config(config: &BuildConfig) -> Self {
        Self::new(&config.workspace, &config.releases_path, &config.command)
    }

    /// Directory holding the artifacts of one release.
    pub fn release_dir(&self, name: &str, version: &str) -> PathBuf {
        self.releases_path.join(name).join(version)
    }

    fn build_blocking(&self, name: &str, url: &str, version: &str) -> Result<Vec<Binary>> {
        validate_path_component(name)?;
        validate_path_component(version)?;

        let scratch = self
            .workspace
            .join(format!("{}-{}-{}", name, version, Uuid::new_v4().simple()));
        let result = self.build_in(&scratch, name, url, version);

        remove_dir_logged(&scratch);
        result
    }

    fn build_in(&self, scratch: &Path, name: &str, url: &str, version: &str) -> Result<Vec<Binary>> {
        let checkout = scratch.join("src");
        let output = scratch.join("out");
        fs::create_dir_all(&output)?;

        debug!(url = %url, version = %version, "Cloning tag");
        let checkout_arg = checkout.to_string_lossy().to_string();
        run(git_command(scratch).args([
            "clone",
            "--quiet",
            "--depth",
            "1",
            "--branch",
            version,
            "--",
            url,
            checkout_arg.as_str(),
        ]))?;

        debug!(command = %self.command, "Running build command");
        let mut build = Command::new("sh");
        build
            .arg("-c")
            .arg(&self.command)
            .current_dir(&checkout)
            .env(ENV_NAME, name)
            .env(ENV_VERSION, version)
            .env(ENV_OUTPUT, &output);
        run(&mut build)?;

        let release_dir = self.release_dir(name, version);
        let binaries = publish_artifacts(&output, &release_dir)?;
        info!(
            name = %name,
            version = %version,
            binaries = binaries.len(),
            "Build finished"
        );

        Ok(binaries)
    }
}

impl Builder for GitBuilder {
    #[instrument(skip(self, url))]
    async fn build(&self, name: &str, url: &str, version: &str) -> Result<Vec<Binary>> {
        let builder = self.clone();
        let (name, url, version) = (name.to_string(), url.to_string(), version.to_string());

        tokio::task::spawn_blocking(move || builder.build_blocking(&name, &url, &version))
            .await
            .map_err(|e| BuildError::Aborted(e.to_string()))?
    }
}

/// Creates a git command with a clean environment (no system/user config,
/// no terminal prompts).
fn git_command(workdir: &Path) -> Command {
    let mut cmd = Command::new("git");
    cmd.current_dir(workdir);
    cmd.env("GIT_CONFIG_NOSYSTEM", "1");
    cmd.env("GIT_CONFIG_GLOBAL", "/dev/null");
    cmd.env("GIT_TERMINAL_PROMPT", "0");
    cmd
}

/// Runs a command to completion, mapping a non-zero exit to an error.
fn run(cmd: &mut Command) -> Result<()> {
    let output = cmd.output()?;

    if output.status.success() {
        Ok(())
    } else {
        let program = cmd.get_program().to_string_lossy().to_string();
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        Err(BuildError::CommandFailed {
            command: format!("{} {}", program, args.join(" ")),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Moves every regular file from `output` into `release_dir` and checksums it.
///
/// Any previous contents of `release_dir` are discarded, since a rebuilt
/// version replaces the old release entirely. The files are staged in a
/// sibling directory first and swapped in with renames, so `release_dir`
/// never holds a partial set. Binaries are returned sorted by file name.
pub fn publish_artifacts(output: &Path, release_dir: &Path) -> Result<Vec<Binary>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(output)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();

    if files.is_empty() {
        return Err(BuildError::NoArtifacts(output.to_path_buf()));
    }

    let nonce = Uuid::new_v4().simple().to_string();
    let staging = sibling(release_dir, &nonce, "staging");
    fs::create_dir_all(&staging)?;

    let staged = stage_files(&files, &staging).and_then(|binaries| {
        swap_in(&staging, release_dir, &nonce)?;
        Ok(binaries)
    });
    if staged.is_err() {
        remove_dir_logged(&staging);
    }
    staged
}

fn stage_files(files: &[PathBuf], staging: &Path) -> Result<Vec<Binary>> {
    let mut binaries = Vec::with_capacity(files.len());
    for source in files {
        let Some(file_name) = source.file_name().and_then(|n| n.to_str()) else {
            warn!(path = %source.display(), "Skipping artifact with non UTF-8 name");
            continue;
        };
        let target = staging.join(file_name);
        move_file(source, &target)?;

        binaries.push(Binary::new(file_name, sha256_file(&target)?));
    }
    Ok(binaries)
}

/// Replaces `release_dir` with `staging`.
fn swap_in(staging: &Path, release_dir: &Path, nonce: &str) -> io::Result<()> {
    let retired = sibling(release_dir, nonce, "retired");
    match fs::rename(release_dir, &retired) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    fs::rename(staging, release_dir)?;
    remove_dir_logged(&retired);
    Ok(())
}

/// A hidden directory next to `dir`, unique to one publish.
fn sibling(dir: &Path, nonce: &str, purpose: &str) -> PathBuf {
    let base = dir
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    dir.with_file_name(format!(".{base}.{nonce}.{purpose}"))
}

fn remove_dir_logged(path: &Path) {
    if let Err(e) = fs::remove_dir_all(path)
        && e.kind() != io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "Failed to remove directory");
    }
}

/// Renames a file, falling back to copy-and-delete across filesystems.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
    }
}

/// Hex-encoded SHA-256 of a file's contents.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
