use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::fs;
use tokio::process::{Child, Command};

use crate::error::{Error, Result};

/// Hard ceiling on any single service-child lifetime. Clones of large repos
/// stream well within this; a child still alive at the deadline is killed.
pub const GIT_SERVICE_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitService {
    UploadPack,
    ReceivePack,
}

impl GitService {
    pub fn from_query(s: &str) -> Option<Self> {
        match s {
            "git-upload-pack" => Some(Self::UploadPack),
            "git-receive-pack" => Some(Self::ReceivePack),
            _ => None,
        }
    }

    pub fn command_name(self) -> &'static str {
        match self {
            Self::UploadPack => "git-upload-pack",
            Self::ReceivePack => "git-receive-pack",
        }
    }

    pub fn result_content_type(self) -> &'static str {
        match self {
            Self::UploadPack => "application/x-git-upload-pack-result",
            Self::ReceivePack => "application/x-git-receive-pack-result",
        }
    }

    pub fn advertisement_content_type(self) -> &'static str {
        match self {
            Self::UploadPack => "application/x-git-upload-pack-advertisement",
            Self::ReceivePack => "application/x-git-receive-pack-advertisement",
        }
    }

    pub fn is_write(self) -> bool {
        matches!(self, Self::ReceivePack)
    }
}

/// Spawns the stateless-rpc service child with piped stdio. The caller owns
/// the streams; `kill_on_drop` covers abandoned children.
pub fn spawn_service(repo_path: &Path, service: GitService, advertise_refs: bool) -> Result<Child> {
    let mut cmd = Command::new(service.command_name());
    cmd.arg("--stateless-rpc");

    if advertise_refs {
        cmd.arg("--advertise-refs");
    }

    cmd.arg(repo_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    cmd.spawn().map_err(Error::Io)
}

/// Runs the `--advertise-refs` form to completion. The advertisement is a
/// few KB at most, so buffering it is fine; pack transfer is the part that
/// must stream.
pub async fn advertise_refs(repo_path: &Path, service: GitService) -> Result<Vec<u8>> {
    let child = spawn_service(repo_path, service, true)?;

    let output = tokio::time::timeout(GIT_SERVICE_TIMEOUT, child.wait_with_output())
        .await
        .map_err(|_| Error::BadRequest("git advertisement timed out".into()))?
        .map_err(Error::Io)?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::BadRequest(format!(
            "{} failed: {stderr}",
            service.command_name()
        )));
    }

    Ok(output.stdout)
}

/// The smart-HTTP advertisement prelude: one pkt-line naming the service,
/// whose 4-hex length counts itself, then a flush packet.
pub fn pkt_line_header(service: GitService) -> Vec<u8> {
    let line = format!("# service={}\n", service.command_name());
    let mut framed = format!("{:04x}{line}", line.len() + 4).into_bytes();
    framed.extend_from_slice(b"0000");
    framed
}

/// Initialises an empty bare repository with HEAD on `main`.
pub async fn init_bare_repo(repo_path: &Path) -> Result<()> {
    if let Some(parent) = repo_path.parent() {
        fs::create_dir_all(parent).await.map_err(Error::Io)?;
    }

    let output = Command::new("git")
        .args(["init", "--bare"])
        .arg(repo_path)
        .output()
        .await
        .map_err(Error::Io)?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::BadRequest(format!(
            "failed to init bare repo: {stderr}"
        )));
    }

    fs::write(repo_path.join("HEAD"), "ref: refs/heads/main\n")
        .await
        .map_err(Error::Io)?;

    Ok(())
}

/// Total size of a bare repository directory. Runs on the blocking pool.
pub async fn repo_disk_size(repo_path: &Path) -> Result<i64> {
    let root = repo_path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut total: u64 = 0;
        let mut stack = vec![root];

        while let Some(dir) = stack.pop() {
            for entry in std::fs::read_dir(&dir)? {
                let entry = entry?;
                let metadata = entry.metadata()?;
                if metadata.is_dir() {
                    stack.push(entry.path());
                } else if metadata.is_file() {
                    total += metadata.len();
                }
            }
        }

        Ok(total as i64)
    })
    .await
    .map_err(|e| Error::BadRequest(format!("size calculation failed: {e}")))?
}
