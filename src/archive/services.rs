use crate::error::UploadError;
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, info};

/// Remote upload collaborator
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, path: &Path) -> Result<(), UploadError>;
}

/// Email/notification collaborator
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: &str, path: &Path) -> Result<(), UploadError>;
}

/// External program run once per artifact. `{file}` and `{recipient}` in
/// the arguments are substituted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandHook {
    program: String,
    args: Vec<String>,
}

impl CommandHook {
    pub fn from_command(command: &[String]) -> Result<Self, UploadError> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| UploadError::Misconfigured {
                details: "command is empty".to_string(),
            })?;
        if program.trim().is_empty() {
            return Err(UploadError::Misconfigured {
                details: "program name is empty".to_string(),
            });
        }

        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn expand_args(&self, file: &Path, recipient: Option<&str>) -> Vec<String> {
        let file = file.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                let arg = arg.replace("{file}", &file);
                match recipient {
                    Some(recipient) => arg.replace("{recipient}", recipient),
                    None => arg,
                }
            })
            .collect()
    }

    async fn run(&self, file: &Path, recipient: Option<&str>) -> Result<(), UploadError> {
        let args = self.expand_args(file, recipient);
        debug!("Running {} {:?}", self.program, args);

        let output = Command::new(&self.program)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| UploadError::Launch {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(UploadError::Exit {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        info!("{} finished for {}", self.program, file.display());
        Ok(())
    }
}

#[async_trait]
impl Uploader for CommandHook {
    async fn upload(&self, path: &Path) -> Result<(), UploadError> {
        self.run(path, None).await
    }
}

#[async_trait]
impl Notifier for CommandHook {
    async fn send(&self, recipient: &str, path: &Path) -> Result<(), UploadError> {
        self.run(path, Some(recipient)).await
    }
}
