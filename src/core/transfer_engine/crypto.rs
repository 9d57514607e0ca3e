//! External encryption tool invocation.
//!
//! The tool is called as `<program> [args...] <source> <destination>`, where
//! the destination is the source file name with `.crypt` appended inside the
//! target directory. Its output is captured so a chatty tool cannot stall on
//! a full pipe.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use super::Encryptor;
use crate::core::models::encrypted_path;

#[derive(Debug, Error)]
pub enum EncryptError {
    #[error("encryption tool not found: {}", .0.display())]
    ToolMissing(PathBuf),

    #[error("file to encrypt not found: {}", .0.display())]
    SourceMissing(PathBuf),

    #[error("encryption target directory not found: {}", .0.display())]
    DestinationMissing(PathBuf),

    #[error("encryption tool exited with status {code:?}: {stderr}")]
    Exit { code: Option<i32>, stderr: String },

    #[error("failed to run encryption tool: {0}")]
    Spawn(#[from] io::Error),
}

impl EncryptError {
    /// Negative code recorded in the log in place of an encryption time.
    pub fn code(&self) -> i64 {
        match self {
            EncryptError::ToolMissing(_) => -10,
            EncryptError::SourceMissing(_) => -11,
            EncryptError::DestinationMissing(_) => -12,
            EncryptError::Exit { code: Some(code), .. } if *code != 0 => -i64::from(*code).abs(),
            EncryptError::Exit { .. } => -1,
            EncryptError::Spawn(_) => -99,
        }
    }
}

/// Runs a configured command-line encryption tool.
#[derive(Debug, Clone, Default)]
pub struct CryptoTool {
    program: Option<PathBuf>,
    args: Vec<String>,
}

impl CryptoTool {
    pub fn new(program: Option<PathBuf>) -> Self {
        Self {
            program,
            args: Vec::new(),
        }
    }

    /// Arguments passed before the source and destination paths.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }
}

#[async_trait]
impl Encryptor for CryptoTool {
    async fn encrypt(&self, source: &Path, dest_dir: &Path) -> Result<u64, EncryptError> {
        let program = match &self.program {
            Some(program) if program.is_file() => program,
            Some(program) => return Err(EncryptError::ToolMissing(program.clone())),
            None => return Err(EncryptError::ToolMissing(PathBuf::new())),
        };
        if !source.is_file() {
            return Err(EncryptError::SourceMissing(source.to_path_buf()));
        }
        if !dest_dir.is_dir() {
            return Err(EncryptError::DestinationMissing(dest_dir.to_path_buf()));
        }
        let Some(file_name) = source.file_name() else {
            return Err(EncryptError::SourceMissing(source.to_path_buf()));
        };
        let destination = encrypted_path(&dest_dir.join(file_name));

        let start = Instant::now();
        let output = Command::new(program)
            .args(&self.args)
            .arg(source)
            .arg(&destination)
            .stdin(Stdio::null())
            .output()
            .await?;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        debug!(
            source = %source.display(),
            destination = %destination.display(),
            status = %output.status,
            stdout = %String::from_utf8_lossy(&output.stdout).trim(),
            "Encryption tool finished"
        );

        if output.status.success() {
            Ok(elapsed_ms)
        } else {
            Err(EncryptError::Exit {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}
