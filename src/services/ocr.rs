//! OCR through the `tesseract` command-line tool.

use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{BoxFuture, OcrEngine};

/// Pipe `input` through `program args...` and return its stdout as text.
pub(crate) async fn run_filter(program: &str, args: &[&str], input: Vec<u8>) -> Result<String> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to start {}", program))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| anyhow::anyhow!("{} stdin unavailable", program))?;
    let writer = tokio::spawn(async move {
        stdin.write_all(&input).await?;
        stdin.shutdown().await
    });

    let output = child.wait_with_output().await?;
    let written = writer
        .await
        .map_err(|e| anyhow::anyhow!("Task join error: {}", e))?;

    if !output.status.success() {
        anyhow::bail!(
            "{} exited with {}: {}",
            program,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    // A filter may exit before draining stdin; only its output matters then.
    if let Err(e) = written {
        debug!(program, error = %e, "Input not fully consumed");
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

pub struct TesseractOcr {
    program: String,
}

impl TesseractOcr {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl OcrEngine for TesseractOcr {
    fn extract_text(&self, image: Vec<u8>) -> BoxFuture<'_, String> {
        Box::pin(async move {
            let text = run_filter(&self.program, &["stdin", "stdout"], image).await?;
            Ok(text.trim().to_string())
        })
    }
}
