//! Mail alerts through the local `sendmail` binary

use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::AlertNotifier;

const SUBJECT: &str = "INTEGRITY ALERT";

pub struct SendmailNotifier {
    sendmail_path: PathBuf,
    recipient: String,
}

impl SendmailNotifier {
    pub fn new(sendmail_path: impl Into<PathBuf>, recipient: String) -> Self {
        Self {
            sendmail_path: sendmail_path.into(),
            recipient: recipient.replace(['\r', '\n'], ""),
        }
    }

    /// RFC 822 message handed to `sendmail -t`
    pub fn compose(&self, message: &str) -> String {
        format!(
            "To: {}\r\nSubject: {}\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n{}\r\n",
            self.recipient, SUBJECT, message
        )
    }
}

#[async_trait]
impl AlertNotifier for SendmailNotifier {
    fn name(&self) -> &str {
        "email"
    }

    async fn notify(&self, message: &str) -> Result<()> {
        debug!("Mailing tamper alert to {}", self.recipient);

        let mut child = Command::new(&self.sendmail_path)
            .arg("-t")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| anyhow!("Failed to start {:?}: {}", self.sendmail_path, e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(self.compose(message).as_bytes()).await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(anyhow!(
                "sendmail exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        Ok(())
    }
}
