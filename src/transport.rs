//! Mail transport: hands serialized messages to a local MTA.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::TransportError;

/// Delivers one already-serialized message.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: &[u8]) -> Result<(), TransportError>;
}

/// `sendmail -t -i`: recipients come from the headers, and a lone `.` line
/// does not end the message.
#[derive(Debug, Clone)]
pub struct SendmailTransport {
    program: PathBuf,
}

impl SendmailTransport {
    pub const DEFAULT_PATH: &'static str = "/usr/bin/sendmail";

    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for SendmailTransport {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PATH)
    }
}

#[async_trait]
impl MailTransport for SendmailTransport {
    async fn send(&self, message: &[u8]) -> Result<(), TransportError> {
        let mut child = Command::new(&self.program)
            .args(["-t", "-i"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TransportError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            let written = stdin.write_all(message).await;
            // Closing stdin signals end of message.
            drop(stdin);
            if let Err(source) = written {
                let _ = child.kill().await;
                return Err(TransportError::Write {
                    program: self.program.clone(),
                    source,
                });
            }
        }

        let status = child.wait().await.map_err(|source| TransportError::Write {
            program: self.program.clone(),
            source,
        })?;
        debug!(program = %self.program.display(), %status, "Transport exited");
        if status.success() {
            Ok(())
        } else {
            Err(TransportError::Exit {
                program: self.program.clone(),
                status: status.to_string(),
            })
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::path::Path;

    use super::*;

    fn script(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-sendmail");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn message_reaches_stdin_with_header_routing_flags() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("captured");
        let program = script(
            dir.path(),
            &format!("echo \"$@\" > {0}; cat >> {0}", out.display()),
        );

        SendmailTransport::new(&program)
            .send(b"Subject: hi\r\n\r\nbody\r\n")
            .await
            .unwrap();

        let captured = std::fs::read_to_string(&out).unwrap();
        assert!(captured.starts_with("-t -i\n"));
        assert!(captured.contains("Subject: hi"));
    }

    #[tokio::test]
    async fn nonzero_exit_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(dir.path(), "cat > /dev/null; exit 75");
        let err = SendmailTransport::new(&program).send(b"x").await.unwrap_err();
        assert!(matches!(err, TransportError::Exit { .. }));
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let err = SendmailTransport::new("/nonexistent/sendmail")
            .send(b"x")
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Spawn { .. }));
    }
}
