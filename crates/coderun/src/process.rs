//! Child process plumbing shared by the container launcher and the
//! in-sandbox runner.
//!
//! Both sides feed a child its stdin, drain stdout and stderr on separate
//! tasks, and bound the whole exchange with a deadline. On expiry the caller
//! decides how to tear the child down; [`terminate`] kills its process group.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Everything a finished child produced
#[derive(Debug)]
pub(crate) struct CapturedOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Outcome of a deadline-bounded exchange
#[derive(Debug)]
pub(crate) enum Bounded {
    Finished(CapturedOutput),
    Expired,
}

/// Put the child in a fresh process group so its descendants can be
/// killed together.
pub(crate) fn own_process_group(command: &mut Command) {
    #[cfg(unix)]
    command.process_group(0);
    command.kill_on_drop(true);
}

/// Write `input` to the child's stdin and close it, then wait for exit and
/// for both output streams to reach EOF, all within `deadline`.
pub(crate) async fn run_bounded(
    child: &mut Child,
    input: &[u8],
    deadline: Duration,
) -> io::Result<Bounded> {
    let stdout = spawn_reader(child.stdout.take());
    let stderr = spawn_reader(child.stderr.take());
    let stdin = child.stdin.take();

    let exchange = async {
        if let Some(mut pipe) = stdin {
            match pipe.write_all(input).await {
                Ok(()) => {
                    if let Err(e) = pipe.shutdown().await {
                        debug!(error = %e, "failed to flush stdin");
                    }
                }
                // The child exited or closed its stdin early; its output says why
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                    debug!("child closed stdin before reading all input");
                }
                Err(e) => warn!(error = %e, "failed to write child stdin"),
            }
            // dropping the pipe closes it and signals end-of-input
        }

        let status = child.wait().await?;
        let stdout = join_reader(stdout).await?;
        let stderr = join_reader(stderr).await?;
        Ok::<_, io::Error>(CapturedOutput {
            status,
            stdout,
            stderr,
        })
    };

    match tokio::time::timeout(deadline, exchange).await {
        Ok(output) => output.map(Bounded::Finished),
        Err(_) => Ok(Bounded::Expired),
    }
}

/// Kill the child's whole process group and reap the child.
pub(crate) async fn terminate(child: &mut Child) {
    kill_process_group(child.id());
    if let Err(e) = child.kill().await {
        debug!(error = %e, "child already exited");
    }
}

/// Send SIGKILL to a process group, ignoring groups that no longer exist.
pub(crate) fn kill_process_group(pid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = pid.and_then(|pid| i32::try_from(pid).ok()) {
        use nix::errno::Errno;
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        match killpg(Pid::from_raw(pid), Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => warn!(pid, error = %e, "failed to kill process group"),
        }
    }

    #[cfg(not(unix))]
    let _ = pid;
}

fn spawn_reader<R>(reader: Option<R>) -> JoinHandle<io::Result<Vec<u8>>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut reader) = reader {
            reader.read_to_end(&mut buf).await?;
        }
        Ok(buf)
    })
}

async fn join_reader(handle: JoinHandle<io::Result<Vec<u8>>>) -> io::Result<Vec<u8>> {
    handle.await.map_err(io::Error::other)?
}
