//! Helper process spawning and output capture.
//!
//! Each helper gets one OS pipe installed as both its stdout and stderr. A
//! pump task owns the child: it reads the pipe whenever the reactor reports
//! it readable, forwards decoded text to the supervisor, and reports the exit
//! status last, once the pipe has been drained.

use std::fs::File;
use std::io::{self, Read};
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use nix::fcntl::{fcntl, FcntlArg, FdFlag, OFlag};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Notify};
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, error, warn};

use crate::error::{Error, Result};

/// Bytes requested per read from the output pipe.
const READ_CHUNK: usize = 8192;

/// Exit code reported when the exit status could not be collected.
const UNKNOWN_EXIT: i32 = -1;

/// Notifications from a pump task to the supervisor.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ProcessEvent {
    /// Decoded output from the helper.
    Output { generation: u64, text: String },
    /// The helper exited; always the last event of a generation.
    Exited { generation: u64, code: i32 },
}

/// Timing knobs for a pump task.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PumpOptions {
    /// Force-kill this long after a stop request, if set.
    pub stop_grace: Option<Duration>,
    /// Keep draining output this long after exit.
    pub drain_timeout: Duration,
}

/// The supervisor's handle on one spawned helper.
#[derive(Debug)]
pub(crate) struct ProcessHandle {
    pub pid: u32,
    pub generation: u64,
    stop: Arc<Notify>,
}

impl ProcessHandle {
    /// Ask the helper to terminate (SIGTERM).
    pub fn request_stop(&self) {
        self.stop.notify_one();
    }
}

/// Spawn the helper with merged stdout/stderr and start its pump task.
pub(crate) fn spawn_helper(
    path: &Path,
    args: &[&str],
    generation: u64,
    events: mpsc::UnboundedSender<ProcessEvent>,
    options: PumpOptions,
) -> Result<ProcessHandle> {
    let (reader, writer) = output_pipe().map_err(|e| Error::Spawn(e.to_string()))?;

    // Registered with the reactor before the child exists.
    // SAFETY: the File owns the read end and keeps it open until the AsyncFd is dropped.
    let output = unsafe {
        AsyncFd::register_with_interest(File::from(reader), Interest::READABLE)
    }
    .map_err(|e| Error::Spawn(e.to_string()))?;

    let child = {
        let stderr = writer.try_clone().map_err(|e| Error::Spawn(e.to_string()))?;
        let mut command = Command::new(path);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(writer))
            .stderr(Stdio::from(stderr))
            // Own group, so a terminal interrupt reaches only the supervisor
            .process_group(0);
        // Dropping the command closes our copies of the write end
        command.spawn().map_err(|e| Error::Spawn(e.to_string()))?
    };

    let pid = child
        .id()
        .ok_or_else(|| Error::Spawn("process exited before it could be tracked".to_string()))?;

    let stop = Arc::new(Notify::new());
    tokio::spawn(pump(
        child,
        pid,
        output,
        stop.clone(),
        generation,
        events,
        options,
    ));

    Ok(ProcessHandle {
        pid,
        generation,
        stop,
    })
}

/// Create the output pipe: both ends close-on-exec, read end non-blocking.
fn output_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let (reader, writer) = nix::unistd::pipe()?;
    for fd in [&reader, &writer] {
        fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
    }
    fcntl(reader.as_raw_fd(), FcntlArg::F_SETFL(OFlag::O_NONBLOCK))?;
    Ok((reader, writer))
}

/// Read whatever is available once the pipe is readable. Empty means EOF.
async fn read_chunk(output: &AsyncFd<File>) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let mut guard = output.readable().await?;
        match guard.try_io(|inner| {
            let mut file: &File = inner.get_ref();
            file.read(&mut buf)
        }) {
            Ok(result) => {
                let len = result?;
                buf.truncate(len);
                return Ok(buf);
            }
            Err(_would_block) => continue,
        }
    }
}

/// Send a signal to the helper.
fn signal(pid: u32, sig: Signal) {
    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(err) = kill(Pid::from_raw(raw), sig) {
        warn!(pid, "Failed to send {:?}: {}", sig, err);
    }
}

/// Exit code, or the signal number for a child killed by a signal.
pub(crate) fn exit_code(status: &ExitStatus) -> i32 {
    status.code().or_else(|| status.signal()).unwrap_or(UNKNOWN_EXIT)
}

async fn pump(
    mut child: Child,
    pid: u32,
    output: AsyncFd<File>,
    stop: Arc<Notify>,
    generation: u64,
    events: mpsc::UnboundedSender<ProcessEvent>,
    options: PumpOptions,
) {
    let mut decoder = Utf8Decoder::default();
    let mut eof = false;
    let mut kill_at: Option<Instant> = None;

    let forward = |decoder: &mut Utf8Decoder, data: &[u8]| match decoder.decode(data) {
        Some(text) if !text.is_empty() => {
            let _ = events.send(ProcessEvent::Output { generation, text });
        }
        Some(_) => {}
        None => debug!(pid, "Dropped {} bytes of non UTF-8 output", data.len()),
    };

    let status = loop {
        tokio::select! {
            result = child.wait() => break result,
            read = read_chunk(&output), if !eof => match read {
                Ok(data) if data.is_empty() => eof = true,
                Ok(data) => forward(&mut decoder, &data),
                Err(err) => {
                    warn!(pid, "Output read error: {}", err);
                    eof = true;
                }
            },
            _ = stop.notified() => {
                debug!(pid, "Sending SIGTERM");
                signal(pid, Signal::SIGTERM);
                if let Some(grace) = options.stop_grace {
                    kill_at.get_or_insert(Instant::now() + grace);
                }
            }
            _ = sleep_until(kill_at.unwrap_or_else(Instant::now)), if kill_at.is_some() => {
                warn!(pid, "Still running after grace period, sending SIGKILL");
                signal(pid, Signal::SIGKILL);
                kill_at = None;
            }
        }
    };

    // Output written just before exit may still be in the pipe
    if !eof {
        let drained = timeout(options.drain_timeout, async {
            loop {
                match read_chunk(&output).await {
                    Ok(data) if data.is_empty() => break,
                    Ok(data) => forward(&mut decoder, &data),
                    Err(err) => {
                        warn!(pid, "Output read error: {}", err);
                        break;
                    }
                }
            }
        })
        .await;
        if drained.is_err() {
            debug!(pid, "Output pipe still open after exit, stopped draining");
        }
    }

    let code = match status {
        Ok(status) => exit_code(&status),
        Err(err) => {
            error!(pid, "Failed to collect exit status: {}", err);
            UNKNOWN_EXIT
        }
    };

    let _ = events.send(ProcessEvent::Exited { generation, code });
}

/// Incremental UTF-8 decoding of a byte stream split at arbitrary points.
///
/// A character cut in half by a chunk boundary is held back until the next
/// chunk. A chunk containing invalid bytes is dropped whole.
#[derive(Debug, Default)]
pub(crate) struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Decode the next chunk. `None` means the chunk was not valid UTF-8.
    pub fn decode(&mut self, data: &[u8]) -> Option<String> {
        self.pending.extend_from_slice(data);

        match std::str::from_utf8(&self.pending) {
            Ok(_) => String::from_utf8(std::mem::take(&mut self.pending)).ok(),
            Err(err) if err.error_len().is_none() => {
                let rest = self.pending.split_off(err.valid_up_to());
                String::from_utf8(std::mem::replace(&mut self.pending, rest)).ok()
            }
            Err(_) => {
                self.pending.clear();
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;

    use nix::unistd::{getpgid, getpgrp};

    use crate::test_util::SPAWN_LOCK;

    fn pump_options() -> PumpOptions {
        PumpOptions {
            stop_grace: None,
            drain_timeout: Duration::from_millis(250),
        }
    }

    #[test]
    fn test_decode_plain() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(b"hello\n"), Some("hello\n".to_string()));
        assert_eq!(decoder.decode(b""), Some(String::new()));
    }

    #[test]
    fn test_decode_split_character() {
        let mut decoder = Utf8Decoder::default();
        let bytes = "a→b".as_bytes();

        assert_eq!(decoder.decode(&bytes[..2]), Some("a".to_string()));
        assert_eq!(decoder.decode(&bytes[2..3]), Some(String::new()));
        assert_eq!(decoder.decode(&bytes[3..]), Some("→b".to_string()));
    }

    #[test]
    fn test_decode_invalid_chunk_dropped() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(b"ok\xff\xfe"), None);
        assert_eq!(decoder.decode(b"after"), Some("after".to_string()));
    }

    #[test]
    fn test_decode_invalid_after_partial() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(b"x\xe2"), Some("x".to_string()));
        assert_eq!(decoder.decode(b"\x41"), None);
        assert_eq!(decoder.decode(b"y"), Some("y".to_string()));
    }

    #[test]
    fn test_exit_code_normal() {
        let _guard = SPAWN_LOCK.blocking_lock();
        let status = StdCommand::new("sh").args(["-c", "exit 3"]).status().unwrap();
        assert_eq!(exit_code(&status), 3);
    }

    #[test]
    fn test_exit_code_signal() {
        let _guard = SPAWN_LOCK.blocking_lock();
        let status = StdCommand::new("sh")
            .args(["-c", "kill -TERM $$"])
            .status()
            .unwrap();
        assert_eq!(exit_code(&status), 15);
    }

    #[tokio::test]
    async fn test_merged_output_then_exit() {
        let _guard = SPAWN_LOCK.lock().await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handle = spawn_helper(
            Path::new("/bin/sh"),
            &["-c", "echo out; echo err >&2; exit 4"],
            7,
            tx,
            pump_options(),
        )
        .unwrap();
        assert_eq!(handle.generation, 7);

        let mut text = String::new();
        let code = loop {
            match rx.recv().await.unwrap() {
                ProcessEvent::Output { generation, text: chunk } => {
                    assert_eq!(generation, 7);
                    text.push_str(&chunk);
                }
                ProcessEvent::Exited { generation, code } => {
                    assert_eq!(generation, 7);
                    break code;
                }
            }
        };

        assert_eq!(code, 4);
        assert!(text.contains("out\n"));
        assert!(text.contains("err\n"));
    }

    #[tokio::test]
    async fn test_spawn_missing_executable() {
        let _guard = SPAWN_LOCK.lock().await;
        let (tx, _rx) = mpsc::unbounded_channel();

        let result = spawn_helper(
            Path::new("/nonexistent/mdns-reflector"),
            &[],
            1,
            tx,
            pump_options(),
        );
        assert!(matches!(result, Err(Error::Spawn(_))));
    }

    #[tokio::test]
    async fn test_helper_leads_its_own_process_group() {
        let _guard = SPAWN_LOCK.lock().await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handle = spawn_helper(
            Path::new("/bin/sh"),
            &["-c", "exec sleep 30"],
            1,
            tx,
            pump_options(),
        )
        .unwrap();
        let pid = Pid::from_raw(handle.pid as i32);

        // A terminal interrupt targets our group; the helper must not be in it
        let group = getpgid(Some(pid)).unwrap();
        assert_eq!(group, pid);
        assert_ne!(group, getpgrp());

        handle.request_stop();
        let code = loop {
            match tokio::time::timeout(Duration::from_secs(10), rx.recv()).await {
                Ok(Some(ProcessEvent::Exited { code, .. })) => break code,
                Ok(Some(_)) => continue,
                other => panic!("Expected exit event, got {:?}", other),
            }
        };
        assert_eq!(code, 15);
    }
}
