use super::document::PAGE_HEIGHT_ATTR;
use log::{debug, warn};
use regex::Regex;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;
use wait_timeout::ChildExt;

/// How long the measuring pass lets layout and web fonts settle.
const MEASURE_BUDGET_MS: u32 = 1000;

/// Taller windows make Chromium fail to allocate the screenshot surface.
const MAX_CAPTURE_HEIGHT: u32 = 32_000;

/// Time left for output readers after a timed-out process is killed.
const READER_GRACE: Duration = Duration::from_secs(1);

/// Captured output of a finished engine process.
#[derive(Debug, Clone, Default)]
pub struct EngineRun {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed waiting for render engine: {0}")]
    Wait(#[source] io::Error),

    #[error("render engine timed out after {0:?}")]
    Timeout(Duration),

    #[error("render engine exited with {}", describe_code(.code))]
    Exit {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("render engine produced no usable image at {path:?}: {detail}")]
    BadOutput { path: PathBuf, detail: String },
}

fn describe_code(code: &Option<i32>) -> String {
    match *code {
        Some(code) => format!("status {code}"),
        None => "no status (killed by signal)".to_string(),
    }
}

/// Rasterizes an HTML document on disk into an image file.
pub trait RenderEngine: Send + Sync {
    fn capture(&self, document: &Path, output: &Path) -> Result<EngineRun, EngineError>;
}

/// Chromium-family browser driven through its headless command line.
#[derive(Debug, Clone)]
pub struct HeadlessBrowser {
    program: String,
    width: u32,
    height: u32,
    timeout: Duration,
}

impl HeadlessBrowser {
    pub fn new(program: impl Into<String>, width: u32, height: u32, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            width,
            height,
            timeout,
        }
    }

    fn base_command(&self, height: u32) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg("--headless")
            .arg("--disable-gpu")
            .arg("--hide-scrollbars")
            .arg("--no-first-run")
            .arg(format!("--window-size={},{}", self.width, height));
        command
    }

    fn dump_dom_with_budget(&self, url: &str, budget_ms: u32) -> Result<String, EngineError> {
        let mut command = self.base_command(self.height);
        command
            .arg(format!("--virtual-time-budget={budget_ms}"))
            .arg("--dump-dom")
            .arg(url);
        let run = run_with_timeout(&self.program, command, self.timeout)?;
        Ok(run.stdout)
    }

    /// Loads `url`, lets scripts run, and returns the serialized DOM.
    pub fn dump_dom(&self, url: &str) -> Result<String, EngineError> {
        self.dump_dom_with_budget(url, 3000)
    }

    /// Window height that fits the whole laid-out document.
    ///
    /// The document records its own scroll height on the root element; the
    /// viewport height is the floor. A document that does not report a height
    /// is shot at the viewport height.
    fn full_page_height(&self, document: &Path) -> Result<u32, EngineError> {
        let dom = self.dump_dom_with_budget(&file_url(document), MEASURE_BUDGET_MS)?;
        let height = match reported_height(&dom) {
            Some(height) => height,
            None => {
                warn!("Document did not report its height, capturing {}px", self.height);
                return Ok(self.height);
            }
        };
        if height > MAX_CAPTURE_HEIGHT {
            warn!("Document is {height}px tall, clipping capture to {MAX_CAPTURE_HEIGHT}px");
        }
        Ok(height.max(self.height).min(MAX_CAPTURE_HEIGHT))
    }
}

fn reported_height(dom: &str) -> Option<u32> {
    let pattern = format!(r#"{}="(\d+)""#, regex::escape(PAGE_HEIGHT_ATTR));
    let re = Regex::new(&pattern).ok()?;
    re.captures(dom)?.get(1)?.as_str().parse().ok()
}

impl RenderEngine for HeadlessBrowser {
    /// Two passes: measure the laid-out height, then screenshot with a window
    /// that tall so the raster covers the full page.
    fn capture(&self, document: &Path, output: &Path) -> Result<EngineRun, EngineError> {
        let height = self.full_page_height(document)?;
        debug!("Capturing {document:?} at {}x{height}", self.width);
        let mut command = self.base_command(height);
        command
            .arg(format!("--screenshot={}", output.display()))
            .arg(file_url(document));
        run_with_timeout(&self.program, command, self.timeout)
    }
}

fn file_url(path: &Path) -> String {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    format!("file://{}", absolute.display())
}

/// Runs `command`, killing it once `timeout` elapses.
fn run_with_timeout(
    program: &str,
    mut command: Command,
    timeout: Duration,
) -> Result<EngineRun, EngineError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    own_process_group(&mut command);
    debug!("Running {command:?}");

    let mut child = command.spawn().map_err(|source| EngineError::Spawn {
        program: program.to_string(),
        source,
    })?;
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let status: ExitStatus = match child.wait_timeout(timeout).map_err(EngineError::Wait)? {
        Some(status) => status,
        None => {
            kill_tree(&mut child);
            let _ = child.wait();
            for (name, reader) in [("stdout", stdout), ("stderr", stderr)] {
                if let Some(reader) = reader {
                    if reader.recv_timeout(READER_GRACE).is_err() {
                        warn!("{program} {name} still open after kill, abandoning its reader");
                    }
                }
            }
            return Err(EngineError::Timeout(timeout));
        }
    };

    let run = EngineRun {
        stdout: collect(stdout),
        stderr: collect(stderr),
    };
    if status.success() {
        Ok(run)
    } else {
        Err(EngineError::Exit {
            code: status.code(),
            stdout: run.stdout,
            stderr: run.stderr,
        })
    }
}

/// Browser helpers inherit the pipes, so the whole group is killed on timeout.
#[cfg(unix)]
fn own_process_group(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    command.process_group(0);
}

#[cfg(not(unix))]
fn own_process_group(_command: &mut Command) {}

#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    // The child leads its own group, so its pid is the group id.
    let result = unsafe { libc::killpg(child.id() as libc::pid_t, libc::SIGKILL) };
    if result != 0 {
        debug!("killpg failed: {}", io::Error::last_os_error());
    }
    let _ = child.kill();
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
    });
    rx
}

fn collect(reader: Option<Receiver<String>>) -> String {
    reader.and_then(|rx| rx.recv().ok()).unwrap_or_default()
}
