//! QEMU boot test runner
//!
//! Boots the packed archive under the configured emulator, captures the
//! combined output, and passes iff some output line equals the flag token.
//! The elapsed boot time is read from the kernel line that reports a clean
//! exit code; a missing marker downgrades to a warning.

use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use initforge_config::ConfigStore;

use crate::error::{EmuError, Result};

const DEFAULT_TIMEOUT_SECS: u64 = 60;
const CLEAN_EXIT_MARKER: &str = "exitcode=0x00000000";

/// A fully resolved emulator invocation.
#[derive(Debug, Clone)]
pub struct TestRunner {
    pub program: String,
    pub memory: String,
    pub cpu: Option<String>,
    pub kernel: String,
    pub initrd: String,
    pub rootfs: Option<String>,
    pub cmdline: Option<String>,
    pub bool_args: Vec<String>,
    pub flag: String,
    pub timeout: Duration,
}

/// Outcome of a passing boot test.
#[derive(Debug)]
pub struct TestReport {
    pub passed: bool,
    /// Seconds from power-on to clean exit, when the kernel reported it.
    pub elapsed: Option<f64>,
    pub output: String,
}

impl TestRunner {
    /// Resolve a runner from the store's `test_*` keys.
    pub fn from_store(store: &ConfigStore) -> Result<Self> {
        let arch = store.get_str("test_arch").unwrap_or("x86_64");
        let kernel = store
            .get_str("test_kernel")
            .ok_or(EmuError::MissingConfig("test_kernel"))?;
        let flag = store
            .get_str("test_flag")
            .ok_or(EmuError::MissingConfig("test_flag"))?;
        let out_dir = store
            .get_path("out_dir")
            .ok_or(EmuError::MissingConfig("out_dir"))?;
        let out_file = store
            .get_str("out_file")
            .ok_or(EmuError::MissingConfig("out_file"))?;

        let bool_args = store
            .get_list("qemu_bool_args")
            .iter()
            .filter_map(toml::Value::as_str)
            .map(String::from)
            .collect();

        Ok(Self {
            program: format!("qemu-system-{arch}"),
            memory: store.get_str("test_memory").unwrap_or("256M").to_string(),
            cpu: store.get_str("test_cpu").map(String::from),
            kernel: kernel.to_string(),
            initrd: out_dir.join(out_file).to_string_lossy().into_owned(),
            rootfs: store.get_str("test_rootfs").map(String::from),
            cmdline: store.get_str("test_cmdline").map(String::from),
            bool_args,
            flag: flag.to_string(),
            timeout: Duration::from_secs(
                store
                    .get_int("test_timeout")
                    .filter(|secs| *secs > 0)
                    .map(|secs| secs as u64)
                    .unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
        })
    }

    /// The emulator argument list, in a stable order.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec!["-m".to_string(), self.memory.clone()];
        if let Some(cpu) = &self.cpu {
            args.push("-cpu".to_string());
            args.push(cpu.clone());
        }
        args.push("-kernel".to_string());
        args.push(self.kernel.clone());
        args.push("-initrd".to_string());
        args.push(self.initrd.clone());
        if let Some(rootfs) = &self.rootfs {
            args.push("-drive".to_string());
            args.push(format!("file={rootfs},format=raw"));
        }
        if let Some(cmdline) = &self.cmdline {
            args.push("-append".to_string());
            args.push(cmdline.clone());
        }
        for flag in &self.bool_args {
            args.push(format!("-{flag}"));
        }
        args
    }

    /// Boot the image and evaluate the output.
    ///
    /// A timeout kills the emulator and fails the test outright; there is
    /// no retry.
    pub fn run(&self) -> Result<TestReport> {
        let args = self.build_args();
        tracing::info!("Running boot test: {} {}", self.program, args.join(" "));

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| EmuError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let out_reader = thread::spawn(move || drain(stdout));
        let err_reader = thread::spawn(move || drain(stderr));

        let deadline = Instant::now() + self.timeout;
        loop {
            if child.try_wait()?.is_some() {
                break;
            }
            if Instant::now() >= deadline {
                tracing::error!("Boot test timed out, killing emulator");
                child.kill()?;
                child.wait()?;
                return Err(EmuError::Timeout(self.timeout.as_secs()));
            }
            thread::sleep(Duration::from_millis(50));
        }

        let mut output = out_reader.join().unwrap_or_default();
        output.push_str(&err_reader.join().unwrap_or_default());
        self.evaluate(output)
    }

    fn evaluate(&self, output: String) -> Result<TestReport> {
        let lines: Vec<&str> = output.split(['\r', '\n']).collect();

        if !lines.iter().any(|line| line.trim() == self.flag) {
            tracing::error!("Flag '{}' not found in test output", self.flag);
            return Err(EmuError::FlagNotFound(self.flag.clone()));
        }

        let elapsed = extract_elapsed(&lines);
        match elapsed {
            Some(seconds) => tracing::info!("Test passed in {:.3}s", seconds),
            None => tracing::warn!("No elapsed-time marker in test output"),
        }

        Ok(TestReport {
            passed: true,
            elapsed,
            output,
        })
    }
}

fn drain(pipe: Option<impl Read>) -> String {
    let mut buffer = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buffer);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Pull the boot time out of the kernel's clean-exit line.
///
/// The kernel timestamps the line as `[ <seconds>] ... exitcode=0x00000000`.
fn extract_elapsed(lines: &[&str]) -> Option<f64> {
    let line = lines
        .iter()
        .find(|line| line.trim_end().ends_with(CLEAN_EXIT_MARKER))?;
    let stamp = line.split(']').next()?.trim_start_matches('[').trim();
    stamp.parse().ok()
}
