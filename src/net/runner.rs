use std::future::Future;
use std::time::Duration;

use log::{debug, warn};
use tokio::process::Command;
use tokio::time::timeout;

/// Exit status and combined stdout+stderr of one external command. The exit
/// code and the output text are the only signals the tool gives us.
#[derive(Debug, Clone)]
pub struct CmdOutput {
    pub success: bool,
    pub text: String,
}

#[derive(Debug)]
pub enum CmdError {
    /// The command did not finish within its budget
    Timeout,
    /// The command could not be spawned or its output not collected
    Io(std::io::Error),
}

impl std::fmt::Display for CmdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CmdError::Timeout => write!(f, "command timed out"),
            CmdError::Io(e) => write!(f, "command failed: {}", e),
        }
    }
}

impl std::error::Error for CmdError {}

/// Seam between the network controller and the external tool. Commands are
/// argument vectors, never shell strings, so SSIDs and other user-influenced
/// values are passed through untouched.
pub trait CommandRunner: Send + Sync {
    fn run(
        &self,
        program: &str,
        args: &[&str],
        budget: Duration,
    ) -> impl Future<Output = Result<CmdOutput, CmdError>> + Send;
}

/// Real runner. The child is killed if its budget elapses, leaving the
/// interface in an indeterminate state until the next disconnect or scan.
pub struct NmcliRunner;

impl CommandRunner for NmcliRunner {
    async fn run(
        &self,
        program: &str,
        args: &[&str],
        budget: Duration,
    ) -> Result<CmdOutput, CmdError> {
        debug!("running {} {:?}", program, args);

        let output = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output();

        match timeout(budget, output).await {
            Err(_) => {
                warn!("{} {:?} exceeded its {:?} budget", program, args, budget);
                Err(CmdError::Timeout)
            }
            Ok(Err(e)) => Err(CmdError::Io(e)),
            Ok(Ok(output)) => {
                let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                text.push_str(&String::from_utf8_lossy(&output.stderr));
                Ok(CmdOutput {
                    success: output.status.success(),
                    text,
                })
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted runner: pops one pre-loaded response per call and records
    /// every command line it was asked to run.
    pub(crate) struct FakeRunner {
        responses: Mutex<VecDeque<Result<CmdOutput, CmdError>>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeRunner {
        pub(crate) fn new() -> Self {
            FakeRunner {
                responses: Mutex::new(VecDeque::new()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn push_ok(&self, text: &str) {
            self.responses.lock().unwrap().push_back(Ok(CmdOutput {
                success: true,
                text: text.to_string(),
            }));
        }

        pub(crate) fn push_failure(&self, text: &str) {
            self.responses.lock().unwrap().push_back(Ok(CmdOutput {
                success: false,
                text: text.to_string(),
            }));
        }

        pub(crate) fn push_timeout(&self) {
            self.responses
                .lock()
                .unwrap()
                .push_back(Err(CmdError::Timeout));
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CommandRunner for FakeRunner {
        async fn run(
            &self,
            program: &str,
            args: &[&str],
            _budget: Duration,
        ) -> Result<CmdOutput, CmdError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{} {}", program, args.join(" ")));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| panic!("unexpected command: {} {:?}", program, args))
        }
    }
}
