use std::io::Write;
use std::path::Path;
use std::process::{Child, Stdio};

use paxos::Role;

/// Running node process, killed when dropped.
pub struct Server(Child);

impl Server {
    pub fn new(
        path: &Path,
        config: &Path,
        role: Role,
        id: usize,
        verbose: u8,
    ) -> std::io::Result<Self> {
        let mut command = std::process::Command::new(path);
        if verbose > 0 {
            let verbosity = "-".to_string() + &"v".repeat(verbose as usize);
            command.arg(&verbosity);
        }
        if role == Role::Clients {
            command.stdin(Stdio::piped());
        }
        command.arg("--config")
            .arg(config)
            .arg(role.to_string())
            .arg(id.to_string())
            .spawn()
            .map(Server)
    }

    /// Writes one line to the node's standard input.
    pub fn send(&mut self, line: &str) -> std::io::Result<()> {
        match self.0.stdin.as_mut() {
        | Some(stdin) => writeln!(stdin, "{}", line),
        | None => Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "node has no standard input")),
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.0.kill().ok();
        self.0.wait().ok();
    }
}
