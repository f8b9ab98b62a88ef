use std::collections::HashMap as Map;

use structopt::StructOpt;

mod command;
mod server;

use crate::command::{Command, Execution};
use crate::server::Server;

#[derive(StructOpt)]
#[structopt(name = "harness")]
struct Opt {
    /// Path to the paxos-node binary
    #[structopt(short = "n", long = "node", parse(from_os_str))]
    node: std::path::PathBuf,

    /// Membership file handed to every node
    #[structopt(short = "c", long = "config", parse(from_os_str))]
    config: std::path::PathBuf,

    /// Scenario to replay
    #[structopt(short = "f", long = "file", parse(from_os_str))]
    file: std::path::PathBuf,

    /// Logging verbosity forwarded to every node
    #[structopt(short = "v", parse(from_occurrences))]
    verbose: u8,
}

fn run(opt: Opt) -> Result<(), Box<dyn std::error::Error>> {
    let file = std::fs::File::open(&opt.file)?;
    let execution: Execution = serde_json::from_reader(file)?;

    // Running nodes
    let mut servers: Map<(paxos::Role, usize), Server> = Map::default();

    for command in execution.0 {
        eprintln!("Executing command {:?}", command);
        match command {
        | Command::Start { role, id } => {
            let server = Server::new(&opt.node, &opt.config, role, id, opt.verbose)?;
            if let Some(previous) = servers.insert((role, id), server) {
                eprintln!("Replaced running {} {}", role, id);
                drop(previous);
            }
        }
        | Command::Propose { id, value } => {
            match servers.get_mut(&(paxos::Role::Clients, id)) {
            | Some(client) => client.send(&value)?,
            | None => eprintln!("No running client {}", id),
            }
        }
        | Command::Crash { role, id } => {
            if servers.remove(&(role, id)).is_none() {
                eprintln!("No running {} {}", role, id);
            }
        }
        | Command::Sleep { ms } => {
            std::thread::sleep(std::time::Duration::from_millis(ms))
        }
        }
    }
    Ok(())
}

fn main() {
    let opt = Opt::from_args();
    if let Err(error) = run(opt) {
        eprintln!("[ERROR]: {}", error);
        std::process::exit(1);
    }
}
