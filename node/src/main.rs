#[macro_use] extern crate log;

use std::time::Duration;

use log::LevelFilter;
use structopt::StructOpt;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(StructOpt)]
#[structopt(name = "paxos-node")]
struct Opt {
    /// Membership file
    #[structopt(short = "c", long = "config", parse(from_os_str))]
    config: std::path::PathBuf,

    /// One of clients, proposers, acceptors or learners
    role: paxos::Role,

    /// Unique ID within the role
    id: usize,

    /// Override the acceptor count given by the membership file
    #[structopt(short = "a", long = "acceptors")]
    acceptors: Option<usize>,

    /// Start as leader (defaults to true only for proposer 0)
    #[structopt(short = "l", long = "leader")]
    leader: Option<bool>,

    /// Period between leader heartbeats (in milliseconds)
    #[structopt(long = "heartbeat", default_value = "500")]
    heartbeat: u64,

    /// Heartbeat silence before a follower takes over (in milliseconds)
    #[structopt(long = "listener", default_value = "2000")]
    listener: u64,

    /// Timeout for sending a client value (in milliseconds)
    #[structopt(short = "t", long = "timeout", default_value = "100")]
    timeout: u64,

    /// Logging verbosity (-v info, -vv debug, -vvv trace)
    #[structopt(short = "v", parse(from_occurrences))]
    verbose: u8,
}

fn setup_logger(verbose: u8) -> Result<(), log::SetLoggerError> {
    let level = match verbose {
    | 0 => LevelFilter::Warn,
    | 1 => LevelFilter::Info,
    | 2 => LevelFilter::Debug,
    | _ => LevelFilter::Trace,
    };
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{:?}][{}][{}] {}",
                std::thread::current().id(),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr())
        .apply()
}

/// Proposes every non-empty line of standard input.
async fn propose(client: paxos::Client<String>) -> Result<(), paxos::Error> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let value = line.trim();
        if value.is_empty() {
            continue
        }
        if let Err(error) = client.propose(value.to_string()).await {
            warn!("failed to propose {:?}: {}", value, error);
        }
    }
    info!("standard input closed");
    Ok(())
}

async fn run(opt: Opt) -> Result<(), paxos::Error> {
    let network = paxos::Network::load(&opt.config)?;
    let mut config = paxos::Config::<String>::new(opt.id, network)
        .with_heartbeat(Duration::from_millis(opt.heartbeat), Duration::from_millis(opt.listener))
        .with_send_timeout(Duration::from_millis(opt.timeout));
    if let Some(acceptors) = opt.acceptors {
        config = config.with_acceptors(acceptors);
    }
    if let Some(leader) = opt.leader {
        config = config.with_leader(leader);
    }
    match opt.role {
    | paxos::Role::Clients => propose(config.client()?).await,
    | paxos::Role::Proposers => config.proposer().await,
    | paxos::Role::Acceptors => config.acceptor().await,
    | paxos::Role::Learners => config.learner(|_, value| println!("{}", value)).await,
    }
}

#[tokio::main]
async fn main() {
    let opt = Opt::from_args();
    if let Err(error) = setup_logger(opt.verbose) {
        eprintln!("[ERROR]: could not install logger: {}", error);
        std::process::exit(1);
    }
    if let Err(error) = run(opt).await {
        error!("{}", error);
        std::process::exit(1);
    }
}
