//! vzutil CLI
//!
//! Run commands, copy files and open shells on local, container and remote
//! targets.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use color_eyre::Result;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use vzutil_exec::{
    CommandResult, ExecError, KeySource, RemoteHost, SshRunner, Target, Transport, Verbosity,
};

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "vzutil")]
#[command(
    about = "Run commands and move files on local, container and remote targets",
    long_about = None
)]
struct Cli {
    #[command(flatten)]
    target: TargetArgs,

    /// Capture transport output instead of streaming it
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file (defaults to $VZUTIL_CONFIG, ./vzutil.toml, ...)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct TargetArgs {
    /// Named target from the config file
    #[arg(short, long, global = true, conflicts_with = "host")]
    target: Option<String>,

    /// Remote host
    #[arg(long, global = true)]
    host: Option<String>,

    /// Remote user
    #[arg(long, global = true, requires = "host")]
    user: Option<String>,

    /// Remote SSH port
    #[arg(long, global = true, requires = "host")]
    port: Option<u16>,

    /// Extra ssh option, repeatable (e.g. `-o StrictHostKeyChecking=no` as two values)
    #[arg(long = "ssh-option", global = true, requires = "host", allow_hyphen_values = true)]
    ssh_options: Vec<String>,

    /// Private key for the remote host (defaults to ssh-agent)
    #[arg(short, long, global = true, requires = "host")]
    identity: Option<PathBuf>,

    /// Container id
    #[arg(long, global = true)]
    ctid: Option<u32>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a script on the target (read from stdin when omitted)
    Run {
        commands: Option<String>,
        /// Print the result or failure as JSON
        #[arg(long)]
        json: bool,
    },
    /// Copy from the target to the local machine
    CopyFrom { src: String, dest: String },
    /// Copy from the local machine to the target
    CopyTo { src: String, dest: String },
    /// Sync from the target to the local machine
    SyncFrom { src: String, dest: String },
    /// Sync from the local machine to the target
    SyncTo { src: String, dest: String },
    /// Open an interactive shell on the target
    Shell,
    /// Print the command that `shell` would run
    Cmd {
        /// Transport to describe for remote hosts (ssh or scp)
        #[arg(long)]
        which: Option<String>,
    },
}

impl TargetArgs {
    fn resolve(&self, config: &Config) -> Result<Target> {
        if let Some(name) = &self.target {
            return Ok(config.target(name)?.clone());
        }

        let target = match (&self.host, self.ctid) {
            (Some(host), ctid) => {
                let mut remote = RemoteHost::new(host);
                if let Some(user) = &self.user {
                    remote = remote.with_user(user);
                }
                if let Some(port) = self.port {
                    remote = remote.with_port(port);
                }
                remote.options.clone_from(&self.ssh_options);
                remote.ssh_key = self.identity.clone().map(KeySource::Path);
                match ctid {
                    Some(ctid) => Target::RemoteContainer {
                        remote,
                        ctid,
                        root: None,
                    },
                    None => Target::Remote(remote),
                }
            }
            (None, Some(ctid)) => Target::Container { ctid, root: None },
            (None, None) => Target::Local,
        };
        Ok(target)
    }
}

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    init_tracing(&config.log_level);

    let target = cli.target.resolve(&config)?;
    let verbosity = Verbosity::from(!(cli.quiet || config.quiet));
    debug!(?target, ?verbosity, "resolved target");

    let runner = target.runner()?;

    let (outcome, json) = match cli.command {
        Commands::Run { commands, json } => {
            let commands = match commands {
                Some(commands) => commands,
                None => {
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf)?;
                    buf
                }
            };
            (runner.run(&commands, verbosity).await, json)
        }
        Commands::CopyFrom { src, dest } => {
            (runner.copy_from(&src, &dest, verbosity).await, false)
        }
        Commands::CopyTo { src, dest } => (runner.copy_to(&src, &dest, verbosity).await, false),
        Commands::SyncFrom { src, dest } => {
            (runner.sync_from(&src, &dest, verbosity).await, false)
        }
        Commands::SyncTo { src, dest } => (runner.sync_to(&src, &dest, verbosity).await, false),
        Commands::Shell => {
            let status = runner.interactive().await?;
            return Ok(exit_code(status.code().unwrap_or(1)));
        }
        Commands::Cmd { which } => {
            let line = match which {
                Some(which) => describe_transport(&target, &which)?,
                None => runner.describe_command(),
            };
            println!("{line}");
            return Ok(ExitCode::SUCCESS);
        }
    };

    report(outcome, verbosity, json)
}

/// `ssh`/`scp` command line for a remote host target
fn describe_transport(target: &Target, which: &str) -> Result<String> {
    let which: Transport = which.parse()?;
    let Target::Remote(remote) = target else {
        eyre::bail!("--which only applies to remote host targets");
    };
    let ssh: SshRunner = remote.runner()?;
    Ok(ssh.transport_command(which))
}

/// Process exit code for a transport status, which may be negative or above 255
fn exit_code(status: i32) -> ExitCode {
    ExitCode::from(exit_status(status))
}

fn exit_status(status: i32) -> u8 {
    u8::try_from(status.clamp(0, 255)).unwrap_or(u8::MAX)
}

/// Print the outcome; a remote failure maps to its exit status
fn report(
    outcome: Result<CommandResult, ExecError>,
    verbosity: Verbosity,
    json: bool,
) -> Result<ExitCode> {
    match outcome {
        Ok(result) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else if !verbosity.is_verbose() {
                let mut stdout = std::io::stdout();
                stdout.write_all(result.stdout.as_bytes())?;
                stdout.flush()?;
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(ExecError::CommandFailed(failure)) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&failure)?);
            } else {
                if !verbosity.is_verbose() {
                    eprint!("{}", failure.stderr);
                }
                eprintln!("vzutil: {failure}");
            }
            Ok(exit_code(failure.status.clamp(1, 255)))
        }
        Err(local) => Err(local.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_status_range() {
        assert_eq!(exit_status(0), 0);
        assert_eq!(exit_status(7), 7);
        assert_eq!(exit_status(255), 255);
        assert_eq!(exit_status(-1), 0);
        assert_eq!(exit_status(300), 255);
    }

    #[test]
    fn test_identity_becomes_path_key() {
        let cli = Cli::parse_from(["vzutil", "--host", "h", "-i", "/keys/id", "cmd"]);
        let target = cli.target.resolve(&Config::default()).unwrap();

        let Target::Remote(remote) = target else {
            panic!("expected remote target");
        };
        assert_eq!(remote.ssh_key, Some(KeySource::Path("/keys/id".into())));
    }
}
