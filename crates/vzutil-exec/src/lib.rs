//! vzutil-exec: uniform runners for local, container and remote targets
//!
//! One [`Runner`] trait with four implementations: the local machine, an
//! OpenVZ container on this host, a remote host over SSH, and a container on
//! a remote host (composed from the SSH runner).

pub mod error;
pub mod keys;
pub mod local;
pub mod process;
pub mod result;
pub mod ssh;
pub mod ssh_vz;
pub mod target;
pub mod templates;
pub mod traits;
pub mod vz;

pub use error::{ExecError, RunnerError};
pub use keys::{KeyError, KeySource};
pub use local::LocalRunner;
pub use process::Invocation;
pub use result::{CommandResult, Verbosity};
pub use ssh::{SshRunner, SshRunnerBuilder, Transport};
pub use ssh_vz::SshVzRunner;
pub use target::{RemoteHost, Target};
pub use traits::Runner;
pub use vz::VzRunner;
