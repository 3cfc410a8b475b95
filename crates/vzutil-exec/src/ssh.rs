//! Remote execution through the `ssh`, `scp` and `rsync` binaries

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::error::ExecError;
use crate::keys::{KeySource, ResolvedKey};
use crate::local;
use crate::process::Invocation;
use crate::result::{CommandResult, Verbosity};
use crate::traits::Runner;

pub const DEFAULT_USER: &str = "root";
pub const DEFAULT_PORT: u16 = 22;

/// Forces a pseudo-terminal on `ssh`; `scp` would read it as its internal
/// "to" mode, so it never goes into the copy options.
pub const FORCE_TTY: &str = "-t";

/// Which transport [`SshRunner::transport_command`] should describe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Ssh,
    Scp,
}

impl FromStr for Transport {
    type Err = ExecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ssh" => Ok(Transport::Ssh),
            "scp" => Ok(Transport::Scp),
            other => Err(ExecError::InvalidArgument(format!(
                "transport should be either \"ssh\" or \"scp\", got {other:?}"
            ))),
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Ssh => f.write_str("ssh"),
            Transport::Scp => f.write_str("scp"),
        }
    }
}

/// Runner for a remote host
///
/// Option lists are derived once at construction from the port, identity and
/// caller-supplied extras, and never change afterwards.
#[derive(Debug)]
pub struct SshRunner {
    host: String,
    user: String,
    port: u16,
    /// `ssh` options for run and interactive, always with [`FORCE_TTY`]
    ssh_options: Vec<String>,
    /// `scp` options, never with [`FORCE_TTY`]
    scp_options: Vec<String>,
    /// Remote shell handed to `rsync -e`
    rsync_shell: String,
    /// Held so a temp identity file outlives every call
    key: ResolvedKey,
}

impl SshRunner {
    /// Runner for `root@host:22` with no extra options, authenticating via
    /// the agent or `~/.ssh/config`
    pub fn new(host: impl Into<String>) -> Self {
        Self::from_parts(
            host.into(),
            DEFAULT_USER.to_string(),
            DEFAULT_PORT,
            &[],
            ResolvedKey::Agent,
        )
    }

    /// Start building a runner with custom user, port, options or identity
    pub fn builder(host: impl Into<String>) -> SshRunnerBuilder {
        SshRunnerBuilder::new(host)
    }

    fn from_parts(
        host: String,
        user: String,
        port: u16,
        extra: &[String],
        key: ResolvedKey,
    ) -> Self {
        // Extras are copied; the caller's list is never touched.
        let extra: Vec<String> = extra
            .iter()
            .filter(|opt| opt.as_str() != FORCE_TTY)
            .cloned()
            .collect();
        let identity = key.options();

        let mut shared = identity;
        shared.extend(extra);

        let mut ssh_options = vec!["-p".to_string(), port.to_string()];
        ssh_options.extend(shared.iter().cloned());
        // rsync splits `-e` on spaces and honours quotes
        let rsync_shell =
            shell_words::join(std::iter::once("ssh").chain(ssh_options.iter().map(String::as_str)));
        ssh_options.push(FORCE_TTY.to_string());

        let mut scp_options = vec!["-P".to_string(), port.to_string()];
        scp_options.extend(shared);

        debug!(host = %host, user = %user, port, "created ssh runner");

        Self {
            host,
            user,
            port,
            ssh_options,
            scp_options,
            rsync_shell,
            key,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Identity file passed with `-i`, if any
    pub fn identity(&self) -> Option<&std::path::Path> {
        self.key.path()
    }

    pub fn ssh_options(&self) -> &[String] {
        &self.ssh_options
    }

    pub fn scp_options(&self) -> &[String] {
        &self.scp_options
    }

    /// `user@host`
    #[must_use]
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// `user@host:path`, as understood by `scp` and `rsync`
    #[must_use]
    pub fn remote_path(&self, path: &str) -> String {
        format!("{}:{path}", self.destination())
    }

    /// Command line of the given transport up to and including the destination,
    /// quoted for `sh`
    #[must_use]
    pub fn transport_command(&self, which: Transport) -> String {
        let options = match which {
            Transport::Ssh => &self.ssh_options,
            Transport::Scp => &self.scp_options,
        };
        let program = which.to_string();
        let destination = self.destination();
        shell_words::join(
            std::iter::once(&program)
                .chain(options)
                .chain(std::iter::once(&destination)),
        )
    }

    fn ssh(&self) -> Invocation {
        Invocation::new("ssh")
            .args(self.ssh_options.iter().cloned())
            .arg(self.destination())
    }

    fn scp(&self) -> Invocation {
        Invocation::new("scp")
            .args(self.scp_options.iter().cloned())
            .arg("-r")
    }

    fn rsync(&self) -> Invocation {
        local::rsync().arg("-e").arg(self.rsync_shell.clone())
    }
}

#[async_trait]
impl Runner for SshRunner {
    #[instrument(skip(self, commands), fields(host = %self.host), level = "debug")]
    async fn run(
        &self,
        commands: &str,
        verbosity: Verbosity,
    ) -> Result<CommandResult, ExecError> {
        self.ssh().execute(Some(commands), verbosity).await
    }

    #[instrument(skip(self), fields(host = %self.host), level = "debug")]
    async fn copy_from(
        &self,
        src: &str,
        dest: &str,
        verbosity: Verbosity,
    ) -> Result<CommandResult, ExecError> {
        self.scp()
            .arg(self.remote_path(src))
            .arg(dest)
            .execute(None, verbosity)
            .await
    }

    #[instrument(skip(self), fields(host = %self.host), level = "debug")]
    async fn copy_to(
        &self,
        src: &str,
        dest: &str,
        verbosity: Verbosity,
    ) -> Result<CommandResult, ExecError> {
        self.scp()
            .arg(src)
            .arg(self.remote_path(dest))
            .execute(None, verbosity)
            .await
    }

    #[instrument(skip(self), fields(host = %self.host), level = "debug")]
    async fn sync_from(
        &self,
        src: &str,
        dest: &str,
        verbosity: Verbosity,
    ) -> Result<CommandResult, ExecError> {
        self.rsync()
            .arg(self.remote_path(src))
            .arg(dest)
            .execute(None, verbosity)
            .await
    }

    #[instrument(skip(self), fields(host = %self.host), level = "debug")]
    async fn sync_to(
        &self,
        src: &str,
        dest: &str,
        verbosity: Verbosity,
    ) -> Result<CommandResult, ExecError> {
        self.rsync()
            .arg(src)
            .arg(self.remote_path(dest))
            .execute(None, verbosity)
            .await
    }

    fn describe_command(&self) -> String {
        self.transport_command(Transport::Ssh)
    }

    fn runner_type(&self) -> &'static str {
        "ssh"
    }
}

/// Builder for `SshRunner`
#[derive(Debug, Clone)]
pub struct SshRunnerBuilder {
    host: String,
    user: String,
    port: u16,
    options: Vec<String>,
    key_source: KeySource,
}

impl SshRunnerBuilder {
    /// Create builder with the default user and port
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: DEFAULT_USER.to_string(),
            port: DEFAULT_PORT,
            options: Vec::new(),
            key_source: KeySource::Agent,
        }
    }

    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Append extra options, e.g. `["-o", "StrictHostKeyChecking=no"]`
    #[must_use]
    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.extend(options.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_key_source(mut self, key_source: KeySource) -> Self {
        self.key_source = key_source;
        self
    }

    /// Build the runner
    ///
    /// # Errors
    /// Returns `ExecError::SshKeyError` if key resolution fails
    pub fn build(self) -> Result<SshRunner, ExecError> {
        let key = self.key_source.resolve()?;
        Ok(SshRunner::from_parts(
            self.host,
            self.user,
            self.port,
            &self.options,
            key,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_tty(options: &[String]) -> usize {
        options.iter().filter(|o| o.as_str() == FORCE_TTY).count()
    }

    #[test]
    fn test_defaults() {
        let runner = SshRunner::new("h");
        assert_eq!(runner.user(), "root");
        assert_eq!(runner.port(), 22);
        assert_eq!(runner.ssh_options(), ["-p", "22", "-t"]);
        assert_eq!(runner.scp_options(), ["-P", "22"]);
        assert!(runner.identity().is_none());
    }

    #[test]
    fn test_force_tty_exactly_once() {
        let runner = SshRunner::builder("h")
            .with_options(["-t", "-o", "StrictHostKeyChecking=no", "-t"])
            .build()
            .unwrap();

        assert_eq!(count_tty(runner.ssh_options()), 1);
        assert_eq!(count_tty(runner.scp_options()), 0);
        assert_eq!(
            runner.ssh_options(),
            ["-p", "22", "-o", "StrictHostKeyChecking=no", "-t"]
        );
        assert_eq!(
            runner.scp_options(),
            ["-P", "22", "-o", "StrictHostKeyChecking=no"]
        );
    }

    #[test]
    fn test_caller_options_not_mutated() {
        let options = vec!["-o".to_string(), "BatchMode=yes".to_string()];
        let a = SshRunner::builder("a").with_options(options.clone()).build().unwrap();
        let b = SshRunner::builder("b").with_options(options.clone()).build().unwrap();

        assert_eq!(options, ["-o", "BatchMode=yes"]);
        assert_eq!(a.ssh_options(), b.ssh_options());
        assert_eq!(count_tty(b.ssh_options()), 1);
    }

    #[test]
    fn test_custom_user_and_port() {
        let runner = SshRunner::builder("10.0.0.5")
            .with_user("deploy")
            .with_port(2222)
            .build()
            .unwrap();

        assert_eq!(runner.remote_path("/srv/app"), "deploy@10.0.0.5:/srv/app");
        assert_eq!(runner.describe_command(), "ssh -p 2222 -t deploy@10.0.0.5");
        assert_eq!(
            runner.transport_command(Transport::Scp),
            "scp -P 2222 deploy@10.0.0.5"
        );
    }

    #[test]
    fn test_rsync_shell_has_no_tty() {
        let runner = SshRunner::builder("h")
            .with_port(2200)
            .with_options(["-t", "-o", "BatchMode=yes"])
            .build()
            .unwrap();

        let argv = runner.rsync();
        assert_eq!(
            argv.arguments(),
            ["-aH".to_string(), "-e".to_string(), runner.rsync_shell.clone()]
        );
        assert_eq!(
            shell_words::split(&runner.rsync_shell).unwrap(),
            ["ssh", "-p", "2200", "-o", "BatchMode=yes"]
        );
    }

    #[test]
    fn test_option_with_spaces_stays_one_word() {
        let proxy = "ProxyCommand=ssh -W %h:%p jump";
        let runner = SshRunner::builder("h")
            .with_options(["-o", proxy])
            .build()
            .unwrap();

        assert_eq!(
            shell_words::split(&runner.describe_command()).unwrap(),
            ["ssh", "-p", "22", "-o", proxy, "-t", "root@h"]
        );
        assert_eq!(
            shell_words::split(&runner.transport_command(Transport::Scp)).unwrap(),
            ["scp", "-P", "22", "-o", proxy, "root@h"]
        );
        assert_eq!(
            shell_words::split(&runner.rsync_shell).unwrap(),
            ["ssh", "-p", "22", "-o", proxy]
        );
        assert_eq!(runner.ssh().arguments()[3], proxy);
    }

    #[test]
    fn test_invocations() {
        let runner = SshRunner::new("h");
        assert_eq!(runner.ssh().command_line(), "ssh -p 22 -t root@h");
        assert_eq!(runner.scp().command_line(), "scp -P 22 -r");
    }

    #[test]
    fn test_transport_parse() {
        assert_eq!("ssh".parse::<Transport>().unwrap(), Transport::Ssh);
        assert_eq!("scp".parse::<Transport>().unwrap(), Transport::Scp);

        let err = "rsync".parse::<Transport>().unwrap_err();
        assert!(matches!(err, ExecError::InvalidArgument(_)));
    }

    #[tokio::test]
    #[ignore = "requires SSH server"]
    async fn test_run_remote() {
        let runner = SshRunner::new("localhost");
        let result = runner.run("echo hello", Verbosity::Quiet).await.unwrap();
        assert_eq!(result.stdout.trim(), "hello");
    }
}
