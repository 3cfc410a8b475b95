//! Heredoc templates for shell scripting
//!
//! Every wrapper produces a script meant to be fed as stdin to a shell on the
//! target. Nested wrappers derive their terminator from the parent tag so the
//! outer heredoc never closes on an inner terminator line.
//!
//! ```text
//! vzctl exec2 <ctid> bash << \_EOF_VZ
//! su - root -c bash << \_EOF_ENV
//! <raw commands>
//! _EOF_ENV
//! _EOF_VZ
//! ```

/// Default terminator tag
pub const DEFAULT_TAG: &str = "_EOF";

/// Default container exec tool
pub const DEFAULT_VZCTL: &str = "vzctl";

/// Suffix for the login-environment layer
pub const ENV_SUFFIX: &str = "_ENV";

/// Suffix for the container-exec layer
pub const VZ_SUFFIX: &str = "_VZ";

/// Suffix for the plain bash layer
pub const BASH_SUFFIX: &str = "_BASH";

const ENV_PREFIX: &str = "su - root -c bash";

/// Build a complete heredoc script: `<prefix> << \<tag>`, the body, then `<tag>`.
///
/// The backslash keeps the invoking shell from expanding anything in `body`.
#[must_use]
pub fn heredoc(prefix: &str, tag: &str, body: &str) -> String {
    let mut script = layer(prefix, tag, body);
    script.push('\n');
    script
}

// Nested layers omit the final newline; the enclosing layer supplies it.
fn layer(prefix: &str, tag: &str, body: &str) -> String {
    format!("{prefix} << \\{tag}\n{body}\n{tag}")
}

/// Derive a nested terminator from its parent
#[must_use]
pub fn derive_tag(parent: &str, suffix: &str) -> String {
    format!("{parent}{suffix}")
}

/// Wrap commands in a login shell as root so profile files get sourced
#[must_use]
pub fn wrap_in_env(commands: &str, tag: &str) -> String {
    heredoc(ENV_PREFIX, tag, commands)
}

/// Wrap commands in a plain `bash` heredoc
#[must_use]
pub fn wrap_in_bash(commands: &str, tag: &str) -> String {
    heredoc("bash", tag, commands)
}

/// Wrap commands in `bash`, with the login environment set up inside it
#[must_use]
pub fn wrap_in_bash_env(commands: &str, tag: &str) -> String {
    let inner = layer(ENV_PREFIX, &derive_tag(tag, ENV_SUFFIX), commands);
    heredoc("bash", &derive_tag(tag, BASH_SUFFIX), &inner)
}

/// Wrap commands in a container exec call that also sets the env up
///
/// The outer layer is tagged `<tag>_VZ` and the inner env layer `<tag>_ENV`.
#[must_use]
pub fn wrap_in_vz(commands: &str, ctid: u32, tag: &str) -> String {
    wrap_in_vz_with(DEFAULT_VZCTL, commands, ctid, tag)
}

/// Same as [`wrap_in_vz`] with an explicit exec tool
#[must_use]
pub fn wrap_in_vz_with(vzctl: &str, commands: &str, ctid: u32, tag: &str) -> String {
    let inner = layer(ENV_PREFIX, &derive_tag(tag, ENV_SUFFIX), commands);
    let prefix = format!("{vzctl} exec2 {ctid} bash");
    heredoc(&prefix, &derive_tag(tag, VZ_SUFFIX), &inner)
}

/// Return the first terminator in `tags` that appears as a whole line of
/// `commands`, if any.
///
/// Wrapping such commands would close the heredoc early and truncate the
/// script.
#[must_use]
pub fn check_tag<'a>(commands: &str, tags: &[&'a str]) -> Option<&'a str> {
    tags.iter()
        .copied()
        .find(|tag| commands.lines().any(|line| line == *tag))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Strip one heredoc layer, returning the header line and the body
    fn unwrap_heredoc(script: &str) -> Option<(&str, &str)> {
        let script = script.strip_suffix('\n').unwrap_or(script);
        let (header, rest) = script.split_once('\n')?;
        let (_, tag) = header.rsplit_once(" << \\")?;
        let body = rest.strip_suffix(tag)?.strip_suffix('\n')?;
        Some((header, body))
    }

    #[test]
    fn test_wrap_in_env_format() {
        let script = wrap_in_env("echo $HOME", "_EOF");
        assert_eq!(script, "su - root -c bash << \\_EOF\necho $HOME\n_EOF\n");
    }

    #[test]
    fn test_wrap_in_vz_format() {
        let script = wrap_in_vz("hostname", 101, DEFAULT_TAG);
        assert_eq!(
            script,
            "vzctl exec2 101 bash << \\_EOF_VZ\n\
             su - root -c bash << \\_EOF_ENV\n\
             hostname\n\
             _EOF_ENV\n\
             _EOF_VZ\n"
        );
    }

    #[test]
    fn test_wrap_in_bash_env_uses_distinct_tags() {
        let script = wrap_in_bash_env("id", "T");
        let (outer, body) = unwrap_heredoc(&script).unwrap();
        assert_eq!(outer, "bash << \\T_BASH");
        let (inner, commands) = unwrap_heredoc(body).unwrap();
        assert_eq!(inner, "su - root -c bash << \\T_ENV");
        assert_eq!(commands, "id");
    }

    #[test]
    fn test_nesting_three_levels() {
        let level1 = wrap_in_env("uptime", &derive_tag("X", ENV_SUFFIX));
        let level2 = wrap_in_bash(&level1, &derive_tag("X", BASH_SUFFIX));
        let level3 = heredoc("ssh h", &derive_tag("X", VZ_SUFFIX), &level2);

        let (_, b2) = unwrap_heredoc(&level3).unwrap();
        let (_, b1) = unwrap_heredoc(b2).unwrap();
        let (_, commands) = unwrap_heredoc(b1).unwrap();
        assert_eq!(commands, "uptime");
    }

    #[test]
    fn test_check_tag() {
        let tags = ["_EOF_VZ", "_EOF_ENV"];
        assert_eq!(check_tag("echo _EOF_ENV", &tags), None);
        assert_eq!(check_tag("echo a\n_EOF_ENV\necho b", &tags), Some("_EOF_ENV"));
        assert_eq!(check_tag("", &tags), None);
    }

    proptest! {
        #[test]
        fn prop_wrap_in_vz_round_trips(
            commands in "[a-z0-9 ;|&$'\"\\\\\n]{0,80}",
            ctid in 100u32..100_000,
        ) {
            let script = wrap_in_vz(&commands, ctid, DEFAULT_TAG);
            let (outer, body) = unwrap_heredoc(&script).unwrap();
            prop_assert_eq!(outer, format!("vzctl exec2 {ctid} bash << \\_EOF_VZ"));
            let (inner, stripped) = unwrap_heredoc(body).unwrap();
            prop_assert_eq!(inner, "su - root -c bash << \\_EOF_ENV");
            prop_assert_eq!(stripped, commands.as_str());
        }

        #[test]
        fn prop_terminators_open_and_close_once(
            commands in "[a-z0-9 ;\n]{0,80}",
            tag in "[A-Z][A-Z_]{0,8}",
        ) {
            let script = wrap_in_vz(&commands, 42, &tag);
            let vz_tag = derive_tag(&tag, VZ_SUFFIX);
            let env_tag = derive_tag(&tag, ENV_SUFFIX);
            prop_assert_ne!(&vz_tag, &env_tag);

            for t in [&vz_tag, &env_tag] {
                let opener = format!("<< \\{t}");
                let opens = script.lines().filter(|l| l.ends_with(&opener)).count();
                let closes = script.lines().filter(|l| *l == t.as_str()).count();
                prop_assert_eq!(opens, 1);
                prop_assert_eq!(closes, 1);
            }
        }
    }
}
