use serde::{Deserialize, Serialize};

/// A command prefix that runs without asking.
///
/// `command` is split with POSIX quoting rules and matched as a prefix of the
/// proposed argument vector; the program name must match literally, so a
/// local `./ls` never inherits the rule for `ls`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeRule {
    pub command: String,
    /// Arguments that disqualify the match (`find -delete`, `git branch -D`).
    /// A `--long` entry also rejects its `--long=value` form.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deny_args: Vec<String>,
    /// Require the whole argument vector to equal `command`, not just start with it.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub exact: bool,
}

/// A command prefix that always requires confirmation, with the reason shown
/// to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskyRule {
    pub command: String,
    pub reason: String,
}

impl SafeRule {
    fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            deny_args: Vec::new(),
            exact: false,
        }
    }

    fn denying(command: &str, deny_args: &[&str]) -> Self {
        Self {
            deny_args: deny_args.iter().map(ToString::to_string).collect(),
            ..Self::new(command)
        }
    }

    fn exact(command: &str) -> Self {
        Self {
            exact: true,
            ..Self::new(command)
        }
    }
}

impl RiskyRule {
    fn new(command: &str, reason: &str) -> Self {
        Self {
            command: command.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub fn default_safe_rules() -> Vec<SafeRule> {
    let git_output = &["--output", "--ext-diff"];
    vec![
        SafeRule::new("ls"),
        SafeRule::new("cat"),
        SafeRule::new("head"),
        SafeRule::new("tail"),
        SafeRule::new("grep"),
        SafeRule::denying(
            "find",
            &[
                "-delete", "-exec", "-execdir", "-ok", "-okdir", "-fprint", "-fprint0",
                "-fprintf", "-fls",
            ],
        ),
        SafeRule::new("pwd"),
        SafeRule::new("echo"),
        SafeRule::new("wc"),
        SafeRule::new("which"),
        SafeRule::new("whoami"),
        SafeRule::new("date"),
        SafeRule::new("git status"),
        SafeRule::denying("git log", git_output),
        SafeRule::denying("git diff", git_output),
        SafeRule::denying("git show", git_output),
        SafeRule::denying(
            "git branch",
            &["-d", "-D", "-m", "-M", "-c", "-C", "-f", "--delete", "--move", "--copy", "--force"],
        ),
        SafeRule::exact("python --version"),
        SafeRule::exact("python3 --version"),
        SafeRule::exact("node --version"),
        SafeRule::exact("npm --version"),
        SafeRule::exact("cargo --version"),
        SafeRule::exact("rustc --version"),
    ]
}

pub fn default_risky_rules() -> Vec<RiskyRule> {
    vec![
        RiskyRule::new("rm", "deletes files"),
        RiskyRule::new("rmdir", "deletes directories"),
        RiskyRule::new("mv", "moves or renames files"),
        RiskyRule::new("chmod", "changes file permissions"),
        RiskyRule::new("chown", "changes file ownership"),
        RiskyRule::new("curl", "performs network requests"),
        RiskyRule::new("wget", "downloads from the network"),
        RiskyRule::new("docker", "controls containers"),
        RiskyRule::new("kubectl", "controls a cluster"),
        RiskyRule::new("sudo", "runs with elevated privileges"),
        RiskyRule::new("git push", "publishes commits to a remote"),
        RiskyRule::new("git reset", "can discard commits and changes"),
        RiskyRule::new("git clean", "deletes untracked files"),
        RiskyRule::new("npm install", "installs packages"),
        RiskyRule::new("pip install", "installs packages"),
        RiskyRule::new("pip3 install", "installs packages"),
        RiskyRule::new("brew install", "installs packages"),
        RiskyRule::new("apt install", "installs system packages"),
        RiskyRule::new("apt-get install", "installs system packages"),
        RiskyRule::new("yum install", "installs system packages"),
        RiskyRule::new("dnf install", "installs system packages"),
        RiskyRule::new("cargo install", "installs crates"),
        RiskyRule::new("gem install", "installs gems"),
    ]
}

#[derive(Debug, Clone)]
struct CompiledSafe {
    argv: Vec<String>,
    deny_args: Vec<String>,
    exact: bool,
}

#[derive(Debug, Clone)]
struct CompiledRisky {
    argv: Vec<String>,
    reason: String,
}

/// Safe and risky rule tables, tokenized once at construction.
#[derive(Debug, Clone)]
pub struct CommandRules {
    safe: Vec<CompiledSafe>,
    risky: Vec<CompiledRisky>,
}

impl Default for CommandRules {
    fn default() -> Self {
        Self::new(&default_safe_rules(), &default_risky_rules())
    }
}

impl CommandRules {
    /// Rules whose command is empty never match and are dropped.
    pub fn new(safe: &[SafeRule], risky: &[RiskyRule]) -> Self {
        Self {
            safe: safe
                .iter()
                .filter_map(|rule| {
                    let argv = tokenize_rule(&rule.command)?;
                    Some(CompiledSafe {
                        argv,
                        deny_args: rule.deny_args.clone(),
                        exact: rule.exact,
                    })
                })
                .collect(),
            risky: risky
                .iter()
                .filter_map(|rule| {
                    Some(CompiledRisky {
                        argv: tokenize_rule(&rule.command)?,
                        reason: rule.reason.clone(),
                    })
                })
                .collect(),
        }
    }

    pub fn is_safe(&self, argv: &[String]) -> bool {
        self.safe.iter().any(|rule| {
            let prefix_ok = if rule.exact {
                argv == rule.argv.as_slice()
            } else {
                argv.starts_with(&rule.argv)
            };
            prefix_ok
                && !argv[rule.argv.len()..]
                    .iter()
                    .any(|arg| is_denied_arg(arg, &rule.deny_args))
        })
    }

    /// Reason of the first risky rule matching `argv`. The program is compared
    /// by basename so `/usr/bin/rm` is as risky as `rm`.
    pub fn risky_reason(&self, argv: &[String]) -> Option<&str> {
        let (program, rest) = argv.split_first()?;
        let program = program_basename(program);
        self.risky
            .iter()
            .find(|rule| {
                rule.argv.first().is_some_and(|p| p == program)
                    && rest.starts_with(&rule.argv[1..])
            })
            .map(|rule| rule.reason.as_str())
    }
}

fn tokenize_rule(command: &str) -> Option<Vec<String>> {
    let argv = shlex::split(command)
        .unwrap_or_else(|| command.split_whitespace().map(ToString::to_string).collect());
    (!argv.is_empty()).then_some(argv)
}

fn is_denied_arg(arg: &str, deny_args: &[String]) -> bool {
    deny_args.iter().any(|deny| {
        arg == deny
            || (deny.starts_with("--")
                && arg
                    .strip_prefix(deny.as_str())
                    .is_some_and(|rest| rest.starts_with('=')))
    })
}

pub(crate) fn program_basename(program: &str) -> &str {
    program.rsplit('/').next().unwrap_or(program)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(line: &str) -> Vec<String> {
        shlex::split(line).expect("test command parses")
    }

    #[test]
    fn safe_rules_match_by_prefix() {
        let rules = CommandRules::default();
        assert!(rules.is_safe(&argv("ls -la")));
        assert!(rules.is_safe(&argv("git status --short")));
        assert!(!rules.is_safe(&argv("git push")));
        assert!(!rules.is_safe(&argv("./ls")));
    }

    #[test]
    fn deny_args_disqualify_safe_match() {
        let rules = CommandRules::default();
        assert!(rules.is_safe(&argv("find . -name '*.rs'")));
        assert!(!rules.is_safe(&argv("find . -delete")));
        for writer in ["-fprint", "-fprint0", "-fprintf", "-fls"] {
            assert!(
                !rules.is_safe(&argv(&format!("find . {writer} /tmp/listing"))),
                "{writer} writes a file"
            );
        }
        assert!(!rules.is_safe(&argv("git branch -D main")));
        assert!(!rules.is_safe(&argv("git log --output=/tmp/leak")));
        assert!(rules.is_safe(&argv("git branch --list")));
    }

    #[test]
    fn exact_rules_reject_trailing_arguments() {
        let rules = CommandRules::default();
        assert!(rules.is_safe(&argv("python --version")));
        assert!(!rules.is_safe(&argv("python --version -c 'print(1)'")));
    }

    #[test]
    fn risky_rules_compare_program_basename() {
        let rules = CommandRules::default();
        assert_eq!(rules.risky_reason(&argv("/bin/rm file")), Some("deletes files"));
        assert_eq!(
            rules.risky_reason(&argv("git push --force origin main")),
            Some("publishes commits to a remote")
        );
        assert_eq!(rules.risky_reason(&argv("git status")), None);
    }

    #[test]
    fn custom_tables_replace_defaults() {
        let rules = CommandRules::new(
            &[SafeRule {
                command: "make test".into(),
                deny_args: Vec::new(),
                exact: false,
            }],
            &[RiskyRule {
                command: "make deploy".into(),
                reason: "ships to production".into(),
            }],
        );
        assert!(rules.is_safe(&argv("make test -j4")));
        assert!(!rules.is_safe(&argv("ls")));
        assert_eq!(
            rules.risky_reason(&argv("make deploy")),
            Some("ships to production")
        );
    }

    #[test]
    fn empty_rule_commands_are_ignored() {
        let rules = CommandRules::new(
            &[SafeRule {
                command: "   ".into(),
                deny_args: Vec::new(),
                exact: false,
            }],
            &[],
        );
        assert!(!rules.is_safe(&argv("anything")));
    }
}
