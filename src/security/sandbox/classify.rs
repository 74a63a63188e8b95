//! Pattern classification of command lines.
//!
//! This is a layered best-effort filter, not a shell parser: execution never
//! goes through a shell, so separators are scanned only to catch destructive
//! intent that a confused or hostile model spells out, never to decide what
//! actually runs.

use super::rules::{CommandRules, program_basename};
use crate::security::path::normalize_lexically;
use crate::security::verdict::{ActionVerdict, RiskLevel};
use directories::UserDirs;
use regex::Regex;
use std::borrow::Cow;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

/// Programs that run another command given as their trailing arguments.
const WRAPPERS: &[&str] = &[
    "sudo", "doas", "env", "nice", "nohup", "timeout", "xargs", "command", "exec", "time",
    "stdbuf",
];

/// Wrapper options that consume the following token as their value.
const WRAPPER_VALUE_FLAGS: &[&str] = &[
    "-u", "-g", "-U", "-C", "-h", "-p", "-r", "-t", "-n", "-s", "-k", "-I", "-L", "-P", "-d",
    "-E", "-a", "-i", "-o", "-e",
];

const SHELLS: &[&str] = &["sh", "bash", "zsh", "dash", "ksh", "fish"];

const SEPARATORS: &[&str] = &[";", "&&", "||", "|", "&", "|&", ";;"];

/// Programs whose first argument selects a distinct action for permission keys.
const MULTIPLEXERS: &[&str] = &[
    "git", "npm", "pnpm", "yarn", "cargo", "pip", "pip3", "brew", "apt", "apt-get", "yum", "dnf",
    "docker", "kubectl", "gem", "go",
];

const MULTIPLEXER_VALUE_FLAGS: &[&str] = &["-C", "-c", "--git-dir", "--work-tree", "--prefix"];

const FORMAT_TOOLS: &[&str] = &[
    "mkfs", "mke2fs", "mkswap", "wipefs", "fdisk", "sfdisk", "parted", "shred",
];

const POWER_TOOLS: &[&str] = &["shutdown", "reboot", "halt", "poweroff"];

/// Harmless device sinks a command may write to.
const DEVICE_SINKS: &[&str] = &["/dev/null", "/dev/stdout", "/dev/stderr", "/dev/tty"];

/// Programs that write to their final operand (`cp SRC DEST`).
const COPY_WRITERS: &[&str] = &["cp", "mv", "install", "rsync"];

/// Nesting limit for `sh -c` payloads.
const MAX_SHELL_DEPTH: u8 = 4;

static FUNCTION_DEF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Za-z0-9_:.]+)\(\)\{").expect("valid function definition regex")
});

/// `cwd` is where the command will run; relative operands of destructive
/// patterns are resolved against it, so `rm -rf .` in `/` is caught.
pub(super) fn classify(rules: &CommandRules, line: &str, cwd: Option<&Path>) -> ActionVerdict {
    if line.trim().is_empty() {
        return ActionVerdict::blocked("empty command line");
    }
    if is_fork_bomb(line) {
        return ActionVerdict::blocked("destructive command: shell fork bomb");
    }
    let Some(argv) = shlex::split(line) else {
        return ActionVerdict::blocked(
            "unparseable command line: unbalanced quotes or trailing escape",
        );
    };
    if argv.is_empty() {
        return ActionVerdict::blocked("empty command line");
    }

    if let Some(reason) = destructive_in(&argv, cwd, MAX_SHELL_DEPTH) {
        return ActionVerdict::blocked(format!("destructive command: {reason}"));
    }

    let (_, effective) = unwrap_command(&argv);
    if let Some(reason) = rules
        .risky_reason(&argv)
        .or_else(|| rules.risky_reason(effective))
    {
        return ActionVerdict::confirm(reason, RiskLevel::High);
    }
    if shell_payload(effective).is_some() {
        return ActionVerdict::confirm("runs an inline shell script", RiskLevel::High);
    }

    if rules.is_safe(&argv) {
        return ActionVerdict::Allowed;
    }

    ActionVerdict::confirm(
        format!("unrecognized command '{}'", program_basename(&argv[0])),
        RiskLevel::Medium,
    )
}

/// Permission cache key for a command line: `bash:` followed by any wrapper
/// chain, the program basename and, for multiplexing programs, the
/// subcommand. Inline shell scripts key on their full payload so approving
/// one script never approves another.
pub(super) fn subject_key(line: &str) -> String {
    let Some(argv) = shlex::split(line).filter(|a| !a.is_empty()) else {
        return format!("bash:{}", line.trim());
    };
    let (wrappers, effective) = unwrap_command(&argv);
    let mut parts: Vec<&str> = wrappers;
    if let Some((program, rest)) = effective.split_first() {
        let program = program_basename(program);
        parts.push(program);
        if let Some(payload) = shell_payload(effective) {
            parts.push("-c");
            parts.push(payload);
        } else if MULTIPLEXERS.contains(&program)
            && let Some(sub) = subcommand(rest)
        {
            parts.push(sub);
        }
    }
    format!("bash:{}", parts.join(" "))
}

/// First non-option argument, skipping the values of global options such as
/// `git -C <dir>` or `git -c <key=value>`.
fn subcommand(args: &[String]) -> Option<&str> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if MULTIPLEXER_VALUE_FLAGS.contains(&arg.as_str()) {
            iter.next();
        } else if !arg.starts_with('-') {
            return Some(arg);
        }
    }
    None
}

fn is_fork_bomb(line: &str) -> bool {
    let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
    FUNCTION_DEF.captures_iter(&compact).any(|caps| {
        let name = &caps[1];
        compact.contains(&format!("{name}|{name}&")) || compact.contains(&format!("{name}&{name}"))
    })
}

/// First destructive pattern found anywhere in `argv`: each separator
/// segment, each wrapped command and each inline shell payload.
fn destructive_in(argv: &[String], cwd: Option<&Path>, depth: u8) -> Option<String> {
    for segment in split_segments(argv) {
        let (_, effective) = unwrap_command(&segment);
        if let Some(reason) =
            destructive_reason(&segment, cwd).or_else(|| destructive_reason(effective, cwd))
        {
            return Some(reason);
        }
        if depth > 0
            && let Some(payload) = shell_payload(effective)
            && let Some(inner) = shlex::split(payload)
            && let Some(reason) = destructive_in(&inner, cwd, depth - 1)
        {
            return Some(reason);
        }
    }
    None
}

fn split_segments(argv: &[String]) -> Vec<Vec<String>> {
    let mut segments = Vec::new();
    let mut current: Vec<String> = Vec::new();
    for token in argv {
        if SEPARATORS.contains(&token.as_str()) {
            segments.push(std::mem::take(&mut current));
        } else if let Some(head) = token.strip_suffix(';') {
            if !head.is_empty() {
                current.push(head.to_string());
            }
            segments.push(std::mem::take(&mut current));
        } else {
            current.push(token.clone());
        }
    }
    segments.push(current);
    segments.retain(|s| !s.is_empty());
    segments
}

fn is_assignment(token: &str) -> bool {
    token.split_once('=').is_some_and(|(name, _)| {
        !name.is_empty()
            && name.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

/// Strip leading `NAME=value` assignments and wrapper programs (with their
/// options), returning the wrapper basenames and the wrapped command.
fn unwrap_command(argv: &[String]) -> (Vec<&str>, &[String]) {
    let mut wrappers = Vec::new();
    let mut rest = argv;
    loop {
        while rest.first().is_some_and(|t| is_assignment(t)) {
            rest = &rest[1..];
        }
        let Some((program, args)) = rest.split_first() else {
            return (wrappers, rest);
        };
        let name = program_basename(program);
        if !WRAPPERS.contains(&name) {
            return (wrappers, rest);
        }
        wrappers.push(name);
        rest = skip_wrapper_options(name, args);
    }
}

fn skip_wrapper_options<'a>(wrapper: &str, mut args: &'a [String]) -> &'a [String] {
    while let Some((first, tail)) = args.split_first() {
        if first == "--" {
            args = tail;
            break;
        }
        if first.starts_with('-') && first.len() > 1 {
            args = if WRAPPER_VALUE_FLAGS.contains(&first.as_str()) && !tail.is_empty() {
                &tail[1..]
            } else {
                tail
            };
        } else if wrapper == "env" && is_assignment(first) {
            args = tail;
        } else {
            break;
        }
    }
    // `timeout DURATION cmd`
    if wrapper == "timeout" && !args.is_empty() {
        args = &args[1..];
    }
    args
}

/// Inline script passed to a shell interpreter via `-c` (or a flag cluster
/// ending in `c`, like `-lc`).
fn shell_payload(argv: &[String]) -> Option<&str> {
    let (program, args) = argv.split_first()?;
    if !SHELLS.contains(&program_basename(program)) {
        return None;
    }
    let position = args.iter().position(|a| {
        a.starts_with('-') && !a.starts_with("--") && a[1..].contains('c')
    })?;
    args.get(position + 1).map(String::as_str)
}

fn destructive_reason(argv: &[String], cwd: Option<&Path>) -> Option<String> {
    let (program, args) = argv.split_first()?;
    let name = program_basename(program);

    match name {
        "rm" => destructive_rm(args, cwd),
        "dd" => args
            .iter()
            .filter_map(|a| a.strip_prefix("of="))
            .map(|target| resolve_operand(target, cwd))
            .find(|target| is_raw_device(target))
            .map(|target| format!("raw write to device {target}")),
        "tee" => operands(args)
            .map(|target| resolve_operand(target, cwd))
            .find(|target| is_raw_device(target))
            .map(|target| format!("raw write to device {target}")),
        _ if COPY_WRITERS.contains(&name) => operands(args)
            .last()
            .map(|target| resolve_operand(target, cwd))
            .filter(|target| is_raw_device(target))
            .map(|target| format!("raw write to device {target}")),
        "chmod" | "chown" | "chgrp" => {
            let recursive = args
                .iter()
                .any(|a| a == "--recursive" || short_flags(a).contains('R'));
            let target = wide_target(args, cwd);
            (recursive && target.is_some())
                .then(|| format!("recursive {name} of {}", target.unwrap_or_default()))
        }
        "init" | "telinit" => args
            .first()
            .filter(|level| matches!(level.as_str(), "0" | "6"))
            .map(|level| format!("{name} {level} halts or restarts the system")),
        "systemctl" => operands(args)
            .next()
            .filter(|verb| matches!(verb.as_str(), "poweroff" | "reboot" | "halt" | "kexec"))
            .map(|verb| format!("systemctl {verb} halts or restarts the system")),
        _ if POWER_TOOLS.contains(&name) => Some(format!("{name} halts or restarts the system")),
        _ if FORMAT_TOOLS.contains(&name) || name.starts_with("mkfs.") => {
            Some(format!("{name} destroys filesystem contents"))
        }
        _ => None,
    }
}

fn destructive_rm(args: &[String], cwd: Option<&Path>) -> Option<String> {
    let mut recursive = false;
    let mut force = false;
    let mut no_preserve_root = false;
    for arg in args.iter().take_while(|a| *a != "--") {
        match arg.as_str() {
            "--recursive" => recursive = true,
            "--force" => force = true,
            "--no-preserve-root" => no_preserve_root = true,
            other => {
                let flags = short_flags(other);
                recursive |= flags.contains('r') || flags.contains('R');
                force |= flags.contains('f');
            }
        }
    }
    if !(recursive && force) && !no_preserve_root {
        return None;
    }
    wide_target(args, cwd).map(|target| format!("recursive force-delete of {target}"))
}

/// First operand that resolves to a root-level or home-level path.
fn wide_target(args: &[String], cwd: Option<&Path>) -> Option<String> {
    operands(args)
        .map(|target| resolve_operand(target, cwd))
        .find(|target| is_root_level(target) || is_home_level(target))
        .map(Cow::into_owned)
}

/// Absolute form of a relative operand, joined onto `cwd`. Absolute and
/// home-relative (`~`, `$HOME`) operands come back unchanged.
fn resolve_operand<'a>(target: &'a str, cwd: Option<&Path>) -> Cow<'a, str> {
    let home_relative =
        target.starts_with('~') || target.starts_with("$HOME") || target.starts_with("${HOME}");
    match cwd {
        Some(cwd) if !target.starts_with('/') && !home_relative => Cow::Owned(
            normalize_lexically(&cwd.join(target))
                .to_string_lossy()
                .into_owned(),
        ),
        _ => Cow::Borrowed(target),
    }
}

/// A `/dev/` node other than the harmless sinks.
fn is_raw_device(target: &str) -> bool {
    target.starts_with("/dev/")
        && !DEVICE_SINKS.contains(&target)
        && !target.starts_with("/dev/fd/")
}

/// Letters of a short-option cluster (`-rf` -> `rf`); empty for anything else.
fn short_flags(arg: &str) -> &str {
    match arg.strip_prefix('-') {
        Some(rest) if !rest.starts_with('-') => rest,
        _ => "",
    }
}

/// Non-option arguments; everything after `--` counts.
fn operands(args: &[String]) -> impl Iterator<Item = &String> {
    let mut after_dashes = false;
    args.iter().filter(move |a| {
        if after_dashes {
            return true;
        }
        if *a == "--" {
            after_dashes = true;
            return false;
        }
        !a.starts_with('-')
    })
}

/// Normal components of an absolute target, ignoring a trailing glob.
fn absolute_components(target: &str) -> Option<Vec<String>> {
    if !target.starts_with('/') {
        return None;
    }
    let normalized = normalize_lexically(Path::new(target));
    let mut parts: Vec<String> = normalized
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.last().is_some_and(|p| p == "*") {
        parts.pop();
    }
    Some(parts)
}

/// `/`, `/*` or a top-level directory such as `/usr` or `/usr/*`.
fn is_root_level(target: &str) -> bool {
    absolute_components(target).is_some_and(|parts| parts.len() <= 1)
}

fn is_home_level(target: &str) -> bool {
    let trimmed = target.trim_end_matches(['/', '*']);
    if matches!(trimmed, "~" | "$HOME" | "${HOME}") {
        return true;
    }
    let Some(parts) = absolute_components(target) else {
        return false;
    };
    match parts.as_slice() {
        [root] if root == "root" => true,
        [base, _] if base == "home" || base == "Users" => true,
        _ => home_dir().is_some_and(|home| {
            let home_parts: Vec<String> = home
                .components()
                .filter_map(|c| match c {
                    Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                    _ => None,
                })
                .collect();
            !home_parts.is_empty() && home_parts == parts
        }),
    }
}

fn home_dir() -> Option<PathBuf> {
    UserDirs::new().map(|u| u.home_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(line: &str) -> ActionVerdict {
        classify(&CommandRules::default(), line, None)
    }

    fn verdict_in(line: &str, cwd: &str) -> ActionVerdict {
        classify(&CommandRules::default(), line, Some(Path::new(cwd)))
    }

    fn assert_blocked(line: &str) {
        assert!(verdict(line).is_blocked(), "expected '{line}' to be blocked");
    }

    fn assert_confirm(line: &str, expected: RiskLevel) {
        match verdict(line) {
            ActionVerdict::RequiresConfirmation { risk, .. } => {
                assert_eq!(risk, expected, "risk for '{line}'");
            }
            other => panic!("expected confirmation for '{line}', got {other:?}"),
        }
    }

    #[test]
    fn recursive_force_delete_of_root_or_home_is_blocked() {
        assert_blocked("rm -rf /");
        assert_blocked("rm -fr /*");
        assert_blocked("rm -r -f /usr");
        assert_blocked("rm --recursive --force /etc/");
        assert_blocked("rm -rf ~");
        assert_blocked("rm -rf ~/");
        assert_blocked("rm -rf $HOME");
        assert_blocked("rm -rf /home/alice");
        assert_blocked("rm -rf /Users/alice");
        assert_blocked("rm --no-preserve-root /");
        assert_blocked("/bin/rm -Rf /");
    }

    #[test]
    fn scoped_deletes_are_risky_not_blocked() {
        assert_confirm("rm -rf /tmp/build", RiskLevel::High);
        assert_confirm("rm -rf ./target", RiskLevel::High);
        assert_confirm("rm /", RiskLevel::High);
    }

    #[test]
    fn relative_deletes_resolve_against_the_working_directory() {
        assert!(verdict_in("rm -rf .", "/").is_blocked());
        assert!(verdict_in("rm -rf *", "/").is_blocked());
        assert!(verdict_in("rm -rf .", "/home/alice").is_blocked());
        assert!(verdict_in("rm -rf *", "/Users/alice").is_blocked());
        assert!(verdict_in("rm -rf ..", "/home/alice/project").is_blocked());
        assert!(verdict_in("chmod -R 777 .", "/").is_blocked());

        assert!(!verdict_in("rm -rf .", "/home/alice/project").is_blocked());
        assert!(!verdict_in("rm -rf build", "/home/alice/project").is_blocked());
    }

    #[test]
    fn copies_onto_block_devices_are_blocked() {
        assert_blocked("cp /dev/zero /dev/sda");
        assert_blocked("sudo cp image.iso /dev/disk2");
        assert_blocked("tee /dev/nvme0n1");
        assert!(verdict_in("cp /dev/zero sda", "/dev").is_blocked());
        assert_confirm("cp /dev/sda backup.img", RiskLevel::Medium);
        assert_confirm("tee /dev/null", RiskLevel::Medium);
    }

    #[test]
    fn device_writes_and_format_tools_are_blocked() {
        assert_blocked("dd if=/dev/zero of=/dev/sda");
        assert_blocked("mkfs.ext4 /dev/sdb1");
        assert_blocked("mkfs -t ext4 /dev/sdb1");
        assert_blocked("wipefs -a /dev/sda");
        assert_blocked("shred -u secret.txt");
        assert_confirm("dd if=/dev/zero of=/dev/null count=1", RiskLevel::Medium);
    }

    #[test]
    fn power_commands_are_blocked() {
        assert_blocked("shutdown -h now");
        assert_blocked("reboot");
        assert_blocked("init 0");
        assert_blocked("systemctl reboot");
        assert_confirm("systemctl status nginx", RiskLevel::Medium);
    }

    #[test]
    fn recursive_permission_changes_on_root_paths_are_blocked() {
        assert_blocked("chmod -R 777 /");
        assert_blocked("chown -R nobody /usr");
        assert_confirm("chmod -R 755 ./scripts", RiskLevel::High);
    }

    #[test]
    fn fork_bombs_are_blocked() {
        assert_blocked(":(){ :|:& };:");
        assert_blocked("bomb() { bomb | bomb & }; bomb");
    }

    #[test]
    fn destructive_commands_behind_separators_wrappers_and_shells_are_blocked() {
        assert_blocked("echo hi; rm -rf /");
        assert_blocked("ls && rm -rf ~");
        assert_blocked("sudo rm -rf /");
        assert_blocked("env FOO=1 nice -n 5 rm -rf /");
        assert_blocked("timeout 5 dd if=/dev/zero of=/dev/sda");
        assert_blocked("echo / | xargs rm -rf /");
        assert_blocked("sh -c 'rm -rf /'");
        assert_blocked("bash -lc \"sudo reboot\"");
        assert_blocked("FOO=bar rm -rf /");
    }

    #[test]
    fn unparseable_and_empty_lines_are_blocked() {
        assert_blocked("echo 'unterminated");
        assert_blocked("");
        assert_blocked("   ");
    }

    #[test]
    fn risky_commands_require_high_risk_confirmation() {
        assert_confirm("git push origin main", RiskLevel::High);
        assert_confirm("npm install left-pad", RiskLevel::High);
        assert_confirm("curl https://example.com", RiskLevel::High);
        assert_confirm("sudo ls", RiskLevel::High);
        assert_confirm("env git push", RiskLevel::High);
        assert_confirm("bash -c 'ls'", RiskLevel::High);
    }

    #[test]
    fn safe_commands_are_allowed() {
        assert_eq!(verdict("ls -la"), ActionVerdict::Allowed);
        assert_eq!(verdict("git status"), ActionVerdict::Allowed);
        assert_eq!(verdict("cat Cargo.toml"), ActionVerdict::Allowed);
        assert_eq!(verdict("rustc --version"), ActionVerdict::Allowed);
    }

    #[test]
    fn separators_inside_a_safe_command_stay_literal() {
        // Only `echo` runs; the rest are its arguments.
        assert_eq!(verdict("echo hi; rm -rf /tmp/x"), ActionVerdict::Allowed);
        assert_eq!(verdict("echo $(whoami)"), ActionVerdict::Allowed);
    }

    #[test]
    fn unknown_commands_default_to_medium_confirmation() {
        assert_confirm("make deploy", RiskLevel::Medium);
        assert_confirm("python script.py", RiskLevel::Medium);
    }

    #[test]
    fn subject_keys_scope_by_program_and_subcommand() {
        assert_eq!(subject_key("git push origin main"), "bash:git push");
        assert_eq!(subject_key("git push --force"), "bash:git push");
        assert_eq!(subject_key("git -C repo reset --hard"), "bash:git reset");
        assert_eq!(subject_key("rm -rf build"), "bash:rm");
        assert_eq!(subject_key("/usr/bin/rm x"), "bash:rm");
        assert_eq!(subject_key("sudo rm x"), "bash:sudo rm");
        assert_eq!(subject_key("npm install"), "bash:npm install");
        assert_eq!(subject_key("sh -c 'ls'"), "bash:sh -c ls");
        assert_ne!(subject_key("git push"), subject_key("git reset"));
    }

    #[test]
    fn segments_split_on_separator_tokens_and_trailing_semicolons() {
        let argv = shlex::split("a b; c && d | e").expect("parses");
        let segments = split_segments(&argv);
        assert_eq!(
            segments,
            vec![
                vec!["a".to_string(), "b".to_string()],
                vec!["c".to_string()],
                vec!["d".to_string()],
                vec!["e".to_string()],
            ]
        );
    }
}
