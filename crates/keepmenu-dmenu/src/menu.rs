//! Talking to dmenu, rofi or any other program with the same line protocol.
//!
//! Candidates are written to the menu's stdin one per line and the chosen
//! line is read back from stdout. Empty output means the user escaped.

use crate::config::{flag_value, Config, DmenuSection, PassphraseSection};
use std::collections::BTreeMap;
use std::io::Write;
use std::process::{Command, Stdio};
use thiserror::Error;

/// Number of lines used when `l` is not configured.
pub const DEFAULT_LINES: usize = 24;

/// The line offered to confirm a destructive operation.
pub const CONFIRM_DELETE: &str = "Yes - confirm delete";

#[derive(Error, Debug)]
pub enum MenuError {
    #[error("dmenu_command is empty")]
    EmptyCommand,

    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Menu i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// The menu printed to stderr. The text has already been shown to the user.
    #[error("{0}")]
    Stderr(String),
}

/// A menu the user picks lines from.
pub trait Menu {
    /// Show `items` under `prompt` and return the chosen line, or `None`
    /// when the user escaped. The user may also type a line not in `items`.
    fn select(&self, prompt: &str, items: &[String]) -> Result<Option<String>, MenuError>;

    /// Ask for the database passphrase.
    fn passphrase(&self) -> Result<Option<String>, MenuError>;

    /// Show a one-line message. Failures are logged and otherwise ignored.
    fn error(&self, message: &str);

    /// Ask for a single line of text, optionally offering `current` to accept.
    fn input(&self, prompt: &str, current: &str) -> Result<Option<String>, MenuError> {
        let items: Vec<String> = if current.is_empty() {
            Vec::new()
        } else {
            vec![current.to_string()]
        };
        self.select(prompt, &items)
    }

    /// `NO` / `Yes - confirm delete`. Anything but the confirm line cancels.
    fn confirm_delete(&self) -> Result<bool, MenuError> {
        let items = ["NO".to_string(), CONFIRM_DELETE.to_string()];
        Ok(self.select("Confirm delete", &items)?.as_deref() == Some(CONFIRM_DELETE))
    }
}

/// Menu backed by an external dmenu-compatible program.
pub struct Dmenu {
    dmenu: DmenuSection,
    passphrase: PassphraseSection,
}

impl Dmenu {
    pub fn new(config: &Config) -> Self {
        Self {
            dmenu: config.dmenu.clone(),
            passphrase: config.dmenu_passphrase.clone(),
        }
    }

    fn is_rofi(program: &str) -> bool {
        program.contains("rofi")
    }

    /// Build the argument vector for one menu invocation.
    ///
    /// `<cmd> -i -l N -p <prompt> <args from dmenu_command> [-key value ...]`,
    /// with `-i -dmenu -lines N` for rofi.
    pub fn command(&self, prompt: &str, lines: usize, secret: bool) -> Result<Vec<String>, MenuError> {
        let mut words = shlex::split(&self.dmenu.dmenu_command)
            .unwrap_or_default()
            .into_iter();
        let program = words.next().ok_or(MenuError::EmptyCommand)?;
        let mut args: Vec<String> = words.collect();
        let rofi = Self::is_rofi(&program);

        let lines = self.dmenu.l.map_or(lines, |max| lines.min(max));
        let mut argv = vec![program.clone(), "-i".to_string()];
        if rofi {
            argv.extend(["-dmenu".to_string(), "-lines".to_string()]);
        } else {
            argv.push("-l".to_string());
        }
        argv.push(lines.to_string());
        argv.extend(["-p".to_string(), prompt.to_string()]);

        let mut extra: BTreeMap<&str, String> = self
            .dmenu
            .extra
            .iter()
            .map(|(k, v)| (k.as_str(), flag_value(v)))
            .collect();
        if secret {
            extra.extend(
                self.passphrase
                    .extra
                    .iter()
                    .map(|(k, v)| (k.as_str(), flag_value(v))),
            );
            if rofi && self.passphrase.rofi_obscure {
                args.push("-password".to_string());
            }
        }

        argv.append(&mut args);
        for (key, value) in extra {
            argv.push(format!("-{key}"));
            argv.push(value);
        }
        argv.retain(|arg| !arg.is_empty());
        Ok(argv)
    }

    fn run(&self, prompt: &str, items: &[String], lines: usize, secret: bool) -> Result<Option<String>, MenuError> {
        let argv = self.command(prompt, lines, secret)?;
        tracing::debug!("Menu '{}' with {} lines", prompt, items.len());

        let (stdout, stderr) = run_with_input(&argv, &join_lines(items))?;
        if !stderr.trim().is_empty() {
            tracing::error!("Menu reported an error: {}", stderr.trim());
            self.show_stderr(&argv[0], &stderr);
            return Err(MenuError::Stderr(stderr.trim().to_string()));
        }

        let selection = stdout.trim_end_matches('\n');
        if selection.is_empty() {
            Ok(None)
        } else {
            Ok(Some(selection.to_string()))
        }
    }

    /// Display stderr of a failed invocation using a bare menu.
    fn show_stderr(&self, program: &str, stderr: &str) {
        let mut argv = vec![program.to_string()];
        if Self::is_rofi(program) {
            argv.push("-dmenu".to_string());
        }
        if let Err(err) = run_with_input(&argv, stderr) {
            tracing::warn!("Could not display menu error: {}", err);
        }
    }

    /// Read the passphrase through a pinentry program.
    fn pinentry(&self, program: &str) -> Result<Option<String>, MenuError> {
        let argv = shlex::split(program).unwrap_or_default();
        if argv.is_empty() {
            return Err(MenuError::EmptyCommand);
        }
        let (stdout, _) = run_with_input(&argv, "setdesc Enter database password\ngetpin\n")?;
        Ok(parse_pinentry(&stdout))
    }
}

impl Menu for Dmenu {
    fn select(&self, prompt: &str, items: &[String]) -> Result<Option<String>, MenuError> {
        self.run(prompt, items, items.len().min(DEFAULT_LINES), false)
    }

    fn passphrase(&self) -> Result<Option<String>, MenuError> {
        match self.dmenu.pinentry.as_deref() {
            Some(program) if !program.is_empty() => self.pinentry(program),
            _ => self.run("Passphrase", &[], 0, true),
        }
    }

    fn error(&self, message: &str) {
        tracing::warn!("{}", message);
        if let Err(err) = self.run(message, &[], 1, false) {
            tracing::warn!("Could not display error: {}", err);
        }
    }
}

fn join_lines(items: &[String]) -> String {
    items.join("\n")
}

/// The `D <data>` line of a pinentry conversation.
fn parse_pinentry(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.strip_prefix("D "))
        .map(str::to_string)
}

/// Run `argv` with `input` on stdin and collect stdout and stderr.
fn run_with_input(argv: &[String], input: &str) -> Result<(String, String), MenuError> {
    let (program, args) = argv.split_first().ok_or(MenuError::EmptyCommand)?;
    let mut child = Command::new(program)
        .args(args)
        .env("LC_ALL", "C")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| MenuError::Spawn {
            program: program.clone(),
            source,
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        // A menu that exits without reading its input still has output to collect.
        match stdin.write_all(input.as_bytes()) {
            Err(err) if err.kind() != std::io::ErrorKind::BrokenPipe => return Err(err.into()),
            _ => {}
        }
    }
    let output = child.wait_with_output()?;
    Ok((
        String::from_utf8_lossy(&output.stdout).into_owned(),
        String::from_utf8_lossy(&output.stderr).into_owned(),
    ))
}
