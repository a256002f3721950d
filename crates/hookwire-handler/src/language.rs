//! Mapping of the configured language onto a handler command.

use std::convert::Infallible;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{debug, info};

use hookwire_core::{AppError, AppResult};
use hookwire_process::CommandSpec;

/// Language of the hook files, or a custom handler command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerLanguage {
    /// `dredd-hooks-ruby`
    Ruby,
    /// `dredd-hooks-python`
    Python,
    /// `goodman` from the Go bin directory
    Go,
    /// `dredd-hooks-rust`
    Rust,
    /// `dredd-hooks-php`
    Php,
    /// `dredd-hooks-perl`
    Perl,
    /// Hooks of the host itself; never run out of process.
    Native,
    /// Any other value, used verbatim as a command line.
    Custom(String),
}

/// A conventionally named handler binary and how to install it.
struct KnownHandler {
    label: &'static str,
    binary: &'static str,
    install: &'static str,
}

impl FromStr for HandlerLanguage {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "ruby" => Self::Ruby,
            "python" => Self::Python,
            "go" => Self::Go,
            "rust" => Self::Rust,
            "php" => Self::Php,
            "perl" => Self::Perl,
            "native" | "nodejs" => Self::Native,
            other => Self::Custom(other.to_string()),
        })
    }
}

impl HandlerLanguage {
    /// Parses a configured language value.
    pub fn parse(value: &str) -> Self {
        match value.parse() {
            Ok(language) => language,
            Err(never) => match never {},
        }
    }

    fn known_handler(&self) -> Option<KnownHandler> {
        let (label, binary, install) = match self {
            Self::Ruby => ("Ruby", "dredd-hooks-ruby", "$ gem install dredd_hooks"),
            Self::Python => ("Python", "dredd-hooks-python", "$ pip install dredd_hooks"),
            Self::Rust => ("Rust", "dredd-hooks-rust", "$ cargo install dredd-hooks"),
            Self::Php => (
                "PHP",
                "dredd-hooks-php",
                "$ composer require ddelnano/dredd-hooks-php --dev",
            ),
            Self::Perl => ("Perl", "dredd-hooks-perl", "$ cpanm Dredd::Hooks"),
            Self::Go => (
                "Go",
                "goodman",
                "$ go get github.com/snikch/goodman/cmd/goodman",
            ),
            Self::Native | Self::Custom(_) => return None,
        };
        Some(KnownHandler {
            label,
            binary,
            install,
        })
    }

    /// Resolves the language into the command that starts the handler.
    ///
    /// The program is checked against the search path; nothing is spawned.
    /// `hookfiles` are appended as trailing arguments.
    pub async fn resolve(&self, hookfiles: &[String]) -> AppResult<CommandSpec> {
        let spec = match (self, self.known_handler()) {
            (Self::Native, _) => {
                return Err(AppError::unsupported_language(
                    "Hooks handler should not be used for native hooks. \
                     Register the hooks in-process instead.",
                ));
            }
            (Self::Custom(command_line), _) => resolve_custom(command_line)?,
            (Self::Go, Some(handler)) => {
                // The Go handler is looked up in the Go bin directory only.
                let gobin = go_bin_dir().await.map_err(|reason| {
                    AppError::handler_not_found(format!(
                        "Go doesn't seem to be installed: {reason}"
                    ))
                })?;
                resolve_known(&handler, &gobin.join(handler.binary))?
            }
            (_, Some(handler)) => resolve_known(&handler, Path::new(handler.binary))?,
            (language, None) => {
                return Err(AppError::internal(format!(
                    "no handler binary is known for {language:?}"
                )));
            }
        };

        Ok(spec.with_args(hookfiles.iter().cloned()))
    }
}

fn resolve_known(handler: &KnownHandler, program: &Path) -> AppResult<CommandSpec> {
    match which::which(program) {
        Ok(path) => {
            debug!(program = %path.display(), "Resolved hooks handler");
            Ok(CommandSpec::new(program))
        }
        Err(_) => Err(AppError::handler_not_found(format!(
            "{} hooks handler command not found: {}\n\
             Install {} hooks handler by running:\n{}",
            handler.label,
            program.display(),
            handler.label.to_lowercase(),
            handler.install
        ))),
    }
}

fn resolve_custom(command_line: &str) -> AppResult<CommandSpec> {
    let mut words = shlex::split(command_line)
        .ok_or_else(|| {
            AppError::configuration(format!(
                "Unable to parse hooks handler command line: {command_line}"
            ))
        })?
        .into_iter();

    let program = words.next().ok_or_else(|| {
        AppError::configuration("Hooks handler command line is empty")
    })?;
    let args: Vec<String> = words.collect();

    info!(
        program = %program,
        args = %args.join(" "),
        "Using custom hooks handler command"
    );

    if which::which(&program).is_err() {
        return Err(AppError::handler_not_found(format!(
            "Hooks handler command not found: {program}"
        )));
    }

    Ok(CommandSpec::new(program).with_args(args))
}

/// Directory where `go install` puts binaries.
async fn go_bin_dir() -> Result<PathBuf, String> {
    go_bin_dir_from(
        std::env::var_os("GOBIN"),
        std::env::var_os("GOPATH"),
        Path::new("go"),
    )
    .await
}

/// `$GOBIN`, else `$GOPATH/bin`, else the `bin` of `go env GOPATH`.
async fn go_bin_dir_from(
    gobin: Option<OsString>,
    gopath: Option<OsString>,
    go: &Path,
) -> Result<PathBuf, String> {
    if let Some(gobin) = gobin.filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(gobin));
    }
    if let Some(gopath) = gopath.filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(gopath).join("bin"));
    }

    let output = tokio::process::Command::new(go)
        .args(["env", "GOPATH"])
        .stdin(std::process::Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| e.to_string())?;
    if !output.status.success() {
        return Err(String::from_utf8_lossy(&output.stderr).trim().to_string());
    }
    let gopath = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Ok(PathBuf::from(gopath).join("bin"))
}
