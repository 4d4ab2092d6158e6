//! Debugger instrumentation: which binaries run under gdb, with which
//! breakpoints, and whether fatal signals produce a core dump.
//!
//! Configuration is collected through [`DebugConfigBuilder`] before any
//! test executes and frozen into an immutable [`DebugConfig`]. During a
//! job the config is only read, so concurrently running tests share it
//! without synchronization.

use std::path::{Path, PathBuf};

use crate::runner::lookup::find_command;

pub const DEFAULT_BREAKPOINT: &str = "main";
pub const DEFAULT_DEBUGGER_PATH: &str = "/usr/bin/gdb";
pub const DEFAULT_DEBUGGER_NAME: &str = "gdb";

#[derive(Debug, Clone, thiserror::Error)]
pub enum InstrumentationError {
    #[error("debugger {0:?} could not be resolved to an existing executable")]
    DebuggerNotFound(String),
}

#[derive(Clone, Debug)]
struct BreakRule {
    binary: String,
    expr: String,
}

/// Frozen process-wide debug configuration. Read-only once built.
#[derive(Clone, Debug)]
pub struct DebugConfig {
    rules: Vec<BreakRule>,
    core_dump: bool,
    debugger: PathBuf,
}

impl Default for DebugConfig {
    /// Instrumentation disabled: every command wraps to itself.
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            core_dump: false,
            debugger: PathBuf::from(DEFAULT_DEBUGGER_PATH),
        }
    }
}

impl DebugConfig {
    pub fn builder() -> DebugConfigBuilder {
        DebugConfigBuilder::default()
    }

    pub fn is_enabled(&self) -> bool {
        !self.rules.is_empty()
    }

    pub fn core_dump_enabled(&self) -> bool {
        self.core_dump
    }

    pub fn debugger(&self) -> &Path {
        &self.debugger
    }

    /// Wrap a command line for execution under the debugger.
    ///
    /// Pure function of the command and this config: a command whose
    /// argv[0] matches no registered binary comes back unchanged,
    /// otherwise a gdb batch invocation is composed that sets every
    /// matching breakpoint in registration order, runs the target to
    /// completion and exits with the target's own exit status
    /// (`-return-child-result`). Resumption is attached to each
    /// breakpoint and, with core dumps enabled, core capture to a
    /// fatal-signal catchpoint, so nothing executes after the inferior
    /// exits on the normal path and the session's status stays the
    /// child's.
    pub fn wrap(&self, command: &[String]) -> Vec<String> {
        let Some(target) = command.first() else {
            return command.to_vec();
        };

        let breakpoints: Vec<&str> = self
            .rules
            .iter()
            .filter(|r| rule_matches(&r.binary, target))
            .map(|r| r.expr.as_str())
            .collect();
        if breakpoints.is_empty() {
            return command.to_vec();
        }

        let mut wrapped = vec![
            self.debugger.to_string_lossy().into_owned(),
            "-batch".to_string(),
            "-nx".to_string(),
            "-return-child-result".to_string(),
        ];
        let mut ex = |cmd: &str| {
            wrapped.push("-ex".to_string());
            wrapped.push(cmd.to_string());
        };
        for expr in &breakpoints {
            ex(&format!("break {}", expr));
            // `commands` binds to the breakpoint just created; batch
            // mode reads the block from the following -ex lines
            ex("commands");
            ex("silent");
            ex("continue");
            ex("end");
        }
        if self.core_dump {
            ex("catch signal SIGSEGV SIGABRT");
            ex("commands");
            ex("generate-core-file");
            ex("continue");
            ex("end");
        }
        ex("run");
        wrapped.push("--args".to_string());
        wrapped.extend(command.iter().cloned());
        wrapped
    }

    /// Build a config with a fixed debugger path, skipping resolution.
    #[cfg(test)]
    pub(crate) fn fixed(rules: &[(&str, &str)], core_dump: bool, debugger: &str) -> Self {
        Self {
            rules: rules
                .iter()
                .map(|(binary, expr)| BreakRule {
                    binary: binary.to_string(),
                    expr: expr.to_string(),
                })
                .collect(),
            core_dump,
            debugger: PathBuf::from(debugger),
        }
    }
}

fn rule_matches(rule_binary: &str, target: &str) -> bool {
    if rule_binary == target {
        return true;
    }
    let base = |s: &str| {
        Path::new(s)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
    };
    base(rule_binary).is_some() && base(rule_binary) == base(target)
}

/// Accumulates debug registrations, then freezes them.
///
/// The debugger path is resolved exactly once, at [`build`], never per
/// test. Core-dump enablement is monotonic: there is no way to switch it
/// back off for the rest of the run.
///
/// [`build`]: DebugConfigBuilder::build
#[derive(Clone, Debug, Default)]
pub struct DebugConfigBuilder {
    rules: Vec<BreakRule>,
    core_dump: bool,
    debugger: Option<String>,
}

impl DebugConfigBuilder {
    /// Register a breakpoint for a binary. Registering the same binary
    /// again appends another breakpoint instead of replacing.
    pub fn register(mut self, binary: &str, breakpoint: &str) -> Self {
        self.rules.push(BreakRule {
            binary: binary.to_string(),
            expr: breakpoint.to_string(),
        });
        self
    }

    /// Register from the `binary[:breakpoint]` form handed over by the
    /// CLI layer. The breakpoint defaults to `main`.
    pub fn register_spec(self, spec: &str) -> Self {
        match spec.split_once(':') {
            Some((binary, expr)) if !expr.is_empty() => self.register(binary, expr),
            Some((binary, _)) => self.register(binary, DEFAULT_BREAKPOINT),
            None => self.register(spec, DEFAULT_BREAKPOINT),
        }
    }

    pub fn enable_core_dump(mut self) -> Self {
        self.core_dump = true;
        self
    }

    /// Require a specific debugger executable. An unresolvable explicit
    /// path is a hard error at build time.
    pub fn debugger_path(mut self, candidate: &str) -> Self {
        self.debugger = Some(candidate.to_string());
        self
    }

    pub fn build(self) -> Result<DebugConfig, InstrumentationError> {
        let debugger = match &self.debugger {
            Some(candidate) => resolve_debugger(candidate)
                .ok_or_else(|| InstrumentationError::DebuggerNotFound(candidate.clone()))?,
            None => match resolve_debugger(DEFAULT_DEBUGGER_NAME) {
                Some(path) => path,
                None if self.rules.is_empty() => PathBuf::from(DEFAULT_DEBUGGER_PATH),
                None => {
                    tracing::warn!(
                        "no usable debugger found, disabling instrumentation for this job"
                    );
                    return Ok(DebugConfig::default());
                }
            },
        };

        Ok(DebugConfig {
            rules: self.rules,
            core_dump: self.core_dump,
            debugger,
        })
    }
}

/// A candidate with a path separator must exist as given; a bare name
/// goes through the command search, falling back to the stock location.
fn resolve_debugger(candidate: &str) -> Option<PathBuf> {
    if candidate.contains('/') {
        let path = PathBuf::from(candidate);
        return path.is_file().then_some(path);
    }
    if let Ok(path) = find_command(candidate) {
        return Some(path);
    }
    let fallback = PathBuf::from(DEFAULT_DEBUGGER_PATH);
    fallback.is_file().then_some(fallback)
}
