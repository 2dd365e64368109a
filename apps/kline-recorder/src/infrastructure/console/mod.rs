//! Operator Console
//!
//! Line-oriented command prompt on stdin. Commands are resolved by name
//! through a `CommandRegistry` built once at startup:
//!
//! | Command  | Effect                                         |
//! |----------|------------------------------------------------|
//! | `start`  | Start the processing loop (no-op if running)   |
//! | `stop`   | Request a stop; the console then exits         |
//! | `status` | Queue depth, stop flag, loop phase             |
//! | `help`   | List commands                                  |
//! | `exit`   | Leave the console, keep recording              |
//!
//! The console never touches the queue contents or the accumulator.

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::application::services::{Pipeline, StartOutcome};

/// Name of the console thread.
pub const CONSOLE_THREAD_NAME: &str = "operator-console";

/// Prompt printed before each read.
pub const PROMPT: &str = "> ";

// =============================================================================
// Commands
// =============================================================================

/// What the console does after a command ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Print the message and prompt again.
    Continue(String),
    /// Print the message and leave the console.
    Exit(String),
}

/// Command implementation.
pub type CommandHandler = fn(&Pipeline, &CommandRegistry) -> CommandOutcome;

/// A named console command.
#[derive(Debug, Clone, Copy)]
pub struct CommandSpec {
    /// Name typed at the prompt.
    pub name: &'static str,
    /// One-line description for `help`.
    pub description: &'static str,
    /// Implementation.
    pub handler: CommandHandler,
}

/// Ordered table of console commands.
#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    commands: Vec<CommandSpec>,
}

impl CommandRegistry {
    /// Empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }

    /// Registry with the built-in commands.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(CommandSpec {
            name: "start",
            description: "start the processing loop",
            handler: start_command,
        });
        registry.register(CommandSpec {
            name: "stop",
            description: "stop recording and write the CSV",
            handler: stop_command,
        });
        registry.register(CommandSpec {
            name: "status",
            description: "show queue depth and loop state",
            handler: status_command,
        });
        registry.register(CommandSpec {
            name: "help",
            description: "list commands",
            handler: help_command,
        });
        registry.register(CommandSpec {
            name: "exit",
            description: "leave the console, keep recording",
            handler: exit_command,
        });
        registry
    }

    /// Add a command, replacing any existing one with the same name.
    pub fn register(&mut self, spec: CommandSpec) {
        if let Some(existing) = self.commands.iter_mut().find(|c| c.name == spec.name) {
            *existing = spec;
        } else {
            self.commands.push(spec);
        }
    }

    /// Look up a command by exact name.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<&CommandSpec> {
        self.commands.iter().find(|c| c.name == name)
    }

    /// Registered commands in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &CommandSpec> {
        self.commands.iter()
    }

    /// Number of registered commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether no command is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    fn usage(&self) -> String {
        self.iter()
            .map(|c| format!("  - {:<8} {}", c.name, c.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn start_command(pipeline: &Pipeline, _: &CommandRegistry) -> CommandOutcome {
    let message = match pipeline.start() {
        Ok(StartOutcome::Started) => "processing loop started".to_string(),
        Ok(StartOutcome::AlreadyStarted) => "processing loop already running".to_string(),
        Err(e) => format!("failed to start processing loop: {e}"),
    };
    CommandOutcome::Continue(message)
}

fn stop_command(pipeline: &Pipeline, _: &CommandRegistry) -> CommandOutcome {
    if pipeline.request_stop() {
        CommandOutcome::Continue("stop requested".to_string())
    } else {
        CommandOutcome::Continue("stop already requested".to_string())
    }
}

fn status_command(pipeline: &Pipeline, _: &CommandRegistry) -> CommandOutcome {
    let status = pipeline.status();
    CommandOutcome::Continue(format!(
        "queue_depth={} stop_requested={} loop={}",
        status.queue_depth,
        status.stop_requested,
        status.loop_phase.as_str()
    ))
}

fn help_command(_: &Pipeline, registry: &CommandRegistry) -> CommandOutcome {
    CommandOutcome::Continue(registry.usage())
}

fn exit_command(_: &Pipeline, _: &CommandRegistry) -> CommandOutcome {
    CommandOutcome::Exit("leaving console".to_string())
}

// =============================================================================
// Console
// =============================================================================

/// Why the console loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleExit {
    /// A stop was requested (by a command, a signal or another thread).
    StopRequested,
    /// The operator typed a command that leaves the console.
    Command,
    /// Input was closed.
    EndOfInput,
}

/// Interactive prompt bound to a pipeline.
#[derive(Debug)]
pub struct CommandConsole {
    pipeline: Arc<Pipeline>,
    registry: CommandRegistry,
}

impl CommandConsole {
    /// Console with the built-in commands.
    #[must_use]
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self::with_registry(pipeline, CommandRegistry::with_defaults())
    }

    /// Console with a custom command table.
    #[must_use]
    pub const fn with_registry(pipeline: Arc<Pipeline>, registry: CommandRegistry) -> Self {
        Self { pipeline, registry }
    }

    /// Read commands from `input` until a stop, an exit command or EOF.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from reading `input` or writing `output`.
    pub fn run<R: BufRead, W: Write>(
        &self,
        mut input: R,
        mut output: W,
    ) -> io::Result<ConsoleExit> {
        writeln!(output, "Commands:\n{}", self.registry.usage())?;

        let mut line = String::new();
        loop {
            if self.pipeline.shutdown().is_stop_requested() {
                writeln!(output, "stop requested, leaving console")?;
                return Ok(ConsoleExit::StopRequested);
            }

            write!(output, "{PROMPT}")?;
            output.flush()?;

            line.clear();
            if input.read_line(&mut line)? == 0 {
                return Ok(ConsoleExit::EndOfInput);
            }

            let command = line.trim();
            if command.is_empty() {
                continue;
            }

            let Some(spec) = self.registry.resolve(command) else {
                writeln!(output, "command not found: {command}")?;
                continue;
            };

            tracing::debug!(command = spec.name, "Console command");
            match (spec.handler)(&self.pipeline, &self.registry) {
                CommandOutcome::Continue(message) => writeln!(output, "{message}")?,
                CommandOutcome::Exit(message) => {
                    writeln!(output, "{message}")?;
                    return Ok(ConsoleExit::Command);
                }
            }
        }
    }

    /// Run the console on stdin/stdout in its own thread.
    ///
    /// The thread blocks on stdin; it is not joined at shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(CONSOLE_THREAD_NAME.to_string())
            .spawn(move || {
                let stdin = io::stdin();
                match self.run(stdin.lock(), io::stdout()) {
                    Ok(reason) => tracing::debug!(reason = ?reason, "Console closed"),
                    Err(e) => tracing::warn!(error = %e, "Console I/O failed"),
                }
            })
    }
}
