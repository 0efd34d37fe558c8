//! Interactive session that owns the kernel until it exits.
//!
//! Lines are sent to the kernel one at a time; a line ending in `:` opens a
//! block that runs once a blank line closes it. Lines starting with `:` are
//! session commands.

use anyhow::Result;
use hearth_core::client::format;
use hearth_core::config::RpcConfig;
use hearth_core::{RpcCaller, ShutdownHook, Supervisor};
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "\
Session commands:
  :inspect [pattern]  list kernel variables
  :status             kernel uptime, variables and memory
  :reset              clear every variable
  :restart            restart the kernel process
  :quit               stop the kernel and leave";

#[derive(Debug, PartialEq, Eq)]
enum SessionCommand {
    Help,
    Inspect(String),
    Status,
    Reset,
    Restart,
    Quit,
    Unknown(String),
}

impl SessionCommand {
    fn parse(text: &str) -> Self {
        let mut parts = text.trim().splitn(2, char::is_whitespace);
        let name = parts.next().unwrap_or_default();
        let rest = parts.next().unwrap_or_default().trim();
        match name {
            "help" | "h" => SessionCommand::Help,
            "inspect" | "vars" => SessionCommand::Inspect(rest.to_string()),
            "status" => SessionCommand::Status,
            "reset" => SessionCommand::Reset,
            "restart" => SessionCommand::Restart,
            "quit" | "exit" | "q" => SessionCommand::Quit,
            other => SessionCommand::Unknown(other.to_string()),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Pending,
    Code(String),
    Command(SessionCommand),
}

/// Collects the lines of one submission.
#[derive(Debug, Default)]
struct Block {
    lines: Vec<String>,
}

impl Block {
    fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    fn push(&mut self, line: &str) -> Input {
        if self.lines.is_empty() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                return Input::Pending;
            }
            if let Some(command) = trimmed.strip_prefix(':') {
                return Input::Command(SessionCommand::parse(command));
            }
            if !trimmed.ends_with(':') {
                return Input::Code(line.to_string());
            }
            self.lines.push(line.to_string());
            return Input::Pending;
        }

        if line.trim().is_empty() {
            return Input::Code(self.take());
        }
        self.lines.push(line.to_string());
        Input::Pending
    }

    fn take(&mut self) -> String {
        std::mem::take(&mut self.lines).join("\n")
    }
}

pub async fn run(supervisor: Supervisor, timeout: Duration) -> Result<()> {
    let hook = ShutdownHook::new(supervisor.clone());
    hook.install_signal_handler()?;

    if let Err(e) = supervisor
        .ensure_running(RpcConfig::ENSURE_START_ATTEMPTS, RpcConfig::ENSURE_START_DELAY)
        .await
    {
        println!("{}", format::format_error(&e));
        return Ok(());
    }

    let caller = RpcCaller::new(supervisor.clone()).with_execute_deadline(timeout);
    println!(
        "hearth session on {} (:help for commands, :quit to leave)",
        supervisor.endpoint()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut block = Block::default();
    loop {
        prompt(if block.is_empty() { ">>> " } else { "... " })?;
        let Some(line) = lines.next_line().await? else {
            if !block.is_empty() {
                execute(&caller, &block.take()).await;
            }
            println!();
            break;
        };

        match block.push(&line) {
            Input::Pending => {}
            Input::Code(code) => execute(&caller, &code).await,
            Input::Command(SessionCommand::Quit) => break,
            Input::Command(command) => handle(&caller, command).await,
        }
    }

    hook.fire()?;
    Ok(())
}

fn prompt(text: &str) -> Result<()> {
    let mut stdout = std::io::stdout();
    stdout.write_all(text.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

async fn execute(caller: &RpcCaller, code: &str) {
    match caller.execute(code).await {
        Ok(result) => println!("{}", format::format_execute(&result)),
        Err(e) => println!("{}", format::format_error(&e)),
    }
}

async fn handle(caller: &RpcCaller, command: SessionCommand) {
    let output = match command {
        SessionCommand::Help => HELP.to_string(),
        SessionCommand::Inspect(pattern) => match caller.inspect(&pattern).await {
            Ok(result) => format::format_inspect(&result, &pattern),
            Err(e) => format::format_error(&e),
        },
        SessionCommand::Status => match caller.status().await {
            Ok(result) => format::format_status(&result),
            Err(e) => format::format_error(&e),
        },
        SessionCommand::Reset => match caller.reset().await {
            Ok(result) => format::format_reset(&result),
            Err(e) => format::format_error(&e),
        },
        SessionCommand::Restart => match caller.supervisor().restart().await {
            Ok(_) => "Kernel restarted, all variables cleared".to_string(),
            Err(e) => format::format_error(&e),
        },
        SessionCommand::Unknown(name) => format!("Unknown command ':{}' (try :help)", name),
        SessionCommand::Quit => return,
    };
    println!("{}", output);
}
