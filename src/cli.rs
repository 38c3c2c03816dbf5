//! Command-line interface and REPL
//!
//! Lines are read on a dedicated thread (rustyline blocks) and executed
//! against the engine through its handle.

use anyhow::Result;
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::controller::FeedbackValue;
use crate::engine::EngineHandle;
use crate::model::{ActionInstance, ActionSetId, ControlId, ControlLocation, ControlType};

const PROMPT: &str = "hub> ";

const HELP: &str = "\
  list                                   list controls
  show <id>                              document and runtime state
  create <page/row/col> <type>           create a button (press, button, step, timed, pageup, pagedown, pagenum)
  press|release <id>                     press or release
  rotate <id> left|right                 encoder rotation
  action <id> <set> <conn> <def> [ms]    append an action (set: down, up, rotate_left, rotate_right, <ms>)
  value <conn> <id> <feedback> <json>    report a feedback value
  abort [id]                             cancel pending delayed actions
  quit                                   leave";

/// A parsed REPL line
#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Help,
    List,
    Show(String),
    Create {
        location: ControlLocation,
        kind: ControlType,
    },
    Press {
        id: String,
        pressed: bool,
    },
    Rotate {
        id: String,
        clockwise: bool,
    },
    AddAction {
        id: String,
        set: ActionSetId,
        connection: String,
        definition: String,
        delay: u64,
    },
    FeedbackValue {
        connection: String,
        id: String,
        feedback: String,
        value: Value,
    },
    Abort(Option<String>),
    Quit,
}

/// Parse one line; `Ok(None)` for blank lines
pub fn parse_command(line: &str) -> Result<Option<ReplCommand>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();
    let arg = |i: usize, what: &str| -> Result<String, String> {
        args.get(i)
            .map(|s| s.to_string())
            .ok_or_else(|| format!("missing {}", what))
    };

    let cmd = match verb {
        "help" | "?" => ReplCommand::Help,
        "list" | "ls" => ReplCommand::List,
        "show" => ReplCommand::Show(arg(0, "control id")?),
        "create" => {
            let location = arg(0, "location")?
                .parse::<ControlLocation>()
                .map_err(|_| "location must be page/row/column".to_string())?;
            let raw = arg(1, "control type")?;
            let kind = ControlType::from_str(&raw)
                .filter(ControlType::is_button)
                .ok_or_else(|| format!("unknown button type '{}'", raw))?;
            ReplCommand::Create { location, kind }
        }
        "press" | "release" => ReplCommand::Press {
            id: arg(0, "control id")?,
            pressed: verb == "press",
        },
        "rotate" => {
            let clockwise = match arg(1, "direction")?.as_str() {
                "right" | "cw" => true,
                "left" | "ccw" => false,
                other => return Err(format!("unknown direction '{}'", other)),
            };
            ReplCommand::Rotate {
                id: arg(0, "control id")?,
                clockwise,
            }
        }
        "action" => {
            let delay = match args.get(4) {
                Some(raw) => raw
                    .parse::<u64>()
                    .map_err(|_| format!("invalid delay '{}'", raw))?,
                None => 0,
            };
            ReplCommand::AddAction {
                id: arg(0, "control id")?,
                set: arg(1, "action set")?.parse()?,
                connection: arg(2, "connection")?,
                definition: arg(3, "definition")?,
                delay,
            }
        }
        "value" => {
            let raw = args.get(3..).map(|rest| rest.join(" ")).unwrap_or_default();
            if raw.is_empty() {
                return Err("missing value".into());
            }
            let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
            ReplCommand::FeedbackValue {
                connection: arg(0, "connection")?,
                id: arg(1, "control id")?,
                feedback: arg(2, "feedback id")?,
                value,
            }
        }
        "abort" => ReplCommand::Abort(args.first().map(|s| s.to_string())),
        "quit" | "exit" => ReplCommand::Quit,
        other => return Err(format!("unknown command '{}' (try help)", other)),
    };
    Ok(Some(cmd))
}

/// Read lines on a dedicated thread until EOF or Ctrl+C
fn spawn_line_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                warn!("REPL unavailable: {}", e);
                return;
            }
        };
        loop {
            match rl.readline(PROMPT) {
                Ok(line) => {
                    let _ = rl.add_history_entry(line.as_str());
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
                Err(e) => {
                    warn!("REPL read error: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

pub async fn run_repl(handle: EngineHandle) -> Result<()> {
    println!("{}", "=== Control Hub REPL ===".bold().cyan());
    println!("Type {} for commands\n", "help".bright_white());

    let mut lines = spawn_line_reader();
    while let Some(line) = lines.recv().await {
        match parse_command(&line) {
            Ok(None) => {}
            Ok(Some(ReplCommand::Quit)) => break,
            Ok(Some(cmd)) => {
                debug!(?cmd, "REPL command");
                if let Err(e) = execute(&handle, cmd).await {
                    println!("{} {:#}", "error:".red().bold(), e);
                }
            }
            Err(e) => println!("{} {}", "error:".red().bold(), e),
        }
    }

    println!("\n{}", "REPL closed".yellow());
    Ok(())
}

async fn resolve(handle: &EngineHandle, raw: String) -> Result<ControlId> {
    Ok(handle
        .with_controller(move |c| c.resolve_control_id(&raw))
        .await??)
}

fn report(changed: bool) {
    if changed {
        println!("{}", "ok".green());
    } else {
        println!("{}", "no change".dimmed());
    }
}

async fn execute(handle: &EngineHandle, cmd: ReplCommand) -> Result<()> {
    match cmd {
        ReplCommand::Help => println!("{}", HELP),
        ReplCommand::List => {
            let controls = handle.get_all_controls().await?;
            if controls.is_empty() {
                println!("  {}", "No controls".dimmed());
            }
            for (id, doc) in controls {
                let actions: usize = doc
                    .action_sets
                    .as_ref()
                    .map(|sets| sets.values().map(Vec::len).sum())
                    .unwrap_or(0);
                println!(
                    "  {} {} ({} actions)",
                    id.as_str().bright_white(),
                    doc.kind.as_str().yellow(),
                    actions
                );
            }
        }
        ReplCommand::Show(raw) => {
            let id = resolve(handle, raw).await?;
            match handle.get_control(id.clone()).await? {
                Some(doc) => {
                    println!("{}", serde_json::to_string_pretty(&doc)?);
                    if let Some(runtime) = handle.runtime_snapshot(id).await? {
                        println!("{} {}", "runtime:".bold(), serde_json::to_string(&runtime)?);
                    }
                }
                None => println!("  {}", "No control there".dimmed()),
            }
        }
        ReplCommand::Create { location, kind } => {
            let id = handle
                .with_controller(move |c| c.create_button_control(&location, kind))
                .await??;
            println!("{} {}", "created".green(), id.as_str().bright_white());
        }
        ReplCommand::Press { id, pressed } => {
            let id = resolve(handle, id).await?;
            handle.press(id, pressed, Some("repl".into()));
        }
        ReplCommand::Rotate { id, clockwise } => {
            let id = resolve(handle, id).await?;
            handle.rotate(id, clockwise, Some("repl".into()));
        }
        ReplCommand::AddAction {
            id,
            set,
            connection,
            definition,
            delay,
        } => {
            let id = resolve(handle, id).await?;
            let action = ActionInstance::new(uuid::Uuid::new_v4().to_string(), connection, definition)
                .with_delay(delay);
            let changed = handle
                .with_controller(move |c| c.action_add(&id, None, set, action))
                .await??;
            report(changed);
        }
        ReplCommand::FeedbackValue {
            connection,
            id,
            feedback,
            value,
        } => {
            let control_id = resolve(handle, id).await?;
            handle.update_feedback_values(
                connection,
                vec![FeedbackValue {
                    control_id,
                    feedback_id: feedback,
                    value,
                }],
            );
        }
        ReplCommand::Abort(Some(raw)) => {
            let id = resolve(handle, raw).await?;
            let cancelled = handle
                .with_controller(move |c| c.abort_control_delayed(&id, false))
                .await?;
            println!("{} pending actions cancelled", cancelled);
        }
        ReplCommand::Abort(None) => {
            let cancelled = handle.with_controller(|c| c.abort_all_delayed()).await?;
            println!("{} pending actions cancelled", cancelled);
        }
        ReplCommand::Quit => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(line: &str) -> ReplCommand {
        parse_command(line).unwrap().unwrap()
    }

    #[test]
    fn test_blank_line_is_ignored() {
        assert_eq!(parse_command("   ").unwrap(), None);
    }

    #[test]
    fn test_parse_button_commands() {
        assert_eq!(
            parse("create 1/0/2 step"),
            ReplCommand::Create {
                location: ControlLocation::new(1, 0, 2),
                kind: ControlType::Step,
            }
        );
        assert_eq!(
            parse("release loc:1/0/2"),
            ReplCommand::Press {
                id: "loc:1/0/2".into(),
                pressed: false,
            }
        );
        assert_eq!(
            parse("rotate loc:1/0/2 left"),
            ReplCommand::Rotate {
                id: "loc:1/0/2".into(),
                clockwise: false,
            }
        );
        assert_eq!(
            parse("action loc:1/0/0 1000 obs scene 250"),
            ReplCommand::AddAction {
                id: "loc:1/0/0".into(),
                set: ActionSetId::Threshold(1000),
                connection: "obs".into(),
                definition: "scene".into(),
                delay: 250,
            }
        );
    }

    #[test]
    fn test_parse_feedback_values() {
        assert_eq!(
            parse("value obs loc:1/0/0 fb1 {\"text\": \"LIVE\"}"),
            ReplCommand::FeedbackValue {
                connection: "obs".into(),
                id: "loc:1/0/0".into(),
                feedback: "fb1".into(),
                value: json!({ "text": "LIVE" }),
            }
        );
        assert_eq!(
            parse("value obs loc:1/0/0 fb1 plain"),
            ReplCommand::FeedbackValue {
                connection: "obs".into(),
                id: "loc:1/0/0".into(),
                feedback: "fb1".into(),
                value: json!("plain"),
            }
        );
        assert_eq!(parse("abort"), ReplCommand::Abort(None));
        assert_eq!(parse("exit"), ReplCommand::Quit);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_command("create 1/0 press").is_err());
        assert!(parse_command("create 1/0/0 trigger").is_err());
        assert!(parse_command("rotate loc:1/0/0 up").is_err());
        assert!(parse_command("value obs loc:1/0/0 fb1").is_err());
        assert!(parse_command("frobnicate").is_err());
    }
}
