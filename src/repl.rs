use anyhow::{Context, Result};
use std::io::{self, Write};
use std::path::PathBuf;

use crate::attachments;
use crate::config::Config;
use crate::model::Message;
use crate::presets::{self, PRESETS};
use crate::providers::ChatProvider;
use crate::session::{Session, create_session};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Exit,
    Help,
    History,
    Reset,
    Model(Option<String>),
    Models,
    Prompt(Option<String>),
    System(Option<String>),
    Attach(String),
    Files,
    Detach(Option<usize>),
    Unknown(String),
    Chat(String),
}

fn parse_command(input: &str) -> Option<Command> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
        return Some(Command::Exit);
    }
    if !input.starts_with('/') {
        return Some(Command::Chat(input.to_string()));
    }

    let (name, rest) = match input.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (input, ""),
    };
    let arg = (!rest.is_empty()).then(|| rest.to_string());

    let command = match name.to_ascii_lowercase().as_str() {
        "/help" => Command::Help,
        "/history" => Command::History,
        "/reset" => Command::Reset,
        "/model" => Command::Model(arg),
        "/models" => Command::Models,
        "/prompt" => Command::Prompt(arg),
        "/system" => Command::System(arg),
        "/attach" => match arg {
            Some(path) => Command::Attach(path),
            None => Command::Unknown("usage: /attach <path>".to_string()),
        },
        "/files" => Command::Files,
        "/detach" => match arg.as_deref().map(str::parse::<usize>) {
            None => Command::Detach(None),
            Some(Ok(n)) if n > 0 => Command::Detach(Some(n - 1)),
            Some(_) => Command::Unknown("usage: /detach [file number]".to_string()),
        },
        other => Command::Unknown(format!("unknown command '{other}', try /help")),
    };
    Some(command)
}

fn new_session(cfg: &Config, model: &str) -> Session {
    create_session(model, cfg.effective_system_prompt())
}

pub async fn run_repl(provider: &dyn ChatProvider, cfg: &Config) -> Result<()> {
    let mut session = new_session(cfg, &cfg.model);

    println!("parley chat");
    println!("provider: {}  model: {}", provider.name(), session.model());
    println!("type a message, '/help' for commands, or 'exit' to quit");

    loop {
        print!("> ");
        io::stdout().flush().context("Failed to flush stdout")?;

        let mut input = String::new();
        let read = io::stdin()
            .read_line(&mut input)
            .context("Failed to read stdin")?;
        if read == 0 {
            break;
        }

        let Some(command) = parse_command(&input) else {
            continue;
        };

        match command {
            Command::Exit => break,
            Command::Help => print_help(),
            Command::History => print_history(session.history()),
            Command::Reset => {
                session = new_session(cfg, session.model());
                println!("conversation reset\n");
            }
            Command::Model(None) => println!("model: {}\n", session.model()),
            Command::Model(Some(model)) => {
                session.set_model(model);
                println!("model set to {} for the next message\n", session.model());
            }
            Command::Models => print_models(provider.name(), session.model()),
            Command::Prompt(None) => print_presets(),
            Command::Prompt(Some(key)) => match presets::find(&key) {
                Some(preset) => {
                    session.set_system_prompt(preset.prompt);
                    println!("system prompt set to '{}'\n", preset.name);
                }
                None => println!("unknown preset '{key}', try /prompt\n"),
            },
            Command::System(None) => match session.system_prompt() {
                Some(prompt) => println!("{prompt}\n"),
                None => println!("(no system prompt)\n"),
            },
            Command::System(Some(text)) => {
                session.set_system_prompt(text);
                println!("system prompt updated\n");
            }
            Command::Attach(path) => {
                match attachments::load(PathBuf::from(&path), cfg.max_attachment_bytes()).await {
                    Ok(attachment) => {
                        println!(
                            "attached {} ({} chars); it will be sent with your next message\n",
                            attachment.name,
                            attachment.text.chars().count()
                        );
                        session.stage_attachment(attachment);
                    }
                    Err(err) => println!("error: {err}\n"),
                }
            }
            Command::Files => print_staged(&session),
            Command::Detach(None) => {
                session.clear_staged_attachments();
                println!("all attachments removed\n");
            }
            Command::Detach(Some(index)) => match session.unstage_attachment(index) {
                Some(attachment) => println!("removed {}\n", attachment.name),
                None => println!("no attachment #{}\n", index + 1),
            },
            Command::Unknown(message) => println!("{message}\n"),
            Command::Chat(text) => send_turn(&mut session, provider, &text).await,
        }
    }

    Ok(())
}

async fn send_turn(session: &mut Session, provider: &dyn ChatProvider, text: &str) {
    let mut printed = false;
    let result = session
        .submit(provider, text, |fragment| {
            printed = true;
            print!("{fragment}");
            let _ = io::stdout().flush();
        })
        .await;

    if printed {
        println!();
    }
    match result {
        Ok(_) => println!(),
        Err(err) => {
            println!("error: {err}");
            if !session.staged_attachments().is_empty() {
                println!("attachments are still staged; /files to review, /detach to drop them");
            }
            println!();
        }
    }
}

fn print_help() {
    println!("commands:");
    println!("  /history          show the conversation so far");
    println!("  /reset            start a new conversation");
    println!("  /model [id]       show or switch the model");
    println!("  /models           list known models for this provider");
    println!("  /prompt [preset]  list presets or switch to one");
    println!("  /system [text]    show or replace the system prompt");
    println!("  /attach <path>    attach a file to the next message");
    println!("  /files            list attached files");
    println!("  /detach [n]       remove attached file n, or all");
    println!("  exit | quit       leave");
    println!();
}

fn print_models(provider: &str, current: &str) {
    let models = presets::known_models(provider);
    if models.is_empty() {
        println!("current model: {current}");
        println!("{provider} serves whatever models are installed; switch with /model <id>\n");
        return;
    }
    for model in models {
        let marker = if *model == current { "*" } else { " " };
        println!("{marker} {model}");
    }
    println!();
}

fn print_presets() {
    for preset in PRESETS {
        println!("  {:<11} {} - {}", preset.key, preset.name, preset.description);
    }
    println!();
}

fn print_staged(session: &Session) {
    let staged = session.staged_attachments();
    if staged.is_empty() {
        println!("(no attachments)\n");
        return;
    }
    for (idx, attachment) in staged.iter().enumerate() {
        println!(
            "{}. {} ({} chars)",
            idx + 1,
            attachment.name,
            attachment.text.chars().count()
        );
    }
    println!();
}

fn print_history(history: &[Message]) {
    if history.is_empty() {
        println!("(history is empty)\n");
        return;
    }

    for (idx, msg) in history.iter().enumerate() {
        let attachment = msg
            .attachment
            .as_ref()
            .map(|text| format!(" [+{} chars attached]", text.chars().count()))
            .unwrap_or_default();
        println!(
            "[{}] {} {}: {}{}",
            idx,
            msg.created_at.format("%H:%M:%S"),
            msg.role.as_str(),
            msg.content,
            attachment
        );
    }
    println!();
}
