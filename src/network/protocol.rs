//! Line protocol: command parsing and the text the server writes back.
//!
//! Every client line is trimmed and then classified. Exact `/h` and `/info`
//! are standalone commands; `/room ` and `/client ` lines must split into
//! exactly three space-separated tokens; anything else is chat, blank lines
//! included.

use crate::error::CommandError;
use chrono::Utc;
use std::fmt::Write as _;

pub const HELP_COMMAND: &str = "/h";
pub const INFO_COMMAND: &str = "/info";
const ROOM_PREFIX: &str = "/room ";
const CLIENT_PREFIX: &str = "/client ";

/// Prompt written as soon as a connection is accepted.
pub const WELCOME: &str = "Hi There! Welcome to TELCHAT! Please Enter Your Chatter Name: \n>>";

/// Re-prompt after an empty name.
pub const EMPTY_NAME: &str = "name cannot be empty \n>>";

// ANSI styling
const RESET: &str = "\u{1b}[0m";
const RED: &str = "\u{1b}[31m";
const YELLOW: &str = "\u{1b}[33m";
const BLUE: &str = "\u{1b}[34m";
const MAGENTA: &str = "\u{1b}[35m";
const CYAN: &str = "\u{1b}[36m";
const SAVE_CURSOR: &str = "\u{1b}7";
const RESTORE_CURSOR: &str = "\u{1b}8";

/// `Jan _2 15:04:05` style, always UTC.
const TIMESTAMP_FORMAT: &str = "%b %e %H:%M:%S";

/// A classified client line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Help,
    Info,
    ChangeRoom(&'a str),
    Ignore(&'a str),
    Allow(&'a str),
    Chat(&'a str),
}

/// Classify one line received from an active client.
pub fn parse(line: &str) -> Result<Command<'_>, CommandError> {
    let line = line.trim();
    match line {
        HELP_COMMAND => return Ok(Command::Help),
        INFO_COMMAND => return Ok(Command::Info),
        _ => {}
    }

    if line.starts_with(CLIENT_PREFIX) {
        let (option, arg) = split_command(line)?;
        return match option {
            "ignore" => Ok(Command::Ignore(arg)),
            "allow" => Ok(Command::Allow(arg)),
            _ => Err(CommandError::Malformed(line.to_string())),
        };
    }

    if line.starts_with(ROOM_PREFIX) {
        let (option, arg) = split_command(line)?;
        return match option {
            "change" => Ok(Command::ChangeRoom(arg)),
            _ => Err(CommandError::Malformed(line.to_string())),
        };
    }

    Ok(Command::Chat(line))
}

/// Split `<command> <option> <argument>` on single spaces.
fn split_command(line: &str) -> Result<(&str, &str), CommandError> {
    let tokens: Vec<&str> = line.split(' ').collect();
    let [_, option, arg] = tokens.as_slice() else {
        return Err(CommandError::Malformed(line.to_string()));
    };
    let arg = arg.trim();
    if arg.is_empty() {
        return Err(CommandError::Malformed(line.to_string()));
    }
    Ok((option.trim(), arg))
}

fn timestamp() -> String {
    Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Re-prompt after a name that is already registered.
pub fn name_taken(name: &str) -> String {
    format!("name {name} Taken, try new name \n>>")
}

/// Decorated chat line relayed to room members.
pub fn chat_line(sender: &str, room: &str, text: &str) -> String {
    format!(
        "{SAVE_CURSOR}\r {CYAN}{ts} {MAGENTA}{sender}{RESET}@{BLUE}{room}{RESET} {YELLOW}:{RESET}  {text}\n{RESTORE_CURSOR}",
        ts = timestamp()
    )
}

/// Undecorated journal record for a relayed chat message.
pub fn journal_record(sender: &str, room: &str, text: &str) -> String {
    format!("{} {sender}@{room}: {text}\n", timestamp())
}

/// Error line for a malformed command.
pub fn command_error(line: &str) -> String {
    format!("{RED}[Error]:{RESET} {BLUE}invalid command{RESET} `{line}`\n")
}

/// Current name and room.
pub fn info_line(name: &str, room: &str) -> String {
    format!("{MAGENTA}{name}{RESET}: {BLUE}[{room}]{RESET} \n\r")
}

/// Command reference table.
const HELP_ROWS: &[[&str; 5]] = &[
    ["SERIAL", "COMMAND", "OPTION", "ARGS", "DESCRIPTION"],
    ["------", "-------", "------", "----", "-----------"],
    ["1", "/info", "", "", "display username & current room"],
    ["2", "/room", "change", "[name]", "join to [name] room"],
    ["3", "/client", "ignore", "[name]", "ignore [name] client's messages"],
    ["4", "/client", "allow", "[name]", "allow [name] client's messages"],
];

const HELP_EXAMPLES: &[&str] = &[
    "/info",
    "/room change myroom3",
    "/client ignore annoyingone",
    "/client allow annoyingone",
];

/// Render the static help text. Built once at startup and shared.
pub fn help_text() -> String {
    let mut out =
        String::from("Thanks for Joining!. You can type /h for help anytime. Quick guide.\n\r");
    for [serial, command, option, args, description] in HELP_ROWS {
        let _ = write!(
            out,
            "\n {serial:<8}{command:<12}{option:<8}{args:<8}{description}"
        );
    }
    out.push_str("\n\r\nExamples\n\r");
    for (serial, example) in HELP_EXAMPLES.iter().enumerate() {
        let _ = write!(out, "\n {:<8}{example}", serial + 1);
    }
    out.push_str("\n\r\nSend your typed message to the current room by entering enter\n\r");
    out
}
