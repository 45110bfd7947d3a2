use feedsync_common::model::{Id, post::PostMarker};
use std::str::FromStr;
use thiserror::Error;

pub const HELP: &str = "\
commands:
  show            print the feed and the open thread
  like <post-id>  like a post
  open <post-id>  open the comments of a post
  close           close the open thread
  write <text>    set the comment draft of the open thread
  send            post the draft
  reload          fetch the feed again
  dismiss         clear the status message
  help            print this text
  quit            exit";

/// One line of terminal input.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Command {
    Show,
    Like(Id<PostMarker>),
    Open(Id<PostMarker>),
    Close,
    Write(String),
    Send,
    Reload,
    Dismiss,
    Help,
    Quit,
}

#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum CommandError {
    #[error("Unknown command {0:?}, try \"help\"")]
    Unknown(String),
    #[error("\"{0}\" needs an argument")]
    MissingArgument(&'static str),
    #[error("\"{0}\" takes no argument")]
    UnexpectedArgument(&'static str),
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (name, argument) = match line.split_once(char::is_whitespace) {
            Some((name, argument)) => (name, argument.trim()),
            None => (line, ""),
        };

        let post_id = |name| {
            if argument.is_empty() {
                Err(CommandError::MissingArgument(name))
            } else {
                Ok(Id::new(argument))
            }
        };
        let bare = |name, command| {
            if argument.is_empty() {
                Ok(command)
            } else {
                Err(CommandError::UnexpectedArgument(name))
            }
        };

        match name {
            "show" => bare("show", Command::Show),
            "like" => post_id("like").map(Command::Like),
            "open" => post_id("open").map(Command::Open),
            "close" => bare("close", Command::Close),
            // The draft keeps whatever follows the command, validation happens on send.
            "write" => Ok(Command::Write(argument.to_owned())),
            "send" => bare("send", Command::Send),
            "reload" => bare("reload", Command::Reload),
            "dismiss" => bare("dismiss", Command::Dismiss),
            "help" => bare("help", Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            other => Err(CommandError::Unknown(other.to_owned())),
        }
    }
}
