use pico_args::Arguments;
use std::ffi::OsString;
use std::fmt;

/// Errors that can occur during command parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// No command given.
    MissingCommand,
    /// Unrecognized command.
    UnrecognizedCommand(String),
    /// A required argument or flag is missing.
    MissingArgument(&'static str),
    /// A todo ID that is not a positive integer.
    InvalidId(String),
    /// A priority that is not a single letter.
    InvalidPriority(String),
    /// Two flags that cannot be combined.
    ConflictingFlags(&'static str, &'static str),
    /// A flag value that failed to parse.
    InvalidArgument(String),
    /// Leftover arguments the command does not take.
    UnexpectedArguments(Vec<String>),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCommand => write!(f, "No command given. Run 'tt --help' for usage"),
            Self::UnrecognizedCommand(cmd) => write!(
                f,
                "Unrecognized command '{}'. Run 'tt --help' for usage",
                cmd
            ),
            Self::MissingArgument(what) => write!(f, "Missing {}", what),
            Self::InvalidId(value) => {
                write!(f, "Invalid ID '{}'. Must be a positive integer", value)
            }
            Self::InvalidPriority(value) => write!(
                f,
                "Invalid priority '{}'. Must be a single letter (A to Z)",
                value
            ),
            Self::ConflictingFlags(a, b) => write!(f, "{} and {} cannot be combined", a, b),
            Self::InvalidArgument(msg) => write!(f, "{}", msg),
            Self::UnexpectedArguments(args) => {
                write!(f, "Unexpected arguments: {}", args.join(" "))
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// Which archived state `list` asks for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ArchiveScope {
    #[default]
    Active,
    All,
    ArchivedOnly,
}

/// Which completion state `list` asks for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CompletionScope {
    #[default]
    Any,
    Done,
    Undone,
}

/// Options for `list`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub pattern: Option<String>,
    pub archive: ArchiveScope,
    pub completion: CompletionScope,
    pub page: Option<i64>,
    pub sort: Option<String>,
}

impl ListOptions {
    /// Query string pairs for `GET /todos`
    pub fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if let Some(pattern) = &self.pattern {
            query.push(("text", pattern.clone()));
        }
        match self.archive {
            ArchiveScope::Active => {}
            ArchiveScope::All => query.push(("include-archived", "true".to_string())),
            ArchiveScope::ArchivedOnly => query.push(("only-archived", "true".to_string())),
        }
        match self.completion {
            CompletionScope::Any => {}
            CompletionScope::Done => query.push(("done", "true".to_string())),
            CompletionScope::Undone => query.push(("undone", "true".to_string())),
        }
        if let Some(page) = self.page {
            query.push(("page", page.to_string()));
        }
        if let Some(sort) = &self.sort {
            query.push(("sort", sort.clone()));
        }
        query
    }
}

/// A parsed client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Register {
        name: Option<String>,
        email: String,
        password: Option<String>,
    },
    Activate {
        token: String,
    },
    Auth {
        email: Option<String>,
        password: Option<String>,
    },
    Add {
        text: String,
    },
    List(ListOptions),
    Done(i64),
    Undone(i64),
    Archive(i64),
    Unarchive(i64),
    Pri {
        id: i64,
        priority: char,
    },
    Depri(i64),
    Delete(Vec<i64>),
    Interactive,
    Help,
}

/// Parse a command from pre-split arguments.
///
/// # Examples
///
/// ```
/// use tt_client::commands::{Command, parse_args};
///
/// let args = ["pri", "3", "a"].map(String::from);
/// assert_eq!(parse_args(&args), Ok(Command::Pri { id: 3, priority: 'A' }));
///
/// let args = ["delete", "1", "2"].map(String::from);
/// assert_eq!(parse_args(&args), Ok(Command::Delete(vec![1, 2])));
/// ```
pub fn parse_args(args: &[String]) -> Result<Command, ParseError> {
    let mut args = args.to_vec();
    // Sort keys such as `-text` look like flags to pico-args.
    let sort = take_raw_value(&mut args, "--sort")?;

    let mut pargs = Arguments::from_vec(args.into_iter().map(OsString::from).collect());
    let name = pargs
        .subcommand()
        .map_err(|e| ParseError::InvalidArgument(e.to_string()))?
        .ok_or(ParseError::MissingCommand)?;

    if let Some(sort) = &sort {
        if !matches!(name.as_str(), "list" | "ls") {
            return Err(ParseError::UnexpectedArguments(vec![
                "--sort".to_string(),
                sort.clone(),
            ]));
        }
    }

    let command = match name.as_str() {
        "register" => Command::Register {
            name: opt_value(&mut pargs, ["-n", "--name"])?,
            email: opt_value(&mut pargs, ["-e", "--email"])?
                .ok_or(ParseError::MissingArgument("email (-e EMAIL)"))?,
            password: opt_value(&mut pargs, ["-p", "--password"])?,
        },
        "activate" => Command::Activate {
            token: single(free(pargs)?, "activation token")?,
        },
        "auth" => Command::Auth {
            email: opt_value(&mut pargs, ["-e", "--email"])?,
            password: opt_value(&mut pargs, ["-p", "--password"])?,
        },
        "add" => {
            let words = free(pargs)?;
            if words.is_empty() {
                return Err(ParseError::MissingArgument("todo text"));
            }
            Command::Add {
                text: words.join(" "),
            }
        }
        "list" | "ls" => Command::List(parse_list(pargs, sort)?),
        "done" => Command::Done(parse_id(&single(free(pargs)?, "todo ID")?)?),
        "undone" => Command::Undone(parse_id(&single(free(pargs)?, "todo ID")?)?),
        "archive" => Command::Archive(parse_id(&single(free(pargs)?, "todo ID")?)?),
        "unarchive" => Command::Unarchive(parse_id(&single(free(pargs)?, "todo ID")?)?),
        "pri" => {
            let words = free(pargs)?;
            match words.as_slice() {
                [id, letter] => Command::Pri {
                    id: parse_id(id)?,
                    priority: parse_priority(letter)?,
                },
                [_] | [] => return Err(ParseError::MissingArgument("todo ID and priority letter")),
                [_, _, rest @ ..] => return Err(ParseError::UnexpectedArguments(rest.to_vec())),
            }
        }
        "depri" => Command::Depri(parse_id(&single(free(pargs)?, "todo ID")?)?),
        "delete" | "rm" => {
            let words = free(pargs)?;
            if words.is_empty() {
                return Err(ParseError::MissingArgument("todo ID"));
            }
            Command::Delete(words.iter().map(|w| parse_id(w)).collect::<Result<_, _>>()?)
        }
        "interactive" => {
            no_more(pargs)?;
            Command::Interactive
        }
        "help" | "?" => Command::Help,
        other => return Err(ParseError::UnrecognizedCommand(other.to_string())),
    };

    Ok(command)
}

/// Parse one line typed in interactive mode.
pub fn parse_line(line: &str) -> Result<Command, ParseError> {
    let words: Vec<String> = line.split_whitespace().map(str::to_string).collect();
    parse_args(&words)
}

fn parse_list(mut pargs: Arguments, sort: Option<String>) -> Result<ListOptions, ParseError> {
    let all = pargs.contains(["-a", "--all"]);
    let archived = pargs.contains("--archived");
    let done = pargs.contains("--done");
    let undone = pargs.contains("--undone");
    let page = pargs
        .opt_value_from_str::<_, i64>("--page")
        .map_err(|e| ParseError::InvalidArgument(e.to_string()))?;

    let archive = match (all, archived) {
        (true, true) => return Err(ParseError::ConflictingFlags("--all", "--archived")),
        (true, false) => ArchiveScope::All,
        (false, true) => ArchiveScope::ArchivedOnly,
        (false, false) => ArchiveScope::Active,
    };
    let completion = match (done, undone) {
        (true, true) => return Err(ParseError::ConflictingFlags("--done", "--undone")),
        (true, false) => CompletionScope::Done,
        (false, true) => CompletionScope::Undone,
        (false, false) => CompletionScope::Any,
    };

    let words = free(pargs)?;
    let pattern = (!words.is_empty()).then(|| words.join(" "));

    Ok(ListOptions {
        pattern,
        archive,
        completion,
        page,
        sort,
    })
}

fn opt_value<K: Into<pico_args::Keys>>(
    pargs: &mut Arguments,
    keys: K,
) -> Result<Option<String>, ParseError> {
    pargs
        .opt_value_from_str(keys)
        .map_err(|e| ParseError::InvalidArgument(e.to_string()))
}

/// Remove `key VALUE` or `key=VALUE` from `args`, taking the value verbatim.
fn take_raw_value(args: &mut Vec<String>, key: &str) -> Result<Option<String>, ParseError> {
    let prefix = format!("{key}=");
    let Some(idx) = args
        .iter()
        .position(|arg| arg == key || arg.starts_with(&prefix))
    else {
        return Ok(None);
    };

    let arg = args.remove(idx);
    if let Some(value) = arg.strip_prefix(&prefix) {
        return Ok(Some(value.to_string()));
    }
    if idx < args.len() {
        Ok(Some(args.remove(idx)))
    } else {
        Err(ParseError::InvalidArgument(format!(
            "the '{key}' option requires a value"
        )))
    }
}

/// Remaining positional arguments
fn free(pargs: Arguments) -> Result<Vec<String>, ParseError> {
    pargs
        .finish()
        .into_iter()
        .map(|arg| {
            arg.into_string()
                .map_err(|arg| ParseError::InvalidArgument(format!("not UTF-8: {arg:?}")))
        })
        .collect()
}

fn no_more(pargs: Arguments) -> Result<(), ParseError> {
    let rest = free(pargs)?;
    if rest.is_empty() {
        Ok(())
    } else {
        Err(ParseError::UnexpectedArguments(rest))
    }
}

fn single(mut words: Vec<String>, what: &'static str) -> Result<String, ParseError> {
    match words.len() {
        0 => Err(ParseError::MissingArgument(what)),
        1 => Ok(words.remove(0)),
        _ => Err(ParseError::UnexpectedArguments(words.split_off(1))),
    }
}

fn parse_id(value: &str) -> Result<i64, ParseError> {
    match value.parse::<i64>() {
        Ok(id) if id >= 1 => Ok(id),
        _ => Err(ParseError::InvalidId(value.to_string())),
    }
}

fn parse_priority(value: &str) -> Result<char, ParseError> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphabetic() => Ok(c.to_ascii_uppercase()),
        _ => Err(ParseError::InvalidPriority(value.to_string())),
    }
}
