//! `tt`, a command-line client for the todo tracker API.
//!
//! Every command is one HTTP request. `delete` with one id goes to
//! `DELETE /todos/{id}`, with several to the batch endpoint. `interactive`
//! reads the same commands from stdin.

use anyhow::{Context, Result};
use pico_args::Arguments;
use serde_json::json;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use todo_tracker::todos::parse_todo;

use tt_client::{
    api_client::ApiClient,
    commands::{self, Command},
    render,
    token::{self, TokenManager},
};

const HELP: &str = "\
Manage your todos on a todo tracker server

USAGE:
  tt [OPTIONS] <COMMAND> [ARGS]

COMMANDS:
  register [-n NAME] -e EMAIL [-p PASSWORD]   Create an account
  activate TOKEN                              Activate the account
  auth [-e EMAIL] [-p PASSWORD]               Log in and save the token
  add TEXT                                    Add a todo (todo.txt syntax)
  list [PATTERN] [--all|--archived] [--done|--undone] [--page N] [--sort KEY]
  done ID | undone ID                         Mark (not) completed
  archive ID | unarchive ID                   Archive or restore
  pri ID LETTER | depri ID                    Set or clear the priority
  delete ID...                                Delete one or more todos
  interactive                                 Read commands from stdin

OPTIONS:
  --server URL          API base URL  [default: env TT_API_URL or http://localhost:4000/v1]
  --config-dir DIR      Token directory  [default: $HOME/.config/tt]

FLAGS:
  -h, --help            Print help information
";

const DEFAULT_SERVER: &str = "http://localhost:4000/v1";

struct Args {
    server_url: String,
    config_dir: PathBuf,
    command: Vec<String>,
}

fn parse_args() -> Result<Args> {
    let mut pargs = Arguments::from_env();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() || pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let server_url = match pargs.opt_value_from_str::<_, String>("--server")? {
        Some(url) => url,
        None => std::env::var("TT_API_URL").unwrap_or_else(|_| DEFAULT_SERVER.to_string()),
    };
    let config_dir = match pargs.opt_value_from_str::<_, PathBuf>("--config-dir")? {
        Some(dir) => dir,
        None => token::default_config_dir()?,
    };

    let command = pargs
        .finish()
        .into_iter()
        .map(|arg| {
            arg.into_string()
                .map_err(|arg| anyhow::anyhow!("argument is not UTF-8: {arg:?}"))
        })
        .collect::<Result<_>>()?;

    Ok(Args {
        server_url,
        config_dir,
        command,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = parse_args()?;
    let tokens = TokenManager::for_server(&args.config_dir, &args.server_url);
    log::debug!(
        "server {} token file {}",
        args.server_url,
        tokens.token_file().display()
    );

    let command = commands::parse_args(&args.command)?;
    let cli = Cli {
        server_url: args.server_url,
        tokens,
    };

    match command {
        Command::Interactive => cli.interactive().await,
        command => cli.execute(command).await,
    }
}

struct Cli {
    server_url: String,
    tokens: TokenManager,
}

impl Cli {
    fn anonymous(&self) -> ApiClient {
        ApiClient::new(&self.server_url)
    }

    fn authenticated(&self) -> Result<ApiClient> {
        let token = self.tokens.load()?;
        Ok(ApiClient::new(&self.server_url).with_token(token))
    }

    async fn execute(&self, command: Command) -> Result<()> {
        match command {
            Command::Register {
                name,
                email,
                password,
            } => {
                let name = name.unwrap_or_else(whoami::realname);
                let password = match password {
                    Some(p) => p,
                    None => prompt("Password: ")?,
                };
                let user = self.anonymous().register(&name, &email, &password).await?;
                println!(
                    "Registration successful for {}! Please check your email for activation instructions.",
                    user.email
                );
            }
            Command::Activate { token } => {
                let user = self.anonymous().activate(&token).await?;
                println!("Activation successful for {}!", user.email);
            }
            Command::Auth { email, password } => {
                let email = match email {
                    Some(e) => e,
                    None => prompt("Email: ")?,
                };
                let password = match password {
                    Some(p) => p,
                    None => prompt("Password: ")?,
                };
                let token = self.anonymous().authenticate(&email, &password).await?;
                self.tokens.save(&token.token)?;
                println!("Authentication successful and token saved");
            }
            Command::Add { text } => {
                let todo = self
                    .authenticated()?
                    .create_todo(&parse_todo(&text))
                    .await?;
                println!("Todo added successfully");
                println!("{}", render::todo_line(&todo));
            }
            Command::List(options) => {
                let (todos, pagination) = self
                    .authenticated()?
                    .list_todos(&options.query())
                    .await?;
                println!("{}", render::todo_list(&todos, &pagination));
            }
            Command::Done(id) => {
                self.patch(id, json!({ "completed": true }), "Todo marked as completed")
                    .await?
            }
            Command::Undone(id) => {
                self.patch(id, json!({ "completed": false }), "Todo marked as not completed")
                    .await?
            }
            Command::Archive(id) => {
                self.patch(id, json!({ "archived": true }), "Todo marked as archived")
                    .await?
            }
            Command::Unarchive(id) => {
                self.patch(id, json!({ "archived": false }), "Todo marked as not archived")
                    .await?
            }
            Command::Pri { id, priority } => {
                self.patch(
                    id,
                    json!({ "priority": priority.to_string() }),
                    "Todo priority updated",
                )
                .await?
            }
            Command::Depri(id) => {
                self.patch(id, json!({ "priority": "" }), "Todo priority removed")
                    .await?
            }
            Command::Delete(ids) => {
                let client = self.authenticated()?;
                if let [id] = ids.as_slice() {
                    client.delete_todo(*id).await?;
                    println!("Todo deleted successfully");
                } else {
                    let results = client.delete_todos(&ids).await?;
                    println!("{}", render::batch_results(&results));
                }
            }
            Command::Interactive => anyhow::bail!("already in interactive mode"),
            Command::Help => print!("{HELP}"),
        }
        Ok(())
    }

    async fn patch(&self, id: i64, body: serde_json::Value, done: &str) -> Result<()> {
        let todo = self.authenticated()?.update_todo(id, &body).await?;
        println!("{done}");
        println!("{}", render::todo_line(&todo));
        Ok(())
    }

    /// Run commands from stdin until EOF or `quit`. A failing command is
    /// reported and the loop goes on.
    async fn interactive(&self) -> Result<()> {
        println!("Interactive mode. Type '?' for help, 'q' to quit.");
        let stdin = io::stdin();
        loop {
            print!("tt> ");
            io::stdout().flush()?;

            let mut line = String::new();
            if stdin.lock().read_line(&mut line)? == 0 {
                break;
            }
            let line = line.trim();
            match line {
                "" => continue,
                "q" | "quit" | "exit" => break,
                _ => {}
            }

            match commands::parse_line(line) {
                Ok(Command::Interactive) => println!("Error: already in interactive mode"),
                Ok(command) => {
                    if let Err(e) = self.execute(command).await {
                        println!("Error: {e}");
                    }
                }
                Err(e) => println!("Error: {e}"),
            }
        }
        Ok(())
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{label}");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .context("Failed to read from stdin")?;
    Ok(input.trim().to_string())
}
