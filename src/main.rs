use clap::Parser;
use colored::Colorize;
use eyre::Result;
use filestore::{Config, Console, Response, Store};
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "filestore")]
#[command(about = "Shell for creating, showing, updating and destroying records kept in a JSON file")]
#[command(version = env!("GIT_DESCRIBE"))]
struct Cli {
    /// Backing JSON file (overrides the config file)
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Path to a YAML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    /// Run a single command and exit, e.g. `filestore create BaseModel`
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(file) = cli.file {
        config.file_path = file;
    }

    // Setup tracing on stderr so stdout stays the shell's output
    let level = if cli.verbose { tracing::Level::DEBUG } else { config.level()? };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();

    if !io::stdout().is_terminal() {
        colored::control::set_override(false);
    }

    let store = Store::open(&config.file_path)?;
    let mut console = Console::new(store);

    if !cli.command.is_empty() {
        let line = join_args(&cli.command);
        print_response(&console.run_line(&line)?);
        return Ok(());
    }

    run_loop(&mut console, &config.prompt)
}

/// Read commands from stdin until `quit`, `EOF` or end of input
fn run_loop(console: &mut Console, prompt: &str) -> Result<()> {
    let interactive = io::stdin().is_terminal();
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut line = String::new();

    loop {
        if interactive {
            print!("{}", prompt);
            io::stdout().flush()?;
        }

        line.clear();
        let response = if input.read_line(&mut line)? == 0 {
            console.execute(filestore::Command::Eof)?
        } else {
            console.run_line(&line)?
        };

        if let Response::Quit { newline } = response {
            if newline {
                println!();
            }
            return Ok(());
        }
        print_response(&response);
    }
}

fn print_response(response: &Response) {
    match response {
        Response::Text(text) => println!("{}", text),
        Response::Error(e) => println!("{}", e.to_string().red()),
        Response::Nothing | Response::Quit { .. } => {}
    }
}

/// Rebuild a command line from process arguments, quoting words with spaces
fn join_args(args: &[String]) -> String {
    args.iter()
        .map(|arg| {
            if arg.is_empty() || arg.chars().any(char::is_whitespace) {
                format!("\"{}\"", arg)
            } else {
                arg.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_args_quotes_spaced_words() {
        let args: Vec<String> = ["update", "BaseModel", "1234", "name", "John Smith"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(join_args(&args), "update BaseModel 1234 name \"John Smith\"");
    }

    #[test]
    fn test_cli_parses_trailing_command() {
        let cli = Cli::parse_from(["filestore", "--file", "db.json", "show", "BaseModel", "42"]);
        assert_eq!(cli.file, Some(PathBuf::from("db.json")));
        assert_eq!(cli.command, vec!["show", "BaseModel", "42"]);
        assert!(!cli.verbose);
    }
}
