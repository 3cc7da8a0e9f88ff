// Shell command parsing and help text

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{take_till, take_till1},
    character::complete::{char, multispace0},
    multi::many0,
    sequence::{delimited, preceded, terminated},
};

/// A parsed shell line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Create(Vec<String>),
    Show(Vec<String>),
    Destroy(Vec<String>),
    All(Vec<String>),
    Update(Vec<String>),
    Help(Option<String>),
    Quit,
    Eof,
    Empty,
    Unknown(String),
}

/// Documented commands, in the order `help` lists them
pub const COMMANDS: [(&str, &str); 8] = [
    ("EOF", "EOF input to exit the program"),
    ("all", "Prints all string representation of all instances based or not on the class name.\n        Ex: $ all BaseModel or $ all."),
    ("create", "Creates a new instance of a class, saves it (to the JSON file) and prints its id.\n        Ex: $ create BaseModel"),
    ("destroy", "Deletes an instance based on the class name and id (and saves the change into the JSON file).\n        Ex: $ destroy BaseModel 1234-1234-1234"),
    ("help", "List available commands with \"help\" or detailed help with \"help cmd\"."),
    ("quit", "Quit command to exit the program"),
    ("show", "Prints the string representation of an instance based on the class name and id.\n        Ex: $ show BaseModel 1234-1234-1234"),
    ("update", "Updates an instance based on the class name and id by adding or updating attribute\n        (saves the change into the JSON file). Only one attribute can be updated at a time.\n        Usage: update <class name> <id> <attribute name> \"<attribute value>\""),
];

impl Command {
    /// Parse one input line
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        let mut words = tokenize(trimmed);
        if words.is_empty() {
            return Command::Empty;
        }

        let name = words.remove(0);
        match name.as_str() {
            "create" => Command::Create(words),
            "show" => Command::Show(words),
            "destroy" => Command::Destroy(words),
            "all" => Command::All(words),
            "update" => Command::Update(words),
            "help" => Command::Help(words.into_iter().next()),
            "quit" => Command::Quit,
            "EOF" => Command::Eof,
            _ => Command::Unknown(trimmed.to_string()),
        }
    }
}

/// Split a line into words; a double-quoted run is one word without its quotes
pub fn tokenize(line: &str) -> Vec<String> {
    match words(line) {
        Ok((_, words)) => words,
        Err(_) => Vec::new(),
    }
}

fn quoted(input: &str) -> IResult<&str, &str> {
    delimited(char('"'), take_till(|c: char| c == '"'), char('"'))(input)
}

fn bare(input: &str) -> IResult<&str, &str> {
    take_till1(|c: char| c.is_whitespace())(input)
}

fn words(input: &str) -> IResult<&str, Vec<String>> {
    let (input, words) = preceded(multispace0, many0(terminated(alt((quoted, bare)), multispace0)))(input)?;
    Ok((input, words.into_iter().map(str::to_string).collect()))
}

/// Help for a single command
pub fn help_topic(topic: &str) -> Option<&'static str> {
    COMMANDS
        .iter()
        .find(|(name, _)| *name == topic)
        .map(|(_, text)| *text)
}

/// Listing printed by a bare `help`
pub fn help_index() -> String {
    let header = "Documented commands (type help <topic>):";
    let names: Vec<&str> = COMMANDS.iter().map(|(name, _)| *name).collect();
    format!("\n{}\n{}\n{}\n", header, "=".repeat(header.len()), names.join("  "))
}
