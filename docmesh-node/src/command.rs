//! Shell command parsing.

use docmesh_types::{DocumentId, Value};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Create a document and print its id.
    New,
    /// List local documents.
    Docs,
    /// List connected peers.
    Peers,
    Show(DocumentId),
    Get(DocumentId, String),
    Set(DocumentId, String, Value),
    Help,
    Exit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let verb = words.next().ok_or_else(|| "empty command".to_string())?;
        let command = match verb {
            "new" => Command::New,
            "docs" => Command::Docs,
            "peers" => Command::Peers,
            "help" | "?" => Command::Help,
            "exit" | "quit" => Command::Exit,
            "show" => Command::Show(document(words.next())?),
            "get" => {
                let doc = document(words.next())?;
                let key = words.next().ok_or("usage: get <doc> <key>")?;
                Command::Get(doc, key.to_string())
            }
            "set" => {
                let doc = document(words.next())?;
                let key = words.next().ok_or("usage: set <doc> <key> <value>")?;
                let rest: Vec<&str> = words.collect();
                if rest.is_empty() {
                    return Err("usage: set <doc> <key> <value>".into());
                }
                Command::Set(doc, key.to_string(), parse_value(&rest.join(" ")))
            }
            other => return Err(format!("unknown command `{other}`, try `help`")),
        };
        Ok(command)
    }
}

fn document(word: Option<&str>) -> Result<DocumentId, String> {
    let word = word.ok_or("missing document id")?;
    word.parse()
        .map_err(|_| format!("`{word}` is not a document id"))
}

/// Interprets shell input as the narrowest matching scalar.
pub fn parse_value(raw: &str) -> Value {
    match raw {
        "null" => Value::Null,
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => {
            if let Ok(i) = raw.parse::<i64>() {
                Value::Int(i)
            } else if let Ok(f) = raw.parse::<f64>() {
                Value::F64(f)
            } else {
                Value::Str(raw.trim_matches('"').to_string())
            }
        }
    }
}

pub const HELP: &str = "\
commands:
  new                        create a document
  docs                       list documents
  peers                      list connected peers
  show <doc>                 print every key of a document
  get <doc> <key>            read a key
  set <doc> <key> <value>    write a key and sync it to peers
  exit                       quit";
