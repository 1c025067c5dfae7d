//! RecStore - CLI Client

use anyhow::{anyhow, bail, Context, Result};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::error;
use tracing_subscriber::EnvFilter;

use recstore::config::DEFAULT_DATA_DIR;
use recstore::{parse_criteria, Database, DatabaseConfig, Field, FieldType, Record};

/// Print welcome banner
fn print_banner(db: &Database) {
    println!(
        r#"
 RecStore - a minimal embedded record store
 Data directory: {}
 Type '.help' for help, '.quit' to exit
"#,
        db.config().data_path().display()
    );
}

/// Print help message
fn print_help() {
    println!(
        r#"
Commands:
  .help                          Show this help message
  .quit                          Exit RecStore
  .tables                        List all tables
  .schema <table>                Show table definition

Table commands:
  create <table> <key> <field[:type]>...   Create a table
  drop <table>                             Drop a table
  insert <table> <json>                    Insert a record
  get <table> <key>                        Fetch a record by key
  update <table> <key> <json>              Merge fields into a record
  delete <table> <key>                     Delete a record by key
  select <table> [criteria]                Query records
  delete-where <table> <criteria>          Delete matching records
  index <table> <field>                    Declare an index
  count <table>                            Count records

Examples:
  create users id id:int name email
  insert users {{"id": 1, "name": "Alice", "age": 30}}
  select users age >= 18 AND name != 'Bob'
"#
    );
}

/// Split off the first whitespace-delimited word
fn next_word(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim_start()),
        None => (input, ""),
    }
}

fn require_word<'a>(input: &'a str, what: &str) -> Result<(&'a str, &'a str)> {
    let (word, rest) = next_word(input);
    if word.is_empty() {
        bail!("missing {}", what);
    }
    Ok((word, rest))
}

/// Keys are matched by their text form, so quotes are all that needs stripping
fn parse_key(token: &str) -> &str {
    token
        .strip_prefix('\'')
        .and_then(|t| t.strip_suffix('\''))
        .or_else(|| token.strip_prefix('"').and_then(|t| t.strip_suffix('"')))
        .unwrap_or(token)
}

fn parse_record(json: &str) -> Result<Record> {
    serde_json::from_str(json).with_context(|| format!("invalid record JSON: {}", json))
}

fn parse_field(text: &str) -> Result<Field> {
    match text.split_once(':') {
        Some((name, ty)) => Ok(Field::new(name, ty.parse::<FieldType>()?)),
        None => Ok(Field::any(text)),
    }
}

fn print_records(records: &[Record]) -> Result<()> {
    for record in records {
        println!("{}", serde_json::to_string(record)?);
    }
    println!("{} record(s)", records.len());
    Ok(())
}

/// Handle special dot commands. Returns true when the REPL should exit.
fn handle_special_command(cmd: &str, db: &Database) -> Result<bool> {
    let (name, rest) = next_word(cmd);

    match name {
        ".help" => print_help(),
        ".quit" | ".exit" => return Ok(true),
        ".tables" => {
            let names = db.list_table_names();
            if names.is_empty() {
                println!("No tables found.");
            } else {
                for name in names {
                    println!("  {}", name);
                }
            }
        }
        ".schema" => {
            let (table_name, _) = require_word(rest, "table name")?;
            let table = db.get_table(table_name)?;
            for field in table.fields() {
                let marker = if field.name == table.key_field_name() { " KEY" } else { "" };
                println!("  {} {}{}", field.name, field.field_type, marker);
            }
            if !table.indexes().is_empty() {
                println!("indexes: {}", table.indexes().join(", "));
            }
        }
        other => {
            bail!("unknown command: {} (type '.help' for available commands)", other);
        }
    }
    Ok(false)
}

/// Execute one table command
fn execute(line: &str, db: &mut Database) -> Result<()> {
    let (command, rest) = next_word(line);
    let (table_name, rest) = require_word(rest, "table name")?;

    match command.to_ascii_lowercase().as_str() {
        "create" => {
            let (key, rest) = require_word(rest, "key field")?;
            let fields = rest
                .split_whitespace()
                .map(parse_field)
                .collect::<Result<Vec<_>>>()?;
            db.create_table(table_name, fields, key)?;
            println!("Table '{}' created", table_name);
        }
        "drop" => {
            db.delete_table(table_name)?;
            println!("Table '{}' dropped", table_name);
        }
        "insert" => {
            let record = parse_record(rest)?;
            db.get_table_mut(table_name)?.insert(&record)?;
            println!("1 record inserted");
        }
        "get" => {
            let (key, _) = require_word(rest, "key")?;
            match db.get_table(table_name)?.get(parse_key(key))? {
                Some(record) => println!("{}", serde_json::to_string(&record)?),
                None => println!("(not found)"),
            }
        }
        "update" => {
            let (key, json) = require_word(rest, "key")?;
            let values = parse_record(json)?;
            db.get_table_mut(table_name)?
                .update(parse_key(key), &values)?;
            println!("1 record updated");
        }
        "delete" => {
            let (key, _) = require_word(rest, "key")?;
            db.get_table_mut(table_name)?.delete(parse_key(key))?;
            println!("1 record deleted");
        }
        "select" => {
            let criteria = parse_criteria(rest)?;
            let records = db.get_table(table_name)?.query(&criteria)?;
            print_records(&records)?;
        }
        "delete-where" => {
            let criteria = parse_criteria(rest)?;
            if criteria.is_empty() {
                bail!("delete-where needs at least one criterion");
            }
            let deleted = db.get_table_mut(table_name)?.delete_matching(&criteria)?;
            println!("{} record(s) deleted", deleted);
        }
        "index" => {
            let (field, _) = require_word(rest, "field name")?;
            db.get_table_mut(table_name)?.create_index(field)?;
            println!("Index on '{}.{}' created", table_name, field);
        }
        "count" => {
            println!("{}", db.get_table(table_name)?.count());
        }
        other => return Err(anyhow!("unknown command: {}", other)),
    }
    Ok(())
}

/// Main REPL loop
fn run_repl(db: &mut Database) -> Result<()> {
    let mut editor = DefaultEditor::new()?;
    print_banner(db);

    loop {
        match editor.readline("recstore> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line);

                let outcome = if line.starts_with('.') {
                    handle_special_command(line, db)
                } else {
                    execute(line, db).map(|_| false)
                };
                match outcome {
                    Ok(true) => break,
                    Ok(false) => {}
                    Err(e) => eprintln!("Error: {}", e),
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                error!("readline error: {}", e);
                break;
            }
        }
    }

    println!("Goodbye!");
    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    init_logging();

    let data_dir = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());
    let config = DatabaseConfig::new().data_dir(&data_dir);
    let mut db = Database::open(config)
        .with_context(|| format!("failed to open database in '{}'", data_dir))?;

    run_repl(&mut db)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_word() {
        assert_eq!(next_word("  insert users {\"id\": 1}"), ("insert", "users {\"id\": 1}"));
        assert_eq!(next_word("count"), ("count", ""));
        assert_eq!(next_word(""), ("", ""));
    }

    #[test]
    fn test_parse_key_and_field() {
        assert_eq!(parse_key("'a b'"), "a b");
        assert_eq!(parse_key("\"7\""), "7");
        assert_eq!(parse_key("7"), "7");

        assert_eq!(parse_field("id:int").unwrap(), Field::new("id", FieldType::Integer));
        assert_eq!(parse_field("name").unwrap(), Field::any("name"));
        assert!(parse_field("x:blob").is_err());
    }
}
