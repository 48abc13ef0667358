/// One line of input in the interactive shell.
#[derive(Debug, Clone, PartialEq)]
pub enum ShellCommand {
    Ping,
    Scan,
    Databases,
    UseDatabase(u8),
    Counts(Option<u8>),
    Load(String),
    Rows,
    SetValue(String),
    SetListElement { row: usize, value: String },
    Upsert {
        row: usize,
        member: String,
        value: Option<String>,
    },
    RemoveRows(Vec<usize>),
    DeleteKey,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  ping                         check the active connection
  scan                         count keys by category in every database
  dbs                          list databases with key totals
  db N                         switch to database N
  counts [N]                   category counts for database N (default: active)
  load KEY                     load a key and show its first rows
  rows                         show the loaded rows again
  set VALUE                    replace the value of a string key
  lset ROW VALUE               replace the list element in ROW
  upsert ROW MEMBER [VALUE]    replace the member in ROW (VALUE: hash value or zset score)
  rm ROW [ROW...]              remove rows from the loaded key
  del                          delete the loaded key
  help | quit";

fn parse_row(token: &str) -> Result<usize, String> {
    token
        .parse::<usize>()
        .map_err(|_| format!("'{}' is not a row number", token))
}

/// Splits off the first whitespace-delimited token, returning it and the trimmed rest.
fn split_token(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.find(char::is_whitespace) {
        Some(pos) => (&input[..pos], input[pos..].trim_start()),
        None => (input, ""),
    }
}

pub fn parse_command(line: &str) -> Result<ShellCommand, String> {
    let (name, rest) = split_token(line.trim());
    if name.is_empty() {
        return Err("Command is empty.".to_string());
    }

    match name.to_ascii_lowercase().as_str() {
        "ping" => Ok(ShellCommand::Ping),
        "scan" => Ok(ShellCommand::Scan),
        "dbs" => Ok(ShellCommand::Databases),
        "db" => rest
            .parse::<u8>()
            .map(ShellCommand::UseDatabase)
            .map_err(|_| "usage: db N".to_string()),
        "counts" => {
            if rest.is_empty() {
                Ok(ShellCommand::Counts(None))
            } else {
                rest.parse::<u8>()
                    .map(|db| ShellCommand::Counts(Some(db)))
                    .map_err(|_| "usage: counts [N]".to_string())
            }
        }
        "load" if !rest.is_empty() => Ok(ShellCommand::Load(rest.to_string())),
        "load" => Err("usage: load KEY".to_string()),
        "rows" => Ok(ShellCommand::Rows),
        // The value is the rest of the line, spaces included.
        "set" => Ok(ShellCommand::SetValue(rest.to_string())),
        "lset" => {
            let (row, value) = split_token(rest);
            if row.is_empty() {
                return Err("usage: lset ROW VALUE".to_string());
            }
            Ok(ShellCommand::SetListElement {
                row: parse_row(row)?,
                value: value.to_string(),
            })
        }
        "upsert" => {
            let (row, rest) = split_token(rest);
            let (member, value) = split_token(rest);
            if row.is_empty() || member.is_empty() {
                return Err("usage: upsert ROW MEMBER [VALUE]".to_string());
            }
            Ok(ShellCommand::Upsert {
                row: parse_row(row)?,
                member: member.to_string(),
                value: if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                },
            })
        }
        "rm" => {
            let rows = rest
                .split_whitespace()
                .map(parse_row)
                .collect::<Result<Vec<_>, _>>()?;
            if rows.is_empty() {
                return Err("usage: rm ROW [ROW...]".to_string());
            }
            Ok(ShellCommand::RemoveRows(rows))
        }
        "del" => Ok(ShellCommand::DeleteKey),
        "help" | "?" => Ok(ShellCommand::Help),
        "quit" | "exit" => Ok(ShellCommand::Quit),
        other => Err(format!("Unknown command '{}'. Type 'help'.", other)),
    }
}
