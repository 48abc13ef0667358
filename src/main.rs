use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use keyscope::command::{self, ShellCommand};
use keyscope::config::Settings;
use keyscope::editor::DeleteOutcome;
use keyscope::profiles::{ConnectionProfile, ProfileStore, ProfileTable};
use keyscope::{Browser, BrowserResult};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Inventory and edit the keyspace of a Redis server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// Settings file (defaults to keyscope.toml in the user config directory)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage saved connection profiles
    Profiles {
        #[command(subcommand)]
        action: ProfileAction,
    },
    /// Check whether a profile's server answers
    Test {
        #[arg(long, value_name = "PROFILE")]
        profile: String,
    },
    /// Interactive session against one profile (the default)
    Shell {
        /// Profile to connect to; the first saved profile when omitted
        #[arg(long, value_name = "PROFILE")]
        profile: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum ProfileAction {
    /// List saved profiles
    List,
    /// Save a new profile
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        host: String,
        #[arg(long, default_value = "6379")]
        port: String,
        #[arg(long)]
        auth: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = CliArgs::parse();

    let settings = Settings::load(args.config.as_deref());
    let store = ProfileStore::new(settings.profile_log_path());

    match args.command.unwrap_or(Command::Shell { profile: None }) {
        Command::Profiles { action } => match action {
            ProfileAction::List => {
                let profiles = store.load()?;
                if profiles.is_empty() {
                    println!("No profiles saved in {}", store.path().display());
                }
                for profile in profiles.values() {
                    println!(
                        "{}\t{}:{}{}",
                        profile.name,
                        profile.ip,
                        profile.port,
                        if profile.password().is_some() { "\t(auth)" } else { "" }
                    );
                }
            }
            ProfileAction::Add {
                name,
                host,
                port,
                auth,
            } => {
                let profile = ConnectionProfile::new(&name, &host, &port, auth.as_deref().unwrap_or(""));
                store
                    .append(&profile)
                    .with_context(|| format!("Could not save profile '{}'", name))?;
                println!("Saved profile '{}'.", name);
            }
        },
        Command::Test { profile } => {
            let profiles = store.load()?;
            let profile = find_profile(&profiles, Some(&profile))?;
            let browser = Browser::new(&settings);
            if browser.test_connection(profile).await {
                println!("Successful connection to {} ({}:{})", profile.name, profile.ip, profile.port);
            } else {
                println!("Can't connect to {} ({}:{})", profile.name, profile.ip, profile.port);
                std::process::exit(1);
            }
        }
        Command::Shell { profile } => {
            let profiles = store.load()?;
            let profile = find_profile(&profiles, profile.as_deref())?.clone();
            let mut browser = Browser::new(&settings);
            browser
                .connect(profile.clone())
                .await
                .with_context(|| format!("Could not connect to profile '{}'", profile.name))?;
            println!("Connected to {} ({}:{}). Type 'help' for commands.", profile.name, profile.ip, profile.port);
            run_shell(&mut browser).await?;
        }
    }

    Ok(())
}

fn find_profile<'a>(profiles: &'a ProfileTable, name: Option<&str>) -> Result<&'a ConnectionProfile> {
    match name {
        Some(name) => profiles
            .get(name)
            .ok_or_else(|| anyhow!("Profile '{}' not found in the profile log.", name)),
        None => profiles
            .values()
            .next()
            .ok_or_else(|| anyhow!("No profiles saved. Add one with `keyscope profiles add`.")),
    }
}

async fn run_shell(browser: &mut Browser) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(format!("{}> ", prompt(browser)).as_bytes()).await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        match command::parse_command(&line) {
            Ok(ShellCommand::Quit) => break,
            Ok(ShellCommand::Help) => println!("{}", command::HELP),
            Ok(cmd) => {
                if let Err(e) = execute(browser, cmd).await {
                    println!("Error: {}", e);
                }
            }
            Err(message) => println!("{}", message),
        }
    }
    Ok(())
}

fn prompt(browser: &Browser) -> String {
    let profile = browser.profile().map_or("?", |p| p.name.as_str());
    let db = browser.active_database().unwrap_or(0);
    match browser.session() {
        Some(session) => format!("{}/db{} [{}]", profile, db, session.descriptor().name),
        None => format!("{}/db{}", profile, db),
    }
}

async fn execute(browser: &mut Browser, cmd: ShellCommand) -> BrowserResult<()> {
    match cmd {
        ShellCommand::Ping => {
            let reachable = browser.ping().await;
            println!("{}", if reachable { "PONG" } else { "unreachable" });
        }
        ShellCommand::Scan => {
            for summary in browser.refresh_counts().await? {
                println!("{}", summary);
            }
        }
        ShellCommand::Databases => {
            let summaries = browser.database_summaries();
            if summaries.is_empty() {
                println!("No inventory yet; run 'scan'.");
            }
            for summary in summaries {
                println!("{}", summary);
            }
        }
        ShellCommand::UseDatabase(db) => browser.select_database(db).await?,
        ShellCommand::Counts(db) => {
            let db = db.or(browser.active_database()).unwrap_or(0);
            let rows = browser.category_counts(db);
            if rows.is_empty() {
                println!("No categories for db{} (run 'scan' first?)", db);
            }
            let width = rows.iter().map(|(category, _)| category.len()).max().unwrap_or(0);
            for (category, count) in rows {
                println!("{:<width$}  {}", category, count, width = width);
            }
        }
        ShellCommand::Load(key) => {
            browser.load_key(&key).await?;
            print_window(browser);
        }
        ShellCommand::Rows => print_window(browser),
        ShellCommand::SetValue(value) => {
            browser.set_value(None, &value).await?;
            println!("Value was updated");
            print_window(browser);
        }
        ShellCommand::SetListElement { row, value } => {
            browser.set_value(Some(row), &value).await?;
            println!("Value was updated");
            print_window(browser);
        }
        ShellCommand::Upsert { row, member, value } => {
            browser.upsert_member(row, &member, value.as_deref()).await?;
            println!("Value was updated");
            print_window(browser);
        }
        ShellCommand::RemoveRows(rows) => {
            let outcome = browser.delete_rows(&rows).await?;
            if outcome.key_emptied {
                println!("Removed {}; the key is now empty and gone.", outcome.removed);
            } else if outcome.key_gone {
                println!("Nothing removed; the key no longer exists.");
            } else {
                println!("Removed {}.", outcome.removed);
                print_window(browser);
            }
        }
        ShellCommand::DeleteKey => match browser.delete_key().await? {
            DeleteOutcome::Deleted => println!("Key deleted."),
            DeleteOutcome::NothingToDelete => println!("Nothing to delete; the key no longer exists."),
        },
        ShellCommand::Help | ShellCommand::Quit => {}
    }
    Ok(())
}

fn print_window(browser: &Browser) {
    let Some(session) = browser.session() else {
        println!("No key loaded.");
        return;
    };
    let descriptor = session.descriptor();
    let window = session.window();
    println!(
        "{} ({}, length {}), showing {} row(s)",
        descriptor.name,
        descriptor.kind.as_str(),
        descriptor.length,
        window.len()
    );
    println!("row\t{}", window.columns().join("\t"));
    for (index, row) in window.rows.iter().enumerate() {
        println!("{}\t{}", index, row.cells().join("\t"));
    }
}
