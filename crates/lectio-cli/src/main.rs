//! Lectio - 365-day reading plan service
//!
//! Operator and admin CLI over the core library:
//! - Plan lookups (`today`, `day`, `next-books`), synced from the remote
//!   store when configured, bundled fallback otherwise
//! - Notes listing for a user
//! - Member administration (`members list|create|activate|deactivate`)
//! - The admin member-creation HTTP endpoint (`serve`)

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use clap::{Parser, Subcommand};

use lectio_core::{
    admin, constants, BackendConfig, NewMember, NotesService, PlanResolver, ReadingPlanDay,
    RemoteStore, RestStore,
};

/// Lectio - reading plan service
#[derive(Parser)]
#[command(name = "lectio")]
#[command(about = "365-day reading plan service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show today's reading
    Today,

    /// Show the reading for a specific day
    Day {
        /// Day number (1-365)
        number: u16,
    },

    /// Show the next distinct upcoming books
    NextBooks {
        /// Day to start from (defaults to today)
        #[arg(short, long)]
        day: Option<u16>,

        /// How many books to list
        #[arg(short, long, default_value_t = constants::plan::DEFAULT_NEXT_BOOKS)]
        count: usize,
    },

    /// List a user's reading notes
    Notes {
        /// User id whose notes to list
        user_id: String,
    },

    /// Member administration
    Members {
        #[command(subcommand)]
        action: MemberCommands,
    },

    /// Reading-plan administration
    Plan {
        #[command(subcommand)]
        action: PlanCommands,
    },

    /// Run the admin member-creation endpoint
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,

        /// Port to listen on
        #[arg(short, long, default_value_t = constants::app::DEFAULT_SERVE_PORT)]
        port: u16,
    },
}

#[derive(Subcommand)]
enum MemberCommands {
    /// List all member profiles
    List,
    /// Create a member (auth identity + profile row)
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Rename a member's profile
    Rename {
        user_id: String,
        #[arg(long)]
        name: String,
    },
    /// Re-activate a member
    Activate { user_id: String },
    /// Deactivate a member (denies admission on next validation)
    Deactivate { user_id: String },
}

#[derive(Subcommand)]
enum PlanCommands {
    /// Replace the remote reading plan with entries from a JSON file
    Upload {
        /// JSON file holding the full plan, one entry per day
        file: PathBuf,
    },
}

/// Build the REST store from config; errors if the backend is not configured
fn store() -> Result<Arc<RestStore>> {
    let config = BackendConfig::load()?;
    Ok(Arc::new(RestStore::new(&config)?))
}

/// Plan resolver: synced from the remote store when configured,
/// bundled default otherwise
async fn resolver() -> Arc<PlanResolver> {
    match store() {
        Ok(store) => {
            let resolver = PlanResolver::with_store(store);
            resolver.ensure_synced().await;
            resolver
        }
        Err(e) => {
            tracing::info!("no backend configured, using bundled plan: {e}");
            Arc::new(PlanResolver::bundled())
        }
    }
}

fn print_day(entry: &ReadingPlanDay) {
    println!("Day {} - {}", entry.day, entry.passage);
    println!("  Theme:    {}", entry.theme);
    println!("  Category: {}", entry.category);
    println!("  Book:     {}", entry.book);
    println!("  Time:     {}", entry.estimated_time);
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Today => {
            let resolver = resolver().await;
            let day = resolver.current_day();
            match resolver.day(day) {
                Some(entry) => print_day(&entry),
                None => println!("No reading found for day {day}."),
            }
        }
        Commands::Day { number } => {
            let resolver = resolver().await;
            match resolver.day(number) {
                Some(entry) => print_day(&entry),
                None => {
                    println!(
                        "No reading found for day {number}. The plan covers days 1-{}.",
                        resolver.total_days()
                    );
                }
            }
        }
        Commands::NextBooks { day, count } => {
            let resolver = resolver().await;
            let start = day.unwrap_or_else(|| resolver.current_day());
            let books = resolver.next_books(start, count);
            if books.is_empty() {
                println!("No upcoming books after day {start}.");
            } else {
                println!("Coming up after day {start}:");
                for book in books {
                    println!("  {book}");
                }
            }
        }
        Commands::Notes { user_id } => {
            let store = store()?;
            let plan = PlanResolver::with_store(store.clone());
            let notes = NotesService::new(store, plan);

            let entries = notes.list_notes(&user_id).await?;
            if entries.is_empty() {
                println!("No notes found.");
            }
            for entry in entries {
                let passage = entry.passage.as_deref().unwrap_or("(unknown passage)");
                let when = entry
                    .updated_at
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "recently".to_string());
                println!("Day {} - {} ({})", entry.day, passage, when);
                if let Some(theme) = &entry.theme {
                    println!("  {theme}");
                }
                println!("  {}", entry.notes);
            }
        }
        Commands::Members { action } => {
            let store = store()?;
            match action {
                MemberCommands::List => {
                    let profiles = store.list_profiles().await?;
                    if profiles.is_empty() {
                        println!("No members found.");
                    }
                    for profile in profiles {
                        let status = if profile.is_active { "active" } else { "inactive" };
                        println!(
                            "{}  {}  {}  [{}]",
                            profile.id,
                            profile.name.as_deref().unwrap_or("-"),
                            profile.email.as_deref().unwrap_or("-"),
                            status
                        );
                    }
                }
                MemberCommands::Create {
                    name,
                    email,
                    password,
                } => {
                    let created = admin::create_member(
                        store.as_ref(),
                        NewMember {
                            name,
                            email,
                            password,
                        },
                    )
                    .await?;
                    println!("Created member {} ({})", created.id, created.email);
                }
                MemberCommands::Rename { user_id, name } => {
                    store.update_profile_name(&user_id, &name).await?;
                    println!("Member {user_id} renamed to {name}.");
                }
                MemberCommands::Activate { user_id } => {
                    store.set_profile_active(&user_id, true).await?;
                    println!("Member {user_id} activated.");
                }
                MemberCommands::Deactivate { user_id } => {
                    store.set_profile_active(&user_id, false).await?;
                    println!("Member {user_id} deactivated.");
                }
            }
        }
        Commands::Plan { action } => {
            let store = store()?;
            match action {
                PlanCommands::Upload { file } => {
                    let raw = std::fs::read_to_string(&file)
                        .with_context(|| format!("reading {}", file.display()))?;
                    let days: Vec<ReadingPlanDay> = serde_json::from_str(&raw)
                        .with_context(|| format!("parsing {}", file.display()))?;

                    ensure!(!days.is_empty(), "plan file has no entries");
                    let unique: HashSet<u16> = days.iter().map(|d| d.day).collect();
                    ensure!(
                        unique.len() == days.len(),
                        "plan file has duplicate day numbers"
                    );

                    store.replace_reading_plan(&days).await?;
                    println!("Uploaded {} plan entries.", days.len());
                }
            }
        }
        Commands::Serve { bind, port } => {
            let store: Arc<dyn RemoteStore> = store()?;
            let addr = format!("{bind}:{port}");
            let handle = tokio::runtime::Handle::current();

            println!("Member endpoint listening on http://{addr}");
            tokio::task::spawn_blocking(move || admin::run_member_server(&addr, store, handle))
                .await
                .context("member endpoint task failed")??;
        }
    }

    Ok(())
}
