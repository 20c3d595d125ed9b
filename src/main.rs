//! refman CLI - manage books, links and notes in ordered categories.

use clap::Parser;
use colored::*;
use eyre::{Context, Result, bail};
use log::info;
use refman::{
    Category, CategoryRef, Id, Mutation, NewReference, Payload, Reference, Store, StoreServiceExt, VerifyReport,
    positions_from_order, verify,
};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

mod cli;

use cli::{CategoryCommand, Cli, Command, ExpectVersion, ReferenceCommand, UpdateArgs};

fn setup_logging() -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("refman")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("refman.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn get_store_dir(cli: &Cli) -> PathBuf {
    cli.dir
        .clone()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

fn open_store(store_dir: &Path) -> Result<Store> {
    Store::open(store_dir).context("Failed to open store")
}

/// Apply a category mutation at the expected version, or at the current one.
fn mutate(store: &mut Store, id: Id, expect: &ExpectVersion, mutation: Mutation) -> Result<Category> {
    match expect.version {
        Some(version) => store.apply_at(id, version, &mutation),
        None => store.apply(id, &mutation),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

fn format_kind(reference: &Reference) -> ColoredString {
    match reference.payload {
        Payload::Book { .. } => "book".green(),
        Payload::Link { .. } => "link".blue(),
        Payload::Note { .. } => "note".yellow(),
    }
}

fn print_reference(position: usize, reference: &Reference) {
    let star = if reference.starred { "★".yellow() } else { " ".normal() };
    println!(
        "  {:>3} {} {} {} {}",
        position,
        star,
        reference.id.to_string().cyan(),
        format_kind(reference),
        reference.title
    );
    match &reference.payload {
        Payload::Book { isbn, description } => {
            println!("        {} {}", "ISBN".dimmed(), isbn);
            if !description.is_empty() {
                println!("        {}", description.dimmed());
            }
        }
        Payload::Link { url, description } => {
            println!("        {}", url.as_str().underline());
            if !description.is_empty() {
                println!("        {}", description.dimmed());
            }
        }
        Payload::Note { text } => {
            if !text.is_empty() {
                println!("        {}", text.dimmed());
            }
        }
    }
}

fn print_category(category: &Category) {
    println!(
        "{} {} {}",
        category.id.to_string().cyan(),
        category.title.as_str().bold(),
        format!("(v{})", category.version).dimmed()
    );
    if category.references.is_empty() {
        println!("  {}", "No references".dimmed());
    }
    for (position, reference) in category.references.iter().enumerate() {
        print_reference(position, reference);
    }
}

/// Merge the shared update options into a stored reference.
fn apply_update(mut reference: Reference, base: UpdateArgs, payload: Payload) -> Reference {
    if let Some(title) = base.title {
        reference.title = title;
    }
    if let Some(starred) = base.starred {
        reference.starred = starred;
    }
    reference.payload = payload;
    reference
}

fn print_listing(categories: &[CategoryRef]) {
    if categories.is_empty() {
        println!("{}", "No categories found".dimmed());
    }
    for (position, category) in categories.iter().enumerate() {
        println!("{:>3} {} {}", position, category.id.to_string().cyan(), category.title);
    }
}

fn print_report(report: &VerifyReport) {
    println!(
        "{} categories, {} references",
        report.category_count, report.reference_count
    );
    if report.is_clean() {
        println!("{} No problems found", "✓".green());
    }
    for violation in &report.violations {
        println!("{} {}", "✗".red(), violation);
    }
}

fn run_category(store_dir: &Path, command: CategoryCommand, json: bool) -> Result<()> {
    match command {
        CategoryCommand::List => {
            let store = open_store(store_dir)?;
            let categories = store.list_categories().context("Failed to list categories")?;
            if json {
                return print_json(&categories);
            }
            print_listing(&categories);
        }

        CategoryCommand::Show { id } => {
            let store = open_store(store_dir)?;
            let category = store.get_category(id).context("Failed to get category")?;
            if json {
                return print_json(&category);
            }
            print_category(&category);
        }

        CategoryCommand::Add { title } => {
            let mut store = open_store(store_dir)?;
            let category = store.add_category(&title).context("Failed to create category")?;
            if json {
                return print_json(&category);
            }
            println!(
                "{} Created: {} {}",
                "✓".green(),
                category.id.to_string().cyan(),
                category.title
            );
        }

        CategoryCommand::Rename { id, title, expect } => {
            let mut store = open_store(store_dir)?;
            let category = mutate(&mut store, id, &expect, Mutation::Rename(title)).context("Failed to rename category")?;
            if json {
                return print_json(&category);
            }
            println!(
                "{} Renamed: {} {} (v{})",
                "✓".green(),
                category.id.to_string().cyan(),
                category.title,
                category.version
            );
        }

        CategoryCommand::Delete { id } => {
            let mut store = open_store(store_dir)?;
            store.delete_category(id).context("Failed to delete category")?;
            if json {
                return print_json(&serde_json::json!({ "deleted": id }));
            }
            println!("{} Deleted category {}", "✓".green(), id.to_string().cyan());
        }

        CategoryCommand::Reorder { ids } => {
            let mut store = open_store(store_dir)?;
            let listing = store
                .reorder_categories(&positions_from_order(&ids))
                .context("Failed to reorder categories")?;
            if json {
                return print_json(&listing);
            }
            println!("{} Reordered {} categories", "✓".green(), listing.len());
        }
    }

    Ok(())
}

fn run_reference(store_dir: &Path, command: ReferenceCommand, json: bool) -> Result<()> {
    let mut store = open_store(store_dir)?;

    match command {
        ReferenceCommand::Show { id } => {
            let reference = store.get_reference(id).context("Failed to get reference")?;
            if json {
                return print_json(&reference);
            }
            print_reference(0, &reference);
        }

        ReferenceCommand::AddBook {
            category,
            title,
            isbn,
            description,
            common,
        } => {
            let book = NewReference::book(title, isbn, description).starred(common.starred);
            let updated = mutate(&mut store, category, &common.expect, Mutation::Add(book)).context("Failed to add book")?;
            report_added(&updated, json)?;
        }

        ReferenceCommand::AddLink {
            category,
            title,
            url,
            description,
            common,
        } => {
            let link = NewReference::link(title, url, description).starred(common.starred);
            let updated = mutate(&mut store, category, &common.expect, Mutation::Add(link)).context("Failed to add link")?;
            report_added(&updated, json)?;
        }

        ReferenceCommand::AddNote {
            category,
            title,
            text,
            common,
        } => {
            let note = NewReference::note(title, text).starred(common.starred);
            let updated = mutate(&mut store, category, &common.expect, Mutation::Add(note)).context("Failed to add note")?;
            report_added(&updated, json)?;
        }

        ReferenceCommand::UpdateBook {
            id,
            base,
            isbn,
            description,
        } => {
            let existing = store.get_reference(id).context("Failed to get reference")?;
            let payload = match &existing.payload {
                Payload::Book {
                    isbn: old_isbn,
                    description: old_description,
                } => Payload::Book {
                    isbn: isbn.unwrap_or_else(|| old_isbn.clone()),
                    description: description.unwrap_or_else(|| old_description.clone()),
                },
                _ => bail!("Reference {} is a {}, not a book", id, existing.kind()),
            };
            let stored = store
                .update_reference(&apply_update(existing, base, payload))
                .context("Failed to update book")?;
            report_updated(&stored, json)?;
        }

        ReferenceCommand::UpdateLink {
            id,
            base,
            url,
            description,
        } => {
            let existing = store.get_reference(id).context("Failed to get reference")?;
            let payload = match &existing.payload {
                Payload::Link {
                    url: old_url,
                    description: old_description,
                } => Payload::Link {
                    url: url.unwrap_or_else(|| old_url.clone()),
                    description: description.unwrap_or_else(|| old_description.clone()),
                },
                _ => bail!("Reference {} is a {}, not a link", id, existing.kind()),
            };
            let stored = store
                .update_reference(&apply_update(existing, base, payload))
                .context("Failed to update link")?;
            report_updated(&stored, json)?;
        }

        ReferenceCommand::UpdateNote { id, base, text } => {
            let existing = store.get_reference(id).context("Failed to get reference")?;
            let payload = match &existing.payload {
                Payload::Note { text: old_text } => Payload::Note {
                    text: text.unwrap_or_else(|| old_text.clone()),
                },
                _ => bail!("Reference {} is a {}, not a note", id, existing.kind()),
            };
            let stored = store
                .update_reference(&apply_update(existing, base, payload))
                .context("Failed to update note")?;
            report_updated(&stored, json)?;
        }

        ReferenceCommand::Remove { category, id, expect } => {
            let updated =
                mutate(&mut store, category, &expect, Mutation::Remove(id)).context("Failed to remove reference")?;
            if json {
                return print_json(&updated);
            }
            println!(
                "{} Removed {} from {} (v{})",
                "✓".green(),
                id.to_string().cyan(),
                updated.title,
                updated.version
            );
        }

        ReferenceCommand::Reorder { category, ids, expect } => {
            let updated =
                mutate(&mut store, category, &expect, Mutation::Arrange(ids)).context("Failed to reorder references")?;
            if json {
                return print_json(&updated);
            }
            print_category(&updated);
        }
    }

    Ok(())
}

fn report_added(category: &Category, json: bool) -> Result<()> {
    if json {
        return print_json(category);
    }
    if let Some(reference) = category.references.last() {
        println!(
            "{} Added: {} {} to {} (v{})",
            "✓".green(),
            reference.id.to_string().cyan(),
            reference.title,
            category.title,
            category.version
        );
    }
    Ok(())
}

fn report_updated(reference: &Reference, json: bool) -> Result<()> {
    if json {
        return print_json(reference);
    }
    println!("{} Updated: {} {}", "✓".green(), reference.id.to_string().cyan(), reference.title);
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let store_dir = get_store_dir(&cli);

    match cli.command {
        Command::Init => {
            Store::init(&store_dir).context("Failed to initialize refman store")?;
            println!("{} Initialized refman store in {}", "✓".green(), store_dir.display());
        }

        Command::Category(command) => run_category(&store_dir, command, cli.json)?,

        Command::Reference(command) => run_reference(&store_dir, command, cli.json)?,

        Command::Verify => {
            let report = verify(&store_dir).context("Failed to verify store")?;
            if cli.json {
                print_json(&report)?;
            } else {
                print_report(&report);
            }
            if !report.is_clean() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    info!("Command: {:?}", std::env::args().collect::<Vec<_>>());

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
