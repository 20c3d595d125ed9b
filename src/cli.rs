//! CLI argument parsing for refman.

use clap::{Args, Parser, Subcommand};
use refman::{Id, Isbn, Title, Url, Version};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "refman",
    about = "Manage books, links and notes in ordered categories",
    version,
    after_help = "Logs are written to: ~/.local/share/refman/logs/refman.log"
)]
pub struct Cli {
    /// Path to the refman store directory (default: current directory)
    #[arg(short = 'd', long, global = true)]
    pub dir: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Initialize a new refman store in the current directory
    Init,

    /// Manage categories
    #[command(subcommand)]
    Category(CategoryCommand),

    /// Manage references inside a category
    #[command(subcommand)]
    Reference(ReferenceCommand),

    /// Check ordering and payload integrity
    Verify,
}

#[derive(Subcommand)]
pub enum CategoryCommand {
    /// List categories in order
    List,

    /// Show a category with its references
    Show {
        /// Category ID
        id: Id,
    },

    /// Create a category at the end of the list
    Add {
        /// Category title
        title: Title,
    },

    /// Rename a category
    Rename {
        /// Category ID
        id: Id,

        /// New title
        title: Title,

        #[command(flatten)]
        expect: ExpectVersion,
    },

    /// Delete a category and all its references
    Delete {
        /// Category ID
        id: Id,
    },

    /// Reorder the category list
    Reorder {
        /// Every category ID, in the desired order
        #[arg(required = true, num_args = 1..)]
        ids: Vec<Id>,
    },
}

#[derive(Subcommand)]
pub enum ReferenceCommand {
    /// Show a single reference
    Show {
        /// Reference ID
        id: Id,
    },

    /// Add a book
    AddBook {
        /// Category ID
        category: Id,

        /// Book title
        title: Title,

        /// ISBN
        #[arg(short, long)]
        isbn: Isbn,

        /// Description
        #[arg(short = 'D', long, default_value = "")]
        description: String,

        #[command(flatten)]
        common: NewReferenceArgs,
    },

    /// Add a link
    AddLink {
        /// Category ID
        category: Id,

        /// Link title
        title: Title,

        /// URL
        #[arg(short, long)]
        url: Url,

        /// Description
        #[arg(short = 'D', long, default_value = "")]
        description: String,

        #[command(flatten)]
        common: NewReferenceArgs,
    },

    /// Add a note
    AddNote {
        /// Category ID
        category: Id,

        /// Note title
        title: Title,

        /// Note text
        #[arg(short, long, default_value = "")]
        text: String,

        #[command(flatten)]
        common: NewReferenceArgs,
    },

    /// Update a book
    UpdateBook {
        /// Reference ID
        id: Id,

        #[command(flatten)]
        base: UpdateArgs,

        /// New ISBN
        #[arg(short, long)]
        isbn: Option<Isbn>,

        /// New description
        #[arg(short = 'D', long)]
        description: Option<String>,
    },

    /// Update a link
    UpdateLink {
        /// Reference ID
        id: Id,

        #[command(flatten)]
        base: UpdateArgs,

        /// New URL
        #[arg(short, long)]
        url: Option<Url>,

        /// New description
        #[arg(short = 'D', long)]
        description: Option<String>,
    },

    /// Update a note
    UpdateNote {
        /// Reference ID
        id: Id,

        #[command(flatten)]
        base: UpdateArgs,

        /// New text
        #[arg(long)]
        text: Option<String>,
    },

    /// Remove a reference from its category
    Remove {
        /// Category ID
        category: Id,

        /// Reference ID
        id: Id,

        #[command(flatten)]
        expect: ExpectVersion,
    },

    /// Reorder the references of a category
    Reorder {
        /// Category ID
        category: Id,

        /// Every reference ID of the category, in the desired order
        #[arg(num_args = 0..)]
        ids: Vec<Id>,

        #[command(flatten)]
        expect: ExpectVersion,
    },
}

/// Optimistic-lock option shared by category mutations.
#[derive(Args)]
pub struct ExpectVersion {
    /// Fail unless the category is at this version (default: current)
    #[arg(long = "expect-version")]
    pub version: Option<Version>,
}

#[derive(Args)]
pub struct NewReferenceArgs {
    /// Mark as starred
    #[arg(short, long)]
    pub starred: bool,

    #[command(flatten)]
    pub expect: ExpectVersion,
}

#[derive(Args)]
pub struct UpdateArgs {
    /// New title
    #[arg(long)]
    pub title: Option<Title>,

    /// Set or clear the starred flag
    #[arg(long)]
    pub starred: Option<bool>,
}
