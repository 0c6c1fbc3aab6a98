//! Command-line interface
//!
//! `shop-admin [--config PATH] [--metrics] <command>`, where commands are
//! `login`, `logout`, `whoami` and the `contacts`, `newsletters` and
//! `orders` resource groups.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::models::{ContactInput, ContactUpdate, NewsletterStatus, Pagination};

/// Command-line client for the shop admin REST API
#[derive(Debug, Parser)]
#[command(name = "shop-admin")]
#[command(about = "Manage contacts, newsletters and orders through the shop admin API")]
pub struct Cli {
    /// Path to the TOML config file
    #[arg(
        long = "config",
        env = "CONFIG_PATH",
        default_value = "shop-admin.toml",
        global = true
    )]
    pub config_path: PathBuf,

    /// Print Prometheus metrics to stderr when the command finishes
    #[arg(long = "metrics", global = true)]
    pub print_metrics: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, PartialEq, Subcommand)]
pub enum Command {
    /// Log in and store the session
    Login(LoginArgs),

    /// Log out and clear the local session
    Logout,

    /// Show the locally stored session
    Whoami,

    /// Manage the shop's contact list
    #[command(subcommand)]
    Contacts(ContactsCommand),

    /// Create, review and track newsletters
    #[command(subcommand)]
    Newsletters(NewslettersCommand),

    /// Inspect orders
    #[command(subcommand)]
    Orders(OrdersCommand),
}

#[derive(Debug, PartialEq, Args)]
pub struct LoginArgs {
    pub email: String,

    /// Account password
    #[arg(long, env = "SHOP_ADMIN_PASSWORD", hide_env_values = true)]
    pub password: String,
}

/// Page-number pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Args)]
pub struct PageArgs {
    /// Page number, starting at 1
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub page: u32,

    /// Items per page
    #[arg(long, default_value_t = Pagination::DEFAULT_PER_PAGE)]
    pub per_page: u32,
}

impl From<PageArgs> for Pagination {
    fn from(args: PageArgs) -> Self {
        Pagination::Page {
            page: args.page,
            per_page: args.per_page,
        }
    }
}

/// Offset pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Args)]
pub struct OffsetArgs {
    /// Items to skip
    #[arg(long, default_value_t = 0)]
    pub skip: u32,

    /// Maximum items to return
    #[arg(long, default_value_t = Pagination::DEFAULT_PER_PAGE)]
    pub limit: u32,
}

impl From<OffsetArgs> for Pagination {
    fn from(args: OffsetArgs) -> Self {
        Pagination::Offset {
            skip: args.skip,
            limit: args.limit,
        }
    }
}

#[derive(Debug, PartialEq, Subcommand)]
pub enum ContactsCommand {
    /// List contacts
    #[command(alias = "ls")]
    List {
        #[command(flatten)]
        page: PageArgs,

        /// Filter by name or phone
        #[arg(long)]
        search: Option<String>,
    },

    /// Show one contact
    Get { id: u64 },

    /// Add a contact
    Create(CreateContactArgs),

    /// Change the given fields of a contact
    Update {
        id: u64,

        #[command(flatten)]
        fields: UpdateContactArgs,
    },

    /// Delete one contact
    #[command(alias = "rm")]
    Delete { id: u64 },

    /// Delete several contacts at once
    BulkDelete {
        #[arg(required = true, num_args = 1..)]
        ids: Vec<u64>,
    },

    /// Upload a CSV or Excel file of contacts
    Import { file: PathBuf },

    /// Download all contacts as CSV
    Export {
        /// Write to this file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct CreateContactArgs {
    #[arg(long)]
    pub name: String,

    #[arg(long)]
    pub phone: String,

    /// The number is reachable on WhatsApp
    #[arg(long)]
    pub whatsapp: bool,

    #[arg(long)]
    pub email: Option<String>,

    /// Tag to attach; repeat for several
    #[arg(long = "tag")]
    pub tags: Vec<String>,
}

impl From<CreateContactArgs> for ContactInput {
    fn from(args: CreateContactArgs) -> Self {
        ContactInput {
            name: args.name,
            phone: args.phone,
            has_whatsapp: args.whatsapp,
            email: args.email,
            tags: args.tags,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct UpdateContactArgs {
    #[arg(long)]
    pub name: Option<String>,

    #[arg(long)]
    pub phone: Option<String>,

    /// Mark the number as reachable on WhatsApp
    #[arg(long, conflicts_with = "no_whatsapp")]
    pub whatsapp: bool,

    /// Mark the number as not on WhatsApp
    #[arg(long)]
    pub no_whatsapp: bool,

    #[arg(long)]
    pub email: Option<String>,

    /// Replace the tags; repeat for several
    #[arg(long = "tag")]
    pub tags: Vec<String>,
}

impl From<UpdateContactArgs> for ContactUpdate {
    fn from(args: UpdateContactArgs) -> Self {
        let has_whatsapp = match (args.whatsapp, args.no_whatsapp) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        ContactUpdate {
            name: args.name,
            phone: args.phone,
            has_whatsapp,
            email: args.email,
            tags: (!args.tags.is_empty()).then_some(args.tags),
        }
    }
}

#[derive(Debug, PartialEq, Subcommand)]
pub enum NewslettersCommand {
    /// List newsletters
    #[command(alias = "ls")]
    List {
        #[command(flatten)]
        page: OffsetArgs,

        /// draft, pending_approval (or pending), approved, rejected or sent
        #[arg(long)]
        status: Option<NewsletterStatus>,
    },

    /// Show one newsletter
    Get { id: u64 },

    /// Draft a newsletter
    Create {
        #[arg(long)]
        title: String,

        #[arg(long)]
        content: String,
    },

    /// Approve a newsletter for sending
    Approve { id: u64 },

    /// Reject a newsletter
    Reject {
        id: u64,

        /// Shown to the author
        #[arg(long)]
        reason: String,
    },

    /// Delete a newsletter
    #[command(alias = "rm")]
    Delete { id: u64 },

    /// Newsletter counts by status
    Stats,
}

#[derive(Debug, PartialEq, Subcommand)]
pub enum OrdersCommand {
    /// List orders
    #[command(alias = "ls")]
    List {
        #[command(flatten)]
        page: OffsetArgs,

        /// Filter by order status
        #[arg(long)]
        status: Option<String>,
    },

    /// Show one order
    Get { id: u64 },
}
