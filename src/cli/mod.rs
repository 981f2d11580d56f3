use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::debug;

use crate::avu::{Avu, AvuPattern};
use crate::catalog::store::CatalogStore;
use crate::catalog::{AttributeFilter, TargetKind};
use crate::config::{require_identity, resolve_catalog_path};
use crate::error::{StoreError, error_json, error_line};
use crate::output::{self, DomainOutcome};
use crate::query::Query;
use crate::wildcard::LikePattern;

pub mod icat;

/// Manage attribute-value-unit metadata on users, collections and data objects.
#[derive(Debug, Parser)]
#[command(name = "imeta", version, about)]
pub struct Cli {
    /// Identity to run as
    #[arg(long, global = true, env = "IMETA_USER")]
    pub user: Option<String>,

    /// Catalog file (default: ~/.imeta/catalog.json)
    #[arg(long, global = true, env = "IMETA_CATALOG")]
    pub catalog: Option<PathBuf>,

    /// Emit JSON instead of text (listings, queries and errors)
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Exactly one of `-u`, `-C`, `-d` with the target name.
#[derive(Debug, Clone, clap::Args)]
#[group(required = true, multiple = false)]
pub struct TargetArg {
    /// User name (optionally `name#zone`)
    #[arg(short = 'u', value_name = "USER")]
    pub user_target: Option<String>,

    /// Collection path, absolute or relative to the home collection
    #[arg(short = 'C', value_name = "COLLECTION")]
    pub collection_target: Option<String>,

    /// Data object path, absolute or relative to the home collection
    #[arg(short = 'd', value_name = "DATA_OBJECT")]
    pub data_object_target: Option<String>,
}

impl TargetArg {
    pub fn selected(&self) -> (TargetKind, &str) {
        if let Some(name) = &self.user_target {
            (TargetKind::User, name)
        } else if let Some(name) = &self.collection_target {
            (TargetKind::Collection, name)
        } else {
            (
                TargetKind::DataObject,
                self.data_object_target.as_deref().unwrap_or_default(),
            )
        }
    }
}

#[derive(Debug, Clone, clap::Args)]
pub struct AvuArgs {
    #[command(flatten)]
    pub target: TargetArg,

    pub attribute: String,

    #[arg(allow_hyphen_values = true)]
    pub value: String,

    /// Units; omitted or empty makes the AVU a double
    #[arg(allow_hyphen_values = true)]
    pub units: Option<String>,
}

impl AvuArgs {
    fn units(&self) -> Option<&str> {
        self.units.as_deref().filter(|units| !units.is_empty())
    }

    fn avu(&self) -> Result<Avu, StoreError> {
        Ok(Avu::new(&self.attribute, &self.value, self.units())?)
    }
}

#[derive(Debug, Clone, clap::Args)]
pub struct ListArgs {
    #[command(flatten)]
    pub target: TargetArg,

    /// Only this attribute (a LIKE pattern for `lsw`)
    pub attribute: Option<String>,
}

#[derive(Debug, Clone, clap::Args)]
pub struct AddwArgs {
    /// Data object LIKE pattern (`%` any run, `_` one character)
    #[arg(short = 'd', value_name = "WILDCARD")]
    pub wildcard: String,

    pub attribute: String,

    #[arg(allow_hyphen_values = true)]
    pub value: String,

    #[arg(allow_hyphen_values = true)]
    pub units: Option<String>,
}

/// Exactly one of `-u`, `-C`, `-d`, selecting what to search.
#[derive(Debug, Clone, clap::Args)]
#[group(required = true, multiple = false)]
pub struct QueryKindArg {
    #[arg(short = 'u')]
    pub users: bool,

    #[arg(short = 'C')]
    pub collections: bool,

    #[arg(short = 'd')]
    pub data_objects: bool,
}

impl QueryKindArg {
    pub fn selected(&self) -> TargetKind {
        if self.users {
            TargetKind::User
        } else if self.collections {
            TargetKind::Collection
        } else {
            TargetKind::DataObject
        }
    }
}

#[derive(Debug, Clone, clap::Args)]
pub struct QueryArgs {
    #[command(flatten)]
    pub kind: QueryKindArg,

    /// `attr op value [and attr op value]...`
    #[arg(
        required = true,
        num_args = 1..,
        allow_hyphen_values = true,
        trailing_var_arg = true
    )]
    pub conditions: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Replace every AVU with this attribute by the given one
    Set(AvuArgs),
    /// Add an AVU alongside existing ones
    Add(AvuArgs),
    /// Remove one exact AVU
    Rm(AvuArgs),
    /// Remove AVUs matching LIKE patterns (omitted units match only empty units)
    Rmw(AvuArgs),
    /// Add an AVU to every data object matching a wildcard
    Addw(AddwArgs),
    /// List AVUs, optionally for one attribute
    Ls(ListArgs),
    /// List AVUs whose attribute matches a LIKE pattern
    Lsw(ListArgs),
    /// Find targets whose AVUs satisfy every condition
    Qu(QueryArgs),
}

impl Cli {
    /// `qu` conditions take every remaining argument, so global flags typed
    /// after them land in the condition list. Pull trailing ones back out.
    pub fn hoist_query_flags(&mut self) {
        let Command::Qu(args) = &mut self.command else {
            return;
        };
        let conditions = &mut args.conditions;
        loop {
            match conditions.as_slice() {
                [.., last] if last == "--json" => {
                    self.json = true;
                    conditions.pop();
                }
                [.., last] if last.starts_with("--user=") || last.starts_with("--catalog=") => {
                    let Some((flag, value)) = last.split_once('=') else {
                        break;
                    };
                    let value = value.to_owned();
                    if flag == "--user" {
                        self.user = Some(value);
                    } else {
                        self.catalog = Some(PathBuf::from(value));
                    }
                    conditions.pop();
                }
                [.., flag, value] if flag == "--user" || flag == "--catalog" => {
                    let value = value.clone();
                    if flag == "--user" {
                        self.user = Some(value);
                    } else {
                        self.catalog = Some(PathBuf::from(value));
                    }
                    conditions.truncate(conditions.len() - 2);
                }
                _ => break,
            }
        }
    }
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Self::Set(_) => "imeta set",
            Self::Add(_) => "imeta add",
            Self::Rm(_) => "imeta rm",
            Self::Rmw(_) => "imeta rmw",
            Self::Addw(_) => "imeta addw",
            Self::Ls(_) => "imeta ls",
            Self::Lsw(_) => "imeta lsw",
            Self::Qu(_) => "imeta qu",
        }
    }
}

/// Parse CLI arguments and dispatch.
///
/// Returns the process exit code:
/// - `0`: success
/// - `1`: the catalog refused the operation (token on stderr)
/// - `2`: usage error or the catalog file could not be used
pub fn run() -> u8 {
    let mut cli = Cli::parse();
    cli.hoist_query_flags();
    crate::logging::init();

    match execute(&cli) {
        Ok(stdout) => {
            print!("{stdout}");
            DomainOutcome::Success.exit_code()
        }
        Err(error) => report_error(cli.command.name(), cli.json, &error),
    }
}

/// Print a failure on stderr and return its exit code.
pub(crate) fn report_error(operation: &str, json: bool, error: &StoreError) -> u8 {
    let message = error.to_string();
    if json {
        eprintln!("{}", error_json(error.code(), &message));
    } else {
        eprintln!("{}", error_line(operation, error.code(), &message));
    }
    debug!(operation, code = error.code().as_str(), "command failed");
    error.exit_code()
}

pub(crate) fn render_json<T: serde::Serialize>(
    store: &CatalogStore,
    value: &T,
) -> Result<String, StoreError> {
    output::to_sorted_json(value)
        .map(|json| format!("{json}\n"))
        .map_err(|source| StoreError::Json {
            path: store.path().to_path_buf(),
            source,
        })
}

/// Run one `imeta` command, returning what it prints on stdout.
pub fn execute(cli: &Cli) -> Result<String, StoreError> {
    let store = CatalogStore::new(resolve_catalog_path(cli.catalog.as_deref()));
    let identity = require_identity(cli.user.as_deref())?;
    debug!(
        user = %identity,
        catalog = %store.path().display(),
        command = cli.command.name(),
        "dispatch"
    );

    match &cli.command {
        Command::Set(args) => {
            let (kind, name) = args.target.selected();
            let avu = args.avu()?;
            store.transact(|catalog| {
                let actor = catalog.actor(&identity)?;
                catalog.set_avu(&actor, kind, name, avu)
            })?;
            Ok(String::new())
        }
        Command::Add(args) => {
            let (kind, name) = args.target.selected();
            let avu = args.avu()?;
            store.transact(|catalog| {
                let actor = catalog.actor(&identity)?;
                catalog.add_avu(&actor, kind, name, avu)
            })?;
            Ok(String::new())
        }
        Command::Rm(args) => {
            let (kind, name) = args.target.selected();
            let avu = args.avu()?;
            store.transact(|catalog| {
                let actor = catalog.actor(&identity)?;
                catalog.remove_avu(&actor, kind, name, &avu)
            })?;
            Ok(String::new())
        }
        Command::Rmw(args) => {
            let (kind, name) = args.target.selected();
            let pattern = AvuPattern::new(&args.attribute, &args.value, args.units.as_deref());
            store.transact(|catalog| {
                let actor = catalog.actor(&identity)?;
                catalog.remove_avus_matching(&actor, kind, name, &pattern)
            })?;
            Ok(String::new())
        }
        Command::Addw(args) => {
            let units = args.units.as_deref().filter(|units| !units.is_empty());
            let avu = Avu::new(&args.attribute, &args.value, units)?;
            let added = store.transact(|catalog| {
                let actor = catalog.actor(&identity)?;
                catalog.add_avu_wildcard(&actor, &args.wildcard, &avu)
            })?;
            if cli.json {
                render_json(&store, &serde_json::json!({ "added": added }))
            } else {
                Ok(output::render_addw(added))
            }
        }
        Command::Ls(args) | Command::Lsw(args) => {
            let (kind, name) = args.target.selected();
            let filter = match (&cli.command, &args.attribute) {
                (_, None) => AttributeFilter::All,
                (Command::Lsw(_), Some(pattern)) => AttributeFilter::Like(LikePattern::new(pattern)),
                (_, Some(attribute)) => AttributeFilter::Exact(attribute.clone()),
            };
            let listing = store.read(|catalog| {
                let actor = catalog.actor(&identity)?;
                catalog.list_avus(&actor, kind, name, &filter)
            })?;
            if cli.json {
                render_json(&store, &listing)
            } else {
                Ok(output::render_listing(&listing))
            }
        }
        Command::Qu(args) => {
            let kind = args.kind.selected();
            let query = Query::parse(&args.conditions)?;
            let hits = store.read(|catalog| {
                let actor = catalog.actor(&identity)?;
                Ok(query.execute(catalog, &actor, kind))
            })?;
            if cli.json {
                render_json(&store, &hits)
            } else {
                Ok(output::render_query_hits(&hits))
            }
        }
    }
}
