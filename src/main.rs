// src/main.rs

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use serde::Serialize;
use std::cmp::Ordering;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use zif::metadata::{Category, Changeset, Update};
use zif::packages::filter_newest;
use zif::version::compare_evr;
use zif::{
    Cancellable, Config, HttpFetcher, InstalledPackages, LocalStore, Package, PackageIdentity,
    RemoteRepository, RepositorySet, RpmDirectoryStore,
};

#[derive(Parser)]
#[command(name = "zif")]
#[command(author, version, about = "Query and maintain a local cache of yum repository metadata", long_about = None)]
struct Cli {
    /// System configuration file
    #[arg(long, global = true, default_value = "/etc/yum.conf")]
    config: PathBuf,

    /// Metadata cache directory (overrides cachedir in the config file)
    #[arg(long, global = true)]
    cachedir: Option<PathBuf>,

    /// Release version substituted for $releasever
    #[arg(long, global = true)]
    releasever: Option<String>,

    /// Never touch the network; fail if the cache is stale
    #[arg(long, global = true)]
    offline: bool,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured repositories
    RepoList,
    /// Enable a repository
    RepoEnable {
        /// Repository id
        id: String,
    },
    /// Disable a repository
    RepoDisable {
        /// Repository id
        id: String,
    },
    /// Download fresh metadata
    Refresh {
        /// Re-download files even if the cached copy is valid
        #[arg(short, long)]
        force: bool,
        /// Repository id (refreshes all enabled repositories if omitted)
        id: Option<String>,
    },
    /// Delete cached metadata
    Clean {
        /// Repository id (cleans all repositories if omitted)
        id: Option<String>,
    },
    /// Find packages by exact name
    Resolve {
        name: String,
    },
    /// Find packages whose name contains the text
    SearchName {
        text: String,
    },
    /// Find packages whose name, summary or description contains the text
    SearchDetails {
        text: String,
    },
    /// Find packages in an RPM group, e.g. "System Environment/Libraries"
    SearchGroup {
        group: String,
    },
    /// Find packages that ship a file
    SearchFile {
        /// Absolute path
        path: String,
    },
    /// Show one package by `name;evr;arch;repo`
    FindPackage {
        package_id: String,
    },
    /// Show the changelog of one package by `name;evr;arch;repo`
    Changelog {
        package_id: String,
    },
    /// Show the advisories that ship one package by `name;evr;arch;repo`
    UpdateInfo {
        package_id: String,
    },
    /// List available updates for a set of installed packages
    GetUpdates {
        /// Directory of installed RPM files
        #[arg(long)]
        installed: PathBuf,
    },
    /// List comps categories and their groups
    GetCategories,
    /// List the packages in a comps group
    SearchCategory {
        /// Comps group id
        group_id: String,
        /// Directory of installed RPM files, preferred over available packages
        #[arg(long)]
        installed: Option<PathBuf>,
    },
    /// Compare two [epoch:]version[-release] strings
    CompareEvr {
        a: String,
        b: String,
    },
    /// Generate shell completion scripts
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// One line of package output
#[derive(Serialize)]
struct PackageRow<'a> {
    package_id: String,
    #[serde(flatten)]
    id: &'a PackageIdentity,
    summary: Option<String>,
}

impl<'a> PackageRow<'a> {
    fn new(package: &'a Package) -> Self {
        Self {
            package_id: package.package_id(),
            id: package.id(),
            summary: package.summary().ok().map(|s| s.to_string()),
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_packages(packages: &[Package], json: bool) -> Result<()> {
    let rows: Vec<PackageRow> = packages.iter().map(PackageRow::new).collect();
    if json {
        return print_json(&rows);
    }

    if rows.is_empty() {
        println!("No packages found.");
        return Ok(());
    }
    for row in &rows {
        println!("  {}  {}", row.package_id, row.summary.as_deref().unwrap_or(""));
    }
    println!("\nTotal: {} package(s)", rows.len());
    Ok(())
}

fn print_categories(categories: &[Category], json: bool) -> Result<()> {
    if json {
        return print_json(categories);
    }
    for category in categories {
        match &category.parent_id {
            None => println!("{}  {}", category.id, category.name),
            Some(_) => println!("  {}  {}", category.id, category.name),
        }
    }
    Ok(())
}

fn print_changelog(changes: &[Changeset], json: bool) -> Result<()> {
    if json {
        return print_json(changes);
    }
    for change in changes {
        let date = change
            .date_time()
            .map(|d| d.format("%a %b %d %Y").to_string())
            .unwrap_or_default();
        match &change.version {
            Some(version) => println!("* {} {} - {}", date, change.author, version),
            None => println!("* {} {}", date, change.author),
        }
        println!("{}\n", change.description);
    }
    Ok(())
}

fn print_updates(updates: &[Update], json: bool) -> Result<()> {
    if json {
        return print_json(updates);
    }
    for update in updates {
        println!("{} ({})", update.id, update.kind.as_str());
        if let Some(title) = &update.title {
            println!("  Title: {}", title);
        }
        if let Some(issued) = &update.issued {
            println!("  Issued: {}", issued);
        }
        if update.reboot {
            println!("  Reboot suggested");
        }
        for reference in &update.references {
            println!("  {:?}: {}", reference.kind, reference.url.as_deref().unwrap_or(""));
        }
        if let Some(description) = &update.description {
            println!("  {}", description);
        }
    }
    Ok(())
}

/// "3 hours ago" style age of a cache timestamp
fn format_age(updated: Option<DateTime<Utc>>) -> String {
    let Some(updated) = updated else {
        return "never".to_string();
    };

    let age = Utc::now().signed_duration_since(updated);
    if age.num_days() > 0 {
        format!("{} day(s) ago", age.num_days())
    } else if age.num_hours() > 0 {
        format!("{} hour(s) ago", age.num_hours())
    } else if age.num_minutes() > 0 {
        format!("{} minute(s) ago", age.num_minutes())
    } else {
        "just now".to_string()
    }
}

fn load_config(cli: &Cli) -> Result<Arc<Config>> {
    let config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    if let Some(cachedir) = &cli.cachedir {
        config.set_local("cachedir", &cachedir.to_string_lossy())?;
    }
    if let Some(releasever) = &cli.releasever {
        config.set_local("releasever", releasever)?;
    }
    config.set_local("network", if cli.offline { "false" } else { "true" })?;

    Ok(Arc::new(config))
}

/// Run a query against every enabled repository and concatenate the results
fn query_enabled<F>(set: &mut RepositorySet, mut query: F) -> Result<Vec<Package>>
where
    F: FnMut(&mut RemoteRepository) -> zif::Result<Vec<Package>>,
{
    let mut packages = Vec::new();
    for repo in set.get_stores_enabled() {
        let id = repo.id().to_string();
        packages.extend(query(repo).with_context(|| format!("Query failed for {}", id))?);
    }
    Ok(packages)
}

fn show_package(repo: &mut RemoteRepository, package: &Package, cancel: &Cancellable, json: bool) -> Result<()> {
    if let Err(e) = repo.load_filelists(cancel) {
        warn!("File list unavailable for {}: {}", repo.id(), e);
    }

    #[derive(Serialize)]
    struct Details<'a> {
        #[serde(flatten)]
        row: PackageRow<'a>,
        description: Option<String>,
        license: Option<String>,
        url: Option<String>,
        group: Option<zif::packages::Group>,
        size: Option<u64>,
        requires: Vec<String>,
        provides: Vec<String>,
        files: Vec<String>,
    }

    let depends = |list: zif::Result<&[zif::Depend]>| -> Vec<String> {
        list.map(|d| d.iter().map(ToString::to_string).collect())
            .unwrap_or_default()
    };

    let details = Details {
        row: PackageRow::new(package),
        description: package.description().ok().map(|s| s.to_string()),
        license: package.license().ok().map(|s| s.to_string()),
        url: package.url().ok().map(|s| s.to_string()),
        group: package.group().ok(),
        size: package.size().ok(),
        requires: depends(package.requires()),
        provides: depends(package.provides()),
        files: package.files().map(|f| f.to_vec()).unwrap_or_default(),
    };

    if json {
        return print_json(&details);
    }

    println!("Package: {}", details.row.package_id);
    println!("  Summary: {}", details.row.summary.as_deref().unwrap_or(""));
    println!("  License: {}", details.license.as_deref().unwrap_or("unknown"));
    println!("  URL: {}", details.url.as_deref().unwrap_or("none"));
    if let Some(group) = details.group {
        println!("  Group: {:?}", group);
    }
    if let Some(size) = details.size {
        println!("  Size: {} bytes", size);
    }
    if let Some(description) = &details.description {
        println!("  Description: {}", description);
    }
    println!("  Requires: {}", details.requires.len());
    for depend in &details.requires {
        println!("    {}", depend);
    }
    println!("  Provides: {}", details.provides.len());
    for depend in &details.provides {
        println!("    {}", depend);
    }
    println!("  Files: {}", details.files.len());
    for file in &details.files {
        println!("    {}", file);
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing subscriber for logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    // Commands that need no configuration
    match &cli.command {
        Commands::CompareEvr { a, b } => {
            let symbol = match compare_evr(a, b) {
                Ordering::Less => "<",
                Ordering::Equal => "==",
                Ordering::Greater => ">",
            };
            println!("{} {} {}", a, symbol, b);
            return Ok(());
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(*shell, &mut cmd, "zif", &mut io::stdout());
            return Ok(());
        }
        _ => {}
    }

    let config = load_config(&cli)?;
    let fetcher = Arc::new(HttpFetcher::new(config.connection_timeout())?);
    let mut set = RepositorySet::load(config.clone(), fetcher)
        .context("Failed to load repositories")?;
    let cancel = Cancellable::new();
    let json = cli.json;

    match cli.command {
        Commands::RepoList => {
            let summaries: Vec<_> = set.get_stores().iter().map(|r| r.summary()).collect();
            if json {
                return print_json(&summaries);
            }
            if summaries.is_empty() {
                println!("No repositories configured.");
                return Ok(());
            }
            for summary in &summaries {
                println!(
                    "  {:<24} {:<8} {:<16} {}",
                    summary.id,
                    if summary.enabled { "enabled" } else { "disabled" },
                    format_age(summary.updated),
                    summary.name
                );
            }
            Ok(())
        }
        Commands::RepoEnable { id } => {
            set.get_store(&id)?.set_enabled(true)?;
            println!("Enabled repository: {}", id);
            Ok(())
        }
        Commands::RepoDisable { id } => {
            set.get_store(&id)?.set_enabled(false)?;
            println!("Disabled repository: {}", id);
            Ok(())
        }
        Commands::Refresh { force, id } => {
            if let Some(id) = id {
                set.get_store(&id)?
                    .refresh(force, &cancel)
                    .with_context(|| format!("Failed to refresh {}", id))?;
                println!("Refreshed repository: {}", id);
                return Ok(());
            }

            let results = set.refresh_all(force, &cancel);
            let mut failed = 0;
            for (id, result) in &results {
                match result {
                    Ok(()) => println!("  [OK] Refreshed {}", id),
                    Err(e) => {
                        failed += 1;
                        println!("  [FAILED] Failed to refresh {}: {}", id, e);
                    }
                }
            }
            if failed > 0 {
                return Err(anyhow::anyhow!(
                    "{} of {} repositories failed to refresh",
                    failed,
                    results.len()
                ));
            }
            Ok(())
        }
        Commands::Clean { id } => {
            match id {
                Some(id) => {
                    set.get_store(&id)?.clean(&cancel)?;
                    println!("Cleaned repository: {}", id);
                }
                None => {
                    for repo in set.get_stores() {
                        repo.clean(&cancel)
                            .with_context(|| format!("Failed to clean {}", repo.id()))?;
                        println!("Cleaned repository: {}", repo.id());
                    }
                }
            }
            Ok(())
        }
        Commands::Resolve { name } => {
            let packages = query_enabled(&mut set, |repo| repo.resolve(&name, &cancel))?;
            print_packages(&packages, json)
        }
        Commands::SearchName { text } => {
            let packages = query_enabled(&mut set, |repo| repo.search_name(&text, &cancel))?;
            print_packages(&packages, json)
        }
        Commands::SearchDetails { text } => {
            let packages = query_enabled(&mut set, |repo| repo.search_details(&text, &cancel))?;
            print_packages(&packages, json)
        }
        Commands::SearchGroup { group } => {
            let packages = query_enabled(&mut set, |repo| repo.search_group(&group, &cancel))?;
            print_packages(&packages, json)
        }
        Commands::SearchFile { path } => {
            let packages = query_enabled(&mut set, |repo| repo.search_file(&path, &cancel))?;
            print_packages(&packages, json)
        }
        Commands::FindPackage { package_id } => {
            let id = PackageIdentity::parse(&package_id)?;
            let repo = set.get_store(&id.data)?;
            let package = repo.find_package(&package_id, &cancel)?;
            show_package(repo, &package, &cancel, json)
        }
        Commands::Changelog { package_id } => {
            let id = PackageIdentity::parse(&package_id)?;
            let changes = set.get_store(&id.data)?.get_changelog(&package_id, &cancel)?;
            print_changelog(&changes, json)
        }
        Commands::UpdateInfo { package_id } => {
            let id = PackageIdentity::parse(&package_id)?;
            let updates = set.get_store(&id.data)?.get_update_detail(&package_id, &cancel)?;
            print_updates(&updates, json)
        }
        Commands::GetUpdates { installed } => {
            let store = RpmDirectoryStore::open(&installed)?;
            info!("Checking {} installed packages for updates", store.get_packages()?.len());
            let updates = query_enabled(&mut set, |repo| repo.get_updates(&store, &cancel))?;
            print_packages(&filter_newest(updates), json)
        }
        Commands::GetCategories => {
            let mut categories: Vec<Category> = Vec::new();
            for repo in set.get_stores_enabled() {
                for category in repo.get_categories(&cancel)? {
                    if !categories
                        .iter()
                        .any(|c| c.id == category.id && c.parent_id == category.parent_id)
                    {
                        categories.push(category);
                    }
                }
            }
            print_categories(&categories, json)
        }
        Commands::SearchCategory { group_id, installed } => {
            let store: Box<dyn LocalStore> = match installed {
                Some(dir) => Box::new(RpmDirectoryStore::open(&dir)?),
                None => Box::new(InstalledPackages::default()),
            };
            let packages = query_enabled(&mut set, |repo| {
                repo.search_category(&group_id, store.as_ref(), &cancel)
            })?;
            print_packages(&filter_newest(packages), json)
        }
        Commands::CompareEvr { .. } | Commands::Completions { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_global_flags() {
        let cli = Cli::try_parse_from([
            "zif",
            "resolve",
            "hal",
            "--offline",
            "--releasever",
            "12",
            "--cachedir",
            "/tmp/zif",
        ])
        .unwrap();

        assert!(cli.offline);
        assert_eq!(cli.releasever.as_deref(), Some("12"));
        assert_eq!(cli.config, PathBuf::from("/etc/yum.conf"));
        assert!(matches!(cli.command, Commands::Resolve { ref name } if name == "hal"));
    }

    #[test]
    fn test_cli_refresh_flags() {
        let cli = Cli::try_parse_from(["zif", "refresh", "--force", "fedora"]).unwrap();
        match cli.command {
            Commands::Refresh { force, id } => {
                assert!(force);
                assert_eq!(id.as_deref(), Some("fedora"));
            }
            _ => panic!("expected refresh"),
        }
    }

    #[test]
    fn test_cli_what_changed_commands() {
        let cli = Cli::try_parse_from(["zif", "update-info", "hal;0.5.14-1.fc11;i386;fedora"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::UpdateInfo { ref package_id } if package_id == "hal;0.5.14-1.fc11;i386;fedora"
        ));
        let cli = Cli::try_parse_from(["zif", "changelog", "--json", "kernel;1:2.6.31-5.fc12;i686;fedora"]).unwrap();
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Changelog { .. }));
    }

    #[test]
    fn test_format_age() {
        assert_eq!(format_age(None), "never");
        assert_eq!(format_age(Some(Utc::now())), "just now");
        let then = Utc::now() - chrono::Duration::hours(3);
        assert_eq!(format_age(Some(then)), "3 hour(s) ago");
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }
}
