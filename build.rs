// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn build_cli() -> Command {
    Command::new("zif")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Zif Contributors")
        .about("Query and maintain a local cache of yum repository metadata")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .default_value("/etc/yum.conf")
                .global(true)
                .help("System configuration file"),
        )
        .arg(
            Arg::new("cachedir")
                .long("cachedir")
                .value_name("DIR")
                .global(true)
                .help("Metadata cache directory (overrides cachedir in the config file)"),
        )
        .arg(
            Arg::new("releasever")
                .long("releasever")
                .value_name("VERSION")
                .global(true)
                .help("Release version substituted for $releasever"),
        )
        .arg(
            Arg::new("offline")
                .long("offline")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Never touch the network; fail if the cache is stale"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Log at debug level"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Print results as JSON"),
        )
        .subcommand(Command::new("repo-list").about("List configured repositories"))
        .subcommand(
            Command::new("repo-enable")
                .about("Enable a repository")
                .arg(Arg::new("id").required(true).help("Repository id")),
        )
        .subcommand(
            Command::new("repo-disable")
                .about("Disable a repository")
                .arg(Arg::new("id").required(true).help("Repository id")),
        )
        .subcommand(
            Command::new("refresh")
                .about("Download fresh metadata")
                .arg(
                    Arg::new("force")
                        .short('f')
                        .long("force")
                        .action(ArgAction::SetTrue)
                        .help("Re-download files even if the cached copy is valid"),
                )
                .arg(Arg::new("id").help("Repository id (refreshes all enabled repositories if omitted)")),
        )
        .subcommand(
            Command::new("clean")
                .about("Delete cached metadata")
                .arg(Arg::new("id").help("Repository id (cleans all repositories if omitted)")),
        )
        .subcommand(
            Command::new("resolve")
                .about("Find packages by exact name")
                .arg(Arg::new("name").required(true)),
        )
        .subcommand(
            Command::new("search-name")
                .about("Find packages whose name contains the text")
                .arg(Arg::new("text").required(true)),
        )
        .subcommand(
            Command::new("search-details")
                .about("Find packages whose name, summary or description contains the text")
                .arg(Arg::new("text").required(true)),
        )
        .subcommand(
            Command::new("search-group")
                .about("Find packages in an RPM group")
                .arg(Arg::new("group").required(true)),
        )
        .subcommand(
            Command::new("search-file")
                .about("Find packages that ship a file")
                .arg(Arg::new("path").required(true).help("Absolute path")),
        )
        .subcommand(
            Command::new("find-package")
                .about("Show one package by name;evr;arch;repo")
                .arg(Arg::new("package_id").required(true)),
        )
        .subcommand(
            Command::new("changelog")
                .about("Show the changelog of one package by name;evr;arch;repo")
                .arg(Arg::new("package_id").required(true)),
        )
        .subcommand(
            Command::new("update-info")
                .about("Show the advisories that ship one package by name;evr;arch;repo")
                .arg(Arg::new("package_id").required(true)),
        )
        .subcommand(
            Command::new("get-updates")
                .about("List available updates for a set of installed packages")
                .arg(
                    Arg::new("installed")
                        .long("installed")
                        .value_name("DIR")
                        .required(true)
                        .help("Directory of installed RPM files"),
                ),
        )
        .subcommand(Command::new("get-categories").about("List comps categories and their groups"))
        .subcommand(
            Command::new("search-category")
                .about("List the packages in a comps group")
                .arg(Arg::new("group_id").required(true).help("Comps group id"))
                .arg(
                    Arg::new("installed")
                        .long("installed")
                        .value_name("DIR")
                        .help("Directory of installed RPM files, preferred over available packages"),
                ),
        )
        .subcommand(
            Command::new("compare-evr")
                .about("Compare two [epoch:]version[-release] strings")
                .arg(Arg::new("a").required(true))
                .arg(Arg::new("b").required(true)),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "elvish", "fish", "powershell", "zsh"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("zif.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");
}
