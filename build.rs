// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn build_cli() -> Command {
    Command::new("relpac")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Relpac Contributors")
        .about("pacman-compatible package manager for relative root directories")
        .subcommand_required(false)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .global(true)
                .help("Configuration file (default: relpac.conf or pacman.conf in ./etc or .)"),
        )
        .subcommand(
            Command::new("install")
                .about("Install packages and their dependencies")
                .arg(
                    Arg::new("packages")
                        .required(true)
                        .num_args(1..)
                        .help("Package names"),
                ),
        )
        .subcommand(
            Command::new("remove")
                .about("Remove installed packages")
                .arg(
                    Arg::new("packages")
                        .required(true)
                        .num_args(1..)
                        .help("Package names"),
                ),
        )
        .subcommand(
            Command::new("update")
                .about("Update installed packages from repositories")
                .arg(
                    Arg::new("packages")
                        .num_args(0..)
                        .help("Package names (updates everything outdated if omitted)"),
                ),
        )
        .subcommand(
            Command::new("list")
                .about("List packages offered by repositories")
                .arg(Arg::new("repository").help("Only list this repository")),
        )
        .subcommand(
            Command::new("search")
                .about("Search package names in repositories")
                .arg(
                    Arg::new("pattern")
                        .required(true)
                        .help("Substring of the package name"),
                ),
        )
        .subcommand(
            Command::new("show")
                .about("Show package details")
                .arg(Arg::new("package").help("Package name (shows every package if omitted)"))
                .arg(
                    Arg::new("installed")
                        .short('i')
                        .long("installed")
                        .action(ArgAction::SetTrue)
                        .help("Show the installed package instead of the repository one"),
                ),
        )
        .subcommand(Command::new("installed").about("List installed packages"))
        .subcommand(
            Command::new("files")
                .about("List the files owned by an installed package")
                .arg(Arg::new("package").required(true).help("Package name")),
        )
        .subcommand(
            Command::new("sync")
                .about("Download repository databases")
                .arg(
                    Arg::new("force")
                        .short('f')
                        .long("force")
                        .action(ArgAction::SetTrue)
                        .help("Download even when the cached databases are recent"),
                ),
        )
        .subcommand(Command::new("config").about("Print the effective configuration"))
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

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    // Generate main man page
    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("relpac.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");

    println!("cargo:warning=Man page generated at {}", man_path.display());
}
