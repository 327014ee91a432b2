//! An ext2-style filesystem simulator over a fixed-size disk image file,
//! driven by a shell-style command interpreter.

mod shell;

use ext2fs::users::DEFAULT_STORE_PATH;
use std::env;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::exit;

/// Structure storing command line arguments.
#[derive(Default)]
struct Args {
    /// If true, print command line help.
    help: bool,
    /// The path to the user store file.
    users: Option<PathBuf>,
    /// The path to a disk image to mount before the first prompt.
    image: Option<PathBuf>,
}

fn parse_args<A: Iterator<Item = OsString>>(args: A) -> Args {
    let mut res: Args = Default::default();
    let mut users_follows = false;
    for arg in args {
        if users_follows {
            res.users = Some(PathBuf::from(arg));
            users_follows = false;
            continue;
        }
        match arg.to_str() {
            Some("-h" | "--help") => res.help = true,
            Some("-u" | "--users") => users_follows = true,
            _ => res.image = Some(PathBuf::from(arg)),
        }
    }
    res
}

/// Prints command line help.
fn print_help() {
    println!("Usage:");
    println!(" ext2fs [-u users_file] [image]");
    println!();
    println!("Runs the filesystem simulator's interactive shell.");
    println!();
    println!("Options:");
    println!(" -h, --help\t\tPrints help.");
    println!(" -u, --users <file>\tSelects the user store file (default `users`).");
    println!(" image\t\t\tA disk image to mount before the first prompt.");
}

fn main() {
    let args = parse_args(env::args_os().skip(1));
    if args.help {
        print_help();
        exit(0);
    }
    let users_path = args
        .users
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH));
    exit(shell::run(users_path, args.image));
}
