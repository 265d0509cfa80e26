//! Environment built-ins: export, unset, umask.

use std::env;

use nix::sys::stat::{umask, Mode};

use crate::completion::cache_executables;
use crate::repl::ShellState;

pub(super) fn builtin_export(state: &mut ShellState, args: &[String]) -> i32 {
    if args.len() == 1 {
        for (name, value) in env::vars() {
            println!("{name}={value}");
        }
        return 0;
    }

    for assignment in &args[1..] {
        let (name, value) = assignment
            .split_once('=')
            .unwrap_or((assignment.as_str(), ""));
        if name.is_empty() {
            eprintln!("export: invalid name: {assignment}");
            return 1;
        }
        env::set_var(name, value);
        if name == "PATH" {
            state.cached_path = cache_executables();
        }
    }
    0
}

pub(super) fn builtin_unset(args: &[String]) -> i32 {
    if args.len() == 1 {
        eprintln!("unset: not enough arguments");
        return 1;
    }
    for name in &args[1..] {
        if name.is_empty() || name.contains('=') {
            eprintln!("unset: invalid name: {name}");
            return 1;
        }
        env::remove_var(name);
    }
    0
}

pub(super) fn builtin_umask(args: &[String]) -> i32 {
    match args.get(1) {
        None => {
            let current = umask(Mode::empty());
            umask(current);
            println!("{:04o}", current.bits());
            0
        }
        Some(text) => match u32::from_str_radix(text, 8) {
            Ok(mask) => {
                umask(Mode::from_bits_truncate(mask));
                0
            }
            Err(_) => {
                eprintln!("umask: invalid octal mask: {text}");
                1
            }
        },
    }
}
