//! Directory navigation built-ins: cd with history, and the pushd/popd
//! directory stack.

use std::env;
use std::fs;

use crate::repl::ShellState;

fn current_dir_string() -> String {
    env::current_dir()
        .unwrap_or_else(|_| "/".into())
        .display()
        .to_string()
}

/// Lexical canonicalization: collapses `.`, `..` and repeated slashes
/// without touching the filesystem. Input is expected to be absolute.
fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    let mut out = String::from("/");
    out.push_str(&parts.join("/"));
    out
}

fn change_directory(path: &str) -> i32 {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(err) => {
            println!("stat({path}) failed: {err}");
            return 1;
        }
    };
    if !metadata.is_dir() {
        println!("Not a directory: {path}");
        return 1;
    }
    if let Err(err) = env::set_current_dir(path) {
        println!("chdir({path}) failed: {err}");
        return 1;
    }
    0
}

pub(super) fn builtin_cd(state: &mut ShellState, args: &[String]) -> i32 {
    let cwd = current_dir_string();
    let new_path = match args.get(1).map(String::as_str) {
        None => {
            let home = state.home.display().to_string();
            push_cd_history(state, &home);
            home
        }
        Some(arg) => {
            push_cd_history(state, arg);
            if arg == "-" {
                match env::var("OLDPWD") {
                    Ok(oldpwd) => oldpwd,
                    Err(_) => return 1,
                }
            } else if arg.starts_with('/') {
                arg.to_string()
            } else {
                format!("{cwd}/{arg}")
            }
        }
    };

    let path = normalize_path(&new_path);
    let code = change_directory(&path);
    if code != 0 {
        return code;
    }
    env::set_var("OLDPWD", &cwd);
    env::set_var("PWD", &path);
    0
}

fn push_cd_history(state: &mut ShellState, entry: &str) {
    if state.cd_history.back().map(String::as_str) != Some(entry) {
        state.cd_history.push_back(entry.to_string());
    }
}

pub(super) fn builtin_cdh(state: &mut ShellState, args: &[String]) -> i32 {
    match args.get(1) {
        None => {
            if state.cd_history.is_empty() {
                println!("cdh: no history available");
                return 0;
            }
            let len = state.cd_history.len();
            for (i, entry) in state.cd_history.iter().enumerate().rev() {
                println!("{}: {}", len - i, entry);
            }
            0
        }
        Some(arg) => {
            let Ok(index) = arg.parse::<usize>() else {
                eprintln!("cdh: invalid index: {arg}");
                return 1;
            };
            let len = state.cd_history.len();
            if index < 1 || index > len {
                eprintln!("cdh: history index out of bounds: {index} not in (0, {len})");
                return 1;
            }
            let path = state.cd_history[len - index].clone();
            builtin_cd(state, &["cd".to_string(), path])
        }
    }
}

pub(super) fn builtin_pwd() -> i32 {
    println!("{}", current_dir_string());
    0
}

pub(super) fn builtin_dirs(state: &mut ShellState, args: &[String]) -> i32 {
    // The first stack entry always mirrors the current directory.
    if let Some(first) = state.directory_stack.first_mut() {
        *first = current_dir_string();
    }

    if args.len() == 1 {
        println!("{}", state.directory_stack.join(" "));
        return 0;
    }

    let mut clear = false;
    let mut print = false;
    let mut number_when_printing = false;
    let mut paths = Vec::new();
    for arg in &args[1..] {
        match arg.as_str() {
            "-c" => clear = true,
            "-p" => print = true,
            "-v" => number_when_printing = true,
            other => paths.push(other.to_string()),
        }
    }
    let print = print || number_when_printing;

    if clear {
        state.directory_stack.truncate(1);
    }
    state.directory_stack.extend(paths);

    if print {
        for (index, directory) in state.directory_stack.iter().enumerate() {
            if number_when_printing {
                println!("{index} {directory}");
            } else {
                println!("{directory}");
            }
        }
    }
    0
}

pub(super) fn builtin_pushd(state: &mut ShellState, args: &[String]) -> i32 {
    // Without arguments the top two entries swap and the new top becomes
    // the working directory.
    if args.len() == 1 {
        if state.directory_stack.len() < 2 {
            eprintln!("pushd: no other directory");
            return 1;
        }
        state.directory_stack.swap(0, 1);
        let target = state.directory_stack[0].clone();
        return change_directory(&target);
    }

    let mut should_switch = true;
    let mut target = None;
    for arg in &args[1..] {
        if arg == "-n" {
            should_switch = false;
        } else {
            target = Some(arg.to_string());
        }
    }
    let Some(target) = target else {
        eprintln!("pushd: no directory given");
        return 1;
    };

    let cwd = current_dir_string();
    state.directory_stack.push(cwd.clone());
    let path = if target.starts_with('/') {
        target
    } else {
        format!("{cwd}/{target}")
    };
    let path = normalize_path(&path);

    if should_switch {
        return change_directory(&path);
    }
    match fs::metadata(&path) {
        Ok(metadata) if metadata.is_dir() => 0,
        Ok(_) => {
            eprintln!("Not a directory: {path}");
            1
        }
        Err(err) => {
            eprintln!("stat({path}) failed: {err}");
            1
        }
    }
}

pub(super) fn builtin_popd(state: &mut ShellState, args: &[String]) -> i32 {
    if state.directory_stack.len() <= 1 {
        eprintln!("Shell: popd: directory stack empty");
        return 1;
    }
    let should_switch = !args[1..].iter().any(|arg| arg == "-n");
    let path = state.directory_stack.pop().unwrap_or_default();
    let path = normalize_path(&path);
    if should_switch {
        return change_directory(&path);
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_dots_and_slashes() {
        assert_eq!(normalize_path("/a/b/../c"), "/a/c");
        assert_eq!(normalize_path("/a//b/./c/"), "/a/b/c");
        assert_eq!(normalize_path("/.."), "/");
        assert_eq!(normalize_path("/"), "/");
    }
}
