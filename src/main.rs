use std::sync::Arc;

use nix::unistd::isatty;
use signal_hook::consts::signal::SIGCHLD;
use signal_hook::flag;

use brine::repl::{init_state, run_once};
use brine::signals::{init_session, install_signal_handlers};

fn main() {
    init_logging();

    let interactive = isatty(libc::STDIN_FILENO).unwrap_or(false);
    if let Err(err) = install_signal_handlers() {
        eprintln!("brine: {err}");
        return;
    }
    let shell_pgid = match init_session(interactive) {
        Ok(pgid) => pgid,
        Err(err) => {
            eprintln!("brine: {err}");
            return;
        }
    };
    let mut state = match init_state(interactive, shell_pgid) {
        Ok(state) => state,
        Err(err) => {
            eprintln!("brine: {err}");
            return;
        }
    };
    if let Err(err) = flag::register(SIGCHLD, Arc::clone(&state.sigchld_flag)) {
        eprintln!("brine: {err}");
        return;
    }

    loop {
        if let Err(err) = run_once(&mut state) {
            eprintln!("brine: {err}");
        }
    }
}

fn init_logging() {
    let env = env_logger::Env::default().filter_or("BRINE_LOG", "info");
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init();
}
