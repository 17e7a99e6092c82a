use std::{env, path::PathBuf};

use clap::Shell;

#[path = "src/cli.rs"]
mod cli;

fn main() {
    let mut out_dir = match env::var_os("OUT_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => return,
    };
    out_dir.pop();
    out_dir.pop();
    out_dir.pop();

    let mut cli = cli::generate_cli();
    cli.gen_completions("apk-vectors", Shell::Bash, &out_dir);
    cli.gen_completions("apk-vectors", Shell::Fish, out_dir);
    // ZSH completion script generation is blocked by:
    // https://github.com/kbknapp/clap-rs/issues/754
}
