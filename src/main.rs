use anyhow::Result;
use clap::Parser;
use puml_render::cli::{self, Cli};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Routes log::info!() etc. to /tmp/puml_render_debug.log.
    // When RUST_LOG is set, also mirrors to stderr.
    puml_render::debug::init_log_bridge(cli.log_level);

    log::info!("Starting puml-render {}", puml_render::VERSION);

    if let Err(e) = cli::run(cli) {
        eprintln!("puml-render: error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
