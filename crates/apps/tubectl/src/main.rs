use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tubes::{Process, Remote, TubeConfig};

#[derive(Parser, Debug)]
#[command(name = "tubectl", about = "Attach this terminal to a process or a remote endpoint")]
struct Cli {
    /// TOML file with tube settings (newline, read_chunk, close_grace_ms, echo_stderr).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect to host:port and go interactive.
    Connect {
        host: String,
        port: u16,
        #[arg(long, default_value = "tcp")]
        proto: String,
    },
    /// Spawn a program and go interactive.
    Spawn {
        program: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("tubectl error: failed to start runtime: {err}");
            std::process::exit(1);
        }
    };
    let result = runtime.block_on(run(cli));
    // A terminal read parked on a blocking thread can't be interrupted; don't wait for it.
    runtime.shutdown_background();

    if let Err(err) = result {
        eprintln!("tubectl error: {err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Connect { host, port, proto } => {
            let mut remote = Remote::connect_with(&host, port, &proto, &config)
                .await
                .with_context(|| format!("connecting to {host}:{port}"))?;
            log::info!("connected to {} over {}", remote.peer_addr(), remote.protocol());
            remote.interactive().await.context("interactive session")?;
        }
        Command::Spawn { program, args } => {
            let argv = std::iter::once(program.clone()).chain(args);
            let mut process = Process::spawn_with(argv, &config)
                .with_context(|| format!("spawning {program}"))?;
            log::info!("started {} (pid {:?})", process.program(), process.id());
            process.interactive().await.context("interactive session")?;
            let termination = process.close().await?;
            log::info!("{program}: {termination:?}");
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<TubeConfig> {
    match path {
        Some(path) => TubeConfig::from_path(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(TubeConfig::default()),
    }
}
