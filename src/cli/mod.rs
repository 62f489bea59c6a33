pub mod client;
pub mod daemon_path;
pub mod process;
pub mod status;

use std::{env, path::PathBuf};

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use client::send_request;
use daemon_path::to_daemon_path;
use process::{kill_running_daemons, restart_daemon};
use status::print_status;
use tracing::level_filters::LevelFilter;

use crate::{
    daemon::{
        config::TrackerConfig,
        ipc::{
            local_address,
            messages::{FocusCommand, InternalRequest, Reply, Request, StartData},
        },
        start_daemon,
    },
    utils::{
        dir::{create_application_default_path, ensure_dir},
        logging::{enable_logging, CLI_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "tiempocheck", version, long_about = None)]
#[command(about = "Tracks time spent per website and enforces focus sessions", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Starts a daemon for the application")]
    Init,
    #[command(
        about = "Run a daemon directly in current console. Used for debugging"
    )]
    Serve,
    #[command(about = "Stop currently running daemon.")]
    Stop,
    #[command(about = "Show what is tracked, the focus session and today's totals")]
    Status,
    #[command(about = "Start or end a focus session")]
    Focus {
        #[command(subcommand)]
        command: FocusArgs,
    },
    #[command(about = "Let one blocked domain through for the rest of the session")]
    Skip { domain: String },
    #[command(about = "Report the active tab, as a browser bridge would")]
    Tab { url: Option<String> },
    #[command(about = "Clear locally stored totals and history")]
    Reset,
}

#[derive(Subcommand, Debug)]
enum FocusArgs {
    Start {
        #[arg(required = true, help = "Categories to block")]
        categories: Vec<String>,
        #[arg(long, help = "Refuse skips for this session")]
        strict: bool,
        #[arg(long)]
        session_id: Option<String>,
    },
    End,
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let app_dir = match args.dir {
        Some(dir) => ensure_dir(dir)?,
        None => create_application_default_path()?,
    };
    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(CLI_PREFIX, &app_dir.join("logs"), logging_level, args.log)?;
    let config = TrackerConfig::load(&app_dir)?;
    let address = local_address(config.listen_port);

    let request = match args.commands {
        Commands::Init => return restart_daemon(&app_dir),
        Commands::Stop => {
            let killed = kill_running_daemons(&to_daemon_path(env::current_exe()?))?;
            println!("Stopped {killed} daemon(s)");
            return Ok(());
        }
        Commands::Serve => return start_daemon(app_dir, config).await,
        Commands::Status => return print_status(address).await,
        Commands::Focus { command } => Request::Focus(match command {
            FocusArgs::Start {
                categories,
                strict,
                session_id,
            } => FocusCommand::Start {
                data: StartData {
                    categorias: categories,
                    strict,
                    session_id,
                },
            },
            FocusArgs::End => FocusCommand::End { data: None },
        }),
        Commands::Skip { domain } => Request::Internal(InternalRequest::SkipDomain { domain }),
        Commands::Tab { url } => Request::Internal(InternalRequest::TabActivated { url }),
        Commands::Reset => Request::Internal(InternalRequest::ResetStorage),
    };

    let reply = send_request(address, &request).await?;
    print_reply(&reply)
}

fn print_reply(reply: &Reply) -> Result<()> {
    if !reply.success {
        return Err(anyhow!("{}", reply.message));
    }
    println!("{}", reply.message);
    if let Some(redirect) = reply.data.as_ref().and_then(|d| d.get("redirect")) {
        println!("Continue to {}", redirect.as_str().unwrap_or_default());
    }
    Ok(())
}
