use clap::{Parser, Subcommand};
use sshtask::{
    template, ConnectOptions, Elevation, LsOptions, MkdirOptions, Params, PutOptions, PutOutcome,
    Scope, Session, Source, TaskError,
};
use sshtask::services::logger::LogLevel;
use std::path::PathBuf;

/// Run commands and move files on a remote host over SSH
#[derive(Parser)]
#[command(name = "sshtask")]
#[command(version)]
#[command(after_help = "EXAMPLES:
    sshtask --host deploy@web1 run uptime
    sshtask --host web1 --cd /srv/app --sudo run git pull
    sshtask --host web1 --env RUST_LOG=debug --screen=build run cargo build
    sshtask --host web1 put ./nginx.conf /etc/nginx/nginx.conf --owner root
    sshtask --host web1 template ./unit.tmpl /etc/systemd/system/app.service --param port=8080")]
struct Cli {
    /// Target as [user@]host[:port]; host may be an alias from the config file
    #[arg(long, global = true)]
    host: Option<String>,

    /// Host overrides file (JSON keyed by host)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print what would run without connecting
    #[arg(long, global = true)]
    dry_run: bool,

    /// Proxy command (%h, %p and %r are expanded)
    #[arg(long, global = true)]
    proxy: Option<String>,

    /// Diagnostics level: off, error, warn, info or debug
    #[arg(long, global = true, value_parser = parse_level)]
    log_level: Option<LogLevel>,

    /// Working directory for the command
    #[arg(long, global = true)]
    cd: Option<String>,

    /// Environment variable for the command, as KEY=VALUE
    #[arg(long = "env", global = true, value_parser = parse_pair)]
    env: Vec<(String, String)>,

    /// Run through sudo, optionally as another user
    #[arg(long, global = true, num_args = 0..=1, default_missing_value = "")]
    sudo: Option<String>,

    /// Run inside a detachable screen session, optionally named
    #[arg(long, global = true, num_args = 0..=1, default_missing_value = "")]
    screen: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a shell command
    Run {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Check whether a path exists
    Exists { path: String },

    /// List a directory
    Ls {
        path: String,

        /// Hide dotfiles
        #[arg(long)]
        no_all: bool,
    },

    /// Create a directory
    Mkdir {
        path: String,

        /// Fail if the directory exists or its parent is missing
        #[arg(long)]
        no_parents: bool,

        #[arg(long)]
        mode: Option<String>,
    },

    /// Upload a file or directory
    Put {
        local: PathBuf,
        remote: String,

        /// Upload even if the remote copy looks current
        #[arg(long)]
        force: bool,

        #[arg(long)]
        owner: Option<String>,
    },

    /// Download a file
    Get { remote: String, local: PathBuf },

    /// Render a local template with $$name placeholders and upload it
    Template {
        source: PathBuf,
        remote: String,

        /// Template parameter, as NAME=VALUE
        #[arg(long = "param", value_parser = parse_pair)]
        params: Vec<(String, String)>,

        #[arg(long)]
        owner: Option<String>,
    },
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

fn scopes(cli: &Cli) -> Vec<Scope> {
    let mut scopes = Vec::new();
    if let Some(cwd) = cli.cd.as_ref() {
        scopes.push(Scope::Cwd(cwd.clone()));
    }
    if !cli.env.is_empty() {
        scopes.push(Scope::Env(cli.env.clone()));
    }
    if let Some(user) = cli.sudo.as_deref() {
        let elevation = if user.is_empty() {
            Elevation::new()
        } else {
            Elevation::new().user(user)
        };
        scopes.push(Scope::Elevation(elevation));
    }
    if let Some(name) = cli.screen.as_deref() {
        let name = if name.is_empty() { "default" } else { name };
        scopes.push(Scope::Multiplexer(name.to_string()));
    }
    scopes
}

/// Enters `scopes` outermost first, then runs the command inside all of them.
fn within(session: &mut Session, scopes: &[Scope], command: &Commands) -> Result<(), TaskError> {
    match scopes.split_first() {
        Some((scope, rest)) => {
            let mut scoped = session.scope(scope.clone());
            within(&mut scoped, rest, command)
        }
        None => dispatch(session, command),
    }
}

fn dispatch(session: &mut Session, command: &Commands) -> Result<(), TaskError> {
    match command {
        Commands::Run { command } => {
            let status = session.run(&command.join(" "))?;
            if session.is_dry_run() {
                println!("{}", session.render(&command.join(" ")));
                eprintln!("{}", status);
            }
        }
        Commands::Exists { path } => {
            println!("{}", session.exists(path)?);
        }
        Commands::Ls { path, no_all } => {
            let options = LsOptions {
                all: !no_all,
                ..LsOptions::default()
            };
            session.ls_with(path, &options)?;
        }
        Commands::Mkdir {
            path,
            no_parents,
            mode,
        } => {
            let options = MkdirOptions {
                parents: !no_parents,
                mode: mode.clone(),
            };
            session.mkdir_with(path, &options)?;
        }
        Commands::Put {
            local,
            remote,
            force,
            owner,
        } => {
            if !local.exists() {
                return Err(TaskError::invalid_params(format!(
                    "Local path not found: {}",
                    local.display()
                )));
            }
            let options = PutOptions {
                force: *force,
                owner: owner.clone(),
            };
            report_put(session.put_with(local.clone(), remote, &options)?, remote);
        }
        Commands::Get { remote, local } => {
            let bytes = session.get(remote, local)?;
            println!("{} bytes -> {}", bytes, local.display());
        }
        Commands::Template {
            source,
            remote,
            params,
            owner,
        } => {
            let params: Params = params.iter().cloned().collect();
            let mut file = std::fs::File::open(source).map_err(|err| {
                TaskError::invalid_params(format!("Cannot open {}: {}", source.display(), err))
            })?;
            let rendered = template(&mut file, &params)?;
            let options = PutOptions {
                force: true,
                owner: owner.clone(),
            };
            report_put(session.put_with(Source::from(rendered), remote, &options)?, remote);
        }
    }
    Ok(())
}

fn report_put(outcome: PutOutcome, remote: &str) {
    match outcome {
        PutOutcome::Transferred { bytes } => println!("{} bytes -> {}", bytes, remote),
        PutOutcome::Skipped => println!("{} is up to date", remote),
        PutOutcome::DryRun => println!("[dry-run] put {}", remote),
        PutOutcome::Directory { files } => println!("{} files -> {}", files, remote),
    }
}

fn parse_level(raw: &str) -> Result<LogLevel, String> {
    Ok(LogLevel::parse(raw))
}

fn execute(cli: &Cli) -> Result<(), TaskError> {
    let host = cli
        .host
        .as_deref()
        .ok_or_else(|| TaskError::invalid_params("--host is required"))?;
    let options = ConnectOptions {
        config_path: cli.config.clone(),
        proxy: cli.proxy.clone(),
        dry_run: cli.dry_run,
        log_level: cli.log_level,
    };
    let mut session = Session::connect(host, &options)?;
    within(&mut session, &scopes(cli), &cli.command)?;
    session.close()
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = execute(&cli) {
        eprintln!("sshtask: {}", err);
        if let Some(stderr) = err.stderr().filter(|s| !s.trim().is_empty()) {
            eprintln!("{}", stderr.trim_end());
        }
        if let Some(hint) = err.hint.as_deref() {
            eprintln!("hint: {}", hint);
        }
        std::process::exit(1);
    }
}
