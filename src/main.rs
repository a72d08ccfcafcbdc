use std::{
    io,
    path::PathBuf,
    process,
    sync::{Arc, Mutex},
    time::Duration,
};

use clap::{command, Parser, Subcommand, ValueHint};
use log::{debug, error, info, LevelFilter};

use mstodo::{
    clock::{self, Clock, SystemClock},
    config::Config,
    credential::Credential,
    error::{Error, Result},
    http::Client,
    opener::Opener,
    table,
    todo::Lists,
};

/// Profile to display when not built in release mode.
#[cfg(debug_assertions)]
const BUILD_PROFILE: &str = "debug";
/// Profile to display when not built release mode.
#[cfg(not(debug_assertions))]
const BUILD_PROFILE: &str = "release";

/// Group name for mutually exclusive logging options.
const ARGS_GROUP_LOGGING: &str = "logging";

/// Command line arguments as parsed by `clap`.
#[derive(Clone, Debug, PartialEq, Eq, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    ///
    /// Holds the application credentials and, after logging in, the access
    /// and refresh tokens. Keep it private.
    ///
    /// [default: ~/.mstodo.toml]
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath, env = "MSTODO_CONFIG")]
    config: Option<PathBuf>,

    /// Suppresses all output except warnings and errors.
    #[arg(short, long, default_value_t = false, group = ARGS_GROUP_LOGGING)]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Specify twice for trace logging.
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, PartialEq, Eq, Subcommand)]
enum Command {
    /// Log in to your Microsoft account
    ///
    /// Opens the login page in your browser and waits for it to redirect
    /// back. Refreshes the tokens instead when only the access token has
    /// expired.
    Login {
        /// How long to wait for the browser, e.g. `90s` or `5m`
        #[arg(long, default_value = "5m", value_parser = clock::parse_duration)]
        timeout: Duration,
    },

    /// Perform operations over To Do lists
    Lists {
        /// Which columns to show, e.g. "Display Name, Id"
        #[arg(short, long, default_value = "all", global = true)]
        columns: String,

        #[command(subcommand)]
        action: ListsAction,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Subcommand)]
enum ListsAction {
    /// Show all lists
    Index,

    /// Create a list
    Create {
        /// Name of the new list
        name: String,
    },

    /// Rename a list
    Update {
        /// Identifier of the list, as shown by `lists index`
        id: String,

        /// New name of the list
        #[arg(short, long)]
        name: String,
    },
}

/// Initializes the logger facade.
///
/// The logging level is determined as follows, in order of precedence from
/// highest to lowest:
/// 1. Command line arguments
/// 2. `RUST_LOG` environment variable
/// 3. Hard coded default
///
/// # Panics
///
/// Panics when a logger facade is already initialized.
fn init_logger(config: &Args) {
    let mut logger = env_logger::Builder::from_env(
        // Note: if you change the default logging level here, then you should
        // probably also change the verbosity levels below.
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    if config.quiet || config.verbose > 0 {
        let level = match config.verbose {
            0 => {
                // Quiet and verbose are mutually exclusive, and `verbose` is 0
                // by default. So this arm means: quiet mode.
                LevelFilter::Warn
            }
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Filter log messages of external crates.
        logger.filter_module("mstodo", level);
    }

    logger.init();
}

/// Builds a credential that writes every token exchange back to `config`.
fn credential(
    config: &Arc<Mutex<Config>>,
    client: Arc<Client>,
    timeout: Duration,
) -> Result<Credential> {
    let settings = config.lock()?.settings.clone();
    let clock = Arc::new(SystemClock);

    let store = Arc::clone(config);
    let store_clock = Arc::clone(&clock);
    let opener = Opener::system();

    Ok(Credential::new(&settings, client, clock)
        .with_listen_timeout(timeout)
        .on_login_data(move |data| store.lock()?.store_login(data, store_clock.now()))
        .on_login_url(move |url| opener.open(url)))
}

/// Logs in if needed and returns a valid access token.
async fn login(credential: &mut Credential) -> Result<String> {
    if credential.login_needed() {
        credential.perform_login().await?;
    }

    credential
        .access_token()
        .map(ToOwned::to_owned)
        .ok_or_else(|| Error::unauthenticated("no valid access token after login"))
}

/// Runs the requested command to completion.
async fn run(args: Args) -> Result<()> {
    let config = Config::load(args.config.as_deref())?;
    let client = Arc::new(Client::new(&config)?);
    let config = Arc::new(Mutex::new(config));

    match args.command {
        Command::Login { timeout } => {
            let mut credential = credential(&config, Arc::clone(&client), timeout)?;
            login(&mut credential).await?;
            info!("access token is valid");
        }

        Command::Lists { columns, action } => {
            let columns = table::parse_columns(&columns);
            let mut credential = credential(
                &config,
                Arc::clone(&client),
                mstodo::credential::DEFAULT_LISTEN_TIMEOUT,
            )?;
            let access_token = login(&mut credential).await?;
            let lists = Lists::new(client, access_token)?;

            let shown = match action {
                ListsAction::Index => lists.index().await?,
                ListsAction::Create { name } => vec![lists.create(&name).await?],
                ListsAction::Update { id, name } => vec![lists.update(&id, &name).await?],
            };

            table::render(&mut io::stdout().lock(), &shown, &columns)?;
        }
    }

    Ok(())
}

/// Main entry point of the application.
///
/// This function initializes the logger facade, parses the command line
/// arguments, and runs the requested command until it completes or the user
/// interrupts it.
#[tokio::main(flavor = "current_thread")]
async fn main() {
    // `clap` handles our command line arguments and help text.
    let args = Args::parse();
    init_logger(&args);

    // Dump command line arguments before we do anything more.
    // This aids in debugging of whatever comes next.
    debug!("Command {:#?}", args);

    let cmd = command!();
    let name = cmd.get_name().to_string();
    let version = cmd.get_version().unwrap_or("UNKNOWN").to_string();

    debug!("starting {name}/{version}; {BUILD_PROFILE}");

    let result = tokio::select! {
        // Prioritize shutdown signals.
        biased;

        _ = tokio::signal::ctrl_c() => {
            Err(Error::cancelled("interrupted by user"))
        }

        result = run(args) => result,
    };

    if let Err(e) = result {
        error!("{e}");
        process::exit(1);
    }
}
