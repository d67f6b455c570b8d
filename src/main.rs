use argp::FromArgs;
use tracing::level_filters::{LevelFilter, ParseLevelFilterError};
use tracing_subscriber::EnvFilter;

pub mod cmd;
pub mod obj;
pub mod util;

#[derive(FromArgs, PartialEq, Debug)]
/// Memory usage reports from GNU linker maps and symbol tables.
struct TopLevel {
    #[argp(subcommand)]
    command: SubCommand,
    #[argp(option, short = 'L', global, from_str_fn(log_level))]
    /// Minimum logging level. (Default: info)
    /// Possible values: error, warn, info, debug, trace
    log_level: Option<LevelFilter>,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argp(subcommand)]
enum SubCommand {
    Locate(cmd::locate::Args),
    Report(cmd::report::Args),
    Version(VersionArgs),
}

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// Prints version information.
#[argp(subcommand, name = "version")]
struct VersionArgs {}

// For argp::FromArgs
fn log_level(value: &str) -> Result<LevelFilter, String> {
    value.parse().map_err(|e: ParseLevelFilterError| e.to_string())
}

fn main() {
    let args: TopLevel = argp::parse_args_or_exit(argp::DEFAULT);

    let filter = match args.log_level {
        Some(level) => EnvFilter::default().add_directive(level.into()),
        None => EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .from_env_lossy(),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let result = match args.command {
        SubCommand::Locate(c_args) => cmd::locate::run(c_args),
        SubCommand::Report(c_args) => cmd::report::run(c_args),
        SubCommand::Version(_) => {
            println!(
                "{} {} {}",
                env!("CARGO_BIN_NAME"),
                env!("CARGO_PKG_VERSION"),
                env!("GIT_COMMIT_SHA")
            );
            Ok(())
        }
    };
    if let Err(e) = result {
        eprintln!("Failed: {e:?}");
        std::process::exit(1);
    }
}
