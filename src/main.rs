use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "AURION_LOG";

#[derive(Debug, Default)]
struct CliArgs {
    crossfade: Option<u8>,
    shuffle: bool,
    inputs: Vec<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = parse_args(std::env::args().skip(1).collect())?;
    init_logging()?;

    aurion::app::run_with_startup(aurion::app::StartupOptions {
        inputs: args.inputs,
        crossfade_seconds: args.crossfade,
        shuffle: args.shuffle,
    })
}

fn init_logging() -> anyhow::Result<()> {
    aurion::config::ensure_config_dir()?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(aurion::config::log_path()?)?;
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn parse_args(args: Vec<String>) -> anyhow::Result<CliArgs> {
    let mut out = CliArgs::default();
    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            "--shuffle" => out.shuffle = true,
            "--crossfade" => {
                index += 1;
                let Some(value) = args.get(index) else {
                    anyhow::bail!("--crossfade requires a number of seconds");
                };
                let seconds: u8 = value
                    .trim()
                    .parse()
                    .map_err(|_| anyhow::anyhow!("--crossfade expects 0-12, got {value}"))?;
                if seconds > aurion::crossfade::MAX_CROSSFADE_SECONDS {
                    anyhow::bail!("--crossfade expects 0-12, got {seconds}");
                }
                out.crossfade = Some(seconds);
            }
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            other if other.starts_with("--") => anyhow::bail!("unknown argument {other}"),
            path => out.inputs.push(PathBuf::from(path)),
        }
        index += 1;
    }
    Ok(out)
}

fn print_help() {
    println!("Aurion");
    println!("  aurion [options] [folder|file]...");
    println!("  --crossfade N     Crossfade between tracks for N seconds (0-12)");
    println!("  --shuffle         Start with shuffle enabled");
    println!("  {LOG_ENV}=debug    Log filter, written to aurion.log in the config dir");
}
