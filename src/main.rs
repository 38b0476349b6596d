use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "lorentz", about = "Adaptive Lorentzian KNN signal engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Generate and score signals for a candle CSV
    Backtest {
        #[arg(short, long)]
        csv: PathBuf,
        #[arg(short = 'C', long)]
        config: Option<PathBuf>,
        /// Write per-bar signals and diagnostics here
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Bars per year, for annualised ratios
        #[arg(short, long, default_value = "8760")]
        periods: f64,
        /// Feed candles one at a time instead of a single batch run
        #[arg(long)]
        streaming: bool,
    },
    /// Run the engine on a seeded synthetic random walk
    Simulate {
        #[arg(short, long, default_value = "500")]
        bars: usize,
        #[arg(short, long, default_value = "42")]
        seed: u64,
        #[arg(short = 'C', long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Backtest {
            csv,
            config,
            out,
            periods,
            streaming,
        } => {
            run_backtest(&csv, config.as_deref(), out.as_deref(), periods, streaming)?;
        }
        Commands::Simulate { bars, seed, config } => {
            run_simulate(bars, seed, config.as_deref())?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<lorentz::EngineConfig, Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            println!("Config: {}", p.display());
            Ok(lorentz::EngineConfig::from_json_file(p)?)
        }
        None => Ok(lorentz::EngineConfig::default()),
    }
}

fn run_backtest(
    csv: &std::path::Path,
    config: Option<&std::path::Path>,
    out: Option<&std::path::Path>,
    periods: f64,
    streaming: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    use lorentz::backtest::SignalBacktest;

    println!("=== Lorentz Signal Backtest ===");
    let config = load_config(config)?;
    let candles = lorentz::data::load_candles_csv(csv)?;
    println!("{}: {} candles", csv.display(), candles.len());
    if let (Some(first), Some(last)) = (candles.first(), candles.last()) {
        println!("Range: {} .. {}", first.datetime(), last.datetime());
    }

    let mut bt = SignalBacktest::new(config, periods)?;
    let result = if streaming {
        bt.run_streaming(&candles)?
    } else {
        bt.run(&candles)?
    };
    result.print_summary();

    if let Some(path) = out {
        lorentz::data::save_signals_csv(&candles, result.signals(), &result.report.diagnostics, path)?;
        println!("Signals written to {}", path.display());
    }
    Ok(())
}

fn run_simulate(bars: usize, seed: u64, config: Option<&std::path::Path>) -> Result<(), Box<dyn std::error::Error>> {
    use lorentz::backtest::SignalBacktest;

    println!("=== Lorentz Synthetic Simulation ===");
    println!("Bars: {}, Seed: {}", bars, seed);
    let config = load_config(config)?;
    let candles = lorentz::data::random_walk(bars, seed, 100.0);

    let mut bt = SignalBacktest::new(config, 8760.0)?;
    let result = bt.run(&candles)?;
    result.print_summary();
    Ok(())
}
