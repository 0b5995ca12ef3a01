use {
    anyhow::{Context, Result},
    clap::{Parser, Subcommand},
    hailstone::scenario::Scenario,
    std::{fs::File, io::{BufReader, Write}, path::PathBuf},
    tracing_subscriber::EnvFilter,
};

/// Drive the Hailstone kernel through scripted scenarios.
#[derive(Parser)]
#[command(name = "hailstone", version, about)]
struct Cli
{
    /// Log every crank and syscall.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command
{
    /// Run a scenario and print its report as JSON.
    Run
    {
        /// Scenario file.
        path: PathBuf,

        /// Audit every refcount after each crank.
        #[arg(long)]
        audit: bool,
    },
}

fn main() -> Result<()>
{
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Run{path, audit} => {
            let file = File::open(&path)
                .with_context(|| format!("Open {}", path.display()))?;
            let mut scenario = Scenario::from_reader(BufReader::new(file))
                .with_context(|| format!("Parse {}", path.display()))?;
            if audit {
                scenario.config.audit_every_crank = true;
            }
            let report = scenario.run()?;

            let mut stdout = std::io::stdout().lock();
            serde_json::to_writer_pretty(&mut stdout, &report)?;
            writeln!(stdout)?;
        },
    }

    Ok(())
}
