use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use vmpack::{Problem, SolveOptions, Strategy};

#[derive(Parser)]
#[command(
    name = "vmpack",
    about = "Pack virtual machines onto the fewest identical servers",
    version
)]
struct Cli {
    /// Problem file (YAML)
    input: PathBuf,
    /// Override the solver strategy from the problem file
    #[arg(short, long, value_enum)]
    strategy: Option<StrategyArg>,
    /// Stop searching after this many seconds and return the best packing found
    #[arg(long)]
    time_limit_secs: Option<f64>,
    /// Stop branch-and-bound after expanding this many nodes
    #[arg(long)]
    node_limit: Option<u64>,
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    BranchAndBound,
    Milp,
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::BranchAndBound => Strategy::BranchAndBound,
            StrategyArg::Milp => Strategy::Milp,
        }
    }
}

impl Cli {
    /// Command-line flags take precedence over the problem file's options.
    fn override_options(&self, options: &SolveOptions) -> SolveOptions {
        SolveOptions {
            strategy: self.strategy.map_or(options.strategy, Into::into),
            time_limit_secs: self.time_limit_secs.or(options.time_limit_secs),
            node_limit: self.node_limit.or(options.node_limit),
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vmpack=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let problem = Problem::from_file(&cli.input)?;

    let options = cli.override_options(&problem.options);
    let solution = problem.solve_with(&options)?;

    println!("{}", serde_yaml::to_string(&solution)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_options() -> SolveOptions {
        SolveOptions {
            strategy: Strategy::Milp,
            time_limit_secs: Some(30.0),
            node_limit: Some(1000),
        }
    }

    #[test]
    fn absent_flags_keep_file_options() {
        let cli = Cli::parse_from(["vmpack", "problem.yaml"]);
        assert_eq!(cli.override_options(&file_options()), file_options());
    }

    #[test]
    fn flags_override_file_options() {
        let cli = Cli::parse_from([
            "vmpack",
            "problem.yaml",
            "--strategy",
            "branch-and-bound",
            "--node-limit",
            "5",
        ]);
        let options = cli.override_options(&file_options());
        assert_eq!(options.strategy, Strategy::BranchAndBound);
        assert_eq!(options.time_limit_secs, Some(30.0));
        assert_eq!(options.node_limit, Some(5));
    }
}
