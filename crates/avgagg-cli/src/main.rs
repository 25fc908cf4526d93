// crates/avgagg-cli/src/main.rs

#![forbid(unsafe_code)]
#![deny(
    rust_2018_idioms,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo
)]

use anyhow::{Context, Result};
use avgagg_core::{
    bind_mut, finalize_mean,
    io::{read_state_auto, stream_values_auto, write_state_auto},
    Accumulator, PartialState,
};
use avgagg_scheduler::{Evaluator, ReduceOptions, ReduceOrder};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "avgagg",
    about = "Mergeable mean aggregate CLI",
    long_about = "Mergeable mean aggregate CLI.\n\nFold value sets into partial states, merge partial states produced anywhere, and finalize them into a mean.",
    version = env!("CARGO_PKG_VERSION"),
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Fold a value file into one partial state.
    Fold {
        /// Input values (JSON array, or JSONL/NDJSON with one number per line)
        #[arg(long)]
        input: PathBuf,

        /// Output path for the partial state (CBOR/JSON)
        #[arg(long, default_value = "state.cbor")]
        out: PathBuf,
    },

    /// Merge partial state files into one (order does not matter).
    Merge {
        /// Input partial states (CBOR/JSON)
        #[arg(long, num_args = 1.., required = true)]
        states: Vec<PathBuf>,

        /// Output path for the merged state (CBOR/JSON)
        #[arg(long, default_value = "merged.cbor")]
        out: PathBuf,

        /// Pairing used while merging
        #[arg(long, value_enum, default_value_t = OrderOpt::Balanced)]
        order: OrderOpt,
    },

    /// Finalize a partial state and print the mean (`null` if empty).
    Final {
        /// Input partial state (CBOR/JSON)
        #[arg(long)]
        state: PathBuf,
    },

    /// Partition, fold, merge, and finalize a value file in one go.
    Mean {
        /// Input values (JSON array, or JSONL/NDJSON with one number per line)
        #[arg(long)]
        input: PathBuf,

        /// Number of partitions (overrides AVGAGG_PARTITIONS)
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        partitions: Option<u32>,

        /// Pairing used while merging (overrides AVGAGG_REDUCE_ORDER)
        #[arg(long, value_enum)]
        order: Option<OrderOpt>,

        /// Transition partitions on the thread pool; `--parallel=false` turns
        /// it off (overrides AVGAGG_PARALLEL)
        #[arg(
            long,
            num_args = 0..=1,
            require_equals = true,
            default_missing_value = "true"
        )]
        parallel: Option<bool>,
    },
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, ValueEnum)]
enum OrderOpt {
    /// Left-to-right fold into the first state
    Sequential,
    /// Right-to-left fold into the last state
    Reverse,
    /// Balanced merge tree
    Balanced,
}

impl From<OrderOpt> for ReduceOrder {
    fn from(o: OrderOpt) -> Self {
        match o {
            OrderOpt::Sequential => Self::Sequential,
            OrderOpt::Reverse => Self::Reverse,
            OrderOpt::Balanced => Self::Balanced,
        }
    }
}

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Fold { input, out } => fold(&input, &out),

        Cmd::Merge { states, out, order } => merge(&states, &out, order),

        Cmd::Final { state } => finalize(&state),

        Cmd::Mean {
            input,
            partitions,
            order,
            parallel,
        } => mean(&input, partitions, order, parallel),
    }
}

/// Initialize tracing with an env-driven filter (default INFO).
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .compact();

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

/// Load every value from a JSON / JSONL / NDJSON file.
fn read_values(path: &Path) -> Result<Vec<f64>> {
    stream_values_auto(path)
        .with_context(|| format!("open values {}", path.display()))?
        .collect()
}

fn fold(input: &Path, out: &Path) -> Result<()> {
    info!(input=%input.display(), out=%out.display(), "folding values");

    let mut acc = Accumulator::new();
    for item in stream_values_auto(input).context("open input stream")? {
        acc.push(item?);
    }
    let state = acc.state();

    write_state_auto(out, &state)
        .with_context(|| format!("writing partial state to {}", out.display()))?;

    println!("Folded {} values → {}", state.count, out.display());
    Ok(())
}

fn merge(states: &[PathBuf], out: &Path, order: OrderOpt) -> Result<()> {
    info!(inputs = states.len(), out=%out.display(), ?order, "merging partial states");

    let loaded = states
        .iter()
        .map(|p| read_state_auto(p).with_context(|| format!("reading state {}", p.display())))
        .collect::<Result<Vec<PartialState>>>()?;

    let ev = Evaluator::new(ReduceOptions {
        order: order.into(),
        ..ReduceOptions::default()
    });
    let merged = ev.reduce_states(&loaded).context("merging partial states")?;

    write_state_auto(out, &merged)
        .with_context(|| format!("writing merged state to {}", out.display()))?;

    println!(
        "Merged {} states ({} values) → {}",
        loaded.len(),
        merged.count,
        out.display()
    );
    Ok(())
}

/// Result object printed by `final` and `mean`; `null` mean for an empty set.
fn mean_report(mean: Option<f64>, count: u64) -> serde_json::Value {
    serde_json::json!({ "mean": mean, "count": count })
}

/// Command-line flags take precedence over whatever `opts` already holds.
fn apply_overrides(
    mut opts: ReduceOptions,
    partitions: Option<u32>,
    order: Option<OrderOpt>,
    parallel: Option<bool>,
) -> ReduceOptions {
    if let Some(p) = partitions {
        opts.partitions = p as usize;
    }
    if let Some(o) = order {
        opts.order = o.into();
    }
    if let Some(flag) = parallel {
        opts.parallel = flag;
    }
    opts
}

fn final_report(path: &Path) -> Result<serde_json::Value> {
    let state = read_state_auto(path).with_context(|| format!("reading state {}", path.display()))?;
    let mut record = state.to_slots();
    let mean = finalize_mean(bind_mut(&mut record)?);
    Ok(mean_report(mean, state.count))
}

fn finalize(path: &Path) -> Result<()> {
    info!(state=%path.display(), "finalizing");
    println!("{}", final_report(path)?);
    Ok(())
}

fn mean_of_file(input: &Path, opts: ReduceOptions) -> Result<serde_json::Value> {
    let values = read_values(input)?;
    let mean = Evaluator::new(opts)
        .evaluate(&values)
        .context("evaluating mean")?;
    Ok(mean_report(mean, values.len() as u64))
}

fn mean(
    input: &Path,
    partitions: Option<u32>,
    order: Option<OrderOpt>,
    parallel: Option<bool>,
) -> Result<()> {
    let opts = apply_overrides(ReduceOptions::default().with_env(), partitions, order, parallel);

    info!(input=%input.display(), partitions = opts.partitions, order = %opts.order, parallel = opts.parallel, "evaluating mean");

    println!("{}", mean_of_file(input, opts)?);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use avgagg_core::io::write_state_json;
    use clap::CommandFactory;

    fn tmp_dir(name: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("avgagg_cli_{name}_{nanos}"))
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_mean_overrides() {
        let cli = Cli::try_parse_from([
            "avgagg", "mean", "--input", "v.jsonl", "--partitions", "3", "--order", "reverse",
        ])
        .unwrap();
        match cli.cmd {
            Cmd::Mean {
                partitions, order, ..
            } => {
                assert_eq!(partitions, Some(3));
                assert_eq!(order.map(ReduceOrder::from), Some(ReduceOrder::Reverse));
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert!(Cli::try_parse_from(["avgagg", "mean", "--input", "v.json", "--partitions", "0"]).is_err());
    }

    fn parallel_flag(extra: &[&str]) -> Option<bool> {
        let args = ["avgagg", "mean", "--input", "v.json"].iter().chain(extra);
        match Cli::try_parse_from(args).unwrap().cmd {
            Cmd::Mean { parallel, .. } => parallel,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parallel_flag_can_switch_either_way() {
        assert_eq!(parallel_flag(&[]), None);
        assert_eq!(parallel_flag(&["--parallel"]), Some(true));
        assert_eq!(parallel_flag(&["--parallel=true"]), Some(true));
        assert_eq!(parallel_flag(&["--parallel=false"]), Some(false));

        // A flag of `false` beats a parallel setting from the environment.
        let from_env = ReduceOptions {
            parallel: true,
            ..ReduceOptions::default()
        };
        assert!(!apply_overrides(from_env, None, None, Some(false)).parallel);
        assert!(apply_overrides(from_env, None, None, None).parallel);

        let opts = apply_overrides(from_env, Some(9), Some(OrderOpt::Sequential), Some(true));
        assert_eq!(opts.partitions, 9);
        assert_eq!(opts.order, ReduceOrder::Sequential);
    }

    #[test]
    fn fold_then_merge_then_final() {
        let dir = tmp_dir("pipeline");
        std::fs::create_dir_all(&dir).unwrap();

        let left_in = dir.join("left.json");
        let right_in = dir.join("right.jsonl");
        std::fs::write(&left_in, "[2.0]").unwrap();
        std::fs::write(&right_in, "4.0\n6.0\n").unwrap();

        let (left, right) = (dir.join("left.cbor"), dir.join("right.json"));
        fold(&left_in, &left).unwrap();
        fold(&right_in, &right).unwrap();
        assert_eq!(read_state_auto(&right).unwrap(), PartialState::new(10.0, 2));

        let merged = dir.join("out/merged.cbor");
        merge(&[left, right], &merged, OrderOpt::Reverse).unwrap();
        assert_eq!(read_state_auto(&merged).unwrap(), PartialState::new(12.0, 3));
        assert_eq!(
            final_report(&merged).unwrap(),
            serde_json::json!({ "mean": 4.0, "count": 3 })
        );
        finalize(&merged).unwrap();

        let all_in = dir.join("all.json");
        std::fs::write(&all_in, "[2.0, 4.0, 6.0]").unwrap();
        for order in [ReduceOrder::Sequential, ReduceOrder::Reverse, ReduceOrder::Balanced] {
            let opts = ReduceOptions {
                order,
                partitions: 2,
                parallel: false,
            };
            assert_eq!(
                mean_of_file(&all_in, opts).unwrap(),
                serde_json::json!({ "mean": 4.0, "count": 3 }),
                "{order}"
            );
        }

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn empty_inputs_report_a_null_mean() {
        let dir = tmp_dir("empty");
        let path = dir.join("empty.json");
        write_state_json(&path, &PartialState::EMPTY).unwrap();
        assert_eq!(
            final_report(&path).unwrap(),
            serde_json::json!({ "mean": null, "count": 0 })
        );
        finalize(&path).unwrap();

        let values = dir.join("none.jsonl");
        std::fs::write(&values, "").unwrap();
        assert_eq!(
            mean_of_file(&values, ReduceOptions::default()).unwrap(),
            serde_json::json!({ "mean": null, "count": 0 })
        );
        let _ = std::fs::remove_dir_all(dir);
    }
}
