// src/bin/rsage_stats_cli.rs
use std::collections::BTreeMap;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rsage_stats::stats::{
    bin_stats, collect_binned, collect_per_snapshot, decode_collection, encode_collection,
    reduce_total, Accumulator, BinSpec, BinnedCollection, Collected, LocalGroup, PoolingRule,
    ReductionPlan, SnapshotCollection,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "RSAGE_STATS_LOG";

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Rule {
    Exact,
    WithinGroup,
}
impl From<Rule> for PoolingRule {
    fn from(r: Rule) -> Self {
        match r {
            Rule::Exact => PoolingRule::Exact,
            Rule::WithinGroup => PoolingRule::WithinGroup,
        }
    }
}

#[derive(Parser)]
#[command(author, version, about)]
struct Args {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Bin `x y` pairs read from stdin and print `center,count,mean,std,sum` per bin
    Bin {
        #[arg(long, allow_hyphen_values = true)]
        low: f64,
        #[arg(long, allow_hyphen_values = true)]
        high: f64,
        #[arg(long)]
        width: f64,
    },
    /// Reduce `model snapshot x y` rows from the input files over in-process workers
    Reduce {
        /// TOML reduction plan
        #[arg(long)]
        plan: PathBuf,
        /// Input files, indexed from 0 in the order given. Each model reads only the
        /// files inside its `first_file..=last_file` range, dealt round robin to the workers
        #[arg(long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,
        #[arg(short = 'w', long, default_value_t = 1)]
        workers: usize,
        /// Override the plan's pooling rule (exact|within-group)
        #[arg(long, value_enum)]
        rule: Option<Rule>,
        /// Also write the collected results to this file
        #[arg(long)]
        save: Option<PathBuf>,
        /// Give up when a collective waits longer than this
        #[arg(long, default_value_t = 300)]
        timeout_secs: u64,
    },
    /// Print results previously written with `reduce --save`
    Show { file: PathBuf },
}

fn parse_numbers(s: &str) -> Result<Vec<f64>> {
    let mut out = Vec::new();
    for tok in s
        .split(|c: char| c.is_whitespace() || c == ',' || c == ';')
        .filter(|t| !t.is_empty())
    {
        out.push(tok.parse::<f64>().with_context(|| format!("not a number: {tok:?}"))?);
    }
    Ok(out)
}

/* ============================
 * Input files
 * ============================ */

/// Samples of one file grouped by (model index, snapshot position).
type FileSamples = BTreeMap<(usize, usize), (Vec<f64>, Vec<f64>)>;

fn read_input(path: &Path, plan: &ReductionPlan) -> Result<FileSamples> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let mut out = FileSamples::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let at = || format!("{}:{}", path.display(), lineno + 1);
        let fields: Vec<&str> = line
            .split(|c: char| c.is_whitespace() || c == ',' || c == ';')
            .filter(|t| !t.is_empty())
            .collect();
        let [name, snap, x, y] = fields.as_slice() else {
            bail!("{}: expected `model snapshot x y`, got {line:?}", at());
        };
        let model = plan
            .models()
            .iter()
            .position(|m| m.name == *name)
            .with_context(|| format!("{}: model {name:?} is not in the plan", at()))?;
        let snap: u32 = snap.parse().with_context(|| format!("{}: bad snapshot", at()))?;
        let pos = plan.models()[model]
            .snapshot_position(snap)
            .with_context(|| format!("{}: snapshot {snap} is not planned for {name:?}", at()))?;
        let x: f64 = x.parse().with_context(|| format!("{}: bad x", at()))?;
        let y: f64 = y.parse().with_context(|| format!("{}: bad y", at()))?;
        let slot = out.entry((model, pos)).or_default();
        slot.0.push(x);
        slot.1.push(y);
    }
    Ok(out)
}

/* ============================
 * Output
 * ============================ */

fn print_binned(c: &BinnedCollection) {
    println!("model,snapshot,center,count,mean,std");
    for (m, name) in c.models.iter().enumerate() {
        for (s, snap) in c.snapshots[m].iter().enumerate() {
            for (b, center) in c.bin_centers[m][s].iter().enumerate() {
                println!(
                    "{name},{snap},{center},{},{},{}",
                    c.counts[m][s][b], c.means[m][s][b], c.stds[m][s][b]
                );
            }
        }
    }
}

fn print_per_snapshot(c: &SnapshotCollection) {
    println!("model,snapshot,count,mean,std");
    for (m, name) in c.models.iter().enumerate() {
        for (s, snap) in c.snapshots[m].iter().enumerate() {
            println!(
                "{name},{snap},{},{},{}",
                c.counts[m][s], c.means[m][s], c.stds[m][s]
            );
        }
    }
}

fn print_collected(all: &[Collected]) {
    for c in all {
        match c {
            Collected::Binned(b) => print_binned(b),
            Collected::PerSnapshot(p) => print_per_snapshot(p),
        }
    }
}

/* ============================
 * Subcommands
 * ============================ */

fn run_bin(low: f64, high: f64, width: f64) -> Result<()> {
    let spec = BinSpec::new(low, high, width)?;
    let mut s = String::new();
    io::stdin().read_to_string(&mut s)?;
    let values = parse_numbers(&s)?;
    if values.len() % 2 != 0 {
        bail!("expected `x y` pairs, got {} values", values.len());
    }
    let (x, y): (Vec<f64>, Vec<f64>) = values.chunks_exact(2).map(|p| (p[0], p[1])).unzip();

    let stats = bin_stats(&x, &y, &spec)?;
    println!("center,count,mean,std,sum");
    for i in 0..stats.n_bins() {
        println!(
            "{},{},{},{},{}",
            stats.centers[i], stats.count[i], stats.mean[i], stats.std[i], stats.sum[i]
        );
    }
    eprintln!("dropped {}", stats.dropped);
    Ok(())
}

fn run_reduce(
    plan_path: &Path,
    inputs: &[PathBuf],
    workers: usize,
    rule: Option<Rule>,
    save: Option<&Path>,
    timeout: Duration,
) -> Result<()> {
    if workers == 0 {
        bail!("--workers must be at least 1");
    }
    let mut plan = ReductionPlan::from_path(plan_path)?;
    if let Some(r) = rule {
        plan = plan.with_rule(r.into());
    }
    let files = inputs
        .iter()
        .map(|p| read_input(p, &plan))
        .collect::<Result<Vec<_>>>()?;
    info!(files = files.len(), workers, rule = plan.rule().as_str(), "starting reduction");

    let results = LocalGroup::run(workers, timeout, |ctx| {
        let mut acc = Accumulator::new(&plan);
        for (m, model) in plan.models().iter().enumerate() {
            let Some((first, last)) = model.file_span(files.len()) else {
                continue;
            };
            for f in ctx.assigned_files(first, last) {
                for (&(_, pos), (x, y)) in files[f].range((m, 0)..(m + 1, 0)) {
                    acc.ingest(m, pos, x, y)?;
                }
            }
        }
        let partials = acc.finish();
        let binned = collect_binned(ctx, &partials, &plan)?;
        let per_snapshot = collect_per_snapshot(ctx, &partials, &plan)?;
        let dropped = reduce_total(ctx, partials.dropped as f64)?;
        Ok((binned, per_snapshot, dropped))
    })?;

    let Some((Some(binned), Some(per_snapshot), Some(dropped))) = results.into_iter().next()
    else {
        bail!("coordinator returned no results");
    };
    let collected = vec![
        Collected::Binned(binned),
        Collected::PerSnapshot(per_snapshot),
    ];
    print_collected(&collected);
    eprintln!("dropped {dropped}");

    if let Some(path) = save {
        let bytes = encode_collection(&collected)?;
        std::fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "saved results");
    }
    Ok(())
}

fn run_show(path: &Path) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let collected: Vec<Collected> = decode_collection(&bytes)?;
    print_collected(&collected);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    match args.cmd {
        Cmd::Bin { low, high, width } => run_bin(low, high, width),
        Cmd::Reduce {
            plan,
            input,
            workers,
            rule,
            save,
            timeout_secs,
        } => run_reduce(
            &plan,
            &input,
            workers,
            rule,
            save.as_deref(),
            Duration::from_secs(timeout_secs),
        ),
        Cmd::Show { file } => run_show(&file),
    }
}
