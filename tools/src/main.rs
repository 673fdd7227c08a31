//! sim-runner: headless runner for the SME tax-compliance simulation.
//!
//! Usage:
//!   sim-runner --seed 12345 --ticks 260
//!   sim-runner --config data/scenario_baseline.json --db run.db --json report.json
//!   sim-runner --seed 12345 --ipc-mode

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::env;
use std::io::{self, BufRead, Write};
use taxgap_core::{
    config::SimConfig,
    engine::SimEngine,
    metrics::RunReport,
    store::SimStore,
    types::{GroupKey, Tick},
};

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    GetState,
    Tick { count: u64 },
    Quit,
}

#[derive(serde::Serialize)]
struct UiState {
    tick:             Tick,
    overall_mean:     f64,
    tax_gap_rate:     f64,
    audited_fraction: f64,
    total_cost:       f64,
    mean_by_group:    BTreeMap<GroupKey, f64>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let ticks = parse_arg(&args, "--ticks", 260u64);
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let config_path = flag_value(&args, "--config");
    let db = flag_value(&args, "--db");
    let json_out = flag_value(&args, "--json");

    let config = match config_path {
        Some(path) => SimConfig::load(path)?,
        None => SimConfig::baseline(),
    };
    let run_id = format!("run-{seed}-{}", uuid::Uuid::new_v4());

    if !ipc_mode {
        println!("SME tax compliance: sim-runner");
        println!("  run_id:     {run_id}");
        println!("  seed:       {seed}");
        println!("  ticks:      {ticks}");
        println!("  population: {}", config.population.size);
        println!("  config:     {}", config_path.unwrap_or("(baseline)"));
        println!("  db:         {}", db.unwrap_or("(none)"));
        println!();
    }

    let mut engine = match db {
        Some(path) => {
            let store = SimStore::open(path)?;
            store.migrate()?;
            store.insert_run(
                &run_id,
                seed,
                env!("CARGO_PKG_VERSION"),
                &serde_json::to_string(&config)?,
            )?;
            SimEngine::build_with_store(run_id.clone(), seed, config, store)?
        }
        None => SimEngine::build(run_id.clone(), seed, config)?,
    };

    if ipc_mode {
        return run_ipc_loop(&mut engine);
    }

    let report = engine.run_report(ticks)?;
    print_summary(&report);

    if let Some(path) = json_out {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json).with_context(|| format!("Cannot write report to {path}"))?;
        println!();
        println!("  report written to {path}");
    }
    Ok(())
}

fn run_ipc_loop(engine: &mut SimEngine) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("Rejected IPC command: {e}");
                let err_json = serde_json::json!({ "error": e.to_string() });
                writeln!(stdout, "{}", err_json)?;
                stdout.flush()?;
                continue;
            }
        };

        match cmd {
            IpcCommand::Quit => break,
            IpcCommand::Tick { count } => {
                engine.run_ticks(count)?;
                writeln!(stdout, "{}", serde_json::to_string(&ui_state(engine))?)?;
            }
            IpcCommand::GetState => {
                writeln!(stdout, "{}", serde_json::to_string(&ui_state(engine))?)?;
            }
        }
        stdout.flush()?;
    }
    Ok(())
}

fn ui_state(engine: &SimEngine) -> UiState {
    let metrics = engine.metrics();
    UiState {
        tick:             engine.current_tick(),
        overall_mean:     metrics.overall_mean,
        tax_gap_rate:     metrics.tax_gap_rate,
        audited_fraction: engine.inputs().audited_fraction,
        total_cost:       engine.total_cost(),
        mean_by_group:    metrics.mean_by_group,
    }
}

fn print_summary(report: &RunReport) {
    let initial = &report.initial;
    let last = &report.final_metrics;

    println!("=== RUN SUMMARY ===");
    println!("  ticks run:        {}", report.steps.len());
    println!("  mean propensity:  {:.4} -> {:.4}", initial.overall_mean, last.overall_mean);
    println!("  high compliance:  {:.2}% -> {:.2}%",
        initial.high_compliance_fraction * 100.0,
        last.high_compliance_fraction * 100.0);
    println!("  tax gap rate:     {:.3}% -> {:.3}%",
        initial.tax_gap_rate * 100.0,
        last.tax_gap_rate * 100.0);
    println!("  intensity u:      {:.6}", last.underpayment_intensity);

    println!();
    println!("=== POLICY RETURN ===");
    println!("  gap reduction:    {:.0}", report.summary.tax_gap_reduction);
    println!("  total cost:       {:.0}", report.summary.total_cost);
    println!("  net benefit:      {:.0}", report.summary.net_benefit);
    println!("  ROI:              {:.3}", report.summary.roi_ratio);

    println!();
    println!("=== FINAL MEAN BY GROUP ===");
    for (group, mean) in &last.mean_by_group {
        let gap = last.tax_gap.by_group.get(group).map(|g| g.gap_pct).unwrap_or(0.0);
        println!("  {:<14} {:.4}  (gap {:.2}%)", group.to_string(), mean, gap);
    }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    flag_value(args, flag)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
