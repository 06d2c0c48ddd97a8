//! Headless simulation runner — CLI wiring and config-driven engine
//! construction.

use std::path::Path;
use std::process;

use offgrid_sim::cli;
use offgrid_sim::config::InstallationConfig;
use offgrid_sim::persist::Snapshot;
use offgrid_sim::sim::engine::SimEngine;
use offgrid_sim::telemetry::{self, TelemetryRow};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let opts = match cli::parse_args() {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("error: {e}");
            cli::print_usage();
            process::exit(1);
        }
    };

    // Load config: --installation takes priority, then --preset.
    let config = if let Some(ref path) = opts.installation {
        match InstallationConfig::from_toml_file(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        }
    } else {
        let name = opts.preset.as_deref().unwrap_or("cabin");
        match InstallationConfig::from_preset(name) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        }
    };

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }

    let graph = match config.build() {
        Ok(graph) => graph,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };

    let mut engine =
        SimEngine::new(graph).with_environment(config.environment.clone());
    engine.start_live();
    engine.seek(config.simulation.start_hour * 60.0);

    // Every switchable consumer starts on, so the run exercises the
    // whole installation.
    let loads: Vec<_> = engine
        .graph()
        .components()
        .filter(|c| {
            matches!(
                c.kind,
                offgrid_sim::graph::component::ComponentKind::AcLoad
                    | offgrid_sim::graph::component::ComponentKind::Producer
            )
        })
        .map(|c| c.id)
        .collect();
    for id in loads {
        engine.toggle_load(id);
    }

    // One tick per simulated minute.
    engine.set_speed(1.0);
    let ticks = (opts.hours * 60.0).round() as usize;
    let mut rows: Vec<TelemetryRow> = Vec::with_capacity(ticks);
    let mut total_trips = 0usize;
    let mut total_fired = 0usize;
    for tick in 0..ticks {
        let report = engine.tick(1.0);
        total_trips += report.tripped.len();
        total_fired += report.fired_rules.len();
        rows.push(TelemetryRow::sample(tick, &engine, &report));
    }

    let live = engine.live().expect("live mode active");
    println!("simulated {:.1} h ending at {}", opts.hours, engine.formatted_time());
    println!(
        "battery SOC {:.1} %, capture efficiency {:.1} %",
        engine.battery_soc().unwrap_or(0.0) * 100.0,
        live.efficiency_pct()
    );
    println!(
        "solar possible {:.0} Wh, captured {:.0} Wh, derated {:.0} Wh",
        live.possible_wh, live.captured_wh, live.derated_wh
    );
    println!("breaker trips: {total_trips}, automation firings: {total_fired}");

    if let Some(ref path) = opts.telemetry_out {
        if let Err(e) = telemetry::export_csv(&rows, path) {
            eprintln!("error: failed to write CSV: {e}");
            process::exit(1);
        }
        eprintln!("telemetry written to {}", path.display());
    }

    if let Some(ref path) = opts.save_out {
        if let Err(e) = Snapshot::of(&engine).save(Path::new(path)) {
            eprintln!("error: failed to write snapshot: {e}");
            process::exit(1);
        }
        eprintln!("snapshot written to {}", path.display());
    }
}
