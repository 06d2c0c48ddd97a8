use std::env;
use std::path::PathBuf;

#[derive(Debug)]
pub struct CliOptions {
    pub installation: Option<PathBuf>,
    pub preset: Option<String>,
    pub hours: f32,
    pub telemetry_out: Option<PathBuf>,
    pub save_out: Option<PathBuf>,
}

pub fn parse_args() -> Result<CliOptions, String> {
    let args: Vec<String> = env::args().skip(1).collect();
    parse_args_from(args)
}

fn parse_args_from(args: Vec<String>) -> Result<CliOptions, String> {
    let mut i = 0usize;
    let mut installation = None;
    let mut preset = None;
    let mut hours = 24.0f32;
    let mut telemetry_out = None;
    let mut save_out = None;

    while i < args.len() {
        match args[i].as_str() {
            "--installation" => {
                i += 1;
                let path = args.get(i).ok_or_else(|| {
                    "missing value for --installation (expected a TOML file path)".to_string()
                })?;
                if installation.replace(PathBuf::from(path)).is_some() {
                    return Err("--installation provided more than once".to_string());
                }
            }
            "--preset" => {
                i += 1;
                let name = args.get(i).ok_or_else(|| {
                    "missing value for --preset (expected a preset name)".to_string()
                })?;
                if preset.replace(name.clone()).is_some() {
                    return Err("--preset provided more than once".to_string());
                }
            }
            "--hours" => {
                i += 1;
                let value = args
                    .get(i)
                    .ok_or_else(|| "missing value for --hours (expected a number)".to_string())?;
                hours = value
                    .parse::<f32>()
                    .map_err(|_| format!("--hours value \"{value}\" is not a number"))?;
                if hours <= 0.0 {
                    return Err("--hours must be > 0".to_string());
                }
            }
            "--telemetry-out" => {
                i += 1;
                let path = args.get(i).ok_or_else(|| {
                    "missing value for --telemetry-out (expected a file path)".to_string()
                })?;
                if telemetry_out.replace(PathBuf::from(path)).is_some() {
                    return Err("--telemetry-out provided more than once".to_string());
                }
            }
            "--save-out" => {
                i += 1;
                let path = args.get(i).ok_or_else(|| {
                    "missing value for --save-out (expected a file path)".to_string()
                })?;
                if save_out.replace(PathBuf::from(path)).is_some() {
                    return Err("--save-out provided more than once".to_string());
                }
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument: {other}")),
        }
        i += 1;
    }

    if installation.is_some() && preset.is_some() {
        return Err(
            "arguments `--installation` and `--preset` are mutually exclusive; choose one source"
                .to_string(),
        );
    }

    if installation.is_none() && preset.is_none() {
        preset = Some("cabin".to_string());
    }

    Ok(CliOptions {
        installation,
        preset,
        hours,
        telemetry_out,
        save_out,
    })
}

pub fn print_usage() {
    eprintln!("offgrid-sim — off-grid electrical installation simulator");
    eprintln!();
    eprintln!("Usage: offgrid-sim [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --installation <path>   Load an installation from a TOML file");
    eprintln!("  --preset <name>         Use a built-in preset (cabin, workshop)");
    eprintln!("  --hours <n>             Simulated hours to run (default: 24)");
    eprintln!("  --telemetry-out <path>  Export per-tick telemetry to CSV");
    eprintln!("  --save-out <path>       Write a JSON snapshot after the run");
    eprintln!("  --help                  Show this help message");
    eprintln!();
    eprintln!("If no --installation or --preset is given, the cabin preset is used.");
}

#[cfg(test)]
mod tests {
    use super::parse_args_from;

    #[test]
    fn supports_installation_cli() {
        let opts = parse_args_from(vec![
            "--installation".to_string(),
            "cabin.toml".to_string(),
        ])
        .expect("parse should succeed");
        assert_eq!(
            opts.installation.as_deref().and_then(|p| p.to_str()),
            Some("cabin.toml")
        );
        assert!(opts.preset.is_none());
    }

    #[test]
    fn defaults_to_cabin_preset() {
        let opts = parse_args_from(vec![]).expect("parse should succeed");
        assert_eq!(opts.preset.as_deref(), Some("cabin"));
        assert_eq!(opts.hours, 24.0);
    }

    #[test]
    fn rejects_conflicting_sources() {
        let err = parse_args_from(vec![
            "--installation".to_string(),
            "a.toml".to_string(),
            "--preset".to_string(),
            "cabin".to_string(),
        ])
        .unwrap_err();
        assert!(err.contains("mutually exclusive"));
    }

    #[test]
    fn rejects_non_positive_hours() {
        let err = parse_args_from(vec!["--hours".to_string(), "0".to_string()]).unwrap_err();
        assert!(err.contains("--hours"));
    }
}
