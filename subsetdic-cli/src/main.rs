use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use subsetdic::io::load_gray_image;
use subsetdic::{
    CorrelationParams, Driver, FrameReport, Image, ImageField, ParamMap, ParamValue, Subset,
};
use tracing_subscriber::EnvFilter;

const EXAMPLE_JSON: &str = r#"{
  "reference_path": "images/ref.tif",
  "frame_paths": ["images/def_001.tif", "images/def_002.tif"],
  "output_dir": "results",
  "output_prefix": "solution",
  "subsets": { "grid": { "size": 31, "step": 20 } },
  "params": {
    "interpolation_method": "KEYS_FOURTH",
    "optimization_method": "GRADIENT_BASED_THEN_SIMPLEX",
    "initialization_method": "USE_FIELD_VALUES",
    "enable_rotation": true,
    "disp_jump_tol": 5.0
  }
}"#;

#[derive(Parser, Debug)]
#[command(author, version, about = "subsetdic CLI (JSON config driven)")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "config.json")]
    config: PathBuf,
    /// Print an example config and exit.
    #[arg(long)]
    print_example: bool,
    /// Print the resolved correlation parameters and exit.
    #[arg(long)]
    print_params: bool,
    /// Enable tracing output for performance profiling.
    #[arg(long)]
    trace: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum SubsetsConfig {
    /// Regular grid of square subsets.
    Grid {
        size: usize,
        step: usize,
        #[serde(default)]
        margin: Option<usize>,
    },
    /// Explicit square subsets.
    List(Vec<SubsetJson>),
}

#[derive(Debug, Deserialize)]
struct SubsetJson {
    x: usize,
    y: usize,
    size: usize,
    #[serde(default)]
    neighbor: Option<usize>,
    #[serde(default)]
    force_simplex: bool,
}

#[derive(Debug, Deserialize)]
struct Config {
    reference_path: String,
    frame_paths: Vec<String>,
    #[serde(default)]
    output_dir: Option<String>,
    #[serde(default = "default_prefix")]
    output_prefix: String,
    subsets: SubsetsConfig,
    #[serde(default)]
    params: serde_json::Map<String, Value>,
}

fn default_prefix() -> String {
    "solution".to_string()
}

#[derive(Debug, Serialize)]
struct FrameSummary {
    frame: usize,
    successful: usize,
    failed: usize,
    output: Option<String>,
}

fn param_map(json: &serde_json::Map<String, Value>) -> Result<ParamMap, String> {
    let mut map = ParamMap::new();
    for (name, value) in json {
        let value = match value {
            Value::Bool(b) => ParamValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => ParamValue::Size(i),
                None => ParamValue::Scalar(n.as_f64().ok_or_else(|| format!("{name}: bad number"))?),
            },
            Value::String(s) => ParamValue::Text(s.clone()),
            _ => return Err(format!("{name}: expected a bool, number or string")),
        };
        map.set(name, value);
    }
    Ok(map)
}

fn build_subsets(config: &SubsetsConfig, reference: &Image) -> subsetdic::DicResult<Vec<Subset>> {
    match config {
        SubsetsConfig::Grid { size, step, margin } => {
            // Centres keep at least `margin` pixels to every border.
            let margin = margin.unwrap_or(0).max(size / 2);
            let step = (*step).max(1);
            let mut out = Vec::new();
            let mut y = margin;
            while y + margin < reference.height() {
                let mut x = margin;
                while x + margin < reference.width() {
                    out.push(Subset::square(out.len(), x, y, *size, reference)?);
                    x += step;
                }
                y += step;
            }
            Ok(out)
        }
        SubsetsConfig::List(list) => list
            .iter()
            .enumerate()
            .map(|(id, s)| {
                Ok(Subset::square(id, s.x, s.y, s.size, reference)?
                    .with_neighbor(s.neighbor)
                    .with_force_simplex(s.force_simplex))
            })
            .collect(),
    }
}

fn write_report(
    report: &FrameReport,
    dir: &Path,
    prefix: &str,
    delimiter: &str,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{prefix}_{:04}.txt", report.frame));
    let mut file = std::io::BufWriter::new(fs::File::create(&path)?);
    report.write_delimited(&mut file, delimiter)?;
    Ok(path)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env().add_directive("subsetdic=info".parse()?))
            .with_target(false)
            .init();
    }

    if cli.print_example {
        println!("{EXAMPLE_JSON}");
        return Ok(());
    }

    let config_text = fs::read_to_string(&cli.config)?;
    let config: Config = serde_json::from_str(&config_text)?;
    let params = CorrelationParams::from_map(&param_map(&config.params)?)?;
    if cli.print_params {
        for (name, value) in params.to_map().iter() {
            println!("{name} = {value}");
        }
        return Ok(());
    }
    if config.reference_path.is_empty() || config.frame_paths.is_empty() {
        return Err("reference_path and frame_paths must be set in the config".into());
    }

    let reference = load_gray_image(&config.reference_path, params.gradient_method)?;
    let subsets = build_subsets(&config.subsets, &reference)?;
    if subsets.is_empty() {
        return Err("no subsets fit inside the reference image".into());
    }
    let delimiter = params.output_delimiter.clone();
    let mut driver = Driver::new(params, subsets, reference)?;

    let mut summaries = Vec::with_capacity(config.frame_paths.len());
    for path in &config.frame_paths {
        let frame = load_gray_image(path, driver.params().gradient_method)?;
        let report = driver.correlate_frame(&frame)?;
        let output = match &config.output_dir {
            Some(dir) => Some(
                write_report(&report, Path::new(dir), &config.output_prefix, &delimiter)?
                    .display()
                    .to_string(),
            ),
            None => {
                report.write_delimited(&mut std::io::stdout().lock(), &delimiter)?;
                None
            }
        };
        tracing::info!(
            frame = report.frame,
            successful = report.num_successful(),
            failed = report.num_failed(),
            "frame correlated"
        );
        summaries.push(FrameSummary {
            frame: report.frame,
            successful: report.num_successful(),
            failed: report.num_failed(),
            output,
        });
    }

    if config.output_dir.is_some() {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    }
    Ok(())
}
