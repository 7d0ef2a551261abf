/*!
# Register Tool

Command-line front end to the EPC660 and MLX75027/MLX75026 register
calculators. Reads register maps from field CSV files, applies TOML
configuration plans and writes field CSVs, register-only CSVs and JSON
snapshots.

## Usage

### Show the settings a register file encodes
```bash
regtool show camera.csv
```

### Apply a configuration plan
```bash
regtool --config regtool.toml apply --input camera.csv --output tuned.csv
```

### Load a register dump onto a schema
```bash
regtool import-registers dump.csv --sensor mlx75027 --output camera.csv
```
*/

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shared::{csv_io, defaults, CameraConfig, Epc660, Mlx7502x, MlxVariant, RegisterMap, SensorKind};
use std::path::{Path, PathBuf};
use tracing::info;

mod config;
mod report;

use config::AppConfig;

#[derive(Parser)]
#[command(name = "regtool")]
#[command(about = "Register calculator for EPC660 and MLX75027/75026 time-of-flight sensors")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "regtool.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the physical settings encoded in a register map
    Show {
        /// Field CSV file
        input: PathBuf,
    },

    /// Apply the configuration plan to a register map
    Apply {
        /// Field CSV to start from (defaults to the built-in map)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Sensor whose built-in map to start from when no input is given
        #[arg(short, long)]
        sensor: Option<SensorKind>,

        /// Output field CSV
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Write the register-only CSV of a field CSV
    ExportRegisters {
        /// Field CSV file
        input: PathBuf,

        /// Output register CSV
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Load a register-only CSV onto a schema and write the field CSV
    ImportRegisters {
        /// Register CSV file
        input: PathBuf,

        /// Schema field CSV (defaults to the built-in map of --sensor)
        #[arg(long)]
        schema: Option<PathBuf>,

        /// Sensor whose built-in map to use as the schema
        #[arg(short, long)]
        sensor: Option<SensorKind>,

        /// Output field CSV
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Save or restore a JSON register snapshot
    Snapshot {
        /// Field CSV file
        input: PathBuf,

        /// Snapshot JSON file
        #[arg(short, long)]
        output: PathBuf,

        /// Restore the snapshot onto the input map and overwrite the input
        #[arg(long)]
        restore: bool,
    },

    /// Generate configuration file
    Config {
        /// Output path for configuration file
        #[arg(short, long, default_value = "regtool.toml")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Log to stderr to keep stdout clean for reports
    let level = if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();

    match cli.command {
        Commands::Show { input } => show(&cli.config, &input),
        Commands::Apply { input, sensor, output } => apply(&cli.config, input.as_deref(), sensor, &output),
        Commands::ExportRegisters { input, output } => export_registers(&input, &output),
        Commands::ImportRegisters { input, schema, sensor, output } => {
            import_registers(&input, schema.as_deref(), sensor, &output)
        }
        Commands::Snapshot { input, output, restore } => snapshot(&cli.config, &input, &output, restore),
        Commands::Config { output } => generate_config_file(output),
    }
}

fn load_map(path: &Path) -> Result<RegisterMap> {
    RegisterMap::from_csv_file(path)
        .with_context(|| format!("Failed to load register map: {}", path.display()))
}

/// Load `path` if given, else the built-in map of `sensor`
fn load_or_default(path: Option<&Path>, sensor: Option<SensorKind>) -> Result<RegisterMap> {
    match (path, sensor) {
        (Some(path), _) => load_map(path),
        (None, Some(kind)) => Ok(defaults::for_kind(kind)?),
        (None, None) => anyhow::bail!("Either an input file or --sensor is required"),
    }
}

/// Load the config at `path`, or the defaults when no file exists there
fn load_config_or_default(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        info!("No config at {}, using defaults", path.display());
        return Ok(AppConfig::new());
    }
    AppConfig::load_from_file(path)
        .with_context(|| format!("Failed to load config: {}", path.display()))
}

fn show(config_path: &Path, input: &Path) -> Result<()> {
    let map = load_map(input)?;
    let config = load_config_or_default(config_path)?;
    let kind = config.sensor.resolve_kind(&map)?;
    println!("📄 {} ({} fields)", input.display(), map.len());

    match MlxVariant::from_kind(kind) {
        Some(variant) => report::print_mlx(&Mlx7502x::new(variant), &map),
        None => report::print_epc660(&Epc660::new(config.sensor.clocks()), &map),
    }
}

fn apply(config_path: &Path, input: Option<&Path>, sensor: Option<SensorKind>, output: &Path) -> Result<()> {
    let config = AppConfig::load_from_file(config_path)?;
    let mut map = load_or_default(input, sensor)?;
    let kind = config.sensor.resolve_kind(&map)?;
    println!("🔧 Applying {} to {} map", config_path.display(), kind);

    let warnings = match MlxVariant::from_kind(kind) {
        Some(variant) => {
            let calc = Mlx7502x::new(variant);
            let plan = config.mlx.unwrap_or_default();
            let warnings = plan.apply(&calc, &mut map)?;
            report::print_mlx(&calc, &map)?;
            warnings
        }
        None => {
            let calc = Epc660::new(config.sensor.clocks());
            let plan = config.epc660.unwrap_or_default();
            let warnings = plan.apply(&calc, &mut map)?;
            report::print_epc660(&calc, &map)?;
            warnings
        }
    };
    report::print_warnings(&warnings);

    map.to_csv_file(output)
        .with_context(|| format!("Failed to write register map: {}", output.display()))?;
    println!("✅ Wrote {}", output.display());
    Ok(())
}

fn export_registers(input: &Path, output: &Path) -> Result<()> {
    let map = load_map(input)?;
    csv_io::export_registers(output, &map)
        .with_context(|| format!("Failed to write register CSV: {}", output.display()))?;
    println!("✅ Wrote {} registers to {}", map.to_registers().len(), output.display());
    Ok(())
}

fn import_registers(input: &Path, schema: Option<&Path>, sensor: Option<SensorKind>, output: &Path) -> Result<()> {
    let image = csv_io::import_registers(input)
        .with_context(|| format!("Failed to read register CSV: {}", input.display()))?;
    let mut map = load_or_default(schema, sensor)?;

    let updated = map.apply_registers(&image);
    let known: std::collections::BTreeSet<u16> = map.iter().map(|f| f.register_address).collect();
    let unknown = image.keys().filter(|addr| !known.contains(addr)).count();
    if unknown > 0 {
        println!("⚠️ {} registers are not part of the schema and were ignored", unknown);
    }

    map.to_csv_file(output)
        .with_context(|| format!("Failed to write register map: {}", output.display()))?;
    println!("✅ Updated {} fields, wrote {}", updated, output.display());
    Ok(())
}

fn snapshot(config_path: &Path, input: &Path, output: &Path, restore: bool) -> Result<()> {
    let mut map = load_map(input)?;

    if restore {
        let snapshot = CameraConfig::load_from_file(output)
            .with_context(|| format!("Failed to load snapshot: {}", output.display()))?;
        let updated = snapshot.apply_to(&mut map)?;
        map.to_csv_file(input)
            .with_context(|| format!("Failed to write register map: {}", input.display()))?;
        println!("✅ Restored {} fields from {} created {}", updated, output.display(), snapshot.created);
        return Ok(());
    }

    let config = load_config_or_default(config_path)?;
    let kind = config.sensor.resolve_kind(&map)?;
    let snapshot = CameraConfig::capture(&map, kind, config.sensor.clocks());
    snapshot.save_to_file(output)
        .with_context(|| format!("Failed to write snapshot: {}", output.display()))?;
    println!("✅ Saved {} snapshot with {} registers to {}", kind, snapshot.registers.len(), output.display());
    Ok(())
}

/// Generate a default configuration file
fn generate_config_file(output_path: PathBuf) -> Result<()> {
    let config = AppConfig::new();
    config.save_to_file(&output_path)?;

    println!("✅ Generated configuration file: {}", output_path.display());
    println!("📝 Add an [epc660] or [mlx] section with the settings to change, then run:");
    println!("   regtool --config {} apply --input <map.csv> --output <out.csv>", output_path.display());

    Ok(())
}
