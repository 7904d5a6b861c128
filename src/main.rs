mod archive;
mod error;
mod extract;
mod model;
#[cfg(feature = "pbf")]
mod pbf;
mod xml;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{info, warn};

use error::Error;
use extract::ExtractOptions;
use model::{BoundingBox, Mode, PoiRecord};

const CSV_HEADER: [&str; 5] = ["name", "category", "latitude", "longitude", "description"];

#[derive(Parser, Debug)]
#[command(
    name = "extract_pois",
    version,
    about = "Extract points of interest from OpenStreetMap files into CSV"
)]
struct Args {
    /// Input files: .osm, .xml, .osm.gz, .osm.bz2, .osm.pbf, or .zip
    /// archives containing any of those
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output CSV path
    #[arg(short, long, default_value = "extracted_pois.csv")]
    output: PathBuf,

    /// Restrict extraction to a bounding box
    #[arg(
        long,
        num_args = 4,
        allow_negative_numbers = true,
        value_names = ["MIN_LAT", "MAX_LAT", "MIN_LNG", "MAX_LNG"]
    )]
    bounds: Option<Vec<f64>>,

    /// Maximum number of POIs across all inputs
    #[arg(long, default_value_t = 1000)]
    max_pois: usize,

    /// strict keeps only named entities with a matching category; lenient
    /// also keeps named entities as "other" and synthesizes names for
    /// unnamed matches
    #[arg(long, value_enum, default_value_t = Mode::Lenient)]
    mode: Mode,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if let Err(err) = run(args) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    if args.max_pois == 0 {
        bail!("--max-pois must be positive");
    }
    let bounds = args.bounds.as_ref().map(|values| BoundingBox {
        min_lat: values[0],
        max_lat: values[1],
        min_lng: values[2],
        max_lng: values[3],
    });
    let opts = ExtractOptions {
        bounds,
        mode: args.mode,
    };

    // Zip inputs are unpacked into scratch directories that live until the
    // whole run is done.
    let mut files = Vec::new();
    let mut scratch_dirs = Vec::new();
    for input in &args.inputs {
        if !input.exists() {
            return Err(Error::SourceNotFound(input.clone()).into());
        }
        if input.extension().and_then(|ext| ext.to_str()) == Some("zip") {
            let dir = tempfile::tempdir().context("creating scratch directory")?;
            let found = archive::expand_zip(input, dir.path())?;
            if found.is_empty() {
                warn!("no OSM files found in {}", input.display());
            }
            files.extend(found);
            scratch_dirs.push(dir);
        } else {
            files.push(input.clone());
        }
    }
    if files.is_empty() {
        bail!("no OSM files to process");
    }

    info!("processing {} file(s), cap {}", files.len(), args.max_pois);
    let records = extract::aggregate(&files, &opts, args.max_pois);
    if records.is_empty() {
        bail!("no POIs extracted from any file");
    }

    write_csv(&records, &args.output)
        .with_context(|| format!("writing {}", args.output.display()))?;
    print_summary(&records, &args.output);
    Ok(())
}

fn write_csv(records: &[PoiRecord], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(CSV_HEADER)?;
    for record in records {
        let latitude = record.latitude.to_string();
        let longitude = record.longitude.to_string();
        writer.write_record([
            record.name.as_str(),
            record.category.as_str(),
            latitude.as_str(),
            longitude.as_str(),
            record.description.as_str(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn print_summary(records: &[PoiRecord], output: &Path) {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for record in records {
        *counts.entry(record.category.as_str()).or_insert(0) += 1;
    }

    println!("extracted {} POIs to {}", records.len(), output.display());
    for (category, count) in counts {
        println!("  {count:4} {category}");
    }
}
