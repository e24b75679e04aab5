use std::num::NonZeroUsize;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use popgrid::{
    clip_raster, normalize, population_density_polygons, raster_to_points, raster_to_polygons,
    read_boundary, read_raster, read_sites, ClipOptions, ClipPolicy, GeoJsonWriter,
    GeoTiffWriter, NormalizeMode,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Normalize displacement sites from a KMZ into GeoJSON
    Sites {
        /// Input KMZ archive
        #[arg(value_name = "KMZ")]
        input: PathBuf,

        /// Output GeoJSON file
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Attribute output mode
        #[arg(long, value_enum, default_value_t = Mode::Complete)]
        mode: Mode,
    },
    /// Clip a raster to an AOI boundary and write it as GeoTIFF
    Clip {
        /// Input raster file
        #[arg(value_name = "RASTER")]
        input: PathBuf,

        /// AOI boundary vector file
        #[arg(short, long, value_name = "FILE")]
        boundary: PathBuf,

        /// Output GeoTIFF file
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Keep every cell touching the boundary, not only cells whose
        /// center falls inside it
        #[arg(long)]
        all_touched: bool,

        /// Nodata sentinel for masked-out cells (defaults to the source's)
        #[arg(long)]
        nodata: Option<f64>,
    },
    /// Convert a raster to density points (GeoJSON)
    Points {
        /// Input raster file
        #[arg(value_name = "RASTER")]
        input: PathBuf,

        /// Output GeoJSON file
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Keep every Nth valid cell (1 = all cells)
        #[arg(long, default_value_t = NonZeroUsize::MIN)]
        sample_rate: NonZeroUsize,
    },
    /// Clip a density raster to an AOI and convert it to polygons (GeoJSON)
    Polygons {
        /// Input raster file
        #[arg(value_name = "RASTER")]
        input: PathBuf,

        /// AOI boundary vector file
        #[arg(short, long, value_name = "FILE")]
        boundary: PathBuf,

        /// Output GeoJSON file
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },
    /// Population-count pipeline: all-touched clip with a fixed sentinel,
    /// then polygons (GeoJSON)
    Density {
        /// Input population-count raster (100 m cells)
        #[arg(value_name = "RASTER")]
        input: PathBuf,

        /// AOI boundary vector file
        #[arg(short, long, value_name = "FILE")]
        boundary: PathBuf,

        /// Output GeoJSON file
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Mode {
    Descriptive,
    Complete,
}

impl From<Mode> for NormalizeMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Descriptive => NormalizeMode::Descriptive,
            Mode::Complete => NormalizeMode::Complete,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let start_time = std::time::Instant::now();

    match args.command {
        Command::Sites {
            input,
            output,
            mode,
        } => {
            info!("Normalizing sites from {:?}", input);
            let sites = read_sites(&input)?;
            let normalized: Vec<_> = sites
                .iter()
                .map(|site| normalize(site, mode.into()))
                .collect();
            GeoJsonWriter::new().write_sites(&normalized, &output)?;
            info!("Written sites: {:?}", output);
        }
        Command::Clip {
            input,
            boundary,
            output,
            all_touched,
            nodata,
        } => {
            info!("Clipping {:?} to {:?}", input, boundary);
            let grid = read_raster(&input)?;
            let aoi = read_boundary(&boundary)?;
            let options = ClipOptions {
                policy: if all_touched {
                    ClipPolicy::AllTouched
                } else {
                    ClipPolicy::Strict
                },
                nodata_override: nodata,
            };
            let clipped = clip_raster(&grid, &aoi, &options)?;
            GeoTiffWriter::new().write(&clipped, &output)?;
            info!("Written clipped raster: {:?}", output);
        }
        Command::Points {
            input,
            output,
            sample_rate,
        } => {
            info!("Converting {:?} to points", input);
            let grid = read_raster(&input)?;
            let set = raster_to_points(&grid, sample_rate);
            GeoJsonWriter::new().write_features(&set, "population_density", &output)?;
            info!("Written points: {:?}", output);
        }
        Command::Polygons {
            input,
            boundary,
            output,
        } => {
            info!("Converting {:?} to polygons", input);
            let grid = read_raster(&input)?;
            let aoi = read_boundary(&boundary)?;
            let clipped = clip_raster(&grid, &aoi, &ClipOptions::default())?;
            let set = raster_to_polygons(&clipped);
            GeoJsonWriter::new().write_features(&set, "population_density", &output)?;
            info!("Written polygons: {:?}", output);
        }
        Command::Density {
            input,
            boundary,
            output,
        } => {
            info!("Running density pipeline on {:?}", input);
            let grid = read_raster(&input)?;
            let aoi = read_boundary(&boundary)?;
            let set = population_density_polygons(&grid, &aoi)?;
            GeoJsonWriter::new().write_features(&set, "population_density", &output)?;
            info!("Written density polygons: {:?}", output);
        }
    }

    let elapsed = start_time.elapsed();
    info!("Total processing time: {:?}", elapsed);

    Ok(())
}
