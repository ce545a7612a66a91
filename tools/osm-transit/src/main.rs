use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod output;

use osm_transit_network::{
    CollectingSink, DumpStopSource, FetchConfig, Hemisphere, OverpassDocument, Pipeline,
    PipelineConfig, PipelineOutput, TransportMode,
};
use output::{output_path, write_records, StopTimeRow};

#[derive(Parser, Debug)]
#[command(
    name = "osm-transit",
    author,
    version,
    about = "Build transit route shapes and stop-to-stop segments from OpenStreetMap",
    long_about = "Reads Overpass API JSON dumps (`out geom`) of route relations and their \
                  platforms, rejects relations whose stop and platform roles do not balance, \
                  rebuilds one ordered shape per route, snaps platforms onto it and cuts it \
                  into stop-to-stop segments.\n\n\
                  Writes <mode>_trips.json, <mode>_stops.json, <mode>_s2s.json, \
                  <mode>_stop_times.json and <mode>_invalid.json into the output directory."
)]
struct Args {
    /// Overpass JSON with the route and route_master relations
    #[arg(short, long)]
    routes: PathBuf,

    /// Overpass JSON with the platform elements
    #[arg(short, long)]
    stops: PathBuf,

    /// Output directory
    #[arg(short, long)]
    output: PathBuf,

    /// Transport mode (bus, trolleybus, tram, subway, commuter)
    #[arg(short, long, default_value = "bus")]
    mode: TransportMode,

    /// UTM zone used for lengths and snapping
    #[arg(long, default_value_t = 37)]
    zone: u8,

    /// Use the southern hemisphere variant of the UTM zone
    #[arg(long)]
    south: bool,

    /// Travel speed for stop times, km/h
    #[arg(long, default_value_t = 20.0)]
    speed: f64,

    /// Distance in meters beyond which a platform snap is reported
    #[arg(long, default_value_t = 250.0)]
    snap_tolerance: f64,

    /// Verbose output (show debug messages and every diagnostic)
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Default)]
struct RunStats {
    valid_relations: usize,
    invalid_relations: usize,
    routes: usize,
    stops: usize,
    segments: usize,
    straight_segments: usize,
    diagnostics: Vec<(&'static str, usize)>,
}

impl RunStats {
    fn collect(output: &PipelineOutput, sink: &CollectingSink) -> Self {
        let counts = sink.counts_by_kind();
        let skipped = counts.get("route_skipped").copied().unwrap_or(0);

        Self {
            valid_relations: output.routes.len() + skipped,
            invalid_relations: output.invalid.len(),
            routes: output.routes.len(),
            stops: output.stops.len(),
            segments: output.segments.len(),
            straight_segments: counts.get("degenerate_slice").copied().unwrap_or(0),
            diagnostics: counts.into_iter().collect(),
        }
    }

    fn log_summary(&self) {
        log::info!("=== Network Statistics ===");
        log::info!("Valid relations: {}", self.valid_relations);
        log::info!("Invalid relations: {}", self.invalid_relations);
        log::info!("Routes built: {}", self.routes);
        log::info!("Stops: {}", self.stops);
        log::info!("Segments: {}", self.segments);
        if self.straight_segments > 0 {
            log::warn!("Straight fallback segments: {}", self.straight_segments);
        }
        for (kind, count) in &self.diagnostics {
            log::info!("  {}: {}", kind, count);
        }
    }
}

fn read_document(path: &Path) -> Result<OverpassDocument> {
    if !path.exists() {
        bail!("Input file does not exist: {}", path.display());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    OverpassDocument::from_json(&text)
        .with_context(|| format!("Failed to parse Overpass JSON from {}", path.display()))
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if args.verbose { "debug" } else { "info" }),
    )
    .format_timestamp(None)
    .init();

    log::info!("=== OSM Transit Network Builder ===");
    log::info!("Routes: {}", args.routes.display());
    log::info!("Stops: {}", args.stops.display());
    log::info!("Output: {}", args.output.display());
    log::info!("Mode: {} ({:?})", args.mode, args.mode.cut_policy());

    let config = PipelineConfig {
        zone: args.zone,
        hemisphere: if args.south {
            Hemisphere::South
        } else {
            Hemisphere::North
        },
        snap_tolerance: args.snap_tolerance,
        mode: args.mode,
        speed_kmh: args.speed,
        // Stops come from a local dump, nothing to throttle
        fetch: FetchConfig {
            delay: Duration::ZERO,
            ..Default::default()
        },
        ..Default::default()
    };
    let pipeline = Pipeline::new(config).context("Invalid pipeline configuration")?;
    log::info!("Planar frame: EPSG:{}", pipeline.projector().epsg());

    // Phase 1: Load dumps
    log::info!("");
    log::info!("Phase 1: Reading Overpass dumps...");
    let routes = read_document(&args.routes)?;
    log::info!(
        "  {} elements, {} relations",
        routes.elements.len(),
        routes.relations().count()
    );
    let source = DumpStopSource::new(read_document(&args.stops)?);
    log::info!("  {} platform elements", source.len());

    // Phase 2: Build the network
    log::info!("");
    log::info!("Phase 2: Building routes...");
    let sink = if args.verbose {
        CollectingSink::logging()
    } else {
        CollectingSink::new()
    };

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} [{elapsed}]")
            .context("Invalid progress bar template")?,
    );
    pb.set_message("Assembling, snapping and cutting...");
    pb.enable_steady_tick(Duration::from_millis(100));

    let result = pipeline.run(&routes, &source, &sink);
    pb.finish_and_clear();
    let network = result.context("Pipeline run failed")?;

    if network.routes.is_empty() {
        bail!("No routes could be built. Is --mode {} right for this dump?", args.mode);
    }

    // Phase 3: Write output
    log::info!("");
    log::info!("Phase 3: Writing output...");
    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;

    let mode = args.mode;
    write_records(&network.routes, &output_path(&args.output, mode, "trips"))?;
    write_records(&network.stops, &output_path(&args.output, mode, "stops"))?;
    write_records(&network.segments, &output_path(&args.output, mode, "s2s"))?;
    let stop_times: Vec<StopTimeRow> = network.stop_times.iter().map(StopTimeRow::from).collect();
    write_records(&stop_times, &output_path(&args.output, mode, "stop_times"))?;
    write_records(&network.invalid, &output_path(&args.output, mode, "invalid"))?;

    // Summary
    log::info!("");
    RunStats::collect(&network, &sink).log_summary();
    log::info!("");
    log::info!("Output written to: {}", args.output.display());
    log::info!("Done!");

    Ok(())
}
