use anyhow::Context;
use anyhow::Result;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use std::path::PathBuf;
use tracing::info;
use tracing::warn;
use volume_viewer::Axis;
use volume_viewer::Colormap;
use volume_viewer::DisplayRange;
use volume_viewer::ExportKind;
use volume_viewer::Figure;
use volume_viewer::RenderParameters;
use volume_viewer::SliceParameters;
use volume_viewer::SliceRenderer;
use volume_viewer::VolumeLoader;
use volume_viewer::VolumeParameters;
use volume_viewer::VolumeRenderer;
use volume_viewer::init_logging;
use volume_viewer::session;

#[derive(Parser)]
#[command(name = "volume-viewer")]
#[command(author, version, about = "Render slices, montages and 3D views of image stacks")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a summary image with slice montages and/or 3D renderings
    Summary(SummaryArgs),

    /// Render one cross-section
    Slice(SliceArgs),

    /// Render one 3D view
    Render3d(Render3dArgs),
}

#[derive(Args)]
struct InputArgs {
    /// Directory of numbered slice images, or a .npy file
    #[arg(short, long)]
    input: PathBuf,

    /// Lower display percentile
    #[arg(long, default_value_t = 8)]
    min_pct: i32,

    /// Upper display percentile
    #[arg(long, default_value_t = 92)]
    max_pct: i32,

    /// Colour scale: rainbow, viridis, gray or jet
    #[arg(short, long, default_value = "rainbow")]
    colormap: Colormap,
}

#[derive(Args)]
struct VolumeArgs {
    #[arg(long, default_value_t = 0.3)]
    opacity: f32,

    #[arg(long, default_value_t = 0.3)]
    opacity_scale: f32,

    /// Number of iso-shells, kept within 3..=30
    #[arg(long, default_value_t = 12)]
    surface_count: u32,

    /// Physical voxel size used for axis labels
    #[arg(long)]
    voxel_size: Option<f32>,
}

#[derive(Args)]
struct SummaryArgs {
    #[command(flatten)]
    input: InputArgs,

    #[command(flatten)]
    volume: VolumeArgs,

    /// Output PNG path
    #[arg(short, long)]
    outfile: PathBuf,

    /// 2d, 3d or all
    #[arg(short, long, default_value = "all")]
    kind: ExportKind,

    /// Montage tiles per row
    #[arg(long, default_value_t = 4)]
    imgs_in_row: usize,
}

#[derive(Args)]
struct SliceArgs {
    #[command(flatten)]
    input: InputArgs,

    #[arg(short, long, default_value = "x")]
    axis: Axis,

    #[arg(short = 'n', long, default_value_t = 0)]
    index: usize,

    /// Output PNG path
    #[arg(short, long)]
    out: PathBuf,
}

#[derive(Args)]
struct Render3dArgs {
    #[command(flatten)]
    input: InputArgs,

    #[command(flatten)]
    volume: VolumeArgs,

    /// Axis pointing up
    #[arg(short, long, default_value = "z")]
    axis: Axis,

    /// Output PNG path
    #[arg(short, long)]
    out: PathBuf,
}

fn volume_parameters(input: &InputArgs, args: &VolumeArgs) -> VolumeParameters {
    VolumeParameters {
        colorscale: input.colormap,
        min_pct: input.min_pct,
        max_pct: input.max_pct,
        opacity: args.opacity,
        opacity_scale: args.opacity_scale,
        surface_count: args.surface_count,
        voxel_size: args.voxel_size,
        ..Default::default()
    }
}

fn load(input: &InputArgs) -> volume_viewer::Volume {
    let loaded = VolumeLoader::load(&input.input);
    if loaded.status.is_placeholder() {
        warn!("{loaded}");
    } else {
        info!("{loaded}");
    }
    loaded.volume
}

fn run_summary(args: SummaryArgs) -> Result<()> {
    let volume = load(&args.input);
    let params = RenderParameters {
        slice: SliceParameters {
            colormap: args.input.colormap,
            min_pct: args.input.min_pct,
            max_pct: args.input.max_pct,
        },
        volume: volume_parameters(&args.input, &args.volume),
        montage_row_width: args.imgs_in_row,
    };
    session::summary(&volume, &params, args.kind, Some(&args.outfile))
        .with_context(|| format!("Failed to build summary {}", args.outfile.display()))?;
    Ok(())
}

fn run_slice(args: SliceArgs) -> Result<()> {
    let volume = load(&args.input);
    let range = DisplayRange::from_percentiles(
        &volume,
        args.input.min_pct as f64,
        args.input.max_pct as f64,
    );
    let figure = SliceRenderer::render(&volume, args.axis, args.index, args.input.colormap, range)?;
    figure
        .to_image()
        .save(&args.out)
        .with_context(|| format!("Failed to write {}", args.out.display()))?;
    info!(path = %args.out.display(), "saved slice");
    Ok(())
}

fn run_render3d(args: Render3dArgs) -> Result<()> {
    let volume = load(&args.input);
    let params = volume_parameters(&args.input, &args.volume);
    let range =
        DisplayRange::from_percentiles(&volume, params.min_pct as f64, params.max_pct as f64);
    let figure = VolumeRenderer::render(&volume, &params.settings(), range, args.axis);
    figure
        .to_image()
        .save(&args.out)
        .with_context(|| format!("Failed to write {}", args.out.display()))?;
    info!(path = %args.out.display(), "saved 3D rendering");
    Ok(())
}

fn main() -> Result<()> {
    init_logging()?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Summary(args) => run_summary(args),
        Commands::Slice(args) => run_slice(args),
        Commands::Render3d(args) => run_render3d(args),
    }
}
