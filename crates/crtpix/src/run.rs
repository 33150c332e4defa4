use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Local;
use crtconfig::CrtConfig;
use subpixel::{
    encode_blob, render_software, Blob, Canvas, Dimensions, ExportTicket, Frame,
    ImageSequenceDevices, ShadingParams, SubpixelProcessor, SubpixelRenderer, EXPANSION,
};
use tracing_subscriber::EnvFilter;

use crate::bindings::{camera_options, export_options, gpu_options, EffectPlan};
use crate::cli::{CameraArgs, Cli, Command, DensityArgs, RenderArgs};
use crate::paths::AppPaths;

const PUMP_IDLE: Duration = Duration::from_millis(2);

pub fn run(cli: Cli) -> Result<()> {
    initialise_tracing();

    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Render(args) => run_render(&config, args),
        Command::Density(args) => run_density(&config, args),
        Command::Camera(args) => run_camera(&config, args),
    }
}

fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(explicit: Option<&Path>) -> Result<CrtConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => AppPaths::discover()?.config_file(),
    };
    let config = CrtConfig::load(&path)
        .with_context(|| format!("failed to load config {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    tracing::debug!(path = %path.display(), "resolved crtpix config");
    Ok(config)
}

fn run_render(config: &CrtConfig, args: RenderArgs) -> Result<()> {
    let image = image::open(&args.input)
        .with_context(|| format!("failed to decode {}", args.input.display()))?
        .to_rgba8();
    let frame = Frame::from_image(&image)?;
    let input = frame.dimensions();

    let plan = EffectPlan::resolve(config, &args.effect);
    let settings = plan.settings_for(input);
    let options = export_options(config, &args.encode, Some(args.output.as_path()));
    tracing::info!(
        input = %input,
        density = %settings.pixel_density,
        software = args.software,
        "rendering still image"
    );

    let blob = if args.software {
        let params = ShadingParams::for_input(input, &settings);
        let canvas = input.scale(EXPANSION as f64);
        let rendered = render_software(&frame, &params, canvas);
        encode_blob(&rendered, &options)?
    } else {
        let mut processor =
            SubpixelProcessor::new(gpu_options(&config.gpu)).with_settings(settings);
        processor
            .init()
            .context("failed to initialise GPU; try --software")?;
        let canvas = Canvas::new();
        processor.render(&canvas, &frame)?;
        processor
            .export(&frame, options)?
            .ok_or_else(|| anyhow!("renderer produced no image"))?
    };

    write_blob(&args.output, &blob)?;
    tracing::info!(output = %args.output.display(), bytes = blob.len(), "wrote image");
    Ok(())
}

fn run_density(config: &CrtConfig, args: DensityArgs) -> Result<()> {
    let (width, height) = image::image_dimensions(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let input = Dimensions::new(width, height)?;
    let target = args.target_height.unwrap_or(config.defaults.target_height);

    let density = SubpixelRenderer::calculate_pixel_density_for_target_height(input, target);
    let output = SubpixelRenderer::calculate_output_dimensions(input, density);
    println!("pixel_density = {density}");
    println!("output = {output}");
    Ok(())
}

fn run_camera(config: &CrtConfig, args: CameraArgs) -> Result<()> {
    let plan = EffectPlan::resolve(config, &args.effect);
    let options = export_options(config, &args.encode, None);
    let camera = camera_options(&config.camera, args.fps);
    let devices =
        ImageSequenceDevices::new(&args.directory).with_interval(config.camera.frame_interval);

    let mut processor = SubpixelProcessor::new(gpu_options(&config.gpu))
        .with_media_devices(Box::new(devices));
    processor.init().context("failed to initialise GPU")?;

    let canvas = Canvas::new();
    processor
        .start_camera(&canvas, &camera)
        .with_context(|| format!("failed to start camera on {}", args.directory.display()))?;
    let input = processor
        .camera_frame_dimensions()
        .ok_or_else(|| anyhow!("camera delivered no frame"))?;
    let settings = plan.settings_for(input);
    processor.set_orientation(settings.orientation);
    processor.set_pixel_density(settings.pixel_density);
    processor.set_interlaced(settings.interlaced);
    processor.set_field(settings.field);
    tracing::info!(
        input = %input,
        density = %settings.pixel_density,
        frames = args.frames,
        "camera loop running"
    );

    if args.export_every > 0 {
        fs::create_dir_all(&args.out_dir)
            .with_context(|| format!("failed to create {}", args.out_dir.display()))?;
    }

    let mut rendered = 0u64;
    let mut pending: Vec<(u64, ExportTicket)> = Vec::new();
    let mut written = 0usize;
    while rendered < args.frames {
        if !processor.pump_camera()? {
            thread::sleep(PUMP_IDLE);
            continue;
        }
        rendered += 1;
        written += drain_exports(&mut pending, &args.out_dir, false)?;

        if args.export_every > 0 && rendered % args.export_every == 0 && rendered < args.frames {
            pending.push((rendered + 1, processor.export_camera_frame(options)));
        }
    }

    // The final tick has already run; remaining tickets settle on stop.
    processor.stop_camera();
    written += drain_exports(&mut pending, &args.out_dir, true)?;
    tracing::info!(frames = rendered, exported = written, "camera loop finished");
    if args.export_every > 0 && written == 0 && args.frames > args.export_every {
        bail!("no camera frames were exported");
    }
    Ok(())
}

fn drain_exports(
    pending: &mut Vec<(u64, ExportTicket)>,
    out_dir: &Path,
    finished: bool,
) -> Result<usize> {
    let mut written = 0;
    let mut still_pending = Vec::with_capacity(pending.len());
    for (frame, ticket) in pending.drain(..) {
        match ticket.try_take() {
            Some(Some(blob)) => {
                let path = export_path(out_dir, frame, blob.format.extension());
                write_blob(&path, &blob)?;
                tracing::info!(frame, path = %path.display(), "exported camera frame");
                written += 1;
            }
            Some(None) => tracing::warn!(frame, "camera frame export was dropped"),
            None if finished => tracing::warn!(frame, "camera frame export never settled"),
            None => still_pending.push((frame, ticket)),
        }
    }
    *pending = still_pending;
    Ok(written)
}

fn export_path(out_dir: &Path, frame: u64, extension: &str) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d-%H%M%S%.3f");
    out_dir.join(format!("crtpix-{stamp}-{frame:06}.{extension}"))
}

fn write_blob(path: &Path, blob: &Blob) -> Result<()> {
    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, &blob.bytes).with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use subpixel::ImageFormat;
    use tempfile::TempDir;

    #[test]
    fn export_paths_carry_frame_and_extension() {
        let path = export_path(Path::new("/tmp/out"), 12, "png");
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("crtpix-"));
        assert!(name.ends_with("-000012.png"));
    }

    #[test]
    fn drain_writes_settled_tickets_and_keeps_the_rest() {
        let dir = TempDir::new().unwrap();
        let blob = Blob {
            format: ImageFormat::Png,
            bytes: vec![1, 2, 3],
        };
        let mut pending = vec![
            (3, ExportTicket::resolved(Some(blob))),
            (5, ExportTicket::resolved(None)),
        ];

        let written = drain_exports(&mut pending, dir.path(), false).unwrap();

        assert_eq!(written, 1);
        assert!(pending.is_empty());
        let files: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn missing_config_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_config(Some(dir.path().join("absent.toml").as_path())).unwrap();
        assert_eq!(config, CrtConfig::default());
    }
}
