//! Offline bake CLI: load a skinned glTF, bake its clips into GPU lookup
//! textures, and report the resulting clip table.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use ab_assets::{load_gltf_skinned, merge_gltf_animations};
use anim_bakery::{BakeKernels, BakedModelSet, PoseLock, SampleOptions, ingest};

#[derive(Parser, Debug)]
#[command(name = "clip-bake")]
#[command(about = "Bake skeletal animation clips into GPU lookup textures")]
struct Cli {
    /// Path to a .gltf or .glb file with a skinned mesh
    path: PathBuf,

    /// Extra glTF/GLB whose clips are merged in by bone name (repeatable)
    #[arg(long)]
    anims: Vec<PathBuf>,

    /// Frames to drop between kept frames
    #[arg(long, default_value_t = 0)]
    skip: u32,

    /// Override the derived capture rate (fps)
    #[arg(long)]
    fps: Option<f32>,

    /// Comma-separated clip names to bake, in clip-table order
    #[arg(long, value_delimiter = ',')]
    clips: Option<Vec<String>>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    pollster::block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    let mut asset = load_gltf_skinned(&cli.path)?;
    for extra in &cli.anims {
        let merged = merge_gltf_animations(&mut asset, extra)?;
        log::info!("merged {merged} clip(s) from {}", extra.display());
    }

    let instance = wgpu::Instance::default();
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            compatible_surface: None,
        })
        .await
        .context("request adapter")?;
    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("bake-device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_defaults(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::default(),
        })
        .await?;

    let kernels = BakeKernels::new(&device);
    let lock = PoseLock::new();
    let skeleton = ingest::skeleton_from_cpu(&asset);
    let clips = ingest::clips_from_cpu(&asset, cli.clips.as_deref());
    let meshes = ingest::mesh_weights_from_cpu(&asset);
    log::info!(
        "{}: {} bone(s), {} sub-mesh(es), {} clip(s)",
        cli.path.display(),
        skeleton.bone_count(),
        meshes.len(),
        clips.len()
    );

    let options = SampleOptions {
        skip: cli.skip,
        frame_rate: cli.fps,
    };
    let mut set = BakedModelSet::new(skeleton, clips, meshes, options);
    // The bake pass itself warns once per skipped clip.
    let report = set.bake(&device, &queue, &kernels, &lock)?;
    for (mi, model) in set.baked_models().iter().enumerate() {
        for (ci, range) in model.animations.clips.iter().enumerate() {
            log::info!(
                "model {mi} clip {ci}: start={} len={}",
                range.index_start,
                range.len
            );
        }
    }

    device
        .poll(wgpu::PollType::Wait)
        .context("wait for bake submissions")?;
    log::info!("baked {} model(s)", report.models);
    Ok(())
}
