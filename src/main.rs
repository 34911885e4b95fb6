use clap::Parser;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use splatsort::camera::{look_at_target, Camera, Orbit};
use splatsort::math::Bounds;
use splatsort::scene;
use splatsort::{HostVertexStorage, IndexMode, OrderingBuffer, SortConfig, SortCoordinator};

type AppResult<T> = Result<T, Box<dyn std::error::Error>>;

const UPDATE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Parser)]
#[command(
    name = "splatsort",
    version,
    about = "Drive the background splat depth sorter around a scene"
)]
struct Cli {
    /// Path to a .splat scene file (uses a procedural scene if omitted)
    input: Option<PathBuf>,
    #[arg(long, value_name = "N", default_value_t = 200_000, help = "Splat count of the procedural scene")]
    demo_count: usize,
    #[arg(long, default_value_t = 0xC0FFEE, help = "Seed for the procedural scene")]
    seed: u64,
    #[arg(long, default_value_t = 120, help = "Number of orbit steps to sort")]
    frames: u32,
    #[arg(long, default_value_t = splatsort::config::DEFAULT_BUCKET_BITS, help = "Depth quantization bits")]
    bucket_bits: u32,
    #[arg(long, default_value_t = splatsort::config::DEFAULT_CAMERA_EPSILON, help = "Camera change threshold")]
    epsilon: f32,
    #[arg(long, help = "Write integer indices instead of float indices")]
    integer_indices: bool,
}

fn load_centers_from_cli(cli: &Cli) -> AppResult<Vec<f32>> {
    match cli.input.as_ref() {
        Some(path) => Ok(scene::load_centers(path)?),
        None => Ok(scene::demo_centers(cli.demo_count, cli.seed)),
    }
}

/// Every lane of `ordering` must hold each splat index exactly once.
fn is_full_permutation(ordering: &OrderingBuffer, splat_count: usize) -> bool {
    (0..4).all(|lane| {
        let mut seen = vec![false; splat_count];
        ordering.lane(lane).into_iter().all(|index| {
            let slot = seen.get_mut(index as usize);
            match slot {
                Some(flag) if !*flag => {
                    *flag = true;
                    true
                }
                _ => false,
            }
        })
    })
}

fn main() -> AppResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "splatsort=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = SortConfig::default()
        .with_bucket_bits(cli.bucket_bits)
        .with_camera_epsilon(cli.epsilon);

    let centers = load_centers_from_cli(&cli)?;
    let splat_count = centers.len() / 3;
    let bounds = Bounds::from_centers(&centers);
    info!(splat_count, ?bounds, "scene loaded");

    let index_mode = IndexMode::from_integer_flag(cli.integer_indices);
    let mut coordinator = SortCoordinator::with_config(HostVertexStorage::new(), config)?;
    let events = coordinator.subscribe();
    coordinator.init(
        OrderingBuffer::zeroed(index_mode, splat_count),
        centers,
        cli.integer_indices,
    )?;

    let target = bounds.center();
    let extent = bounds.max - bounds.min;
    let mut orbit = Orbit {
        target,
        radius: extent.length_squared().sqrt().max(1.0) * 1.5,
        height: extent.y * 0.25,
        angle: 0.0,
    };
    let mut camera = Camera::new(target, 0.0, 0.0);
    look_at_target(&mut camera, target);

    let started = Instant::now();
    let mut total_sort_time = Duration::ZERO;
    let mut updates = 0u64;
    for frame in 0..cli.frames {
        orbit.advance(&mut camera, std::f32::consts::TAU / cli.frames.max(1) as f32);
        let pose = camera.pose();
        coordinator.set_camera(pose.position, pose.direction);

        if coordinator.wait_for_update(UPDATE_TIMEOUT) == 0 {
            warn!(frame, "no ordering arrived within the timeout");
            continue;
        }
        for event in events.try_iter() {
            let splatsort::SortEvent::Updated { sort_time, .. } = event;
            total_sort_time += sort_time;
            updates += 1;
        }

        if let Some(ordering) = coordinator.storage().contents() {
            if !is_full_permutation(ordering, splat_count) {
                return Err(format!("frame {frame}: installed ordering is not a permutation").into());
            }
        }
    }

    let mean_us = if updates == 0 {
        0
    } else {
        total_sort_time.as_micros() / u128::from(updates)
    };
    info!(
        frames = cli.frames,
        updates,
        mean_sort_us = u64::try_from(mean_us).unwrap_or(u64::MAX),
        wall_ms = started.elapsed().as_millis() as u64,
        "orbit finished"
    );

    coordinator.destroy();
    Ok(())
}
