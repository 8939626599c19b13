// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Streams asset files into a headless device and reports what the loader
//! did with them.
//!
//! ```bash
//! sluice assets/rock.dds assets/tree.glb --staging-size 4194304 --nodes 2
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::json;
use sluice_core::device::{
    BufferDescriptor, BufferUsage, GraphicsDevice, TextureId, VertexFormat, VertexLayout,
    VertexSemantic,
};
use sluice_core::{LoadPriority, LoaderConfig, SyncToken};
use sluice_infra::{HeadlessDevice, HeadlessDeviceDesc};
use sluice_streamer::{
    BufferLoadDesc, Geometry, GeometryLoadDesc, GeometryLoadFlags, ResourceLoader, ResourceSlot,
    TextureContainer, TextureLoadDesc,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(version, about = "Streams asset files through the resource loader")]
struct Args {
    /// Files to load: .dds and .ktx as textures, .gltf and .glb as
    /// geometry, anything else as a raw buffer.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// JSON file with loader settings. Flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Staging ring size per resource set, in bytes.
    #[arg(long)]
    staging_size: Option<u64>,

    /// Number of resource sets per copy engine.
    #[arg(long)]
    buffer_count: Option<u32>,

    /// Run the streamer on the main thread.
    #[arg(long)]
    single_threaded: bool,

    /// Simulated device nodes. Files are spread over them in turn.
    #[arg(long, default_value_t = 1)]
    nodes: u32,

    /// Queue texture and geometry loads on the low priority lane.
    #[arg(long)]
    low_priority: bool,

    /// Print the report as JSON.
    #[arg(long)]
    json: bool,
}

enum Pending {
    Texture(ResourceSlot<TextureId>),
    Geometry(ResourceSlot<Geometry>),
    Buffer(u64),
}

struct Job {
    path: PathBuf,
    node: u32,
    token: SyncToken,
    pending: Pending,
}

fn loader_config(args: &Args) -> Result<LoaderConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            LoaderConfig::from_json_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?
        }
        None => LoaderConfig::default(),
    };
    if let Some(size) = args.staging_size {
        config.staging_buffer_size = size;
    }
    if let Some(count) = args.buffer_count {
        config.buffer_count = count;
    }
    config.single_threaded |= args.single_threaded;
    config.validate()?;
    Ok(config)
}

fn geometry_layout() -> VertexLayout {
    VertexLayout::default()
        .with(VertexSemantic::Position, VertexFormat::Float32x3, 0)
        .with(VertexSemantic::TexCoord0, VertexFormat::Float32x2, 1)
}

fn submit(loader: &ResourceLoader, path: &Path, node: u32, priority: LoadPriority) -> Result<Job> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let (token, pending) = match extension.as_str() {
        "dds" | "ktx" => {
            let container = if extension == "ktx" {
                TextureContainer::Ktx
            } else {
                TextureContainer::Dds
            };
            let (slot, token) = loader.add_texture(
                TextureLoadDesc {
                    container,
                    node_index: node,
                    ..TextureLoadDesc::from_file(path)
                },
                priority,
            )?;
            (token, Pending::Texture(slot))
        }
        "gltf" | "glb" => {
            let (slot, token) = loader.add_geometry(
                GeometryLoadDesc {
                    file_name: path.to_path_buf(),
                    vertex_layout: geometry_layout(),
                    flags: GeometryLoadFlags::EMPTY,
                    node_index: node,
                },
                priority,
            )?;
            (token, Pending::Geometry(slot))
        }
        _ => {
            let bytes =
                std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            let (_, token) = loader.add_buffer(BufferLoadDesc {
                desc: BufferDescriptor {
                    label: path.file_name().map(|n| n.to_string_lossy()),
                    size: bytes.len() as u64,
                    usage: BufferUsage::STORAGE,
                    node_index: node,
                    ..Default::default()
                },
                data: Some(&bytes),
                force_reset: false,
            })?;
            (token, Pending::Buffer(bytes.len() as u64))
        }
    };
    log::debug!("queued {} on node {node} as {token:?}", path.display());
    Ok(Job {
        path: path.to_path_buf(),
        node,
        token,
        pending,
    })
}

fn describe(device: &dyn GraphicsDevice, pending: &Pending) -> Option<String> {
    match pending {
        Pending::Texture(slot) => {
            let texture = slot.get()?;
            let info = device.texture_info(texture).ok()?;
            Some(format!(
                "texture {}x{}x{}, {} mip(s), {} layer(s), {:?}",
                info.width, info.height, info.depth, info.mip_levels, info.array_layers, info.format
            ))
        }
        Pending::Geometry(slot) => slot.map(|g| {
            format!(
                "geometry {} vertices, {} indices ({:?}), {} primitive(s), {} joint(s)",
                g.vertex_count,
                g.index_count,
                g.index_type,
                g.draw_args.len(),
                g.joint_count
            )
        }),
        Pending::Buffer(size) => Some(format!("buffer {size} bytes")),
    }
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = loader_config(&args)?;

    let device = HeadlessDevice::new(HeadlessDeviceDesc {
        node_count: args.nodes.max(1),
        ..HeadlessDeviceDesc::default()
    });
    let mut loader = ResourceLoader::new(Arc::new(device.clone()), config)?;
    let priority = if args.low_priority {
        LoadPriority::Low
    } else {
        LoadPriority::Normal
    };

    let started = Instant::now();
    let mut jobs = Vec::with_capacity(args.files.len());
    for (i, path) in args.files.iter().enumerate() {
        let node = i as u32 % args.nodes.max(1);
        match submit(&loader, path, node, priority) {
            Ok(job) => jobs.push(job),
            Err(e) => log::error!("{}: {e:#}", path.display()),
        }
    }

    if loader.is_single_threaded() {
        while !loader.all_resource_loads_completed() {
            loader.pump();
        }
    } else {
        loader.wait_for_all_resource_loads();
    }
    let elapsed = started.elapsed();

    let results: Vec<(&Job, Option<String>)> = jobs
        .iter()
        .map(|job| (job, describe(&device, &job.pending)))
        .collect();
    let failed = args.files.len() - results.iter().filter(|(_, d)| d.is_some()).count();
    let stats = loader.stats();
    let device_stats = device.stats();

    if args.json {
        let files: Vec<_> = results
            .iter()
            .map(|(job, description)| {
                json!({
                    "path": job.path.display().to_string(),
                    "node": job.node,
                    "token": job.token.lanes(),
                    "loaded": description.is_some(),
                    "description": description,
                })
            })
            .collect();
        let report = json!({
            "files": files,
            "elapsed_ms": elapsed.as_secs_f64() * 1000.0,
            "rotations": stats.rotations,
            "completed": stats.completed,
            "invalid": stats.invalid,
            "staging_full_retries": stats.staging_full_retries,
            "temporary_buffers": stats.temporary_buffers,
            "submissions": device_stats.submissions,
            "bytes_copied": device_stats.bytes_copied,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for (job, description) in &results {
            match description {
                Some(text) => println!("  ok    {} (node {}): {text}", job.path.display(), job.node),
                None => println!("  FAIL  {} (node {})", job.path.display(), job.node),
            }
        }
        println!(
            "{} file(s) in {:.2?}: {} rotation(s), {} request(s) completed, {} invalid, {} staging retries, {} temporary buffer(s)",
            args.files.len(),
            elapsed,
            stats.rotations,
            stats.completed,
            stats.invalid,
            stats.staging_full_retries,
            stats.temporary_buffers
        );
        println!(
            "device: {} submission(s), {} bytes copied",
            device_stats.submissions, device_stats.bytes_copied
        );
    }

    loader.shutdown();
    if failed > 0 {
        bail!("{failed} of {} file(s) failed to load", args.files.len());
    }
    Ok(())
}
