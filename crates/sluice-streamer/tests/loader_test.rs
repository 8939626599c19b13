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

mod common;

use anyhow::Result;
use common::{
    loader, rgba8_dds_header, rgba8_texels, tagged_texels, wait_until, write_rgba8_dds,
    write_rgba8_ktx, write_triangle_gltf,
};
use sluice_core::device::{
    BufferDescriptor, BufferUsage, GraphicsDevice, IndexType, MemoryUsage, ResourceState,
    TextureCreationFlags, TextureDescriptor, TextureFormat, TextureUsage, VertexFormat,
    VertexLayout, VertexSemantic,
};
use sluice_core::{LoadPriority, LoaderConfig, SyncToken};
use sluice_infra::{HeadlessDevice, HeadlessDeviceDesc};
use sluice_streamer::{
    BufferLoadDesc, GeometryLoadDesc, GeometryLoadFlags, LoaderError, RequestKind,
    ResourceLoader, TextureCopyDesc, TextureLoadDesc, UploadResult,
};
use std::sync::Arc;

fn gpu_buffer(size: u64, usage: BufferUsage) -> BufferDescriptor<'static> {
    BufferDescriptor {
        size,
        usage,
        ..Default::default()
    }
}

fn rgba8_desc(width: u32, height: u32) -> TextureDescriptor<'static> {
    TextureDescriptor {
        width,
        height,
        format: TextureFormat::Rgba8Unorm,
        usage: TextureUsage::SAMPLED | TextureUsage::COPY_DST | TextureUsage::COPY_SRC,
        ..Default::default()
    }
}

#[test]
fn test_gpu_buffer_contents_arrive_after_token() -> Result<()> {
    let device = HeadlessDevice::default();
    let loader = loader(&device, LoaderConfig::default())?;
    let data: Vec<u8> = (0..64 * 1024).map(|i| (i % 251) as u8).collect();

    let (buffer, token) = loader.add_buffer(BufferLoadDesc {
        desc: gpu_buffer(data.len() as u64, BufferUsage::VERTEX),
        data: Some(&data),
        force_reset: false,
    })?;
    assert!(!token.is_zero());
    assert_eq!(token[LoadPriority::Update], 1);

    loader.wait_for_token(&token);
    assert!(loader.is_token_completed(&token));
    assert!(loader.is_token_submitted(&token));
    assert_eq!(device.buffer_contents(buffer), Some(data));
    assert_eq!(
        device.buffer_state(buffer),
        Some(ResourceState::VERTEX_AND_CONSTANT_BUFFER)
    );
    assert!(loader.last_fence_submitted(0).is_some());
    Ok(())
}

#[test]
fn test_host_visible_buffer_is_written_in_place() -> Result<()> {
    let device = HeadlessDevice::default();
    let loader = loader(&device, LoaderConfig::default())?;

    let (buffer, token) = loader.add_buffer(BufferLoadDesc {
        desc: BufferDescriptor {
            memory_usage: MemoryUsage::CpuToGpu,
            ..gpu_buffer(8, BufferUsage::UNIFORM)
        },
        data: Some(&[1, 2, 3, 4]),
        force_reset: false,
    })?;
    assert_eq!(token, SyncToken::ZERO);
    assert!(loader.is_token_completed(&token));
    assert_eq!(device.buffer_contents(buffer), Some(vec![1, 2, 3, 4, 0, 0, 0, 0]));
    Ok(())
}

#[test]
fn test_force_reset_zeroes_gpu_buffer() -> Result<()> {
    let device = HeadlessDevice::default();
    let loader = loader(&device, LoaderConfig::default())?;

    let (buffer, token) = loader.add_buffer(BufferLoadDesc {
        desc: gpu_buffer(300, BufferUsage::STORAGE),
        data: None,
        force_reset: true,
    })?;
    loader.wait_for_token(&token);
    assert_eq!(device.buffer_contents(buffer), Some(vec![0; 300]));
    assert_eq!(device.buffer_state(buffer), Some(ResourceState::UNORDERED_ACCESS));
    Ok(())
}

#[test]
fn test_oversized_initial_data_is_rejected() -> Result<()> {
    let device = HeadlessDevice::default();
    let loader = loader(&device, LoaderConfig::default())?;
    let rings = device.stats().live_buffers;

    let result = loader.add_buffer(BufferLoadDesc {
        desc: gpu_buffer(4, BufferUsage::VERTEX),
        data: Some(&[0; 8]),
        force_reset: false,
    });
    assert!(matches!(
        result,
        Err(LoaderError::UpdateOutOfBounds { size: 8, capacity: 4, .. })
    ));
    assert_eq!(device.stats().live_buffers, rings);
    Ok(())
}

#[test]
fn test_large_buffer_is_split_into_staging_sized_chunks() -> Result<()> {
    let device = HeadlessDevice::default();
    let config = LoaderConfig {
        staging_buffer_size: 4096,
        ..LoaderConfig::default()
    };
    let loader = loader(&device, config)?;
    let rings = device.stats().live_buffers;
    let data: Vec<u8> = (0..10_000u32).map(|i| (i * 7 % 256) as u8).collect();

    let (buffer, token) = loader.add_buffer(BufferLoadDesc {
        desc: gpu_buffer(data.len() as u64, BufferUsage::INDEX),
        data: Some(&data),
        force_reset: false,
    })?;
    // Three chunks, three update indices.
    assert_eq!(token[LoadPriority::Update], 3);
    loader.wait_for_token(&token);

    assert_eq!(device.buffer_contents(buffer), Some(data));
    let updates: Vec<u64> = loader
        .stats()
        .dispatches_of(RequestKind::UpdateBuffer)
        .map(|r| r.wait_index)
        .collect();
    assert_eq!(updates, vec![1, 2, 3]);
    // Every upload buffer went away with its resource set.
    assert_eq!(device.stats().live_buffers, rings + 1);
    Ok(())
}

#[test]
fn test_failed_chunk_write_queues_nothing() -> Result<()> {
    let device = HeadlessDevice::default();
    let config = LoaderConfig {
        staging_buffer_size: 4096,
        ..LoaderConfig::default()
    };
    let loader = loader(&device, config)?;
    let live = device.stats().live_buffers;
    let data = vec![3u8; 10_000];

    // The third of three chunks cannot be written.
    device.fail_writes_after(Some(2));
    let result = loader.add_buffer(BufferLoadDesc {
        desc: gpu_buffer(data.len() as u64, BufferUsage::VERTEX),
        data: Some(&data),
        force_reset: false,
    });
    device.fail_writes_after(None);

    assert!(matches!(result, Err(LoaderError::Device(_))));
    assert_eq!(loader.last_token_issued(), SyncToken::ZERO);
    assert_eq!(device.stats().live_buffers, live);
    assert!(loader.stats().dispatch_log.is_empty());

    let (buffer, token) = loader.add_buffer(BufferLoadDesc {
        desc: gpu_buffer(data.len() as u64, BufferUsage::VERTEX),
        data: Some(&data),
        force_reset: false,
    })?;
    assert_eq!(token[LoadPriority::Update], 3);
    loader.wait_for_token(&token);
    assert_eq!(device.buffer_contents(buffer), Some(data));
    Ok(())
}

#[test]
fn test_manual_barriers_route_buffer_copies_through_copy_dest() -> Result<()> {
    let device = HeadlessDevice::new(HeadlessDeviceDesc {
        manual_barriers: true,
        ..HeadlessDeviceDesc::default()
    });
    let config = LoaderConfig {
        staging_buffer_size: 4096,
        ..LoaderConfig::default()
    };
    let loader = loader(&device, config)?;
    let data: Vec<u8> = (0..6000u32).map(|i| (i % 241) as u8).collect();

    let (buffer, token) = loader.add_buffer(BufferLoadDesc {
        desc: gpu_buffer(data.len() as u64, BufferUsage::INDEX),
        data: Some(&data),
        force_reset: false,
    })?;
    loader.wait_for_token(&token);
    let update = loader.begin_buffer_update(buffer, 16, Some(4))?;
    update.write(0, &[9; 4])?;
    let token = loader.end_buffer_update(update)?;
    loader.wait_for_token(&token);

    let index = ResourceState::INDEX_BUFFER;
    let copy = ResourceState::COPY_DEST;
    assert_eq!(
        device.buffer_barriers(buffer),
        vec![
            // First chunk, out of the creation state.
            (ResourceState::COMMON, copy),
            (copy, index),
            // Second chunk.
            (index, copy),
            (copy, index),
            // Scoped update.
            (index, copy),
            (copy, index),
        ]
    );
    assert_eq!(device.buffer_state(buffer), Some(index));
    assert_eq!(device.stats().mismatched_barriers, 0);
    let mut expected = data;
    expected[16..20].copy_from_slice(&[9; 4]);
    assert_eq!(device.buffer_contents(buffer), Some(expected));
    Ok(())
}

#[test]
fn test_automatic_barriers_record_state_without_barriers() -> Result<()> {
    let device = HeadlessDevice::new(HeadlessDeviceDesc {
        manual_barriers: false,
        ..HeadlessDeviceDesc::default()
    });
    let loader = loader(&device, LoaderConfig::default())?;

    let (buffer, token) = loader.add_buffer(BufferLoadDesc {
        desc: gpu_buffer(32, BufferUsage::STORAGE),
        data: Some(&[4; 32]),
        force_reset: false,
    })?;
    loader.wait_for_token(&token);

    assert!(device.buffer_barriers(buffer).is_empty());
    assert_eq!(device.buffer_state(buffer), Some(ResourceState::UNORDERED_ACCESS));
    assert_eq!(device.buffer_contents(buffer), Some(vec![4; 32]));
    Ok(())
}

#[test]
fn test_dds_texture_is_loaded() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_rgba8_dds(dir.path(), "checker.dds", 4, 4)?;
    let device = HeadlessDevice::default();
    let loader = loader(&device, LoaderConfig::default())?;

    let (slot, token) = loader.add_texture(TextureLoadDesc::from_file(&path), LoadPriority::Normal)?;
    assert_eq!(token[LoadPriority::Normal], 1);
    loader.wait_for_token(&token);

    let texture = slot.get().expect("texture was created");
    assert_eq!(device.texture_subresource(texture, 0, 0), Some(rgba8_texels(4, 4)));
    assert_eq!(device.texture_state(texture), Some(ResourceState::SHADER_RESOURCE));
    assert_eq!(device.texture_info(texture)?.format, TextureFormat::Rgba8Unorm);
    Ok(())
}

#[test]
fn test_ktx_mip_chain_and_layers_are_loaded() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_rgba8_ktx(dir.path(), "array.ktx", 8, 4, 4, 3)?;
    let device = HeadlessDevice::default();
    let loader = loader(&device, LoaderConfig::default())?;

    let (slot, token) = loader.add_texture(TextureLoadDesc::from_file(&path), LoadPriority::Normal)?;
    loader.wait_for_token(&token);

    let texture = slot.get().expect("texture was created");
    let info = device.texture_info(texture)?;
    assert_eq!((info.width, info.height), (8, 4));
    assert_eq!((info.mip_levels, info.array_layers), (4, 3));
    for mip in 0..4 {
        for layer in 0..3 {
            assert_eq!(
                device.texture_subresource(texture, mip, layer),
                Some(tagged_texels(8, 4, mip, layer)),
                "mip {mip}, layer {layer}"
            );
        }
    }
    Ok(())
}

#[test]
fn test_srgb_flag_and_container_extension() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_rgba8_dds(dir.path(), "albedo.dds", 2, 2)?;
    let device = HeadlessDevice::default();
    let loader = loader(&device, LoaderConfig::default())?;

    let (slot, token) = loader.add_texture(
        TextureLoadDesc {
            creation_flags: TextureCreationFlags::SRGB,
            ..TextureLoadDesc::from_file(dir.path().join("albedo"))
        },
        LoadPriority::Low,
    )?;
    loader.wait_for_token(&token);

    let texture = slot.get().expect("extension resolved to .dds");
    assert_eq!(device.texture_info(texture)?.format, TextureFormat::Rgba8UnormSrgb);
    Ok(())
}

#[test]
fn test_corrupt_texture_resolves_as_invalid() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("broken.dds");
    std::fs::write(&path, b"DDS \x7c\x00\x00\x00 not a header")?;
    let device = HeadlessDevice::default();
    let loader = loader(&device, LoaderConfig::default())?;

    let (slot, token) = loader.add_texture(TextureLoadDesc::from_file(&path), LoadPriority::Normal)?;
    loader.wait_for_token(&token);

    assert!(loader.is_token_completed(&token));
    assert!(!slot.is_ready());
    assert_eq!(device.stats().live_textures, 0);
    let stats = loader.stats();
    assert_eq!(stats.invalid, 1);
    let record = stats
        .dispatches_of(RequestKind::LoadTexture)
        .last()
        .copied()
        .expect("load was dispatched");
    assert_eq!(record.result, UploadResult::InvalidRequest);
    assert_eq!(record.wait_index, token[LoadPriority::Normal]);
    Ok(())
}

#[test]
fn test_oversized_dds_dimensions_resolve_as_invalid() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let device = HeadlessDevice::default();
    let loader = loader(&device, LoaderConfig::default())?;

    // Rows of 0x3FFFFFFF texels overflow once pitched; a 2^31 mip count
    // would take billions of steps to size.
    let mut wide = rgba8_dds_header(0x3FFF_FFFF, 1);
    wide.extend_from_slice(&[0; 64]);
    let mut deep = rgba8_dds_header(4, 4);
    deep[4 + 4 * 6..4 + 4 * 7].copy_from_slice(&0x8000_0000u32.to_le_bytes());
    deep.extend_from_slice(&[0; 64]);

    let mut slots = Vec::new();
    let mut last = SyncToken::ZERO;
    for (name, bytes) in [("wide.dds", wide), ("deep.dds", deep)] {
        let path = dir.path().join(name);
        std::fs::write(&path, bytes)?;
        let (slot, token) = loader.add_texture(TextureLoadDesc::from_file(&path), LoadPriority::Normal)?;
        slots.push(slot);
        last.merge(token);
    }
    loader.wait_for_token(&last);

    assert!(slots.iter().all(|s| !s.is_ready()));
    assert_eq!(device.stats().live_textures, 0);
    wait_until("both loads to be counted", || loader.stats().invalid == 2);

    // The streaming thread survived and keeps serving loads.
    let good = write_rgba8_dds(dir.path(), "good.dds", 2, 2)?;
    let (found, token) = loader.add_texture(TextureLoadDesc::from_file(good), LoadPriority::Normal)?;
    loader.wait_for_token(&token);
    assert!(found.is_ready());
    Ok(())
}

#[test]
fn test_missing_file_does_not_stall_later_loads() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let good = write_rgba8_dds(dir.path(), "good.dds", 2, 2)?;
    let device = HeadlessDevice::default();
    let loader = loader(&device, LoaderConfig::default())?;

    let (missing, _) = loader.add_texture(
        TextureLoadDesc::from_file(dir.path().join("missing.dds")),
        LoadPriority::Normal,
    )?;
    let (found, token) = loader.add_texture(TextureLoadDesc::from_file(good), LoadPriority::Normal)?;
    loader.wait_for_token(&token);

    assert!(!missing.is_ready());
    assert!(found.is_ready());
    Ok(())
}

#[test]
fn test_texture_larger_than_staging_ring_uses_temporary_buffer() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_rgba8_dds(dir.path(), "large.dds", 64, 64)?;
    let device = HeadlessDevice::default();
    let config = LoaderConfig {
        staging_buffer_size: 4096,
        ..LoaderConfig::default()
    };
    let loader = loader(&device, config)?;
    let rings = device.stats().live_buffers;

    let (slot, token) = loader.add_texture(TextureLoadDesc::from_file(&path), LoadPriority::Normal)?;
    loader.wait_for_token(&token);

    let texture = slot.get().expect("texture was created");
    assert_eq!(device.texture_subresource(texture, 0, 0), Some(rgba8_texels(64, 64)));
    assert_eq!(device.stats().live_buffers, rings);
    // Counters land at the end of the rotation that published completion.
    wait_until("the spill to be counted", || loader.stats().temporary_buffers >= 1);
    assert_eq!(loader.stats().staging_full_retries, 0);
    Ok(())
}

#[test]
fn test_descriptor_only_texture_is_ready_immediately() -> Result<()> {
    let device = HeadlessDevice::default();
    let loader = loader(&device, LoaderConfig::default())?;

    let (slot, token) = loader.add_texture(
        TextureLoadDesc {
            desc: Some(rgba8_desc(8, 8)),
            ..TextureLoadDesc::default()
        },
        LoadPriority::Update,
    )?;
    let texture = slot.get().expect("created on the calling thread");
    assert_eq!(token[LoadPriority::Update], 1);

    loader.wait_for_token(&token);
    assert_eq!(device.texture_state(texture), Some(ResourceState::SHADER_RESOURCE));
    Ok(())
}

#[test]
fn test_texture_load_without_source_is_an_error() -> Result<()> {
    let device = HeadlessDevice::default();
    let loader = loader(&device, LoaderConfig::default())?;
    assert!(matches!(
        loader.add_texture(TextureLoadDesc::default(), LoadPriority::Normal),
        Err(LoaderError::EmptyTextureLoad)
    ));
    assert_eq!(loader.last_token_issued(), SyncToken::ZERO);
    Ok(())
}

#[test]
fn test_geometry_is_packed_into_layout() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_triangle_gltf(dir.path(), "triangle.gltf")?;
    let device = HeadlessDevice::default();
    let loader = loader(&device, LoaderConfig::default())?;

    let layout = VertexLayout::default()
        .with(VertexSemantic::Position, VertexFormat::Float32x3, 0)
        .with(VertexSemantic::Normal, VertexFormat::Unorm16x2, 0);
    let (slot, token) = loader.add_geometry(
        GeometryLoadDesc {
            file_name: path,
            vertex_layout: layout,
            flags: GeometryLoadFlags::SHADOWED,
            node_index: 0,
        },
        LoadPriority::Normal,
    )?;
    loader.wait_for_token(&token);

    let geometry = slot.get().expect("geometry was loaded");
    assert_eq!(geometry.index_type, IndexType::U16);
    assert_eq!(geometry.index_count, 3);
    assert_eq!(geometry.vertex_count, 3);
    assert_eq!(geometry.vertex_strides[0], 16);
    assert_eq!(geometry.draw_args.len(), 1);
    assert_eq!(geometry.draw_args[0].index_count, 3);

    let indices = device.buffer_contents(geometry.index_buffer).unwrap_or_default();
    assert_eq!(&indices[..6], &[0, 0, 1, 0, 2, 0]);
    let vertices = device
        .buffer_contents(geometry.vertex_buffers[0])
        .unwrap_or_default();
    assert_eq!(vertices.len(), 48);
    // Second vertex: (1, 0, 0) then +Z packed to the octahedron centre.
    assert_eq!(&vertices[16..20], &1.0f32.to_le_bytes());
    assert_eq!(&vertices[28..32], &[0x00, 0x80, 0x00, 0x80]);
    assert_eq!(
        device.buffer_state(geometry.vertex_buffers[0]),
        Some(ResourceState::VERTEX_AND_CONSTANT_BUFFER)
    );

    let mut geometry = geometry;
    let shadow = geometry.shadow.as_ref().expect("shadow requested");
    assert_eq!(shadow.positions.len(), 36);
    assert_eq!(shadow.normals.len(), 36);
    loader.remove_geometry_shadow_data(&mut geometry);
    assert!(geometry.shadow.is_none());

    let before = device.stats().live_buffers;
    loader.remove_geometry(geometry)?;
    assert_eq!(device.stats().live_buffers, before - 2);
    Ok(())
}

#[test]
fn test_failed_geometry_upload_releases_its_buffers() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_triangle_gltf(dir.path(), "triangle.gltf")?;
    let device = HeadlessDevice::default();
    let loader = loader(&device, LoaderConfig::default())?;
    let live = device.stats().live_buffers;
    let load = || GeometryLoadDesc {
        file_name: path.clone(),
        vertex_layout: VertexLayout::default().with(
            VertexSemantic::Position,
            VertexFormat::Float32x3,
            0,
        ),
        flags: GeometryLoadFlags::EMPTY,
        node_index: 0,
    };

    // Recording the copies fails after both buffers exist.
    device.fail_copy_recording(true);
    let (slot, token) = loader.add_geometry(load(), LoadPriority::Normal)?;
    loader.wait_for_token(&token);
    device.fail_copy_recording(false);
    assert!(!slot.is_ready());
    assert_eq!(device.stats().live_buffers, live);

    // The index data lands in staging, the vertex data does not.
    device.fail_writes_after(Some(1));
    let (slot, token) = loader.add_geometry(load(), LoadPriority::Normal)?;
    loader.wait_for_token(&token);
    device.fail_writes_after(None);
    assert!(!slot.is_ready());
    assert_eq!(device.stats().live_buffers, live);
    wait_until("both failures to be counted", || loader.stats().invalid == 2);

    let (slot, token) = loader.add_geometry(load(), LoadPriority::Normal)?;
    loader.wait_for_token(&token);
    let geometry = slot.get().expect("geometry was loaded");
    assert_eq!(device.stats().live_buffers, live + 2);
    assert_eq!(
        device.buffer_barriers(geometry.index_buffer),
        vec![
            (ResourceState::COMMON, ResourceState::COPY_DEST),
            (ResourceState::COPY_DEST, ResourceState::INDEX_BUFFER),
        ]
    );
    Ok(())
}

#[test]
fn test_geometry_on_update_lane_is_demoted() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_triangle_gltf(dir.path(), "triangle.gltf")?;
    let device = HeadlessDevice::default();
    let loader = loader(&device, LoaderConfig::default())?;

    let (_, token) = loader.add_geometry(
        GeometryLoadDesc {
            file_name: path,
            vertex_layout: VertexLayout::default().with(
                VertexSemantic::Position,
                VertexFormat::Float32x3,
                0,
            ),
            flags: GeometryLoadFlags::EMPTY,
            node_index: 0,
        },
        LoadPriority::Update,
    )?;
    assert_eq!(token[LoadPriority::Update], 0);
    assert_eq!(token[LoadPriority::Normal], 1);
    loader.wait_for_token(&token);
    Ok(())
}

#[test]
fn test_scoped_buffer_update() -> Result<()> {
    let device = HeadlessDevice::default();
    let loader = loader(&device, LoaderConfig::default())?;
    let (buffer, token) = loader.add_buffer(BufferLoadDesc {
        desc: gpu_buffer(64, BufferUsage::VERTEX),
        data: None,
        force_reset: true,
    })?;
    loader.wait_for_token(&token);

    let update = loader.begin_buffer_update(buffer, 16, Some(32))?;
    assert!(!update.is_in_place());
    assert_eq!(update.size(), 32);
    update.fill(7)?;
    assert!(matches!(
        update.write(30, &[0; 4]),
        Err(LoaderError::UpdateOutOfBounds { offset: 30, .. })
    ));
    let token = loader.end_buffer_update(update)?;
    loader.wait_for_token(&token);

    let contents = device.buffer_contents(buffer).unwrap_or_default();
    assert!(contents[..16].iter().all(|b| *b == 0));
    assert!(contents[16..48].iter().all(|b| *b == 7));
    assert!(contents[48..].iter().all(|b| *b == 0));

    assert!(matches!(
        loader.begin_buffer_update(buffer, 60, Some(8)),
        Err(LoaderError::UpdateOutOfBounds { capacity: 64, .. })
    ));
    Ok(())
}

#[test]
fn test_abandoned_buffer_update_frees_its_upload_buffer() -> Result<()> {
    let device = HeadlessDevice::default();
    let loader = loader(&device, LoaderConfig::default())?;
    let (buffer, _) = loader.add_buffer(BufferLoadDesc {
        desc: gpu_buffer(64, BufferUsage::VERTEX),
        ..Default::default()
    })?;
    let live = device.stats().live_buffers;

    let update = loader.begin_buffer_update(buffer, 0, None)?;
    assert_eq!(update.size(), 64);
    assert_eq!(device.stats().live_buffers, live + 1);
    drop(update);
    assert_eq!(device.stats().live_buffers, live);
    Ok(())
}

#[test]
fn test_host_visible_update_needs_no_token() -> Result<()> {
    let device = HeadlessDevice::default();
    let loader = loader(&device, LoaderConfig::default())?;
    let (buffer, _) = loader.add_buffer(BufferLoadDesc {
        desc: BufferDescriptor {
            memory_usage: MemoryUsage::CpuToGpu,
            ..gpu_buffer(16, BufferUsage::UNIFORM)
        },
        ..Default::default()
    })?;

    let update = loader.begin_buffer_update(buffer, 4, Some(4))?;
    assert!(update.is_in_place());
    update.write(0, &[9, 9, 9, 9])?;
    assert_eq!(loader.end_buffer_update(update)?, SyncToken::ZERO);
    assert_eq!(
        device.buffer_contents(buffer).map(|c| c[4..8].to_vec()),
        Some(vec![9, 9, 9, 9])
    );
    Ok(())
}

#[test]
fn test_texture_update_and_readback() -> Result<()> {
    let device = HeadlessDevice::default();
    let loader = loader(&device, LoaderConfig::default())?;
    let (slot, _) = loader.add_texture(
        TextureLoadDesc {
            desc: Some(rgba8_desc(4, 4)),
            ..TextureLoadDesc::default()
        },
        LoadPriority::Update,
    )?;
    let texture = slot.get().expect("created on the calling thread");

    let update = loader.begin_texture_update(texture, 0, 0)?;
    assert_eq!(update.row_bytes(), 16);
    assert_eq!(update.row_pitch(), 256);
    assert_eq!(update.row_count(), 4);
    update.write_packed(&rgba8_texels(4, 4))?;
    let token = loader.end_texture_update(update)?;
    loader.wait_for_token(&token);
    assert_eq!(device.texture_subresource(texture, 0, 0), Some(rgba8_texels(4, 4)));

    let (readback, _) = loader.add_buffer(BufferLoadDesc {
        desc: BufferDescriptor {
            memory_usage: MemoryUsage::GpuToCpu,
            ..gpu_buffer(1024, BufferUsage::COPY_DST)
        },
        ..Default::default()
    })?;
    let token = loader.copy_texture(TextureCopyDesc {
        texture,
        buffer: readback,
        mip_level: 0,
        array_layer: 0,
        buffer_offset: 0,
        texture_state: ResourceState::SHADER_RESOURCE,
    })?;
    loader.wait_for_token(&token);

    let contents = device.buffer_contents(readback).unwrap_or_default();
    let texels = rgba8_texels(4, 4);
    for row in 0..4 {
        assert_eq!(
            &contents[row * 256..row * 256 + 16],
            &texels[row * 16..row * 16 + 16]
        );
    }
    assert_eq!(device.texture_state(texture), Some(ResourceState::SHADER_RESOURCE));

    assert!(matches!(
        loader.begin_texture_update(texture, 1, 0),
        Err(LoaderError::InvalidSubresource { mip: 1, layer: 0 })
    ));
    Ok(())
}

#[test]
fn test_unknown_node_is_rejected() -> Result<()> {
    let device = HeadlessDevice::default();
    let loader = loader(&device, LoaderConfig::default())?;
    let result = loader.add_buffer(BufferLoadDesc {
        desc: BufferDescriptor {
            node_index: 3,
            ..gpu_buffer(16, BufferUsage::VERTEX)
        },
        data: Some(&[0; 16]),
        force_reset: false,
    });
    assert!(matches!(
        result,
        Err(LoaderError::UnknownNode { node: 3, count: 1 })
    ));
    Ok(())
}

#[test]
fn test_each_node_gets_its_own_copy_engine() -> Result<()> {
    let device = HeadlessDevice::new(HeadlessDeviceDesc {
        node_count: 2,
        ..HeadlessDeviceDesc::default()
    });
    let loader = loader(&device, LoaderConfig::default())?;

    let mut handles = Vec::new();
    let mut last = SyncToken::ZERO;
    for node in 0..2 {
        let (buffer, token) = loader.add_buffer(BufferLoadDesc {
            desc: BufferDescriptor {
                node_index: node,
                ..gpu_buffer(4, BufferUsage::VERTEX)
            },
            data: Some(&[node as u8 + 1; 4]),
            force_reset: false,
        })?;
        handles.push(buffer);
        last.merge(token);
    }
    // Wait indices are global across nodes.
    assert_eq!(last[LoadPriority::Update], 2);
    loader.wait_for_token(&last);

    assert_eq!(device.buffer_contents(handles[0]), Some(vec![1; 4]));
    assert_eq!(device.buffer_contents(handles[1]), Some(vec![2; 4]));
    assert!(loader.last_fence_submitted(0).is_some());
    assert!(loader.last_fence_submitted(1).is_some());
    assert_ne!(loader.last_fence_submitted(0), loader.last_fence_submitted(1));
    assert_eq!(loader.last_fence_submitted(2), None);
    Ok(())
}

#[test]
fn test_unified_memory_geometry_skips_staging() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_triangle_gltf(dir.path(), "triangle.gltf")?;
    let device = HeadlessDevice::new(HeadlessDeviceDesc {
        unified_memory: true,
        ..HeadlessDeviceDesc::default()
    });
    let loader = loader(&device, LoaderConfig::default())?;

    let data = [5u8; 32];
    let (buffer, token) = loader.add_buffer(BufferLoadDesc {
        desc: gpu_buffer(32, BufferUsage::VERTEX),
        data: Some(&data),
        force_reset: false,
    })?;
    assert_eq!(token, SyncToken::ZERO);
    assert_eq!(device.buffer_contents(buffer), Some(data.to_vec()));

    let (slot, token) = loader.add_geometry(
        GeometryLoadDesc {
            file_name: path,
            vertex_layout: VertexLayout::default().with(
                VertexSemantic::Position,
                VertexFormat::Float32x3,
                0,
            ),
            flags: GeometryLoadFlags::STRUCTURED_BUFFERS,
            node_index: 0,
        },
        LoadPriority::Normal,
    )?;
    loader.wait_for_token(&token);
    let geometry = slot.get().expect("geometry was loaded");
    assert!(device
        .buffer_info(geometry.index_buffer)?
        .usage
        .contains(BufferUsage::STORAGE));
    assert_eq!(
        device.buffer_contents(geometry.index_buffer).map(|b| b[..6].to_vec()),
        Some(vec![0, 0, 1, 0, 2, 0])
    );
    Ok(())
}

#[test]
fn test_single_threaded_loader_is_pumped_by_caller() -> Result<()> {
    let device = HeadlessDevice::default();
    let loader = loader(
        &device,
        LoaderConfig {
            single_threaded: true,
            ..LoaderConfig::default()
        },
    )?;
    assert!(loader.is_single_threaded());

    let (buffer, token) = loader.add_buffer(BufferLoadDesc {
        desc: gpu_buffer(4, BufferUsage::VERTEX),
        data: Some(&[3; 4]),
        force_reset: false,
    })?;
    // Submitted while enqueuing, completed once its set comes round again.
    assert!(loader.is_token_submitted(&token));
    let mut pumps = 0;
    while !loader.is_token_completed(&token) {
        assert!(loader.pump(), "pump found no work before completion");
        pumps += 1;
        assert!(pumps < 8);
    }
    assert_eq!(device.buffer_contents(buffer), Some(vec![3; 4]));
    assert!(!loader.pump());
    Ok(())
}

#[test]
fn test_invalid_config_is_rejected() {
    let device = HeadlessDevice::default();
    let result = ResourceLoader::new(
        Arc::new(device),
        LoaderConfig {
            buffer_count: 0,
            ..LoaderConfig::default()
        },
    );
    assert!(matches!(result, Err(LoaderError::Config(_))));
}

#[test]
fn test_shutdown_releases_engines_and_refuses_work() -> Result<()> {
    let device = HeadlessDevice::default();
    let mut loader = loader(&device, LoaderConfig::default())?;
    let (buffer, token) = loader.add_buffer(BufferLoadDesc {
        desc: gpu_buffer(16, BufferUsage::VERTEX),
        data: Some(&[1; 16]),
        force_reset: false,
    })?;
    loader.wait_for_token(&token);

    loader.shutdown();
    assert!(loader.all_resource_loads_completed());
    assert_eq!(device.stats().live_buffers, 1);

    let live = device.stats().live_buffers;
    assert!(matches!(
        loader.add_buffer(BufferLoadDesc {
            desc: gpu_buffer(16, BufferUsage::VERTEX),
            data: Some(&[1; 16]),
            force_reset: false,
        }),
        Err(LoaderError::ShutDown)
    ));
    assert_eq!(device.stats().live_buffers, live);
    loader.remove_buffer(buffer)?;
    assert_eq!(device.stats().live_buffers, 0);
    // A second shutdown is a no-op.
    loader.shutdown();
    Ok(())
}

#[test]
fn test_wait_for_all_loads_covers_every_lane() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let texture = write_rgba8_dds(dir.path(), "a.dds", 8, 8)?;
    let mesh = write_triangle_gltf(dir.path(), "b.gltf")?;
    let device = HeadlessDevice::default();
    let loader = loader(&device, LoaderConfig::default())?;

    let (tex_slot, _) = loader.add_texture(TextureLoadDesc::from_file(texture), LoadPriority::Low)?;
    let (mesh_slot, _) = loader.add_geometry(
        GeometryLoadDesc {
            file_name: mesh,
            vertex_layout: VertexLayout::default().with(
                VertexSemantic::Position,
                VertexFormat::Float32x3,
                0,
            ),
            flags: GeometryLoadFlags::EMPTY,
            node_index: 0,
        },
        LoadPriority::Normal,
    )?;
    loader.add_buffer(BufferLoadDesc {
        desc: gpu_buffer(4, BufferUsage::VERTEX),
        data: Some(&[1; 4]),
        force_reset: false,
    })?;

    loader.wait_for_all_resource_loads();
    assert!(loader.all_resource_loads_completed());
    assert!(tex_slot.is_ready());
    assert!(mesh_slot.is_ready());
    assert_eq!(loader.pending_token_waiters(), 0);
    Ok(())
}
