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

//! Fixtures shared by the loader integration tests.

#![allow(dead_code)]

use anyhow::Result;
use base64::Engine;
use sluice_core::LoaderConfig;
use sluice_infra::HeadlessDevice;
use sluice_streamer::ResourceLoader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A loader driving `device`, which the test keeps for inspection.
pub fn loader(device: &HeadlessDevice, config: LoaderConfig) -> Result<ResourceLoader> {
    init_logging();
    Ok(ResourceLoader::new(Arc::new(device.clone()), config)?)
}

/// Polls `condition` until it holds, panicking after ten seconds.
pub fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Waits until every token issued so far was submitted and the streamer is
/// parked on a held fence. Held work is released while something is still
/// queued behind the fence.
pub fn settle_on_fence(device: &HeadlessDevice, loader: &ResourceLoader) {
    let issued = loader.last_token_issued();
    wait_until("the streamer to park on a fence", || {
        if device.fence_waiters() != 1 {
            return false;
        }
        if loader.is_token_submitted(&issued) {
            return true;
        }
        device.release_submissions();
        false
    });
}

/// Texel `i` of an RGBA8 image holds bytes derived from its index.
pub fn rgba8_texels(width: u32, height: u32) -> Vec<u8> {
    (0..width * height * 4).map(|i| (i % 253) as u8).collect()
}

/// Magic and legacy header of a single-mip RGBA8 DDS file.
pub fn rgba8_dds_header(width: u32, height: u32) -> Vec<u8> {
    let mut header = [0u32; 31];
    header[0] = 124; // header size
    header[1] = 0x1007; // caps | height | width | pixel format
    header[2] = height;
    header[3] = width;
    header[6] = 1; // mip count
    header[18] = 32; // pixel format size
    header[19] = 0x41; // RGB | alpha pixels
    header[21] = 32;
    header[22] = 0x0000_00ff;
    header[23] = 0x0000_ff00;
    header[24] = 0x00ff_0000;
    header[25] = 0xff00_0000;
    header[26] = 0x1000; // texture caps

    let mut bytes = b"DDS ".to_vec();
    bytes.extend_from_slice(bytemuck::cast_slice(&header));
    bytes
}

/// Writes a single-mip, legacy-header RGBA8 DDS file.
pub fn write_rgba8_dds(dir: &Path, name: &str, width: u32, height: u32) -> Result<PathBuf> {
    let mut bytes = rgba8_dds_header(width, height);
    bytes.extend_from_slice(&rgba8_texels(width, height));
    let path = dir.join(name);
    std::fs::write(&path, bytes)?;
    Ok(path)
}

/// Texels of one RGBA8 sub-resource whose bytes encode its mip and layer.
pub fn tagged_texels(width: u32, height: u32, mip: u32, layer: u32) -> Vec<u8> {
    let w = (width >> mip).max(1);
    let h = (height >> mip).max(1);
    (0..w * h * 4)
        .map(|i| (i as u8).wrapping_add((mip * 16 + layer * 64) as u8))
        .collect()
}

/// Writes an RGBA8 KTX file with `mips` levels of `layers` array elements,
/// filled with [`tagged_texels`].
pub fn write_rgba8_ktx(
    dir: &Path,
    name: &str,
    width: u32,
    height: u32,
    mips: u32,
    layers: u32,
) -> Result<PathBuf> {
    let header: [u32; 13] = [
        0x0403_0201, // endianness
        0x1401,      // GL_UNSIGNED_BYTE
        1,           // type size
        0x1908,      // GL_RGBA
        0x8058,      // GL_RGBA8
        0x1908,      // base internal format
        width,
        height,
        0, // depth
        layers,
        1, // faces
        mips,
        8, // key/value bytes
    ];
    let mut bytes = vec![0xAB, 0x4B, 0x54, 0x58, 0x20, 0x31, 0x31, 0xBB, 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.extend_from_slice(bytemuck::cast_slice(&header));
    bytes.extend_from_slice(&[0xEE; 8]);
    for mip in 0..mips {
        let level: Vec<u8> = (0..layers.max(1))
            .flat_map(|layer| tagged_texels(width, height, mip, layer))
            .collect();
        bytes.extend_from_slice(&(level.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&level);
    }
    let path = dir.join(name);
    std::fs::write(&path, bytes)?;
    Ok(path)
}

/// Writes a one-triangle glTF with positions, normals and 16-bit indices,
/// its buffer embedded as a data URI.
pub fn write_triangle_gltf(dir: &Path, name: &str) -> Result<PathBuf> {
    let positions: [f32; 9] = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
    let normals: [f32; 9] = [0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0];
    let mut bin: Vec<u8> = bytemuck::cast_slice(&positions).to_vec();
    bin.extend_from_slice(bytemuck::cast_slice(&normals));
    bin.extend_from_slice(bytemuck::cast_slice(&[0u16, 1, 2]));
    let uri = base64::engine::general_purpose::STANDARD.encode(&bin);
    let document = format!(
        r#"{{
  "asset": {{"version": "2.0"}},
  "buffers": [{{"byteLength": {len}, "uri": "data:application/octet-stream;base64,{uri}"}}],
  "bufferViews": [
    {{"buffer": 0, "byteOffset": 0, "byteLength": 36}},
    {{"buffer": 0, "byteOffset": 36, "byteLength": 36}},
    {{"buffer": 0, "byteOffset": 72, "byteLength": 6}}
  ],
  "accessors": [
    {{"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
      "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]}},
    {{"bufferView": 1, "componentType": 5126, "count": 3, "type": "VEC3"}},
    {{"bufferView": 2, "componentType": 5123, "count": 3, "type": "SCALAR"}}
  ],
  "meshes": [{{"primitives": [{{"attributes": {{"POSITION": 0, "NORMAL": 1}}, "indices": 2}}]}}]
}}"#,
        len = bin.len()
    );
    let path = dir.join(name);
    std::fs::write(&path, document)?;
    Ok(path)
}
