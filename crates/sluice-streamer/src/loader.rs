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

//! The public handle producers use to schedule uploads.

use crate::desc::{
    BufferLoadDesc, Geometry, GeometryLoadDesc, ResourceSlot, TextureCopyDesc, TextureLoadDesc,
};
use crate::error::{LoaderError, Result};
use crate::handlers::{pitched_layout, resting_state, SubresourceLayout, SubresourceRange};
use crate::request::{QueuedRequest, StateTransition, UploadRequest};
use crate::staging::{create_upload_buffer, StagingRange};
use crate::stats::StreamerStats;
use crate::streamer::{Shared, StreamerLoop};
use sluice_core::device::{
    determine_texture_start_state, BufferId, BufferUsage, FenceId, GraphicsDevice, MemoryUsage,
    ResourceState, TextureId,
};
use sluice_core::{LoadPriority, LoaderConfig, SyncToken};
use sluice_io::ContainerRegistry;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

/// Schedules buffer, texture and geometry uploads on a streaming thread.
///
/// Every call that queues work returns a [`SyncToken`]. A token is
/// completed once the device executed every request that contributed to
/// it, or once those requests were dropped as invalid. Check the returned
/// handle or slot to tell the two apart.
///
/// Dropping the loader shuts it down.
#[derive(Debug)]
pub struct ResourceLoader {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    inline: Option<Mutex<StreamerLoop>>,
}

impl ResourceLoader {
    /// Creates a loader with the default container parsers.
    ///
    /// # Errors
    ///
    /// Fails if `config` is invalid, if the device cannot create the copy
    /// queues, or if the streaming thread cannot be spawned.
    pub fn new(device: Arc<dyn GraphicsDevice>, config: LoaderConfig) -> Result<Self> {
        Self::with_containers(device, config, ContainerRegistry::default())
    }

    /// Creates a loader resolving texture files through `containers`.
    pub fn with_containers(
        device: Arc<dyn GraphicsDevice>,
        config: LoaderConfig,
        containers: ContainerRegistry,
    ) -> Result<Self> {
        config.validate()?;
        let shared = Arc::new(Shared::new(device, config));
        let streamer = StreamerLoop::new(Arc::clone(&shared), containers)?;

        log::info!(
            "ResourceLoader: {} node(s), {} resource set(s), {} byte staging rings{}",
            shared.node_count(),
            shared.config.buffer_count,
            shared.config.effective_staging_size(),
            if shared.config.single_threaded {
                ", single-threaded"
            } else {
                ""
            }
        );

        if shared.config.single_threaded {
            return Ok(Self {
                shared,
                worker: None,
                inline: Some(Mutex::new(streamer)),
            });
        }
        let worker = thread::Builder::new()
            .name("sluice-streamer".into())
            .spawn(move || streamer.run())?;
        Ok(Self {
            shared,
            worker: Some(worker),
            inline: None,
        })
    }

    /// The device uploads run on.
    pub fn device(&self) -> &Arc<dyn GraphicsDevice> {
        &self.shared.device
    }

    /// The configuration the loader was created with.
    pub fn config(&self) -> &LoaderConfig {
        &self.shared.config
    }

    /// `true` when no streaming thread runs.
    pub fn is_single_threaded(&self) -> bool {
        self.inline.is_some()
    }

    fn check_node(&self, node: u32) -> Result<()> {
        let count = self.shared.node_count();
        if node < count {
            Ok(())
        } else {
            Err(LoaderError::UnknownNode { node, count })
        }
    }

    fn load_lane(priority: LoadPriority, what: &str) -> LoadPriority {
        if priority.is_update() {
            log::warn!("ResourceLoader: {what} load queued on the update lane, using Normal");
            LoadPriority::Normal
        } else {
            priority
        }
    }

    fn release_upload(&self, buffer: BufferId) {
        if let Err(e) = self.shared.device.destroy_buffer(buffer) {
            log::error!("ResourceLoader: failed to free upload buffer {buffer:?}: {e}");
        }
    }

    fn enqueue(
        &self,
        node: u32,
        priority: LoadPriority,
        request: UploadRequest,
        upload_buffer: Option<BufferId>,
    ) -> Result<SyncToken> {
        if let Err(e) = self.check_node(node) {
            if let Some(buffer) = upload_buffer {
                self.release_upload(buffer);
            }
            return Err(e);
        }
        let token = {
            let mut queue = self.shared.lock_queue();
            if !queue.running {
                drop(queue);
                if let Some(buffer) = upload_buffer {
                    self.release_upload(buffer);
                }
                return Err(LoaderError::ShutDown);
            }
            let wait_index = self.shared.ledger.next_wait_index(priority);
            queue.requests.push(
                node,
                priority,
                QueuedRequest {
                    request,
                    wait_index,
                    upload_buffer,
                },
            );
            self.shared.queue_cond.notify_one();
            SyncToken::single(priority, wait_index)
        };
        self.pump();
        Ok(token)
    }

    /// Creates a buffer and schedules its initial contents.
    ///
    /// The buffer exists when this returns. Host-visible buffers, and any
    /// buffer on a unified-memory device, are written immediately and no
    /// token is issued. GPU-only buffers are filled through upload buffers
    /// no larger than the staging size, on the update lane.
    ///
    /// # Errors
    ///
    /// Fails if the data does not fit, or if the device refuses a buffer.
    pub fn add_buffer(&self, load: BufferLoadDesc<'_>) -> Result<(BufferId, SyncToken)> {
        let node = load.desc.node_index;
        self.check_node(node)?;
        let device = &*self.shared.device;
        let caps = &self.shared.caps;

        let update = load.data.is_some() || load.force_reset;
        let size = load.data.map_or(load.desc.size, |d| d.len() as u64);
        if size > load.desc.size {
            return Err(LoaderError::UpdateOutOfBounds {
                offset: 0,
                size,
                capacity: load.desc.size,
            });
        }
        let staged = update && load.desc.memory_usage == MemoryUsage::GpuOnly && !caps.unified_memory;

        let mut desc = load.desc.clone();
        if staged {
            desc.start_state = ResourceState::COMMON;
            desc.usage.insert(BufferUsage::COPY_DST);
        }
        let buffer = device.create_buffer(&desc)?;
        let fill = if staged {
            self.stage_buffer(buffer, node, load.data, size)
        } else if update {
            self.write_buffer_in_place(buffer, load.data, size)
        } else if desc.memory_usage == MemoryUsage::GpuOnly
            && desc.start_state != ResourceState::UNDEFINED
            && desc.start_state != ResourceState::COMMON
        {
            self.enqueue(
                node,
                LoadPriority::Update,
                UploadRequest::UpdateResourceState(StateTransition::Buffer {
                    buffer,
                    state: desc.start_state,
                }),
                None,
            )
        } else {
            Ok(SyncToken::ZERO)
        };
        match fill {
            Ok(token) => Ok((buffer, token)),
            Err(e) => {
                if let Err(err) = device.destroy_buffer(buffer) {
                    log::error!("ResourceLoader: failed to release {buffer:?}: {err}");
                }
                Err(e)
            }
        }
    }

    fn write_buffer_in_place(
        &self,
        buffer: BufferId,
        data: Option<&[u8]>,
        size: u64,
    ) -> Result<SyncToken> {
        let device = &self.shared.device;
        match data {
            Some(data) => device.write_buffer(buffer, 0, data)?,
            None => device.write_buffer(buffer, 0, &vec![0u8; size as usize])?,
        }
        Ok(SyncToken::ZERO)
    }

    /// Splits the initial contents into upload buffers of at most the
    /// staging size. Returns the token of the last chunk.
    ///
    /// Every upload buffer is created and filled before the first chunk is
    /// queued, so a failure leaves nothing in flight.
    fn stage_buffer(
        &self,
        buffer: BufferId,
        node: u32,
        data: Option<&[u8]>,
        size: u64,
    ) -> Result<SyncToken> {
        let device = &*self.shared.device;
        let zeros;
        let bytes = match data {
            Some(data) => data,
            None => {
                zeros = vec![0u8; size as usize];
                zeros.as_slice()
            }
        };
        let resting = resting_state(&device.buffer_info(buffer)?);

        let chunk = self.shared.config.effective_staging_size();
        let mut uploads: Vec<StagingRange> = Vec::new();
        for part in bytes.chunks(chunk as usize) {
            let filled = create_upload_buffer(
                device,
                part.len() as u64,
                self.shared.caps.upload_buffer_alignment,
                node,
                "buffer upload",
            )
            .and_then(|upload| {
                uploads.push(upload);
                upload.write(device, 0, part)
            });
            if let Err(e) = filled {
                for upload in uploads {
                    self.release_upload(upload.buffer);
                }
                return Err(e.into());
            }
        }

        let mut token = SyncToken::ZERO;
        let mut pending = uploads.into_iter().enumerate();
        while let Some((i, upload)) = pending.next() {
            // Later chunks find the buffer where the previous copy left it.
            let state = if i == 0 { ResourceState::COMMON } else { resting };
            let queued = self.enqueue(
                node,
                LoadPriority::Update,
                UploadRequest::UpdateBuffer {
                    buffer,
                    dst_offset: i as u64 * chunk,
                    state,
                    range: upload,
                },
                Some(upload.buffer),
            );
            match queued {
                Ok(queued) => token = queued,
                Err(e) => {
                    for (_, rest) in pending {
                        self.release_upload(rest.buffer);
                    }
                    return Err(e);
                }
            }
        }
        Ok(token)
    }

    /// Loads a texture from a container file, or creates an empty one from
    /// a descriptor.
    ///
    /// File loads run on `priority` (the update lane is replaced by
    /// [`LoadPriority::Normal`]); the slot is filled once the texture
    /// exists and stays empty if the file cannot be loaded. Descriptor-only
    /// textures are created immediately and get a state transition on the
    /// update lane.
    pub fn add_texture(
        &self,
        load: TextureLoadDesc<'_>,
        priority: LoadPriority,
    ) -> Result<(ResourceSlot<TextureId>, SyncToken)> {
        match (load.file_name, load.desc) {
            (Some(path), _) => {
                let slot = ResourceSlot::empty();
                let token = self.enqueue(
                    load.node_index,
                    Self::load_lane(priority, "texture"),
                    UploadRequest::LoadTexture {
                        path,
                        container: load.container,
                        creation_flags: load.creation_flags,
                        node_index: load.node_index,
                        slot: slot.clone(),
                    },
                    None,
                )?;
                Ok((slot, token))
            }
            (None, Some(desc)) => {
                self.check_node(desc.node_index)?;
                let state = if desc.start_state == ResourceState::UNDEFINED
                    || desc.start_state == ResourceState::COMMON
                {
                    determine_texture_start_state(desc.usage)
                } else {
                    desc.start_state
                };
                let texture = self.shared.device.create_texture(&desc)?;
                let transition = StateTransition::Texture { texture, state };
                match self.enqueue(
                    desc.node_index,
                    LoadPriority::Update,
                    UploadRequest::UpdateResourceState(transition),
                    None,
                ) {
                    Ok(token) => Ok((ResourceSlot::ready(texture), token)),
                    Err(e) => {
                        if let Err(err) = self.shared.device.destroy_texture(texture) {
                            log::error!("ResourceLoader: failed to release {texture:?}: {err}");
                        }
                        Err(e)
                    }
                }
            }
            (None, None) => Err(LoaderError::EmptyTextureLoad),
        }
    }

    /// Loads a glTF or GLB geometry into index and vertex buffers laid out
    /// as `load.vertex_layout`.
    pub fn add_geometry(
        &self,
        load: GeometryLoadDesc,
        priority: LoadPriority,
    ) -> Result<(ResourceSlot<Geometry>, SyncToken)> {
        let slot = ResourceSlot::empty();
        let token = self.enqueue(
            load.node_index,
            Self::load_lane(priority, "geometry"),
            UploadRequest::LoadGeometry {
                path: load.file_name,
                layout: load.vertex_layout,
                flags: load.flags,
                node_index: load.node_index,
                slot: slot.clone(),
            },
            None,
        )?;
        Ok((slot, token))
    }

    /// Opens `size` bytes of `buffer` at `dst_offset` for writing, the rest
    /// of the buffer when `size` is `None`.
    ///
    /// # Errors
    ///
    /// Fails if the range does not fit in the buffer.
    pub fn begin_buffer_update(
        &self,
        buffer: BufferId,
        dst_offset: u64,
        size: Option<u64>,
    ) -> Result<BufferUpdate> {
        let device = &self.shared.device;
        let info = device.buffer_info(buffer)?;
        let size = size.unwrap_or(info.size.saturating_sub(dst_offset));
        if dst_offset.checked_add(size).map_or(true, |end| end > info.size) {
            return Err(LoaderError::UpdateOutOfBounds {
                offset: dst_offset,
                size,
                capacity: info.size,
            });
        }
        let in_place = info.memory_usage.is_host_visible() || self.shared.caps.unified_memory;
        let upload = if in_place {
            None
        } else {
            Some(create_upload_buffer(
                &**device,
                size,
                self.shared.caps.upload_buffer_alignment,
                info.node_index,
                "buffer update",
            )?)
        };
        Ok(BufferUpdate {
            device: Arc::clone(device),
            buffer,
            node_index: info.node_index,
            dst_offset,
            size,
            upload,
        })
    }

    /// Schedules the copy of a buffer update. In-place updates are already
    /// visible and return [`SyncToken::ZERO`].
    ///
    /// The copy assumes the buffer rests in the state its usage implies,
    /// which holds once any earlier load or update of it has completed.
    pub fn end_buffer_update(&self, mut update: BufferUpdate) -> Result<SyncToken> {
        if update.upload.is_none() {
            return Ok(SyncToken::ZERO);
        }
        let info = self.shared.device.buffer_info(update.buffer)?;
        match update.upload.take() {
            None => Ok(SyncToken::ZERO),
            Some(range) => self.enqueue(
                update.node_index,
                LoadPriority::Update,
                UploadRequest::UpdateBuffer {
                    buffer: update.buffer,
                    dst_offset: update.dst_offset,
                    state: resting_state(&info),
                    range,
                },
                Some(range.buffer),
            ),
        }
    }

    /// Opens one sub-resource of `texture` for writing.
    ///
    /// Rows are laid out with the pitches reported by the returned
    /// [`TextureUpdate`].
    pub fn begin_texture_update(
        &self,
        texture: TextureId,
        mip_level: u32,
        array_layer: u32,
    ) -> Result<TextureUpdate> {
        let device = &self.shared.device;
        let info = device.texture_info(texture)?;
        let invalid = LoaderError::InvalidSubresource {
            mip: mip_level,
            layer: array_layer,
        };
        if mip_level >= info.mip_levels || array_layer >= info.array_layers {
            return Err(invalid);
        }
        let layout = pitched_layout(
            &self.shared.caps,
            &info,
            SubresourceRange::single(mip_level, array_layer),
            true,
        )
        .map_err(|e| {
            log::error!("ResourceLoader: {e:#}");
            invalid
        })?;
        let sub = layout.subresources[0];
        let range = create_upload_buffer(
            &**device,
            layout.size,
            layout.alignment,
            info.node_index,
            "texture update",
        )?;
        Ok(TextureUpdate {
            device: Arc::clone(device),
            texture,
            node_index: info.node_index,
            layout: sub,
            upload: Some(range),
        })
    }

    /// Schedules the copy of a texture update.
    pub fn end_texture_update(&self, mut update: TextureUpdate) -> Result<SyncToken> {
        let Some(range) = update.upload.take() else {
            return Ok(SyncToken::ZERO);
        };
        self.enqueue(
            update.node_index,
            LoadPriority::Update,
            UploadRequest::UpdateTexture {
                texture: update.texture,
                range,
                base_mip: update.layout.mip,
                mip_levels: 1,
                base_layer: update.layout.layer,
                layer_count: 1,
            },
            Some(range.buffer),
        )
    }

    /// Copies one texture sub-resource into a buffer, on the update lane.
    ///
    /// Rows land in the buffer with the device's upload row pitch.
    pub fn copy_texture(&self, desc: TextureCopyDesc) -> Result<SyncToken> {
        let info = self.shared.device.texture_info(desc.texture)?;
        if desc.mip_level >= info.mip_levels || desc.array_layer >= info.array_layers {
            return Err(LoaderError::InvalidSubresource {
                mip: desc.mip_level,
                layer: desc.array_layer,
            });
        }
        self.enqueue(
            info.node_index,
            LoadPriority::Update,
            UploadRequest::CopyTexture(desc),
            None,
        )
    }

    /// Destroys a buffer. Work touching it must have completed.
    pub fn remove_buffer(&self, buffer: BufferId) -> Result<()> {
        Ok(self.shared.device.destroy_buffer(buffer)?)
    }

    /// Destroys a texture. Work touching it must have completed.
    pub fn remove_texture(&self, texture: TextureId) -> Result<()> {
        Ok(self.shared.device.destroy_texture(texture)?)
    }

    /// Destroys every buffer of a geometry.
    pub fn remove_geometry(&self, geometry: Geometry) -> Result<()> {
        let device = &self.shared.device;
        for buffer in geometry.vertex_buffers {
            device.destroy_buffer(buffer)?;
        }
        Ok(device.destroy_buffer(geometry.index_buffer)?)
    }

    /// Drops the CPU copy kept by a shadowed geometry.
    pub fn remove_geometry_shadow_data(&self, geometry: &mut Geometry) {
        geometry.shadow = None;
    }

    /// `true` once every request behind `token` has resolved.
    pub fn is_token_completed(&self, token: &SyncToken) -> bool {
        self.shared.ledger.is_completed(token)
    }

    /// `true` once every request behind `token` was submitted to the device.
    pub fn is_token_submitted(&self, token: &SyncToken) -> bool {
        self.shared.ledger.is_submitted(token)
    }

    /// Blocks until `token` completes. Returns immediately in
    /// single-threaded mode; call [`ResourceLoader::pump`] there instead.
    pub fn wait_for_token(&self, token: &SyncToken) {
        if self.inline.is_some() || self.shared.ledger.is_completed(token) {
            return;
        }
        self.shared.request_wake();
        self.shared.ledger.wait_completed(token);
    }

    /// Blocks until `token` is submitted.
    pub fn wait_for_token_submitted(&self, token: &SyncToken) {
        if self.inline.is_some() || self.shared.ledger.is_submitted(token) {
            return;
        }
        self.shared.request_wake();
        self.shared.ledger.wait_submitted(token);
    }

    /// Highest completed index of every lane.
    pub fn last_token_completed(&self) -> SyncToken {
        self.shared.ledger.last_completed()
    }

    /// Highest submitted index of every lane.
    pub fn last_token_submitted(&self) -> SyncToken {
        self.shared.ledger.last_submitted()
    }

    /// Highest index handed out on every lane.
    pub fn last_token_issued(&self) -> SyncToken {
        self.shared.ledger.last_issued()
    }

    /// `true` when every token issued so far has completed.
    pub fn all_resource_loads_completed(&self) -> bool {
        self.shared.ledger.all_completed()
    }

    /// Blocks until everything issued before the call has completed.
    /// Requests queued while waiting are not waited on.
    pub fn wait_for_all_resource_loads(&self) {
        let snapshot = self.shared.ledger.last_issued();
        self.wait_for_token(&snapshot);
    }

    /// Threads blocked in a token wait.
    pub fn pending_token_waiters(&self) -> usize {
        self.shared.ledger.waiters()
    }

    /// Fence signalled by the most recent submission on `node`.
    pub fn last_fence_submitted(&self, node: u32) -> Option<FenceId> {
        self.shared
            .last_fences
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(node as usize)
            .copied()
            .flatten()
    }

    /// A snapshot of the streaming statistics.
    pub fn stats(&self) -> StreamerStats {
        self.shared.lock_stats().clone()
    }

    /// Runs one rotation on the calling thread in single-threaded mode.
    /// Returns whether there was work. Does nothing when a streaming thread
    /// runs.
    pub fn pump(&self) -> bool {
        match &self.inline {
            Some(streamer) => streamer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pump(),
            None => false,
        }
    }

    /// Stops the streaming thread, drains every queue and releases the copy
    /// engines. Requests still queued are dropped and their tokens complete.
    pub fn shutdown(&mut self) {
        {
            let mut queue = self.shared.lock_queue();
            if !queue.running {
                return;
            }
            queue.running = false;
            self.shared.queue_cond.notify_all();
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("ResourceLoader: streaming thread panicked");
                let issued = self.shared.ledger.last_issued();
                self.shared.ledger.publish_completed(issued);
            }
        }
        if let Some(streamer) = self.inline.take() {
            streamer
                .into_inner()
                .unwrap_or_else(PoisonError::into_inner)
                .finish();
        }
        log::info!("ResourceLoader: shut down");
    }
}

impl Drop for ResourceLoader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Writable view of a buffer range opened by
/// [`ResourceLoader::begin_buffer_update`].
///
/// Dropping it without [`ResourceLoader::end_buffer_update`] discards the
/// writes made to its upload buffer.
#[derive(Debug)]
pub struct BufferUpdate {
    device: Arc<dyn GraphicsDevice>,
    buffer: BufferId,
    node_index: u32,
    dst_offset: u64,
    size: u64,
    upload: Option<StagingRange>,
}

impl BufferUpdate {
    /// Destination buffer.
    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    /// Bytes open for writing.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// `true` when writes go straight to the destination.
    pub fn is_in_place(&self) -> bool {
        self.upload.is_none()
    }

    /// Writes `data` `offset` bytes into the open range.
    pub fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        let len = data.len() as u64;
        if offset.checked_add(len).map_or(true, |end| end > self.size) {
            return Err(LoaderError::UpdateOutOfBounds {
                offset,
                size: len,
                capacity: self.size,
            });
        }
        match &self.upload {
            Some(range) => range.write(&*self.device, offset, data)?,
            None => self
                .device
                .write_buffer(self.buffer, self.dst_offset + offset, data)?,
        }
        Ok(())
    }

    /// Sets the whole range to `value`.
    pub fn fill(&self, value: u8) -> Result<()> {
        self.write(0, &vec![value; self.size as usize])
    }
}

impl Drop for BufferUpdate {
    fn drop(&mut self) {
        if let Some(range) = self.upload.take() {
            log::warn!(
                "ResourceLoader: update of {:?} dropped before it was ended",
                self.buffer
            );
            if let Err(e) = self.device.destroy_buffer(range.buffer) {
                log::error!("ResourceLoader: failed to free upload buffer: {e}");
            }
        }
    }
}

/// Writable staging copy of one texture sub-resource, opened by
/// [`ResourceLoader::begin_texture_update`].
#[derive(Debug)]
pub struct TextureUpdate {
    device: Arc<dyn GraphicsDevice>,
    texture: TextureId,
    node_index: u32,
    layout: SubresourceLayout,
    upload: Option<StagingRange>,
}

impl TextureUpdate {
    /// Destination texture.
    pub fn texture(&self) -> TextureId {
        self.texture
    }

    /// Bytes of texel data in one row.
    pub fn row_bytes(&self) -> u32 {
        self.layout.row_bytes
    }

    /// Rows in one depth slice (block rows for compressed formats).
    pub fn row_count(&self) -> u32 {
        self.layout.num_rows
    }

    /// Depth slices.
    pub fn depth(&self) -> u32 {
        self.layout.depth
    }

    /// Distance between two rows.
    pub fn row_pitch(&self) -> u32 {
        self.layout.row_pitch
    }

    /// Distance between two depth slices.
    pub fn slice_pitch(&self) -> u32 {
        self.layout.slice_pitch
    }

    /// Writes one row of slice `z`. `data` may be shorter than a row.
    pub fn write_row(&self, z: u32, row: u32, data: &[u8]) -> Result<()> {
        let Some(range) = &self.upload else {
            return Ok(());
        };
        if z >= self.layout.depth
            || row >= self.layout.num_rows
            || data.len() as u64 > u64::from(self.layout.row_bytes)
        {
            return Err(LoaderError::UpdateOutOfBounds {
                offset: u64::from(z) * u64::from(self.layout.slice_pitch)
                    + u64::from(row) * u64::from(self.layout.row_pitch),
                size: data.len() as u64,
                capacity: range.size,
            });
        }
        let offset = u64::from(z) * u64::from(self.layout.slice_pitch)
            + u64::from(row) * u64::from(self.layout.row_pitch);
        Ok(range.write(&*self.device, offset, data)?)
    }

    /// Writes tightly packed texel rows, every row of every slice in order.
    pub fn write_packed(&self, data: &[u8]) -> Result<()> {
        let row_bytes = self.layout.row_bytes as usize;
        let rows = self.layout.num_rows;
        for (i, row) in data.chunks(row_bytes).enumerate() {
            let i = i as u32;
            self.write_row(i / rows, i % rows, row)?;
        }
        Ok(())
    }
}

impl Drop for TextureUpdate {
    fn drop(&mut self) {
        if let Some(range) = self.upload.take() {
            log::warn!(
                "ResourceLoader: update of {:?} dropped before it was ended",
                self.texture
            );
            if let Err(e) = self.device.destroy_buffer(range.buffer) {
                log::error!("ResourceLoader: failed to free upload buffer: {e}");
            }
        }
    }
}
