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

//! Upload handlers: turn one request into copy commands on the active
//! resource set.
//!
//! Handlers return `anyhow::Result`; [`dispatch`] logs any error and
//! resolves the request as [`UploadResult::InvalidRequest`].

mod buffer;
mod geometry;
pub mod packing;
mod texture;

use crate::copy_engine::CopyEngine;
use crate::request::{QueuedRequest, UploadRequest, UploadResult};
use crate::staging::StagingRange;
use sluice_core::device::{CommandListId, DeviceCapabilities, GraphicsDevice};
use sluice_io::ContainerRegistry;

pub(crate) use buffer::resting_state;
pub(crate) use texture::{pitched_layout, SubresourceLayout, SubresourceRange};

/// Everything a handler may touch while the streaming thread dispatches.
pub(crate) struct UploadContext<'a> {
    pub device: &'a dyn GraphicsDevice,
    pub engine: &'a mut CopyEngine,
    pub set: usize,
    pub containers: &'a ContainerRegistry,
    pub caps: DeviceCapabilities,
}

impl UploadContext<'_> {
    /// The active command list, recording.
    fn cmd(&mut self) -> anyhow::Result<CommandListId> {
        Ok(self.engine.acquire_command_list(self.device, self.set)?)
    }

    /// Staging memory for a load request, `None` when it has to wait for
    /// the next rotation.
    fn stage(&mut self, size: u64, alignment: u32) -> anyhow::Result<Option<StagingRange>> {
        Ok(self
            .engine
            .try_allocate(self.device, self.set, size, alignment)?)
    }
}

/// Routes `queued` to its handler.
pub(crate) fn dispatch(ctx: &mut UploadContext<'_>, queued: &QueuedRequest) -> UploadResult {
    let outcome = match &queued.request {
        UploadRequest::UpdateBuffer {
            buffer,
            dst_offset,
            state,
            range,
        } => buffer::update_buffer(ctx, *buffer, *dst_offset, *state, *range),
        UploadRequest::UpdateTexture {
            texture,
            range,
            base_mip,
            mip_levels,
            base_layer,
            layer_count,
        } => texture::update_texture(
            ctx,
            *texture,
            *range,
            texture::SubresourceRange {
                base_mip: *base_mip,
                mip_levels: *mip_levels,
                base_layer: *base_layer,
                layer_count: *layer_count,
            },
        ),
        UploadRequest::UpdateResourceState(transition) => buffer::transition(ctx, transition),
        UploadRequest::LoadTexture {
            path,
            container,
            creation_flags,
            node_index,
            slot,
        } => texture::load_texture(ctx, path, *container, *creation_flags, *node_index, slot),
        UploadRequest::LoadGeometry {
            path,
            layout,
            flags,
            node_index,
            slot,
        } => geometry::load_geometry(ctx, path, layout, *flags, *node_index, slot),
        UploadRequest::CopyTexture(desc) => texture::copy_texture(ctx, desc),
    };

    match outcome {
        Ok(result) => result,
        Err(e) => {
            log::error!(
                "Streamer: dropping {} request #{}: {e:#}",
                queued.request.kind(),
                queued.wait_index
            );
            UploadResult::InvalidRequest
        }
    }
}
