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

use super::UploadContext;
use crate::request::{StateTransition, UploadResult};
use crate::staging::StagingRange;
use anyhow::{ensure, Context};
use sluice_core::device::{
    determine_buffer_start_state, BufferBarrier, BufferId, BufferInfo, ResourceState,
    TextureBarrier,
};

/// State a buffer rests in once its contents are uploaded.
pub(crate) fn resting_state(info: &BufferInfo) -> ResourceState {
    match info.start_state {
        ResourceState::UNDEFINED | ResourceState::COMMON => determine_buffer_start_state(info.usage),
        state => state,
    }
}

/// Copies `range` to `dst_offset` in `buffer`, then moves the buffer into
/// its resting state.
///
/// `from` is the state the buffer is in when the copy executes. On devices
/// with manual barriers the buffer is moved from there into `COPY_DEST`
/// before the copy.
pub(super) fn update_buffer(
    ctx: &mut UploadContext<'_>,
    buffer: BufferId,
    dst_offset: u64,
    from: ResourceState,
    range: StagingRange,
) -> anyhow::Result<UploadResult> {
    let info = ctx
        .device
        .buffer_info(buffer)
        .with_context(|| format!("destination buffer {buffer:?}"))?;
    let end = dst_offset.checked_add(range.size);
    ensure!(
        end.is_some_and(|end| end <= info.size),
        "copy of {} bytes at offset {dst_offset} overruns buffer of {} bytes",
        range.size,
        info.size
    );

    let cmd = ctx.cmd()?;
    let target = resting_state(&info);
    let manual = ctx.caps.manual_barriers;
    if manual && from != ResourceState::COPY_DEST {
        ctx.device.cmd_resource_barrier(
            cmd,
            &[BufferBarrier {
                buffer,
                from,
                to: ResourceState::COPY_DEST,
            }],
            &[],
        )?;
    }
    if range.size > 0 {
        ctx.device
            .cmd_copy_buffer(cmd, range.buffer, range.offset, buffer, dst_offset, range.size)?;
    }

    if manual {
        ctx.device.cmd_resource_barrier(
            cmd,
            &[BufferBarrier {
                buffer,
                from: ResourceState::COPY_DEST,
                to: target,
            }],
            &[],
        )?;
    } else {
        ctx.device.set_buffer_state(buffer, target)?;
    }
    Ok(UploadResult::Completed)
}

/// Records a barrier from UNDEFINED into the requested state.
pub(super) fn transition(
    ctx: &mut UploadContext<'_>,
    transition: &StateTransition,
) -> anyhow::Result<UploadResult> {
    let cmd = ctx.cmd()?;
    match *transition {
        StateTransition::Buffer { buffer, state } => ctx.device.cmd_resource_barrier(
            cmd,
            &[BufferBarrier {
                buffer,
                from: ResourceState::UNDEFINED,
                to: state,
            }],
            &[],
        )?,
        StateTransition::Texture { texture, state } => ctx.device.cmd_resource_barrier(
            cmd,
            &[],
            &[TextureBarrier {
                texture,
                from: ResourceState::UNDEFINED,
                to: state,
            }],
        )?,
    }
    Ok(UploadResult::Completed)
}
