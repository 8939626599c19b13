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

//! # Sluice Streamer
//!
//! Asynchronous uploads of buffers, textures and geometry into GPU memory.
//!
//! Producers talk to a [`ResourceLoader`]. Each call turns into an
//! [`UploadRequest`] queued on one of three priority lanes of its device
//! node. A streaming thread drains the lanes into rotating resource sets
//! (command list, fence, staging ring) owned by one [`CopyEngine`] per node,
//! submits them, and reports progress through [`SyncToken`]s: a token is
//! *submitted* once its work reached the device and *completed* once the
//! device executed it.
//!
//! ```no_run
//! use sluice_core::{LoadPriority, LoaderConfig};
//! use sluice_infra::HeadlessDevice;
//! use sluice_streamer::{ResourceLoader, TextureLoadDesc};
//! use std::sync::Arc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let loader = ResourceLoader::new(Arc::new(HeadlessDevice::default()), LoaderConfig::default())?;
//! let (texture, token) = loader.add_texture(
//!     TextureLoadDesc::from_file("assets/rock.dds"),
//!     LoadPriority::Normal,
//! )?;
//! loader.wait_for_token(&token);
//! println!("{:?}", texture.get());
//! # Ok(())
//! # }
//! ```

pub mod copy_engine;
pub mod desc;
pub mod error;
mod handlers;
pub mod ledger;
mod loader;
pub mod queue;
pub mod request;
pub mod staging;
pub mod stats;
mod streamer;

pub use copy_engine::{CopyEngine, SetState};
pub use desc::{
    BufferLoadDesc, Geometry, GeometryLoadDesc, GeometryLoadFlags, GeometryShadow, ResourceSlot,
    TextureContainer, TextureCopyDesc, TextureLoadDesc,
};
pub use error::{LoaderError, Result};
pub use handlers::packing;
pub use ledger::TokenLedger;
pub use loader::{BufferUpdate, ResourceLoader, TextureUpdate};
pub use queue::RequestQueue;
pub use request::{RequestKind, StateTransition, UploadRequest, UploadResult};
pub use sluice_core::{LoadPriority, SyncToken};
pub use staging::{StagingAllocator, StagingRange};
pub use stats::{DispatchRecord, StreamerStats, DISPATCH_LOG_CAPACITY};
