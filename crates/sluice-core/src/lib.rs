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

//! # Sluice Core
//!
//! Foundational crate containing the device contract, handle types and the
//! completion-token vocabulary shared by every other sluice crate.
//!
//! The streaming loader never talks to a concrete graphics API. It drives an
//! implementation of [`device::GraphicsDevice`] through a narrow set of calls
//! (create buffer, record copy, submit, wait fence) and reports progress to
//! producers with [`SyncToken`]s.

#![warn(missing_docs)]

pub mod config;
pub mod device;
pub mod token;
pub mod utils;

pub use config::{ConfigError, LoaderConfig};
pub use token::{LoadPriority, SyncToken};
