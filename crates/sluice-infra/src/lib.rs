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

//! # Sluice Infra
//!
//! Concrete implementations of the [`sluice_core::device::GraphicsDevice`]
//! contract.
//!
//! [`HeadlessDevice`] keeps every buffer and texture in CPU memory and
//! executes recorded copy commands when they are submitted. It backs the
//! command-line tool and the test suites, and can hold submissions back to
//! simulate a GPU that lags behind the CPU.

pub mod headless;

pub use headless::{HeadlessDevice, HeadlessDeviceDesc, HeadlessStats};
