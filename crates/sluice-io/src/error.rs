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

//! Errors raised while reading containers from disk or memory.

use thiserror::Error;

/// Failure to open, parse or decode a resource container.
#[derive(Error, Debug)]
pub enum ContainerError {
    /// The underlying stream failed or ended early.
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
    /// The file does not start with the expected identifier.
    #[error("not a {container} file (bad magic)")]
    BadMagic {
        /// Container kind that was expected.
        container: &'static str,
    },
    /// The header is self-inconsistent.
    #[error("invalid header: {0}")]
    InvalidHeader(String),
    /// The texel or attribute format has no mapping.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    /// No parser is registered for the extension.
    #[error("no container parser registered for extension '{0}'")]
    UnknownContainer(String),
    /// The glTF document could not be parsed.
    #[error("gltf: {0}")]
    Gltf(#[from] gltf::Error),
    /// A glTF buffer could not be resolved.
    #[error("unresolved buffer: {0}")]
    UnresolvedBuffer(String),
    /// A required attribute is missing.
    #[error("missing attribute: {0}")]
    MissingAttribute(&'static str),
}

/// A result type.
pub type Result<T, E = ContainerError> = std::result::Result<T, E>;
