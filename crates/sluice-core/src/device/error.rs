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

//! Error type reported by [`GraphicsDevice`](super::GraphicsDevice) calls.

use std::fmt;

/// An error related to the creation or use of a device object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// The object referenced by a handle no longer exists.
    NotFound,
    /// The handle is not valid for this kind of object or for this node.
    InvalidHandle,
    /// An access fell outside the bounds of a buffer or texture.
    OutOfBounds,
    /// The call is not allowed in the object's current state
    /// (e.g. recording into a command list that was never begun).
    InvalidState(String),
    /// An error originating from the backend implementation.
    BackendError(String),
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::NotFound => write!(f, "Resource not found with ID."),
            ResourceError::InvalidHandle => write!(f, "Invalid resource handle or ID."),
            ResourceError::OutOfBounds => write!(f, "Resource access out of bounds."),
            ResourceError::InvalidState(msg) => {
                write!(f, "Operation not allowed in the current state: {msg}")
            }
            ResourceError::BackendError(msg) => {
                write!(f, "Backend-specific resource error: {msg}")
            }
        }
    }
}

impl std::error::Error for ResourceError {}
