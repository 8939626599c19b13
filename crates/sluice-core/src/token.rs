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

//! Priority lanes and the completion tokens handed back to producers.
//!
//! Every request enqueued on a lane receives the next value of that lane's
//! counter. A [`SyncToken`] bundles one such value per lane and acts as a
//! high-water mark: it is complete once every lane has caught up with it.
//!
//! ```text
//!            Update  Normal  Low
//!  token A [   4   ,   1   ,  0 ]
//!  token B [   2   ,   3   ,  0 ]
//!  max     [   4   ,   3   ,  0 ]   <- covers both A and B
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Index, IndexMut};

/// An independent FIFO class of upload requests.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum LoadPriority {
    /// Requests whose staging memory was filled by the producer.
    ///
    /// They are drained as one batch per rotation and can never be retried.
    Update,
    /// Regular file loads.
    #[default]
    Normal,
    /// Background file loads.
    Low,
}

impl LoadPriority {
    /// Number of lanes.
    pub const COUNT: usize = 3;

    /// Every lane, in drain order.
    pub const ALL: [LoadPriority; Self::COUNT] =
        [LoadPriority::Update, LoadPriority::Normal, LoadPriority::Low];

    /// Position of this lane inside per-lane arrays.
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            LoadPriority::Update => 0,
            LoadPriority::Normal => 1,
            LoadPriority::Low => 2,
        }
    }

    /// `true` for the lane carrying producer-filled staging memory.
    #[inline]
    pub const fn is_update(self) -> bool {
        matches!(self, LoadPriority::Update)
    }
}

/// A per-lane completion marker.
///
/// Tokens form a product order: `a >= b` holds only if every lane of `a` is
/// at least the matching lane of `b`. Two tokens may therefore be
/// incomparable, in which case `partial_cmp` returns `None`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SyncToken {
    lanes: [u64; LoadPriority::COUNT],
}

impl SyncToken {
    /// The token that every state covers.
    pub const ZERO: SyncToken = SyncToken {
        lanes: [0; LoadPriority::COUNT],
    };

    /// Builds a token from raw per-lane values, indexed by [`LoadPriority::index`].
    pub const fn from_lanes(lanes: [u64; LoadPriority::COUNT]) -> Self {
        Self { lanes }
    }

    /// A token waiting on a single lane value.
    pub fn single(priority: LoadPriority, value: u64) -> Self {
        let mut token = Self::ZERO;
        token[priority] = value;
        token
    }

    /// Raw per-lane values.
    pub const fn lanes(&self) -> [u64; LoadPriority::COUNT] {
        self.lanes
    }

    /// Element-wise maximum of two tokens.
    #[must_use]
    pub fn max(self, other: SyncToken) -> SyncToken {
        let mut lanes = self.lanes;
        for (lane, theirs) in lanes.iter_mut().zip(other.lanes) {
            *lane = (*lane).max(theirs);
        }
        SyncToken { lanes }
    }

    /// Folds `other` into `self` with [`SyncToken::max`].
    pub fn merge(&mut self, other: SyncToken) {
        *self = self.max(other);
    }

    /// `true` if every lane of `self` is at least the matching lane of `other`.
    pub fn covers(&self, other: &SyncToken) -> bool {
        self.lanes
            .iter()
            .zip(other.lanes.iter())
            .all(|(mine, theirs)| mine >= theirs)
    }

    /// `true` when no lane is waited on.
    pub fn is_zero(&self) -> bool {
        self.lanes.iter().all(|v| *v == 0)
    }
}

impl PartialOrd for SyncToken {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self.covers(other), other.covers(self)) {
            (true, true) => Some(Ordering::Equal),
            (true, false) => Some(Ordering::Greater),
            (false, true) => Some(Ordering::Less),
            (false, false) => None,
        }
    }
}

impl Index<LoadPriority> for SyncToken {
    type Output = u64;

    fn index(&self, priority: LoadPriority) -> &u64 {
        &self.lanes[priority.index()]
    }
}

impl IndexMut<LoadPriority> for SyncToken {
    fn index_mut(&mut self, priority: LoadPriority) -> &mut u64 {
        &mut self.lanes[priority.index()]
    }
}

impl fmt::Debug for SyncToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_map();
        for priority in LoadPriority::ALL {
            list.entry(&priority, &self[priority]);
        }
        list.finish()
    }
}
