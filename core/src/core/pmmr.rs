// Copyright 2021 The Grin Developers
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

//! Merkle Mountain Ranges: append only lists of binary trees laid out in
//! postorder, where every node's place in the tree follows from its
//! position alone. Leaves can be pruned without changing the root.
//!
//! Positions are 1-based, an MMR of size n holds the nodes 1 to n and
//! position 0 is never a node.

mod backend;
#[allow(clippy::module_inception)]
mod pmmr;
mod readonly_pmmr;
mod vec_backend;

pub use self::backend::*;
pub use self::pmmr::*;
pub use self::readonly_pmmr::*;
pub use self::vec_backend::*;
