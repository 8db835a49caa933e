// Copyright 2023 drey7925
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
//
// SPDX-License-Identifier: Apache-2.0

//! Square windows of chunks around a player, and how they change as the player moves.
//!
//! Both functions treat a negative radius as an empty window rather than an error, since they
//! run on every movement update.

use crate::coordinates::ChunkCoordinate;

/// Every chunk within `radius` (Chebyshev distance) of `center`, nearest first.
///
/// `center` comes first, followed by each ring in turn. Within a ring the north and south rows
/// are emitted first, then the west and east columns without the corners the rows already
/// covered.
pub fn ordered_chunk_square(center: ChunkCoordinate, radius: i32) -> Vec<ChunkCoordinate> {
    if radius < 0 {
        return Vec::new();
    }
    let side = 2 * radius as usize + 1;
    let mut result = Vec::with_capacity(side * side);
    result.push(center);
    for ring in 1..=radius {
        for dx in -ring..=ring {
            result.push(ChunkCoordinate::new(center.x + dx, center.z - ring));
            result.push(ChunkCoordinate::new(center.x + dx, center.z + ring));
        }
        for dz in (1 - ring)..ring {
            result.push(ChunkCoordinate::new(center.x - ring, center.z + dz));
            result.push(ChunkCoordinate::new(center.x + ring, center.z + dz));
        }
    }
    result
}

/// Inclusive axis-aligned rectangle of chunk coordinates.
#[derive(Clone, Copy, Debug)]
struct Rect {
    x0: i32,
    x1: i32,
    z0: i32,
    z1: i32,
}
impl Rect {
    fn square(center: ChunkCoordinate, radius: i32) -> Rect {
        Rect {
            x0: center.x - radius,
            x1: center.x + radius,
            z0: center.z - radius,
            z1: center.z + radius,
        }
    }
    fn intersect(&self, other: &Rect) -> Option<Rect> {
        let result = Rect {
            x0: self.x0.max(other.x0),
            x1: self.x1.min(other.x1),
            z0: self.z0.max(other.z0),
            z1: self.z1.min(other.z1),
        };
        (result.x0 <= result.x1 && result.z0 <= result.z1).then_some(result)
    }
    fn push_all(&self, out: &mut Vec<ChunkCoordinate>) {
        for x in self.x0..=self.x1 {
            for z in self.z0..=self.z1 {
                out.push(ChunkCoordinate::new(x, z));
            }
        }
    }
}

/// Every chunk within `radius` of `a` that is not within `radius` of `b`.
///
/// With `a` as the new position and `b` as the old one, these are the chunks that came into
/// view; with the arguments swapped, the chunks that left it.
pub fn square_difference(
    a: ChunkCoordinate,
    b: ChunkCoordinate,
    radius: i32,
) -> Vec<ChunkCoordinate> {
    if radius < 0 {
        return Vec::new();
    }
    let square_a = Rect::square(a, radius);
    let square_b = Rect::square(b, radius);
    let mut result = Vec::new();
    let overlap = match square_a.intersect(&square_b) {
        Some(overlap) => overlap,
        None => {
            square_a.push_all(&mut result);
            return result;
        }
    };
    // Full-height strips to the west and east of the overlap, then the pieces directly north
    // and south of it.
    let strips = [
        Rect {
            x1: overlap.x0 - 1,
            ..square_a
        },
        Rect {
            x0: overlap.x1 + 1,
            ..square_a
        },
        Rect {
            x0: overlap.x0,
            x1: overlap.x1,
            z0: square_a.z0,
            z1: overlap.z0 - 1,
        },
        Rect {
            x0: overlap.x0,
            x1: overlap.x1,
            z0: overlap.z1 + 1,
            z1: square_a.z1,
        },
    ];
    for strip in strips {
        strip.push_all(&mut result);
    }
    result
}
