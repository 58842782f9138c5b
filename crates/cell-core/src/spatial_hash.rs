use fxhash::FxHashMap;

use crate::geom::Vec3;

const END_OF_LIST: usize = usize::MAX;

/// Linked-cell hash over point entries.
///
/// Entries are stored as singly linked lists per occupied cell. Neighbor
/// queries visit the 27 cells around the query point, so the cell size must
/// be at least the largest interaction reach the caller asks about.
pub struct SpatialHash {
    cell: f32,
    map: FxHashMap<(i32, i32, i32), usize>,
    next: Vec<usize>,
}

impl SpatialHash {
    pub fn new(cell: f32) -> Self {
        Self::with_capacity(cell, 0)
    }

    pub fn with_capacity(cell: f32, expected_cells: usize) -> Self {
        Self {
            cell: cell.max(1.0e-6),
            map: FxHashMap::with_capacity_and_hasher(expected_cells.max(1), Default::default()),
            next: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.next.len()
    }

    pub fn is_empty(&self) -> bool {
        self.next.is_empty()
    }

    fn cell_index(&self, p: Vec3) -> (i32, i32, i32) {
        (
            (p.x / self.cell).floor() as i32,
            (p.y / self.cell).floor() as i32,
            (p.z / self.cell).floor() as i32,
        )
    }

    pub fn insert(&mut self, idx: usize, pos: Vec3) {
        let key = self.cell_index(pos);
        if idx >= self.next.len() {
            self.next.resize(idx + 1, END_OF_LIST);
        }
        let head = self.map.entry(key).or_insert(END_OF_LIST);
        self.next[idx] = *head;
        *head = idx;
    }

    /// Returns true as soon as `hit` accepts one neighbor of `pos`.
    pub fn any_neighbor<F>(&self, pos: Vec3, mut hit: F) -> bool
    where
        F: FnMut(usize) -> bool,
    {
        let (ix, iy, iz) = self.cell_index(pos);
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let key = (ix + dx, iy + dy, iz + dz);
                    if let Some(&head) = self.map.get(&key) {
                        let mut idx = head;
                        while idx != END_OF_LIST {
                            if hit(idx) {
                                return true;
                            }
                            idx = self.next[idx];
                        }
                    }
                }
            }
        }
        false
    }
}
