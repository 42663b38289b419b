//! Mesh interface consumed by the transport core, and a slab-decomposed
//! Cartesian brick mesh that implements it.
//!
//! Mesh construction and partitioning proper are collaborators of the
//! core, not part of it: the kernel and router only need on-rank cell
//! lookup, a rank-lookup for off-rank cells, and the adjacency map that
//! assigns each neighboring rank a dense buffer index.

use std::collections::BTreeMap;

use crate::cell::{Bc, Cell, Face};
use crate::transport_error::TransportError;

/// Read-only mesh view used during one transport step.
pub trait Mesh {
    /// Cell owned by this rank, by global id. The id must be on rank.
    fn on_rank_cell(&self, cell: u32) -> &Cell;

    /// Owning rank of any global cell id.
    fn rank_of(&self, cell: u32) -> usize;

    /// Neighbor rank -> dense buffer index, fixed for the step.
    fn adjacency(&self) -> &BTreeMap<usize, usize>;
}

/// Uniform Cartesian grid of box cells, decomposed into contiguous slabs
/// of x-columns, one slab per rank. Processor faces appear at slab
/// boundaries; the problem boundary carries a single configurable
/// condition (reflect or vacuum).
pub struct BrickMesh {
    nx: u32,
    ny: u32,
    nz: u32,
    rank: usize,
    n_ranks: usize,
    x_begin: u32,
    x_end: u32,
    cells: Vec<Cell>,
    adjacency: BTreeMap<usize, usize>,
}

/// Global grid shape and cell spacing.
#[derive(Debug, Clone, Copy)]
pub struct GridSpec {
    pub nx: u32,
    pub ny: u32,
    pub nz: u32,
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
}

/// Material data applied uniformly to every cell.
#[derive(Debug, Clone, Copy)]
pub struct CellPhysics {
    pub op_a: f64,
    pub op_s: f64,
    pub fleck: f64,
}

impl BrickMesh {
    /// Build this rank's slab. `boundary` is applied on every face of the
    /// global problem box; it must be `Reflect` or `Vacuum`.
    pub fn build(
        grid: GridSpec,
        physics: CellPhysics,
        boundary: Bc,
        rank: usize,
        n_ranks: usize,
    ) -> Result<Self, TransportError> {
        assert!(
            matches!(boundary, Bc::Reflect | Bc::Vacuum),
            "problem boundary must be reflect or vacuum"
        );
        if n_ranks == 0 || (grid.nx as usize) < n_ranks {
            return Err(TransportError::BadDecomposition {
                n_cols: grid.nx,
                n_ranks,
            });
        }
        let (x_begin, x_end) = slab_bounds(grid.nx, rank, n_ranks);

        let mut mesh = Self {
            nx: grid.nx,
            ny: grid.ny,
            nz: grid.nz,
            rank,
            n_ranks,
            x_begin,
            x_end,
            cells: Vec::new(),
            adjacency: BTreeMap::new(),
        };

        let mut cells = Vec::with_capacity(((x_end - x_begin) * grid.ny * grid.nz) as usize);
        for iz in 0..grid.nz {
            for iy in 0..grid.ny {
                for ix in x_begin..x_end {
                    cells.push(mesh.make_cell(grid, physics, boundary, ix, iy, iz));
                }
            }
        }
        mesh.cells = cells;

        let mut index = 0usize;
        if rank > 0 {
            mesh.adjacency.insert(rank - 1, index);
            index += 1;
        }
        if rank + 1 < n_ranks {
            mesh.adjacency.insert(rank + 1, index);
        }
        Ok(mesh)
    }

    fn make_cell(
        &self,
        grid: GridSpec,
        physics: CellPhysics,
        boundary: Bc,
        ix: u32,
        iy: u32,
        iz: u32,
    ) -> Cell {
        let id = self.global_id(ix, iy, iz);
        let nodes = [
            ix as f64 * grid.dx,
            (ix + 1) as f64 * grid.dx,
            iy as f64 * grid.dy,
            (iy + 1) as f64 * grid.dy,
            iz as f64 * grid.dz,
            (iz + 1) as f64 * grid.dz,
        ];
        let mut cell = Cell::new(id, nodes, physics.op_a, physics.op_s, physics.fleck);

        let limits = [self.nx, self.ny, self.nz];
        let coords = [ix, iy, iz];
        for face in Face::ALL {
            let axis = face.axis();
            let positive = face.index() % 2 == 1;
            let off_grid = if positive {
                coords[axis] + 1 == limits[axis]
            } else {
                coords[axis] == 0
            };
            if off_grid {
                cell.set_face(face, boundary, id);
                continue;
            }
            let mut nbr = coords;
            if positive {
                nbr[axis] += 1;
            } else {
                nbr[axis] -= 1;
            }
            let nbr_id = self.global_id(nbr[0], nbr[1], nbr[2]);
            let bc = if self.rank_of_column(nbr[0]) == self.rank {
                Bc::Element
            } else {
                Bc::Processor
            };
            cell.set_face(face, bc, nbr_id);
        }
        cell
    }

    #[inline]
    fn global_id(&self, ix: u32, iy: u32, iz: u32) -> u32 {
        ix + self.nx * (iy + self.ny * iz)
    }

    #[inline]
    fn split_id(&self, id: u32) -> (u32, u32, u32) {
        (id % self.nx, (id / self.nx) % self.ny, id / (self.nx * self.ny))
    }

    fn rank_of_column(&self, ix: u32) -> usize {
        let base = self.nx / self.n_ranks as u32;
        let rem = self.nx % self.n_ranks as u32;
        let cut = rem * (base + 1);
        if ix < cut {
            (ix / (base + 1)) as usize
        } else {
            (rem + (ix - cut) / base) as usize
        }
    }

    /// Total number of cells in the global grid; sizes the replicated
    /// absorbed-energy tally.
    pub fn n_global_cells(&self) -> usize {
        (self.nx * self.ny * self.nz) as usize
    }

    /// Global ids of the cells owned by this rank.
    pub fn owned_cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter()
    }
}

/// Block distribution of `nx` columns over `n_ranks`: the first
/// `nx % n_ranks` ranks take one extra column.
fn slab_bounds(nx: u32, rank: usize, n_ranks: usize) -> (u32, u32) {
    let base = nx / n_ranks as u32;
    let rem = nx % n_ranks as u32;
    let r = rank as u32;
    let begin = r * base + r.min(rem);
    let width = base + u32::from(r < rem);
    (begin, begin + width)
}

impl Mesh for BrickMesh {
    fn on_rank_cell(&self, cell: u32) -> &Cell {
        let (ix, iy, iz) = self.split_id(cell);
        debug_assert!(
            ix >= self.x_begin && ix < self.x_end,
            "cell {cell} is not on rank {}",
            self.rank
        );
        let local = (ix - self.x_begin) + (self.x_end - self.x_begin) * (iy + self.ny * iz);
        &self.cells[local as usize]
    }

    fn rank_of(&self, cell: u32) -> usize {
        let (ix, _, _) = self.split_id(cell);
        self.rank_of_column(ix)
    }

    fn adjacency(&self) -> &BTreeMap<usize, usize> {
        &self.adjacency
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(nx: u32) -> GridSpec {
        GridSpec {
            nx,
            ny: 2,
            nz: 2,
            dx: 1.0,
            dy: 1.0,
            dz: 1.0,
        }
    }

    fn physics() -> CellPhysics {
        CellPhysics {
            op_a: 1.0,
            op_s: 0.0,
            fleck: 1.0,
        }
    }

    #[test]
    fn single_rank_owns_everything() {
        let mesh = BrickMesh::build(grid(4), physics(), Bc::Reflect, 0, 1).unwrap();
        assert_eq!(mesh.n_global_cells(), 16);
        assert!(mesh.adjacency().is_empty());
        for id in 0..16 {
            assert_eq!(mesh.rank_of(id), 0);
            assert_eq!(mesh.on_rank_cell(id).id(), id);
        }
    }

    #[test]
    fn slab_split_covers_all_columns() {
        // 5 columns over 2 ranks: rank 0 takes 3, rank 1 takes 2
        assert_eq!(slab_bounds(5, 0, 2), (0, 3));
        assert_eq!(slab_bounds(5, 1, 2), (3, 5));
    }

    #[test]
    fn processor_faces_appear_at_the_partition() {
        let mesh0 = BrickMesh::build(grid(4), physics(), Bc::Vacuum, 0, 2).unwrap();
        let mesh1 = BrickMesh::build(grid(4), physics(), Bc::Vacuum, 1, 2).unwrap();

        // rank 0's rightmost column faces rank 1
        let cell = mesh0.on_rank_cell(1);
        assert_eq!(cell.bc(Face::XPos), Bc::Processor);
        assert_eq!(cell.next_cell(Face::XPos), 2);
        assert_eq!(mesh0.rank_of(2), 1);

        // and rank 1's leftmost column faces rank 0
        let cell = mesh1.on_rank_cell(2);
        assert_eq!(cell.bc(Face::XNeg), Bc::Processor);
        assert_eq!(cell.next_cell(Face::XNeg), 1);

        // interior faces stay on rank
        assert_eq!(mesh0.on_rank_cell(0).bc(Face::XPos), Bc::Element);
        assert_eq!(mesh0.on_rank_cell(0).bc(Face::XNeg), Bc::Vacuum);
    }

    #[test]
    fn adjacency_indices_are_dense_and_rank_ordered() {
        let mesh = BrickMesh::build(grid(6), physics(), Bc::Reflect, 1, 3).unwrap();
        let adj: Vec<_> = mesh.adjacency().iter().map(|(&r, &i)| (r, i)).collect();
        assert_eq!(adj, vec![(0, 0), (2, 1)]);
    }

    #[test]
    fn middle_rank_distance_and_ownership_agree() {
        let mesh = BrickMesh::build(grid(6), physics(), Bc::Reflect, 1, 3).unwrap();
        for cell in mesh.owned_cells() {
            assert_eq!(mesh.rank_of(cell.id()), 1);
        }
    }

    #[test]
    fn too_many_ranks_is_an_error() {
        assert!(matches!(
            BrickMesh::build(grid(2), physics(), Bc::Reflect, 0, 4),
            Err(TransportError::BadDecomposition { .. })
        ));
    }
}
