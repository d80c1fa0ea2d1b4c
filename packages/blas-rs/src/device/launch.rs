use super::{DeviceError, DevicePtr, Heap};
#[cfg(feature = "parallel")]
use crate::config;

pub const MAX_GRID_X: u32 = i32::MAX as u32;
pub const MAX_GRID_YZ: u32 = 65_535;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dim3 {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Dim3 {
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    pub const fn linear(x: u32) -> Self {
        Self::new(x, 1, 1)
    }

    pub const fn volume(self) -> u64 {
        self.x as u64 * self.y as u64 * self.z as u64
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LaunchConfig {
    pub grid: Dim3,
    pub block: Dim3,
}

impl LaunchConfig {
    pub const fn new(grid: Dim3, block: Dim3) -> Self {
        Self { grid, block }
    }

    /// `blocks_x` blocks per problem, one z-slice per batch. Batches beyond
    /// the z limit are picked up by the kernel's grid-stride batch loop.
    pub fn batched(blocks_x: u32, threads: u32, batch_count: i32) -> Self {
        let z = (batch_count.max(1) as u32).min(MAX_GRID_YZ);
        Self::new(Dim3::new(blocks_x.max(1), 1, z), Dim3::linear(threads))
    }

    pub(crate) fn validate(&self, kernel: &'static str) -> Result<(), DeviceError> {
        let Dim3 { x, y, z } = self.grid;
        let reason = if x == 0 || y == 0 || z == 0 {
            Some(format!("empty grid {x}x{y}x{z}"))
        } else if x > MAX_GRID_X {
            Some(format!("grid.x {x} exceeds {MAX_GRID_X}"))
        } else if y > MAX_GRID_YZ || z > MAX_GRID_YZ {
            Some(format!("grid {y}x{z} exceeds the y/z limit {MAX_GRID_YZ}"))
        } else if self.block.volume() == 0 || self.block.volume() > 1024 {
            Some(format!("block volume {} outside 1..=1024", self.block.volume()))
        } else {
            None
        };
        match reason {
            Some(reason) => Err(DeviceError::InvalidLaunch { kernel, reason }),
            None => Ok(()),
        }
    }
}

/// Per-block view of device memory.
///
/// Loads read the heap as it was when the launch started. Stores are
/// buffered and become visible when the launch completes, applied in block
/// order, so blocks of one launch must not depend on each other's stores.
pub struct BlockCtx<'a> {
    heap: &'a Heap,
    pub block: Dim3,
    pub grid: Dim3,
    stores: Vec<(u64, Vec<u8>)>,
}

impl<'a> BlockCtx<'a> {
    fn new(heap: &'a Heap, block: Dim3, grid: Dim3) -> Self {
        Self {
            heap,
            block,
            grid,
            stores: Vec::new(),
        }
    }

    /// Batches handled by this block: `block.z, block.z + grid.z, ...`.
    pub fn batches(&self, batch_count: i64) -> impl Iterator<Item = i64> {
        (self.block.z as i64..batch_count).step_by(self.grid.z as usize)
    }

    pub fn load<T: bytemuck::Pod>(
        &self,
        ptr: DevicePtr<T>,
        count: usize,
    ) -> Result<Vec<T>, DeviceError> {
        self.heap.read(ptr, count)
    }

    pub fn load_one<T: bytemuck::Pod>(&self, ptr: DevicePtr<T>) -> Result<T, DeviceError> {
        Ok(self.heap.read(ptr, 1)?[0])
    }

    /// Gathers `n` elements starting at `base`, `inc` elements apart.
    pub fn load_strided<T: bytemuck::Pod>(
        &self,
        base: DevicePtr<T>,
        n: usize,
        inc: i64,
    ) -> Result<Vec<T>, DeviceError> {
        if inc == 1 {
            return self.load(base, n);
        }
        (0..n)
            .map(|i| self.load_one(base.offset(i as i64 * inc)))
            .collect()
    }

    /// Reads entry `index` of a device-resident pointer table.
    pub fn load_pointer<T>(
        &self,
        table: DevicePtr<DevicePtr<T>>,
        index: i64,
    ) -> Result<DevicePtr<T>, DeviceError> {
        let slot = table.cast::<u64>().offset(index);
        Ok(DevicePtr::from_addr(self.load_one(slot)?))
    }

    /// Loads a column-major `rows x cols` tile with leading dimension `ld`.
    pub fn load_tile<T: bytemuck::Pod>(
        &self,
        base: DevicePtr<T>,
        rows: usize,
        cols: usize,
        ld: i64,
    ) -> Result<Vec<T>, DeviceError> {
        let mut tile = Vec::with_capacity(rows * cols);
        for col in 0..cols {
            tile.extend(self.load(base.offset(col as i64 * ld), rows)?);
        }
        Ok(tile)
    }

    pub fn store<T: bytemuck::Pod>(&mut self, ptr: DevicePtr<T>, values: &[T]) {
        if values.is_empty() {
            return;
        }
        self.stores
            .push((ptr.addr(), bytemuck::cast_slice(values).to_vec()));
    }

    pub fn store_one<T: bytemuck::Pod>(&mut self, ptr: DevicePtr<T>, value: T) {
        self.store(ptr, &[value]);
    }

    pub fn store_strided<T: bytemuck::Pod>(&mut self, base: DevicePtr<T>, inc: i64, values: &[T]) {
        if inc == 1 {
            self.store(base, values);
            return;
        }
        for (i, value) in values.iter().enumerate() {
            self.store_one(base.offset(i as i64 * inc), *value);
        }
    }

    /// Stores a packed column-major tile (`rows` per column) into a matrix with leading dimension `ld`.
    pub fn store_tile<T: bytemuck::Pod>(
        &mut self,
        base: DevicePtr<T>,
        rows: usize,
        ld: i64,
        tile: &[T],
    ) {
        if rows == 0 {
            return;
        }
        for (col, column) in tile.chunks(rows).enumerate() {
            self.store(base.offset(col as i64 * ld), column);
        }
    }
}

type BlockStores = Vec<(u64, Vec<u8>)>;

fn block_coords(grid: Dim3, linear: usize) -> Dim3 {
    let x = (linear % grid.x as usize) as u32;
    let rest = linear / grid.x as usize;
    let y = (rest % grid.y as usize) as u32;
    let z = (rest / grid.y as usize) as u32;
    Dim3::new(x, y, z)
}

fn run_block<K>(heap: &Heap, grid: Dim3, linear: usize, kernel: &K) -> Result<BlockStores, DeviceError>
where
    K: Fn(&mut BlockCtx<'_>) -> Result<(), DeviceError> + Sync,
{
    let mut ctx = BlockCtx::new(heap, block_coords(grid, linear), grid);
    kernel(&mut ctx)?;
    Ok(ctx.stores)
}

fn run_sequential<K>(heap: &Heap, grid: Dim3, total: usize, kernel: &K) -> Result<Vec<BlockStores>, DeviceError>
where
    K: Fn(&mut BlockCtx<'_>) -> Result<(), DeviceError> + Sync,
{
    (0..total)
        .map(|linear| run_block(heap, grid, linear, kernel))
        .collect()
}

#[cfg(feature = "parallel")]
fn run_blocks<K>(heap: &Heap, grid: Dim3, total: usize, kernel: &K) -> Result<Vec<BlockStores>, DeviceError>
where
    K: Fn(&mut BlockCtx<'_>) -> Result<(), DeviceError> + Sync,
{
    use rayon::prelude::*;

    if !config::should_parallelize(total) {
        return run_sequential(heap, grid, total, kernel);
    }
    config::ensure_rayon_pool();
    (0..total)
        .into_par_iter()
        .map(|linear| run_block(heap, grid, linear, kernel))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn run_blocks<K>(heap: &Heap, grid: Dim3, total: usize, kernel: &K) -> Result<Vec<BlockStores>, DeviceError>
where
    K: Fn(&mut BlockCtx<'_>) -> Result<(), DeviceError> + Sync,
{
    run_sequential(heap, grid, total, kernel)
}

/// Runs every block of a launch against `heap` and then commits their stores.
pub(crate) fn execute<K>(heap: &mut Heap, launch: LaunchConfig, kernel: &K) -> Result<(), DeviceError>
where
    K: Fn(&mut BlockCtx<'_>) -> Result<(), DeviceError> + Sync,
{
    let total = launch.grid.volume() as usize;
    let per_block = run_blocks(heap, launch.grid, total, kernel)?;
    for (addr, bytes) in per_block.into_iter().flatten() {
        heap.bytes_mut(addr, bytes.len())?.copy_from_slice(&bytes);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batched_config_clamps_z() {
        let config = LaunchConfig::batched(3, 64, 100_000);
        assert_eq!(config.grid, Dim3::new(3, 1, MAX_GRID_YZ));
        assert!(config.validate("kernel_under_test").is_ok());
    }

    #[test]
    fn oversized_grid_is_rejected() {
        let config = LaunchConfig::new(Dim3::new(1, 1, MAX_GRID_YZ + 1), Dim3::linear(32));
        let err = config.validate("kernel_under_test").expect_err("z too large");
        assert!(matches!(err, DeviceError::InvalidLaunch { kernel: "kernel_under_test", .. }));
    }

    #[test]
    fn block_coordinates_follow_x_fastest() {
        let grid = Dim3::new(2, 3, 4);
        assert_eq!(block_coords(grid, 0), Dim3::new(0, 0, 0));
        assert_eq!(block_coords(grid, 1), Dim3::new(1, 0, 0));
        assert_eq!(block_coords(grid, 2), Dim3::new(0, 1, 0));
        assert_eq!(block_coords(grid, 6), Dim3::new(0, 0, 1));
        assert_eq!(block_coords(grid, 23), Dim3::new(1, 2, 3));
    }
}
