//! Adapter from the 64-bit API onto 32-bit kernel launchers.
//!
//! Kernels index problems with `i32` and place batches on the grid's z
//! dimension. A 64-bit call is split into batch chunks no larger than the
//! grid's y/z limit; each chunk rebases its operands and runs the 32-bit
//! launcher. Problem sizes beyond `i32::MAX` are refused up front.

use crate::batch::ApiInt;
use crate::error::{BlasError, BlasResult};

/// Largest batch count handed to a 32-bit launcher in one call.
pub const GRID_YZ_CHUNK: i64 = 65_535;

/// Narrows a dimension for a 32-bit launcher.
pub(crate) fn narrow(name: &'static str, value: i64) -> BlasResult<i32> {
    i32::try_from(value).map_err(|_| {
        BlasError::invalid_size(format!(
            "{name} = {value} exceeds the 32-bit kernel index range"
        ))
    })
}

/// Calls `launch(base, count)` for consecutive batch chunks of at most
/// `chunk` batches, stopping at the first failure.
pub(crate) fn for_each_batch_chunk<F>(batch_count: i64, chunk: i64, mut launch: F) -> BlasResult<()>
where
    F: FnMut(i64, i32) -> BlasResult<()>,
{
    let mut base = 0;
    while base < batch_count {
        let count = (batch_count - base).min(chunk);
        launch(base, narrow("batch chunk", count)?)?;
        base += chunk;
    }
    Ok(())
}

/// Batches one launch covers: the whole call for the 32-bit API, one chunk
/// for the 64-bit API. Per-launch workspace is sized from this.
pub(crate) fn batches_per_launch<I: ApiInt>(batch_count: i64) -> i64 {
    if I::WIDE {
        batch_count.min(GRID_YZ_CHUNK)
    } else {
        batch_count
    }
}

/// Routes a validated call to its 32-bit launcher.
///
/// For the 64-bit API, `n` must fit in `i32` and batches are chunked by
/// [`GRID_YZ_CHUNK`]; `launch(n, base, count)` receives the chunk's base batch
/// index for rebasing operands. The 32-bit API gets a single call with base 0.
pub(crate) fn launch_by_width<I, F>(n: i64, batch_count: i64, mut launch: F) -> BlasResult<()>
where
    I: ApiInt,
    F: FnMut(i32, i64, i32) -> BlasResult<()>,
{
    if n == 0 || batch_count == 0 {
        return Ok(());
    }
    let n32 = narrow("n", n)?;
    if I::WIDE {
        for_each_batch_chunk(batch_count, GRID_YZ_CHUNK, |base, count| launch(n32, base, count))
    } else {
        launch(n32, 0, narrow("batch_count", batch_count)?)
    }
}
