//! Host/device copies of strided vectors and column-major matrices.
//!
//! The blocking variants wait for the device to drain, like every blocking
//! copy. The async variants stage host data at call time and run on a
//! stream; results of `get_matrix_async` are valid once the stream
//! synchronizes.

use std::mem;

use crate::device::{Device, DevicePtr, PinnedBuffer, Stream};
use crate::element::Element;
use crate::error::{status_boundary, BlasError, BlasResult, Status};
use crate::layout::matrix_span;
use crate::metrics;

fn validate_matrix(rows: i64, cols: i64, lda: i64, ldb: i64) -> BlasResult<()> {
    if rows < 0 || cols < 0 || lda <= 0 || ldb <= 0 || lda < rows || ldb < rows {
        return Err(BlasError::invalid_size(format!(
            "rows = {rows}, cols = {cols}, lda = {lda}, ldb = {ldb}"
        )));
    }
    Ok(())
}

fn validate_vector(n: i64, incx: i64, incy: i64) -> BlasResult<()> {
    if n < 0 || incx <= 0 || incy <= 0 {
        return Err(BlasError::invalid_size(format!(
            "n = {n}, incx = {incx}, incy = {incy}"
        )));
    }
    Ok(())
}

fn require_host_len(name: &str, len: usize, needed: usize) -> BlasResult<()> {
    if len < needed {
        return Err(BlasError::invalid_size(format!(
            "{name} holds {len} elements, {needed} required"
        )));
    }
    Ok(())
}

fn require_device(name: &'static str, ptr: DevicePtr<impl Sized>) -> BlasResult<()> {
    if ptr.is_null() {
        return Err(BlasError::InvalidPointer(name));
    }
    Ok(())
}

/// Copies a `rows x cols` host matrix with leading dimension `lda` into
/// device memory with leading dimension `ldb`.
pub fn set_matrix<T: Element>(
    device: &Device,
    rows: i64,
    cols: i64,
    a: &[T],
    lda: i64,
    b: DevicePtr<T>,
    ldb: i64,
) -> Status {
    status_boundary("set_matrix", || {
        validate_matrix(rows, cols, lda, ldb)?;
        if rows == 0 || cols == 0 {
            return Ok(());
        }
        require_host_len("a", a.len(), matrix_span(rows as usize, cols as usize, lda as usize))?;
        require_device("b", b)?;
        device.synchronize();
        let mut heap = device.heap();
        for col in 0..cols {
            let src = &a[(col * lda) as usize..(col * lda + rows) as usize];
            heap.write(b.offset(col * ldb), src)?;
        }
        metrics::record_h2d_bytes((rows * cols) as usize * mem::size_of::<T>());
        Ok(())
    })
}

/// Copies a `rows x cols` device matrix into a host matrix.
pub fn get_matrix<T: Element>(
    device: &Device,
    rows: i64,
    cols: i64,
    a: DevicePtr<T>,
    lda: i64,
    b: &mut [T],
    ldb: i64,
) -> Status {
    status_boundary("get_matrix", || {
        validate_matrix(rows, cols, lda, ldb)?;
        if rows == 0 || cols == 0 {
            return Ok(());
        }
        require_device("a", a)?;
        require_host_len("b", b.len(), matrix_span(rows as usize, cols as usize, ldb as usize))?;
        device.synchronize();
        let heap = device.heap();
        for col in 0..cols {
            let values = heap.read(a.offset(col * lda), rows as usize)?;
            b[(col * ldb) as usize..(col * ldb + rows) as usize].copy_from_slice(&values);
        }
        metrics::record_d2h_bytes((rows * cols) as usize * mem::size_of::<T>());
        Ok(())
    })
}

/// Queues a host-to-device matrix copy on `stream`. The host data is staged
/// before returning, so `a` may be reused immediately.
pub fn set_matrix_async<T: Element>(
    rows: i64,
    cols: i64,
    a: &[T],
    lda: i64,
    b: DevicePtr<T>,
    ldb: i64,
    stream: &Stream,
) -> Status {
    status_boundary("set_matrix_async", || {
        validate_matrix(rows, cols, lda, ldb)?;
        if rows == 0 || cols == 0 {
            return Ok(());
        }
        require_host_len("a", a.len(), matrix_span(rows as usize, cols as usize, lda as usize))?;
        require_device("b", b)?;
        if lda == rows && ldb == rows {
            stream.memcpy_htod_async(b, a[..(rows * cols) as usize].to_vec())?;
            return Ok(());
        }
        for col in 0..cols {
            let column = a[(col * lda) as usize..(col * lda + rows) as usize].to_vec();
            stream.memcpy_htod_async(b.offset(col * ldb), column)?;
        }
        Ok(())
    })
}

/// Queues a device-to-host matrix copy into `b`, laid out with leading dimension `ldb`.
pub fn get_matrix_async<T: Element>(
    rows: i64,
    cols: i64,
    a: DevicePtr<T>,
    lda: i64,
    b: &PinnedBuffer<T>,
    ldb: i64,
    stream: &Stream,
) -> Status {
    status_boundary("get_matrix_async", || {
        validate_matrix(rows, cols, lda, ldb)?;
        if rows == 0 || cols == 0 {
            return Ok(());
        }
        require_device("a", a)?;
        require_host_len("b", b.len(), matrix_span(rows as usize, cols as usize, ldb as usize))?;
        for col in 0..cols {
            stream.memcpy_dtoh_async(b, (col * ldb) as usize, a.offset(col * lda), rows as usize)?;
        }
        Ok(())
    })
}

/// Copies `n` host elements `incx` apart into device memory `incy` apart.
pub fn set_vector<T: Element>(
    device: &Device,
    n: i64,
    x: &[T],
    incx: i64,
    y: DevicePtr<T>,
    incy: i64,
) -> Status {
    status_boundary("set_vector", || {
        validate_vector(n, incx, incy)?;
        if n == 0 {
            return Ok(());
        }
        require_host_len("x", x.len(), ((n - 1) * incx + 1) as usize)?;
        require_device("y", y)?;
        device.synchronize();
        let mut heap = device.heap();
        if incx == 1 && incy == 1 {
            heap.write(y, &x[..n as usize])?;
        } else {
            for i in 0..n {
                heap.write(y.offset(i * incy), &[x[(i * incx) as usize]])?;
            }
        }
        metrics::record_h2d_bytes(n as usize * mem::size_of::<T>());
        Ok(())
    })
}

/// Copies `n` device elements `incx` apart into host memory `incy` apart.
pub fn get_vector<T: Element>(
    device: &Device,
    n: i64,
    x: DevicePtr<T>,
    incx: i64,
    y: &mut [T],
    incy: i64,
) -> Status {
    status_boundary("get_vector", || {
        validate_vector(n, incx, incy)?;
        if n == 0 {
            return Ok(());
        }
        require_device("x", x)?;
        require_host_len("y", y.len(), ((n - 1) * incy + 1) as usize)?;
        device.synchronize();
        let heap = device.heap();
        for i in 0..n {
            y[(i * incy) as usize] = heap.read(x.offset(i * incx), 1)?[0];
        }
        metrics::record_d2h_bytes(n as usize * mem::size_of::<T>());
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_round_trip_with_padding() {
        let device = Device::with_memory(1 << 20);
        let block = device.malloc(4 * 3 * 8).expect("malloc");
        let dev: DevicePtr<f64> = block.ptr();
        // 2x3 matrix, host lda = 3, device ldb = 4
        let host = [1.0, 2.0, -1.0, 3.0, 4.0, -1.0, 5.0, 6.0];
        assert_eq!(set_matrix(&device, 2, 3, &host, 3, dev, 4), Status::Success);
        let mut back = [0.0f64; 6];
        assert_eq!(get_matrix(&device, 2, 3, dev, 4, &mut back, 2), Status::Success);
        assert_eq!(back, [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn async_matrix_lands_after_synchronize() {
        let device = Device::with_memory(1 << 20);
        let stream = Stream::new(&device);
        let block = device.malloc(6 * 4).expect("malloc");
        let dev: DevicePtr<f32> = block.ptr();
        let host: Vec<f32> = (1..=6).map(|v| v as f32).collect();
        assert_eq!(set_matrix_async(3, 2, &host, 3, dev, 3, &stream), Status::Success);
        let pinned = PinnedBuffer::zeroed(8);
        assert_eq!(get_matrix_async(3, 2, dev, 3, &pinned, 4, &stream), Status::Success);
        stream.synchronize().expect("sync");
        assert_eq!(pinned.to_vec(), vec![1.0, 2.0, 3.0, 0.0, 4.0, 5.0, 6.0, 0.0]);
    }

    #[test]
    fn matrix_argument_errors() {
        let device = Device::with_memory(1 << 16);
        let host = [0.0f32; 16];
        let null = DevicePtr::<f32>::null();
        assert_eq!(set_matrix(&device, -1, 2, &host, 2, null, 2), Status::InvalidSize);
        assert_eq!(set_matrix(&device, 3, 2, &host, 2, null, 3), Status::InvalidSize);
        assert_eq!(set_matrix(&device, 2, 2, &host, 2, null, 0), Status::InvalidSize);
        assert_eq!(set_matrix(&device, 2, 2, &host, 2, null, 2), Status::InvalidPointer);
        assert_eq!(set_matrix(&device, 0, 2, &host, 2, null, 2), Status::Success);
    }

    #[test]
    fn vector_round_trip_with_increments() {
        let device = Device::with_memory(1 << 16);
        let block = device.malloc(3 * 2 * 8).expect("malloc");
        let dev: DevicePtr<f64> = block.ptr();
        let host = [1.0, 0.0, 0.0, 2.0, 0.0, 0.0, 3.0];
        assert_eq!(set_vector(&device, 3, &host, 3, dev, 2), Status::Success);
        let mut back = [0.0f64; 3];
        assert_eq!(get_vector(&device, 3, dev, 2, &mut back, 1), Status::Success);
        assert_eq!(back, [1.0, 2.0, 3.0]);
        assert_eq!(set_vector(&device, 3, &host, 0, dev, 2), Status::InvalidSize);
    }
}
