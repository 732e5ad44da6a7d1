//! Committed GPU allocations.
//!
//! Creating a buffer is not enough to make a driver commit memory, so every
//! allocation is cleared on the GPU and the queue is drained before
//! `allocate` returns.

use crate::error::GpuError;
use crate::gpu::device::GpuContext;
use bytesize::ByteSize;
use log::debug;
use pollster::block_on;
use std::time::{Duration, Instant};
use wgpu::{Buffer, BufferUsages, COPY_BUFFER_ALIGNMENT};

/// How long to wait for the clear to finish.
pub const COMPLETION_TIMEOUT: Duration = Duration::from_secs(30);

/// GPU memory held until dropped.
pub struct Allocation {
    buffers: Vec<Buffer>,
    size: u64,
}

impl Allocation {
    /// Total bytes held.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Number of buffers backing the allocation.
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }
}

/// Splits `num_bytes` into buffer sizes no larger than `max_buffer_size`.
///
/// Every chunk is a multiple of the copy alignment; only the last chunk may
/// be rounded up to reach it.
///
/// # Errors
///
/// Returns `GpuError::UnusableBufferLimit` if the limit is below the copy
/// alignment.
pub fn plan_chunks(num_bytes: u64, max_buffer_size: u64) -> Result<Vec<u64>, GpuError> {
    let max_chunk = max_buffer_size - max_buffer_size % COPY_BUFFER_ALIGNMENT;
    if max_chunk == 0 {
        return Err(GpuError::UnusableBufferLimit(max_buffer_size));
    }

    let total = num_bytes.div_ceil(COPY_BUFFER_ALIGNMENT) * COPY_BUFFER_ALIGNMENT;
    let mut chunks = vec![max_chunk; (total / max_chunk) as usize];
    if total % max_chunk != 0 {
        chunks.push(total % max_chunk);
    }
    Ok(chunks)
}

/// Allocates `num_bytes` of GPU memory and forces it to be committed.
///
/// Buffers are cleared to zero and this call blocks until the GPU reports
/// the clear finished.
///
/// # Errors
///
/// Returns `GpuError::BufferAllocation` if the driver rejects a buffer,
/// `GpuError::Timeout` if the clear does not finish in time.
pub fn allocate(ctx: &GpuContext, num_bytes: u64) -> Result<Allocation, GpuError> {
    let device = ctx.device();
    let chunks = plan_chunks(num_bytes, ctx.max_buffer_size())?;
    debug!(
        "Allocating {} as {} buffer(s)",
        ByteSize::b(num_bytes),
        chunks.len()
    );

    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let buffers: Vec<Buffer> = chunks
        .iter()
        .map(|&size| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("pressure_buffer"),
                size,
                usage: BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        })
        .collect();

    let validation = block_on(device.pop_error_scope());
    let out_of_memory = block_on(device.pop_error_scope());
    if let Some(e) = out_of_memory.or(validation) {
        return Err(GpuError::BufferAllocation {
            requested: ByteSize::b(num_bytes).to_string(),
            reason: e.to_string(),
        });
    }

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("clear_encoder"),
    });
    for buffer in &buffers {
        encoder.clear_buffer(buffer, 0, None);
    }
    ctx.queue().submit(Some(encoder.finish()));

    wait_for_queue(ctx, COMPLETION_TIMEOUT)?;

    Ok(Allocation {
        buffers,
        size: chunks.iter().sum(),
    })
}

/// Blocks until all submitted work on the queue has finished.
fn wait_for_queue(ctx: &GpuContext, timeout: Duration) -> Result<(), GpuError> {
    let (tx, rx) = std::sync::mpsc::channel();
    ctx.queue().on_submitted_work_done(move || {
        tx.send(()).ok();
    });

    let start = Instant::now();
    loop {
        let _ = ctx.device().poll(wgpu::PollType::Poll);

        if rx.try_recv().is_ok() {
            debug!("GPU work finished in {:?}", start.elapsed());
            return Ok(());
        }

        if start.elapsed() > timeout {
            return Err(GpuError::Timeout(timeout.as_secs()));
        }

        std::thread::sleep(Duration::from_millis(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MIB;

    fn setup_context() -> Option<GpuContext> {
        GpuContext::open("allocator test").ok()
    }

    #[test]
    fn test_single_chunk_when_under_limit() {
        assert_eq!(plan_chunks(8 * MIB, 256 * MIB).unwrap(), vec![8 * MIB]);
        assert_eq!(plan_chunks(256 * MIB, 256 * MIB).unwrap(), vec![256 * MIB]);
    }

    #[test]
    fn test_split_over_limit() {
        let chunks = plan_chunks(600 * MIB, 256 * MIB).unwrap();
        assert_eq!(chunks, vec![256 * MIB, 256 * MIB, 88 * MIB]);
        assert_eq!(chunks.iter().sum::<u64>(), 600 * MIB);
    }

    #[test]
    fn test_unaligned_limit_rounded_down() {
        let chunks = plan_chunks(16, 7).unwrap();
        assert_eq!(chunks, vec![4, 4, 4, 4]);
    }

    #[test]
    fn test_unaligned_size_rounded_up() {
        assert_eq!(plan_chunks(5, 1024).unwrap(), vec![8]);
    }

    #[test]
    fn test_zero_bytes() {
        assert!(plan_chunks(0, 1024).unwrap().is_empty());
    }

    #[test]
    fn test_unusable_limit() {
        assert!(matches!(
            plan_chunks(MIB, 3),
            Err(GpuError::UnusableBufferLimit(3))
        ));
    }

    #[test]
    fn test_allocate_commits_requested_size() {
        let Some(ctx) = setup_context() else {
            println!("No GPU available, skipping allocation test");
            return;
        };

        let allocation = allocate(&ctx, 8 * MIB).unwrap();
        assert_eq!(allocation.size(), 8 * MIB);
        assert!(allocation.buffer_count() >= 1);
    }
}
