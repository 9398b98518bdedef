//! The file-level block pipeline: sequential, fork-join and worker-pool
//! parsing, all driving a per-block processor.
//!
//! No ordering is guaranteed across blocks; the processor runs concurrently
//! from several workers in the parallel modes and must serialize its own
//! side effects. The shared file cursor is the only shared mutable
//! resource, locked at fetch granularity.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::error::CodecError;
use crate::file::{BlockData, OsmFileIn};
use crate::reader::PrimitiveReader;

/// Cooperative cancellation flag, checked at block granularity.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// One block at a time, in file order. Null (malformed) blocks are skipped.
pub fn parse_sequential<F>(
    file: &mut OsmFileIn,
    cancel: &CancelToken,
    mut processor: F,
) -> Result<(), CodecError>
where
    F: FnMut(&PrimitiveReader),
{
    while !cancel.is_cancelled() {
        match file.parse_next_block()? {
            Some(reader) => {
                if reader.is_null() {
                    continue;
                }
                processor(&reader);
            }
            None => break,
        }
    }

    Ok(())
}

/// Buffers up to `batch_size` raw blocks, decodes and processes the batch
/// in parallel, and repeats until a short batch signals the end of the
/// file. `batch_size` 0 defaults to the rayon thread count.
pub fn parse_fork_join<F>(
    file: &mut OsmFileIn,
    batch_size: usize,
    cancel: &CancelToken,
    processor: F,
) -> Result<(), CodecError>
where
    F: Fn(&PrimitiveReader) + Send + Sync,
{
    let batch_size = if batch_size == 0 {
        rayon::current_num_threads().max(1)
    } else {
        batch_size
    };

    let mut buffers: Vec<BlockData> = Vec::with_capacity(batch_size);
    loop {
        buffers.clear();
        file.next_blocks(&mut buffers, batch_size)?;
        let fetched = buffers.len();

        buffers.par_iter().for_each(|data| {
            if cancel.is_cancelled() {
                return;
            }
            let reader = data.reader();
            if !reader.is_null() {
                processor(&reader);
            }
        });

        if fetched < batch_size || cancel.is_cancelled() {
            break;
        }
    }

    Ok(())
}

/// Worker-pool parsing: `thread_count` scoped threads each loop
/// { lock the file, fetch up to `read_ahead` raw blocks, unlock, decode and
/// process them }. Workers exit when the file drains; the first worker
/// error is kept and returned after join. `thread_count` 0 defaults to one
/// worker per logical CPU.
pub fn parse_parallel<F>(
    file: OsmFileIn,
    thread_count: usize,
    read_ahead: usize,
    cancel: &CancelToken,
    processor: F,
) -> Result<(), CodecError>
where
    F: Fn(&PrimitiveReader) + Send + Sync,
{
    let thread_count = effective_threads(thread_count);
    let read_ahead = read_ahead.max(1);

    let file = Mutex::new(file);
    let failure: Mutex<Option<CodecError>> = Mutex::new(None);

    std::thread::scope(|scope| {
        for _ in 0..thread_count {
            scope.spawn(|| {
                let mut buffers: Vec<BlockData> = Vec::with_capacity(read_ahead);

                loop {
                    if cancel.is_cancelled() {
                        break;
                    }

                    buffers.clear();
                    let fetched = {
                        let mut file = match file.lock() {
                            Ok(file) => file,
                            Err(_) => break,
                        };
                        match file.next_blocks(&mut buffers, read_ahead) {
                            Ok(more) => more,
                            Err(err) => {
                                if let Ok(mut slot) = failure.lock() {
                                    slot.get_or_insert(err);
                                }
                                break;
                            }
                        }
                    };

                    if !fetched {
                        break;
                    }

                    for data in &buffers {
                        let reader = data.reader();
                        if !reader.is_null() {
                            processor(&reader);
                        }
                    }
                }
            });
        }
    });

    match failure.into_inner().unwrap_or_else(|p| p.into_inner()) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Map-reduce over blocks on worker-pool footing: each worker folds its own
/// accumulator, accumulators combine once per worker at exit.
pub fn parse_reduce<Map, Reduce, Identity, T>(
    file: OsmFileIn,
    thread_count: usize,
    read_ahead: usize,
    cancel: &CancelToken,
    map_op: Map,
    red_op: Reduce,
    identity: Identity,
) -> Result<T, CodecError>
where
    Map: Fn(&PrimitiveReader) -> T + Send + Sync,
    Reduce: Fn(T, T) -> T + Send + Sync,
    Identity: Fn() -> T + Send + Sync,
    T: Send,
{
    let thread_count = effective_threads(thread_count);
    let read_ahead = read_ahead.max(1);

    let file = Mutex::new(file);
    let failure: Mutex<Option<CodecError>> = Mutex::new(None);
    let total = Mutex::new(identity());

    std::thread::scope(|scope| {
        for _ in 0..thread_count {
            scope.spawn(|| {
                let mut acc = identity();
                let mut buffers: Vec<BlockData> = Vec::with_capacity(read_ahead);

                loop {
                    if cancel.is_cancelled() {
                        break;
                    }

                    buffers.clear();
                    let fetched = {
                        let mut file = match file.lock() {
                            Ok(file) => file,
                            Err(_) => break,
                        };
                        match file.next_blocks(&mut buffers, read_ahead) {
                            Ok(more) => more,
                            Err(err) => {
                                if let Ok(mut slot) = failure.lock() {
                                    slot.get_or_insert(err);
                                }
                                break;
                            }
                        }
                    };

                    if !fetched {
                        break;
                    }

                    for data in &buffers {
                        let reader = data.reader();
                        if !reader.is_null() {
                            acc = red_op(acc, map_op(&reader));
                        }
                    }
                }

                if let Ok(mut slot) = total.lock() {
                    let current = std::mem::replace(&mut *slot, identity());
                    *slot = red_op(current, acc);
                }
            });
        }
    });

    if let Some(err) = failure.into_inner().unwrap_or_else(|p| p.into_inner()) {
        return Err(err);
    }

    Ok(total.into_inner().unwrap_or_else(|p| p.into_inner()))
}

fn effective_threads(requested: usize) -> usize {
    if requested != 0 {
        return requested;
    }

    std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(1)
}
