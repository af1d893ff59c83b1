//! Same-POS variant batching
//!
//! The variant buffer groups consecutive records sharing one POS into a
//! batch and hands each batch to a worker thread over a bounded channel.
//! The channel bound is the backpressure: the reader blocks only when it
//! finishes a batch and the worker is `depth` batches behind, so a long run
//! of same-POS records always makes progress. Emptied record nodes flow
//! back over a second channel and are reused instead of reallocated.

use crossbeam_channel::{bounded, unbounded};
use std::thread;

use crate::core::error::{AlignError, Result};
use crate::vcf::{RecordBuf, VcfReader};

/// Default number of in-flight batches
pub const DEFAULT_BUFFER_DEPTH: usize = 16;

/// Consumer side of the variant buffer
pub trait VariantHandler: Send {
    /// Called once per record, in file order
    fn handle_variant(&mut self, record: &RecordBuf) -> Result<()>;

    /// Called after the last record of the stream
    fn finish(&mut self) -> Result<()>;
}

/// Drives a reader through a handler with same-POS batching
pub struct VariantBuffer {
    depth: usize,
}

impl VariantBuffer {
    pub fn new(depth: usize) -> Self {
        Self {
            depth: depth.max(1),
        }
    }

    /// Read every record, batch by POS, and run the handler on a worker
    /// thread. Returns once the handler's `finish` has completed.
    pub fn drive<H: VariantHandler>(&self, reader: &mut VcfReader, handler: &mut H) -> Result<()> {
        let (batch_tx, batch_rx) = bounded::<Vec<RecordBuf>>(self.depth);
        let (pool_tx, pool_rx) = unbounded::<Vec<RecordBuf>>();

        thread::scope(|scope| -> Result<()> {
            let worker = scope.spawn(move || -> Result<()> {
                for batch in batch_rx {
                    for record in &batch {
                        handler.handle_variant(record)?;
                    }
                    // Nodes keep their allocations for the next refill.
                    let _ = pool_tx.send(batch);
                }
                handler.finish()
            });

            let mut batch: Vec<RecordBuf> = Vec::new();
            let mut spare: Vec<RecordBuf> = Vec::new();
            let mut previous_pos = 0usize;
            let mut recycled_batches = 0usize;

            let produce = reader.parse(|view| {
                let pos = view.pos()?;
                if !batch.is_empty() && pos != previous_pos {
                    let full = std::mem::take(&mut batch);
                    if batch_tx.send(full).is_err() {
                        // Worker exited early; its error surfaces below.
                        return Ok(false);
                    }
                    if let Ok(mut returned) = pool_rx.try_recv() {
                        recycled_batches += 1;
                        spare.append(&mut returned);
                        batch = returned;
                    }
                }
                previous_pos = pos;

                let mut record = spare.pop().unwrap_or_default();
                record.copy_from(view)?;
                batch.push(record);
                Ok(true)
            });

            if !batch.is_empty() {
                let _ = batch_tx.send(batch);
            }
            drop(batch_tx);

            let worker_result = worker
                .join()
                .map_err(|_| AlignError::WorkerPanic("variant buffer"))?;
            worker_result?;
            produce?;

            log::debug!("Variant buffer recycled {} batches", recycled_batches);
            Ok(())
        })
    }
}
