//! Lock-free ring buffer between the device callback and the capture thread
//!
//! The callback pushes mono `f32` samples; the capture thread pops them in
//! read-sized chunks. When the capture thread falls behind, new samples are
//! dropped at the producer and counted where the consumer can see them.

use ringbuf::{HeapConsumer, HeapProducer, HeapRb};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Ring buffer of device samples
pub struct AudioRingBuffer {
    producer: HeapProducer<f32>,
    consumer: HeapConsumer<f32>,
}

impl AudioRingBuffer {
    /// Create new ring buffer with given capacity
    ///
    /// # Arguments
    /// * `capacity` - Buffer capacity in samples
    pub fn new(capacity: usize) -> Self {
        let rb = HeapRb::<f32>::new(capacity);
        let (producer, consumer) = rb.split();

        Self { producer, consumer }
    }

    /// Split into producer and consumer ends
    pub fn split(self) -> (AudioProducer, AudioConsumer) {
        let dropped = Arc::new(AtomicU64::new(0));
        (
            AudioProducer {
                producer: self.producer,
                dropped: Arc::clone(&dropped),
            },
            AudioConsumer {
                consumer: self.consumer,
                dropped,
            },
        )
    }
}

/// Producer end, owned by the device callback
pub struct AudioProducer {
    producer: HeapProducer<f32>,
    dropped: Arc<AtomicU64>,
}

impl AudioProducer {
    /// Write samples, returning how many fit; the rest are dropped
    pub fn write(&mut self, samples: &[f32]) -> usize {
        let written = self.producer.push_slice(samples);
        if written < samples.len() {
            self.dropped
                .fetch_add((samples.len() - written) as u64, Ordering::Relaxed);
        }
        written
    }
}

/// Consumer end, owned by the capture thread
pub struct AudioConsumer {
    consumer: HeapConsumer<f32>,
    dropped: Arc<AtomicU64>,
}

impl AudioConsumer {
    /// Fill `buffer` completely, waiting at most `timeout`
    ///
    /// # Returns
    /// Number of samples read; less than `buffer.len()` only on timeout
    pub fn read_exact_timeout(&mut self, buffer: &mut [f32], timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut total_read = 0;
        while total_read < buffer.len() {
            let n = self.consumer.pop_slice(&mut buffer[total_read..]);
            total_read += n;
            if n == 0 {
                if Instant::now() >= deadline {
                    break;
                }
                std::thread::sleep(Duration::from_micros(500));
            }
        }
        total_read
    }

    /// Samples the producer dropped on a full buffer since creation
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
