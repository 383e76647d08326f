// Producer side of the audio/animation hand-off.
//
// The real-time callback owns a `BlockFeeder`, which copies PCM into the
// device buffer, measures the RMS of every block and pushes it onto an
// `AmplitudeQueue`. The animator pops from the same queue on its own
// thread. Neither side takes a lock.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use crossbeam::queue::ArrayQueue;

use crate::audio_decoder::AudioStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPhase {
    Idle,
    Playing,
    Finished,
}

/// Playback phase shared between the audio callback and the animator.
///
/// Transitions only move forward: Idle -> Playing -> Finished.
#[derive(Debug)]
pub struct PlaybackState {
    /// 0=Idle, 1=Playing, 2=Finished
    state: AtomicU8,
}

impl PlaybackState {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(0),
        }
    }

    #[inline]
    pub fn phase(&self) -> PlaybackPhase {
        match self.state.load(Ordering::Acquire) {
            0 => PlaybackPhase::Idle,
            1 => PlaybackPhase::Playing,
            _ => PlaybackPhase::Finished,
        }
    }

    /// Idle -> Playing. Returns false if playback was already started.
    pub fn start(&self) -> bool {
        self.state
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Enter the terminal state. Idempotent.
    #[inline]
    pub fn finish(&self) {
        self.state.store(2, Ordering::Release);
    }

    /// Ask the producer to stop pushing; the animator stops once the queue drains.
    pub fn request_stop(&self) {
        self.finish();
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.phase() == PlaybackPhase::Playing
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.phase() == PlaybackPhase::Finished
    }
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::new()
    }
}

/// RMS of one block, tagged with the block's position in the stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmplitudeSample {
    pub rms: f32,
    pub block_index: u64,
}

/// Bounded single-producer/single-consumer amplitude channel.
///
/// When full, pushing evicts the oldest sample: only recent loudness matters
/// to the animation.
#[derive(Debug)]
pub struct AmplitudeQueue {
    inner: ArrayQueue<AmplitudeSample>,
    dropped: AtomicU64,
}

impl AmplitudeQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: ArrayQueue::new(capacity.max(1)),
            dropped: AtomicU64::new(0),
        }
    }

    /// Never blocks and never allocates.
    pub fn push(&self, sample: AmplitudeSample) {
        if self.inner.force_push(sample).is_some() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn try_pop(&self) -> Option<AmplitudeSample> {
        self.inner.pop()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// Samples evicted since the last call.
    pub fn take_dropped(&self) -> u64 {
        self.dropped.swap(0, Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    Continue,
    Finished,
}

/// Device-independent body of the playback callback.
pub struct BlockFeeder {
    samples: Arc<[i16]>,
    block_size: usize,
    cursor: usize,
    block_index: u64,
    // Running sums for the block in progress
    sum_squares: f64,
    block_fill: usize,
    queue: Arc<AmplitudeQueue>,
    state: Arc<PlaybackState>,
}

impl BlockFeeder {
    pub fn new(stream: &AudioStream, queue: Arc<AmplitudeQueue>, state: Arc<PlaybackState>) -> Self {
        Self {
            samples: stream.shared_samples(),
            block_size: stream.block_size(),
            cursor: 0,
            block_index: 0,
            sum_squares: 0.0,
            block_fill: 0,
            queue,
            state,
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Copy the next samples into `out`, zero-padding past the end.
    ///
    /// Every `block_size` samples one RMS value is pushed. The last block may
    /// be partial; its RMS covers only the real samples. Once the data runs
    /// out, or a stop was requested, the state is Finished and further calls
    /// only write silence.
    pub fn fill(&mut self, out: &mut [i16]) -> FeedStatus {
        if self.state.is_finished() {
            out.fill(0);
            return FeedStatus::Finished;
        }

        let total = self.samples.len();
        let mut written = 0;
        while written < out.len() && self.cursor < total {
            let take = (out.len() - written)
                .min(total - self.cursor)
                .min(self.block_size - self.block_fill);
            let src = &self.samples[self.cursor..self.cursor + take];
            out[written..written + take].copy_from_slice(src);
            self.sum_squares += src.iter().map(|&s| (s as f64) * (s as f64)).sum::<f64>();
            self.block_fill += take;
            self.cursor += take;
            written += take;

            if self.block_fill == self.block_size {
                self.push_block();
            }
        }
        out[written..].fill(0);

        if self.cursor >= total {
            if self.block_fill > 0 {
                self.push_block();
            }
            self.state.finish();
            return FeedStatus::Finished;
        }
        FeedStatus::Continue
    }

    fn push_block(&mut self) {
        let rms = (self.sum_squares / self.block_fill as f64).sqrt() as f32;
        self.queue.push(AmplitudeSample {
            rms,
            block_index: self.block_index,
        });
        self.block_index += 1;
        self.sum_squares = 0.0;
        self.block_fill = 0;
    }
}

/// RMS of a block of samples; 0 for an empty block.
pub fn rms(block: &[i16]) -> f32 {
    if block.is_empty() {
        return 0.0;
    }
    let sum: f64 = block.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / block.len() as f64).sqrt() as f32
}
