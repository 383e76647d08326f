// Per-tick consumer of amplitude samples: turns loudness into a travelling
// wave of building heights.
use std::sync::Arc;
use std::time::{Duration, Instant};

use geo_types::Point;

use crate::amplitude_stream::{AmplitudeQueue, PlaybackState};
use crate::config::{PhasePolicy, WaveConfig};
use crate::models::{BuildingCatalog, LiveHeights};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Playback is over and every sample has been consumed
    Stop,
    /// No sample was waiting; heights left as they were
    Idle,
    /// Heights rewritten from one sample, normalised to roughly [0, 1]
    Updated { amplitude: f64 },
}

pub struct WaveHeightAnimator {
    config: WaveConfig,
    queue: Arc<AmplitudeQueue>,
    state: Arc<PlaybackState>,
    started: Instant,
}

impl WaveHeightAnimator {
    pub fn new(config: WaveConfig, queue: Arc<AmplitudeQueue>, state: Arc<PlaybackState>) -> Self {
        Self {
            config,
            queue,
            state,
            started: Instant::now(),
        }
    }

    pub fn config(&self) -> &WaveConfig {
        &self.config
    }

    pub fn phase(&self, centroid: Point<f64>, elapsed_secs: f64) -> f64 {
        let distance = match self.config.phase {
            PhasePolicy::CoordinateSum => centroid.x() + centroid.y(),
            PhasePolicy::DistanceFrom { x, y } => (centroid.x() - x).hypot(centroid.y() - y),
        };
        distance / self.config.wavelength - self.config.wave_speed * elapsed_secs
    }

    /// Height for one building; never below `min_height`.
    pub fn wave_height(&self, amplitude: f64, phase: f64) -> f64 {
        let height = amplitude * phase.sin() * self.config.height_scale + self.config.base_offset;
        if height.is_nan() {
            return self.config.min_height;
        }
        height.max(self.config.min_height)
    }

    /// One scheduler tick at `elapsed_secs` since the animation started.
    ///
    /// Takes at most one sample from the queue and never blocks.
    pub fn tick_at(&self, elapsed_secs: f64, catalog: &BuildingCatalog, heights: &mut LiveHeights) -> TickOutcome {
        // Read before popping: the producer pushes its last block before
        // publishing Finished, so a Finished read here sees every push.
        let finished = self.state.is_finished();
        let sample = match self.queue.try_pop() {
            Some(sample) => sample,
            None if finished => {
                let dropped = self.queue.take_dropped();
                if dropped > 0 {
                    log::warn!("{} amplitude samples were dropped because the animator fell behind", dropped);
                }
                return TickOutcome::Stop;
            }
            None => return TickOutcome::Idle,
        };

        if heights.len() != catalog.len() {
            heights.reset(catalog);
        }

        let amplitude = sample.rms as f64 / self.config.max_amplitude;
        for (index, building) in catalog.iter().enumerate() {
            let phase = self.phase(building.centroid, elapsed_secs);
            heights.set(index, self.wave_height(amplitude, phase));
        }

        TickOutcome::Updated { amplitude }
    }

    /// [`Self::tick_at`] with the time since construction.
    pub fn tick(&self, catalog: &BuildingCatalog, heights: &mut LiveHeights) -> TickOutcome {
        self.tick_at(self.started.elapsed().as_secs_f64(), catalog, heights)
    }

    /// Fixed-period loop for callers without their own frame scheduler.
    /// Runs until [`TickOutcome::Stop`] and returns the number of ticks.
    pub fn run_blocking<F>(&self, catalog: &BuildingCatalog, heights: &mut LiveHeights, mut on_tick: F) -> usize
    where
        F: FnMut(TickOutcome, &LiveHeights),
    {
        let period = Duration::from_secs_f64(self.config.tick_period_secs);
        let mut ticks = 0;
        loop {
            let outcome = self.tick(catalog, heights);
            ticks += 1;
            on_tick(outcome, heights);
            if outcome == TickOutcome::Stop {
                log::info!("Animation stopped after {} ticks", ticks);
                return ticks;
            }
            std::thread::sleep(period);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amplitude_stream::AmplitudeSample;
    use crate::models::{Building, Rgba};
    use geo_types::{line_string, point};

    fn building_at(x: f64, y: f64) -> Building {
        let ring = line_string![(x: x - 1.0, y: y - 1.0), (x: x + 1.0, y: y - 1.0), (x: x, y: y + 1.0), (x: x - 1.0, y: y - 1.0)];
        Building {
            id: None,
            height: 7.0,
            raw_coordinates: vec![ring.clone()],
            simplified_coordinates: ring,
            centroid: point!(x: x, y: y),
            bounding_radius: 1.5,
            rectangle: None,
            color: Rgba::WHITE,
        }
    }

    fn animator(config: WaveConfig) -> (WaveHeightAnimator, Arc<AmplitudeQueue>, Arc<PlaybackState>) {
        let queue = Arc::new(AmplitudeQueue::new(8));
        let state = Arc::new(PlaybackState::new());
        let animator = WaveHeightAnimator::new(config, Arc::clone(&queue), Arc::clone(&state));
        (animator, queue, state)
    }

    fn push(queue: &AmplitudeQueue, rms: f32) {
        queue.push(AmplitudeSample { rms, block_index: 0 });
    }

    #[test]
    fn height_never_drops_below_minimum() {
        let (animator, _, _) = animator(WaveConfig::default());
        for a in 0..=10 {
            let amplitude = a as f64 / 10.0;
            for p in 0..=64 {
                let phase = p as f64 * std::f64::consts::PI / 16.0 - 2.0 * std::f64::consts::PI;
                assert!(animator.wave_height(amplitude, phase) >= 1.0);
            }
        }
        assert_eq!(animator.wave_height(1.0, -std::f64::consts::FRAC_PI_2), 1.0);
        assert_eq!(animator.wave_height(f64::NAN, 0.0), 1.0);
    }

    #[test]
    fn updated_heights_follow_the_wave() {
        let (animator, queue, state) = animator(WaveConfig::default());
        state.start();
        let quarter_wave = 500.0 * std::f64::consts::FRAC_PI_2;
        let catalog = BuildingCatalog::new(vec![building_at(quarter_wave, 0.0), building_at(250.0, 250.0)]);
        let mut heights = LiveHeights::from_catalog(&catalog);

        push(&queue, 16_384.0);
        let outcome = animator.tick_at(0.0, &catalog, &mut heights);
        assert_eq!(outcome, TickOutcome::Updated { amplitude: 0.5 });
        let h = heights.as_slice();
        assert!((h[0] - 250.0).abs() < 1e-9, "{}", h[0]);
        // sin(1.0) at t = 0
        assert!((h[1] - (0.5 * 1f64.sin() * 300.0 + 100.0)).abs() < 1e-9);

        // Half a second later the wave has moved by one radian
        push(&queue, 16_384.0);
        animator.tick_at(0.5, &catalog, &mut heights);
        assert!((heights.as_slice()[1] - 100.0).abs() < 1e-9);
    }

    #[test]
    fn empty_queue_while_playing_is_idle() {
        let (animator, _, state) = animator(WaveConfig::default());
        state.start();
        let catalog = BuildingCatalog::new(vec![building_at(10.0, 10.0)]);
        let mut heights = LiveHeights::from_catalog(&catalog);
        assert_eq!(animator.tick_at(1.0, &catalog, &mut heights), TickOutcome::Idle);
        assert_eq!(heights.as_slice(), &[7.0]);

        // Not started yet counts as still to come
        let (idle_animator, _, _) = self::animator(WaveConfig::default());
        assert_eq!(idle_animator.tick_at(0.0, &catalog, &mut heights), TickOutcome::Idle);
    }

    #[test]
    fn finished_playback_drains_queue_before_stopping() {
        let (animator, queue, state) = animator(WaveConfig::default());
        let catalog = BuildingCatalog::new(vec![building_at(10.0, 10.0)]);
        let mut heights = LiveHeights::from_catalog(&catalog);
        push(&queue, 100.0);
        push(&queue, 200.0);
        state.finish();

        assert!(matches!(animator.tick_at(0.0, &catalog, &mut heights), TickOutcome::Updated { .. }));
        assert_eq!(queue.len(), 1);
        assert!(matches!(animator.tick_at(0.1, &catalog, &mut heights), TickOutcome::Updated { .. }));
        assert_eq!(animator.tick_at(0.2, &catalog, &mut heights), TickOutcome::Stop);
        assert_eq!(animator.tick_at(0.3, &catalog, &mut heights), TickOutcome::Stop);
    }

    #[test]
    fn last_block_pushed_before_finish_is_always_consumed() {
        let catalog = BuildingCatalog::new(vec![building_at(10.0, 10.0)]);
        for _ in 0..2000 {
            let (animator, queue, state) = animator(WaveConfig::default());
            state.start();
            let mut heights = LiveHeights::from_catalog(&catalog);

            let producer = {
                let queue = Arc::clone(&queue);
                let state = Arc::clone(&state);
                std::thread::spawn(move || {
                    push(&queue, 1.0);
                    state.finish();
                })
            };

            let mut updates = 0;
            loop {
                match animator.tick_at(0.0, &catalog, &mut heights) {
                    TickOutcome::Updated { .. } => updates += 1,
                    TickOutcome::Idle => std::thread::yield_now(),
                    TickOutcome::Stop => break,
                }
            }
            producer.join().expect("producer thread");
            assert_eq!(updates, 1);
            assert!(queue.is_empty());
        }
    }

    #[test]
    fn distance_policy_uses_radial_phase() {
        let config = WaveConfig {
            phase: PhasePolicy::DistanceFrom { x: 100.0, y: 100.0 },
            ..WaveConfig::default()
        };
        let (animator, _, _) = animator(config);
        assert!((animator.phase(point!(x: 400.0, y: 500.0), 0.0) - 1.0).abs() < 1e-12);
        assert!((animator.phase(point!(x: 100.0, y: 100.0), 1.0) + 2.0).abs() < 1e-12);
    }

    #[test]
    fn mismatched_heights_are_resized() {
        let (animator, queue, _) = animator(WaveConfig::default());
        let catalog = BuildingCatalog::new(vec![building_at(0.0, 0.0), building_at(5.0, 5.0)]);
        let mut heights = LiveHeights::default();
        push(&queue, 0.0);
        animator.tick_at(0.0, &catalog, &mut heights);
        assert_eq!(heights.as_slice(), &[100.0, 100.0]);
    }

    #[test]
    fn blocking_loop_runs_until_stop() {
        let config = WaveConfig {
            tick_period_secs: 0.001,
            ..WaveConfig::default()
        };
        let (animator, queue, state) = animator(config);
        let catalog = BuildingCatalog::new(vec![building_at(0.0, 0.0)]);
        let mut heights = LiveHeights::from_catalog(&catalog);
        for _ in 0..3 {
            push(&queue, 1000.0);
        }
        state.finish();

        let mut updates = 0;
        let ticks = animator.run_blocking(&catalog, &mut heights, |outcome, _| {
            if matches!(outcome, TickOutcome::Updated { .. }) {
                updates += 1;
            }
        });
        assert_eq!(updates, 3);
        assert_eq!(ticks, 4);
    }
}
