//! Linear gain ramps for pause/resume.
//!
//! One ramp per output: starting a ramp aborts the one in flight. The
//! logical volume (`target`) is kept apart from the output's actual gain, so
//! fading out to silence never loses the level the next fade-in returns to.

use crate::output::{clamp01_f32, AudioOutput};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Steps per ramp, spread evenly over the configured duration.
pub const FADE_STEPS: u32 = 20;

/// Gain levels for a ramp from `from` to `to`, one per step.
///
/// The last level is exactly `to` and no level leaves the closed interval
/// between the two endpoints.
pub fn ramp_levels(from: f32, to: f32, steps: u32) -> Vec<f32> {
    let from = clamp01_f32(from);
    let to = clamp01_f32(to);
    let steps = steps.max(1);
    let (lo, hi) = if from <= to { (from, to) } else { (to, from) };

    (1..=steps)
        .map(|i| {
            if i == steps {
                to
            } else {
                (from + (to - from) * (i as f32 / steps as f32)).clamp(lo, hi)
            }
        })
        .collect()
}

pub struct Fader {
    output: Arc<dyn AudioOutput>,
    duration: Duration,
    target: f32,
    ramp: Option<JoinHandle<()>>,
}

impl Fader {
    pub fn new(output: Arc<dyn AudioOutput>, duration: Duration, target: f32) -> Self {
        Self { output, duration, target: clamp01_f32(target), ramp: None }
    }

    /// Logical volume, 0.0..=1.0.
    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn set_target(&mut self, target: f32) {
        self.target = clamp01_f32(target);
    }

    pub fn is_ramping(&self) -> bool {
        self.ramp.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn cancel(&mut self) {
        if let Some(h) = self.ramp.take() {
            h.abort();
        }
    }

    /// Ramp the output from silence up to the logical volume.
    pub async fn fade_in(&mut self) {
        self.cancel();
        self.output.set_gain(0.0).await;
        let target = self.target;
        self.spawn_ramp(0.0, target, async {});
    }

    /// Move a running fade-in onto the current target. Below the output's
    /// gain it drops there at once; above it the ramp continues up to it.
    pub async fn retarget(&mut self) {
        self.cancel();
        let from = self.output.gain().await;
        let target = self.target;
        if from >= target {
            self.output.set_gain(target).await;
        } else {
            self.spawn_ramp(from, target, async {});
        }
    }

    /// Ramp the output from its current gain down to silence, then run
    /// `on_complete`. A ramp started before completion cancels both.
    pub async fn fade_out<F, Fut>(&mut self, on_complete: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let from = self.output.gain().await;
        self.spawn_ramp(from, 0.0, async move { on_complete().await });
    }

    fn spawn_ramp<Fut>(&mut self, from: f32, to: f32, then: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let output = self.output.clone();
        let step = self.duration / FADE_STEPS;
        let levels = ramp_levels(from, to, FADE_STEPS);

        self.ramp = Some(tokio::spawn(async move {
            for level in levels {
                tokio::time::sleep(step).await;
                output.set_gain(level).await;
            }
            then.await;
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeOutput;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn levels_are_linear_and_bounded() {
        let down = ramp_levels(0.8, 0.0, 20);
        assert_eq!(down.len(), 20);
        assert_eq!(*down.last().unwrap(), 0.0);
        assert!((down[0] - 0.76).abs() < 1e-6);
        assert!(down.windows(2).all(|w| w[1] <= w[0]));
        assert!(down.iter().all(|g| (0.0..=0.8).contains(g)));

        let up = ramp_levels(0.0, 0.7, 20);
        assert_eq!(*up.last().unwrap(), 0.7);
        assert!(up.iter().all(|g| (0.0..=0.7).contains(g)));
    }

    #[tokio::test(start_paused = true)]
    async fn fade_out_reaches_silence_and_keeps_target() {
        let out = Arc::new(FakeOutput::default());
        out.set_gain(0.8).await;
        let mut fader = Fader::new(out.clone(), Duration::from_millis(1000), 0.8);

        let done = Arc::new(AtomicBool::new(false));
        let flag = done.clone();
        fader
            .fade_out(move || async move {
                flag.store(true, Ordering::SeqCst);
            })
            .await;

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(fader.is_ramping());
        assert!(!done.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(done.load(Ordering::SeqCst));
        assert_eq!(out.current_gain(), 0.0);
        assert_eq!(fader.target(), 0.8);
        assert_eq!(out.gain_log().len(), 1 + FADE_STEPS as usize);

        fader.fade_in().await;
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(out.current_gain(), 0.8);
    }

    #[tokio::test(start_paused = true)]
    async fn new_ramp_cancels_the_old_one() {
        let out = Arc::new(FakeOutput::default());
        out.set_gain(0.5).await;
        let mut fader = Fader::new(out.clone(), Duration::from_millis(1000), 0.5);

        let done = Arc::new(AtomicBool::new(false));
        let flag = done.clone();
        fader
            .fade_out(move || async move {
                flag.store(true, Ordering::SeqCst);
            })
            .await;
        tokio::time::sleep(Duration::from_millis(300)).await;

        fader.fade_in().await;
        tokio::time::sleep(Duration::from_secs(2)).await;

        // The fade-out never completed, so its completion never ran.
        assert!(!done.load(Ordering::SeqCst));
        assert_eq!(out.current_gain(), 0.5);
    }
}
