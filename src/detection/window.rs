use crate::budget::DegradeReason;
use crate::error::{AdaptcamError, Result};

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::Instant;

/// Rolling frame-time and memory samples of a running detection loop
pub struct PerformanceWindow {
    frames: Mutex<VecDeque<Instant>>,
    memory: Mutex<VecDeque<f64>>,
    frame_capacity: usize,
    memory_capacity: usize,
    stats: WindowStats,
}

/// Counters since the window was created
#[derive(Debug, Default)]
pub struct WindowStats {
    frames_recorded: AtomicU64,
    memory_samples: AtomicU64,
    evictions: AtomicU64,
}

impl WindowStats {
    pub fn snapshot(&self) -> WindowStatsSnapshot {
        WindowStatsSnapshot {
            frames_recorded: self.frames_recorded.load(Ordering::Relaxed),
            memory_samples: self.memory_samples.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowStatsSnapshot {
    pub frames_recorded: u64,
    pub memory_samples: u64,
    pub evictions: u64,
}

impl PerformanceWindow {
    /// Capacities below the usable minimum (two frames, one memory sample) are raised to it
    pub fn new(frame_capacity: usize, memory_capacity: usize) -> Self {
        let frame_capacity = frame_capacity.max(2);
        let memory_capacity = memory_capacity.max(1);
        Self {
            frames: Mutex::new(VecDeque::with_capacity(frame_capacity)),
            memory: Mutex::new(VecDeque::with_capacity(memory_capacity)),
            frame_capacity,
            memory_capacity,
            stats: WindowStats::default(),
        }
    }

    pub fn builder() -> PerformanceWindowBuilder {
        PerformanceWindowBuilder::new()
    }

    pub fn record_frame(&self, at: Instant) {
        let mut frames = self.frames.lock();
        while frames.len() >= self.frame_capacity {
            frames.pop_front();
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }
        frames.push_back(at);
        self.stats.frames_recorded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_memory(&self, used_mb: f64) {
        let mut memory = self.memory.lock();
        while memory.len() >= self.memory_capacity {
            memory.pop_front();
        }
        memory.push_back(used_mb);
        self.stats.memory_samples.fetch_add(1, Ordering::Relaxed);
    }

    /// Frames per second across the window; `None` until two frames with
    /// distinct timestamps have been recorded
    pub fn fps(&self) -> Option<f64> {
        let frames = self.frames.lock();
        if frames.len() < 2 {
            return None;
        }
        let first = *frames.front()?;
        let last = *frames.back()?;
        let elapsed = last.duration_since(first).as_secs_f64();
        if elapsed <= 0.0 {
            return None;
        }
        Some((frames.len() - 1) as f64 / elapsed)
    }

    pub fn mean_memory_mb(&self) -> Option<f64> {
        let memory = self.memory.lock();
        if memory.is_empty() {
            return None;
        }
        Some(memory.iter().sum::<f64>() / memory.len() as f64)
    }

    /// Reason the window looks unhealthy, frame rate first
    pub fn evaluate(&self, min_fps: f64, memory_ceiling_mb: u32) -> Option<DegradeReason> {
        if self.fps().is_some_and(|fps| fps < min_fps) {
            return Some(DegradeReason::LowFrameRate);
        }
        if self
            .mean_memory_mb()
            .is_some_and(|mb| mb > f64::from(memory_ceiling_mb))
        {
            return Some(DegradeReason::MemoryPressure);
        }
        None
    }

    /// Advice to show the user, if any
    pub fn suggestion(&self, min_fps: f64, target_fps: f64, memory_warn_mb: u32) -> Option<String> {
        let mut message = match self.fps() {
            Some(fps) if fps > 0.0 && fps < min_fps => Some(
                "Performance is very low. Consider reducing camera resolution or disabling face detection."
                    .to_string(),
            ),
            Some(fps) if fps > 0.0 && fps < target_fps => {
                Some("Performance is below optimal. Try closing other apps.".to_string())
            }
            _ => None,
        };

        if self
            .mean_memory_mb()
            .is_some_and(|mb| mb > f64::from(memory_warn_mb))
        {
            let warning = "High memory usage detected. The app may crash soon.";
            message = Some(match message {
                Some(existing) => format!("{} {}", existing, warning),
                None => warning.to_string(),
            });
        }

        message
    }

    /// Drop all samples, keeping the counters
    pub fn reset(&self) {
        self.frames.lock().clear();
        self.memory.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    pub fn stats(&self) -> WindowStatsSnapshot {
        self.stats.snapshot()
    }
}

#[derive(Debug, Default)]
pub struct PerformanceWindowBuilder {
    frame_capacity: Option<usize>,
    memory_capacity: Option<usize>,
}

impl PerformanceWindowBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame_capacity(mut self, capacity: usize) -> Self {
        self.frame_capacity = Some(capacity);
        self
    }

    pub fn memory_capacity(mut self, capacity: usize) -> Self {
        self.memory_capacity = Some(capacity);
        self
    }

    pub fn build(self) -> Result<PerformanceWindow> {
        let frame_capacity = self
            .frame_capacity
            .ok_or_else(|| AdaptcamError::system("Frame window capacity is required"))?;
        if frame_capacity < 2 {
            return Err(AdaptcamError::system(
                "Frame window needs room for at least two samples",
            ));
        }

        let memory_capacity = self.memory_capacity.unwrap_or(10);
        if memory_capacity == 0 {
            return Err(AdaptcamError::system(
                "Memory window capacity must be greater than 0",
            ));
        }

        Ok(PerformanceWindow::new(frame_capacity, memory_capacity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn window_with_frames(count: usize, spacing_ms: u64) -> PerformanceWindow {
        let window = PerformanceWindow::new(60, 10);
        let start = Instant::now();
        for i in 0..count {
            window.record_frame(start + Duration::from_millis(i as u64 * spacing_ms));
        }
        window
    }

    #[test]
    fn test_fps_needs_two_samples() {
        assert_eq!(window_with_frames(0, 50).fps(), None);
        assert_eq!(window_with_frames(1, 50).fps(), None);
        assert_eq!(window_with_frames(2, 0).fps(), None);
    }

    #[test]
    fn test_fps_over_window() {
        let window = window_with_frames(11, 100);
        let fps = window.fps().unwrap();
        assert!((fps - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_window_evicts_oldest() {
        let window = PerformanceWindow::new(3, 2);
        let start = Instant::now();
        for i in 0..5 {
            window.record_frame(start + Duration::from_millis(i * 100));
        }
        assert_eq!(window.len(), 3);
        assert_eq!(window.stats().evictions, 2);
        assert_eq!(window.stats().frames_recorded, 5);

        for mb in [100.0, 200.0, 400.0] {
            window.record_memory(mb);
        }
        assert_eq!(window.mean_memory_mb(), Some(300.0));
    }

    #[test]
    fn test_zero_capacity_stays_bounded() {
        let window = PerformanceWindow::new(0, 0);
        let start = Instant::now();
        for i in 0..10 {
            window.record_frame(start + Duration::from_millis(i * 100));
            window.record_memory(i as f64);
        }
        assert_eq!(window.len(), 2);
        assert_eq!(window.mean_memory_mb(), Some(9.0));
        assert!((window.fps().unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_evaluate() {
        let slow = window_with_frames(5, 200);
        assert_eq!(slow.evaluate(10.0, 300), Some(DegradeReason::LowFrameRate));

        let fast = window_with_frames(5, 20);
        assert_eq!(fast.evaluate(10.0, 300), None);
        fast.record_memory(512.0);
        assert_eq!(fast.evaluate(10.0, 300), Some(DegradeReason::MemoryPressure));

        // a single frame never counts as slow
        assert_eq!(window_with_frames(1, 0).evaluate(10.0, 300), None);
    }

    #[test]
    fn test_suggestion_text() {
        let very_slow = window_with_frames(5, 200);
        assert_eq!(
            very_slow.suggestion(10.0, 20.0, 300).as_deref(),
            Some("Performance is very low. Consider reducing camera resolution or disabling face detection.")
        );

        let below = window_with_frames(5, 66);
        assert_eq!(
            below.suggestion(10.0, 20.0, 300).as_deref(),
            Some("Performance is below optimal. Try closing other apps.")
        );
        below.record_memory(350.0);
        assert_eq!(
            below.suggestion(10.0, 20.0, 300).as_deref(),
            Some("Performance is below optimal. Try closing other apps. High memory usage detected. The app may crash soon.")
        );

        assert_eq!(window_with_frames(5, 20).suggestion(10.0, 20.0, 300), None);
    }

    #[test]
    fn test_builder_validation() {
        assert!(PerformanceWindow::builder().build().is_err());
        assert!(PerformanceWindow::builder().frame_capacity(1).build().is_err());
        assert!(PerformanceWindow::builder()
            .frame_capacity(60)
            .memory_capacity(0)
            .build()
            .is_err());

        let window = PerformanceWindow::builder().frame_capacity(60).build().unwrap();
        assert!(window.is_empty());
    }
}
