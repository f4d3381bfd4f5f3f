//! Per-frame bookkeeping shared by the backends.

use corelib::{EngineError, EngineResult};

/// Counters returned by [`crate::Renderer::end_frame`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frame_index: u64,
    pub draw_calls: u32,
    pub triangles: u64,
    /// Draws rejected because the frame hit `max_draws_per_frame`, plus draws
    /// whose mesh or texture was destroyed before `end_frame`.
    pub dropped_draws: u32,
    /// The environment cubemap was drawn behind the scene.
    pub environment_drawn: bool,
}

impl FrameStats {
    /// Move an already counted draw into `dropped_draws`.
    pub(crate) fn discard_stale(&mut self, triangles: u64) {
        self.draw_calls = self.draw_calls.saturating_sub(1);
        self.triangles = self.triangles.saturating_sub(triangles);
        self.dropped_draws += 1;
    }
}

pub(crate) struct FrameRecorder {
    max_draws: usize,
    frames: u64,
    current: Option<FrameStats>,
}

impl FrameRecorder {
    pub(crate) fn new(max_draws: usize) -> Self {
        Self {
            max_draws,
            frames: 0,
            current: None,
        }
    }

    pub(crate) fn begin(&mut self) -> EngineResult<()> {
        if self.current.is_some() {
            return Err(EngineError::Backend("begin_frame called twice without end_frame".into()));
        }
        self.current = Some(FrameStats {
            frame_index: self.frames,
            ..FrameStats::default()
        });
        Ok(())
    }

    /// Count a draw. Returns `false` if the draw budget is exhausted.
    pub(crate) fn record(&mut self, triangles: usize) -> EngineResult<bool> {
        let max_draws = self.max_draws;
        let stats = self
            .current
            .as_mut()
            .ok_or_else(|| EngineError::Backend("draw_mesh called outside begin_frame/end_frame".into()))?;
        if stats.draw_calls as usize >= max_draws {
            if stats.dropped_draws == 0 {
                log::warn!("Frame {} exceeded {} draws; dropping the rest", stats.frame_index, max_draws);
            }
            stats.dropped_draws += 1;
            return Ok(false);
        }
        stats.draw_calls += 1;
        stats.triangles += triangles as u64;
        Ok(true)
    }

    pub(crate) fn end(&mut self) -> EngineResult<FrameStats> {
        let stats = self
            .current
            .take()
            .ok_or_else(|| EngineError::Backend("end_frame called without begin_frame".into()))?;
        self.frames += 1;
        Ok(stats)
    }

    pub(crate) fn in_frame(&self) -> bool {
        self.current.is_some()
    }

    pub(crate) fn abort(&mut self) {
        self.current = None;
    }
}
