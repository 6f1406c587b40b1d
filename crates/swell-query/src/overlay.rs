//! Overlay height collaborator.
//!
//! An overlay adds local height detail on top of the wave field and can mark
//! regions (inside hulls, under docks) as clipped. Overlay data lives with the
//! host, so only cooperative query tasks, which run on the driving thread,
//! sample it.

/// Clip values at or above this mark a position as clipped.
pub const CLIP_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OverlaySample {
    pub height: f32,
    pub clip: f32,
}

impl OverlaySample {
    pub fn is_clipped(&self) -> bool {
        self.clip >= CLIP_THRESHOLD
    }
}

/// Host-provided overlay lookup at a world position.
pub trait OverlaySource: Send + Sync {
    fn sample(&self, x: f32, z: f32) -> OverlaySample;
}

impl<F> OverlaySource for F
where
    F: Fn(f32, f32) -> OverlaySample + Send + Sync,
{
    fn sample(&self, x: f32, z: f32) -> OverlaySample {
        self(x, z)
    }
}
