use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of one GPU drawing context.
///
/// Programs are only valid for the context they were built against, so every
/// cache key carries the context identity. Ids are handed out from a
/// process-wide counter and never reused, even after the context is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    /// Allocates a fresh, never-before-seen context id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

/// Size of a drawable in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PixelSize {
    pub width: u32,
    pub height: u32,
}

impl PixelSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn as_vec2(&self) -> [f32; 2] {
        [self.width as f32, self.height as f32]
    }
}

impl fmt::Display for PixelSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// How often a surface redraws while it is `Rendering`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulingPolicy {
    /// Draw on every frame callback.
    #[default]
    Continuous,
    /// Draw only after an input changed (start, resume, resize, uniform edit,
    /// explicit redraw request).
    OnDemand,
    /// Never draw; the surface keeps its resources.
    Suspended,
}

impl fmt::Display for SchedulingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulingPolicy::Continuous => f.write_str("continuous"),
            SchedulingPolicy::OnDemand => f.write_str("on-demand"),
            SchedulingPolicy::Suspended => f.write_str("suspended"),
        }
    }
}

/// Adapter selection hint passed to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerPreference {
    Low,
    #[default]
    High,
}

/// Fidelity knobs for a newly created drawing context.
///
/// The device pixel ratio reported by the host is clamped into
/// `[min_pixel_ratio, max_pixel_ratio]` and multiplied with the logical size of
/// the container to obtain the drawable size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContextProfile {
    pub min_pixel_ratio: f32,
    pub max_pixel_ratio: f32,
    pub antialias: bool,
    pub power: PowerPreference,
}

impl ContextProfile {
    /// Full-quality profile used by inline, hero and modal previews.
    pub fn full() -> Self {
        Self::default()
    }

    /// Reduced-fidelity profile for hover previews.
    pub fn low_power() -> Self {
        Self {
            min_pixel_ratio: 0.5,
            max_pixel_ratio: 1.0,
            antialias: false,
            power: PowerPreference::Low,
        }
    }

    pub fn pixel_ratio(&self, device_ratio: f64) -> f32 {
        let ratio = device_ratio as f32;
        if !ratio.is_finite() || ratio <= 0.0 {
            return self.min_pixel_ratio.max(f32::EPSILON);
        }
        let max = self.max_pixel_ratio.max(self.min_pixel_ratio);
        ratio.clamp(self.min_pixel_ratio, max)
    }
}

impl Default for ContextProfile {
    fn default() -> Self {
        Self {
            min_pixel_ratio: 1.0,
            max_pixel_ratio: 2.0,
            antialias: true,
            power: PowerPreference::High,
        }
    }
}

/// Scales a logical size by a pixel ratio, never collapsing to zero.
pub fn scaled_size(logical_width: f64, logical_height: f64, ratio: f32) -> PixelSize {
    let width = (logical_width * ratio as f64).round().max(1.0) as u32;
    let height = (logical_height * ratio as f64).round().max(1.0) as u32;
    PixelSize::new(width, height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_ids_are_unique() {
        let a = ContextId::next();
        let b = ContextId::next();
        assert_ne!(a, b);
        assert!(b.get() > a.get());
    }

    #[test]
    fn low_power_profile_clamps_device_ratio() {
        let profile = ContextProfile::low_power();
        assert_eq!(profile.pixel_ratio(2.0), 1.0);
        assert_eq!(profile.pixel_ratio(0.25), 0.5);
        assert_eq!(profile.pixel_ratio(0.75), 0.75);
    }

    #[test]
    fn scaled_size_never_reaches_zero() {
        assert_eq!(scaled_size(0.4, 10.0, 0.5), PixelSize::new(1, 5));
        assert_eq!(scaled_size(800.0, 600.0, 2.0), PixelSize::new(1600, 1200));
    }
}
