use std::time::Duration;

/// Number of elements reserved in each per-frame constant buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCounts {
    pub pass: u32,
    pub object: u32,
}

impl Default for FrameCounts {
    fn default() -> Self {
        FrameCounts { pass: 1, object: 1 }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// Length of the frame resource ring
    pub frame_resources: usize,
    /// Back buffers in the swapchain, cycled independently of the ring
    pub swapchain_buffers: u32,
    pub vsync: bool,
    /// Upper bound for a single frame wait. `None` waits forever.
    pub fence_timeout: Option<Duration>,
    pub counts: FrameCounts,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            title: "framepace".to_owned(),
            width: 1280,
            height: 720,
            frame_resources: 3,
            swapchain_buffers: 3,
            vsync: true,
            fence_timeout: None,
            counts: FrameCounts::default(),
        }
    }
}

impl AppConfig {
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_counts(mut self, counts: FrameCounts) -> Self {
        self.counts = counts;
        self
    }

    pub fn with_frame_resources(mut self, frame_resources: usize) -> Self {
        self.frame_resources = frame_resources;
        self
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_triple_buffer() {
        let config = AppConfig::default();
        assert_eq!(config.frame_resources, 3);
        assert_eq!(config.swapchain_buffers, 3);
        assert!(config.fence_timeout.is_none());
    }

    #[test]
    fn aspect_ratio_survives_zero_height() {
        let config = AppConfig {
            height: 0,
            ..AppConfig::default()
        };
        assert_eq!(config.aspect_ratio(), 1280.0);
    }
}
