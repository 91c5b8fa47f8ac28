use kernel_info::memory::HOSTED_DEFAULT_FRAMES;

/// Device-model step at which [`HostedConfig::fail_at`] injects a failure.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FailStage {
    Chrdev,
    Class,
    Device,
}

/// How the hosted kernel is brought up.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct HostedConfig {
    /// Number of 4 KiB frames of physical memory.
    pub frames: u64,
    /// Make one registration step fail.
    pub fail_at: Option<FailStage>,
}

impl Default for HostedConfig {
    fn default() -> Self {
        Self {
            frames: HOSTED_DEFAULT_FRAMES,
            fail_at: None,
        }
    }
}

impl HostedConfig {
    #[must_use]
    pub const fn with_frames(mut self, frames: u64) -> Self {
        self.frames = frames;
        self
    }

    #[must_use]
    pub const fn failing_at(mut self, stage: FailStage) -> Self {
        self.fail_at = Some(stage);
        self
    }
}
