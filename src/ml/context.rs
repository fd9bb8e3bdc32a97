use burn::prelude::*;

/// Backend + device a run executes on.
///
/// Built once at startup and handed to every model builder and loop,
/// so nothing reaches for a global default device.
#[derive(Clone, Debug)]
pub struct ExecutionContext<B: Backend> {
    device: B::Device,
}

impl<B: Backend> ExecutionContext<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    /// Seed the backend RNG used for weight initialisation and dropout.
    pub fn seeded(device: B::Device, seed: u64) -> Self {
        B::seed(seed);
        Self::new(device)
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }
}

impl<B: Backend> Default for ExecutionContext<B> {
    fn default() -> Self {
        Self::new(B::Device::default())
    }
}
