//! Backend used by the binaries, picked at compile time.

#[cfg(feature = "wgpu")]
pub type InferenceBackend = burn::backend::Wgpu;

#[cfg(not(feature = "wgpu"))]
pub type InferenceBackend = burn::backend::NdArray<f32>;

/// Default device of [InferenceBackend].
pub fn default_device() -> <InferenceBackend as burn::tensor::backend::Backend>::Device {
    Default::default()
}
