//! Backend selection.
//!
//! `ndarray` (CPU) is the default. The `cuda` and `wgpu` features switch the
//! training backend at compile time.

use burn::backend::Autodiff;
use burn::tensor::backend::Backend;

#[cfg(feature = "cuda")]
pub type DefaultBackend = burn::backend::Cuda;

#[cfg(all(feature = "wgpu", not(feature = "cuda")))]
pub type DefaultBackend = burn::backend::Wgpu;

#[cfg(not(any(feature = "cuda", feature = "wgpu")))]
pub type DefaultBackend = burn::backend::NdArray;

/// The autodiff backend used for training
pub type TrainingBackend = Autodiff<DefaultBackend>;

/// Selects the compute device.
///
/// CUDA builds export the device index through `CUDA_VISIBLE_DEVICES` first,
/// so the first visible device is the requested one.
pub fn select_device(index: usize) -> <TrainingBackend as Backend>::Device {
    #[cfg(feature = "cuda")]
    {
        mlabel_core::export_visible_devices(index);
    }
    #[cfg(not(feature = "cuda"))]
    {
        tracing::debug!("Device index {index} ignored by the {} backend", backend_name());
    }
    Default::default()
}

pub fn backend_name() -> &'static str {
    #[cfg(feature = "cuda")]
    {
        "CUDA (GPU)"
    }
    #[cfg(all(feature = "wgpu", not(feature = "cuda")))]
    {
        "WGPU (GPU)"
    }
    #[cfg(not(any(feature = "cuda", feature = "wgpu")))]
    {
        "NdArray (CPU)"
    }
}
