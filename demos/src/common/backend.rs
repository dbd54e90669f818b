//! Compute backend of the SegMatte tools.
//!
//! `cuda` wins over `wgpu`; without either the CPU `ndarray` backend runs the
//! networks. Also installs the logging subscriber shared by the binaries.

use cfg_if::cfg_if;

cfg_if! {
    if #[cfg(feature = "cuda")] {
        /// Backend the networks run on.
        pub type SelectedBackend = burn::backend::Cuda;
        pub type SelectedDevice = burn::backend::cuda::CudaDevice;
        const BACKEND_NAME: &str = "cuda";
    } else if #[cfg(feature = "wgpu")] {
        /// Backend the networks run on.
        pub type SelectedBackend = burn::backend::Wgpu;
        pub type SelectedDevice = burn::backend::wgpu::WgpuDevice;
        const BACKEND_NAME: &str = "wgpu";
    } else {
        /// Backend the networks run on.
        pub type SelectedBackend = burn::backend::NdArray;
        pub type SelectedDevice = burn::backend::ndarray::NdArrayDevice;
        const BACKEND_NAME: &str = "ndarray";
    }
}

/// Default device of [`SelectedBackend`]: the first GPU, or the CPU.
pub fn create_device() -> SelectedDevice {
    SelectedDevice::default()
}

/// Short backend label for log fields.
pub const fn get_backend_name() -> &'static str {
    BACKEND_NAME
}

/// Install the global `tracing` subscriber, filtered by `RUST_LOG`
/// (default `info`).
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(any(feature = "cuda", feature = "wgpu")))]
    fn cpu_backend_is_the_fallback() {
        assert_eq!(get_backend_name(), "ndarray");
        assert_eq!(create_device(), SelectedDevice::Cpu);
    }
}
