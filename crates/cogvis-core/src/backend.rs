//! Device selection for the Burn backends used by cogvis.
//!
//! Training code is generic over the backend, so a device selector string is
//! first parsed into a [`DeviceKind`] and then resolved to a concrete
//! `B::Device` through the [`DevicePlacement`] trait.

use std::str::FromStr;

use burn::backend::Autodiff;
use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Where the computation of a run should happen
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// CPU memory and kernels
    #[default]
    Host,
    /// GPU (or other accelerator) exposed by the backend
    Accelerator,
}

impl FromStr for DeviceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "host" | "cpu" => Ok(DeviceKind::Host),
            "accelerator" | "gpu" => Ok(DeviceKind::Accelerator),
            _ => Err(Error::UnsupportedDevice(s.to_string())),
        }
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceKind::Host => write!(f, "host"),
            DeviceKind::Accelerator => write!(f, "accelerator"),
        }
    }
}

/// Backends that can map a [`DeviceKind`] to one of their devices
pub trait DevicePlacement: Backend {
    /// The device trained models are handed back on.
    ///
    /// For CPU backends this is the CPU. Backends that only address memory
    /// through a graphics adapter use their default adapter instead.
    fn host_device() -> Self::Device;

    /// The accelerator device, if the backend has one
    fn accelerator_device() -> Option<Self::Device>;

    /// Resolves a device kind, falling back to the host when no accelerator exists
    fn resolve_device(kind: DeviceKind) -> Self::Device {
        match kind {
            DeviceKind::Host => Self::host_device(),
            DeviceKind::Accelerator => match Self::accelerator_device() {
                Some(device) => {
                    info!("Using accelerator device {:?}", device);
                    device
                }
                None => {
                    warn!(
                        "Accelerator requested but backend {} has none - falling back to host",
                        Self::name(&Self::host_device())
                    );
                    Self::host_device()
                }
            },
        }
    }
}

impl DevicePlacement for burn::backend::NdArray {
    fn host_device() -> Self::Device {
        burn::backend::ndarray::NdArrayDevice::Cpu
    }

    fn accelerator_device() -> Option<Self::Device> {
        None
    }
}

// `WgpuDevice::Cpu` is a software adapter that most machines lack, so the
// host side of wgpu is its default adapter
#[cfg(feature = "wgpu")]
impl DevicePlacement for burn::backend::Wgpu {
    fn host_device() -> Self::Device {
        burn::backend::wgpu::WgpuDevice::DefaultDevice
    }

    fn accelerator_device() -> Option<Self::Device> {
        Some(burn::backend::wgpu::WgpuDevice::DefaultDevice)
    }
}

impl<B: DevicePlacement> DevicePlacement for Autodiff<B> {
    fn host_device() -> Self::Device {
        B::host_device()
    }

    fn accelerator_device() -> Option<Self::Device> {
        B::accelerator_device()
    }
}

/// Parses a device selector and resolves it for backend `B`.
///
/// Fails with [`Error::UnsupportedDevice`] before touching any backend state.
pub fn select_device<B: DevicePlacement>(selector: &str) -> Result<B::Device> {
    let kind = DeviceKind::from_str(selector)?;
    Ok(B::resolve_device(kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = Autodiff<NdArray>;

    #[test]
    fn test_parse_device_kind() {
        assert_eq!("host".parse::<DeviceKind>().unwrap(), DeviceKind::Host);
        assert_eq!("accelerator".parse::<DeviceKind>().unwrap(), DeviceKind::Accelerator);
        assert_eq!("GPU".parse::<DeviceKind>().unwrap(), DeviceKind::Accelerator);
        assert_eq!("cpu".parse::<DeviceKind>().unwrap(), DeviceKind::Host);
    }

    #[test]
    fn test_unknown_selector_is_rejected() {
        let err = select_device::<TestBackend>("tpu").unwrap_err();
        assert!(matches!(err, Error::UnsupportedDevice(ref s) if s == "tpu"));
    }

    #[test]
    fn test_accelerator_falls_back_to_host_on_ndarray() {
        let device = select_device::<TestBackend>("accelerator").unwrap();
        assert_eq!(device, TestBackend::host_device());
    }

    #[test]
    fn test_resolve_device_on_ndarray() {
        assert_eq!(
            <NdArray>::resolve_device(DeviceKind::Host),
            burn::backend::ndarray::NdArrayDevice::Cpu
        );
        assert_eq!(
            TestBackend::resolve_device(DeviceKind::Accelerator),
            <NdArray>::host_device()
        );
    }

    #[cfg(feature = "wgpu")]
    #[test]
    fn test_wgpu_host_is_not_the_software_adapter() {
        use burn::backend::wgpu::WgpuDevice;
        use burn::backend::Wgpu;

        assert_eq!(<Wgpu>::host_device(), WgpuDevice::DefaultDevice);
        assert_ne!(<Wgpu>::host_device(), WgpuDevice::Cpu);
        assert_eq!(
            Autodiff::<Wgpu>::resolve_device(DeviceKind::Accelerator),
            <Wgpu>::host_device()
        );
    }

    #[test]
    fn test_device_kind_display() {
        assert_eq!(DeviceKind::Host.to_string(), "host");
        assert_eq!(DeviceKind::Accelerator.to_string(), "accelerator");
    }
}
