// Capability probing - which extensions and layers are actually there
//
// Every check is an exact name match against the full enumerated set.
// Asking for nothing always succeeds.

use ash::prelude::VkResult;
use ash::vk;
use std::ffi::{CStr, CString};

use super::Backend;

/// Names in `requested` that do not appear in `available`, in request order.
pub fn missing_names<N: AsRef<CStr>>(requested: &[N], available: &[CString]) -> Vec<CString> {
    requested
        .iter()
        .filter_map(|name| {
            let name: &CStr = name.as_ref();
            let present = available.iter().any(|candidate| candidate.as_c_str() == name);
            (!present).then(|| name.to_owned())
        })
        .collect()
}

pub fn missing_instance_extensions<B, N>(backend: &B, requested: &[N]) -> VkResult<Vec<CString>>
where
    B: Backend + ?Sized,
    N: AsRef<CStr>,
{
    let available = backend.available_instance_extensions()?;
    Ok(missing_names(requested, &available))
}

pub fn missing_validation_layers<B, N>(backend: &B, requested: &[N]) -> VkResult<Vec<CString>>
where
    B: Backend + ?Sized,
    N: AsRef<CStr>,
{
    let available = backend.available_layers()?;
    Ok(missing_names(requested, &available))
}

pub fn supports_instance_extensions<B, N>(backend: &B, requested: &[N]) -> VkResult<bool>
where
    B: Backend + ?Sized,
    N: AsRef<CStr>,
{
    Ok(missing_instance_extensions(backend, requested)?.is_empty())
}

pub fn supports_validation_layers<B, N>(backend: &B, requested: &[N]) -> VkResult<bool>
where
    B: Backend + ?Sized,
    N: AsRef<CStr>,
{
    Ok(missing_validation_layers(backend, requested)?.is_empty())
}

pub fn supports_device_extensions<B, N>(
    backend: &B,
    physical_device: vk::PhysicalDevice,
    requested: &[N],
) -> VkResult<bool>
where
    B: Backend + ?Sized,
    N: AsRef<CStr>,
{
    let available = backend.device_extensions(physical_device)?;
    Ok(missing_names(requested, &available).is_empty())
}
