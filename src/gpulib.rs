use std::mem::ManuallyDrop;

use windows::{
    Win32::Graphics::{
        Direct3D::*,
        Direct3D12::*,
        Dxgi::{Common::*, *},
    },
    core::{HSTRING, h},
};

use crate::error::{Error, Result};
use crate::fence::QueueFence;

/// Device, direct queue and DXGI factory shared by everything that talks to the GPU
pub struct GPULib {
    pub queue: ID3D12CommandQueue,
    pub device: ID3D12Device9,
    pub factory: IDXGIFactory7,
}

impl GPULib {
    pub fn new() -> Result<Self> {
        #[cfg(debug_assertions)]
        {
            let mut debug_option: Option<ID3D12Debug6> = None;
            unsafe { D3D12GetDebugInterface(&mut debug_option) }?;
            if let Some(debug) = debug_option.take() {
                unsafe {
                    debug.EnableDebugLayer();
                    debug.SetEnableGPUBasedValidation(true);
                }
            } else {
                tracing::warn!("Debug is active, but the debug layer could not be loaded");
            }
        }

        let dxgi_factory_flags = if cfg!(debug_assertions) {
            DXGI_CREATE_FACTORY_DEBUG
        } else {
            DXGI_CREATE_FACTORY_FLAGS(0)
        };

        let factory = unsafe { CreateDXGIFactory2::<IDXGIFactory7>(dxgi_factory_flags) }?;

        let device = Self::create_device(&factory, DXGI_GPU_PREFERENCE_HIGH_PERFORMANCE)?;

        #[cfg(debug_assertions)]
        Self::register_debug_callback(&device)?;

        let queue: ID3D12CommandQueue = unsafe {
            let desc = D3D12_COMMAND_QUEUE_DESC {
                Type: D3D12_COMMAND_LIST_TYPE_DIRECT,
                Priority: D3D12_COMMAND_QUEUE_PRIORITY_HIGH.0,
                Flags: D3D12_COMMAND_QUEUE_FLAG_NONE,
                NodeMask: 0,
            };
            device.CreateCommandQueue(&desc)
        }?;

        unsafe {
            device.SetName(h!("Framepace device"))?;
            queue.SetName(h!("Framepace direct queue"))?;
        }

        Ok(GPULib {
            factory,
            device,
            queue,
        })
    }

    fn create_device(
        factory: &IDXGIFactory7,
        preference: DXGI_GPU_PREFERENCE,
    ) -> Result<ID3D12Device9> {
        for i in 0.. {
            // Enumeration ends with DXGI_ERROR_NOT_FOUND, which surfaces as the error here
            let adapter: IDXGIAdapter1 =
                unsafe { factory.EnumAdapterByGpuPreference(i, preference) }?;
            let desc = unsafe { adapter.GetDesc1()? };

            if (DXGI_ADAPTER_FLAG(desc.Flags as _) & DXGI_ADAPTER_FLAG_SOFTWARE)
                != DXGI_ADAPTER_FLAG_NONE
            {
                // Don't select software renderers
                continue;
            }

            let mut device_option: Option<ID3D12Device9> = None;
            unsafe { D3D12CreateDevice(&adapter, D3D_FEATURE_LEVEL_11_0, &mut device_option) }?;

            let device = device_option.ok_or(Error::Missing("device"))?;
            let name_length = desc
                .Description
                .iter()
                .position(|&c| c == 0)
                .unwrap_or(desc.Description.len());
            tracing::info!(
                adapter = %String::from_utf16_lossy(&desc.Description[..name_length]),
                "Created Direct3D 12 device"
            );

            return Ok(device);
        }
        unreachable!();
    }

    /// Forwards debug layer messages to `tracing`.
    /// The callback is never unregistered, so the info queue can be dropped right away.
    #[cfg(debug_assertions)]
    fn register_debug_callback(device: &ID3D12Device9) -> Result<()> {
        use windows::core::Interface;

        let info_queue: ID3D12InfoQueue1 = device.cast()?;

        let mut callback_cookie = 0u32;
        unsafe {
            info_queue.RegisterMessageCallback(
                Some(debug_message_callback),
                D3D12_MESSAGE_CALLBACK_FLAG_NONE,
                std::ptr::null_mut(),
                &mut callback_cookie,
            )
        }?;

        // Secondary error check according to Microsoft docs
        if callback_cookie == 0 {
            return Err(Error::Missing("debug layer message callback"));
        }

        Ok(())
    }

    /// Fence paired with the direct queue, which drives the frame ring
    pub fn create_queue_fence(&self, name: &str) -> Result<QueueFence> {
        QueueFence::new(&self.device, self.queue.clone(), 0, name)
    }

    pub fn create_command_allocator(&self, name: &str) -> Result<ID3D12CommandAllocator> {
        let allocator: ID3D12CommandAllocator = unsafe {
            self.device
                .CreateCommandAllocator(D3D12_COMMAND_LIST_TYPE_DIRECT)
        }?;
        unsafe { allocator.SetName(&HSTRING::from(name)) }?;
        Ok(allocator)
    }

    /// Creates a closed command list, ready to be reset onto any allocator
    pub fn create_command_list(&self, name: &str) -> Result<ID3D12GraphicsCommandList> {
        let command_list: ID3D12GraphicsCommandList = unsafe {
            self.device.CreateCommandList1(
                0,
                D3D12_COMMAND_LIST_TYPE_DIRECT,
                D3D12_COMMAND_LIST_FLAG_NONE,
            )
        }?;
        unsafe { command_list.SetName(&HSTRING::from(name)) }?;
        Ok(command_list)
    }

    pub fn create_buffer(
        &self,
        heap_type: D3D12_HEAP_TYPE,
        size_bytes: usize,
        initial_state: D3D12_RESOURCE_STATES,
        name: &str,
    ) -> Result<ID3D12Resource> {
        let heap_properties = D3D12_HEAP_PROPERTIES {
            Type: heap_type,
            ..Default::default()
        };

        let resource_desc = D3D12_RESOURCE_DESC {
            Dimension: D3D12_RESOURCE_DIMENSION_BUFFER,
            Width: size_bytes.max(1) as u64,
            Height: 1,
            DepthOrArraySize: 1,
            Alignment: 0,
            MipLevels: 1,
            Format: DXGI_FORMAT_UNKNOWN,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            Layout: D3D12_TEXTURE_LAYOUT_ROW_MAJOR,
            Flags: D3D12_RESOURCE_FLAGS::default(),
        };

        let mut resource_option: Option<ID3D12Resource> = None;
        unsafe {
            self.device.CreateCommittedResource(
                &heap_properties,
                D3D12_HEAP_FLAGS::default(),
                &resource_desc,
                initial_state,
                None,
                &mut resource_option,
            )
        }?;

        let resource = resource_option.ok_or(Error::Missing("buffer resource"))?;
        unsafe { resource.SetName(&HSTRING::from(name)) }?;
        Ok(resource)
    }
}

pub fn transition(
    resource: &ID3D12Resource,
    before: D3D12_RESOURCE_STATES,
    after: D3D12_RESOURCE_STATES,
) -> D3D12_RESOURCE_BARRIER {
    D3D12_RESOURCE_BARRIER {
        Type: D3D12_RESOURCE_BARRIER_TYPE_TRANSITION,
        Anonymous: D3D12_RESOURCE_BARRIER_0 {
            Transition: ManuallyDrop::new(D3D12_RESOURCE_TRANSITION_BARRIER {
                pResource: unsafe { std::mem::transmute_copy(resource) },
                Subresource: D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES,
                StateBefore: before,
                StateAfter: after,
            }),
        },
        ..Default::default()
    }
}

#[cfg(debug_assertions)]
unsafe extern "system" fn debug_message_callback(
    _category_code: D3D12_MESSAGE_CATEGORY,
    severity_code: D3D12_MESSAGE_SEVERITY,
    _id: D3D12_MESSAGE_ID,
    description: windows::core::PCSTR,
    _context: *mut std::ffi::c_void,
) {
    let Ok(description) = (unsafe { description.to_string() }) else {
        tracing::warn!(severity = severity_code.0, "Failed to decode D3D12 debug layer message");
        return;
    };

    match severity_code {
        D3D12_MESSAGE_SEVERITY_CORRUPTION | D3D12_MESSAGE_SEVERITY_ERROR => {
            tracing::error!(target: "d3d12", "{description}")
        }
        D3D12_MESSAGE_SEVERITY_WARNING => tracing::warn!(target: "d3d12", "{description}"),
        D3D12_MESSAGE_SEVERITY_INFO => tracing::debug!(target: "d3d12", "{description}"),
        _ => tracing::trace!(target: "d3d12", "{description}"),
    }
}
