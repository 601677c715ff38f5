use std::{ffi::c_void, sync::Arc};

use windows::Win32::Foundation::{HWND, RECT};
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;
use windows::Win32::Graphics::Dxgi::*;
use windows::core::{HSTRING, Interface};
use winit::{
    raw_window_handle::{HasWindowHandle, RawWindowHandle},
    window::Window,
};

use crate::GPULib;
use crate::error::{Error, Result};

const BACK_BUFFER_FORMAT: DXGI_FORMAT = DXGI_FORMAT_R8G8B8A8_UNORM;
pub const DEPTH_FORMAT: DXGI_FORMAT = DXGI_FORMAT_D32_FLOAT;

/// Presentation surface. Its back buffer index advances on every present,
/// independently of the frame ring.
pub struct Swapchain {
    pub render_target_heap: ID3D12DescriptorHeap,
    pub render_target_heap_srgb: ID3D12DescriptorHeap,
    pub depth_heap: ID3D12DescriptorHeap,
    pub render_targets: Vec<ID3D12Resource>,
    pub depth_buffer: ID3D12Resource,
    pub swapchain: IDXGISwapChain4,
    pub window: Arc<Window>,
    pub viewport: D3D12_VIEWPORT,
    pub scissor: RECT,
    frame_count: u32,
    rtv_descriptor_size: usize,
    lib: Arc<GPULib>,
}

impl Swapchain {
    pub fn new(
        lib: Arc<GPULib>,
        window: Arc<Window>,
        width: u32,
        height: u32,
        frame_count: u32,
    ) -> Result<Self> {
        let RawWindowHandle::Win32(window_handle) = window
            .window_handle()
            .map_err(|_| Error::Missing("window handle"))?
            .as_raw()
        else {
            return Err(Error::Missing("Win32 window handle"));
        };

        let desc = DXGI_SWAP_CHAIN_DESC1 {
            Width: width,
            Height: height,
            Format: BACK_BUFFER_FORMAT,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
            BufferCount: frame_count,
            SwapEffect: DXGI_SWAP_EFFECT_FLIP_DISCARD,
            Scaling: DXGI_SCALING_STRETCH,
            AlphaMode: DXGI_ALPHA_MODE_IGNORE,
            ..Default::default()
        };

        let swapchain: IDXGISwapChain4 = unsafe {
            lib.factory.CreateSwapChainForHwnd(
                &lib.queue,
                HWND(window_handle.hwnd.get() as *mut c_void),
                &desc,
                None,
                None,
            )
        }?
        .cast()?;

        let render_target_heap = create_heap(&lib, D3D12_DESCRIPTOR_HEAP_TYPE_RTV, frame_count)?;
        let render_target_heap_srgb =
            create_heap(&lib, D3D12_DESCRIPTOR_HEAP_TYPE_RTV, frame_count)?;
        let depth_heap = create_heap(&lib, D3D12_DESCRIPTOR_HEAP_TYPE_DSV, 1)?;

        let rtv_descriptor_size = unsafe {
            lib.device
                .GetDescriptorHandleIncrementSize(D3D12_DESCRIPTOR_HEAP_TYPE_RTV)
        } as usize;

        let render_targets = create_render_targets(
            &lib,
            &swapchain,
            &render_target_heap,
            &render_target_heap_srgb,
            rtv_descriptor_size,
            frame_count,
        )?;
        let depth_buffer = create_depth_buffer(&lib, &depth_heap, width, height)?;

        Ok(Swapchain {
            lib,
            swapchain,
            window,
            render_target_heap,
            render_target_heap_srgb,
            depth_heap,
            depth_buffer,
            viewport: viewport(width, height),
            scissor: scissor(width, height),
            render_targets,
            frame_count,
            rtv_descriptor_size,
        })
    }

    /// Recreates the back buffers and the depth buffer.
    /// The GPU must not reference any of them anymore, so flush the queue first.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        // Every reference to a back buffer has to be released before ResizeBuffers
        self.render_targets.clear();

        unsafe {
            self.swapchain.ResizeBuffers(
                self.frame_count,
                width,
                height,
                BACK_BUFFER_FORMAT,
                DXGI_SWAP_CHAIN_FLAG(0),
            )
        }?;

        self.render_targets = create_render_targets(
            &self.lib,
            &self.swapchain,
            &self.render_target_heap,
            &self.render_target_heap_srgb,
            self.rtv_descriptor_size,
            self.frame_count,
        )?;
        self.depth_buffer = create_depth_buffer(&self.lib, &self.depth_heap, width, height)?;
        self.viewport = viewport(width, height);
        self.scissor = scissor(width, height);

        tracing::info!(width, height, "Resized swapchain");
        Ok(())
    }

    pub fn present(&self, vsync: bool) -> Result<()> {
        let sync_interval = if vsync { 1 } else { 0 };
        unsafe { self.swapchain.Present(sync_interval, DXGI_PRESENT::default()) }.ok()?;
        Ok(())
    }

    fn current_index(&self) -> usize {
        unsafe { self.swapchain.GetCurrentBackBufferIndex() as usize }
    }

    pub fn current_render_target(&self) -> &ID3D12Resource {
        &self.render_targets[self.current_index()]
    }

    /// Returns the UNORM and UNORM_SRGB handles to the current render target
    pub fn current_render_target_handle(
        &self,
    ) -> (D3D12_CPU_DESCRIPTOR_HANDLE, D3D12_CPU_DESCRIPTOR_HANDLE) {
        let offset = self.rtv_descriptor_size * self.current_index();
        unsafe {
            (
                D3D12_CPU_DESCRIPTOR_HANDLE {
                    ptr: self.render_target_heap.GetCPUDescriptorHandleForHeapStart().ptr + offset,
                },
                D3D12_CPU_DESCRIPTOR_HANDLE {
                    ptr: self
                        .render_target_heap_srgb
                        .GetCPUDescriptorHandleForHeapStart()
                        .ptr
                        + offset,
                },
            )
        }
    }

    pub fn depth_handle(&self) -> D3D12_CPU_DESCRIPTOR_HANDLE {
        unsafe { self.depth_heap.GetCPUDescriptorHandleForHeapStart() }
    }
}

fn create_heap(
    lib: &GPULib,
    heap_type: D3D12_DESCRIPTOR_HEAP_TYPE,
    count: u32,
) -> Result<ID3D12DescriptorHeap> {
    let heap = unsafe {
        lib.device
            .CreateDescriptorHeap(&D3D12_DESCRIPTOR_HEAP_DESC {
                NumDescriptors: count,
                Type: heap_type,
                ..Default::default()
            })
    }?;
    Ok(heap)
}

fn create_render_targets(
    lib: &GPULib,
    swapchain: &IDXGISwapChain4,
    render_target_heap: &ID3D12DescriptorHeap,
    render_target_heap_srgb: &ID3D12DescriptorHeap,
    rtv_descriptor_size: usize,
    frame_count: u32,
) -> Result<Vec<ID3D12Resource>> {
    (0..frame_count)
        .map(|frame| -> Result<ID3D12Resource> {
            let render_target: ID3D12Resource = unsafe { swapchain.GetBuffer(frame) }?;
            let offset = frame as usize * rtv_descriptor_size;

            unsafe {
                lib.device.CreateRenderTargetView(
                    &render_target,
                    None,
                    D3D12_CPU_DESCRIPTOR_HANDLE {
                        ptr: render_target_heap.GetCPUDescriptorHandleForHeapStart().ptr + offset,
                    },
                );
                lib.device.CreateRenderTargetView(
                    &render_target,
                    Some(&D3D12_RENDER_TARGET_VIEW_DESC {
                        Format: DXGI_FORMAT_R8G8B8A8_UNORM_SRGB,
                        ViewDimension: D3D12_RTV_DIMENSION_TEXTURE2D,
                        Anonymous: D3D12_RENDER_TARGET_VIEW_DESC_0 {
                            Texture2D: D3D12_TEX2D_RTV {
                                MipSlice: 0,
                                PlaneSlice: 0,
                            },
                        },
                    }),
                    D3D12_CPU_DESCRIPTOR_HANDLE {
                        ptr: render_target_heap_srgb
                            .GetCPUDescriptorHandleForHeapStart()
                            .ptr
                            + offset,
                    },
                );

                render_target.SetName(&HSTRING::from(format!("Back buffer {}", frame)))?;
            }

            Ok(render_target)
        })
        .collect()
}

fn create_depth_buffer(
    lib: &GPULib,
    depth_heap: &ID3D12DescriptorHeap,
    width: u32,
    height: u32,
) -> Result<ID3D12Resource> {
    let heap_properties = D3D12_HEAP_PROPERTIES {
        Type: D3D12_HEAP_TYPE_DEFAULT,
        ..Default::default()
    };

    let resource_desc = D3D12_RESOURCE_DESC {
        Dimension: D3D12_RESOURCE_DIMENSION_TEXTURE2D,
        Width: width.max(1) as u64,
        Height: height.max(1),
        DepthOrArraySize: 1,
        Alignment: 0,
        MipLevels: 1,
        Format: DEPTH_FORMAT,
        SampleDesc: DXGI_SAMPLE_DESC {
            Count: 1,
            Quality: 0,
        },
        Layout: D3D12_TEXTURE_LAYOUT_UNKNOWN,
        Flags: D3D12_RESOURCE_FLAG_ALLOW_DEPTH_STENCIL,
    };

    let clear_value = D3D12_CLEAR_VALUE {
        Format: DEPTH_FORMAT,
        Anonymous: D3D12_CLEAR_VALUE_0 {
            DepthStencil: D3D12_DEPTH_STENCIL_VALUE {
                Depth: 1.0,
                Stencil: 0,
            },
        },
    };

    let mut resource_option: Option<ID3D12Resource> = None;
    unsafe {
        lib.device.CreateCommittedResource(
            &heap_properties,
            D3D12_HEAP_FLAGS::default(),
            &resource_desc,
            D3D12_RESOURCE_STATE_DEPTH_WRITE,
            Some(&clear_value),
            &mut resource_option,
        )
    }?;
    let depth_buffer = resource_option.ok_or(Error::Missing("depth buffer"))?;

    unsafe {
        depth_buffer.SetName(&HSTRING::from("Depth buffer"))?;
        lib.device.CreateDepthStencilView(
            &depth_buffer,
            None,
            depth_heap.GetCPUDescriptorHandleForHeapStart(),
        );
    }

    Ok(depth_buffer)
}

fn viewport(width: u32, height: u32) -> D3D12_VIEWPORT {
    D3D12_VIEWPORT {
        TopLeftX: 0.0,
        TopLeftY: 0.0,
        Width: width as f32,
        Height: height as f32,
        MinDepth: 0.0,
        MaxDepth: 1.0,
    }
}

fn scissor(width: u32, height: u32) -> RECT {
    RECT {
        left: 0,
        top: 0,
        right: width as i32,
        bottom: height as i32,
    }
}
