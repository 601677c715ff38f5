use windows::Win32::Graphics::Direct3D12::ID3D12CommandAllocator;

use crate::config::FrameCounts;
use crate::constant_buffer::ConstantBuffer;
use crate::error::Result;
use crate::gpulib::GPULib;

/// Everything the CPU rewrites each frame. One of these lives in every slot of the frame ring.
pub struct FrameResource<P, O> {
    pub command_allocator: ID3D12CommandAllocator,
    pub pass_constants: ConstantBuffer<P>,
    pub object_constants: ConstantBuffer<O>,
}

impl<P: bytemuck::Pod, O: bytemuck::Pod> FrameResource<P, O> {
    pub fn new(lib: &GPULib, counts: FrameCounts, frame: usize) -> Result<Self> {
        Ok(FrameResource {
            command_allocator: lib
                .create_command_allocator(&format!("Frame {frame} command allocator"))?,
            pass_constants: ConstantBuffer::new(
                lib,
                counts.pass as usize,
                &format!("Frame {frame} pass constants"),
            )?,
            object_constants: ConstantBuffer::new(
                lib,
                counts.object as usize,
                &format!("Frame {frame} object constants"),
            )?,
        })
    }
}

impl<P, O> FrameResource<P, O> {
    /// Only valid once the GPU finished every command list recorded from this allocator
    pub fn reset_allocator(&self) -> Result<()> {
        unsafe { self.command_allocator.Reset() }?;
        Ok(())
    }
}
