use std::sync::Arc;

use windows::Win32::Graphics::Direct3D12::*;
use windows::core::Interface;
use winit::event::WindowEvent;
use winit::window::Window;

use crate::app::{App, AppFrame, BoxError, FrameContext, Setup, UpdateContext};
use crate::config::AppConfig;
use crate::fence::{QueueFence, WaitOutcome};
use crate::frame_resource::FrameResource;
use crate::frame_ring::{FrameRing, SlotState};
use crate::gpulib::{GPULib, transition};
use crate::swapchain::Swapchain;
use crate::sync::FrameSync;
use crate::timer::{FrameStats, Timer};

pub struct RunningState<T: App> {
    lib: Arc<GPULib>,
    app: T,
    config: AppConfig,
    swapchain: Swapchain,
    command_list: ID3D12GraphicsCommandList,
    sync: FrameSync<QueueFence, AppFrame<T>>,
    timer: Timer,
    stats: FrameStats,
    minimized: bool,
}

impl<T: App> RunningState<T> {
    pub fn new(
        window: Window,
        lib: Arc<GPULib>,
        config: AppConfig,
        app_creator: impl FnOnce(&mut Setup<T>) -> Result<T, BoxError>,
    ) -> Result<Self, BoxError> {
        let window = Arc::new(window);
        let window_size = window.inner_size();
        let swapchain = Swapchain::new(
            lib.clone(),
            window.clone(),
            window_size.width,
            window_size.height,
            config.swapchain_buffers,
        )?;

        let ring = FrameRing::try_from_fn(config.frame_resources, |frame| {
            FrameResource::new(&lib, config.counts, frame)
        })?;
        let mut sync = FrameSync::new(lib.create_queue_fence("Frame fence")?, ring)
            .with_timeout(config.fence_timeout);

        let command_list = lib.create_command_list("Frame command list")?;

        let app = app_creator(&mut Setup {
            lib: &lib,
            config: &config,
            command_list: &command_list,
            sync: &mut sync,
        })?;

        tracing::info!(
            frame_resources = config.frame_resources,
            swapchain_buffers = config.swapchain_buffers,
            "Render loop initialized"
        );

        Ok(RunningState {
            lib,
            app,
            config,
            swapchain,
            command_list,
            sync,
            timer: Timer::new(),
            stats: FrameStats::default(),
            minimized: false,
        })
    }

    /// One tick: write the current slot, record and submit it, then move on to the next slot
    pub fn draw(&mut self) -> Result<(), BoxError> {
        if self.minimized {
            return Ok(());
        }

        // Only after a timed out wait in the previous tick
        if self.sync.current_slot().state == SlotState::Submitted
            && self.sync.wait_current(self.config.fence_timeout)? == WaitOutcome::TimedOut
        {
            tracing::warn!(
                frame = self.sync.current_index(),
                "GPU is still using the frame slot, skipping this tick"
            );
            self.swapchain.window.request_redraw();
            return Ok(());
        }

        self.timer.tick();
        if let Some((fps, frame_time)) = self.stats.frame(self.timer.total_seconds()) {
            self.swapchain.window.set_title(&format!(
                "{}  fps: {fps:.1}  frame time: {frame_time:.3} ms",
                self.config.title
            ));
        }

        let update_context = UpdateContext {
            total_seconds: self.timer.total_seconds(),
            delta_seconds: self.timer.delta_seconds(),
            frame_index: self.sync.current_index(),
            aspect_ratio: self.swapchain.viewport.Width / self.swapchain.viewport.Height.max(1.0),
        };

        let frame = self.sync.current_mut()?;
        frame.reset_allocator()?;
        self.app.update(&update_context, frame)?;

        let frame = self.sync.current();
        let command_list = &self.command_list;
        unsafe {
            command_list.Reset(&frame.command_allocator, None)?;
            command_list.ResourceBarrier(&[transition(
                self.swapchain.current_render_target(),
                D3D12_RESOURCE_STATE_PRESENT,
                D3D12_RESOURCE_STATE_RENDER_TARGET,
            )]);
        }

        let (render_target_handle, render_target_handle_srgb) =
            self.swapchain.current_render_target_handle();

        let frame_context = FrameContext {
            command_list,
            render_target: self.swapchain.current_render_target(),
            render_target_handle,
            render_target_handle_srgb,
            depth_handle: self.swapchain.depth_handle(),
            viewport: self.swapchain.viewport,
            scissor: self.swapchain.scissor,
        };
        self.app.draw(&self.lib, frame, &frame_context)?;

        unsafe {
            command_list.ResourceBarrier(&[transition(
                self.swapchain.current_render_target(),
                D3D12_RESOURCE_STATE_RENDER_TARGET,
                D3D12_RESOURCE_STATE_PRESENT,
            )]);

            command_list.Close()?;
            self.lib
                .queue
                .ExecuteCommandLists(&[Some(command_list.cast()?)]);
        }
        self.sync.note_enqueued();

        // Present operation will be appended to the main queue, so the slot's signal follows it
        self.swapchain.present(self.config.vsync)?;
        self.sync.submit_frame()?;

        // A timeout here is picked up at the start of the next tick
        self.sync.advance_frame_timeout(self.config.fence_timeout)?;
        self.swapchain.window.request_redraw();

        Ok(())
    }

    pub fn event(&mut self, event: &WindowEvent) -> Result<(), BoxError> {
        match event {
            WindowEvent::Resized(size) => {
                if size.width == 0 || size.height == 0 {
                    self.minimized = true;
                    return Ok(());
                }
                self.minimized = false;

                // The back buffers may still be referenced by frames in flight
                self.sync.flush_all()?;
                self.swapchain.resize(size.width, size.height)?;
                self.app.resized(size.width, size.height);
                self.swapchain.window.request_redraw();
            }
            WindowEvent::Focused(false) => self.timer.stop(),
            WindowEvent::Focused(true) => self.timer.start(),
            _ => {}
        }

        Ok(())
    }
}

impl<T: App> Drop for RunningState<T> {
    fn drop(&mut self) {
        // Buffers of every slot must outlive the command lists reading them
        if let Err(error) = self.sync.flush_all() {
            tracing::error!("Failed to drain the GPU queue on shutdown: {error}");
        }
    }
}
