use std::cell::OnceCell;
use std::sync::Arc;

use windows::{
    Win32::{
        Foundation::RECT,
        Graphics::Direct3D12::*,
        UI::WindowsAndMessaging::{MB_ICONERROR, MessageBoxW},
    },
    core::{HSTRING, Interface, h},
};
use winit::{
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::WindowAttributes,
};

use crate::config::AppConfig;
use crate::fence::QueueFence;
use crate::frame_resource::FrameResource;
use crate::gpulib::{GPULib, transition};
use crate::running_state::RunningState;
use crate::sync::FrameSync;

pub type BoxError = Box<dyn std::error::Error>;

/// Per-frame resources of an app, one set per ring slot
pub type AppFrame<T> = FrameResource<<T as App>::PassConstants, <T as App>::ObjectConstants>;

/// Everything a frame records into
pub struct FrameContext<'a> {
    pub command_list: &'a ID3D12GraphicsCommandList,
    pub render_target: &'a ID3D12Resource,
    pub render_target_handle: D3D12_CPU_DESCRIPTOR_HANDLE,
    pub render_target_handle_srgb: D3D12_CPU_DESCRIPTOR_HANDLE,
    pub depth_handle: D3D12_CPU_DESCRIPTOR_HANDLE,
    pub viewport: D3D12_VIEWPORT,
    pub scissor: RECT,
}

pub struct UpdateContext {
    pub total_seconds: f32,
    pub delta_seconds: f32,
    /// Ring slot the frame is written to
    pub frame_index: usize,
    pub aspect_ratio: f32,
}

pub trait App {
    type PassConstants: bytemuck::Pod;
    type ObjectConstants: bytemuck::Pod;

    /// Writes the frame's constants. The GPU has released `frame` before this is called.
    fn update(&mut self, context: &UpdateContext, frame: &mut AppFrame<Self>) -> Result<(), BoxError>;

    fn draw(
        &mut self,
        lib: &GPULib,
        frame: &AppFrame<Self>,
        context: &FrameContext,
    ) -> Result<(), BoxError>;

    fn resized(&mut self, _width: u32, _height: u32) {}
}

/// Handed to the app creator for one-off GPU work before the first frame
pub struct Setup<'a, T: App> {
    pub lib: &'a Arc<GPULib>,
    pub config: &'a AppConfig,
    pub(crate) command_list: &'a ID3D12GraphicsCommandList,
    pub(crate) sync: &'a mut FrameSync<QueueFence, AppFrame<T>>,
}

impl<T: App> Setup<'_, T> {
    /// Copies `data` into a new default heap buffer and waits until the copy has finished
    pub fn create_default_buffer<V: bytemuck::Pod>(
        &mut self,
        data: &[V],
        name: &str,
    ) -> Result<ID3D12Resource, BoxError> {
        let bytes: &[u8] = bytemuck::cast_slice(data);

        let buffer = self.lib.create_buffer(
            D3D12_HEAP_TYPE_DEFAULT,
            bytes.len(),
            D3D12_RESOURCE_STATE_COMMON,
            name,
        )?;
        let staging = self.lib.create_buffer(
            D3D12_HEAP_TYPE_UPLOAD,
            bytes.len(),
            D3D12_RESOURCE_STATE_GENERIC_READ,
            &format!("{name} staging"),
        )?;

        unsafe {
            let mut pointer = std::ptr::null_mut();
            staging.Map(0, None, Some(&mut pointer))?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), pointer as *mut u8, bytes.len());
            staging.Unmap(0, None);
        }

        let allocator = self
            .lib
            .create_command_allocator(&format!("{name} upload allocator"))?;
        unsafe {
            self.command_list.Reset(&allocator, None)?;
            // Buffers are promoted from COMMON to COPY_DEST by the copy itself
            self.command_list
                .CopyBufferRegion(&buffer, 0, &staging, 0, bytes.len() as u64);
            self.command_list.ResourceBarrier(&[transition(
                &buffer,
                D3D12_RESOURCE_STATE_COPY_DEST,
                D3D12_RESOURCE_STATE_GENERIC_READ,
            )]);
            self.command_list.Close()?;
            self.lib
                .queue
                .ExecuteCommandLists(&[Some(self.command_list.cast()?)]);
        }

        // The staging buffer and the allocator have to outlive the copy
        self.sync.note_enqueued();
        self.sync.flush_all()?;

        Ok(buffer)
    }
}

/// The winit application struct
struct AppRunner<T, F> {
    config: AppConfig,
    /// The function used to create the app once the window can be created
    app_creator: Option<F>,
    /// The state of the application, which gets populated when the winit resume method is executed
    running_state: OnceCell<RunningState<T>>,
}

impl<T, F> AppRunner<T, F>
where
    T: App,
    F: FnOnce(&mut Setup<T>) -> Result<T, BoxError>,
{
    fn try_initialize_app(&mut self, event_loop: &ActiveEventLoop) -> Result<(), BoxError> {
        let attributes = WindowAttributes::default()
            .with_title(self.config.title.clone())
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));
        let window = event_loop.create_window(attributes)?;
        let lib = Arc::new(GPULib::new()?);
        let app_creator = self
            .app_creator
            .take()
            .ok_or("Application cannot be initialized twice")?;
        let running_state = RunningState::new(window, lib, self.config.clone(), app_creator)?;

        self.running_state
            .set(running_state)
            .map_err(|_| "Application cannot be initialized twice")?;

        Ok(())
    }
}

impl<T, F> winit::application::ApplicationHandler for AppRunner<T, F>
where
    T: App,
    F: FnOnce(&mut Setup<T>) -> Result<T, BoxError>,
{
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        // Only create the running state once
        if self.running_state.get().is_some() {
            return;
        }

        if let Err(error) = self.try_initialize_app(event_loop) {
            let error_message = format!("{}", error);
            tracing::error!("Error while initializing application: {error_message}");
            unsafe {
                MessageBoxW(
                    None,
                    &HSTRING::from(error_message),
                    h!("Error while initializing application"),
                    MB_ICONERROR,
                )
            };
            event_loop.exit();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let Some(running_state) = self.running_state.get_mut() else {
            return;
        };

        let result = match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
                Ok(())
            }
            WindowEvent::RedrawRequested => running_state.draw(),
            event => running_state.event(&event),
        };

        // Device and queue failures leave nothing to recover
        if let Err(error) = result {
            tracing::error!("Fatal error in render loop: {error}");
            event_loop.exit();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // Drops the running state, which drains the GPU queue first
        self.running_state.take();
    }
}

/// The app_creator function creates the user-defined application struct. It may upload static
/// data through the `Setup` before the first frame.
pub fn run_app<T: App>(
    config: AppConfig,
    app_creator: impl FnOnce(&mut Setup<T>) -> Result<T, BoxError>,
) -> Result<(), BoxError> {
    let event_loop = EventLoop::new()?;
    event_loop.run_app(&mut AppRunner {
        config,
        app_creator: Some(app_creator),
        running_state: OnceCell::new(),
    })?;

    Ok(())
}
