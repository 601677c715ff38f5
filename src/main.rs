use std::time::Duration;

use clap::Parser;
use framepace_rs::{AppConfig, FrameCounts};
use tracing_subscriber::EnvFilter;

/// Grid of spinning boxes, paced through a ring of frame resources
#[derive(Debug, Parser)]
struct Args {
    /// Frame resources in flight
    #[arg(long, default_value_t = 3)]
    frames: usize,

    /// Back buffers in the swapchain
    #[arg(long, default_value_t = 3)]
    back_buffers: u32,

    /// Boxes per row of the grid
    #[arg(long, default_value_t = 5)]
    grid: u32,

    #[arg(long, default_value_t = 1280)]
    width: u32,

    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Present without waiting for vertical sync
    #[arg(long)]
    no_vsync: bool,

    /// Give up waiting on a frame slot after this many milliseconds
    #[arg(long)]
    fence_timeout_ms: Option<u64>,
}

impl Args {
    fn config(&self) -> AppConfig {
        AppConfig {
            width: self.width,
            height: self.height,
            frame_resources: self.frames,
            swapchain_buffers: self.back_buffers,
            vsync: !self.no_vsync,
            fence_timeout: self.fence_timeout_ms.map(Duration::from_millis),
            ..AppConfig::default()
        }
        .with_title("Boxes")
        .with_counts(FrameCounts {
            pass: 1,
            object: self.grid * self.grid,
        })
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    #[cfg(windows)]
    {
        let config = args.config();
        let grid = args.grid;
        if let Err(error) = framepace_rs::run_app(config, |setup| boxes::Boxes::new(setup, grid)) {
            tracing::error!("{error}");
            std::process::exit(1);
        }
    }

    #[cfg(not(windows))]
    {
        tracing::error!(config = ?args.config(), "The Direct3D 12 demo only runs on Windows");
        std::process::exit(1);
    }
}

#[cfg(windows)]
mod boxes {
    use std::mem::ManuallyDrop;

    use bytemuck::{Pod, Zeroable};
    use framepace_rs::{App, AppFrame, BoxError, FrameContext, GPULib, Setup, UpdateContext};
    use nalgebra_glm as glm;
    use windows::Win32::Graphics::{
        Direct3D::D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST, Direct3D12::*, Dxgi::Common::*,
    };
    use windows::core::s;

    #[repr(C)]
    #[derive(Clone, Copy, Pod, Zeroable)]
    struct Vertex {
        position: [f32; 3],
        color: [f32; 4],
    }

    #[repr(C)]
    #[derive(Clone, Copy, Pod, Zeroable)]
    pub struct ObjectConstants {
        world: [[f32; 4]; 4],
    }

    #[repr(C)]
    #[derive(Clone, Copy, Pod, Zeroable)]
    pub struct PassConstants {
        view_projection: [[f32; 4]; 4],
        total_time: f32,
        delta_time: f32,
        padding: [f32; 2],
    }

    const CUBE_VERTICES: [Vertex; 8] = [
        Vertex { position: [-0.5, -0.5, -0.5], color: [1.0, 1.0, 1.0, 1.0] },
        Vertex { position: [-0.5, 0.5, -0.5], color: [0.0, 0.0, 0.0, 1.0] },
        Vertex { position: [0.5, 0.5, -0.5], color: [1.0, 0.0, 0.0, 1.0] },
        Vertex { position: [0.5, -0.5, -0.5], color: [0.0, 1.0, 0.0, 1.0] },
        Vertex { position: [-0.5, -0.5, 0.5], color: [0.0, 0.0, 1.0, 1.0] },
        Vertex { position: [-0.5, 0.5, 0.5], color: [1.0, 1.0, 0.0, 1.0] },
        Vertex { position: [0.5, 0.5, 0.5], color: [0.0, 1.0, 1.0, 1.0] },
        Vertex { position: [0.5, -0.5, 0.5], color: [1.0, 0.0, 1.0, 1.0] },
    ];

    #[rustfmt::skip]
    const CUBE_INDICES: [u16; 36] = [
        0, 1, 2, 0, 2, 3, // front
        4, 6, 5, 4, 7, 6, // back
        4, 5, 1, 4, 1, 0, // left
        3, 2, 6, 3, 6, 7, // right
        1, 5, 6, 1, 6, 2, // top
        4, 0, 3, 4, 3, 7, // bottom
    ];

    pub struct Boxes {
        root_signature: ID3D12RootSignature,
        pipeline: ID3D12PipelineState,
        vertex_buffer: ID3D12Resource,
        index_buffer: ID3D12Resource,
        grid: u32,
    }

    impl Boxes {
        pub fn new(setup: &mut Setup<Self>, grid: u32) -> Result<Self, BoxError> {
            let root_signature = create_root_signature(setup.lib)?;
            let pipeline = create_pipeline(setup.lib, root_signature.clone())?;
            let vertex_buffer = setup.create_default_buffer(&CUBE_VERTICES, "Cube vertices")?;
            let index_buffer = setup.create_default_buffer(&CUBE_INDICES, "Cube indices")?;

            Ok(Boxes {
                root_signature,
                pipeline,
                vertex_buffer,
                index_buffer,
                grid,
            })
        }

        fn box_count(&self) -> u32 {
            self.grid * self.grid
        }
    }

    fn create_root_signature(lib: &GPULib) -> Result<ID3D12RootSignature, BoxError> {
        let parameters = [0, 1].map(|register| D3D12_ROOT_PARAMETER {
            ParameterType: D3D12_ROOT_PARAMETER_TYPE_CBV,
            ShaderVisibility: D3D12_SHADER_VISIBILITY_ALL,
            Anonymous: D3D12_ROOT_PARAMETER_0 {
                Descriptor: D3D12_ROOT_DESCRIPTOR {
                    ShaderRegister: register,
                    RegisterSpace: 0,
                },
            },
        });

        let mut root_blob_option = None;
        unsafe {
            D3D12SerializeRootSignature(
                &D3D12_ROOT_SIGNATURE_DESC {
                    NumParameters: parameters.len() as u32,
                    pParameters: parameters.as_ptr(),
                    Flags: D3D12_ROOT_SIGNATURE_FLAG_ALLOW_INPUT_ASSEMBLER_INPUT_LAYOUT,
                    ..Default::default()
                },
                D3D_ROOT_SIGNATURE_VERSION_1,
                &mut root_blob_option,
                None,
            )
        }?;

        let root_blob = root_blob_option.ok_or("Failed to create root signature")?;
        let blob_data = unsafe {
            std::slice::from_raw_parts(
                root_blob.GetBufferPointer() as *const u8,
                root_blob.GetBufferSize(),
            )
        };

        let root_signature = unsafe { lib.device.CreateRootSignature(0, blob_data) }?;

        Ok(root_signature)
    }

    fn compile(entry_point: &str, target_profile: &str) -> Result<Vec<u8>, BoxError> {
        let mut shader = hassle_rs::compile_hlsl(
            "boxes.hlsl",
            include_str!("boxes.hlsl"),
            entry_point,
            target_profile,
            &[],
            &[],
        )?;
        if !hassle_rs::fake_sign_dxil_in_place(&mut shader) {
            return Err(format!("Failed to sign shader {entry_point}").into());
        }
        Ok(shader)
    }

    fn create_pipeline(
        lib: &GPULib,
        root_signature: ID3D12RootSignature,
    ) -> Result<ID3D12PipelineState, BoxError> {
        let vertex_shader = compile("VS_main", "vs_6_5")?;
        let pixel_shader = compile("PS_main", "ps_6_5")?;

        let input_elements = [
            D3D12_INPUT_ELEMENT_DESC {
                SemanticName: s!("POSITION"),
                SemanticIndex: 0,
                Format: DXGI_FORMAT_R32G32B32_FLOAT,
                InputSlot: 0,
                AlignedByteOffset: 0,
                InputSlotClass: D3D12_INPUT_CLASSIFICATION_PER_VERTEX_DATA,
                InstanceDataStepRate: 0,
            },
            D3D12_INPUT_ELEMENT_DESC {
                SemanticName: s!("COLOR"),
                SemanticIndex: 0,
                Format: DXGI_FORMAT_R32G32B32A32_FLOAT,
                InputSlot: 0,
                AlignedByteOffset: 12,
                InputSlotClass: D3D12_INPUT_CLASSIFICATION_PER_VERTEX_DATA,
                InstanceDataStepRate: 0,
            },
        ];

        let mut render_target_formats = [DXGI_FORMAT_UNKNOWN; 8];
        render_target_formats[0] = DXGI_FORMAT_R8G8B8A8_UNORM;

        let mut render_target_blends = [D3D12_RENDER_TARGET_BLEND_DESC::default(); 8];
        render_target_blends[0] = D3D12_RENDER_TARGET_BLEND_DESC {
            BlendEnable: false.into(),
            LogicOpEnable: false.into(),
            SrcBlend: D3D12_BLEND_ONE,
            DestBlend: D3D12_BLEND_ZERO,
            BlendOp: D3D12_BLEND_OP_ADD,
            SrcBlendAlpha: D3D12_BLEND_ONE,
            DestBlendAlpha: D3D12_BLEND_ZERO,
            BlendOpAlpha: D3D12_BLEND_OP_ADD,
            RenderTargetWriteMask: 0b1111,
            ..Default::default()
        };

        let pipeline_desc = D3D12_GRAPHICS_PIPELINE_STATE_DESC {
            pRootSignature: ManuallyDrop::new(Some(root_signature)),
            VS: D3D12_SHADER_BYTECODE {
                pShaderBytecode: vertex_shader.as_ptr() as _,
                BytecodeLength: vertex_shader.len(),
            },
            PS: D3D12_SHADER_BYTECODE {
                pShaderBytecode: pixel_shader.as_ptr() as _,
                BytecodeLength: pixel_shader.len(),
            },
            InputLayout: D3D12_INPUT_LAYOUT_DESC {
                pInputElementDescs: input_elements.as_ptr(),
                NumElements: input_elements.len() as u32,
            },
            RasterizerState: D3D12_RASTERIZER_DESC {
                FillMode: D3D12_FILL_MODE_SOLID,
                CullMode: D3D12_CULL_MODE_BACK,
                FrontCounterClockwise: false.into(),
                DepthBias: D3D12_DEFAULT_DEPTH_BIAS,
                DepthBiasClamp: D3D12_DEFAULT_DEPTH_BIAS_CLAMP,
                SlopeScaledDepthBias: D3D12_DEFAULT_SLOPE_SCALED_DEPTH_BIAS,
                DepthClipEnable: true.into(),
                MultisampleEnable: false.into(),
                AntialiasedLineEnable: false.into(),
                ForcedSampleCount: 0,
                ConservativeRaster: D3D12_CONSERVATIVE_RASTERIZATION_MODE_OFF,
            },
            BlendState: D3D12_BLEND_DESC {
                AlphaToCoverageEnable: false.into(),
                IndependentBlendEnable: false.into(),
                RenderTarget: render_target_blends,
            },
            DepthStencilState: D3D12_DEPTH_STENCIL_DESC {
                DepthEnable: true.into(),
                DepthWriteMask: D3D12_DEPTH_WRITE_MASK_ALL,
                DepthFunc: D3D12_COMPARISON_FUNC_LESS,
                ..Default::default()
            },
            SampleMask: u32::MAX,
            PrimitiveTopologyType: D3D12_PRIMITIVE_TOPOLOGY_TYPE_TRIANGLE,
            NumRenderTargets: 1,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            RTVFormats: render_target_formats,
            DSVFormat: framepace_rs::swapchain::DEPTH_FORMAT,
            ..Default::default()
        };
        let pipeline = unsafe { lib.device.CreateGraphicsPipelineState(&pipeline_desc)? };

        Ok(pipeline)
    }

    impl App for Boxes {
        type PassConstants = PassConstants;
        type ObjectConstants = ObjectConstants;

        fn update(
            &mut self,
            context: &UpdateContext,
            frame: &mut AppFrame<Self>,
        ) -> Result<(), BoxError> {
            let extent = self.grid as f32 * 1.5;
            let orbit = context.total_seconds * 0.2;
            let eye = glm::vec3(extent * orbit.cos(), extent * 0.8, extent * orbit.sin());
            let view = glm::look_at_lh(&eye, &glm::Vec3::zeros(), &glm::Vec3::y());
            let projection = glm::perspective_lh_zo(
                context.aspect_ratio,
                std::f32::consts::FRAC_PI_4,
                0.1,
                1000.0,
            );

            frame.pass_constants.write(
                0,
                &PassConstants {
                    view_projection: (projection * view).into(),
                    total_time: context.total_seconds,
                    delta_time: context.delta_seconds,
                    padding: [0.0; 2],
                },
            )?;

            let offset = (self.grid as f32 - 1.0) * 0.5;
            for index in 0..self.box_count() {
                let column = (index % self.grid) as f32 - offset;
                let row = (index / self.grid) as f32 - offset;
                let angle = context.total_seconds * (1.0 + index as f32 * 0.1);
                let world = glm::translation(&glm::vec3(column * 1.5, 0.0, row * 1.5))
                    * glm::rotation(angle, &glm::vec3(0.3, 1.0, 0.0).normalize());

                frame
                    .object_constants
                    .write(index as usize, &ObjectConstants { world: world.into() })?;
            }

            Ok(())
        }

        fn draw(
            &mut self,
            _lib: &GPULib,
            frame: &AppFrame<Self>,
            context: &FrameContext,
        ) -> Result<(), BoxError> {
            let command_list = context.command_list;
            unsafe {
                command_list.ClearRenderTargetView(
                    context.render_target_handle,
                    &[0.69, 0.77, 0.87, 1.0],
                    None,
                );
                command_list.ClearDepthStencilView(
                    context.depth_handle,
                    D3D12_CLEAR_FLAG_DEPTH,
                    1.0,
                    0,
                    None,
                );
                command_list.OMSetRenderTargets(
                    1,
                    Some(&context.render_target_handle),
                    false,
                    Some(&context.depth_handle),
                );
                command_list.RSSetViewports(&[context.viewport]);
                command_list.RSSetScissorRects(&[context.scissor]);
                command_list.SetGraphicsRootSignature(&self.root_signature);
                command_list.SetPipelineState(&self.pipeline);
                command_list.IASetPrimitiveTopology(D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST);
                command_list.IASetVertexBuffers(
                    0,
                    Some(&[D3D12_VERTEX_BUFFER_VIEW {
                        BufferLocation: self.vertex_buffer.GetGPUVirtualAddress(),
                        SizeInBytes: size_of_val(&CUBE_VERTICES) as u32,
                        StrideInBytes: size_of::<Vertex>() as u32,
                    }]),
                );
                command_list.IASetIndexBuffer(Some(&D3D12_INDEX_BUFFER_VIEW {
                    BufferLocation: self.index_buffer.GetGPUVirtualAddress(),
                    SizeInBytes: size_of_val(&CUBE_INDICES) as u32,
                    Format: DXGI_FORMAT_R16_UINT,
                }));
                command_list
                    .SetGraphicsRootConstantBufferView(1, frame.pass_constants.element_address(0));

                for index in 0..self.box_count() as usize {
                    command_list.SetGraphicsRootConstantBufferView(
                        0,
                        frame.object_constants.element_address(index),
                    );
                    command_list.DrawIndexedInstanced(CUBE_INDICES.len() as u32, 1, 0, 0, 0);
                }
            }
            Ok(())
        }
    }
}
