// Graphics pipeline description and layout
//
// Describes the fixed-function state and shader stages of the triangle
// pipeline and creates its layout. Viewport and scissor are dynamic state,
// supplied per draw from the current extent, so a resize does not invalidate
// anything built here.

use ash::vk;
use std::ffi::CStr;
use std::sync::Arc;

use super::device::Device;
use super::error::{BootstrapError, Result, Stage};
use super::shader::{ShaderBinary, ShaderModule};

const SHADER_ENTRY_POINT: &CStr = c"main";

const DYNAMIC_STATES: [vk::DynamicState; 2] = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];

/// Fixed-function settings of the graphics pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedFunctionState {
    pub topology: vk::PrimitiveTopology,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub samples: vk::SampleCountFlags,
    pub depth_test: bool,
    pub blend: bool,
}

impl Default for FixedFunctionState {
    fn default() -> Self {
        Self {
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::CLOCKWISE,
            samples: vk::SampleCountFlags::TYPE_1,
            depth_test: false,
            blend: false,
        }
    }
}

impl FixedFunctionState {
    pub fn dynamic_states(&self) -> &'static [vk::DynamicState] {
        &DYNAMIC_STATES
    }

    pub fn input_assembly(&self) -> vk::PipelineInputAssemblyStateCreateInfo<'static> {
        vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(self.topology)
            .primitive_restart_enable(false)
    }

    pub fn rasterization(&self) -> vk::PipelineRasterizationStateCreateInfo<'static> {
        vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(self.polygon_mode)
            .line_width(1.0)
            .cull_mode(self.cull_mode)
            .front_face(self.front_face)
            .depth_bias_enable(false)
    }

    pub fn multisample(&self) -> vk::PipelineMultisampleStateCreateInfo<'static> {
        vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(self.samples)
    }

    pub fn depth_stencil(&self) -> vk::PipelineDepthStencilStateCreateInfo<'static> {
        vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(self.depth_test)
            .depth_write_enable(self.depth_test)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false)
    }

    /// Single opaque color attachment
    pub fn color_blend_attachment(&self) -> vk::PipelineColorBlendAttachmentState {
        vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(self.blend)
    }

    /// Viewport covering `extent`, set at record time.
    pub fn viewport(extent: vk::Extent2D) -> vk::Viewport {
        vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    /// Scissor covering `extent`, set at record time.
    pub fn scissor(extent: vk::Extent2D) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        }
    }
}

/// Pipeline layout plus the description the pipeline will be built from.
pub struct PipelineLayout {
    pub handle: vk::PipelineLayout,
    pub state: FixedFunctionState,
    /// Extent the layout was described for; the pipeline itself does not
    /// depend on it.
    pub extent: vk::Extent2D,
    device: Arc<Device>,
}

impl PipelineLayout {
    pub fn new(
        device: Arc<Device>,
        vertex: &ShaderBinary,
        fragment: &ShaderBinary,
        extent: vk::Extent2D,
        state: FixedFunctionState,
    ) -> Result<Self> {
        // Modules only need to outlive this call
        let vert_module = ShaderModule::new(&device.handle, vertex)?;
        let frag_module = ShaderModule::new(&device.handle, fragment)?;

        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vert_module.handle)
                .name(SHADER_ENTRY_POINT),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(frag_module.handle)
                .name(SHADER_ENTRY_POINT),
        ];

        // Vertices are generated in the vertex shader
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default();
        let input_assembly = state.input_assembly();
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);
        let rasterizer = state.rasterization();
        let multisampling = state.multisample();
        let depth_stencil = state.depth_stencil();
        let color_blend_attachments = [state.color_blend_attachment()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(state.dynamic_states());

        // No descriptor sets or push constants yet
        let layout_info = vk::PipelineLayoutCreateInfo::default();

        let handle = unsafe { device.handle.create_pipeline_layout(&layout_info, None) }
            .map_err(BootstrapError::driver(Stage::PipelineLayout))?;

        // Everything but the render pass; that stage is not built yet.
        let description = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(handle);

        log::info!(
            "Pipeline layout created: {} shader stages, {:?} {:?}, cull {:?}, front face {:?}, {} dynamic states",
            description.stage_count,
            state.topology,
            state.polygon_mode,
            state.cull_mode,
            state.front_face,
            dynamic_state.dynamic_state_count
        );

        Ok(Self {
            handle,
            state,
            extent,
            device: Arc::clone(&device),
        })
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.handle.destroy_pipeline_layout(self.handle, None);
        }
    }
}
