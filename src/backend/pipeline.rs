// Graphics pipeline and render pass
//
// The pipeline is fully static: viewport and scissor are baked in from the
// swapchain extent, so a resize means building a new one. There is no vertex
// input; geometry comes from the vertex shader itself.

use ash::vk;
use std::ffi::CStr;

use super::shader::{create_shader_module, ShaderBinaries, ENTRY_POINT};
use super::{Backend, Resource, ResourceLedger};
use crate::error::{InitError, InitResult};

/// Single color attachment that is cleared, rendered to, then presented.
#[derive(Debug, Clone, Copy)]
pub struct RenderPassDescription {
    color_attachment: vk::AttachmentDescription,
    color_reference: vk::AttachmentReference,
    dependencies: [vk::SubpassDependency; 2],
}

impl RenderPassDescription {
    pub fn presentable(format: vk::Format) -> Self {
        let color_attachment = vk::AttachmentDescription::builder()
            .format(format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .build();

        let color_reference = vk::AttachmentReference::builder()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .build();

        // UNDEFINED -> COLOR_ATTACHMENT_OPTIMAL: the image must be released by
        // whoever read it last before the subpass writes to it.
        let acquire = vk::SubpassDependency::builder()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::BOTTOM_OF_PIPE)
            .src_access_mask(vk::AccessFlags::MEMORY_READ)
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            )
            .build();

        // COLOR_ATTACHMENT_OPTIMAL -> PRESENT_SRC_KHR: writes finish before presentation reads.
        let release = vk::SubpassDependency::builder()
            .src_subpass(0)
            .dst_subpass(vk::SUBPASS_EXTERNAL)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            )
            .dst_stage_mask(vk::PipelineStageFlags::BOTTOM_OF_PIPE)
            .dst_access_mask(vk::AccessFlags::MEMORY_READ)
            .build();

        Self {
            color_attachment,
            color_reference,
            dependencies: [acquire, release],
        }
    }

    pub fn color_attachment(&self) -> &vk::AttachmentDescription {
        &self.color_attachment
    }

    pub fn color_reference(&self) -> &vk::AttachmentReference {
        &self.color_reference
    }

    pub fn dependencies(&self) -> &[vk::SubpassDependency; 2] {
        &self.dependencies
    }
}

pub fn create_render_pass<B: Backend + ?Sized>(
    backend: &mut B,
    ledger: &mut ResourceLedger,
    format: vk::Format,
) -> InitResult<vk::RenderPass> {
    let render_pass = backend
        .create_render_pass(&RenderPassDescription::presentable(format))
        .map_err(InitError::RenderPassCreation)?;
    ledger.record(Resource::RenderPass(render_pass));

    log::info!("Created render pass ({:?})", format);
    Ok(render_pass)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderStage {
    pub stage: vk::ShaderStageFlags,
    pub module: vk::ShaderModule,
    pub entry_point: &'static CStr,
}

/// Every piece of state the graphics pipeline is created from.
///
/// Built once and never modified; a different requirement means a new
/// description.
#[derive(Debug, Clone)]
pub struct PipelineDescription {
    stages: [ShaderStage; 2],
    input_assembly: vk::PipelineInputAssemblyStateCreateInfo,
    viewport: vk::Viewport,
    scissor: vk::Rect2D,
    rasterization: vk::PipelineRasterizationStateCreateInfo,
    multisample: vk::PipelineMultisampleStateCreateInfo,
    color_blend_attachment: vk::PipelineColorBlendAttachmentState,
    layout: vk::PipelineLayout,
    render_pass: vk::RenderPass,
}

impl PipelineDescription {
    pub fn new(
        vertex: vk::ShaderModule,
        fragment: vk::ShaderModule,
        extent: vk::Extent2D,
        layout: vk::PipelineLayout,
        render_pass: vk::RenderPass,
    ) -> Self {
        let stages = [
            ShaderStage {
                stage: vk::ShaderStageFlags::VERTEX,
                module: vertex,
                entry_point: ENTRY_POINT,
            },
            ShaderStage {
                stage: vk::ShaderStageFlags::FRAGMENT,
                module: fragment,
                entry_point: ENTRY_POINT,
            },
        ];

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false)
            .build();

        let viewport = vk::Viewport::builder()
            .x(0.0)
            .y(0.0)
            .width(extent.width as f32)
            .height(extent.height as f32)
            .min_depth(0.0)
            .max_depth(1.0)
            .build();

        let scissor = vk::Rect2D::builder()
            .offset(vk::Offset2D { x: 0, y: 0 })
            .extent(extent)
            .build();

        let rasterization = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::CLOCKWISE)
            .depth_bias_enable(false)
            .build();

        let multisample = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .build();

        // Standard alpha blending:
        // color = src * src.a + dst * (1 - src.a), alpha = src.a
        let color_blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(true)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD)
            .build();

        Self {
            stages,
            input_assembly,
            viewport,
            scissor,
            rasterization,
            multisample,
            color_blend_attachment,
            layout,
            render_pass,
        }
    }

    pub fn stages(&self) -> &[ShaderStage; 2] {
        &self.stages
    }

    pub fn input_assembly(&self) -> &vk::PipelineInputAssemblyStateCreateInfo {
        &self.input_assembly
    }

    pub fn viewport(&self) -> &vk::Viewport {
        &self.viewport
    }

    pub fn scissor(&self) -> &vk::Rect2D {
        &self.scissor
    }

    pub fn rasterization(&self) -> &vk::PipelineRasterizationStateCreateInfo {
        &self.rasterization
    }

    pub fn multisample(&self) -> &vk::PipelineMultisampleStateCreateInfo {
        &self.multisample
    }

    pub fn color_blend_attachment(&self) -> &vk::PipelineColorBlendAttachmentState {
        &self.color_blend_attachment
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }
}

/// The long-lived result of pipeline assembly. Shader modules are not part of it.
#[derive(Debug, Clone)]
pub struct GraphicsPipeline {
    pub layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
    pub description: PipelineDescription,
}

/// Builds the pipeline for `render_pass` at `extent`.
///
/// The shader modules exist only for the duration of this call and are
/// destroyed whether or not creation succeeds. Layout and pipeline go into
/// the ledger as soon as they exist.
pub fn build_pipeline<B: Backend + ?Sized>(
    backend: &mut B,
    ledger: &mut ResourceLedger,
    render_pass: vk::RenderPass,
    shaders: &ShaderBinaries,
    extent: vk::Extent2D,
) -> InitResult<GraphicsPipeline> {
    let vertex = create_shader_module(backend, &shaders.vertex)?;
    let fragment = match create_shader_module(backend, &shaders.fragment) {
        Ok(module) => module,
        Err(e) => {
            backend.destroy(Resource::ShaderModule(vertex));
            return Err(e);
        }
    };

    let result = assemble(backend, ledger, render_pass, vertex, fragment, extent);

    backend.destroy(Resource::ShaderModule(fragment));
    backend.destroy(Resource::ShaderModule(vertex));

    result
}

fn assemble<B: Backend + ?Sized>(
    backend: &mut B,
    ledger: &mut ResourceLedger,
    render_pass: vk::RenderPass,
    vertex: vk::ShaderModule,
    fragment: vk::ShaderModule,
    extent: vk::Extent2D,
) -> InitResult<GraphicsPipeline> {
    let layout = backend
        .create_pipeline_layout()
        .map_err(InitError::PipelineCreation)?;
    ledger.record(Resource::PipelineLayout(layout));

    let description = PipelineDescription::new(vertex, fragment, extent, layout, render_pass);
    let pipeline = backend
        .create_graphics_pipeline(&description)
        .map_err(InitError::PipelineCreation)?;
    ledger.record(Resource::Pipeline(pipeline));

    log::info!(
        "Created graphics pipeline ({}x{})",
        extent.width,
        extent.height
    );

    Ok(GraphicsPipeline {
        layout,
        pipeline,
        description,
    })
}
