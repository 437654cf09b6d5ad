use std::fmt;

use fxrt_files::fx::types::ObjectType;
use thiserror::Error;

use crate::model::ClassInstanceRef;
use crate::so_decl::StreamOutDecl;
use crate::states::{BlendDesc, DepthStencilDesc, RasterizerDesc, SamplerDesc};

pub mod recording;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    Vertex,
    Pixel,
    Geometry,
    Hull,
    Domain,
    Compute,
}

impl ShaderStage {
    pub const COUNT: usize = 6;

    /// Order in which pass application binds the stages.
    pub const ALL: [ShaderStage; Self::COUNT] = [
        ShaderStage::Vertex,
        ShaderStage::Pixel,
        ShaderStage::Geometry,
        ShaderStage::Hull,
        ShaderStage::Domain,
        ShaderStage::Compute,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_object_type(object: ObjectType) -> Option<Self> {
        match object {
            ObjectType::VertexShader | ObjectType::VertexShader5 => Some(ShaderStage::Vertex),
            ObjectType::PixelShader | ObjectType::PixelShader5 => Some(ShaderStage::Pixel),
            ObjectType::GeometryShader | ObjectType::GeometryShaderSO | ObjectType::GeometryShader5 => {
                Some(ShaderStage::Geometry)
            }
            ObjectType::HullShader5 => Some(ShaderStage::Hull),
            ObjectType::DomainShader5 => Some(ShaderStage::Domain),
            ObjectType::ComputeShader5 => Some(ShaderStage::Compute),
            _ => None,
        }
    }
}

macro_rules! device_handles {
    ($($name:ident),* $(,)?) => {
        $(
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
            pub struct $name(pub u64);
        )*
    };
}

device_handles!(
    BufferHandle,
    ShaderResourceViewHandle,
    UnorderedAccessViewHandle,
    RenderTargetViewHandle,
    DepthStencilViewHandle,
    RasterizerStateHandle,
    DepthStencilStateHandle,
    BlendStateHandle,
    SamplerStateHandle,
    ShaderHandle,
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    Constant,
    /// Backs a texture buffer, viewed as `R32G32B32A32_UINT` elements.
    Texture,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDesc {
    pub size: u32,
    pub kind: BufferKind,
}

/// Every object the runtime creates and later releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceObject {
    Buffer(BufferHandle),
    ShaderResourceView(ShaderResourceViewHandle),
    RasterizerState(RasterizerStateHandle),
    DepthStencilState(DepthStencilStateHandle),
    BlendState(BlendStateHandle),
    SamplerState(SamplerStateHandle),
    Shader(ShaderHandle),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("the device rejected the {0} description")]
    Rejected(&'static str),
    #[error("device failure: {0}")]
    Other(String),
}

/// Creates device objects. Implementations are expected to be free threaded, like a D3D11
/// device.
pub trait Device: Send + Sync {
    fn create_buffer(&self, desc: &BufferDesc) -> Result<BufferHandle, DeviceError>;

    /// A view over `elements` 16 byte elements of a texture buffer.
    fn create_buffer_view(&self, buffer: BufferHandle, elements: u32) -> Result<ShaderResourceViewHandle, DeviceError>;

    fn create_rasterizer_state(&self, desc: &RasterizerDesc) -> Result<RasterizerStateHandle, DeviceError>;

    fn create_depth_stencil_state(&self, desc: &DepthStencilDesc) -> Result<DepthStencilStateHandle, DeviceError>;

    fn create_blend_state(&self, desc: &BlendDesc) -> Result<BlendStateHandle, DeviceError>;

    fn create_sampler_state(&self, desc: &SamplerDesc) -> Result<SamplerStateHandle, DeviceError>;

    /// Creates a shader for `stage`. Geometry shaders with stream output receive the parsed
    /// declaration, `bytecode` may then belong to a vertex shader.
    fn create_shader(
        &self,
        stage: ShaderStage,
        bytecode: &[u8],
        stream_out: Option<&StreamOutDecl>,
    ) -> Result<ShaderHandle, DeviceError>;

    fn release(&self, object: DeviceObject);
}

impl fmt::Debug for dyn Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn Device")
    }
}

/// Binding calls on an immediate or deferred context. `None` entries unbind a slot.
pub trait DeviceContext {
    fn update_buffer(&mut self, buffer: BufferHandle, data: &[u8]);

    fn set_rasterizer_state(&mut self, state: Option<RasterizerStateHandle>);

    fn set_depth_stencil_state(&mut self, state: Option<DepthStencilStateHandle>, stencil_ref: u32);

    fn set_blend_state(&mut self, state: Option<BlendStateHandle>, blend_factor: [f32; 4], sample_mask: u32);

    fn set_render_targets(
        &mut self,
        render_targets: &[Option<RenderTargetViewHandle>],
        depth_stencil: Option<DepthStencilViewHandle>,
    );

    fn set_shader(
        &mut self,
        stage: ShaderStage,
        shader: Option<ShaderHandle>,
        class_instances: &[Option<ClassInstanceRef>],
    );

    fn set_constant_buffers(&mut self, stage: ShaderStage, start: u32, buffers: &[Option<BufferHandle>]);

    fn set_shader_resources(&mut self, stage: ShaderStage, start: u32, views: &[Option<ShaderResourceViewHandle>]);

    fn set_samplers(&mut self, stage: ShaderStage, start: u32, samplers: &[Option<SamplerStateHandle>]);

    fn set_unordered_access_views(
        &mut self,
        stage: ShaderStage,
        start: u32,
        views: &[Option<UnorderedAccessViewHandle>],
    );
}
