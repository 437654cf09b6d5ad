use std::sync::{Mutex, MutexGuard, PoisonError};

use log::trace;

use crate::device::{
    BlendStateHandle, BufferDesc, BufferHandle, DepthStencilStateHandle, DepthStencilViewHandle, Device,
    DeviceContext, DeviceError, DeviceObject, RasterizerStateHandle, RenderTargetViewHandle, SamplerStateHandle,
    ShaderHandle, ShaderResourceViewHandle, ShaderStage, UnorderedAccessViewHandle,
};
use crate::model::ClassInstanceRef;
use crate::so_decl::StreamOutDecl;
use crate::states::{BlendDesc, DepthStencilDesc, RasterizerDesc, SamplerDesc};

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    CreateBuffer(BufferDesc),
    CreateBufferView { buffer: BufferHandle, elements: u32 },
    CreateRasterizerState(RasterizerDesc),
    CreateDepthStencilState(DepthStencilDesc),
    CreateBlendState(BlendDesc),
    CreateSamplerState(SamplerDesc),
    CreateShader {
        stage: ShaderStage,
        bytecode_len: usize,
        stream_out: Option<StreamOutDecl>,
    },
    Release(DeviceObject),
}

/// Which descriptions a [`RecordingDevice`] refuses to create objects from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Buffer,
    RasterizerState,
    DepthStencilState,
    BlendState,
    SamplerState,
    Shader,
}

#[derive(Debug, Default)]
struct DeviceLog {
    next_handle: u64,
    calls: Vec<DeviceCall>,
    rejected: Vec<Rejection>,
    /// Creations of a kind still allowed before it starts failing.
    delayed: Vec<(Rejection, usize)>,
}

/// Device that hands out sequential handles and records every call. Used by the CLI to show
/// what an effect does, and by tests.
#[derive(Debug, Default)]
pub struct RecordingDevice {
    log: Mutex<DeviceLog>,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later creation of `kind` fail.
    pub fn reject(&self, kind: Rejection) {
        self.lock().rejected.push(kind);
    }

    /// Lets `successes` more creations of `kind` through, then fails every later one.
    pub fn reject_after(&self, kind: Rejection, successes: usize) {
        self.lock().delayed.push((kind, successes));
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.lock().calls.clone()
    }

    pub fn count(&self, predicate: impl Fn(&DeviceCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|call| predicate(call)).count()
    }

    fn lock(&self) -> MutexGuard<'_, DeviceLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn create<H>(
        &self,
        call: DeviceCall,
        kind: Rejection,
        what: &'static str,
        wrap: impl FnOnce(u64) -> H,
    ) -> Result<H, DeviceError> {
        let mut log = self.lock();
        trace!("{:?}", call);
        log.calls.push(call);
        if log.rejected.contains(&kind) {
            return Err(DeviceError::Rejected(what));
        }
        if let Some((_, remaining)) = log.delayed.iter_mut().find(|(delayed, _)| *delayed == kind) {
            if *remaining == 0 {
                return Err(DeviceError::Rejected(what));
            }
            *remaining -= 1;
        }
        log.next_handle += 1;
        Ok(wrap(log.next_handle))
    }
}

impl Device for RecordingDevice {
    fn create_buffer(&self, desc: &BufferDesc) -> Result<BufferHandle, DeviceError> {
        self.create(DeviceCall::CreateBuffer(*desc), Rejection::Buffer, "buffer", BufferHandle)
    }

    fn create_buffer_view(&self, buffer: BufferHandle, elements: u32) -> Result<ShaderResourceViewHandle, DeviceError> {
        self.create(
            DeviceCall::CreateBufferView { buffer, elements },
            Rejection::Buffer,
            "buffer view",
            ShaderResourceViewHandle,
        )
    }

    fn create_rasterizer_state(&self, desc: &RasterizerDesc) -> Result<RasterizerStateHandle, DeviceError> {
        self.create(
            DeviceCall::CreateRasterizerState(*desc),
            Rejection::RasterizerState,
            "rasterizer state",
            RasterizerStateHandle,
        )
    }

    fn create_depth_stencil_state(&self, desc: &DepthStencilDesc) -> Result<DepthStencilStateHandle, DeviceError> {
        self.create(
            DeviceCall::CreateDepthStencilState(*desc),
            Rejection::DepthStencilState,
            "depth stencil state",
            DepthStencilStateHandle,
        )
    }

    fn create_blend_state(&self, desc: &BlendDesc) -> Result<BlendStateHandle, DeviceError> {
        self.create(
            DeviceCall::CreateBlendState(*desc),
            Rejection::BlendState,
            "blend state",
            BlendStateHandle,
        )
    }

    fn create_sampler_state(&self, desc: &SamplerDesc) -> Result<SamplerStateHandle, DeviceError> {
        self.create(
            DeviceCall::CreateSamplerState(*desc),
            Rejection::SamplerState,
            "sampler state",
            SamplerStateHandle,
        )
    }

    fn create_shader(
        &self,
        stage: ShaderStage,
        bytecode: &[u8],
        stream_out: Option<&StreamOutDecl>,
    ) -> Result<ShaderHandle, DeviceError> {
        self.create(
            DeviceCall::CreateShader {
                stage,
                bytecode_len: bytecode.len(),
                stream_out: stream_out.cloned(),
            },
            Rejection::Shader,
            "shader",
            ShaderHandle,
        )
    }

    fn release(&self, object: DeviceObject) {
        self.lock().calls.push(DeviceCall::Release(object));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContextCall {
    UpdateBuffer {
        buffer: BufferHandle,
        data: Vec<u8>,
    },
    SetRasterizerState(Option<RasterizerStateHandle>),
    SetDepthStencilState {
        state: Option<DepthStencilStateHandle>,
        stencil_ref: u32,
    },
    SetBlendState {
        state: Option<BlendStateHandle>,
        blend_factor: [f32; 4],
        sample_mask: u32,
    },
    SetRenderTargets {
        render_targets: Vec<Option<RenderTargetViewHandle>>,
        depth_stencil: Option<DepthStencilViewHandle>,
    },
    SetShader {
        stage: ShaderStage,
        shader: Option<ShaderHandle>,
        class_instances: Vec<Option<ClassInstanceRef>>,
    },
    SetConstantBuffers {
        stage: ShaderStage,
        start: u32,
        buffers: Vec<Option<BufferHandle>>,
    },
    SetShaderResources {
        stage: ShaderStage,
        start: u32,
        views: Vec<Option<ShaderResourceViewHandle>>,
    },
    SetSamplers {
        stage: ShaderStage,
        start: u32,
        samplers: Vec<Option<SamplerStateHandle>>,
    },
    SetUnorderedAccessViews {
        stage: ShaderStage,
        start: u32,
        views: Vec<Option<UnorderedAccessViewHandle>>,
    },
}

#[derive(Debug, Default)]
pub struct RecordingContext {
    pub calls: Vec<ContextCall>,
}

impl RecordingContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uploads(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, ContextCall::UpdateBuffer { .. }))
            .count()
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }
}

impl DeviceContext for RecordingContext {
    fn update_buffer(&mut self, buffer: BufferHandle, data: &[u8]) {
        self.calls.push(ContextCall::UpdateBuffer {
            buffer,
            data: data.to_vec(),
        });
    }

    fn set_rasterizer_state(&mut self, state: Option<RasterizerStateHandle>) {
        self.calls.push(ContextCall::SetRasterizerState(state));
    }

    fn set_depth_stencil_state(&mut self, state: Option<DepthStencilStateHandle>, stencil_ref: u32) {
        self.calls.push(ContextCall::SetDepthStencilState { state, stencil_ref });
    }

    fn set_blend_state(&mut self, state: Option<BlendStateHandle>, blend_factor: [f32; 4], sample_mask: u32) {
        self.calls.push(ContextCall::SetBlendState {
            state,
            blend_factor,
            sample_mask,
        });
    }

    fn set_render_targets(
        &mut self,
        render_targets: &[Option<RenderTargetViewHandle>],
        depth_stencil: Option<DepthStencilViewHandle>,
    ) {
        self.calls.push(ContextCall::SetRenderTargets {
            render_targets: render_targets.to_vec(),
            depth_stencil,
        });
    }

    fn set_shader(
        &mut self,
        stage: ShaderStage,
        shader: Option<ShaderHandle>,
        class_instances: &[Option<ClassInstanceRef>],
    ) {
        self.calls.push(ContextCall::SetShader {
            stage,
            shader,
            class_instances: class_instances.to_vec(),
        });
    }

    fn set_constant_buffers(&mut self, stage: ShaderStage, start: u32, buffers: &[Option<BufferHandle>]) {
        self.calls.push(ContextCall::SetConstantBuffers {
            stage,
            start,
            buffers: buffers.to_vec(),
        });
    }

    fn set_shader_resources(&mut self, stage: ShaderStage, start: u32, views: &[Option<ShaderResourceViewHandle>]) {
        self.calls.push(ContextCall::SetShaderResources {
            stage,
            start,
            views: views.to_vec(),
        });
    }

    fn set_samplers(&mut self, stage: ShaderStage, start: u32, samplers: &[Option<SamplerStateHandle>]) {
        self.calls.push(ContextCall::SetSamplers {
            stage,
            start,
            samplers: samplers.to_vec(),
        });
    }

    fn set_unordered_access_views(
        &mut self,
        stage: ShaderStage,
        start: u32,
        views: &[Option<UnorderedAccessViewHandle>],
    ) {
        self.calls.push(ContextCall::SetUnorderedAccessViews {
            stage,
            start,
            views: views.to_vec(),
        });
    }
}
