use std::fmt;
use std::sync::Arc;

use log::warn;

use crate::arena::{ArenaHandle, ByteArena};
use crate::device::{
    BlendStateHandle, BufferHandle, DepthStencilStateHandle, DepthStencilViewHandle, Device, DeviceError,
    DeviceObject, RasterizerStateHandle, RenderTargetViewHandle, SamplerStateHandle, ShaderHandle,
    ShaderResourceViewHandle, UnorderedAccessViewHandle,
};
use crate::evaluator::Evaluator;
use crate::model::ClassInstanceRef;
use crate::states::{BlendDesc, DepthStencilDesc, PassBackingStore, RasterizerDesc, SamplerState, StateFields};

/// Releases its device object when the last effect referencing it is gone.
struct ReleaseOnDrop {
    object: DeviceObject,
    device: Arc<dyn Device>,
}

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        self.device.release(self.object);
    }
}

impl fmt::Debug for ReleaseOnDrop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReleaseOnDrop").field(&self.object).finish()
    }
}

/// A device object created by an effect. Clones of an effect share it, the device sees exactly
/// one release once every holder dropped or recreated its copy.
#[derive(Debug, Clone)]
pub(crate) struct Bound<H> {
    handle: H,
    release: Arc<ReleaseOnDrop>,
}

impl<H: Copy> Bound<H> {
    pub fn new(handle: H, object: DeviceObject, device: &Arc<dyn Device>) -> Self {
        Self {
            handle,
            release: Arc::new(ReleaseOnDrop {
                object,
                device: Arc::clone(device),
            }),
        }
    }

    pub fn handle(&self) -> H {
        self.handle
    }
}

/// Descriptions the device turns into state objects.
pub(crate) trait DeviceState: StateFields + Clone + fmt::Debug {
    type Handle: Copy + fmt::Debug;
    const WHAT: &'static str;

    fn create(&self, device: &dyn Device) -> Result<Self::Handle, DeviceError>;

    fn object(handle: Self::Handle) -> DeviceObject;
}

impl DeviceState for RasterizerDesc {
    type Handle = RasterizerStateHandle;
    const WHAT: &'static str = "rasterizer state";

    fn create(&self, device: &dyn Device) -> Result<Self::Handle, DeviceError> {
        device.create_rasterizer_state(self)
    }

    fn object(handle: Self::Handle) -> DeviceObject {
        DeviceObject::RasterizerState(handle)
    }
}

impl DeviceState for DepthStencilDesc {
    type Handle = DepthStencilStateHandle;
    const WHAT: &'static str = "depth stencil state";

    fn create(&self, device: &dyn Device) -> Result<Self::Handle, DeviceError> {
        device.create_depth_stencil_state(self)
    }

    fn object(handle: Self::Handle) -> DeviceObject {
        DeviceObject::DepthStencilState(handle)
    }
}

impl DeviceState for BlendDesc {
    type Handle = BlendStateHandle;
    const WHAT: &'static str = "blend state";

    fn create(&self, device: &dyn Device) -> Result<Self::Handle, DeviceError> {
        device.create_blend_state(self)
    }

    fn object(handle: Self::Handle) -> DeviceObject {
        DeviceObject::BlendState(handle)
    }
}

impl DeviceState for SamplerState {
    type Handle = SamplerStateHandle;
    const WHAT: &'static str = "sampler state";

    fn create(&self, device: &dyn Device) -> Result<Self::Handle, DeviceError> {
        device.create_sampler_state(&self.desc)
    }

    fn object(handle: Self::Handle) -> DeviceObject {
        DeviceObject::SamplerState(handle)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct BlockState<D: DeviceState> {
    pub desc: D,
    pub bound: Option<Bound<D::Handle>>,
    /// Cleared for good once the device rejected the description.
    pub valid: bool,
}

impl<D: DeviceState> BlockState<D> {
    pub fn new(desc: D) -> Self {
        Self {
            desc,
            bound: None,
            valid: true,
        }
    }

    pub fn handle(&self) -> Option<D::Handle> {
        self.bound.as_ref().map(Bound::handle)
    }

    /// Replaces the device object with one created from the current description.
    pub fn recreate(&mut self, device: &Arc<dyn Device>) {
        self.bound = None;
        match self.desc.create(device.as_ref()) {
            Ok(handle) => self.bound = Some(Bound::new(handle, D::object(handle), device)),
            Err(e) => {
                warn!("Creating {} failed: {}", D::WHAT, e);
                self.valid = false;
            }
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct CbState {
    /// The backing store changed since the last upload.
    pub dirty: bool,
    pub buffer: Option<Bound<BufferHandle>>,
    /// Only texture buffers have one.
    pub view: Option<Bound<ShaderResourceViewHandle>>,
    /// Shared with the effect this one was cloned from; never uploaded or written.
    pub shared: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct ShaderState {
    pub bound: Option<Bound<ShaderHandle>>,
    pub valid: bool,
}

impl ShaderState {
    pub fn handle(&self) -> Option<ShaderHandle> {
        self.bound.as_ref().map(Bound::handle)
    }
}

impl Default for ShaderState {
    fn default() -> Self {
        Self {
            bound: None,
            valid: true,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct PassState {
    pub store: PassBackingStore,
}

/// Everything an effect instance may change after loading. Clones copy this, the graph
/// itself is shared.
#[derive(Debug, Clone)]
pub(crate) struct EffectState {
    /// Constant buffer backing stores.
    pub runtime: ByteArena,
    /// Indexed by constant buffer.
    pub cb_storage: Vec<ArenaHandle>,
    pub cbs: Vec<CbState>,
    pub rasterizers: Vec<BlockState<RasterizerDesc>>,
    pub depth_stencils: Vec<BlockState<DepthStencilDesc>>,
    pub blends: Vec<BlockState<BlendDesc>>,
    pub samplers: Vec<BlockState<SamplerState>>,
    pub shaders: Vec<ShaderState>,
    pub passes: Vec<PassState>,
    pub srvs: Vec<Option<ShaderResourceViewHandle>>,
    pub uavs: Vec<Option<UnorderedAccessViewHandle>>,
    pub rtvs: Vec<Option<RenderTargetViewHandle>>,
    pub dsvs: Vec<Option<DepthStencilViewHandle>>,
    pub interfaces: Vec<Option<ClassInstanceRef>>,
    pub evaluator: Evaluator,
}
