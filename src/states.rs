use fxrt_files::fx::types::{ObjectType, SIMULTANEOUS_RENDER_TARGET_COUNT};

use crate::device::ShaderStage;
use crate::model::{BlendId, BlockRef, DepthStencilId, DsvId, ObjectRef, RasterizerId, RtvId, ShaderId, SrvId};

/// Index into [`STATE_TABLE`], the `iState` field of an assignment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateIndex(pub u8);

impl StateIndex {
    pub fn entry(self) -> &'static StateEntry {
        &STATE_TABLE[self.0 as usize]
    }

    pub fn from_raw(raw: u32) -> Option<Self> {
        ((raw as usize) < STATE_TABLE.len()).then_some(Self(raw as u8))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateOwner {
    Pass,
    Rasterizer,
    DepthStencil,
    Blend,
    Sampler,
}

/// How a numeric field stores the 32 bit words assignments produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    U32,
    I32,
    F32,
    Bool,
    U8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Rasterizer,
    DepthStencil,
    Blend,
    RenderTargetView,
    DepthStencilView,
    Shader(ShaderStage),
    ShaderResource,
}

impl ObjectKind {
    /// Whether a variable of `object` type can be assigned to this slot.
    pub fn accepts(self, object: ObjectType) -> bool {
        match self {
            ObjectKind::Rasterizer => object == ObjectType::Rasterizer,
            ObjectKind::DepthStencil => object == ObjectType::DepthStencil,
            ObjectKind::Blend => object == ObjectType::Blend,
            ObjectKind::RenderTargetView => object == ObjectType::RenderTargetView,
            ObjectKind::DepthStencilView => object == ObjectType::DepthStencilView,
            ObjectKind::Shader(stage) => ShaderStage::from_object_type(object) == Some(stage),
            ObjectKind::ShaderResource => object.is_shader_resource(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateValue {
    Object(ObjectKind),
    Numeric { field: FieldType, columns: u32 },
}

#[derive(Debug, Clone, Copy)]
pub struct StateEntry {
    pub name: &'static str,
    pub owner: StateOwner,
    pub value: StateValue,
    /// Valid range of the assignment's element index.
    pub indices: u32,
}

impl StateEntry {
    pub fn is_object(&self) -> bool {
        matches!(self.value, StateValue::Object(_))
    }
}

const fn object(name: &'static str, owner: StateOwner, kind: ObjectKind, indices: u32) -> StateEntry {
    StateEntry {
        name,
        owner,
        value: StateValue::Object(kind),
        indices,
    }
}

const fn numeric(name: &'static str, owner: StateOwner, field: FieldType, columns: u32, indices: u32) -> StateEntry {
    StateEntry {
        name,
        owner,
        value: StateValue::Numeric { field, columns },
        indices,
    }
}

const RT: u32 = SIMULTANEOUS_RENDER_TARGET_COUNT;

use FieldType::{Bool, F32, I32, U8, U32};
use StateOwner::{Blend, DepthStencil, Pass, Rasterizer, Sampler};

pub const STATE_TABLE: [StateEntry; 58] = [
    // pass
    object("RasterizerState", Pass, ObjectKind::Rasterizer, 1),
    object("DepthStencilState", Pass, ObjectKind::DepthStencil, 1),
    object("BlendState", Pass, ObjectKind::Blend, 1),
    object("RenderTargetView", Pass, ObjectKind::RenderTargetView, RT),
    object("DepthStencilView", Pass, ObjectKind::DepthStencilView, 1),
    object("VertexShader", Pass, ObjectKind::Shader(ShaderStage::Vertex), 1),
    object("PixelShader", Pass, ObjectKind::Shader(ShaderStage::Pixel), 1),
    object("GeometryShader", Pass, ObjectKind::Shader(ShaderStage::Geometry), 1),
    object("HullShader", Pass, ObjectKind::Shader(ShaderStage::Hull), 1),
    object("DomainShader", Pass, ObjectKind::Shader(ShaderStage::Domain), 1),
    object("ComputeShader", Pass, ObjectKind::Shader(ShaderStage::Compute), 1),
    numeric("StencilRef", Pass, U32, 1, 1),
    numeric("BlendFactor", Pass, F32, 4, 1),
    numeric("SampleMask", Pass, U32, 1, 1),
    // rasterizer
    numeric("FillMode", Rasterizer, U32, 1, 1),
    numeric("CullMode", Rasterizer, U32, 1, 1),
    numeric("FrontCounterClockwise", Rasterizer, Bool, 1, 1),
    numeric("DepthBias", Rasterizer, I32, 1, 1),
    numeric("DepthBiasClamp", Rasterizer, F32, 1, 1),
    numeric("SlopeScaledDepthBias", Rasterizer, F32, 1, 1),
    numeric("DepthClipEnable", Rasterizer, Bool, 1, 1),
    numeric("ScissorEnable", Rasterizer, Bool, 1, 1),
    numeric("MultisampleEnable", Rasterizer, Bool, 1, 1),
    numeric("AntialiasedLineEnable", Rasterizer, Bool, 1, 1),
    // depth stencil
    numeric("DepthEnable", DepthStencil, Bool, 1, 1),
    numeric("DepthWriteMask", DepthStencil, U32, 1, 1),
    numeric("DepthFunc", DepthStencil, U32, 1, 1),
    numeric("StencilEnable", DepthStencil, Bool, 1, 1),
    numeric("StencilReadMask", DepthStencil, U8, 1, 1),
    numeric("StencilWriteMask", DepthStencil, U8, 1, 1),
    numeric("FrontFaceStencilFail", DepthStencil, U32, 1, 1),
    numeric("FrontFaceStencilDepthFail", DepthStencil, U32, 1, 1),
    numeric("FrontFaceStencilPass", DepthStencil, U32, 1, 1),
    numeric("FrontFaceStencilFunc", DepthStencil, U32, 1, 1),
    numeric("BackFaceStencilFail", DepthStencil, U32, 1, 1),
    numeric("BackFaceStencilDepthFail", DepthStencil, U32, 1, 1),
    numeric("BackFaceStencilPass", DepthStencil, U32, 1, 1),
    numeric("BackFaceStencilFunc", DepthStencil, U32, 1, 1),
    // blend
    numeric("AlphaToCoverageEnable", Blend, Bool, 1, 1),
    numeric("BlendEnable", Blend, Bool, 1, RT),
    numeric("SrcBlend", Blend, U32, 1, RT),
    numeric("DestBlend", Blend, U32, 1, RT),
    numeric("BlendOp", Blend, U32, 1, RT),
    numeric("SrcBlendAlpha", Blend, U32, 1, RT),
    numeric("DestBlendAlpha", Blend, U32, 1, RT),
    numeric("BlendOpAlpha", Blend, U32, 1, RT),
    numeric("RenderTargetWriteMask", Blend, U8, 1, RT),
    // sampler
    numeric("Filter", Sampler, U32, 1, 1),
    numeric("AddressU", Sampler, U32, 1, 1),
    numeric("AddressV", Sampler, U32, 1, 1),
    numeric("AddressW", Sampler, U32, 1, 1),
    numeric("MipLODBias", Sampler, F32, 1, 1),
    numeric("MaxAnisotropy", Sampler, U32, 1, 1),
    numeric("ComparisonFunc", Sampler, U32, 1, 1),
    numeric("BorderColor", Sampler, F32, 4, 1),
    numeric("MinLOD", Sampler, F32, 1, 1),
    numeric("MaxLOD", Sampler, F32, 1, 1),
    object("Texture", Sampler, ObjectKind::ShaderResource, 1),
];

pub fn find_state(name: &str) -> Option<StateIndex> {
    STATE_TABLE
        .iter()
        .position(|entry| entry.name.eq_ignore_ascii_case(name))
        .map(|index| StateIndex(index as u8))
}

fn as_bool(word: u32) -> bool {
    word != 0
}

fn as_u8(word: u32) -> u8 {
    (word & 0xFF) as u8
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterizerDesc {
    pub fill_mode: u32,
    pub cull_mode: u32,
    pub front_counter_clockwise: bool,
    pub depth_bias: i32,
    pub depth_bias_clamp: f32,
    pub slope_scaled_depth_bias: f32,
    pub depth_clip_enable: bool,
    pub scissor_enable: bool,
    pub multisample_enable: bool,
    pub antialiased_line_enable: bool,
}

impl Default for RasterizerDesc {
    fn default() -> Self {
        Self {
            fill_mode: 3, // solid
            cull_mode: 3, // back
            front_counter_clockwise: false,
            depth_bias: 0,
            depth_bias_clamp: 0.0,
            slope_scaled_depth_bias: 0.0,
            depth_clip_enable: true,
            scissor_enable: false,
            multisample_enable: false,
            antialiased_line_enable: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StencilOpDesc {
    pub fail: u32,
    pub depth_fail: u32,
    pub pass: u32,
    pub func: u32,
}

impl Default for StencilOpDesc {
    fn default() -> Self {
        // keep, keep, keep, always
        Self {
            fail: 1,
            depth_fail: 1,
            pass: 1,
            func: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthStencilDesc {
    pub depth_enable: bool,
    pub depth_write_mask: u32,
    pub depth_func: u32,
    pub stencil_enable: bool,
    pub stencil_read_mask: u8,
    pub stencil_write_mask: u8,
    pub front_face: StencilOpDesc,
    pub back_face: StencilOpDesc,
}

impl Default for DepthStencilDesc {
    fn default() -> Self {
        Self {
            depth_enable: true,
            depth_write_mask: 1, // all
            depth_func: 2,       // less
            stencil_enable: false,
            stencil_read_mask: 0xFF,
            stencil_write_mask: 0xFF,
            front_face: StencilOpDesc::default(),
            back_face: StencilOpDesc::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTargetBlendDesc {
    pub blend_enable: bool,
    pub src_blend: u32,
    pub dest_blend: u32,
    pub blend_op: u32,
    pub src_blend_alpha: u32,
    pub dest_blend_alpha: u32,
    pub blend_op_alpha: u32,
    pub render_target_write_mask: u8,
}

impl Default for RenderTargetBlendDesc {
    fn default() -> Self {
        // one, zero, add
        Self {
            blend_enable: false,
            src_blend: 2,
            dest_blend: 1,
            blend_op: 1,
            src_blend_alpha: 2,
            dest_blend_alpha: 1,
            blend_op_alpha: 1,
            render_target_write_mask: 0x0F,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlendDesc {
    pub alpha_to_coverage_enable: bool,
    pub independent_blend_enable: bool,
    pub render_targets: [RenderTargetBlendDesc; SIMULTANEOUS_RENDER_TARGET_COUNT as usize],
}

impl Default for BlendDesc {
    fn default() -> Self {
        Self {
            alpha_to_coverage_enable: false,
            independent_blend_enable: true,
            render_targets: [RenderTargetBlendDesc::default(); SIMULTANEOUS_RENDER_TARGET_COUNT as usize],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDesc {
    pub filter: u32,
    pub address_u: u32,
    pub address_v: u32,
    pub address_w: u32,
    pub mip_lod_bias: f32,
    pub max_anisotropy: u32,
    pub comparison_func: u32,
    pub border_color: [f32; 4],
    pub min_lod: f32,
    pub max_lod: f32,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            filter: 0x15, // min mag mip linear
            address_u: 3, // clamp
            address_v: 3,
            address_w: 3,
            mip_lod_bias: 0.0,
            max_anisotropy: 16,
            comparison_func: 1, // never
            border_color: [0.0; 4],
            min_lod: -f32::MAX,
            max_lod: f32::MAX,
        }
    }
}

/// A sampler block's description plus the texture it names for sampler-only texture loads.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SamplerState {
    pub desc: SamplerDesc,
    pub texture: ObjectRef<SrvId>,
}

/// Writes of numeric state fields. `words` holds exactly the entry's column count.
pub trait StateFields {
    fn write_numeric(&mut self, state: StateIndex, index: u32, words: &[u32]);

    /// Object slots, only passes and samplers have them.
    fn write_object(&mut self, _state: StateIndex, _index: u32, _block: BlockRef) {}
}

impl StateFields for RasterizerDesc {
    fn write_numeric(&mut self, state: StateIndex, _index: u32, words: &[u32]) {
        let word = words[0];
        match state.entry().name {
            "FillMode" => self.fill_mode = word,
            "CullMode" => self.cull_mode = word,
            "FrontCounterClockwise" => self.front_counter_clockwise = as_bool(word),
            "DepthBias" => self.depth_bias = word as i32,
            "DepthBiasClamp" => self.depth_bias_clamp = f32::from_bits(word),
            "SlopeScaledDepthBias" => self.slope_scaled_depth_bias = f32::from_bits(word),
            "DepthClipEnable" => self.depth_clip_enable = as_bool(word),
            "ScissorEnable" => self.scissor_enable = as_bool(word),
            "MultisampleEnable" => self.multisample_enable = as_bool(word),
            "AntialiasedLineEnable" => self.antialiased_line_enable = as_bool(word),
            _ => {}
        }
    }
}

impl StateFields for DepthStencilDesc {
    fn write_numeric(&mut self, state: StateIndex, _index: u32, words: &[u32]) {
        let word = words[0];
        match state.entry().name {
            "DepthEnable" => self.depth_enable = as_bool(word),
            "DepthWriteMask" => self.depth_write_mask = word,
            "DepthFunc" => self.depth_func = word,
            "StencilEnable" => self.stencil_enable = as_bool(word),
            "StencilReadMask" => self.stencil_read_mask = as_u8(word),
            "StencilWriteMask" => self.stencil_write_mask = as_u8(word),
            "FrontFaceStencilFail" => self.front_face.fail = word,
            "FrontFaceStencilDepthFail" => self.front_face.depth_fail = word,
            "FrontFaceStencilPass" => self.front_face.pass = word,
            "FrontFaceStencilFunc" => self.front_face.func = word,
            "BackFaceStencilFail" => self.back_face.fail = word,
            "BackFaceStencilDepthFail" => self.back_face.depth_fail = word,
            "BackFaceStencilPass" => self.back_face.pass = word,
            "BackFaceStencilFunc" => self.back_face.func = word,
            _ => {}
        }
    }
}

impl StateFields for BlendDesc {
    fn write_numeric(&mut self, state: StateIndex, index: u32, words: &[u32]) {
        let word = words[0];
        let name = state.entry().name;
        if name == "AlphaToCoverageEnable" {
            self.alpha_to_coverage_enable = as_bool(word);
            return;
        }

        let Some(target) = self.render_targets.get_mut(index as usize) else {
            return;
        };
        match name {
            "BlendEnable" => target.blend_enable = as_bool(word),
            "SrcBlend" => target.src_blend = word,
            "DestBlend" => target.dest_blend = word,
            "BlendOp" => target.blend_op = word,
            "SrcBlendAlpha" => target.src_blend_alpha = word,
            "DestBlendAlpha" => target.dest_blend_alpha = word,
            "BlendOpAlpha" => target.blend_op_alpha = word,
            "RenderTargetWriteMask" => target.render_target_write_mask = as_u8(word),
            _ => {}
        }
    }
}

impl StateFields for SamplerState {
    fn write_numeric(&mut self, state: StateIndex, _index: u32, words: &[u32]) {
        let word = words[0];
        let desc = &mut self.desc;
        match state.entry().name {
            "Filter" => desc.filter = word,
            "AddressU" => desc.address_u = word,
            "AddressV" => desc.address_v = word,
            "AddressW" => desc.address_w = word,
            "MipLODBias" => desc.mip_lod_bias = f32::from_bits(word),
            "MaxAnisotropy" => desc.max_anisotropy = word,
            "ComparisonFunc" => desc.comparison_func = word,
            "BorderColor" => {
                for (target, word) in desc.border_color.iter_mut().zip(words) {
                    *target = f32::from_bits(*word);
                }
            }
            "MinLOD" => desc.min_lod = f32::from_bits(word),
            "MaxLOD" => desc.max_lod = f32::from_bits(word),
            _ => {}
        }
    }

    fn write_object(&mut self, _state: StateIndex, _index: u32, block: BlockRef) {
        self.texture = match block {
            BlockRef::ShaderResource(srv) => ObjectRef::Block(srv),
            _ => ObjectRef::Null,
        };
    }
}

/// Everything a pass hands to the device besides the blocks' own descriptions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassBackingStore {
    pub rasterizer: ObjectRef<RasterizerId>,
    pub depth_stencil: ObjectRef<DepthStencilId>,
    pub blend: ObjectRef<BlendId>,
    pub render_targets: [ObjectRef<RtvId>; SIMULTANEOUS_RENDER_TARGET_COUNT as usize],
    /// One past the highest render target slot any assignment wrote.
    pub render_target_count: u32,
    pub depth_stencil_view: ObjectRef<DsvId>,
    /// Indexed by [`ShaderStage::index`].
    pub shaders: [ObjectRef<ShaderId>; ShaderStage::COUNT],
    pub stencil_ref: u32,
    pub blend_factor: [f32; 4],
    pub sample_mask: u32,
}

impl Default for PassBackingStore {
    fn default() -> Self {
        Self {
            rasterizer: ObjectRef::Unset,
            depth_stencil: ObjectRef::Unset,
            blend: ObjectRef::Unset,
            render_targets: [ObjectRef::Unset; SIMULTANEOUS_RENDER_TARGET_COUNT as usize],
            render_target_count: 0,
            depth_stencil_view: ObjectRef::Unset,
            shaders: [ObjectRef::Unset; ShaderStage::COUNT],
            stencil_ref: 0,
            blend_factor: [1.0; 4],
            sample_mask: 0xFFFF_FFFF,
        }
    }
}

fn object_ref<I>(block: BlockRef, pick: impl FnOnce(BlockRef) -> Option<I>) -> ObjectRef<I> {
    match block {
        BlockRef::Null => ObjectRef::Null,
        other => pick(other).map_or(ObjectRef::Null, ObjectRef::Block),
    }
}

impl StateFields for PassBackingStore {
    fn write_numeric(&mut self, state: StateIndex, _index: u32, words: &[u32]) {
        match state.entry().name {
            "StencilRef" => self.stencil_ref = words[0],
            "SampleMask" => self.sample_mask = words[0],
            "BlendFactor" => {
                for (target, word) in self.blend_factor.iter_mut().zip(words) {
                    *target = f32::from_bits(*word);
                }
            }
            _ => {}
        }
    }

    fn write_object(&mut self, state: StateIndex, index: u32, block: BlockRef) {
        match state.entry().value {
            StateValue::Object(ObjectKind::Rasterizer) => {
                self.rasterizer = object_ref(block, |b| match b {
                    BlockRef::Rasterizer(id) => Some(id),
                    _ => None,
                })
            }
            StateValue::Object(ObjectKind::DepthStencil) => {
                self.depth_stencil = object_ref(block, |b| match b {
                    BlockRef::DepthStencil(id) => Some(id),
                    _ => None,
                })
            }
            StateValue::Object(ObjectKind::Blend) => {
                self.blend = object_ref(block, |b| match b {
                    BlockRef::Blend(id) => Some(id),
                    _ => None,
                })
            }
            StateValue::Object(ObjectKind::RenderTargetView) => {
                if let Some(slot) = self.render_targets.get_mut(index as usize) {
                    *slot = object_ref(block, |b| match b {
                        BlockRef::RenderTarget(id) => Some(id),
                        _ => None,
                    });
                    self.render_target_count = self.render_target_count.max(index + 1);
                }
            }
            StateValue::Object(ObjectKind::DepthStencilView) => {
                self.depth_stencil_view = object_ref(block, |b| match b {
                    BlockRef::DepthStencilView(id) => Some(id),
                    _ => None,
                })
            }
            StateValue::Object(ObjectKind::Shader(stage)) => {
                self.shaders[stage.index()] = object_ref(block, |b| match b {
                    BlockRef::Shader(id) => Some(id),
                    _ => None,
                })
            }
            _ => {}
        }
    }
}

impl PassBackingStore {
    pub fn shader(&self, stage: ShaderStage) -> ObjectRef<ShaderId> {
        self.shaders[stage.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_grouped_by_owner() {
        let owners = STATE_TABLE.iter().map(|entry| entry.owner).collect::<Vec<_>>();
        assert_eq!(owners[0], StateOwner::Pass);
        assert_eq!(owners[13], StateOwner::Pass);
        assert_eq!(owners[14], StateOwner::Rasterizer);
        assert_eq!(owners[24], StateOwner::DepthStencil);
        assert_eq!(owners[38], StateOwner::Blend);
        assert_eq!(owners[47], StateOwner::Sampler);
        assert_eq!(find_state("pixelshader"), Some(StateIndex(6)));
        assert_eq!(StateIndex::from_raw(58), None);
    }

    #[test]
    fn numeric_words_follow_field_types() {
        let mut desc = DepthStencilDesc::default();
        desc.write_numeric(find_state("StencilReadMask").unwrap(), 0, &[0x1234]);
        desc.write_numeric(find_state("DepthEnable").unwrap(), 0, &[0]);
        assert_eq!(desc.stencil_read_mask, 0x34);
        assert!(!desc.depth_enable);

        let mut blend = BlendDesc::default();
        blend.write_numeric(find_state("BlendEnable").unwrap(), 3, &[1]);
        assert!(blend.render_targets[3].blend_enable);
        assert!(!blend.render_targets[0].blend_enable);

        let mut pass = PassBackingStore::default();
        pass.write_numeric(find_state("BlendFactor").unwrap(), 0, &[0.5f32.to_bits(); 4]);
        assert_eq!(pass.blend_factor, [0.5; 4]);
    }

    #[test]
    fn render_target_count_tracks_highest_slot() {
        let mut pass = PassBackingStore::default();
        pass.write_object(find_state("RenderTargetView").unwrap(), 2, BlockRef::RenderTarget(RtvId(5)));
        assert_eq!(pass.render_target_count, 3);
        assert_eq!(pass.render_targets[2], ObjectRef::Block(RtvId(5)));
        assert_eq!(pass.render_targets[0], ObjectRef::Unset);

        pass.write_object(find_state("VertexShader").unwrap(), 0, BlockRef::Null);
        assert_eq!(pass.shader(ShaderStage::Vertex), ObjectRef::Null);
    }
}
