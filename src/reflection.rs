use std::collections::HashMap;

use thiserror::Error;

use crate::device::ShaderStage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    ConstantBuffer,
    TextureBuffer,
    Texture,
    Sampler,
    RwTyped,
    Structured,
    RwStructured,
    ByteAddress,
    RwByteAddress,
    AppendStructured,
    ConsumeStructured,
    RwStructuredWithCounter,
}

impl ResourceKind {
    pub fn is_unordered_access(self) -> bool {
        matches!(
            self,
            ResourceKind::RwTyped
                | ResourceKind::RwStructured
                | ResourceKind::RwByteAddress
                | ResourceKind::AppendStructured
                | ResourceKind::ConsumeStructured
                | ResourceKind::RwStructuredWithCounter
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundResource {
    /// Variable name, array elements as `name[3]`.
    pub name: String,
    pub kind: ResourceKind,
    pub bind_point: u32,
    pub bind_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceSlot {
    pub name: String,
    pub start: u32,
    pub count: u32,
    /// Slots filled from the shader's own interface bindings instead of a global variable.
    pub is_parameter: bool,
}

/// What the runtime needs to know about compiled bytecode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderReflection {
    pub stage: ShaderStage,
    /// Ordered by bind point within each resource class.
    pub bound_resources: Vec<BoundResource>,
    pub interface_slots: Vec<InterfaceSlot>,
    pub input_parameters: u32,
    pub output_parameters: u32,
    pub patch_constant_parameters: u32,
}

impl ShaderReflection {
    pub fn empty(stage: ShaderStage) -> Self {
        Self {
            stage,
            bound_resources: Vec::new(),
            interface_slots: Vec::new(),
            input_parameters: 0,
            output_parameters: 0,
            patch_constant_parameters: 0,
        }
    }
}

#[derive(Error, Debug)]
#[error("shader reflection failed: {0}")]
pub struct ReflectionError(pub String);

pub trait ShaderReflector {
    /// Reflects `bytecode`, `declared` being the stage the effect declares for it.
    fn reflect(&self, bytecode: &[u8], declared: ShaderStage) -> Result<ShaderReflection, ReflectionError>;
}

/// Reports no bindings at all, so shaders are bound without resources.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReflection;

impl ShaderReflector for NoReflection {
    fn reflect(&self, _bytecode: &[u8], declared: ShaderStage) -> Result<ShaderReflection, ReflectionError> {
        Ok(ShaderReflection::empty(declared))
    }
}

/// Table driven reflector keyed by the exact bytecode.
#[derive(Debug, Default, Clone)]
pub struct StaticReflector {
    entries: HashMap<Vec<u8>, ShaderReflection>,
}

impl StaticReflector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, bytecode: &[u8], reflection: ShaderReflection) -> Self {
        self.entries.insert(bytecode.to_vec(), reflection);
        self
    }
}

impl ShaderReflector for StaticReflector {
    fn reflect(&self, bytecode: &[u8], declared: ShaderStage) -> Result<ShaderReflection, ReflectionError> {
        Ok(self
            .entries
            .get(bytecode)
            .cloned()
            .unwrap_or_else(|| ShaderReflection::empty(declared)))
    }
}
