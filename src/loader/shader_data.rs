use std::collections::BTreeMap;

use fxrt_files::fx::types::{ARRAY_INDEX_NONE, BinaryInterfaceInitializer, MAX_INTERFACES};
use itertools::Itertools;
use log::{trace, warn};

use super::Loader;
use crate::device::ShaderStage;
use crate::error::{EffectError, malformed};
use crate::model::{
    BindRange, CbId, ClassInstanceRef, InterfaceRef, ObjectRef, ResourceRef, SamplerId, ShaderDependencies,
    SignatureCounts, UavId, VariableData, VariableId,
};
use crate::reflection::{ResourceKind, ShaderReflection};

/// Appends `items` at `bind_point`, extending the last range when it ends right there.
fn push_range<T>(ranges: &mut Vec<BindRange<T>>, bind_point: u32, items: impl IntoIterator<Item = T>) {
    match ranges.last_mut() {
        Some(last) if last.end() == bind_point => last.items.extend(items),
        _ => ranges.push(BindRange {
            start: bind_point,
            items: items.into_iter().collect(),
        }),
    }
}

/// One range covering every bound slot, with `None` in the gaps.
fn dense_range<T: Clone>(slots: &BTreeMap<u32, T>, start: u32, fill: T) -> Option<BindRange<T>> {
    let end = slots.keys().next_back()? + 1;
    let mut items = vec![fill; (end - start) as usize];
    for (slot, item) in slots {
        items[(slot - start) as usize] = item.clone();
    }
    Some(BindRange { start, items })
}

/// Splits `name[3]` into `name` and `3`.
fn split_element(name: &str) -> Option<(&str, u32)> {
    let base = name.strip_suffix(']')?;
    let (base, index) = base.split_once('[')?;
    Some((base, index.parse().ok()?))
}

impl Loader<'_, '_> {
    /// Reflects every shader with bytecode and turns its bindings into ranges over effect
    /// objects.
    pub(super) fn load_shader_dependencies(&mut self) -> Result<(), EffectError> {
        for index in 0..self.out.shaders.len() {
            let Some(bytecode) = self.out.shaders[index].bytecode else {
                continue;
            };
            let declared = self.out.shaders[index].def.stage;

            let reflection = self
                .reflector
                .reflect(self.out.reflection.get(bytecode), declared)
                .map_err(|e| {
                    warn!("Shader {} ({:?}): {}", index, declared, e);
                    malformed("shader reflection failed")
                })?;

            // stream output geometry shaders may be built from vertex shader bytecode
            let is_null_gs = declared == ShaderStage::Geometry && reflection.stage == ShaderStage::Vertex;
            if !is_null_gs && reflection.stage != declared {
                return Err(malformed("shader bytecode does not match its declared stage"));
            }

            let raw_bindings = std::mem::take(&mut self.out.shaders[index].raw_bindings);
            let interface_bindings = raw_bindings
                .iter()
                .map(|binding| self.resolve_interface_binding(binding))
                .collect::<Result<Vec<_>, _>>()?;

            let dependencies = self.collect_dependencies(&reflection, &interface_bindings)?;
            trace!(
                "Shader {} ({:?}): {} constant buffer ranges, {} sampler ranges, {} resource ranges",
                index,
                declared,
                dependencies.constant_buffers.len(),
                dependencies.samplers.len(),
                dependencies.resources.len()
            );

            let def = &mut self.out.shaders[index].def;
            def.is_null_gs = is_null_gs;
            def.interface_bindings = interface_bindings;
            def.dependencies = dependencies;
            def.signature = SignatureCounts {
                input_parameters: reflection.input_parameters,
                output_parameters: reflection.output_parameters,
                patch_constant_parameters: reflection.patch_constant_parameters,
            };
        }
        Ok(())
    }

    fn resolve_interface_binding(&mut self, binding: &BinaryInterfaceInitializer) -> Result<InterfaceRef, EffectError> {
        let name = self.string(binding.o_instance_name)?;
        let variable = self
            .lookup_variable(name)
            .ok_or_else(|| malformed("interface binding names an unknown variable"))?;
        let element = match binding.array_index {
            ARRAY_INDEX_NONE => 0,
            index => index,
        };
        self.interface_ref(variable, element)
    }

    fn interface_ref(&self, variable: VariableId, element: u32) -> Result<InterfaceRef, EffectError> {
        let source = &self.out.variables[variable.index()];
        let desc = self.type_desc(source.ty);
        if element >= desc.element_count() {
            return Err(malformed("interface binding index is out of range"));
        }

        match &source.data {
            VariableData::Interface(span) => span
                .get(element)
                .map(InterfaceRef::Interface)
                .ok_or_else(|| malformed("interface binding index is out of range")),
            _ if desc.is_class_instance() => Ok(InterfaceRef::ClassInstance(ClassInstanceRef { variable, element })),
            _ => Err(malformed("interface binding names neither an interface nor a class instance")),
        }
    }

    fn find_constant_buffer(&self, name: &str) -> Option<CbId> {
        let id = self.out.strings.lookup(name)?;
        self.out
            .cbs
            .iter()
            .position(|cb| cb.name == Some(id))
            .map(CbId::from)
    }

    /// Finds the variable a reflected binding names, `name[3]` addressing a single element.
    fn find_bound_variable(&self, name: &str, bind_count: u32) -> Result<(VariableId, u32), EffectError> {
        let by_name = |name: &str| self.lookup_variable(self.out.strings.lookup(name));
        let (variable, element) = match by_name(name) {
            Some(variable) => (variable, 0),
            None => {
                let (base, element) =
                    split_element(name).ok_or_else(|| malformed("shader binds an unknown variable"))?;
                (
                    by_name(base).ok_or_else(|| malformed("shader binds an unknown variable"))?,
                    element,
                )
            }
        };

        let elements = self.type_desc(self.out.variables[variable.index()].ty).element_count();
        if element.checked_add(bind_count).is_none_or(|end| end > elements) {
            return Err(malformed("shader binds more elements than the variable has"));
        }
        Ok((variable, element))
    }

    fn collect_dependencies(
        &self,
        reflection: &ShaderReflection,
        interface_bindings: &[InterfaceRef],
    ) -> Result<ShaderDependencies, EffectError> {
        let mut dependencies = ShaderDependencies::default();
        let mut uavs: BTreeMap<u32, Option<UavId>> = BTreeMap::new();

        for resource in reflection
            .bound_resources
            .iter()
            .sorted_by_key(|resource| resource.bind_point)
        {
            let slots = resource.bind_point..resource.bind_point + resource.bind_count;
            match resource.kind {
                ResourceKind::ConstantBuffer | ResourceKind::TextureBuffer => {
                    let cb = self
                        .find_constant_buffer(&resource.name)
                        .ok_or_else(|| malformed("shader uses an unknown constant buffer"))?;
                    let is_tbuffer = self.out.cbs[cb.index()].is_tbuffer();
                    match resource.kind {
                        ResourceKind::ConstantBuffer if !is_tbuffer => {
                            push_range(&mut dependencies.constant_buffers, resource.bind_point, [Some(cb)])
                        }
                        ResourceKind::TextureBuffer if is_tbuffer => {
                            push_range(&mut dependencies.resources, resource.bind_point, [ResourceRef::TextureBuffer(cb)])
                        }
                        _ => return Err(malformed("constant buffer kind does not match its reflection")),
                    }
                }
                ResourceKind::Sampler => {
                    let (variable, element) = self.find_bound_variable(&resource.name, resource.bind_count)?;
                    let VariableData::Sampler(span) = &self.out.variables[variable.index()].data else {
                        return Err(malformed("shader binds a non-sampler as a sampler"));
                    };
                    let samplers = (0..resource.bind_count).map(|i| span.get(element + i));
                    push_range(&mut dependencies.samplers, resource.bind_point, samplers);
                }
                kind if kind.is_unordered_access() => {
                    let (variable, element) = self.find_bound_variable(&resource.name, resource.bind_count)?;
                    let VariableData::UnorderedAccessView(span) = &self.out.variables[variable.index()].data else {
                        return Err(malformed("shader binds a non-UAV as an unordered access view"));
                    };
                    for (i, slot) in slots.enumerate() {
                        uavs.insert(slot, span.get(element + i as u32));
                    }
                }
                _ => {
                    let (variable, element) = self.find_bound_variable(&resource.name, resource.bind_count)?;
                    let resources = match &self.out.variables[variable.index()].data {
                        VariableData::ShaderResource(span) => (0..resource.bind_count)
                            .map(|i| span.get(element + i).map_or(ResourceRef::Null, ResourceRef::ShaderResource))
                            .collect::<Vec<_>>(),
                        VariableData::Sampler(span) => (0..resource.bind_count)
                            .map(|i| self.sampler_texture(span.get(element + i)))
                            .collect::<Result<Vec<_>, _>>()?,
                        _ => return Err(malformed("shader binds a non-resource as a shader resource")),
                    };
                    push_range(&mut dependencies.resources, resource.bind_point, resources);
                }
            }
        }

        let uav_start = uavs.keys().next().copied().unwrap_or_default();
        dependencies.unordered_access_views = dense_range(&uavs, uav_start, None);
        dependencies.interfaces = self.collect_interfaces(reflection, interface_bindings)?;
        Ok(dependencies)
    }

    /// Texture loads through a sampler use the texture its description names.
    fn sampler_texture(&self, sampler: Option<SamplerId>) -> Result<ResourceRef, EffectError> {
        let sampler = sampler.ok_or_else(|| malformed("sampler index is out of range"))?;
        match self.out.samplers[sampler.index()].desc.texture {
            ObjectRef::Unset => Err(malformed("sampler used as a texture does not name one")),
            _ => Ok(ResourceRef::SamplerTexture(sampler)),
        }
    }

    fn collect_interfaces(
        &self,
        reflection: &ShaderReflection,
        interface_bindings: &[InterfaceRef],
    ) -> Result<Option<BindRange<InterfaceRef>>, EffectError> {
        let mut slots = BTreeMap::new();
        let mut parameters = interface_bindings.iter();

        for slot in &reflection.interface_slots {
            let end = slot.start.checked_add(slot.count).filter(|end| *end <= MAX_INTERFACES);
            if end.is_none() {
                return Err(malformed("interface slots exceed the supported count"));
            }

            if slot.is_parameter {
                for index in slot.start..slot.start + slot.count {
                    let binding = parameters
                        .next()
                        .ok_or_else(|| malformed("shader has fewer interface bindings than parameters"))?;
                    slots.insert(index, *binding);
                }
            } else {
                let (variable, element) = self.find_bound_variable(&slot.name, slot.count)?;
                for (i, index) in (slot.start..slot.start + slot.count).enumerate() {
                    slots.insert(index, self.interface_ref(variable, element + i as u32)?);
                }
            }
        }

        Ok(dense_range(&slots, 0, InterfaceRef::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjacent_bind_points_merge() {
        let mut ranges = Vec::new();
        push_range(&mut ranges, 0, [1]);
        push_range(&mut ranges, 1, [2, 3]);
        push_range(&mut ranges, 5, [4]);
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0].items, vec![1, 2, 3]);
        assert_eq!((ranges[1].start, ranges[1].end()), (5, 6));
    }

    #[test]
    fn sparse_slots_are_padded() {
        let slots = BTreeMap::from([(1, Some(7)), (3, Some(9))]);
        let range = dense_range(&slots, 0, None).expect("range");
        assert_eq!(range.items, vec![None, Some(7), None, Some(9)]);
        assert!(dense_range(&BTreeMap::<u32, Option<u32>>::new(), 0, None).is_none());
    }

    #[test]
    fn element_names_are_split() {
        assert_eq!(split_element("g_Textures[3]"), Some(("g_Textures", 3)));
        assert_eq!(split_element("g_Texture"), None);
        assert_eq!(split_element("g_Textures[x]"), None);
    }
}
