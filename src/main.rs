use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use fxrt::Effect;
use fxrt::device::recording::{RecordingContext, RecordingDevice};
use fxrt::model::{PassId, TechniqueId};
use fxrt::sample::{sample_effect, sample_reflector};
use itertools::Itertools;
use log::{info, trace};

use crate::settings::{CliArgs, Command, VariableOverride};

mod settings;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = CliArgs::parse();
    trace!("Starting with args: {:?}", args);

    match &args.command {
        Command::Inspect { file } => {
            let mut effect = load(file)?;
            if args.optimize {
                effect.optimize();
            }
            inspect(&effect)
        }
        Command::Apply {
            file,
            group,
            technique,
            pass,
            overrides,
            repeat,
        } => {
            let mut effect = load(file)?;
            let pass = select_pass(&effect, group.as_deref(), technique.as_deref(), pass.as_deref())?;
            apply(&mut effect, pass, overrides, *repeat, args.optimize)
        }
        Command::Sample { out } => {
            let bytes = sample_effect().context("Failed to write the sample effect")?;
            std::fs::write(out, &bytes).with_context(|| format!("Failed to write {}", out.display()))?;
            info!("Wrote {} bytes to {}", bytes.len(), out.display());
            Ok(())
        }
    }
}

fn load(file: &std::path::Path) -> anyhow::Result<Effect> {
    let bytes = std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    // Unknown bytecode reflects to no bindings, so this is fine for any effect.
    Effect::load_with_reflector(&bytes, &sample_reflector())
        .with_context(|| format!("Failed to load {}", file.display()))
}

fn inspect(effect: &Effect) -> anyhow::Result<()> {
    let desc = effect.desc();
    println!(
        "{} effect: {} constant buffers, {} variables, {} shaders{}",
        desc.version,
        desc.constant_buffers,
        desc.variables,
        desc.shaders,
        if desc.optimized { " (optimized)" } else { "" }
    );

    for index in 0..effect.group_count() {
        let group = effect.group_by_index(index)?;
        let group_desc = effect.group_desc(group)?;
        println!("group {}", group_desc.name.unwrap_or("<unnamed>"));
        for technique_index in 0..group_desc.techniques as usize {
            let technique = effect.group_technique_by_index(group, technique_index)?;
            let technique_desc = effect.technique_desc(technique)?;
            println!("  technique {}", technique_desc.name.unwrap_or("<unnamed>"));
            for pass_index in 0..technique_desc.passes as usize {
                let pass = effect.pass_by_index(technique, pass_index)?;
                let pass_desc = effect.pass_desc(pass)?;
                println!(
                    "    pass {} ({} assignments, {} evaluated on apply)",
                    pass_desc.name.unwrap_or("<unnamed>"),
                    pass_desc.assignments,
                    pass_desc.live_assignments
                );
            }
        }
    }

    for index in 0..effect.constant_buffer_count() {
        let cb = effect.constant_buffer_by_index(index)?;
        let cb_desc = effect.constant_buffer_desc(cb)?;
        println!(
            "{} {} ({} bytes)",
            if cb_desc.is_tbuffer { "tbuffer" } else { "cbuffer" },
            cb_desc.name.unwrap_or("<unnamed>"),
            cb_desc.size
        );
    }

    for index in 0..effect.variable_count() {
        let var = effect.variable_by_index(index)?;
        let var_desc = effect.variable_desc(var)?;
        let ty = effect.type_description(var_desc.ty)?;
        let location = match var_desc.buffer {
            Some((cb, offset)) => format!(" in buffer {} at {}", cb.0, offset),
            None => String::new(),
        };
        println!(
            "variable {}: {}{}",
            var_desc.name.unwrap_or("<unnamed>"),
            ty.name.unwrap_or("<unnamed>"),
            location
        );
    }
    Ok(())
}

fn select_pass(
    effect: &Effect,
    group: Option<&str>,
    technique: Option<&str>,
    pass: Option<&str>,
) -> anyhow::Result<PassId> {
    let technique: TechniqueId = match (group, technique) {
        (Some(group), Some(technique)) => effect.group_technique_by_name(effect.group_by_name(group)?, technique)?,
        (Some(group), None) => effect.group_technique_by_index(effect.group_by_name(group)?, 0)?,
        (None, Some(technique)) => effect.technique_by_name(technique)?,
        (None, None) => effect.technique_by_index(0)?,
    };
    Ok(match pass {
        Some(pass) => effect.pass_by_name(technique, pass)?,
        None => effect.pass_by_index(technique, 0)?,
    })
}

fn apply(
    effect: &mut Effect,
    pass: PassId,
    overrides: &[VariableOverride],
    repeat: u32,
    optimize: bool,
) -> anyhow::Result<()> {
    let device = Arc::new(RecordingDevice::new());
    effect.bind_to_device(device.clone())?;

    for value in overrides {
        let var = effect.variable_by_name(&value.name)?;
        effect
            .set_float_vector(var, 0, &value.values)
            .with_context(|| format!("Failed to set {} to {}", value.name, value.values.iter().join(", ")))?;
    }

    if optimize {
        effect.optimize();
    }

    if !effect.is_pass_valid(pass) {
        println!("warning: the pass references state the device refused to create");
    }

    println!("device:");
    for call in device.calls() {
        println!("  {:?}", call);
    }

    let mut context = RecordingContext::new();
    for round in 1..=repeat {
        effect.apply(pass, &mut context)?;
        println!("apply #{}:", round);
        for call in &context.calls {
            println!("  {:?}", call);
        }
        context.clear();
    }
    Ok(())
}
