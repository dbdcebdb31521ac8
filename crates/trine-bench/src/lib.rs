//! Benchmark profiles for Trine.
//!
//! - [`frame_profile`]: a transform buffer with its writer and one reader,
//!   sized for a given number of renderables
//! - [`fill_transforms`]: deterministic per-frame transform data
//! - [`pipeline_unit`]: a lockstep unit publishing transforms through a
//!   chain of systems

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use trine_buffer::{
    FlagReader, FlagWriter, ObjectBufferView, ObjectTripleBuffer, TripleBufferFlags, ViewError,
};
use trine_core::{ResourceIdAllocator, UnitId};
use trine_engine::{
    LocalUnit, ModuleDef, ModuleError, OutputId, PendingUnit, SystemDef, UnitConfig, UnitError,
    UnitKind, Wiring,
};
use trine_test_utils::transform_schema;

/// Renderables in the reference scene.
pub const REFERENCE_RENDERABLES: usize = 1_000;

/// A transform buffer and both ends of its flag register.
pub struct FrameProfile {
    /// Flag register governing `buffer`.
    pub flags: TripleBufferFlags,
    /// Producer capability.
    pub writer: FlagWriter,
    /// A single consumer.
    pub reader: FlagReader,
    /// The shared transform buffer.
    pub buffer: ObjectTripleBuffer,
}

/// Build a transform buffer for `renderables` objects.
pub fn frame_profile(renderables: usize) -> FrameProfile {
    let (flags, writer) = TripleBufferFlags::new(1);
    let buffer = ObjectTripleBuffer::new(transform_schema(renderables), &flags);
    let reader = flags.reader().expect("fresh register has a reader slot");
    FrameProfile {
        flags,
        writer,
        reader,
        buffer,
    }
}

/// Write frame `frame` of a rotating scene into `local`.
pub fn fill_transforms(local: &ObjectBufferView, frame: u32) -> Result<(), ViewError> {
    let position = local.span::<f32>("position")?;
    let quaternion = local.span::<f32>("quaternion")?;
    let scale = local.span::<f32>("scale")?;
    let mesh = local.span::<u32>("mesh")?;
    let visible = local.span::<u8>("visible")?;

    let t = frame as f32 * 0.016;
    let (sin, cos) = (t * 0.5).sin_cos();
    scale.fill(1.0);
    for i in 0..mesh.len() {
        let x = i as f32;
        position.set(i * 3, x + t);
        position.set(i * 3 + 1, 0.0);
        position.set(i * 3 + 2, -x);
        quaternion.set(i * 4, 0.0);
        quaternion.set(i * 4 + 1, sin);
        quaternion.set(i * 4 + 2, 0.0);
        quaternion.set(i * 4 + 3, cos);
        mesh.set(i, (i % 16) as u32 + 1);
        visible.set(i, u8::from(i % 7 != 0));
    }
    Ok(())
}

/// Unit kind used by [`pipeline_unit`].
pub struct Pipeline;

/// State of a [`Pipeline`] unit.
pub struct PipelineState {
    out: OutputId,
    frame: u32,
}

impl UnitKind for Pipeline {
    type State = PipelineState;
    type Message = ();
    type Init = (FlagWriter, ObjectTripleBuffer);

    fn bootstrap(
        (writer, buffer): (FlagWriter, ObjectTripleBuffer),
        wiring: &mut Wiring<'_>,
    ) -> Result<PipelineState, ModuleError> {
        wiring.sync.add_writer(writer)?;
        let out = wiring.sync.add_output(buffer)?;
        Ok(PipelineState { out, frame: 0 })
    }
}

/// A started lockstep unit that writes `renderables` transforms per tick,
/// preceded by `extra_systems` empty systems chained with `after`
/// constraints.
pub fn pipeline_unit(
    renderables: usize,
    extra_systems: usize,
) -> Result<(LocalUnit<Pipeline>, FlagReader, ObjectTripleBuffer), UnitError> {
    let profile = frame_profile(renderables);
    let module = ModuleDef::<Pipeline>::new("scene", move |ctx| {
        for i in 0..extra_systems {
            let mut def = SystemDef::<Pipeline>::new(format!("stage{i}"), |_| Ok(()));
            if i > 0 {
                def = def.after(format!("stage{}", i - 1));
            }
            ctx.add_system(def)?;
        }
        ctx.add_system(SystemDef::<Pipeline>::new("transforms", |ctx| {
            ctx.state.frame += 1;
            fill_transforms(ctx.sync.local(ctx.state.out), ctx.state.frame)?;
            Ok(())
        }))?;
        Ok(())
    });
    let mut unit = PendingUnit::<Pipeline>::new(
        UnitId(1),
        UnitConfig::named("bench"),
        ResourceIdAllocator::new(),
    )?
    .initialize((profile.writer, profile.buffer.clone()), vec![module])?;
    unit.start();
    Ok((unit, profile.reader, profile.buffer))
}
