//! Frames flowing from a threaded game unit to its consumers.
//!
//! The game unit writes the same counter into both fields of a
//! [`pair_schema`] buffer every tick. Readers on other threads must never
//! see the two fields disagree, and generations must never go backwards.

use std::time::{Duration, Instant};

use trine_buffer::{FlagReader, FlagWriter, ObjectTripleBuffer, ReadError};
use trine_core::{Generation, ResourceIdAllocator, UnitId};
use trine_engine::{
    spawn_unit, InputId, LocalUnit, ModuleDef, ModuleError, OutputId, PendingUnit, Phase,
    SystemDef, SystemError, UnitConfig, UnitKind, UnitState, Wiring,
};
use trine_test_utils::{pair_schema, BufferGroup};

// ── Game: publishes a pair per tick ────────────────────────────────

struct Game;

struct GameState {
    out: OutputId,
    frame: u64,
}

impl UnitKind for Game {
    type State = GameState;
    type Message = ();
    type Init = (FlagWriter, ObjectTripleBuffer);

    fn bootstrap(
        (writer, buffer): (FlagWriter, ObjectTripleBuffer),
        wiring: &mut Wiring<'_>,
    ) -> Result<GameState, ModuleError> {
        wiring.sync.add_writer(writer)?;
        let out = wiring.sync.add_output(buffer)?;
        Ok(GameState { out, frame: 0 })
    }
}

fn simulation() -> ModuleDef<Game> {
    ModuleDef::<Game>::new("simulation", |ctx| {
        ctx.add_system(
            SystemDef::<Game>::new("write_pair", |ctx| {
                ctx.state.frame += 1;
                let frame = ctx.state.frame;
                let local = ctx.sync.local(ctx.state.out);
                local.span::<u64>("a")?.set(0, frame);
                local.span::<u64>("b")?.set(0, frame);
                Ok(())
            })
            .phase(Phase::Post),
        )?;
        Ok(())
    })
}

fn fast_config(name: &str) -> UnitConfig {
    UnitConfig {
        tick_rate_hz: 500.0,
        ..UnitConfig::named(name)
    }
}

// ── Render: reads the pair each tick ───────────────────────────────

struct Render;

struct RenderState {
    frames: InputId,
    seen: Vec<(u64, u64)>,
}

impl UnitKind for Render {
    type State = RenderState;
    type Message = ();
    type Init = (FlagReader, ObjectTripleBuffer);

    fn bootstrap(
        (reader, frames): (FlagReader, ObjectTripleBuffer),
        wiring: &mut Wiring<'_>,
    ) -> Result<RenderState, ModuleError> {
        wiring.sync.add_reader(reader)?;
        let frames = wiring.sync.add_input(frames)?;
        Ok(RenderState {
            frames,
            seen: Vec::new(),
        })
    }
}

fn presenter() -> ModuleDef<Render> {
    ModuleDef::<Render>::new("presenter", |ctx| {
        ctx.add_system(
            SystemDef::<Render>::new("sample", |ctx| {
                let Some(view) = ctx.sync.read_view(ctx.state.frames) else {
                    return Ok(());
                };
                let a = view.span::<u64>("a")?.get(0);
                let b = view.span::<u64>("b")?.get(0);
                if a != b {
                    return Err(SystemError::msg(format!("torn frame: a={a} b={b}")));
                }
                ctx.state.seen.push((a, b));
                Ok(())
            })
            .phase(Phase::Pre),
        )?;
        // Runs after the sample; the snapshot must not have moved.
        ctx.add_system(
            SystemDef::<Render>::new("resample", |ctx| {
                let Some(&(a, _)) = ctx.state.seen.last() else {
                    return Ok(());
                };
                let Some(view) = ctx.sync.read_view(ctx.state.frames) else {
                    return Ok(());
                };
                if view.span::<u64>("a")?.get(0) != a {
                    return Err(SystemError::msg("frame changed during the tick"));
                }
                Ok(())
            })
            .phase(Phase::Post),
        )?;
        Ok(())
    })
}

fn render_unit(
    id: u32,
    ids: ResourceIdAllocator,
    reader: FlagReader,
    frames: ObjectTripleBuffer,
) -> LocalUnit<Render> {
    let mut unit = PendingUnit::<Render>::new(UnitId(id), UnitConfig::named("render"), ids)
        .unwrap()
        .initialize((reader, frames), vec![presenter()])
        .unwrap();
    unit.start();
    unit
}

fn assert_consistent(seen: &[(u64, u64)]) {
    for pair in seen.windows(2) {
        assert_eq!(pair[0].0, pair[0].1);
        assert!(pair[1].0 >= pair[0].0);
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[test]
fn reader_thread_sees_consistent_monotonic_frames() {
    let mut group = BufferGroup::new(1);
    let otb = group.add(pair_schema());
    let mut reader = group.reader();
    let flags = group.flags.clone();

    let mut game = spawn_unit::<Game>(UnitId(1), fast_config("game"), ResourceIdAllocator::new())
        .unwrap();
    game.initialize((group.writer, otb.clone()), vec![simulation()])
        .unwrap();
    game.wait_ready(Duration::from_secs(5)).unwrap();
    game.start().unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    let mut last_generation = Generation(0);
    let mut last_value = 0;
    let mut observed = 0;
    while observed < 20 && Instant::now() < deadline {
        match otb.read_with(&mut reader, |view| {
            let a = view.span::<u64>("a").unwrap().get(0);
            let b = view.span::<u64>("b").unwrap().get(0);
            (a, b)
        }) {
            Ok((a, b)) => {
                assert_eq!(a, b, "torn frame");
                assert!(a >= last_value, "value went backwards: {a} < {last_value}");
                let generation = reader.generation().unwrap_or(Generation(0));
                assert!(generation >= last_generation);
                if generation > last_generation {
                    observed += 1;
                }
                last_generation = generation;
                last_value = a;
            }
            Err(ReadError::NothingPublished | ReadError::Contended { .. }) => {}
            Err(e) => panic!("read failed: {e}"),
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    assert!(observed >= 20, "only {observed} fresh frames before the deadline");

    let report = game.shutdown();
    assert!(report.joined);
    assert!(report.ticks >= 20);
    assert_eq!(game.lifecycle(), UnitState::Disposed);
    assert!(flags.latest_generation() >= last_generation);
}

#[test]
fn lockstep_render_samples_a_threaded_game() {
    let mut group = BufferGroup::new(1);
    let otb = group.add(pair_schema());
    let reader = group.reader();
    let ids = ResourceIdAllocator::new();

    let mut game = spawn_unit::<Game>(UnitId(1), fast_config("game"), ids.clone()).unwrap();
    game.initialize((group.writer, otb.clone()), vec![simulation()])
        .unwrap();
    game.wait_ready(Duration::from_secs(5)).unwrap();

    let mut render = render_unit(2, ids, reader, otb);

    // Nothing published yet: the render tick still succeeds.
    render.tick().unwrap();
    assert!(render.state().seen.is_empty());

    game.start().unwrap();
    let deadline = Instant::now() + Duration::from_secs(10);
    while render.state().seen.len() < 10 && Instant::now() < deadline {
        render.tick().unwrap();
        std::thread::sleep(Duration::from_millis(2));
    }
    game.shutdown();

    let seen = &render.state().seen;
    assert!(seen.len() >= 10);
    assert_consistent(seen);
}

#[test]
fn two_consumers_keep_intact_frames_under_contention() {
    let mut group = BufferGroup::new(4);
    let otb = group.add(pair_schema());
    let main_reader = group.reader();
    let render_reader = group.reader();
    let mut slow_a = group.reader();
    let mut slow_b = group.reader();
    let flags = group.flags.clone();
    let ids = ResourceIdAllocator::new();

    let config = UnitConfig {
        tick_rate_hz: 2_000.0,
        tick_slack: Duration::ZERO,
        ..UnitConfig::named("game")
    };
    let mut game = spawn_unit::<Game>(UnitId(1), config, ids.clone()).unwrap();
    game.initialize((group.writer, otb.clone()), vec![simulation()])
        .unwrap();
    game.wait_ready(Duration::from_secs(5)).unwrap();

    let mut main = render_unit(2, ids.clone(), main_reader, otb.clone());
    let mut render = render_unit(3, ids, render_reader, otb);
    game.start().unwrap();

    // Two in-place readers pin alternate slots so the producer keeps
    // reclaiming round-robin.
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut ticks = 0;
    while ticks < 200 && Instant::now() < deadline {
        if ticks % 2 == 0 {
            slow_a.swap_read_buffer_flags();
        } else {
            slow_b.swap_read_buffer_flags();
        }
        main.tick().unwrap();
        render.tick().unwrap();
        ticks += 1;
        std::thread::sleep(Duration::from_micros(300));
    }
    game.shutdown();

    for unit in [&main, &render] {
        assert!(!unit.state().seen.is_empty());
        assert_consistent(&unit.state().seen);
        assert_eq!(unit.stats().failed_ticks(), 0);
    }
    assert!(flags.latest_generation() > Generation(0));
}
