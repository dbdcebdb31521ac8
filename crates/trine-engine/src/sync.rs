//! Triple-buffer endpoints owned by one unit.
//!
//! At tick start every registered reader swaps and the unit copies each of
//! its inputs out of the pinned slot into a local snapshot. The copy is
//! retried until the reader reports it intact, then the pin is released.
//! Systems read the snapshots, so a contended write swap that reclaims a
//! slot can never change a frame under them. At tick end every output's
//! local view is committed and each writer swaps once, publishing its
//! whole flag group at one generation.
//!
//! A [`FlagWriter`] is moved into exactly one `SyncPorts`; a second unit
//! cannot register it:
//!
//! ```compile_fail
//! use trine_buffer::TripleBufferFlags;
//! use trine_engine::SyncPorts;
//!
//! let (_flags, writer) = TripleBufferFlags::new(1);
//! let mut game = SyncPorts::new();
//! let mut render = SyncPorts::new();
//! game.add_writer(writer).unwrap();
//! render.add_writer(writer).unwrap();
//! ```

use indexmap::IndexMap;
use trine_buffer::triple::MAX_READ_ATTEMPTS;
use trine_buffer::{
    BufferError, FlagReader, FlagWriter, FlagsId, ObjectBufferView, ObjectTripleBuffer, ReadSwap,
    ReadView,
};
use trine_core::{Generation, UnitId};

use crate::error::WiringError;
use crate::host::ResourceHost;
use crate::resource::ResourceManager;

/// Handle to an output registered with [`SyncPorts::add_output`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OutputId(usize);

/// Handle to an input registered with [`SyncPorts::add_input`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InputId(usize);

struct Output {
    buffer: ObjectTripleBuffer,
    local: ObjectBufferView,
}

struct Input {
    flags: FlagsId,
    buffer: ObjectTripleBuffer,
    snapshot: ObjectBufferView,
    /// Copy target; swapped with `snapshot` once validated.
    staging: ObjectBufferView,
}

struct ReaderPort {
    reader: FlagReader,
    /// Generation held by the snapshots of this group.
    held: Option<Generation>,
}

/// Result of one commit pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CommitSummary {
    /// Writers swapped.
    pub published: u32,
    /// Swaps that fell back to round-robin because every candidate slot
    /// was pinned.
    pub contended: u32,
}

/// Result of one snapshot pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    /// Flag groups whose snapshots moved to a newer generation.
    pub fresh: u32,
    /// Copies discarded because the producer reclaimed the slot mid-copy.
    pub torn: u32,
    /// Flag groups that kept their previous snapshot after every attempt
    /// was torn.
    pub stale: u32,
}

/// Readers, writers, inputs, and outputs of one unit.
#[derive(Default)]
pub struct SyncPorts {
    readers: IndexMap<FlagsId, ReaderPort>,
    writers: IndexMap<FlagsId, FlagWriter>,
    inputs: Vec<Input>,
    outputs: Vec<Output>,
}

impl SyncPorts {
    /// No endpoints.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a reader. One reader per flag group.
    pub fn add_reader(&mut self, reader: FlagReader) -> Result<FlagsId, WiringError> {
        let flags = reader.id();
        if self.readers.contains_key(&flags) {
            return Err(WiringError::DuplicateReader { flags });
        }
        self.readers.insert(flags, ReaderPort { reader, held: None });
        Ok(flags)
    }

    /// Take ownership of the writer capability of a flag group.
    pub fn add_writer(&mut self, writer: FlagWriter) -> Result<FlagsId, WiringError> {
        let flags = writer.id();
        if self.writers.contains_key(&flags) {
            return Err(WiringError::DuplicateWriter { flags });
        }
        self.writers.insert(flags, writer);
        Ok(flags)
    }

    /// Register a buffer this unit reads each tick. Its reader must
    /// already be registered.
    pub fn add_input(&mut self, buffer: ObjectTripleBuffer) -> Result<InputId, WiringError> {
        let flags = buffer.flags_id();
        if !self.readers.contains_key(&flags) {
            return Err(WiringError::NoReader { flags });
        }
        let snapshot = buffer.local_view();
        let staging = buffer.local_view();
        self.inputs.push(Input {
            flags,
            buffer,
            snapshot,
            staging,
        });
        Ok(InputId(self.inputs.len() - 1))
    }

    /// Register a buffer this unit publishes each tick. Its writer must
    /// already be registered.
    pub fn add_output(&mut self, buffer: ObjectTripleBuffer) -> Result<OutputId, WiringError> {
        let flags = buffer.flags_id();
        if !self.writers.contains_key(&flags) {
            return Err(WiringError::NoWriter { flags });
        }
        let local = buffer.local_view();
        self.outputs.push(Output { buffer, local });
        Ok(OutputId(self.outputs.len() - 1))
    }

    /// Local working view of an output, mutated by systems during a tick.
    pub fn local(&self, id: OutputId) -> &ObjectBufferView {
        &self.outputs[id.0].local
    }

    /// Snapshot of an input taken at tick start, `None` until its producer
    /// has published an intact frame.
    pub fn read_view(&self, id: InputId) -> Option<ReadView<'_>> {
        let input = &self.inputs[id.0];
        self.readers.get(&input.flags)?.held?;
        Some(input.snapshot.as_read())
    }

    /// Generation held by an input's snapshot.
    pub fn input_generation(&self, id: InputId) -> Option<Generation> {
        self.readers.get(&self.inputs[id.0].flags)?.held
    }

    /// Reader of a flag group.
    pub fn reader(&self, flags: FlagsId) -> Option<&FlagReader> {
        self.readers.get(&flags).map(|port| &port.reader)
    }

    /// Writer of a flag group.
    pub fn writer(&self, flags: FlagsId) -> Option<&FlagWriter> {
        self.writers.get(&flags)
    }

    /// Registered inputs.
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Registered outputs.
    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    /// Swap every reader and copy its group's inputs into their snapshots.
    ///
    /// A group whose copies stay torn for `MAX_READ_ATTEMPTS` swaps keeps
    /// its previous snapshot.
    pub(crate) fn refresh_inputs(&mut self) -> Result<RefreshSummary, BufferError> {
        let mut summary = RefreshSummary::default();
        for (flags, port) in self.readers.iter_mut() {
            let mut settled = false;
            for _ in 0..MAX_READ_ATTEMPTS {
                let generation = match port.reader.swap_read_buffer_flags() {
                    ReadSwap::NothingPublished => {
                        settled = true;
                        break;
                    }
                    ReadSwap::Unchanged(g) if port.held == Some(g) => {
                        port.reader.release();
                        settled = true;
                        break;
                    }
                    swap => swap.generation(),
                };
                for input in self.inputs.iter().filter(|i| i.flags == *flags) {
                    if let Some(slot) = input.buffer.buffer().read_region(&port.reader)? {
                        input.staging.region().copy_from(slot);
                    }
                }
                if port.reader.is_intact() {
                    port.reader.release();
                    for input in self.inputs.iter_mut().filter(|i| i.flags == *flags) {
                        std::mem::swap(&mut input.snapshot, &mut input.staging);
                    }
                    if generation > port.held {
                        summary.fresh += 1;
                    }
                    port.held = generation;
                    settled = true;
                    break;
                }
                summary.torn += 1;
            }
            if !settled {
                port.reader.release();
                summary.stale += 1;
                tracing::debug!(%flags, held = ?port.held, "input copies kept tearing; snapshot kept");
            }
        }
        Ok(summary)
    }

    /// Copy every output into its write slot, then swap each writer once.
    pub(crate) fn commit_outputs(&mut self) -> Result<CommitSummary, BufferError> {
        let mut summary = CommitSummary::default();
        if self.outputs.is_empty() {
            return Ok(summary);
        }
        for output in &self.outputs {
            let flags = output.buffer.flags_id();
            let writer = self.writers.get(&flags).ok_or(BufferError::ForeignFlags)?;
            output.buffer.commit(writer, &output.local)?;
        }
        for writer in self.writers.values_mut() {
            let outcome = writer.swap_write_buffer_flags();
            summary.published += 1;
            if outcome.contended {
                summary.contended += 1;
            }
        }
        Ok(summary)
    }
}

/// Everything a unit's bootstrap may wire before modules run.
pub struct Wiring<'a> {
    /// Unit being bootstrapped.
    pub unit: UnitId,
    /// Triple-buffer endpoints.
    pub sync: &'a mut SyncPorts,
    /// Requester side of the resource protocol.
    pub resources: &'a mut ResourceManager,
    /// Owner side of the resource protocol.
    pub host: &'a mut ResourceHost,
}

#[cfg(test)]
mod tests {
    use super::*;
    use trine_buffer::{Schema, TripleBufferFlags};
    use trine_core::ElementType;
    use trine_test_utils::health_schema;

    fn hp_buffer(flags: &TripleBufferFlags) -> ObjectTripleBuffer {
        ObjectTripleBuffer::new(health_schema(), flags)
    }

    #[test]
    fn output_requires_writer() {
        let (flags, _writer) = TripleBufferFlags::new(1);
        let mut ports = SyncPorts::new();
        assert_eq!(
            ports.add_output(hp_buffer(&flags)),
            Err(WiringError::NoWriter { flags: flags.id() })
        );
    }

    #[test]
    fn duplicate_reader_rejected() {
        let (flags, _writer) = TripleBufferFlags::new(2);
        let mut ports = SyncPorts::new();
        ports.add_reader(flags.reader().unwrap()).unwrap();
        assert_eq!(
            ports.add_reader(flags.reader().unwrap()),
            Err(WiringError::DuplicateReader { flags: flags.id() })
        );
    }

    #[test]
    fn input_requires_reader() {
        let (flags, _writer) = TripleBufferFlags::new(1);
        let mut ports = SyncPorts::new();
        assert_eq!(
            ports.add_input(hp_buffer(&flags)),
            Err(WiringError::NoReader { flags: flags.id() })
        );
    }

    fn hp(ports: &SyncPorts, input: InputId) -> u32 {
        ports
            .read_view(input)
            .unwrap()
            .span::<u32>("hp")
            .unwrap()
            .get(0)
    }

    fn publish(producer: &mut SyncPorts, out: OutputId, value: u32) -> CommitSummary {
        producer.local(out).span::<u32>("hp").unwrap().set(0, value);
        producer.commit_outputs().unwrap()
    }

    #[test]
    fn producer_and_consumer_ports() {
        let (flags, writer) = TripleBufferFlags::new(1);
        let buffer = hp_buffer(&flags);

        let mut producer = SyncPorts::new();
        producer.add_writer(writer).unwrap();
        let out = producer.add_output(buffer.clone()).unwrap();

        let mut consumer = SyncPorts::new();
        consumer.add_reader(flags.reader().unwrap()).unwrap();
        let input = consumer.add_input(buffer).unwrap();

        assert_eq!(consumer.refresh_inputs().unwrap(), RefreshSummary::default());
        assert!(consumer.read_view(input).is_none());

        let summary = publish(&mut producer, out, 42);
        assert_eq!(summary, CommitSummary { published: 1, contended: 0 });

        assert_eq!(consumer.refresh_inputs().unwrap().fresh, 1);
        assert_eq!(hp(&consumer, input), 42);
        assert_eq!(consumer.input_generation(input), Some(Generation(1)));
        assert_eq!(consumer.refresh_inputs().unwrap().fresh, 0);
        // The snapshot holds no pin between ticks.
        assert_eq!(consumer.reader(flags.id()).unwrap().read_index(), None);
    }

    #[test]
    fn snapshots_survive_a_contended_reclaim() {
        let (flags, writer) = TripleBufferFlags::new(4);
        let buffer = hp_buffer(&flags);

        let mut producer = SyncPorts::new();
        producer.add_writer(writer).unwrap();
        let out = producer.add_output(buffer.clone()).unwrap();

        let mut main = SyncPorts::new();
        main.add_reader(flags.reader().unwrap()).unwrap();
        let main_in = main.add_input(buffer.clone()).unwrap();
        let mut render = SyncPorts::new();
        render.add_reader(flags.reader().unwrap()).unwrap();
        let render_in = render.add_input(buffer.clone()).unwrap();

        // Two slow consumers reading in place hold both candidate slots.
        let mut slow_a = flags.reader().unwrap();
        let mut slow_b = flags.reader().unwrap();

        publish(&mut producer, out, 1);
        main.refresh_inputs().unwrap();
        slow_a.swap_read_buffer_flags();
        publish(&mut producer, out, 2);
        render.refresh_inputs().unwrap();
        slow_b.swap_read_buffer_flags();
        assert_eq!(publish(&mut producer, out, 3).contended, 1);
        assert_eq!(flags.contended_swaps(), 1);
        publish(&mut producer, out, 4);

        // The in-place reader's slot was reclaimed and rewritten.
        assert!(!slow_a.is_intact());
        assert_eq!(buffer.read_view(&slow_a).unwrap().unwrap().span::<u32>("hp").unwrap().get(0), 4);

        // The snapshots were not.
        assert_eq!(hp(&main, main_in), 1);
        assert_eq!(main.input_generation(main_in), Some(Generation(1)));
        assert_eq!(hp(&render, render_in), 2);

        let summary = main.refresh_inputs().unwrap();
        assert_eq!(summary, RefreshSummary { fresh: 1, torn: 0, stale: 0 });
        assert_eq!(hp(&main, main_in), 4);
        assert_eq!(main.input_generation(main_in), Some(Generation(4)));
        render.refresh_inputs().unwrap();
        assert_eq!(hp(&render, render_in), 4);
    }

    #[test]
    fn inputs_in_one_group_share_a_generation() {
        let (flags, writer) = TripleBufferFlags::new(1);
        let hp_buf = hp_buffer(&flags);
        let ammo_schema = Schema::builder("ammo")
            .field("ammo", ElementType::U16, 2)
            .build()
            .unwrap();
        let ammo_buf = ObjectTripleBuffer::new(ammo_schema, &flags);

        let mut producer = SyncPorts::new();
        producer.add_writer(writer).unwrap();
        let hp_out = producer.add_output(hp_buf.clone()).unwrap();
        let ammo_out = producer.add_output(ammo_buf.clone()).unwrap();

        let mut consumer = SyncPorts::new();
        consumer.add_reader(flags.reader().unwrap()).unwrap();
        let hp_in = consumer.add_input(hp_buf).unwrap();
        let ammo_in = consumer.add_input(ammo_buf).unwrap();

        producer.local(ammo_out).span::<u16>("ammo").unwrap().set(1, 30);
        publish(&mut producer, hp_out, 90);
        assert_eq!(consumer.refresh_inputs().unwrap().fresh, 1);
        assert_eq!(hp(&consumer, hp_in), 90);
        let ammo = consumer.read_view(ammo_in).unwrap().span::<u16>("ammo").unwrap().get(1);
        assert_eq!(ammo, 30);
        assert_eq!(consumer.input_generation(hp_in), consumer.input_generation(ammo_in));
        assert_eq!(consumer.input_count(), 2);
    }

    #[test]
    fn writer_without_outputs_does_not_publish() {
        let (flags, writer) = TripleBufferFlags::new(1);
        let mut ports = SyncPorts::new();
        ports.add_writer(writer).unwrap();
        assert_eq!(ports.commit_outputs().unwrap().published, 0);
        assert_eq!(flags.latest_generation().0, 0);
    }
}
