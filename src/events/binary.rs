/*
 * Binary Log
 *
 * Self-delimiting binary encoding of the event stream. Records are
 * map-encoded bincode values written back to back; the reader pulls them
 * until end of input. Identical inputs produce byte-identical logs, and
 * replaying a log through a fresh writer reproduces it byte for byte.
 */

use std::io::{Read, Write};

use crate::error::SimResult;
use crate::events::{Event, EventSink};

/// Binary event writer.
pub struct BinaryLog<W: Write> {
    out: W,
}

impl<W: Write> BinaryLog<W> {
    pub fn new(out: W) -> BinaryLog<W> {
        BinaryLog { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> EventSink for BinaryLog<W> {
    fn emit(&mut self, event: &Event) -> SimResult<()> {
        bincode::serialize_into(&mut self.out, event)?;
        Ok(())
    }

    fn flush(&mut self) -> SimResult<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// Streaming reader over a binary event log.
pub struct BinaryReader<R: Read> {
    input: R,
}

impl<R: Read> BinaryReader<R> {
    pub fn new(input: R) -> BinaryReader<R> {
        BinaryReader { input }
    }
}

impl<R: Read> Iterator for BinaryReader<R> {
    type Item = SimResult<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        match bincode::deserialize_from(&mut self.input) {
            Ok(event) => Some(Ok(event)),
            Err(err) => match *err {
                bincode::ErrorKind::Io(ref io)
                    if io.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    None
                }
                _ => Some(Err(err.into())),
            },
        }
    }
}

/// Feed every event of a binary log into `sink`.
pub fn replay<R: Read>(input: R, sink: &mut dyn EventSink) -> SimResult<()> {
    for event in BinaryReader::new(input) {
        sink.emit(&event?)?;
    }
    sink.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ChainLink, Recorder, SwitchDirection};
    use crate::sched::types::{CoreUid, ModuleId, Relationship, ThreadId, ThreadRef};
    use crate::time::Time;

    fn sample_events() -> Vec<Event> {
        let thread = ThreadRef {
            module: ModuleId(0),
            thread: ThreadId(1),
        };
        vec![
            Event::Schedule {
                core: CoreUid(0),
                time: Time::ZERO,
                chain: vec![ChainLink {
                    thread,
                    relationship: Relationship::Child,
                }],
            },
            Event::ContextSwitch {
                core: CoreUid(0),
                time: Time::ZERO,
                direction: SwitchDirection::Down,
                cost: Time::new(1, 2),
            },
            Event::ThreadExecute {
                core: CoreUid(0),
                time: Time::new(1, 2),
                thread,
                run_time: Time::from_units(10),
            },
            Event::TimerSet {
                core: CoreUid(0),
                time: Time::from_units(3),
                index: 0,
                timeout: None,
            },
        ]
    }

    #[test]
    fn round_trips_events() {
        let mut log = BinaryLog::new(Vec::new());
        for event in sample_events() {
            log.emit(&event).unwrap();
        }
        let bytes = log.into_inner();
        let decoded: Vec<Event> = BinaryReader::new(bytes.as_slice())
            .collect::<SimResult<_>>()
            .unwrap();
        assert_eq!(decoded, sample_events());
    }

    #[test]
    fn replay_is_byte_identical() {
        let mut first = BinaryLog::new(Vec::new());
        for event in sample_events() {
            first.emit(&event).unwrap();
        }
        let bytes = first.into_inner();

        let mut second = BinaryLog::new(Vec::new());
        replay(bytes.as_slice(), &mut second).unwrap();
        assert_eq!(second.into_inner(), bytes);
    }

    #[test]
    fn replay_surfaces_garbage() {
        let mut recorder = Recorder::new();
        let garbage = [0xfeu8, 0xff, 0xff, 0xff, 0x00, 0x01, 0x02];
        assert!(replay(garbage.as_slice(), &mut recorder).is_err());
    }
}
