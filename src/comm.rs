use crate::config;
use crate::error::{CommError, CommResult};

use bincode::Options;
use enum_dispatch::enum_dispatch;
use serde::de::{DeserializeOwned, DeserializeSeed, Deserializer, SeqAccess, Visitor};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

pub(crate) mod local_comm;
pub(crate) mod thread_comm;
use local_comm::LocalComm;
use thread_comm::ThreadComm;

/// Element types that can travel between pes.
pub trait Dist: Serialize + DeserializeOwned + Copy + Send + Sync + 'static {}
impl<T: Serialize + DeserializeOwned + Copy + Send + Sync + 'static> Dist for T {}

/// The list of available comm backends, used to specify how data is transfered between PEs
#[derive(
    serde::Serialize, serde::Deserialize, Debug, PartialEq, Eq, Ord, PartialOrd, Hash, Clone, Copy,
)]
pub enum Backend {
    /// A single pe running on the calling thread
    Local,
    /// One pe per thread inside this process, communicating only through messages
    Threads,
}

impl Default for Backend {
    fn default() -> Self {
        match config().backend.as_str() {
            "local" => Backend::Local,
            _ => Backend::Threads,
        }
    }
}

/// An encoded message payload.
#[derive(Clone, Debug)]
pub(crate) struct SerializedData(Vec<u8>);

impl SerializedData {
    pub(crate) fn new<T: Dist>(data: &[T]) -> CommResult<SerializedData> {
        Ok(SerializedData(bincode::serialize(data)?))
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }

    #[cfg(test)]
    pub(crate) fn deserialize<T: Dist>(&self) -> CommResult<Vec<T>> {
        Ok(bincode::deserialize(&self.0)?)
    }

    /// Decode into `buf`, which must have exactly the sent length.
    pub(crate) fn deserialize_into<T: Dist>(&self, buf: &mut [T]) -> CommResult<()> {
        let expected = buf.len();
        // same encoding as bincode::serialize
        let received = bincode::DefaultOptions::new()
            .with_fixint_encoding()
            .allow_trailing_bytes()
            .deserialize_seed(SliceFiller(buf), &self.0)?;
        if received != expected {
            return Err(CommError::SizeMismatch { expected, received });
        }
        Ok(())
    }
}

/// Decodes a sequence in place, yielding the number of elements sent.
/// A sequence of the wrong length is left undecoded.
struct SliceFiller<'a, T>(&'a mut [T]);

impl<'de, 'a, T: Dist> DeserializeSeed<'de> for SliceFiller<'a, T> {
    type Value = usize;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<usize, D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de, 'a, T: Dist> Visitor<'de> for SliceFiller<'a, T> {
    type Value = usize;

    fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "a sequence of {} elements", self.0.len())
    }

    fn visit_seq<S: SeqAccess<'de>>(self, mut seq: S) -> Result<usize, S::Error> {
        if let Some(len) = seq.size_hint() {
            if len != self.0.len() {
                return Ok(len);
            }
        }
        let mut received = 0;
        while let Some(value) = seq.next_element::<T>()? {
            if let Some(slot) = self.0.get_mut(received) {
                *slot = value;
            }
            received += 1;
        }
        Ok(received)
    }
}

/// A message in flight, matched by (src, team, tag) at the receiver.
#[derive(Debug)]
pub(crate) struct Envelope {
    pub(crate) src: usize,
    pub(crate) team: u64,
    pub(crate) tag: u64,
    pub(crate) data: SerializedData,
}

impl Envelope {
    pub(crate) fn matches(&self, team: u64, tag: u64) -> bool {
        self.team == team && self.tag == tag
    }
}

/// Group wide abort state, shared by every pe of a world.
#[derive(Debug, Default)]
pub(crate) struct AbortFlag {
    aborted: AtomicBool,
    code: AtomicI32,
}

impl AbortFlag {
    pub(crate) fn raise(&self, code: i32) {
        // first code wins
        if self
            .aborted
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.code.store(code, Ordering::SeqCst);
        }
    }

    pub(crate) fn get(&self) -> Option<i32> {
        if self.aborted.load(Ordering::SeqCst) {
            Some(self.code.load(Ordering::SeqCst))
        } else {
            None
        }
    }
}

#[enum_dispatch]
pub(crate) trait CommOps {
    /// world id of the calling pe
    fn my_pe(&self) -> usize;
    fn num_pes(&self) -> usize;
    fn backend(&self) -> Backend;
    /// eager send, never waits for the receiver
    fn send(&self, dst: usize, envelope: Envelope) -> CommResult<()>;
    /// blocks until a message from `src` with the given team and tag arrives
    fn recv(&self, src: usize, team: u64, tag: u64) -> CommResult<Envelope>;
    /// raise the group abort flag, unblocking every pe waiting in `recv`
    fn abort(&self, code: i32);
    fn aborted(&self) -> Option<i32>;
    fn bytes_sent(&self) -> usize;
}

#[enum_dispatch(CommOps)]
#[derive(Debug)]
pub(crate) enum Comm {
    Local(LocalComm),
    Threads(ThreadComm),
}

/// Build one comm endpoint per pe of a new world.
pub(crate) fn create_comms(backend: Backend, num_pes: usize) -> CommResult<Vec<Comm>> {
    if num_pes == 0 {
        return Err(CommError::Backend("a world needs at least one pe".to_owned()));
    }
    match backend {
        Backend::Local => {
            if num_pes != 1 {
                return Err(CommError::Backend(format!(
                    "the local backend runs exactly one pe, {} requested",
                    num_pes
                )));
            }
            Ok(vec![LocalComm::new().into()])
        }
        Backend::Threads => Ok(ThreadComm::fabric(num_pes)
            .into_iter()
            .map(Comm::from)
            .collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_round_trip_checks_length() {
        let data = SerializedData::new(&[1.5f64, -2.0, 3.25]).unwrap();
        let mut buf = [0.0f64; 3];
        data.deserialize_into(&mut buf).unwrap();
        assert_eq!(buf, [1.5, -2.0, 3.25]);
        let mut short = [0.0f64; 2];
        assert!(matches!(
            data.deserialize_into(&mut short),
            Err(CommError::SizeMismatch {
                expected: 2,
                received: 3
            })
        ));
    }

    #[test]
    fn decodes_in_place() {
        let data = SerializedData::new(&[7u64, 8, 9, 10]).unwrap();
        let mut buf = [0u64; 4];
        data.deserialize_into(&mut buf).unwrap();
        assert_eq!(buf, [7, 8, 9, 10]);
        let mut long = [0u64; 5];
        assert!(matches!(
            data.deserialize_into(&mut long),
            Err(CommError::SizeMismatch {
                expected: 5,
                received: 4
            })
        ));
        assert_eq!(long, [0; 5]);
        let empty = SerializedData::new::<u8>(&[]).unwrap();
        empty.deserialize_into::<u8>(&mut []).unwrap();
    }

    #[test]
    fn abort_keeps_first_code() {
        let flag = AbortFlag::default();
        assert_eq!(flag.get(), None);
        flag.raise(12);
        flag.raise(5);
        assert_eq!(flag.get(), Some(12));
    }

    #[test]
    fn local_backend_is_single_pe() {
        assert!(create_comms(Backend::Local, 1).is_ok());
        assert!(matches!(
            create_comms(Backend::Local, 4),
            Err(CommError::Backend(_))
        ));
        assert_eq!(create_comms(Backend::Threads, 4).unwrap().len(), 4);
    }
}
