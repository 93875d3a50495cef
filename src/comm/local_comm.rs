use super::{AbortFlag, Backend, CommOps, Envelope};
use crate::error::{CommError, CommResult};
use crate::grid_arch::IdError;

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Single pe backend, messages can only be sent to oneself.
#[derive(Debug)]
pub(crate) struct LocalComm {
    mailbox: Mutex<VecDeque<Envelope>>,
    abort: AbortFlag,
    bytes_sent: AtomicUsize,
}

impl LocalComm {
    pub(crate) fn new() -> LocalComm {
        LocalComm {
            mailbox: Mutex::new(VecDeque::new()),
            abort: AbortFlag::default(),
            bytes_sent: AtomicUsize::new(0),
        }
    }

    fn check_pe(pe: usize) -> CommResult<()> {
        if pe == 0 {
            Ok(())
        } else {
            Err(CommError::InvalidPe(IdError {
                parent_pe: pe,
                team_pe: pe,
            }))
        }
    }
}

impl CommOps for LocalComm {
    fn my_pe(&self) -> usize {
        0
    }
    fn num_pes(&self) -> usize {
        1
    }
    fn backend(&self) -> Backend {
        Backend::Local
    }

    fn send(&self, dst: usize, envelope: Envelope) -> CommResult<()> {
        Self::check_pe(dst)?;
        if let Some(code) = self.abort.get() {
            return Err(CommError::Aborted(code));
        }
        self.bytes_sent
            .fetch_add(envelope.data.len(), Ordering::Relaxed);
        self.mailbox.lock().push_back(envelope);
        Ok(())
    }

    fn recv(&self, src: usize, team: u64, tag: u64) -> CommResult<Envelope> {
        Self::check_pe(src)?;
        if let Some(code) = self.abort.get() {
            return Err(CommError::Aborted(code));
        }
        let mut mailbox = self.mailbox.lock();
        let idx = mailbox.iter().position(|env| env.matches(team, tag));
        // nobody else can ever send to the only pe
        idx.and_then(|idx| mailbox.remove(idx))
            .ok_or(CommError::Unmatched { src, tag })
    }

    fn abort(&self, code: i32) {
        self.abort.raise(code);
    }

    fn aborted(&self) -> Option<i32> {
        self.abort.get()
    }

    fn bytes_sent(&self) -> usize {
        self.bytes_sent.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SerializedData;

    fn envelope(tag: u64, value: f64) -> Envelope {
        Envelope {
            src: 0,
            team: 1,
            tag,
            data: SerializedData::new(&[value]).unwrap(),
        }
    }

    #[test]
    fn self_messages_match_by_tag() {
        let comm = LocalComm::new();
        comm.send(0, envelope(3, 3.0)).unwrap();
        comm.send(0, envelope(4, 4.0)).unwrap();
        let env = comm.recv(0, 1, 4).unwrap();
        assert_eq!(env.data.deserialize::<f64>().unwrap(), vec![4.0]);
        let env = comm.recv(0, 1, 3).unwrap();
        assert_eq!(env.data.deserialize::<f64>().unwrap(), vec![3.0]);
        assert!(comm.bytes_sent() > 0);
    }

    #[test]
    fn missing_message_is_an_error() {
        let comm = LocalComm::new();
        assert!(matches!(
            comm.recv(0, 1, 9),
            Err(CommError::Unmatched { src: 0, tag: 9 })
        ));
        assert!(matches!(
            comm.send(1, envelope(0, 0.0)),
            Err(CommError::InvalidPe(_))
        ));
    }

    #[test]
    fn abort_fails_later_calls() {
        let comm = LocalComm::new();
        comm.abort(12);
        assert!(matches!(comm.recv(0, 1, 0), Err(CommError::Aborted(12))));
        assert_eq!(comm.aborted(), Some(12));
    }
}
