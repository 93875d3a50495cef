use super::{AbortFlag, Backend, CommOps, Envelope};
use crate::config;
use crate::error::{CommError, CommResult};
use crate::grid_arch::IdError;

use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One pe of a world whose pes are threads of this process.
///
/// Every ordered pair of pes has its own unbounded channel, so messages
/// from one source are delivered in the order they were sent. Messages
/// that arrive before they are asked for wait in a per-source pending queue.
pub(crate) struct ThreadComm {
    my_pe: usize,
    num_pes: usize,
    outboxes: Vec<Sender<Envelope>>, // indexed by destination
    inboxes: Vec<Receiver<Envelope>>, // indexed by source
    pending: Mutex<Vec<VecDeque<Envelope>>>,
    abort: Arc<AbortFlag>,
    bytes_sent: AtomicUsize,
}

impl std::fmt::Debug for ThreadComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ThreadComm {{ pe: {} of {} }}", self.my_pe, self.num_pes)
    }
}

impl ThreadComm {
    /// Wire up `num_pes` endpoints, all sharing one abort flag.
    pub(crate) fn fabric(num_pes: usize) -> Vec<ThreadComm> {
        let abort = Arc::new(AbortFlag::default());
        let mut outboxes: Vec<Vec<Sender<Envelope>>> = (0..num_pes).map(|_| Vec::new()).collect();
        let mut inboxes: Vec<Vec<Receiver<Envelope>>> = (0..num_pes).map(|_| Vec::new()).collect();
        for src in 0..num_pes {
            for dst in 0..num_pes {
                let (tx, rx) = unbounded();
                outboxes[src].push(tx);
                inboxes[dst].push(rx);
            }
        }
        outboxes
            .into_iter()
            .zip(inboxes)
            .enumerate()
            .map(|(my_pe, (outboxes, inboxes))| ThreadComm {
                my_pe,
                num_pes,
                outboxes,
                inboxes,
                pending: Mutex::new((0..num_pes).map(|_| VecDeque::new()).collect()),
                abort: abort.clone(),
                bytes_sent: AtomicUsize::new(0),
            })
            .collect()
    }

    fn invalid_pe(&self, pe: usize) -> CommError {
        CommError::InvalidPe(IdError {
            parent_pe: pe,
            team_pe: pe,
        })
    }

    fn take_pending(&self, src: usize, team: u64, tag: u64) -> Option<Envelope> {
        let mut pending = self.pending.lock();
        let queue = &mut pending[src];
        let idx = queue.iter().position(|env| env.matches(team, tag))?;
        queue.remove(idx)
    }

    fn warn_potential_deadlock(&self, src: usize, tag: u64) {
        tracing::warn!(
            "[{}] potential deadlock detected: still waiting for pe {} (tag {:#x}).\n\
            Collective operations require every pe of the team to make the matching call in the same order.\n\
            The deadlock timeout can be set via the GRIDMM_DEADLOCK_TIMEOUT environment variable, the current timeout is {} seconds",
            self.my_pe,
            src,
            tag,
            config().deadlock_timeout
        );
    }
}

impl CommOps for ThreadComm {
    fn my_pe(&self) -> usize {
        self.my_pe
    }
    fn num_pes(&self) -> usize {
        self.num_pes
    }
    fn backend(&self) -> Backend {
        Backend::Threads
    }

    fn send(&self, dst: usize, envelope: Envelope) -> CommResult<()> {
        if let Some(code) = self.abort.get() {
            return Err(CommError::Aborted(code));
        }
        let outbox = self.outboxes.get(dst).ok_or_else(|| self.invalid_pe(dst))?;
        let len = envelope.data.len();
        outbox
            .send(envelope)
            .map_err(|_| CommError::Disconnected(dst))?;
        self.bytes_sent.fetch_add(len, Ordering::Relaxed);
        Ok(())
    }

    fn recv(&self, src: usize, team: u64, tag: u64) -> CommResult<Envelope> {
        let inbox = self.inboxes.get(src).ok_or_else(|| self.invalid_pe(src))?;
        if let Some(envelope) = self.take_pending(src, team, tag) {
            return Ok(envelope);
        }
        let poll = Duration::from_micros(config().poll_interval_us.max(1));
        let timeout = config().deadlock_timeout;
        let mut waiting_since = Instant::now();
        loop {
            if let Some(code) = self.abort.get() {
                return Err(CommError::Aborted(code));
            }
            match inbox.recv_timeout(poll) {
                Ok(envelope) if envelope.matches(team, tag) => return Ok(envelope),
                Ok(envelope) => self.pending.lock()[src].push_back(envelope),
                Err(RecvTimeoutError::Timeout) => {
                    if timeout > 0.0 && waiting_since.elapsed().as_secs_f64() > timeout {
                        self.warn_potential_deadlock(src, tag);
                        waiting_since = Instant::now();
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return Err(CommError::Disconnected(src)),
            }
        }
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

    fn envelope(src: usize, tag: u64, value: f64) -> Envelope {
        Envelope {
            src,
            team: 0,
            tag,
            data: SerializedData::new(&[value]).unwrap(),
        }
    }

    #[test]
    fn out_of_order_tags_are_held_back() {
        let comms = ThreadComm::fabric(2);
        comms[0].send(1, envelope(0, 1, 1.0)).unwrap();
        comms[0].send(1, envelope(0, 2, 2.0)).unwrap();
        let second = comms[1].recv(0, 0, 2).unwrap();
        assert_eq!(second.data.deserialize::<f64>().unwrap(), vec![2.0]);
        let first = comms[1].recv(0, 0, 1).unwrap();
        assert_eq!(first.data.deserialize::<f64>().unwrap(), vec![1.0]);
    }

    #[test]
    fn abort_unblocks_waiting_receiver() {
        let mut comms = ThreadComm::fabric(2);
        let pe1 = comms.pop().unwrap();
        let pe0 = comms.pop().unwrap();
        let waiter = std::thread::spawn(move || pe1.recv(0, 0, 7));
        std::thread::sleep(Duration::from_millis(20));
        pe0.abort(34);
        let res = waiter.join().unwrap();
        assert!(matches!(res, Err(CommError::Aborted(34))));
    }

    #[test]
    fn hung_up_peer_is_reported() {
        let mut comms = ThreadComm::fabric(2);
        let pe1 = comms.pop().unwrap();
        drop(comms);
        assert!(matches!(pe1.recv(0, 0, 0), Err(CommError::Disconnected(0))));
    }

    #[test]
    fn invalid_destination() {
        let comms = ThreadComm::fabric(2);
        assert!(matches!(
            comms[0].send(2, envelope(0, 0, 0.0)),
            Err(CommError::InvalidPe(_))
        ));
    }
}
