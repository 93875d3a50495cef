use crate::grid_arch::IdError;

/// Error code used for invalid arguments and configurations.
pub const ERR_ARG: i32 = 12;
/// Error code used when local storage could not be allocated.
pub const ERR_NO_MEM: i32 = 34;
/// Error code used for failures of the message layer itself.
pub const ERR_COMM: i32 = 5;
/// Error code used when writing a view fails.
pub const ERR_IO: i32 = 42;

/// Failures of the message passing layer.
#[derive(Debug, Clone)]
pub enum CommError {
    /// Another pe aborted the group with the given code.
    Aborted(i32),
    /// The peer hung up before the expected message arrived.
    Disconnected(usize),
    /// A message did not have the length the receiver asked for.
    SizeMismatch { expected: usize, received: usize },
    /// A payload could not be encoded or decoded.
    Serialization(String),
    /// A pe id outside of the team was addressed.
    InvalidPe(IdError),
    /// A receive that no pending or future send can ever satisfy.
    Unmatched { src: usize, tag: u64 },
    /// The backend cannot host the requested world.
    Backend(String),
    /// A collective was called with arguments it cannot work with.
    InvalidArgument(String),
}

impl CommError {
    pub fn code(&self) -> i32 {
        match self {
            CommError::Aborted(code) => *code,
            CommError::InvalidPe(_) | CommError::Backend(_) | CommError::InvalidArgument(_) => {
                ERR_ARG
            }
            _ => ERR_COMM,
        }
    }
}

impl std::fmt::Display for CommError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            CommError::Aborted(code) => write!(f, "group aborted with code {}", code),
            CommError::Disconnected(pe) => {
                write!(f, "pe {} disconnected before sending the expected message", pe)
            }
            CommError::SizeMismatch { expected, received } => write!(
                f,
                "message size mismatch: expected {} entries, received {}",
                expected, received
            ),
            CommError::Serialization(msg) => write!(f, "payload serialization failed: {}", msg),
            CommError::InvalidPe(err) => write!(f, "{}", err),
            CommError::Unmatched { src, tag } => write!(
                f,
                "receive from pe {} with tag {} can never be matched",
                src, tag
            ),
            CommError::Backend(msg) => write!(f, "backend error: {}", msg),
            CommError::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
        }
    }
}

impl std::error::Error for CommError {}

impl From<IdError> for CommError {
    fn from(err: IdError) -> Self {
        CommError::InvalidPe(err)
    }
}

impl From<bincode::Error> for CommError {
    fn from(err: bincode::Error) -> Self {
        CommError::Serialization(err.to_string())
    }
}

pub type CommResult<T> = Result<T, CommError>;

/// Errors raised by the distributed vector and matrix operations.
#[derive(Debug)]
pub enum GridError {
    /// The team size is not a perfect square.
    NotSquareGrid { num_pes: usize },
    /// A global size does not split evenly into equal local parts.
    NotDivisible {
        op: &'static str,
        global: usize,
        parts: usize,
    },
    /// Vector and matrix sizes passed to MatMult do not agree.
    MatMultSizeMismatch {
        matrix: usize,
        x: usize,
        y: usize,
        matrix_local: usize,
        np: usize,
        x_local: usize,
        y_local: usize,
    },
    /// The three operands of MatMatMult do not agree in size.
    MatMatMultSizeMismatch {
        global: [usize; 3],
        local: [usize; 3],
    },
    /// Operands live on different teams.
    TeamMismatch { op: &'static str },
    /// Local storage could not be reserved.
    Alloc { what: &'static str, entries: usize },
    Comm(CommError),
    Io(std::io::Error),
}

impl GridError {
    /// The code the whole group is aborted with when this error escapes a pe.
    pub fn code(&self) -> i32 {
        match self {
            GridError::Alloc { .. } => ERR_NO_MEM,
            GridError::Comm(err) => err.code(),
            GridError::Io(_) => ERR_IO,
            _ => ERR_ARG,
        }
    }

    /// True when this pe only failed because some other pe aborted the group.
    pub fn is_abort(&self) -> bool {
        matches!(self, GridError::Comm(CommError::Aborted(_)))
    }
}

impl std::fmt::Display for GridError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            GridError::NotSquareGrid { num_pes } => write!(
                f,
                "MatCreate: need square process grid for matrix distribution, got {} processes",
                num_pes
            ),
            GridError::NotDivisible { op, global, parts } => write!(
                f,
                "{}: need equal number of entries on each process, global size {} not evenly divisible by {}",
                op, global, parts
            ),
            GridError::MatMultSizeMismatch {
                matrix,
                x,
                y,
                matrix_local,
                np,
                x_local,
                y_local,
            } => write!(
                f,
                "Mismatching sizes in MatMult {} {} {} (local: matrix {} over {} grid columns, x {}, y {})",
                matrix, x, y, matrix_local, np, x_local, y_local
            ),
            GridError::MatMatMultSizeMismatch { global, local } => write!(
                f,
                "Mismatching matrix sizes in matrix multiplication: global {:?}, local {:?}",
                global, local
            ),
            GridError::TeamMismatch { op } => {
                write!(f, "{}: operands are distributed over different teams", op)
            }
            GridError::Alloc { what, entries } => write!(
                f,
                "Unable to allocate space for {} ({} entries)",
                what, entries
            ),
            GridError::Comm(err) => write!(f, "communication failed: {}", err),
            GridError::Io(err) => write!(f, "unable to write view: {}", err),
        }
    }
}

impl std::error::Error for GridError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GridError::Comm(err) => Some(err),
            GridError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CommError> for GridError {
    fn from(err: CommError) -> Self {
        GridError::Comm(err)
    }
}

impl From<std::io::Error> for GridError {
    fn from(err: std::io::Error) -> Self {
        GridError::Io(err)
    }
}

pub type GridResult<T> = Result<T, GridError>;

/// Reserve a zeroed buffer of `len` entries, reporting failure instead of aborting the process.
pub(crate) fn alloc_zeroed(what: &'static str, len: usize) -> GridResult<Vec<f64>> {
    let mut data = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|_| GridError::Alloc { what, entries: len })?;
    data.resize(len, 0.0);
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_error_kind() {
        assert_eq!(GridError::NotSquareGrid { num_pes: 3 }.code(), ERR_ARG);
        assert_eq!(
            GridError::Alloc {
                what: "matrix",
                entries: 4
            }
            .code(),
            ERR_NO_MEM
        );
        let aborted = GridError::from(CommError::Aborted(7));
        assert_eq!(aborted.code(), 7);
        assert!(aborted.is_abort());
        assert!(!GridError::TeamMismatch { op: "MatMult" }.is_abort());
    }

    #[test]
    fn messages_carry_offending_sizes() {
        let msg = GridError::NotDivisible {
            op: "VecCreate",
            global: 10,
            parts: 4,
        }
        .to_string();
        assert!(msg.contains("10") && msg.contains('4'));
    }

    #[test]
    fn alloc_zeroed_fills_with_zero() {
        let buf = alloc_zeroed("vector", 5).unwrap();
        assert_eq!(buf, vec![0.0; 5]);
    }
}
