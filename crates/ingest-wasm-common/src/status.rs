//! Status codes shared by the host and guest.
//!
//! Every host function returns one of these codes to the guest, and the guest
//! `process` export returns one to the host. There is no other error channel
//! across the boundary.

/// Outcome of a call across the host/guest boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Status {
    /// The call succeeded.
    Ok = 0,
    /// The callee failed for a reason unrelated to its arguments.
    InternalFailure = 1,
    /// An argument was invalid (bad pointer, bad encoding).
    InvalidArgument = 2,
    /// The requested item does not exist.
    NotFound = 3,
}

impl Status {
    /// Decode a raw status code.
    ///
    /// Returns `None` for codes outside the known set.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Ok),
            1 => Some(Self::InternalFailure),
            2 => Some(Self::InvalidArgument),
            3 => Some(Self::NotFound),
            _ => None,
        }
    }

    /// Raw code as passed across the boundary.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Returns `true` for [`Status::Ok`].
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }

    /// Human readable name for a raw code, including unknown ones.
    pub fn describe(code: i32) -> String {
        match Self::from_code(code) {
            Some(status) => status.to_string(),
            None => format!("Status {code}"),
        }
    }
}

impl From<Status> for i32 {
    fn from(status: Status) -> Self {
        status.code()
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Ok => write!(f, "OK"),
            Status::InternalFailure => write!(f, "Internal Failure"),
            Status::InvalidArgument => write!(f, "Invalid Argument"),
            Status::NotFound => write!(f, "Not Found"),
        }
    }
}
