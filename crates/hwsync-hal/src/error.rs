//! Hardware status codes and the error type every backend call returns.

use std::fmt;
use thiserror::Error;

/// Status codes reported by vendor SDKs.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HwStatus {
    Success = 0,
    Failure = -1,
    NotSupported = -2,
    NoMemory = -3,
    InsufficientResources = -4,
    InvalidParameter = -5,
    ItemAlreadyExists = -6,
    ItemNotFound = -7,
    TableFull = -13,
    ObjectInUse = -17,
    InvalidObjectId = -19,
}

impl HwStatus {
    pub fn code(&self) -> i32 {
        *self as i32
    }
}

impl fmt::Display for HwStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HwStatus::Success => "STATUS_SUCCESS",
            HwStatus::Failure => "STATUS_FAILURE",
            HwStatus::NotSupported => "STATUS_NOT_SUPPORTED",
            HwStatus::NoMemory => "STATUS_NO_MEMORY",
            HwStatus::InsufficientResources => "STATUS_INSUFFICIENT_RESOURCES",
            HwStatus::InvalidParameter => "STATUS_INVALID_PARAMETER",
            HwStatus::ItemAlreadyExists => "STATUS_ITEM_ALREADY_EXISTS",
            HwStatus::ItemNotFound => "STATUS_ITEM_NOT_FOUND",
            HwStatus::TableFull => "STATUS_TABLE_FULL",
            HwStatus::ObjectInUse => "STATUS_OBJECT_IN_USE",
            HwStatus::InvalidObjectId => "STATUS_INVALID_OBJECT_ID",
        };
        write!(f, "{} ({})", s, self.code())
    }
}

/// A failed hardware operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("hardware operation failed: {status}: {message}")]
pub struct HwError {
    status: HwStatus,
    message: String,
}

impl HwError {
    pub fn new(status: HwStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(item: impl fmt::Display) -> Self {
        Self::new(HwStatus::ItemNotFound, format!("{} not found", item))
    }

    pub fn already_exists(item: impl fmt::Display) -> Self {
        Self::new(HwStatus::ItemAlreadyExists, format!("{} already exists", item))
    }

    pub fn status(&self) -> HwStatus {
        self.status
    }
}

/// Result type for backend operations.
pub type HwResult<T> = Result<T, HwError>;
