use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The taxonomy separates four failure classes that callers handle differently:
///
/// 1. **I/O errors** ([`Error::FileError`]) - the file is missing, unreadable or inaccessible.
///    Surfaced immediately, never retried.
/// 2. **Malformed-container errors** ([`Error::Malformed`], [`Error::NotSupported`],
///    [`Error::Empty`], [`Error::GoblinErr`]) - the container is damaged or of an unexpected
///    kind. The `Malformed` variant carries the source location where the malformation was
///    detected, and its message names the offending file offset where one exists.
/// 3. **Decode failures** ([`Error::InvalidInstruction`], [`Error::OutOfBounds`],
///    [`Error::UnmappedAddress`]) - localized to a single virtual address. Control-flow
///    recovery contains these by terminating the affected block and continuing elsewhere;
///    they are never fatal for a whole load.
/// 4. **Resource exhaustion** - a crafted binary exceeding the configured segment or size
///    limits is reported as [`Error::Malformed`] before any backing storage is allocated.
///
/// # Examples
///
/// ```rust,no_run
/// use rcdecomp::{DecompilerContext, Error};
/// use std::path::Path;
///
/// let mut ctx = DecompilerContext::new();
/// match ctx.load(Path::new("target/binary")) {
///     Ok(()) => println!("loaded"),
///     Err(Error::NotSupported) => eprintln!("not an ELF64 binary"),
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("malformed container: {} ({}:{})", message, file, line);
///     }
///     Err(Error::FileError(io_err)) => eprintln!("I/O error: {}", io_err),
///     Err(e) => eprintln!("other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The file is damaged and could not be parsed.
    ///
    /// The container structure does not conform to the ELF64 format, or one of its
    /// descriptors declares a range outside the byte image. The error includes the
    /// source location where the malformation was detected for debugging purposes.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while reading the byte image.
    ///
    /// Safety check against buffer overruns; also raised when an instruction would
    /// need bytes beyond the end of its containing segment.
    #[error("Out of bound read would have occurred!")]
    OutOfBounds,

    /// This file type is not supported.
    ///
    /// The input is not an ELF64 binary (wrong magic, or a 32-bit class).
    #[error("This file type is not supported")]
    NotSupported,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    ///
    /// Wraps standard I/O errors that can occur during the initial file read, such
    /// as a missing file or a permission problem.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Error from the goblin crate during ELF parsing.
    #[error("{0}")]
    GoblinErr(#[from] goblin::error::Error),

    /// The bytes at the given virtual address do not decode to a supported instruction.
    ///
    /// Localized to one address; control-flow recovery records the affected block as
    /// terminated-with-error and continues.
    #[error("Invalid or unsupported instruction at {address:#x}")]
    InvalidInstruction {
        /// Virtual address of the first byte of the failed decode
        address: u64,
    },

    /// The virtual address is not covered by any mapped segment.
    #[error("Virtual address {0:#x} is not mapped by any segment")]
    UnmappedAddress(u64),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_error_macro() {
        let err = malformed_error!("segment 3 out of bounds at offset {:#x}", 0x1234);
        match err {
            Error::Malformed { message, file, .. } => {
                assert_eq!(message, "segment 3 out of bounds at offset 0x1234");
                assert!(file.ends_with("error.rs"));
            }
            _ => panic!("expected Malformed"),
        }
    }

    #[test]
    fn display() {
        assert_eq!(
            Error::InvalidInstruction { address: 0x401000 }.to_string(),
            "Invalid or unsupported instruction at 0x401000"
        );
        assert_eq!(
            Error::UnmappedAddress(0x40).to_string(),
            "Virtual address 0x40 is not mapped by any segment"
        );
    }
}
