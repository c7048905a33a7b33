use thiserror::Error;

/// Failure modes of the public allocator operations, reported by value.
///
/// No operation panics on a bad request; errors surface to the caller and
/// the engine stays usable. [`AllocError::OutOfMemory`] in particular
/// leaves the heap intact for smaller subsequent requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
    /// A size of zero, or a null pointer where one is not permitted.
    #[error("invalid argument")]
    InvalidArgument,
    /// Size arithmetic exceeded the representable range.
    #[error("size overflow")]
    SizeOverflow,
    /// The memory source could not supply more address space.
    #[error("out of memory")]
    OutOfMemory,
    /// The pointer lies outside the heap and was never mapped.
    #[error("invalid pointer")]
    InvalidPointer,
    /// The block behind the pointer is already free.
    #[error("double free")]
    DoubleFree,
}
