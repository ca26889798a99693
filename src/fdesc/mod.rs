//! Open-handle bookkeeping.
//!
//! [`FileHandle`] is the opaque token a backend returns from open/opendir.
//! [`DescriptorTable`] maps small integer keys to handles for callers that
//! need a POSIX-style descriptor instead of the handle itself; a context keeps
//! one table for files and one for directories.

mod handle;
mod table;

pub use handle::FileHandle;
pub use table::{DescriptorKey, DescriptorTable};
