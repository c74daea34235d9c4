use block_dev::IoError;
use derive_more::Display;

use crate::SectorId;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[display(fmt = "no free sectors left")]
    NoSpace,
    #[display(fmt = "no such file or directory")]
    NotFound,
    #[display(fmt = "name already exists")]
    Duplicate,
    #[display(fmt = "name component is too long")]
    NameTooLong,
    #[display(fmt = "invalid name")]
    InvalidName,
    #[display(fmt = "directory not empty")]
    DirectoryNotEmpty,
    #[display(fmt = "directory is the current working directory")]
    IsCurrentDirectory,
    #[display(fmt = "not a directory")]
    NotADirectory,
    #[display(fmt = "is a directory")]
    IsADirectory,
    #[display(fmt = "offset out of range")]
    OutOfRange,
    #[display(fmt = "writes are denied")]
    WriteDenied,
    #[display(fmt = "permission denied")]
    PermissionDenied,
    /// 磁盘上的 inode 魔数不符，无法修复
    #[display(fmt = "corrupt inode at sector {}", _0)]
    StructureCorrupt(SectorId),
    #[display(fmt = "{}", _0)]
    Io(IoError),
}

impl From<IoError> for Error {
    #[inline]
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl core::error::Error for Error {}
