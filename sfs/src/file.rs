use alloc::string::String;

use enumflags2::{BitFlags, bitflags};

use crate::{Error, Inode, Result, SectorId, directory};

#[rustfmt::skip]
#[allow(clippy::upper_case_acronyms)]
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFlag {
    /// 只写
    WRONLY = 0b0000_0000_0001,
    /// 读写兼备
    RDWR   = 0b0000_0000_0010,
    /// 不存在时创建文件
    CREATE = 0b0010_0000_0000,
}

impl OpenFlag {
    // enumflags2拒绝值为0的标志
    /// 只读
    pub const RDONLY: u32 = 0b0000_0000_0000;

    #[inline]
    pub fn read_only() -> BitFlags<OpenFlag> {
        BitFlags::from_bits_truncate(Self::RDONLY)
    }
}

/// 打开的文件或目录，各自维护读写位置
pub struct File {
    inode: Inode,
    /// 文件内的偏移量；对目录则是`readdir`的位置
    pos: usize,
    readable: bool,
    writable: bool,
    /// 本句柄是否禁止了写入
    deny_write: bool,
}

impl File {
    #[inline]
    pub fn new(inode: Inode, readable: bool, writable: bool) -> Self {
        Self {
            inode,
            pos: 0,
            readable,
            writable,
            deny_write: false,
        }
    }

    #[inline]
    pub fn inode(&self) -> &Inode {
        &self.inode
    }

    #[inline]
    pub fn inumber(&self) -> SectorId {
        self.inode.sector()
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.inode.is_dir()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inode.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inode.is_empty()
    }

    #[inline]
    pub fn readable(&self) -> bool {
        self.readable
    }

    #[inline]
    pub fn writable(&self) -> bool {
        self.writable
    }

    #[inline]
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    #[inline]
    pub fn tell(&self) -> usize {
        self.pos
    }

    /// 从当前位置读，并推进位置
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let read_size = self.read_at(self.pos, buf)?;
        self.pos += read_size;
        Ok(read_size)
    }

    /// 向当前位置写，并推进位置
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let write_size = self.write_at(self.pos, buf)?;
        self.pos += write_size;
        Ok(write_size)
    }

    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize> {
        if !self.readable {
            return Err(Error::PermissionDenied);
        }
        if self.is_dir() {
            return Err(Error::IsADirectory);
        }
        self.inode.read_at(offset, buf)
    }

    pub fn write_at(&self, offset: usize, buf: &[u8]) -> Result<usize> {
        if !self.writable {
            return Err(Error::PermissionDenied);
        }
        if self.is_dir() {
            return Err(Error::IsADirectory);
        }
        if self.inode.writes_denied() {
            return Err(Error::WriteDenied);
        }
        self.inode.write_at(offset, buf)
    }

    /// 目录的下一个名字
    pub fn readdir(&mut self) -> Result<Option<String>> {
        if !self.is_dir() {
            return Err(Error::NotADirectory);
        }
        directory::next_entry(&self.inode, &mut self.pos)
    }

    /// 禁止任何句柄写入该 inode，直到本句柄允许或关闭
    pub fn deny_write(&mut self) {
        if !self.deny_write {
            self.deny_write = true;
            self.inode.deny_write();
        }
    }

    pub fn allow_write(&mut self) {
        if self.deny_write {
            self.deny_write = false;
            self.inode.allow_write();
        }
    }
}

impl Drop for File {
    fn drop(&mut self) {
        self.allow_write();
    }
}
