use crate::NAME_MAX;
use crate::sector::{self, OnDisk};

/// 目录下一项的元信息
#[derive(Debug, Default, Clone)]
#[repr(C)]
pub struct DirEntry {
    inode_sector: u32,
    // 最后一字节留给 \0
    name: [u8; NAME_MAX + 1],
    in_use: u8,
}

unsafe impl OnDisk for DirEntry {}

impl DirEntry {
    /// 元信息大小恒为20字节
    pub const SIZE: usize = 20;

    /// `name`须已通过长度检查
    pub fn new(name: &str, inode_sector: u32) -> Self {
        let bytes = name.as_bytes();
        debug_assert!(bytes.len() <= NAME_MAX);
        let mut buf = [0; NAME_MAX + 1];
        buf[..bytes.len()].copy_from_slice(bytes);

        Self {
            inode_sector,
            name: buf,
            in_use: 1,
        }
    }

    pub fn name(&self) -> &str {
        let len = self
            .name
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(NAME_MAX);
        core::str::from_utf8(&self.name[..len]).unwrap_or_default()
    }

    #[inline]
    pub fn inode_sector(&self) -> u32 {
        self.inode_sector
    }

    #[inline]
    pub fn in_use(&self) -> bool {
        self.in_use != 0
    }

    /// 原地清除占用标记，槽位可被复用
    #[inline]
    pub fn release(&mut self) {
        self.in_use = 0;
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        sector::as_bytes(self)
    }

    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        sector::as_bytes_mut(self)
    }
}

const _: () = assert!(core::mem::size_of::<DirEntry>() == DirEntry::SIZE);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_round_trips_through_bytes() {
        let entry = DirEntry::new("b.txt", 42);
        let mut copy = DirEntry::default();
        copy.as_bytes_mut().copy_from_slice(entry.as_bytes());

        assert_eq!(copy.name(), "b.txt");
        assert_eq!(copy.inode_sector(), 42);
        assert!(copy.in_use());
    }

    #[test]
    fn longest_name_keeps_terminator() {
        let entry = DirEntry::new("abcdefghijklmn", 7);
        assert_eq!(entry.name(), "abcdefghijklmn");
        assert_eq!(entry.as_bytes()[4 + NAME_MAX], 0);
    }
}
