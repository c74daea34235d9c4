//! # 扇区缓冲
//!
//! 块设备的读写以扇区为单位，磁盘数据结构都按扇区对齐且不超过一个扇区。
//! [`Sector`] 把一个扇区的数据复制到内存中，并允许以磁盘数据结构的类型
//! 访问其中的一段；修改后须显式写回。

use alloc::sync::Arc;
use core::mem;
use core::slice;

use block_dev::BlockDevice;
use derive_more::{Display, From, Into};

use crate::{Result, SECTOR_SIZE};

/// 扇区号
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
#[repr(transparent)]
pub struct SectorId(u32);

impl SectorId {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// 对应的块ID
    #[inline]
    pub fn block(self) -> usize {
        self.0 as usize
    }
}

/// 可以直接映射到扇区字节上的磁盘数据结构。
///
/// # Safety
///
/// 实现者必须是`#[repr(C)]`的，且任意字节序列都是它的合法值
/// （只能由整数及其数组组成）。
pub(crate) unsafe trait OnDisk: Sized {}

unsafe impl OnDisk for [u32; SECTOR_SIZE / 4] {}

#[repr(C, align(8))]
struct SectorData([u8; SECTOR_SIZE]);

/// 内存中的扇区
pub(crate) struct Sector {
    data: SectorData,
    id: SectorId,
}

impl Sector {
    #[inline]
    pub fn zeroed(id: SectorId) -> Self {
        Self {
            data: SectorData([0; SECTOR_SIZE]),
            id,
        }
    }

    pub fn read(id: SectorId, block_device: &Arc<dyn BlockDevice>) -> Result<Self> {
        let mut sector = Self::zeroed(id);
        block_device.read_block(id.block(), &mut sector.data.0)?;
        Ok(sector)
    }

    #[inline]
    pub fn write(&self, block_device: &Arc<dyn BlockDevice>) -> Result<()> {
        block_device.write_block(self.id.block(), &self.data.0)?;
        Ok(())
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.data.0
    }

    #[inline]
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data.0
    }

    pub fn get<T: OnDisk>(&self, offset: usize) -> &T {
        Self::check::<T>(offset);
        // SAFETY: 范围与对齐已检查，`T: OnDisk`保证任意字节都合法
        unsafe { &*self.data.0.as_ptr().add(offset).cast() }
    }

    pub fn get_mut<T: OnDisk>(&mut self, offset: usize) -> &mut T {
        Self::check::<T>(offset);
        // SAFETY: 同`get`
        unsafe { &mut *self.data.0.as_mut_ptr().add(offset).cast() }
    }

    #[inline]
    pub fn map<T: OnDisk, V>(&self, offset: usize, f: impl FnOnce(&T) -> V) -> V {
        f(self.get(offset))
    }

    fn check<T>(offset: usize) {
        assert!(mem::size_of::<T>() + offset <= SECTOR_SIZE);
        assert_eq!(offset % mem::align_of::<T>(), 0);
    }
}

/// 把磁盘数据结构视为字节
#[inline]
pub(crate) fn as_bytes<T: OnDisk>(value: &T) -> &[u8] {
    // SAFETY: `T: OnDisk`由整数组成
    unsafe { slice::from_raw_parts((value as *const T).cast(), mem::size_of::<T>()) }
}

#[inline]
pub(crate) fn as_bytes_mut<T: OnDisk>(value: &mut T) -> &mut [u8] {
    // SAFETY: `T: OnDisk`的任意字节都合法
    unsafe { slice::from_raw_parts_mut((value as *mut T).cast(), mem::size_of::<T>()) }
}
